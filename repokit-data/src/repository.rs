use std::future::Future;
use std::marker::PhantomData;

use repokit_core::RequestParams;
use repokit_events::EventBus;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::criteria::Criteria;
use crate::entity::{from_record, to_record, Entity, Lookup, Record, Target, ALL_COLUMNS};
use crate::error::DataError;
use crate::events::{DeletedSnapshot, EntityDeleted};
use crate::options::RepositoryOptions;
use crate::page::{Page, Pageable};
use crate::store::{GroupCount, Store};

/// CRUD and query contract over one entity type.
///
/// Every filter arrives as a [`Criteria`] argument, so nothing carries over
/// from one call to the next.
///
/// Uses RPITIT (return-position `impl Trait` in traits), no `async-trait` needed.
pub trait Repository<T: Entity>: Send + Sync {
    /// Resolve a numeric lookup by primary key and anything else by the slug
    /// column. `Ok(None)` when nothing matches.
    fn find_by_id(
        &self,
        id: impl Into<Lookup> + Send,
        columns: &[&str],
    ) -> impl Future<Output = Result<Option<T>, DataError>> + Send;

    /// Entities matched by `criteria` whose `column` equals `value`.
    fn find_by_column(
        &self,
        column: &str,
        value: impl Into<Value> + Send,
        criteria: &Criteria,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn create<D: Serialize + Sync>(
        &self,
        data: &D,
    ) -> impl Future<Output = Result<T, DataError>> + Send;

    /// Create each item in order. Not atomic: on a failure at index `k` the
    /// error is returned and items `0..k` stay committed.
    fn create_many<D: Serialize + Sync>(
        &self,
        items: &[D],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    /// Apply `data` to the entity with `id`. [`DataError::NotFound`] if it does not exist.
    fn update_by_id<D: Serialize + Sync>(
        &self,
        id: &T::Id,
        data: &D,
    ) -> impl Future<Output = Result<T, DataError>> + Send;

    /// Delete the entity with `id`. [`DataError::NotFound`] if it does not exist.
    fn delete_by_id(&self, id: &T::Id) -> impl Future<Output = Result<bool, DataError>> + Send;

    /// Delete every entity whose key is in `ids`; returns how many were removed.
    /// Emits one [`EntityDeleted`] event even when nothing matched.
    fn delete_many(&self, ids: &[T::Id]) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Delete `target` by its key, with the same [`DataError::NotFound`]
    /// semantics as [`delete_by_id`](Repository::delete_by_id). With `None`,
    /// delete every entity matched by `criteria` and report whether anything
    /// was removed. Each call emits one [`EntityDeleted`] event.
    fn delete(
        &self,
        target: Option<&T>,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<bool, DataError>> + Send;

    fn count(
        &self,
        criteria: &Criteria,
        column: Option<&str>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn sum(
        &self,
        column: &str,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<f64, DataError>> + Send;

    /// Grouped counts, largest group first; equal counts ordered by the group columns.
    fn count_group_by(
        &self,
        select: &[&str],
        group: &[&str],
        criteria: &Criteria,
    ) -> impl Future<Output = Result<Vec<GroupCount>, DataError>> + Send;
}

/// [`Repository`] implementation composed from a [`Store`] and an [`EventBus`].
///
/// Built per request: the request parameters are read once, at construction,
/// and seeded with the default sort (from [`RepositoryOptions`], falling back
/// to [`Entity::default_order_by`] / [`Entity::default_sorted_by`]).
///
/// ```ignore
/// let repo = GenericRepository::<Article, _, _>::for_request(
///     store.clone(),
///     bus.clone(),
///     RequestParams::from_query(uri.query()),
///     config.section()?,
/// );
/// let latest = repo.all(&Criteria::new().limit(10), ALL_COLUMNS).await?;
/// ```
pub struct GenericRepository<T, S, B> {
    store: S,
    events: B,
    request: RequestParams,
    options: RepositoryOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, B> GenericRepository<T, S, B>
where
    T: Entity,
    S: Store,
    B: EventBus,
{
    /// Repository with no request parameters. The entity's default sort still applies.
    pub fn new(store: S, events: B) -> Self {
        Self::for_request(store, events, RequestParams::new(), RepositoryOptions::default())
    }

    pub fn for_request(
        store: S,
        events: B,
        mut request: RequestParams,
        mut options: RepositoryOptions,
    ) -> Self {
        if options.default_order_by.is_none() {
            options.default_order_by = T::default_order_by().map(str::to_string);
        }
        if options.default_sorted_by.is_none() {
            options.default_sorted_by = T::default_sorted_by();
        }
        options.seed(&mut request);

        Self {
            store,
            events,
            request,
            options,
            _marker: PhantomData,
        }
    }

    /// The request parameters after default-sort seeding.
    pub fn request(&self) -> &RequestParams {
        &self.request
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &B {
        &self.events
    }

    /// Ordering requested through the request parameters.
    pub fn request_criteria(&self) -> Criteria {
        self.options.request_criteria(&self.request)
    }

    /// Every matched entity, ordered by `criteria` and then by the request sort.
    pub async fn all(&self, criteria: &Criteria, columns: &[&str]) -> Result<Vec<T>, DataError> {
        debug!(table = T::table_name(), "all");
        let criteria = criteria.clone().then_order(&self.request_criteria());
        self.select(&criteria, columns).await
    }

    /// Matched entities, ignoring the request sort.
    pub async fn find_where(
        &self,
        criteria: &Criteria,
        columns: &[&str],
    ) -> Result<Vec<T>, DataError> {
        debug!(table = T::table_name(), "find_where");
        self.select(criteria, columns).await
    }

    /// One page of matched entities. The criteria's own limit and offset are
    /// replaced by the page window.
    pub async fn paginate(
        &self,
        pageable: &Pageable,
        criteria: &Criteria,
        columns: &[&str],
    ) -> Result<Page<T>, DataError> {
        debug!(table = T::table_name(), page = pageable.page, size = pageable.size, "paginate");
        let total = self
            .store
            .count(T::table_name(), &criteria.filters_only(), None)
            .await?;
        let window = criteria
            .clone()
            .then_order(&self.request_criteria())
            .limit(pageable.size)
            .offset(pageable.offset());
        let content = self.select(&window, columns).await?;
        Ok(Page::new(content, pageable, total))
    }

    /// First entity whose columns equal `attributes`, created from them when
    /// none exists.
    pub async fn first_or_create<D: Serialize + Sync>(&self, attributes: &D) -> Result<T, DataError> {
        debug!(table = T::table_name(), "first_or_create");
        let attributes = to_record(attributes)?;
        match self.first_matching(&attributes).await? {
            Some(row) => from_record(row),
            None => self.insert_record(attributes).await,
        }
    }

    /// Update the first entity matching `attributes` with `values`, or create
    /// one from both.
    pub async fn update_or_create<A, V>(&self, attributes: &A, values: &V) -> Result<T, DataError>
    where
        A: Serialize + Sync,
        V: Serialize + Sync,
    {
        debug!(table = T::table_name(), "update_or_create");
        let attributes = to_record(attributes)?;
        let values = to_record(values)?;
        match self.first_matching(&attributes).await? {
            Some(row) => {
                let key = row.get(T::id_column()).cloned().unwrap_or(Value::Null);
                self.update_key(key, values).await
            }
            None => {
                let mut record = attributes;
                record.extend(values);
                self.insert_record(record).await
            }
        }
    }

    /// Apply `data` to an entity given by reference or by key. Same semantics
    /// as [`update_by_id`](Repository::update_by_id).
    pub async fn update<'a, D: Serialize + Sync>(
        &self,
        target: impl Into<Target<'a, T>>,
        data: &D,
    ) -> Result<T, DataError> {
        self.update_by_id(target.into().id(), data).await
    }

    async fn select(&self, criteria: &Criteria, columns: &[&str]) -> Result<Vec<T>, DataError> {
        self.store
            .select(T::table_name(), criteria, columns)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }

    async fn first_matching(&self, attributes: &Record) -> Result<Option<Record>, DataError> {
        let criteria = Criteria::new().where_all(attributes).limit(1);
        let rows = self
            .store
            .select(T::table_name(), &criteria, ALL_COLUMNS)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_record(&self, mut record: Record) -> Result<T, DataError> {
        // a null key lets the store generate one
        if record.get(T::id_column()).is_some_and(Value::is_null) {
            record.remove(T::id_column());
        }
        let row = self
            .store
            .insert(T::table_name(), T::id_column(), record)
            .await?;
        from_record(row)
    }

    async fn update_key(&self, key: Value, mut changes: Record) -> Result<T, DataError> {
        let criteria = key_criteria::<T>(key.clone());
        changes.remove(T::id_column());

        let row = if changes.is_empty() {
            self.store
                .select(T::table_name(), &criteria.limit(1), ALL_COLUMNS)
                .await?
                .into_iter()
                .next()
        } else {
            self.store
                .update(T::table_name(), T::id_column(), &criteria, &changes)
                .await?
                .into_iter()
                .next()
        };

        match row {
            Some(row) => from_record(row),
            None => Err(not_found::<T>(&key)),
        }
    }

    async fn emit_deleted(&self, snapshot: DeletedSnapshot<T>) {
        self.events
            .emit_and_wait(EntityDeleted {
                repository: T::table_name().to_string(),
                snapshot,
            })
            .await;
    }
}

fn key_criteria<T: Entity>(key: impl Into<Value>) -> Criteria {
    Criteria::new().where_eq(T::id_column(), key)
}

fn not_found<T: Entity>(key: &Value) -> DataError {
    DataError::NotFound(format!(
        "{} with {} = {key}",
        T::table_name(),
        T::id_column()
    ))
}

impl<T, S, B> Repository<T> for GenericRepository<T, S, B>
where
    T: Entity,
    S: Store,
    B: EventBus,
{
    fn find_by_id(
        &self,
        id: impl Into<Lookup> + Send,
        columns: &[&str],
    ) -> impl Future<Output = Result<Option<T>, DataError>> + Send {
        let criteria = match id.into() {
            Lookup::Key(key) => key_criteria::<T>(key),
            Lookup::Slug(slug) => Criteria::new().where_eq(T::slug_column(), slug),
        }
        .limit(1);
        async move {
            debug!(table = T::table_name(), "find_by_id");
            let rows = self
                .store
                .select(T::table_name(), &criteria, columns)
                .await?;
            rows.into_iter().next().map(from_record).transpose()
        }
    }

    fn find_by_column(
        &self,
        column: &str,
        value: impl Into<Value> + Send,
        criteria: &Criteria,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send {
        let criteria = criteria
            .clone()
            .where_eq(column, value)
            .then_order(&self.request_criteria());
        async move {
            debug!(table = T::table_name(), column, "find_by_column");
            self.select(&criteria, columns).await
        }
    }

    fn create<D: Serialize + Sync>(
        &self,
        data: &D,
    ) -> impl Future<Output = Result<T, DataError>> + Send {
        let record = to_record(data);
        async move {
            debug!(table = T::table_name(), "create");
            self.insert_record(record?).await
        }
    }

    fn create_many<D: Serialize + Sync>(
        &self,
        items: &[D],
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send {
        async move {
            debug!(table = T::table_name(), items = items.len(), "create_many");
            let mut created = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match self.create(item).await {
                    Ok(entity) => created.push(entity),
                    Err(err) => {
                        warn!(
                            table = T::table_name(),
                            committed = created.len(),
                            failed_at = index,
                            error = %err,
                            "create_many stopped early"
                        );
                        return Err(err);
                    }
                }
            }
            Ok(created)
        }
    }

    fn update_by_id<D: Serialize + Sync>(
        &self,
        id: &T::Id,
        data: &D,
    ) -> impl Future<Output = Result<T, DataError>> + Send {
        let key: Value = id.clone().into();
        let changes = to_record(data);
        async move {
            debug!(table = T::table_name(), %key, "update_by_id");
            self.update_key(key, changes?).await
        }
    }

    fn delete_by_id(&self, id: &T::Id) -> impl Future<Output = Result<bool, DataError>> + Send {
        let key: Value = id.clone().into();
        async move {
            debug!(table = T::table_name(), %key, "delete_by_id");
            let criteria = key_criteria::<T>(key.clone());
            let snapshot = self
                .store
                .select(T::table_name(), &criteria.clone().limit(1), ALL_COLUMNS)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| not_found::<T>(&key))?;
            let snapshot: T = from_record(snapshot)?;

            let removed = self.store.delete(T::table_name(), &criteria).await?;
            if removed == 0 {
                return Ok(false);
            }
            self.emit_deleted(DeletedSnapshot::Entity(snapshot)).await;
            Ok(true)
        }
    }

    fn delete_many(&self, ids: &[T::Id]) -> impl Future<Output = Result<u64, DataError>> + Send {
        let keys: Vec<Value> = ids.iter().cloned().map(Into::into).collect();
        async move {
            debug!(table = T::table_name(), ids = keys.len(), "delete_many");
            let criteria = Criteria::new().where_in(T::id_column(), keys);
            let matched = self.select(&criteria, ALL_COLUMNS).await?;
            let removed = self.store.delete(T::table_name(), &criteria).await?;
            self.emit_deleted(DeletedSnapshot::Query { criteria, matched })
                .await;
            Ok(removed)
        }
    }

    fn delete(
        &self,
        target: Option<&T>,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<bool, DataError>> + Send {
        let id = target.map(|entity| entity.id().clone());
        let scoped = criteria.filters_only();
        async move {
            if let Some(id) = id {
                return self.delete_by_id(&id).await;
            }
            debug!(table = T::table_name(), "delete");
            let matched = self.select(&scoped, ALL_COLUMNS).await?;
            let removed = self.store.delete(T::table_name(), &scoped).await?;
            self.emit_deleted(DeletedSnapshot::Query {
                criteria: scoped,
                matched,
            })
            .await;
            Ok(removed > 0)
        }
    }

    fn count(
        &self,
        criteria: &Criteria,
        column: Option<&str>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send {
        async move {
            debug!(table = T::table_name(), "count");
            self.store.count(T::table_name(), criteria, column).await
        }
    }

    fn sum(
        &self,
        column: &str,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<f64, DataError>> + Send {
        async move {
            debug!(table = T::table_name(), column, "sum");
            self.store.sum(T::table_name(), criteria, column).await
        }
    }

    fn count_group_by(
        &self,
        select: &[&str],
        group: &[&str],
        criteria: &Criteria,
    ) -> impl Future<Output = Result<Vec<GroupCount>, DataError>> + Send {
        async move {
            debug!(table = T::table_name(), ?group, "count_group_by");
            self.store
                .count_group_by(T::table_name(), criteria, select, group)
                .await
        }
    }
}
