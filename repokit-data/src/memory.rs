use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::criteria::{compare_nullable, number_of, Criteria};
use crate::entity::Record;
use crate::error::DataError;
use crate::store::{GroupCount, Store};

/// Constraint violations raised by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryStoreError {
    DuplicateKey { table: String, key: Value },
}

impl std::fmt::Display for MemoryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryStoreError::DuplicateKey { table, key } => {
                write!(f, "duplicate primary key {key} in table {table}")
            }
        }
    }
}

impl std::error::Error for MemoryStoreError {}

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
    last_id: i64,
}

/// Thread-safe in-memory store backed by `DashMap`, one entry per table.
///
/// Rows keep insertion order. Records inserted without a primary key get the
/// next integer key of their table. Criteria are evaluated with SQL null
/// semantics (see [`Criteria::matches`]).
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<DashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn insert_now(&self, table: &str, primary_key: &str, mut record: Record) -> Result<Record, DataError> {
        let mut entry = self.tables.entry(table.to_string()).or_default();
        let t = entry.value_mut();

        match record.get(primary_key).filter(|k| !k.is_null()) {
            Some(key) => {
                let taken = t
                    .rows
                    .iter()
                    .any(|row| compare_nullable(row.get(primary_key), Some(key)) == Ordering::Equal);
                if taken {
                    return Err(DataError::database(MemoryStoreError::DuplicateKey {
                        table: table.to_string(),
                        key: key.clone(),
                    }));
                }
                if let Some(id) = key.as_i64() {
                    t.last_id = t.last_id.max(id);
                }
            }
            None => {
                t.last_id += 1;
                record.insert(primary_key.to_string(), Value::from(t.last_id));
            }
        }

        t.rows.push(record.clone());
        Ok(record)
    }

    fn select_now(&self, table: &str, criteria: &Criteria, columns: &[&str]) -> Vec<Record> {
        let matched = criteria.apply(self.rows(table));
        if columns.iter().any(|c| *c == "*") {
            return matched;
        }
        matched
            .into_iter()
            .map(|row| project(&row, columns))
            .collect()
    }

    fn update_now(&self, table: &str, criteria: &Criteria, changes: &Record) -> Vec<Record> {
        let Some(mut t) = self.tables.get_mut(table) else {
            return Vec::new();
        };
        let mut updated = Vec::new();
        for row in t.rows.iter_mut().filter(|row| criteria.matches(row)) {
            for (column, value) in changes {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        updated
    }

    fn delete_now(&self, table: &str, criteria: &Criteria) -> u64 {
        let Some(mut t) = self.tables.get_mut(table) else {
            return 0;
        };
        let before = t.rows.len();
        t.rows.retain(|row| !criteria.matches(row));
        (before - t.rows.len()) as u64
    }

    fn count_now(&self, table: &str, criteria: &Criteria, column: Option<&str>) -> u64 {
        let matched = criteria.filters_only().apply(self.rows(table));
        match column {
            None | Some("*") => matched.len() as u64,
            Some(col) => matched
                .iter()
                .filter(|row| row.get(col).is_some_and(|v| !v.is_null()))
                .count() as u64,
        }
    }

    fn sum_now(&self, table: &str, criteria: &Criteria, column: &str) -> f64 {
        criteria
            .filters_only()
            .apply(self.rows(table))
            .iter()
            .filter_map(|row| row.get(column).and_then(number_of))
            .sum()
    }

    fn count_group_by_now(
        &self,
        table: &str,
        criteria: &Criteria,
        select: &[&str],
        group: &[&str],
    ) -> Vec<GroupCount> {
        let mut groups: Vec<(Vec<Value>, GroupCount)> = Vec::new();
        for row in criteria.filters_only().apply(self.rows(table)) {
            let key: Vec<Value> = group
                .iter()
                .map(|c| row.get(*c).cloned().unwrap_or(Value::Null))
                .collect();
            match groups.iter_mut().find(|(k, _)| same_key(k, &key)) {
                Some((_, g)) => g.count += 1,
                None => groups.push((
                    key,
                    GroupCount {
                        key: project(&row, select),
                        count: 1,
                    },
                )),
            }
        }

        groups.sort_by(|(a, _), (b, _)| compare_keys(a, b));
        // stable: equal counts keep the group-column order established above
        groups.sort_by(|(_, a), (_, b)| b.count.cmp(&a.count));
        groups.into_iter().map(|(_, g)| g).collect()
    }
}

fn project(row: &Record, columns: &[&str]) -> Record {
    columns
        .iter()
        .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
        .collect()
}

fn same_key(a: &[Value], b: &[Value]) -> bool {
    compare_keys(a, b) == Ordering::Equal
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| compare_nullable(Some(x), Some(y)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

impl Store for MemoryStore {
    fn insert(
        &self,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> impl Future<Output = Result<Record, DataError>> + Send {
        async move { self.insert_now(table, primary_key, record) }
    }

    fn select(
        &self,
        table: &str,
        criteria: &Criteria,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send {
        async move { Ok(self.select_now(table, criteria, columns)) }
    }

    fn update(
        &self,
        table: &str,
        _primary_key: &str,
        criteria: &Criteria,
        changes: &Record,
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send {
        async move { Ok(self.update_now(table, criteria, changes)) }
    }

    fn delete(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<u64, DataError>> + Send {
        async move { Ok(self.delete_now(table, criteria)) }
    }

    fn count(
        &self,
        table: &str,
        criteria: &Criteria,
        column: Option<&str>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send {
        async move { Ok(self.count_now(table, criteria, column)) }
    }

    fn sum(
        &self,
        table: &str,
        criteria: &Criteria,
        column: &str,
    ) -> impl Future<Output = Result<f64, DataError>> + Send {
        async move { Ok(self.sum_now(table, criteria, column)) }
    }

    fn count_group_by(
        &self,
        table: &str,
        criteria: &Criteria,
        select: &[&str],
        group: &[&str],
    ) -> impl Future<Output = Result<Vec<GroupCount>, DataError>> + Send {
        async move { Ok(self.count_group_by_now(table, criteria, select, group)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_keys() {
        let store = MemoryStore::new();
        let a = store.insert("users", "id", record(json!({"name": "a"}))).await.unwrap();
        let b = store.insert("users", "id", record(json!({"name": "b"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
    }

    #[tokio::test]
    async fn test_explicit_keys_advance_the_sequence() {
        let store = MemoryStore::new();
        store.insert("users", "id", record(json!({"id": 10}))).await.unwrap();
        let next = store.insert("users", "id", record(json!({}))).await.unwrap();
        assert_eq!(next["id"], json!(11));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_a_database_error() {
        let store = MemoryStore::new();
        store.insert("users", "id", record(json!({"id": 1}))).await.unwrap();
        let err = store.insert("users", "id", record(json!({"id": 1}))).await.unwrap_err();
        assert!(matches!(err, DataError::Database(_)));
        assert_eq!(store.rows("users").len(), 1);
    }

    #[tokio::test]
    async fn test_select_projects_columns() {
        let store = MemoryStore::new();
        store
            .insert("users", "id", record(json!({"name": "a", "email": "a@x"})))
            .await
            .unwrap();
        let rows = store.select("users", &Criteria::new(), &["id", "name"]).await.unwrap();
        assert_eq!(rows, vec![record(json!({"id": 1, "name": "a"}))]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let store = MemoryStore::new();
        assert!(store.select("nope", &Criteria::new(), &["*"]).await.unwrap().is_empty());
        assert_eq!(store.delete("nope", &Criteria::new()).await.unwrap(), 0);
        assert_eq!(store.count("nope", &Criteria::new(), None).await.unwrap(), 0);
        assert_eq!(store.sum("nope", &Criteria::new(), "x").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_count_ignores_paging() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.insert("t", "id", Record::new()).await.unwrap();
        }
        let criteria = Criteria::new().limit(2);
        assert_eq!(store.count("t", &criteria, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_count_group_by_orders_by_count_then_key() {
        let store = MemoryStore::new();
        for country in ["fr", "us", "de", "us", "fr", "it"] {
            store
                .insert("users", "id", record(json!({"country": country})))
                .await
                .unwrap();
        }
        let groups = store
            .count_group_by("users", &Criteria::new(), &["country"], &["country"])
            .await
            .unwrap();
        let summary: Vec<(Value, u64)> = groups
            .into_iter()
            .map(|g| (g.key["country"].clone(), g.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                (json!("fr"), 2),
                (json!("us"), 2),
                (json!("de"), 1),
                (json!("it"), 1),
            ]
        );
    }
}
