use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::criteria::SortDirection;
use crate::error::DataError;

/// A row as it crosses the store boundary: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Column selection meaning "every column".
pub const ALL_COLUMNS: &[&str] = &["*"];

/// Trait representing a persisted entity with a table name, a primary key
/// and an optional slug column.
///
/// Entities travel to and from the store as [`Record`]s through `serde`.
/// When a query selects a subset of columns, the missing fields must be
/// deserializable from their absence (`Option` or `#[serde(default)]`).
///
/// # Example
///
/// ```ignore
/// impl Entity for Article {
///     type Id = i64;
///     fn table_name() -> &'static str { "articles" }
///     fn id(&self) -> &i64 { &self.id }
///     fn default_order_by() -> Option<&'static str> { Some("created_at") }
///     fn default_sorted_by() -> Option<SortDirection> { Some(SortDirection::Desc) }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    type Id: Into<Value> + Clone + std::fmt::Debug + Send + Sync + 'static;

    fn table_name() -> &'static str;

    fn id_column() -> &'static str {
        "id"
    }

    /// Column holding the human-readable unique identifier.
    fn slug_column() -> &'static str {
        "slug"
    }

    fn id(&self) -> &Self::Id;

    /// Sort field injected into requests that do not name one.
    fn default_order_by() -> Option<&'static str> {
        None
    }

    /// Sort direction injected into requests that do not name one.
    fn default_sorted_by() -> Option<SortDirection> {
        None
    }
}

/// How `find_by_id` resolves an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lookup {
    /// Primary key lookup.
    Key(Value),
    /// Lookup by the entity's slug column.
    Slug(String),
}

impl Lookup {
    /// Classify a raw identifier: anything that parses as an `i64` is a key,
    /// everything else is a slug.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => Lookup::Key(Value::from(id)),
            Err(_) => Lookup::Slug(raw.to_string()),
        }
    }
}

impl From<&str> for Lookup {
    fn from(raw: &str) -> Self {
        Lookup::parse(raw)
    }
}

impl From<String> for Lookup {
    fn from(raw: String) -> Self {
        Lookup::parse(&raw)
    }
}

macro_rules! impl_lookup_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Lookup {
                fn from(id: $ty) -> Self {
                    Lookup::Key(Value::from(id))
                }
            }
        )+
    };
}

impl_lookup_from_int!(i32, i64, u32, u64);

/// An entity named either by reference or by its key.
#[derive(Debug)]
pub enum Target<'a, T: Entity> {
    Entity(&'a T),
    Id(&'a T::Id),
}

impl<'a, T: Entity> Target<'a, T> {
    pub fn id(&self) -> &'a T::Id {
        match *self {
            Target::Entity(entity) => entity.id(),
            Target::Id(id) => id,
        }
    }
}

impl<'a, T: Entity> From<&'a T> for Target<'a, T> {
    fn from(entity: &'a T) -> Self {
        Target::Entity(entity)
    }
}

/// Serialize a value into a [`Record`]. Fails unless it serializes to a JSON object.
pub fn to_record<D: Serialize + ?Sized>(data: &D) -> Result<Record, DataError> {
    match serde_json::to_value(data)? {
        Value::Object(record) => Ok(record),
        other => Err(DataError::Other(format!(
            "expected attributes to serialize to an object, got {other}"
        ))),
    }
}

/// Deserialize a [`Record`] into a typed value.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T, DataError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}
