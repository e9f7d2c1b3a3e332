use std::future::Future;

use repokit_data::query::COUNT_ALIAS;
use repokit_data::{
    Criteria, DataError, Dialect, GroupCount, IdentifierPolicy, QueryBuilder, Record, Store,
};
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteQueryResult, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

use crate::error::SqlxErrorExt;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// [`Store`] over an SQLite connection pool.
///
/// Writes re-read the affected rows by primary key instead of relying on
/// `RETURNING`, so values come back decoded through the column's declared
/// type. Columns declared `BOOLEAN` decode to JSON booleans.
///
/// Multi-statement operations (update, delete with snapshot) are not wrapped
/// in a transaction.
#[derive(Clone)]
pub struct SqlxStore {
    pool: SqlitePool,
}

impl SqlxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn builder(table: &str, criteria: &Criteria) -> QueryBuilder {
        QueryBuilder::new(table)
            .dialect(Dialect::Sqlite)
            .identifier_policy(IdentifierPolicy::Quote)
            .criteria(criteria)
    }

    async fn fetch(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>, DataError> {
        tracing::trace!(sql, "fetch");
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<SqliteQueryResult, DataError> {
        tracing::trace!(sql, "execute");
        bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(SqlxErrorExt::into_data_error)
    }

    /// First column of the first row, `Null` when there is none.
    async fn scalar(&self, sql: &str, params: Vec<Value>) -> Result<Value, DataError> {
        let rows = self.fetch(sql, params).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Null))
    }

    async fn select_keys(
        &self,
        table: &str,
        primary_key: &str,
        criteria: &Criteria,
    ) -> Result<Vec<Value>, DataError> {
        let (sql, params) = Self::builder(table, criteria).build_select(&[primary_key])?;
        let rows = self.fetch(&sql, params).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(primary_key))
            .collect())
    }

    async fn select_by_keys(
        &self,
        table: &str,
        primary_key: &str,
        keys: Vec<Value>,
    ) -> Result<Vec<Record>, DataError> {
        let criteria = Criteria::new().where_in(primary_key, keys);
        let (sql, params) = Self::builder(table, &criteria).build_select(&["*"])?;
        self.fetch(&sql, params).await
    }
}

fn bind_all(query: SqliteQuery<'_>, params: Vec<Value>) -> SqliteQuery<'_> {
    params.into_iter().fold(query, bind_value)
}

fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s),
        // arrays and objects are stored as JSON text
        other => query.bind(other.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Record, DataError> {
    let mut record = Record::new();
    for column in row.columns() {
        let index = column.ordinal();
        let declared_bool = column.type_info().name().eq_ignore_ascii_case("BOOLEAN");
        let raw = row
            .try_get_raw(index)
            .map_err(SqlxErrorExt::into_data_error)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => {
                    let n: i64 = decode(row, index)?;
                    if declared_bool {
                        Value::Bool(n != 0)
                    } else {
                        Value::from(n)
                    }
                }
                "REAL" | "NUMERIC" => Value::from(decode::<f64>(row, index)?),
                "BLOB" => {
                    let bytes: Vec<u8> = decode(row, index)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(decode(row, index)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode<'r, T>(row: &'r SqliteRow, index: usize) -> Result<T, DataError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get_unchecked(index)
        .map_err(SqlxErrorExt::into_data_error)
}

impl Store for SqlxStore {
    fn insert(
        &self,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> impl Future<Output = Result<Record, DataError>> + Send {
        async move {
            let given_key = record.get(primary_key).filter(|k| !k.is_null()).cloned();
            let (sql, params) = Self::builder(table, &Criteria::new()).build_insert(&record)?;
            let result = self.execute(&sql, params).await?;

            let key = given_key.unwrap_or_else(|| Value::from(result.last_insert_rowid()));
            self.select_by_keys(table, primary_key, vec![key.clone()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    DataError::NotFound(format!("{table} with {primary_key} = {key} after insert"))
                })
        }
    }

    fn select(
        &self,
        table: &str,
        criteria: &Criteria,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send {
        async move {
            let (sql, params) = Self::builder(table, criteria).build_select(columns)?;
            self.fetch(&sql, params).await
        }
    }

    fn update(
        &self,
        table: &str,
        primary_key: &str,
        criteria: &Criteria,
        changes: &Record,
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send {
        async move {
            let keys = self.select_keys(table, primary_key, criteria).await?;
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            // target the matched keys, the changes may touch filtered columns
            let by_key = Criteria::new().where_in(primary_key, keys.iter().cloned());
            let (sql, params) = Self::builder(table, &by_key).build_update(changes)?;
            self.execute(&sql, params).await?;
            self.select_by_keys(table, primary_key, keys).await
        }
    }

    fn delete(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<u64, DataError>> + Send {
        async move {
            let (sql, params) = Self::builder(table, criteria).build_delete()?;
            Ok(self.execute(&sql, params).await?.rows_affected())
        }
    }

    fn count(
        &self,
        table: &str,
        criteria: &Criteria,
        column: Option<&str>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send {
        async move {
            let (sql, params) = Self::builder(table, criteria).build_count(column)?;
            let count = self.scalar(&sql, params).await?;
            Ok(count.as_u64().unwrap_or(0))
        }
    }

    fn sum(
        &self,
        table: &str,
        criteria: &Criteria,
        column: &str,
    ) -> impl Future<Output = Result<f64, DataError>> + Send {
        async move {
            let (sql, params) = Self::builder(table, criteria).build_sum(column)?;
            // SUM over no rows is NULL
            let sum = self.scalar(&sql, params).await?;
            Ok(sum.as_f64().unwrap_or(0.0))
        }
    }

    fn count_group_by(
        &self,
        table: &str,
        criteria: &Criteria,
        select: &[&str],
        group: &[&str],
    ) -> impl Future<Output = Result<Vec<GroupCount>, DataError>> + Send {
        async move {
            let (sql, params) =
                Self::builder(table, criteria).build_count_group_by(select, group)?;
            let rows = self.fetch(&sql, params).await?;
            Ok(rows
                .into_iter()
                .map(|mut key| {
                    let count = key
                        .remove(COUNT_ALIAS)
                        .and_then(|c| c.as_u64())
                        .unwrap_or(0);
                    GroupCount { key, count }
                })
                .collect())
        }
    }
}
