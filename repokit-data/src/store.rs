use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::criteria::Criteria;
use crate::entity::Record;
use crate::error::DataError;

/// One row of a grouped count: the selected column values and how many rows
/// fell into the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: Record,
    pub count: u64,
}

/// Persistence capability behind a repository.
///
/// Stores speak in [`Record`]s and receive every filter as an explicit
/// [`Criteria`]; they hold no per-query state. Errors from the backend are
/// returned as [`DataError::Database`] without translation.
///
/// Uses RPITIT (return-position `impl Trait` in traits), so stores are used
/// through generics rather than trait objects.
pub trait Store: Send + Sync {
    /// Insert a record and return it as stored, including a generated key
    /// when the record did not carry one.
    fn insert(
        &self,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> impl Future<Output = Result<Record, DataError>> + Send;

    /// Rows matched by `criteria`, projected onto `columns` (`["*"]` for all).
    fn select(
        &self,
        table: &str,
        criteria: &Criteria,
        columns: &[&str],
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send;

    /// Apply `changes` to every matched row; returns the updated rows.
    fn update(
        &self,
        table: &str,
        primary_key: &str,
        criteria: &Criteria,
        changes: &Record,
    ) -> impl Future<Output = Result<Vec<Record>, DataError>> + Send;

    /// Delete every matched row; returns how many were removed.
    fn delete(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Count matched rows, or the non-null values of `column`.
    fn count(
        &self,
        table: &str,
        criteria: &Criteria,
        column: Option<&str>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    /// Sum `column` over matched rows; `0` when nothing matches.
    fn sum(
        &self,
        table: &str,
        criteria: &Criteria,
        column: &str,
    ) -> impl Future<Output = Result<f64, DataError>> + Send;

    /// Group matched rows by `group`, ordered by count descending then by the
    /// group columns ascending.
    fn count_group_by(
        &self,
        table: &str,
        criteria: &Criteria,
        select: &[&str],
        group: &[&str],
    ) -> impl Future<Output = Result<Vec<GroupCount>, DataError>> + Send;
}
