//! # repokit-data-sqlx: SQLx backend for the repokit data layer
//!
//! [`SqlxStore`] implements [`Store`](repokit_data::Store) over an
//! `sqlx::SqlitePool`. SQL is rendered by [`QueryBuilder`](repokit_data::QueryBuilder)
//! with the SQLite dialect and quoted identifiers; JSON values are bound as
//! parameters and rows are decoded back into records column by column.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxStore`] | `Store` implementation holding a `SqlitePool` |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` into `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! ```ignore
//! use repokit_data::{GenericRepository, Repository, ALL_COLUMNS};
//! use repokit_data_sqlx::SqlxStore;
//!
//! let pool = SqlitePool::connect("sqlite::memory:").await?;
//! let repo = GenericRepository::<User, _, _>::new(SqlxStore::new(pool), bus);
//! let user = repo.find_by_id("jane-doe", ALL_COLUMNS).await?;
//! ```
//!
//! # Error bridging
//!
//! Driver errors surface as [`DataError::Database`](repokit_data::DataError::Database)
//! except `RowNotFound`, which becomes `DataError::NotFound`.

pub mod error;
#[cfg(feature = "sqlite")]
pub mod store;

pub use error::{SqlxErrorExt, SqlxResult};
#[cfg(feature = "sqlite")]
pub use store::SqlxStore;

/// Re-exports of the most commonly used types from both `repokit-data` and this crate.
pub mod prelude {
    pub use crate::SqlxErrorExt;
    #[cfg(feature = "sqlite")]
    pub use crate::SqlxStore;
    pub use repokit_data::prelude::*;
}
