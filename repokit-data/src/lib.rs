//! Data access layer for repokit.
//!
//! A [`GenericRepository`] wraps one [`Entity`] type and delegates every
//! query to a [`Store`]. Filters travel as immutable [`Criteria`] values and
//! deletions are announced on an [`EventBus`](repokit_events::EventBus) as
//! [`EntityDeleted`] events.

pub mod criteria;
pub mod entity;
pub mod error;
pub mod events;
pub mod memory;
pub mod options;
pub mod page;
pub mod query;
pub mod repository;
pub mod store;

pub use criteria::{Condition, Criteria, SortDirection};
pub use entity::{Entity, Lookup, Record, Target, ALL_COLUMNS};
pub use error::DataError;
pub use events::{DeletedSnapshot, EntityDeleted};
pub use memory::{MemoryStore, MemoryStoreError};
pub use options::{CriteriaParams, RepositoryOptions};
pub use page::{Page, Pageable};
pub use query::{Dialect, IdentifierPolicy, QueryBuilder, QueryError};
pub use repository::{GenericRepository, Repository};
pub use store::{GroupCount, Store};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        Criteria, DataError, Entity, GenericRepository, Lookup, Page, Pageable, Repository,
        SortDirection, Store, Target, ALL_COLUMNS,
    };
}
