//! repokit: a generic repository layer.
//!
//! This facade crate re-exports the repokit sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use repokit::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature     | Default | Crate                        |
//! |-------------|---------|------------------------------|
//! | `events`    | **yes** | `repokit-events`             |
//! | `data`      | **yes** | `repokit-data`               |
//! | `data-sqlx` | no      | `repokit-data-sqlx`          |
//! | `sqlite`    | no      | `repokit-data-sqlx/sqlite`   |
//! | `full`      | no      | All of the above             |

pub extern crate repokit_core;

// Re-export everything from repokit-core at the top level for convenience.
pub use repokit_core::*;

#[cfg(feature = "events")]
pub use repokit_events;

#[cfg(feature = "data")]
pub use repokit_data;

#[cfg(feature = "data-sqlx")]
pub use repokit_data_sqlx;

/// Build a repository for one request: reads [`RepositoryOptions`] from
/// `config` and seeds the request's default sort.
///
/// [`RepositoryOptions`]: repokit_data::RepositoryOptions
#[cfg(feature = "data")]
pub fn repository_for<T, S, B>(
    store: S,
    events: B,
    config: &RepoConfig,
    query: Option<&str>,
) -> Result<repokit_data::GenericRepository<T, S, B>, ConfigError>
where
    T: repokit_data::Entity,
    S: repokit_data::Store,
    B: repokit_events::EventBus,
{
    let options: repokit_data::RepositoryOptions = config.section()?;
    Ok(repokit_data::GenericRepository::for_request(
        store,
        events,
        RequestParams::from_query(query),
        options,
    ))
}

/// Unified prelude: import everything with `use repokit::prelude::*`.
///
/// Includes the core prelude plus types from all enabled feature crates.
pub mod prelude {
    pub use repokit_core::prelude::*;

    #[cfg(feature = "data")]
    pub use crate::repository_for;

    #[cfg(feature = "data")]
    pub use repokit_data::prelude::*;

    #[cfg(feature = "data")]
    pub use repokit_data::{MemoryStore, RepositoryOptions};

    #[cfg(feature = "data-sqlx")]
    pub use repokit_data_sqlx::prelude::*;

    #[cfg(feature = "events")]
    pub use repokit_events::prelude::*;
}
