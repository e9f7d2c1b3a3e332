pub mod config;
pub mod layers;
pub mod request;

pub use config::{ConfigError, ConfigProperties, ConfigValue, FromConfigValue, RepoConfig};
pub use layers::init_tracing;
pub use request::RequestParams;

pub mod prelude {
    //! Re-exports of the most commonly used core types.
    pub use crate::{ConfigProperties, RepoConfig, RequestParams};
}
