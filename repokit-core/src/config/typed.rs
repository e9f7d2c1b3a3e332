use super::{ConfigError, RepoConfig};

/// Trait for strongly-typed configuration sections.
///
/// ```ignore
/// impl ConfigProperties for PoolSettings {
///     fn prefix() -> &'static str { "database.pool" }
///
///     fn from_config(config: &RepoConfig) -> Result<Self, ConfigError> {
///         Ok(PoolSettings {
///             size: config.get_or("database.pool.size", 10),
///         })
///     }
/// }
/// ```
pub trait ConfigProperties: Sized {
    /// The configuration key prefix (e.g., `"repository"`).
    fn prefix() -> &'static str;

    /// Construct from a `RepoConfig` instance.
    fn from_config(config: &RepoConfig) -> Result<Self, ConfigError>;
}
