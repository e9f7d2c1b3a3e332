use repokit_core::config::{ConfigError, ConfigProperties, RepoConfig};
use repokit_core::RequestParams;

use crate::criteria::{Criteria, SortDirection};
use crate::query::is_valid_identifier;

/// Names of the request parameters carrying the sort column and direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaParams {
    pub order_by: String,
    pub sorted_by: String,
}

impl Default for CriteriaParams {
    fn default() -> Self {
        Self {
            order_by: "orderBy".to_string(),
            sorted_by: "sortedBy".to_string(),
        }
    }
}

/// Per-repository request handling: parameter names plus the default sort
/// injected into requests that do not specify one.
///
/// Readable from configuration:
///
/// ```yaml
/// repository:
///   criteria:
///     params:
///       orderBy: orderBy
///       sortedBy: sortedBy
///   default:
///     orderBy: created_at
///     sortedBy: desc
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryOptions {
    pub params: CriteriaParams,
    pub default_order_by: Option<String>,
    pub default_sorted_by: Option<SortDirection>,
}

impl RepositoryOptions {
    pub fn with_default_sort(mut self, column: &str, direction: SortDirection) -> Self {
        self.default_order_by = Some(column.to_string());
        self.default_sorted_by = Some(direction);
        self
    }

    pub fn with_default_order_by(mut self, column: &str) -> Self {
        self.default_order_by = Some(column.to_string());
        self
    }

    pub fn with_params(mut self, order_by: &str, sorted_by: &str) -> Self {
        self.params = CriteriaParams {
            order_by: order_by.to_string(),
            sorted_by: sorted_by.to_string(),
        };
        self
    }

    /// Inject the default sort into `request`.
    ///
    /// The order field is added only when the request has none. The direction
    /// is added only when the request has none, an order field is present
    /// (given or just injected), and a default direction exists.
    pub fn seed(&self, request: &mut RequestParams) {
        if !request.has(&self.params.order_by) {
            if let Some(column) = &self.default_order_by {
                request.add(self.params.order_by.clone(), column.clone());
            }
        }

        if !request.has(&self.params.sorted_by) && request.has(&self.params.order_by) {
            if let Some(direction) = self.default_sorted_by {
                request.add(self.params.sorted_by.clone(), direction.as_str());
            }
        }
    }

    /// Ordering requested by `request`, ascending unless the direction
    /// parameter says `desc`. A sort column that is not a plain identifier is
    /// ignored.
    pub fn request_criteria(&self, request: &RequestParams) -> Criteria {
        let Some(column) = request.get(&self.params.order_by).filter(|c| !c.is_empty()) else {
            return Criteria::new();
        };
        if !is_valid_identifier(column, false) {
            tracing::warn!(column, "ignoring invalid sort column from request");
            return Criteria::new();
        }
        let direction = request
            .get(&self.params.sorted_by)
            .and_then(SortDirection::parse)
            .unwrap_or_default();
        Criteria::new().order_by(column, direction)
    }
}

impl ConfigProperties for RepositoryOptions {
    fn prefix() -> &'static str {
        "repository"
    }

    fn from_config(config: &RepoConfig) -> Result<Self, ConfigError> {
        let defaults = CriteriaParams::default();
        let sorted_by: Option<String> = config.get_or("repository.default.sortedBy", None);
        let default_sorted_by = match sorted_by {
            None => None,
            Some(raw) => Some(SortDirection::parse(&raw).ok_or_else(|| {
                ConfigError::TypeMismatch {
                    key: "repository.default.sortedBy".to_string(),
                    expected: "asc | desc",
                }
            })?),
        };
        Ok(Self {
            params: CriteriaParams {
                order_by: config.get_or("repository.criteria.params.orderBy", defaults.order_by),
                sorted_by: config.get_or("repository.criteria.params.sortedBy", defaults.sorted_by),
            },
            default_order_by: config.get_or("repository.default.orderBy", None),
            default_sorted_by,
        })
    }
}
