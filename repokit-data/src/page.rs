use repokit_core::RequestParams;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u64 = 20;

/// Pagination parameters. `page` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pageable {
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub size: u64,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pageable {
    pub fn new(page: u64, size: u64) -> Self {
        Self { page, size }
    }

    /// Read `page` and `size` from request parameters; malformed or missing
    /// values fall back to the defaults.
    pub fn from_request(params: &RequestParams) -> Self {
        let defaults = Self::default();
        Self {
            page: params
                .get("page")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.page),
            size: params
                .get("size")
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.size),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let total_pages = if pageable.size == 0 {
            0
        } else {
            total_elements.div_ceil(pageable.size)
        };
        Self {
            content,
            page: pageable.page,
            size: pageable.size,
            total_elements,
            total_pages,
        }
    }
}
