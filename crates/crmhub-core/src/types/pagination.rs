//! Page-at-a-time listings.
//!
//! The response mirrors the paginator payload CRM listing screens consume
//! (`current_page`, `per_page`, `last_page`, `from`, `to`).

use serde::{Deserialize, Serialize};

const DEFAULT_PER_PAGE: u64 = 25;
const MAX_PER_PAGE: u64 = 100;

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default = "default_per_page", alias = "page_size")]
    pub per_page: u64,
}

impl PageRequest {
    /// Out-of-range values are pulled back to page 1 and `1..=100` rows.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

/// One page of rows plus the position of the page in the full listing.
#[derive(Debug, Clone, Serialize)]
pub struct PageResponse<T: Serialize> {
    pub data: Vec<T>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    /// 1-based position of the first row on the page; `None` when empty.
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl<T: Serialize> PageResponse<T> {
    pub fn new(data: Vec<T>, page: &PageRequest, total: u64) -> Self {
        let last_page = total.div_ceil(page.per_page).max(1);
        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = page.offset() + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };
        Self {
            data,
            current_page: page.page,
            per_page: page.per_page,
            total,
            last_page,
            from,
            to,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page
    }
}

fn first_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    DEFAULT_PER_PAGE
}
