use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: i64 = 5;
pub const MAX_PER_PAGE: i64 = 100;

/// Page navigation metadata returned alongside list results.
///
/// `from` and `to` are 1-based inclusive bounds of the rows on the page;
/// both are 0 when the page holds no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: i64,
    pub per_page: i64,
    pub current_page: i64,
    pub last_page: i64,
    pub from: i64,
    pub to: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: PageRequest) -> Self {
        let PageRequest { page, per_page } = page;
        let last_page = (total + per_page - 1) / per_page;
        let offset = page.offset_for(per_page);
        let (from, to) = if offset < total {
            (offset + 1, (offset + per_page).min(total))
        } else {
            (0, 0)
        };
        Self {
            total,
            per_page,
            current_page: page.get(),
            last_page,
            from,
            to,
        }
    }
}

/// 1-based page number; anything below 1 is read as the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(i64);

impl PageNumber {
    pub fn new(n: i64) -> Self {
        Self(n.max(1))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    fn offset_for(self, per_page: i64) -> i64 {
        (self.0 - 1).saturating_mul(per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: PageNumber,
    per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: PageNumber::new(page.unwrap_or(1)),
            per_page: per_page
                .unwrap_or(DEFAULT_PER_PAGE)
                .clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        self.page.offset_for(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of rows plus its navigation metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}
