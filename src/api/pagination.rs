use serde::Deserialize;

/// Page selection from the query string.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// Resolved pagination: 1-based page, page size, and row offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginate {
    pub page: u64,
    pub size: u64,
    pub from: u64,
}

impl Paginate {
    pub fn new(query: &PageQuery) -> Self {
        let page = query.page.unwrap_or(1);
        let size = query.page_size.unwrap_or(10);
        let from = if page > 0 { (page - 1) * size } else { 0 };

        Self { page, size, from }
    }
}
