//! `findWithPagination` contract types (spec §4.2, §8 boundary behaviors).

use serde::Serialize;

use crate::filter::Filter;

pub const MAX_PAGE_LIMIT: u64 = 200;

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<Filter>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PaginationOptions {
    pub page: u64,
    pub limit: u64,
    pub sort: Option<Filter>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

impl<T> PaginatedResult<T> {
    #[must_use]
    pub fn new(data: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            data,
            total,
            page,
            limit,
            pages,
        }
    }
}
