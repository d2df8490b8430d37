use serde::{Deserialize, Serialize};

use super::Event;
use crate::error::{AppError, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query string of the list endpoint. Both fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// A validated, 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn validate(&self) -> Result<Page> {
        let page = self.page.unwrap_or(1);
        let size = self.size.unwrap_or(i64::from(DEFAULT_PAGE_SIZE));

        if page < 1 || page > i64::from(u32::MAX) {
            return Err(AppError::Validation("page must be >= 1".to_string()));
        }
        if size < 1 || size > i64::from(MAX_PAGE_SIZE) {
            return Err(AppError::Validation(format!(
                "size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        Ok(Page {
            page: page as u32,
            size: size as u32,
        })
    }
}

/// One page of events, newest sequence first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginatedEvents {
    pub events: Vec<Event>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u64,
    pub has_next: bool,
}

impl PaginatedEvents {
    pub fn new(events: Vec<Event>, total: u64, page: Page) -> Self {
        let total_pages = total.div_ceil(u64::from(page.size));
        Self {
            events,
            total,
            page: page.page,
            size: page.size,
            total_pages,
            has_next: u64::from(page.page) < total_pages,
        }
    }
}
