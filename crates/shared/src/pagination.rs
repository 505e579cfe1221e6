//! Offset-based pagination utilities.

use serde::Serialize;

/// A normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl PageRequest {
    /// Builds a page request from optional query values.
    ///
    /// Missing or non-positive limits fall back to `default_limit`; limits
    /// above `max_limit` are clamped. Negative offsets become zero.
    pub fn normalize(
        limit: Option<i64>,
        offset: Option<i64>,
        default_limit: i64,
        max_limit: i64,
    ) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(max_limit),
            _ => default_limit,
        };
        let offset = offset.unwrap_or(0).max(0);
        Self { limit, offset }
    }

    /// Describes this page given the total number of matching rows.
    pub fn info(&self, total: i64) -> PageInfo {
        PageInfo {
            total,
            limit: self.limit,
            offset: self.offset,
            has_more: self.offset + self.limit < total,
        }
    }
}

/// Pagination block returned alongside list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}
