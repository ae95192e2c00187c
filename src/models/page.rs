use serde::{Deserialize, Serialize};

/// Default page size when the client does not ask for one.
pub const DEFAULT_LIMIT: u32 = 10;
/// Largest page a client may request.
pub const MAX_LIMIT: u32 = 100;

/// A 1-based page request, already clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_inputs() {
        let request = PageRequest::new(Some(0), Some(10_000));
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, MAX_LIMIT);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
        assert_eq!(PageRequest::default().limit, DEFAULT_LIMIT);
    }
}
