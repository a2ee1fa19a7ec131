use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Page/limit pair as sent by callers. Zero or missing values fall back to
/// the defaults; a limit above `MAX_LIMIT` is rejected by `normalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn normalize(self) -> Result<Self, String> {
        let page = if self.page == 0 { DEFAULT_PAGE } else { self.page };
        let limit = if self.limit == 0 { DEFAULT_LIMIT } else { self.limit };
        if limit > MAX_LIMIT {
            return Err(format!("limit must be at most {}", MAX_LIMIT));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageMeta {
    pub fn calculate(request: PageRequest, total: u64) -> Self {
        let limit = u64::from(request.limit.max(1));
        let total_pages = total.div_ceil(limit).max(1) as u32;
        let current_page = request.page.max(1);

        Self {
            current_page,
            total_pages,
            has_next: current_page < total_pages,
            has_previous: current_page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            meta: PageMeta::calculate(request, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_limit_cap() {
        let req = PageRequest::default().normalize().unwrap();
        assert_eq!(req, PageRequest::new(1, 10));
        assert!(PageRequest::new(1, 101).normalize().is_err());
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn test_meta() {
        let meta = PageMeta::calculate(PageRequest::new(2, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_previous);

        let empty = PageMeta::calculate(PageRequest::new(1, 10), 0);
        assert_eq!(empty.total_pages, 1);
        assert!(!empty.has_next);
        assert!(!empty.has_previous);
    }
}
