use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw `page` / `page_size` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Falls back to the number of returned rows when the store reports no count.
    pub fn new(items: Vec<T>, params: PageParams, total: Option<u64>) -> Self {
        let total = total.unwrap_or(items.len() as u64);
        Self {
            items,
            page: params.page(),
            page_size: params.page_size(),
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_caps() {
        let params = PageParams::default();
        assert_eq!((params.page(), params.page_size(), params.offset()), (1, 20, 0));

        let params = PageParams { page: Some(3), page_size: Some(500) };
        assert_eq!(params.page_size(), MAX_PAGE_SIZE);
        assert_eq!(params.offset(), 200);

        let params = PageParams { page: Some(0), page_size: Some(0) };
        assert_eq!((params.page(), params.page_size()), (1, 1));
    }
}
