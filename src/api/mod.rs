use serde::Serialize;

/// Paging information attached to search responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageInfo {
    pub page: i32,
    pub size: i32,
    pub total_elements: i64,
    pub total_pages: i32,
    pub last_page: bool,
}

impl PageInfo {
    pub fn new(page: i32, size: i32, total_elements: i64) -> Self {
        let total_pages = if size > 0 {
            ((total_elements + size as i64 - 1) / size as i64) as i32
        } else {
            0
        };
        let last_page = page >= total_pages - 1;
        Self { page, size, total_elements, total_pages, last_page }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let info = PageInfo::new(0, 20, 45);
        assert_eq!(info.total_pages, 3);
        assert!(!info.last_page);

        let info = PageInfo::new(2, 20, 45);
        assert!(info.last_page);
    }

    #[test]
    fn exact_multiple_has_no_partial_page() {
        let info = PageInfo::new(1, 20, 40);
        assert_eq!(info.total_pages, 2);
        assert!(info.last_page);
    }

    #[test]
    fn empty_result_is_last_page() {
        let info = PageInfo::new(0, 20, 0);
        assert_eq!(info.total_pages, 0);
        assert!(info.last_page);
    }
}
