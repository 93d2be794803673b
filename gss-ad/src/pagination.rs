//! Paging of the respondent review table

/// Rows per page of the respondent list
pub const PAGE_SIZE: i64 = 100;

/// One page window over `total_rows` respondents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-indexed, always within `1..=total_pages.max(1)`
    pub number: i64,
    pub total_pages: i64,
    pub offset: i64,
}

impl Page {
    /// Clamp a requested page number into the available range
    ///
    /// ```
    /// use gss_ad::pagination::Page;
    ///
    /// // 250 respondents span 3 pages; asking past the end lands on the last
    /// let page = Page::clamp(250, 99);
    /// assert_eq!((page.number, page.total_pages, page.offset), (3, 3, 200));
    /// ```
    pub fn clamp(total_rows: i64, requested: i64) -> Self {
        let total_pages = (total_rows.max(0) + PAGE_SIZE - 1) / PAGE_SIZE;
        let number = requested.clamp(1, total_pages.max(1));
        Self {
            number,
            total_pages,
            offset: (number - 1) * PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_page() {
        assert_eq!(
            Page::clamp(250, 2),
            Page {
                number: 2,
                total_pages: 3,
                offset: 100
            }
        );
    }

    #[test]
    fn test_requests_outside_range_are_clamped() {
        assert_eq!(Page::clamp(150, 0).number, 1);
        assert_eq!(Page::clamp(150, -4).offset, 0);
        assert_eq!(Page::clamp(150, 7).number, 2);
    }

    #[test]
    fn test_no_respondents_yet() {
        let page = Page::clamp(0, 3);
        assert_eq!((page.number, page.total_pages, page.offset), (1, 0, 0));
    }

    #[test]
    fn test_full_last_page() {
        assert_eq!(Page::clamp(200, 5).total_pages, 2);
        assert_eq!(Page::clamp(201, 5).total_pages, 3);
    }
}
