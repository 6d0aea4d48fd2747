use serde::Serialize;

pub const PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Number of pages for `total_items`; an empty result still has one page.
    pub fn page_count(total_items: usize, page_size: usize) -> usize {
        total_items.div_ceil(page_size).max(1)
    }

    /// Clamps a requested page into `1..=page_count`.
    pub fn clamp(requested: usize, total_items: usize, page_size: usize) -> usize {
        requested.clamp(1, Self::page_count(total_items, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_counts_round_up() {
        assert_eq!(Page::<()>::page_count(0, PAGE_SIZE), 1);
        assert_eq!(Page::<()>::page_count(12, PAGE_SIZE), 1);
        assert_eq!(Page::<()>::page_count(13, PAGE_SIZE), 2);
    }

    #[test]
    fn requested_page_is_clamped() {
        assert_eq!(Page::<()>::clamp(0, 30, PAGE_SIZE), 1);
        assert_eq!(Page::<()>::clamp(9, 30, PAGE_SIZE), 3);
        assert_eq!(Page::<()>::clamp(2, 30, PAGE_SIZE), 2);
    }
}
