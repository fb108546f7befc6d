//! Client-side pagination over the held history set.

pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;

/// Number of pages needed for `count` items. Never less than 1.
pub fn total_pages(count: usize, per_page: usize) -> usize {
    let per_page = per_page.max(1);
    count.div_ceil(per_page).max(1)
}

/// The slice of `items` shown on 1-based `page`.
pub fn page_window<T>(items: &[T], page: usize, per_page: usize) -> &[T] {
    let per_page = per_page.max(1);
    let start = page.saturating_sub(1).saturating_mul(per_page).min(items.len());
    let end = start.saturating_add(per_page).min(items.len());
    &items[start..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    pub current_page: usize,
    pub items_per_page: usize,
    pub total_pages: usize,
}

impl PageState {
    pub fn new(items_per_page: usize) -> Self {
        let items_per_page = if items_per_page == 0 {
            DEFAULT_ITEMS_PER_PAGE
        } else {
            items_per_page
        };
        Self {
            current_page: 1,
            items_per_page,
            total_pages: 1,
        }
    }

    /// Recompute page count after the item count changed, keeping the
    /// current page in range.
    pub fn recompute(&mut self, count: usize) {
        self.total_pages = total_pages(count, self.items_per_page);
        self.current_page = self.current_page.clamp(1, self.total_pages);
    }

    /// Move to `page` if it exists. Returns false (and changes nothing) otherwise.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page < 1 || page > self.total_pages {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn reset(&mut self) {
        self.current_page = 1;
    }

    pub fn window<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        page_window(items, self.current_page, self.items_per_page)
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(DEFAULT_ITEMS_PER_PAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(23, 10), 3);
    }

    #[test]
    fn test_23_records_last_page_has_3() {
        let items: Vec<u32> = (0..23).collect();
        let mut state = PageState::new(10);
        state.recompute(items.len());

        assert_eq!(state.total_pages, 3);
        assert!(state.go_to(3));
        assert_eq!(state.window(&items), &[20, 21, 22]);
    }

    #[test]
    fn test_slice_lengths() {
        for count in 0..57usize {
            let items: Vec<usize> = (0..count).collect();
            let pages = total_pages(count, 10);
            for page in 1..=pages {
                let window = page_window(&items, page, 10);
                assert!(window.len() <= 10);
                if page == pages {
                    assert_eq!(window.len(), count - (pages - 1) * 10);
                }
            }
        }
    }

    #[test]
    fn test_go_to_out_of_range_is_noop() {
        let mut state = PageState::new(10);
        state.recompute(23);
        assert!(state.go_to(2));

        assert!(!state.go_to(0));
        assert!(!state.go_to(4));
        assert!(!state.go_to(usize::MAX));
        assert_eq!(state.current_page, 2);
    }

    #[test]
    fn test_recompute_clamps_current_page() {
        let mut state = PageState::new(10);
        state.recompute(30);
        assert!(state.go_to(3));

        state.recompute(12);
        assert_eq!(state.total_pages, 2);
        assert_eq!(state.current_page, 2);

        state.recompute(0);
        assert_eq!(state.total_pages, 1);
        assert_eq!(state.current_page, 1);
    }

    #[test]
    fn test_zero_page_size_falls_back_to_default() {
        let state = PageState::new(0);
        assert_eq!(state.items_per_page, DEFAULT_ITEMS_PER_PAGE);
    }

    #[test]
    fn test_window_past_end_is_empty() {
        let items = [1, 2, 3];
        assert!(page_window(&items, 5, 10).is_empty());
    }
}
