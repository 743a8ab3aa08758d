// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::ops::Range;

/// Number of pages needed to show `total` rows; an empty list still has one page.
pub const fn page_count(total: usize, per_page: usize) -> usize {
    if per_page == 0 || total == 0 {
        return 1;
    }
    total.div_ceil(per_page)
}

pub const fn clamp_page(page: usize, total: usize, per_page: usize) -> usize {
    let last = page_count(total, per_page) - 1;
    if page > last { last } else { page }
}

/// Row indices shown on a zero-based `page`.
pub fn page_range(page: usize, total: usize, per_page: usize) -> Range<usize> {
    if per_page == 0 {
        return 0..total;
    }
    let page = clamp_page(page, total, per_page);
    let start = (page * per_page).min(total);
    let end = (start + per_page).min(total);
    start..end
}
