//! Store pagination primitives.
//!
//! Page numbers are 1-based; out-of-range requests are clamped rather than
//! rejected so callers never have to special-case bad input.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 10;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    /// Clamps `number` and `size` to at least 1 / the default size.
    pub fn new(number: u32, size: u32) -> Self {
        Page {
            number: number.max(1),
            size: if size > 0 { size } else { DEFAULT_PAGE_SIZE },
        }
    }

    pub fn first(size: u32) -> Self {
        Page::new(1, size)
    }

    /// All rows in one request, for internal full scans.
    pub fn all() -> Self {
        Page::new(1, u32::MAX)
    }

    pub fn next(self) -> Self {
        Page {
            number: self.number + 1,
            ..self
        }
    }

    /// Offset of the first row of this page.
    pub fn offset(&self) -> usize {
        (self.number as usize - 1).saturating_mul(self.size as usize)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::first(DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the total row count behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> PageOf<T> {
    pub fn empty() -> Self {
        PageOf {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Total number of pages at the given page size, at least 1.
    pub fn total_pages(&self, size: u32) -> u64 {
        let size = size.max(1) as u64;
        self.total.div_ceil(size).max(1)
    }
}
