//! Page iteration over linear address ranges
//!
//! XDATA is reached through 256-byte windows, flash is programmed in
//! page-sized chunks and erased in sectors. All of them split a
//! `(start, len)` request the same way.

/// One page-aligned piece of a larger request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// Page number (`address / page_size`)
    pub page: u32,
    /// Offset of the first byte within the page
    pub offset: u32,
    /// Number of bytes of the request inside this page
    pub len: usize,
    /// Offset of this piece within the caller's buffer
    pub buf_offset: usize,
}

impl PageSpan {
    /// Absolute address of the first byte of this piece
    pub fn address(&self, page_size: u32) -> u32 {
        self.page * page_size + self.offset
    }
}

/// Iterator over the pages touched by a request
#[derive(Debug, Clone)]
pub struct Pages {
    next: u32,
    remaining: usize,
    done: usize,
    page_size: u32,
}

impl Iterator for Pages {
    type Item = PageSpan;

    fn next(&mut self) -> Option<PageSpan> {
        if self.remaining == 0 {
            return None;
        }
        let offset = self.next % self.page_size;
        let room = (self.page_size - offset) as usize;
        let len = room.min(self.remaining);
        let span = PageSpan {
            page: self.next / self.page_size,
            offset,
            len,
            buf_offset: self.done,
        };
        self.next += len as u32;
        self.remaining -= len;
        self.done += len;
        Some(span)
    }
}

/// Split `[start, start + len)` into per-page pieces
///
/// `page_size` must be non-zero.
pub fn pages(start: u32, len: usize, page_size: u32) -> Pages {
    debug_assert!(page_size > 0);
    Pages {
        next: start,
        remaining: len,
        done: 0,
        page_size,
    }
}

/// Inclusive range of sector numbers spanned by `[start, start + len)`
pub fn sector_range(start: u32, len: usize, sector_size: u32) -> core::ops::RangeInclusive<u32> {
    let first = start / sector_size;
    let last = (start + len.saturating_sub(1) as u32) / sector_size;
    first..=last
}
