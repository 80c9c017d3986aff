//! Page blob data models.

use crate::error::{StorageError, StorageResult};

/// Page blob constants.
pub const PAGE_SIZE: u64 = 512;

/// A range of pages in a page blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    /// Start byte offset (inclusive).
    pub start: u64,
    /// End byte offset (inclusive).
    pub end: u64,
}

impl PageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Returns the length of this page range.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Valid and cleared page ranges of a page blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageList {
    pub page_ranges: Vec<PageRange>,
    pub clear_ranges: Vec<PageRange>,
}

/// Rejects offsets and lengths that are not page-aligned.
pub fn validate_page_range(offset: u64, length: u64) -> StorageResult<()> {
    if offset % PAGE_SIZE != 0 {
        return Err(StorageError::invalid_argument(format!(
            "page offset {} is not a multiple of {}",
            offset, PAGE_SIZE
        )));
    }
    if length == 0 || length % PAGE_SIZE != 0 {
        return Err(StorageError::invalid_argument(format!(
            "page length {} is not a positive multiple of {}",
            length, PAGE_SIZE
        )));
    }
    Ok(())
}
