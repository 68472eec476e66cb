//! Turning the size and offset arguments into byte counts.

use crate::error::ParseError;

pub const HUGE_PAGE_SHIFT: u32 = 30;

/// Size of the only huge page this crate maps with: 1 GiB.
pub const HUGE_PAGE_SIZE: usize = 1 << HUGE_PAGE_SHIFT;

/// Parses a size or offset argument.
///
/// `text` must be one or more ASCII digits. With `auto_fill_from_file_size`
/// set, a value of `0` stands for `file_size`, and the result is rounded
/// down to a multiple of `huge_page_size`. Without it the parsed value is
/// returned as is. No upper bound is applied here.
///
/// # Panics
///
/// If `auto_fill_from_file_size` is set and `huge_page_size` is zero.
pub fn parse(
    text: &str,
    argument: &'static str,
    auto_fill_from_file_size: bool,
    file_size: usize,
    huge_page_size: usize,
) -> Result<usize, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        argument,
        text: text.to_owned(),
    };

    // `usize::from_str` would also take a leading '+'
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let mut value: usize = text.parse().map_err(|_| invalid())?;

    if auto_fill_from_file_size {
        if value == 0 {
            value = file_size;
        }
        value -= value % huge_page_size;
    }
    Ok(value)
}

/// Mapping size and offset derived from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub size: usize,
    pub offset: usize,
}

impl SizeSpec {
    /// Size is auto-filled and rounded; offset is taken verbatim.
    pub fn derive(
        size_text: &str,
        offset_text: &str,
        file_size: usize,
        huge_page_size: usize,
    ) -> Result<Self, ParseError> {
        let size = parse(size_text, "mmap-size", true, file_size, huge_page_size)?;
        let offset = parse(offset_text, "mmap-offset", false, file_size, huge_page_size)?;
        Ok(Self { size, offset })
    }
}
