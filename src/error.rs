//! Error kinds raised while preparing, mapping and scanning a huge-page file.

use std::error::Error as StdError;
use std::io;
use std::path::{Path, PathBuf};

use rustix::io::Errno;
use thiserror::Error;

/// A numeric command-line argument could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Empty text, anything other than ASCII digits, or a value that overflows `usize`.
    #[error("invalid {argument}: {text:?}")]
    InvalidNumber {
        argument: &'static str,
        text: String,
    },
}

/// The file or the requested window cannot be mapped with huge pages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{} is empty and cannot be memory-mapped", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("file is not large enough to use 1GB huge tlb: {} holds {size} bytes", .path.display())]
    TooSmallForHugePages { path: PathBuf, size: u64 },

    #[error("{} is not a regular file", .path.display())]
    NotRegularFile { path: PathBuf },

    #[error("mmap size {size} is not a positive multiple of the {page_size} byte huge page")]
    SizeNotHugePageMultiple { size: usize, page_size: usize },

    #[error("mmap offset {offset} is not aligned to the {page_size} byte huge page")]
    UnalignedOffset { offset: usize, page_size: usize },

    #[error(
        "mapping {size} bytes at offset {offset} runs past the end of {} ({file_size} bytes)",
        .path.display()
    )]
    RangeExceedsFile {
        path: PathBuf,
        size: usize,
        offset: usize,
        file_size: u64,
    },
}

/// A system call failed.
///
/// The code is taken from the call's own return value, so nothing between
/// the failure and this error can overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error calling {op}(...) on {}: {errno}", .path.display())]
pub struct OsError {
    op: &'static str,
    path: PathBuf,
    errno: Errno,
}

impl OsError {
    pub(crate) fn new(op: &'static str, path: &Path, errno: Errno) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            errno,
        }
    }

    /// Name of the failing call, e.g. `"open"` or `"mmap"`.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn errno(&self) -> Errno {
        self.errno
    }

    /// Raw platform error code.
    pub fn code(&self) -> i32 {
        self.errno.raw_os_error()
    }

    /// Human-readable description of [`code`](Self::code).
    pub fn message(&self) -> String {
        io::Error::from_raw_os_error(self.code()).to_string()
    }
}

/// Any failure of a scan run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Os(#[from] OsError),

    #[error("unexpected failure: {0}")]
    Unknown(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl Error {
    pub(crate) fn unknown(message: impl Into<String>) -> Self {
        Error::Unknown(message.into().into())
    }
}

/// Failing to write diagnostics is not one of the expected failure modes.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Unknown(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
