//! Read-only file descriptor ownership.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use log::debug;
use rustix::fs::{open, Mode, OFlags};

use crate::error::OsError;

/// A file opened read-only for mapping.
///
/// The descriptor is closed exactly once, when the handle is dropped. A
/// failed [`open`](Self::open) never produces a handle, so there is nothing
/// to close in that case.
#[derive(Debug)]
pub struct FileHandle {
    fd: OwnedFd,
    path: PathBuf,
}

impl FileHandle {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OsError> {
        let path = path.as_ref();
        // O_LARGEFILE is zero on most 64-bit targets; spelled out for the others
        let flags = OFlags::RDONLY
            | OFlags::CLOEXEC
            | OFlags::from_bits_retain(libc::O_LARGEFILE as u32);
        let fd = open(path, flags, Mode::empty())
            .map_err(|errno| OsError::new("open", path, errno))?;
        debug!("opened {} as fd {}", path.display(), fd.as_raw_fd());
        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Descriptor number, for diagnostics only.
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        // `OwnedFd` closes the descriptor right after this
        debug!("closing fd {} ({})", self.fd.as_raw_fd(), self.path.display());
    }
}

/// Whether `fd` is open and refers to the file at `path`.
///
/// Comparing device and inode keeps this correct when another thread has
/// already been handed the same descriptor number.
#[cfg(test)]
pub(crate) fn fd_refers_to(fd: RawFd, path: &Path) -> bool {
    let Ok(expected) = rustix::fs::stat(path) else {
        return false;
    };
    // SAFETY: an all-zero `stat` is a valid value for the kernel to overwrite
    let mut actual: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fstat only writes into `actual` and fails with EBADF on a closed fd
    if unsafe { libc::fstat(fd, &mut actual) } != 0 {
        return false;
    }
    actual.st_dev as u64 == expected.st_dev as u64 && actual.st_ino as u64 == expected.st_ino as u64
}
