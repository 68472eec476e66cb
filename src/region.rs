//! Private, read-only huge-page mappings.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::slice;

use log::{debug, warn};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};

use crate::error::{Error, OsError, Result};
use crate::fd::FileHandle;
use crate::size::HUGE_PAGE_SIZE;

/// Page size a mapping is made with and the flags that request it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageGeometry {
    pub(crate) size: usize,
    pub(crate) flags: MapFlags,
}

impl PageGeometry {
    pub(crate) const HUGE_1GB: Self = Self {
        size: HUGE_PAGE_SIZE,
        flags: MapFlags::HUGETLB.union(MapFlags::from_bits_retain(libc::MAP_HUGE_1GB as u32)),
    };

    /// Ordinary pages, so tests can map files outside hugetlbfs.
    #[cfg(test)]
    pub(crate) const fn regular(size: usize) -> Self {
        Self {
            size,
            flags: MapFlags::empty(),
        }
    }
}

/// A file window mapped into memory.
///
/// The mapping borrows the [`FileHandle`] it was created from, so the file
/// stays open for as long as the mapping is in use. It is unmapped exactly
/// once, on drop.
///
/// Contents are exposed only through [`as_bytes`](Self::as_bytes). As with
/// any file mapping, truncating the file while it is mapped makes later
/// reads fault with `SIGBUS`.
#[derive(Debug)]
pub struct MappedRegion<'fd> {
    base: NonNull<u8>,
    len: usize,
    _file: PhantomData<&'fd FileHandle>,
}

impl<'fd> MappedRegion<'fd> {
    /// Maps `size` bytes of `file` starting at `offset`, with 1 GiB huge pages.
    ///
    /// `size` should be a positive multiple of 1 GiB and the window should lie
    /// inside the file; the kernel's own checks apply to anything else.
    pub fn map(file: &'fd FileHandle, size: usize, offset: usize) -> Result<Self> {
        Self::map_with(file, size, offset, &PageGeometry::HUGE_1GB)
    }

    pub(crate) fn map_with(
        file: &'fd FileHandle,
        size: usize,
        offset: usize,
        geometry: &PageGeometry,
    ) -> Result<Self> {
        let addr = unsafe {
            // SAFETY: no fixed address is requested, so the kernel picks an
            // unused range and nothing already mapped is replaced
            mmap(
                ptr::null_mut(), // no placement hint
                size, // the kernel rejects 0 and sizes it cannot back with the requested pages
                ProtFlags::READ, // never written through
                MapFlags::PRIVATE | geometry.flags, // private so the file cannot change under us via this mapping
                file.as_fd(), // borrowed for the duration of the call only
                offset as u64, // the kernel rejects offsets not aligned to the page size
            )
        }
        .map_err(|errno| OsError::new("mmap", file.path(), errno))?;

        let Some(base) = NonNull::new(addr.cast::<u8>()) else {
            // SAFETY: this is the unmodified range mmap just returned
            if let Err(errno) = unsafe { munmap(addr, size) } {
                warn!("munmap of {} bytes at {:p} failed: {}", size, addr, errno);
            }
            return Err(Error::unknown("mmap returned a null mapping"));
        };
        debug!(
            "mapped {} bytes of {} at offset {} to {:p}",
            size,
            file.path().display(),
            offset,
            base
        );
        Ok(Self {
            base,
            len: size,
            _file: PhantomData,
        })
    }

    /// Start address of the mapping, for diagnostics.
    pub fn base_address(&self) -> *const u8 {
        self.base.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: [base, base + len) is a readable mapping that lives until
        // `self` is dropped, and nothing in this process writes to it
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion<'_> {
    fn drop(&mut self) {
        debug!("unmapping {} bytes at {:p}", self.len, self.base);
        // SAFETY: base and len are exactly what mmap accepted, and this is the
        // only place the range is released
        if let Err(errno) = unsafe { munmap(self.base.as_ptr().cast::<c_void>(), self.len) } {
            warn!("munmap of {} bytes at {:p} failed: {}", self.len, self.base, errno);
        }
    }
}
