//! One scan run: probe, parse, open, map, count.
//!
//! Every step either succeeds or ends the run. Whatever was acquired up to
//! that point is released in reverse order as the owning values go out of
//! scope: the mapping first, then the descriptor.

use std::io::Write;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use log::info;
use rustix::fs::{stat, FileType};

use crate::error::{Error, OsError, Result, ValidationError};
use crate::fd::FileHandle;
use crate::region::{MappedRegion, PageGeometry};
use crate::scan::count_zeroes;
use crate::size::SizeSpec;

/// Command-line input, still as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub path: PathBuf,
    pub size: String,
    pub offset: String,
}

/// What a completed run found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub size: usize,
    pub offset: usize,
    pub fd: RawFd,
    pub base_address: usize,
    pub zeroes: usize,
}

/// Maps the requested window of `invocation.path` with 1 GiB huge pages and
/// counts its zero bytes, writing progress lines to `out`.
pub fn run<W: Write>(invocation: &Invocation, out: &mut W) -> Result<Report> {
    run_with(invocation, out, &PageGeometry::HUGE_1GB)
}

pub(crate) fn run_with<W: Write>(
    invocation: &Invocation,
    out: &mut W,
    geometry: &PageGeometry,
) -> Result<Report> {
    let path = invocation.path.as_path();
    let file_size = check_file(path, geometry)?;

    writeln!(
        out,
        "mmap_size_str: {}, mmap_offset_str: {}",
        invocation.size, invocation.offset
    )?;
    let file_len = usize::try_from(file_size).map_err(|_| {
        Error::unknown(format!(
            "{} is {file_size} bytes, more than this platform can address",
            path.display()
        ))
    })?;
    let spec = SizeSpec::derive(&invocation.size, &invocation.offset, file_len, geometry.size)?;
    writeln!(out, "size: {}, offset: {}", spec.size, spec.offset)?;
    check_range(path, &spec, file_size, geometry)?;

    let file = FileHandle::open(path)?;
    writeln!(out, "opened file {}", file.raw_fd())?;

    let region = MappedRegion::map_with(&file, spec.size, spec.offset, geometry)?;
    let base_address = region.base_address() as usize;
    writeln!(out, "memory-mapped to 0x{base_address:016x}")?;

    let zeroes = count_zeroes(region.as_bytes());
    writeln!(out, "number of zeroes: {zeroes}")?;
    info!(
        "{}: {zeroes} zero bytes in {} bytes at offset {}",
        path.display(),
        spec.size,
        spec.offset
    );

    Ok(Report {
        size: spec.size,
        offset: spec.offset,
        fd: file.raw_fd(),
        base_address,
        zeroes,
    })
}

/// Returns the file's size once it is known to be a regular file of at
/// least one huge page.
fn check_file(path: &Path, geometry: &PageGeometry) -> Result<u64> {
    let file_stat = stat(path).map_err(|errno| OsError::new("stat", path, errno))?;
    if FileType::from_raw_mode(file_stat.st_mode) != FileType::RegularFile {
        return Err(ValidationError::NotRegularFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    let size = u64::try_from(file_stat.st_size)
        .map_err(|_| Error::unknown(format!("negative size reported for {}", path.display())))?;
    if size == 0 {
        return Err(ValidationError::EmptyFile {
            path: path.to_path_buf(),
        }
        .into());
    }
    if size < geometry.size as u64 {
        return Err(ValidationError::TooSmallForHugePages {
            path: path.to_path_buf(),
            size,
        }
        .into());
    }
    Ok(size)
}

/// Rejects windows the kernel would refuse or that would fault when read.
fn check_range(
    path: &Path,
    spec: &SizeSpec,
    file_size: u64,
    geometry: &PageGeometry,
) -> std::result::Result<(), ValidationError> {
    let page_size = geometry.size;
    if spec.size == 0 || spec.size % page_size != 0 {
        return Err(ValidationError::SizeNotHugePageMultiple {
            size: spec.size,
            page_size,
        });
    }
    if spec.offset % page_size != 0 {
        return Err(ValidationError::UnalignedOffset {
            offset: spec.offset,
            page_size,
        });
    }
    // past the end of the file the mapping would SIGBUS instead of failing
    let end = (spec.offset as u64).checked_add(spec.size as u64);
    if end.map_or(true, |end| end > file_size) {
        return Err(ValidationError::RangeExceedsFile {
            path: path.to_path_buf(),
            size: spec.size,
            offset: spec.offset,
            file_size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::fd::fd_refers_to;
    use crate::size::HUGE_PAGE_SIZE;
    use std::fs::File;
    use std::io;
    use tempfile::{tempdir, NamedTempFile};

    const PAGE: usize = 4096;
    const SMALL: PageGeometry = PageGeometry::regular(PAGE);

    fn invocation(path: &Path, size: &str, offset: &str) -> Invocation {
        Invocation {
            path: path.to_path_buf(),
            size: size.to_owned(),
            offset: offset.to_owned(),
        }
    }

    fn file_with(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn sparse_file(len: u64) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_len(len)
            .unwrap();
        file
    }

    #[test]
    fn whole_file_is_scanned() {
        let mut contents = vec![1u8; 3 * PAGE];
        contents[10..20].fill(0);
        contents[2 * PAGE] = 0;
        let file = file_with(&contents);
        let mut out = Vec::<u8>::new();

        let report = run_with(&invocation(file.path(), "0", "0"), &mut out, &SMALL).unwrap();
        assert_eq!(report.size, 3 * PAGE);
        assert_eq!(report.offset, 0);
        assert_eq!(report.zeroes, 11);
        assert!(report.fd >= 0);
        assert_ne!(report.base_address, 0);

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "mmap_size_str: 0, mmap_offset_str: 0");
        assert_eq!(lines[1], format!("size: {}, offset: 0", 3 * PAGE));
        assert_eq!(lines[2], format!("opened file {}", report.fd));
        assert_eq!(lines[3], format!("memory-mapped to 0x{:016x}", report.base_address));
        assert_eq!(lines[4], "number of zeroes: 11");
    }

    #[test]
    fn partial_file_is_rounded_down() {
        let mut contents = vec![0u8; 2 * PAGE + 100];
        contents[..PAGE].fill(5);
        let file = file_with(&contents);

        let report = run_with(&invocation(file.path(), "0", "0"), &mut io::sink(), &SMALL).unwrap();
        assert_eq!(report.size, 2 * PAGE);
        assert_eq!(report.zeroes, PAGE);
    }

    #[test]
    fn window_at_offset() {
        let mut contents = vec![0u8; 4 * PAGE];
        contents[PAGE..3 * PAGE].fill(0xaa);
        let file = file_with(&contents);
        let size = (2 * PAGE).to_string();
        let offset = PAGE.to_string();

        let report =
            run_with(&invocation(file.path(), &size, &offset), &mut io::sink(), &SMALL).unwrap();
        assert_eq!(report.size, 2 * PAGE);
        assert_eq!(report.offset, PAGE);
        assert_eq!(report.zeroes, 0);
    }

    #[test]
    fn empty_file_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = run_with(&invocation(file.path(), "0", "0"), &mut io::sink(), &SMALL).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::EmptyFile { .. })
        ));
    }

    #[test]
    fn small_file_is_rejected_before_output() {
        let file = file_with(&[1; 1000]);
        let mut out = Vec::<u8>::new();
        let err = run(&invocation(file.path(), "0", "0"), &mut out).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooSmallForHugePages { size: 1000, .. })
        ));
        assert!(err
            .to_string()
            .contains("file is not large enough to use 1GB huge tlb"));
        assert!(out.is_empty());
    }

    #[test]
    fn directory_is_rejected() {
        let dir = tempdir().unwrap();
        let err = run(&invocation(dir.path(), "0", "0"), &mut io::sink()).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NotRegularFile { .. })
        ));
    }

    #[test]
    fn missing_file_fails_stat() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        let err = run(&invocation(&path, "0", "0"), &mut io::sink()).unwrap_err();
        match err {
            Error::Os(err) => assert_eq!(err.op(), "stat"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_size_is_a_parse_error() {
        let file = file_with(&[1; 2 * PAGE]);
        let mut out = Vec::<u8>::new();
        let err = run_with(&invocation(file.path(), "abc", "0"), &mut out, &SMALL).unwrap_err();
        match err {
            Error::Parse(ParseError::InvalidNumber { argument, text }) => {
                assert_eq!(argument, "mmap-size");
                assert_eq!(text, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing past the echoed arguments, so the file was never opened
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn size_below_one_page_is_rejected() {
        let file = file_with(&[1; 2 * PAGE]);
        let err = run_with(&invocation(file.path(), "100", "0"), &mut io::sink(), &SMALL)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::SizeNotHugePageMultiple { size: 0, .. })
        ));
    }

    #[test]
    fn unaligned_offset_is_rejected() {
        let file = file_with(&[1; 2 * PAGE]);
        let size = PAGE.to_string();
        let err = run_with(&invocation(file.path(), &size, "1"), &mut io::sink(), &SMALL)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::UnalignedOffset { offset: 1, .. })
        ));
    }

    #[test]
    fn window_past_end_is_rejected() {
        let file = file_with(&[1; 2 * PAGE]);
        let offset = PAGE.to_string();
        let err = run_with(&invocation(file.path(), "0", &offset), &mut io::sink(), &SMALL)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::RangeExceedsFile { .. })
        ));
    }

    #[test]
    fn huge_pages_unavailable_is_an_mmap_error() {
        let file = sparse_file(HUGE_PAGE_SIZE as u64 + 12345);
        let mut out = Vec::<u8>::new();

        let err = run(&invocation(file.path(), "0", "0"), &mut out).unwrap_err();
        match err {
            Error::Os(err) => assert_eq!(err.op(), "mmap"),
            other => panic!("unexpected error: {other}"),
        }
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(&format!("size: {HUGE_PAGE_SIZE}, offset: 0")));
        assert!(!out.contains("memory-mapped"));

        // the descriptor opened before the failed mmap is already closed
        let fd: RawFd = out
            .lines()
            .find_map(|line| line.strip_prefix("opened file "))
            .unwrap()
            .parse()
            .unwrap();
        assert!(!fd_refers_to(fd, file.path()));
    }

    #[test]
    fn completed_run_releases_descriptor() {
        let file = file_with(&[0; 2 * PAGE]);
        let report = run_with(&invocation(file.path(), "0", "0"), &mut io::sink(), &SMALL).unwrap();
        assert_eq!(report.zeroes, 2 * PAGE);
        assert!(!fd_refers_to(report.fd, file.path()));
    }
}
