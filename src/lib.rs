//! Maps a file from a hugetlbfs mount with 1 GiB huge pages and counts the zero bytes in the mapped window. Linux only.
//!
//! The pieces run strictly in order: [`SizeSpec::derive`] turns the size and
//! offset arguments into byte counts, [`FileHandle::open`] opens the file
//! read-only, [`MappedRegion::map`] maps it with `MAP_HUGETLB | MAP_HUGE_1GB`,
//! and [`count_zeroes`] scans the result. [`run`] does all of it, checking the
//! file and the requested window before any descriptor is opened.
//!
//! ```no_run
//! use hugetlb_scan::{run, Invocation};
//!
//! let invocation = Invocation {
//!     path: "/dev/hugepages/data".into(),
//!     size: "0".into(),
//!     offset: "0".into(),
//! };
//! let report = run(&invocation, &mut std::io::stdout())?;
//! println!("{} zero bytes", report.zeroes);
//! # Ok::<(), hugetlb_scan::Error>(())
//! ```

mod error;
mod fd;
mod pipeline;
mod region;
mod scan;
mod size;

pub use error::{Error, OsError, ParseError, Result, ValidationError};
pub use fd::FileHandle;
pub use pipeline::{run, Invocation, Report};
pub use region::MappedRegion;
pub use scan::count_zeroes;
pub use size::{parse, SizeSpec, HUGE_PAGE_SHIFT, HUGE_PAGE_SIZE};
