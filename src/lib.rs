//! Live process-memory pattern scanning.
//!
//! Walks another process's address space region by region, reads the committed
//! pages a [`scan::RegionFilter`] accepts, and reports every occurrence of an exact
//! byte sequence or a `??`-wildcard hex pattern.

#[cfg(feature = "async")]
mod async_ext;
pub mod error;
pub mod memory;
pub mod pattern;
#[cfg(windows)]
pub mod process;
pub mod scan;

pub use error::{MemOpError, MemOpResult, MemOpResultExt};
pub use memory::{MemoryRegion, Protection, RegionContent, RegionSource, RegionState};
pub use pattern::{Match, Pattern};
pub use scan::{CancelToken, RegionFilter, ScanConfig, ScanOutcome, ScanReport, Scanner};
