//! Whole-address-space pattern scanning.
//!
//! The driver walks the target from `start_address`, one region descriptor at a time,
//! advancing the cursor to `base_address + region_size` until a zero-sized region
//! marks the end of the address space. Regions that pass the [`RegionFilter`] are read
//! and handed to the matcher for the pattern kind:
//!
//! * exact patterns are matched inline, in enumeration order;
//! * wildcard patterns are prefiltered inline and, if the region may hold a match,
//!   matched on the `smol` blocking pool. Each task owns its region buffer and returns
//!   its own matches. At most [`ScanConfig::max_pending_tasks`] tasks are in flight;
//!   past that the driver joins the oldest before spawning. Results are appended in
//!   spawn order.
//!
//! A failed region query stops the walk but keeps what was found so far (see
//! [`ScanOutcome::Failed`]). A failed region read only skips that region.

#[cfg(feature = "async")]
pub mod async_ext;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

use crate::memory::{MemoryRegion, Protection, RegionContent, RegionSource, RegionState};
use crate::pattern::{Match, Pattern, WildcardPattern, find_exact, find_wildcard};
use crate::{MemOpError, MemOpResult};

/// Cooperative cancellation flag shared between a scan and whoever may abort it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Which regions get read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFilter {
    pub state: RegionState,
    /// Accepted access protections, compared without modifier bits. Guard pages never pass.
    pub protections: Vec<Protection>,
}

impl Default for RegionFilter {
    /// Committed read/write and read/write/execute memory.
    fn default() -> Self {
        RegionFilter {
            state: RegionState::Commit,
            protections: vec![Protection::READWRITE, Protection::EXECUTE_READWRITE],
        }
    }
}

impl RegionFilter {
    /// Every committed region that can be read, including read-only and code pages.
    pub fn readable() -> Self {
        RegionFilter {
            state: RegionState::Commit,
            protections: vec![
                Protection::READONLY,
                Protection::READWRITE,
                Protection::WRITECOPY,
                Protection::EXECUTE_READ,
                Protection::EXECUTE_READWRITE,
                Protection::EXECUTE_WRITECOPY,
            ],
        }
    }

    pub fn accepts(&self, region: &MemoryRegion) -> bool {
        region.state == self.state
            && !region.protect.is_guard()
            && self.protections.contains(&region.protect.access())
    }
}

/// Parameters of one scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub filter: RegionFilter,
    /// First address to query
    pub start_address: usize,
    /// Stop once the cursor reaches this address; regions straddling it are clipped
    pub end_address: Option<usize>,
    /// Regions larger than this are not read
    pub max_region_size: Option<usize>,
    /// Wildcard tasks (each holding a region buffer) allowed in flight at once
    pub max_pending_tasks: usize,
    pub cancel: CancelToken,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            filter: RegionFilter::default(),
            start_address: 0,
            end_address: None,
            max_region_size: None,
            max_pending_tasks: Self::DEFAULT_MAX_PENDING_TASKS,
            cancel: CancelToken::default(),
        }
    }
}

impl ScanConfig {
    pub const DEFAULT_MAX_PENDING_TASKS: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: RegionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_range(mut self, start_address: usize, end_address: Option<usize>) -> Self {
        self.start_address = start_address;
        self.end_address = end_address;
        self
    }

    pub fn with_max_region_size(mut self, max_region_size: usize) -> Self {
        self.max_region_size = Some(max_region_size);
        self
    }

    /// A limit of 0 is treated as 1.
    pub fn with_max_pending_tasks(mut self, max_pending_tasks: usize) -> Self {
        self.max_pending_tasks = max_pending_tasks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Why the walk stopped.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The end of the address space (or of the configured range) was reached.
    Completed,
    /// The [`CancelToken`] was triggered.
    Cancelled,
    /// The region query at `address` failed; matches from earlier regions are kept.
    Failed { address: usize, error: MemOpError },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Non-terminator descriptors returned by the enumerator
    pub regions_visited: usize,
    /// Regions whose content reached a matcher (or its prefilter)
    pub regions_read: usize,
    /// Regions rejected by the filter or the size limit
    pub regions_skipped: usize,
    /// Reads that came back as a partial copy
    pub partial_reads: usize,
    /// Reads that failed and were skipped
    pub read_errors: usize,
    /// Wildcard regions dropped by the prefilter
    pub prefiltered: usize,
    pub tasks_spawned: usize,
    /// Most wildcard tasks in flight at any one time
    pub peak_pending_tasks: usize,
    pub bytes_read: usize,
}

/// Result of a scan: every match found, and how the walk ended.
#[derive(Debug)]
pub struct ScanReport {
    pub matches: Vec<Match>,
    pub outcome: ScanOutcome,
    pub stats: ScanStats,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Completed)
    }

    /// The query error that ended the scan early, if any.
    pub fn error(&self) -> Option<&MemOpError> {
        match &self.outcome {
            ScanOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Matches of a complete scan, or the error that stopped it.
    ///
    /// Discards partial matches on failure; read `matches` directly to keep them.
    pub fn into_result(self) -> MemOpResult<Vec<Match>> {
        match self.outcome {
            ScanOutcome::Failed { error, .. } => Err(error),
            ScanOutcome::Completed | ScanOutcome::Cancelled => Ok(self.matches),
        }
    }
}

/// Drives a pattern over every eligible region of a [`RegionSource`].
#[derive(Clone)]
pub struct Scanner<S> {
    source: S,
    config: ScanConfig,
}

impl<S: RegionSource> Scanner<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, ScanConfig::default())
    }

    pub fn with_config(source: S, config: ScanConfig) -> Self {
        Scanner { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans for a fixed byte sequence. Fails before touching memory if `bytes` is empty.
    pub fn scan_exact(&self, bytes: &[u8]) -> MemOpResult<ScanReport> {
        self.scan(&Pattern::exact(bytes)?)
    }

    /// Scans for a wildcard pattern such as `"12 34 ?? 78"`.
    ///
    /// The pattern is compiled once, before any region is queried.
    pub fn scan_wildcard(&self, pattern: &str) -> MemOpResult<ScanReport> {
        self.scan(&Pattern::wildcard(pattern)?)
    }

    pub fn scan(&self, pattern: &Pattern) -> MemOpResult<ScanReport> {
        if pattern.is_empty() {
            return Err(MemOpError::invalid_pattern("pattern is empty"));
        }

        debug!(
            start = self.config.start_address,
            end = ?self.config.end_address,
            pattern_len = pattern.len(),
            "starting scan"
        );

        let mut walk = Walk::default();
        let outcome = self.walk(pattern, &mut walk);

        let Walk {
            mut matches,
            tasks,
            stats,
        } = walk;

        if !tasks.is_empty() {
            matches.extend(smol::block_on(async move {
                let mut joined = Vec::new();
                for task in tasks {
                    joined.extend(task.await);
                }
                joined
            }));
        }

        debug!(?stats, matches = matches.len(), ?outcome, "scan finished");

        Ok(ScanReport {
            matches,
            outcome,
            stats,
        })
    }

    fn walk(&self, pattern: &Pattern, walk: &mut Walk) -> ScanOutcome {
        let config = &self.config;
        let end_bound = config.end_address.unwrap_or(usize::MAX);
        let mut cursor = config.start_address;

        loop {
            if config.cancel.is_cancelled() {
                return ScanOutcome::Cancelled;
            }

            if cursor >= end_bound {
                return ScanOutcome::Completed;
            }

            let region = match self.source.query_region(cursor) {
                Ok(region) => region,
                Err(error) => {
                    warn!(address = cursor, %error, "region query failed, stopping scan");
                    return ScanOutcome::Failed {
                        address: cursor,
                        error,
                    };
                }
            };

            if region.is_terminator() {
                return ScanOutcome::Completed;
            }

            walk.stats.regions_visited += 1;
            let next = region.end_address();

            if next <= cursor {
                let error = MemOpError::RegionQuery {
                    address: cursor,
                    source: anyhow::anyhow!(
                        "region {:#X}+{:#X} does not advance past {cursor:#X}",
                        region.base_address,
                        region.region_size
                    ),
                };
                warn!(address = cursor, %error, "enumeration stalled, stopping scan");
                return ScanOutcome::Failed {
                    address: cursor,
                    error,
                };
            }

            // A descriptor may start before the cursor if the region grew since the last
            // query. Bytes below the cursor were already scanned.
            let read_base = region.base_address.max(cursor);
            let read_end = next.min(end_bound);
            let read_size = read_end.saturating_sub(read_base);

            let too_large = config.max_region_size.is_some_and(|max| read_size > max);

            if read_size == 0 || too_large || !config.filter.accepts(&region) {
                trace!(base = region.base_address, size = region.region_size, state = ?region.state, protect = ?region.protect, "skipping region");
                walk.stats.regions_skipped += 1;
            } else {
                match self.source.read_region(read_base, read_size) {
                    Ok(content) => {
                        if content.is_partial() {
                            trace!(base = read_base, requested = read_size, got = content.len(), "partial copy");
                            walk.stats.partial_reads += 1;
                        }
                        walk.stats.regions_read += 1;
                        walk.stats.bytes_read += content.len();

                        let stop = walk.dispatch(pattern, content, read_base, config);
                        if let Some(outcome) = stop {
                            return outcome;
                        }
                    }
                    Err(error) => {
                        warn!(base = read_base, size = read_size, %error, "region read failed, skipping region");
                        walk.stats.read_errors += 1;
                    }
                }
            }

            cursor = next;
        }
    }
}

/// Mutable state of one walk, owned by the driver thread only.
#[derive(Default)]
struct Walk {
    matches: Vec<Match>,
    tasks: VecDeque<smol::Task<Vec<Match>>>,
    stats: ScanStats,
}

impl Walk {
    /// Runs or schedules the matcher for one region's content.
    ///
    /// Returns an outcome only if the scan has to stop here.
    fn dispatch(
        &mut self,
        pattern: &Pattern,
        content: RegionContent,
        base: usize,
        config: &ScanConfig,
    ) -> Option<ScanOutcome> {
        if content.len() < pattern.len() {
            return None;
        }

        match pattern {
            Pattern::Exact(bytes) => {
                let found = find_exact(content.bytes(), bytes, base);
                self.matches.extend(found);
            }
            Pattern::Wildcard(wildcard) => {
                if !wildcard.may_match(content.bytes()) {
                    self.stats.prefiltered += 1;
                    return None;
                }

                if config.cancel.is_cancelled() {
                    return Some(ScanOutcome::Cancelled);
                }

                while self.tasks.len() >= config.max_pending_tasks.max(1) {
                    self.join_oldest();
                }

                let task = spawn_wildcard(Arc::clone(wildcard), content.into_bytes(), base);
                self.tasks.push_back(task);
                self.stats.tasks_spawned += 1;
                let pending = self.tasks.len();
                self.stats.peak_pending_tasks = self.stats.peak_pending_tasks.max(pending);
            }
        }

        None
    }

    /// Blocks on the oldest pending task. A wildcard scan only gets matches from its
    /// tasks, so joining from the front keeps spawn order.
    fn join_oldest(&mut self) {
        if let Some(task) = self.tasks.pop_front() {
            self.matches.extend(smol::block_on(task));
        }
    }
}

fn spawn_wildcard(
    pattern: Arc<WildcardPattern>,
    content: Vec<u8>,
    base: usize,
) -> smol::Task<Vec<Match>> {
    smol::unblock(move || find_wildcard(&content, &pattern, base))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: usize, size: usize, protect: Protection) -> MemoryRegion {
        MemoryRegion::new(base, size, RegionState::Commit, protect)
    }

    #[test]
    fn default_filter() {
        let filter = RegionFilter::default();

        assert!(filter.accepts(&region(0, 1, Protection::READWRITE)));
        assert!(filter.accepts(&region(0, 1, Protection::EXECUTE_READWRITE)));
        assert!(filter.accepts(&region(0, 1, Protection::READWRITE | Protection::NOCACHE)));
        assert!(!filter.accepts(&region(0, 1, Protection::READONLY)));
        assert!(!filter.accepts(&region(0, 1, Protection::EXECUTE_READ)));
        assert!(!filter.accepts(&region(0, 1, Protection::READWRITE | Protection::GUARD)));
        assert!(!filter.accepts(&MemoryRegion::new(
            0,
            1,
            RegionState::Reserve,
            Protection::READWRITE
        )));
    }

    #[test]
    fn readable_filter() {
        let filter = RegionFilter::readable();

        assert!(filter.accepts(&region(0, 1, Protection::READONLY)));
        assert!(filter.accepts(&region(0, 1, Protection::EXECUTE_READ)));
        assert!(!filter.accepts(&region(0, 1, Protection::NOACCESS)));
        assert!(!filter.accepts(&region(0, 1, Protection::EXECUTE)));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let config = ScanConfig::new().with_cancel(token.clone());

        assert!(!config.cancel.is_cancelled());
        token.cancel();
        assert!(config.cancel.is_cancelled());
    }

    #[test]
    fn default_config() {
        let config = ScanConfig::default();

        assert_eq!(config.filter, RegionFilter::default());
        assert_eq!(config.start_address, 0);
        assert_eq!(config.max_pending_tasks, ScanConfig::DEFAULT_MAX_PENDING_TASKS);
        assert_eq!(ScanConfig::new().with_max_pending_tasks(4).max_pending_tasks, 4);
    }

    #[test]
    fn report_accessors() {
        let report = ScanReport {
            matches: vec![Match::new(1, vec![0])],
            outcome: ScanOutcome::Failed {
                address: 0x1000,
                error: MemOpError::RegionQuery {
                    address: 0x1000,
                    source: anyhow::anyhow!("gone"),
                },
            },
            stats: ScanStats::default(),
        };

        assert!(!report.is_complete());
        assert!(report.error().is_some_and(MemOpError::is_region_query));
        assert!(report.into_result().is_err());
    }
}
