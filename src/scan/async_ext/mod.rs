use crate::async_ext::await_memop;
use crate::memory::RegionSource;
use crate::pattern::Pattern;
use crate::scan::{ScanReport, Scanner};
use crate::MemOpResult;

/// Async version of [`Scanner::scan`].
///
/// The whole walk runs on the `smol` blocking pool; wildcard matching tasks are still
/// joined before the returned future resolves.
///
/// # Example
/// ```rust,ignore
/// let scanner = Scanner::new(ProcessMemory::new(handle, Some(Duration::from_secs(1)))?);
/// let pattern = Pattern::wildcard("48 8B ?? ?? 89")?;
/// let report = scan(&scanner, &pattern).await?;
/// for m in &report.matches {
///     println!("{} {}", m.address_hex(), m.data_hex());
/// }
/// ```
pub async fn scan<S>(scanner: &Scanner<S>, pattern: &Pattern) -> MemOpResult<ScanReport>
where
    S: RegionSource + Clone + Send + 'static,
{
    let pattern = pattern.clone();
    await_memop!(scanner, |s: Scanner<S>| s.scan(&pattern))
}

/// Async version of [`Scanner::scan_wildcard`]. The pattern is compiled before anything is spawned.
pub async fn scan_wildcard<S>(scanner: &Scanner<S>, pattern: &str) -> MemOpResult<ScanReport>
where
    S: RegionSource + Clone + Send + 'static,
{
    scan(scanner, &Pattern::wildcard(pattern)?).await
}

/// Async version of [`Scanner::scan_exact`].
pub async fn scan_exact<S>(scanner: &Scanner<S>, bytes: &[u8]) -> MemOpResult<ScanReport>
where
    S: RegionSource + Clone + Send + 'static,
{
    scan(scanner, &Pattern::exact(bytes)?).await
}
