use crate::async_ext::await_memop;
use crate::memory::{MemoryRegion, RegionContent, RegionSource};
use crate::MemOpResult;

/// Runs [`RegionSource::query_region`] on the blocking pool.
pub async fn query_region<S>(source: &S, address: usize) -> MemOpResult<MemoryRegion>
where
    S: RegionSource + Clone + Send + 'static,
{
    await_memop!(source, |s: S| s.query_region(address))
}

/// Runs [`RegionSource::read_region`] on the blocking pool.
pub async fn read_region<S>(source: &S, base_address: usize, size: usize) -> MemOpResult<RegionContent>
where
    S: RegionSource + Clone + Send + 'static,
{
    await_memop!(source, |s: S| s.read_region(base_address, size))
}
