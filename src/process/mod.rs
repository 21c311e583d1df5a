mod handle;

pub use handle::{RawHandle, SafeHandle, SafeHandleGuard};

use std::time::Duration;

use crate::MemOpResult;
use crate::memory::{MemoryRegion, RegionContent, RegionSource};

/// Acquires a [`SafeHandle`] with an optional timeout and runs `$block` with the guard.
///
/// Evaluates to `MemOpResult<$ret>`; a lapsed timeout becomes
/// [`MemOpError::TimeoutReached`](crate::MemOpError::TimeoutReached).
///
/// ```rust,ignore
/// let region = with_handle!(&handle, Some(Duration::from_secs(1)), |guard| -> MemoryRegion, {
///     unsafe { query_region_unsafe(*guard, address) }
/// })?;
/// ```
#[macro_export]
macro_rules! with_handle {
    ($handle:expr, $timeout:expr, |$guard:ident| -> $ret:ty, $block:expr) => {{
        let safe_handle: &$crate::process::SafeHandle = $handle;
        let result: $crate::MemOpResult<$ret> = match safe_handle.acquire_with_timeout($timeout) {
            Some($guard) => $block,
            None => Err($crate::MemOpError::TimeoutReached($timeout)),
        };
        result
    }};
}

/// The address space of a live process, seen through a borrowed handle.
///
/// Every query and read acquires the handle for at most `timeout`.
#[derive(Clone)]
pub struct ProcessMemory {
    handle: SafeHandle,
    timeout: Option<Duration>,
}

impl ProcessMemory {
    /// Fails if `handle` is null.
    pub fn new(handle: SafeHandle, timeout: Option<Duration>) -> MemOpResult<Self> {
        if handle.is_null() {
            return Err(crate::memop_err!("process handle is invalid"));
        }

        Ok(ProcessMemory { handle, timeout })
    }

    pub fn handle(&self) -> &SafeHandle {
        &self.handle
    }
}

impl RegionSource for ProcessMemory {
    fn query_region(&self, address: usize) -> MemOpResult<MemoryRegion> {
        crate::memory::utils::query_region(&self.handle, address, self.timeout)
    }

    fn read_region(&self, base_address: usize, size: usize) -> MemOpResult<RegionContent> {
        crate::memory::read::read_region(&self.handle, base_address, size, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scanner;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Threading::GetCurrentProcess;

    fn own_process() -> ProcessMemory {
        let handle = SafeHandle::new(unsafe { GetCurrentProcess() });
        ProcessMemory::new(handle, Some(Duration::from_secs(1))).unwrap()
    }

    #[test]
    fn null_handle_rejected() {
        let handle = SafeHandle::new(HANDLE(std::ptr::null_mut()));
        assert!(ProcessMemory::new(handle, None).is_err());
    }

    #[test]
    fn finds_heap_buffer_in_own_process() {
        let needle: Vec<u8> = [0x6Du8, 0x73, 0x63, 0x6E, 0xF1, 0x3C, 0x9A, 0x07, 0x55, 0xE2, 0x18, 0xB4]
            .into_iter()
            .cycle()
            .take(48)
            .collect();

        let report = Scanner::new(own_process()).scan_exact(&needle).unwrap();

        assert!(report.is_complete());
        assert!(report
            .matches
            .iter()
            .any(|m| m.base_address == needle.as_ptr() as usize));
    }

    #[test]
    fn region_walk_reaches_the_end() {
        let memory = own_process();
        let mut address = 0usize;
        let mut regions = 0;

        loop {
            let region = memory.query_region(address).unwrap();
            if region.is_terminator() {
                break;
            }
            regions += 1;
            address = region.end_address();
        }

        assert!(regions > 0);
    }
}
