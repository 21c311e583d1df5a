use crate::memory::{MemoryRegion, Protection, RegionState};
use crate::process::SafeHandle;
use crate::{MemOpError, MemOpResult, with_handle};

use std::time::Duration;

use windows::Win32::Foundation::{ERROR_INVALID_PARAMETER, HANDLE};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RESERVE, MEMORY_BASIC_INFORMATION, VirtualQueryEx,
};
use windows_result::HRESULT;

/// Last OS error of the calling thread.
pub fn get_last_error() -> windows_result::Error {
    windows_result::Error::from_win32()
}

pub(crate) fn is_os_error(err: &windows_result::Error, code: u32) -> bool {
    err.code() == HRESULT::from_win32(code)
}

fn region_from_mbi(mbi: &MEMORY_BASIC_INFORMATION) -> MemoryRegion {
    let state = match mbi.State {
        MEM_COMMIT => RegionState::Commit,
        MEM_RESERVE => RegionState::Reserve,
        _ => RegionState::Free,
    };

    MemoryRegion::new(
        mbi.BaseAddress as usize,
        mbi.RegionSize,
        state,
        Protection(mbi.Protect.0),
    )
}

/// # Safety
///
/// `handle` must be a live process handle with `PROCESS_QUERY_INFORMATION` (or the
/// limited variant) access.
pub unsafe fn query_region_unsafe(handle: HANDLE, address: usize) -> MemOpResult<MemoryRegion> {
    let mut mbi = MEMORY_BASIC_INFORMATION::default();

    let written = unsafe {
        VirtualQueryEx(
            handle,
            Some(address as *const _),
            &mut mbi,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };

    if written == 0 {
        let err = get_last_error();

        // Past the highest user-mode address. Report the end of the address space
        // the same way a zero-sized region would.
        if is_os_error(&err, ERROR_INVALID_PARAMETER.0) {
            return Ok(MemoryRegion::new(
                address,
                0,
                RegionState::Free,
                Protection::NOACCESS,
            ));
        }

        return Err(MemOpError::RegionQuery {
            address,
            source: anyhow::Error::new(err).context("VirtualQueryEx in query_region()"),
        });
    }

    Ok(region_from_mbi(&mbi))
}

/// Queries the descriptor of the region containing `address`.
pub fn query_region(
    handle: &SafeHandle,
    address: usize,
    timeout: Option<Duration>,
) -> MemOpResult<MemoryRegion> {
    with_handle!(handle, timeout, |guard| -> MemoryRegion, {
        unsafe { query_region_unsafe(*guard, address) }
    })
    .map_err(|err| match err {
        err @ MemOpError::RegionQuery { .. } => err,
        other => MemOpError::RegionQuery {
            address,
            source: anyhow::Error::new(other),
        },
    })
}
