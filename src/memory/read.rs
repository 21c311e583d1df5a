use crate::memory::RegionContent;
use crate::memory::utils::is_os_error;
use crate::process::SafeHandle;
use crate::{MemOpError, MemOpResult, with_handle};

use std::time::Duration;
use windows::Win32::Foundation::ERROR_PARTIAL_COPY;
use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

/// Reads up to `size` bytes of the target's memory at `addr`.
///
/// `ERROR_PARTIAL_COPY` yields [`RegionContent::PartialCopy`] with whatever was copied;
/// every other failure is a [`MemOpError::RegionRead`].
pub fn read_region(
    handle: &SafeHandle,
    addr: usize,
    size: usize,
    timeout: Option<Duration>,
) -> MemOpResult<RegionContent> {
    let mut buffer = vec![0u8; size];
    let mut bytes_read = 0;

    let result = with_handle!(handle, timeout, |guard| -> Result<(), windows_result::Error>, {
        unsafe {
            Ok(ReadProcessMemory(
                *guard,
                addr as *const _,
                buffer.as_mut_ptr() as *mut _,
                size,
                Some(&mut bytes_read),
            ))
        }
    });

    let read_error = |source: anyhow::Error| MemOpError::RegionRead {
        address: addr,
        size,
        source,
    };

    match result {
        Ok(Ok(())) => {
            buffer.truncate(bytes_read);
            Ok(RegionContent::Complete(buffer))
        }
        Ok(Err(err)) if is_os_error(&err, ERROR_PARTIAL_COPY.0) => {
            buffer.truncate(bytes_read);
            Ok(RegionContent::PartialCopy(buffer))
        }
        Ok(Err(err)) => {
            Err(read_error(anyhow::Error::new(err).context("ReadProcessMemory in read_region()")))
        }
        Err(err) => Err(read_error(anyhow::Error::new(err))),
    }
}
