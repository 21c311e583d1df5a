use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;
use windows::Win32::Foundation::HANDLE;

/// A process `HANDLE` that can be moved across threads.
///
/// The scanner only ever passes the value to `VirtualQueryEx`/`ReadProcessMemory`;
/// it never closes it. The caller that opened the process owns its lifetime.
pub struct RawHandle {
    handle: HANDLE,
}

impl RawHandle {
    pub fn new(handle: HANDLE) -> Self {
        RawHandle { handle }
    }

    pub fn as_handle(&self) -> HANDLE {
        self.handle
    }
}

// SAFETY: a HANDLE is an opaque kernel object reference; the OS calls made
// through it are safe to issue from any thread.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

/// A shared process handle with timeout-based acquisition.
///
/// Clones share the same underlying handle.
#[derive(Clone)]
pub struct SafeHandle {
    inner: Arc<Mutex<RawHandle>>,
}

/// RAII guard giving access to the underlying `HANDLE` until dropped.
pub struct SafeHandleGuard<'a> {
    guard: MutexGuard<'a, RawHandle>,
}

impl SafeHandle {
    /// Wraps a handle obtained elsewhere with at least
    /// `PROCESS_QUERY_INFORMATION | PROCESS_VM_READ` access.
    pub fn new(handle: HANDLE) -> Self {
        SafeHandle {
            inner: Arc::new(Mutex::new(RawHandle::new(handle))),
        }
    }

    /// True for a null handle. `-1` is left alone: it is the current-process pseudo handle.
    pub fn is_null(&self) -> bool {
        self.inner.lock().handle.0.is_null()
    }

    /// Acquires the handle, waiting at most `timeout` (forever if `None`).
    ///
    /// Returns `None` if the timeout expired first.
    pub fn acquire_with_timeout(&self, timeout: Option<Duration>) -> Option<SafeHandleGuard<'_>> {
        match timeout {
            Some(duration) => self.inner.try_lock_for(duration),
            None => Some(self.inner.lock()),
        }
        .map(|guard| SafeHandleGuard { guard })
    }
}

impl std::ops::Deref for SafeHandleGuard<'_> {
    type Target = HANDLE;

    fn deref(&self) -> &Self::Target {
        &self.guard.handle
    }
}
