#[cfg(feature = "async")]
pub mod async_ext;
#[cfg(windows)]
pub mod read;
#[cfg(windows)]
pub mod utils;

use std::fmt;

use crate::MemOpResult;

/// Commit state of a region, as reported by the enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    Commit,
    Reserve,
    Free,
}

/// Page protection bits of a region.
///
/// The values follow the Win32 `PAGE_*` constants so descriptors coming from
/// `VirtualQueryEx` can be carried over without translation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protection(pub u32);

impl Protection {
    pub const NOACCESS: Protection = Protection(0x01);
    pub const READONLY: Protection = Protection(0x02);
    pub const READWRITE: Protection = Protection(0x04);
    pub const WRITECOPY: Protection = Protection(0x08);
    pub const EXECUTE: Protection = Protection(0x10);
    pub const EXECUTE_READ: Protection = Protection(0x20);
    pub const EXECUTE_READWRITE: Protection = Protection(0x40);
    pub const EXECUTE_WRITECOPY: Protection = Protection(0x80);
    pub const GUARD: Protection = Protection(0x100);
    pub const NOCACHE: Protection = Protection(0x200);
    pub const WRITECOMBINE: Protection = Protection(0x400);

    const ACCESS_MASK: u32 = 0xFF;

    /// The access part of the protection, with the modifier bits (guard, nocache, ...) stripped.
    pub fn access(self) -> Protection {
        Protection(self.0 & Self::ACCESS_MASK)
    }

    pub fn contains(self, other: Protection) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_guard(self) -> bool {
        self.contains(Self::GUARD)
    }

    pub fn is_readable(self) -> bool {
        if self.is_guard() {
            return false;
        }

        self.0
            & (Self::READONLY.0
                | Self::READWRITE.0
                | Self::WRITECOPY.0
                | Self::EXECUTE_READ.0
                | Self::EXECUTE_READWRITE.0
                | Self::EXECUTE_WRITECOPY.0)
            != 0
    }

    pub fn is_writable(self) -> bool {
        self.0
            & (Self::READWRITE.0
                | Self::WRITECOPY.0
                | Self::EXECUTE_READWRITE.0
                | Self::EXECUTE_WRITECOPY.0)
            != 0
    }

    pub fn is_executable(self) -> bool {
        self.0
            & (Self::EXECUTE.0
                | Self::EXECUTE_READ.0
                | Self::EXECUTE_READWRITE.0
                | Self::EXECUTE_WRITECOPY.0)
            != 0
    }
}

impl std::ops::BitOr for Protection {
    type Output = Protection;

    fn bitor(self, rhs: Self) -> Self::Output {
        Protection(self.0 | rhs.0)
    }
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protection({:#X})", self.0)
    }
}

/// Describes one contiguous range of the target's address space at the time it was queried.
///
/// Descriptors are produced fresh by every enumeration step and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base_address: usize,
    pub region_size: usize,
    pub state: RegionState,
    pub protect: Protection,
}

impl MemoryRegion {
    pub fn new(
        base_address: usize,
        region_size: usize,
        state: RegionState,
        protect: Protection,
    ) -> Self {
        MemoryRegion {
            base_address,
            region_size,
            state,
            protect,
        }
    }

    /// First address past the region, saturating at the top of the address space.
    pub fn end_address(&self) -> usize {
        self.base_address.saturating_add(self.region_size)
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base_address && address < self.end_address()
    }

    /// A zero-sized descriptor marks the end of the address space.
    pub fn is_terminator(&self) -> bool {
        self.region_size == 0
    }
}

/// Bytes read out of a region.
///
/// A partial copy is an expected outcome, not an error: only part of the region was
/// accessible and the buffer holds whatever was obtained (possibly nothing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionContent {
    Complete(Vec<u8>),
    PartialCopy(Vec<u8>),
}

impl RegionContent {
    pub fn bytes(&self) -> &[u8] {
        match self {
            RegionContent::Complete(bytes) | RegionContent::PartialCopy(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RegionContent::Complete(bytes) | RegionContent::PartialCopy(bytes) => bytes,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, RegionContent::PartialCopy(_))
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// Something whose address space can be walked and read region by region.
///
/// `query_region` must fail with [`MemOpError::RegionQuery`](crate::MemOpError::RegionQuery)
/// when the descriptor cannot be obtained, and `read_region` with
/// [`MemOpError::RegionRead`](crate::MemOpError::RegionRead) for anything other than a
/// partial copy, which is reported as [`RegionContent::PartialCopy`].
pub trait RegionSource {
    /// Descriptor of the region containing (or following) `address`.
    fn query_region(&self, address: usize) -> MemOpResult<MemoryRegion>;

    /// Up to `size` bytes starting at `base_address`.
    fn read_region(&self, base_address: usize, size: usize) -> MemOpResult<RegionContent>;
}

impl<T: RegionSource + ?Sized> RegionSource for &T {
    fn query_region(&self, address: usize) -> MemOpResult<MemoryRegion> {
        (**self).query_region(address)
    }

    fn read_region(&self, base_address: usize, size: usize) -> MemOpResult<RegionContent> {
        (**self).read_region(base_address, size)
    }
}

impl<T: RegionSource + ?Sized> RegionSource for std::sync::Arc<T> {
    fn query_region(&self, address: usize) -> MemOpResult<MemoryRegion> {
        (**self).query_region(address)
    }

    fn read_region(&self, base_address: usize, size: usize) -> MemOpResult<RegionContent> {
        (**self).read_region(base_address, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protection_queries() {
        assert!(Protection::READWRITE.is_readable());
        assert!(Protection::READWRITE.is_writable());
        assert!(!Protection::READWRITE.is_executable());
        assert!(Protection::EXECUTE_READWRITE.is_executable());
        assert!(!Protection::NOACCESS.is_readable());
        assert!(!(Protection::READWRITE | Protection::GUARD).is_readable());
        assert_eq!(
            (Protection::READWRITE | Protection::NOCACHE).access(),
            Protection::READWRITE
        );
    }

    #[test]
    fn region_bounds() {
        let region = MemoryRegion::new(0x1000, 0x2000, RegionState::Commit, Protection::READWRITE);
        assert_eq!(region.end_address(), 0x3000);
        assert!(region.contains(0x1000));
        assert!(region.contains(0x2FFF));
        assert!(!region.contains(0x3000));
        assert!(!region.is_terminator());

        let top = MemoryRegion::new(usize::MAX - 1, 0x10, RegionState::Free, Protection::NOACCESS);
        assert_eq!(top.end_address(), usize::MAX);
    }

    #[test]
    fn partial_content_keeps_bytes() {
        let content = RegionContent::PartialCopy(vec![1, 2, 3]);
        assert!(content.is_partial());
        assert_eq!(content.len(), 3);
        assert_eq!(content.into_bytes(), vec![1, 2, 3]);
    }
}
