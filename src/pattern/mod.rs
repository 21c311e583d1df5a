pub mod exact;
pub mod wildcard;

use std::str::FromStr;
use std::sync::Arc;

use crate::{MemOpError, MemOpResult};

pub use exact::{BytePattern, ExactMatches, find_exact};
pub use wildcard::{WildcardPattern, find_wildcard};

/// A pattern byte: `None` matches any value.
pub type Byte = Option<u8>;

/// One occurrence of a pattern in the target's memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Match {
    /// Absolute address of the first matched byte
    pub base_address: usize,
    /// The matched bytes, same length as the pattern
    pub data: Vec<u8>,
}

impl Match {
    pub fn new(base_address: usize, data: Vec<u8>) -> Self {
        Match { base_address, data }
    }

    /// The match address as a hexadecimal string, e.g. `0x7FF6A1B2C3D0`.
    pub fn address_hex(&self) -> String {
        format!("{:#X}", self.base_address)
    }

    /// The matched bytes as an uppercase hexadecimal string, e.g. `1234AA78`.
    pub fn data_hex(&self) -> String {
        hex::encode_upper(&self.data)
    }
}

/// What a scan searches for.
///
/// Both forms are immutable once built; the wildcard form is compiled once and
/// shared read-only between matching tasks.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(BytePattern),
    Wildcard(Arc<WildcardPattern>),
}

impl Pattern {
    /// Fixed byte sequence. Fails on an empty sequence.
    pub fn exact(bytes: impl Into<Vec<u8>>) -> MemOpResult<Self> {
        Ok(Pattern::Exact(BytePattern::new(bytes)?))
    }

    /// Whitespace separated hex tokens, `??` for any byte, e.g. `"12 34 ?? 78"`.
    pub fn wildcard(pattern: &str) -> MemOpResult<Self> {
        Ok(Pattern::Wildcard(Arc::new(WildcardPattern::compile(pattern)?)))
    }

    /// Length of every match this pattern can produce.
    pub fn len(&self) -> usize {
        match self {
            Pattern::Exact(p) => p.len(),
            Pattern::Wildcard(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for Pattern {
    type Err = MemOpError;

    /// Parses the wildcard token syntax. A pattern without `??` tokens still goes
    /// through the wildcard matcher, it just has no unconstrained positions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::wildcard(s)
    }
}

impl From<BytePattern> for Pattern {
    fn from(pattern: BytePattern) -> Self {
        Pattern::Exact(pattern)
    }
}

impl From<WildcardPattern> for Pattern {
    fn from(pattern: WildcardPattern) -> Self {
        Pattern::Wildcard(Arc::new(pattern))
    }
}
