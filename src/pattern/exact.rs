use memchr::memmem::Finder;

use crate::pattern::Match;
use crate::{MemOpError, MemOpResult};

/// A fixed, non-empty byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
}

impl BytePattern {
    pub fn new(bytes: impl Into<Vec<u8>>) -> MemOpResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(MemOpError::invalid_pattern("exact pattern is empty"));
        }

        Ok(BytePattern { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Iterator over the non-overlapping occurrences of a [`BytePattern`] in one region.
///
/// After a hit at offset `i` the search resumes at `i + pattern.len()`, so `AA` in
/// `AAAA` is reported at offsets 0 and 2 only.
pub struct ExactMatches<'a> {
    content: &'a [u8],
    finder: Finder<'a>,
    region_base_address: usize,
    position: usize,
}

impl Iterator for ExactMatches<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.content.get(self.position..)?;
        let offset = self.position + self.finder.find(rest)?;
        let end = offset + self.finder.needle().len();
        self.position = end;

        Some(Match::new(
            self.region_base_address + offset,
            self.content[offset..end].to_vec(),
        ))
    }
}

/// Finds every non-overlapping occurrence of `pattern` in `region_content`, left to right.
///
/// Addresses are absolute: `region_base_address + offset`.
pub fn find_exact<'a>(
    region_content: &'a [u8],
    pattern: &'a BytePattern,
    region_base_address: usize,
) -> ExactMatches<'a> {
    ExactMatches {
        content: region_content,
        finder: Finder::new(pattern.as_bytes()),
        region_base_address,
        position: 0,
    }
}
