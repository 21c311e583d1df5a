use std::fmt;
use std::str::FromStr;

use memchr::memmem::Finder;
use regex::bytes::Regex;

use crate::pattern::{Byte, Match};
use crate::{MemOpError, MemOpResult};

/// A compiled wildcard byte pattern such as `"12 34 ?? 78"`.
///
/// Compiling turns the tokens into a byte-level regular expression (literals become
/// `\xHH`, `??` becomes `.` with dot-matches-newline) and precomputes two prefilters:
/// the longest run of consecutive literal bytes, and the set of distinct literal bytes.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    tokens: Vec<Byte>,
    regex: Regex,
    longest_literal_run: Option<Finder<'static>>,
    literal_bytes: Vec<u8>,
}

/// Turns a pattern string into a vector of optional bytes.
///
/// Tokens are separated by whitespace; each is either two hex digits or `??`.
pub fn parse_tokens(pattern: &str) -> MemOpResult<Vec<Byte>> {
    let tokens = pattern
        .split_whitespace()
        .map(|token| match token {
            "??" => Ok(None),
            hex if hex.len() == 2 && hex.bytes().all(|c| c.is_ascii_hexdigit()) => {
                Ok(Some(u8::from_str_radix(hex, 16)?))
            }
            other => Err(MemOpError::invalid_pattern(format!(
                "token \"{other}\" is neither two hex digits nor ??"
            ))),
        })
        .collect::<MemOpResult<Vec<Byte>>>()?;

    if tokens.is_empty() {
        return Err(MemOpError::invalid_pattern("wildcard pattern has no tokens"));
    }

    Ok(tokens)
}

fn build_regex(tokens: &[Byte]) -> MemOpResult<Regex> {
    let mut expr = String::with_capacity(8 + tokens.len() * 4);
    expr.push_str("(?s-u)");

    for token in tokens {
        match token {
            Some(b) => expr.push_str(&format!("\\x{b:02X}")),
            None => expr.push('.'),
        }
    }

    Ok(Regex::new(&expr)?)
}

fn longest_literal_run(tokens: &[Byte]) -> Vec<u8> {
    tokens
        .split(|token| token.is_none())
        .max_by_key(|run| run.len())
        .map(|run| run.iter().flatten().copied().collect())
        .unwrap_or_default()
}

impl WildcardPattern {
    /// Parses and compiles `pattern`. Malformed tokens fail here, before any memory is read.
    pub fn compile(pattern: &str) -> MemOpResult<Self> {
        Self::from_tokens(parse_tokens(pattern)?)
    }

    pub fn from_tokens(tokens: Vec<Byte>) -> MemOpResult<Self> {
        if tokens.is_empty() {
            return Err(MemOpError::invalid_pattern("wildcard pattern has no tokens"));
        }

        let regex = build_regex(&tokens)?;

        let run = longest_literal_run(&tokens);
        let longest_literal_run = (!run.is_empty()).then(|| Finder::new(&run).into_owned());

        let mut literal_bytes: Vec<u8> = tokens.iter().flatten().copied().collect();
        literal_bytes.sort_unstable();
        literal_bytes.dedup();

        Ok(WildcardPattern {
            tokens,
            regex,
            longest_literal_run,
            literal_bytes,
        })
    }

    pub fn tokens(&self) -> &[Byte] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The longest run of consecutive literal bytes, empty if every token is `??`.
    pub fn literal_run(&self) -> &[u8] {
        self.longest_literal_run
            .as_ref()
            .map(|finder| finder.needle())
            .unwrap_or_default()
    }

    /// Cheap necessary condition for `content` to hold a match.
    ///
    /// Rejects content shorter than the pattern, content missing the longest literal
    /// run, and content missing any literal byte value. Never rejects content that
    /// [`find_wildcard`] would match in.
    pub fn may_match(&self, content: &[u8]) -> bool {
        if content.len() < self.tokens.len() {
            return false;
        }

        if let Some(finder) = &self.longest_literal_run {
            if finder.find(content).is_none() {
                return false;
            }
        }

        self.literal_bytes
            .iter()
            .all(|&b| memchr::memchr(b, content).is_some())
    }

    /// Whether the pattern matches `content` starting exactly at `offset`.
    pub fn matches_at(&self, content: &[u8], offset: usize) -> bool {
        let Some(window) = content.get(offset..offset.saturating_add(self.tokens.len())) else {
            return false;
        };

        window.len() == self.tokens.len()
            && self
                .tokens
                .iter()
                .zip(window)
                .all(|(token, byte)| token.is_none_or(|b| b == *byte))
    }
}

impl FromStr for WildcardPattern {
    type Err = MemOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WildcardPattern::compile(s)
    }
}

impl fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match token {
                Some(b) => write!(f, "{b:02X}")?,
                None => f.write_str("??")?,
            }
        }
        Ok(())
    }
}

/// Runs the compiled pattern over one region's content.
///
/// Matches are non-overlapping and in address order. The prefilter is not applied
/// here; callers use [`WildcardPattern::may_match`] to decide whether a region is
/// worth a task at all.
pub fn find_wildcard(
    region_content: &[u8],
    pattern: &WildcardPattern,
    region_base_address: usize,
) -> Vec<Match> {
    pattern
        .regex
        .find_iter(region_content)
        .map(|m| Match::new(region_base_address + m.start(), m.as_bytes().to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn basic_wildcard() {
        let pattern = WildcardPattern::compile("12 34 ?? 78").unwrap();

        let content = hex("1234AA78");
        assert!(pattern.may_match(&content));
        let matches = find_wildcard(&content, &pattern, 0x1000);
        assert_eq!(matches, vec![Match::new(0x1000, vec![0x12, 0x34, 0xAA, 0x78])]);

        assert!(find_wildcard(&hex("1234AA79"), &pattern, 0x1000).is_empty());
    }

    #[test]
    fn literal_only_pattern() {
        let pattern = WildcardPattern::compile("BB CC").unwrap();
        let matches = find_wildcard(&hex("AABBCCDD"), &pattern, 0x2000);

        assert_eq!(matches, vec![Match::new(0x2001, vec![0xBB, 0xCC])]);
    }

    #[test]
    fn missing_literal_rejected_by_prefilter() {
        let pattern = WildcardPattern::compile("99 ??").unwrap();
        let content = hex("AABBCCDD");

        assert!(!pattern.may_match(&content));
        assert!(find_wildcard(&content, &pattern, 0).is_empty());
    }

    #[test]
    fn wildcard_matches_newline_and_high_bytes() {
        let pattern = WildcardPattern::compile("FF ?? 80").unwrap();
        let matches = find_wildcard(&[0x00, 0xFF, b'\n', 0x80], &pattern, 0);

        assert_eq!(matches, vec![Match::new(1, vec![0xFF, b'\n', 0x80])]);
    }

    #[test]
    fn lowercase_tokens_accepted() {
        let pattern = WildcardPattern::compile("de ad ?? ef").unwrap();
        assert_eq!(pattern.to_string(), "DE AD ?? EF");
    }

    #[test]
    fn malformed_patterns() {
        for bad in ["", "   ", "1", "123", "GG", "12 ? 34", "12 3?", "0x12", "12,34"] {
            let err = WildcardPattern::compile(bad).unwrap_err();
            assert!(err.is_invalid_pattern(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn literal_run_selection() {
        let pattern = WildcardPattern::compile("01 ?? 02 03 04 ?? 05 06").unwrap();
        assert_eq!(pattern.literal_run(), &[0x02, 0x03, 0x04]);

        let all_wild = WildcardPattern::compile("?? ??").unwrap();
        assert!(all_wild.literal_run().is_empty());
        assert!(all_wild.may_match(&[0, 0]));
        assert!(!all_wild.may_match(&[0]));
    }

    #[test]
    fn matches_are_non_overlapping() {
        let pattern = WildcardPattern::compile("AA ??").unwrap();
        let offsets: Vec<usize> = find_wildcard(&hex("AAAAAAAA"), &pattern, 0)
            .into_iter()
            .map(|m| m.base_address)
            .collect();

        assert_eq!(offsets, vec![0, 2]);
    }

    /// Every content over a small alphabet up to length 6: whenever the pattern
    /// occurs at some offset, the prefilter must let the content through, and the
    /// compiled matcher must agree with a byte-by-byte comparison.
    #[test]
    fn prefilter_has_no_false_negatives() {
        let alphabet = [0x12u8, 0x34, 0x78, 0xAA];
        let patterns = ["12 ?? 34", "34 78 ?? ?? 12", "?? AA", "12 34 ?? 78", "78"];

        for text in patterns {
            let pattern = WildcardPattern::compile(text).unwrap();

            for len in 0..=6u32 {
                for mut n in 0..alphabet.len().pow(len) {
                    let mut content = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        content.push(alphabet[n % alphabet.len()]);
                        n /= alphabet.len();
                    }

                    let occurs = (0..content.len()).any(|i| pattern.matches_at(&content, i));
                    let found = find_wildcard(&content, &pattern, 0);

                    assert_eq!(occurs, !found.is_empty(), "{text} in {content:02X?}");
                    if occurs {
                        assert!(pattern.may_match(&content), "{text} in {content:02X?}");
                    }
                    for m in found {
                        assert!(pattern.matches_at(&content, m.base_address));
                    }
                }
            }
        }
    }
}
