//! A lenient version type and the ordering rules used by version
//! constraints.
//!
//! Conda version strings are not required to follow any particular scheme.
//! This module decomposes a version string into dot/dash/underscore
//! separated segments and orders two versions segment by segment. A pair of
//! segments compares numerically when both parse as unsigned integers, and
//! as plain strings otherwise. Strings that cannot be decomposed (they
//! contain an empty segment, e.g. `1..2`) still order totally through a raw
//! lexicographic fallback.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use smallvec::SmallVec;
use thiserror::Error;

/// A single separated component of a [`Version`]. Offsets index into the raw
/// string of the version that owns the segment.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: u32,
    end: u32,
    numeral: Option<u64>,
}

impl Segment {
    fn new(raw: &str, start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
            numeral: raw[start..end].parse().ok(),
        }
    }

    fn text<'v>(&self, raw: &'v str) -> &'v str {
        &raw[self.start as usize..self.end as usize]
    }
}

type SegmentVec = SmallVec<[Segment; 4]>;

/// A version of a Conda package.
///
/// The original string is always retained and is what [`Display`] and
/// [`Version::as_str`] return. Two versions are equal when they order
/// equally, so `1.0`, `1.0.0` and `1.00` all compare equal while their
/// string forms differ.
#[derive(Debug, Clone, SerializeDisplay, DeserializeFromStr)]
pub struct Version {
    raw: String,
    segments: Option<SegmentVec>,
}

impl Version {
    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if the version string could not be split into segments and
    /// orders through the raw string fallback.
    pub fn is_opaque(&self) -> bool {
        self.segments.is_none()
    }

    /// Tests whether `self` starts with all segments of `prefix`. This is a
    /// segment-wise test: `1.7.1` starts with `1.7`, but `1.70` does not.
    ///
    /// When either version is opaque the test degrades to a string prefix
    /// test on the raw forms.
    pub fn starts_with(&self, prefix: &Version) -> bool {
        match (&self.segments, &prefix.segments) {
            (Some(full), Some(pre)) => {
                pre.len() <= full.len()
                    && pre
                        .iter()
                        .zip(full.iter())
                        .all(|(p, f)| segment_cmp(p, &prefix.raw, f, &self.raw) == Ordering::Equal)
            }
            _ => self.raw.starts_with(prefix.raw.as_str()),
        }
    }

    fn significant_segments(&self) -> Option<&[Segment]> {
        let segments = self.segments.as_deref()?;
        let zeros = segments
            .iter()
            .rev()
            .take_while(|s| s.numeral == Some(0))
            .count();
        Some(&segments[..segments.len() - zeros])
    }
}

fn segment_cmp(a: &Segment, a_raw: &str, b: &Segment, b_raw: &str) -> Ordering {
    match (a.numeral, b.numeral) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.text(a_raw).cmp(b.text(b_raw)),
    }
}

fn decompose(raw: &str) -> Option<SegmentVec> {
    let mut segments = SegmentVec::new();
    let mut start = 0;
    for (idx, c) in raw.char_indices() {
        if matches!(c, '.' | '-' | '_') {
            if idx == start {
                return None;
            }
            segments.push(Segment::new(raw, start, idx));
            start = idx + 1;
        }
    }
    if start >= raw.len() {
        return None;
    }
    segments.push(Segment::new(raw, start, raw.len()));
    Some(segments)
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = match (&self.segments, &other.segments) {
            (Some(a), Some(b)) => (a, b),
            _ => return self.raw.cmp(&other.raw),
        };
        for (sa, sb) in a.iter().zip(b.iter()) {
            match segment_cmp(sa, &self.raw, sb, &other.raw) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        // One is a segment-wise prefix of the other. The longer version wins
        // only if its tail contains something other than numeric zeros, so
        // that 1.0 == 1.0.0 but 1.0 < 1.0.1.
        let all_zero = |tail: &[Segment]| tail.iter().all(|s| s.numeral == Some(0));
        match a.len().cmp(&b.len()) {
            Ordering::Less if all_zero(&b[a.len()..]) => Ordering::Equal,
            Ordering::Greater if all_zero(&a[b.len()..]) => Ordering::Equal,
            ord => ord,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Versions that compare equal must hash equally. Equal decomposed
        // versions can differ in trailing zeros and in the text of numeric
        // segments, so hash the zero-stripped numerals where present.
        match self.significant_segments() {
            Some(segments) => {
                for segment in segments {
                    match segment.numeral {
                        Some(n) => {
                            state.write_u8(1);
                            n.hash(state);
                        }
                        None => {
                            state.write_u8(0);
                            segment.text(&self.raw).hash(state);
                        }
                    }
                }
            }
            None => {
                state.write_u8(2);
                self.raw.hash(state);
            }
        }
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(ParseVersionError::Empty);
        }
        Ok(Version {
            segments: decompose(raw),
            raw: raw.to_owned(),
        })
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// An error that occurred during the parsing of a version string.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ParseVersionError {
    /// The version string was empty.
    #[error("empty version string")]
    Empty,
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::str::FromStr;

    use rstest::rstest;

    use super::Version;

    fn version(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    #[rstest]
    #[case("1.0", "1.1", Ordering::Less)]
    #[case("1.7", "1.7.1", Ordering::Less)]
    #[case("1.8", "1.7.1", Ordering::Greater)]
    #[case("1.7.1", "1.7.1", Ordering::Equal)]
    #[case("1.7", "1.7.0", Ordering::Equal)]
    #[case("1.7", "1.7.0.0", Ordering::Equal)]
    #[case("1.07", "1.7", Ordering::Equal)]
    #[case("2013a", "2013b", Ordering::Less)]
    #[case("1.2.3", "1.2.3a", Ordering::Less)]
    #[case("1", "1.post1", Ordering::Less)]
    #[case("0.4.1", "0.5.0", Ordering::Less)]
    #[case("2.7.4", "2.7.4", Ordering::Equal)]
    fn test_ordering(#[case] left: &str, #[case] right: &str, #[case] expected: Ordering) {
        assert_eq!(version(left).cmp(&version(right)), expected);
        assert_eq!(version(right).cmp(&version(left)), expected.reverse());
    }

    #[test]
    fn test_segment_kinds() {
        // Both numeric: numeric comparison, so 10 > 9.
        assert!(version("1.10") > version("1.9"));
        // Mixed: string comparison of the original texts.
        assert!(version("1.9a") > version("1.10a"));
    }

    #[test]
    fn test_opaque_fallback() {
        let opaque = version("1..2");
        assert!(opaque.is_opaque());
        assert!(!version("1.2").is_opaque());
        // Raw lexicographic order against anything once one side is opaque.
        assert!(opaque < version("1.2"));
        assert!(version("_1").is_opaque());
        assert!(version("1.2-").is_opaque());
    }

    #[rstest]
    #[case("1.7.1", "1.7", true)]
    #[case("1.7", "1.7", true)]
    #[case("1.70", "1.7", false)]
    #[case("1.7.1", "1.7.1", true)]
    #[case("1.7", "1.7.1", false)]
    #[case("2.7.4", "2", true)]
    #[case("1.07.1", "1.7", true)]
    fn test_starts_with(#[case] full: &str, #[case] prefix: &str, #[case] expected: bool) {
        assert_eq!(version(full).starts_with(&version(prefix)), expected);
    }

    #[test]
    fn test_starts_with_opaque() {
        assert!(version("1..2.3").starts_with(&version("1..2")));
        assert!(!version("1.2.3").starts_with(&version("1..2")));
    }

    fn hash_of(v: &Version) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[rstest]
    #[case("1.0", "1.0.0")]
    #[case("1.0", "1.0.0.0")]
    #[case("1.07", "1.7")]
    #[case("0", "0.0")]
    fn test_equal_versions_hash_equal(#[case] left: &str, #[case] right: &str) {
        let (left, right) = (version(left), version(right));
        assert_eq!(left, right);
        assert_eq!(hash_of(&left), hash_of(&right));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("   ").is_err());
        assert_eq!(version(" 1.0 ").as_str(), "1.0");
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["1.0", "1.0.0", "4.3.21.post699+1dab973", "2013a"] {
            assert_eq!(version(s).to_string(), s);
        }
    }
}
