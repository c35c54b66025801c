use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::platform::Platform;

/// A set of required feature entries, e.g. `blas=mkl vc=14`.
///
/// Feature strings are whitespace or comma separated tokens. Tokens go
/// through the legacy translation that maps `mkl`-family tokens onto the
/// `blas` key and `vcNN` tokens onto the `vc` key before they are stored, so
/// both the spec side and the record side compare in the same vocabulary.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    entries: Vec<(String, String)>,
    platform: Platform,
}

impl FeatureSet {
    /// Parses a feature string into a set of entries. Tokens that translate
    /// to nothing (empty or lone `@`) are dropped; a later token with an
    /// already-present key replaces the value in place.
    pub fn parse(source: &str, platform: Platform) -> Self {
        let mut set = FeatureSet {
            entries: Vec::new(),
            platform,
        };
        for token in source.split(|c: char| c.is_whitespace() || c == ',') {
            if let Some((key, value)) = translate_feature(token, platform) {
                set.insert(key, value);
            }
        }
        set
    }

    fn insert(&mut self, key: String, value: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Merges another set into this one. Entries with the same key replace
    /// earlier ones.
    pub(crate) fn extend(&mut self, other: FeatureSet) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Returns whether a record's feature string provides every entry of
    /// this set. The record string is translated under the same platform.
    pub fn matches(&self, track_features: &str) -> bool {
        let provided = FeatureSet::parse(track_features, self.platform);
        self.entries
            .iter()
            .all(|entry| provided.entries.contains(entry))
    }

    /// True when no entries survived translation.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for FeatureSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.entries
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .join(" ")
        )
    }
}

impl PartialEq for FeatureSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for FeatureSet {}

impl Hash for FeatureSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entries.hash(state);
    }
}

/// The blas implementation `nomkl` stands for on the given platform.
fn nomkl_substitute(platform: Platform) -> &'static str {
    if platform == Platform::Osx64 {
        "accelerate"
    } else {
        "openblas"
    }
}

/// Translates one feature token into a key/value entry.
fn translate_feature(token: &str, platform: Platform) -> Option<(String, String)> {
    let token = token.strip_suffix('@').unwrap_or(token);
    if token.is_empty() {
        return None;
    }
    if let Some((key, value)) = token.split_once('=') {
        let value = if value == "nomkl" {
            nomkl_substitute(platform)
        } else {
            value
        };
        Some((key.to_owned(), value.to_owned()))
    } else if token.contains("mkl") {
        let value = if token == "nomkl" {
            nomkl_substitute(platform)
        } else {
            token
        };
        Some((String::from("blas"), value.to_owned()))
    } else if token.len() == 4 && token.starts_with("vc") && token[2..].parse::<u8>().is_ok() {
        Some((String::from("vc"), token[2..].to_owned()))
    } else {
        Some((token.to_owned(), String::from("true")))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::FeatureSet;
    use crate::platform::Platform;

    #[rstest]
    #[case("mkl", Platform::Linux64, "blas=mkl")]
    #[case("nomkl", Platform::Linux64, "blas=openblas")]
    #[case("nomkl", Platform::Osx64, "blas=accelerate")]
    #[case("blas=nomkl", Platform::Linux64, "blas=openblas")]
    #[case("blas=mkl", Platform::Linux64, "blas=mkl")]
    #[case("vc14", Platform::Win64, "vc=14")]
    #[case("vc9", Platform::Win64, "vc9=true")]
    #[case("debug", Platform::Linux64, "debug=true")]
    #[case("mkl@", Platform::Linux64, "blas=mkl")]
    #[case("mkl debug", Platform::Linux64, "blas=mkl debug=true")]
    #[case("mkl,debug", Platform::Linux64, "blas=mkl debug=true")]
    #[case("mkl blas=openblas", Platform::Linux64, "blas=openblas")]
    #[case("@ ,", Platform::Linux64, "")]
    fn test_translation(#[case] source: &str, #[case] platform: Platform, #[case] expected: &str) {
        assert_eq!(FeatureSet::parse(source, platform).to_string(), expected);
    }

    #[test]
    fn test_subset_matching() {
        let required = FeatureSet::parse("mkl", Platform::Linux64);
        assert!(required.matches("blas=mkl debug"));
        assert!(required.matches("mkl"));
        assert!(!required.matches("debug"));
        assert!(!required.matches(""));

        let required = FeatureSet::parse("mkl debug", Platform::Linux64);
        assert!(required.matches("debug blas=mkl extra"));
        assert!(!required.matches("blas=mkl"));
    }

    #[test]
    fn test_identity_ignores_platform() {
        // The platform only drives translation; the translated entries are
        // the identity.
        let linux = FeatureSet::parse("mkl", Platform::Linux64);
        let windows = FeatureSet::parse("mkl", Platform::Win64);
        assert_eq!(linux, windows);
        assert_ne!(
            FeatureSet::parse("nomkl", Platform::Linux64),
            FeatureSet::parse("nomkl", Platform::Osx64)
        );
    }

    #[test]
    fn test_empty() {
        assert!(FeatureSet::parse("", Platform::Linux64).is_empty());
        assert!(FeatureSet::parse("  @ ", Platform::Linux64).is_empty());
        assert!(!FeatureSet::parse("mkl", Platform::Linux64).is_empty());
    }
}
