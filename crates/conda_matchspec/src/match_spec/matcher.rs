use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use glob::Pattern;
use regex::Regex;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// Match a string against an exact value, a glob pattern or a regex.
///
/// The textual form decides the flavor: a value wrapped in `^` and `$` is
/// compiled as a regex, a value containing `*` becomes a glob, anything else
/// is compared literally.
#[derive(Debug, Clone, SerializeDisplay, DeserializeFromStr)]
pub enum StringMatcher {
    /// The string must be an exact match.
    Exact(String),
    /// The string must match the glob pattern.
    Glob(Pattern),
    /// The string must match the regular expression.
    Regex(Regex),
}

impl StringMatcher {
    /// Returns whether `other` matches this matcher.
    pub fn matches(&self, other: &str) -> bool {
        match self {
            StringMatcher::Exact(value) => value == other,
            StringMatcher::Glob(glob) => glob.matches(other),
            StringMatcher::Regex(regex) => regex.is_match(other),
        }
    }

    /// The exact string this matcher accepts, if it is not a pattern.
    pub fn exact_value(&self) -> Option<&str> {
        match self {
            StringMatcher::Exact(value) => Some(value),
            StringMatcher::Glob(_) | StringMatcher::Regex(_) => None,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            StringMatcher::Exact(value) => value,
            StringMatcher::Glob(glob) => glob.as_str(),
            StringMatcher::Regex(regex) => regex.as_str(),
        }
    }
}

impl Display for StringMatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Hash for StringMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialEq for StringMatcher {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.as_str() == other.as_str()
    }
}

impl Eq for StringMatcher {}

/// An error that occurred when parsing a [`StringMatcher`].
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum StringMatcherParseError {
    /// The string is not a valid glob.
    #[error("invalid glob: {glob}")]
    InvalidGlob {
        /// The invalid glob.
        glob: String,
    },
    /// The string is not a valid regex.
    #[error("invalid regex: {regex}")]
    InvalidRegex {
        /// The invalid regex.
        regex: String,
    },
}

impl FromStr for StringMatcher {
    type Err = StringMatcherParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('^') && s.ends_with('$') {
            Ok(StringMatcher::Regex(Regex::new(s).map_err(|_| {
                StringMatcherParseError::InvalidRegex {
                    regex: s.to_owned(),
                }
            })?))
        } else if s.contains('*') {
            Ok(StringMatcher::Glob(Pattern::new(s).map_err(|_| {
                StringMatcherParseError::InvalidGlob { glob: s.to_owned() }
            })?))
        } else {
            Ok(StringMatcher::Exact(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use assert_matches::assert_matches;

    use super::{StringMatcher, StringMatcherParseError};

    #[test]
    fn test_exact() {
        let matcher = StringMatcher::from_str("py38_0").unwrap();
        assert_matches!(&matcher, StringMatcher::Exact(_));
        assert!(matcher.matches("py38_0"));
        assert!(!matcher.matches("py38_1"));
        assert_eq!(matcher.exact_value(), Some("py38_0"));
    }

    #[test]
    fn test_glob() {
        let matcher = StringMatcher::from_str("py38*").unwrap();
        assert_matches!(&matcher, StringMatcher::Glob(_));
        assert!(matcher.matches("py38_0"));
        assert!(!matcher.matches("py37_0"));
        assert!(!matcher.matches("ppy38_0"));
        assert_eq!(matcher.exact_value(), None);

        let matcher = StringMatcher::from_str("*openblas*").unwrap();
        assert!(matcher.matches("openblas_0"));
        assert!(matcher.matches("3_openblas"));
        assert!(!matcher.matches("mkl_0"));
    }

    #[test]
    fn test_regex() {
        let matcher = StringMatcher::from_str("^py3[678]$").unwrap();
        assert_matches!(&matcher, StringMatcher::Regex(_));
        assert!(matcher.matches("py38"));
        assert!(!matcher.matches("py39"));
        assert_eq!(matcher.exact_value(), None);
        assert_eq!(matcher.to_string(), "^py3[678]$");
    }

    #[test]
    fn test_equality_distinguishes_flavor() {
        // "^foo$" as a regex and as an exact string are different matchers.
        let regex = StringMatcher::from_str("^foo$").unwrap();
        let exact = StringMatcher::Exact("^foo$".to_owned());
        assert_ne!(regex, exact);
        assert_eq!(regex, StringMatcher::from_str("^foo$").unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert_matches!(
            StringMatcher::from_str("[*"),
            Err(StringMatcherParseError::InvalidGlob { .. })
        );
        assert_matches!(
            StringMatcher::from_str("^[$"),
            Err(StringMatcherParseError::InvalidRegex { .. })
        );
    }

    #[test]
    fn test_display_round_trip() {
        for source in ["py38_0", "py38*", "^py3[678]$", "*"] {
            let matcher = StringMatcher::from_str(source).unwrap();
            assert_eq!(matcher.to_string(), source);
            assert_eq!(StringMatcher::from_str(source).unwrap(), matcher);
        }
    }
}
