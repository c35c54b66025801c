//! The version constraint language of match specs.
//!
//! A version spec is a boolean expression over single version constraints,
//! e.g. `>=1.8,<2|1.7.1`. The `,` (and) separator binds tighter than `|`
//! (or) and parentheses can override the precedence.

mod constraint;
pub(crate) mod parse;
pub(crate) mod version_tree;

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use glob::Pattern;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use crate::version::Version;
pub(crate) use constraint::Constraint;
pub use parse::ParseConstraintError;
pub use version_tree::ParseVersionTreeError;
use version_tree::VersionTree;

/// The operator to compare two versions for raw string (in)equality.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EqualityOperator {
    /// Raw string equality.
    Equals,
    /// Raw string inequality.
    NotEquals,
}

impl Display for EqualityOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EqualityOperator::Equals => write!(f, "=="),
            EqualityOperator::NotEquals => write!(f, "!="),
        }
    }
}

/// An operator that orders two versions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RangeOperator {
    /// Strictly greater than the bound.
    Greater,
    /// Greater than or equal to the bound.
    GreaterEquals,
    /// Strictly less than the bound.
    Less,
    /// Less than or equal to the bound.
    LessEquals,
}

impl Display for RangeOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RangeOperator::Greater => write!(f, ">"),
            RangeOperator::GreaterEquals => write!(f, ">="),
            RangeOperator::Less => write!(f, "<"),
            RangeOperator::LessEquals => write!(f, "<="),
        }
    }
}

/// An operator that matches a segment-wise prefix of a version.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StrictRangeOperator {
    /// The version must start with the prefix.
    StartsWith,
    /// The version must not start with the prefix.
    NotStartsWith,
}

impl Display for StrictRangeOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StrictRangeOperator::StartsWith => write!(f, "="),
            StrictRangeOperator::NotStartsWith => write!(f, "!=startswith"),
        }
    }
}

/// Union of all the operators a single constraint can carry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VersionOperators {
    /// Raw string (in)equality.
    Exact(EqualityOperator),
    /// Ordered comparison.
    Range(RangeOperator),
    /// Segment-wise prefix match.
    StrictRange(StrictRangeOperator),
}

impl Display for VersionOperators {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VersionOperators::Exact(op) => write!(f, "{op}"),
            VersionOperators::Range(op) => write!(f, "{op}"),
            VersionOperators::StrictRange(op) => write!(f, "{op}"),
        }
    }
}

/// The logical operators that combine the parts of a [`VersionSpec`] group.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LogicalOperator {
    /// All parts must match.
    And,
    /// At least one of the parts must match.
    Or,
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, ","),
            LogicalOperator::Or => write!(f, "|"),
        }
    }
}

/// A version constraint expression.
#[derive(Debug, Clone, Eq, PartialEq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum VersionSpec {
    /// Matches any version (`*`).
    Any,
    /// Raw string (in)equality against the version string (`==`, `!=`).
    Exact(EqualityOperator, String),
    /// Ordered comparison against a version.
    Range(RangeOperator, Version),
    /// Segment-wise prefix match (`1.2.*`) or its negation.
    Prefix(StrictRangeOperator, Version),
    /// Glob pattern over the raw version string.
    Glob(Pattern),
    /// A group of specs combined with a logical operator.
    Group(LogicalOperator, Vec<VersionSpec>),
}

/// An error that occurred when parsing a version spec expression.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ParseVersionSpecError {
    /// One of the constraints in the expression is invalid.
    #[error(transparent)]
    InvalidConstraint(#[from] ParseConstraintError),
    /// The expression structure itself is invalid.
    #[error(transparent)]
    InvalidVersionTree(#[from] ParseVersionTreeError),
}

impl From<Constraint> for VersionSpec {
    fn from(constraint: Constraint) -> Self {
        match constraint {
            Constraint::Any => VersionSpec::Any,
            Constraint::Exact(op, literal) => VersionSpec::Exact(op, literal),
            Constraint::Comparison(op, version) => VersionSpec::Range(op, version),
            Constraint::Prefix(op, version) => VersionSpec::Prefix(op, version),
            Constraint::Glob(pattern) => VersionSpec::Glob(pattern),
        }
    }
}

impl FromStr for VersionSpec {
    type Err = ParseVersionSpecError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        fn parse_tree(tree: VersionTree<'_>) -> Result<VersionSpec, ParseVersionSpecError> {
            match tree {
                VersionTree::Term(term) => Ok(Constraint::from_str(term)?.into()),
                VersionTree::Group(op, args) => Ok(VersionSpec::Group(
                    op,
                    args.into_iter()
                        .map(parse_tree)
                        .collect::<Result<_, _>>()?,
                )),
            }
        }

        let tree = VersionTree::try_from(source.trim())?;
        parse_tree(tree)
    }
}

impl Display for VersionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fn write_component(
            spec: &VersionSpec,
            f: &mut Formatter<'_>,
            part_of_and: bool,
        ) -> fmt::Result {
            match spec {
                VersionSpec::Any => write!(f, "*"),
                VersionSpec::Exact(EqualityOperator::Equals, literal) => write!(f, "{literal}"),
                VersionSpec::Exact(EqualityOperator::NotEquals, literal) => {
                    write!(f, "!={literal}")
                }
                VersionSpec::Range(op, version) => write!(f, "{op}{version}"),
                VersionSpec::Prefix(StrictRangeOperator::StartsWith, version) => {
                    write!(f, "{version}.*")
                }
                VersionSpec::Prefix(StrictRangeOperator::NotStartsWith, version) => {
                    write!(f, "!={version}.*")
                }
                VersionSpec::Glob(pattern) => write!(f, "{}", pattern.as_str()),
                VersionSpec::Group(op, components) => {
                    // An or-group nested in an and-group needs parentheses
                    // because `,` binds tighter than `|`.
                    let requires_parenthesis = *op == LogicalOperator::Or && part_of_and;
                    if requires_parenthesis {
                        write!(f, "(")?;
                    }
                    for (index, component) in components.iter().enumerate() {
                        if index > 0 {
                            write!(f, "{op}")?;
                        }
                        write_component(component, f, *op == LogicalOperator::And)?;
                    }
                    if requires_parenthesis {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        write_component(self, f, false)
    }
}

impl VersionSpec {
    /// Returns whether the given version satisfies this spec.
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Exact(EqualityOperator::Equals, literal) => version.as_str() == literal,
            VersionSpec::Exact(EqualityOperator::NotEquals, literal) => {
                version.as_str() != literal
            }
            VersionSpec::Range(op, bound) => match op {
                RangeOperator::Greater => version > bound,
                RangeOperator::GreaterEquals => version >= bound,
                RangeOperator::Less => version < bound,
                RangeOperator::LessEquals => version <= bound,
            },
            VersionSpec::Prefix(StrictRangeOperator::StartsWith, prefix) => {
                version.starts_with(prefix)
            }
            VersionSpec::Prefix(StrictRangeOperator::NotStartsWith, prefix) => {
                !version.starts_with(prefix)
            }
            VersionSpec::Glob(pattern) => pattern.matches(version.as_str()),
            VersionSpec::Group(LogicalOperator::And, components) => {
                components.iter().all(|spec| spec.matches(version))
            }
            VersionSpec::Group(LogicalOperator::Or, components) => {
                components.iter().any(|spec| spec.matches(version))
            }
        }
    }

    /// The single version string this spec admits, when it pins exactly one.
    pub fn exact_value(&self) -> Option<&str> {
        match self {
            VersionSpec::Exact(EqualityOperator::Equals, literal) => Some(literal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::{EqualityOperator, LogicalOperator, RangeOperator, VersionSpec};
    use crate::version::Version;

    #[test]
    fn test_simple() {
        assert_eq!(
            VersionSpec::from_str("1.2.3"),
            Ok(VersionSpec::Exact(
                EqualityOperator::Equals,
                "1.2.3".to_owned()
            ))
        );
        assert_eq!(
            VersionSpec::from_str(">=1.2.3"),
            Ok(VersionSpec::Range(
                RangeOperator::GreaterEquals,
                Version::from_str("1.2.3").unwrap()
            ))
        );
    }

    #[test]
    fn test_group() {
        assert_eq!(
            VersionSpec::from_str(">=1.2.3,<2.0.0"),
            Ok(VersionSpec::Group(
                LogicalOperator::And,
                vec![
                    VersionSpec::Range(
                        RangeOperator::GreaterEquals,
                        Version::from_str("1.2.3").unwrap()
                    ),
                    VersionSpec::Range(
                        RangeOperator::Less,
                        Version::from_str("2.0.0").unwrap()
                    ),
                ]
            ))
        );
        assert_eq!(
            VersionSpec::from_str("1.6.2|1.7.1"),
            Ok(VersionSpec::Group(
                LogicalOperator::Or,
                vec![
                    VersionSpec::Exact(EqualityOperator::Equals, "1.6.2".to_owned()),
                    VersionSpec::Exact(EqualityOperator::Equals, "1.7.1".to_owned()),
                ]
            ))
        );
    }

    #[rstest]
    #[case("1.7.1", true)]
    #[case("1.7.0", false)]
    #[case("1.7", false)]
    #[case("==1.7.1", true)]
    #[case("!=1.7.1", false)]
    #[case("!=1.7.0", true)]
    #[case("1.7*", true)]
    #[case("1.7.*", true)]
    #[case("1.7.0.1*", false)]
    #[case("!=1.7.*", false)]
    #[case("!=1.8.*", true)]
    #[case(">=1.7", true)]
    #[case(">1.7", true)]
    #[case(">1.7.1", false)]
    #[case(">=1.7.1", true)]
    #[case("<=1.7", false)]
    #[case("<1.8", true)]
    #[case("*", true)]
    #[case("*.7.1", true)]
    #[case("1.6.2|1.7.1", true)]
    #[case("1.6.2|1.7.0", false)]
    #[case(">=1.8|1.7*", true)]
    #[case(">=1,*.7.*", true)]
    #[case(">=1.5,<1.8", true)]
    #[case(">=1.5,<1.7", false)]
    fn test_matches_1_7_1(#[case] spec: &str, #[case] expected: bool) {
        let spec = VersionSpec::from_str(spec).unwrap();
        let version = Version::from_str("1.7.1").unwrap();
        assert_eq!(spec.matches(&version), expected);
    }

    #[test]
    fn test_exact_matches_raw_string() {
        // Raw string equality: 1.7.0 and 1.7 are the same version under the
        // segment ordering, but not the same string.
        let spec = VersionSpec::from_str("==1.7").unwrap();
        assert!(spec.matches(&Version::from_str("1.7").unwrap()));
        assert!(!spec.matches(&Version::from_str("1.7.0").unwrap()));
        assert!(!spec.matches(&Version::from_str("1.07").unwrap()));

        // Ranges on the other hand use the segment ordering.
        let spec = VersionSpec::from_str(">=1.7").unwrap();
        assert!(spec.matches(&Version::from_str("1.7.0").unwrap()));
    }

    #[rstest]
    #[case("1.7.1")]
    #[case("==1.7.1")]
    #[case("!=1.7.1")]
    #[case(">=1.7")]
    #[case("<2")]
    #[case("1.7.*")]
    #[case("!=1.7.*")]
    #[case("1.7*")]
    #[case("*")]
    #[case("1.6.2|1.7.1")]
    #[case(">=1.8,<2|1.7.1")]
    #[case("(>=1.8|>2),<3")]
    fn test_display_round_trip(#[case] spec_str: &str) {
        let spec = VersionSpec::from_str(spec_str).unwrap();
        let displayed = spec.to_string();
        let reparsed = VersionSpec::from_str(&displayed).unwrap();
        assert_eq!(spec, reparsed);
        assert_eq!(displayed, reparsed.to_string());
    }

    #[test]
    fn test_display_canonicalizes() {
        // Whitespace is dropped and fuzzy forms are spelled as globs.
        assert_eq!(
            VersionSpec::from_str(">=1.0 , < 2.0").unwrap().to_string(),
            ">=1.0,<2.0"
        );
        assert_eq!(VersionSpec::from_str("=1.7").unwrap().to_string(), "1.7*");
        assert_eq!(
            VersionSpec::from_str("(1.6|1.7),1.8").unwrap().to_string(),
            "(1.6|1.7),1.8"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(VersionSpec::from_str("").is_err());
        assert!(VersionSpec::from_str("1.5|").is_err());
        assert!(VersionSpec::from_str("~=1.5").is_err());
        assert!(VersionSpec::from_str("^1\\.5$").is_err());
        assert!(VersionSpec::from_str("==1.7.*").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let spec = VersionSpec::from_str(">=1.8,<2|1.7.1").unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "\">=1.8,<2|1.7.1\"");
        let parsed: VersionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }
}
