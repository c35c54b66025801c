use std::str::FromStr;

use glob::Pattern;

use crate::version::Version;
use crate::version_spec::parse::{constraint_parser, ParseConstraintError};
use crate::version_spec::{EqualityOperator, RangeOperator, StrictRangeOperator};

/// A single version constraint, the leaf of a version spec expression.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum Constraint {
    /// Matches anything (`*`).
    Any,
    /// Raw string (in)equality (`==`, `!=`). Holds the literal, not a parsed
    /// version, because equality is defined on the string form.
    Exact(EqualityOperator, String),
    /// Ordered comparison against a version (`>`, `>=`, `<`, `<=`).
    Comparison(RangeOperator, Version),
    /// Segment-wise prefix match (`1.2.*`) or its negation (`!=1.2.*`).
    Prefix(StrictRangeOperator, Version),
    /// Glob pattern over the raw version string (`1.7*`, `*.7.*`).
    Glob(Pattern),
}

impl FromStr for Constraint {
    type Err = ParseConstraintError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match constraint_parser(input) {
            Ok(("", constraint)) => Ok(constraint),
            Ok((_, _)) => Err(ParseConstraintError::ExpectedEof),
            Err(nom::Err::Failure(e) | nom::Err::Error(e)) => Err(e),
            Err(_) => unreachable!(),
        }
    }
}
