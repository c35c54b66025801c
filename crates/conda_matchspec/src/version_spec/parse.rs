use glob::Pattern;
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::opt,
    error::{ErrorKind, ParseError},
    sequence::tuple,
    IResult,
};
use thiserror::Error;

use crate::version::ParseVersionError;
use crate::version_spec::constraint::Constraint;
use crate::version_spec::version_tree::is_operator_char;
use crate::version_spec::{
    EqualityOperator, RangeOperator, StrictRangeOperator, VersionOperators,
};

#[derive(Debug, Clone, Error, Eq, PartialEq)]
enum ParseOperatorError<'i> {
    #[error("invalid operator '{0}'")]
    InvalidOperator(&'i str),
    #[error("expected version operator")]
    ExpectedOperator,
}

/// Parses a version operator, returns an error if the operator is not
/// recognized or not found.
fn operator_parser(input: &str) -> IResult<&str, VersionOperators, ParseOperatorError<'_>> {
    // Take anything that looks like an operator.
    let (rest, operator_str) = take_while1::<_, _, (&str, ErrorKind)>(is_operator_char)(input)
        .map_err(|_: nom::Err<(&str, ErrorKind)>| {
            nom::Err::Error(ParseOperatorError::ExpectedOperator)
        })?;

    let op = match operator_str {
        "==" => VersionOperators::Exact(EqualityOperator::Equals),
        "!=" => VersionOperators::Exact(EqualityOperator::NotEquals),
        "<=" => VersionOperators::Range(RangeOperator::LessEquals),
        ">=" => VersionOperators::Range(RangeOperator::GreaterEquals),
        "<" => VersionOperators::Range(RangeOperator::Less),
        ">" => VersionOperators::Range(RangeOperator::Greater),
        "=" => VersionOperators::StrictRange(StrictRangeOperator::StartsWith),
        _ => {
            return Err(nom::Err::Failure(ParseOperatorError::InvalidOperator(
                operator_str,
            )))
        }
    };

    Ok((rest, op))
}

/// An error that can occur when parsing a single version constraint.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ParseConstraintError {
    /// A glob pattern was combined with an operator that cannot carry one.
    #[error("'*' is incompatible with the '{0}' operator")]
    GlobVersionIncompatibleWithOperator(VersionOperators),
    /// The constraint looks like a regular expression.
    #[error("regex constraints are not supported")]
    RegexConstraintsNotSupported,
    /// The constraint starts a regular expression without terminating it.
    #[error("unterminated unsupported regular expression")]
    UnterminatedRegex,
    /// An unrecognized sequence of operator characters.
    #[error("invalid operator '{0}'")]
    InvalidOperator(String),
    /// The compatibility release operator of other ecosystems.
    #[error("the operator '~=' is not supported")]
    CompatibleOperatorNotSupported,
    /// The version part of the constraint could not be parsed.
    #[error(transparent)]
    InvalidVersion(#[from] ParseVersionError),
    /// A wildcard pattern that is not a valid glob.
    #[error("invalid glob pattern '{glob}'")]
    InvalidGlob {
        /// The offending pattern.
        glob: String,
    },
    /// Expected a version
    #[error("expected a version")]
    ExpectedVersion,
    /// Expected the end of the string
    #[error("encountered more characters but expected none")]
    ExpectedEof,
    /// Nom error
    #[error("{0:?}")]
    Nom(ErrorKind),
}

impl<'i> ParseError<&'i str> for ParseConstraintError {
    fn from_error_kind(_: &'i str, kind: ErrorKind) -> Self {
        ParseConstraintError::Nom(kind)
    }

    fn append(_: &'i str, _: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Parses a regex constraint. Returns an error if no terminating `$` is found.
fn regex_constraint_parser(input: &str) -> IResult<&str, Constraint, ParseConstraintError> {
    let (_rest, (_, _, terminator)) =
        tuple((char('^'), take_while(|c| c != '$'), opt(char('$'))))(input)?;
    match terminator {
        Some(_) => Err(nom::Err::Failure(
            ParseConstraintError::RegexConstraintsNotSupported,
        )),
        None => Err(nom::Err::Failure(ParseConstraintError::UnterminatedRegex)),
    }
}

/// The wildcard shape of a version literal.
enum Wildcard<'a> {
    /// No `*` anywhere.
    None,
    /// A single `*` forming a trailing `.*`. Holds the part before it.
    TrailingDotStar(&'a str),
    /// A single trailing `*` not preceded by a `.`. Holds the part before it.
    TrailingStar(&'a str),
    /// One or more `*` elsewhere in the string.
    Mixed,
}

fn classify_wildcard(version_str: &str) -> Wildcard<'_> {
    match version_str.matches('*').count() {
        0 => Wildcard::None,
        1 if version_str.ends_with(".*") => {
            Wildcard::TrailingDotStar(&version_str[..version_str.len() - 2])
        }
        1 if version_str.ends_with('*') => {
            Wildcard::TrailingStar(&version_str[..version_str.len() - 1])
        }
        _ => Wildcard::Mixed,
    }
}

fn glob_pattern(pattern_str: &str) -> Result<Pattern, ParseConstraintError> {
    Pattern::new(pattern_str).map_err(|_| ParseConstraintError::InvalidGlob {
        glob: pattern_str.to_owned(),
    })
}

/// Combines an optional operator and a version literal into a constraint,
/// reconciling wildcards in the literal with the operator.
fn build_constraint(
    op: Option<VersionOperators>,
    version_str: &str,
) -> Result<Constraint, ParseConstraintError> {
    use VersionOperators::{Exact, Range, StrictRange};

    // Pure wildcard forms (`*`, `*.*`) match any version, also in their
    // fuzzy spelling `=*`.
    if version_str.contains('*')
        && version_str.chars().all(|c| matches!(c, '*' | '.'))
        && matches!(
            op,
            None | Some(StrictRange(StrictRangeOperator::StartsWith))
        )
    {
        return Ok(Constraint::Any);
    }

    let wildcard = classify_wildcard(version_str);
    match (op, wildcard) {
        // A bare literal is a raw string equality constraint.
        (None, Wildcard::None) => Ok(Constraint::Exact(
            EqualityOperator::Equals,
            version_str.to_owned(),
        )),
        // A trailing `.*` means a segment-wise prefix match, any other
        // wildcard is a plain glob over the version string.
        (None, Wildcard::TrailingDotStar(stem)) => Ok(Constraint::Prefix(
            StrictRangeOperator::StartsWith,
            stem.parse()?,
        )),
        (None, Wildcard::TrailingStar(_) | Wildcard::Mixed) => {
            Ok(Constraint::Glob(glob_pattern(version_str)?))
        }

        (Some(Exact(eq)), Wildcard::None) => Ok(Constraint::Exact(eq, version_str.to_owned())),
        (Some(Exact(EqualityOperator::NotEquals)), Wildcard::TrailingDotStar(stem)) => Ok(
            Constraint::Prefix(StrictRangeOperator::NotStartsWith, stem.parse()?),
        ),
        (Some(Exact(EqualityOperator::NotEquals)), Wildcard::TrailingStar(stem)) => {
            tracing::warn!(
                "Using '!={version_str}' is deprecated, use '!={stem}.*' instead."
            );
            Ok(Constraint::Prefix(
                StrictRangeOperator::NotStartsWith,
                stem.parse()?,
            ))
        }
        (Some(op @ Exact(_)), _) => {
            Err(ParseConstraintError::GlobVersionIncompatibleWithOperator(op))
        }

        (Some(Range(r)), Wildcard::None) => Ok(Constraint::Comparison(r, version_str.parse()?)),
        (
            Some(Range(r)),
            Wildcard::TrailingDotStar(stem) | Wildcard::TrailingStar(stem),
        ) => {
            // Globs on an ordered comparison carry no meaning. conda drops
            // them, widening `>` to `>=` so that e.g. `>1.8.*` still admits
            // 1.8.1.
            let mapped = match r {
                RangeOperator::Greater => RangeOperator::GreaterEquals,
                r => r,
            };
            tracing::warn!(
                "Using glob '{version_str}' with a relational operator is superfluous and deprecated and will be removed in a future release, interpreting it as '{mapped}{stem}'."
            );
            Ok(Constraint::Comparison(mapped, stem.parse()?))
        }
        (Some(op @ Range(_)), Wildcard::Mixed) => {
            Err(ParseConstraintError::GlobVersionIncompatibleWithOperator(op))
        }

        // Fuzzy `=`: trailing `.*` is a prefix match, anything else becomes
        // a glob with a `*` appended when the literal does not already end
        // in one.
        (Some(StrictRange(StrictRangeOperator::StartsWith)), wildcard) => match wildcard {
            Wildcard::TrailingDotStar(stem) => Ok(Constraint::Prefix(
                StrictRangeOperator::StartsWith,
                stem.parse()?,
            )),
            Wildcard::None => Ok(Constraint::Glob(glob_pattern(&format!("{version_str}*"))?)),
            Wildcard::TrailingStar(_) | Wildcard::Mixed => {
                Ok(Constraint::Glob(glob_pattern(version_str)?))
            }
        },

        // The operator table never produces the negated prefix form.
        (Some(StrictRange(StrictRangeOperator::NotStartsWith)), _) => Err(
            ParseConstraintError::InvalidOperator("!=startswith".to_owned()),
        ),
    }
}

/// Parses a constraint with an optional operator in front of it.
fn logical_constraint_parser(input: &str) -> IResult<&str, Constraint, ParseConstraintError> {
    // Parse the optional preceding operator.
    let (input, op) = match operator_parser(input) {
        Err(
            nom::Err::Failure(ParseOperatorError::InvalidOperator(op))
            | nom::Err::Error(ParseOperatorError::InvalidOperator(op)),
        ) => {
            return Err(nom::Err::Failure(if op == "~=" {
                ParseConstraintError::CompatibleOperatorNotSupported
            } else {
                ParseConstraintError::InvalidOperator(op.to_owned())
            }))
        }
        Err(nom::Err::Error(_)) => (input, None),
        Ok((rest, op)) => (rest, Some(op)),
        Err(_) => unreachable!(),
    };

    // The operator and the version may be separated by whitespace.
    let (input, _) = multispace0::<_, ParseConstraintError>(input)?;

    // Take everything that looks like a version.
    let (rest, version_str) = take_while1::<_, _, (&str, ErrorKind)>(|c: char| {
        c.is_alphanumeric() || "!-_.*+".contains(c)
    })(input)
    .map_err(|_: nom::Err<(&str, ErrorKind)>| {
        nom::Err::Error(ParseConstraintError::ExpectedVersion)
    })?;

    // A trailing `$` means the input was a regular expression after all.
    if rest.starts_with('$') {
        return Err(nom::Err::Failure(
            ParseConstraintError::RegexConstraintsNotSupported,
        ));
    }

    let constraint = build_constraint(op, version_str).map_err(nom::Err::Failure)?;
    Ok((rest, constraint))
}

/// Parses a version constraint.
pub(crate) fn constraint_parser(input: &str) -> IResult<&str, Constraint, ParseConstraintError> {
    alt((regex_constraint_parser, logical_constraint_parser))(input)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use assert_matches::assert_matches;

    use super::*;
    use crate::version::Version;
    use crate::version_spec::VersionSpec;

    #[test]
    fn test_operator_parser() {
        assert_eq!(
            operator_parser(">3.1"),
            Ok(("3.1", VersionOperators::Range(RangeOperator::Greater)))
        );
        assert_eq!(
            operator_parser(">=3.1"),
            Ok(("3.1", VersionOperators::Range(RangeOperator::GreaterEquals)))
        );
        assert_eq!(
            operator_parser("<3.1"),
            Ok(("3.1", VersionOperators::Range(RangeOperator::Less)))
        );
        assert_eq!(
            operator_parser("<=3.1"),
            Ok(("3.1", VersionOperators::Range(RangeOperator::LessEquals)))
        );
        assert_eq!(
            operator_parser("==3.1"),
            Ok(("3.1", VersionOperators::Exact(EqualityOperator::Equals)))
        );
        assert_eq!(
            operator_parser("!=3.1"),
            Ok(("3.1", VersionOperators::Exact(EqualityOperator::NotEquals)))
        );
        assert_eq!(
            operator_parser("=3.1"),
            Ok((
                "3.1",
                VersionOperators::StrictRange(StrictRangeOperator::StartsWith)
            ))
        );

        assert_eq!(
            operator_parser("<==>3.1"),
            Err(nom::Err::Failure(ParseOperatorError::InvalidOperator(
                "<==>"
            )))
        );
        assert_eq!(
            operator_parser("3.1"),
            Err(nom::Err::Error(ParseOperatorError::ExpectedOperator))
        );
    }

    #[test]
    fn parse_regex_constraint() {
        assert_eq!(
            regex_constraint_parser("^.*"),
            Err(nom::Err::Failure(ParseConstraintError::UnterminatedRegex))
        );
        assert_eq!(
            regex_constraint_parser("^"),
            Err(nom::Err::Failure(ParseConstraintError::UnterminatedRegex))
        );
        assert_eq!(
            regex_constraint_parser("^$"),
            Err(nom::Err::Failure(
                ParseConstraintError::RegexConstraintsNotSupported
            ))
        );
        assert_eq!(
            regex_constraint_parser("^1.2.3$"),
            Err(nom::Err::Failure(
                ParseConstraintError::RegexConstraintsNotSupported
            ))
        );
    }

    #[test]
    fn parse_logical_constraint() {
        assert_eq!(
            logical_constraint_parser("3.1"),
            Ok((
                "",
                Constraint::Exact(EqualityOperator::Equals, "3.1".to_owned())
            ))
        );

        assert_eq!(
            logical_constraint_parser(">3.1"),
            Ok((
                "",
                Constraint::Comparison(
                    RangeOperator::Greater,
                    Version::from_str("3.1").unwrap()
                )
            ))
        );

        // A trailing `.*` is a segment-wise prefix match.
        assert_eq!(
            logical_constraint_parser("3.1.*"),
            Ok((
                "",
                Constraint::Prefix(
                    StrictRangeOperator::StartsWith,
                    Version::from_str("3.1").unwrap()
                )
            ))
        );

        // A bare trailing `*` is a glob over the whole version string.
        assert_matches!(
            logical_constraint_parser("3.1*"),
            Ok(("", Constraint::Glob(pattern))) if pattern.as_str() == "3.1*"
        );

        // The fuzzy operator appends a `*` when none is present.
        assert_matches!(
            logical_constraint_parser("=3.1"),
            Ok(("", Constraint::Glob(pattern))) if pattern.as_str() == "3.1*"
        );

        // Globs on ordered comparisons are dropped, widening `>` to `>=`.
        assert_eq!(
            logical_constraint_parser(">=3.1*"),
            Ok((
                "",
                Constraint::Comparison(
                    RangeOperator::GreaterEquals,
                    Version::from_str("3.1").unwrap()
                )
            ))
        );
        assert_eq!(
            logical_constraint_parser(">3.1.*"),
            Ok((
                "",
                Constraint::Comparison(
                    RangeOperator::GreaterEquals,
                    Version::from_str("3.1").unwrap()
                )
            ))
        );

        assert_eq!(
            logical_constraint_parser("!=3.1.*"),
            Ok((
                "",
                Constraint::Prefix(
                    StrictRangeOperator::NotStartsWith,
                    Version::from_str("3.1").unwrap()
                )
            ))
        );

        assert_matches!(
            logical_constraint_parser("==3.1*"),
            Err(nom::Err::Failure(
                ParseConstraintError::GlobVersionIncompatibleWithOperator(_)
            ))
        );
        assert_matches!(
            logical_constraint_parser("~=2.4"),
            Err(nom::Err::Failure(
                ParseConstraintError::CompatibleOperatorNotSupported
            ))
        );
        assert_matches!(
            logical_constraint_parser("=!=2.4"),
            Err(nom::Err::Failure(ParseConstraintError::InvalidOperator(_)))
        );
    }

    #[test]
    fn parse_constraint() {
        // Regular expressions
        assert_eq!(
            constraint_parser("^1.2.3$"),
            Err(nom::Err::Failure(
                ParseConstraintError::RegexConstraintsNotSupported
            ))
        );
        assert_eq!(
            constraint_parser("^1.2.3"),
            Err(nom::Err::Failure(ParseConstraintError::UnterminatedRegex))
        );

        // Any constraints
        assert_eq!(constraint_parser("*"), Ok(("", Constraint::Any)));
        assert_eq!(constraint_parser("*.*"), Ok(("", Constraint::Any)));
        assert_eq!(constraint_parser("=*"), Ok(("", Constraint::Any)));

        // A leading wildcard is an ordinary glob.
        assert_matches!(
            constraint_parser("*.7.*"),
            Ok(("", Constraint::Glob(pattern))) if pattern.as_str() == "*.7.*"
        );
    }

    #[test]
    fn version_with_local_part() {
        assert!(VersionSpec::from_str("1.8.1+g6b29558").is_ok());
    }
}
