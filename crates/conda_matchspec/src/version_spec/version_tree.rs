use std::convert::TryFrom;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{alpha1, char, digit1, multispace0, u32},
    combinator::{all_consuming, map, opt, recognize},
    error::{context, convert_error, ContextError, ParseError, VerboseError},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::version_spec::LogicalOperator;

/// A representation of an hierarchy of version constraints e.g.
/// `1.3.4,>=5.0.1|(1.2.4,>=3.0.1)`.
#[derive(Debug, Eq, PartialEq)]
pub(super) enum VersionTree<'a> {
    Term(&'a str),
    Group(LogicalOperator, Vec<VersionTree<'a>>),
}

/// An error that occurs when splitting a version constraint expression into
/// its tree of terms.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ParseVersionTreeError {
    /// The expression could not be parsed.
    #[error("{0}")]
    ParseError(String),
}

/// Characters that can make up a version comparison operator.
pub(crate) fn is_operator_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>' | '~')
}

/// Recognizes the version epoch
fn parse_version_epoch<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> Result<(&'a str, u32), nom::Err<E>> {
    terminated(u32, tag("!"))(input)
}

/// A parser that recognizes a version
pub(crate) fn recognize_version<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    allow_glob: bool,
) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
    /// Recognizes a single version component (`1`, `a`, `alpha`, `grub`)
    fn recognize_version_component<'a, E: ParseError<&'a str>>(
        allow_glob: bool,
    ) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
        move |input: &'a str| {
            if allow_glob {
                alt((alpha1, digit1, tag("*")))(input)
            } else {
                alt((alpha1, digit1))(input)
            }
        }
    }

    /// Recognize one or more version components (`1.2.3`)
    fn recognize_version_components<'a, E: ParseError<&'a str>>(
        allow_glob: bool,
    ) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str, E> {
        move |input: &'a str| {
            recognize(tuple((
                recognize_version_component(allow_glob),
                many0(preceded(
                    opt(take_while(|c: char| matches!(c, '.' | '-' | '_'))),
                    recognize_version_component(allow_glob),
                )),
            )))(input)
        }
    }

    move |input: &'a str| {
        recognize(tuple((
            // Optional version epoch
            opt(context("epoch", parse_version_epoch)),
            // Version components
            context("components", recognize_version_components(allow_glob)),
            // Local version
            opt(preceded(
                tag("+"),
                context("local", recognize_version_components(allow_glob)),
            )),
        )))(input)
    }
}

/// Recognize a version followed by a .* or *, or just a *
pub(crate) fn recognize_version_with_star<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> Result<(&'a str, &'a str), nom::Err<E>> {
    alt((
        // A version with an optional * or .*.
        terminated(
            recognize_version(true),
            take_while(|c: char| c == '.' || c == '*'),
        ),
        // Just a *
        tag("*"),
    ))(input)
}

/// A parser that recognizes a constraint but does not actually parse it.
/// Invalid operator sequences and unsupported forms are recognized here too,
/// so that parsing the term can report a specific error for them.
pub(crate) fn recognize_constraint<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
    input: &'a str,
) -> Result<(&'a str, &'a str), nom::Err<E>> {
    alt((
        // Version with an optional operator followed by an optional glob.
        recognize(tuple((
            opt(delimited(
                multispace0,
                take_while1(is_operator_char),
                multispace0,
            )),
            context("version", recognize_version_with_star),
        ))),
        // Something that looks like a regular expression.
        recognize(pair(
            char('^'),
            take_till(|c| matches!(c, ',' | '|' | '(' | ')')),
        )),
    ))(input)
}

impl<'a> TryFrom<&'a str> for VersionTree<'a> {
    type Error = ParseVersionTreeError;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        /// Parse a single term or a group surrounded by parenthesis.
        fn parse_term<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
            input: &'a str,
        ) -> Result<(&'a str, VersionTree<'a>), nom::Err<E>> {
            alt((
                delimited(
                    terminated(tag("("), multispace0),
                    parse_or_group,
                    preceded(multispace0, tag(")")),
                ),
                map(recognize_constraint, VersionTree::Term),
            ))(input)
        }

        /// Given multiple version tree components, flatten the structure as
        /// much as possible.
        fn flatten_group(operator: LogicalOperator, args: Vec<VersionTree<'_>>) -> VersionTree<'_> {
            if args.len() == 1 {
                args.into_iter().next().unwrap()
            } else {
                let mut result = Vec::new();
                for term in args {
                    match term {
                        VersionTree::Group(op, mut others) if op == operator => {
                            result.append(&mut others);
                        }
                        term => result.push(term),
                    }
                }

                VersionTree::Group(operator, result)
            }
        }

        /// Parses a group of version constraints separated by ,s
        fn parse_and_group<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
            input: &'a str,
        ) -> Result<(&'a str, VersionTree<'_>), nom::Err<E>> {
            let (rest, group) =
                separated_list1(delimited(multispace0, tag(","), multispace0), parse_term)(input)?;
            Ok((rest, flatten_group(LogicalOperator::And, group)))
        }

        /// Parses a group of version constraints separated by |s
        fn parse_or_group<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
            input: &'a str,
        ) -> Result<(&'a str, VersionTree<'_>), nom::Err<E>> {
            let (rest, group) = separated_list1(
                delimited(multispace0, tag("|"), multispace0),
                parse_and_group,
            )(input)?;
            Ok((rest, flatten_group(LogicalOperator::Or, group)))
        }

        match all_consuming(parse_or_group::<VerboseError<&'a str>>)(input) {
            Ok((_, tree)) => Ok(tree),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                Err(ParseVersionTreeError::ParseError(convert_error(input, e)))
            }
            _ => unreachable!("with all_consuming the only error can be Error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use super::{recognize_constraint, recognize_version, LogicalOperator, VersionTree};

    #[test]
    fn test_treeify() {
        use LogicalOperator::{And, Or};
        use VersionTree::{Group, Term};

        assert_eq!(VersionTree::try_from("1.2.3").unwrap(), Term("1.2.3"));

        assert_eq!(
            VersionTree::try_from("1.2.3,(4.5.6),<=7.8.9").unwrap(),
            Group(And, vec![Term("1.2.3"), Term("4.5.6"), Term("<=7.8.9")])
        );
        assert_eq!(
            VersionTree::try_from("((1.2.3)|(4.5.6))|<=7.8.9").unwrap(),
            Group(Or, vec![Term("1.2.3"), Term("4.5.6"), Term("<=7.8.9")])
        );

        assert_eq!(
            VersionTree::try_from("1.2.3,4.5.6|<=7.8.9").unwrap(),
            Group(
                Or,
                vec![
                    Group(And, vec![Term("1.2.3"), Term("4.5.6")]),
                    Term("<=7.8.9")
                ]
            )
        );

        assert_eq!(VersionTree::try_from("((((1.5))))").unwrap(), Term("1.5"));

        assert_eq!(
            VersionTree::try_from("((1.5|((1.6|1.7), 1.8), 1.9 |2.0))|2.1").unwrap(),
            Group(
                Or,
                vec![
                    Term("1.5"),
                    Group(
                        And,
                        vec![
                            Group(Or, vec![Term("1.6"), Term("1.7")]),
                            Term("1.8"),
                            Term("1.9")
                        ]
                    ),
                    Term("2.0"),
                    Term("2.1")
                ]
            )
        );
    }

    #[test]
    fn test_recognize_version() {
        type Err<'a> = nom::error::VerboseError<&'a str>;

        assert_eq!(
            recognize_version::<Err<'_>>(false)("3.8.9"),
            Ok(("", "3.8.9"))
        );
        assert_eq!(recognize_version::<Err<'_>>(false)("3"), Ok(("", "3")));
        assert_eq!(
            recognize_version::<Err<'_>>(false)("1!3.8.9+3.4-alpha.2"),
            Ok(("", "1!3.8.9+3.4-alpha.2"))
        );
        assert_eq!(recognize_version::<Err<'_>>(false)("3."), Ok((".", "3")));
        assert_eq!(recognize_version::<Err<'_>>(false)("3.*"), Ok((".*", "3")));
        assert_eq!(
            recognize_version::<Err<'_>>(true)("*.7.*"),
            Ok(("", "*.7.*"))
        );
        assert_eq!(
            recognize_version::<Err<'_>>(false)("4.3.21.post699+1dab973"),
            Ok(("", "4.3.21.post699+1dab973"))
        );
    }

    #[test]
    fn test_recognize_constraint() {
        type Err<'a> = nom::error::VerboseError<&'a str>;

        assert_eq!(recognize_constraint::<Err<'_>>("*"), Ok(("", "*")));
        assert_eq!(recognize_constraint::<Err<'_>>("3.8"), Ok(("", "3.8")));
        assert_eq!(recognize_constraint::<Err<'_>>("3.8*"), Ok(("", "3.8*")));
        assert_eq!(recognize_constraint::<Err<'_>>("3.8.*"), Ok(("", "3.8.*")));
        assert_eq!(
            recognize_constraint::<Err<'_>>(">=3.8.*"),
            Ok(("", ">=3.8.*"))
        );
        assert_eq!(
            recognize_constraint::<Err<'_>>(">= 3.8"),
            Ok(("", ">= 3.8"))
        );
        assert_eq!(
            recognize_constraint::<Err<'_>>(">=3.8.*,<3.9"),
            Ok((",<3.9", ">=3.8.*"))
        );
        assert_eq!(
            recognize_constraint::<Err<'_>>("^1.2$"),
            Ok(("", "^1.2$"))
        );
        assert_eq!(
            recognize_constraint::<Err<'_>>("~=2.4"),
            Ok(("", "~=2.4"))
        );
    }

    #[test]
    fn test_missing_operand() {
        assert!(VersionTree::try_from("1.5|").is_err());
        assert!(VersionTree::try_from(",1.5").is_err());
        assert!(VersionTree::try_from("(1.5").is_err());
        assert!(VersionTree::try_from(">=3.8<3.9").is_err());
    }
}
