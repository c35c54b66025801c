//! Parser that turns a spec string into a [`MatchSpec`].
//!
//! The grammar is the conda one: an optional channel prefix, a package name,
//! an optional version (and build) and an optional bracket section with
//! explicit field overrides. Package archive urls and paths are accepted as
//! well and are decomposed into their fields.

use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till1, take_until, take_while1};
use nom::character::complete::{char, multispace0, one_of};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::error::{ContextError, ParseError, VerboseError};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, preceded, separated_pair, terminated};
use nom::{Finish, IResult};
use smallvec::SmallVec;
use thiserror::Error;
use url::Url;

use super::features::FeatureSet;
use super::matcher::{StringMatcher, StringMatcherParseError};
use super::{MatchFields, MatchSpec};
use crate::archive_type::ArchiveType;
use crate::channel::{split_subdir, ChannelConfig, ChannelMatch, ParseChannelError};
use crate::version_spec::version_tree::{is_operator_char, recognize_constraint, recognize_version};
use crate::version_spec::{EqualityOperator, ParseVersionSpecError, VersionSpec};
use crate::Platform;

/// The tuple of (key, value) pairs of the bracket section of a spec.
type BracketVec<'a> = SmallVec<[(&'a str, &'a str); 2]>;

/// An error that occurs when parsing a [`MatchSpec`] from a string.
#[derive(Debug, Clone, Error)]
pub enum ParseMatchSpecError {
    /// The spec looks like a package archive but its path or url is invalid.
    #[error("invalid package path or url")]
    InvalidPackagePathOrUrl,

    /// The bracket section is malformed.
    #[error("invalid bracket")]
    InvalidBracket,

    /// A spec can contain at most one `::` separator.
    #[error("invalid number of '::' separators")]
    InvalidNumberOfColons,

    /// The channel could not be parsed.
    #[error("invalid channel")]
    ParseChannelError(#[from] ParseChannelError),

    /// The bracket section contains a key that is not recognized.
    #[error("invalid bracket key: {0}")]
    InvalidBracketKey(String),

    /// The bracket section contains a value that is invalid for its key.
    #[error("invalid value for bracket key {key}: '{value}'")]
    InvalidBracketValue {
        /// The bracket key.
        key: String,
        /// The offending value.
        value: String,
    },

    /// The spec is missing a package name.
    #[error("missing package name")]
    MissingPackageName,

    /// The spec contains more than one bracket section.
    #[error("multiple bracket sections not allowed")]
    MultipleBracketSectionsNotAllowed,

    /// The version and build part of the spec could not be split.
    #[error("unable to parse version spec: {0}")]
    InvalidVersionAndBuild(String),

    /// The version constraint could not be parsed.
    #[error("invalid version spec: {0}")]
    InvalidVersionSpec(#[from] ParseVersionSpecError),

    /// The name or build matcher could not be parsed.
    #[error("invalid string matcher: {0}")]
    InvalidStringMatcher(#[from] StringMatcherParseError),

    /// The build number is not an unsigned integer.
    #[error("invalid build number: {0}")]
    InvalidBuildNumber(#[from] std::num::ParseIntError),

    /// An md5 value must be a 32 character hex string.
    #[error("invalid md5 hash digest")]
    InvalidHashDigest,
}

/// Returns true if the specified string represents a package filename,
/// either a `.tar.bz2` or a `.conda` archive.
fn is_package_file(input: &str) -> bool {
    ArchiveType::try_from(input).is_some()
}

fn is_md5_hex(input: &str) -> bool {
    input.len() == 32 && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Strips a `#` suffix from the input. Directly after a package archive name
/// the suffix is an md5 fragment, anywhere else it is a comment.
fn strip_comment_or_md5(input: &str) -> (&str, Option<&str>) {
    match input.split_once('#') {
        Some((head, tail)) if is_package_file(head.trim()) && is_md5_hex(tail.trim()) => {
            (head, Some(tail.trim()))
        }
        Some((head, _comment)) => (head, None),
        None => (input, None),
    }
}

/// A parser that parses the inner parser enclosed by optional whitespace.
fn whitespace_enclosed<'a, F, O, E: ParseError<&'a str>>(
    inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

/// Parses the contents of a bracket section into a list of key/value pairs.
/// Pairs are separated by commas or whitespace. Values can be quoted with
/// single or double quotes; a key without a value (such as the bare
/// `optional` flag) yields an empty value.
fn parse_bracket_list(input: &str) -> Result<BracketVec<'_>, ParseMatchSpecError> {
    fn parse_key<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
        whitespace_enclosed(take_while1(|c: char| {
            c.is_alphanumeric() || c == '_' || c == '-'
        }))(input)
    }

    fn parse_value<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
        whitespace_enclosed(alt((
            delimited(char('"'), take_until("\""), char('"')),
            delimited(char('\''), take_until("'"), char('\'')),
            take_till1(|c: char| c.is_whitespace() || matches!(c, ',' | ']' | '\'' | '"')),
        )))(input)
    }

    fn parse_key_value<'a, E: ParseError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, (&'a str, &'a str), E> {
        alt((
            separated_pair(parse_key, char('='), parse_value),
            map(parse_key, |key| (key, "")),
        ))(input)
    }

    // The separator between pairs is a comma, whitespace or both; the
    // whitespace around a pair is already consumed by the pair itself.
    fn parse_list<'a, E: ParseError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, Vec<(&'a str, &'a str)>, E> {
        all_consuming(many0(terminated(
            parse_key_value,
            opt(whitespace_enclosed(char(','))),
        )))(input)
    }

    match parse_list::<nom::error::Error<&str>>(input).finish() {
        Ok((_remaining, values)) => Ok(values.into_iter().collect()),
        Err(nom::error::Error { .. }) => Err(ParseMatchSpecError::InvalidBracket),
    }
}

/// Strips a trailing bracket section from the input and parses its contents.
fn strip_brackets(input: &str) -> Result<(&str, BracketVec<'_>), ParseMatchSpecError> {
    match lazy_regex::regex!(r"^(.*)\[(.*)\]$").captures(input) {
        Some(captures) => {
            let stripped = captures.get(1).map_or("", |m| m.as_str());
            let contents = captures.get(2).map_or("", |m| m.as_str());
            Ok((stripped, parse_bracket_list(contents)?))
        }
        None => Ok((input, SmallVec::new())),
    }
}

/// Strips a trailing parenthesized section from the input. The contents are
/// ignored, this is the legacy conda syntax for `optional` and `target`.
fn strip_parens(input: &str) -> &str {
    match lazy_regex::regex!(r"^(.*)(\(.*\))$").captures(input) {
        Some(captures) => captures.get(1).map_or("", |m| m.as_str()),
        None => input,
    }
}

/// Strips the package name from the start of the input, returning the matcher
/// for it and the remainder. A name of `*` matches anything and is dropped.
fn strip_package_name(
    input: &str,
) -> Result<(Option<StringMatcher>, &str), ParseMatchSpecError> {
    match take_while1::<_, _, nom::error::Error<&str>>(|c: char| {
        !c.is_whitespace() && !is_operator_char(c)
    })(input.trim())
    .finish()
    {
        Ok((rest, name)) => {
            let name = name.to_lowercase();
            let name = if name == "*" {
                None
            } else {
                Some(StringMatcher::from_str(&name)?)
            };
            Ok((name, rest.trim()))
        }
        Err(nom::error::Error { .. }) => Err(ParseMatchSpecError::MissingPackageName),
    }
}

/// Splits the remainder of a spec into a version part and an optional build
/// part. The version may be a group with logical operators and parentheses,
/// the separator between version and build is a space or a single `=`.
fn split_version_and_build(
    input: &str,
) -> Result<(&str, Option<&str>), ParseMatchSpecError> {
    fn parse_version_constraint_or_group<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, &'a str, E> {
        alt((
            recognize(delimited(tag("("), parse_version_group, tag(")"))),
            recognize_constraint,
        ))(input)
    }

    fn parse_version_group<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, &'a str, E> {
        recognize(separated_list1(
            whitespace_enclosed(one_of(",|")),
            parse_version_constraint_or_group,
        ))(input)
    }

    // `=1.2.3` and friends: a leading `=` directly followed by a version and
    // an optional glob suffix.
    fn parse_special_equality<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, &'a str, E> {
        recognize(preceded(
            tag("="),
            alt((
                recognize(terminated(
                    recognize_version(true),
                    opt(preceded(opt(tag(".")), tag("*"))),
                )),
                tag("*"),
            )),
        ))(input)
    }

    fn parse_version_and_build_separator<'a, E: ParseError<&'a str> + ContextError<&'a str>>(
        input: &'a str,
    ) -> IResult<&'a str, &'a str, E> {
        terminated(
            alt((parse_special_equality, parse_version_group)),
            opt(one_of(" =")),
        )(input)
    }

    match parse_version_and_build_separator::<VerboseError<&str>>(input.trim()).finish() {
        Ok((rest, version)) => {
            let build = rest.trim();
            if build.is_empty() {
                Ok((version.trim(), None))
            } else if build.starts_with(['<', '>', '!', '~']) {
                // A relational operator cannot start a build string, the
                // input is a malformed version expression like `>=1.0 <2`.
                Err(ParseMatchSpecError::InvalidVersionAndBuild(
                    input.to_owned(),
                ))
            } else {
                Ok((version.trim(), Some(build)))
            }
        }
        Err(VerboseError { .. }) => Err(ParseMatchSpecError::InvalidVersionAndBuild(
            input.to_owned(),
        )),
    }
}

/// Parses a version (and optional build) part and stores the result in the
/// fields. A leading `=` on the version is a fuzzy constraint, except when a
/// build is present, then it pins the version exactly.
fn apply_version_and_build(
    fields: &mut MatchFields,
    version_str: &str,
    build_str: Option<&str>,
) -> Result<(), ParseMatchSpecError> {
    let version_str = if version_str.find(char::is_whitespace).is_some() {
        Cow::Owned(version_str.replace(char::is_whitespace, ""))
    } else {
        Cow::Borrowed(version_str)
    };

    let version_str = match version_str.strip_prefix('=') {
        Some(rest)
            if build_str.is_some() && !rest.contains(['=', ',', '|']) && !rest.ends_with('*') =>
        {
            Cow::Borrowed(rest)
        }
        _ => version_str,
    };

    fields.version = match VersionSpec::from_str(version_str.as_ref())? {
        VersionSpec::Any => None,
        spec => Some(spec),
    };

    if let Some(build) = build_str {
        if build != "*" {
            fields.build = Some(StringMatcher::from_str(build)?);
        }
    }

    Ok(())
}

/// Applies the key/value pairs of a bracket section on top of the fields
/// derived from the rest of the spec. Bracket values always win.
fn apply_bracket_overrides(
    fields: &mut MatchFields,
    optional: &mut bool,
    target: &mut Option<String>,
    brackets: &BracketVec<'_>,
    config: &ChannelConfig,
) -> Result<(), ParseMatchSpecError> {
    // The channel is applied first so that an explicit `subdir` key always
    // wins over a subdir embedded in the channel value.
    for (_, value) in brackets.iter().filter(|(key, _)| *key == "channel") {
        let (channel, subdir) = split_subdir(value);
        fields.channel = if channel == "*" {
            None
        } else {
            Some(ChannelMatch::parse(channel, config)?)
        };
        if let Some(platform) = subdir {
            fields.subdir = Some(platform.to_string());
        }
    }

    for &(key, value) in brackets.iter() {
        match key {
            "channel" => {}
            "name" => {
                let name = value.to_lowercase();
                fields.name = if name == "*" {
                    None
                } else {
                    Some(StringMatcher::from_str(&name)?)
                };
            }
            "version" => {
                fields.version = match VersionSpec::from_str(value)? {
                    VersionSpec::Any => None,
                    spec => Some(spec),
                };
            }
            "build" => {
                fields.build = if value == "*" {
                    None
                } else {
                    Some(StringMatcher::from_str(value)?)
                };
            }
            "build_number" => fields.build_number = Some(value.parse()?),
            "subdir" => fields.subdir = Some(value.to_owned()),
            "fn" => fields.file_name = Some(value.to_owned()),
            "url" => fields.url = Some(value.to_owned()),
            "md5" => {
                if !is_md5_hex(value) {
                    return Err(ParseMatchSpecError::InvalidHashDigest);
                }
                fields.md5 = Some(value.to_ascii_lowercase());
            }
            "features" | "track_features" | "provides_features" => {
                let features = FeatureSet::parse(value, config.platform);
                if !features.is_empty() {
                    fields.provides_features = Some(match fields.provides_features.take() {
                        Some(mut existing) => {
                            existing.extend(features);
                            existing
                        }
                        None => features,
                    });
                }
            }
            "optional" => {
                *optional = if value.is_empty() || value.eq_ignore_ascii_case("true") {
                    true
                } else if value.eq_ignore_ascii_case("false") {
                    false
                } else {
                    return Err(ParseMatchSpecError::InvalidBracketValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    });
                };
            }
            "target" => {
                if value.is_empty() {
                    return Err(ParseMatchSpecError::InvalidBracketValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    });
                }
                *target = Some(value.to_owned());
            }
            _ => return Err(ParseMatchSpecError::InvalidBracketKey(key.to_owned())),
        }
    }

    Ok(())
}

/// Splits a `name-version-build` archive stem into its three parts. All
/// three must be non-empty.
fn split_dist_stem(stem: &str) -> Option<(&str, &str, &str)> {
    let (rest, build) = stem.rsplit_once('-')?;
    let (name, version) = rest.rsplit_once('-')?;
    (!name.is_empty() && !version.is_empty() && !build.is_empty()).then_some((name, version, build))
}

/// Tries to decompose the location of a package archive into a channel, a
/// platform subdir and the name/version/build triple from the filename.
/// Returns `None` when the location does not follow the channel layout.
fn decompose_archive_location<'a>(
    location: &'a str,
    config: &ChannelConfig,
) -> Result<Option<(ChannelMatch, Platform, &'a str, &'a str, &'a str)>, ParseMatchSpecError> {
    let Some((directory, file_name)) = location.rsplit_once('/') else {
        return Ok(None);
    };
    let Some((stem, _archive_type)) = ArchiveType::split_str(file_name) else {
        return Ok(None);
    };
    let Some((name, version, build)) = split_dist_stem(stem) else {
        return Ok(None);
    };

    // The parent directory must be a platform subdir, what remains in front
    // of it is the channel location.
    let (channel_location, platform) = split_subdir(directory);
    let Some(platform) = platform else {
        return Ok(None);
    };

    let channel = ChannelMatch::parse(channel_location, config)?;
    Ok(Some((channel, platform, name, version, build)))
}

/// Parses a spec that refers to a package archive directly. Local paths are
/// turned into `file://` urls first. When the location can be decomposed the
/// individual fields are matched exactly, otherwise only the url is kept.
fn parse_package_file_spec(
    input: &str,
    md5: Option<&str>,
    config: &ChannelConfig,
) -> Result<MatchFields, ParseMatchSpecError> {
    let mut fields = MatchFields {
        md5: md5.map(str::to_ascii_lowercase),
        ..MatchFields::default()
    };

    let location = if input.contains("://") {
        Cow::Borrowed(input)
    } else {
        let url = Url::from_file_path(Path::new(input))
            .map_err(|()| ParseMatchSpecError::InvalidPackagePathOrUrl)?;
        Cow::Owned(url.to_string())
    };

    match decompose_archive_location(&location, config)? {
        Some((channel, platform, name, version, build)) => {
            fields.name = Some(StringMatcher::Exact(name.to_lowercase()));
            fields.version = Some(VersionSpec::Exact(
                EqualityOperator::Equals,
                version.to_owned(),
            ));
            fields.build = Some(StringMatcher::Exact(build.to_owned()));
            fields.channel = Some(channel);
            fields.subdir = Some(platform.to_string());
        }
        None => fields.url = Some(location.into_owned()),
    }

    Ok(fields)
}

/// Parses a full spec string into a [`MatchSpec`].
pub(super) fn parse(
    input: &str,
    config: &ChannelConfig,
) -> Result<MatchSpec, ParseMatchSpecError> {
    // Step 1: strip a trailing comment or md5 fragment.
    let (input, md5) = strip_comment_or_md5(input);
    let input = input.trim();

    // Step 2: a direct reference to a package archive.
    if is_package_file(input) {
        let fields = parse_package_file_spec(input, md5, config)?;
        return Ok(MatchSpec::from_fields(fields));
    }

    // Step 3: strip off a trailing parenthesized section and ignore it. In
    // the legacy combined form it follows the bracket section.
    let input = strip_parens(input).trim();

    // Step 4: strip off the bracket section.
    let (input, brackets) = strip_brackets(input)?;
    let input = input.trim();
    if input.contains(['[', ']']) {
        return Err(if brackets.is_empty() {
            ParseMatchSpecError::InvalidBracket
        } else {
            ParseMatchSpecError::MultipleBracketSectionsNotAllowed
        });
    }

    // Step 5: strip off the channel prefix.
    let (channel_str, input) = match input.split_once("::") {
        Some((channel_str, rest)) => {
            if rest.contains("::") {
                return Err(ParseMatchSpecError::InvalidNumberOfColons);
            }
            (channel_str.trim(), rest.trim())
        }
        None => ("", input),
    };

    let mut fields = MatchFields::default();
    if !channel_str.is_empty() {
        let (channel, subdir) = split_subdir(channel_str);
        if channel != "*" {
            fields.channel = Some(ChannelMatch::parse(channel, config)?);
        }
        fields.subdir = subdir.map(|platform| platform.to_string());
    }

    // Step 6: strip off the package name.
    let (name, input) = strip_package_name(input)?;
    fields.name = name;

    // Step 7: the remainder is a version and an optional build string.
    if !input.is_empty() {
        let (version_str, build_str) = split_version_and_build(input)?;
        apply_version_and_build(&mut fields, version_str, build_str)?;
    }

    // Step 8: the bracket section strictly overrides any field derived from
    // the other parts of the spec.
    let mut optional = false;
    let mut target = None;
    apply_bracket_overrides(&mut fields, &mut optional, &mut target, &brackets, config)?;

    Ok(MatchSpec {
        fields: Arc::new(fields),
        optional,
        target,
    })
}
