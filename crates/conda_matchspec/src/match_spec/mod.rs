//! The query language for conda packages.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;
use serde_with::{DeserializeFromStr, SerializeDisplay};

mod features;
mod matcher;
pub(crate) mod parse;

pub use features::FeatureSet;
pub use matcher::{StringMatcher, StringMatcherParseError};
pub use parse::ParseMatchSpecError;

use crate::archive_type::ArchiveType;
use crate::channel::{ChannelConfig, ChannelMatch};
use crate::record::HasMatchFields;
use crate::version_spec::{EqualityOperator, StrictRangeOperator, VersionSpec};
use crate::Version;

/// The names of all matchable fields, in canonical order.
const FIELD_NAMES: [&str; 10] = [
    "name",
    "version",
    "build",
    "build_number",
    "channel",
    "subdir",
    "fn",
    "url",
    "md5",
    "provides_features",
];

/// The individual field constraints of a [`MatchSpec`]. Every field is
/// optional, an absent field matches any record.
#[derive(Debug, Default, Clone, Eq, PartialEq, Hash)]
pub struct MatchFields {
    /// Matcher for the (lowercased) package name.
    pub name: Option<StringMatcher>,

    /// Constraint on the package version.
    pub version: Option<VersionSpec>,

    /// Matcher for the build string.
    pub build: Option<StringMatcher>,

    /// The exact build number.
    pub build_number: Option<u64>,

    /// The channel the package must come from.
    pub channel: Option<ChannelMatch>,

    /// The platform subdir the package must live in (e.g. `linux-64`).
    pub subdir: Option<String>,

    /// The exact filename of the package archive.
    pub file_name: Option<String>,

    /// The exact url of the package archive.
    pub url: Option<String>,

    /// The md5 hash of the package archive as a lowercase hex string.
    pub md5: Option<String>,

    /// Features the package must provide.
    pub provides_features: Option<FeatureSet>,
}

impl MatchFields {
    /// True when no field holds a constraint.
    pub fn is_unconstrained(&self) -> bool {
        *self == MatchFields::default()
    }
}

/// A [`MatchSpec`] is, fundamentally, a query language for conda packages.
/// Any of the fields that comprise a package record can be used to compose a
/// [`MatchSpec`], from a bare package name to a fully pinned archive url.
///
/// A spec is parsed from its string form and can be rendered back through
/// [`Display`]; the rendered form is canonical and parses back to an equal
/// spec.
///
/// The field constraints are stored behind an [`Arc`] so that cloning a spec
/// or deriving one with [`MatchSpec::with_optional`] and friends is cheap.
/// The `optional` and `target` fields are carried metadata: they travel with
/// the spec and render in its string form, but they are not part of its
/// identity, two specs with the same field constraints compare equal no
/// matter their metadata.
#[derive(Debug, Clone, SerializeDisplay, DeserializeFromStr)]
pub struct MatchSpec {
    pub(crate) fields: Arc<MatchFields>,

    /// Whether a dependency on this package may be left unsatisfied.
    pub optional: bool,

    /// The name of an installed package this spec would rather not replace.
    pub target: Option<String>,
}

impl PartialEq for MatchSpec {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for MatchSpec {}

impl Hash for MatchSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl MatchSpec {
    /// Parses a spec string, resolving channels against the given
    /// configuration.
    pub fn parse(input: &str, config: &ChannelConfig) -> Result<MatchSpec, ParseMatchSpecError> {
        parse::parse(input, config)
    }

    /// Constructs a spec directly from a set of field constraints.
    pub fn from_fields(fields: MatchFields) -> MatchSpec {
        MatchSpec {
            fields: Arc::new(fields),
            optional: false,
            target: None,
        }
    }

    /// The field constraints of this spec.
    pub fn fields(&self) -> &MatchFields {
        &self.fields
    }

    /// Returns a spec with every constraint in `overrides` replacing the
    /// corresponding constraint of this spec. An unconstrained override set
    /// returns a spec sharing the same underlying storage, observable
    /// through [`MatchSpec::ptr_eq`].
    pub fn with_fields(&self, overrides: MatchFields) -> MatchSpec {
        if overrides.is_unconstrained() {
            return self.clone();
        }

        let base = &*self.fields;
        let fields = MatchFields {
            name: overrides.name.or_else(|| base.name.clone()),
            version: overrides.version.or_else(|| base.version.clone()),
            build: overrides.build.or_else(|| base.build.clone()),
            build_number: overrides.build_number.or(base.build_number),
            channel: overrides.channel.or_else(|| base.channel.clone()),
            subdir: overrides.subdir.or_else(|| base.subdir.clone()),
            file_name: overrides.file_name.or_else(|| base.file_name.clone()),
            url: overrides.url.or_else(|| base.url.clone()),
            md5: overrides.md5.or_else(|| base.md5.clone()),
            provides_features: overrides
                .provides_features
                .or_else(|| base.provides_features.clone()),
        };

        MatchSpec {
            fields: Arc::new(fields),
            optional: self.optional,
            target: self.target.clone(),
        }
    }

    /// Returns a spec with the `optional` flag replaced, sharing the field
    /// storage of this spec.
    pub fn with_optional(&self, optional: bool) -> MatchSpec {
        MatchSpec {
            fields: Arc::clone(&self.fields),
            optional,
            target: self.target.clone(),
        }
    }

    /// Returns a spec with the `target` replaced, sharing the field storage
    /// of this spec.
    pub fn with_target(&self, target: Option<String>) -> MatchSpec {
        MatchSpec {
            fields: Arc::clone(&self.fields),
            optional: self.optional,
            target,
        }
    }

    /// True when both specs share the same underlying field storage.
    pub fn ptr_eq(&self, other: &MatchSpec) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }

    /// Returns whether the given record satisfies every field constraint of
    /// this spec.
    pub fn matches(&self, record: &impl HasMatchFields) -> bool {
        let fields = &*self.fields;

        if let Some(name) = &fields.name {
            if !name.matches(record.name()) {
                return false;
            }
        }
        if let Some(version) = &fields.version {
            match Version::from_str(record.version()) {
                Ok(record_version) if version.matches(&record_version) => {}
                _ => return false,
            }
        }
        if let Some(build) = &fields.build {
            if !build.matches(record.build()) {
                return false;
            }
        }
        if let Some(build_number) = fields.build_number {
            if build_number != record.build_number() {
                return false;
            }
        }
        if let Some(channel) = &fields.channel {
            match record.channel() {
                Some(record_channel) if channel.matches(record_channel) => {}
                _ => return false,
            }
        }
        if let Some(subdir) = &fields.subdir {
            if subdir != record.subdir() {
                return false;
            }
        }
        if let Some(file_name) = &fields.file_name {
            if Some(file_name.as_str()) != record.file_name() {
                return false;
            }
        }
        if let Some(url) = &fields.url {
            if Some(url.as_str()) != record.url() {
                return false;
            }
        }
        if let Some(md5) = &fields.md5 {
            match record.md5() {
                Some(record_md5) if md5.eq_ignore_ascii_case(record_md5) => {}
                _ => return false,
            }
        }
        if let Some(features) = &fields.provides_features {
            if !features.matches(record.track_features()) {
                return false;
            }
        }

        true
    }

    /// The textual form of the constraint on the given field, or `None` when
    /// the field is unconstrained or unknown.
    pub fn get(&self, field: &str) -> Option<String> {
        let fields = &*self.fields;
        match field {
            "name" => fields.name.as_ref().map(ToString::to_string),
            "version" => fields.version.as_ref().map(ToString::to_string),
            "build" => fields.build.as_ref().map(ToString::to_string),
            "build_number" => fields.build_number.map(|n| n.to_string()),
            "channel" => fields.channel.as_ref().map(ToString::to_string),
            "subdir" => fields.subdir.clone(),
            "fn" => fields.file_name.clone(),
            "url" => fields.url.clone(),
            "md5" => fields.md5.clone(),
            "provides_features" => fields.provides_features.as_ref().map(ToString::to_string),
            _ => None,
        }
    }

    /// The single value the given field admits, or `None` when the field is
    /// unconstrained or its constraint matches more than one value.
    pub fn get_exact_value(&self, field: &str) -> Option<String> {
        let fields = &*self.fields;
        match field {
            "name" => fields
                .name
                .as_ref()
                .and_then(StringMatcher::exact_value)
                .map(str::to_owned),
            "version" => fields
                .version
                .as_ref()
                .and_then(VersionSpec::exact_value)
                .map(str::to_owned),
            "build" => fields
                .build
                .as_ref()
                .and_then(StringMatcher::exact_value)
                .map(str::to_owned),
            "build_number" => fields.build_number.map(|n| n.to_string()),
            "channel" => fields.channel.as_ref().map(ToString::to_string),
            "subdir" => fields.subdir.clone(),
            "fn" => fields.file_name.clone(),
            "url" => fields.url.clone(),
            "md5" => fields.md5.clone(),
            _ => None,
        }
    }

    /// The names of all constrained fields, in canonical order.
    pub fn field_names(&self) -> Vec<&'static str> {
        FIELD_NAMES
            .iter()
            .copied()
            .filter(|field| self.contains(field))
            .collect()
    }

    /// True when the given field is constrained.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// The name matcher, if constrained.
    pub fn name(&self) -> Option<&StringMatcher> {
        self.fields.name.as_ref()
    }

    /// The version constraint, if constrained.
    pub fn version(&self) -> Option<&VersionSpec> {
        self.fields.version.as_ref()
    }

    /// The build matcher, if constrained.
    pub fn build(&self) -> Option<&StringMatcher> {
        self.fields.build.as_ref()
    }

    /// The build number, if constrained.
    pub fn build_number(&self) -> Option<u64> {
        self.fields.build_number
    }

    /// The channel, if constrained.
    pub fn channel(&self) -> Option<&ChannelMatch> {
        self.fields.channel.as_ref()
    }

    /// The platform subdir, if constrained.
    pub fn subdir(&self) -> Option<&str> {
        self.fields.subdir.as_deref()
    }

    /// The archive filename, if constrained.
    pub fn file_name(&self) -> Option<&str> {
        self.fields.file_name.as_deref()
    }

    /// The archive url, if constrained.
    pub fn url(&self) -> Option<&str> {
        self.fields.url.as_deref()
    }

    /// The md5 hash, if constrained.
    pub fn md5(&self) -> Option<&str> {
        self.fields.md5.as_deref()
    }

    /// The feature constraints, if any.
    pub fn provides_features(&self) -> Option<&FeatureSet> {
        self.fields.provides_features.as_ref()
    }

    /// True when the name is the only constrained field.
    pub fn is_simple(&self) -> bool {
        let fields = &*self.fields;
        fields.name.is_some()
            && fields.version.is_none()
            && fields.build.is_none()
            && fields.build_number.is_none()
            && fields.channel.is_none()
            && fields.subdir.is_none()
            && fields.file_name.is_none()
            && fields.url.is_none()
            && fields.md5.is_none()
            && fields.provides_features.is_none()
    }

    /// A measure of how precisely this spec pins a package, from 0 (matches
    /// anything) to 3 (a single distribution): 1 when an exact name is the
    /// only constraint, 2 when an exact name and an exact version are the
    /// only constraints, 3 for anything else.
    pub fn strictness(&self) -> u32 {
        let fields = &*self.fields;
        if fields.is_unconstrained() {
            return 0;
        }

        let name_exact = fields
            .name
            .as_ref()
            .and_then(StringMatcher::exact_value)
            .is_some();
        let beyond_name_and_version = fields.build.is_some()
            || fields.build_number.is_some()
            || fields.channel.is_some()
            || fields.subdir.is_some()
            || fields.file_name.is_some()
            || fields.url.is_some()
            || fields.md5.is_some()
            || fields.provides_features.is_some();

        if !name_exact || beyond_name_and_version {
            3
        } else if let Some(version) = &fields.version {
            match version.exact_value() {
                Some(_) => 2,
                None => 3,
            }
        } else {
            1
        }
    }

    /// The filename of the distribution this spec pins: the `fn` field when
    /// present, otherwise reconstructed from exact name, version and build.
    pub fn reconstruct_filename(&self) -> Option<String> {
        let fields = &*self.fields;
        if let Some(file_name) = &fields.file_name {
            return Some(file_name.clone());
        }

        let name = fields.name.as_ref()?.exact_value()?;
        let version = fields.version.as_ref()?.exact_value()?;
        let build = fields.build.as_ref()?.exact_value()?;
        Some(format!(
            "{name}-{version}-{build}{}",
            ArchiveType::TarBz2.extension()
        ))
    }

    /// The `name version build` form used by conda-build recipes.
    pub fn conda_build_form(&self) -> String {
        let fields = &*self.fields;
        let name = fields
            .name
            .as_ref()
            .map_or_else(|| "*".to_owned(), ToString::to_string);
        match (&fields.version, &fields.build) {
            (Some(version), Some(build)) => format!("{name} {version} {build}"),
            (Some(version), None) => format!("{name} {version}"),
            (None, Some(build)) => format!("{name} * {build}"),
            (None, None) => name,
        }
    }
}

impl FromStr for MatchSpec {
    type Err = ParseMatchSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchSpec::parse(s, &ChannelConfig::default())
    }
}

/// The version forms that render inline after the package name. The flag is
/// true for an exact `==` version, which allows the build to render inline
/// as well.
fn inline_version_form(spec: &VersionSpec) -> Option<(String, bool)> {
    match spec {
        VersionSpec::Exact(EqualityOperator::Equals, literal)
            if !literal.contains(['<', '>', '$', '^', '|', ',', '=', ' ']) =>
        {
            Some((format!("=={literal}"), true))
        }
        VersionSpec::Prefix(StrictRangeOperator::StartsWith, version) => {
            Some((format!("={}", version.as_str()), false))
        }
        VersionSpec::Glob(pattern) => {
            let stem = pattern.as_str().strip_suffix('*')?;
            if stem.contains('*') {
                None
            } else {
                Some((format!("={stem}"), false))
            }
        }
        _ => None,
    }
}

/// Renders a bracket entry, quoting the value when it would not survive the
/// bracket grammar unquoted.
fn bracket_entry(key: &str, value: &str) -> String {
    if value.contains([' ', ',', '=']) {
        format!("{key}='{value}'")
    } else {
        format!("{key}={value}")
    }
}

impl Display for MatchSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let fields = &*self.fields;
        let mut brackets = Vec::new();

        if let Some(channel) = &fields.channel {
            match &fields.subdir {
                Some(subdir) => write!(f, "{channel}/{subdir}::")?,
                None => write!(f, "{channel}::")?,
            }
        }

        match &fields.name {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "*")?,
        }

        let mut version_exact = false;
        if let Some(version) = &fields.version {
            match inline_version_form(version) {
                Some((text, exact)) => {
                    write!(f, "{text}")?;
                    version_exact = exact;
                }
                None => brackets.push(format!("version='{version}'")),
            }
        }

        if let Some(build) = &fields.build {
            let text = build.to_string();
            if text.contains(['<', '>', '$', '^', '|', ',']) {
                brackets.push(format!("build='{text}'"));
            } else if text.contains('*') || !version_exact {
                brackets.push(format!("build={text}"));
            } else {
                write!(f, "={text}")?;
            }
        }

        if let Some(build_number) = fields.build_number {
            brackets.push(format!("build_number={build_number}"));
        }
        if fields.channel.is_none() {
            if let Some(subdir) = &fields.subdir {
                brackets.push(bracket_entry("subdir", subdir));
            }
        }
        if let Some(file_name) = &fields.file_name {
            brackets.push(bracket_entry("fn", file_name));
        }
        if let Some(url) = &fields.url {
            brackets.push(bracket_entry("url", url));
        }
        if let Some(md5) = &fields.md5 {
            brackets.push(bracket_entry("md5", md5));
        }
        if let Some(features) = &fields.provides_features {
            brackets.push(bracket_entry("provides_features", &features.to_string()));
        }
        if self.optional {
            brackets.push("optional".to_owned());
        }
        if let Some(target) = &self.target {
            brackets.push(bracket_entry("target", target));
        }

        if !brackets.is_empty() {
            write!(f, "[{}]", brackets.iter().join(","))?;
        }

        Ok(())
    }
}
