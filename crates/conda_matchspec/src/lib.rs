#![deny(missing_docs)]
//! `conda-matchspec` contains the data models and parsers for conda match
//! specs: the query strings like `conda-forge::numpy >=1.7,<2` that select
//! packages from conda channels. It covers the version ordering and version
//! spec algebra the queries build on, channel name resolution, matching
//! against package records and the ingestion of spec lists and environment
//! files.

mod archive_type;
mod channel;
mod environment_file;
mod match_spec;
mod platform;
mod record;
mod version;
pub mod version_spec;

pub use archive_type::ArchiveType;
pub use channel::{Channel, ChannelConfig, ChannelMatch, ParseChannelError};
pub use environment_file::{
    parse_spec_list, spec_from_line, EnvironmentFile, ParseEnvironmentFileError,
    ParseSpecListError,
};
pub use match_spec::{
    FeatureSet, MatchFields, MatchSpec, ParseMatchSpecError, StringMatcher,
    StringMatcherParseError,
};
pub use platform::{ParsePlatformError, Platform};
pub use record::{HasMatchFields, PackageRecord};
pub use version::{ParseVersionError, Version};
pub use version_spec::VersionSpec;
