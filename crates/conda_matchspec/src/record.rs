//! Package record types and the seam through which specs match them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::formats::Flexible;
use serde_with::{serde_as, skip_serializing_none, TimestampMilliSeconds};

/// A single record in the conda repodata. A single record refers to a single
/// binary distribution of a package on a conda channel.
///
/// Unknown fields in the source data are ignored on deserialization.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone, Hash)]
pub struct PackageRecord {
    /// The build string of the package.
    pub build: String,

    /// The build number of the package.
    #[serde(default)]
    pub build_number: u64,

    /// The channel the package came from, when known. This can be a channel
    /// name or a full channel url.
    pub channel: Option<String>,

    /// Specs of the packages this package depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,

    /// The filename of the package archive.
    #[serde(rename = "fn")]
    pub file_name: Option<String>,

    /// The md5 hash of the package archive as a hex string.
    pub md5: Option<String>,

    /// The name of the package.
    pub name: String,

    /// The subdirectory (platform) where the package lives, e.g. `linux-64`.
    #[serde(default)]
    pub subdir: String,

    /// The date this entry was created, with millisecond precision.
    #[serde_as(as = "Option<TimestampMilliSeconds<i64, Flexible>>")]
    pub timestamp: Option<DateTime<Utc>>,

    /// The features this package tracks, as a whitespace separated string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub track_features: String,

    /// The url the package archive can be downloaded from, when known.
    pub url: Option<String>,

    /// The version of the package.
    pub version: String,
}

/// Access to the matchable fields of a package record.
///
/// [`crate::MatchSpec::matches`] is generic over this trait so that any
/// record-like type can be matched, not just [`PackageRecord`].
pub trait HasMatchFields {
    /// The package name.
    fn name(&self) -> &str;

    /// The version string.
    fn version(&self) -> &str;

    /// The build string.
    fn build(&self) -> &str;

    /// The build number.
    fn build_number(&self) -> u64;

    /// The platform subdir.
    fn subdir(&self) -> &str;

    /// The channel the record came from, when known.
    fn channel(&self) -> Option<&str>;

    /// The filename of the package archive, when known.
    fn file_name(&self) -> Option<&str>;

    /// The url of the package archive, when known.
    fn url(&self) -> Option<&str>;

    /// The md5 hex digest of the package archive, when known.
    fn md5(&self) -> Option<&str>;

    /// The features this record tracks, as a raw string.
    fn track_features(&self) -> &str;
}

impl HasMatchFields for PackageRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn build(&self) -> &str {
        &self.build
    }

    fn build_number(&self) -> u64 {
        self.build_number
    }

    fn subdir(&self) -> &str {
        &self.subdir
    }

    fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    fn track_features(&self) -> &str {
        &self.track_features
    }
}
