use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use indexmap::IndexMap;
use thiserror::Error;
use url::Url;

use crate::platform::Platform;

const DEFAULT_CHANNEL_ALIAS: &str = "https://conda.anaconda.org";

/// The base urls the `defaults` multichannel expands to.
const DEFAULT_CHANNELS: &[&str] = &[
    "https://repo.continuum.io/pkgs/free",
    "https://repo.continuum.io/pkgs/r",
    "https://repo.continuum.io/pkgs/pro",
];

/// Additional `defaults` base urls on Windows.
const DEFAULT_CHANNELS_WIN: &[&str] = &["https://repo.continuum.io/pkgs/msys2"];

/// The `ChannelConfig` describes properties that are required to resolve
/// channel identifiers to channel urls.
///
/// Users mostly refer to channels by a short name (e.g. `conda-forge`), which
/// only becomes a url relative to a configured server address. Multichannels
/// like `defaults` expand to several base urls at once. This struct is an
/// immutable snapshot of that configuration; channel resolution never mutates
/// it, so a single instance can be shared freely.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// A url to prefix to channel names that are not themselves a url. The
    /// default value is <https://conda.anaconda.org>.
    pub channel_alias: Url,

    /// Named channels that expand to more than one base url, in definition
    /// order. By default this contains only `defaults`.
    pub multichannels: IndexMap<String, Vec<Url>>,

    /// The platform channel urls are resolved for. This influences the
    /// multichannel composition (`defaults` gains an extra url on Windows).
    pub platform: Platform,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::with_platform(Platform::current())
    }
}

impl ChannelConfig {
    /// Create a channel configuration with the default alias and
    /// multichannels for the given platform.
    pub fn with_platform(platform: Platform) -> Self {
        let default_urls = DEFAULT_CHANNELS
            .iter()
            .chain(if platform.is_windows() {
                DEFAULT_CHANNELS_WIN.iter()
            } else {
                [].iter()
            })
            .map(|url| Url::from_str(url).expect("could not parse default channel url"))
            .collect();

        let mut multichannels = IndexMap::new();
        multichannels.insert(String::from("defaults"), default_urls);

        Self {
            channel_alias: Url::from_str(DEFAULT_CHANNEL_ALIAS)
                .expect("could not parse default channel alias"),
            multichannels,
            platform,
        }
    }

    /// Strip the channel alias if the base url is "under" the channel alias.
    /// This returns the name of the channel (for example `conda-forge` for
    /// `https://conda.anaconda.org/conda-forge` when the channel alias is
    /// `https://conda.anaconda.org`).
    pub fn strip_channel_alias(&self, base_url: &Url) -> Option<String> {
        base_url
            .as_str()
            .trim_end_matches('/')
            .strip_prefix(self.channel_alias.as_str().trim_end_matches('/'))
            .filter(|s| s.starts_with('/'))
            .map(|s| s.trim_matches('/').to_string())
            .filter(|s| !s.is_empty())
    }

    /// Returns the multichannel a base url belongs to, if any.
    fn multichannel_for_url(&self, url: &Url) -> Option<(&str, &Vec<Url>)> {
        self.multichannels
            .iter()
            .find(|(_, urls)| urls.contains(url))
            .map(|(name, urls)| (name.as_str(), urls))
    }
}

/// A resolved channel identity: a name plus the base urls it stands for.
///
/// Regular channels resolve to a single base url; multichannels carry all of
/// their member urls.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Channel {
    /// The canonical name of the channel.
    pub name: String,

    /// The base urls of the channel, without trailing slashes.
    pub base_urls: Vec<Url>,
}

impl Channel {
    /// Resolves a channel identifier (a name or a url, without a platform
    /// suffix) to a [`Channel`] under the given configuration.
    pub fn from_str(
        source: impl AsRef<str>,
        config: &ChannelConfig,
    ) -> Result<Self, ParseChannelError> {
        let source = source.as_ref().trim().trim_end_matches('/');
        if source.is_empty() {
            return Err(ParseChannelError::InvalidName(String::new()));
        }

        if let Some(urls) = config.multichannels.get(source) {
            return Ok(Channel {
                name: source.to_owned(),
                base_urls: urls.clone(),
            });
        }

        if source.contains("://") {
            let url = normalize_url(Url::parse(source)?);

            // A url that is a member of a multichannel resolves to the whole
            // multichannel, so that e.g. a `pkgs/free` tarball matches a
            // `defaults` spec.
            if let Some((name, urls)) = config.multichannel_for_url(&url) {
                return Ok(Channel {
                    name: name.to_owned(),
                    base_urls: urls.clone(),
                });
            }

            let name = config
                .strip_channel_alias(&url)
                .unwrap_or_else(|| url.as_str().to_owned());
            return Ok(Channel {
                name,
                base_urls: vec![url],
            });
        }

        if source.contains([':', '\\']) {
            return Err(ParseChannelError::InvalidName(source.to_owned()));
        }

        let url = config
            .channel_alias
            .join(&format!("{source}/"))
            .map_err(ParseChannelError::ParseUrlError)?;
        Ok(Channel {
            name: source.to_owned(),
            base_urls: vec![normalize_url(url)],
        })
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A channel constraint of a match spec.
///
/// Holds the resolved channel together with the configuration snapshot it was
/// resolved under, so that the record side of a match can be resolved the same
/// way. Two channels match iff their base url sets intersect; this makes
/// `defaults` match any of its member urls and vice versa.
#[derive(Debug, Clone)]
pub struct ChannelMatch {
    channel: Channel,
    config: ChannelConfig,
}

impl ChannelMatch {
    /// Resolves a channel identifier into a matcher.
    pub fn parse(source: &str, config: &ChannelConfig) -> Result<Self, ParseChannelError> {
        Ok(Self {
            channel: Channel::from_str(source, config)?,
            config: config.clone(),
        })
    }

    /// The resolved channel this matcher constrains to.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Returns whether the given channel identifier resolves to a channel
    /// whose url set intersects this one. An identifier that does not resolve
    /// never matches.
    pub fn matches(&self, other: &str) -> bool {
        let (other, _) = split_subdir(other);
        match Channel::from_str(other, &self.config) {
            Ok(other) => self
                .channel
                .base_urls
                .iter()
                .any(|url| other.base_urls.contains(url)),
            Err(_) => false,
        }
    }
}

impl Display for ChannelMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)
    }
}

impl PartialEq for ChannelMatch {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel
    }
}

impl Eq for ChannelMatch {}

impl Hash for ChannelMatch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channel.hash(state);
    }
}

/// Splits a trailing platform component off a channel identifier, e.g.
/// `conda-forge/linux-64` into `conda-forge` and [`Platform::Linux64`]. A
/// trailing component that is not a known platform is left in place.
pub(crate) fn split_subdir(source: &str) -> (&str, Option<Platform>) {
    match source.trim_end_matches('/').rsplit_once('/') {
        Some((head, tail)) if !head.is_empty() => match Platform::from_str(tail) {
            Ok(platform) if platform != Platform::Unknown => (head, Some(platform)),
            _ => (source, None),
        },
        _ => (source, None),
    }
}

fn normalize_url(mut url: Url) -> Url {
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&path);
    url
}

/// An error that occurred when resolving a channel.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ParseChannelError {
    /// The channel url could not be parsed.
    #[error("could not parse url")]
    ParseUrlError(#[source] url::ParseError),

    /// The channel name is empty or contains invalid characters.
    #[error("invalid channel name: '{0}'")]
    InvalidName(String),
}

impl From<url::ParseError> for ParseChannelError {
    fn from(err: url::ParseError) -> Self {
        ParseChannelError::ParseUrlError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_config() -> ChannelConfig {
        ChannelConfig::with_platform(Platform::Linux64)
    }

    #[test]
    fn test_named_channel() {
        let channel = Channel::from_str("conda-forge", &linux_config()).unwrap();
        assert_eq!(channel.name, "conda-forge");
        assert_eq!(
            channel.base_urls,
            vec![Url::parse("https://conda.anaconda.org/conda-forge").unwrap()]
        );
    }

    #[test]
    fn test_url_channel() {
        let config = linux_config();
        let channel = Channel::from_str("https://conda.anaconda.org/conda-forge/", &config).unwrap();
        assert_eq!(channel.name, "conda-forge");

        let channel = Channel::from_str("https://example.com/my-channel", &config).unwrap();
        assert_eq!(channel.name, "https://example.com/my-channel");
        assert_eq!(
            channel.base_urls,
            vec![Url::parse("https://example.com/my-channel").unwrap()]
        );

        let channel = Channel::from_str("file:///opt/local-channel", &config).unwrap();
        assert_eq!(channel.name, "file:///opt/local-channel");
    }

    #[test]
    fn test_multichannel() {
        let channel = Channel::from_str("defaults", &linux_config()).unwrap();
        assert_eq!(channel.name, "defaults");
        assert_eq!(channel.base_urls.len(), 3);

        let windows = ChannelConfig::with_platform(Platform::Win64);
        let channel = Channel::from_str("defaults", &windows).unwrap();
        assert_eq!(channel.base_urls.len(), 4);
    }

    #[test]
    fn test_multichannel_member_url() {
        // A member url resolves to the whole multichannel.
        let channel =
            Channel::from_str("https://repo.continuum.io/pkgs/free", &linux_config()).unwrap();
        assert_eq!(channel.name, "defaults");
        assert_eq!(channel.base_urls.len(), 3);
    }

    #[test]
    fn test_invalid_names() {
        let config = linux_config();
        assert!(Channel::from_str("", &config).is_err());
        assert!(Channel::from_str("con:da", &config).is_err());
        assert!(Channel::from_str("https://", &config).is_err());
    }

    #[test]
    fn test_channel_match_symmetry() {
        let config = linux_config();
        let defaults = ChannelMatch::parse("defaults", &config).unwrap();
        assert!(defaults.matches("https://repo.continuum.io/pkgs/free"));
        assert!(defaults.matches("defaults"));
        assert!(!defaults.matches("conda-forge"));

        let member = ChannelMatch::parse("https://repo.continuum.io/pkgs/free", &config).unwrap();
        assert!(member.matches("defaults"));

        let forge = ChannelMatch::parse("conda-forge", &config).unwrap();
        assert!(forge.matches("https://conda.anaconda.org/conda-forge"));
        assert!(forge.matches("conda-forge/linux-64"));
        assert!(!forge.matches("bioconda"));
        assert!(!forge.matches("https://example.com/conda-forge"));
    }

    #[test]
    fn test_split_subdir() {
        assert_eq!(
            split_subdir("conda-forge/linux-64"),
            ("conda-forge", Some(Platform::Linux64))
        );
        assert_eq!(
            split_subdir("https://conda.anaconda.org/conda-forge/osx-64"),
            ("https://conda.anaconda.org/conda-forge", Some(Platform::Osx64))
        );
        assert_eq!(split_subdir("conda-forge"), ("conda-forge", None));
        assert_eq!(split_subdir("conda-forge/label/dev"), ("conda-forge/label/dev", None));
        assert_eq!(split_subdir("noarch"), ("noarch", None));
    }

    #[test]
    fn test_channel_match_identity() {
        let config = linux_config();
        let by_name = ChannelMatch::parse("defaults", &config).unwrap();
        let by_url = ChannelMatch::parse("https://repo.continuum.io/pkgs/free", &config).unwrap();
        // Both resolve to the same multichannel.
        assert_eq!(by_name, by_url);
        assert_eq!(by_name.to_string(), "defaults");
    }
}
