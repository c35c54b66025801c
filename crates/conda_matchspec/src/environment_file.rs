//! Ingestion of spec lists and environment files, like the files written by
//! `conda list --export`.

use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::channel::ChannelConfig;
use crate::match_spec::{MatchSpec, ParseMatchSpecError};

/// An error that occurs when parsing a list of spec lines.
#[derive(Debug, Error)]
pub enum ParseSpecListError {
    /// The line cannot be turned into a spec at all.
    #[error("cannot parse spec from line: '{0}'")]
    UnparseableLine(String),

    /// The normalized line is not a valid spec.
    #[error("invalid spec '{spec}'")]
    InvalidSpec {
        /// The normalized spec text.
        spec: String,

        /// The underlying parse error.
        #[source]
        source: ParseMatchSpecError,
    },
}

/// An error that occurs when reading an environment file.
#[derive(Debug, Error)]
pub enum ParseEnvironmentFileError {
    /// Reading the file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A line of the file is not a valid spec.
    #[error("invalid spec on line {line}: '{spec}'")]
    InvalidSpec {
        /// The 1-based line number.
        line: usize,

        /// The offending line.
        spec: String,

        /// The underlying parse error.
        #[source]
        source: ParseMatchSpecError,
    },
}

/// Normalizes a requirement line into spec-string form: the name is
/// lowercased, `name=X=Y` becomes `name X Y` and relational constraints are
/// compacted. Returns `None` when the line does not look like a requirement.
pub fn spec_from_line(line: &str) -> Option<String> {
    let captures = lazy_regex::regex!(
        r"^(?P<name>[^=<>!~\s]+)\s*((?P<cc>=[^=]+(=[^=]+)?)|(?P<pc>(?:[=!]=|[><]=?|~=).+))?$"
    )
    .captures(line.trim())?;

    let name = captures.name("name")?.as_str().to_lowercase();
    if let Some(constraint) = captures.name("cc") {
        Some(format!("{name}{}", constraint.as_str().replace('=', " ")))
    } else if let Some(constraint) = captures.name("pc") {
        Some(format!("{name} {}", constraint.as_str().replace(' ', "")))
    } else {
        Some(name)
    }
}

/// Parses a batch of requirement lines into specs. Blank lines and comment
/// lines are skipped, the first invalid line fails the whole batch.
pub fn parse_spec_list<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    config: &ChannelConfig,
) -> Result<Vec<MatchSpec>, ParseSpecListError> {
    let mut specs = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let spec_str = spec_from_line(line)
            .ok_or_else(|| ParseSpecListError::UnparseableLine(line.to_owned()))?;
        let spec = MatchSpec::parse(&spec_str, config)
            .map_err(|source| ParseSpecListError::InvalidSpec {
                spec: spec_str,
                source,
            })?;
        specs.push(spec);
    }
    Ok(specs)
}

/// The parsed contents of an environment file: a text file with one spec per
/// line, or, after an `@EXPLICIT` marker, one package url per line.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentFile {
    specs: Vec<MatchSpec>,
    explicit_urls: Vec<String>,
    explicit: bool,
}

impl EnvironmentFile {
    /// Parses the contents of an environment file. Lines are trimmed, blank
    /// lines and `#` comment lines are skipped. A line equal to `@EXPLICIT`
    /// switches the file to explicit mode: the marker itself is consumed and
    /// all remaining lines are package urls taken verbatim, including any
    /// `#hash` fragment.
    pub fn parse(
        contents: &str,
        config: &ChannelConfig,
    ) -> Result<EnvironmentFile, ParseEnvironmentFileError> {
        let mut file = EnvironmentFile::default();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == "@EXPLICIT" {
                file.explicit = true;
                continue;
            }

            if file.explicit {
                file.explicit_urls.push(line.to_owned());
            } else {
                let spec = MatchSpec::parse(line, config).map_err(|source| {
                    ParseEnvironmentFileError::InvalidSpec {
                        line: index + 1,
                        spec: line.to_owned(),
                        source,
                    }
                })?;
                file.specs.push(spec);
            }
        }
        Ok(file)
    }

    /// Reads and parses an environment file from disk.
    pub fn from_path(
        path: &Path,
        config: &ChannelConfig,
    ) -> Result<EnvironmentFile, ParseEnvironmentFileError> {
        tracing::debug!("reading environment file {}", path.display());
        let contents = fs_err::read_to_string(path)?;
        EnvironmentFile::parse(&contents, config)
    }

    /// The specs parsed from regular lines.
    pub fn specs(&self) -> &[MatchSpec] {
        &self.specs
    }

    /// The verbatim package urls following an `@EXPLICIT` marker.
    pub fn explicit_urls(&self) -> &[String] {
        &self.explicit_urls
    }

    /// True when the file contained an `@EXPLICIT` marker.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }
}

impl FromStr for EnvironmentFile {
    type Err = ParseEnvironmentFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvironmentFile::parse(s, &ChannelConfig::default())
    }
}
