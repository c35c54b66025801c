use std::cmp::Ordering;
use std::fmt::Display;
use std::{fmt, fmt::Formatter, str::FromStr};

use itertools::Itertools;
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

/// A platform subdirectory of a Conda channel.
///
/// These are the directory names that can appear as the last path component
/// of a channel URL (e.g. `https://conda.anaconda.org/conda-forge/linux-64`).
#[allow(missing_docs)]
#[derive(EnumIter, Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Platform {
    NoArch,
    Unknown,

    Linux32,
    Linux64,
    LinuxArmV6l,
    LinuxArmV7l,
    LinuxPpc64le,

    Osx64,

    Win32,
    Win64,

    ZosZ,
}

impl PartialOrd for Platform {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Platform {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Platform {
    /// Returns the platform for which the current binary was build.
    pub const fn current() -> Platform {
        #[cfg(target_os = "linux")]
        {
            #[cfg(target_arch = "x86")]
            return Platform::Linux32;

            #[cfg(target_arch = "x86_64")]
            return Platform::Linux64;

            #[cfg(target_arch = "arm")]
            {
                #[cfg(target_feature = "v7")]
                return Platform::LinuxArmV7l;

                #[cfg(not(target_feature = "v7"))]
                return Platform::LinuxArmV6l;
            }

            #[cfg(all(target_arch = "powerpc64", target_endian = "little"))]
            return Platform::LinuxPpc64le;

            #[cfg(not(any(
                target_arch = "x86",
                target_arch = "x86_64",
                target_arch = "arm",
                all(target_arch = "powerpc64", target_endian = "little")
            )))]
            return Platform::Unknown;
        }

        #[cfg(windows)]
        {
            #[cfg(target_arch = "x86")]
            return Platform::Win32;

            #[cfg(not(target_arch = "x86"))]
            return Platform::Win64;
        }

        #[cfg(target_os = "macos")]
        return Platform::Osx64;

        #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
        Platform::Unknown
    }

    /// Returns a string representation of the platform.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Iterate over all Platform variants
    pub fn all() -> impl Iterator<Item = Self> {
        Platform::iter()
    }

    /// Returns true if the platform is a windows based platform.
    pub const fn is_windows(self) -> bool {
        matches!(self, Platform::Win32 | Platform::Win64)
    }
}

/// An error that can occur when parsing a platform from a string.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub struct ParsePlatformError {
    /// The platform string that could not be parsed.
    pub string: String,
}

impl Display for ParsePlatformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is not a known platform. Valid platforms are {}",
            self.string,
            Platform::all()
                .filter(|p| !matches!(p, Platform::Unknown))
                .map(|p| format!("'{p}'"))
                .join(", ")
        )
    }
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "noarch" => Platform::NoArch,
            "linux-32" => Platform::Linux32,
            "linux-64" => Platform::Linux64,
            "linux-armv6l" => Platform::LinuxArmV6l,
            "linux-armv7l" => Platform::LinuxArmV7l,
            "linux-ppc64le" => Platform::LinuxPpc64le,
            "osx-64" => Platform::Osx64,
            "win-32" => Platform::Win32,
            "win-64" => Platform::Win64,
            "zos-z" => Platform::ZosZ,
            string => {
                return Err(ParsePlatformError {
                    string: string.to_owned(),
                });
            }
        })
    }
}

impl From<Platform> for &'static str {
    fn from(platform: Platform) -> Self {
        match platform {
            Platform::NoArch => "noarch",
            Platform::Linux32 => "linux-32",
            Platform::Linux64 => "linux-64",
            Platform::LinuxArmV6l => "linux-armv6l",
            Platform::LinuxArmV7l => "linux-armv7l",
            Platform::LinuxPpc64le => "linux-ppc64le",
            Platform::Osx64 => "osx-64",
            Platform::Win32 => "win-32",
            Platform::Win64 => "win-64",
            Platform::ZosZ => "zos-z",
            Platform::Unknown => "unknown",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::Platform;

    #[test]
    fn test_platform_from_str() {
        assert_eq!(Platform::from_str("linux-64"), Ok(Platform::Linux64));
        assert_eq!(Platform::from_str("win-32"), Ok(Platform::Win32));
        assert_eq!(Platform::from_str("noarch"), Ok(Platform::NoArch));
        assert_eq!(Platform::from_str("zos-z"), Ok(Platform::ZosZ));
        assert!(Platform::from_str("linux-aarch64").is_err());
        assert!(Platform::from_str("unknown").is_err());
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::all().filter(|p| !matches!(p, Platform::Unknown)) {
            assert_eq!(Platform::from_str(platform.as_str()), Ok(platform));
        }
    }
}
