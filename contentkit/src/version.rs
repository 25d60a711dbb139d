//! Dotted content versions (`fromversion`, `toversion`, server versions).

use std::fmt;
use std::str::FromStr;

use semver::Version;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,

    #[error("invalid version '{raw}': {cause}")]
    Invalid { raw: String, cause: String },
}

/// A content version such as `5.0.0`.
///
/// Accepts strict semver as well as the short dotted forms found in content
/// files (`6`, `6.1`); missing components are zero.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentVersion(Version);

/// Lower bound used when a file declares no `fromversion`.
pub const DEFAULT_FROM_VERSION: ContentVersion = ContentVersion::new(0, 0, 0);

/// Upper bound used when a file declares no `toversion`.
pub const DEFAULT_TO_VERSION: ContentVersion = ContentVersion::new(99, 99, 99);

impl ContentVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse a dotted version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] for empty input, more than three components,
    /// or a component that is not a decimal number.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        if let Ok(v) = Version::parse(trimmed) {
            return Ok(Self(v));
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::Invalid {
                raw: raw.to_owned(),
                cause: "expected at most three components".to_owned(),
            });
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::Invalid {
                    raw: raw.to_owned(),
                    cause: format!("component '{part}' is not a number"),
                });
            }
            *slot = part.parse().map_err(|e| VersionError::Invalid {
                raw: raw.to_owned(),
                cause: format!("{e}"),
            })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    #[must_use]
    pub fn as_semver(&self) -> &Version {
        &self.0
    }
}

impl FromStr for ContentVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_short_forms_are_padded() {
        assert_eq!(ContentVersion::parse("5").unwrap(), ContentVersion::new(5, 0, 0));
        assert_eq!(ContentVersion::parse("6.1").unwrap(), ContentVersion::new(6, 1, 0));
        assert_eq!(
            ContentVersion::parse(" 4.5.0 ").unwrap(),
            ContentVersion::new(4, 5, 0)
        );
    }

    #[test]
    fn test_dotted_ordering() {
        let v = |s: &str| ContentVersion::parse(s).unwrap();
        assert!(v("4.5.0") < v("5.0.0"));
        assert!(v("5.0.0") < v("5.0.1"));
        assert!(v("5.10.0") > v("5.9.9"));
        assert_eq!(v("5.0"), v("5.0.0"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(ContentVersion::parse(""), Err(VersionError::Empty));
        assert!(ContentVersion::parse("five").is_err());
        assert!(ContentVersion::parse("1.2.3.4").is_err());
        assert!(ContentVersion::parse("1..2").is_err());
        assert!(ContentVersion::parse("+1.0").is_err());
    }

    #[test]
    fn test_defaults_bracket_real_versions() {
        let v = ContentVersion::parse("6.0.0").unwrap();
        assert!(DEFAULT_FROM_VERSION < v);
        assert!(v < DEFAULT_TO_VERSION);
    }
}
