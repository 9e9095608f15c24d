// SPDX-License-Identifier: MPL-2.0

//! Semantic versions with pre-release identifiers and build metadata.

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// A semantic version: `major.minor.patch`, optionally followed by a
/// pre-release suffix (`-alpha.1`) and build metadata (`+sha.5114f85`).
///
/// Ordering follows the semver specification: a pre-release sorts below the
/// same `major.minor.patch` triple without one, and pre-release identifiers
/// are compared pairwise with numeric identifiers below alphanumeric ones.
/// Build metadata is carried and displayed but excluded from both equality
/// and ordering: versions differing only in build metadata are equal.
#[derive(Debug, Clone)]
pub struct Version {
    /// Major version number.
    pub major: u64,
    /// Minor version number.
    pub minor: u64,
    /// Patch version number.
    pub patch: u64,
    /// Pre-release identifiers, empty for a release version.
    pub pre: Vec<Identifier>,
    /// Build metadata identifiers, ignored for precedence.
    pub build: Vec<String>,
}

/// A single dot-separated pre-release identifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Identifier {
    /// Purely numeric identifier, compared numerically.
    Numeric(u64),
    /// Alphanumeric identifier, compared in ASCII order.
    AlphaNumeric(String),
}

impl Version {
    /// Create a release version with `major.minor.patch` and no suffixes.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Create a pre-release version from dot-separated identifiers.
    pub fn prerelease(major: u64, minor: u64, patch: u64, pre: &str) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: pre.split('.').map(Identifier::from_fragment).collect(),
            build: Vec::new(),
        }
    }

    /// Version 0.0.0.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Whether this version carries a pre-release suffix.
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// The smallest version sharing this version's `major.minor.patch`
    /// triple: the pre-release with the single identifier `0`.
    ///
    /// Used as an exclusive upper bound to keep pre-releases of the bound
    /// itself out of a range.
    pub fn smallest_prerelease(&self) -> Self {
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre: vec![Identifier::Numeric(0)],
            build: Vec::new(),
        }
    }

    /// Bump the patch number, dropping any pre-release suffix.
    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    /// Bump the minor number, resetting patch.
    pub fn bump_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    /// Bump the major number, resetting minor and patch.
    pub fn bump_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }
}

impl Identifier {
    fn from_fragment(fragment: &str) -> Self {
        // Numeric identifiers must not carry leading zeroes; "007" is
        // alphanumeric per the semver grammar.
        if fragment.chars().all(|c| c.is_ascii_digit())
            && (fragment == "0" || !fragment.starts_with('0'))
        {
            match fragment.parse() {
                Ok(n) => Self::Numeric(n),
                Err(_) => Self::AlphaNumeric(fragment.to_string()),
            }
        } else {
            Self::AlphaNumeric(fragment.to_string())
        }
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::AlphaNumeric(_)) => Ordering::Less,
            (Self::AlphaNumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::AlphaNumeric(a), Self::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release is greater than any of its pre-releases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl From<(u64, u64, u64)> for Version {
    fn from(tuple: (u64, u64, u64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, identifier) in self.pre.iter().enumerate() {
            f.write_str(if i == 0 { "-" } else { "." })?;
            match identifier {
                Identifier::Numeric(n) => write!(f, "{}", n)?,
                Identifier::AlphaNumeric(s) => f.write_str(s)?,
            }
        }
        for (i, fragment) in self.build.iter().enumerate() {
            f.write_str(if i == 0 { "+" } else { "." })?;
            f.write_str(fragment)?;
        }
        Ok(())
    }
}

/// Error creating a [Version] from a string.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum VersionParseError {
    /// The core `major.minor.patch` triple is missing a component.
    #[error("version '{full_version}' must have exactly 3 numeric components")]
    NotThreeParts {
        /// The text that failed to parse.
        full_version: String,
    },
    /// A numeric component failed to parse.
    #[error("version component '{component}' of '{full_version}' is not a number")]
    ParseIntError {
        /// The text that failed to parse.
        full_version: String,
        /// The offending component.
        component: String,
    },
    /// A pre-release or build identifier is empty.
    #[error("version '{full_version}' contains an empty identifier")]
    EmptyIdentifier {
        /// The text that failed to parse.
        full_version: String,
    },
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (s, None),
        };
        let (triple, pre) = match rest.split_once('-') {
            Some((triple, pre)) => (triple, Some(pre)),
            None => (rest, None),
        };

        let mut components = triple.split('.');
        let mut next_number = || -> Result<u64, VersionParseError> {
            let component = components
                .next()
                .ok_or_else(|| VersionParseError::NotThreeParts {
                    full_version: s.to_string(),
                })?;
            component
                .parse()
                .map_err(|_| VersionParseError::ParseIntError {
                    full_version: s.to_string(),
                    component: component.to_string(),
                })
        };
        let major = next_number()?;
        let minor = next_number()?;
        let patch = next_number()?;
        if components.next().is_some() {
            return Err(VersionParseError::NotThreeParts {
                full_version: s.to_string(),
            });
        }

        fn parse_identifiers<'a>(
            text: &'a str,
            full_version: &str,
        ) -> Result<Vec<&'a str>, VersionParseError> {
            let fragments: Vec<&str> = text.split('.').collect();
            if fragments.iter().any(|fragment| fragment.is_empty()) {
                return Err(VersionParseError::EmptyIdentifier {
                    full_version: full_version.to_string(),
                });
            }
            Ok(fragments)
        }

        let pre = match pre {
            Some(text) => parse_identifiers(text, s)?
                .into_iter()
                .map(Identifier::from_fragment)
                .collect(),
            None => Vec::new(),
        };
        let build = match build {
            Some(text) => parse_identifiers(text, s)?
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn ordering_follows_semver_precedence() {
        let ordered = [
            "1.0.0-0",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
            "2.0.0",
            "2.1.0",
            "2.1.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn smallest_prerelease_sorts_below_all_prereleases() {
        let release = v("2.0.0");
        let floor = release.smallest_prerelease();
        assert!(floor < v("2.0.0-alpha"));
        assert!(floor < release);
        assert!(v("1.9.9") < floor);
    }

    #[test]
    fn build_metadata_is_parsed_and_displayed() {
        let version = v("1.2.3-rc.1+sha.5114f85");
        assert_eq!(version.to_string(), "1.2.3-rc.1+sha.5114f85");
        assert!(version.is_prerelease());
    }

    #[test]
    fn build_metadata_has_no_precedence() {
        assert_eq!(v("1.0.0+a").cmp(&v("1.0.0+b")), std::cmp::Ordering::Equal);
        assert_eq!(v("1.0.0+b"), v("1.0.0"));
        assert!(v("1.0.0-alpha+later") < v("1.0.0+earlier"));
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("1.2.3-".parse::<Version>().is_err());
        assert!("1.2.3-a..b".parse::<Version>().is_err());
    }

    #[test]
    fn leading_zero_identifiers_are_alphanumeric() {
        // "007" must not be treated as the number 7.
        assert!(v("1.0.0-007") > v("1.0.0-99"));
    }
}
