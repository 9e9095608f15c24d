// SPDX-License-Identifier: MPL-2.0

//! Canonical package identities and references.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The stable, canonical, lowercase identity of a package.
///
/// Two packages with equal identity are the same package regardless of
/// their declared display names; display names and legacy aliases are
/// never authoritative.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Canonicalize an arbitrary name into an identity.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().to_lowercase())
    }

    /// Derive an identity from a package location: the last path component
    /// of a URL or filesystem path, stripped of a `.git` suffix, lowercased.
    pub fn from_location(location: &PackageLocation) -> Self {
        let raw = match location {
            PackageLocation::Registry { name } => name.as_str(),
            PackageLocation::SourceControl { url } => url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .map(|last| last.strip_suffix(".git").unwrap_or(last))
                .unwrap_or(url),
            PackageLocation::FileSystem { path } => path
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or(path),
        };
        Self::new(raw)
    }

    /// The canonical lowercase text of this identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Where a package's sources live.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PackageLocation {
    /// A versioned registry entry.
    Registry {
        /// Registry-scoped package name.
        name: String,
    },
    /// A source-control repository.
    SourceControl {
        /// Clone URL of the repository.
        url: String,
    },
    /// A local filesystem checkout. Filesystem packages resolve to
    /// unversioned bindings.
    FileSystem {
        /// Absolute or root-relative path.
        path: String,
    },
}

impl PackageLocation {
    /// Human-readable provenance noun used in diagnostics.
    pub fn provenance(&self) -> &'static str {
        match self {
            Self::Registry { .. } => "registry package",
            Self::SourceControl { .. } => "source control package",
            Self::FileSystem { .. } => "local package",
        }
    }
}

impl Display for PackageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { name } => f.write_str(name),
            Self::SourceControl { url } => f.write_str(url),
            Self::FileSystem { path } => f.write_str(path),
        }
    }
}

/// A reference to a package: its identity plus where to find it.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackageRef {
    /// Canonical identity.
    pub identity: PackageIdentity,
    /// Source location.
    pub location: PackageLocation,
}

impl PackageRef {
    /// Reference a package by location, deriving its identity.
    pub fn new(location: PackageLocation) -> Self {
        Self {
            identity: PackageIdentity::from_location(&location),
            location,
        }
    }

    /// Reference a registry package by name.
    pub fn registry(name: impl Into<String>) -> Self {
        Self::new(PackageLocation::Registry { name: name.into() })
    }

    /// Reference a source-control package by URL.
    pub fn source_control(url: impl Into<String>) -> Self {
        Self::new(PackageLocation::SourceControl { url: url.into() })
    }

    /// Reference a local filesystem package by path.
    pub fn file_system(path: impl Into<String>) -> Self {
        Self::new(PackageLocation::FileSystem { path: path.into() })
    }
}

impl Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.identity, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_lowercased() {
        assert_eq!(PackageIdentity::new("Foo").as_str(), "foo");
    }

    #[test]
    fn identity_from_url_strips_git_suffix() {
        let reference = PackageRef::source_control("https://example.com/apple/Swift-Syntax.git");
        assert_eq!(reference.identity.as_str(), "swift-syntax");
    }

    #[test]
    fn identity_from_path_uses_last_component() {
        let reference = PackageRef::file_system("/home/dev/Projects/MyLib/");
        assert_eq!(reference.identity.as_str(), "mylib");
    }

    #[test]
    fn equal_identities_from_different_locations() {
        let a = PackageRef::registry("Utils");
        let b = PackageRef::source_control("https://example.com/org/utils.git");
        assert_eq!(a.identity, b.identity);
    }
}
