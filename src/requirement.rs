// SPDX-License-Identifier: MPL-2.0

//! Requirements: sets over the binding universe.
//!
//! A package resolves to a [Binding]: a semantic version, a source-control
//! revision, or the unversioned marker used for root and filesystem
//! packages. A [Requirement] is a set of bindings, stored as a product of
//! one component per binding kind so that the algebra stays closed under
//! complement and intersection.
//!
//! The unversioned marker is a member of every dependency-facing
//! requirement: a local or root binding overrides whatever version or
//! revision constraint a dependent declares. A revision requirement never
//! intersects a version-set requirement; there is no provider mapping from
//! revisions to versions.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use semver_ranges::{Version, VersionRanges};
use serde::{Deserialize, Serialize};

/// An opaque source-control revision (commit identifier).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Wrap a commit identifier.
    pub fn new(commit: impl Into<String>) -> Self {
        Self(commit.into())
    }

    /// The commit identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(commit: &str) -> Self {
        Self::new(commit)
    }
}

/// The concrete state a package is bound to after resolution.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Binding {
    /// A released semantic version.
    Version(Version),
    /// A source-control revision, optionally tracking a branch.
    Revision {
        /// The pinned commit.
        revision: Revision,
        /// The branch the revision was taken from, if any.
        branch: Option<String>,
    },
    /// Root and filesystem packages carry no version at all.
    Unversioned,
}

impl Binding {
    /// Convenience constructor for a plain revision binding.
    pub fn revision(revision: impl Into<Revision>) -> Self {
        Self::Revision {
            revision: revision.into(),
            branch: None,
        }
    }

    /// The version, when this binding is a released version.
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Version> for Binding {
    fn from(v: Version) -> Self {
        Self::Version(v)
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => Display::fmt(v, f),
            Self::Revision { revision, .. } => Display::fmt(revision, f),
            Self::Unversioned => f.write_str("unversioned"),
        }
    }
}

/// A set of revisions, closed under complement within the (unbounded)
/// universe of all commit identifiers.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum RevisionSet {
    /// Exactly these revisions. `Only(∅)` is the empty set.
    Only(BTreeSet<Revision>),
    /// Every revision except these. `AllExcept(∅)` is the full set.
    AllExcept(BTreeSet<Revision>),
}

impl RevisionSet {
    fn none() -> Self {
        Self::Only(BTreeSet::new())
    }

    fn all() -> Self {
        Self::AllExcept(BTreeSet::new())
    }

    fn only(revision: Revision) -> Self {
        Self::Only(BTreeSet::from([revision]))
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Only(set) if set.is_empty())
    }

    fn contains(&self, revision: &Revision) -> bool {
        match self {
            Self::Only(set) => set.contains(revision),
            Self::AllExcept(set) => !set.contains(revision),
        }
    }

    fn complement(&self) -> Self {
        match self {
            Self::Only(set) => Self::AllExcept(set.clone()),
            Self::AllExcept(set) => Self::Only(set.clone()),
        }
    }

    fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Only(a), Self::Only(b)) => Self::Only(a.intersection(b).cloned().collect()),
            (Self::Only(a), Self::AllExcept(b)) | (Self::AllExcept(b), Self::Only(a)) => {
                Self::Only(a.difference(b).cloned().collect())
            }
            (Self::AllExcept(a), Self::AllExcept(b)) => {
                Self::AllExcept(a.union(b).cloned().collect())
            }
        }
    }
}

/// A set of bindings: the requirement a dependency places on a package, or
/// any set derived from such requirements during resolution.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Requirement {
    versions: VersionRanges,
    revisions: RevisionSet,
    unversioned: bool,
}

impl Requirement {
    /// The set containing no binding.
    pub fn empty() -> Self {
        Self {
            versions: VersionRanges::empty(),
            revisions: RevisionSet::none(),
            unversioned: false,
        }
    }

    /// The set containing every binding.
    pub fn any() -> Self {
        Self {
            versions: VersionRanges::full(),
            revisions: RevisionSet::all(),
            unversioned: true,
        }
    }

    /// A dependency requirement admitting versions in `ranges`.
    pub fn versions(ranges: VersionRanges) -> Self {
        Self {
            versions: ranges,
            revisions: RevisionSet::none(),
            unversioned: true,
        }
    }

    /// A dependency requirement pinning one revision.
    pub fn revision(revision: impl Into<Revision>) -> Self {
        Self {
            versions: VersionRanges::empty(),
            revisions: RevisionSet::only(revision.into()),
            unversioned: true,
        }
    }

    /// A dependency requirement on a package that carries no version
    /// (root and filesystem packages).
    pub fn unversioned() -> Self {
        Self {
            versions: VersionRanges::empty(),
            revisions: RevisionSet::none(),
            unversioned: true,
        }
    }

    /// The singleton set holding exactly `binding`. Used for decisions; a
    /// version or revision decision does not admit the unversioned marker.
    pub fn exactly(binding: &Binding) -> Self {
        match binding {
            Binding::Version(v) => Self {
                versions: VersionRanges::singleton(v.clone()),
                revisions: RevisionSet::none(),
                unversioned: false,
            },
            Binding::Revision { revision, .. } => Self {
                versions: VersionRanges::empty(),
                revisions: RevisionSet::only(revision.clone()),
                unversioned: false,
            },
            Binding::Unversioned => Self {
                versions: VersionRanges::empty(),
                revisions: RevisionSet::none(),
                unversioned: true,
            },
        }
    }

    /// Whether no binding satisfies this requirement.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.revisions.is_empty() && !self.unversioned
    }

    /// Whether `binding` satisfies this requirement.
    pub fn contains(&self, binding: &Binding) -> bool {
        match binding {
            Binding::Version(v) => self.versions.contains(v),
            Binding::Revision { revision, .. } => self.revisions.contains(revision),
            Binding::Unversioned => self.unversioned,
        }
    }

    /// Componentwise complement.
    pub fn complement(&self) -> Self {
        Self {
            versions: self.versions.complement(),
            revisions: self.revisions.complement(),
            unversioned: !self.unversioned,
        }
    }

    /// Componentwise intersection.
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            versions: self.versions.intersection(&other.versions),
            revisions: self.revisions.intersection(&other.revisions),
            unversioned: self.unversioned && other.unversioned,
        }
    }

    /// Union, via De Morgan.
    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }

    /// Whether every binding in `self` is also in `other`.
    pub fn subset_of(&self, other: &Self) -> bool {
        self == &self.intersection(other)
    }

    /// Whether no binding is in both sets.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other).is_empty()
    }

    /// The version component of this requirement.
    pub fn version_ranges(&self) -> &VersionRanges {
        &self.versions
    }

    /// When this requirement pins exactly one revision (and admits no
    /// released version), return it.
    pub fn pinned_revision(&self) -> Option<&Revision> {
        if !self.versions.is_empty() {
            return None;
        }
        match &self.revisions {
            RevisionSet::Only(set) if set.len() == 1 => set.iter().next(),
            _ => None,
        }
    }

    /// Whether the unversioned marker satisfies this requirement.
    pub fn admits_unversioned(&self) -> bool {
        self.unversioned
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("∅");
        }
        if self == &Self::any() {
            return f.write_str("*");
        }
        let mut wrote = false;
        if !self.versions.is_empty() {
            Display::fmt(&self.versions, f)?;
            wrote = true;
        }
        match &self.revisions {
            RevisionSet::Only(set) if !set.is_empty() => {
                for revision in set {
                    if wrote {
                        f.write_str(" | ")?;
                    }
                    write!(f, "revision {}", revision)?;
                    wrote = true;
                }
            }
            RevisionSet::AllExcept(_) => {
                if wrote {
                    f.write_str(" | ")?;
                }
                f.write_str("any revision")?;
                wrote = true;
            }
            RevisionSet::Only(_) => {}
        }
        if self.unversioned && !wrote {
            f.write_str("unversioned")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u64, minor: u64, patch: u64) -> Version {
        Version::new(major, minor, patch)
    }

    #[test]
    fn version_requirement_admits_versions_in_range() {
        let requirement =
            Requirement::versions(VersionRanges::release_range(v(1, 0, 0), v(2, 0, 0)));
        assert!(requirement.contains(&Binding::Version(v(1, 5, 0))));
        assert!(!requirement.contains(&Binding::Version(v(2, 0, 0))));
        assert!(!requirement.contains(&Binding::revision("abc123")));
    }

    #[test]
    fn unversioned_binding_satisfies_any_dependency_requirement() {
        let versions = Requirement::versions(VersionRanges::release_range(v(1, 0, 0), v(2, 0, 0)));
        let revision = Requirement::revision("abc123");
        assert!(versions.contains(&Binding::Unversioned));
        assert!(revision.contains(&Binding::Unversioned));
        // And an unversioned decision is a subset of both.
        let decision = Requirement::exactly(&Binding::Unversioned);
        assert!(decision.subset_of(&versions));
        assert!(decision.subset_of(&revision));
    }

    #[test]
    fn revision_intersection_is_commit_equality() {
        let a = Requirement::revision("abc123");
        let b = Requirement::revision("abc123");
        let c = Requirement::revision("def456");
        assert_eq!(a.intersection(&b), a);
        assert!(Requirement::exactly(&Binding::revision("abc123"))
            .is_disjoint(&Requirement::exactly(&Binding::revision("def456"))));
        // a ∩ c keeps only the unversioned marker both carry.
        let crossed = a.intersection(&c);
        assert!(!crossed.contains(&Binding::revision("abc123")));
        assert!(crossed.contains(&Binding::Unversioned));
    }

    #[test]
    fn revision_decision_contradicts_version_requirement() {
        let versions = Requirement::versions(VersionRanges::release_range(v(1, 0, 0), v(2, 0, 0)));
        let pinned = Requirement::exactly(&Binding::revision("abc123"));
        assert!(pinned.is_disjoint(&versions));
    }

    #[test]
    fn complement_laws() {
        let requirement =
            Requirement::versions(VersionRanges::release_range(v(1, 0, 0), v(2, 0, 0)));
        assert_eq!(requirement.complement().complement(), requirement);
        assert!(requirement.intersection(&requirement.complement()).is_empty());
        assert_eq!(
            requirement.union(&requirement.complement()),
            Requirement::any()
        );
    }

    #[test]
    fn pinned_revision_accessor() {
        assert_eq!(
            Requirement::revision("abc").pinned_revision(),
            Some(&Revision::new("abc"))
        );
        assert_eq!(
            Requirement::versions(VersionRanges::full()).pinned_revision(),
            None
        );
    }
}
