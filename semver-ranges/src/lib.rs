// SPDX-License-Identifier: MPL-2.0

//! Pre-release-aware semantic versions and sets of version ranges.
//!
//! [`VersionRanges`] represents a set of [`Version`]s as an ordered list of
//! disjoint intervals with inclusive, exclusive or open-ended bounds. The
//! type is closed under [complement](VersionRanges::complement),
//! [intersection](VersionRanges::intersection) and
//! [union](VersionRanges::union), which is what a conflict-driven version
//! solver needs from its constraint sets.
//!
//! Basic building blocks:
//!  - [`empty()`](VersionRanges::empty): no version
//!  - [`full()`](VersionRanges::full): all versions
//!  - [`singleton(v)`](VersionRanges::singleton): exactly the version `v`
//!  - [`higher_than(v)`](VersionRanges::higher_than): `v <= versions`
//!  - [`strictly_lower_than(v)`](VersionRanges::strictly_lower_than): `versions < v`
//!  - [`between(v1, v2)`](VersionRanges::between): `v1 <= versions < v2`
//!
//! The semver-specific constructor is
//! [`release_range(v1, v2)`](VersionRanges::release_range): the half-open
//! range `[v1, v2)` that refuses pre-releases of `v2` itself. Pre-releases
//! of `v1` sit below `v1` in semver order, so they are only admitted when
//! `v1` is itself a pre-release.

mod version;

use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use smallvec::{smallvec, SmallVec};

pub use version::{Identifier, Version, VersionParseError};

type Segment = (Bound<Version>, Bound<Version>);

/// A set of versions, stored as ordered disjoint intervals.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct VersionRanges {
    segments: SmallVec<[Segment; 1]>,
}

impl VersionRanges {
    /// The empty set.
    pub fn empty() -> Self {
        Self {
            segments: SmallVec::new(),
        }
    }

    /// The set of all versions.
    pub fn full() -> Self {
        Self {
            segments: smallvec![(Unbounded, Unbounded)],
        }
    }

    /// The set containing exactly one version.
    pub fn singleton(v: impl Into<Version>) -> Self {
        let v = v.into();
        Self {
            segments: smallvec![(Included(v.clone()), Included(v))],
        }
    }

    /// All versions greater than or equal to `v`.
    pub fn higher_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Included(v.into()), Unbounded)],
        }
    }

    /// All versions strictly greater than `v`.
    pub fn strictly_higher_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Excluded(v.into()), Unbounded)],
        }
    }

    /// All versions less than or equal to `v`.
    pub fn lower_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Unbounded, Included(v.into()))],
        }
    }

    /// All versions strictly less than `v`.
    pub fn strictly_lower_than(v: impl Into<Version>) -> Self {
        Self {
            segments: smallvec![(Unbounded, Excluded(v.into()))],
        }
    }

    /// All versions `v1 <= v < v2`, with the bounds taken literally.
    pub fn between(v1: impl Into<Version>, v2: impl Into<Version>) -> Self {
        let (v1, v2) = (v1.into(), v2.into());
        if v1 < v2 {
            Self {
                segments: smallvec![(Included(v1), Excluded(v2))],
            }
        } else {
            Self::empty()
        }
    }

    /// The half-open range `[v1, v2)` with a pre-release-aware upper bound:
    /// when `v2` is a release version, pre-releases of `v2` are excluded as
    /// well. Pre-releases of `v1` are below `v1`, so they are admitted only
    /// when `v1` is itself a pre-release.
    pub fn release_range(v1: impl Into<Version>, v2: impl Into<Version>) -> Self {
        let v2 = v2.into();
        let upper = if v2.is_prerelease() {
            v2
        } else {
            v2.smallest_prerelease()
        };
        Self::between(v1, upper)
    }

    /// Whether the set contains no version at all.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// If the set contains exactly one version, return it.
    pub fn as_singleton(&self) -> Option<&Version> {
        match self.segments.as_slice() {
            [(Included(v1), Included(v2))] if v1 == v2 => Some(v1),
            _ => None,
        }
    }

    /// Whether `version` is a member of the set.
    pub fn contains(&self, version: &Version) -> bool {
        self.segments
            .iter()
            .any(|segment| within_bounds(version, segment) == Ordering::Equal)
    }

    /// Everything not in `self`.
    pub fn complement(&self) -> Self {
        match self.segments.first() {
            None => Self::full(),
            Some((Unbounded, Unbounded)) => Self::empty(),
            Some((Unbounded, Included(v))) => {
                Self::negate_segments(Excluded(v.clone()), &self.segments[1..])
            }
            Some((Unbounded, Excluded(v))) => {
                Self::negate_segments(Included(v.clone()), &self.segments[1..])
            }
            Some(_) => Self::negate_segments(Unbounded, &self.segments),
        }
    }

    fn negate_segments(start: Bound<Version>, segments: &[Segment]) -> Self {
        let mut complement = SmallVec::new();
        let mut start = start;
        for (lo, hi) in segments {
            complement.push((
                start,
                match lo {
                    Included(v) => Excluded(v.clone()),
                    Excluded(v) => Included(v.clone()),
                    Unbounded => unreachable!("only the first segment may be left-unbounded"),
                },
            ));
            start = match hi {
                Included(v) => Excluded(v.clone()),
                Excluded(v) => Included(v.clone()),
                Unbounded => Unbounded,
            };
        }
        if !matches!(start, Unbounded) {
            complement.push((start, Unbounded));
        }
        Self {
            segments: complement,
        }
        .check_invariants()
    }

    /// The versions contained in both `self` and `other`.
    pub fn intersection(&self, other: &Self) -> Self {
        let mut output: SmallVec<[Segment; 1]> = SmallVec::new();
        let mut left_iter = self.segments.iter().peekable();
        let mut right_iter = other.segments.iter().peekable();
        // Sweep both segment lists, always consuming the one whose end
        // comes first; every output segment ends at that bound.
        while let Some(((left_lo, left_hi), (right_lo, right_hi))) =
            left_iter.peek().zip(right_iter.peek())
        {
            let (other_lo, hi) = if left_end_is_smaller(left_hi.as_ref(), right_hi.as_ref()) {
                left_iter.next();
                (right_lo, left_hi)
            } else {
                right_iter.next();
                (left_lo, right_hi)
            };
            if !valid_segment(other_lo, hi) {
                continue;
            }
            let lo = match (left_lo, right_lo) {
                (Included(l), Included(r)) => Included(std::cmp::max(l, r).clone()),
                (Excluded(l), Excluded(r)) => Excluded(std::cmp::max(l, r).clone()),
                (Included(i), Excluded(e)) | (Excluded(e), Included(i)) => {
                    if i <= e {
                        Excluded(e.clone())
                    } else {
                        Included(i.clone())
                    }
                }
                (bound, Unbounded) | (Unbounded, bound) => bound.clone(),
            };
            output.push((lo, hi.clone()));
        }
        Self { segments: output }.check_invariants()
    }

    /// The versions contained in `self` or `other`.
    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }

    /// Whether no version is contained in both sets.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other).is_empty()
    }

    /// Whether every version in `self` is also in `other`.
    pub fn subset_of(&self, other: &Self) -> bool {
        self == &self.intersection(other)
    }

    /// Iterate over the segments of the set.
    pub fn iter(&self) -> impl Iterator<Item = (&Bound<Version>, &Bound<Version>)> {
        self.segments.iter().map(|(lo, hi)| (lo, hi))
    }

    fn check_invariants(self) -> Self {
        if cfg!(debug_assertions) {
            for pair in self.segments.windows(2) {
                debug_assert!(end_before_start_with_gap(&pair[0].1, &pair[1].0));
            }
            for (lo, hi) in &self.segments {
                debug_assert!(valid_segment(lo, hi));
            }
        }
        self
    }
}

/// Position of `version` relative to `segment`: `Less` below it, `Equal`
/// inside it, `Greater` above it.
fn within_bounds(version: &Version, segment: &Segment) -> Ordering {
    let below = match &segment.0 {
        Excluded(lo) => version <= lo,
        Included(lo) => version < lo,
        Unbounded => false,
    };
    if below {
        return Ordering::Less;
    }
    let inside = match &segment.1 {
        Unbounded => true,
        Included(hi) => version <= hi,
        Excluded(hi) => version < hi,
    };
    if inside {
        Ordering::Equal
    } else {
        Ordering::Greater
    }
}

/// A valid segment admits at least one version.
fn valid_segment(lo: &Bound<Version>, hi: &Bound<Version>) -> bool {
    match (lo, hi) {
        (Included(l), Included(h)) => l <= h,
        (Included(l), Excluded(h)) | (Excluded(l), Included(h)) | (Excluded(l), Excluded(h)) => {
            l < h
        }
        (Unbounded, _) | (_, Unbounded) => true,
    }
}

/// Whether one segment ends strictly before the next begins, leaving room
/// for at least the shared boundary version between them.
fn end_before_start_with_gap(end: &Bound<Version>, start: &Bound<Version>) -> bool {
    match (end, start) {
        (Unbounded, _) | (_, Unbounded) => false,
        (Included(l), Included(r)) | (Included(l), Excluded(r)) | (Excluded(l), Included(r)) => {
            l < r
        }
        (Excluded(l), Excluded(r)) => l <= r,
    }
}

fn left_end_is_smaller(left: Bound<&Version>, right: Bound<&Version>) -> bool {
    match (left, right) {
        (_, Unbounded) => true,
        (Unbounded, _) => false,
        (Included(l), Included(r)) | (Excluded(l), Excluded(r)) | (Excluded(l), Included(r)) => {
            l <= r
        }
        (Included(l), Excluded(r)) => l < r,
    }
}

impl Display for VersionRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "∅");
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, " | ")?;
            }
            match segment {
                (Unbounded, Unbounded) => write!(f, "*")?,
                (Unbounded, Included(v)) => write!(f, "<={v}")?,
                (Unbounded, Excluded(v)) => write!(f, "<{v}")?,
                (Included(v), Unbounded) => write!(f, ">={v}")?,
                (Excluded(v), Unbounded) => write!(f, ">{v}")?,
                (Included(lo), Included(hi)) if lo == hi => write!(f, "{lo}")?,
                (Included(lo), Included(hi)) => write!(f, ">={lo}, <={hi}")?,
                (Included(lo), Excluded(hi)) => write!(f, ">={lo}, <{hi}")?,
                (Excluded(lo), Included(hi)) => write!(f, ">{lo}, <={hi}")?,
                (Excluded(lo), Excluded(hi)) => write!(f, ">{lo}, <{hi}")?,
            }
        }
        Ok(())
    }
}
