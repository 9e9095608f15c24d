// SPDX-License-Identifier: MPL-2.0

//! A term is the fundamental unit of operation of the solver.
//! It is a positive or negative expression regarding a set of bindings.

use std::fmt::{self, Display};

use crate::requirement::{Binding, Requirement};

/// A positive or negative expression regarding a set of bindings.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Term {
    /// For example, `1.0.0 <= v < 2.0.0` is a positive expression that is
    /// evaluated true if the package is bound and the binding is in the
    /// requirement.
    Positive(Requirement),
    /// The term `not (v < 3.0.0)` is a negative expression that is
    /// evaluated true if the binding is outside the requirement or if the
    /// package is not bound at all.
    Negative(Requirement),
}

impl Term {
    /// A term that is always true.
    pub(crate) fn any() -> Self {
        Self::Negative(Requirement::empty())
    }

    /// A term that is never true.
    pub(crate) fn empty() -> Self {
        Self::Positive(Requirement::empty())
    }

    /// A positive term containing exactly one binding.
    pub(crate) fn exact(binding: &Binding) -> Self {
        Self::Positive(Requirement::exactly(binding))
    }

    pub(crate) fn is_positive(&self) -> bool {
        matches!(self, Self::Positive(_))
    }

    /// Negate a term. Evaluation of the negated term always returns the
    /// opposite of the evaluation of the original one.
    pub(crate) fn negate(&self) -> Self {
        match self {
            Self::Positive(requirement) => Self::Negative(requirement.clone()),
            Self::Negative(requirement) => Self::Positive(requirement.clone()),
        }
    }

    /// Evaluate the term for a given choice of binding.
    pub(crate) fn contains(&self, binding: &Binding) -> bool {
        match self {
            Self::Positive(requirement) => requirement.contains(binding),
            Self::Negative(requirement) => !requirement.contains(binding),
        }
    }

    /// The requirement of a positive term.
    /// Panics if called on a negative term.
    pub(crate) fn unwrap_positive(&self) -> &Requirement {
        match self {
            Self::Positive(requirement) => requirement,
            Self::Negative(_) => panic!("negative term cannot unwrap positive requirement"),
        }
    }

    /// Compute the intersection of two terms.
    /// If at least one term is positive, the intersection is positive.
    pub(crate) fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Positive(r1), Self::Positive(r2)) => Self::Positive(r1.intersection(r2)),
            (Self::Positive(r1), Self::Negative(r2)) => {
                Self::Positive(r1.intersection(&r2.complement()))
            }
            (Self::Negative(r1), Self::Positive(r2)) => {
                Self::Positive(r1.complement().intersection(r2))
            }
            (Self::Negative(r1), Self::Negative(r2)) => Self::Negative(r1.union(r2)),
        }
    }

    /// Compute the union of two terms.
    /// If at least one term is negative, the union is negative.
    pub(crate) fn union(&self, other: &Self) -> Self {
        self.negate().intersection(&other.negate()).negate()
    }

    /// Whether the terms have no binding in common.
    pub(crate) fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other) == Self::empty()
    }

    /// Indicate if this term is a subset of another term.
    /// Just like for sets, `t1 ⊆ t2` iff `t1 ∩ t2 = t1`.
    pub(crate) fn subset_of(&self, other: &Self) -> bool {
        self == &self.intersection(other)
    }

    /// Check if a set of terms (represented by their intersection)
    /// satisfies or contradicts this term, or is inconclusive for it.
    ///
    /// `S` satisfies `t` iff `⋂ S ⊆ t`; `S` contradicts `t` iff
    /// `(⋂ S) ∩ t = ∅`.
    pub(crate) fn relation_with(&self, other_terms_intersection: &Self) -> Relation {
        let full_intersection = self.intersection(other_terms_intersection);
        if &full_intersection == other_terms_intersection {
            Relation::Satisfied
        } else if full_intersection == Self::empty() {
            Relation::Contradicted
        } else {
            Relation::Inconclusive
        }
    }
}

/// Describe a relation between a set of terms S and another term t.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Relation {
    /// t must be true whenever every term in S is true.
    Satisfied,
    /// t must be false whenever every term in S is true.
    Contradicted,
    /// Neither of the above.
    Inconclusive,
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive(requirement) => write!(f, "{}", requirement),
            Self::Negative(requirement) => write!(f, "not ( {} )", requirement),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use proptest::prelude::*;
    use semver_ranges::{Version, VersionRanges};

    use super::*;

    fn requirement_strat() -> impl Strategy<Value = Requirement> {
        prop::collection::vec((0u64..5, 0u64..5), 0..4).prop_map(|pairs| {
            let ranges = pairs
                .into_iter()
                .fold(VersionRanges::empty(), |acc, (a, b)| {
                    let (a, b) = (Version::new(a.min(b), 0, 0), Version::new(a.max(b) + 1, 0, 0));
                    acc.union(&VersionRanges::between(a, b))
                });
            Requirement::versions(ranges)
        })
    }

    pub(crate) fn strategy() -> impl Strategy<Value = Term> {
        prop_oneof![
            requirement_strat().prop_map(Term::Positive),
            requirement_strat().prop_map(Term::Negative),
        ]
    }

    fn satisfied_by(term: &Term, terms_intersection: &Term) -> bool {
        terms_intersection.subset_of(term)
    }

    fn contradicted_by(term: &Term, terms_intersection: &Term) -> bool {
        terms_intersection.intersection(term) == Term::empty()
    }

    proptest! {
        #[test]
        fn relation_with(term1 in strategy(), term2 in strategy()) {
            match term1.relation_with(&term2) {
                Relation::Satisfied => prop_assert!(satisfied_by(&term1, &term2)),
                Relation::Contradicted => prop_assert!(contradicted_by(&term1, &term2)),
                Relation::Inconclusive => {
                    prop_assert!(!satisfied_by(&term1, &term2));
                    prop_assert!(!contradicted_by(&term1, &term2));
                }
            }
        }

        #[test]
        fn intersection_is_symmetric(t1 in strategy(), t2 in strategy()) {
            prop_assert_eq!(t1.intersection(&t2), t2.intersection(&t1));
        }

        #[test]
        fn intersection_is_associative(t1 in strategy(), t2 in strategy(), t3 in strategy()) {
            prop_assert_eq!(
                t1.intersection(&t2).intersection(&t3),
                t1.intersection(&t2.intersection(&t3))
            );
        }

        #[test]
        fn intersection_is_idempotent(t1 in strategy()) {
            prop_assert_eq!(t1.intersection(&t1), t1.clone());
        }

        #[test]
        fn intersection_with_inverse_is_empty(t1 in strategy()) {
            prop_assert_eq!(t1.intersection(&t1.negate()), Term::empty());
        }
    }
}
