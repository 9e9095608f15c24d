// SPDX-License-Identifier: MPL-2.0

//! An incompatibility is a set of terms for different packages
//! that should never be satisfied all together.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

use crate::identity::PackageIdentity;
use crate::internal::arena::{Arena, Id};
use crate::internal::small_map::SmallMap;
use crate::report::{DerivationTree, Derived, External};
use crate::requirement::{Binding, Requirement};
use crate::term::{self, Term};

/// An incompatibility is a set of terms for different packages that should
/// never be satisfied all together.
///
/// An incompatibility usually originates from a package dependency: if
/// package A at version 1 depends on package B at version 2, the set
/// `{ A = 1, not B = 2 }` is an incompatibility. Incompatibilities can also
/// be derived from two others during conflict resolution; their causes then
/// form a DAG of arena indices pointing back at the parents. More about
/// all this in the
/// [PubGrub documentation](https://github.com/dart-lang/pub/blob/master/doc/solver.md#incompatibility).
#[derive(Debug, Clone)]
pub(crate) struct Incompatibility {
    terms: SmallMap<PackageIdentity, Term>,
    kind: Kind,
}

/// An arena index identifying an incompatibility.
pub(crate) type IncompId = Id<Incompatibility>;

/// Why the incompatibility holds.
#[derive(Debug, Clone)]
enum Kind {
    /// Initial incompatibility driving the very first decision: the root
    /// package must be picked.
    Root(PackageIdentity),
    /// No binding exists for this package in the given requirement.
    NoVersions(PackageIdentity, Requirement),
    /// The package is unusable at the given binding, with a reason.
    Unavailable(PackageIdentity, Binding, String),
    /// A dependency declared by one package on another.
    Dependency(PackageIdentity, Requirement, PackageIdentity, Requirement),
    /// Derived from two parent incompatibilities during conflict
    /// resolution.
    Conflict(IncompId, IncompId),
}

/// A Relation describes how a set of terms can be compared to an
/// incompatibility. Typically, the set of terms comes from the partial
/// solution.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Relation {
    /// The set of terms satisfies every term of the incompatibility.
    Satisfied,
    /// The set of terms contradicts at least one term.
    Contradicted(PackageIdentity),
    /// The set of terms satisfies all but one term and is inconclusive for
    /// the remaining one; that package is the unsatisfied one.
    AlmostSatisfied(PackageIdentity),
    /// Otherwise.
    Inconclusive,
}

impl Incompatibility {
    /// The initial "not root" incompatibility.
    pub(crate) fn not_root(root: PackageIdentity) -> Self {
        Self {
            terms: SmallMap::One([(
                root.clone(),
                Term::Negative(Requirement::exactly(&Binding::Unversioned)),
            )]),
            kind: Kind::Root(root),
        }
    }

    /// Remember that the positive intersection for a package admits no
    /// binding the provider knows about.
    pub(crate) fn no_versions(package: PackageIdentity, term: Term) -> Self {
        let requirement = match &term {
            Term::Positive(requirement) => requirement.clone(),
            Term::Negative(_) => panic!("no_versions requires a positive term"),
        };
        Self {
            terms: SmallMap::One([(package.clone(), term)]),
            kind: Kind::NoVersions(package, requirement),
        }
    }

    /// Remember that a binding is unusable, e.g. because its dependency
    /// list cannot be obtained.
    pub(crate) fn unavailable(
        package: PackageIdentity,
        binding: Binding,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            terms: SmallMap::One([(package.clone(), Term::exact(&binding))]),
            kind: Kind::Unavailable(package, binding, reason.into()),
        }
    }

    /// Build an incompatibility from the dependency of a package binding:
    /// `{ package in self_requirement, not dependency in dep_requirement }`.
    ///
    /// A dependency whose requirement is empty normalizes the negative term
    /// away (`not ∅` is always true), leaving the positive term alone and
    /// thereby forbidding the depending binding outright.
    pub(crate) fn from_dependency(
        package: PackageIdentity,
        self_requirement: Requirement,
        dependency: (PackageIdentity, Requirement),
    ) -> Self {
        let (dep_package, dep_requirement) = dependency;
        let kind = Kind::Dependency(
            package.clone(),
            self_requirement.clone(),
            dep_package.clone(),
            dep_requirement.clone(),
        );
        let terms = Self::normalized_terms([
            (package, Term::Positive(self_requirement)),
            (dep_package, Term::Negative(dep_requirement)),
        ]);
        Self { terms, kind }
    }

    /// Merge terms on the same package (positives intersected, negatives
    /// unioned) and drop terms that are always true.
    fn normalized_terms(
        entries: impl IntoIterator<Item = (PackageIdentity, Term)>,
    ) -> SmallMap<PackageIdentity, Term> {
        let mut terms: SmallMap<PackageIdentity, Term> = SmallMap::default();
        for (package, term) in entries {
            let merged = match terms.get(&package) {
                Some(existing) => existing.intersection(&term),
                None => term,
            };
            terms.insert(package, merged);
        }
        let dropped: Vec<PackageIdentity> = terms
            .iter()
            .filter(|(_, term)| **term == Term::any())
            .map(|(package, _)| package.clone())
            .collect();
        for package in dropped {
            terms.remove(&package);
        }
        terms
    }

    /// Prior cause of two incompatibilities, using the rule of resolution:
    /// drop the terms on `package`, replacing them by the union of the two
    /// sides' terms on it, and intersect everything else.
    pub(crate) fn prior_cause(
        incompat: IncompId,
        satisfier_cause: IncompId,
        package: &PackageIdentity,
        incompatibility_store: &Arena<Incompatibility>,
    ) -> Self {
        let kind = Kind::Conflict(incompat, satisfier_cause);
        let mut terms = incompatibility_store[incompat].terms.clone();
        let t1 = terms
            .remove(package)
            .expect("the resolved package must appear in the incompatibility");
        let satisfier_cause_terms = &incompatibility_store[satisfier_cause].terms;
        terms.merge(
            satisfier_cause_terms.iter().filter(|(p, _)| p != &package),
            |t1, t2| Some(t1.intersection(t2)),
        );
        let term = t1.union(
            satisfier_cause_terms
                .get(package)
                .expect("the satisfier's cause must mention the package"),
        );
        if term != Term::any() {
            terms.insert(package.clone(), term);
        }
        Self { terms, kind }
    }

    /// Compare the terms of this incompatibility against a view of the
    /// partial solution, given as a lookup from package to the current term
    /// intersection for that package.
    pub(crate) fn relation(
        &self,
        mut terms: impl FnMut(&PackageIdentity) -> Option<Term>,
    ) -> Relation {
        let mut relation = Relation::Satisfied;
        for (package, incompat_term) in self.terms.iter() {
            match terms(package).map(|term| incompat_term.relation_with(&term)) {
                Some(term::Relation::Satisfied) => {}
                Some(term::Relation::Contradicted) => {
                    return Relation::Contradicted(package.clone());
                }
                None | Some(term::Relation::Inconclusive) => {
                    // A package not yet assigned behaves like `Term::any()`,
                    // which is inconclusive for every non-trivial term, and
                    // trivial terms are normalized away on construction.
                    if relation == Relation::Satisfied {
                        relation = Relation::AlmostSatisfied(package.clone());
                    } else {
                        relation = Relation::Inconclusive;
                    }
                }
            }
        }
        relation
    }

    /// Whether this incompatibility proves the whole resolution
    /// unsatisfiable: no term left, or only a root term.
    pub(crate) fn is_terminal(&self, root: &PackageIdentity) -> bool {
        match self.terms.len() {
            0 => true,
            1 => {
                let (package, term) = self
                    .terms
                    .iter()
                    .next()
                    .expect("len() == 1 guarantees an entry");
                package == root && term.contains(&Binding::Unversioned)
            }
            _ => false,
        }
    }

    /// The term on a given package, if present.
    pub(crate) fn get(&self, package: &PackageIdentity) -> Option<&Term> {
        self.terms.get(package)
    }

    /// Iterate over the package terms.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&PackageIdentity, &Term)> {
        self.terms.iter()
    }

    /// Parent causes, when derived during conflict resolution.
    pub(crate) fn causes(&self) -> Option<(IncompId, IncompId)> {
        match self.kind {
            Kind::Conflict(id1, id2) => Some((id1, id2)),
            _ => None,
        }
    }

    /// Build this node of the derivation tree. Children of derived nodes
    /// must already be present in `precomputed` (see the topological walk
    /// in `State::build_derivation_tree`).
    pub(crate) fn build_derivation_tree(
        self_id: IncompId,
        shared_ids: &FxHashSet<IncompId>,
        incompatibility_store: &Arena<Incompatibility>,
        precomputed: &FxHashMap<IncompId, Arc<DerivationTree>>,
    ) -> DerivationTree {
        match &incompatibility_store[self_id].kind {
            Kind::Conflict(id1, id2) => {
                let cause1 = precomputed
                    .get(id1)
                    .expect("causes are processed before the incompatibility they derive")
                    .clone();
                let cause2 = precomputed
                    .get(id2)
                    .expect("causes are processed before the incompatibility they derive")
                    .clone();
                DerivationTree::Derived(Derived {
                    terms: incompatibility_store[self_id].terms.as_map(),
                    shared_id: shared_ids
                        .contains(&self_id)
                        .then(|| self_id.into_raw()),
                    cause1,
                    cause2,
                })
            }
            Kind::Root(package) => DerivationTree::External(External::Root(package.clone())),
            Kind::NoVersions(package, requirement) => DerivationTree::External(
                External::NoVersions(package.clone(), requirement.clone()),
            ),
            Kind::Unavailable(package, binding, reason) => DerivationTree::External(
                External::Unavailable(package.clone(), binding.clone(), reason.clone()),
            ),
            Kind::Dependency(package, requirement, dep_package, dep_requirement) => {
                DerivationTree::External(External::Dependency(
                    package.clone(),
                    requirement.clone(),
                    dep_package.clone(),
                    dep_requirement.clone(),
                ))
            }
        }
    }

    /// Terms keyed by package, in a stable order, for reporting.
    pub(crate) fn displayable_terms(&self) -> BTreeMap<PackageIdentity, Term> {
        self.terms.as_map()
    }
}

impl Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            crate::report::DefaultStringReporter::string_terms(&self.displayable_terms())
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::term::tests::strategy as term_strat;

    /// For any three different packages p1, p2 and p3 and any three terms
    /// t1, t2 and t3, from the incompatibilities
    ///    { p1: t1, p2: not t2 } and { p2: t2, p3: t3 }
    /// the rule of resolution derives { p1: t1, p3: t3 }.
    proptest! {
        #[test]
        fn rule_of_resolution(t1 in term_strat(), t2 in term_strat(), t3 in term_strat()) {
            let p1 = PackageIdentity::new("p1");
            let p2 = PackageIdentity::new("p2");
            let p3 = PackageIdentity::new("p3");
            let mut store = Arena::new();
            let i1 = store.alloc(Incompatibility {
                terms: SmallMap::Two([(p1.clone(), t1.clone()), (p2.clone(), t2.negate())]),
                kind: Kind::Root(p1.clone()),
            });
            let i2 = store.alloc(Incompatibility {
                terms: SmallMap::Two([(p2.clone(), t2.clone()), (p3.clone(), t3.clone())]),
                kind: Kind::Root(p1.clone()),
            });

            let mut expected = BTreeMap::new();
            expected.insert(p1, t1);
            expected.insert(p3, t3);

            let derived = Incompatibility::prior_cause(i1, i2, &p2, &store);
            prop_assert_eq!(derived.displayable_terms(), expected);
        }
    }

    #[test]
    fn normalization_merges_terms_and_is_idempotent() {
        let foo = PackageIdentity::new("foo");
        let a = Term::Positive(Requirement::versions(
            semver_ranges::VersionRanges::release_range(
                semver_ranges::Version::new(1, 0, 0),
                semver_ranges::Version::new(2, 0, 0),
            ),
        ));
        let b = Term::Positive(Requirement::versions(
            semver_ranges::VersionRanges::release_range(
                semver_ranges::Version::new(1, 5, 0),
                semver_ranges::Version::new(3, 0, 0),
            ),
        ));
        let merged = Incompatibility::normalized_terms([
            (foo.clone(), a.clone()),
            (foo.clone(), b.clone()),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(&foo), Some(&a.intersection(&b)));

        // Normalizing an already-normalized set changes nothing.
        let renormalized = Incompatibility::normalized_terms(
            merged.iter().map(|(p, t)| (p.clone(), t.clone())),
        );
        assert_eq!(renormalized.as_map(), merged.as_map());
    }

    #[test]
    fn always_true_terms_are_dropped() {
        let foo = PackageIdentity::new("foo");
        let bar = PackageIdentity::new("bar");
        let terms = Incompatibility::normalized_terms([
            (foo.clone(), Term::exact(&Binding::Version(semver_ranges::Version::new(1, 0, 0)))),
            (bar, Term::Negative(Requirement::empty())),
        ]);
        assert_eq!(terms.len(), 1);
        assert!(terms.get(&foo).is_some());
    }
}
