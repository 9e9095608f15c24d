// SPDX-License-Identifier: MPL-2.0

//! The partial solution is the ordered list of assignments (decisions and
//! derivations) accumulated during resolution, organized by package.

use std::cmp::Reverse;
use std::fmt::{self, Display};
use std::hash::BuildHasherDefault;

use priority_queue::PriorityQueue;
use rustc_hash::FxHasher;

use crate::identity::PackageIdentity;
use crate::internal::arena::Arena;
use crate::internal::incompatibility::{IncompId, Incompatibility, Relation};
use crate::internal::small_map::SmallMap;
use crate::internal::small_vec::SmallVec;
use crate::requirement::{Binding, Requirement};
use crate::solver::SelectedBindings;
use crate::term::Term;

type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Decision priority: fewest matching candidates first, then
/// lexicographically smallest identity. The queue pops its maximum, hence
/// the double `Reverse`.
pub(crate) type Priority = (Reverse<u64>, Reverse<PackageIdentity>);

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub(crate) struct DecisionLevel(pub(crate) u32);

impl DecisionLevel {
    pub(crate) fn increment(self) -> Self {
        Self(self.0 + 1)
    }
}

/// The partial solution: all package assignments, historically ordered.
#[derive(Clone)]
pub(crate) struct PartialSolution {
    next_global_index: u32,
    current_decision_level: DecisionLevel,
    /// `package_assignments` is primarily a map from a package to its
    /// assignments, but the index also keeps an order. Three sections are
    /// maintained:
    /// 1. `[..current_decision_level]`: packages that have a decision,
    ///    sorted by decision level. This makes it cheap to extract the
    ///    solution and to backtrack to a particular decision level.
    /// 2. `[current_decision_level..changed_this_decision_level]`:
    ///    packages whose assignments did not change since the last
    ///    prioritization pass, in no particular order.
    /// 3. `[changed_this_decision_level..]`: packages whose assignments
    ///    did change since then, in no particular order.
    package_assignments: FxIndexMap<PackageIdentity, PackageAssignments>,
    /// Undecided packages with a positive term intersection, ordered by
    /// decision priority.
    prioritized_potential_packages:
        PriorityQueue<PackageIdentity, Priority, BuildHasherDefault<FxHasher>>,
    changed_this_decision_level: usize,
}

impl Display for PartialSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut assignments: Vec<_> = self
            .package_assignments
            .iter()
            .map(|(p, pa)| format!("{}: {}", p, pa))
            .collect();
        assignments.sort();
        write!(
            f,
            "next_global_index: {}\ncurrent_decision_level: {:?}\npackage_assignments:\n{}",
            self.next_global_index,
            self.current_decision_level,
            assignments.join("\t\n")
        )
    }
}

/// The assignments already made for one package: the dated derivations,
/// the potential decision, and the running intersection of all their terms.
#[derive(Clone)]
struct PackageAssignments {
    smallest_decision_level: DecisionLevel,
    highest_decision_level: DecisionLevel,
    dated_derivations: SmallVec<DatedDerivation>,
    assignments_intersection: AssignmentsIntersection,
}

impl Display for PackageAssignments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let derivations: Vec<_> = self
            .dated_derivations
            .iter()
            .map(|dd| dd.to_string())
            .collect();
        write!(
            f,
            "decision range: {:?}..{:?}\nderivations:\n  {}\n,assignments_intersection: {}",
            self.smallest_decision_level,
            self.highest_decision_level,
            derivations.join("\n  "),
            self.assignments_intersection
        )
    }
}

#[derive(Clone)]
struct DatedDerivation {
    global_index: u32,
    decision_level: DecisionLevel,
    cause: IncompId,
    accumulated_intersection: Term,
}

impl Display for DatedDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, cause: {:?}", self.decision_level, self.cause)
    }
}

#[derive(Clone)]
enum AssignmentsIntersection {
    Decision {
        global_index: u32,
        binding: Binding,
        term: Term,
    },
    Derivations(Term),
}

impl Display for AssignmentsIntersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision {
                global_index,
                binding,
                ..
            } => write!(f, "Decision: index {}, binding = {}", global_index, binding),
            Self::Derivations(term) => write!(f, "Derivations term: {}", term),
        }
    }
}

impl AssignmentsIntersection {
    /// The term intersection of all assignments, decision included.
    fn term(&self) -> &Term {
        match self {
            Self::Decision { term, .. } => term,
            Self::Derivations(term) => term,
        }
    }

    /// A package is a potential pick if no decision has been made for it
    /// yet and its term intersection is positive.
    fn potential_package_filter<'a>(
        &'a self,
        package: &'a PackageIdentity,
    ) -> Option<(&'a PackageIdentity, &'a Requirement)> {
        match self {
            Self::Decision { .. } => None,
            Self::Derivations(term_intersection) => {
                if term_intersection.is_positive() {
                    Some((package, term_intersection.unwrap_positive()))
                } else {
                    None
                }
            }
        }
    }
}

/// Outcome of the satisfier search during conflict resolution.
#[derive(Clone, Debug)]
pub(crate) enum SatisfierSearch {
    DifferentDecisionLevels {
        previous_satisfier_level: DecisionLevel,
    },
    SameDecisionLevels {
        satisfier_cause: IncompId,
    },
}

type SatisfiedMap<'i> = SmallMap<&'i PackageIdentity, (Option<IncompId>, u32, DecisionLevel)>;

impl PartialSolution {
    /// Initialize an empty partial solution.
    pub(crate) fn empty() -> Self {
        Self {
            next_global_index: 0,
            current_decision_level: DecisionLevel(0),
            package_assignments: FxIndexMap::default(),
            prioritized_potential_packages: PriorityQueue::default(),
            changed_this_decision_level: 0,
        }
    }

    /// Add a decision at a new decision level.
    pub(crate) fn add_decision(&mut self, package: PackageIdentity, binding: Binding) {
        // Check that add_decision is never used in the wrong context.
        if cfg!(debug_assertions) {
            match self.package_assignments.get_mut(&package) {
                None => panic!("derivations must already exist"),
                Some(pa) => match &pa.assignments_intersection {
                    AssignmentsIntersection::Decision { .. } => {
                        panic!("a decision already exists for {}", package)
                    }
                    AssignmentsIntersection::Derivations(term) => {
                        debug_assert!(
                            term.contains(&binding),
                            "{}: {} was expected to be contained in {}",
                            package,
                            binding,
                            term,
                        )
                    }
                },
            }
            assert_eq!(
                self.changed_this_decision_level,
                self.package_assignments.len()
            );
        }
        let new_idx = self.current_decision_level.0 as usize;
        self.current_decision_level = self.current_decision_level.increment();
        let (old_idx, _, pa) = self
            .package_assignments
            .get_full_mut(&package)
            .expect("derivations must already exist");
        pa.highest_decision_level = self.current_decision_level;
        pa.assignments_intersection = AssignmentsIntersection::Decision {
            global_index: self.next_global_index,
            binding: binding.clone(),
            term: Term::exact(&binding),
        };
        // Maintain that the beginning of `package_assignments` holds all
        // decisions in decision-level order.
        if new_idx != old_idx {
            self.package_assignments.swap_indices(new_idx, old_idx);
        }
        self.next_global_index += 1;
    }

    /// Add a derivation forced by unit propagation.
    pub(crate) fn add_derivation(
        &mut self,
        package: PackageIdentity,
        cause: IncompId,
        incompatibility_store: &Arena<Incompatibility>,
    ) {
        use indexmap::map::Entry;
        let mut dated_derivation = DatedDerivation {
            global_index: self.next_global_index,
            decision_level: self.current_decision_level,
            cause,
            accumulated_intersection: incompatibility_store[cause]
                .get(&package)
                .expect("the cause names the derived package")
                .negate(),
        };
        self.next_global_index += 1;
        let pa_last_index = self.package_assignments.len().saturating_sub(1);
        match self.package_assignments.entry(package) {
            Entry::Occupied(mut occupied) => {
                let idx = occupied.index();
                let pa = occupied.get_mut();
                pa.highest_decision_level = self.current_decision_level;
                match &mut pa.assignments_intersection {
                    AssignmentsIntersection::Decision { .. } => {
                        panic!("add_derivation should not be called after a decision")
                    }
                    AssignmentsIntersection::Derivations(t) => {
                        *t = t.intersection(&dated_derivation.accumulated_intersection);
                        dated_derivation.accumulated_intersection = t.clone();
                        if t.is_positive() {
                            self.changed_this_decision_level =
                                std::cmp::min(self.changed_this_decision_level, idx);
                        }
                    }
                }
                pa.dated_derivations.push(dated_derivation);
            }
            Entry::Vacant(vacant) => {
                let term = dated_derivation.accumulated_intersection.clone();
                if term.is_positive() {
                    self.changed_this_decision_level =
                        std::cmp::min(self.changed_this_decision_level, pa_last_index);
                }
                vacant.insert(PackageAssignments {
                    smallest_decision_level: self.current_decision_level,
                    highest_decision_level: self.current_decision_level,
                    dated_derivations: SmallVec::one(dated_derivation),
                    assignments_intersection: AssignmentsIntersection::Derivations(term),
                });
            }
        }
    }

    /// Refresh priorities of the packages whose assignments changed and
    /// pop the best undecided package, if any remains.
    pub(crate) fn pick_highest_priority_pkg(
        &mut self,
        mut prioritizer: impl FnMut(&PackageIdentity, &Requirement) -> Priority,
    ) -> Option<PackageIdentity> {
        let check_all = self.changed_this_decision_level
            == self.current_decision_level.0.saturating_sub(1) as usize;
        let current_decision_level = self.current_decision_level;
        let prioritized_potential_packages = &mut self.prioritized_potential_packages;
        self.package_assignments
            .get_range(self.changed_this_decision_level..)
            .expect("the changed index stays within bounds")
            .iter()
            .filter(|(_, pa)| {
                // Only packages with changed assignments need updating,
                // i.e. those whose highest decision level is the current
                // one, unless we backtracked in the meantime.
                check_all || pa.highest_decision_level == current_decision_level
            })
            .filter_map(|(p, pa)| pa.assignments_intersection.potential_package_filter(p))
            .for_each(|(p, r)| {
                let priority = prioritizer(p, r);
                prioritized_potential_packages.push(p.clone(), priority);
            });
        self.changed_this_decision_level = self.package_assignments.len();
        prioritized_potential_packages.pop().map(|(p, _)| p)
    }

    /// When every positive derivation has a matching decision, the partial
    /// solution is total and resolution has succeeded.
    pub(crate) fn extract_solution(&self) -> SelectedBindings {
        self.package_assignments
            .iter()
            .take(self.current_decision_level.0 as usize)
            .map(|(p, pa)| match &pa.assignments_intersection {
                AssignmentsIntersection::Decision { binding, .. } => (p.clone(), binding.clone()),
                AssignmentsIntersection::Derivations(_) => {
                    panic!("derivations in the decision section")
                }
            })
            .collect()
    }

    /// Drop all assignments at a decision level strictly greater than
    /// `decision_level` and restore the cached intersections.
    pub(crate) fn backtrack(&mut self, decision_level: DecisionLevel) {
        self.current_decision_level = decision_level;
        self.package_assignments.retain(|_, pa| {
            if pa.smallest_decision_level > decision_level {
                // The whole history of this package is newer than the
                // backtrack target.
                false
            } else if pa.highest_decision_level <= decision_level {
                // Entirely older than the target: untouched.
                true
            } else {
                // smallest_decision_level <= decision_level < highest.
                // There can be no decision left for this package: a
                // decision would have been the latest assignment and would
                // carry the highest decision level.
                while pa.dated_derivations.last().map(|dd| dd.decision_level)
                    > Some(decision_level)
                {
                    pa.dated_derivations.pop();
                }
                debug_assert!(!pa.dated_derivations.is_empty());

                let last = pa
                    .dated_derivations
                    .last()
                    .expect("at least one derivation remains");
                pa.highest_decision_level = last.decision_level;
                pa.assignments_intersection =
                    AssignmentsIntersection::Derivations(last.accumulated_intersection.clone());
                true
            }
        });
        // All stored priorities are stale now; recompute them lazily.
        self.prioritized_potential_packages.clear();
        self.changed_this_decision_level =
            self.current_decision_level.0.saturating_sub(1) as usize;
    }

    /// Add the binding to the partial solution as a decision, unless one of
    /// the freshly added dependency incompatibilities would conflict.
    pub(crate) fn add_version(
        &mut self,
        package: PackageIdentity,
        binding: Binding,
        new_incompatibilities: std::ops::Range<IncompId>,
        incompatibility_store: &Arena<Incompatibility>,
    ) -> bool {
        let exact = Term::exact(&binding);
        let not_satisfied = |incompat: &Incompatibility| {
            incompat.relation(|p| {
                if p == &package {
                    Some(exact.clone())
                } else {
                    self.term_intersection_for_package(p).cloned()
                }
            }) != Relation::Satisfied
        };

        if incompatibility_store[new_incompatibilities]
            .iter()
            .all(not_satisfied)
        {
            log::info!("add_decision: {} @ {}", package, binding);
            self.add_decision(package, binding);
            true
        } else {
            log::info!(
                "not adding {} @ {} because of its dependencies",
                package,
                binding
            );
            false
        }
    }

    /// Check how the terms in the partial solution relate to the
    /// incompatibility.
    pub(crate) fn relation(&self, incompat: &Incompatibility) -> Relation {
        incompat.relation(|package| self.term_intersection_for_package(package).cloned())
    }

    /// The intersection of all terms recorded for a package.
    pub(crate) fn term_intersection_for_package(&self, package: &PackageIdentity) -> Option<&Term> {
        self.package_assignments
            .get(package)
            .map(|pa| pa.assignments_intersection.term())
    }

    /// Find the satisfier of the incompatibility and classify whether it
    /// shares a decision level with the previous satisfier.
    pub(crate) fn satisfier_search<'i>(
        &self,
        incompat: &'i Incompatibility,
        incompatibility_store: &Arena<Incompatibility>,
    ) -> (&'i PackageIdentity, SatisfierSearch) {
        let satisfied_map = Self::find_satisfier(incompat, &self.package_assignments);
        let (&satisfier_package, &(satisfier_cause, _, satisfier_decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_, (_, global_index, _))| *global_index)
            .expect("the incompatibility is satisfied, so it has a satisfier");
        let previous_satisfier_level = Self::find_previous_satisfier(
            incompat,
            satisfier_package,
            satisfied_map,
            &self.package_assignments,
            incompatibility_store,
        );
        let search_result = if previous_satisfier_level >= satisfier_decision_level {
            SatisfierSearch::SameDecisionLevels {
                satisfier_cause: satisfier_cause
                    .expect("a same-level satisfier is always a derivation"),
            }
        } else {
            SatisfierSearch::DifferentDecisionLevels {
                previous_satisfier_level,
            }
        };
        (satisfier_package, search_result)
    }

    /// A satisfier is the earliest assignment such that the incompatibility
    /// is satisfied by the partial solution up to and including it.
    /// Returns, for each package term, when it was first satisfied.
    fn find_satisfier<'i>(
        incompat: &'i Incompatibility,
        package_assignments: &FxIndexMap<PackageIdentity, PackageAssignments>,
    ) -> SatisfiedMap<'i> {
        let mut satisfied = SmallMap::default();
        for (package, incompat_term) in incompat.iter() {
            let pa = package_assignments
                .get(package)
                .expect("a satisfied incompatibility only names assigned packages");
            satisfied.insert(package, pa.satisfier(package, &incompat_term.negate()));
        }
        satisfied
    }

    /// Earliest assignment before the satisfier such that the
    /// incompatibility is satisfied by the partial solution up to and
    /// including that assignment plus the satisfier.
    fn find_previous_satisfier<'i>(
        incompat: &Incompatibility,
        satisfier_package: &'i PackageIdentity,
        mut satisfied_map: SatisfiedMap<'i>,
        package_assignments: &FxIndexMap<PackageIdentity, PackageAssignments>,
        incompatibility_store: &Arena<Incompatibility>,
    ) -> DecisionLevel {
        let satisfier_pa = package_assignments
            .get(satisfier_package)
            .expect("satisfier package is assigned");
        let (satisfier_cause, _, _) = satisfied_map
            .get(&satisfier_package)
            .expect("satisfier package is in the map");

        let accumulated_term = if let &Some(cause) = satisfier_cause {
            incompatibility_store[cause]
                .get(satisfier_package)
                .expect("the cause names the satisfier package")
                .negate()
        } else {
            match &satisfier_pa.assignments_intersection {
                AssignmentsIntersection::Derivations(_) => {
                    panic!("must be a decision")
                }
                AssignmentsIntersection::Decision { term, .. } => term.clone(),
            }
        };

        let incompat_term = incompat
            .get(satisfier_package)
            .expect("satisfier package is in the incompatibility");

        satisfied_map.insert(
            satisfier_package,
            satisfier_pa.satisfier(
                satisfier_package,
                &accumulated_term.intersection(&incompat_term.negate()),
            ),
        );

        let (_, &(_, _, decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_, (_, global_index, _))| *global_index)
            .expect("the map is non-empty");
        decision_level.max(DecisionLevel(1))
    }

    pub(crate) fn current_decision_level(&self) -> DecisionLevel {
        self.current_decision_level
    }
}

impl PackageAssignments {
    /// Find the derivation (or failing that, the decision) at which the
    /// accumulated intersection first became disjoint from `start_term`.
    fn satisfier(
        &self,
        package: &PackageIdentity,
        start_term: &Term,
    ) -> (Option<IncompId>, u32, DecisionLevel) {
        let idx = self
            .dated_derivations
            .as_slice()
            .partition_point(|dd| !dd.accumulated_intersection.is_disjoint(start_term));
        if let Some(dd) = self.dated_derivations.get(idx) {
            debug_assert_eq!(
                dd.accumulated_intersection.intersection(start_term),
                Term::empty()
            );
            return (Some(dd.cause), dd.global_index, dd.decision_level);
        }
        // Not found in the derivations, so the satisfier is the decision,
        // which is always the last assignment.
        match &self.assignments_intersection {
            AssignmentsIntersection::Decision { global_index, .. } => {
                (None, *global_index, self.highest_decision_level)
            }
            AssignmentsIntersection::Derivations(accumulated_intersection) => {
                unreachable!(
                    concat!(
                        "while processing package {}: ",
                        "accumulated term {} has overlap with incompat term {}, ",
                        "which means the last assignment should have been a decision, ",
                        "but instead it was a derivation. This shouldn't be possible! ",
                        "(Maybe the binding ordering is broken?)"
                    ),
                    package, accumulated_intersection, start_term
                )
            }
        }
    }
}
