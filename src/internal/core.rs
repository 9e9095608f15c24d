// SPDX-License-Identifier: MPL-2.0

//! Core state and functions of the conflict-driven solving algorithm:
//! unit propagation, conflict resolution and backtracking.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::identity::PackageIdentity;
use crate::internal::arena::Arena;
use crate::internal::incompatibility::{IncompId, Incompatibility, Relation};
use crate::internal::partial_solution::{DecisionLevel, PartialSolution, SatisfierSearch};
use crate::internal::small_vec::SmallVec;
use crate::report::DerivationTree;
use crate::requirement::Requirement;

/// Current state of the solving algorithm.
pub(crate) struct State {
    root: PackageIdentity,

    /// All incompatibilities touching each package, for O(1) propagation.
    incompatibilities: FxHashMap<PackageIdentity, Vec<IncompId>>,

    /// Incompatibilities that are already contradicted, together with the
    /// decision level at which that was established. They stay contradicted
    /// until we backtrack past that level.
    contradicted_incompatibilities: FxHashMap<IncompId, DecisionLevel>,

    /// The partial solution under construction.
    pub(crate) partial_solution: PartialSolution,

    /// Reference storage for all incompatibilities; write-only.
    pub(crate) incompatibility_store: Arena<Incompatibility>,

    /// Stack of work for `unit_propagation`, kept here to reuse its
    /// allocation between calls.
    unit_propagation_buffer: SmallVec<PackageIdentity>,
}

impl State {
    /// Initialize the state with the initial "pick the root" incompatibility.
    pub(crate) fn init(root: PackageIdentity) -> Self {
        let mut incompatibility_store = Arena::new();
        let not_root_id = incompatibility_store.alloc(Incompatibility::not_root(root.clone()));
        let mut incompatibilities = FxHashMap::default();
        incompatibilities.insert(root.clone(), vec![not_root_id]);
        Self {
            root,
            incompatibilities,
            contradicted_incompatibilities: FxHashMap::default(),
            partial_solution: PartialSolution::empty(),
            incompatibility_store,
            unit_propagation_buffer: SmallVec::empty(),
        }
    }

    /// Add a single incompatibility to the state.
    pub(crate) fn add_incompatibility(&mut self, incompat: Incompatibility) {
        let id = self.incompatibility_store.alloc(incompat);
        self.index_incompatibility(id);
    }

    /// Add one incompatibility per dependency of a candidate binding.
    pub(crate) fn add_incompatibility_from_dependencies(
        &mut self,
        package: PackageIdentity,
        self_requirement: Requirement,
        dependencies: impl IntoIterator<Item = (PackageIdentity, Requirement)>,
    ) -> std::ops::Range<IncompId> {
        let new_incompats_id_range =
            self.incompatibility_store
                .alloc_iter(dependencies.into_iter().map(|dependency| {
                    Incompatibility::from_dependency(
                        package.clone(),
                        self_requirement.clone(),
                        dependency,
                    )
                }));
        for id in IncompId::range_to_iter(new_incompats_id_range.clone()) {
            self.index_incompatibility(id);
        }
        new_incompats_id_range
    }

    /// Unit propagation is the core mechanism of the solving algorithm.
    /// CF <https://github.com/dart-lang/pub/blob/master/doc/solver.md#unit-propagation>
    pub(crate) fn unit_propagation(
        &mut self,
        package: PackageIdentity,
    ) -> Result<(), DerivationTree> {
        self.unit_propagation_buffer.clear();
        self.unit_propagation_buffer.push(package);
        while let Some(current_package) = self.unit_propagation_buffer.pop() {
            // Iterate over incompatibilities in reverse order to evaluate
            // the newest (and most specific) ones first.
            let mut conflict_id = None;
            let Some(incompat_ids) = self.incompatibilities.get(&current_package) else {
                continue;
            };
            for &incompat_id in incompat_ids.iter().rev() {
                if self
                    .contradicted_incompatibilities
                    .contains_key(&incompat_id)
                {
                    continue;
                }
                let current_incompat = &self.incompatibility_store[incompat_id];
                match self.partial_solution.relation(current_incompat) {
                    // A satisfied incompatibility means conflict.
                    Relation::Satisfied => {
                        log::info!(
                            "start conflict resolution because incompatibility is satisfied: {}",
                            current_incompat
                        );
                        conflict_id = Some(incompat_id);
                        break;
                    }
                    Relation::AlmostSatisfied(package_almost) => {
                        // `unit_propagation_buffer` may hold duplicates; a
                        // linear scan over this small stack beats hashing.
                        if !self.unit_propagation_buffer.contains(&package_almost) {
                            self.unit_propagation_buffer.push(package_almost.clone());
                        }
                        // Add (not term) to the partial solution with
                        // incompat as the cause.
                        self.partial_solution.add_derivation(
                            package_almost,
                            incompat_id,
                            &self.incompatibility_store,
                        );
                        // The incompatibility is now contradicted.
                        self.contradicted_incompatibilities.insert(
                            incompat_id,
                            self.partial_solution.current_decision_level(),
                        );
                    }
                    Relation::Contradicted(_) => {
                        self.contradicted_incompatibilities.insert(
                            incompat_id,
                            self.partial_solution.current_decision_level(),
                        );
                    }
                    Relation::Inconclusive => {}
                }
            }
            if let Some(incompat_id) = conflict_id {
                let (package_almost, root_cause) = self
                    .conflict_resolution(incompat_id)
                    .map_err(|terminal_incompat_id| {
                        self.build_derivation_tree(terminal_incompat_id)
                    })?;
                self.unit_propagation_buffer.clear();
                self.unit_propagation_buffer.push(package_almost.clone());
                self.partial_solution.add_derivation(
                    package_almost,
                    root_cause,
                    &self.incompatibility_store,
                );
                // The root cause is contradicted after the derivation.
                self.contradicted_incompatibilities.insert(
                    root_cause,
                    self.partial_solution.current_decision_level(),
                );
            }
        }
        Ok(())
    }

    /// Return the root cause, or the terminal incompatibility when the
    /// conflict chains all the way back to the root requirements.
    /// CF <https://github.com/dart-lang/pub/blob/master/doc/solver.md#conflict-resolution>
    fn conflict_resolution(
        &mut self,
        incompatibility: IncompId,
    ) -> Result<(PackageIdentity, IncompId), IncompId> {
        let mut current_incompat_id = incompatibility;
        let mut current_incompat_changed = false;
        loop {
            if self.incompatibility_store[current_incompat_id].is_terminal(&self.root) {
                return Err(current_incompat_id);
            }
            let (package, satisfier_search_result) = self.partial_solution.satisfier_search(
                &self.incompatibility_store[current_incompat_id],
                &self.incompatibility_store,
            );
            match satisfier_search_result {
                SatisfierSearch::DifferentDecisionLevels {
                    previous_satisfier_level,
                } => {
                    let package = package.clone();
                    self.backtrack(
                        current_incompat_id,
                        current_incompat_changed,
                        previous_satisfier_level,
                    );
                    log::info!("backtrack to {:?}", previous_satisfier_level);
                    return Ok((package, current_incompat_id));
                }
                SatisfierSearch::SameDecisionLevels { satisfier_cause } => {
                    let prior_cause = Incompatibility::prior_cause(
                        current_incompat_id,
                        satisfier_cause,
                        package,
                        &self.incompatibility_store,
                    );
                    log::info!("prior cause: {}", prior_cause);
                    current_incompat_id = self.incompatibility_store.alloc(prior_cause);
                    current_incompat_changed = true;
                }
            }
        }
    }

    fn backtrack(
        &mut self,
        incompat: IncompId,
        incompat_changed: bool,
        decision_level: DecisionLevel,
    ) {
        self.partial_solution.backtrack(decision_level);
        // Forget contradictions established by decisions we just dropped.
        self.contradicted_incompatibilities
            .retain(|_, dl| *dl <= decision_level);
        if incompat_changed {
            self.index_incompatibility(incompat);
        }
    }

    /// Register an incompatibility under every package it mentions.
    fn index_incompatibility(&mut self, id: IncompId) {
        for (package, _) in self.incompatibility_store[id].iter() {
            self.incompatibilities
                .entry(package.clone())
                .or_default()
                .push(id);
        }
    }

    // Error reporting #########################################################

    fn build_derivation_tree(&self, incompat: IncompId) -> DerivationTree {
        let mut all_ids: FxHashSet<IncompId> = FxHashSet::default();
        let mut shared_ids = FxHashSet::default();
        let mut stack = vec![incompat];
        while let Some(i) = stack.pop() {
            if let Some((id1, id2)) = self.incompatibility_store[i].causes() {
                if all_ids.contains(&i) {
                    shared_ids.insert(i);
                } else {
                    stack.push(id1);
                    stack.push(id2);
                }
            }
            all_ids.insert(i);
        }
        // Generate node trees in topological order, so that causes are
        // always processed before the incompatibility they derive; sorting
        // by arena id maintains that property without recursion.
        let mut sorted_ids = all_ids.into_iter().collect::<Vec<_>>();
        sorted_ids.sort_unstable_by_key(|id| id.into_raw());
        let mut precomputed = FxHashMap::default();
        for id in sorted_ids {
            let tree = Incompatibility::build_derivation_tree(
                id,
                &shared_ids,
                &self.incompatibility_store,
                &precomputed,
            );
            precomputed.insert(id, Arc::new(tree));
        }
        let root = precomputed
            .remove(&incompat)
            .expect("the requested incompatibility was processed");
        Arc::try_unwrap(root).unwrap_or_else(|arc| (*arc).clone())
    }
}
