// SPDX-License-Identifier: MPL-2.0

//! The conflict-driven solving loop.
//!
//! Finds one binding per package such that every constraint declared by
//! any participating manifest at its chosen binding is satisfied. When
//! that is impossible, the error carries a [DerivationTree] explaining the
//! full chain of reasons (see [crate::report]).
//!
//! The loop alternates unit propagation over the incompatibility store
//! with decision making: the undecided package with the fewest matching
//! candidates is decided next (ties broken by lexicographic identity), and
//! candidates are tried newest first. Conflicts derive new
//! incompatibilities by resolution and backtrack the partial solution.

use std::cmp::Reverse;

use rustc_hash::{FxHashMap, FxHashSet};
use semver_ranges::{Version, VersionRanges};

use crate::error::{ProviderError, ResolveError};
use crate::identity::{PackageIdentity, PackageRef};
use crate::internal::{Incompatibility, State};
use crate::manifest::{DependencyDecl, Manifest};
use crate::provider::{ContainerKind, PackageContainer, PackageProvider};
use crate::requirement::{Binding, Requirement};

/// Bindings selected by the solver, keyed by package identity.
pub type SelectedBindings = std::collections::BTreeMap<PackageIdentity, Binding>;

/// Resolve the dependency closure of a root manifest to concrete bindings.
///
/// The root itself is bound [Binding::Unversioned] and appears in the
/// returned map. Identical inputs produce identical outputs.
pub fn resolve(
    provider: &dyn PackageProvider,
    root: &Manifest,
) -> Result<SelectedBindings, ResolveError> {
    resolve_dependencies(provider, &root.identity, &root.dependencies)
}

/// Resolve with an explicit set of root dependency declarations, e.g.
/// after trait evaluation has filtered the root manifest's declarations.
pub fn resolve_dependencies(
    provider: &dyn PackageProvider,
    root: &PackageIdentity,
    root_dependencies: &[DependencyDecl],
) -> Result<SelectedBindings, ResolveError> {
    let mut state = State::init(root.clone());
    let mut solver = SolverContext {
        provider,
        root: root.clone(),
        root_dependencies,
        refs: FxHashMap::default(),
        candidate_cache: FxHashMap::default(),
        added_dependencies: FxHashMap::default(),
    };
    for dependency in root_dependencies {
        solver.remember_ref(&dependency.package_ref);
    }

    let mut next = root.clone();
    loop {
        check_cancellation(provider)?;

        log::info!("unit_propagation: {}", &next);
        state
            .unit_propagation(next)
            .map_err(|tree| ResolveError::NoSolution(Box::new(tree)))?;

        log::debug!(
            "partial solution after unit propagation: {}",
            state.partial_solution
        );

        let Some(highest_priority_pkg) = state
            .partial_solution
            .pick_highest_priority_pkg(|package, requirement| {
                solver.prioritize(package, requirement)
            })
        else {
            return Ok(state.partial_solution.extract_solution());
        };
        next = highest_priority_pkg;

        let term_intersection = state
            .partial_solution
            .term_intersection_for_package(&next)
            .ok_or_else(|| {
                ResolveError::Failure("a package was chosen but we don't have a term".into())
            })?
            .clone();
        let requirement = term_intersection.unwrap_positive();

        check_cancellation(provider)?;
        let decision = solver.choose_binding(&next, requirement)?;
        log::info!("chose: {} @ {:?}", next, decision);

        // Pick the next compatible binding.
        let binding = match decision {
            None => {
                let incompat =
                    Incompatibility::no_versions(next.clone(), term_intersection.clone());
                state.add_incompatibility(incompat);
                continue;
            }
            Some(binding) => binding,
        };

        if !requirement.contains(&binding) {
            return Err(ResolveError::Failure(
                "choose_binding picked an incompatible binding".into(),
            ));
        }

        let is_new_dependency = solver
            .added_dependencies
            .entry(next.clone())
            .or_default()
            .insert(binding.clone());

        if is_new_dependency {
            check_cancellation(provider)?;
            let dependencies = match solver.dependencies_of(&next, &binding) {
                Ok(dependencies) => dependencies,
                Err(ProviderError::UnknownBinding { package, binding }) => {
                    state.add_incompatibility(Incompatibility::unavailable(
                        package,
                        binding,
                        "its dependencies could not be determined",
                    ));
                    continue;
                }
                Err(ProviderError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(other) => return Err(other.into()),
            };

            let mut constraints = Vec::with_capacity(dependencies.len());
            for dependency in &dependencies {
                solver.remember_ref(&dependency.package_ref);
                if dependency.package_ref.identity == next {
                    // A self-dependency already satisfied by the candidate
                    // adds no information; anything else is a mistake.
                    if dependency.requirement.contains(&binding) {
                        continue;
                    }
                    return Err(ResolveError::SelfDependency {
                        package: next,
                        binding,
                    });
                }
                constraints.push((
                    dependency.package_ref.identity.clone(),
                    dependency.requirement.clone(),
                ));
            }

            // Add the binding and its dependencies if they are not
            // immediately conflicting.
            let dep_incompats = state.add_incompatibility_from_dependencies(
                next.clone(),
                Requirement::exactly(&binding),
                constraints,
            );
            state.partial_solution.add_version(
                next.clone(),
                binding,
                dep_incompats,
                &state.incompatibility_store,
            );
        } else {
            // The dependency incompatibilities of this binding are already
            // indexed and not satisfied, so the decision is safe.
            log::info!("add_decision (not first time): {} @ {}", &next, binding);
            state.partial_solution.add_decision(next.clone(), binding);
        }
    }
}

fn check_cancellation(provider: &dyn PackageProvider) -> Result<(), ResolveError> {
    provider.should_cancel().map_err(|err| match err {
        ProviderError::Cancelled => ResolveError::Cancelled,
        other => ResolveError::Provider(other),
    })
}

struct SolverContext<'a> {
    provider: &'a dyn PackageProvider,
    root: PackageIdentity,
    root_dependencies: &'a [DependencyDecl],
    /// Where each discovered identity can be fetched from.
    refs: FxHashMap<PackageIdentity, PackageRef>,
    /// Full candidate list per container, newest first, fetched once per
    /// run. Version sequences are finite and non-restartable.
    candidate_cache: FxHashMap<PackageIdentity, Vec<Version>>,
    /// Bindings whose dependency incompatibilities are already indexed.
    added_dependencies: FxHashMap<PackageIdentity, FxHashSet<Binding>>,
}

impl<'a> SolverContext<'a> {
    fn remember_ref(&mut self, package_ref: &PackageRef) {
        self.refs
            .entry(package_ref.identity.clone())
            .or_insert_with(|| package_ref.clone());
    }

    fn container(&self, package: &PackageIdentity) -> Result<&'a dyn PackageContainer, ProviderError> {
        let package_ref =
            self.refs
                .get(package)
                .ok_or_else(|| ProviderError::UnknownPackage {
                    package: package.clone(),
                })?;
        self.provider.container_for(package_ref)
    }

    fn candidates(&mut self, package: &PackageIdentity) -> &[Version] {
        if !self.candidate_cache.contains_key(package) {
            let candidates = self
                .container(package)
                .and_then(|container| container.versions(&VersionRanges::full()))
                .unwrap_or_default();
            self.candidate_cache.insert(package.clone(), candidates);
        }
        &self.candidate_cache[package]
    }

    /// Decision priority: fewest matching candidates first, ties broken by
    /// lexicographically smallest identity.
    fn prioritize(
        &mut self,
        package: &PackageIdentity,
        requirement: &Requirement,
    ) -> (Reverse<u64>, Reverse<PackageIdentity>) {
        let count = if package == &self.root || requirement.pinned_revision().is_some() {
            1
        } else {
            match self.container(package).map(|container| container.kind()) {
                Ok(ContainerKind::FileSystem) => 1,
                Ok(_) => {
                    let ranges = requirement.version_ranges().clone();
                    self.candidates(package)
                        .iter()
                        .filter(|&version| ranges.contains(version))
                        .count() as u64
                }
                Err(_) => 0,
            }
        };
        (Reverse(count), Reverse(package.clone()))
    }

    /// Choose the next candidate binding for a package, newest first.
    fn choose_binding(
        &mut self,
        package: &PackageIdentity,
        requirement: &Requirement,
    ) -> Result<Option<Binding>, ResolveError> {
        if package == &self.root {
            return Ok(Some(Binding::Unversioned));
        }
        if let Some(revision) = requirement.pinned_revision() {
            return Ok(Some(Binding::revision(revision.as_str())));
        }
        let kind = match self.container(package) {
            Ok(container) => container.kind(),
            Err(ProviderError::Cancelled) => return Err(ResolveError::Cancelled),
            Err(err) => return Err(err.into()),
        };
        if kind == ContainerKind::FileSystem {
            return Ok(Some(Binding::Unversioned));
        }
        let ranges = requirement.version_ranges().clone();
        Ok(self
            .candidates(package)
            .iter()
            .find(|&version| ranges.contains(version))
            .cloned()
            .map(Binding::Version))
    }

    /// Fetch the dependency declarations of a candidate binding.
    fn dependencies_of(
        &mut self,
        package: &PackageIdentity,
        binding: &Binding,
    ) -> Result<Vec<DependencyDecl>, ProviderError> {
        if package == &self.root {
            return Ok(self.root_dependencies.to_vec());
        }
        let container = self.container(package)?;
        match binding {
            Binding::Version(version) => container.dependencies_at_version(version),
            Binding::Revision { revision, .. } => container.dependencies_at_revision(revision),
            Binding::Unversioned => container.unversioned_dependencies(),
        }
    }
}
