// SPDX-License-Identifier: MPL-2.0

//! Trait evaluation: the fixed-point expansion of enabled traits across
//! the dependency closure.
//!
//! A trait is a named flag declared on a package. Each package seeds its
//! enabled set from its `default` trait (or from an external override for
//! the root), local declarations expand transitively, and dependency
//! declarations may activate traits on their dependees, optionally gated
//! on traits of the declarer. Evaluation iterates to a fixed point in
//! deterministic order (package identity, then declaration order).

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{Diagnostic, DiagnosticsBuffer};
use crate::identity::PackageIdentity;
use crate::manifest::{Condition, Manifest, Target};

/// The name of the trait whose enablements seed a package's enabled set.
pub const DEFAULT_TRAIT: &str = "default";

/// How the root package's enabled traits are chosen.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TraitConfiguration {
    /// Use the root manifest's `default` trait.
    Default,
    /// Enable nothing on the root.
    DisableAll,
    /// Enable exactly these traits on the root.
    Enabled(BTreeSet<String>),
}

impl TraitConfiguration {
    /// Enable exactly the given traits on the root.
    pub fn enabled<I: IntoIterator<Item = S>, S: Into<String>>(traits: I) -> Self {
        Self::Enabled(traits.into_iter().map(Into::into).collect())
    }
}

/// Enabled traits per package, keyed by identity.
pub type EnabledTraitsMap = BTreeMap<PackageIdentity, BTreeSet<String>>;

/// Compute the enabled-trait set of every package.
///
/// Unknown trait names (enabled but never declared, or activated on a
/// package that does not declare them) produce `error` diagnostics naming
/// the package and the trait, and are not propagated further.
pub fn evaluate_traits(
    manifests: &BTreeMap<PackageIdentity, Manifest>,
    root: &PackageIdentity,
    configuration: &TraitConfiguration,
    diagnostics: &mut DiagnosticsBuffer,
) -> EnabledTraitsMap {
    let mut enabled: EnabledTraitsMap = EnabledTraitsMap::new();
    let mut reported: BTreeSet<(PackageIdentity, String)> = BTreeSet::new();

    // Seeding.
    for (identity, manifest) in manifests {
        let seed: BTreeSet<String> = if identity == root {
            match configuration {
                TraitConfiguration::Default => default_enabled_traits(manifest),
                TraitConfiguration::DisableAll => BTreeSet::new(),
                TraitConfiguration::Enabled(traits) => traits.clone(),
            }
        } else {
            default_enabled_traits(manifest)
        };
        let mut checked = BTreeSet::new();
        for name in seed {
            if manifest.trait_decl(&name).is_some() {
                checked.insert(name);
            } else {
                report_unknown_trait(manifest, &name, diagnostics, &mut reported);
            }
        }
        enabled.insert(identity.clone(), checked);
    }

    // Fixed point: local transitive enablement plus inter-package
    // activations whose conditions are met.
    loop {
        let mut changed = false;
        for (identity, manifest) in manifests {
            let snapshot = enabled.get(identity).cloned().unwrap_or_default();

            // Local closure over declared enablements.
            let mut additions = BTreeSet::new();
            for name in &snapshot {
                if let Some(decl) = manifest.trait_decl(name) {
                    for enabled_trait in &decl.enabled_traits {
                        if manifest.trait_decl(enabled_trait).is_some() {
                            additions.insert(enabled_trait.clone());
                        } else {
                            report_unknown_trait(
                                manifest,
                                enabled_trait,
                                diagnostics,
                                &mut reported,
                            );
                        }
                    }
                }
            }
            if let Some(set) = enabled.get_mut(identity) {
                for addition in additions {
                    changed |= set.insert(addition);
                }
            }

            // Activations declared on outgoing dependencies.
            for dependency in &manifest.dependencies {
                let Some(activations) = &dependency.trait_activations else {
                    continue;
                };
                let dependee = &dependency.package_ref.identity;
                let Some(dependee_manifest) = manifests.get(dependee) else {
                    continue;
                };
                for activation in activations {
                    let condition_met = activation
                        .condition_traits
                        .iter()
                        .all(|name| snapshot.contains(name));
                    if !condition_met {
                        continue;
                    }
                    if dependee_manifest.trait_decl(&activation.name).is_none() {
                        report_unknown_trait(
                            dependee_manifest,
                            &activation.name,
                            diagnostics,
                            &mut reported,
                        );
                        continue;
                    }
                    if let Some(set) = enabled.get_mut(dependee) {
                        changed |= set.insert(activation.name.clone());
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    enabled
}

fn default_enabled_traits(manifest: &Manifest) -> BTreeSet<String> {
    manifest
        .trait_decl(DEFAULT_TRAIT)
        .map(|decl| decl.enabled_traits.clone())
        .unwrap_or_default()
}

fn report_unknown_trait(
    manifest: &Manifest,
    name: &str,
    diagnostics: &mut DiagnosticsBuffer,
    reported: &mut BTreeSet<(PackageIdentity, String)>,
) {
    if !reported.insert((manifest.identity.clone(), name.to_string())) {
        return;
    }
    diagnostics.emit(
        Diagnostic::error(format!(
            "trait '{}' is not declared by package '{}'",
            name, manifest.identity
        ))
        .for_package(manifest.identity.clone()),
    );
}

/// Whether the trait component of a condition is met for the declaring
/// package. Platform and configuration components are left to the build
/// planner and do not participate here.
pub fn trait_condition_met(condition: Option<&Condition>, enabled: &BTreeSet<String>) -> bool {
    match condition.and_then(|condition| condition.traits.as_ref()) {
        None => true,
        Some(required) => required.iter().all(|name| enabled.contains(name)),
    }
}

/// The synthetic compilation-condition defines of a target, in
/// deterministic order: first the declared settings whose trait condition
/// is satisfied, in declaration order; then one define per enabled trait,
/// in declaration order of the manifest's traits.
pub fn compilation_defines(
    manifest: &Manifest,
    target: &Target,
    enabled: &BTreeSet<String>,
) -> Vec<String> {
    let mut defines = Vec::new();
    for setting in &target.settings {
        if trait_condition_met(setting.condition.as_ref(), enabled) {
            defines.push(setting.define.clone());
        }
    }
    for decl in &manifest.traits {
        if decl.name != DEFAULT_TRAIT && enabled.contains(&decl.name) {
            defines.push(decl.name.clone());
        }
    }
    defines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DependencyDecl, TraitActivation, TraitDecl};
    use crate::identity::PackageRef;
    use crate::requirement::Requirement;
    use semver_ranges::VersionRanges;

    fn manifest_map(manifests: Vec<Manifest>) -> BTreeMap<PackageIdentity, Manifest> {
        manifests
            .into_iter()
            .map(|manifest| (manifest.identity.clone(), manifest))
            .collect()
    }

    #[test]
    fn defaults_seed_and_expand_locally() {
        let root = Manifest::local("App", "/app").with_traits(vec![
            TraitDecl::enabling(DEFAULT_TRAIT, ["fancy"]),
            TraitDecl::enabling("fancy", ["extra"]),
            TraitDecl::new("extra"),
        ]);
        let identity = root.identity.clone();
        let manifests = manifest_map(vec![root]);
        let mut diagnostics = DiagnosticsBuffer::new();
        let enabled = evaluate_traits(
            &manifests,
            &identity,
            &TraitConfiguration::Default,
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty());
        let expected: BTreeSet<String> = ["fancy", "extra"].map(String::from).into();
        assert_eq!(enabled[&identity], expected);
    }

    #[test]
    fn conditional_activation_crosses_packages() {
        let dep = Manifest::local("Lib", "/lib").with_traits(vec![TraitDecl::new("logging")]);
        let dep_ref = PackageRef::file_system("/lib");
        let root = Manifest::local("App", "/app")
            .with_traits(vec![
                TraitDecl::enabling(DEFAULT_TRAIT, ["verbose"]),
                TraitDecl::new("verbose"),
            ])
            .with_dependencies(vec![DependencyDecl::new(
                dep_ref,
                Requirement::versions(VersionRanges::full()),
            )
            .with_traits(vec![TraitActivation::when("logging", ["verbose"])])]);
        let root_identity = root.identity.clone();
        let dep_identity = dep.identity.clone();
        let manifests = manifest_map(vec![root, dep]);
        let mut diagnostics = DiagnosticsBuffer::new();
        let enabled = evaluate_traits(
            &manifests,
            &root_identity,
            &TraitConfiguration::Default,
            &mut diagnostics,
        );
        assert!(enabled[&dep_identity].contains("logging"));

        // With the condition unmet, nothing is activated on the dependee.
        let disabled = evaluate_traits(
            &manifests,
            &root_identity,
            &TraitConfiguration::DisableAll,
            &mut diagnostics,
        );
        assert!(disabled[&dep_identity].is_empty());
    }

    #[test]
    fn evaluation_is_a_fixed_point() {
        let dep = Manifest::local("Lib", "/lib")
            .with_traits(vec![TraitDecl::enabling("a", ["b"]), TraitDecl::new("b")]);
        let root = Manifest::local("App", "/app")
            .with_traits(vec![TraitDecl::enabling(DEFAULT_TRAIT, ["x"]), TraitDecl::new("x")])
            .with_dependencies(vec![DependencyDecl::new(
                PackageRef::file_system("/lib"),
                Requirement::unversioned(),
            )
            .with_traits(vec![TraitActivation::always("a")])]);
        let root_identity = root.identity.clone();
        let manifests = manifest_map(vec![root, dep]);
        let mut diagnostics = DiagnosticsBuffer::new();
        let first = evaluate_traits(
            &manifests,
            &root_identity,
            &TraitConfiguration::Default,
            &mut diagnostics,
        );
        let second = evaluate_traits(
            &manifests,
            &root_identity,
            &TraitConfiguration::Default,
            &mut diagnostics,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_traits_are_reported_once() {
        let root = Manifest::local("App", "/app")
            .with_traits(vec![TraitDecl::enabling(DEFAULT_TRAIT, ["missing"])]);
        let identity = root.identity.clone();
        let manifests = manifest_map(vec![root]);
        let mut diagnostics = DiagnosticsBuffer::new();
        let enabled = evaluate_traits(
            &manifests,
            &identity,
            &TraitConfiguration::Default,
            &mut diagnostics,
        );
        assert!(enabled[&identity].is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.contains_message("trait 'missing' is not declared by package 'app'"));
    }
}
