// SPDX-License-Identifier: MPL-2.0

//! Construction of the resolved module graph from manifests.
//!
//! The builder consumes immutable manifests keyed by identity, evaluates
//! traits, resolves every target dependency to a module or product,
//! assigns build triples by context-sensitive reachability, derives
//! platforms, and validates the invariants of the graph. Structural
//! problems are collected as diagnostics; the builder keeps going to
//! surface as many of them per run as it safely can.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::diagnostics::{Diagnostic, DiagnosticsBuffer};
use crate::error::ResolveError;
use crate::graph::suggestion::best_match;
use crate::graph::validation;
use crate::graph::{
    AllSourcesPresent, BuildTriple, EdgeTarget, GraphOutcome, ModuleEdge, ModuleInstance,
    PlatformRegistry, ProductInstance, ResolvedGraph, ResolvedPackage, SourceProbe,
};
use crate::identity::PackageIdentity;
use crate::manifest::{
    Condition, DependencyDecl, Manifest, Target, TargetDependency, TargetKind, ToolsVersion,
};
use crate::provider::PackageProvider;
use crate::requirement::Binding;
use crate::solver::resolve_dependencies;
use crate::traits::{
    compilation_defines, evaluate_traits, trait_condition_met, EnabledTraitsMap,
    TraitConfiguration,
};

/// Key of a module during construction: declaring package plus name.
type ModuleKey = (PackageIdentity, String);

/// Builds a [ResolvedGraph] from manifests and resolved bindings.
pub struct ModuleGraphBuilder<'a> {
    manifests: BTreeMap<PackageIdentity, Manifest>,
    root: PackageIdentity,
    bindings: BTreeMap<PackageIdentity, Binding>,
    trait_configuration: TraitConfiguration,
    probe: &'a dyn SourceProbe,
    platform_registry: PlatformRegistry,
}

/// Resolve bindings for the root's dependency closure, then build the
/// graph over the given manifests. Root dependencies disabled by the trait
/// configuration are not resolved at all.
pub fn resolve_and_build<'a>(
    provider: &dyn PackageProvider,
    manifests: Vec<Manifest>,
    root: &PackageIdentity,
    trait_configuration: TraitConfiguration,
    probe: &'a dyn SourceProbe,
) -> Result<GraphOutcome, ResolveError> {
    let manifest_map: BTreeMap<PackageIdentity, Manifest> = manifests
        .iter()
        .map(|manifest| (manifest.identity.clone(), manifest.clone()))
        .collect();
    let mut scratch = DiagnosticsBuffer::new();
    let enabled = evaluate_traits(&manifest_map, root, &trait_configuration, &mut scratch);
    let root_manifest = manifest_map
        .get(root)
        .ok_or_else(|| ResolveError::Failure(format!("no manifest for root package {root}")))?;
    let root_enabled = enabled.get(root).cloned().unwrap_or_default();
    let root_dependencies: Vec<DependencyDecl> = root_manifest
        .dependencies
        .iter()
        .filter(|dependency| trait_condition_met(dependency.condition.as_ref(), &root_enabled))
        .cloned()
        .collect();
    let bindings = resolve_dependencies(provider, root, &root_dependencies)?;
    Ok(ModuleGraphBuilder::new(manifests, root.clone())
        .with_bindings(bindings)
        .with_trait_configuration(trait_configuration)
        .with_probe(probe)
        .build())
}

impl<'a> ModuleGraphBuilder<'a> {
    /// A builder over the given manifests, rooted at `root`.
    pub fn new(manifests: Vec<Manifest>, root: PackageIdentity) -> Self {
        Self {
            manifests: manifests
                .into_iter()
                .map(|manifest| (manifest.identity.clone(), manifest))
                .collect(),
            root,
            bindings: BTreeMap::new(),
            trait_configuration: TraitConfiguration::Default,
            probe: &AllSourcesPresent,
            platform_registry: PlatformRegistry::new(),
        }
    }

    /// Supply resolved bindings; packages without one count as unversioned.
    pub fn with_bindings(mut self, bindings: BTreeMap<PackageIdentity, Binding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Choose the root trait configuration.
    pub fn with_trait_configuration(mut self, configuration: TraitConfiguration) -> Self {
        self.trait_configuration = configuration;
        self
    }

    /// Supply the file-existence probe.
    pub fn with_probe(mut self, probe: &'a dyn SourceProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Customize the platform tables.
    pub fn with_platform_registry(mut self, registry: PlatformRegistry) -> Self {
        self.platform_registry = registry;
        self
    }

    /// Build the graph, collecting diagnostics as construction proceeds.
    pub fn build(self) -> GraphOutcome {
        let mut diagnostics = DiagnosticsBuffer::new();
        if !self.manifests.contains_key(&self.root) {
            diagnostics.emit(Diagnostic::error(format!(
                "root package '{}' has no manifest",
                self.root
            )));
            return GraphOutcome::Failed(diagnostics);
        }

        self.check_tools_versions(&mut diagnostics);

        let enabled = evaluate_traits(
            &self.manifests,
            &self.root,
            &self.trait_configuration,
            &mut diagnostics,
        );

        self.validate_declarations(&mut diagnostics);

        let edges = self.resolve_edges(&enabled, &mut diagnostics);

        let reachability = self.assign_triples(&edges);

        self.check_empty_targets(&reachability, &mut diagnostics);
        validation::check_test_dependencies(&self.manifests, &edges, &mut diagnostics);
        validation::check_target_cycles(&self.manifests, &edges, &mut diagnostics);
        validation::check_package_cycles(
            &self.manifests,
            &self.root,
            &enabled,
            &mut diagnostics,
        );
        validation::check_unique_names(&reachability, &mut diagnostics);
        validation::check_similar_target_sets(&self.manifests, &mut diagnostics);

        let included = self.included_packages(&enabled, &reachability);
        self.check_unused_dependencies(&enabled, &reachability, &mut diagnostics);

        if diagnostics.has_errors() {
            return GraphOutcome::Failed(diagnostics);
        }

        let graph = self.assemble(&enabled, &edges, &reachability, &included);
        GraphOutcome::Graph(graph, diagnostics)
    }

    // Tools version support ###################################################

    fn check_tools_versions(&self, diagnostics: &mut DiagnosticsBuffer) {
        for (identity, manifest) in &self.manifests {
            if manifest.tools_version < ToolsVersion::MINIMUM_SUPPORTED {
                let binding = self.binding_of(identity);
                diagnostics.emit(
                    Diagnostic::error(format!(
                        "package at '{}' @ {} is using tools version {} which is no longer \
                         supported; consider using '// tools-version:{}' to specify the current \
                         tools version",
                        manifest.location, binding, manifest.tools_version, ToolsVersion::CURRENT
                    ))
                    .for_package(identity.clone()),
                );
            }
        }
    }

    fn binding_of(&self, identity: &PackageIdentity) -> Binding {
        self.bindings
            .get(identity)
            .cloned()
            .unwrap_or(Binding::Unversioned)
    }

    // Declaration-level validation ############################################

    fn validate_declarations(&self, diagnostics: &mut DiagnosticsBuffer) {
        for (identity, manifest) in &self.manifests {
            let mut seen_targets = BTreeSet::new();
            for target in &manifest.targets {
                if !seen_targets.insert(target.name.as_str()) {
                    diagnostics.emit(
                        Diagnostic::error(format!(
                            "duplicate target named '{}' in package '{}'",
                            target.name, identity
                        ))
                        .for_package(identity.clone())
                        .for_module(target.name.clone()),
                    );
                }
            }
            let mut seen_products = BTreeSet::new();
            for product in &manifest.products {
                if !seen_products.insert(product.name.as_str()) {
                    diagnostics.emit(
                        Diagnostic::error(format!(
                            "duplicate product named '{}' in package '{}'",
                            product.name, identity
                        ))
                        .for_package(identity.clone()),
                    );
                }
                for member in &product.targets {
                    match manifest.target(member) {
                        None => diagnostics.emit(
                            Diagnostic::error(format!(
                                "target '{}' referenced in product '{}' could not be found",
                                member, product.name
                            ))
                            .for_package(identity.clone()),
                        ),
                        Some(target)
                            if target.kind.is_test()
                                && product.product_type
                                    != crate::manifest::ProductType::Executable =>
                        {
                            diagnostics.emit(
                                Diagnostic::error(format!(
                                    "test target '{}' cannot be a member of product '{}'",
                                    member, product.name
                                ))
                                .for_package(identity.clone())
                                .for_module(member.clone()),
                            )
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    // Edge resolution #########################################################

    /// The package dependencies of a manifest surviving the package-level
    /// trait conditions, in declaration order.
    fn direct_dependencies<'m>(
        &'m self,
        manifest: &'m Manifest,
        enabled: &EnabledTraitsMap,
    ) -> Vec<&'m DependencyDecl> {
        let enabled_here = enabled
            .get(&manifest.identity)
            .cloned()
            .unwrap_or_default();
        manifest
            .dependencies
            .iter()
            .filter(|dependency| {
                trait_condition_met(dependency.condition.as_ref(), &enabled_here)
            })
            .collect()
    }

    /// Resolve every declared target dependency of every manifest to a
    /// module or product edge, dropping edges whose trait conditions are
    /// not met and resolving bare names.
    fn resolve_edges(
        &self,
        enabled: &EnabledTraitsMap,
        diagnostics: &mut DiagnosticsBuffer,
    ) -> BTreeMap<ModuleKey, Vec<ModuleEdge>> {
        let mut edges = BTreeMap::new();
        for (identity, manifest) in &self.manifests {
            let enabled_here = enabled.get(identity).cloned().unwrap_or_default();
            let direct = self.direct_dependencies(manifest, enabled);
            for target in &manifest.targets {
                let mut resolved = Vec::new();
                for declared in &target.dependencies {
                    if !trait_condition_met(declared.condition(), &enabled_here) {
                        continue;
                    }
                    if let Some(edge) =
                        self.resolve_edge(manifest, target, declared, &direct, diagnostics)
                    {
                        resolved.push(edge);
                    }
                }
                edges.insert((identity.clone(), target.name.clone()), resolved);
            }
        }
        edges
    }

    fn resolve_edge(
        &self,
        manifest: &Manifest,
        target: &Target,
        declared: &TargetDependency,
        direct: &[&DependencyDecl],
        diagnostics: &mut DiagnosticsBuffer,
    ) -> Option<ModuleEdge> {
        let condition = strip_traits(declared.condition());
        match declared {
            TargetDependency::Target { name, .. } => {
                if manifest.target(name).is_some() {
                    return Some(ModuleEdge {
                        target: EdgeTarget::Module(name.clone()),
                        condition,
                    });
                }
                let mut message = format!(
                    "target '{}' referenced from target '{}' in package '{}' could not be found",
                    name, target.name, manifest.identity
                );
                if let Some(suggestion) =
                    best_match(name, manifest.targets.iter().map(|t| t.name.as_str()))
                {
                    message.push_str(&format!("; did you mean '{}'?", suggestion));
                }
                diagnostics.emit(
                    Diagnostic::error(message)
                        .for_package(manifest.identity.clone())
                        .for_module(target.name.clone()),
                );
                None
            }
            TargetDependency::Product {
                name,
                package: Some(package_name),
                ..
            } => {
                let Some(declaration) = manifest.dependency_named(package_name) else {
                    diagnostics.emit(
                        Diagnostic::error(format!(
                            "unknown package '{}' in dependencies of target '{}'",
                            package_name, target.name
                        ))
                        .for_package(manifest.identity.clone())
                        .for_module(target.name.clone()),
                    );
                    return None;
                };
                let dependee = declaration.package_ref.identity.clone();
                if dependee != PackageIdentity::new(package_name)
                    && declaration
                        .name_alias
                        .as_deref()
                        .is_some_and(|alias| alias.eq_ignore_ascii_case(package_name))
                {
                    diagnostics.emit(
                        Diagnostic::warning(format!(
                            "dependency '{}' of package '{}' uses a deprecated package name; \
                             the canonical identity is '{}'",
                            package_name, manifest.identity, dependee
                        ))
                        .for_package(manifest.identity.clone()),
                    );
                }
                if !direct
                    .iter()
                    .any(|dependency| dependency.package_ref.identity == dependee)
                {
                    // Declared, but disabled under the current trait
                    // configuration: the edge silently goes away with it.
                    return None;
                }
                self.resolve_product_in(manifest, target, name, &dependee, diagnostics)
                    .map(|edge_target| ModuleEdge {
                        target: edge_target,
                        condition,
                    })
            }
            TargetDependency::Product {
                name,
                package: None,
                ..
            } => self
                .search_product(manifest, target, name, direct, false, diagnostics)
                .map(|edge_target| ModuleEdge {
                    target: edge_target,
                    condition,
                }),
            TargetDependency::ByName { name, .. } => {
                if manifest.target(name).is_some() {
                    return Some(ModuleEdge {
                        target: EdgeTarget::Module(name.clone()),
                        condition,
                    });
                }
                self.search_product(manifest, target, name, direct, true, diagnostics)
                    .map(|edge_target| ModuleEdge {
                        target: edge_target,
                        condition,
                    })
            }
        }
    }

    /// Resolve a product by name inside one specific dependee package.
    fn resolve_product_in(
        &self,
        manifest: &Manifest,
        target: &Target,
        product_name: &str,
        dependee: &PackageIdentity,
        diagnostics: &mut DiagnosticsBuffer,
    ) -> Option<EdgeTarget> {
        let found = self
            .manifests
            .get(dependee)
            .and_then(|dependee_manifest| dependee_manifest.product(product_name));
        if found.is_some() {
            return Some(EdgeTarget::Product {
                name: product_name.to_string(),
                package: dependee.clone(),
            });
        }
        let mut message = format!(
            "product '{}' required by package '{}' target '{}' not found in package '{}'",
            product_name, manifest.identity, target.name, dependee
        );
        if let Some(dependee_manifest) = self.manifests.get(dependee) {
            if let Some(suggestion) = best_match(
                product_name,
                dependee_manifest.products.iter().map(|p| p.name.as_str()),
            ) {
                message.push_str(&format!("; did you mean '{}'?", suggestion));
            }
        }
        diagnostics.emit(
            Diagnostic::error(message)
                .for_package(manifest.identity.clone())
                .for_module(target.name.clone()),
        );
        None
    }

    /// Search the products of all direct dependencies for a name. Bare
    /// names that land on a cross-package product require an explicit
    /// product reference at tools version 5.2 and later.
    fn search_product(
        &self,
        manifest: &Manifest,
        target: &Target,
        name: &str,
        direct: &[&DependencyDecl],
        bare_name: bool,
        diagnostics: &mut DiagnosticsBuffer,
    ) -> Option<EdgeTarget> {
        for dependency in direct {
            let dependee = &dependency.package_ref.identity;
            let Some(dependee_manifest) = self.manifests.get(dependee) else {
                continue;
            };
            if dependee_manifest.product(name).is_none() {
                continue;
            }
            if bare_name && manifest.tools_version >= ToolsVersion::V5_2 {
                diagnostics.emit(
                    Diagnostic::error(format!(
                        "dependency '{}' in target '{}' requires explicit declaration; \
                         reference the package in the target dependency with \
                         '.product(name: \"{}\", package: \"{}\")'",
                        name, target.name, name, dependee
                    ))
                    .for_package(manifest.identity.clone())
                    .for_module(target.name.clone()),
                );
                return None;
            }
            return Some(EdgeTarget::Product {
                name: name.to_string(),
                package: dependee.clone(),
            });
        }
        self.report_unresolved(manifest, target, name, direct, diagnostics);
        None
    }

    /// "Not found" diagnostic with similarity suggestions, disambiguating
    /// when a near name exists both locally and as a cross-package product.
    fn report_unresolved(
        &self,
        manifest: &Manifest,
        target: &Target,
        name: &str,
        direct: &[&DependencyDecl],
        diagnostics: &mut DiagnosticsBuffer,
    ) {
        let local = best_match(name, manifest.targets.iter().map(|t| t.name.as_str()));
        let mut remote: Option<(&str, &PackageIdentity)> = None;
        for dependency in direct {
            let dependee = &dependency.package_ref.identity;
            if let Some(dependee_manifest) = self.manifests.get(dependee) {
                if let Some(product) = best_match(
                    name,
                    dependee_manifest.products.iter().map(|p| p.name.as_str()),
                ) {
                    if remote.is_none() {
                        remote = Some((product, dependee));
                    }
                }
            }
        }
        let mut message = format!(
            "dependency '{}' in target '{}' of package '{}' was not found",
            name, target.name, manifest.identity
        );
        match (local, remote) {
            (Some(local_name), Some((product, package))) => message.push_str(&format!(
                "; similar names exist as target '{}' in this package and as product '{}' in \
                 package '{}'",
                local_name, product, package
            )),
            (Some(local_name), None) => {
                message.push_str(&format!("; did you mean target '{}'?", local_name))
            }
            (None, Some((product, package))) => message.push_str(&format!(
                "; did you mean product '{}' in package '{}'?",
                product, package
            )),
            (None, None) => {}
        }
        diagnostics.emit(
            Diagnostic::error(message)
                .for_package(manifest.identity.clone())
                .for_module(target.name.clone()),
        );
    }

    // Build-triple assignment #################################################

    /// Walk the graph from the root package's targets and products,
    /// assigning each visited module and product instance its build
    /// triple. Crossing into a macro or plugin switches the context to
    /// `tools` for its whole dependency subtree; tests whose closure
    /// contains a tools-only target are instantiated as `tools` outright.
    fn assign_triples(&self, edges: &BTreeMap<ModuleKey, Vec<ModuleEdge>>) -> Reachability {
        let mut reachability = Reachability::default();
        let mut queue: VecDeque<(ModuleKey, BuildTriple)> = VecDeque::new();
        let mut tool_closure_memo = BTreeMap::new();

        let root_manifest = &self.manifests[&self.root];
        for target in &root_manifest.targets {
            let key = (self.root.clone(), target.name.clone());
            let triple = if target.kind.is_tool() {
                BuildTriple::Tools
            } else if target.kind.is_test()
                && self.closure_contains_tool(&key, edges, &mut tool_closure_memo)
            {
                BuildTriple::Tools
            } else {
                BuildTriple::Destination
            };
            queue.push_back((key, triple));
        }
        for product in &root_manifest.products {
            reachability
                .products
                .insert((self.root.clone(), product.name.clone(), BuildTriple::Destination));
        }

        while let Some(((package, name), triple)) = queue.pop_front() {
            if !reachability
                .modules
                .insert((package.clone(), name.clone(), triple))
            {
                continue;
            }
            let Some(resolved) = edges.get(&(package.clone(), name.clone())) else {
                continue;
            };
            for edge in resolved {
                match &edge.target {
                    EdgeTarget::Module(dep_name) => {
                        let dep_kind = self
                            .manifests
                            .get(&package)
                            .and_then(|manifest| manifest.target(dep_name))
                            .map(|target| target.kind);
                        let child = match dep_kind {
                            Some(kind) if kind.is_tool() => BuildTriple::Tools,
                            _ => triple,
                        };
                        queue.push_back(((package.clone(), dep_name.clone()), child));
                    }
                    EdgeTarget::Product {
                        name: product_name,
                        package: dependee,
                    } => {
                        reachability.products.insert((
                            dependee.clone(),
                            product_name.clone(),
                            triple,
                        ));
                        let Some(dependee_manifest) = self.manifests.get(dependee) else {
                            continue;
                        };
                        let Some(product) = dependee_manifest.product(product_name) else {
                            continue;
                        };
                        for member in &product.targets {
                            let member_kind = dependee_manifest
                                .target(member)
                                .map(|target| target.kind);
                            let child = match member_kind {
                                Some(kind) if kind.is_tool() => BuildTriple::Tools,
                                _ => triple,
                            };
                            queue.push_back(((dependee.clone(), member.clone()), child));
                        }
                    }
                }
            }
        }
        reachability
    }

    /// Whether the dependency closure of a module contains a tools-only
    /// (macro or plugin) target.
    fn closure_contains_tool(
        &self,
        key: &ModuleKey,
        edges: &BTreeMap<ModuleKey, Vec<ModuleEdge>>,
        memo: &mut BTreeMap<ModuleKey, bool>,
    ) -> bool {
        if let Some(&known) = memo.get(key) {
            return known;
        }
        // In-progress nodes count as tool-free; cycles are reported by
        // dedicated validation.
        memo.insert(key.clone(), false);
        let mut found = false;
        if let Some(resolved) = edges.get(key) {
            for edge in resolved {
                let children: Vec<ModuleKey> = match &edge.target {
                    EdgeTarget::Module(dep_name) => {
                        vec![(key.0.clone(), dep_name.clone())]
                    }
                    EdgeTarget::Product {
                        name: product_name,
                        package: dependee,
                    } => self
                        .manifests
                        .get(dependee)
                        .and_then(|manifest| manifest.product(product_name))
                        .map(|product| {
                            product
                                .targets
                                .iter()
                                .map(|member| (dependee.clone(), member.clone()))
                                .collect()
                        })
                        .unwrap_or_default(),
                };
                for child in children {
                    let child_kind = self
                        .manifests
                        .get(&child.0)
                        .and_then(|manifest| manifest.target(&child.1))
                        .map(|target| target.kind);
                    if child_kind.is_some_and(TargetKind::is_tool)
                        || self.closure_contains_tool(&child, edges, memo)
                    {
                        found = true;
                        break;
                    }
                }
                if found {
                    break;
                }
            }
        }
        memo.insert(key.clone(), found);
        found
    }

    // Remaining validations ###################################################

    fn check_empty_targets(
        &self,
        reachability: &Reachability,
        diagnostics: &mut DiagnosticsBuffer,
    ) {
        let mut reported = BTreeSet::new();
        let mut product_keys: BTreeSet<(PackageIdentity, String)> = BTreeSet::new();
        for (package, product_name, _) in &reachability.products {
            product_keys.insert((package.clone(), product_name.clone()));
        }
        for (package, product_name) in product_keys {
            let Some(manifest) = self.manifests.get(&package) else {
                continue;
            };
            let Some(product) = manifest.product(&product_name) else {
                continue;
            };
            for member in &product.targets {
                let Some(target) = manifest.target(member) else {
                    continue;
                };
                if target.kind == TargetKind::System {
                    continue;
                }
                if self.probe.target_has_sources(&package, target) {
                    continue;
                }
                if reported.insert((package.clone(), member.clone())) {
                    diagnostics.emit(
                        Diagnostic::error(format!(
                            "target '{}' referenced in product '{}' is empty",
                            member, product_name
                        ))
                        .for_package(package.clone())
                        .for_module(member.clone()),
                    );
                }
            }
        }
    }

    fn check_unused_dependencies(
        &self,
        enabled: &EnabledTraitsMap,
        reachability: &Reachability,
        diagnostics: &mut DiagnosticsBuffer,
    ) {
        let root_manifest = &self.manifests[&self.root];
        if root_manifest.prune_dependencies {
            return;
        }
        let used: BTreeSet<&PackageIdentity> = reachability
            .products
            .iter()
            .map(|(package, _, _)| package)
            .collect();
        for dependency in self.direct_dependencies(root_manifest, enabled) {
            let dependee = &dependency.package_ref.identity;
            if used.contains(dependee) {
                continue;
            }
            // System packages exist to be declared; their presence is
            // their value.
            if let Some(manifest) = self.manifests.get(dependee) {
                if !manifest.targets.is_empty()
                    && manifest
                        .targets
                        .iter()
                        .all(|target| target.kind == TargetKind::System)
                {
                    continue;
                }
            }
            diagnostics.emit(
                Diagnostic::warning(format!(
                    "dependency '{}' is not used by any target",
                    dependee
                ))
                .for_package(self.root.clone()),
            );
        }
    }

    // Assembly ################################################################

    /// The packages that belong in the final graph: the root, every
    /// package contributing a reachable module or product, and, for
    /// non-pruning members, their declared (trait-enabled) dependencies.
    fn included_packages(
        &self,
        enabled: &EnabledTraitsMap,
        reachability: &Reachability,
    ) -> BTreeSet<PackageIdentity> {
        let mut included: BTreeSet<PackageIdentity> = BTreeSet::new();
        let mut queue: VecDeque<PackageIdentity> = VecDeque::new();
        queue.push_back(self.root.clone());
        for (package, _, _) in &reachability.modules {
            queue.push_back(package.clone());
        }
        for (package, _, _) in &reachability.products {
            queue.push_back(package.clone());
        }
        while let Some(package) = queue.pop_front() {
            if !included.insert(package.clone()) {
                continue;
            }
            let Some(manifest) = self.manifests.get(&package) else {
                continue;
            };
            if manifest.prune_dependencies {
                continue;
            }
            for dependency in self.direct_dependencies(manifest, enabled) {
                let dependee = &dependency.package_ref.identity;
                if self.manifests.contains_key(dependee) {
                    queue.push_back(dependee.clone());
                }
            }
        }
        included
    }

    fn assemble(
        &self,
        enabled: &EnabledTraitsMap,
        edges: &BTreeMap<ModuleKey, Vec<ModuleEdge>>,
        reachability: &Reachability,
        included: &BTreeSet<PackageIdentity>,
    ) -> ResolvedGraph {
        let mut packages = BTreeMap::new();
        for identity in included {
            let Some(manifest) = self.manifests.get(identity) else {
                continue;
            };
            packages.insert(
                identity.clone(),
                ResolvedPackage {
                    identity: identity.clone(),
                    display_name: manifest.display_name.clone(),
                    binding: self.binding_of(identity),
                    enabled_traits: enabled.get(identity).cloned().unwrap_or_default(),
                },
            );
        }

        let mut modules = BTreeMap::new();
        for (package, name, triple) in &reachability.modules {
            let Some(manifest) = self.manifests.get(package) else {
                continue;
            };
            let Some(target) = manifest.target(name) else {
                continue;
            };
            let enabled_here = enabled.get(package).cloned().unwrap_or_default();
            modules.insert(
                (name.clone(), *triple),
                ModuleInstance {
                    name: name.clone(),
                    package: package.clone(),
                    kind: target.kind,
                    triple: *triple,
                    dependencies: edges
                        .get(&(package.clone(), name.clone()))
                        .cloned()
                        .unwrap_or_default(),
                    defines: compilation_defines(manifest, target, &enabled_here),
                    platforms: self
                        .platform_registry
                        .derive(&manifest.platforms, target.kind.is_test()),
                },
            );
        }

        let mut products = BTreeMap::new();
        for (package, name, triple) in &reachability.products {
            let Some(manifest) = self.manifests.get(package) else {
                continue;
            };
            let Some(product) = manifest.product(name) else {
                continue;
            };
            products.insert(
                (name.clone(), *triple),
                ProductInstance {
                    name: name.clone(),
                    package: package.clone(),
                    product_type: product.product_type,
                    triple: *triple,
                    members: product.targets.clone(),
                },
            );
        }

        ResolvedGraph {
            packages,
            modules,
            products,
        }
    }
}

/// Module and product instances discovered by the triple-assigning walk.
#[derive(Debug, Default)]
pub(crate) struct Reachability {
    pub(crate) modules: BTreeSet<(PackageIdentity, String, BuildTriple)>,
    pub(crate) products: BTreeSet<(PackageIdentity, String, BuildTriple)>,
}

/// Drop the trait component of a condition; what remains (platforms and
/// configuration) is evaluated later by the build planner.
fn strip_traits(condition: Option<&Condition>) -> Option<Condition> {
    let condition = condition?;
    let stripped = Condition {
        platforms: condition.platforms.clone(),
        configuration: condition.configuration,
        traits: None,
    };
    if stripped.platforms.is_none() && stripped.configuration.is_none() {
        None
    } else {
        Some(stripped)
    }
}
