// SPDX-License-Identifier: MPL-2.0

//! The resolved module graph: modules, products, edges and the builder
//! that constructs and validates them from manifests.

mod builder;
mod platforms;
mod suggestion;
mod validation;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

pub use builder::{resolve_and_build, ModuleGraphBuilder};
pub use platforms::PlatformRegistry;

use crate::diagnostics::{Diagnostic, DiagnosticsBuffer};
use crate::identity::PackageIdentity;
use crate::manifest::{Condition, PlatformDescription, ProductType, Target, TargetKind};
use crate::requirement::Binding;

/// The context a module instance is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BuildTriple {
    /// The machine the build output runs on.
    Destination,
    /// The machine running the build tools; macros and plugins, and
    /// everything they pull in, are compiled for it.
    Tools,
}

impl Display for BuildTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destination => f.write_str("destination"),
            Self::Tools => f.write_str("tools"),
        }
    }
}

/// What a resolved dependency edge points at.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum EdgeTarget {
    /// A module in the same package.
    Module(String),
    /// A product of another package.
    Product {
        /// Product name.
        name: String,
        /// The package offering the product.
        package: PackageIdentity,
    },
}

/// A dependency edge of a module after condition filtering. Trait
/// conditions are resolved during construction; platform and configuration
/// conditions are preserved for the build planner.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ModuleEdge {
    /// What the edge points at.
    pub target: EdgeTarget,
    /// Remaining (platform/configuration) condition, if any.
    pub condition: Option<Condition>,
}

/// One module (source target) instance in the resolved graph, keyed by
/// `(name, triple)`.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    /// Module name.
    pub name: String,
    /// Declaring package.
    pub package: PackageIdentity,
    /// Kind of the underlying target.
    pub kind: TargetKind,
    /// Compilation context.
    pub triple: BuildTriple,
    /// Outgoing dependency edges after condition filtering.
    pub dependencies: Vec<ModuleEdge>,
    /// Compilation-condition defines, in deterministic order.
    pub defines: Vec<String>,
    /// Derived platform deployment minimums.
    pub platforms: Vec<PlatformDescription>,
}

/// One product instance in the resolved graph, keyed by `(name, triple)`.
#[derive(Debug, Clone)]
pub struct ProductInstance {
    /// Product name.
    pub name: String,
    /// Declaring package.
    pub package: PackageIdentity,
    /// Kind of product.
    pub product_type: ProductType,
    /// Context the product is consumed in.
    pub triple: BuildTriple,
    /// Names of the member modules.
    pub members: Vec<String>,
}

/// A package that made it into the resolved graph.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    /// Canonical identity.
    pub identity: PackageIdentity,
    /// Declared display name.
    pub display_name: String,
    /// The binding the package resolved to.
    pub binding: Binding,
    /// Traits enabled on the package.
    pub enabled_traits: BTreeSet<String>,
}

/// The final, immutable output of graph construction.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    /// Packages in the graph, keyed by identity.
    pub packages: BTreeMap<PackageIdentity, ResolvedPackage>,
    /// Module instances, keyed by `(name, triple)`.
    pub modules: BTreeMap<(String, BuildTriple), ModuleInstance>,
    /// Product instances, keyed by `(name, triple)`.
    pub products: BTreeMap<(String, BuildTriple), ProductInstance>,
}

impl ResolvedGraph {
    /// Look up a module instance.
    pub fn module(&self, name: &str, triple: BuildTriple) -> Option<&ModuleInstance> {
        self.modules.get(&(name.to_string(), triple))
    }

    /// Look up a product instance.
    pub fn product(&self, name: &str, triple: BuildTriple) -> Option<&ProductInstance> {
        self.products.get(&(name.to_string(), triple))
    }

    /// The triples a module of this name is instantiated for.
    pub fn triples_of(&self, name: &str) -> Vec<BuildTriple> {
        [BuildTriple::Destination, BuildTriple::Tools]
            .into_iter()
            .filter(|triple| self.module(name, *triple).is_some())
            .collect()
    }
}

/// Outcome of graph construction: either a usable graph (possibly with
/// warnings) or failure. Both carry the full diagnostics buffer.
#[derive(Debug)]
pub enum GraphOutcome {
    /// Construction succeeded.
    Graph(ResolvedGraph, DiagnosticsBuffer),
    /// Construction failed; the buffer holds at least one error.
    Failed(DiagnosticsBuffer),
}

impl GraphOutcome {
    /// The diagnostics buffer, whichever way construction went.
    pub fn diagnostics(&self) -> &DiagnosticsBuffer {
        match self {
            Self::Graph(_, diagnostics) | Self::Failed(diagnostics) => diagnostics,
        }
    }

    /// The graph, when construction succeeded.
    pub fn graph(&self) -> Option<&ResolvedGraph> {
        match self {
            Self::Graph(graph, _) => Some(graph),
            Self::Failed(_) => None,
        }
    }

    /// Error-severity diagnostics, in insertion order.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics()
            .with_severity(crate::diagnostics::Severity::Error)
            .collect()
    }
}

/// External probe classifying whether a target has sources on disk. The
/// core never reads files itself.
pub trait SourceProbe {
    /// Whether sources exist for the target, under its conventional path
    /// or its declared override.
    fn target_has_sources(&self, package: &PackageIdentity, target: &Target) -> bool;
}

/// A probe that believes every target has sources; the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllSourcesPresent;

impl SourceProbe for AllSourcesPresent {
    fn target_has_sources(&self, _package: &PackageIdentity, _target: &Target) -> bool {
        true
    }
}

/// A probe backed by an explicit list of empty targets, for tests and
/// in-memory callers.
#[derive(Debug, Default, Clone)]
pub struct ListedSources {
    empty: BTreeSet<(PackageIdentity, String)>,
}

impl ListedSources {
    /// A probe with no empty targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one target as having no sources.
    pub fn without_sources(mut self, package: PackageIdentity, target: impl Into<String>) -> Self {
        self.empty.insert((package, target.into()));
        self
    }
}

impl SourceProbe for ListedSources {
    fn target_has_sources(&self, package: &PackageIdentity, target: &Target) -> bool {
        !self
            .empty
            .contains(&(package.clone(), target.name.clone()))
    }
}
