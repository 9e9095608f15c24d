// SPDX-License-Identifier: MPL-2.0

//! Conflict-driven package version resolution and validated module graph
//! construction.
//!
//! The crate has two tightly coupled halves:
//!
//! * **The resolver** ([resolve]) computes one concrete [Binding] per
//!   package (a released version, a pinned revision, or the unversioned
//!   marker used for local packages) from root requirements and a lazy
//!   [PackageProvider] of per-package metadata. The algorithm follows
//!   [PubGrub](https://github.com/dart-lang/pub/blob/master/doc/solver.md):
//!   it records incompatibilities, performs unit propagation, and on
//!   conflict derives new incompatibilities by resolution before
//!   backtracking. When no solution exists, the error carries a
//!   [DerivationTree] that a [Reporter] can turn into a human-readable
//!   explanation.
//! * **The graph builder** ([ModuleGraphBuilder]) composes the resolved
//!   manifests into a validated, closed [ResolvedGraph] of module and
//!   product instances: it evaluates conditional [traits], assigns
//!   cross-compilation [build triples](BuildTriple), filters conditional
//!   edges, derives platform minimums and polices naming, cycle and
//!   test-dependency rules, collecting structured [diagnostics] along the
//!   way.
//!
//! # Resolving a small dependency chain
//!
//! ```
//! use package_graph::{
//!     resolve, Binding, DependencyDecl, Manifest, OfflinePackageProvider,
//!     PackageIdentity, PackageRef, Requirement,
//! };
//! use semver_ranges::{Version, VersionRanges};
//!
//! let foo = PackageRef::registry("foo");
//! let bar = PackageRef::registry("bar");
//!
//! let mut provider = OfflinePackageProvider::new();
//! provider.add_dependencies(
//!     &foo,
//!     Version::new(1, 0, 0),
//!     [(
//!         bar.clone(),
//!         Requirement::versions(VersionRanges::release_range(
//!             Version::new(1, 0, 0),
//!             Version::new(2, 0, 0),
//!         )),
//!     )],
//! );
//! provider.add_dependencies(&bar, Version::new(1, 5, 0), []);
//!
//! let root = Manifest::local("App", "/app").with_dependencies(vec![DependencyDecl::new(
//!     foo,
//!     Requirement::versions(VersionRanges::release_range(
//!         Version::new(1, 0, 0),
//!         Version::new(2, 0, 0),
//!     )),
//! )]);
//!
//! let solution = resolve(&provider, &root).unwrap();
//! assert_eq!(
//!     solution[&PackageIdentity::new("foo")],
//!     Binding::Version(Version::new(1, 0, 0))
//! );
//! assert_eq!(
//!     solution[&PackageIdentity::new("bar")],
//!     Binding::Version(Version::new(1, 5, 0))
//! );
//! ```
//!
//! All file, network and source-control access stays outside the crate:
//! manifests arrive parsed, and the [PackageProvider] is the only way the
//! resolver learns about versions and dependencies.

#![warn(missing_docs)]

pub mod diagnostics;
mod error;
pub mod graph;
mod identity;
mod internal;
pub mod manifest;
pub mod pins;
pub mod provider;
pub mod report;
mod requirement;
mod solver;
mod term;
pub mod traits;

pub use error::{ProviderError, ResolveError};
pub use graph::{
    resolve_and_build, AllSourcesPresent, BuildTriple, EdgeTarget, GraphOutcome, ListedSources,
    ModuleEdge, ModuleGraphBuilder, ModuleInstance, PlatformRegistry, ProductInstance,
    ResolvedGraph, ResolvedPackage, SourceProbe,
};
pub use identity::{PackageIdentity, PackageLocation, PackageRef};
pub use manifest::{DependencyDecl, Manifest, Product, Target, ToolsVersion};
pub use provider::{ContainerKind, OfflinePackageProvider, PackageContainer, PackageProvider};
pub use report::{DefaultStringReporter, DerivationTree, Derived, External, Reporter};
pub use requirement::{Binding, Requirement, Revision};
pub use solver::{resolve, resolve_dependencies, SelectedBindings};
pub use term::Term;
pub use traits::{EnabledTraitsMap, TraitConfiguration};
