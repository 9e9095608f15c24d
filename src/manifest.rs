// SPDX-License-Identifier: MPL-2.0

//! The manifest model: everything a package declares about itself.
//!
//! Manifests are immutable inputs to the graph builder. They are handed to
//! the core by external loaders; nothing here reads files.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use semver_ranges::Version;

use crate::identity::{PackageIdentity, PackageLocation, PackageRef};
use crate::requirement::Requirement;

/// The tools version governing which manifest and graph validation rules
/// apply to a package.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ToolsVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl ToolsVersion {
    /// Explicit product references are required starting here.
    pub const V5_2: Self = Self::new(5, 2, 0);
    /// Package-level dependency cycles are permitted starting here.
    pub const V6_0: Self = Self::new(6, 0, 0);
    /// Oldest tools version this core still accepts.
    pub const MINIMUM_SUPPORTED: Self = Self::new(4, 0, 0);
    /// The tools version of the current core.
    pub const CURRENT: Self = Self::new(6, 1, 0);

    /// Build a tools version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Display for ToolsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What a source target compiles into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TargetKind {
    /// A regular library module.
    Library,
    /// An executable module.
    Executable,
    /// A test module.
    Test,
    /// A system-library shim with no sources of its own.
    System,
    /// A build-tool plugin, always compiled for the host tools.
    Plugin,
    /// A compile-time macro, always compiled for the host tools.
    Macro,
    /// A prebuilt binary artifact.
    Binary,
}

impl TargetKind {
    /// Whether this kind is compiled for the host tools rather than the
    /// destination.
    pub fn is_tool(self) -> bool {
        matches!(self, Self::Plugin | Self::Macro)
    }

    /// Whether this kind may depend on test targets.
    pub fn is_test(self) -> bool {
        matches!(self, Self::Test)
    }
}

/// Build configuration selector for conditional dependencies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Configuration {
    /// Unoptimized builds.
    Debug,
    /// Optimized builds.
    Release,
}

/// A condition attached to a dependency edge. The edge survives only when
/// the condition is satisfiable at build time: trait conditions are
/// resolved during graph construction, platform and configuration
/// conditions are preserved for the build planner.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Condition {
    /// Platform names the edge is limited to.
    pub platforms: Option<Vec<String>>,
    /// Build configuration the edge is limited to.
    pub configuration: Option<Configuration>,
    /// Traits that must all be enabled on the declaring package.
    pub traits: Option<BTreeSet<String>>,
}

impl Condition {
    /// A condition requiring the given traits on the declaring package.
    pub fn when_traits<I: IntoIterator<Item = S>, S: Into<String>>(traits: I) -> Self {
        Self {
            traits: Some(traits.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// A condition limiting the edge to the given platforms.
    pub fn when_platforms<I: IntoIterator<Item = S>, S: Into<String>>(platforms: I) -> Self {
        Self {
            platforms: Some(platforms.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// A dependency declared by a target.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TargetDependency {
    /// A target within the same package.
    Target {
        /// Name of the target.
        name: String,
        /// Optional edge condition.
        condition: Option<Condition>,
    },
    /// A product of a direct package dependency, referenced explicitly.
    Product {
        /// Name of the product.
        name: String,
        /// Identity or display name of the package offering the product.
        /// `None` means "search all direct dependencies".
        package: Option<String>,
        /// Optional edge condition.
        condition: Option<Condition>,
    },
    /// A bare name, resolved to a local target first and otherwise to a
    /// product of a direct dependency.
    ByName {
        /// The referenced name.
        name: String,
        /// Optional edge condition.
        condition: Option<Condition>,
    },
}

impl TargetDependency {
    /// Reference a target in the same package.
    pub fn target(name: impl Into<String>) -> Self {
        Self::Target {
            name: name.into(),
            condition: None,
        }
    }

    /// Reference a product of a direct dependency.
    pub fn product(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self::Product {
            name: name.into(),
            package: Some(package.into()),
            condition: None,
        }
    }

    /// Reference something by bare name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self::ByName {
            name: name.into(),
            condition: None,
        }
    }

    /// Attach a condition to the edge.
    pub fn when(self, condition: Condition) -> Self {
        match self {
            Self::Target { name, .. } => Self::Target {
                name,
                condition: Some(condition),
            },
            Self::Product { name, package, .. } => Self::Product {
                name,
                package,
                condition: Some(condition),
            },
            Self::ByName { name, .. } => Self::ByName {
                name,
                condition: Some(condition),
            },
        }
    }

    /// The referenced name.
    pub fn name(&self) -> &str {
        match self {
            Self::Target { name, .. } | Self::Product { name, .. } | Self::ByName { name, .. } => {
                name
            }
        }
    }

    /// The attached condition, if any.
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Target { condition, .. }
            | Self::Product { condition, .. }
            | Self::ByName { condition, .. } => condition.as_ref(),
        }
    }
}

/// A compile-time define declared in a target's settings, optionally gated
/// on traits of the declaring package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TargetSetting {
    /// The define to emit.
    pub define: String,
    /// Condition under which the define applies.
    pub condition: Option<Condition>,
}

impl TargetSetting {
    /// An unconditional define.
    pub fn define(name: impl Into<String>) -> Self {
        Self {
            define: name.into(),
            condition: None,
        }
    }

    /// Gate the define on a condition.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A source target (module) declared by a manifest.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Target {
    /// Target name, unique within the package.
    pub name: String,
    /// What the target compiles into.
    pub kind: TargetKind,
    /// Declared dependencies of the target.
    pub dependencies: Vec<TargetDependency>,
    /// Declared settings (compile-time defines).
    pub settings: Vec<TargetSetting>,
    /// Custom source path, overriding the conventional location.
    pub path: Option<String>,
}

impl Target {
    /// A target of the given kind with no dependencies.
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            dependencies: Vec::new(),
            settings: Vec::new(),
            path: None,
        }
    }

    /// A library target.
    pub fn library(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Library)
    }

    /// An executable target.
    pub fn executable(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Executable)
    }

    /// A test target.
    pub fn test(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Test)
    }

    /// A macro target.
    pub fn macro_target(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Macro)
    }

    /// A plugin target.
    pub fn plugin(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::Plugin)
    }

    /// A system-library target.
    pub fn system(name: impl Into<String>) -> Self {
        Self::new(name, TargetKind::System)
    }

    /// Replace the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<TargetDependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Replace the settings list.
    pub fn with_settings(mut self, settings: Vec<TargetSetting>) -> Self {
        self.settings = settings;
        self
    }

    /// Override the source path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// How a library product is linked.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LibraryLinkage {
    /// Always linked statically.
    Static,
    /// Always linked dynamically.
    Dynamic,
    /// The build planner decides.
    Automatic,
}

/// What a product exposes to dependents.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProductType {
    /// One or more library modules.
    Library(LibraryLinkage),
    /// An executable.
    Executable,
    /// A build-tool plugin.
    Plugin,
}

/// A named group of targets exposed to dependent packages.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Product {
    /// Product name, unique across the resolved graph.
    pub name: String,
    /// Kind of product.
    pub product_type: ProductType,
    /// Names of the member targets.
    pub targets: Vec<String>,
}

impl Product {
    /// An automatic library product over the given targets.
    pub fn library(name: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            product_type: ProductType::Library(LibraryLinkage::Automatic),
            targets,
        }
    }

    /// An executable product over the given targets.
    pub fn executable(name: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            product_type: ProductType::Executable,
            targets,
        }
    }
}

/// A trait declared by a manifest: a named flag plus the traits it
/// transitively enables on the same package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TraitDecl {
    /// Trait name; `default` names the initially enabled set.
    pub name: String,
    /// Traits enabled whenever this one is.
    pub enabled_traits: BTreeSet<String>,
}

impl TraitDecl {
    /// Declare a trait enabling nothing else.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled_traits: BTreeSet::new(),
        }
    }

    /// Declare a trait that transitively enables others.
    pub fn enabling<I: IntoIterator<Item = S>, S: Into<String>>(
        name: impl Into<String>,
        enabled: I,
    ) -> Self {
        Self {
            name: name.into(),
            enabled_traits: enabled.into_iter().map(Into::into).collect(),
        }
    }
}

/// A trait activation a dependency declaration performs on its dependee,
/// optionally conditional on traits enabled on the declaring package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TraitActivation {
    /// The trait to enable on the dependee.
    pub name: String,
    /// Traits that must be enabled on the declarer; empty means always.
    pub condition_traits: BTreeSet<String>,
}

impl TraitActivation {
    /// Unconditionally enable a trait on the dependee.
    pub fn always(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition_traits: BTreeSet::new(),
        }
    }

    /// Enable a trait on the dependee when the declarer has the given
    /// traits enabled.
    pub fn when<I: IntoIterator<Item = S>, S: Into<String>>(
        name: impl Into<String>,
        condition_traits: I,
    ) -> Self {
        Self {
            name: name.into(),
            condition_traits: condition_traits.into_iter().map(Into::into).collect(),
        }
    }
}

/// A package-level dependency declaration.
#[derive(Debug, Clone)]
pub struct DependencyDecl {
    /// The depended-upon package.
    pub package_ref: PackageRef,
    /// Requirement on its binding.
    pub requirement: Requirement,
    /// Traits to activate on the dependee. `None` keeps the dependee's
    /// defaults only.
    pub trait_activations: Option<Vec<TraitActivation>>,
    /// Condition on the package dependency as a whole.
    pub condition: Option<Condition>,
    /// Deprecated display-name alias kept for legacy manifests; never
    /// authoritative.
    pub name_alias: Option<String>,
}

impl DependencyDecl {
    /// Declare a dependency with a requirement.
    pub fn new(package_ref: PackageRef, requirement: Requirement) -> Self {
        Self {
            package_ref,
            requirement,
            trait_activations: None,
            condition: None,
            name_alias: None,
        }
    }

    /// Activate traits on the dependee.
    pub fn with_traits(mut self, activations: Vec<TraitActivation>) -> Self {
        self.trait_activations = Some(activations);
        self
    }

    /// Gate the whole dependency on a condition.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Attach a deprecated display-name alias.
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.name_alias = Some(alias.into());
        self
    }
}

/// A platform a manifest declares support for, with a minimum version.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlatformDescription {
    /// Platform name, lowercase (`macos`, `ios`, `linux`, ...).
    pub name: String,
    /// Minimum deployment version.
    pub min_version: Version,
}

impl PlatformDescription {
    /// Declare a platform with its minimum version.
    pub fn new(name: impl Into<String>, min_version: Version) -> Self {
        Self {
            name: name.into().to_lowercase(),
            min_version,
        }
    }
}

/// Everything a package declares about itself.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Canonical identity, derived from the location.
    pub identity: PackageIdentity,
    /// Display name; never authoritative for identity.
    pub display_name: String,
    /// Where the package lives.
    pub location: PackageLocation,
    /// Tools version governing validation rules for this package.
    pub tools_version: ToolsVersion,
    /// Declared platform minimums.
    pub platforms: Vec<PlatformDescription>,
    /// Declared products.
    pub products: Vec<Product>,
    /// Declared targets.
    pub targets: Vec<Target>,
    /// Declared package dependencies.
    pub dependencies: Vec<DependencyDecl>,
    /// Declared traits.
    pub traits: Vec<TraitDecl>,
    /// When true, declared dependencies that contribute no surviving edge
    /// are silently omitted from the graph.
    pub prune_dependencies: bool,
}

impl Manifest {
    /// A manifest with the current tools version and nothing declared.
    pub fn new(display_name: impl Into<String>, location: PackageLocation) -> Self {
        let display_name = display_name.into();
        Self {
            identity: PackageIdentity::from_location(&location),
            display_name,
            location,
            tools_version: ToolsVersion::CURRENT,
            platforms: Vec::new(),
            products: Vec::new(),
            targets: Vec::new(),
            dependencies: Vec::new(),
            traits: Vec::new(),
            prune_dependencies: false,
        }
    }

    /// A manifest for a local filesystem package rooted at `path`.
    pub fn local(display_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(display_name, PackageLocation::FileSystem { path: path.into() })
    }

    /// Set the tools version.
    pub fn with_tools_version(mut self, tools_version: ToolsVersion) -> Self {
        self.tools_version = tools_version;
        self
    }

    /// Set declared platforms.
    pub fn with_platforms(mut self, platforms: Vec<PlatformDescription>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Set declared products.
    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = products;
        self
    }

    /// Set declared targets.
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    /// Set declared dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<DependencyDecl>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set declared traits.
    pub fn with_traits(mut self, traits: Vec<TraitDecl>) -> Self {
        self.traits = traits;
        self
    }

    /// Enable pruning of unused dependencies.
    pub fn with_prune_dependencies(mut self, prune: bool) -> Self {
        self.prune_dependencies = prune;
        self
    }

    /// Find a declared target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Find a declared product by name.
    pub fn product(&self, name: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.name == name)
    }

    /// Find a declared trait by name.
    pub fn trait_decl(&self, name: &str) -> Option<&TraitDecl> {
        self.traits.iter().find(|decl| decl.name == name)
    }

    /// Find the dependency declaration matching a name: canonical identity
    /// first, then display-style spellings and deprecated aliases.
    pub fn dependency_named(&self, name: &str) -> Option<&DependencyDecl> {
        let identity = PackageIdentity::new(name);
        self.dependencies
            .iter()
            .find(|dep| dep.package_ref.identity == identity)
            .or_else(|| {
                self.dependencies.iter().find(|dep| {
                    dep.name_alias
                        .as_deref()
                        .is_some_and(|alias| alias.eq_ignore_ascii_case(name))
                })
            })
    }
}
