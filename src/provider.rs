// SPDX-License-Identifier: MPL-2.0

//! The provider boundary: how the resolver obtains package metadata.
//!
//! All I/O lives behind these capability traits. Within one resolution
//! run, a container must answer identically when asked the same question
//! twice; the resolver caches candidate lists accordingly.

use std::cell::Cell;
use std::collections::BTreeMap;

use semver_ranges::{Version, VersionRanges};

use crate::error::ProviderError;
use crate::identity::{PackageIdentity, PackageRef};
use crate::manifest::{DependencyDecl, ToolsVersion};
use crate::requirement::{Requirement, Revision};

/// What kind of source a container fronts, which decides the binding kind
/// its packages resolve to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContainerKind {
    /// A registry of released versions.
    Registry,
    /// A source-control repository: released versions or pinned revisions.
    SourceControl,
    /// A local checkout; always binds unversioned.
    FileSystem,
}

/// Handle onto one package's metadata. Methods are idempotent within a
/// resolution run.
pub trait PackageContainer {
    /// The package this container describes.
    fn identity(&self) -> &PackageIdentity;

    /// The kind of source behind the container.
    fn kind(&self) -> ContainerKind;

    /// Released versions inside `filter`, newest first, excluding versions
    /// whose tools version is newer than the current one.
    fn versions(&self, filter: &VersionRanges) -> Result<Vec<Version>, ProviderError>;

    /// Dependency declarations of a released version.
    fn dependencies_at_version(
        &self,
        version: &Version,
    ) -> Result<Vec<DependencyDecl>, ProviderError>;

    /// Dependency declarations at a pinned revision.
    fn dependencies_at_revision(
        &self,
        revision: &Revision,
    ) -> Result<Vec<DependencyDecl>, ProviderError>;

    /// Dependency declarations of an unversioned (root or filesystem)
    /// package.
    fn unversioned_dependencies(&self) -> Result<Vec<DependencyDecl>, ProviderError>;
}

/// Supplies containers to the resolver. The resolver consults
/// [should_cancel](PackageProvider::should_cancel) at every propagation
/// iteration and before every container call.
pub trait PackageProvider {
    /// Obtain the container for a package reference.
    fn container_for(&self, package: &PackageRef) -> Result<&dyn PackageContainer, ProviderError>;

    /// Give the caller a chance to abort the run.
    fn should_cancel(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A basic in-memory implementation of [PackageProvider], holding all
/// dependency information up front. Versions are picked newest first;
/// packages with the fewest matching candidates are decided first.
#[derive(Default)]
pub struct OfflinePackageProvider {
    containers: BTreeMap<PackageIdentity, OfflineContainer>,
    tools_version: Option<ToolsVersion>,
    cancelled: Cell<bool>,
}

struct OfflineContainer {
    identity: PackageIdentity,
    kind: ContainerKind,
    tools_version_limit: ToolsVersion,
    versions: BTreeMap<Version, (ToolsVersion, Vec<DependencyDecl>)>,
    revisions: BTreeMap<Revision, Vec<DependencyDecl>>,
    unversioned: Option<Vec<DependencyDecl>>,
}

impl OfflinePackageProvider {
    /// Creates an empty provider with no packages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the tools version used to filter released versions.
    pub fn with_tools_version(mut self, tools_version: ToolsVersion) -> Self {
        self.tools_version = Some(tools_version);
        self
    }

    /// Register the dependencies of a released package version. All
    /// subsequent calls for the same pair replace the previous entry.
    pub fn add_dependencies(
        &mut self,
        package: &PackageRef,
        version: impl Into<Version>,
        dependencies: impl IntoIterator<Item = (PackageRef, Requirement)>,
    ) {
        self.add_dependency_decls(
            package,
            version,
            ToolsVersion::CURRENT,
            dependencies
                .into_iter()
                .map(|(package_ref, requirement)| DependencyDecl::new(package_ref, requirement))
                .collect(),
        );
    }

    /// Register a released version with an explicit tools version and full
    /// dependency declarations.
    pub fn add_dependency_decls(
        &mut self,
        package: &PackageRef,
        version: impl Into<Version>,
        tools_version: ToolsVersion,
        dependencies: Vec<DependencyDecl>,
    ) {
        self.container_entry(package)
            .versions
            .insert(version.into(), (tools_version, dependencies));
    }

    /// Register the dependencies of a pinned revision.
    pub fn add_revision_dependencies(
        &mut self,
        package: &PackageRef,
        revision: impl Into<Revision>,
        dependencies: impl IntoIterator<Item = (PackageRef, Requirement)>,
    ) {
        self.container_entry(package).revisions.insert(
            revision.into(),
            dependencies
                .into_iter()
                .map(|(package_ref, requirement)| DependencyDecl::new(package_ref, requirement))
                .collect(),
        );
    }

    /// Register the dependencies of an unversioned (filesystem) package.
    pub fn add_unversioned_dependencies(
        &mut self,
        package: &PackageRef,
        dependencies: impl IntoIterator<Item = (PackageRef, Requirement)>,
    ) {
        let container = self.container_entry(package);
        container.kind = ContainerKind::FileSystem;
        container.unversioned = Some(
            dependencies
                .into_iter()
                .map(|(package_ref, requirement)| DependencyDecl::new(package_ref, requirement))
                .collect(),
        );
    }

    /// Arrange for the next `should_cancel` call to abort the run.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Registered packages, in identity order.
    pub fn packages(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.containers.keys()
    }

    fn container_entry(&mut self, package: &PackageRef) -> &mut OfflineContainer {
        let tools_version_limit = self.tools_version.unwrap_or(ToolsVersion::CURRENT);
        self.containers
            .entry(package.identity.clone())
            .or_insert_with(|| OfflineContainer {
                identity: package.identity.clone(),
                kind: match &package.location {
                    crate::identity::PackageLocation::FileSystem { .. } => {
                        ContainerKind::FileSystem
                    }
                    crate::identity::PackageLocation::SourceControl { .. } => {
                        ContainerKind::SourceControl
                    }
                    crate::identity::PackageLocation::Registry { .. } => ContainerKind::Registry,
                },
                tools_version_limit,
                versions: BTreeMap::new(),
                revisions: BTreeMap::new(),
                unversioned: None,
            })
    }
}

impl PackageProvider for OfflinePackageProvider {
    fn container_for(&self, package: &PackageRef) -> Result<&dyn PackageContainer, ProviderError> {
        self.containers
            .get(&package.identity)
            .map(|container| container as &dyn PackageContainer)
            .ok_or_else(|| ProviderError::UnknownPackage {
                package: package.identity.clone(),
            })
    }

    fn should_cancel(&self) -> Result<(), ProviderError> {
        if self.cancelled.get() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl PackageContainer for OfflineContainer {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn versions(&self, filter: &VersionRanges) -> Result<Vec<Version>, ProviderError> {
        let mut matching = Vec::new();
        for (version, (tools_version, _)) in self.versions.iter().rev() {
            if filter.contains(version) && *tools_version <= self.tools_version_limit {
                matching.push(version.clone());
            }
        }
        Ok(matching)
    }

    fn dependencies_at_version(
        &self,
        version: &Version,
    ) -> Result<Vec<DependencyDecl>, ProviderError> {
        self.versions
            .get(version)
            .map(|(_, dependencies)| dependencies.clone())
            .ok_or_else(|| ProviderError::UnknownBinding {
                package: self.identity.clone(),
                binding: crate::requirement::Binding::Version(version.clone()),
            })
    }

    fn dependencies_at_revision(
        &self,
        revision: &Revision,
    ) -> Result<Vec<DependencyDecl>, ProviderError> {
        self.revisions
            .get(revision)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownBinding {
                package: self.identity.clone(),
                binding: crate::requirement::Binding::revision(revision.as_str()),
            })
    }

    fn unversioned_dependencies(&self) -> Result<Vec<DependencyDecl>, ProviderError> {
        self.unversioned
            .clone()
            .ok_or_else(|| ProviderError::UnknownBinding {
                package: self.identity.clone(),
                binding: crate::requirement::Binding::Unversioned,
            })
    }
}
