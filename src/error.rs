// SPDX-License-Identifier: MPL-2.0

//! Errors surfaced by the resolver and its provider boundary.

use thiserror::Error;

use crate::identity::PackageIdentity;
use crate::report::DerivationTree;
use crate::requirement::Binding;

/// Errors raised at the provider boundary. I/O failures of a concrete
/// provider are surfaced unchanged through [ProviderError::Io].
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider knows no package under this identity.
    #[error("unknown package {package}")]
    UnknownPackage {
        /// The package nobody knows about.
        package: PackageIdentity,
    },

    /// The provider could not produce dependency metadata for a binding.
    #[error("dependencies of {package} at {binding} could not be determined")]
    UnknownBinding {
        /// Package whose dependencies were requested.
        package: PackageIdentity,
        /// The binding the provider has no metadata for.
        binding: Binding,
    },

    /// The caller asked for cancellation.
    #[error("the operation was cancelled")]
    Cancelled,

    /// Any other failure of the underlying provider, passed through.
    #[error("{0}")]
    Io(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that may occur while solving dependencies.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// There is no solution for this set of dependencies.
    #[error("no solution")]
    NoSolution(Box<DerivationTree>),

    /// The caller signalled cancellation; outputs were not mutated.
    #[error("resolution was cancelled")]
    Cancelled,

    /// A package depends on itself with a requirement its own binding does
    /// not satisfy.
    #[error("{package} at {binding} depends on itself")]
    SelfDependency {
        /// The self-depending package.
        package: PackageIdentity,
        /// The binding under consideration.
        binding: Binding,
    },

    /// The provider failed while resolution was consulting it.
    #[error("failed to fetch package metadata")]
    Provider(#[from] ProviderError),

    /// Something unexpected happened.
    #[error("{0}")]
    Failure(String),
}
