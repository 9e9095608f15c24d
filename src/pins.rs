// SPDX-License-Identifier: MPL-2.0

//! The resolved-packages store: the persisted record of what every
//! package resolved to, so later runs can reuse the same bindings.
//!
//! The store itself is file-backed by the caller; this module only
//! understands the version-1 record format and validates it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{PackageIdentity, PackageLocation};
use crate::requirement::Binding;

/// The record format version this core reads and writes.
pub const PINS_SCHEMA_VERSION: u32 = 1;

/// The resolved state of one pinned package.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinState {
    /// Branch the pin tracks, for branch-based source-control pins.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub branch: Option<String>,
    /// Pinned revision, when the source is a repository.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub revision: Option<String>,
    /// Pinned version, when the package resolved to a release.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
}

/// One pinned package.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    /// Canonical identity.
    pub identity: PackageIdentity,
    /// Where the package came from.
    pub location: PackageLocation,
    /// What it resolved to.
    pub state: PinState,
}

impl Pin {
    /// Record the binding a package resolved to.
    pub fn from_binding(
        identity: PackageIdentity,
        location: PackageLocation,
        binding: &Binding,
    ) -> Self {
        let state = match binding {
            Binding::Version(version) => PinState {
                branch: None,
                revision: None,
                version: Some(version.to_string()),
            },
            Binding::Revision { revision, branch } => PinState {
                branch: branch.clone(),
                revision: Some(revision.as_str().to_string()),
                version: None,
            },
            Binding::Unversioned => PinState {
                branch: None,
                revision: None,
                version: None,
            },
        };
        Self {
            identity,
            location,
            state,
        }
    }
}

/// The version-1 tagged container of pins.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PinsStore {
    /// Schema version; always [PINS_SCHEMA_VERSION] when written.
    pub version: u32,
    /// The pins, sorted by identity when written.
    pub pins: Vec<Pin>,
}

/// Errors loading or validating a pins store.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PinsStoreError {
    /// Two records share one identity.
    #[error(
        "{file} is corrupted or malformed; fix or delete the file to continue: \
         duplicated entry for package \"{identity}\""
    )]
    DuplicateIdentity {
        /// The file the caller read the store from.
        file: String,
        /// The duplicated identity.
        identity: PackageIdentity,
    },

    /// The contents did not parse as a pins store.
    #[error("{file} is corrupted or malformed; fix or delete the file to continue: {reason}")]
    Malformed {
        /// The file the caller read the store from.
        file: String,
        /// Parser error text.
        reason: String,
    },

    /// The schema version is newer than this core understands.
    #[error("{file} contains unsupported schema version {version}")]
    UnsupportedSchemaVersion {
        /// The file the caller read the store from.
        file: String,
        /// The version found.
        version: u32,
    },
}

impl PinsStore {
    /// A store over the given pins, normalized to identity order.
    pub fn new(mut pins: Vec<Pin>) -> Self {
        pins.sort_by(|a, b| a.identity.cmp(&b.identity));
        Self {
            version: PINS_SCHEMA_VERSION,
            pins,
        }
    }

    /// Parse and validate store contents read from `file` by the caller.
    pub fn load(file: &str, contents: &str) -> Result<Self, PinsStoreError> {
        let store: Self =
            serde_json::from_str(contents).map_err(|err| PinsStoreError::Malformed {
                file: file.to_string(),
                reason: err.to_string(),
            })?;
        if store.version != PINS_SCHEMA_VERSION {
            return Err(PinsStoreError::UnsupportedSchemaVersion {
                file: file.to_string(),
                version: store.version,
            });
        }
        let mut seen = BTreeSet::new();
        for pin in &store.pins {
            if !seen.insert(&pin.identity) {
                return Err(PinsStoreError::DuplicateIdentity {
                    file: file.to_string(),
                    identity: pin.identity.clone(),
                });
            }
        }
        Ok(store)
    }

    /// Serialize deterministically for the caller to write back.
    pub fn store(&self) -> String {
        let normalized = Self::new(self.pins.clone());
        serde_json::to_string_pretty(&normalized).expect("pins always serialize")
    }

    /// Look up a pin by identity.
    pub fn pin(&self, identity: &PackageIdentity) -> Option<&Pin> {
        self.pins.iter().find(|pin| &pin.identity == identity)
    }
}
