// SPDX-License-Identifier: MPL-2.0

//! Derivation of per-module platform deployment minimums.

use std::collections::BTreeMap;

use semver_ranges::Version;

use crate::manifest::PlatformDescription;

/// Default and test-harness minimum deployment tables.
///
/// A module's derived platforms are the elementwise max of the manifest's
/// declared minimums against the default table; test modules are
/// additionally raised to the test-harness minimums. `maccatalyst` follows
/// `ios` unless declared independently.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    defaults: BTreeMap<String, Version>,
    test_harness_minimums: BTreeMap<String, Version>,
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        let defaults = [
            ("macos", Version::new(10, 13, 0)),
            ("ios", Version::new(12, 0, 0)),
            ("tvos", Version::new(12, 0, 0)),
            ("watchos", Version::new(4, 0, 0)),
            ("maccatalyst", Version::new(13, 0, 0)),
            ("driverkit", Version::new(19, 0, 0)),
        ];
        let test_harness_minimums = [
            ("macos", Version::new(10, 15, 0)),
            ("ios", Version::new(13, 0, 0)),
            ("tvos", Version::new(13, 0, 0)),
            ("watchos", Version::new(6, 0, 0)),
            ("maccatalyst", Version::new(13, 1, 0)),
        ];
        Self {
            defaults: defaults
                .into_iter()
                .map(|(name, version)| (name.to_string(), version))
                .collect(),
            test_harness_minimums: test_harness_minimums
                .into_iter()
                .map(|(name, version)| (name.to_string(), version))
                .collect(),
        }
    }
}

impl PlatformRegistry {
    /// The built-in tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one entry of the test-harness minimum table.
    pub fn with_test_harness_minimum(mut self, name: impl Into<String>, version: Version) -> Self {
        self.test_harness_minimums
            .insert(name.into().to_lowercase(), version);
        self
    }

    /// Derive the effective platform minimums for a module, given the
    /// declaring manifest's platform declarations.
    pub fn derive(
        &self,
        declared: &[PlatformDescription],
        is_test: bool,
    ) -> Vec<PlatformDescription> {
        let declared_map: BTreeMap<&str, &Version> = declared
            .iter()
            .map(|platform| (platform.name.as_str(), &platform.min_version))
            .collect();

        let mut derived: BTreeMap<String, Version> = BTreeMap::new();
        for (name, default_min) in &self.defaults {
            let declared_min = match (name.as_str(), declared_map.get(name.as_str())) {
                (_, Some(version)) => Some(*version),
                // maccatalyst inherits the ios declaration when it has no
                // declaration of its own.
                ("maccatalyst", None) => declared_map.get("ios").copied(),
                _ => None,
            };
            let mut min = match declared_min {
                Some(version) => version.clone().max(default_min.clone()),
                None => default_min.clone(),
            };
            if is_test {
                if let Some(harness_min) = self.test_harness_minimums.get(name) {
                    min = min.max(harness_min.clone());
                }
            }
            derived.insert(name.clone(), min);
        }

        // Platforms declared outside the default table pass through.
        for platform in declared {
            derived
                .entry(platform.name.clone())
                .or_insert_with(|| platform.min_version.clone());
        }

        derived
            .into_iter()
            .map(|(name, min_version)| PlatformDescription { name, min_version })
            .collect()
    }
}
