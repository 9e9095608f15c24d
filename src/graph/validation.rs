// SPDX-License-Identifier: MPL-2.0

//! Graph-wide validation passes: cycles, uniqueness, test-dependency
//! rules and duplicate-checkout detection.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graphmap::DiGraphMap;

use crate::diagnostics::{Diagnostic, DiagnosticsBuffer};
use crate::graph::builder::Reachability;
use crate::graph::{EdgeTarget, ModuleEdge};
use crate::identity::PackageIdentity;
use crate::manifest::{Manifest, ToolsVersion};
use crate::traits::{trait_condition_met, EnabledTraitsMap};

type ModuleKey = (PackageIdentity, String);

/// A non-test target cannot depend on a test target.
pub(crate) fn check_test_dependencies(
    manifests: &BTreeMap<PackageIdentity, Manifest>,
    edges: &BTreeMap<ModuleKey, Vec<ModuleEdge>>,
    diagnostics: &mut DiagnosticsBuffer,
) {
    for ((package, target_name), resolved) in edges {
        let Some(manifest) = manifests.get(package) else {
            continue;
        };
        let Some(target) = manifest.target(target_name) else {
            continue;
        };
        if target.kind.is_test() {
            continue;
        }
        for edge in resolved {
            let EdgeTarget::Module(dep_name) = &edge.target else {
                continue;
            };
            let depends_on_test = manifest
                .target(dep_name)
                .is_some_and(|dep| dep.kind.is_test());
            if depends_on_test {
                diagnostics.emit(
                    Diagnostic::error(format!(
                        "Invalid dependency: '{}' cannot depend on test target dependency \
                         '{}'. Only test targets can depend on other test targets.",
                        target_name, dep_name
                    ))
                    .for_package(package.clone())
                    .for_module(target_name.clone()),
                );
            }
        }
    }
}

/// Module-level dependency cycles are always errors.
pub(crate) fn check_target_cycles(
    manifests: &BTreeMap<PackageIdentity, Manifest>,
    edges: &BTreeMap<ModuleKey, Vec<ModuleEdge>>,
    diagnostics: &mut DiagnosticsBuffer,
) {
    // Index modules densely so the graph can live in a petgraph map.
    let mut indices: BTreeMap<&ModuleKey, u32> = BTreeMap::new();
    let mut keys: Vec<&ModuleKey> = Vec::new();
    for key in edges.keys() {
        indices.insert(key, keys.len() as u32);
        keys.push(key);
    }
    let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
    for index in 0..keys.len() as u32 {
        graph.add_node(index);
    }
    for (key, resolved) in edges {
        let from = indices[key];
        for edge in resolved {
            match &edge.target {
                EdgeTarget::Module(dep_name) => {
                    let dep_key = (key.0.clone(), dep_name.clone());
                    if let Some(&to) = indices.get(&dep_key) {
                        graph.add_edge(from, to, ());
                    }
                }
                // A product edge depends on every member module of the
                // product, so cross-package module cycles are caught too.
                EdgeTarget::Product {
                    name: product_name,
                    package: dependee,
                } => {
                    let members = manifests
                        .get(dependee)
                        .and_then(|manifest| manifest.product(product_name))
                        .map(|product| product.targets.as_slice())
                        .unwrap_or_default();
                    for member in members {
                        let member_key = (dependee.clone(), member.clone());
                        if let Some(&to) = indices.get(&member_key) {
                            graph.add_edge(from, to, ());
                        }
                    }
                }
            }
        }
    }

    for cycle in find_cycles(&graph) {
        let names: Vec<&str> = cycle
            .iter()
            .map(|&index| keys[index as usize].1.as_str())
            .collect();
        diagnostics.emit(
            Diagnostic::error(format!(
                "cyclic dependency declaration found: {}",
                names.join(" -> ")
            ))
            .for_package(keys[cycle[0] as usize].0.clone())
            .for_module(keys[cycle[0] as usize].1.clone()),
        );
    }
}

/// Package-level dependency cycles are an error below tools version 6.0;
/// newer roots permit them, module cycles being policed separately.
pub(crate) fn check_package_cycles(
    manifests: &BTreeMap<PackageIdentity, Manifest>,
    root: &PackageIdentity,
    enabled: &EnabledTraitsMap,
    diagnostics: &mut DiagnosticsBuffer,
) {
    let mut graph: DiGraphMap<&PackageIdentity, ()> = DiGraphMap::new();
    for identity in manifests.keys() {
        graph.add_node(identity);
    }
    for (identity, manifest) in manifests {
        let enabled_here = enabled.get(identity).cloned().unwrap_or_default();
        for dependency in &manifest.dependencies {
            if !trait_condition_met(dependency.condition.as_ref(), &enabled_here) {
                continue;
            }
            let dependee = &dependency.package_ref.identity;
            if manifests.contains_key(dependee) {
                graph.add_edge(identity, dependee, ());
            }
        }
    }

    let Some(cycle) = find_cycle_from(&graph, root) else {
        return;
    };
    let root_tools_version = manifests[root].tools_version;
    if root_tools_version < ToolsVersion::V6_0 {
        let names: Vec<&str> = cycle
            .iter()
            .map(|identity| manifests[*identity].display_name.as_str())
            .collect();
        diagnostics.emit(
            Diagnostic::error(format!(
                "cyclic dependency between packages {} requires tools-version 6.0 or later",
                names.join(" -> ")
            ))
            .for_package(root.clone()),
        );
    }
}

/// Module and product names must be unique across all packages that
/// contribute reachable instances to the graph.
pub(crate) fn check_unique_names(
    reachability: &Reachability,
    diagnostics: &mut DiagnosticsBuffer,
) {
    let mut module_owners: BTreeMap<&str, BTreeSet<&PackageIdentity>> = BTreeMap::new();
    for (package, name, _) in &reachability.modules {
        module_owners.entry(name).or_default().insert(package);
    }
    for (name, owners) in module_owners {
        if owners.len() > 1 {
            diagnostics.emit(Diagnostic::error(format!(
                "multiple packages ({}) declare targets with a conflicting name: '{}'; \
                 target names need to be unique across the package graph",
                quoted_list(&owners),
                name
            )));
        }
    }

    let mut product_owners: BTreeMap<&str, BTreeSet<&PackageIdentity>> = BTreeMap::new();
    for (package, name, _) in &reachability.products {
        product_owners.entry(name).or_default().insert(package);
    }
    for (name, owners) in product_owners {
        if owners.len() > 1 {
            diagnostics.emit(Diagnostic::error(format!(
                "multiple packages ({}) declare products with a conflicting name: '{}'; \
                 product names need to be unique across the package graph",
                quoted_list(&owners),
                name
            )));
        }
    }
}

/// Two packages declaring (nearly) the same set of targets usually means
/// one checkout was registered twice under different identities.
pub(crate) fn check_similar_target_sets(
    manifests: &BTreeMap<PackageIdentity, Manifest>,
    diagnostics: &mut DiagnosticsBuffer,
) {
    let sets: Vec<(&PackageIdentity, &Manifest, BTreeSet<&str>)> = manifests
        .iter()
        .map(|(identity, manifest)| {
            let names = manifest
                .targets
                .iter()
                .map(|target| target.name.as_str())
                .collect();
            (identity, manifest, names)
        })
        .collect();
    for (i, (id_a, manifest_a, set_a)) in sets.iter().enumerate() {
        for (id_b, manifest_b, set_b) in sets.iter().skip(i + 1) {
            let overlap = set_a.intersection(set_b).count();
            let larger = set_a.len().max(set_b.len());
            if larger < 3 || overlap == 0 || overlap + 2 < larger {
                continue;
            }
            diagnostics.emit(
                Diagnostic::warning(format!(
                    "multiple similar targets appear in {} '{}' and {} '{}'; this may \
                     indicate an incorrectly duplicated checkout of the same package",
                    manifest_a.location.provenance(),
                    id_a,
                    manifest_b.location.provenance(),
                    id_b
                ))
                .for_package((*id_a).clone()),
            );
        }
    }
}

fn quoted_list(owners: &BTreeSet<&PackageIdentity>) -> String {
    owners
        .iter()
        .map(|identity| format!("'{}'", identity))
        .collect::<Vec<_>>()
        .join(", ")
}

/// All elementary cycles discoverable by one depth-first walk: one cycle
/// per back edge, each reported as `n0 -> n1 -> ... -> n0`.
fn find_cycles(graph: &DiGraphMap<u32, ()>) -> Vec<Vec<u32>> {
    #[derive(Copy, Clone, Eq, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }
    let mut nodes: Vec<u32> = graph.nodes().collect();
    nodes.sort_unstable();
    let mut color: BTreeMap<u32, Color> = nodes.iter().map(|&n| (n, Color::White)).collect();
    let mut cycles = Vec::new();

    fn visit(
        node: u32,
        graph: &DiGraphMap<u32, ()>,
        color: &mut BTreeMap<u32, Color>,
        path: &mut Vec<u32>,
        cycles: &mut Vec<Vec<u32>>,
    ) {
        color.insert(node, Color::Gray);
        path.push(node);
        let mut neighbors: Vec<u32> = graph.neighbors(node).collect();
        neighbors.sort_unstable();
        for next in neighbors {
            match color[&next] {
                Color::Gray => {
                    let start = path
                        .iter()
                        .position(|&n| n == next)
                        .expect("gray nodes are on the path");
                    let mut cycle: Vec<u32> = path[start..].to_vec();
                    cycle.push(next);
                    cycles.push(cycle);
                }
                Color::White => visit(next, graph, color, path, cycles),
                Color::Black => {}
            }
        }
        path.pop();
        color.insert(node, Color::Black);
    }

    let mut path = Vec::new();
    for node in nodes {
        if color[&node] == Color::White {
            visit(node, graph, &mut color, &mut path, &mut cycles);
        }
    }
    cycles
}

/// The first package cycle reachable from `start`, as the path
/// `p0 -> p1 -> ... -> p0`.
fn find_cycle_from<'g>(
    graph: &DiGraphMap<&'g PackageIdentity, ()>,
    start: &PackageIdentity,
) -> Option<Vec<&'g PackageIdentity>> {
    fn visit<'g>(
        node: &'g PackageIdentity,
        graph: &DiGraphMap<&'g PackageIdentity, ()>,
        gray: &mut Vec<&'g PackageIdentity>,
        black: &mut BTreeSet<&'g PackageIdentity>,
    ) -> Option<Vec<&'g PackageIdentity>> {
        gray.push(node);
        let mut neighbors: Vec<&PackageIdentity> = graph.neighbors(node).collect();
        neighbors.sort_unstable();
        for next in neighbors {
            if let Some(start) = gray.iter().position(|&n| n == next) {
                let mut cycle: Vec<&PackageIdentity> = gray[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            if black.contains(next) {
                continue;
            }
            if let Some(cycle) = visit(next, graph, gray, black) {
                return Some(cycle);
            }
        }
        gray.pop();
        black.insert(node);
        None
    }

    let start = graph.nodes().find(|&node| node == start)?;
    let mut gray = Vec::new();
    let mut black = BTreeSet::new();
    visit(start, graph, &mut gray, &mut black)
        .or_else(|| {
            // Cycles not reachable from the root still poison the graph.
            let mut nodes: Vec<&PackageIdentity> = graph.nodes().collect();
            nodes.sort_unstable();
            for node in nodes {
                if black.contains(node) {
                    continue;
                }
                let mut gray = Vec::new();
                if let Some(cycle) = visit(node, graph, &mut gray, &mut black) {
                    return Some(cycle);
                }
            }
            None
        })
}
