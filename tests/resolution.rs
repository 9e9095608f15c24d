// SPDX-License-Identifier: MPL-2.0

use std::io::Write;

use log::LevelFilter;
use package_graph::{
    resolve, Binding, DependencyDecl, Manifest, OfflinePackageProvider, PackageIdentity,
    PackageRef, Requirement, ResolveError,
};
use package_graph::{DefaultStringReporter, Reporter};
use semver_ranges::{Version, VersionRanges};

fn init_log() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Trace)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

fn v(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

fn range(lo: (u64, u64, u64), hi: (u64, u64, u64)) -> Requirement {
    Requirement::versions(VersionRanges::release_range(
        v(lo.0, lo.1, lo.2),
        v(hi.0, hi.1, hi.2),
    ))
}

fn root_with(dependencies: Vec<(PackageRef, Requirement)>) -> Manifest {
    Manifest::local("App", "/app").with_dependencies(
        dependencies
            .into_iter()
            .map(|(package_ref, requirement)| DependencyDecl::new(package_ref, requirement))
            .collect(),
    )
}

fn id(name: &str) -> PackageIdentity {
    PackageIdentity::new(name)
}

#[test]
fn trivial_chain() {
    init_log();
    let a = PackageRef::registry("a");
    let b = PackageRef::registry("b");
    let c = PackageRef::registry("c");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), [(b.clone(), range((1, 0, 0), (2, 0, 0)))]);
    provider.add_dependencies(&b, v(1, 0, 0), [(c.clone(), range((1, 0, 0), (2, 0, 0)))]);
    provider.add_dependencies(&c, v(1, 0, 0), []);

    let root = root_with(vec![(a, range((1, 0, 0), (2, 0, 0)))]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("app")], Binding::Unversioned);
    assert_eq!(solution[&id("a")], Binding::Version(v(1, 0, 0)));
    assert_eq!(solution[&id("b")], Binding::Version(v(1, 0, 0)));
    assert_eq!(solution[&id("c")], Binding::Version(v(1, 0, 0)));
    assert_eq!(solution.len(), 4);
}

#[test]
fn newest_matching_version_is_preferred() {
    init_log();
    let a = PackageRef::registry("a");
    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), []);
    provider.add_dependencies(&a, v(1, 4, 2), []);
    provider.add_dependencies(&a, v(2, 0, 0), []);

    let root = root_with(vec![(a, range((1, 0, 0), (2, 0, 0)))]);
    let solution = resolve(&provider, &root).unwrap();
    assert_eq!(solution[&id("a")], Binding::Version(v(1, 4, 2)));
}

#[test]
fn avoiding_conflict_during_decision_making() {
    init_log();
    let foo = PackageRef::registry("foo");
    let bar = PackageRef::registry("bar");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(
        &foo,
        v(1, 1, 0),
        [(bar.clone(), range((2, 0, 0), (3, 0, 0)))],
    );
    provider.add_dependencies(&foo, v(1, 0, 0), []);
    provider.add_dependencies(&bar, v(1, 0, 0), []);
    provider.add_dependencies(&bar, v(1, 1, 0), []);
    provider.add_dependencies(&bar, v(2, 0, 0), []);

    let root = root_with(vec![
        (foo, range((1, 0, 0), (2, 0, 0))),
        (bar, range((1, 0, 0), (2, 0, 0))),
    ]);
    let solution = resolve(&provider, &root).unwrap();

    // foo 1.1.0 would pull bar ^2, conflicting with the root; the solver
    // settles on foo 1.0.0 without discarding bar 1.1.0.
    assert_eq!(solution[&id("foo")], Binding::Version(v(1, 0, 0)));
    assert_eq!(solution[&id("bar")], Binding::Version(v(1, 1, 0)));
}

#[test]
fn conflict_resolution_backtracks_past_the_culprit() {
    init_log();
    let foo = PackageRef::registry("foo");
    let bar = PackageRef::registry("bar");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(
        &foo,
        v(2, 0, 0),
        [(bar.clone(), range((1, 0, 0), (2, 0, 0)))],
    );
    provider.add_dependencies(&foo, v(1, 0, 0), []);
    provider.add_dependencies(
        &bar,
        v(1, 0, 0),
        [(foo.clone(), range((1, 0, 0), (2, 0, 0)))],
    );

    let root = root_with(vec![(foo, Requirement::versions(
        VersionRanges::higher_than(v(1, 0, 0)),
    ))]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("foo")], Binding::Version(v(1, 0, 0)));
    assert!(!solution.contains_key(&id("bar")));
}

#[test]
fn conflict_with_partial_satisfier() {
    init_log();
    let foo = PackageRef::registry("foo");
    let left = PackageRef::registry("left");
    let right = PackageRef::registry("right");
    let shared = PackageRef::registry("shared");
    let target = PackageRef::registry("target");

    let mut provider = OfflinePackageProvider::new();
    // foo 1.1.0 depends on left and right; foo 1.0.0 has no dependency.
    provider.add_dependencies(
        &foo,
        v(1, 1, 0),
        [
            (left.clone(), range((1, 0, 0), (2, 0, 0))),
            (right.clone(), range((1, 0, 0), (2, 0, 0))),
        ],
    );
    provider.add_dependencies(&foo, v(1, 0, 0), []);
    provider.add_dependencies(
        &left,
        v(1, 0, 0),
        [(
            shared.clone(),
            Requirement::versions(VersionRanges::higher_than(v(1, 0, 0))),
        )],
    );
    provider.add_dependencies(
        &right,
        v(1, 0, 0),
        [(
            shared.clone(),
            Requirement::versions(VersionRanges::strictly_lower_than(v(2, 0, 0))),
        )],
    );
    provider.add_dependencies(&shared, v(2, 0, 0), []);
    provider.add_dependencies(
        &shared,
        v(1, 0, 0),
        [(target.clone(), range((1, 0, 0), (2, 0, 0)))],
    );
    provider.add_dependencies(&target, v(2, 0, 0), []);
    provider.add_dependencies(&target, v(1, 0, 0), []);

    let root = root_with(vec![
        (foo, range((1, 0, 0), (2, 0, 0))),
        (target, range((2, 0, 0), (3, 0, 0))),
    ]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("foo")], Binding::Version(v(1, 0, 0)));
    assert_eq!(solution[&id("target")], Binding::Version(v(2, 0, 0)));
}

#[test]
fn unsatisfiable_peer_conflict_is_reported() {
    init_log();
    let a = PackageRef::registry("a");
    let b = PackageRef::registry("b");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), [(b.clone(), range((2, 0, 0), (3, 0, 0)))]);
    provider.add_dependencies(&b, v(1, 0, 0), []);
    provider.add_dependencies(&b, v(2, 0, 0), []);

    let root = root_with(vec![
        (a, range((1, 0, 0), (2, 0, 0))),
        (b, range((1, 0, 0), (2, 0, 0))),
    ]);
    let error = resolve(&provider, &root).unwrap_err();
    let ResolveError::NoSolution(mut tree) = error else {
        panic!("expected an unsatisfiable resolution");
    };

    let packages = tree.packages();
    assert!(packages.contains(&&id("a")));
    assert!(packages.contains(&&id("b")));

    tree.collapse_no_versions();
    let report = DefaultStringReporter::report(&tree);
    // The conflict is between the root's requirement on b and a 1.0.0's.
    assert!(report.contains("depends on"), "report was: {report}");
    assert!(report.contains('a'), "report was: {report}");
    assert!(report.contains('b'), "report was: {report}");
}

#[test]
fn version_with_broken_dependencies_is_skipped() {
    init_log();
    let a = PackageRef::registry("a");
    let b = PackageRef::registry("b");
    let c = PackageRef::registry("c");
    let d = PackageRef::registry("d");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(
        &a,
        v(0, 1, 0),
        [
            (b.clone(), Requirement::versions(VersionRanges::full())),
            (c.clone(), Requirement::versions(VersionRanges::full())),
        ],
    );
    provider.add_dependencies(
        &b,
        v(0, 1, 0),
        [(d.clone(), Requirement::versions(VersionRanges::singleton(v(0, 1, 0))))],
    );
    provider.add_dependencies(
        &b,
        v(0, 2, 0),
        [(d.clone(), Requirement::versions(VersionRanges::singleton(v(0, 2, 0))))],
    );
    provider.add_dependencies(&c, v(0, 1, 0), []);
    provider.add_dependencies(
        &c,
        v(0, 2, 0),
        [(d.clone(), Requirement::versions(VersionRanges::singleton(v(0, 3, 0))))],
    );
    provider.add_dependencies(&d, v(0, 1, 0), []);

    let root = root_with(vec![(a, Requirement::versions(VersionRanges::full()))]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("a")], Binding::Version(v(0, 1, 0)));
    assert_eq!(solution[&id("b")], Binding::Version(v(0, 1, 0)));
    assert_eq!(solution[&id("c")], Binding::Version(v(0, 1, 0)));
    assert_eq!(solution[&id("d")], Binding::Version(v(0, 1, 0)));
}

#[test]
fn revision_pins_resolve_to_revisions() {
    init_log();
    let lib = PackageRef::source_control("https://example.com/Lib.git");
    let util = PackageRef::registry("util");

    let mut provider = OfflinePackageProvider::new();
    provider.add_revision_dependencies(
        &lib,
        "0123abcd",
        [(util.clone(), range((1, 0, 0), (2, 0, 0)))],
    );
    provider.add_dependencies(&util, v(1, 2, 0), []);

    let root = root_with(vec![(lib, Requirement::revision("0123abcd"))]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("lib")], Binding::revision("0123abcd"));
    assert_eq!(solution[&id("util")], Binding::Version(v(1, 2, 0)));
}

#[test]
fn filesystem_packages_bind_unversioned_and_override_requirements() {
    init_log();
    let local = PackageRef::file_system("/deps/local");
    let util = PackageRef::registry("util");

    let mut provider = OfflinePackageProvider::new();
    provider.add_unversioned_dependencies(
        &local,
        [(util.clone(), range((1, 0, 0), (2, 0, 0)))],
    );
    provider.add_dependencies(&util, v(1, 0, 0), []);

    // The root pins a version range on the local package; the unversioned
    // binding satisfies it anyway.
    let root = root_with(vec![(local, range((3, 0, 0), (4, 0, 0)))]);
    let solution = resolve(&provider, &root).unwrap();

    assert_eq!(solution[&id("local")], Binding::Unversioned);
    assert_eq!(solution[&id("util")], Binding::Version(v(1, 0, 0)));
}

#[test]
fn conflicting_revision_pins_are_unsatisfiable() {
    init_log();
    let lib = PackageRef::source_control("https://example.com/lib.git");
    let a = PackageRef::registry("a");

    let mut provider = OfflinePackageProvider::new();
    provider.add_revision_dependencies(&lib, "aaaa1111", []);
    provider.add_revision_dependencies(&lib, "bbbb2222", []);
    provider.add_dependencies(&a, v(1, 0, 0), [(lib.clone(), Requirement::revision("bbbb2222"))]);

    let root = root_with(vec![
        (lib, Requirement::revision("aaaa1111")),
        (a, range((1, 0, 0), (2, 0, 0))),
    ]);
    assert!(matches!(
        resolve(&provider, &root),
        Err(ResolveError::NoSolution(_))
    ));
}

#[test]
fn same_result_on_repeated_runs() {
    init_log();
    let a = PackageRef::registry("a");
    let b = PackageRef::registry("b");
    let c = PackageRef::registry("c");

    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&c, v(0, 1, 0), []);
    provider.add_dependencies(&c, v(2, 0, 0), []);
    provider.add_dependencies(&b, v(0, 1, 0), []);
    provider.add_dependencies(&b, v(1, 0, 0), [(c.clone(), range((0, 1, 0), (1, 0, 0)))]);
    provider.add_dependencies(
        &a,
        v(0, 1, 0),
        [
            (b.clone(), Requirement::versions(VersionRanges::full())),
            (c.clone(), Requirement::versions(VersionRanges::full())),
        ],
    );

    let root = root_with(vec![(a, Requirement::versions(VersionRanges::full()))]);
    let first = resolve(&provider, &root).unwrap();
    for _ in 0..10 {
        assert_eq!(first, resolve(&provider, &root).unwrap());
    }
}

#[test]
fn cancellation_aborts_the_run() {
    init_log();
    let a = PackageRef::registry("a");
    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), []);
    provider.cancel();

    let root = root_with(vec![(a, range((1, 0, 0), (2, 0, 0)))]);
    assert!(matches!(
        resolve(&provider, &root),
        Err(ResolveError::Cancelled)
    ));
}

#[test]
fn unsatisfied_self_dependency_is_an_error() {
    init_log();
    let a = PackageRef::registry("a");
    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), [(a.clone(), range((2, 0, 0), (3, 0, 0)))]);

    let root = root_with(vec![(a, range((1, 0, 0), (2, 0, 0)))]);
    assert!(matches!(
        resolve(&provider, &root),
        Err(ResolveError::SelfDependency { .. })
    ));
}

#[test]
fn prerelease_of_the_upper_bound_is_not_eligible() {
    init_log();
    let a = PackageRef::registry("a");
    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&a, v(1, 0, 0), []);
    provider.add_dependencies(&a, Version::prerelease(2, 0, 0, "beta"), []);

    let root = root_with(vec![(a, range((1, 0, 0), (2, 0, 0)))]);
    let solution = resolve(&provider, &root).unwrap();
    assert_eq!(solution[&id("a")], Binding::Version(v(1, 0, 0)));
}
