// SPDX-License-Identifier: MPL-2.0

use package_graph::manifest::{
    Condition, PlatformDescription, Product, Target, TargetDependency, TargetSetting, TraitDecl,
};
use package_graph::{
    BuildTriple, DependencyDecl, GraphOutcome, ListedSources, Manifest, ModuleGraphBuilder,
    OfflinePackageProvider, PackageIdentity, PackageRef, Requirement, ToolsVersion,
    TraitConfiguration,
};
use package_graph::diagnostics::Severity;
use semver_ranges::{Version, VersionRanges};

fn id(name: &str) -> PackageIdentity {
    PackageIdentity::new(name)
}

fn local_dependency(path: &str) -> DependencyDecl {
    DependencyDecl::new(PackageRef::file_system(path), Requirement::unversioned())
}

fn build(manifests: Vec<Manifest>, root: &str) -> GraphOutcome {
    ModuleGraphBuilder::new(manifests, id(root)).build()
}

#[test]
fn single_package_graph() {
    let root = Manifest::local("App", "/app")
        .with_targets(vec![
            Target::executable("App").with_dependencies(vec![TargetDependency::target("Core")]),
            Target::library("Core"),
        ])
        .with_products(vec![Product::executable("App", vec!["App".into()])]);
    let outcome = build(vec![root], "app");
    let graph = outcome.graph().expect("graph should build");

    assert!(graph.module("App", BuildTriple::Destination).is_some());
    assert!(graph.module("Core", BuildTriple::Destination).is_some());
    assert!(graph.module("Core", BuildTriple::Tools).is_none());
    assert_eq!(graph.packages.len(), 1);
}

#[test]
fn package_cycle_requires_tools_version_6() {
    let foo = Manifest::local("Foo", "/Foo")
        .with_tools_version(ToolsVersion::new(5, 10, 0))
        .with_targets(vec![Target::library("FooLib")])
        .with_dependencies(vec![local_dependency("/Bar")]);
    let bar = Manifest::local("Bar", "/Bar")
        .with_targets(vec![Target::library("BarLib")])
        .with_dependencies(vec![local_dependency("/Foo")]);

    let outcome = build(vec![foo.clone(), bar.clone()], "foo");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "cyclic dependency between packages Foo -> Bar -> Foo requires tools-version 6.0 or later"
    ));

    // The same input is accepted once the root adopts tools version 6.0.
    let foo = foo.with_tools_version(ToolsVersion::V6_0);
    let outcome = build(vec![foo, bar], "foo");
    assert!(outcome.graph().is_some());
}

#[test]
fn module_cycles_are_always_errors() {
    let root = Manifest::local("App", "/app").with_targets(vec![
        Target::library("A").with_dependencies(vec![TargetDependency::target("B")]),
        Target::library("B").with_dependencies(vec![TargetDependency::target("A")]),
    ]);
    let outcome = build(vec![root], "app");
    assert!(outcome.graph().is_none());
    assert!(outcome
        .diagnostics()
        .contains_message("cyclic dependency declaration found: A -> B -> A"));
}

#[test]
fn conflicting_target_names_across_packages() {
    let foo = Manifest::local("Foo", "/Foo")
        .with_targets(vec![Target::library("Bar").with_dependencies(vec![
            TargetDependency::product("BarLib", "bar"),
        ])])
        .with_dependencies(vec![local_dependency("/Bar")]);
    let bar = Manifest::local("Bar", "/Bar")
        .with_targets(vec![Target::library("Bar")])
        .with_products(vec![Product::library("BarLib", vec!["Bar".into()])]);

    let outcome = build(vec![foo, bar], "foo");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "multiple packages ('bar', 'foo') declare targets with a conflicting name: 'Bar'; \
         target names need to be unique across the package graph"
    ));
}

#[test]
fn macros_and_their_closure_build_for_the_tools_triple() {
    let syntax = Manifest::local("swift-syntax", "/swift-syntax")
        .with_targets(vec![Target::library("SwiftSyntax")])
        .with_products(vec![Product::library("SwiftSyntax", vec!["SwiftSyntax".into()])]);
    let mmio = Manifest::local("swift-mmio", "/swift-mmio")
        .with_targets(vec![
            Target::library("MMIO").with_dependencies(vec![TargetDependency::target("MMIOMacro")]),
            Target::macro_target("MMIOMacro").with_dependencies(vec![
                TargetDependency::product("SwiftSyntax", "swift-syntax"),
            ]),
        ])
        .with_products(vec![Product::library("MMIO", vec!["MMIO".into()])])
        .with_dependencies(vec![local_dependency("/swift-syntax")]);
    let firmware = Manifest::local("swift-firmware", "/swift-firmware")
        .with_targets(vec![Target::executable("Firmware").with_dependencies(vec![
            TargetDependency::product("MMIO", "swift-mmio"),
            TargetDependency::product("SwiftSyntax", "swift-syntax"),
        ])])
        .with_dependencies(vec![
            local_dependency("/swift-mmio"),
            local_dependency("/swift-syntax"),
        ]);

    let outcome = build(vec![firmware, mmio, syntax], "swift-firmware");
    let graph = outcome.graph().expect("graph should build");

    // The macro is tools-only; the syntax library is needed in both
    // contexts and appears twice.
    assert_eq!(
        graph.triples_of("MMIOMacro"),
        vec![BuildTriple::Tools]
    );
    assert_eq!(
        graph.triples_of("SwiftSyntax"),
        vec![BuildTriple::Destination, BuildTriple::Tools]
    );
    assert_eq!(
        graph.triples_of("MMIO"),
        vec![BuildTriple::Destination]
    );
    assert!(graph.product("SwiftSyntax", BuildTriple::Tools).is_some());
}

#[test]
fn tests_depending_on_macros_move_to_the_tools_triple() {
    let root = Manifest::local("App", "/app").with_targets(vec![
        Target::macro_target("AppMacro"),
        Target::library("Core").with_dependencies(vec![TargetDependency::target("AppMacro")]),
        Target::test("CoreTests").with_dependencies(vec![TargetDependency::target("Core")]),
    ]);
    let outcome = build(vec![root], "app");
    let graph = outcome.graph().expect("graph should build");

    assert_eq!(graph.triples_of("CoreTests"), vec![BuildTriple::Tools]);
    // The library is pulled both by the test (tools) and stays available
    // for the destination.
    assert_eq!(
        graph.triples_of("Core"),
        vec![BuildTriple::Destination, BuildTriple::Tools]
    );
}

#[test]
fn trait_gated_and_unused_dependencies_are_pruned_silently() {
    let foo = Manifest::local("Foo", "/Foo")
        .with_targets(vec![Target::library("FooLib")])
        .with_products(vec![Product::library("FooLib", vec!["FooLib".into()])]);
    let baz = Manifest::local("Baz", "/Baz")
        .with_targets(vec![Target::library("BazLib")])
        .with_products(vec![Product::library("BazLib", vec!["BazLib".into()])]);
    let bar = Manifest::local("Bar", "/Bar")
        .with_traits(vec![
            TraitDecl::enabling("default", ["Trait1"]),
            TraitDecl::new("Trait1"),
            TraitDecl::new("Trait2"),
        ])
        .with_targets(vec![Target::library("BarLib")])
        .with_dependencies(vec![
            local_dependency("/Foo").when(Condition::when_traits(["Trait2"])),
            local_dependency("/Baz"),
        ])
        .with_prune_dependencies(true);

    let outcome = build(vec![bar, foo, baz], "bar");
    let graph = outcome.graph().expect("graph should build");

    assert!(graph.packages.contains_key(&id("bar")));
    assert!(!graph.packages.contains_key(&id("foo")));
    assert!(!graph.packages.contains_key(&id("baz")));
    assert_eq!(
        outcome
            .diagnostics()
            .with_severity(Severity::Warning)
            .count(),
        0
    );
    assert!(graph.packages[&id("bar")].enabled_traits.contains("Trait1"));
}

#[test]
fn unused_dependencies_warn_without_pruning() {
    let baz = Manifest::local("Baz", "/Baz")
        .with_targets(vec![Target::library("BazLib")])
        .with_products(vec![Product::library("BazLib", vec!["BazLib".into()])]);
    let root = Manifest::local("App", "/app")
        .with_targets(vec![Target::library("Core")])
        .with_dependencies(vec![local_dependency("/Baz")]);

    let outcome = build(vec![root, baz], "app");
    assert!(outcome.graph().is_some());
    assert!(outcome
        .diagnostics()
        .contains_message("dependency 'baz' is not used by any target"));
}

#[test]
fn system_packages_are_exempt_from_unused_warnings() {
    let zlib = Manifest::local("CZlib", "/CZlib")
        .with_targets(vec![Target::system("CZlib")]);
    let root = Manifest::local("App", "/app")
        .with_targets(vec![Target::library("Core")])
        .with_dependencies(vec![local_dependency("/CZlib")]);

    let outcome = build(vec![root, zlib], "app");
    assert!(outcome.graph().is_some());
    assert_eq!(
        outcome
            .diagnostics()
            .with_severity(Severity::Warning)
            .count(),
        0
    );
}

#[test]
fn non_test_targets_cannot_depend_on_test_targets() {
    let root = Manifest::local("App", "/app").with_targets(vec![
        Target::library("Core").with_dependencies(vec![TargetDependency::target("CoreTests")]),
        Target::test("CoreTests"),
    ]);
    let outcome = build(vec![root], "app");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "Invalid dependency: 'Core' cannot depend on test target dependency 'CoreTests'. \
         Only test targets can depend on other test targets."
    ));
}

#[test]
fn empty_targets_referenced_by_products_are_errors() {
    let root = Manifest::local("App", "/app")
        .with_targets(vec![Target::library("Core")])
        .with_products(vec![Product::library("CoreLib", vec!["Core".into()])]);
    let probe = ListedSources::new().without_sources(id("app"), "Core");
    let outcome = ModuleGraphBuilder::new(vec![root], id("app"))
        .with_probe(&probe)
        .build();
    assert!(outcome.graph().is_none());
    assert!(outcome
        .diagnostics()
        .contains_message("target 'Core' referenced in product 'CoreLib' is empty"));
}

#[test]
fn bare_names_require_explicit_products_at_tools_5_2() {
    let utils = Manifest::local("utils-kit", "/utils-kit")
        .with_targets(vec![Target::library("Utils")])
        .with_products(vec![Product::library("Utils", vec!["Utils".into()])]);
    let app = Manifest::local("App", "/app")
        .with_targets(vec![Target::executable("App")
            .with_dependencies(vec![TargetDependency::by_name("Utils")])])
        .with_dependencies(vec![local_dependency("/utils-kit")]);

    let outcome = build(vec![app.clone(), utils.clone()], "app");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "dependency 'Utils' in target 'App' requires explicit declaration; reference the \
         package in the target dependency with '.product(name: \"Utils\", package: \"utils-kit\")'"
    ));

    // Older manifests may still use the bare name.
    let app = app.with_tools_version(ToolsVersion::new(5, 1, 0));
    let outcome = build(vec![app, utils], "app");
    let graph = outcome.graph().expect("graph should build");
    assert!(graph.product("Utils", BuildTriple::Destination).is_some());
}

#[test]
fn unresolved_names_get_suggestions() {
    let root = Manifest::local("App", "/app").with_targets(vec![
        Target::executable("App").with_dependencies(vec![TargetDependency::target("Utlis")]),
        Target::library("Utils"),
    ]);
    let outcome = build(vec![root], "app");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "target 'Utlis' referenced from target 'App' in package 'app' could not be found; \
         did you mean 'Utils'?"
    ));
}

#[test]
fn missing_products_name_the_package_and_suggest() {
    let utils = Manifest::local("utils-kit", "/utils-kit")
        .with_targets(vec![Target::library("Utils")])
        .with_products(vec![Product::library("Utils", vec!["Utils".into()])]);
    let app = Manifest::local("App", "/app")
        .with_targets(vec![Target::executable("App")
            .with_dependencies(vec![TargetDependency::product("Util", "utils-kit")])])
        .with_dependencies(vec![local_dependency("/utils-kit")]);
    let outcome = build(vec![app, utils], "app");
    assert!(outcome.graph().is_none());
    assert!(outcome.diagnostics().contains_message(
        "product 'Util' required by package 'app' target 'App' not found in package \
         'utils-kit'; did you mean 'Utils'?"
    ));
}

#[test]
fn deprecated_name_aliases_resolve_with_a_warning() {
    let utils = Manifest::local("utils-kit", "/utils-kit")
        .with_targets(vec![Target::library("Utils")])
        .with_products(vec![Product::library("Utils", vec!["Utils".into()])]);
    let app = Manifest::local("App", "/app")
        .with_targets(vec![Target::executable("App")
            .with_dependencies(vec![TargetDependency::product("Utils", "LegacyUtils")])])
        .with_dependencies(vec![local_dependency("/utils-kit").aliased("LegacyUtils")]);

    let outcome = build(vec![app, utils], "app");
    let graph = outcome.graph().expect("graph should build");
    assert!(graph.product("Utils", BuildTriple::Destination).is_some());
    assert!(outcome.diagnostics().contains_message(
        "dependency 'LegacyUtils' of package 'app' uses a deprecated package name; the \
         canonical identity is 'utils-kit'"
    ));
}

#[test]
fn similar_target_sets_suggest_duplicate_checkouts() {
    let a = Manifest::new(
        "NetKit",
        package_graph::PackageLocation::SourceControl {
            url: "https://example.com/netkit.git".into(),
        },
    )
    .with_targets(vec![
        Target::library("NetCore"),
        Target::library("NetHTTP"),
        Target::library("NetTLS"),
    ]);
    let b = Manifest::new(
        "NetKit2",
        package_graph::PackageLocation::Registry {
            name: "netkit2".into(),
        },
    )
    .with_targets(vec![
        Target::library("NetCore"),
        Target::library("NetHTTP"),
        Target::library("NetTLS"),
    ]);
    let root = Manifest::local("App", "/app").with_targets(vec![Target::library("Core")]);

    let outcome = build(vec![root, a, b], "app");
    let warnings: Vec<String> = outcome
        .diagnostics()
        .with_severity(Severity::Warning)
        .map(|diagnostic| diagnostic.message.clone())
        .collect();
    assert!(
        warnings.iter().any(|message| message
            .contains("multiple similar targets appear in source control package 'netkit'")
            && message.contains("registry package 'netkit2'")),
        "warnings were: {warnings:?}"
    );
}

#[test]
fn outdated_tools_versions_are_unsupported() {
    let root = Manifest::local("App", "/app")
        .with_tools_version(ToolsVersion::new(3, 0, 0))
        .with_targets(vec![Target::library("Core")]);
    let outcome = build(vec![root], "app");
    assert!(outcome.graph().is_none());
    let errors = outcome.errors();
    assert!(
        errors.iter().any(|diagnostic| diagnostic.message.contains(
            "is using tools version 3.0.0 which is no longer supported; consider using \
             '// tools-version:6.1.0' to specify the current tools version"
        )),
        "errors were: {errors:?}"
    );
}

#[test]
fn trait_defines_are_ordered_and_conditional() {
    let root = Manifest::local("App", "/app")
        .with_traits(vec![
            TraitDecl::enabling("default", ["Logging", "Extra"]),
            TraitDecl::new("Logging"),
            TraitDecl::new("Extra"),
            TraitDecl::new("Missing"),
        ])
        .with_targets(vec![Target::library("Core").with_settings(vec![
            TargetSetting::define("VERBOSE").when(Condition::when_traits(["Logging"])),
            TargetSetting::define("NEVER").when(Condition::when_traits(["Missing"])),
        ])]);
    let outcome = build(vec![root], "app");
    let graph = outcome.graph().expect("graph should build");
    let core = graph.module("Core", BuildTriple::Destination).unwrap();
    assert_eq!(core.defines, vec!["VERBOSE", "Logging", "Extra"]);
}

#[test]
fn platform_minimums_are_derived_per_module() {
    let root = Manifest::local("App", "/app")
        .with_platforms(vec![PlatformDescription::new("macos", Version::new(12, 0, 0))])
        .with_targets(vec![
            Target::library("Core"),
            Target::test("CoreTests").with_dependencies(vec![TargetDependency::target("Core")]),
        ]);
    let outcome = build(vec![root], "app");
    let graph = outcome.graph().expect("graph should build");

    let core = graph.module("Core", BuildTriple::Destination).unwrap();
    let macos = core
        .platforms
        .iter()
        .find(|platform| platform.name == "macos")
        .unwrap();
    assert_eq!(macos.min_version, Version::new(12, 0, 0));

    let tests = graph.module("CoreTests", BuildTriple::Destination).unwrap();
    let ios = tests
        .platforms
        .iter()
        .find(|platform| platform.name == "ios")
        .unwrap();
    assert_eq!(ios.min_version, Version::new(13, 0, 0));
}

#[test]
fn diagnostics_are_emitted_in_a_stable_order() {
    let make_input = || {
        vec![
            Manifest::local("App", "/app")
                .with_targets(vec![
                    Target::library("Core")
                        .with_dependencies(vec![TargetDependency::target("CoreTests")]),
                    Target::test("CoreTests"),
                    Target::library("A").with_dependencies(vec![TargetDependency::target("B")]),
                    Target::library("B").with_dependencies(vec![TargetDependency::target("A")]),
                ])
                .with_dependencies(vec![local_dependency("/Baz")]),
            Manifest::local("Baz", "/Baz").with_targets(vec![Target::library("BazLib")]),
        ]
    };
    let first = build(make_input(), "app");
    let second = build(make_input(), "app");
    assert_eq!(
        first.diagnostics().records(),
        second.diagnostics().records()
    );
    assert!(first.diagnostics().len() > 1);
}

#[test]
fn resolve_and_build_pins_registry_versions() {
    let utils_ref = PackageRef::registry("utils");
    let mut provider = OfflinePackageProvider::new();
    provider.add_dependencies(&utils_ref, Version::new(1, 2, 0), []);

    let utils = Manifest::new(
        "utils",
        package_graph::PackageLocation::Registry {
            name: "utils".into(),
        },
    )
    .with_targets(vec![Target::library("Utils")])
    .with_products(vec![Product::library("Utils", vec!["Utils".into()])]);
    let root = Manifest::local("App", "/app")
        .with_targets(vec![Target::executable("App")
            .with_dependencies(vec![TargetDependency::product("Utils", "utils")])])
        .with_dependencies(vec![DependencyDecl::new(
            utils_ref,
            Requirement::versions(VersionRanges::release_range(
                Version::new(1, 0, 0),
                Version::new(2, 0, 0),
            )),
        )]);

    let outcome = package_graph::resolve_and_build(
        &provider,
        vec![root, utils],
        &id("app"),
        TraitConfiguration::Default,
        &package_graph::AllSourcesPresent,
    )
    .unwrap();
    let graph = outcome.graph().expect("graph should build");
    assert_eq!(
        graph.packages[&id("utils")].binding,
        package_graph::Binding::Version(Version::new(1, 2, 0))
    );
}

#[test]
fn trait_disabled_root_dependencies_are_not_resolved() {
    // The provider knows nothing about the disabled dependency; resolution
    // succeeding proves it was never consulted.
    let provider = OfflinePackageProvider::new();
    let root = Manifest::local("App", "/app")
        .with_traits(vec![TraitDecl::new("Heavy")])
        .with_targets(vec![Target::library("Core")])
        .with_dependencies(vec![DependencyDecl::new(
            PackageRef::registry("heavyweight"),
            Requirement::versions(VersionRanges::full()),
        )
        .when(Condition::when_traits(["Heavy"]))]);

    let outcome = package_graph::resolve_and_build(
        &provider,
        vec![root],
        &id("app"),
        TraitConfiguration::Default,
        &package_graph::AllSourcesPresent,
    )
    .unwrap();
    assert!(outcome.graph().is_some());
}
