// SPDX-License-Identifier: MPL-2.0

//! Build a report as clear as possible as to why dependency solving failed.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::identity::PackageIdentity;
use crate::requirement::{Binding, Requirement};
use crate::term::Term;

/// Derivation tree resulting in the impossibility to solve the
/// dependencies of the root package.
#[derive(Debug, Clone)]
pub enum DerivationTree {
    /// External incompatibility.
    External(External),
    /// Incompatibility derived from two others.
    Derived(Derived),
}

/// Incompatibilities that are not derived from others: they have their own
/// external reason.
#[derive(Debug, Clone)]
pub enum External {
    /// Initial incompatibility aiming at picking the root package for the
    /// first decision.
    Root(PackageIdentity),
    /// There is no binding in the given requirement for this package.
    NoVersions(PackageIdentity, Requirement),
    /// The package is unusable at the given binding, with a reason.
    Unavailable(PackageIdentity, Binding, String),
    /// Incompatibility coming from the dependencies of a given package.
    Dependency(PackageIdentity, Requirement, PackageIdentity, Requirement),
}

/// Incompatibility derived from two others.
#[derive(Debug, Clone)]
pub struct Derived {
    /// Terms of the incompatibility, keyed by package.
    pub terms: BTreeMap<PackageIdentity, Term>,
    /// When the incompatibility is present multiple times in the
    /// derivation tree, this is its unique id, so that the reporter can
    /// explain it once and refer back to that explanation.
    pub shared_id: Option<usize>,
    /// First cause.
    pub cause1: Arc<DerivationTree>,
    /// Second cause.
    pub cause2: Arc<DerivationTree>,
}

impl DerivationTree {
    /// All packages referred to in the derivation tree, in identity order.
    pub fn packages(&self) -> Vec<&PackageIdentity> {
        let mut packages = FxHashSet::default();
        self.collect_packages(&mut packages);
        let mut sorted: Vec<_> = packages.into_iter().collect();
        sorted.sort();
        sorted
    }

    fn collect_packages<'a>(&'a self, packages: &mut FxHashSet<&'a PackageIdentity>) {
        match self {
            Self::External(external) => match external {
                External::Dependency(package, _, dep_package, _) => {
                    packages.insert(package);
                    packages.insert(dep_package);
                }
                External::Root(package)
                | External::NoVersions(package, _)
                | External::Unavailable(package, ..) => {
                    packages.insert(package);
                }
            },
            Self::Derived(derived) => {
                packages.extend(derived.terms.keys());
                derived.cause1.collect_packages(packages);
                derived.cause2.collect_packages(packages);
            }
        }
    }

    /// Merge the [NoVersions](External::NoVersions) external
    /// incompatibilities with the ones they are paired with in a derived
    /// incompatibility. This cleans up the generated report noticeably when
    /// the provider exposes the complete version history.
    pub fn collapse_no_versions(&mut self) {
        match self {
            Self::External(_) => {}
            Self::Derived(derived) => {
                match (
                    Arc::make_mut(&mut derived.cause1),
                    Arc::make_mut(&mut derived.cause2),
                ) {
                    (Self::External(External::NoVersions(package, requirement)), cause2) => {
                        let (package, requirement) = (package.clone(), requirement.clone());
                        cause2.collapse_no_versions();
                        *self = cause2
                            .clone()
                            .merge_no_versions(package, requirement)
                            .unwrap_or_else(|| self.clone());
                    }
                    (cause1, Self::External(External::NoVersions(package, requirement))) => {
                        let (package, requirement) = (package.clone(), requirement.clone());
                        cause1.collapse_no_versions();
                        *self = cause1
                            .clone()
                            .merge_no_versions(package, requirement)
                            .unwrap_or_else(|| self.clone());
                    }
                    (cause1, cause2) => {
                        cause1.collapse_no_versions();
                        cause2.collapse_no_versions();
                    }
                }
            }
        }
    }

    fn merge_no_versions(self, package: PackageIdentity, requirement: Requirement) -> Option<Self> {
        match self {
            Self::Derived(_) => Some(self),
            Self::External(External::Root(_)) => {
                // A NoVersions incompatibility can never resolve against
                // the root pick.
                None
            }
            Self::External(External::NoVersions(p, r)) => Some(Self::External(
                External::NoVersions(p, r.union(&requirement)),
            )),
            // Cannot be merged, the reason may not match.
            Self::External(External::Unavailable(..)) => None,
            Self::External(External::Dependency(p1, r1, p2, r2)) => {
                if p1 == package {
                    Some(Self::External(External::Dependency(
                        p1,
                        r1.union(&requirement),
                        p2,
                        r2,
                    )))
                } else {
                    Some(Self::External(External::Dependency(
                        p1,
                        r1,
                        p2,
                        r2.union(&requirement),
                    )))
                }
            }
        }
    }
}

impl Display for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(package) => {
                write!(f, "we are solving dependencies of {}", package)
            }
            Self::NoVersions(package, requirement) => {
                if requirement == &Requirement::any() {
                    write!(f, "there is no available version for {}", package)
                } else {
                    write!(f, "there is no version of {} in {}", package, requirement)
                }
            }
            Self::Unavailable(package, binding, reason) => {
                write!(f, "{} at {} is unavailable because {}", package, binding, reason)
            }
            Self::Dependency(package, requirement, dep_package, dep_requirement) => {
                if requirement == &Requirement::any() && dep_requirement == &Requirement::any() {
                    write!(f, "{} depends on {}", package, dep_package)
                } else if requirement == &Requirement::any() {
                    write!(f, "{} depends on {} {}", package, dep_package, dep_requirement)
                } else if dep_requirement == &Requirement::any() {
                    write!(f, "{} {} depends on {}", package, requirement, dep_package)
                } else {
                    write!(
                        f,
                        "{} {} depends on {} {}",
                        package, requirement, dep_package, dep_requirement
                    )
                }
            }
        }
    }
}

/// Reporter trait: turn a derivation tree into some output.
pub trait Reporter {
    /// Output type of the report.
    type Output;

    /// Generate a report from the derivation tree describing the
    /// resolution failure.
    fn report(derivation_tree: &DerivationTree) -> Self::Output;
}

/// Default reporter able to generate an explanation as a [String].
pub struct DefaultStringReporter {
    /// Number of explanations already with a line reference.
    ref_count: usize,
    /// Shared nodes that have already been marked with a line reference.
    /// Keys are incompatibility shared ids, values the line references.
    shared_with_ref: BTreeMap<usize, usize>,
    /// Accumulated lines of the report already generated.
    lines: Vec<String>,
}

impl DefaultStringReporter {
    fn new() -> Self {
        Self {
            ref_count: 0,
            shared_with_ref: BTreeMap::new(),
            lines: Vec::new(),
        }
    }

    /// Format the terms of an incompatibility for display.
    pub(crate) fn string_terms(terms: &BTreeMap<PackageIdentity, Term>) -> String {
        let terms_vec: Vec<_> = terms.iter().collect();
        match terms_vec.as_slice() {
            [] => "version solving failed".into(),
            [(package, Term::Positive(requirement))] => {
                format!("{} {} is forbidden", package, requirement)
            }
            [(package, Term::Negative(requirement))] => {
                format!("{} {} is mandatory", package, requirement)
            }
            [(p1, Term::Positive(r1)), (p2, Term::Negative(r2))] => External::Dependency(
                (*p1).clone(),
                r1.clone(),
                (*p2).clone(),
                r2.clone(),
            )
            .to_string(),
            [(p1, Term::Negative(r1)), (p2, Term::Positive(r2))] => External::Dependency(
                (*p2).clone(),
                r2.clone(),
                (*p1).clone(),
                r1.clone(),
            )
            .to_string(),
            slice => {
                let str_terms: Vec<_> = slice.iter().map(|(p, t)| format!("{} {}", p, t)).collect();
                str_terms.join(", ") + " are incompatible"
            }
        }
    }

    fn build_recursive(&mut self, derived: &Derived) {
        self.build_recursive_helper(derived);
        if let Some(id) = derived.shared_id {
            if !self.shared_with_ref.contains_key(&id) {
                self.add_line_ref();
                self.shared_with_ref.insert(id, self.ref_count);
            }
        };
    }

    fn build_recursive_helper(&mut self, current: &Derived) {
        match (current.cause1.as_ref(), current.cause2.as_ref()) {
            (DerivationTree::External(external1), DerivationTree::External(external2)) => {
                // Simplest case, we just combine two external
                // incompatibilities.
                self.lines.push(format!(
                    "Because {} and {}, {}.",
                    external1,
                    external2,
                    Self::string_terms(&current.terms)
                ));
            }
            (DerivationTree::Derived(derived), DerivationTree::External(external))
            | (DerivationTree::External(external), DerivationTree::Derived(derived)) => {
                // One cause is derived, so we explain it first, then add
                // the one-line external part, and finally conclude with the
                // current incompatibility.
                self.report_one_each(derived, external, &current.terms);
            }
            (DerivationTree::Derived(derived1), DerivationTree::Derived(derived2)) => {
                // Most complex case, both causes are derived.
                match (
                    self.line_ref_of(derived1.shared_id),
                    self.line_ref_of(derived2.shared_id),
                ) {
                    // If both causes already have been referenced, the
                    // explanation simply uses those references.
                    (Some(ref1), Some(ref2)) => self.lines.push(format!(
                        "Because {} ({}) and {} ({}), {}.",
                        Self::string_terms(&derived1.terms),
                        ref1,
                        Self::string_terms(&derived2.terms),
                        ref2,
                        Self::string_terms(&current.terms)
                    )),
                    // Otherwise, if one only has a line reference, we
                    // recurse into the one without and conclude with the
                    // referenced one.
                    (Some(ref1), None) => {
                        self.build_recursive(derived2);
                        self.and_explain_ref(ref1, derived1, &current.terms);
                    }
                    (None, Some(ref2)) => {
                        self.build_recursive(derived1);
                        self.and_explain_ref(ref2, derived2, &current.terms);
                    }
                    // If no line reference exists yet, recurse into the
                    // first one; if it was shared it gets a line reference
                    // and we can recall this node, otherwise we add a line
                    // reference to it, recurse into the second one, and
                    // conclude.
                    (None, None) => {
                        self.build_recursive(derived1);
                        if derived1.shared_id.is_some() {
                            self.lines.push("".into());
                            self.build_recursive(current);
                        } else {
                            self.add_line_ref();
                            let ref1 = self.ref_count;
                            self.lines.push("".into());
                            self.build_recursive(derived2);
                            self.and_explain_ref(ref1, derived1, &current.terms);
                        }
                    }
                }
            }
        }
    }

    /// Report a derived and an external incompatibility.
    fn report_one_each(
        &mut self,
        derived: &Derived,
        external: &External,
        current_terms: &BTreeMap<PackageIdentity, Term>,
    ) {
        match self.line_ref_of(derived.shared_id) {
            Some(ref_id) => self.lines.push(format!(
                "Because {} ({}) and {}, {}.",
                Self::string_terms(&derived.terms),
                ref_id,
                external,
                Self::string_terms(current_terms)
            )),
            None => self.report_recurse_one_each(derived, external, current_terms),
        }
    }

    /// Report one derived (without a line reference yet) and one external.
    fn report_recurse_one_each(
        &mut self,
        derived: &Derived,
        external: &External,
        current_terms: &BTreeMap<PackageIdentity, Term>,
    ) {
        match (derived.cause1.as_ref(), derived.cause2.as_ref()) {
            // If the derived cause has itself one external prior cause, we
            // can chain the external explanations.
            (DerivationTree::Derived(prior_derived), DerivationTree::External(prior_external))
            | (DerivationTree::External(prior_external), DerivationTree::Derived(prior_derived)) =>
            {
                self.build_recursive(prior_derived);
                self.lines.push(format!(
                    "And because {} and {}, {}.",
                    prior_external,
                    external,
                    Self::string_terms(current_terms)
                ));
            }
            _ => {
                self.build_recursive(derived);
                self.lines.push(format!(
                    "And because {}, {}.",
                    external,
                    Self::string_terms(current_terms)
                ));
            }
        }
    }

    // Helper functions ########################################################

    fn and_explain_ref(
        &mut self,
        ref_id: usize,
        derived: &Derived,
        current_terms: &BTreeMap<PackageIdentity, Term>,
    ) {
        self.lines.push(format!(
            "And because {} ({}), {}.",
            Self::string_terms(&derived.terms),
            ref_id,
            Self::string_terms(current_terms)
        ));
    }

    fn add_line_ref(&mut self) {
        let new_count = self.ref_count + 1;
        self.ref_count = new_count;
        if let Some(line) = self.lines.last_mut() {
            *line = format!("{} ({})", line, new_count);
        }
    }

    fn line_ref_of(&self, shared_id: Option<usize>) -> Option<usize> {
        shared_id.and_then(|id| self.shared_with_ref.get(&id).copied())
    }
}

impl Reporter for DefaultStringReporter {
    type Output = String;

    fn report(derivation_tree: &DerivationTree) -> Self::Output {
        match derivation_tree {
            DerivationTree::External(external) => external.to_string(),
            DerivationTree::Derived(derived) => {
                let mut reporter = Self::new();
                reporter.build_recursive(derived);
                reporter.lines.join("\n")
            }
        }
    }
}
