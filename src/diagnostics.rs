// SPDX-License-Identifier: MPL-2.0

//! Structured diagnostics collected during graph construction.
//!
//! Structural problems are collected, not thrown: the builder keeps
//! walking the whole graph to surface as many distinct diagnostics per run
//! as it safely can. The buffer preserves insertion order; construction
//! iterates packages in identity order, so the stream is deterministic.

use std::fmt::{self, Display};

use crate::identity::PackageIdentity;

/// How bad a diagnostic is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// Worth telling the user about.
    Warning,
    /// The graph is not usable as declared.
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Optional context attached to a diagnostic.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DiagnosticMetadata {
    /// The package the diagnostic concerns.
    pub package_identity: Option<PackageIdentity>,
    /// The module the diagnostic concerns.
    pub module_name: Option<String>,
    /// Provenance noun of the package (registry, source control, local).
    pub package_kind: Option<String>,
}

/// One structured diagnostic record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnostic {
    /// Human-readable message.
    pub message: String,
    /// Severity of the record.
    pub severity: Severity,
    /// Optional context.
    pub metadata: DiagnosticMetadata,
}

impl Diagnostic {
    /// An error with no metadata.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            metadata: DiagnosticMetadata::default(),
        }
    }

    /// A warning with no metadata.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
            metadata: DiagnosticMetadata::default(),
        }
    }

    /// Attach the package the diagnostic concerns.
    pub fn for_package(mut self, identity: PackageIdentity) -> Self {
        self.metadata.package_identity = Some(identity);
        self
    }

    /// Attach the module the diagnostic concerns.
    pub fn for_module(mut self, module: impl Into<String>) -> Self {
        self.metadata.module_name = Some(module.into());
        self
    }

    /// Attach the provenance noun of the package.
    pub fn with_package_kind(mut self, kind: impl Into<String>) -> Self {
        self.metadata.package_kind = Some(kind.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Insertion-ordered buffer of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsBuffer {
    records: Vec<Diagnostic>,
}

impl DiagnosticsBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        log::debug!("diagnostic: {}", diagnostic);
        self.records.push(diagnostic);
    }

    /// All records, in insertion order.
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Records of a given severity, in insertion order.
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.records
            .iter()
            .filter(move |record| record.severity == severity)
    }

    /// Whether any error-severity record was emitted.
    pub fn has_errors(&self) -> bool {
        self.records
            .iter()
            .any(|record| record.severity == Severity::Error)
    }

    /// Whether a record with exactly this message exists.
    pub fn contains_message(&self, message: &str) -> bool {
        self.records.iter().any(|record| record.message == message)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for DiagnosticsBuffer {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
