//! Diagnostics collected while building a network from interchange data.
//!
//! A conversion never stops on a single malformed element. Instead every
//! deviation from the input is recorded here with one of five kinds:
//!
//! - **missing**: a referenced object does not exist in the input
//! - **invalid**: an element could not be converted and was skipped
//! - **fixed**: a value was substituted (optionally with the before/after values)
//! - **ignored**: an input feature was deliberately not converted
//! - **pending**: work that was registered but never completed
//!
//! Each issue is mirrored to `tracing` as it is recorded, so a binary that
//! installs a subscriber sees the conversion log live.
//!
//! # Example
//!
//! ```
//! use gat_core::diagnostics::{Diagnostics, IssueKind};
//!
//! let mut diag = Diagnostics::new();
//! diag.missing("Terminal T7");
//! diag.fixed_value("RegulatingControl RC1", "Invalid target voltage", "0", "400");
//!
//! assert_eq!(diag.count(IssueKind::Missing), 1);
//! assert_eq!(diag.count(IssueKind::Fixed), 1);
//! assert_eq!(diag.warning_count(), 2);
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Deliberate omission or leftover work; no data was changed
    Info,
    /// Unusual but conversion continued (e.g., substituted value)
    Warning,
    /// Could not convert the element
    Error,
}

/// What happened to the subject of a diagnostic issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Missing,
    Invalid,
    Fixed,
    Ignored,
    Pending,
}

impl IssueKind {
    /// Severity implied by the kind.
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::Missing | IssueKind::Fixed => Severity::Warning,
            IssueKind::Invalid => Severity::Error,
            IssueKind::Ignored | IssueKind::Pending => Severity::Info,
        }
    }

    fn label(self) -> &'static str {
        match self {
            IssueKind::Missing => "missing",
            IssueKind::Invalid => "invalid",
            IssueKind::Fixed => "fixed",
            IssueKind::Ignored => "ignored",
            IssueKind::Pending => "pending",
        }
    }
}

/// A single diagnostic issue
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// The object the issue is about (e.g., "RegulatingControl RC1")
    pub what: String,
    /// Human-readable reason; empty for `missing`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Value before a fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Value after a fix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(kind: IssueKind, what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            what: what.into(),
            reason: reason.into(),
            before: None,
            after: None,
        }
    }

    /// Attach the substituted values of a fix
    pub fn with_values(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self.after = Some(after.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.label(), self.what)?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        if let (Some(before), Some(after)) = (&self.before, &self.after) {
            write!(f, " ({} -> {})", before, after)?;
        }
        Ok(())
    }
}

/// Collection of diagnostic issues for one conversion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw issue directly, mirroring it to the log
    pub fn add(&mut self, issue: DiagnosticIssue) {
        match issue.severity {
            Severity::Error | Severity::Warning => warn!(kind = issue.kind.label(), "{}", issue),
            Severity::Info if issue.kind == IssueKind::Pending => info!("{}", issue),
            Severity::Info => debug!("{}", issue),
        }
        self.issues.push(issue);
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// A referenced object is absent from the input.
    pub fn missing(&mut self, what: impl Into<String>) {
        self.add(DiagnosticIssue::new(IssueKind::Missing, what, ""));
    }

    /// The element could not be converted.
    pub fn invalid(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.add(DiagnosticIssue::new(IssueKind::Invalid, what, reason));
    }

    /// A value was substituted.
    pub fn fixed(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.add(DiagnosticIssue::new(IssueKind::Fixed, what, reason));
    }

    /// A value was substituted; records both values.
    pub fn fixed_value(
        &mut self,
        what: impl Into<String>,
        reason: impl Into<String>,
        before: impl std::fmt::Display,
        after: impl std::fmt::Display,
    ) {
        self.add(
            DiagnosticIssue::new(IssueKind::Fixed, what, reason)
                .with_values(before.to_string(), after.to_string()),
        );
    }

    /// Part of the input was intentionally not converted.
    pub fn ignored(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.add(DiagnosticIssue::new(IssueKind::Ignored, what, reason));
    }

    /// Registered work was never completed.
    pub fn pending(&mut self, what: impl Into<String>, reason: impl Into<String>) {
        self.add(DiagnosticIssue::new(IssueKind::Pending, what, reason));
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// Issues whose subject is exactly `what`
    pub fn about<'a>(&'a self, what: &'a str) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.what == what)
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Merge another diagnostics into this one without re-logging
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        if self.issues.is_empty() {
            return "No issues".to_string();
        }
        [
            IssueKind::Missing,
            IssueKind::Invalid,
            IssueKind::Fixed,
            IssueKind::Ignored,
            IssueKind::Pending,
        ]
        .into_iter()
        .filter_map(|kind| match self.count(kind) {
            0 => None,
            n => Some(format!("{} {}", n, kind.label())),
        })
        .collect::<Vec<_>>()
        .join(", ")
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
