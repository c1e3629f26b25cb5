//! Diagnostic types for the compilation pipeline.
//!
//! The error surface is a closed taxonomy. Diagnostics accumulate across
//! passes; an `Error` taints the result without stopping the pipeline, a
//! `Fatal` aborts it. `success` means no error-or-fatal diagnostics were
//! recorded (warnings included when strict mode is on).

use crate::token::SourceLocation;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    Lexical,
    Syntactic,
    Semantic,
    ImportResolution,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub file: String,
    pub location: SourceLocation,
    pub secondary: Vec<SourceLocation>,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        severity: Severity,
        message: impl Into<String>,
        file: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            file: file.into(),
            location,
            secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, loc: SourceLocation) -> Self {
        self.secondary.push(loc);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(
            f,
            "{}:{}: {} ({:?}): {}",
            self.file, self.location, sev, self.kind, self.message
        )
    }
}

/// Accumulating diagnostic list shared by every pass of one pipeline.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
    file: String,
}

impl Diagnostics {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            list: Vec::new(),
            file: file.into(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.list.push(diag);
    }

    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        severity: Severity,
        message: impl Into<String>,
        location: SourceLocation,
    ) {
        let file = self.file.clone();
        self.list
            .push(Diagnostic::new(kind, severity, message, file, location));
    }

    pub fn error(
        &mut self,
        kind: DiagnosticKind,
        message: impl Into<String>,
        location: SourceLocation,
    ) {
        self.report(kind, Severity::Error, message, location);
    }

    pub fn warning(
        &mut self,
        kind: DiagnosticKind,
        message: impl Into<String>,
        location: SourceLocation,
    ) {
        self.report(kind, Severity::Warning, message, location);
    }

    /// Builds a fatal diagnostic without pushing it; callers abort by
    /// returning it up through `Result`.
    pub fn fatal(
        &self,
        kind: DiagnosticKind,
        message: impl Into<String>,
        location: SourceLocation,
    ) -> Diagnostic {
        Diagnostic::new(kind, Severity::Fatal, message, self.file.clone(), location)
    }

    pub fn list(&self) -> &[Diagnostic] {
        &self.list
    }

    /// Absorb diagnostics from a nested compilation (imported module).
    pub fn absorb(&mut self, other: Diagnostics) {
        self.list.extend(other.list);
    }

    pub fn into_list(self) -> Vec<Diagnostic> {
        self.list
    }

    pub fn has_errors(&self) -> bool {
        self.list.iter().any(|d| d.severity >= Severity::Error)
    }

    /// Final success flag for a compile: no errors, and in strict mode no
    /// warnings either.
    pub fn success(&self, strict: bool) -> bool {
        let floor = if strict {
            Severity::Warning
        } else {
            Severity::Error
        };
        !self.list.iter().any(|d| d.severity >= floor)
    }
}
