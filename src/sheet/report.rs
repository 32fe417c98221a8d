//! Diagnostics: the structured warning/error stream and inline annotations.
//!
//! Source sheets are hand-entered and known to contain irregularities, so
//! data-level problems never abort the run. Each one becomes a [`Diagnostic`]
//! with page and line context, is forwarded to the `log` crate, and is
//! attached to the offending source line as an inline annotation so the audit
//! render shows it next to the original text.

use crate::sheet::page::Page;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Recoverable data-level problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// Sheet-reported cumulative distance disagrees with the running total.
    DistanceMismatch,
    /// Sheet-reported cumulative distance restarted from its relative delta.
    CounterReset,
    /// Declared segment speed lies outside the admissible band.
    SpeedOutOfBand,
    /// A line the tokenizer could not classify.
    UnexpectedLine,
    /// A vocabulary keyword outside any checkpoint's buffered lines.
    OrphanKeyword,
    /// Checkpoint time earlier than its predecessor.
    NonMonotonicTime,
    /// An `HH:MM:SS` token with minutes or seconds out of range.
    InvalidTimestamp,
    /// A page ended while a checkpoint record was still incomplete.
    IncompleteCheckpoint,
}

/// One recoverable problem, with its source location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub page: String,
    pub line: usize,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: page {}, line {}: {}",
            self.severity, self.page, self.line, self.message
        )
    }
}

/// Collects diagnostics in emission order, logs them, and annotates pages.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter::default()
    }

    /// Record a diagnostic against `line` of `page` (page line index).
    pub fn report(
        &mut self,
        page: &mut Page,
        line: usize,
        severity: Severity,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let diagnostic = Diagnostic {
            page: page.number().to_string(),
            line,
            severity,
            kind,
            message: message.clone(),
        };
        match severity {
            Severity::Info => log::info!("{}", diagnostic),
            Severity::Warning => log::warn!("{}", diagnostic),
            Severity::Error => log::error!("{}", diagnostic),
        }
        page.annotate(line, message);
        self.diagnostics.push(diagnostic);
    }

    /// Attach a plain informational side note with no diagnostic record
    /// (derived quantities such as step counts and cadence).
    pub fn annotate(&mut self, page: &mut Page, line: usize, note: impl Into<String>) {
        page.annotate(line, note);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Highest severity seen so far, if any diagnostic was recorded.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.diagnostics.iter().map(|d| d.severity).max_by_key(|s| match s {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Error => 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::page::PageNumber;

    fn test_page() -> Page {
        Page::from_lines(
            PageNumber::new("", 1),
            vec!["  100".to_string(), "  garbled".to_string()],
        )
    }

    #[test]
    fn test_report_annotates_and_records() {
        let mut page = test_page();
        let mut reporter = Reporter::new();
        reporter.report(
            &mut page,
            1,
            Severity::Warning,
            DiagnosticKind::UnexpectedLine,
            "unexpected line",
        );
        assert_eq!(reporter.diagnostics().len(), 1);
        assert_eq!(reporter.diagnostics()[0].page, "1");
        assert_eq!(page.annotations()[&1], vec!["unexpected line"]);
    }

    #[test]
    fn test_worst_severity() {
        let mut page = test_page();
        let mut reporter = Reporter::new();
        assert_eq!(reporter.worst_severity(), None);
        reporter.report(
            &mut page,
            0,
            Severity::Info,
            DiagnosticKind::CounterReset,
            "reset",
        );
        reporter.report(
            &mut page,
            1,
            Severity::Error,
            DiagnosticKind::DistanceMismatch,
            "mismatch",
        );
        assert_eq!(reporter.worst_severity(), Some(Severity::Error));
    }
}
