//! Fatal error types for sheet processing.
//!
//! Structural errors abort the whole run: once the page layout or the segment
//! numbering is broken, every quantity derived after that point would be
//! meaningless. Data-level irregularities (hand-entered noise) are *not*
//! errors in this sense; they are reported as
//! [`Diagnostic`](crate::sheet::report::Diagnostic)s and processing
//! continues.

use std::fmt;

/// Errors that abort processing of the whole sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// The page-number tokens on a boundary line do not continue the
    /// expected sequence, or the physical page separator is missing.
    PageSequence { detail: String },
    /// No candidate column offset produced a blank gutter for a page.
    ColumnBounds { page: String, probed_from: usize },
    /// The three-column table header was not found on a page.
    HeaderNotFound { page: String },
    /// A segment marker skipped or repeated a number.
    SegmentSequence {
        page: String,
        line: usize,
        expected: u32,
        found: u32,
    },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::PageSequence { detail } => {
                write!(f, "Invalid page sequence: {}", detail)
            }
            StructuralError::ColumnBounds { page, probed_from } => {
                write!(
                    f,
                    "No column gutter found for page {} (probed from offset {})",
                    page, probed_from
                )
            }
            StructuralError::HeaderNotFound { page } => {
                write!(f, "Table header not found on page {}", page)
            }
            StructuralError::SegmentSequence {
                page,
                line,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Out-of-sequence segment on page {} line {}: expected {}, found {}",
                    page, line, expected, found
                )
            }
        }
    }
}

impl std::error::Error for StructuralError {}
