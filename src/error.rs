//! Error taxonomy for analysis jobs.
//!
//! This module defines the structured failure types that flow through the
//! retry loop and the caller-facing error enum returned by the
//! orchestrator's public operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of a structured capability failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required column is absent from the dataset.
    MissingColumn,
    /// A column holds a different type than the capability requires.
    TypeMismatch,
    /// A date column contains values that cannot be interpreted.
    MalformedDate,
    /// A value falls outside the range the capability can handle.
    OutOfRange,
    /// A column reference matches more than one candidate.
    AmbiguousColumn,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::MissingColumn => "missing_column",
            FailureKind::TypeMismatch => "type_mismatch",
            FailureKind::MalformedDate => "malformed_date",
            FailureKind::OutOfRange => "out_of_range",
            FailureKind::AmbiguousColumn => "ambiguous_column",
        };
        write!(f, "{}", name)
    }
}

/// A structured, recoverable-candidate failure raised by a capability.
///
/// Carries enough detail for the error advisor to act without re-parsing
/// free text: the implicated column, expected vs. actual where known, and
/// the raw message.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{capability}: {message}")]
pub struct CapabilityFailure {
    /// Name of the capability that failed.
    pub capability: String,
    /// Failure kind.
    pub kind: FailureKind,
    /// The column implicated, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// What the capability expected (a type, a format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// What it actually found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl CapabilityFailure {
    /// A missing-column failure.
    pub fn missing_column(capability: &str, column: &str) -> Self {
        Self {
            capability: capability.to_string(),
            kind: FailureKind::MissingColumn,
            column: Some(column.to_string()),
            expected: None,
            actual: None,
            message: format!("Required column '{}' not found", column),
        }
    }

    /// A type-mismatch failure.
    pub fn type_mismatch(capability: &str, column: &str, expected: &str, actual: &str) -> Self {
        Self {
            capability: capability.to_string(),
            kind: FailureKind::TypeMismatch,
            column: Some(column.to_string()),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
            message: format!(
                "Column '{}' has type {} but {} is required",
                column, actual, expected
            ),
        }
    }

    /// A malformed-date failure.
    pub fn malformed_date(capability: &str, column: &str, sample: &str) -> Self {
        Self {
            capability: capability.to_string(),
            kind: FailureKind::MalformedDate,
            column: Some(column.to_string()),
            expected: Some("ISO 8601 date".to_string()),
            actual: Some(sample.to_string()),
            message: format!("Column '{}' contains unparseable date '{}'", column, sample),
        }
    }

    /// An ambiguous-column failure listing the candidates.
    pub fn ambiguous_column(capability: &str, column: &str, candidates: &[String]) -> Self {
        Self {
            capability: capability.to_string(),
            kind: FailureKind::AmbiguousColumn,
            column: Some(column.to_string()),
            expected: None,
            actual: Some(candidates.join(", ")),
            message: format!(
                "Column reference '{}' matches multiple columns: {}",
                column,
                candidates.join(", ")
            ),
        }
    }

    /// An out-of-range failure.
    pub fn out_of_range(capability: &str, column: &str, detail: &str) -> Self {
        Self {
            capability: capability.to_string(),
            kind: FailureKind::OutOfRange,
            column: Some(column.to_string()),
            expected: None,
            actual: Some(detail.to_string()),
            message: format!("Column '{}' value out of range: {}", column, detail),
        }
    }
}

/// A concrete correction proposed by the error advisor.
///
/// Corrections are applied to the job's analysis context, never to the
/// caller-owned dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Correction {
    /// Map a referenced column name onto an existing dataset column.
    RenameColumn { from: String, to: String },
    /// Re-interpret a date column using the given format string.
    NormalizeDates { column: String, format: String },
    /// Coerce a column's values to the given type before analysis.
    CoerceType { column: String, to: String },
    /// Clamp a column's values into the given inclusive range.
    ClampRange { column: String, min: f64, max: f64 },
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correction::RenameColumn { from, to } => {
                write!(f, "Mapped column '{}' to '{}'", from, to)
            }
            Correction::NormalizeDates { column, format } => {
                write!(f, "Normalized dates in '{}' using format '{}'", column, format)
            }
            Correction::CoerceType { column, to } => {
                write!(f, "Coerced column '{}' to {}", column, to)
            }
            Correction::ClampRange { column, min, max } => {
                write!(f, "Clamped '{}' into [{}, {}]", column, min, max)
            }
        }
    }
}

/// Errors surfaced by the orchestrator's public operations.
#[derive(Debug, Clone, Error)]
pub enum BizscopeError {
    /// Industry confidence fell below the detection threshold.
    ///
    /// Not fatal on its own: the job downgrades to the general industry
    /// and continues. Surfaced only when a caller asks why.
    #[error("Industry detection ambiguous: confidence {confidence:.2} below threshold {threshold:.2}")]
    DetectionAmbiguous { confidence: f64, threshold: f64 },

    /// A structured capability failure that exhausted the retry budget.
    #[error(transparent)]
    Capability(#[from] CapabilityFailure),

    /// The advisor declined to propose a fix, or its confidence was too low.
    #[error("Unrecoverable failure after {attempts} attempt(s): {failure}")]
    Unrecoverable {
        failure: CapabilityFailure,
        attempts: u32,
    },

    /// The job exceeded its wall-clock deadline.
    #[error("Job exceeded its deadline of {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// The job was cancelled by the caller.
    #[error("Job was cancelled")]
    Cancelled,

    /// No job with this id exists.
    #[error("Job {0} not found")]
    JobNotFound(u64),

    /// The job has not yet reached a terminal state.
    #[error("Job {0} has not reached a terminal state")]
    JobNotTerminal(u64),

    /// The job's progress stream was already taken by another subscriber.
    #[error("Job {0} already has a progress subscriber")]
    SubscriberTaken(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_failure() {
        let failure = CapabilityFailure::missing_column("trend_analysis", "sales_amount");
        assert_eq!(failure.kind, FailureKind::MissingColumn);
        assert_eq!(failure.column.as_deref(), Some("sales_amount"));
        assert!(failure.message.contains("sales_amount"));
    }

    #[test]
    fn test_type_mismatch_carries_expected_and_actual() {
        let failure = CapabilityFailure::type_mismatch("kpi_summary", "revenue", "number", "text");
        assert_eq!(failure.expected.as_deref(), Some("number"));
        assert_eq!(failure.actual.as_deref(), Some("text"));
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::MissingColumn.to_string(), "missing_column");
        assert_eq!(FailureKind::MalformedDate.to_string(), "malformed_date");
    }

    #[test]
    fn test_error_display() {
        let err = BizscopeError::JobNotTerminal(7);
        assert_eq!(err.to_string(), "Job 7 has not reached a terminal state");

        let err = BizscopeError::Timeout {
            timeout_seconds: 300,
        };
        assert!(err.to_string().contains("300"));
    }
}
