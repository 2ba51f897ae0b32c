//! Failure diagnosis and correction proposals.
//!
//! The advisor turns a structured capability failure into a concrete
//! correction, or declares it unrecoverable when its confidence is too
//! low. Known failure signatures are resolved from pattern memory first,
//! so identical repeated failures are fixed identically and cheaply.

use crate::dataset::Dataset;
use crate::error::{CapabilityFailure, Correction, FailureKind};
use crate::memory::{failure_signature, shape_fingerprint, PatternMemory, PatternPayload};
use std::sync::Arc;
use tracing::{debug, info};

const TYPE_COERCION_CONFIDENCE: f64 = 0.9;
const DATE_FORMAT_CONFIDENCE: f64 = 0.85;

/// Where a proposed correction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionSource {
    /// Resolved from a stored pattern record.
    Cached,
    /// Derived fresh from the failure and dataset.
    Derived,
}

/// Result of diagnosing a failure.
#[derive(Debug, Clone)]
pub enum Diagnosis {
    /// A correction worth applying.
    Correction {
        correction: Correction,
        confidence: f64,
        source: CorrectionSource,
    },
    /// No fix meets the confidence threshold; the job should fail.
    Unrecoverable { reason: String },
}

/// Diagnoses failures and learns which corrections worked.
pub struct ErrorAdvisor {
    memory: Arc<PatternMemory>,
}

impl ErrorAdvisor {
    /// Creates an advisor backed by the given pattern memory.
    pub fn new(memory: Arc<PatternMemory>) -> Self {
        Self { memory }
    }

    /// The normalized memory signature for a failure on this dataset.
    pub fn signature(&self, failure: &CapabilityFailure, dataset: &dyn Dataset) -> String {
        let column_names: Vec<String> =
            dataset.columns().iter().map(|c| c.name.clone()).collect();
        failure_signature(
            &failure.kind.to_string(),
            failure.column.as_deref(),
            &shape_fingerprint(&column_names),
        )
    }

    /// Proposes a correction for a failure, or declares it unrecoverable.
    ///
    /// A cached fix for the same signature short-circuits derivation.
    /// Derived fixes below `confidence_threshold` are not guessed at.
    pub fn diagnose(
        &self,
        failure: &CapabilityFailure,
        dataset: &dyn Dataset,
        confidence_threshold: f64,
    ) -> Diagnosis {
        let signature = self.signature(failure, dataset);

        if let Some(record) = self.memory.lookup(&signature) {
            if let PatternPayload::ErrorFix { correction } = record.payload {
                info!(
                    "Resolved failure from memory (signature {}, seen {} time(s))",
                    signature, record.occurrence_count
                );
                return Diagnosis::Correction {
                    correction,
                    confidence: 1.0 - 0.5f64.powi(record.occurrence_count.min(16) as i32),
                    source: CorrectionSource::Cached,
                };
            }
        }

        let (correction, confidence) = match self.derive(failure, dataset) {
            Some(proposed) => proposed,
            None => {
                return Diagnosis::Unrecoverable {
                    reason: format!("No correction available for: {}", failure.message),
                }
            }
        };

        if confidence < confidence_threshold {
            debug!(
                "Best correction for '{}' scored {:.2}, below threshold {:.2}",
                signature, confidence, confidence_threshold
            );
            return Diagnosis::Unrecoverable {
                reason: format!(
                    "Proposed correction '{}' scored {:.2}, below the {:.2} confidence threshold",
                    correction, confidence, confidence_threshold
                ),
            };
        }

        Diagnosis::Correction {
            correction,
            confidence,
            source: CorrectionSource::Derived,
        }
    }

    /// Records that a correction resolved its failure.
    ///
    /// Called after the retried analysis succeeds. Returns the record's
    /// occurrence count after the write.
    pub fn record_success(&self, signature: &str, correction: &Correction) -> u64 {
        self.memory.upsert(
            signature,
            PatternPayload::ErrorFix {
                correction: correction.clone(),
            },
        )
    }

    fn derive(
        &self,
        failure: &CapabilityFailure,
        dataset: &dyn Dataset,
    ) -> Option<(Correction, f64)> {
        match failure.kind {
            FailureKind::MissingColumn | FailureKind::AmbiguousColumn => {
                let wanted = failure.column.as_deref()?;
                let (best, score) = best_column_match(wanted, dataset)?;
                Some((
                    Correction::RenameColumn {
                        from: wanted.to_string(),
                        to: best,
                    },
                    score,
                ))
            }
            FailureKind::TypeMismatch => {
                let column = failure.column.as_deref()?;
                if failure.expected.as_deref() == Some("number") {
                    Some((
                        Correction::CoerceType {
                            column: column.to_string(),
                            to: "number".to_string(),
                        },
                        TYPE_COERCION_CONFIDENCE,
                    ))
                } else {
                    None
                }
            }
            FailureKind::MalformedDate => {
                let column = failure.column.as_deref()?;
                let sample = failure.actual.as_deref()?;
                let format = infer_date_format(sample)?;
                Some((
                    Correction::NormalizeDates {
                        column: column.to_string(),
                        format: format.to_string(),
                    },
                    DATE_FORMAT_CONFIDENCE,
                ))
            }
            // Clamping needs domain bounds the failure cannot supply.
            FailureKind::OutOfRange => None,
        }
    }
}

/// Best similarity match for a column reference, scored in [0, 1].
///
/// Similarity is the larger of normalized Levenshtein similarity and
/// token-overlap Jaccard over underscore-separated tokens.
fn best_column_match(wanted: &str, dataset: &dyn Dataset) -> Option<(String, f64)> {
    dataset
        .columns()
        .iter()
        .map(|c| (c.name.clone(), column_similarity(wanted, &c.name)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

fn column_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let edit = if max_len == 0 {
        1.0
    } else {
        1.0 - levenshtein(&a, &b) as f64 / max_len as f64
    };

    let tokens_a: Vec<&str> = a.split('_').filter(|t| !t.is_empty()).collect();
    let tokens_b: Vec<&str> = b.split('_').filter(|t| !t.is_empty()).collect();
    let shared = tokens_a.iter().filter(|t| tokens_b.contains(t)).count();
    let union = tokens_a.len() + tokens_b.len() - shared;
    let jaccard = if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    };

    edit.max(jaccard)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

fn infer_date_format(sample: &str) -> Option<&'static str> {
    let digits_slash: Vec<usize> = sample.split('/').map(str::len).collect();
    let digits_dash: Vec<usize> = sample.split('-').map(str::len).collect();
    let all_numeric =
        |parts: &str, sep: char| parts.split(sep).all(|p| p.chars().all(|c| c.is_ascii_digit()));

    if digits_slash.len() == 3 && all_numeric(sample, '/') {
        return match digits_slash.as_slice() {
            [4, 2, 2] => Some("%Y/%m/%d"),
            [2, 2, 4] => Some("%m/%d/%Y"),
            _ => None,
        };
    }

    if digits_dash.len() == 3 && all_numeric(sample, '-') {
        return match digits_dash.as_slice() {
            [4, 2, 2] => Some("%Y-%m-%d"),
            [2, 2, 4] => Some("%d-%m-%Y"),
            _ => None,
        };
    }

    None
}
