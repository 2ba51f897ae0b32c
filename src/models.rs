//! Data models for the analysis orchestrator.
//!
//! This module contains the core data structures shared across the
//! pipeline: industry profiles, findings, job lifecycle states, results,
//! and progress events.

use crate::error::CapabilityFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a submitted analysis job.
pub type JobId = u64;

/// Business domain detected for a dataset.
///
/// Declaration order is the fixed tie-break priority: when two industries
/// score equally, the one declared first wins. `General` is the fallback
/// when no industry clears the detection threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Retail,
    Ecommerce,
    Saas,
    Finance,
    Manufacturing,
    Healthcare,
    Hospitality,
    General,
}

impl Industry {
    /// All industries with dedicated signatures, in priority order.
    pub fn detectable() -> &'static [Industry] {
        &[
            Industry::Retail,
            Industry::Ecommerce,
            Industry::Saas,
            Industry::Finance,
            Industry::Manufacturing,
            Industry::Healthcare,
            Industry::Hospitality,
        ]
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Industry::Retail => write!(f, "Retail"),
            Industry::Ecommerce => write!(f, "E-commerce"),
            Industry::Saas => write!(f, "SaaS"),
            Industry::Finance => write!(f, "Finance"),
            Industry::Manufacturing => write!(f, "Manufacturing"),
            Industry::Healthcare => write!(f, "Healthcare"),
            Industry::Hospitality => write!(f, "Hospitality"),
            Industry::General => write!(f, "General"),
        }
    }
}

/// Classifier output describing the detected business domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryProfile {
    /// Detected industry.
    pub industry: Industry,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Optional refinement within the industry (e.g. "online_retail").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Column names and keywords that matched the industry signature.
    pub matched_indicators: BTreeSet<String>,
    /// Capability names suggested for this industry, in order.
    pub suggested_capabilities: Vec<String>,
}

impl IndustryProfile {
    /// A general profile carrying the (insufficient) top confidence.
    pub fn general(confidence: f64) -> Self {
        Self {
            industry: Industry::General,
            confidence,
            subtype: None,
            matched_indicators: BTreeSet::new(),
            suggested_capabilities: vec!["data_profile".to_string()],
        }
    }
}

/// Health status of a KPI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiStatus {
    Good,
    Warning,
    Critical,
}

impl KpiStatus {
    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            KpiStatus::Good => "🟢",
            KpiStatus::Warning => "🟡",
            KpiStatus::Critical => "🔴",
        }
    }
}

impl fmt::Display for KpiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KpiStatus::Good => write!(f, "Good"),
            KpiStatus::Warning => write!(f, "Warning"),
            KpiStatus::Critical => write!(f, "Critical"),
        }
    }
}

/// A named key performance indicator with value and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kpi {
    /// Raw numeric value.
    pub value: f64,
    /// Display-ready formatting of the value.
    pub formatted: String,
    /// Health status relative to industry thresholds.
    pub status: KpiStatus,
}

impl Kpi {
    /// Creates a KPI with a plain numeric formatting.
    pub fn new(value: f64, status: KpiStatus) -> Self {
        Self {
            value,
            formatted: format!("{:.2}", value),
            status,
        }
    }

    /// Creates a KPI with custom formatting.
    pub fn formatted(value: f64, formatted: impl Into<String>, status: KpiStatus) -> Self {
        Self {
            value,
            formatted: formatted.into(),
            status,
        }
    }
}

/// Raw findings produced by one or more capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Findings {
    /// Observations about the data, in generation order.
    pub insights: Vec<String>,
    /// Actionable suggestions, in generation order.
    pub recommendations: Vec<String>,
    /// Named KPIs.
    pub kpis: BTreeMap<String, Kpi>,
}

impl Findings {
    /// Merges another set of findings into this one, preserving order.
    pub fn merge(&mut self, other: Findings) {
        self.insights.extend(other.insights);
        self.recommendations.extend(other.recommendations);
        self.kpis.extend(other.kpis);
    }

    /// Whether no capability contributed anything yet.
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty() && self.recommendations.is_empty() && self.kpis.is_empty()
    }
}

/// A correction applied (or attempted) by the self-correction loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFix {
    /// Normalized signature of the failure the fix addressed.
    pub signature: String,
    /// Human-readable description of what was changed.
    pub description: String,
}

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Detecting,
    Analyzing,
    Recovering,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "CREATED",
            JobState::Detecting => "DETECTING",
            JobState::Analyzing => "ANALYZING",
            JobState::Recovering => "RECOVERING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::TimedOut => "TIMED_OUT",
            JobState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Detail attached to a non-successful outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    /// The failure that ended the job, with structured detail intact.
    pub failure: CapabilityFailure,
    /// How many analysis attempts were made.
    pub attempts: u32,
}

/// The result of a finished analysis job.
///
/// For FAILED and TIMED_OUT outcomes, findings accumulated before the
/// failure are preserved and `auto_fixes_applied` records the full chain
/// of attempted corrections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Detected industry profile.
    pub industry: IndustryProfile,
    /// Observations, in generation order.
    pub insights: Vec<String>,
    /// Actionable suggestions, in generation order.
    pub recommendations: Vec<String>,
    /// Named KPIs with status.
    pub kpis: BTreeMap<String, Kpi>,
    /// Corrections attempted by the self-correction loop, in order.
    pub auto_fixes_applied: Vec<AppliedFix>,
    /// Terminal state the job ended in.
    pub outcome: JobState,
    /// Present when the job ended in FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

/// A progress update for one job.
///
/// Within a job, `percentage` is non-decreasing and `timestamp` strictly
/// increasing. `attempt` ties RECOVERING stages to the retry they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The job this event belongs to.
    pub job_id: JobId,
    /// Lifecycle stage at emission time.
    pub stage: JobState,
    /// Overall progress in [0, 100].
    pub percentage: u8,
    /// Human-readable status line.
    pub message: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Analysis attempt the event belongs to (1-based).
    pub attempt: u32,
}
