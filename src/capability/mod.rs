//! Analysis capabilities.
//!
//! This module defines the pluggable [`Capability`] trait, the registry
//! that holds capabilities keyed by name and industry applicability, and
//! the per-job [`AnalysisContext`] that corrections are applied to.

pub mod builtin;
pub mod runner;

use crate::dataset::{Dataset, Question};
use crate::error::{CapabilityFailure, Correction};
use crate::models::{Findings, Industry, IndustryProfile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which industries a capability applies to.
#[derive(Debug, Clone)]
pub enum Applicability {
    /// Applicable to every industry, including the general fallback.
    All,
    /// Applicable only to the listed industries.
    Only(Vec<Industry>),
}

impl Applicability {
    /// Whether the capability applies to the given industry.
    pub fn applies_to(&self, industry: Industry) -> bool {
        match self {
            Applicability::All => true,
            Applicability::Only(industries) => industries.contains(&industry),
        }
    }
}

/// Column role a capability requires to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// One date-typed column.
    Datetime,
    /// One numeric metric column.
    NumericMetric,
    /// One categorical grouping column.
    CategoricalDimension,
}

/// A pluggable, named analysis routine.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique capability name.
    fn name(&self) -> &str;

    /// Industries this capability applies to.
    fn industries(&self) -> Applicability;

    /// Column roles the capability needs from the dataset.
    fn required_roles(&self) -> &[ColumnRole];

    /// Runs the analysis against a read-only dataset.
    async fn run(
        &self,
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure>;
}

/// Per-job mutable context shared across capabilities.
///
/// Corrections from the recovery loop land here; the caller-owned dataset
/// itself is never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// The detected industry profile.
    pub profile: IndustryProfile,
    /// The question driving the job.
    pub question: Question,
    aliases: HashMap<String, String>,
    date_formats: HashMap<String, String>,
    coercions: HashMap<String, String>,
    clamps: HashMap<String, (f64, f64)>,
}

impl AnalysisContext {
    /// Creates a fresh context for one job.
    pub fn new(profile: IndustryProfile, question: Question) -> Self {
        Self {
            profile,
            question,
            aliases: HashMap::new(),
            date_formats: HashMap::new(),
            coercions: HashMap::new(),
            clamps: HashMap::new(),
        }
    }

    /// Applies a correction to the context.
    pub fn apply(&mut self, correction: &Correction) {
        match correction {
            Correction::RenameColumn { from, to } => {
                self.aliases.insert(from.clone(), to.clone());
            }
            Correction::NormalizeDates { column, format } => {
                self.date_formats.insert(column.clone(), format.clone());
            }
            Correction::CoerceType { column, to } => {
                self.coercions.insert(column.clone(), to.clone());
            }
            Correction::ClampRange { column, min, max } => {
                self.clamps.insert(column.clone(), (*min, *max));
            }
        }
    }

    /// Resolves a column reference, following any alias mapping.
    pub fn resolve_column(&self, dataset: &dyn Dataset, name: &str) -> Option<usize> {
        if let Some(idx) = dataset.column_index(name) {
            return Some(idx);
        }
        self.aliases
            .get(name)
            .and_then(|target| dataset.column_index(target))
    }

    /// Date format registered for a column, if any.
    pub fn date_format(&self, column: &str) -> Option<&str> {
        self.date_formats.get(column).map(String::as_str)
    }

    /// Whether a column has a registered numeric coercion.
    pub fn coerces_to_number(&self, column: &str) -> bool {
        self.coercions.get(column).map(String::as_str) == Some("number")
    }

    /// Clamps a value into the column's registered range, if any.
    pub fn clamp(&self, column: &str, value: f64) -> f64 {
        match self.clamps.get(column) {
            Some((min, max)) => value.clamp(*min, *max),
            None => value,
        }
    }
}

/// Registry of analysis capabilities.
///
/// Read-only after startup; shared across jobs behind an `Arc`.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in capabilities.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::DataProfile));
        registry.register(Arc::new(builtin::TrendAnalysis));
        registry.register(Arc::new(builtin::Segmentation));
        registry.register(Arc::new(builtin::KpiSummary));
        registry.register(Arc::new(builtin::CorrelationScan));
        registry
    }

    /// Registers a capability. Registration order is execution order when
    /// no explicit names are requested.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        debug!("Registering capability: {}", capability.name());
        self.capabilities.push(capability);
    }

    /// Looks up a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Resolves the ordered capability pipeline for an industry.
    ///
    /// With `requested` names the result follows that order, skipping
    /// unknown names and capabilities not applicable to the industry.
    /// Without, all applicable capabilities run in registration order.
    pub fn resolve(&self, industry: Industry, requested: &[String]) -> Vec<Arc<dyn Capability>> {
        if requested.is_empty() {
            return self
                .capabilities
                .iter()
                .filter(|c| c.industries().applies_to(industry))
                .cloned()
                .collect();
        }

        let mut resolved = Vec::new();
        for name in requested {
            match self.get(name) {
                Some(capability) if capability.industries().applies_to(industry) => {
                    resolved.push(capability);
                }
                Some(_) => {
                    debug!("Capability '{}' not applicable to {}", name, industry);
                }
                None => {
                    warn!("Requested capability '{}' is not registered", name);
                }
            }
        }
        resolved
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, ColumnType, InMemoryDataset};

    fn context() -> AnalysisContext {
        AnalysisContext::new(
            IndustryProfile::general(0.0),
            Question::new("what happened?"),
        )
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = CapabilityRegistry::with_builtins();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("trend_analysis").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_resolve_follows_requested_order() {
        let registry = CapabilityRegistry::with_builtins();
        let requested = vec![
            "kpi_summary".to_string(),
            "data_profile".to_string(),
            "nonexistent".to_string(),
        ];

        let resolved = registry.resolve(Industry::Retail, &requested);
        let names: Vec<&str> = resolved.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["kpi_summary", "data_profile"]);
    }

    #[test]
    fn test_resolve_without_names_uses_registration_order() {
        let registry = CapabilityRegistry::with_builtins();
        let resolved = registry.resolve(Industry::General, &[]);
        assert_eq!(resolved.first().map(|c| c.name().to_string()).as_deref(), Some("data_profile"));
        assert_eq!(resolved.len(), 5);
    }

    #[test]
    fn test_context_alias_resolution() {
        let dataset = InMemoryDataset::new(
            vec![Column::new("product_category", ColumnType::Text)],
            vec![],
        )
        .unwrap();

        let mut ctx = context();
        assert_eq!(ctx.resolve_column(&dataset, "product_cat"), None);

        ctx.apply(&Correction::RenameColumn {
            from: "product_cat".to_string(),
            to: "product_category".to_string(),
        });
        assert_eq!(ctx.resolve_column(&dataset, "product_cat"), Some(0));
        // Direct names keep working.
        assert_eq!(ctx.resolve_column(&dataset, "product_category"), Some(0));
    }

    #[test]
    fn test_context_clamp() {
        let mut ctx = context();
        ctx.apply(&Correction::ClampRange {
            column: "score".to_string(),
            min: 0.0,
            max: 1.0,
        });
        assert_eq!(ctx.clamp("score", 3.0), 1.0);
        assert_eq!(ctx.clamp("score", -2.0), 0.0);
        assert_eq!(ctx.clamp("other", 3.0), 3.0);
    }

    #[test]
    fn test_applicability() {
        assert!(Applicability::All.applies_to(Industry::General));
        let only = Applicability::Only(vec![Industry::Retail, Industry::Saas]);
        assert!(only.applies_to(Industry::Retail));
        assert!(!only.applies_to(Industry::Finance));
    }
}
