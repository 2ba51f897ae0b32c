//! Industry classification.
//!
//! This module scores a dataset and question against known industry
//! signatures and produces an [`IndustryProfile`]. Pattern memory is
//! consulted read-only for detection bias; writes happen elsewhere, as
//! explicit feedback after a successful job.

use crate::dataset::{ColumnType, Dataset, Question};
use crate::memory::{detection_signature, shape_fingerprint, PatternMemory};
use crate::models::{Industry, IndustryProfile};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Cap on pseudo-indicators contributed by a detection-bias record.
const MAX_BIAS_INDICATORS: u64 = 2;

struct IndustrySignature {
    industry: Industry,
    question_keywords: &'static [&'static str],
    column_tokens: &'static [&'static str],
    suggested: &'static [&'static str],
}

const SIGNATURES: &[IndustrySignature] = &[
    IndustrySignature {
        industry: Industry::Retail,
        question_keywords: &[
            "sales", "store", "inventory", "product", "retail", "merchandise", "shopper",
        ],
        column_tokens: &[
            "product", "store", "sales", "inventory", "category", "sku", "quantity",
        ],
        suggested: &["data_profile", "trend_analysis", "segmentation", "kpi_summary"],
    },
    IndustrySignature {
        industry: Industry::Ecommerce,
        question_keywords: &["cart", "checkout", "conversion", "online", "ecommerce", "funnel"],
        column_tokens: &["cart", "checkout", "session", "conversion", "order", "shipping"],
        suggested: &["data_profile", "trend_analysis", "segmentation", "kpi_summary"],
    },
    IndustrySignature {
        industry: Industry::Saas,
        question_keywords: &["churn", "subscription", "mrr", "arr", "saas", "retention"],
        column_tokens: &["mrr", "arr", "churn", "subscription", "plan", "seat", "trial"],
        suggested: &["data_profile", "kpi_summary", "trend_analysis", "correlation_scan"],
    },
    IndustrySignature {
        industry: Industry::Finance,
        question_keywords: &["loan", "portfolio", "risk", "investment", "interest", "credit"],
        column_tokens: &["balance", "interest", "loan", "portfolio", "account", "principal"],
        suggested: &["data_profile", "kpi_summary", "correlation_scan", "trend_analysis"],
    },
    IndustrySignature {
        industry: Industry::Manufacturing,
        question_keywords: &["production", "defect", "yield", "downtime", "manufacturing"],
        column_tokens: &["defect", "yield", "downtime", "machine", "batch", "plant", "units"],
        suggested: &["data_profile", "kpi_summary", "trend_analysis"],
    },
    IndustrySignature {
        industry: Industry::Healthcare,
        question_keywords: &["patient", "admission", "treatment", "clinical", "healthcare"],
        column_tokens: &["patient", "admission", "diagnosis", "treatment", "provider", "claim"],
        suggested: &["data_profile", "segmentation", "trend_analysis"],
    },
    IndustrySignature {
        industry: Industry::Hospitality,
        question_keywords: &["occupancy", "booking", "guest", "hotel", "reservation"],
        column_tokens: &["occupancy", "booking", "guest", "room", "reservation", "stay"],
        suggested: &["data_profile", "trend_analysis", "kpi_summary"],
    },
];

/// Analysis template inferred from the question wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionTemplate {
    Trend,
    Comparative,
    Correlation,
}

/// Scores datasets against industry signatures.
pub struct IndustryClassifier {
    memory: Arc<PatternMemory>,
}

impl IndustryClassifier {
    /// Creates a classifier reading bias from the given memory.
    pub fn new(memory: Arc<PatternMemory>) -> Self {
        Self { memory }
    }

    /// Classifies a dataset and question into an industry profile.
    ///
    /// Confidence is `1 - 0.5^n` over `n` matched indicators, so it is
    /// monotone in the number of matches and saturates below 1. If the
    /// best confidence is below `threshold` the profile downgrades to
    /// [`Industry::General`] carrying the same confidence value. Ties
    /// resolve toward the earlier industry in declaration order.
    pub fn classify(
        &self,
        dataset: &dyn Dataset,
        question: &Question,
        threshold: f64,
    ) -> IndustryProfile {
        let column_names: Vec<String> =
            dataset.columns().iter().map(|c| c.name.clone()).collect();
        let fingerprint = shape_fingerprint(&column_names);
        let bias = self.memory.bias_for(&detection_signature(&fingerprint));
        let keywords = question.keywords();

        let mut best: Option<(f64, IndustryProfile)> = None;

        for signature in SIGNATURES {
            let mut indicators = BTreeSet::new();

            for column in dataset.columns() {
                let name = column.name.to_lowercase();
                if signature.column_tokens.iter().any(|t| name.contains(t)) {
                    indicators.insert(format!("column:{}", column.name));
                }
            }

            for keyword in signature.question_keywords {
                if keywords.iter().any(|k| k == keyword) {
                    indicators.insert(format!("keyword:{}", keyword));
                }
            }

            // Value-shape signals only reinforce industries with at least
            // one direct match; they carry no signal on their own.
            if !indicators.is_empty() {
                if has_monetary_column(dataset) {
                    indicators.insert("shape:monetary".to_string());
                }
                if has_date_column(dataset) {
                    indicators.insert("shape:date".to_string());
                }
            }

            if let Some((biased_industry, weight)) = bias {
                if biased_industry == signature.industry {
                    for i in 0..weight.min(MAX_BIAS_INDICATORS) {
                        indicators.insert(format!("memory:confirmed_{}", i + 1));
                    }
                }
            }

            let confidence = confidence_for(indicators.len());
            debug!(
                "Industry {} scored {:.3} with {} indicator(s)",
                signature.industry,
                confidence,
                indicators.len()
            );

            let replace = match &best {
                Some((best_confidence, _)) => confidence > *best_confidence,
                None => true,
            };
            if replace {
                let profile = IndustryProfile {
                    industry: signature.industry,
                    confidence,
                    subtype: subtype_for(signature.industry, &keywords),
                    matched_indicators: indicators,
                    suggested_capabilities: suggested_for(signature, question),
                };
                best = Some((confidence, profile));
            }
        }

        let (confidence, profile) = match best {
            Some(found) => found,
            None => (0.0, IndustryProfile::general(0.0)),
        };

        if confidence < threshold {
            debug!(
                "Top confidence {:.3} below threshold {:.3}, falling back to general",
                confidence, threshold
            );
            return IndustryProfile::general(confidence);
        }

        profile
    }
}

fn confidence_for(matched: usize) -> f64 {
    1.0 - 0.5f64.powi(matched as i32)
}

fn has_monetary_column(dataset: &dyn Dataset) -> bool {
    dataset.columns().iter().any(|c| {
        c.ty == ColumnType::Number && {
            let name = c.name.to_lowercase();
            ["amount", "price", "revenue", "cost", "total", "sales", "fee"]
                .iter()
                .any(|t| name.contains(t))
        }
    })
}

fn has_date_column(dataset: &dyn Dataset) -> bool {
    dataset
        .columns()
        .iter()
        .any(|c| c.ty == ColumnType::Date || c.name.to_lowercase().contains("date"))
}

fn subtype_for(industry: Industry, keywords: &[String]) -> Option<String> {
    let has = |terms: &[&str]| keywords.iter().any(|k| terms.contains(&k.as_str()));

    match industry {
        Industry::Retail => {
            let online = has(&["online", "web", "ecommerce"]);
            let physical = has(&["store", "branch", "pos"]);
            match (online, physical) {
                (true, true) => Some("hybrid".to_string()),
                (true, false) => Some("online_retail".to_string()),
                (false, true) => Some("physical_retail".to_string()),
                (false, false) => None,
            }
        }
        Industry::Saas => {
            if has(&["enterprise", "b2b"]) {
                Some("b2b_saas".to_string())
            } else if has(&["consumer", "b2c"]) {
                Some("b2c_saas".to_string())
            } else if has(&["platform", "api"]) {
                Some("platform".to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn suggested_for(signature: &IndustrySignature, question: &Question) -> Vec<String> {
    let mut suggested: Vec<String> = signature.suggested.iter().map(|s| s.to_string()).collect();

    let promoted = match template_for(question) {
        Some(QuestionTemplate::Trend) => Some("trend_analysis"),
        Some(QuestionTemplate::Comparative) => Some("segmentation"),
        Some(QuestionTemplate::Correlation) => Some("correlation_scan"),
        None => None,
    };

    if let Some(name) = promoted {
        if let Some(pos) = suggested.iter().position(|s| s == name) {
            let capability = suggested.remove(pos);
            // data_profile stays first when present; the promoted
            // capability slots in right after it.
            let insert_at = usize::from(suggested.first().map(String::as_str) == Some("data_profile"));
            suggested.insert(insert_at, capability);
        } else {
            suggested.push(name.to_string());
        }
    }

    suggested
}

fn template_for(question: &Question) -> Option<QuestionTemplate> {
    let text = question.text.to_lowercase();
    if ["trend", "over time", "monthly", "weekly", "growth"]
        .iter()
        .any(|t| text.contains(t))
    {
        Some(QuestionTemplate::Trend)
    } else if ["compare", "versus", "by region", "by segment", "breakdown", "between"]
        .iter()
        .any(|t| text.contains(t))
    {
        Some(QuestionTemplate::Comparative)
    } else if ["correlat", "relationship", "related", "drives"]
        .iter()
        .any(|t| text.contains(t))
    {
        Some(QuestionTemplate::Correlation)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, InMemoryDataset};
    use crate::memory::PatternPayload;

    fn classifier() -> IndustryClassifier {
        IndustryClassifier::new(Arc::new(PatternMemory::default()))
    }

    fn dataset_with(columns: &[(&str, ColumnType)]) -> InMemoryDataset {
        let columns = columns
            .iter()
            .map(|(name, ty)| Column::new(*name, *ty))
            .collect();
        InMemoryDataset::new(columns, vec![]).unwrap()
    }

    #[test]
    fn test_retail_reference_scenario() {
        let dataset = dataset_with(&[
            ("product_category", ColumnType::Text),
            ("store_id", ColumnType::Text),
            ("sales_amount", ColumnType::Number),
            ("date", ColumnType::Date),
        ]);
        let question = Question::new("How are we doing?");

        let profile = classifier().classify(&dataset, &question, 0.5);

        assert_eq!(profile.industry, Industry::Retail);
        assert!(
            profile.confidence >= 0.9,
            "expected confidence >= 0.9, got {:.3}",
            profile.confidence
        );
    }

    #[test]
    fn test_confidence_monotone_in_matched_indicators() {
        let question = Question::new("show me the numbers");
        let c = classifier();

        let one = dataset_with(&[("store_id", ColumnType::Text)]);
        let two = dataset_with(&[
            ("store_id", ColumnType::Text),
            ("product_category", ColumnType::Text),
        ]);
        let three = dataset_with(&[
            ("store_id", ColumnType::Text),
            ("product_category", ColumnType::Text),
            ("inventory_level", ColumnType::Number),
        ]);

        let c1 = c.classify(&one, &question, 0.0).confidence;
        let c2 = c.classify(&two, &question, 0.0).confidence;
        let c3 = c.classify(&three, &question, 0.0).confidence;

        assert!(c1 <= c2);
        assert!(c2 <= c3);
        assert!(c3 > c1);
    }

    #[test]
    fn test_below_threshold_falls_back_to_general() {
        let dataset = dataset_with(&[("foo", ColumnType::Text), ("bar", ColumnType::Text)]);
        let question = Question::new("anything interesting?");

        let profile = classifier().classify(&dataset, &question, 0.5);

        assert_eq!(profile.industry, Industry::General);
        // The insufficient confidence is reported as-is.
        assert!(profile.confidence < 0.5);
    }

    #[test]
    fn test_detection_bias_raises_confidence() {
        let memory = Arc::new(PatternMemory::default());
        let dataset = dataset_with(&[("store_id", ColumnType::Text)]);
        let question = Question::new("show me the numbers");

        let unbiased = IndustryClassifier::new(Arc::clone(&memory))
            .classify(&dataset, &question, 0.0)
            .confidence;

        let fingerprint = shape_fingerprint(&["store_id".to_string()]);
        memory.upsert(
            &detection_signature(&fingerprint),
            PatternPayload::DetectionBias {
                industry: Industry::Retail,
            },
        );

        let biased = IndustryClassifier::new(memory)
            .classify(&dataset, &question, 0.0)
            .confidence;

        assert!(biased > unbiased);
    }

    #[test]
    fn test_question_keywords_count_as_indicators() {
        let dataset = dataset_with(&[("mrr", ColumnType::Number)]);
        let c = classifier();

        let plain = c
            .classify(&dataset, &Question::new("summarize this"), 0.0)
            .confidence;
        let keyed = c
            .classify(&dataset, &Question::new("what is our churn?"), 0.0)
            .confidence;

        assert!(keyed > plain);
    }

    #[test]
    fn test_subtype_from_question() {
        let dataset = dataset_with(&[
            ("store_id", ColumnType::Text),
            ("sales_amount", ColumnType::Number),
        ]);
        let question = Question::new("compare online sales to store sales");

        let profile = classifier().classify(&dataset, &question, 0.5);
        assert_eq!(profile.industry, Industry::Retail);
        assert_eq!(profile.subtype.as_deref(), Some("hybrid"));
    }

    #[test]
    fn test_trend_question_promotes_trend_analysis() {
        let dataset = dataset_with(&[
            ("store_id", ColumnType::Text),
            ("sales_amount", ColumnType::Number),
            ("date", ColumnType::Date),
        ]);
        let question = Question::new("what is the monthly sales trend?");

        let profile = classifier().classify(&dataset, &question, 0.5);
        assert_eq!(profile.suggested_capabilities[0], "data_profile");
        assert_eq!(profile.suggested_capabilities[1], "trend_analysis");
    }

    #[test]
    fn test_tie_breaks_toward_priority_order() {
        // No indicators match any industry: every score ties at zero and
        // the first declared industry wins before the threshold check.
        let dataset = dataset_with(&[("foo", ColumnType::Text)]);
        let question = Question::new("hello");

        let profile = classifier().classify(&dataset, &question, 0.0);
        assert_eq!(profile.industry, Industry::Retail);
        assert!(profile.confidence < f64::EPSILON);
    }
}
