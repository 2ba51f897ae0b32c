//! Built-in analysis capabilities.
//!
//! Five capabilities cover the common business questions: a dataset
//! profile, a time trend, a categorical breakdown, an industry-aware KPI
//! summary, and a numeric correlation scan. Each one resolves its column
//! references through the job's [`AnalysisContext`] so corrections from
//! the recovery loop take effect on retry.

use super::{AnalysisContext, Applicability, Capability, ColumnRole};
use crate::dataset::{ColumnType, Dataset, Value};
use crate::error::CapabilityFailure;
use crate::models::{Findings, Industry, Kpi, KpiStatus};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;

const MONETARY_TOKENS: &[&str] = &["amount", "price", "revenue", "cost", "total", "sales", "fee"];
const STRONG_CORRELATION: f64 = 0.7;
const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolves a column reference, distinguishing missing from ambiguous.
///
/// Exact and alias matches win. Otherwise substring candidates are only
/// used to detect ambiguity; a single near-miss is still reported as
/// missing so the advisor can propose an explicit mapping.
fn resolve_ref(
    capability: &str,
    dataset: &dyn Dataset,
    ctx: &AnalysisContext,
    name: &str,
) -> Result<usize, CapabilityFailure> {
    if let Some(idx) = ctx.resolve_column(dataset, name) {
        return Ok(idx);
    }

    let candidates: Vec<String> = dataset
        .columns()
        .iter()
        .filter(|c| c.name.contains(name))
        .map(|c| c.name.clone())
        .collect();

    if candidates.len() > 1 {
        Err(CapabilityFailure::ambiguous_column(capability, name, &candidates))
    } else {
        Err(CapabilityFailure::missing_column(capability, name))
    }
}

fn metric_column(
    capability: &str,
    dataset: &dyn Dataset,
    ctx: &AnalysisContext,
) -> Result<usize, CapabilityFailure> {
    if let Some(hint) = &ctx.question.hints.metric {
        let idx = resolve_ref(capability, dataset, ctx, hint)?;
        let column = &dataset.columns()[idx];
        return match column.ty {
            ColumnType::Number => Ok(idx),
            ColumnType::Text if ctx.coerces_to_number(&column.name) => Ok(idx),
            other => Err(CapabilityFailure::type_mismatch(
                capability,
                &column.name,
                "number",
                &other.to_string(),
            )),
        };
    }

    let numeric_at = |pred: &dyn Fn(&str) -> bool| {
        dataset
            .columns()
            .iter()
            .position(|c| c.ty == ColumnType::Number && pred(&c.name.to_lowercase()))
    };

    numeric_at(&|name| MONETARY_TOKENS.iter().any(|t| name.contains(t)))
        .or_else(|| numeric_at(&|_| true))
        .ok_or_else(|| CapabilityFailure {
            capability: capability.to_string(),
            kind: crate::error::FailureKind::MissingColumn,
            column: None,
            expected: Some("number".to_string()),
            actual: None,
            message: "No numeric metric column available".to_string(),
        })
}

fn dimension_column(
    capability: &str,
    dataset: &dyn Dataset,
    ctx: &AnalysisContext,
) -> Result<usize, CapabilityFailure> {
    if let Some(hint) = &ctx.question.hints.dimension {
        return resolve_ref(capability, dataset, ctx, hint);
    }

    dataset
        .columns()
        .iter()
        .position(|c| c.ty == ColumnType::Text)
        .ok_or_else(|| CapabilityFailure {
            capability: capability.to_string(),
            kind: crate::error::FailureKind::MissingColumn,
            column: None,
            expected: Some("text".to_string()),
            actual: None,
            message: "No categorical column available for grouping".to_string(),
        })
}

fn date_column(capability: &str, dataset: &dyn Dataset) -> Result<usize, CapabilityFailure> {
    dataset
        .columns()
        .iter()
        .position(|c| c.ty == ColumnType::Date)
        .or_else(|| {
            dataset
                .columns()
                .iter()
                .position(|c| c.ty == ColumnType::Text && c.name.to_lowercase().contains("date"))
        })
        .ok_or_else(|| CapabilityFailure {
            capability: capability.to_string(),
            kind: crate::error::FailureKind::MissingColumn,
            column: None,
            expected: Some("date".to_string()),
            actual: None,
            message: "No date column available".to_string(),
        })
}

fn parse_date(
    capability: &str,
    ctx: &AnalysisContext,
    column: &str,
    value: &Value,
) -> Result<Option<NaiveDate>, CapabilityFailure> {
    match value {
        Value::Date(d) => Ok(Some(*d)),
        Value::Text(s) => {
            let format = ctx.date_format(column).unwrap_or(FALLBACK_DATE_FORMAT);
            NaiveDate::parse_from_str(s, format)
                .map(Some)
                .map_err(|_| CapabilityFailure::malformed_date(capability, column, s))
        }
        Value::Null => Ok(None),
        other => Err(CapabilityFailure::malformed_date(
            capability,
            column,
            &format!("{:?}", other),
        )),
    }
}

fn numeric_value(ctx: &AnalysisContext, column: &str, value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(ctx.clamp(column, *n)),
        Value::Text(s) if ctx.coerces_to_number(column) => {
            s.trim().parse::<f64>().ok().map(|n| ctx.clamp(column, n))
        }
        _ => None,
    }
}

/// Row counts, column types, and null coverage.
pub struct DataProfile;

#[async_trait]
impl Capability for DataProfile {
    fn name(&self) -> &str {
        "data_profile"
    }

    fn industries(&self) -> Applicability {
        Applicability::All
    }

    fn required_roles(&self) -> &[ColumnRole] {
        &[]
    }

    async fn run(
        &self,
        dataset: &dyn Dataset,
        _ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure> {
        let columns = dataset.columns();
        let mut findings = Findings::default();

        findings.insights.push(format!(
            "Dataset has {} rows across {} columns",
            dataset.row_count(),
            columns.len()
        ));

        let count_of = |ty: ColumnType| columns.iter().filter(|c| c.ty == ty).count();
        findings.insights.push(format!(
            "Column types: {} numeric, {} text, {} date, {} boolean",
            count_of(ColumnType::Number),
            count_of(ColumnType::Text),
            count_of(ColumnType::Date),
            count_of(ColumnType::Bool),
        ));

        let mut null_counts = vec![0usize; columns.len()];
        for row in dataset.rows() {
            for (idx, value) in row.iter().enumerate() {
                if value.is_null() {
                    null_counts[idx] += 1;
                }
            }
        }

        let rows = dataset.row_count();
        if rows > 0 {
            for (idx, nulls) in null_counts.iter().enumerate() {
                let ratio = *nulls as f64 / rows as f64;
                if ratio > 0.2 {
                    findings.recommendations.push(format!(
                        "Address missing values in column '{}' ({:.0}% null)",
                        columns[idx].name,
                        ratio * 100.0
                    ));
                }
            }
        }

        Ok(findings)
    }
}

/// First-half vs second-half trend over a date column.
pub struct TrendAnalysis;

#[async_trait]
impl Capability for TrendAnalysis {
    fn name(&self) -> &str {
        "trend_analysis"
    }

    fn industries(&self) -> Applicability {
        Applicability::All
    }

    fn required_roles(&self) -> &[ColumnRole] {
        &[ColumnRole::Datetime, ColumnRole::NumericMetric]
    }

    async fn run(
        &self,
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure> {
        let date_idx = date_column(self.name(), dataset)?;
        let metric_idx = metric_column(self.name(), dataset, ctx)?;
        let date_name = dataset.columns()[date_idx].name.clone();
        let metric_name = dataset.columns()[metric_idx].name.clone();

        let mut series: Vec<(NaiveDate, f64)> = Vec::new();
        for row in dataset.rows() {
            let date = parse_date(self.name(), ctx, &date_name, &row[date_idx])?;
            let value = numeric_value(ctx, &metric_name, &row[metric_idx]);
            if let (Some(date), Some(value)) = (date, value) {
                series.push((date, value));
            }
        }

        let mut findings = Findings::default();
        if series.len() < 2 {
            findings
                .insights
                .push(format!("Not enough dated observations to trend '{}'", metric_name));
            return Ok(findings);
        }

        series.sort_by_key(|(date, _)| *date);
        let mid = series.len() / 2;
        let avg = |slice: &[(NaiveDate, f64)]| {
            slice.iter().map(|(_, v)| v).sum::<f64>() / slice.len() as f64
        };
        let first_half = avg(&series[..mid]);
        let second_half = avg(&series[mid..]);
        let overall = avg(&series);

        let span_days = (series[series.len() - 1].0 - series[0].0).num_days();
        findings.insights.push(format!(
            "Average {} was {:.2} across {} observations spanning {} days",
            metric_name,
            overall,
            series.len(),
            span_days
        ));

        if first_half.abs() > f64::EPSILON {
            let change = (second_half - first_half) / first_half.abs() * 100.0;
            let direction = if change > 1.0 {
                "upward"
            } else if change < -1.0 {
                "downward"
            } else {
                "flat"
            };
            findings.insights.push(format!(
                "{} trended {} over the period ({:+.1}% second half vs first half)",
                metric_name, direction, change
            ));

            if change < -1.0 {
                findings.recommendations.push(format!(
                    "Investigate the decline in '{}'; the second half of the period runs {:.1}% below the first",
                    metric_name,
                    change.abs()
                ));
            }
        }

        Ok(findings)
    }
}

/// Best and worst groups of a metric by a categorical column.
pub struct Segmentation;

#[async_trait]
impl Capability for Segmentation {
    fn name(&self) -> &str {
        "segmentation"
    }

    fn industries(&self) -> Applicability {
        Applicability::All
    }

    fn required_roles(&self) -> &[ColumnRole] {
        &[ColumnRole::CategoricalDimension, ColumnRole::NumericMetric]
    }

    async fn run(
        &self,
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure> {
        let dim_idx = dimension_column(self.name(), dataset, ctx)?;
        let metric_idx = metric_column(self.name(), dataset, ctx)?;
        let dim_name = dataset.columns()[dim_idx].name.clone();
        let metric_name = dataset.columns()[metric_idx].name.clone();

        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for row in dataset.rows() {
            let group = match row[dim_idx].as_text() {
                Some(text) => text.to_string(),
                None => continue,
            };
            if let Some(value) = numeric_value(ctx, &metric_name, &row[metric_idx]) {
                *totals.entry(group).or_insert(0.0) += value;
            }
        }

        let mut findings = Findings::default();
        if totals.is_empty() {
            findings.insights.push(format!(
                "No groupable observations for '{}' by '{}'",
                metric_name, dim_name
            ));
            return Ok(findings);
        }

        let best = totals
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));
        let worst = totals
            .iter()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let (Some((best_key, best_total)), Some((worst_key, worst_total))) = (best, worst) {
            findings.insights.push(format!(
                "Best performing {}: '{}' with total {} of {:.2}",
                dim_name, best_key, metric_name, best_total
            ));
            if best_key != worst_key {
                findings.insights.push(format!(
                    "Weakest {}: '{}' with total {} of {:.2}",
                    dim_name, worst_key, metric_name, worst_total
                ));
                findings.recommendations.push(format!(
                    "Investigate underperforming {} '{}'",
                    dim_name, worst_key
                ));
            }
        }

        findings
            .insights
            .push(format!("{} distinct {} groups analyzed", totals.len(), dim_name));

        Ok(findings)
    }
}

/// Totals, averages, and growth as status-tagged KPIs.
pub struct KpiSummary;

#[async_trait]
impl Capability for KpiSummary {
    fn name(&self) -> &str {
        "kpi_summary"
    }

    fn industries(&self) -> Applicability {
        Applicability::All
    }

    fn required_roles(&self) -> &[ColumnRole] {
        &[ColumnRole::NumericMetric]
    }

    async fn run(
        &self,
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure> {
        let metric_idx = metric_column(self.name(), dataset, ctx)?;
        let metric_name = dataset.columns()[metric_idx].name.clone();

        let values: Vec<f64> = dataset
            .rows()
            .filter_map(|row| numeric_value(ctx, &metric_name, &row[metric_idx]))
            .collect();

        let mut findings = Findings::default();
        if values.is_empty() {
            findings
                .insights
                .push(format!("No numeric observations in '{}'", metric_name));
            return Ok(findings);
        }

        let total: f64 = values.iter().sum();
        let average = total / values.len() as f64;

        findings.kpis.insert(
            format!("total_{}", metric_name),
            Kpi::new(total, KpiStatus::Good),
        );
        findings.kpis.insert(
            format!("average_{}", metric_name),
            Kpi::new(average, KpiStatus::Good),
        );

        if values.len() >= 2 {
            let mid = values.len() / 2;
            let first: f64 = values[..mid].iter().sum::<f64>() / mid.max(1) as f64;
            let second: f64 = values[mid..].iter().sum::<f64>() / (values.len() - mid) as f64;
            if first.abs() > f64::EPSILON {
                let growth = (second - first) / first.abs() * 100.0;
                let status = if growth >= 0.0 {
                    KpiStatus::Good
                } else if growth >= -10.0 {
                    KpiStatus::Warning
                } else {
                    KpiStatus::Critical
                };
                findings.kpis.insert(
                    "growth_pct".to_string(),
                    Kpi::formatted(growth, format!("{:+.1}%", growth), status),
                );
            }
        }

        findings.insights.push(format!(
            "Total {} of {:.2} across {} records (average {:.2})",
            metric_name,
            total,
            values.len(),
            average
        ));

        findings.recommendations.push(match ctx.profile.industry {
            Industry::Retail | Industry::Ecommerce => {
                "Plan inventory and staffing around the peaks highlighted by the sales KPIs"
                    .to_string()
            }
            Industry::Saas => {
                "Track the growth KPI against monthly churn cohorts".to_string()
            }
            Industry::Finance => {
                "Review negative-growth periods for portfolio exposure".to_string()
            }
            _ => "Monitor these KPIs on a recurring schedule".to_string(),
        });

        Ok(findings)
    }
}

/// Pairwise Pearson correlation over numeric columns.
pub struct CorrelationScan;

#[async_trait]
impl Capability for CorrelationScan {
    fn name(&self) -> &str {
        "correlation_scan"
    }

    fn industries(&self) -> Applicability {
        Applicability::All
    }

    fn required_roles(&self) -> &[ColumnRole] {
        &[ColumnRole::NumericMetric]
    }

    async fn run(
        &self,
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
    ) -> Result<Findings, CapabilityFailure> {
        let numeric: Vec<(usize, String)> = dataset
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.ty == ColumnType::Number)
            .map(|(idx, c)| (idx, c.name.clone()))
            .collect();

        let mut findings = Findings::default();
        if numeric.len() < 2 {
            findings
                .insights
                .push("Not enough numeric columns for a correlation scan".to_string());
            return Ok(findings);
        }

        let mut series: Vec<Vec<Option<f64>>> = vec![Vec::new(); numeric.len()];
        for row in dataset.rows() {
            for (slot, (idx, name)) in numeric.iter().enumerate() {
                series[slot].push(numeric_value(ctx, name, &row[*idx]));
            }
        }

        let mut strong = 0usize;
        for a in 0..numeric.len() {
            for b in (a + 1)..numeric.len() {
                let pairs: Vec<(f64, f64)> = series[a]
                    .iter()
                    .zip(series[b].iter())
                    .filter_map(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) => Some((*x, *y)),
                        _ => None,
                    })
                    .collect();

                if let Some(r) = pearson(&pairs) {
                    if r.abs() > STRONG_CORRELATION {
                        strong += 1;
                        let direction = if r > 0.0 { "positive" } else { "negative" };
                        findings.insights.push(format!(
                            "Strong {} correlation (r = {:.2}) between '{}' and '{}'",
                            direction, r, numeric[a].1, numeric[b].1
                        ));
                    }
                }
            }
        }

        if strong == 0 {
            findings
                .insights
                .push("No strong correlations between numeric columns".to_string());
        } else {
            findings.recommendations.push(
                "Validate the correlated column pairs before treating them as causal".to_string(),
            );
        }

        Ok(findings)
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }

    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, InMemoryDataset, Question};
    use crate::error::FailureKind;
    use crate::models::IndustryProfile;

    fn retail_dataset() -> InMemoryDataset {
        let columns = vec![
            Column::new("date", ColumnType::Date),
            Column::new("product_category", ColumnType::Text),
            Column::new("sales_amount", ColumnType::Number),
        ];
        let d = |day: u32| Value::Date(NaiveDate::from_ymd_opt(2025, 1, day).unwrap());
        let rows = vec![
            vec![d(1), Value::Text("toys".to_string()), Value::Number(100.0)],
            vec![d(2), Value::Text("games".to_string()), Value::Number(80.0)],
            vec![d(3), Value::Text("toys".to_string()), Value::Number(120.0)],
            vec![d(4), Value::Text("games".to_string()), Value::Number(160.0)],
        ];
        InMemoryDataset::new(columns, rows).unwrap()
    }

    fn ctx_for(question: Question) -> AnalysisContext {
        AnalysisContext::new(IndustryProfile::general(0.0), question)
    }

    #[tokio::test]
    async fn test_data_profile_reports_shape() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("profile this"));

        let findings = DataProfile.run(&dataset, &ctx).await.unwrap();
        assert!(findings.insights[0].contains("4 rows across 3 columns"));
    }

    #[tokio::test]
    async fn test_trend_analysis_detects_direction() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("sales trend"));

        let findings = TrendAnalysis.run(&dataset, &ctx).await.unwrap();
        assert!(findings
            .insights
            .iter()
            .any(|i| i.contains("trended upward")));
    }

    #[tokio::test]
    async fn test_trend_analysis_flags_malformed_text_dates() {
        let columns = vec![
            Column::new("order_date", ColumnType::Text),
            Column::new("sales_amount", ColumnType::Number),
        ];
        let rows = vec![vec![
            Value::Text("01/15/2025".to_string()),
            Value::Number(10.0),
        ]];
        let dataset = InMemoryDataset::new(columns, rows).unwrap();
        let ctx = ctx_for(Question::new("trend"));

        let failure = TrendAnalysis.run(&dataset, &ctx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::MalformedDate);
        assert_eq!(failure.column.as_deref(), Some("order_date"));
    }

    #[tokio::test]
    async fn test_segmentation_finds_best_and_worst() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("compare categories"));

        let findings = Segmentation.run(&dataset, &ctx).await.unwrap();
        assert!(findings
            .insights
            .iter()
            .any(|i| i.contains("Best performing product_category: 'games'")));
        assert!(findings
            .recommendations
            .iter()
            .any(|r| r.contains("'toys'")));
    }

    #[tokio::test]
    async fn test_hinted_missing_dimension_fails_structured() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("breakdown").with_dimension("product_cat"));

        let failure = Segmentation.run(&dataset, &ctx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::MissingColumn);
        assert_eq!(failure.column.as_deref(), Some("product_cat"));
    }

    #[tokio::test]
    async fn test_kpi_summary_computes_growth_status() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("how are sales"));

        let findings = KpiSummary.run(&dataset, &ctx).await.unwrap();
        assert!(findings.kpis.contains_key("total_sales_amount"));

        let growth = findings.kpis.get("growth_pct").unwrap();
        // Second half (120 + 160) outpaces the first (100 + 80).
        assert!(growth.value > 0.0);
        assert_eq!(growth.status, KpiStatus::Good);
    }

    #[tokio::test]
    async fn test_kpi_summary_type_mismatch_on_text_metric() {
        let dataset = retail_dataset();
        let ctx = ctx_for(Question::new("kpis").with_metric("product_category"));

        let failure = KpiSummary.run(&dataset, &ctx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::TypeMismatch);
        assert_eq!(failure.expected.as_deref(), Some("number"));
    }

    #[tokio::test]
    async fn test_correlation_scan_detects_strong_pair() {
        let columns = vec![
            Column::new("ad_spend", ColumnType::Number),
            Column::new("revenue", ColumnType::Number),
        ];
        let rows = (1..=6)
            .map(|i| {
                vec![
                    Value::Number(i as f64),
                    Value::Number(i as f64 * 2.0 + 1.0),
                ]
            })
            .collect();
        let dataset = InMemoryDataset::new(columns, rows).unwrap();
        let ctx = ctx_for(Question::new("what drives revenue"));

        let findings = CorrelationScan.run(&dataset, &ctx).await.unwrap();
        assert!(findings
            .insights
            .iter()
            .any(|i| i.contains("Strong positive correlation")));
    }

    #[test]
    fn test_pearson_rejects_constant_series() {
        let pairs: Vec<(f64, f64)> = (0..5).map(|i| (1.0, i as f64)).collect();
        assert_eq!(pearson(&pairs), None);
    }
}
