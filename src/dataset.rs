//! Dataset and question abstractions.
//!
//! This module defines the caller-facing input types: a read-only tabular
//! `Dataset` with typed columns and restartable row access, and the
//! natural-language `Question` the caller wants answered.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Inferred type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Numeric values (integers and floats).
    Number,
    /// Free-form text.
    Text,
    /// Calendar dates.
    Date,
    /// Boolean values.
    Bool,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Number => write!(f, "number"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Bool => write!(f, "bool"),
        }
    }
}

/// A column descriptor: name plus inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within a dataset.
    pub name: String,
    /// Inferred value type.
    pub ty: ColumnType,
}

impl Column {
    /// Creates a column descriptor.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    Null,
}

impl Value {
    /// Returns the numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the date value, if this is a date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Whether this cell is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A restartable iterator over dataset rows.
///
/// Each row is a slice of values aligned with `Dataset::columns()`.
pub type RowIter<'a> = Box<dyn Iterator<Item = &'a [Value]> + 'a>;

/// Read-only tabular data consumed by an analysis job.
///
/// The caller owns the dataset; the orchestrator only borrows read access
/// for the duration of a job. Implementations must be `Send + Sync` so a
/// dataset can be shared with the job's task.
pub trait Dataset: Send + Sync {
    /// Ordered column descriptors. Names are unique.
    fn columns(&self) -> &[Column];

    /// A fresh iterator over all rows. Finite; may be called repeatedly.
    fn rows(&self) -> RowIter<'_>;

    /// Number of rows.
    fn row_count(&self) -> usize;

    /// Index of a column by exact name.
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name == name)
    }
}

/// An owned, fully materialized dataset.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl InMemoryDataset {
    /// Creates a dataset from columns and rows.
    ///
    /// Fails if column names are not unique or a row's width does not
    /// match the column count.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                bail!("Duplicate column name: {}", column.name);
            }
        }

        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                bail!(
                    "Row {} has {} values, expected {}",
                    idx,
                    row.len(),
                    columns.len()
                );
            }
        }

        Ok(Self { columns, rows })
    }
}

impl Dataset for InMemoryDataset {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn rows(&self) -> RowIter<'_> {
        Box::new(self.rows.iter().map(|r| r.as_slice()))
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Structured hints extracted from or supplied alongside a question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionHints {
    /// Preferred metric column name, if the caller knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    /// Preferred grouping dimension column name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    /// Explicitly requested capability names, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

/// The natural-language business question for a job.
///
/// Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// The question text.
    pub text: String,
    /// Optional structured hints.
    #[serde(default)]
    pub hints: QuestionHints,
}

impl Question {
    /// Creates a question with no hints.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hints: QuestionHints::default(),
        }
    }

    /// Attaches a metric column hint.
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.hints.metric = Some(metric.into());
        self
    }

    /// Attaches a grouping dimension hint.
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.hints.dimension = Some(dimension.into());
        self
    }

    /// Attaches an explicit capability request.
    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.hints.capabilities.push(name.into());
        self
    }

    /// Lowercased word tokens of the question text.
    pub fn keywords(&self) -> Vec<String> {
        self.text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_columns() -> Vec<Column> {
        vec![
            Column::new("region", ColumnType::Text),
            Column::new("sales_amount", ColumnType::Number),
        ]
    }

    #[test]
    fn test_dataset_rejects_duplicate_columns() {
        let columns = vec![
            Column::new("region", ColumnType::Text),
            Column::new("region", ColumnType::Number),
        ];
        let result = InMemoryDataset::new(columns, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dataset_rejects_ragged_rows() {
        let rows = vec![vec![Value::Text("north".to_string())]];
        let result = InMemoryDataset::new(sample_columns(), rows);
        assert!(result.is_err());
    }

    #[test]
    fn test_rows_are_restartable() {
        let rows = vec![
            vec![Value::Text("north".to_string()), Value::Number(100.0)],
            vec![Value::Text("south".to_string()), Value::Number(250.0)],
        ];
        let dataset = InMemoryDataset::new(sample_columns(), rows).unwrap();

        assert_eq!(dataset.rows().count(), 2);
        // A second call yields a fresh pass over the same rows.
        assert_eq!(dataset.rows().count(), 2);
        assert_eq!(dataset.row_count(), 2);
    }

    #[test]
    fn test_column_index() {
        let dataset = InMemoryDataset::new(sample_columns(), vec![]).unwrap();
        assert_eq!(dataset.column_index("sales_amount"), Some(1));
        assert_eq!(dataset.column_index("missing"), None);
    }

    #[test]
    fn test_question_keywords() {
        let question = Question::new("What were our monthly sales trends?");
        let keywords = question.keywords();
        assert!(keywords.contains(&"sales".to_string()));
        assert!(keywords.contains(&"trends".to_string()));
        assert!(!keywords.contains(&"What".to_string()));
    }

    #[test]
    fn test_question_hints_builder() {
        let question = Question::new("revenue by region")
            .with_metric("sales_amount")
            .with_dimension("region")
            .with_capability("trend_analysis");
        assert_eq!(question.hints.metric.as_deref(), Some("sales_amount"));
        assert_eq!(question.hints.dimension.as_deref(), Some("region"));
        assert_eq!(question.hints.capabilities, vec!["trend_analysis"]);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Number(3.5).as_number(), Some(3.5));
        assert_eq!(Value::Text("x".to_string()).as_text(), Some("x"));
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_number(), None);
    }
}
