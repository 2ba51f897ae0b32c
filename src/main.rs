//! BizScope - self-correcting analysis orchestrator for tabular data
//!
//! A CLI tool that answers natural-language business questions about
//! tabular datasets, detecting the industry, running the matching
//! capabilities, and repairing common data problems automatically.
//!
//! Exit codes:
//!   0 - Job succeeded
//!   1 - Runtime error (config, dataset parsing, subscription failure)
//!   2 - Job finished without success (failed, timed out, or cancelled)

mod cli;
mod config;

use anyhow::{bail, Context, Result};
use bizscope::dataset::{Column, ColumnType, Dataset, InMemoryDataset, Question, Value};
use bizscope::memory::PatternMemory;
use bizscope::models::{AnalysisResult, JobState};
use bizscope::Orchestrator;
use chrono::NaiveDate;
use cli::Args;
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("BizScope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the analysis
    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .bizscope.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(".bizscope.toml");

    if path.exists() {
        eprintln!("⚠️  .bizscope.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .bizscope.toml")?;

    println!("✅ Created .bizscope.toml with default settings.");
    println!("   Edit it to customize attempts, timeouts, and memory.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Open the pattern memory, restoring a snapshot when one exists
    let memory = open_memory(&config)?;

    // Handle --memory-stats: report and exit
    if args.memory_stats {
        let stats = memory.stats();
        println!("🧠 Pattern memory statistics:");
        println!("   Records: {}", stats.records);
        println!("   Detection biases: {}", stats.detection_bias);
        println!("   Error fixes: {}", stats.error_fixes);
        return Ok(0);
    }

    let orchestrator = Orchestrator::with_builtins(Arc::clone(&memory));

    // Load the dataset
    let dataset: Arc<dyn Dataset> = if args.demo {
        println!("📦 Using the built-in retail demo dataset");
        Arc::new(demo_dataset()?)
    } else {
        let path = args
            .data
            .as_ref()
            .context("A dataset path is required unless --demo is set")?;
        println!("📦 Loading dataset: {}", path.display());
        Arc::new(load_dataset(path)?)
    };

    // Build the question with its hints
    let question_text = args
        .question
        .clone()
        .context("A question is required to run an analysis")?;
    let question = build_question(&question_text, &args);
    println!("❓ Question: {}", question.text);

    // Submit and follow progress
    let job_config = config.analysis.job_config();
    let job_id = orchestrator.submit(Arc::clone(&dataset), question, job_config);
    let mut stream = orchestrator
        .subscribe(job_id)
        .context("Failed to subscribe to job progress")?;

    let bar = make_progress_bar(args.quiet);
    while let Some(event) = stream.next_event().await {
        bar.set_position(event.percentage as u64);
        bar.set_message(format!("{}: {}", event.stage, event.message));
    }
    bar.finish_and_clear();

    let result = orchestrator
        .result(job_id)
        .context("Job finished without a result")?;

    // Emit the result
    if config.general.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    // Persist what the run learned
    if let Some(ref snapshot_path) = config.memory.snapshot_path {
        memory
            .save_snapshot(Path::new(snapshot_path))
            .with_context(|| format!("Failed to save memory snapshot to {}", snapshot_path))?;
        info!("Saved pattern memory snapshot to {}", snapshot_path);
    }

    if result.outcome == JobState::Succeeded {
        Ok(0)
    } else {
        Ok(2)
    }
}

/// Build the job question from the text and CLI hints.
fn build_question(text: &str, args: &Args) -> Question {
    let mut question = Question::new(text);
    if let Some(ref metric) = args.metric {
        question = question.with_metric(metric);
    }
    if let Some(ref dimension) = args.dimension {
        question = question.with_dimension(dimension);
    }
    if let Some(ref capabilities) = args.capabilities {
        for name in capabilities {
            question = question.with_capability(name);
        }
    }
    question
}

/// Create the job progress bar, hidden in quiet mode.
fn make_progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {wide_msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}

/// Print the human-readable result summary.
fn print_summary(result: &AnalysisResult) {
    println!("\n📊 Analysis result: {}", result.outcome);
    println!(
        "🧭 Industry: {} (confidence {:.2})",
        result.industry.industry, result.industry.confidence
    );
    if let Some(ref subtype) = result.industry.subtype {
        println!("   Subtype: {}", subtype);
    }

    if !result.insights.is_empty() {
        println!("\n💡 Insights:");
        for insight in &result.insights {
            println!("   - {}", insight);
        }
    }

    if !result.kpis.is_empty() {
        println!("\n📈 KPIs:");
        for (name, kpi) in &result.kpis {
            println!("   {} {}: {}", kpi.status.emoji(), name, kpi.formatted);
        }
    }

    if !result.recommendations.is_empty() {
        println!("\n🧭 Recommendations:");
        for recommendation in &result.recommendations {
            println!("   - {}", recommendation);
        }
    }

    if !result.auto_fixes_applied.is_empty() {
        println!("\n🔧 Auto-fixes applied:");
        for fix in &result.auto_fixes_applied {
            println!("   - {}", fix.description);
        }
    }

    if let Some(ref report) = result.failure {
        println!(
            "\n⛔ Failure after {} attempt(s): {}",
            report.attempts, report.failure
        );
    }

    match result.outcome {
        JobState::Succeeded => println!("\n✅ Analysis complete."),
        other => println!("\n⚠️  Job ended in {}.", other),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .bizscope.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// Open the pattern memory, restoring the configured snapshot if present.
fn open_memory(config: &Config) -> Result<Arc<PatternMemory>> {
    let capacity = config.memory.capacity;

    if let Some(ref snapshot_path) = config.memory.snapshot_path {
        let path = Path::new(snapshot_path);
        if path.exists() {
            info!("Restoring pattern memory from {}", snapshot_path);
            let memory = PatternMemory::load_snapshot(path, capacity)
                .with_context(|| format!("Failed to load memory snapshot: {}", snapshot_path))?;
            return Ok(Arc::new(memory));
        }
        debug!("No snapshot at {}, starting with empty memory", snapshot_path);
    }

    Ok(Arc::new(PatternMemory::with_capacity(capacity)))
}

/// On-disk shape of a dataset file.
#[derive(Debug, Deserialize)]
struct DatasetFile {
    columns: Vec<ColumnSpec>,
    rows: Vec<Vec<serde_json::Value>>,
}

/// On-disk shape of a column declaration.
#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

/// Load a dataset from a JSON file.
fn load_dataset(path: &Path) -> Result<InMemoryDataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file: {}", path.display()))?;
    let file: DatasetFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse dataset file: {}", path.display()))?;

    let mut columns = Vec::with_capacity(file.columns.len());
    for spec in &file.columns {
        let ty = match spec.ty.as_str() {
            "number" => ColumnType::Number,
            "text" => ColumnType::Text,
            "date" => ColumnType::Date,
            "bool" => ColumnType::Bool,
            other => bail!("Column '{}' has unknown type '{}'", spec.name, other),
        };
        columns.push(Column::new(spec.name.clone(), ty));
    }

    let mut rows = Vec::with_capacity(file.rows.len());
    for (row_idx, raw_row) in file.rows.into_iter().enumerate() {
        let mut row = Vec::with_capacity(raw_row.len());
        for (col_idx, raw) in raw_row.into_iter().enumerate() {
            let ty = columns.get(col_idx).map(|c| c.ty);
            let value = parse_value(raw, ty).with_context(|| {
                format!("Invalid value at row {}, column {}", row_idx, col_idx)
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    InMemoryDataset::new(columns, rows)
}

/// Convert a JSON cell into a dataset value.
///
/// Strings in date columns that do not parse as ISO dates are kept as
/// text so the correction loop can normalize them later.
fn parse_value(raw: serde_json::Value, ty: Option<ColumnType>) -> Result<Value> {
    let value = match raw {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            let n = n.as_f64().context("Number does not fit in f64")?;
            Value::Number(n)
        }
        serde_json::Value::String(s) => {
            if ty == Some(ColumnType::Date) {
                match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                    Ok(date) => Value::Date(date),
                    Err(_) => Value::Text(s),
                }
            } else {
                Value::Text(s)
            }
        }
        other => bail!("Unsupported cell value: {}", other),
    };
    Ok(value)
}

/// Build the bundled retail demo dataset.
fn demo_dataset() -> Result<InMemoryDataset> {
    let columns = vec![
        Column::new("date", ColumnType::Date),
        Column::new("product_category", ColumnType::Text),
        Column::new("store_id", ColumnType::Text),
        Column::new("sales_amount", ColumnType::Number),
        Column::new("units_sold", ColumnType::Number),
    ];

    let categories = ["toys", "games", "books"];
    let mut rows = Vec::new();
    for day in 1..=12u32 {
        let date = NaiveDate::from_ymd_opt(2025, 6, day).context("Invalid demo date")?;
        let category = categories[(day as usize - 1) % categories.len()];
        let store = format!("store_{}", (day % 3) + 1);
        let amount = 80.0 + (day as f64) * 12.5;
        let units = 4.0 + (day % 5) as f64;
        rows.push(vec![
            Value::Date(date),
            Value::Text(category.to_string()),
            Value::Text(store),
            Value::Number(amount),
            Value::Number(units),
        ]);
    }

    InMemoryDataset::new(columns, rows)
}
