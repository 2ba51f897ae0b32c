//! Job orchestration.
//!
//! The orchestrator owns the job table and drives every submitted job
//! through its lifecycle on a dedicated tokio task: industry detection,
//! capability execution, and the bounded self-correction loop. Findings
//! collected before a failure, timeout, or cancellation are preserved in
//! the terminal result.

use crate::advisor::{CorrectionSource, Diagnosis, ErrorAdvisor};
use crate::capability::runner::{AnalysisRunner, RunOutcome};
use crate::capability::{AnalysisContext, CapabilityRegistry};
use crate::classifier::IndustryClassifier;
use crate::dataset::{Dataset, Question};
use crate::error::{BizscopeError, Correction};
use crate::memory::{detection_signature, shape_fingerprint, PatternMemory, PatternPayload};
use crate::models::{
    AnalysisResult, AppliedFix, FailureReport, Findings, Industry, IndustryProfile, JobId,
    JobState,
};
use crate::progress::{ProgressBroadcaster, ProgressStream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on any single capability await.
pub const CAPABILITY_SOFT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an in-flight capability may keep running after a cancel.
pub const CANCEL_GRACE: Duration = Duration::from_millis(250);

/// Per-job tuning knobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Maximum analysis attempts, including the first.
    pub max_attempts: u32,
    /// Wall-clock deadline for the whole job, fixed at submission.
    pub timeout_seconds: u64,
    /// Minimum confidence for a specific industry to stick.
    pub detection_threshold: f64,
    /// Minimum confidence for a derived correction to be applied.
    pub correction_confidence_threshold: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_seconds: 300,
            detection_threshold: 0.5,
            correction_confidence_threshold: 0.6,
        }
    }
}

struct JobEntry {
    state: JobState,
    cancel: watch::Sender<bool>,
    stream: Option<ProgressStream>,
    result: Option<AnalysisResult>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submits, tracks, cancels, and finishes analysis jobs.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<CapabilityRegistry>,
    classifier: IndustryClassifier,
    advisor: ErrorAdvisor,
    memory: Arc<PatternMemory>,
    runner: AnalysisRunner,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    next_id: AtomicU64,
}

impl Orchestrator {
    /// Creates an orchestrator over the given registry and pattern memory.
    pub fn new(registry: Arc<CapabilityRegistry>, memory: Arc<PatternMemory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                classifier: IndustryClassifier::new(Arc::clone(&memory)),
                advisor: ErrorAdvisor::new(Arc::clone(&memory)),
                runner: AnalysisRunner::new(CAPABILITY_SOFT_TIMEOUT, CANCEL_GRACE),
                registry,
                memory,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Creates an orchestrator with the built-in capabilities registered.
    pub fn with_builtins(memory: Arc<PatternMemory>) -> Self {
        Self::new(Arc::new(CapabilityRegistry::with_builtins()), memory)
    }

    /// The shared pattern memory, for stats and snapshots.
    pub fn memory(&self) -> &Arc<PatternMemory> {
        &self.inner.memory
    }

    /// Submits a job and spawns its driving task.
    ///
    /// The deadline starts counting immediately. Must be called from
    /// within a tokio runtime.
    pub fn submit(
        &self,
        dataset: Arc<dyn Dataset>,
        question: Question,
        config: JobConfig,
    ) -> JobId {
        let job_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (broadcaster, stream) = ProgressBroadcaster::channel(job_id);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        lock(&self.inner.jobs).insert(
            job_id,
            JobEntry {
                state: JobState::Created,
                cancel: cancel_tx,
                stream: Some(stream),
                result: None,
            },
        );
        info!(
            "Submitted job {}: {} rows, {} columns, question '{}'",
            job_id,
            dataset.row_count(),
            dataset.columns().len(),
            question.text
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .run_job(job_id, dataset, question, config, broadcaster, cancel_rx)
                .await;
        });
        job_id
    }

    /// Takes the single progress subscription for a job.
    ///
    /// The stream ends when the job reaches a terminal state. A second
    /// call for the same job returns [`BizscopeError::SubscriberTaken`].
    pub fn subscribe(&self, job_id: JobId) -> Result<ProgressStream, BizscopeError> {
        let mut jobs = lock(&self.inner.jobs);
        let entry = jobs
            .get_mut(&job_id)
            .ok_or(BizscopeError::JobNotFound(job_id))?;
        entry
            .stream
            .take()
            .ok_or(BizscopeError::SubscriberTaken(job_id))
    }

    /// Current lifecycle state of a job.
    pub fn state(&self, job_id: JobId) -> Result<JobState, BizscopeError> {
        lock(&self.inner.jobs)
            .get(&job_id)
            .map(|entry| entry.state)
            .ok_or(BizscopeError::JobNotFound(job_id))
    }

    /// Terminal result of a job.
    ///
    /// Returns [`BizscopeError::JobNotTerminal`] while the job is still
    /// running.
    pub fn result(&self, job_id: JobId) -> Result<AnalysisResult, BizscopeError> {
        let jobs = lock(&self.inner.jobs);
        let entry = jobs.get(&job_id).ok_or(BizscopeError::JobNotFound(job_id))?;
        entry
            .result
            .clone()
            .ok_or(BizscopeError::JobNotTerminal(job_id))
    }

    /// Requests cancellation. A no-op for jobs already terminal.
    pub fn cancel(&self, job_id: JobId) -> Result<(), BizscopeError> {
        let jobs = lock(&self.inner.jobs);
        let entry = jobs.get(&job_id).ok_or(BizscopeError::JobNotFound(job_id))?;
        if !entry.state.is_terminal() {
            debug!("Cancellation requested for job {}", job_id);
            let _ = entry.cancel.send(true);
        }
        Ok(())
    }
}

impl Inner {
    fn set_state(&self, job_id: JobId, state: JobState) {
        debug!("Job {} entered {}", job_id, state);
        if let Some(entry) = lock(&self.jobs).get_mut(&job_id) {
            entry.state = state;
        }
    }

    fn finish(&self, job_id: JobId, result: AnalysisResult) {
        info!("Job {} finished in {}", job_id, result.outcome);
        if let Some(entry) = lock(&self.jobs).get_mut(&job_id) {
            entry.state = result.outcome;
            entry.result = Some(result);
        }
    }

    /// Feeds successful outcomes back into pattern memory.
    fn learn(
        &self,
        profile: &IndustryProfile,
        dataset: &dyn Dataset,
        applied: &[(String, Correction)],
    ) {
        if profile.industry != Industry::General {
            let column_names: Vec<String> =
                dataset.columns().iter().map(|c| c.name.clone()).collect();
            let signature = detection_signature(&shape_fingerprint(&column_names));
            self.memory.upsert(
                &signature,
                PatternPayload::DetectionBias {
                    industry: profile.industry,
                },
            );
        }
        for (signature, correction) in applied {
            self.advisor.record_success(signature, correction);
        }
    }

    async fn run_job(
        &self,
        job_id: JobId,
        dataset: Arc<dyn Dataset>,
        question: Question,
        config: JobConfig,
        mut progress: ProgressBroadcaster,
        mut cancel: watch::Receiver<bool>,
    ) {
        let deadline = Instant::now() + Duration::from_secs(config.timeout_seconds);
        progress.emit(JobState::Created, 0, "Job accepted");

        if *cancel.borrow() {
            progress.emit(JobState::Cancelled, 0, "Cancelled before detection");
            self.finish(
                job_id,
                build_result(
                    IndustryProfile::general(0.0),
                    Findings::default(),
                    Vec::new(),
                    JobState::Cancelled,
                    None,
                ),
            );
            return;
        }

        self.set_state(job_id, JobState::Detecting);
        progress.emit(JobState::Detecting, 5, "Detecting industry");
        let profile =
            self.classifier
                .classify(dataset.as_ref(), &question, config.detection_threshold);
        if profile.industry == Industry::General {
            let note = BizscopeError::DetectionAmbiguous {
                confidence: profile.confidence,
                threshold: config.detection_threshold,
            };
            debug!("Job {}: {}", job_id, note);
            progress.emit(
                JobState::Detecting,
                15,
                format!("{}; continuing with the general profile", note),
            );
        } else {
            progress.emit(
                JobState::Detecting,
                15,
                format!(
                    "Detected {} (confidence {:.2})",
                    profile.industry, profile.confidence
                ),
            );
        }

        // Explicit capability hints on the question override the
        // classifier's suggestions.
        let requested = if question.hints.capabilities.is_empty() {
            profile.suggested_capabilities.clone()
        } else {
            question.hints.capabilities.clone()
        };
        let capabilities = self.registry.resolve(profile.industry, &requested);
        if capabilities.is_empty() {
            warn!("Job {} resolved no applicable capabilities", job_id);
        }

        let mut ctx = AnalysisContext::new(profile.clone(), question);
        let mut fixes: Vec<AppliedFix> = Vec::new();
        let mut applied: Vec<(String, Correction)> = Vec::new();
        let mut attempt: u32 = 1;

        loop {
            self.set_state(job_id, JobState::Analyzing);
            progress.set_attempt(attempt);
            progress.emit(
                JobState::Analyzing,
                25,
                format!(
                    "Running {} capabilities (attempt {} of {})",
                    capabilities.len(),
                    attempt,
                    config.max_attempts
                ),
            );

            let outcome = self
                .runner
                .execute(&capabilities, dataset.as_ref(), &ctx, &mut cancel, deadline)
                .await;

            match outcome {
                RunOutcome::Completed(findings) => {
                    self.learn(&profile, dataset.as_ref(), &applied);
                    progress.emit(JobState::Succeeded, 100, "Analysis complete");
                    self.finish(
                        job_id,
                        build_result(profile, findings, fixes, JobState::Succeeded, None),
                    );
                    return;
                }
                RunOutcome::Failed { partial, failure } => {
                    if attempt >= config.max_attempts {
                        warn!(
                            "Job {} exhausted its {} attempt(s): {}",
                            job_id, config.max_attempts, failure
                        );
                        progress.emit(
                            JobState::Failed,
                            95,
                            format!("Giving up after {} attempts: {}", attempt, failure.message),
                        );
                        self.finish(
                            job_id,
                            build_result(
                                profile,
                                partial,
                                fixes,
                                JobState::Failed,
                                Some(FailureReport {
                                    failure,
                                    attempts: attempt,
                                }),
                            ),
                        );
                        return;
                    }

                    self.set_state(job_id, JobState::Recovering);
                    progress.emit(
                        JobState::Recovering,
                        60,
                        format!("Diagnosing failure: {}", failure.message),
                    );

                    match self.advisor.diagnose(
                        &failure,
                        dataset.as_ref(),
                        config.correction_confidence_threshold,
                    ) {
                        Diagnosis::Correction {
                            correction,
                            confidence,
                            source,
                        } => {
                            let signature = self.advisor.signature(&failure, dataset.as_ref());
                            info!(
                                "Job {} applying {} fix (confidence {:.2}): {}",
                                job_id,
                                match source {
                                    CorrectionSource::Cached => "cached",
                                    CorrectionSource::Derived => "derived",
                                },
                                confidence,
                                correction
                            );
                            ctx.apply(&correction);
                            fixes.push(AppliedFix {
                                signature: signature.clone(),
                                description: correction.to_string(),
                            });
                            applied.push((signature, correction));
                            attempt += 1;
                            progress.set_attempt(attempt);
                            progress.emit(
                                JobState::Recovering,
                                60,
                                format!(
                                    "Correction applied, retrying (attempt {} of {})",
                                    attempt, config.max_attempts
                                ),
                            );
                        }
                        Diagnosis::Unrecoverable { reason } => {
                            warn!("Job {} is unrecoverable: {}", job_id, reason);
                            progress.emit(JobState::Failed, 95, reason);
                            self.finish(
                                job_id,
                                build_result(
                                    profile,
                                    partial,
                                    fixes,
                                    JobState::Failed,
                                    Some(FailureReport {
                                        failure,
                                        attempts: attempt,
                                    }),
                                ),
                            );
                            return;
                        }
                    }
                }
                RunOutcome::TimedOut { partial } => {
                    warn!("Job {} hit its {}s deadline", job_id, config.timeout_seconds);
                    progress.emit(
                        JobState::TimedOut,
                        95,
                        format!("Deadline of {}s exceeded", config.timeout_seconds),
                    );
                    self.finish(
                        job_id,
                        build_result(profile, partial, fixes, JobState::TimedOut, None),
                    );
                    return;
                }
                RunOutcome::Cancelled { partial } => {
                    info!("Job {} cancelled", job_id);
                    progress.emit(JobState::Cancelled, 95, "Job cancelled");
                    self.finish(
                        job_id,
                        build_result(profile, partial, fixes, JobState::Cancelled, None),
                    );
                    return;
                }
            }
        }
    }
}

fn build_result(
    industry: IndustryProfile,
    findings: Findings,
    auto_fixes_applied: Vec<AppliedFix>,
    outcome: JobState,
    failure: Option<FailureReport>,
) -> AnalysisResult {
    AnalysisResult {
        industry,
        insights: findings.insights,
        recommendations: findings.recommendations,
        kpis: findings.kpis,
        auto_fixes_applied,
        outcome,
        failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Applicability, Capability, ColumnRole};
    use crate::dataset::{Column, ColumnType, InMemoryDataset, Value};
    use crate::error::CapabilityFailure;
    use crate::memory::failure_signature;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn retail_dataset() -> Arc<dyn Dataset> {
        let columns = vec![
            Column::new("date", ColumnType::Date),
            Column::new("product_category", ColumnType::Text),
            Column::new("store_id", ColumnType::Text),
            Column::new("sales_amount", ColumnType::Number),
        ];
        let d = |day: u32| Value::Date(NaiveDate::from_ymd_opt(2025, 3, day).unwrap());
        let t = |s: &str| Value::Text(s.to_string());
        let rows = vec![
            vec![d(1), t("toys"), t("s1"), Value::Number(100.0)],
            vec![d(2), t("games"), t("s1"), Value::Number(80.0)],
            vec![d(3), t("toys"), t("s2"), Value::Number(120.0)],
            vec![d(4), t("games"), t("s2"), Value::Number(160.0)],
        ];
        Arc::new(InMemoryDataset::new(columns, rows).unwrap())
    }

    fn column_names(dataset: &dyn Dataset) -> Vec<String> {
        dataset.columns().iter().map(|c| c.name.clone()).collect()
    }

    async fn wait_terminal(orchestrator: &Orchestrator, job_id: JobId) -> AnalysisResult {
        let mut stream = orchestrator.subscribe(job_id).unwrap();
        while stream.next_event().await.is_some() {}
        orchestrator.result(job_id).unwrap()
    }

    struct QuickCapability;

    #[async_trait]
    impl Capability for QuickCapability {
        fn name(&self) -> &str {
            "quick"
        }

        fn industries(&self) -> Applicability {
            Applicability::All
        }

        fn required_roles(&self) -> &[ColumnRole] {
            &[]
        }

        async fn run(
            &self,
            _dataset: &dyn Dataset,
            _ctx: &AnalysisContext,
        ) -> Result<Findings, CapabilityFailure> {
            Ok(Findings {
                insights: vec!["kept".to_string()],
                ..Findings::default()
            })
        }
    }

    struct AlwaysMissing;

    #[async_trait]
    impl Capability for AlwaysMissing {
        fn name(&self) -> &str {
            "always_missing"
        }

        fn industries(&self) -> Applicability {
            Applicability::All
        }

        fn required_roles(&self) -> &[ColumnRole] {
            &[ColumnRole::CategoricalDimension]
        }

        async fn run(
            &self,
            _dataset: &dyn Dataset,
            _ctx: &AnalysisContext,
        ) -> Result<Findings, CapabilityFailure> {
            Err(CapabilityFailure::missing_column("always_missing", "product_cat"))
        }
    }

    struct SlowCapability {
        delay: Duration,
    }

    #[async_trait]
    impl Capability for SlowCapability {
        fn name(&self) -> &str {
            "slow"
        }

        fn industries(&self) -> Applicability {
            Applicability::All
        }

        fn required_roles(&self) -> &[ColumnRole] {
            &[]
        }

        async fn run(
            &self,
            _dataset: &dyn Dataset,
            _ctx: &AnalysisContext,
        ) -> Result<Findings, CapabilityFailure> {
            tokio::time::sleep(self.delay).await;
            Ok(Findings::default())
        }
    }

    fn custom_orchestrator(capabilities: Vec<Arc<dyn Capability>>) -> Orchestrator {
        let mut registry = CapabilityRegistry::new();
        for capability in capabilities {
            registry.register(capability);
        }
        Orchestrator::new(
            Arc::new(registry),
            Arc::new(PatternMemory::with_capacity(64)),
        )
    }

    #[tokio::test]
    async fn test_job_succeeds_end_to_end() {
        let orchestrator = Orchestrator::with_builtins(Arc::new(PatternMemory::with_capacity(64)));
        let job_id = orchestrator.submit(
            retail_dataset(),
            Question::new("How are sales trending?"),
            JobConfig::default(),
        );

        let mut stream = orchestrator.subscribe(job_id).unwrap();
        let mut stages = Vec::new();
        while let Some(event) = stream.next_event().await {
            stages.push(event.stage);
        }

        let result = orchestrator.result(job_id).unwrap();
        assert_eq!(result.outcome, JobState::Succeeded);
        assert_eq!(result.industry.industry, Industry::Retail);
        assert!(result.industry.confidence >= 0.9);
        assert!(result.auto_fixes_applied.is_empty());
        assert!(result.failure.is_none());
        assert!(!result.insights.is_empty());
        assert!(result.kpis.contains_key("total_sales_amount"));

        assert!(stages.contains(&JobState::Detecting));
        assert!(stages.contains(&JobState::Analyzing));
        assert_eq!(stages.last(), Some(&JobState::Succeeded));
        assert_eq!(orchestrator.state(job_id).unwrap(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_success_records_detection_bias() {
        let memory = Arc::new(PatternMemory::with_capacity(64));
        let orchestrator = Orchestrator::with_builtins(Arc::clone(&memory));
        let dataset = retail_dataset();
        let job_id = orchestrator.submit(
            Arc::clone(&dataset),
            Question::new("sales by store"),
            JobConfig::default(),
        );
        let result = wait_terminal(&orchestrator, job_id).await;
        assert_eq!(result.outcome, JobState::Succeeded);

        let signature = detection_signature(&shape_fingerprint(&column_names(dataset.as_ref())));
        assert_eq!(memory.bias_for(&signature), Some((Industry::Retail, 1)));
    }

    #[tokio::test]
    async fn test_recovery_renames_near_miss_column() {
        let orchestrator = Orchestrator::with_builtins(Arc::new(PatternMemory::with_capacity(64)));
        let question = Question::new("sales by product category").with_dimension("product_cat");
        let job_id = orchestrator.submit(retail_dataset(), question, JobConfig::default());

        let result = wait_terminal(&orchestrator, job_id).await;
        assert_eq!(result.outcome, JobState::Succeeded);
        assert_eq!(result.auto_fixes_applied.len(), 1);
        assert!(result.auto_fixes_applied[0].description.contains("'product_cat'"));
        assert!(result.auto_fixes_applied[0]
            .description
            .contains("'product_category'"));
    }

    #[tokio::test]
    async fn test_cached_fix_reused_across_jobs() {
        let memory = Arc::new(PatternMemory::with_capacity(64));
        let orchestrator = Orchestrator::with_builtins(Arc::clone(&memory));
        let dataset = retail_dataset();
        let question = || Question::new("sales by category").with_dimension("product_cat");

        let first = orchestrator.submit(Arc::clone(&dataset), question(), JobConfig::default());
        assert_eq!(wait_terminal(&orchestrator, first).await.outcome, JobState::Succeeded);

        let second = orchestrator.submit(Arc::clone(&dataset), question(), JobConfig::default());
        let result = wait_terminal(&orchestrator, second).await;
        assert_eq!(result.outcome, JobState::Succeeded);
        assert_eq!(result.auto_fixes_applied.len(), 1);

        let signature = failure_signature(
            "missing_column",
            Some("product_cat"),
            &shape_fingerprint(&column_names(dataset.as_ref())),
        );
        let record = memory.lookup(&signature).unwrap();
        assert_eq!(record.occurrence_count, 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_fail_with_fix_chain() {
        let orchestrator = custom_orchestrator(vec![
            Arc::new(QuickCapability),
            Arc::new(AlwaysMissing),
        ]);
        let question = Question::new("sales by category")
            .with_capability("quick")
            .with_capability("always_missing");
        let config = JobConfig::default();

        let job_id = orchestrator.submit(retail_dataset(), question, config.clone());
        let result = wait_terminal(&orchestrator, job_id).await;

        assert_eq!(result.outcome, JobState::Failed);
        let report = result.failure.expect("failed job carries a report");
        assert_eq!(report.attempts, config.max_attempts);
        assert_eq!(report.failure.column.as_deref(), Some("product_cat"));
        assert_eq!(
            result.auto_fixes_applied.len(),
            (config.max_attempts - 1) as usize
        );
        // Findings from the capabilities before the failing one survive.
        assert_eq!(result.insights, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_stops_early() {
        // No similar column exists, so the advisor cannot propose a rename.
        let columns = vec![Column::new("zzz", ColumnType::Number)];
        let rows = vec![vec![Value::Number(1.0)]];
        let dataset: Arc<dyn Dataset> =
            Arc::new(InMemoryDataset::new(columns, rows).unwrap());

        let orchestrator = custom_orchestrator(vec![Arc::new(AlwaysMissing)]);
        let question = Question::new("anything").with_capability("always_missing");
        let job_id = orchestrator.submit(dataset, question, JobConfig::default());

        let result = wait_terminal(&orchestrator, job_id).await;
        assert_eq!(result.outcome, JobState::Failed);
        assert!(result.auto_fixes_applied.is_empty());
        assert_eq!(result.failure.unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_preserves_partial_findings() {
        let orchestrator = custom_orchestrator(vec![
            Arc::new(QuickCapability),
            Arc::new(SlowCapability {
                delay: Duration::from_secs(600),
            }),
        ]);
        let question = Question::new("anything")
            .with_capability("quick")
            .with_capability("slow");
        let config = JobConfig {
            timeout_seconds: 1,
            ..JobConfig::default()
        };

        let job_id = orchestrator.submit(retail_dataset(), question, config);
        let result = wait_terminal(&orchestrator, job_id).await;

        assert_eq!(result.outcome, JobState::TimedOut);
        assert_eq!(result.insights, vec!["kept"]);
        assert!(result.failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_analysis() {
        let orchestrator = custom_orchestrator(vec![
            Arc::new(QuickCapability),
            Arc::new(SlowCapability {
                delay: Duration::from_secs(60),
            }),
        ]);
        let question = Question::new("anything")
            .with_capability("quick")
            .with_capability("slow");
        let job_id = orchestrator.submit(retail_dataset(), question, JobConfig::default());

        let mut stream = orchestrator.subscribe(job_id).unwrap();
        while let Some(event) = stream.next_event().await {
            if event.stage == JobState::Analyzing {
                break;
            }
        }
        orchestrator.cancel(job_id).unwrap();
        while stream.next_event().await.is_some() {}

        let result = orchestrator.result(job_id).unwrap();
        assert_eq!(result.outcome, JobState::Cancelled);
        assert_eq!(result.insights, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_unknown_job_errors() {
        let orchestrator = Orchestrator::with_builtins(Arc::new(PatternMemory::with_capacity(16)));
        assert!(matches!(
            orchestrator.result(99),
            Err(BizscopeError::JobNotFound(99))
        ));
        assert!(matches!(
            orchestrator.subscribe(99),
            Err(BizscopeError::JobNotFound(99))
        ));
        assert!(matches!(
            orchestrator.cancel(99),
            Err(BizscopeError::JobNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_result_before_terminal_and_double_subscribe() {
        let orchestrator = custom_orchestrator(vec![Arc::new(SlowCapability {
            delay: Duration::from_secs(60),
        })]);
        let question = Question::new("anything").with_capability("slow");
        let job_id = orchestrator.submit(retail_dataset(), question, JobConfig::default());

        let _stream = orchestrator.subscribe(job_id).unwrap();
        assert!(matches!(
            orchestrator.subscribe(job_id),
            Err(BizscopeError::SubscriberTaken(_))
        ));
        assert!(matches!(
            orchestrator.result(job_id),
            Err(BizscopeError::JobNotTerminal(_))
        ));

        orchestrator.cancel(job_id).unwrap();
    }
}
