//! Capability pipeline execution.
//!
//! The runner executes capabilities in order against a read-only dataset,
//! short-circuiting on the first failure while preserving the findings
//! collected so far. Every capability await is bounded by the smaller of
//! the per-capability soft timeout and the time left to the job deadline.

use super::{AnalysisContext, Capability};
use crate::dataset::Dataset;
use crate::error::CapabilityFailure;
use crate::models::Findings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Outcome of one pipeline pass.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every capability completed; findings are merged in order.
    Completed(Findings),
    /// A capability failed; findings collected before it are preserved.
    Failed {
        partial: Findings,
        failure: CapabilityFailure,
    },
    /// The job deadline or a capability time bound expired.
    TimedOut { partial: Findings },
    /// Cancellation was observed; the in-flight capability was given a
    /// bounded grace period before being abandoned.
    Cancelled { partial: Findings },
}

/// Executes capability pipelines with timeout and cancellation bounds.
pub struct AnalysisRunner {
    soft_timeout: Duration,
    cancel_grace: Duration,
}

impl AnalysisRunner {
    /// Creates a runner with the given per-capability soft timeout and
    /// cancellation grace period.
    pub fn new(soft_timeout: Duration, cancel_grace: Duration) -> Self {
        Self {
            soft_timeout,
            cancel_grace,
        }
    }

    /// Runs `capabilities` in order until completion, failure, timeout,
    /// or cancellation.
    pub async fn execute(
        &self,
        capabilities: &[Arc<dyn Capability>],
        dataset: &dyn Dataset,
        ctx: &AnalysisContext,
        cancel: &mut watch::Receiver<bool>,
        deadline: Instant,
    ) -> RunOutcome {
        let mut partial = Findings::default();

        for capability in capabilities {
            if *cancel.borrow() {
                return RunOutcome::Cancelled { partial };
            }

            let now = Instant::now();
            if now >= deadline {
                return RunOutcome::TimedOut { partial };
            }
            let bound = self.soft_timeout.min(deadline - now);

            let fut = capability.run(dataset, ctx);
            tokio::pin!(fut);

            tokio::select! {
                result = timeout(bound, &mut fut) => match result {
                    Ok(Ok(findings)) => {
                        debug!("Capability '{}' completed", capability.name());
                        partial.merge(findings);
                    }
                    Ok(Err(failure)) => {
                        warn!("Capability '{}' failed: {}", capability.name(), failure);
                        return RunOutcome::Failed { partial, failure };
                    }
                    Err(_) => {
                        warn!(
                            "Capability '{}' exceeded its time bound of {:?}",
                            capability.name(),
                            bound
                        );
                        return RunOutcome::TimedOut { partial };
                    }
                },
                _ = wait_for_cancel(cancel) => {
                    debug!(
                        "Cancellation observed during '{}', granting {:?} grace",
                        capability.name(),
                        self.cancel_grace
                    );
                    if let Ok(Ok(findings)) = timeout(self.cancel_grace, &mut fut).await {
                        partial.merge(findings);
                    }
                    return RunOutcome::Cancelled { partial };
                }
            }
        }

        RunOutcome::Completed(partial)
    }
}

/// Resolves once the cancel flag turns true; pends forever otherwise.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone without a cancel; nothing left to observe.
            std::future::pending::<()>().await;
        }
    }
}
