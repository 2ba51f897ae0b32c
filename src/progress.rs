//! Per-job progress broadcasting.
//!
//! One bounded channel per job carries [`ProgressEvent`]s to a single
//! subscriber. Emission never blocks the job: when the subscriber lags
//! behind the channel capacity, new events are dropped. Within a job,
//! percentage is non-decreasing and timestamps are strictly increasing.

use crate::models::{JobId, JobState, ProgressEvent};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Buffered events per job before drop-on-full kicks in.
pub const CHANNEL_CAPACITY: usize = 64;

/// Single-subscriber stream of progress events for one job.
///
/// Ends when the job reaches a terminal state and its broadcaster is
/// dropped.
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl ProgressStream {
    /// Receives the next event, or `None` once the job is finished.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl futures::Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ProgressEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// Emits ordered progress events for one job.
pub struct ProgressBroadcaster {
    job_id: JobId,
    tx: mpsc::Sender<ProgressEvent>,
    attempt: u32,
    last_percentage: u8,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ProgressBroadcaster {
    /// Creates a broadcaster and its subscriber stream.
    pub fn channel(job_id: JobId) -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                job_id,
                tx,
                attempt: 1,
                last_percentage: 0,
                last_timestamp: None,
            },
            ProgressStream { rx },
        )
    }

    /// Sets the analysis attempt subsequent events belong to.
    pub fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    /// Emits a progress event.
    ///
    /// Percentage is clamped to never decrease within the job, and the
    /// timestamp is bumped past the previous event's when the clock has
    /// not advanced. A full channel drops the event instead of blocking.
    pub fn emit(&mut self, stage: JobState, percentage: u8, message: impl Into<String>) {
        let percentage = percentage.min(100).max(self.last_percentage);
        self.last_percentage = percentage;

        let mut timestamp = Utc::now();
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + ChronoDuration::microseconds(1);
            }
        }
        self.last_timestamp = Some(timestamp);

        let event = ProgressEvent {
            job_id: self.job_id,
            stage,
            percentage,
            message: message.into(),
            timestamp,
            attempt: self.attempt,
        };

        if let Err(err) = self.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("Progress channel full for job {}, dropping event", self.job_id);
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!("Progress subscriber gone for job {}", self.job_id);
                }
            }
        }
    }
}
