//! Refresh Task Poller
//!
//! Tracks a backend refresh job by querying its status on a fixed interval
//! until it succeeds, fails, exceeds the poll budget or stops answering.
//! The step logic lives in `PollTracker`; `spawn_poller` drives it from a
//! tokio interval, publishes progress on a watch channel and dispatches one
//! notice when polling ends.

use crate::api::types::{RefreshTask, TaskResult, TaskStatus};
use crate::api::CollectionApi;
use crate::config::PollSettings;
use crate::error::{AppError, Result};
use crate::services::notifier::{Notice, Notifier};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const TIMED_OUT_MESSAGE: &str = "Task timed out, refresh later to see the result";
pub const UNREACHABLE_MESSAGE: &str = "Failed to query task status";
pub const SLOW_TASK_MESSAGE: &str = "Task is taking too long, refresh later to see the result";
/// Shortest accepted polling period
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);
const RUNNING_MESSAGE: &str = "Updating...";
const COMPLETED_MESSAGE: &str = "Update complete";
const FAILED_MESSAGE: &str = "Update failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Success,
    Exception,
    Warning,
}

/// Progress of the tracked refresh as shown to the operator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    pub percentage: u32,
    pub status: Option<ProgressStatus>,
    pub message: String,
}

impl Progress {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// How polling ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    Succeeded { message: String, task: RefreshTask },
    Failed { message: String },
    TimedOut { polls: u32 },
    Unreachable { message: String, errors: u32 },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            PollOutcome::Succeeded { message, .. }
            | PollOutcome::Failed { message }
            | PollOutcome::Unreachable { message, .. } => message,
            PollOutcome::TimedOut { .. } => TIMED_OUT_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PollPhase {
    Polling { polls: u32, consecutive_errors: u32 },
    Finished { outcome: PollOutcome },
}

/// Poll state machine, free of timers and I/O
#[derive(Debug, Clone)]
pub struct PollTracker {
    settings: PollSettings,
    progress: Progress,
    phase: PollPhase,
}

impl PollTracker {
    pub fn new(settings: PollSettings, progress: Progress) -> Self {
        Self {
            settings,
            progress,
            phase: PollPhase::Polling {
                polls: 0,
                consecutive_errors: 0,
            },
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn phase(&self) -> &PollPhase {
        &self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, PollPhase::Finished { .. })
    }

    /// Count one timer tick. Returns the outcome when the poll budget is
    /// exhausted, in which case no status request should be made.
    pub fn begin_tick(&mut self) -> Option<PollOutcome> {
        let PollPhase::Polling { polls, .. } = &mut self.phase else {
            return self.outcome();
        };
        *polls += 1;
        let polls = *polls;

        if polls > self.settings.max_polls {
            self.progress.status = Some(ProgressStatus::Warning);
            self.progress.message = TIMED_OUT_MESSAGE.to_string();
            return Some(self.finish(PollOutcome::TimedOut { polls: polls - 1 }));
        }
        None
    }

    /// Apply a status response
    pub fn observe(&mut self, task: &RefreshTask) -> Option<PollOutcome> {
        let PollPhase::Polling { consecutive_errors, .. } = &mut self.phase else {
            return self.outcome();
        };
        *consecutive_errors = 0;

        if let (Some(progress), Some(total)) = (task.progress, task.total) {
            if total > 0.0 {
                self.progress.percentage = (progress / total * 100.0).round() as u32;
            }
        }
        self.progress.message = running_message(task);

        if task.status.is_success() {
            let message = completion_message(task);
            self.progress.status = Some(ProgressStatus::Success);
            self.progress.percentage = 100;
            self.progress.message = message.clone();
            return Some(self.finish(PollOutcome::Succeeded {
                message,
                task: task.clone(),
            }));
        }

        if task.status == TaskStatus::Failed {
            let message = first_text(&[&task.error, &task.message]).unwrap_or(FAILED_MESSAGE);
            let message = message.to_string();
            self.progress.status = Some(ProgressStatus::Exception);
            self.progress.message = message.clone();
            return Some(self.finish(PollOutcome::Failed { message }));
        }

        None
    }

    /// Apply a failed status request
    pub fn observe_error(&mut self, err: &AppError) -> Option<PollOutcome> {
        let PollPhase::Polling { consecutive_errors, .. } = &mut self.phase else {
            return self.outcome();
        };
        *consecutive_errors += 1;
        let errors = *consecutive_errors;
        debug!("Task status query failed ({} in a row): {}", errors, err);

        if errors >= self.settings.max_consecutive_errors {
            self.progress.status = Some(ProgressStatus::Exception);
            self.progress.message = UNREACHABLE_MESSAGE.to_string();
            return Some(self.finish(PollOutcome::Unreachable {
                message: UNREACHABLE_MESSAGE.to_string(),
                errors,
            }));
        }
        None
    }

    fn finish(&mut self, outcome: PollOutcome) -> PollOutcome {
        self.phase = PollPhase::Finished {
            outcome: outcome.clone(),
        };
        outcome
    }

    fn outcome(&self) -> Option<PollOutcome> {
        match &self.phase {
            PollPhase::Finished { outcome } => Some(outcome.clone()),
            PollPhase::Polling { .. } => None,
        }
    }
}

fn first_text<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| Option::as_deref(*c))
        .find(|s| !s.is_empty())
}

/// Message while the job is still running
pub fn running_message(task: &RefreshTask) -> String {
    let parts = task
        .result
        .as_ref()
        .map(|result| result_parts(result, false))
        .unwrap_or_default();
    if !parts.is_empty() {
        return parts.join(", ");
    }
    first_text(&[&task.message])
        .unwrap_or(RUNNING_MESSAGE)
        .to_string()
}

/// Message once the job has completed
pub fn completion_message(task: &RefreshTask) -> String {
    let parts = task
        .result
        .as_ref()
        .map(|result| result_parts(result, true))
        .unwrap_or_default();
    if !parts.is_empty() {
        return parts.join(", ");
    }
    first_text(&[&task.message])
        .unwrap_or(COMPLETED_MESSAGE)
        .to_string()
}

fn result_parts(result: &TaskResult, completed: bool) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(processed) = result.processed {
        parts.push(format!("Processed {} tasks", processed));
    }
    if let Some(success) = result.success {
        parts.push(format!("{} succeeded", success));
    }
    if let Some(failed) = result.failed.filter(|n| *n > 0) {
        parts.push(format!("{} failed", failed));
    }
    if let Some(rows) = result.fetched_rows.filter(|n| *n > 0) {
        parts.push(format!("Fetched {} rows", group_thousands(rows)));
    }
    if let Some(rows) = result.saved_rows.filter(|n| *n > 0) {
        parts.push(format!("Saved {} rows", group_thousands(rows)));
    }
    if completed {
        if let Some(inserted) = result.inserted {
            parts.push(format!(
                "Saved {} records (inserted + updated)",
                group_thousands(inserted)
            ));
        }
        if let Some(saved) = result.saved.filter(|n| *n > 0) {
            parts.push(format!("Saved {} records", saved));
        }
    }
    if let Some(funds) = result.saved_fund_count.filter(|n| *n > 0) {
        parts.push(format!("Saved {} funds", funds));
    }
    parts
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Operator notice for how polling ended
pub fn outcome_notice(outcome: &PollOutcome) -> Notice {
    match outcome {
        PollOutcome::Succeeded { message, .. } => Notice::success(message.clone()),
        PollOutcome::Failed { message } | PollOutcome::Unreachable { message, .. } => {
            Notice::error(message.clone())
        }
        PollOutcome::TimedOut { .. } => Notice::warning(SLOW_TASK_MESSAGE),
    }
}

/// Handle of a running poller. Dropping it stops the poller.
pub struct PollHandle {
    task_id: String,
    join: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_active(&self) -> bool {
        self.join.as_ref().map_or(false, |j| !j.is_finished())
    }

    /// Wait for the poller to reach a terminal condition
    pub async fn wait(mut self) -> Result<PollOutcome> {
        let join = self
            .join
            .take()
            .ok_or_else(|| AppError::Internal("Poller already stopped".to_string()))?;
        join.await
            .map_err(|e| AppError::Internal(format!("Poller task ended abnormally: {}", e)))
    }

    /// Stop polling. The backend job keeps running.
    pub fn cancel(&mut self) {
        if let Some(join) = self.join.take() {
            info!("Stopping poller for task {}", self.task_id);
            join.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start polling `task_id` of `collection` on the current runtime.
///
/// The first status query happens one interval after the call. Intervals
/// below `MIN_INTERVAL` are raised to it. The terminal notice goes to
/// `notifier` even when nobody waits on the handle.
pub fn spawn_poller(
    api: Arc<dyn CollectionApi>,
    collection: String,
    task_id: String,
    settings: PollSettings,
    progress: Arc<watch::Sender<Progress>>,
    notifier: Arc<dyn Notifier>,
) -> PollHandle {
    let id = task_id.clone();
    let join = tokio::spawn(async move {
        let outcome = run_poller(api, &collection, &task_id, settings, progress.as_ref()).await;
        notifier.notify(outcome_notice(&outcome));
        outcome
    });
    PollHandle {
        task_id: id,
        join: Some(join),
    }
}

async fn run_poller(
    api: Arc<dyn CollectionApi>,
    collection: &str,
    task_id: &str,
    settings: PollSettings,
    progress: &watch::Sender<Progress>,
) -> PollOutcome {
    let period = Duration::from_millis(settings.interval_ms).max(MIN_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tracker = PollTracker::new(settings, progress.borrow().clone());
    info!("Polling {} task {} every {:?}", collection, task_id, period);

    loop {
        ticker.tick().await;

        if let Some(outcome) = tracker.begin_tick() {
            warn!("{} task {} timed out", collection, task_id);
            progress.send_replace(tracker.progress().clone());
            return outcome;
        }

        let step = match api.task_status(collection, task_id).await {
            Ok(task) => {
                debug!("{} task {}: {:?}", collection, task_id, task.status);
                tracker.observe(&task)
            }
            Err(e) => {
                warn!("{} task {} status query failed: {}", collection, task_id, e);
                tracker.observe_error(&e)
            }
        };
        progress.send_replace(tracker.progress().clone());

        if let Some(outcome) = step {
            info!("{} task {} finished: {}", collection, task_id, outcome.message());
            return outcome;
        }
    }
}
