//! Run reports
//!
//! One entry per task, sorted by key. The report is the only output of a
//! run; nothing about it is persisted by the engine.

use crate::error::{EngineError, ErrorCategory, TaskError};
use crate::types::{TaskKey, TaskPhase, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Terminal state of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub key: TaskKey,
    pub status: TaskStatus,
    /// Last phase the task reached before its terminal state
    pub phase: TaskPhase,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    /// Whether re-running the same desired state may succeed
    pub retryable: bool,
    /// Failed dependency that caused a skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<TaskKey>,
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn skipped(key: TaskKey, phase: TaskPhase, blocked_by: Option<TaskKey>) -> Self {
        Self {
            key,
            status: TaskStatus::Skipped,
            phase,
            changed_fields: Vec::new(),
            warnings: Vec::new(),
            error: None,
            error_category: None,
            retryable: true,
            blocked_by,
            duration_ms: 0,
        }
    }

    pub fn failed(key: TaskKey, phase: TaskPhase, error: TaskError, duration_ms: u64) -> Self {
        let category = error.category();
        Self {
            key,
            status: TaskStatus::Failed,
            phase,
            changed_fields: Vec::new(),
            warnings: Vec::new(),
            error: Some(error),
            error_category: Some(category),
            retryable: category.rerun_may_help(),
            blocked_by: None,
            duration_ms,
        }
    }
}

/// Counts per terminal status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Created => self.created += 1,
            TaskStatus::Updated => self.updated += 1,
            TaskStatus::Unchanged => self.unchanged += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed + self.skipped
    }

    pub fn changes(&self) -> usize {
        self.created + self.updated
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Outcome of one engine run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Render target the run applied to
    pub target: String,
    pub dry_run: bool,
    /// Cancellation was observed during the run
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Assemble a report, sorting entries by key
    pub fn new(
        target: impl Into<String>,
        dry_run: bool,
        cancelled: bool,
        started_at: DateTime<Utc>,
        mut tasks: Vec<TaskReport>,
    ) -> Self {
        tasks.sort_by(|a, b| a.key.cmp(&b.key));
        let mut summary = RunSummary::default();
        for task in &tasks {
            summary.add(task.status);
        }
        Self {
            target: target.into(),
            dry_run,
            cancelled,
            started_at,
            finished_at: Utc::now(),
            summary,
            tasks,
        }
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskReport> {
        self.tasks
            .binary_search_by(|t| t.key.cmp(key))
            .ok()
            .map(|i| &self.tasks[i])
    }

    pub fn status_of(&self, key: &TaskKey) -> Option<TaskStatus> {
        self.get(key).map(|t| t.status)
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
    }

    pub fn keys_with(&self, status: TaskStatus) -> Vec<TaskKey> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.key.clone())
            .collect()
    }

    /// Turn a non-converged run into `PartialRunFailure`
    ///
    /// Changes that were applied stay applied.
    pub fn ensure_success(&self) -> Result<(), EngineError> {
        if self.is_success() {
            return Ok(());
        }
        Err(EngineError::PartialRunFailure {
            failed: self.keys_with(TaskStatus::Failed),
            skipped: self.keys_with(TaskStatus::Skipped),
        })
    }
}
