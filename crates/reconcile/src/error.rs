//! Error types for the reconciliation engine.
//!
//! Task errors are attached to the task that produced them and categorized
//! so a run report can tell a caller whether re-running is likely to help.
//! Engine errors abort a run before any task starts.

use crate::types::{Lifecycle, TargetId, TaskKey};
use serde::Serialize;
use thiserror::Error;

/// Categories of task errors for retry logic and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Remote resource does not exist
    NotFound,
    /// Desired state touches a field that cannot change after creation
    Immutable,
    /// Throttling, timeouts, transient network faults (retryable)
    Transient,
    /// Caller lacks permissions for the operation
    Permission,
    /// Provider rejected the request because of conflicting state
    Conflict,
    /// Run was cancelled or a deadline elapsed
    Cancelled,
    /// Everything else; re-running without changes will not help
    Permanent,
}

impl ErrorCategory {
    /// Whether this category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether re-running the same desired state may succeed.
    pub fn rerun_may_help(&self) -> bool {
        matches!(self, Self::Transient | Self::Cancelled | Self::Conflict)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Immutable => "Immutable field changed",
            Self::Transient => "Transient provider error",
            Self::Permission => "Permission denied",
            Self::Conflict => "Conflicting remote state",
            Self::Cancelled => "Cancelled",
            Self::Permanent => "Provider error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Create the resource or change the lifecycle to sync",
            Self::Immutable => "Revert the field or recreate the resource under a new name",
            Self::Transient => "Re-run; completed tasks will be no-ops",
            Self::Permission => "Check the credentials and role assignments used for the run",
            Self::Conflict => "Wait for concurrent operations on the resource to finish, then re-run",
            Self::Cancelled => "Re-run with a longer timeout",
            Self::Permanent => "Check the error details for more information",
        }
    }
}

/// Errors attached to a single task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskError {
    /// Provider reported the resource as absent
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    /// Desired state changes fields that are immutable once created
    #[error("cannot change immutable field(s) of an existing resource: {}", .fields.join(", "))]
    ImmutableField { fields: Vec<String> },

    /// Transient provider failure (throttling, timeout, network)
    #[error("transient provider error: {message}")]
    Transient { message: String },

    /// Caller lacks permissions
    #[error("permission denied: {message}")]
    Permission { message: String },

    /// Provider rejected the request due to conflicting state
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Lifecycle requires an existing resource but none was found
    #[error("{key} does not exist and lifecycle {lifecycle} forbids creating it")]
    MissingResource { key: TaskKey, lifecycle: Lifecycle },

    /// Desired state cannot be rendered as requested
    #[error("invalid desired state: {message}")]
    InvalidDesired { message: String },

    /// No renderer registered for the (kind, target) pair
    #[error("no renderer registered for {kind} on target {target}")]
    NoRenderer { kind: String, target: TargetId },

    /// Long-running operation did not reach a terminal state in time
    #[error("{operation} did not finish before the deadline")]
    DeadlineExceeded { operation: String },

    /// Run was cancelled while this task was in flight
    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    /// Any other provider failure
    #[error("provider error: {message}")]
    Provider { message: String },
}

impl TaskError {
    /// Error for a single immutable field.
    pub fn immutable(field: impl Into<String>) -> Self {
        Self::ImmutableField {
            fields: vec![field.into()],
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDesired {
            message: message.into(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::ImmutableField { .. } => ErrorCategory::Immutable,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::DeadlineExceeded { .. } | Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::MissingResource { .. } => ErrorCategory::NotFound,
            Self::InvalidDesired { .. } | Self::NoRenderer { .. } | Self::Provider { .. } => {
                ErrorCategory::Permanent
            }
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Dependency graph is not acyclic
    #[error("dependency cycle between {}", join_keys(.members))]
    Cycle { members: Vec<TaskKey> },

    /// Two tasks share one identity
    #[error("duplicate task {0}")]
    DuplicateTask(TaskKey),

    /// A task named a dependency that is not part of the run
    #[error("{task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskKey, dependency: TaskKey },

    /// Some tasks failed or were skipped; applied changes are kept
    #[error(
        "run did not converge: {} failed, {} skipped",
        .failed.len(),
        .skipped.len()
    )]
    PartialRunFailure {
        failed: Vec<TaskKey>,
        skipped: Vec<TaskKey>,
    },

    /// Cancellation was requested before any task started
    #[error("run cancelled before any task started")]
    Cancelled,

    /// Worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    Pool(String),

    /// A model builder failed to produce its tasks
    #[error("model builder {builder} failed: {message}")]
    Build { builder: String, message: String },
}

fn join_keys(keys: &[TaskKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
