//! Core types for task-graph reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable identity of a task: its kind plus the name it is matched by
///
/// Two tasks with the same key describe the same remote resource, no
/// matter where they came from in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub kind: String,
    pub name: String,
}

impl TaskKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Which mutation classes a task is allowed to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Create when absent, update when drifted
    #[default]
    Sync,
    /// Create when absent; drift on an existing resource only warns
    WarnIfChanged,
    /// Never mutate; the resource must exist, drift only warns
    ExistsAndValidates,
    /// Like `Sync`, but permission failures downgrade to warnings
    WarnIfInsufficientAccess,
}

impl Lifecycle {
    /// Whether an absent resource may be created
    pub fn allows_create(&self) -> bool {
        !matches!(self, Self::ExistsAndValidates)
    }

    /// Whether an existing, drifted resource may be updated
    pub fn allows_update(&self) -> bool {
        matches!(self, Self::Sync | Self::WarnIfInsufficientAccess)
    }

    /// Whether permission errors are tolerated
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::WarnIfInsufficientAccess)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sync => "sync",
            Self::WarnIfChanged => "warn-if-changed",
            Self::ExistsAndValidates => "exists-and-validates",
            Self::WarnIfInsufficientAccess => "warn-if-insufficient-access",
        };
        f.write_str(name)
    }
}

/// Terminal result of one task in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Resource was absent and has been created
    Created,
    /// Resource existed and changed fields were applied
    Updated,
    /// Resource already matched (or the lifecycle forbade changing it)
    Unchanged,
    /// Resolution, validation or apply returned an error
    Failed,
    /// Never started: a dependency failed or the run was cancelled
    Skipped,
}

impl TaskStatus {
    /// Check if the status counts toward a successful run
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Unchanged)
    }

    /// Check if the status represents a mutation
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Position of a task in the per-run state machine
///
/// `Pending → Ready → Resolving → Validating → Applying → Done | Failed`,
/// with `Skipped` reachable from `Pending` and `Ready` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Ready,
    Resolving,
    Validating,
    Applying,
    Done,
    Failed,
    Skipped,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Whether a worker currently owns the task
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Resolving | Self::Validating | Self::Applying)
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Resolving => "resolving",
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Identifier of a render destination (live API, plan output, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TargetId(pub &'static str);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Identifier of a cloud vendor behind a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProviderId(pub &'static str);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Options for an engine run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of worker threads
    pub jobs: usize,
    /// Upper bound for a single long-running provider operation
    pub operation_timeout: Duration,
    /// How long in-flight tasks may keep running after cancellation
    pub grace: Duration,
    /// Upper bound for the whole run, measured from `Engine::run`
    pub deadline: Option<Duration>,
    /// Resolve and validate only; never dispatch a renderer
    pub dry_run: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            operation_timeout: Duration::from_secs(15 * 60),
            grace: Duration::from_secs(30),
            deadline: None,
            dry_run: false,
        }
    }
}
