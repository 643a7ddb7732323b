//! # Reconcile
//!
//! A task-graph reconciliation engine.
//!
//! Each piece of infrastructure is a typed task carrying its desired state.
//! The engine builds a dependency graph over the tasks, discovers the actual
//! state of each resource, validates the delta, and applies only what
//! changed, in dependency order, with bounded concurrency.
//!
//! ## Core Concepts
//!
//! - **Resource**: a typed task kind (identity, dependencies, find, diff)
//! - **Field**: three-state desired attribute (unset, cleared, set)
//! - **TaskGraph**: acyclic depends-on graph over a task set
//! - **Renderer**: apply routine per (kind, target)
//! - **Engine**: schedules resolve → validate → apply per task
//! - **RunReport**: terminal status and structured error per task
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{CancelToken, Engine, EngineOptions, NoObserver, RenderRegistry, TaskSet};
//!
//! let mut tasks = TaskSet::new();
//! tasks.insert(resource_group)?;
//! tasks.insert(disk)?;
//!
//! let mut renderers = RenderRegistry::new();
//! renderers.register::<Disk, _>(API, DiskApi);
//!
//! let engine = Engine::new(EngineOptions::default(), renderers);
//! let report = engine.run(&tasks, target, &CancelToken::new(), &mut NoObserver)?;
//! report.ensure_success()?;
//! ```
//!
//! ## Provider Traits
//!
//! The engine never builds vendor clients. Callers inject:
//!
//! - [`Cloud`]: provider adapter handle, shared by every worker
//! - [`Target`]: render destination (live API, plan printer, ...)
//! - [`RunObserver`]: receives phase transitions and results
//! - [`ModelBuilder`]: produces tasks from configuration

pub mod cancel;
pub mod changes;
pub mod context;
pub mod converge;
pub mod error;
pub mod executor;
pub mod field;
pub mod graph;
pub mod lifecycle;
pub mod lock;
pub mod render;
pub mod report;
pub mod resolve;
pub mod resource;
pub mod retry;
pub mod task;
pub mod types;
pub mod validate;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use cancel::CancelToken;
pub use changes::{ChangeSet, Delta};
pub use context::{
    ApplyEnv, Cloud, ModelBuilder, ModelBuilderContext, NoObserver, RunContext, RunObserver,
    Target, build_model,
};
pub use converge::TaskOutcome;
pub use error::{EngineError, ErrorCategory, TaskError};
pub use executor::Engine;
pub use field::Field;
pub use graph::TaskGraph;
pub use lock::KeyedLocks;
pub use render::{RenderRegistry, Renderer};
pub use report::{RunReport, RunSummary, TaskReport};
pub use resource::Resource;
pub use retry::{LogRetry, RetryCallback, RetryConfig, Retryable, with_retry};
pub use task::{Task, TaskHandle, TaskSet};
pub use types::{EngineOptions, Lifecycle, ProviderId, TargetId, TaskKey, TaskPhase, TaskStatus};
