//! Run context and provider traits
//!
//! These traits let the engine drive any cloud without depending on vendor
//! clients. Adapters are injected through [`Cloud`], render destinations
//! through [`Target`], and progress reporting through [`RunObserver`].

use crate::cancel::CancelToken;
use crate::error::{EngineError, TaskError};
use crate::render::RenderRegistry;
use crate::report::{RunReport, TaskReport};
use crate::resource::Resource;
use crate::task::TaskSet;
use crate::types::{ProviderId, TargetId, TaskKey, TaskPhase};
use std::any::Any;
use std::time::Duration;

/// Handle to a cloud provider adapter
///
/// Implementations share one adapter across every worker, so they must be
/// safe for concurrent use. Any serialization the vendor needs is the
/// adapter's job.
pub trait Cloud: Send + Sync {
    /// Vendor behind this adapter
    fn provider(&self) -> ProviderId;

    /// Region every task of the run is scoped to
    fn region(&self) -> &str;

    /// Access the concrete adapter, for task kinds that need vendor clients
    fn as_any(&self) -> &dyn Any;
}

/// Destination that renderers apply changes to
pub trait Target: Send + Sync {
    fn id(&self) -> TargetId;

    /// Cloud used to resolve actual state during this run
    fn cloud(&self) -> &dyn Cloud;

    fn as_any(&self) -> &dyn Any;
}

/// Everything a task sees while it resolves or renders
pub struct RunContext<'a> {
    /// Adapter used for lookups and mutations
    pub cloud: &'a dyn Cloud,
    /// Run-wide cancellation signal
    pub cancel: &'a CancelToken,
    /// Bound for a single long-running operation
    pub operation_timeout: Duration,
}

impl<'a> RunContext<'a> {
    pub fn new(cloud: &'a dyn Cloud, cancel: &'a CancelToken, operation_timeout: Duration) -> Self {
        Self {
            cloud,
            cancel,
            operation_timeout,
        }
    }

    /// Token that trips on run cancellation or after `operation_timeout`
    pub fn operation_token(&self) -> CancelToken {
        self.cancel.tightened(self.operation_timeout)
    }

    /// Poll a long-running operation until it reports a terminal value
    ///
    /// `poll` returns `Ok(None)` while the operation is still running. The
    /// wait ends with `DeadlineExceeded` once `operation_timeout` elapses,
    /// or `Cancelled` when the run itself is cancelled.
    pub fn wait_for<T>(
        &self,
        operation: &str,
        interval: Duration,
        mut poll: impl FnMut() -> Result<Option<T>, TaskError>,
    ) -> Result<T, TaskError> {
        let token = self.operation_token();
        loop {
            self.cancel.check()?;
            if token.is_cancelled() {
                return Err(TaskError::DeadlineExceeded {
                    operation: operation.to_string(),
                });
            }
            if let Some(value) = poll()? {
                return Ok(value);
            }
            log::trace!("{operation} still running, next poll in {interval:?}");
            if token.sleep(interval).is_err() {
                self.cancel.check()?;
                return Err(TaskError::DeadlineExceeded {
                    operation: operation.to_string(),
                });
            }
        }
    }
}

/// Context handed to a task for one convergence pass
pub struct ApplyEnv<'a> {
    pub ctx: RunContext<'a>,
    pub target: &'a dyn Target,
    pub renderers: &'a RenderRegistry,
    /// Stop after validation and report the would-be action
    pub dry_run: bool,
}

/// Producer of tasks from cluster configuration
pub trait ModelBuilder {
    /// Name used in error messages
    fn name(&self) -> &'static str;

    /// Add this builder's tasks to the shared context
    fn build(&self, ctx: &mut ModelBuilderContext) -> anyhow::Result<()>;
}

/// Shared collection every model builder adds its tasks to
#[derive(Default)]
pub struct ModelBuilderContext {
    tasks: TaskSet,
}

impl ModelBuilderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; a second task with the same identity is an error
    pub fn add_task<R: Resource>(&mut self, task: R) -> Result<(), EngineError> {
        self.tasks.insert(task)
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn into_tasks(self) -> TaskSet {
        self.tasks
    }
}

/// Run every builder against one shared context
pub fn build_model(builders: &[&dyn ModelBuilder]) -> Result<TaskSet, EngineError> {
    let mut ctx = ModelBuilderContext::new();
    for builder in builders {
        builder.build(&mut ctx).map_err(|e| match e.downcast::<EngineError>() {
            Ok(engine) => engine,
            Err(other) => EngineError::Build {
                builder: builder.name().to_string(),
                message: format!("{other:#}"),
            },
        })?;
        log::debug!(
            "model builder {} done, {} task(s) so far",
            builder.name(),
            ctx.tasks().len()
        );
    }
    Ok(ctx.into_tasks())
}

/// Progress callback for engine runs
///
/// Callbacks are invoked from the scheduler thread only.
pub trait RunObserver: Send {
    /// Called once the graph is built, before any task starts
    fn on_run_start(&mut self, total: usize);

    /// Called when a task moves to a new phase
    fn on_phase(&mut self, key: &TaskKey, phase: TaskPhase);

    /// Called when a task reaches a terminal status
    fn on_task_complete(&mut self, report: &TaskReport);

    /// Called after the last task finished
    fn on_run_complete(&mut self, report: &RunReport);
}

/// No-op observer
pub struct NoObserver;

impl RunObserver for NoObserver {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_phase(&mut self, _key: &TaskKey, _phase: TaskPhase) {}
    fn on_task_complete(&mut self, _report: &TaskReport) {}
    fn on_run_complete(&mut self, _report: &RunReport) {}
}
