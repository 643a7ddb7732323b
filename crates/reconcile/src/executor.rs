//! Execution engine - converges a task graph with bounded parallelism
//!
//! Tasks are dispatched to a rayon pool the moment their last dependency is
//! done. Workers report back over a channel; the scheduler loop is the only
//! place task records are mutated.

use crate::cancel::CancelToken;
use crate::context::{ApplyEnv, RunContext, RunObserver, Target};
use crate::converge::TaskOutcome;
use crate::error::{EngineError, TaskError};
use crate::graph::TaskGraph;
use crate::render::RenderRegistry;
use crate::report::{RunReport, TaskReport};
use crate::task::{TaskHandle, TaskSet};
use crate::types::{EngineOptions, TaskKey, TaskPhase, TaskStatus};
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use rayon::ThreadPool;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the scheduler wakes to check cancellation when idle
const TICK: Duration = Duration::from_millis(25);

/// Reconciliation engine
///
/// Holds no state between runs: every run resolves actual state from
/// scratch, so re-running after a failure continues where it stopped.
pub struct Engine {
    options: EngineOptions,
    renderers: Arc<RenderRegistry>,
}

impl Engine {
    pub fn new(options: EngineOptions, renderers: RenderRegistry) -> Self {
        Self {
            options,
            renderers: Arc::new(renderers),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn renderers(&self) -> &RenderRegistry {
        &self.renderers
    }

    /// Converge `tasks` on `target`
    ///
    /// Graph errors and cancellation before the first task return `Err`
    /// without touching the cloud. Otherwise the report lists every task;
    /// use [`RunReport::ensure_success`] to turn failures into an error.
    pub fn run(
        &self,
        tasks: &TaskSet,
        target: Arc<dyn Target>,
        cancel: &CancelToken,
        observer: &mut dyn RunObserver,
    ) -> Result<RunReport, EngineError> {
        let graph = TaskGraph::build(tasks)?;

        let cancel = match self.options.deadline {
            Some(deadline) => cancel.tightened(deadline),
            None => cancel.clone(),
        };
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let jobs = self.options.jobs.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("reconcile-{i}"))
            .build()
            .map_err(|e| EngineError::Pool(e.to_string()))?;

        log::info!(
            "converging {} task(s) on {} with {} worker(s){}",
            tasks.len(),
            target.id(),
            jobs,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let started_at = Utc::now();
        observer.on_run_start(tasks.len());

        let (sender, receiver) = unbounded();
        let mut scheduler = Scheduler {
            engine: self,
            graph: &graph,
            tasks: tasks.iter().cloned().collect(),
            target: Arc::clone(&target),
            cancel,
            observer: &mut *observer,
            records: Vec::new(),
            ready: VecDeque::new(),
            in_flight: 0,
            jobs,
            sender,
            receiver,
        };
        let cancelled = scheduler.run(&pool);
        let reports = scheduler.into_reports();

        let report = RunReport::new(
            target.id().to_string(),
            self.options.dry_run,
            cancelled,
            started_at,
            reports,
        );
        let summary = report.summary;
        log::info!(
            "run finished: {} created, {} updated, {} unchanged, {} failed, {} skipped",
            summary.created,
            summary.updated,
            summary.unchanged,
            summary.failed,
            summary.skipped
        );
        observer.on_run_complete(&report);
        Ok(report)
    }
}

enum Event {
    Phase(usize, TaskPhase),
    Finished(usize, Result<TaskOutcome, TaskError>),
    /// Worker saw cancellation before resolving
    NotStarted(usize),
}

struct Record {
    phase: TaskPhase,
    /// Dependencies not yet done
    remaining: usize,
    dispatched_at: Option<Instant>,
    report: Option<TaskReport>,
}

struct Scheduler<'a> {
    engine: &'a Engine,
    graph: &'a TaskGraph,
    tasks: Vec<TaskHandle>,
    target: Arc<dyn Target>,
    cancel: CancelToken,
    observer: &'a mut dyn RunObserver,
    records: Vec<Record>,
    ready: VecDeque<usize>,
    in_flight: usize,
    jobs: usize,
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl Scheduler<'_> {
    /// Drive the run to completion; returns whether cancellation was seen
    fn run(&mut self, pool: &ThreadPool) -> bool {
        self.records = (0..self.tasks.len())
            .map(|i| Record {
                phase: TaskPhase::Pending,
                remaining: self.graph.dependencies_of(i).len(),
                dispatched_at: None,
                report: None,
            })
            .collect();
        for i in 0..self.tasks.len() {
            if self.records[i].remaining == 0 {
                self.mark_ready(i);
            }
        }

        let grace = self.engine.options.grace;
        let mut cancelled_at: Option<Instant> = None;

        loop {
            if cancelled_at.is_none() && self.cancel.is_cancelled() {
                log::warn!(
                    "run cancelled; {} task(s) in flight get {:?} to finish",
                    self.in_flight,
                    grace
                );
                cancelled_at = Some(Instant::now());
                self.skip_unstarted();
            }

            match cancelled_at {
                Some(at) if at.elapsed() >= grace => break,
                Some(_) => {}
                None => {
                    while self.in_flight < self.jobs {
                        let Some(i) = self.ready.pop_front() else {
                            break;
                        };
                        self.dispatch(pool, i);
                    }
                }
            }

            if self.in_flight == 0 {
                break;
            }

            match self.receiver.recv_timeout(TICK) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.abandon_in_flight();
        self.skip_unstarted();
        cancelled_at.is_some()
    }

    fn key(&self, i: usize) -> TaskKey {
        self.graph.key(i).clone()
    }

    fn set_phase(&mut self, i: usize, phase: TaskPhase) {
        self.records[i].phase = phase;
        let key = self.key(i);
        log::debug!("{key}: {phase}");
        self.observer.on_phase(&key, phase);
    }

    fn mark_ready(&mut self, i: usize) {
        self.set_phase(i, TaskPhase::Ready);
        self.ready.push_back(i);
    }

    fn dispatch(&mut self, pool: &ThreadPool, i: usize) {
        self.records[i].dispatched_at = Some(Instant::now());
        self.in_flight += 1;

        let job = Job {
            index: i,
            task: Arc::clone(&self.tasks[i]),
            target: Arc::clone(&self.target),
            renderers: Arc::clone(&self.engine.renderers),
            cancel: self.cancel.clone(),
            operation_timeout: self.engine.options.operation_timeout,
            dry_run: self.engine.options.dry_run,
            sender: self.sender.clone(),
        };
        pool.spawn(move || job.run());
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Phase(i, phase) => {
                if !self.records[i].phase.is_terminal() {
                    self.set_phase(i, phase);
                }
            }
            Event::NotStarted(i) => {
                self.in_flight -= 1;
                if !self.records[i].phase.is_terminal() {
                    self.finish(i, TaskReport::skipped(self.key(i), TaskPhase::Ready, None));
                }
            }
            Event::Finished(i, result) => {
                self.in_flight -= 1;
                if self.records[i].phase.is_terminal() {
                    return;
                }
                let duration_ms = self.elapsed_ms(i);
                let phase = self.records[i].phase;
                match result {
                    Ok(outcome) => self.succeed(i, phase, outcome, duration_ms),
                    Err(err) => self.fail(i, phase, err, duration_ms),
                }
            }
        }
    }

    fn elapsed_ms(&self, i: usize) -> u64 {
        self.records[i]
            .dispatched_at
            .map_or(0, |at| at.elapsed().as_millis() as u64)
    }

    fn succeed(&mut self, i: usize, phase: TaskPhase, outcome: TaskOutcome, duration_ms: u64) {
        let key = self.key(i);
        log::debug!("{key} {} in {duration_ms}ms", outcome.status);
        self.finish(
            i,
            TaskReport {
                key,
                status: outcome.status,
                phase,
                changed_fields: outcome.changed_fields,
                warnings: outcome.warnings,
                error: None,
                error_category: None,
                retryable: false,
                blocked_by: None,
                duration_ms,
            },
        );

        for dependent in self.graph.dependents_of(i) {
            let record = &mut self.records[dependent];
            record.remaining = record.remaining.saturating_sub(1);
            if record.remaining == 0 && record.phase == TaskPhase::Pending {
                self.mark_ready(dependent);
            }
        }
    }

    fn fail(&mut self, i: usize, phase: TaskPhase, err: TaskError, duration_ms: u64) {
        let key = self.key(i);
        log::warn!("{key} failed while {phase}: {err}");
        self.finish(i, TaskReport::failed(key.clone(), phase, err, duration_ms));

        // Everything downstream is skipped without being resolved
        let mut queue: VecDeque<usize> = self.graph.dependents_of(i).into();
        while let Some(dependent) = queue.pop_front() {
            if self.records[dependent].phase != TaskPhase::Pending {
                continue;
            }
            log::debug!("{} skipped: depends on failed {key}", self.key(dependent));
            self.finish(
                dependent,
                TaskReport::skipped(self.key(dependent), TaskPhase::Pending, Some(key.clone())),
            );
            queue.extend(self.graph.dependents_of(dependent));
        }
    }

    fn finish(&mut self, i: usize, report: TaskReport) {
        let terminal = match report.status {
            TaskStatus::Failed => TaskPhase::Failed,
            TaskStatus::Skipped => TaskPhase::Skipped,
            _ => TaskPhase::Done,
        };
        self.set_phase(i, terminal);
        self.observer.on_task_complete(&report);
        self.records[i].report = Some(report);
    }

    /// Skip every task that has not been handed to a worker
    fn skip_unstarted(&mut self) {
        self.ready.clear();
        for i in 0..self.records.len() {
            let record = &self.records[i];
            let unstarted = matches!(record.phase, TaskPhase::Pending | TaskPhase::Ready)
                && record.dispatched_at.is_none();
            if unstarted {
                let phase = record.phase;
                self.finish(i, TaskReport::skipped(self.key(i), phase, None));
            }
        }
    }

    /// Fail tasks still running once the grace period is over
    fn abandon_in_flight(&mut self) {
        for i in 0..self.records.len() {
            let record = &self.records[i];
            if record.dispatched_at.is_some() && !record.phase.is_terminal() {
                let phase = record.phase;
                let duration_ms = self.elapsed_ms(i);
                let err = TaskError::Cancelled {
                    reason: "grace period elapsed while in flight".to_string(),
                };
                log::warn!("{} abandoned while {phase}", self.key(i));
                self.finish(i, TaskReport::failed(self.key(i), phase, err, duration_ms));
            }
        }
    }

    fn into_reports(self) -> Vec<TaskReport> {
        self.records
            .into_iter()
            .filter_map(|record| record.report)
            .collect()
    }
}

/// One task handed to a worker thread
struct Job {
    index: usize,
    task: TaskHandle,
    target: Arc<dyn Target>,
    renderers: Arc<RenderRegistry>,
    cancel: CancelToken,
    operation_timeout: Duration,
    dry_run: bool,
    sender: Sender<Event>,
}

impl Job {
    fn run(self) {
        // Send errors mean the scheduler already gave up on this run
        if self.cancel.is_cancelled() {
            let _ = self.sender.send(Event::NotStarted(self.index));
            return;
        }

        let env = ApplyEnv {
            ctx: RunContext::new(self.target.cloud(), &self.cancel, self.operation_timeout),
            target: self.target.as_ref(),
            renderers: &self.renderers,
            dry_run: self.dry_run,
        };
        let index = self.index;
        let phases = self.sender.clone();
        let mut on_phase = |phase| {
            let _ = phases.send(Event::Phase(index, phase));
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.task.converge(&env, &mut on_phase)
        }))
        .unwrap_or_else(|payload| {
            Err(TaskError::provider(format!(
                "task panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

        let _ = self.sender.send(Event::Finished(index, result));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
