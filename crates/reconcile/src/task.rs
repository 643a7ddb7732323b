//! Type-erased tasks and the task set
//!
//! The scheduler works on `dyn Task` so one run can mix resource kinds.
//! Every [`Resource`] is a task through the blanket impl below.

use crate::context::ApplyEnv;
use crate::converge::{self, TaskOutcome};
use crate::error::{EngineError, TaskError};
use crate::resource::Resource;
use crate::types::{Lifecycle, TaskKey, TaskPhase};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Object-safe view of a resource, as the scheduler sees it
pub trait Task: Send + Sync + fmt::Debug {
    fn key(&self) -> TaskKey;

    fn kind(&self) -> &'static str;

    fn lifecycle(&self) -> Lifecycle;

    fn dependencies(&self, tasks: &TaskSet) -> Vec<TaskKey>;

    /// Resolve, validate and apply this task, reporting phase changes
    fn converge(
        &self,
        env: &ApplyEnv<'_>,
        on_phase: &mut dyn FnMut(TaskPhase),
    ) -> Result<TaskOutcome, TaskError>;

    fn as_any(&self) -> &dyn Any;
}

impl<R: Resource> Task for R {
    fn key(&self) -> TaskKey {
        Resource::key(self)
    }

    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn lifecycle(&self) -> Lifecycle {
        Resource::lifecycle(self)
    }

    fn dependencies(&self, tasks: &TaskSet) -> Vec<TaskKey> {
        Resource::dependencies(self, tasks)
    }

    fn converge(
        &self,
        env: &ApplyEnv<'_>,
        on_phase: &mut dyn FnMut(TaskPhase),
    ) -> Result<TaskOutcome, TaskError> {
        converge::converge(self, env, on_phase)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to a task
pub type TaskHandle = Arc<dyn Task>;

/// All tasks of one run, in insertion order, indexed by key
#[derive(Default, Clone)]
pub struct TaskSet {
    tasks: Vec<TaskHandle>,
    index: HashMap<TaskKey, usize>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource; a second task with the same key is an error
    pub fn insert<R: Resource>(&mut self, resource: R) -> Result<(), EngineError> {
        self.insert_handle(Arc::new(resource))
    }

    pub fn insert_handle(&mut self, task: TaskHandle) -> Result<(), EngineError> {
        let key = task.key();
        if self.index.contains_key(&key) {
            return Err(EngineError::DuplicateTask(key));
        }
        self.index.insert(key, self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskHandle> {
        self.index.get(key).map(|&i| &self.tasks[i])
    }

    /// Position of a task in insertion order
    pub fn position(&self, key: &TaskKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.index.contains_key(key)
    }

    /// Keys of every task of `kind`, in insertion order
    pub fn keys_of_kind(&self, kind: &str) -> Vec<TaskKey> {
        self.tasks
            .iter()
            .filter(|task| task.kind() == kind)
            .map(|task| task.key())
            .collect()
    }

    /// Keys of every task of type `R`
    pub fn keys_of<R: Resource>(&self) -> Vec<TaskKey> {
        self.keys_of_kind(R::KIND)
    }

    /// Typed access to a task by name
    pub fn find<R: Resource>(&self, name: &str) -> Option<&R> {
        self.get(&TaskKey::new(R::KIND, name))
            .and_then(|task| task.as_any().downcast_ref::<R>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskHandle> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tasks.iter().map(|t| t.key())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Widget;

    #[test]
    fn test_insert_rejects_duplicate_key() {
        let mut tasks = TaskSet::new();
        tasks.insert(Widget::new("a")).unwrap();
        let err = tasks.insert(Widget::new("a").with_size(5)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTask(_)));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_typed_lookup() {
        let mut tasks = TaskSet::new();
        tasks.insert(Widget::new("a").with_size(5)).unwrap();
        tasks.insert(Widget::new("b")).unwrap();

        assert_eq!(tasks.find::<Widget>("a").and_then(|w| w.size.get().copied()), Some(5));
        assert!(tasks.find::<Widget>("zzz").is_none());
        assert_eq!(tasks.keys_of::<Widget>().len(), 2);
        assert_eq!(tasks.position(&TaskKey::new("Widget", "b")), Some(1));
    }
}
