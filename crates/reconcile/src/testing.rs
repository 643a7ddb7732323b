//! In-memory resource kind and cloud used by the engine tests

use crate::changes::{ChangeSet, Delta};
use crate::context::{Cloud, RunContext, Target};
use crate::error::TaskError;
use crate::field::Field;
use crate::render::Renderer;
use crate::resource::Resource;
use crate::task::TaskSet;
use crate::types::{Lifecycle, ProviderId, TargetId, TaskKey};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

pub const FAKE: TargetId = TargetId("fake");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub size: Field<u32>,
    pub color: Field<String>,
    pub depends: Vec<String>,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Field::Set(size);
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Field::Set(color.to_string());
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends.push(name.to_string());
        self
    }
}

impl Resource for Widget {
    const KIND: &'static str = "Widget";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn dependencies(&self, _tasks: &TaskSet) -> Vec<TaskKey> {
        self.depends
            .iter()
            .map(|name| TaskKey::new(Self::KIND, name.as_str()))
            .collect()
    }

    fn find(&self, ctx: &RunContext<'_>) -> Result<Option<Self>, TaskError> {
        FakeCloud::from_context(ctx)?.find(&self.name)
    }

    fn diff(actual: &Self, desired: &Self, delta: &mut Delta) -> Self {
        Self {
            name: desired.name.clone(),
            lifecycle: desired.lifecycle,
            size: delta.field("Size", &actual.size, &desired.size),
            color: delta.field("Color", &actual.color, &desired.color),
            depends: Vec::new(),
        }
    }

    fn immutable_fields() -> &'static [&'static str] {
        &["Size"]
    }
}

#[derive(Default)]
struct FakeState {
    widgets: BTreeMap<String, Widget>,
    find_failures: HashMap<String, TaskError>,
    render_failures: HashMap<String, TaskError>,
    render_delays: HashMap<String, Duration>,
    blocking: HashMap<String, Duration>,
    panics: HashSet<String>,
    finds: usize,
    creates: usize,
    updates: usize,
    last_update_fields: Vec<String>,
    log: Vec<String>,
}

/// Cloud holding widgets in memory, with call counters and fault injection
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCloud {
    pub fn from_context<'a>(ctx: &RunContext<'a>) -> Result<&'a Self, TaskError> {
        ctx.cloud
            .as_any()
            .downcast_ref::<Self>()
            .ok_or_else(|| TaskError::provider("not a fake cloud"))
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed(&self, widget: Widget) {
        self.state().widgets.insert(widget.name.clone(), widget);
    }

    pub fn stored(&self, name: &str) -> Option<Widget> {
        self.state().widgets.get(name).cloned()
    }

    pub fn fail_find(&self, name: &str, err: TaskError) {
        self.state().find_failures.insert(name.to_string(), err);
    }

    pub fn fail_render(&self, name: &str, err: TaskError) {
        self.state().render_failures.insert(name.to_string(), err);
    }

    /// Render sleeps for `delay`, waking early on cancellation
    pub fn delay_render(&self, name: &str, delay: Duration) {
        self.state().render_delays.insert(name.to_string(), delay);
    }

    /// Render sleeps for `delay` and ignores cancellation
    pub fn block_render(&self, name: &str, delay: Duration) {
        self.state().blocking.insert(name.to_string(), delay);
    }

    pub fn panic_on_render(&self, name: &str) {
        self.state().panics.insert(name.to_string());
    }

    pub fn finds(&self) -> usize {
        self.state().finds
    }

    pub fn creates(&self) -> usize {
        self.state().creates
    }

    pub fn updates(&self) -> usize {
        self.state().updates
    }

    pub fn mutations(&self) -> usize {
        let state = self.state();
        state.creates + state.updates
    }

    pub fn last_update_fields(&self) -> Vec<String> {
        self.state().last_update_fields.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Index of the first log entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.state().log.iter().position(|e| e == entry)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn find(&self, name: &str) -> Result<Option<Widget>, TaskError> {
        let mut state = self.state();
        state.finds += 1;
        state.log.push(format!("find:{name}"));
        if let Some(err) = state.find_failures.get(name) {
            return Err(err.clone());
        }
        match state.widgets.get(name) {
            Some(widget) => Ok(Some(widget.clone())),
            None => Err(TaskError::NotFound {
                kind: Widget::KIND.to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn apply(
        &self,
        ctx: &RunContext<'_>,
        actual: Option<&Widget>,
        desired: &Widget,
        changes: &ChangeSet<Widget>,
    ) -> Result<(), TaskError> {
        let name = desired.name.as_str();
        let (delay, blocking, failure, panics) = {
            let state = self.state();
            (
                state.render_delays.get(name).copied(),
                state.blocking.get(name).copied(),
                state.render_failures.get(name).cloned(),
                state.panics.contains(name),
            )
        };
        if panics {
            panic!("widget {name} exploded");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = (|| -> Result<(), TaskError> {
            if let Some(delay) = delay {
                ctx.cancel.sleep(delay)?;
            }
            if let Some(delay) = blocking {
                thread::sleep(delay);
            }
            if let Some(err) = failure {
                return Err(err);
            }

            let mut state = self.state();
            match actual {
                None => {
                    state.creates += 1;
                    state.log.push(format!("create:{name}"));
                    state.widgets.insert(name.to_string(), desired.clone());
                }
                Some(_) => {
                    state.updates += 1;
                    state.log.push(format!("update:{name}"));
                    state.last_update_fields = changes.fields().iter().map(ToString::to_string).collect();
                    let patch = changes.changes().clone();
                    if let Some(stored) = state.widgets.get_mut(name) {
                        stored.size = patch.size.or(stored.size.clone());
                        stored.color = patch.color.or(stored.color.clone());
                    }
                }
            }
            Ok(())
        })();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Cloud for FakeCloud {
    fn provider(&self) -> ProviderId {
        ProviderId("fake")
    }

    fn region(&self) -> &str {
        "local"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct FakeTarget {
    cloud: FakeCloud,
}

impl FakeTarget {
    pub fn new(cloud: FakeCloud) -> Self {
        Self { cloud }
    }

    pub fn fake(&self) -> &FakeCloud {
        &self.cloud
    }
}

impl Target for FakeTarget {
    fn id(&self) -> TargetId {
        FAKE
    }

    fn cloud(&self) -> &dyn Cloud {
        &self.cloud
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct WidgetRenderer;

impl Renderer<Widget> for WidgetRenderer {
    fn render(
        &self,
        _target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&Widget>,
        desired: &Widget,
        changes: &ChangeSet<Widget>,
    ) -> Result<(), TaskError> {
        FakeCloud::from_context(ctx)?.apply(ctx, actual, desired, changes)
    }
}
