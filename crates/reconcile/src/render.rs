//! Render dispatch
//!
//! A renderer applies one kind's change set to one target. Renderers are
//! registered per (kind, target) pair, so a kind can render to the live API
//! and to a plan printer without knowing about either.

use crate::changes::ChangeSet;
use crate::context::{RunContext, Target};
use crate::error::TaskError;
use crate::resource::Resource;
use crate::types::TargetId;
use std::any::Any;
use std::collections::HashMap;

/// Apply routine for resource kind `R` on one target
///
/// `actual` is `None` when the resource is absent: render a create with the
/// full desired state. Otherwise render an update carrying only the fields
/// in `changes`.
pub trait Renderer<R: Resource>: Send + Sync {
    fn render(
        &self,
        target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&R>,
        desired: &R,
        changes: &ChangeSet<R>,
    ) -> Result<(), TaskError>;
}

type Slot = Box<dyn Any + Send + Sync>;

/// Registry of renderers keyed by (kind, target)
#[derive(Default)]
pub struct RenderRegistry {
    renderers: HashMap<(&'static str, TargetId), Slot>,
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `renderer` for kind `R` on `target`, replacing any previous one
    pub fn register<R, T>(&mut self, target: TargetId, renderer: T) -> &mut Self
    where
        R: Resource,
        T: Renderer<R> + 'static,
    {
        let boxed: Box<dyn Renderer<R>> = Box::new(renderer);
        if self
            .renderers
            .insert((R::KIND, target), Box::new(boxed))
            .is_some()
        {
            log::debug!("replaced renderer for {} on {target}", R::KIND);
        }
        self
    }

    pub fn get<R: Resource>(&self, target: TargetId) -> Option<&dyn Renderer<R>> {
        self.renderers
            .get(&(R::KIND, target))
            .and_then(|slot| slot.downcast_ref::<Box<dyn Renderer<R>>>())
            .map(AsRef::as_ref)
    }

    pub fn supports(&self, kind: &str, target: TargetId) -> bool {
        self.renderers
            .keys()
            .any(|(k, t)| *k == kind && *t == target)
    }

    /// Select and invoke the renderer for `R` on `target`
    pub fn dispatch<R: Resource>(
        &self,
        target: &dyn Target,
        ctx: &RunContext<'_>,
        actual: Option<&R>,
        desired: &R,
        changes: &ChangeSet<R>,
    ) -> Result<(), TaskError> {
        let renderer = self.get::<R>(target.id()).ok_or_else(|| TaskError::NoRenderer {
            kind: R::KIND.to_string(),
            target: target.id(),
        })?;
        renderer.render(target, ctx, actual, desired, changes)
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }
}
