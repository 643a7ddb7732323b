//! Render targets
//!
//! The live target hands change sets to the adapter. The plan target only
//! records what would be done, for `preview` and the confirmation prompt.

use super::arm::ArmCloud;
use reconcile::{Cloud, Target, TargetId, TaskError, TaskKey};
use serde::Serialize;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

pub const AZURE_API: TargetId = TargetId("azure-api");
pub const PLAN: TargetId = TargetId("plan");

/// Applies changes through the Azure adapter
pub struct AzureApiTarget {
    cloud: Arc<ArmCloud>,
}

impl AzureApiTarget {
    pub fn new(cloud: Arc<ArmCloud>) -> Self {
        Self { cloud }
    }
}

impl Target for AzureApiTarget {
    fn id(&self) -> TargetId {
        AZURE_API
    }

    fn cloud(&self) -> &dyn Cloud {
        self.cloud.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Update,
}

/// One intended operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub key: TaskKey,
    pub action: PlanAction,
    /// Human-readable `field: value` lines
    pub details: Vec<String>,
}

/// Collects intended operations; reads still go to the real adapter
pub struct PlanTarget {
    cloud: Arc<ArmCloud>,
    entries: Mutex<Vec<PlanEntry>>,
}

impl PlanTarget {
    pub fn new(cloud: Arc<ArmCloud>) -> Self {
        Self {
            cloud,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// The plan target behind a render call
    pub fn from_target(target: &dyn Target) -> Result<&Self, TaskError> {
        target
            .as_any()
            .downcast_ref::<Self>()
            .ok_or_else(|| TaskError::provider(format!("{} is not a plan target", target.id())))
    }

    pub fn record(&self, entry: PlanEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Recorded entries, sorted by key
    pub fn entries(&self) -> Vec<PlanEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

impl Target for PlanTarget {
    fn id(&self) -> TargetId {
        PLAN
    }

    fn cloud(&self) -> &dyn Cloud {
        self.cloud.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
