//! Azure provider adapter
//!
//! - `api`: ARM wire models, errors, and the [`ArmApi`] boundary
//! - `arm`: the engine-facing adapter with retries and create locks
//! - `simulated`: in-process control plane with optional persistence
//! - `target`: live and plan render targets

pub mod api;
pub mod arm;
pub mod simulated;
pub mod target;

pub use api::{ApiError, ArmApi, StorageSku, Tags};
pub use arm::ArmCloud;
pub use simulated::SimulatedArm;
pub use target::{AZURE_API, AzureApiTarget, PLAN, PlanAction, PlanEntry, PlanTarget};
