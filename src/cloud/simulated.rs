//! In-process ARM control plane
//!
//! Keeps resources in memory, optionally persisted to a JSON file so that
//! successive invocations see the state earlier ones left behind. Disk
//! creation is asynchronous and completes after a configurable number of
//! polls. Faults can be queued per operation for tests.

use super::api::{
    ApiError, ArmApi, AvailabilitySetModel, DiskModel, Operation, OperationStatus,
    ProvisioningState, ResourceGroupModel, Tags,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct ArmState {
    #[serde(default)]
    resource_groups: BTreeMap<String, ResourceGroupModel>,
    /// Keyed by `{resource_group}/{name}`
    #[serde(default)]
    disks: BTreeMap<String, DiskModel>,
    #[serde(default)]
    availability_sets: BTreeMap<String, AvailabilitySetModel>,
}

struct PendingDisk {
    key: String,
    polls_left: u32,
}

#[derive(Default)]
struct Runtime {
    operations: HashMap<String, PendingDisk>,
    faults: HashMap<String, VecDeque<ApiError>>,
    calls: Vec<String>,
    max_pending: usize,
}

/// Simulated Azure Resource Manager
pub struct SimulatedArm {
    state: Mutex<ArmState>,
    runtime: Mutex<Runtime>,
    path: Option<PathBuf>,
    provisioning_polls: u32,
    next_operation: AtomicU64,
    reads: AtomicUsize,
    mutations: AtomicUsize,
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped(resource_group: &str, name: &str) -> String {
    format!("{resource_group}/{name}")
}

impl SimulatedArm {
    /// Empty, memory-only control plane
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ArmState::default()),
            runtime: Mutex::new(Runtime::default()),
            path: None,
            provisioning_polls: 0,
            next_operation: AtomicU64::new(1),
            reads: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Control plane persisted at `path`, loading existing state if present
    ///
    /// Disks left mid-provisioning by an earlier process are treated as
    /// provisioned.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut state = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            serde_json::from_str::<ArmState>(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?
        } else {
            ArmState::default()
        };
        for disk in state.disks.values_mut() {
            disk.provisioning_state = ProvisioningState::Succeeded;
        }
        log::debug!(
            "Loaded simulated state from {} ({} group(s), {} disk(s), {} availability set(s))",
            path.display(),
            state.resource_groups.len(),
            state.disks.len(),
            state.availability_sets.len()
        );

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path.to_path_buf()),
            ..Self::new()
        })
    }

    /// Number of polls a disk creation reports `InProgress` before finishing
    pub fn with_provisioning_polls(mut self, polls: u32) -> Self {
        self.provisioning_polls = polls;
        self
    }

    /// Successful mutating calls
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, ArmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call and pop a queued fault for it, if any
    fn enter(&self, operation: &str, name: &str) -> Result<(), ApiError> {
        let mut runtime = self.runtime();
        runtime.calls.push(format!("{operation}:{name}"));
        match runtime.faults.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => {
                log::trace!("simulated fault for {operation}:{name}: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn read(&self, operation: &str, name: &str) -> Result<(), ApiError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.enter(operation, name)
    }

    fn persist(&self, state: &ArmState) -> Result<(), ApiError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(state)?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, path)
        };
        write().map_err(|e| {
            ApiError::new(
                500,
                "StateWriteFailed",
                format!("failed to write {}: {e}", path.display()),
            )
        })
    }

    /// Apply `f` to a copy of the state and commit it once persisted
    ///
    /// A failed write leaves the in-memory state untouched.
    fn mutate<T>(&self, f: impl FnOnce(&mut ArmState) -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut state = self.state();
        let mut next = state.clone();
        let value = f(&mut next)?;
        self.persist(&next)?;
        *state = next;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    fn require_group(state: &ArmState, resource_group: &str) -> Result<(), ApiError> {
        if state.resource_groups.contains_key(resource_group) {
            Ok(())
        } else {
            Err(ApiError::not_found(
                "ResourceGroupNotFound",
                format!("Resource group '{resource_group}' could not be found."),
            ))
        }
    }
}

/// Fault injection and inspection for tests
#[cfg(test)]
impl SimulatedArm {
    /// Fail the next `times` calls of `operation` with `error`
    pub fn fail_next(&self, operation: &str, error: ApiError, times: usize) {
        let mut runtime = self.runtime();
        let queue = runtime.faults.entry(operation.to_string()).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Index of the first logged call equal to `entry`
    pub fn call_position(&self, entry: &str) -> Option<usize> {
        self.runtime().calls.iter().position(|c| c == entry)
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        let prefix = format!("{operation}:");
        self.runtime()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    /// Highest number of disk creations pending at the same time
    pub fn max_pending_operations(&self) -> usize {
        self.runtime().max_pending
    }

    pub fn resource_group(&self, name: &str) -> Option<ResourceGroupModel> {
        self.state().resource_groups.get(name).cloned()
    }

    pub fn disk(&self, resource_group: &str, name: &str) -> Option<DiskModel> {
        self.state().disks.get(&scoped(resource_group, name)).cloned()
    }

    pub fn availability_set(&self, resource_group: &str, name: &str) -> Option<AvailabilitySetModel> {
        self.state()
            .availability_sets
            .get(&scoped(resource_group, name))
            .cloned()
    }

    /// Insert a resource group directly, bypassing call accounting
    pub fn seed_resource_group(&self, group: ResourceGroupModel) {
        self.state()
            .resource_groups
            .insert(group.name.clone(), group);
    }

    pub fn seed_disk(&self, resource_group: &str, disk: DiskModel) {
        self.state()
            .disks
            .insert(scoped(resource_group, &disk.name), disk);
    }
}

fn resource_not_found(kind: &str, name: &str) -> ApiError {
    ApiError::not_found(
        "ResourceNotFound",
        format!("The {kind} '{name}' was not found."),
    )
}

impl ArmApi for SimulatedArm {
    fn get_resource_group(&self, name: &str) -> Result<ResourceGroupModel, ApiError> {
        self.read("get_resource_group", name)?;
        self.state()
            .resource_groups
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(
                    "ResourceGroupNotFound",
                    format!("Resource group '{name}' could not be found."),
                )
            })
    }

    fn create_resource_group(
        &self,
        group: &ResourceGroupModel,
    ) -> Result<ResourceGroupModel, ApiError> {
        self.enter("create_resource_group", &group.name)?;
        self.mutate(|state| {
            if state.resource_groups.contains_key(&group.name) {
                return Err(ApiError::already_exists(format!(
                    "Resource group '{}' already exists.",
                    group.name
                )));
            }
            let created = ResourceGroupModel {
                provisioning_state: ProvisioningState::Succeeded,
                ..group.clone()
            };
            state
                .resource_groups
                .insert(group.name.clone(), created.clone());
            Ok(created)
        })
    }

    fn patch_resource_group_tags(
        &self,
        name: &str,
        tags: &Tags,
    ) -> Result<ResourceGroupModel, ApiError> {
        self.enter("patch_resource_group_tags", name)?;
        self.mutate(|state| {
            let group = state
                .resource_groups
                .get_mut(name)
                .ok_or_else(|| resource_not_found("resource group", name))?;
            group.tags = tags.clone();
            Ok(group.clone())
        })
    }

    fn get_disk(&self, resource_group: &str, name: &str) -> Result<DiskModel, ApiError> {
        self.read("get_disk", name)?;
        let state = self.state();
        Self::require_group(&state, resource_group)?;
        state
            .disks
            .get(&scoped(resource_group, name))
            .cloned()
            .ok_or_else(|| resource_not_found("disk", name))
    }

    fn begin_create_disk(
        &self,
        resource_group: &str,
        disk: &DiskModel,
    ) -> Result<Operation, ApiError> {
        self.enter("begin_create_disk", &disk.name)?;
        let key = scoped(resource_group, &disk.name);
        let polls = self.provisioning_polls;
        self.mutate(|state| {
            Self::require_group(state, resource_group)?;
            if state.disks.contains_key(&key) {
                return Err(ApiError::already_exists(format!(
                    "Disk '{}' already exists.",
                    disk.name
                )));
            }
            let provisioning_state = if polls == 0 {
                ProvisioningState::Succeeded
            } else {
                ProvisioningState::Creating
            };
            state.disks.insert(
                key.clone(),
                DiskModel {
                    provisioning_state,
                    ..disk.clone()
                },
            );
            Ok(())
        })?;

        let id = format!(
            "op-{}",
            self.next_operation.fetch_add(1, Ordering::SeqCst)
        );
        let mut runtime = self.runtime();
        runtime.operations.insert(
            id.clone(),
            PendingDisk {
                key,
                polls_left: polls,
            },
        );
        runtime.max_pending = runtime.max_pending.max(runtime.operations.len());
        Ok(Operation { id })
    }

    fn patch_disk_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> Result<DiskModel, ApiError> {
        self.enter("patch_disk_tags", name)?;
        self.mutate(|state| {
            let disk = state
                .disks
                .get_mut(&scoped(resource_group, name))
                .ok_or_else(|| resource_not_found("disk", name))?;
            if disk.provisioning_state != ProvisioningState::Succeeded {
                return Err(ApiError::new(
                    409,
                    "OperationNotAllowed",
                    format!("Disk '{name}' is still being provisioned."),
                ));
            }
            disk.tags = tags.clone();
            Ok(disk.clone())
        })
    }

    fn get_availability_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<AvailabilitySetModel, ApiError> {
        self.read("get_availability_set", name)?;
        let state = self.state();
        Self::require_group(&state, resource_group)?;
        state
            .availability_sets
            .get(&scoped(resource_group, name))
            .cloned()
            .ok_or_else(|| resource_not_found("availability set", name))
    }

    fn create_availability_set(
        &self,
        resource_group: &str,
        set: &AvailabilitySetModel,
    ) -> Result<AvailabilitySetModel, ApiError> {
        self.enter("create_availability_set", &set.name)?;
        let key = scoped(resource_group, &set.name);
        self.mutate(|state| {
            Self::require_group(state, resource_group)?;
            if state.availability_sets.contains_key(&key) {
                return Err(ApiError::already_exists(format!(
                    "Availability set '{}' already exists.",
                    set.name
                )));
            }
            state.availability_sets.insert(key, set.clone());
            Ok(set.clone())
        })
    }

    fn patch_availability_set_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> Result<AvailabilitySetModel, ApiError> {
        self.enter("patch_availability_set_tags", name)?;
        self.mutate(|state| {
            let set = state
                .availability_sets
                .get_mut(&scoped(resource_group, name))
                .ok_or_else(|| resource_not_found("availability set", name))?;
            set.tags = tags.clone();
            Ok(set.clone())
        })
    }

    fn poll_operation(&self, operation: &Operation) -> Result<OperationStatus, ApiError> {
        self.read("poll_operation", &operation.id)?;
        let mut runtime = self.runtime();
        let Some(pending) = runtime.operations.get_mut(&operation.id) else {
            return Err(ApiError::not_found(
                "OperationNotFound",
                format!("Operation '{}' was not found.", operation.id),
            ));
        };
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(OperationStatus::InProgress);
        }

        let key = pending.key.clone();
        runtime.operations.remove(&operation.id);
        drop(runtime);

        let mut state = self.state();
        let mut next = state.clone();
        match next.disks.get_mut(&key) {
            Some(disk) => {
                disk.provisioning_state = ProvisioningState::Succeeded;
                self.persist(&next)?;
                *state = next;
                Ok(OperationStatus::Succeeded)
            }
            None => Ok(OperationStatus::Failed(format!(
                "disk {key} disappeared while provisioning"
            ))),
        }
    }
}
