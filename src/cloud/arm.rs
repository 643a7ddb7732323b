//! Azure adapter
//!
//! [`ArmCloud`] is the engine's [`Cloud`] for Azure. Every remote call goes
//! through [`with_retry`], so throttling and 5xx responses are retried here
//! and nowhere else. Creates run under a per-resource lock and treat
//! `AlreadyExists` as success.

use super::api::{
    ApiError, ArmApi, AvailabilitySetModel, DiskModel, OperationStatus, ResourceGroupModel, Tags,
};
use reconcile::{
    Cloud, KeyedLocks, LogRetry, ProviderId, RetryConfig, RunContext, TaskError, with_retry,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

pub const PROVIDER: ProviderId = ProviderId("azure");

/// Result of a create-if-absent sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    Created,
    /// Another writer got there first
    AlreadyExisted,
}

pub struct ArmCloud {
    api: Arc<dyn ArmApi>,
    region: String,
    resource_group: String,
    retry: RetryConfig,
    poll_interval: Duration,
    locks: KeyedLocks,
}

impl ArmCloud {
    pub fn new(
        api: Arc<dyn ArmApi>,
        region: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        Self {
            api,
            region: region.into(),
            resource_group: resource_group.into(),
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(2),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The Azure adapter behind a run context
    pub fn from_context<'a>(ctx: &RunContext<'a>) -> Result<&'a Self, TaskError> {
        ctx.cloud.as_any().downcast_ref::<Self>().ok_or_else(|| {
            TaskError::provider(format!(
                "task requires the azure adapter, run uses {}",
                ctx.cloud.provider()
            ))
        })
    }

    /// Resource group every scoped resource of the cluster lives in
    pub fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    pub fn resource_groups(&self) -> ResourceGroups<'_> {
        ResourceGroups { cloud: self }
    }

    pub fn disks(&self) -> Disks<'_> {
        Disks { cloud: self }
    }

    pub fn availability_sets(&self) -> AvailabilitySets<'_> {
        AvailabilitySets { cloud: self }
    }

    /// Run one API call with retries, mapping the final error
    fn call<T>(
        &self,
        ctx: &RunContext<'_>,
        operation: &str,
        kind: &str,
        name: &str,
        mut f: impl FnMut(&dyn ArmApi) -> Result<T, ApiError>,
    ) -> Result<T, TaskError> {
        let label = format!("{operation} {name}");
        let callback = LogRetry { operation: &label };
        with_retry(&self.retry, ctx.cancel, Some(&callback), || {
            f(self.api.as_ref()).map_err(|e| e.into_task_error(kind, name))
        })
    }

    /// Like [`ArmCloud::call`], but a 404 yields `None`
    fn lookup<T>(
        &self,
        ctx: &RunContext<'_>,
        operation: &str,
        kind: &str,
        name: &str,
        f: impl FnMut(&dyn ArmApi) -> Result<T, ApiError>,
    ) -> Result<Option<T>, TaskError> {
        match self.call(ctx, operation, kind, name, f) {
            Ok(value) => Ok(Some(value)),
            Err(TaskError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create under the per-resource lock unless the resource already exists
    fn create_if_absent(
        &self,
        kind: &str,
        name: &str,
        exists: impl FnOnce() -> Result<bool, TaskError>,
        create: impl FnOnce() -> Result<(), CreateError>,
    ) -> Result<Created, TaskError> {
        let key = format!("{kind}/{name}");
        self.locks.with_lock(&key, || {
            if exists()? {
                log::debug!("{key} appeared before create, skipping");
                return Ok(Created::AlreadyExisted);
            }
            match create() {
                Ok(()) => Ok(Created::Created),
                Err(CreateError::Api(e)) if e.is_already_exists() => {
                    log::debug!("{key} already exists, treating create as done");
                    Ok(Created::AlreadyExisted)
                }
                Err(CreateError::Api(e)) => Err(e.into_task_error(kind, name)),
                Err(CreateError::Task(e)) => Err(e),
            }
        })
    }

    /// Run a create call with retries, keeping the API error for inspection
    fn create_call(
        &self,
        ctx: &RunContext<'_>,
        operation: &str,
        name: &str,
        mut f: impl FnMut(&dyn ArmApi) -> Result<(), ApiError>,
    ) -> Result<(), CreateError> {
        let label = format!("{operation} {name}");
        let callback = LogRetry { operation: &label };
        with_retry(&self.retry, ctx.cancel, Some(&callback), || {
            f(self.api.as_ref()).map_err(CreateError::Api)
        })
    }
}

/// Error carried through retries of a create call
#[derive(Debug, thiserror::Error)]
enum CreateError {
    #[error(transparent)]
    Api(ApiError),
    /// Cancellation observed between attempts
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl reconcile::Retryable for CreateError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            Self::Task(_) => false,
        }
    }
}

impl Cloud for ArmCloud {
    fn provider(&self) -> ProviderId {
        PROVIDER
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ResourceGroups<'a> {
    cloud: &'a ArmCloud,
}

impl ResourceGroups<'_> {
    const KIND: &'static str = "ResourceGroup";

    pub fn get(
        &self,
        ctx: &RunContext<'_>,
        name: &str,
    ) -> Result<Option<ResourceGroupModel>, TaskError> {
        self.cloud
            .lookup(ctx, "get resource group", Self::KIND, name, |api| {
                api.get_resource_group(name)
            })
    }

    pub fn create(
        &self,
        ctx: &RunContext<'_>,
        group: &ResourceGroupModel,
    ) -> Result<Created, TaskError> {
        let name = group.name.as_str();
        self.cloud.create_if_absent(
            Self::KIND,
            name,
            || Ok(self.get(ctx, name)?.is_some()),
            || {
                self.cloud
                    .create_call(ctx, "create resource group", name, |api| {
                        api.create_resource_group(group).map(drop)
                    })
            },
        )
    }

    pub fn update_tags(
        &self,
        ctx: &RunContext<'_>,
        name: &str,
        tags: &Tags,
    ) -> Result<ResourceGroupModel, TaskError> {
        self.cloud
            .call(ctx, "patch resource group", Self::KIND, name, |api| {
                api.patch_resource_group_tags(name, tags)
            })
    }
}

pub struct Disks<'a> {
    cloud: &'a ArmCloud,
}

impl Disks<'_> {
    const KIND: &'static str = "Disk";

    pub fn get(&self, ctx: &RunContext<'_>, name: &str) -> Result<Option<DiskModel>, TaskError> {
        let group = self.cloud.resource_group_name();
        self.cloud
            .lookup(ctx, "get disk", Self::KIND, name, |api| {
                api.get_disk(group, name)
            })
    }

    /// Create a disk and wait until provisioning finishes
    ///
    /// The wait is bounded by the context's operation timeout.
    pub fn create(&self, ctx: &RunContext<'_>, disk: &DiskModel) -> Result<Created, TaskError> {
        let group = self.cloud.resource_group_name();
        let name = disk.name.as_str();
        let mut operation = None;
        let created = self.cloud.create_if_absent(
            Self::KIND,
            name,
            || Ok(self.get(ctx, name)?.is_some()),
            || {
                self.cloud.create_call(ctx, "create disk", name, |api| {
                    operation = Some(api.begin_create_disk(group, disk)?);
                    Ok(())
                })
            },
        )?;

        let Some(operation) = operation else {
            return Ok(created);
        };
        log::debug!("waiting for disk {name} ({})", operation.id);
        let label = format!("create disk {name}");
        ctx.wait_for(&label, self.cloud.poll_interval, || {
            let status = self.cloud.call(ctx, "poll disk", Self::KIND, name, |api| {
                api.poll_operation(&operation)
            })?;
            match status {
                OperationStatus::InProgress => Ok(None),
                OperationStatus::Succeeded => Ok(Some(())),
                OperationStatus::Failed(message) => Err(TaskError::Provider { message }),
            }
        })?;
        Ok(created)
    }

    pub fn update_tags(
        &self,
        ctx: &RunContext<'_>,
        name: &str,
        tags: &Tags,
    ) -> Result<DiskModel, TaskError> {
        let group = self.cloud.resource_group_name();
        self.cloud.call(ctx, "patch disk", Self::KIND, name, |api| {
            api.patch_disk_tags(group, name, tags)
        })
    }
}

pub struct AvailabilitySets<'a> {
    cloud: &'a ArmCloud,
}

impl AvailabilitySets<'_> {
    const KIND: &'static str = "AvailabilitySet";

    pub fn get(
        &self,
        ctx: &RunContext<'_>,
        name: &str,
    ) -> Result<Option<AvailabilitySetModel>, TaskError> {
        let group = self.cloud.resource_group_name();
        self.cloud
            .lookup(ctx, "get availability set", Self::KIND, name, |api| {
                api.get_availability_set(group, name)
            })
    }

    pub fn create(
        &self,
        ctx: &RunContext<'_>,
        set: &AvailabilitySetModel,
    ) -> Result<Created, TaskError> {
        let group = self.cloud.resource_group_name();
        let name = set.name.as_str();
        self.cloud.create_if_absent(
            Self::KIND,
            name,
            || Ok(self.get(ctx, name)?.is_some()),
            || {
                self.cloud
                    .create_call(ctx, "create availability set", name, |api| {
                        api.create_availability_set(group, set).map(drop)
                    })
            },
        )
    }

    pub fn update_tags(
        &self,
        ctx: &RunContext<'_>,
        name: &str,
        tags: &Tags,
    ) -> Result<AvailabilitySetModel, TaskError> {
        let group = self.cloud.resource_group_name();
        self.cloud
            .call(ctx, "patch availability set", Self::KIND, name, |api| {
                api.patch_availability_set_tags(group, name, tags)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::simulated::SimulatedArm;
    use reconcile::{CancelToken, ErrorCategory};

    fn setup() -> (Arc<SimulatedArm>, ArmCloud) {
        let arm = Arc::new(SimulatedArm::new());
        let cloud = ArmCloud::new(arm.clone(), "westeurope", "rg1")
            .with_retry(RetryConfig::new(3, Duration::from_millis(1), 1.0))
            .with_poll_interval(Duration::from_millis(1));
        (arm, cloud)
    }

    fn group() -> ResourceGroupModel {
        ResourceGroupModel {
            name: "rg1".to_string(),
            location: "westeurope".to_string(),
            ..ResourceGroupModel::default()
        }
    }

    fn disk(name: &str) -> DiskModel {
        DiskModel {
            name: name.to_string(),
            location: "westeurope".to_string(),
            disk_size_gb: 10,
            ..DiskModel::default()
        }
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let (arm, cloud) = setup();
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));
        arm.fail_next("create_resource_group", ApiError::throttled(), 2);

        let created = cloud.resource_groups().create(&ctx, &group()).unwrap();
        assert_eq!(created, Created::Created);
        assert_eq!(arm.calls_to("create_resource_group"), 3);
    }

    #[test]
    fn test_retries_give_up_after_max_attempts() {
        let (arm, cloud) = setup();
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));
        arm.fail_next("get_resource_group", ApiError::new(503, "ServerBusy", "busy"), 5);

        let err = cloud.resource_groups().get(&ctx, "rg1").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert_eq!(arm.calls_to("get_resource_group"), 3);
    }

    #[test]
    fn test_permission_error_is_not_retried() {
        let (arm, cloud) = setup();
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));
        arm.fail_next("create_resource_group", ApiError::forbidden("no"), 1);

        let err = cloud.resource_groups().create(&ctx, &group()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);
        assert_eq!(arm.calls_to("create_resource_group"), 1);
    }

    #[test]
    fn test_missing_resource_lookup_is_none() {
        let (_arm, cloud) = setup();
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));

        assert!(cloud.resource_groups().get(&ctx, "rg1").unwrap().is_none());
        assert!(cloud.disks().get(&ctx, "d1").unwrap().is_none());
    }

    #[test]
    fn test_create_race_counts_as_success() {
        let (arm, cloud) = setup();
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));
        arm.seed_resource_group(group());
        arm.seed_disk("rg1", disk("d1"));
        // Existence check misses the disk, the create then collides
        arm.fail_next("get_disk", ApiError::not_found("ResourceNotFound", "d1"), 1);

        let created = cloud.disks().create(&ctx, &disk("d1")).unwrap();
        assert_eq!(created, Created::AlreadyExisted);
        assert_eq!(arm.calls_to("begin_create_disk"), 1);
        assert_eq!(arm.mutations(), 0);
    }

    #[test]
    fn test_disk_create_waits_for_provisioning() {
        let arm = Arc::new(SimulatedArm::new().with_provisioning_polls(3));
        let cloud = ArmCloud::new(arm.clone(), "westeurope", "rg1")
            .with_poll_interval(Duration::from_millis(1));
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_secs(5));
        arm.seed_resource_group(group());

        assert_eq!(cloud.disks().create(&ctx, &disk("d1")).unwrap(), Created::Created);
        assert_eq!(arm.calls_to("poll_operation"), 4);
    }

    #[test]
    fn test_disk_create_deadline() {
        let arm = Arc::new(SimulatedArm::new().with_provisioning_polls(u32::MAX));
        let cloud = ArmCloud::new(arm.clone(), "westeurope", "rg1")
            .with_poll_interval(Duration::from_millis(5));
        let cancel = CancelToken::new();
        let ctx = RunContext::new(&cloud, &cancel, Duration::from_millis(30));
        arm.seed_resource_group(group());

        let err = cloud.disks().create(&ctx, &disk("d1")).unwrap_err();
        assert!(matches!(err, TaskError::DeadlineExceeded { .. }));
    }

    #[test]
    fn test_from_context_rejects_other_clouds() {
        struct Other;
        impl Cloud for Other {
            fn provider(&self) -> ProviderId {
                ProviderId("other")
            }
            fn region(&self) -> &str {
                "nowhere"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let cancel = CancelToken::new();
        let ctx = RunContext::new(&Other, &cancel, Duration::from_secs(1));
        let err = ArmCloud::from_context(&ctx).err().unwrap();
        assert!(err.to_string().contains("other"));
    }
}
