//! Azure Resource Manager API boundary
//!
//! [`ArmApi`] is the seam between the adapter and the control plane. Wire
//! models mirror the ARM payloads closely; the task kinds never see them.

use reconcile::TaskError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub type Tags = BTreeMap<String, String>;

/// Error code ARM returns when a create races an existing resource
pub const ALREADY_EXISTS: &str = "AlreadyExists";

/// Error returned by an ARM call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{status} {code}: {message}")]
pub struct ApiError {
    /// HTTP status of the response
    pub status: u16,
    /// ARM error code
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self::new(404, code, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(409, ALREADY_EXISTS, message)
    }

    pub fn throttled() -> Self {
        Self::new(429, "TooManyRequests", "request rate limit exceeded")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, "AuthorizationFailed", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_already_exists(&self) -> bool {
        self.status == 409 && self.code == ALREADY_EXISTS
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.status, 408 | 429 | 500..=599)
    }

    /// Map to a task error for the resource `kind`/`name` the call was about
    pub fn into_task_error(self, kind: &str, name: &str) -> TaskError {
        let message = format!("{} ({}): {}", self.code, self.status, self.message);
        match self.status {
            404 => TaskError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            401 | 403 => TaskError::Permission { message },
            409 => TaskError::Conflict { message },
            400 | 422 => TaskError::InvalidDesired { message },
            _ if self.is_transient() => TaskError::Transient { message },
            _ => TaskError::Provider { message },
        }
    }
}

/// Managed disk storage account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageSku {
    #[default]
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
    #[serde(rename = "StandardSSD_LRS")]
    StandardSsdLrs,
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "UltraSSD_LRS")]
    UltraSsdLrs,
}

impl fmt::Display for StorageSku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PremiumLrs => "Premium_LRS",
            Self::StandardSsdLrs => "StandardSSD_LRS",
            Self::StandardLrs => "Standard_LRS",
            Self::UltraSsdLrs => "UltraSSD_LRS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProvisioningState {
    Creating,
    Updating,
    #[default]
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceGroupModel {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskModel {
    pub name: String,
    pub location: String,
    pub sku: StorageSku,
    #[serde(rename = "diskSizeGB")]
    pub disk_size_gb: u32,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySetModel {
    pub name: String,
    pub location: String,
    /// "Aligned" for sets hosting managed disks
    pub sku: String,
    pub platform_fault_domain_count: u32,
    pub platform_update_domain_count: u32,
    #[serde(default)]
    pub tags: Tags,
}

/// Handle to an asynchronous ARM operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed(String),
}

/// Subset of the ARM control plane the task kinds use
///
/// Creates fail with 409 `AlreadyExists` when the resource is present;
/// updates only ever patch tags.
pub trait ArmApi: Send + Sync {
    fn get_resource_group(&self, name: &str) -> Result<ResourceGroupModel, ApiError>;
    fn create_resource_group(
        &self,
        group: &ResourceGroupModel,
    ) -> Result<ResourceGroupModel, ApiError>;
    fn patch_resource_group_tags(
        &self,
        name: &str,
        tags: &Tags,
    ) -> Result<ResourceGroupModel, ApiError>;

    fn get_disk(&self, resource_group: &str, name: &str) -> Result<DiskModel, ApiError>;
    /// Start creating a disk; completion is observed through [`ArmApi::poll_operation`]
    fn begin_create_disk(&self, resource_group: &str, disk: &DiskModel)
    -> Result<Operation, ApiError>;
    fn patch_disk_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> Result<DiskModel, ApiError>;

    fn get_availability_set(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<AvailabilitySetModel, ApiError>;
    fn create_availability_set(
        &self,
        resource_group: &str,
        set: &AvailabilitySetModel,
    ) -> Result<AvailabilitySetModel, ApiError>;
    fn patch_availability_set_tags(
        &self,
        resource_group: &str,
        name: &str,
        tags: &Tags,
    ) -> Result<AvailabilitySetModel, ApiError>;

    fn poll_operation(&self, operation: &Operation) -> Result<OperationStatus, ApiError>;
}
