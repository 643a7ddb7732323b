use crate::cloud::StorageSku;
use anyhow::{Context, Result, bail};
use reconcile::{EngineOptions, Lifecycle, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cluster file looked up in the working directory
pub const DEFAULT_CLUSTER_FILE: &str = "cluster.toml";

/// Get the directory the simulated control plane keeps its state in
pub fn state_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("clusterup"));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("clusterup"))
}

// ============================================================================
// Cluster Config
// ============================================================================

/// Declarative cluster file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster: ClusterSpec,
    #[serde(default)]
    pub instance_groups: Vec<InstanceGroupSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub cloud: CloudSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub region: String,
    pub resource_group: String,
    /// The resource group is owned by someone else and must already exist
    #[serde(default)]
    pub shared_resource_group: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Node,
    Bastion,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Master => "master",
            Self::Node => "node",
            Self::Bastion => "bastion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceGroupSpec {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub size_gb: u32,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub volume_type: Option<StorageSku>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
}

// ============================================================================
// Engine and Cloud Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Maximum tasks applying at once
    pub jobs: usize,
    /// Whole-run deadline; unbounded when absent
    pub timeout_secs: Option<u64>,
    /// How long in-flight tasks may finish after cancellation
    pub grace_secs: u64,
    /// Bound for one long-running provider operation
    pub operation_timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineOptions::default();
        Self {
            jobs: defaults.jobs,
            timeout_secs: None,
            grace_secs: defaults.grace.as_secs(),
            operation_timeout_secs: defaults.operation_timeout.as_secs(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSection {
    /// Simulated control plane state; defaults to `<state dir>/<cluster>.json`
    pub state_file: Option<String>,
    pub poll_interval_ms: u64,
    /// Polls a disk creation takes to finish
    pub provisioning_polls: u32,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            state_file: None,
            poll_interval_ms: 2000,
            provisioning_polls: 2,
        }
    }
}

/// Command-line overrides for the `[engine]` section
#[derive(Debug, Clone, Default)]
pub struct EngineOverrides {
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub dry_run: bool,
}

impl ClusterConfig {
    /// Load a cluster file; `.json` files are read as JSON, everything else as TOML
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid cluster file {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid cluster file {}", path.display()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.cluster.name.trim().is_empty() {
            bail!("cluster.name must not be empty");
        }
        if self.cluster.region.trim().is_empty() {
            bail!("cluster.region must not be empty");
        }
        if self.engine.jobs == 0 {
            bail!("engine.jobs must be at least 1");
        }
        for ig in &self.instance_groups {
            if ig.name.trim().is_empty() {
                bail!("instance group name must not be empty");
            }
        }
        for volume in &self.volumes {
            if volume.size_gb == 0 {
                bail!("volume {}: size_gb must be greater than zero", volume.name);
            }
        }
        Ok(())
    }

    /// Lifecycle of the cluster resource group
    pub fn resource_group_lifecycle(&self) -> Lifecycle {
        if self.cluster.shared_resource_group {
            Lifecycle::ExistsAndValidates
        } else {
            Lifecycle::Sync
        }
    }

    pub fn engine_options(&self, overrides: &EngineOverrides) -> EngineOptions {
        EngineOptions {
            jobs: overrides.jobs.unwrap_or(self.engine.jobs).max(1),
            operation_timeout: Duration::from_secs(self.engine.operation_timeout_secs),
            grace: Duration::from_secs(self.engine.grace_secs),
            deadline: overrides
                .timeout_secs
                .or(self.engine.timeout_secs)
                .map(Duration::from_secs),
            dry_run: overrides.dry_run,
        }
    }

    /// Get the expanded state file path
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.cloud.state_file {
            Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).as_ref())),
            None => Ok(state_dir()?.join(format!("{}.json", self.cluster.name))),
        }
    }
}
