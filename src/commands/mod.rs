//! Command implementations
//!
//! - `update`: preview, confirm, converge
//! - `preview`: plan only
//! - `tasks`: list the task graph

pub mod preview;
pub mod tasks;
pub mod update;

use crate::cli::ClusterArgs;
use crate::cloud::{ArmCloud, AzureApiTarget, PlanEntry, PlanTarget, SimulatedArm};
use crate::config::{ClusterConfig, EngineOverrides};
use crate::model::build_tasks;
use anyhow::{Context as AnyhowContext, Result};
use reconcile::{CancelToken, Engine, RunObserver, RunReport, TaskSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Loaded cluster file, its tasks, and the cloud they converge against
pub(crate) struct Session {
    pub config: ClusterConfig,
    pub tasks: TaskSet,
    pub arm: Arc<SimulatedArm>,
    pub cloud: Arc<ArmCloud>,
    pub state_path: PathBuf,
}

impl Session {
    pub fn open(args: &ClusterArgs) -> Result<Self> {
        let config = ClusterConfig::load(&args.file)?;
        let tasks = build_tasks(&config).context("Failed to build cluster model")?;
        log::debug!("Built {} task(s) from {}", tasks.len(), args.file.display());

        let state_path = match &args.state {
            Some(path) => path.clone(),
            None => config.state_path()?,
        };
        let arm = Arc::new(
            SimulatedArm::open(&state_path)?
                .with_provisioning_polls(config.cloud.provisioning_polls),
        );
        let cloud = ArmCloud::new(
            arm.clone(),
            config.cluster.region.clone(),
            config.cluster.resource_group.clone(),
        )
        .with_retry(config.engine.retry.retry_config())
        .with_poll_interval(Duration::from_millis(config.cloud.poll_interval_ms));

        Ok(Self {
            config,
            tasks,
            arm,
            cloud: Arc::new(cloud),
            state_path,
        })
    }

    fn engine(&self, overrides: &EngineOverrides) -> Engine {
        Engine::new(
            self.config.engine_options(overrides),
            crate::tasks::renderers(),
        )
    }

    /// Resolve and validate every task, recording intended operations
    pub fn plan(&self, overrides: &EngineOverrides) -> Result<(RunReport, Vec<PlanEntry>)> {
        let overrides = EngineOverrides {
            dry_run: false,
            ..overrides.clone()
        };
        let target = Arc::new(PlanTarget::new(self.cloud.clone()));
        let report = self
            .engine(&overrides)
            .run(
                &self.tasks,
                target.clone(),
                &CancelToken::new(),
                &mut reconcile::NoObserver,
            )
            .context("Failed to plan changes")?;
        Ok((report, target.entries()))
    }

    /// Converge against the live adapter
    pub fn apply(
        &self,
        overrides: &EngineOverrides,
        observer: &mut dyn RunObserver,
    ) -> Result<RunReport> {
        let target = Arc::new(AzureApiTarget::new(self.cloud.clone()));
        let report = self
            .engine(overrides)
            .run(&self.tasks, target, &CancelToken::new(), observer)
            .context("Failed to run update")?;
        log::info!(
            "Run finished: {} change(s), {} mutating call(s) so far",
            report.summary.changes(),
            self.arm.mutations()
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cloud::PlanAction;
    use reconcile::{NoObserver, TaskStatus};
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn cluster_file(temp: &TempDir, size_gb: u32) -> ClusterArgs {
        cluster_file_with(temp, &[("etcd", size_gb)])
    }

    /// Cluster file with one volume per `(name, size_gb)`
    pub(crate) fn cluster_file_with(temp: &TempDir, volumes: &[(&str, u32)]) -> ClusterArgs {
        let state = temp.path().join("state.json");
        let volumes: String = volumes
            .iter()
            .map(|(name, size_gb)| format!("\n[[volumes]]\nname = \"{name}\"\nsize_gb = {size_gb}\n"))
            .collect();
        let content = format!(
            r#"
[cluster]
name = "c1"
region = "westeurope"
resource_group = "rg-c1"

[[instance_groups]]
name = "nodes"
role = "node"
{volumes}
[cloud]
state_file = "{}"
poll_interval_ms = 1
provisioning_polls = 1
"#,
            state.display()
        );
        let file = temp.path().join("cluster.toml");
        fs::write(&file, content).unwrap();
        ClusterArgs { file, state: None }
    }

    #[test]
    fn test_plan_then_apply_then_converged() {
        let temp = TempDir::new().unwrap();
        let args = cluster_file(&temp, 20);
        let overrides = EngineOverrides::default();

        let session = Session::open(&args).unwrap();
        let (report, plan) = session.plan(&overrides).unwrap();
        assert!(report.is_success());
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|e| e.action == PlanAction::Create));
        assert_eq!(session.arm.mutations(), 0);

        let report = session.apply(&overrides, &mut NoObserver).unwrap();
        assert_eq!(report.summary.created, 3);
        assert!(session.state_path.exists());

        // A fresh process sees the persisted state
        let session = Session::open(&args).unwrap();
        let (report, plan) = session.plan(&overrides).unwrap();
        assert!(plan.is_empty());
        assert_eq!(report.summary.unchanged, 3);
    }

    #[test]
    fn test_resize_fails_in_plan() {
        let temp = TempDir::new().unwrap();
        let session = Session::open(&cluster_file(&temp, 20)).unwrap();
        session
            .apply(&EngineOverrides::default(), &mut NoObserver)
            .unwrap();

        let session = Session::open(&cluster_file(&temp, 40)).unwrap();
        let (report, plan) = session.plan(&EngineOverrides::default()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.failed().next().unwrap().key.name, "etcd-c1");
    }

    #[test]
    fn test_dry_run_never_mutates() {
        let temp = TempDir::new().unwrap();
        let session = Session::open(&cluster_file(&temp, 20)).unwrap();
        let overrides = EngineOverrides {
            dry_run: true,
            ..EngineOverrides::default()
        };

        let report = session.apply(&overrides, &mut NoObserver).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.summary.created, 3);
        assert!(report.tasks.iter().all(|t| t.status == TaskStatus::Created));
        assert_eq!(session.arm.mutations(), 0);
    }

    #[test]
    fn test_state_flag_overrides_config() {
        let temp = TempDir::new().unwrap();
        let mut args = cluster_file(&temp, 20);
        let state = temp.path().join("elsewhere.json");
        args.state = Some(state.clone());

        let session = Session::open(&args).unwrap();
        assert_eq!(session.state_path, state);
    }
}
