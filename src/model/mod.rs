//! Model builders
//!
//! Turn a [`ClusterConfig`] into the task set for one cluster. Builders
//! share an [`AzureModelContext`] and only ever add tasks; the engine works
//! out ordering from the tasks' dependencies.

mod autoscaling_group;
mod resource_group;
mod volume;

pub use autoscaling_group::AutoscalingGroupBuilder;
pub use resource_group::ResourceGroupBuilder;
pub use volume::VolumeBuilder;

use crate::cloud::Tags;
use crate::config::ClusterConfig;
use anyhow::{Result, bail};
use reconcile::{EngineError, ModelBuilder, TaskSet, build_model};
use regex::Regex;

/// Tag carrying the owning cluster's name on every tagged resource
pub const CLUSTER_TAG: &str = "clusterup.io/cluster";

/// Shared inputs of every Azure model builder
pub struct AzureModelContext<'a> {
    pub cluster: &'a ClusterConfig,
}

impl<'a> AzureModelContext<'a> {
    pub fn new(cluster: &'a ClusterConfig) -> Self {
        Self { cluster }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster.cluster.name
    }

    pub fn region(&self) -> &str {
        &self.cluster.cluster.region
    }

    /// Resource name scoped to this cluster
    pub fn safe_object_name(&self, name: &str) -> String {
        format!("{name}-{}", self.cluster_name())
    }

    /// Configured cluster tags plus the ownership tag
    pub fn cluster_tags(&self) -> Tags {
        let mut tags = self.cluster.cluster.tags.clone();
        tags.insert(CLUSTER_TAG.to_string(), self.cluster_name().to_string());
        tags
    }
}

/// Azure naming rules per resource type
#[derive(Debug, Clone, Copy)]
pub enum NameRule {
    ResourceGroup,
    Disk,
    AvailabilitySet,
}

impl NameRule {
    fn pattern(self) -> &'static str {
        match self {
            Self::ResourceGroup => r"^[-A-Za-z0-9_.()]{0,89}[-A-Za-z0-9_()]$",
            Self::Disk | Self::AvailabilitySet => {
                r"^[A-Za-z0-9](?:[-A-Za-z0-9_.]{0,78}[A-Za-z0-9_])?$"
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource group",
            Self::Disk => "disk",
            Self::AvailabilitySet => "availability set",
        }
    }

    pub fn check(self, name: &str) -> Result<()> {
        let re = Regex::new(self.pattern())?;
        if !re.is_match(name) {
            bail!(
                "invalid {} name {name:?}: must match {}",
                self.label(),
                self.pattern()
            );
        }
        Ok(())
    }
}

/// Build every task of the cluster
pub fn build_tasks(config: &ClusterConfig) -> Result<TaskSet, EngineError> {
    let ctx = AzureModelContext::new(config);
    let builders: [&dyn ModelBuilder; 3] = [
        &ResourceGroupBuilder { ctx: &ctx },
        &AutoscalingGroupBuilder { ctx: &ctx },
        &VolumeBuilder { ctx: &ctx },
    ];
    build_model(&builders)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{ClusterConfig, ClusterSpec, InstanceGroupSpec, Role, VolumeSpec};
    use crate::tasks::{AvailabilitySet, Disk, ResourceGroup};
    use reconcile::{Lifecycle, Resource, TaskGraph, TaskKey};
    use std::collections::BTreeMap;

    pub(crate) fn config() -> ClusterConfig {
        ClusterConfig {
            cluster: ClusterSpec {
                name: "c1".to_string(),
                region: "westeurope".to_string(),
                resource_group: "rg-c1".to_string(),
                shared_resource_group: false,
                tags: BTreeMap::from([("team".to_string(), "platform".to_string())]),
            },
            instance_groups: vec![
                InstanceGroupSpec {
                    name: "master-1".to_string(),
                    role: Role::Master,
                    lifecycle: None,
                },
                InstanceGroupSpec {
                    name: "nodes".to_string(),
                    role: Role::Node,
                    lifecycle: None,
                },
            ],
            volumes: vec![VolumeSpec {
                name: "etcd-main".to_string(),
                size_gb: 20,
                zone: Some("1".to_string()),
                volume_type: None,
                tags: BTreeMap::new(),
                lifecycle: None,
            }],
            engine: Default::default(),
            cloud: Default::default(),
        }
    }

    #[test]
    fn test_safe_object_name() {
        let config = config();
        let ctx = AzureModelContext::new(&config);
        assert_eq!(ctx.safe_object_name("nodes"), "nodes-c1");
        assert_eq!(ctx.cluster_tags()[CLUSTER_TAG], "c1");
        assert_eq!(ctx.cluster_tags()["team"], "platform");
    }

    #[test]
    fn test_build_tasks() {
        let tasks = build_tasks(&config()).unwrap();

        assert_eq!(tasks.len(), 4);
        assert!(tasks.find::<ResourceGroup>("rg-c1").is_some());
        assert!(tasks.find::<AvailabilitySet>("master-1-c1").is_some());
        assert!(tasks.find::<AvailabilitySet>("nodes-c1").is_some());
        assert!(tasks.find::<Disk>("etcd-main-c1").is_some());
    }

    #[test]
    fn test_everything_waits_for_the_resource_group() {
        let tasks = build_tasks(&config()).unwrap();
        let graph = TaskGraph::build(&tasks).unwrap();
        let order = graph.topological_order();

        let group = TaskKey::new(ResourceGroup::KIND, "rg-c1");
        assert_eq!(graph.key(order[0]), &group);
        let disk = tasks.position(&TaskKey::new(Disk::KIND, "etcd-main-c1")).unwrap();
        let deps: Vec<&TaskKey> = graph
            .dependencies_of(disk)
            .into_iter()
            .map(|i| graph.key(i))
            .collect();
        assert_eq!(deps, vec![&group]);
    }

    #[test]
    fn test_duplicate_instance_groups_are_rejected() {
        let mut config = config();
        config.instance_groups.push(config.instance_groups[1].clone());

        match build_tasks(&config).unwrap_err() {
            EngineError::DuplicateTask(key) => {
                assert_eq!(key, TaskKey::new(AvailabilitySet::KIND, "nodes-c1"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_invalid_names_fail_the_build() {
        let mut config = config();
        config.volumes[0].name = "etcd main".to_string();

        match build_tasks(&config).unwrap_err() {
            EngineError::Build { builder, message } => {
                assert_eq!(builder, "volumes");
                assert!(message.contains("invalid disk name"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_shared_resource_group_is_validated_only() {
        let mut config = config();
        config.cluster.shared_resource_group = true;
        let tasks = build_tasks(&config).unwrap();
        let group = tasks.find::<ResourceGroup>("rg-c1").unwrap();

        assert_eq!(group.lifecycle, Lifecycle::ExistsAndValidates);
        assert!(group.tags.is_unset());
    }

    #[test]
    fn test_name_rules() {
        assert!(NameRule::ResourceGroup.check("rg_c1.(prod)").is_ok());
        assert!(NameRule::ResourceGroup.check("ends-with-dot.").is_err());
        assert!(NameRule::ResourceGroup.check(&"a".repeat(91)).is_err());
        assert!(NameRule::Disk.check("d").is_ok());
        assert!(NameRule::Disk.check("-leading-dash").is_err());
        assert!(NameRule::AvailabilitySet.check("trailing.").is_err());
        assert!(NameRule::AvailabilitySet.check(&"a".repeat(80)).is_ok());
        assert!(NameRule::AvailabilitySet.check(&"a".repeat(81)).is_err());
    }
}
