use super::{AzureModelContext, NameRule};
use crate::tasks::ResourceGroup;
use anyhow::Result;
use reconcile::{Lifecycle, ModelBuilder, ModelBuilderContext};

/// The resource group every other cluster resource lives in
pub struct ResourceGroupBuilder<'a> {
    pub ctx: &'a AzureModelContext<'a>,
}

impl ModelBuilder for ResourceGroupBuilder<'_> {
    fn name(&self) -> &'static str {
        "resource-group"
    }

    fn build(&self, c: &mut ModelBuilderContext) -> Result<()> {
        let config = self.ctx.cluster;
        let name = config.cluster.resource_group.as_str();
        NameRule::ResourceGroup.check(name)?;

        let lifecycle = config.resource_group_lifecycle();
        let mut group = ResourceGroup::new(name, self.ctx.region()).with_lifecycle(lifecycle);
        // Tags of a shared group belong to its owner
        if lifecycle != Lifecycle::ExistsAndValidates {
            group = group.with_tags(self.ctx.cluster_tags());
        }
        c.add_task(group)?;
        Ok(())
    }
}
