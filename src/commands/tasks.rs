use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use reconcile::{TaskGraph, TaskSet};

use crate::Context;
use crate::cli::TasksArgs;
use crate::config::ClusterConfig;
use crate::model::build_tasks;
use crate::ui;

pub fn run(ctx: &Context, args: TasksArgs) -> Result<()> {
    let config = ClusterConfig::load(&args.cluster.file)?;
    let tasks = build_tasks(&config).context("Failed to build cluster model")?;

    if !ctx.quiet {
        ui::header(&format!("Tasks for cluster {}", config.cluster.name));
    }
    for line in describe(&tasks)? {
        println!("{line}");
    }
    Ok(())
}

/// One line per task in dependency order, with its lifecycle and dependencies
fn describe(tasks: &TaskSet) -> Result<Vec<String>> {
    let graph = TaskGraph::build(tasks)?;
    let mut lines = Vec::with_capacity(graph.len());

    for (n, index) in graph.topological_order().into_iter().enumerate() {
        let key = graph.key(index);
        let lifecycle = tasks
            .get(key)
            .map(|task| task.lifecycle().to_string())
            .unwrap_or_default();
        let deps: Vec<String> = graph
            .dependencies_of(index)
            .into_iter()
            .map(|d| graph.key(d).to_string())
            .collect();

        let mut line = format!(
            "{} {} {}",
            format!("{:>3}.", n + 1).blue(),
            key,
            format!("[{lifecycle}]").dimmed()
        );
        if !deps.is_empty() {
            line.push_str(&format!(" {} {}", "←".dimmed(), deps.join(", ")));
        }
        lines.push(line);
    }
    Ok(lines)
}
