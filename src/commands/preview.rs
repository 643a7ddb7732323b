use anyhow::Result;
use colored::Colorize;
use reconcile::{RunReport, TaskStatus};

use super::Session;
use crate::Context;
use crate::cli::PreviewArgs;
use crate::cloud::{PlanAction, PlanEntry};
use crate::config::EngineOverrides;
use crate::ui;

pub fn run(ctx: &Context, args: PreviewArgs) -> Result<()> {
    let session = Session::open(&args.cluster)?;
    let (report, plan) = session.plan(&EngineOverrides::default())?;

    if args.json {
        let out = serde_json::json!({ "plan": plan, "report": report });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if !ctx.quiet {
            print_cluster(&session);
        }
        display_plan(&plan);
        display_problems(&report);
    }

    report.ensure_success()?;
    Ok(())
}

pub(crate) fn print_cluster(session: &Session) {
    let cluster = &session.config.cluster;
    ui::header(&format!("Cluster {}", cluster.name));
    ui::kv("Region", &cluster.region);
    ui::kv("Resource group", &cluster.resource_group);
    ui::kv("Tasks", &session.tasks.len().to_string());
    ui::kv("State", &session.state_path.display().to_string());
}

/// Draw the plan box
pub(crate) fn display_plan(entries: &[PlanEntry]) {
    if entries.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Planned Changes".bold()
    );
    println!("│");
    for entry in entries {
        let symbol = match entry.action {
            PlanAction::Create => "+".green(),
            PlanAction::Update => "~".yellow(),
        };
        println!("│  {} {}", symbol, entry.key);
        for detail in &entry.details {
            println!("│      {}", detail.dimmed());
        }
    }
    println!("│");

    let creates = entries
        .iter()
        .filter(|e| e.action == PlanAction::Create)
        .count();
    let updates = entries.len() - creates;
    println!(
        "│  {} to create, {} to update",
        creates.to_string().green(),
        updates.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Print tasks that warned, failed or were skipped while planning
pub(crate) fn display_problems(report: &RunReport) {
    let warned: Vec<_> = report
        .tasks
        .iter()
        .filter(|t| !t.warnings.is_empty())
        .collect();
    for task in &warned {
        for warning in &task.warnings {
            ui::warn(warning);
        }
    }

    for task in report.failed() {
        let reason = task
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        ui::error(&format!("{}: {}", task.key, reason));
        if let Some(category) = task.error_category {
            ui::dim(category.advice());
        }
    }

    let skipped = report.keys_with(TaskStatus::Skipped);
    if !skipped.is_empty() {
        let names: Vec<String> = skipped.iter().map(ToString::to_string).collect();
        ui::dim(&format!("Skipped: {}", names.join(", ")));
    }
}
