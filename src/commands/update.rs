use anyhow::Result;
use dialoguer::Confirm;

use super::Session;
use super::preview::{display_plan, display_problems, print_cluster};
use crate::Context;
use crate::cli::UpdateArgs;
use crate::config::EngineOverrides;
use crate::progress::RunProgress;
use crate::ui;

pub fn run(ctx: &Context, args: UpdateArgs) -> Result<()> {
    let session = Session::open(&args.cluster)?;
    let overrides = EngineOverrides {
        jobs: args.jobs,
        timeout_secs: args.timeout,
        dry_run: args.dry_run,
    };
    let interactive = !args.json;

    if interactive && !ctx.quiet {
        print_cluster(&session);
    }

    let (preview, plan) = session.plan(&overrides)?;
    if interactive {
        display_plan(&plan);
        display_problems(&preview);
    }

    if plan.is_empty() {
        if !interactive {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        } else if preview.is_success() {
            ui::success("Cluster is up to date");
        }
        preview.ensure_success()?;
        return Ok(());
    }

    // Failing tasks only hold back their dependents; the rest still converge
    if interactive && !preview.is_success() {
        ui::warn(&format!(
            "{} task(s) will fail or be skipped; independent changes are still applied",
            preview.summary.failed + preview.summary.skipped
        ));
    }

    if !args.dry_run && !args.yes && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    let mut progress = RunProgress::new(ctx.quiet || args.json);
    let report = session.apply(&overrides, &mut progress)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        ui::section(if args.dry_run { "Dry Run" } else { "Results" });
        ui::print_report(&report);
    }

    report.ensure_success()?;
    Ok(())
}

fn confirm_proceed() -> Result<bool> {
    println!();
    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{cluster_file, cluster_file_with};
    use reconcile::{EngineError, NoObserver, TaskStatus};
    use tempfile::TempDir;

    fn args(cluster: crate::cli::ClusterArgs) -> UpdateArgs {
        UpdateArgs {
            cluster,
            yes: true,
            jobs: None,
            timeout: None,
            dry_run: false,
            json: true,
        }
    }

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    #[test]
    fn test_failing_disk_does_not_block_independent_disk() {
        let temp = TempDir::new().unwrap();
        let first = Session::open(&cluster_file(&temp, 20)).unwrap();
        first
            .apply(&EngineOverrides::default(), &mut NoObserver)
            .unwrap();

        let cluster = cluster_file_with(&temp, &[("etcd", 40), ("data", 10)]);
        let err = run(&ctx(), args(cluster.clone())).unwrap_err();
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::PartialRunFailure { failed, skipped }) => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].name, "etcd-c1");
                assert!(skipped.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let session = Session::open(&cluster).unwrap();
        assert_eq!(
            session.arm.disk("rg-c1", "data-c1").unwrap().disk_size_gb,
            10
        );
        assert_eq!(session.arm.disk("rg-c1", "etcd-c1").unwrap().disk_size_gb, 20);

        let (report, plan) = session.plan(&EngineOverrides::default()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(report.summary.failed, 1);
        assert_eq!(
            report.status_of(&reconcile::TaskKey::new("Disk", "data-c1")),
            Some(TaskStatus::Unchanged)
        );
    }

    #[test]
    fn test_converged_cluster_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let cluster = cluster_file(&temp, 20);
        run(&ctx(), args(cluster.clone())).unwrap();

        let session = Session::open(&cluster).unwrap();
        assert!(session.arm.disk("rg-c1", "etcd-c1").is_some());
        run(&ctx(), args(cluster)).unwrap();
    }

    #[test]
    fn test_failure_with_nothing_to_apply_exits_non_zero() {
        let temp = TempDir::new().unwrap();
        run(&ctx(), args(cluster_file(&temp, 20))).unwrap();

        let err = run(&ctx(), args(cluster_file(&temp, 40))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::PartialRunFailure { .. })
        ));
    }
}
