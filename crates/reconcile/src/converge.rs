//! Per-task convergence pipeline
//!
//! `Resolving → Validating → Applying`. The lifecycle is consulted between
//! validation and apply, and a cancelled run never starts a render.

use crate::context::ApplyEnv;
use crate::error::TaskError;
use crate::lifecycle::{self, Decision};
use crate::resolve::resolve;
use crate::resource::Resource;
use crate::types::{TaskPhase, TaskStatus};
use crate::validate::plan_changes;

/// Successful result of one convergence pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    /// Fields the applied (or would-be) change carried
    pub changed_fields: Vec<String>,
    pub warnings: Vec<String>,
}

impl TaskOutcome {
    fn new(status: TaskStatus, changed_fields: Vec<String>) -> Self {
        Self {
            status,
            changed_fields,
            warnings: Vec::new(),
        }
    }

    fn warned(warning: String) -> Self {
        Self {
            status: TaskStatus::Unchanged,
            changed_fields: Vec::new(),
            warnings: vec![warning],
        }
    }
}

pub fn converge<R: Resource>(
    desired: &R,
    env: &ApplyEnv<'_>,
    on_phase: &mut dyn FnMut(TaskPhase),
) -> Result<TaskOutcome, TaskError> {
    let key = desired.key();
    let lifecycle = desired.lifecycle();

    on_phase(TaskPhase::Resolving);
    let actual = match resolve(desired, &env.ctx) {
        Ok(actual) => actual,
        Err(err) => {
            let warning = lifecycle::downgrade(&key, lifecycle, err)?;
            log::warn!("{warning}");
            return Ok(TaskOutcome::warned(warning));
        }
    };

    on_phase(TaskPhase::Validating);
    let changes = plan_changes(actual.as_ref(), desired)?;
    let fields: Vec<String> = changes.fields().iter().map(ToString::to_string).collect();

    let status = match lifecycle::decide(&key, lifecycle, actual.is_some(), changes.fields()) {
        Decision::Unchanged => return Ok(TaskOutcome::new(TaskStatus::Unchanged, Vec::new())),
        Decision::Warn(warning) => {
            log::warn!("{warning}");
            return Ok(TaskOutcome::warned(warning));
        }
        Decision::Fail(err) => return Err(err),
        Decision::Apply(status) => status,
    };

    if env.dry_run {
        log::info!("{key} would be {status} ({})", fields.join(", "));
        return Ok(TaskOutcome::new(status, fields));
    }

    env.ctx.cancel.check()?;
    on_phase(TaskPhase::Applying);
    log::debug!("{key}: applying {status} on {}", env.target.id());

    match env
        .renderers
        .dispatch(env.target, &env.ctx, actual.as_ref(), desired, &changes)
    {
        Ok(()) => Ok(TaskOutcome::new(status, fields)),
        Err(err) => {
            let warning = lifecycle::downgrade(&key, lifecycle, err)?;
            log::warn!("{warning}");
            Ok(TaskOutcome::warned(warning))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::context::{RunContext, Target};
    use crate::render::RenderRegistry;
    use crate::testing::{FakeCloud, FakeTarget, Widget, WidgetRenderer, FAKE};
    use crate::types::Lifecycle;
    use std::time::Duration;

    struct Fixture {
        target: FakeTarget,
        renderers: RenderRegistry,
        cancel: CancelToken,
    }

    impl Fixture {
        fn new() -> Self {
            let mut renderers = RenderRegistry::new();
            renderers.register::<Widget, _>(FAKE, WidgetRenderer);
            Self {
                target: FakeTarget::new(FakeCloud::default()),
                renderers,
                cancel: CancelToken::new(),
            }
        }

        fn run(&self, desired: &Widget, dry_run: bool) -> (Result<TaskOutcome, TaskError>, Vec<TaskPhase>) {
            let env = ApplyEnv {
                ctx: RunContext::new(self.target.cloud(), &self.cancel, Duration::from_secs(1)),
                target: &self.target,
                renderers: &self.renderers,
                dry_run,
            };
            let mut phases = Vec::new();
            let result = converge(desired, &env, &mut |phase| phases.push(phase));
            (result, phases)
        }
    }

    #[test]
    fn test_absent_resource_is_created_with_full_state() {
        let fx = Fixture::new();
        let (result, phases) = fx.run(&Widget::new("w").with_size(4).with_color("red"), false);

        let outcome = result.unwrap();
        assert_eq!(outcome.status, TaskStatus::Created);
        assert_eq!(outcome.changed_fields, vec!["Size", "Color"]);
        assert_eq!(
            phases,
            vec![TaskPhase::Resolving, TaskPhase::Validating, TaskPhase::Applying]
        );
        let stored = fx.target.fake().stored("w").unwrap();
        assert_eq!(stored.size.get(), Some(&4));
        assert_eq!(fx.target.fake().updates(), 0);
    }

    #[test]
    fn test_matching_resource_makes_no_mutation() {
        let fx = Fixture::new();
        fx.target.fake().seed(Widget::new("w").with_size(4));
        let (result, phases) = fx.run(&Widget::new("w").with_size(4), false);

        assert_eq!(result.unwrap().status, TaskStatus::Unchanged);
        assert!(!phases.contains(&TaskPhase::Applying));
        assert_eq!(fx.target.fake().mutations(), 0);
    }

    #[test]
    fn test_update_carries_changed_fields_only() {
        let fx = Fixture::new();
        fx.target.fake().seed(Widget::new("w").with_size(4).with_color("red"));
        let (result, _) = fx.run(&Widget::new("w").with_size(4).with_color("blue"), false);

        let outcome = result.unwrap();
        assert_eq!(outcome.status, TaskStatus::Updated);
        assert_eq!(outcome.changed_fields, vec!["Color"]);
        assert_eq!(fx.target.fake().last_update_fields(), vec!["Color"]);
    }

    #[test]
    fn test_immutable_violation_never_applies() {
        let fx = Fixture::new();
        fx.target.fake().seed(Widget::new("w").with_size(4));
        let (result, phases) = fx.run(&Widget::new("w").with_size(8), false);

        assert_eq!(result.unwrap_err(), TaskError::immutable("Size"));
        assert_eq!(phases.last(), Some(&TaskPhase::Validating));
        assert_eq!(fx.target.fake().mutations(), 0);
    }

    #[test]
    fn test_immutable_violation_fails_even_when_drift_only_warns() {
        let fx = Fixture::new();
        fx.target.fake().seed(Widget::new("w").with_size(4));
        let desired = Widget::new("w")
            .with_size(8)
            .with_lifecycle(Lifecycle::WarnIfChanged);
        let (result, _) = fx.run(&desired, false);
        assert!(matches!(result, Err(TaskError::ImmutableField { .. })));
    }

    #[test]
    fn test_warn_if_changed_leaves_drift() {
        let fx = Fixture::new();
        fx.target.fake().seed(Widget::new("w").with_color("red"));
        let desired = Widget::new("w")
            .with_color("blue")
            .with_lifecycle(Lifecycle::WarnIfChanged);
        let (result, _) = fx.run(&desired, false);

        let outcome = result.unwrap();
        assert_eq!(outcome.status, TaskStatus::Unchanged);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(fx.target.fake().mutations(), 0);
    }

    #[test]
    fn test_exists_and_validates_absent_fails() {
        let fx = Fixture::new();
        let desired = Widget::new("w").with_lifecycle(Lifecycle::ExistsAndValidates);
        let (result, _) = fx.run(&desired, false);
        assert!(matches!(result, Err(TaskError::MissingResource { .. })));
        assert_eq!(fx.target.fake().mutations(), 0);
    }

    #[test]
    fn test_insufficient_access_downgrades_to_warning() {
        let fx = Fixture::new();
        fx.target
            .fake()
            .fail_render("w", TaskError::Permission { message: "403".into() });
        let desired = Widget::new("w")
            .with_size(1)
            .with_lifecycle(Lifecycle::WarnIfInsufficientAccess);
        let (result, _) = fx.run(&desired, false);

        let outcome = result.unwrap();
        assert_eq!(outcome.status, TaskStatus::Unchanged);
        assert!(outcome.warnings[0].contains("permission denied"));
    }

    #[test]
    fn test_insufficient_access_on_lookup_downgrades_to_warning() {
        let fx = Fixture::new();
        fx.target
            .fake()
            .fail_find("w", TaskError::Permission { message: "403".into() });
        let desired = Widget::new("w")
            .with_size(1)
            .with_lifecycle(Lifecycle::WarnIfInsufficientAccess);
        let (result, phases) = fx.run(&desired, false);

        let outcome = result.unwrap();
        assert_eq!(outcome.status, TaskStatus::Unchanged);
        assert!(outcome.warnings[0].contains("permission denied"));
        assert_eq!(phases, vec![TaskPhase::Resolving]);
        assert_eq!(fx.target.fake().mutations(), 0);
    }

    #[test]
    fn test_lookup_permission_error_fails_sync_task() {
        let fx = Fixture::new();
        fx.target
            .fake()
            .fail_find("w", TaskError::Permission { message: "403".into() });
        let (result, _) = fx.run(&Widget::new("w").with_size(1), false);
        assert!(matches!(result, Err(TaskError::Permission { .. })));
    }

    #[test]
    fn test_dry_run_reports_would_be_action() {
        let fx = Fixture::new();
        let (result, phases) = fx.run(&Widget::new("w").with_size(4), true);

        assert_eq!(result.unwrap().status, TaskStatus::Created);
        assert!(!phases.contains(&TaskPhase::Applying));
        assert_eq!(fx.target.fake().mutations(), 0);
    }
}
