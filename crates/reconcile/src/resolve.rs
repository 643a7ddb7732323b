//! State resolution
//!
//! Provider "not found" means absent. Any other failure is an error, so
//! throttling or an auth problem can never be mistaken for a missing
//! resource and drive a create.

use crate::context::RunContext;
use crate::error::TaskError;
use crate::resource::Resource;

/// Look up the actual state of `desired` by its identity
pub fn resolve<R: Resource>(desired: &R, ctx: &RunContext<'_>) -> Result<Option<R>, TaskError> {
    ctx.cancel.check()?;

    let actual = match desired.find(ctx) {
        Ok(actual) => actual,
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };

    if let Some(found) = &actual
        && found.name() != desired.name()
    {
        return Err(TaskError::provider(format!(
            "lookup for {} returned {}",
            desired.key(),
            found.key()
        )));
    }

    match &actual {
        Some(_) => log::debug!("{} exists", desired.key()),
        None => log::debug!("{} does not exist", desired.key()),
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::testing::{FakeCloud, Widget};
    use std::time::Duration;

    fn ctx<'a>(cloud: &'a FakeCloud, cancel: &'a CancelToken) -> RunContext<'a> {
        RunContext::new(cloud, cancel, Duration::from_secs(1))
    }

    #[test]
    fn test_not_found_is_absent() {
        let cloud = FakeCloud::default();
        let cancel = CancelToken::new();
        assert_eq!(resolve(&Widget::new("w"), &ctx(&cloud, &cancel)).unwrap(), None);
    }

    #[test]
    fn test_existing_resource_is_returned() {
        let cloud = FakeCloud::default();
        cloud.seed(Widget::new("w").with_size(3));
        let cancel = CancelToken::new();
        let actual = resolve(&Widget::new("w"), &ctx(&cloud, &cancel)).unwrap();
        assert_eq!(actual.and_then(|w| w.size.get().copied()), Some(3));
    }

    #[test]
    fn test_other_errors_are_not_absence() {
        let cloud = FakeCloud::default();
        cloud.fail_find("w", TaskError::Permission { message: "403".into() });
        let cancel = CancelToken::new();
        let err = resolve(&Widget::new("w"), &ctx(&cloud, &cancel)).unwrap_err();
        assert!(matches!(err, TaskError::Permission { .. }));
    }

    #[test]
    fn test_cancelled_run_never_queries() {
        let cloud = FakeCloud::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(resolve(&Widget::new("w"), &ctx(&cloud, &cancel)).is_err());
        assert_eq!(cloud.finds(), 0);
    }
}
