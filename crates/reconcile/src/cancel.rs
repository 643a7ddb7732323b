//! Run-wide cancellation signal
//!
//! One token is shared by the scheduler loop and every in-flight provider
//! call. It trips on an explicit `cancel()` or when its deadline passes.

use crate::error::TaskError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Token that only trips on explicit cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once `deadline` passes
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Token sharing this one's abort flag with a deadline no later than
    /// `now + timeout`
    pub fn tightened(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
        }
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.deadline_passed()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn deadline_passed(&self) -> bool {
        self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Return `Err(Cancelled)` once the token has tripped
    pub fn check(&self) -> Result<(), TaskError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(TaskError::Cancelled {
                reason: "run aborted".to_string(),
            });
        }
        if self.deadline_passed() {
            return Err(TaskError::Cancelled {
                reason: "run deadline elapsed".to_string(),
            });
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early with an error when cancelled
    pub fn sleep(&self, duration: Duration) -> Result<(), TaskError> {
        let until = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep((until - now).min(SLEEP_SLICE));
        }
    }
}
