//! Periodic refresh tasks with an explicit failure policy
//!
//! The gateway runs two independent refresh loops: credential reissue and
//! directory refresh. They share the same scheduling shape and differ only
//! in what a failed tick means, so the policy is an explicit parameter
//! instead of being baked into each loop.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What a failed refresh tick means for the task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The task stops and resolves with the error; the process treats this
    /// as unrecoverable
    Fatal,
    /// The error is logged and the task waits for the next tick; no backoff
    Continue,
}

/// Spawn a periodic refresh task
///
/// Returns `None` when `period` is `None` (the loop is disabled through
/// configuration). The first run happens one full period after spawn; ticks
/// missed while a refresh is in flight are delayed, not bursted.
///
/// With [`FailurePolicy::Continue`] the task runs forever. With
/// [`FailurePolicy::Fatal`] the task resolves with the first error, and the
/// caller decides process fate.
pub fn spawn_refresh<F, Fut>(
    task: &'static str,
    period: Option<Duration>,
    policy: FailurePolicy,
    mut op: F,
) -> Option<JoinHandle<crate::Result<()>>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = crate::Result<()>> + Send + 'static,
{
    let Some(period) = period else {
        info!(task, "periodic refresh disabled");
        return None;
    };

    info!(task, period_secs = period.as_secs(), "starting periodic refresh");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // first refresh happens one full period after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!(task, "refresh tick");
            match op().await {
                Ok(()) => {}
                Err(e) => match policy {
                    FailurePolicy::Continue => {
                        warn!(task, error = %e, "refresh failed; retrying on next tick");
                    }
                    FailurePolicy::Fatal => {
                        error!(task, error = %e, "refresh failed; stopping");
                        return Err(e);
                    }
                },
            }
        }
    }))
}
