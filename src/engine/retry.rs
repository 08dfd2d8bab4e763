use std::future::Future;
use std::time::Duration;

use crate::engine::session::{ExecutionUnit, Session};
use crate::errors::{AgentError, AgentResult};

/// Sleeps are sliced so cancellation latency is bounded by the slice size.
pub const SLEEP_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Budget for the first capture of an iteration.
pub const PRIMARY_CAPTURE: RetryPolicy = RetryPolicy {
    max_attempts: 5,
    delay: Duration::from_secs(2),
};

/// Budget for the re-capture pass taken when the primary artifact's encoded
/// payload turns out empty.
pub const SECONDARY_CAPTURE: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    delay: Duration::from_secs(1),
};

fn cancelled(session: &Session, unit: &ExecutionUnit) -> bool {
    session.is_interrupted() || unit.is_cancelled()
}

/// Sleeps `total`, checking the session flag and the unit token before every
/// ≤500 ms slice. Returns `Cancelled` as soon as either fires.
pub async fn cancellable_sleep(
    session: &Session,
    unit: &ExecutionUnit,
    total: Duration,
) -> AgentResult<()> {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancelled(session, unit) {
            return Err(AgentError::Cancelled);
        }
        let slice = remaining.min(SLEEP_SLICE);
        tokio::time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
    Ok(())
}

/// Runs `op` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between failures. Cancellation is checked before every attempt and before
/// every sleep; once observed, the engine stops with no further attempts.
/// Exhausting the budget yields the terminal `CaptureFailed` error.
pub async fn acquire_with_retry<T, F, Fut>(
    session: &Session,
    unit: &ExecutionUnit,
    policy: RetryPolicy,
    mut op: F,
) -> AgentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult<T>>,
{
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.max_attempts {
        if cancelled(session, unit) {
            tracing::debug!(attempt, "cancellation observed before attempt");
            return Err(AgentError::Cancelled);
        }

        match op().await {
            Ok(value) => {
                tracing::debug!(attempt, "acquire succeeded");
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(attempt, max = policy.max_attempts, error = %e, "acquire attempt failed");
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            cancellable_sleep(session, unit, policy.delay).await?;
        }
    }

    Err(AgentError::CaptureFailed {
        attempts: policy.max_attempts,
        last_error,
    })
}
