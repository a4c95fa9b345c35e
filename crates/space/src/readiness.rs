//! Fixed-interval readiness polling.
//!
//! Polls an [`EscalationSink`] until it reports `running`, the attempt
//! budget is spent, or the [`CancellationToken`] is triggered. Both the
//! poll and the wait between polls observe cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sink::{EscalationSink, SinkError};

/// Polling cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Wait between consecutive polls.
    pub interval: Duration,
    /// Total polls before giving up.
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    /// Never reported `running`. Carries the most recent poll error, if
    /// any poll failed.
    #[error("Not ready after {attempts} attempts")]
    TimedOut {
        attempts: u32,
        last_error: Option<SinkError>,
    },

    #[error("Readiness wait cancelled")]
    Cancelled,
}

/// Poll `location_id` until it is running.
///
/// Returns the attempt number (1-based) on which it was.
pub async fn wait_until_ready<S: EscalationSink>(
    sink: &S,
    location_id: &str,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<u32, ReadinessError> {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessError::Cancelled),
            polled = sink.poll_readiness(location_id) => polled,
        };

        match polled {
            Ok(status) if status.is_running() => {
                tracing::info!(location_id, attempt, status = %status, "Escalation target ready");
                return Ok(attempt);
            }
            Ok(status) => {
                tracing::info!(
                    location_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    status = %status,
                    "Escalation target not ready",
                );
            }
            Err(e) => {
                tracing::warn!(
                    location_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Readiness poll failed",
                );
                last_error = Some(e);
            }
        }

        if attempt == policy.max_attempts {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReadinessError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }

    Err(ReadinessError::TimedOut {
        attempts: policy.max_attempts,
        last_error,
    })
}
