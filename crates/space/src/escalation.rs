//! One-shot escalation: wait for readiness, then activate once.

use tokio_util::sync::CancellationToken;

use crate::readiness::{wait_until_ready, ReadinessError, ReadinessPolicy};
use crate::sink::{EscalationSink, EscalationTarget, SinkError};

/// How an escalation attempt ended.
#[derive(Debug)]
pub enum EscalationOutcome {
    /// Ready on poll `attempts` and activated.
    Activated { attempts: u32 },
    /// Never ready within the attempt budget; activation was not tried.
    NotReady {
        attempts: u32,
        last_error: Option<SinkError>,
    },
    /// Ready, but activation failed.
    ActivationFailed(SinkError),
    /// Operator interrupt while waiting or activating.
    Cancelled,
}

impl EscalationOutcome {
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated { .. })
    }
}

/// Escalate to `target` through `sink`.
///
/// Never retries activation. Every failure is logged here and reported
/// through the returned outcome.
pub async fn escalate<S: EscalationSink>(
    sink: &S,
    target: &EscalationTarget,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> EscalationOutcome {
    tracing::info!(
        location_id = %target.location_id,
        interval_secs = policy.interval.as_secs_f64(),
        max_attempts = policy.max_attempts,
        "Escalating, waiting for target readiness",
    );

    let attempts = match wait_until_ready(sink, &target.location_id, policy, cancel).await {
        Ok(attempts) => attempts,
        Err(ReadinessError::Cancelled) => {
            tracing::info!("Escalation cancelled while waiting for readiness");
            return EscalationOutcome::Cancelled;
        }
        Err(ReadinessError::TimedOut {
            attempts,
            last_error,
        }) => {
            tracing::error!(
                location_id = %target.location_id,
                attempts,
                last_error = ?last_error,
                "Escalation target never became ready",
            );
            return EscalationOutcome::NotReady {
                attempts,
                last_error,
            };
        }
    };

    let activated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Escalation cancelled before activation completed");
            return EscalationOutcome::Cancelled;
        }
        activated = sink.activate(&target.location_url) => activated,
    };

    match activated {
        Ok(()) => {
            tracing::info!(url = %target.location_url, "Escalation target activated");
            EscalationOutcome::Activated { attempts }
        }
        Err(e) => {
            tracing::error!(url = %target.location_url, error = %e, "Activation failed");
            EscalationOutcome::ActivationFailed(e)
        }
    }
}
