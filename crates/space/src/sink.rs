//! The escalation seam and its Hugging Face Space implementation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::api::{SpaceApi, SpaceApiError};
use crate::opener::{self, OpenError, DEFAULT_OPEN_TIMEOUT};

/// Status the sink must report before activation.
pub const RUNNING_STATUS: &str = "running";

/// Status string reported by a readiness poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessStatus(String);

impl ReadinessStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `running`, compared ASCII case-insensitively.
    pub fn is_running(&self) -> bool {
        self.0.trim().eq_ignore_ascii_case(RUNNING_STATUS)
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure of a single sink call.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Api(#[from] SpaceApiError),

    #[error(transparent)]
    Open(#[from] OpenError),
}

/// Where to escalate: the location polled for readiness and the URL
/// activated once it is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTarget {
    pub location_id: String,
    pub location_url: String,
}

/// Something that can be polled for readiness and then activated.
pub trait EscalationSink: Send + Sync {
    /// Report the current status of `location_id`.
    fn poll_readiness(
        &self,
        location_id: &str,
    ) -> impl Future<Output = Result<ReadinessStatus, SinkError>> + Send;

    /// Open or notify `location_url`. Called at most once per run.
    fn activate(&self, location_url: &str) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Escalates to a Hugging Face Space: readiness from the Hub runtime
/// stage, activation by opening the Space URL in a browser.
#[derive(Debug, Clone)]
pub struct SpaceSink {
    api: SpaceApi,
    open_timeout: Duration,
}

impl SpaceSink {
    pub fn new(api: SpaceApi) -> Self {
        Self {
            api,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }
}

impl EscalationSink for SpaceSink {
    async fn poll_readiness(&self, location_id: &str) -> Result<ReadinessStatus, SinkError> {
        let stage = self.api.runtime_stage(location_id).await?;
        Ok(ReadinessStatus::new(stage))
    }

    async fn activate(&self, location_url: &str) -> Result<(), SinkError> {
        opener::open_url(location_url, self.open_timeout).await?;
        Ok(())
    }
}
