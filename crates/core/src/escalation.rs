//! Consecutive-anomaly counter.
//!
//! Any outcome label counts as an anomaly, whichever label it is; a
//! "no match" resets the count. Escalation is due once the count
//! reaches the threshold.

/// Consecutive anomalies that trigger escalation unless configured otherwise.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

/// Label-agnostic consecutive-anomaly state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationTracker {
    count: u32,
    threshold: u32,
}

impl Default for EscalationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_ESCALATION_THRESHOLD)
    }

    /// A threshold of zero is raised to one.
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Record one classification result and return the new count.
    pub fn observe(&mut self, label: Option<&str>) -> u32 {
        self.count = match label {
            Some(_) => self.count.saturating_add(1),
            None => 0,
        };
        self.count
    }

    pub fn should_escalate(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
