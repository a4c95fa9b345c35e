//! The monitor loop.
//!
//! Reads one line at a time from a [`SampleSource`], parses and
//! classifies it, and tracks consecutive anomalies. When the tracker
//! fires it escalates once through an [`EscalationSink`] and stops,
//! whether or not escalation succeeded. Processing is strictly
//! sequential: a sample is fully handled before the next read.
//!
//! The loop also stops on operator interrupt (the cancellation token)
//! and on end of stream. In every case the source is closed exactly
//! once before [`Monitor::run`] returns.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use pulsewatch_core::classifier::Classifier;
use pulsewatch_core::escalation::EscalationTracker;
use pulsewatch_core::sample::Sample;
use pulsewatch_space::escalation::{escalate, EscalationOutcome};
use pulsewatch_space::readiness::ReadinessPolicy;
use pulsewatch_space::sink::{EscalationSink, EscalationTarget};

use crate::source::{SampleSource, SourceRead};

/// Why a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The anomaly threshold was reached and escalation was attempted.
    Escalated(EscalationOutcome),
    /// Operator interrupt, including one during escalation.
    Interrupted,
    /// The sensor stream ended.
    SourceClosed,
}

/// Counters and outcome of one run.
#[derive(Debug)]
pub struct RunSummary {
    /// Records parsed and classified.
    pub classified: u64,
    /// Malformed records dropped before classification.
    pub discarded: u64,
    pub transport_errors: u64,
    /// Classified records that matched an outcome.
    pub anomalies: u64,
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Default)]
struct Counters {
    classified: u64,
    discarded: u64,
    transport_errors: u64,
    anomalies: u64,
}

/// Owns the source, sink and per-run state.
pub struct Monitor<Src, Snk> {
    source: Src,
    sink: Snk,
    classifier: Classifier,
    tracker: EscalationTracker,
    target: EscalationTarget,
    readiness: ReadinessPolicy,
}

impl<Src, Snk> Monitor<Src, Snk>
where
    Src: SampleSource,
    Snk: EscalationSink,
{
    pub fn new(source: Src, sink: Snk, classifier: Classifier, target: EscalationTarget) -> Self {
        Self {
            source,
            sink,
            classifier,
            tracker: EscalationTracker::new(),
            target,
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.tracker = EscalationTracker::with_threshold(threshold);
        self
    }

    pub fn source(&self) -> &Src {
        &self.source
    }

    pub fn sink(&self) -> &Snk {
        &self.sink
    }

    pub fn tracker(&self) -> &EscalationTracker {
        &self.tracker
    }

    /// Run until escalation, interrupt or end of stream.
    pub async fn run(&mut self, cancel: &CancellationToken) -> RunSummary {
        let started_at = Utc::now();
        let mut counters = Counters::default();

        tracing::info!(
            escalation_threshold = self.tracker.threshold(),
            outcomes = ?self.classifier.table().all_outcomes().collect::<Vec<_>>(),
            "Monitoring started",
        );

        let outcome = self.process(cancel, &mut counters).await;

        self.source.close().await;

        let summary = RunSummary {
            classified: counters.classified,
            discarded: counters.discarded,
            transport_errors: counters.transport_errors,
            anomalies: counters.anomalies,
            outcome,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            classified = summary.classified,
            discarded = summary.discarded,
            transport_errors = summary.transport_errors,
            anomalies = summary.anomalies,
            outcome = ?summary.outcome,
            elapsed_secs = (summary.finished_at - summary.started_at).num_seconds(),
            "Monitoring stopped",
        );

        summary
    }

    async fn process(&mut self, cancel: &CancellationToken, counters: &mut Counters) -> RunOutcome {
        loop {
            if cancel.is_cancelled() {
                tracing::info!("Interrupt received, stopping");
                return RunOutcome::Interrupted;
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                read = self.source.next_line() => Some(read),
            };

            let line = match read {
                None => {
                    tracing::info!("Interrupt received, stopping");
                    return RunOutcome::Interrupted;
                }
                Some(Ok(SourceRead::Line(line))) => line,
                Some(Ok(SourceRead::Idle)) => {
                    tracing::trace!("No sensor data within read timeout");
                    continue;
                }
                Some(Ok(SourceRead::Closed)) => {
                    tracing::warn!("Sensor stream closed");
                    return RunOutcome::SourceClosed;
                }
                Some(Err(e)) => {
                    counters.transport_errors += 1;
                    tracing::warn!(error = %e, "Sensor read failed, skipping");
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let sample = match Sample::from_json_line(&line) {
                Ok(sample) => sample,
                Err(e) => {
                    counters.discarded += 1;
                    tracing::warn!(error = %e, record = %line, "Discarding malformed sensor record");
                    continue;
                }
            };

            tracing::info!("{sample}");
            counters.classified += 1;

            let classification = self.classifier.classify(&sample);
            let consecutive = self
                .tracker
                .observe(classification.as_ref().map(|c| c.label.as_str()));

            match &classification {
                Some(c) => {
                    counters.anomalies += 1;
                    tracing::info!(
                        label = %c.label,
                        consecutive,
                        threshold = self.tracker.threshold(),
                        "Anomaly detected",
                    );
                }
                None => tracing::debug!("No outcome reached quorum, anomaly count reset"),
            }

            if self.tracker.should_escalate() {
                tracing::warn!(consecutive, "Consecutive anomaly threshold reached, escalating");
                return match escalate(&self.sink, &self.target, &self.readiness, cancel).await {
                    EscalationOutcome::Cancelled => RunOutcome::Interrupted,
                    outcome => RunOutcome::Escalated(outcome),
                };
            }
        }
    }
}
