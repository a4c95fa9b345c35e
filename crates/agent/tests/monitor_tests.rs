//! Integration tests for the monitor loop.
//!
//! Drives [`Monitor`] with a scripted in-memory sample source and a
//! recording escalation sink. No device or network access, except the
//! loopback TCP bridge test at the end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use pulsewatch_agent::monitor::{Monitor, RunOutcome};
use pulsewatch_agent::source::{
    open_sensor, SampleSource, SensorAddress, SourceRead, TransportError,
};
use pulsewatch_core::classifier::Classifier;
use pulsewatch_space::api::SpaceApiError;
use pulsewatch_space::escalation::EscalationOutcome;
use pulsewatch_space::readiness::ReadinessPolicy;
use pulsewatch_space::sink::{EscalationSink, EscalationTarget, ReadinessStatus, SinkError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Abnormal on the built-in table (8/8 abnormal rules).
const ABNORMAL: &str = r#"{"HeartRate":60,"HRV_SDNN":45,"Circulation":10}"#;

/// Anger on the built-in table.
const ANGER: &str = r#"{"HeartRate":92,"BodyTemp":36.5,"GSR":300,"BloodOxygen":97,"BP_High":145,"BP_Low":95,"BreathRate":19,"Fatigue":55,"HRV_SDNN":40,"HRV_RMSSD":35}"#;

/// Matches no outcome on the built-in table.
const CALM: &str = r#"{"HeartRate":110,"BodyTemp":36.6,"GSR":500,"BloodOxygen":92,"BP_High":150,"BP_Low":95,"Fatigue":45,"BreathRate":14,"HRV_SDNN":35,"HRV_RMSSD":5}"#;

enum Step {
    Line(&'static str),
    Idle,
    Fail,
}

struct FakeSource {
    script: VecDeque<Step>,
    /// When the script is drained: hang until cancelled instead of closing.
    hang_when_drained: bool,
    reads: u32,
    closes: u32,
}

impl FakeSource {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            hang_when_drained: false,
            reads: 0,
            closes: 0,
        }
    }

    fn lines(lines: &[&'static str]) -> Self {
        Self::new(lines.iter().map(|&l| Step::Line(l)).collect())
    }

    fn hanging(mut self) -> Self {
        self.hang_when_drained = true;
        self
    }
}

impl SampleSource for FakeSource {
    async fn next_line(&mut self) -> Result<SourceRead, TransportError> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(Step::Line(line)) => Ok(SourceRead::Line(line.to_string())),
            Some(Step::Idle) => Ok(SourceRead::Idle),
            Some(Step::Fail) => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
            None if self.hang_when_drained => std::future::pending().await,
            None => Ok(SourceRead::Closed),
        }
    }

    async fn close(&mut self) {
        self.closes += 1;
    }
}

#[derive(Default)]
struct FakeSink {
    statuses: Mutex<VecDeque<&'static str>>,
    fail_activation: bool,
    polls: AtomicU32,
    activations: Mutex<Vec<String>>,
}

impl FakeSink {
    fn ready() -> Self {
        Self::with_statuses(&["RUNNING"])
    }

    fn with_statuses(statuses: &[&'static str]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn activations(&self) -> Vec<String> {
        self.activations.lock().unwrap().clone()
    }
}

impl EscalationSink for FakeSink {
    async fn poll_readiness(&self, _location_id: &str) -> Result<ReadinessStatus, SinkError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or("BUILDING");
        Ok(ReadinessStatus::new(status))
    }

    async fn activate(&self, location_url: &str) -> Result<(), SinkError> {
        self.activations.lock().unwrap().push(location_url.to_string());
        if self.fail_activation {
            return Err(SinkError::Api(SpaceApiError::ApiError {
                status: 500,
                body: "boom".into(),
            }));
        }
        Ok(())
    }
}

fn target() -> EscalationTarget {
    EscalationTarget {
        location_id: "acme/monitor".into(),
        location_url: "https://huggingface.co/spaces/acme/monitor".into(),
    }
}

fn monitor(source: FakeSource, sink: FakeSink) -> Monitor<FakeSource, FakeSink> {
    Monitor::new(source, sink, Classifier::default(), target()).with_readiness(ReadinessPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 3,
    })
}

// ---------------------------------------------------------------------------
// Test: escalation
// ---------------------------------------------------------------------------

/// Three consecutive anomalies of mixed labels escalate and stop the loop
/// before the fourth line is read.
#[tokio::test]
async fn three_anomalies_escalate_once_and_stop() {
    let source = FakeSource::lines(&[CALM, ABNORMAL, ANGER, ABNORMAL, CALM]);
    let mut monitor = monitor(source, FakeSink::ready());

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(
        summary.outcome,
        RunOutcome::Escalated(EscalationOutcome::Activated { attempts: 1 })
    );
    assert_eq!(summary.classified, 4);
    assert_eq!(summary.anomalies, 3);
    assert_eq!(monitor.source().reads, 4);
    assert_eq!(monitor.source().closes, 1);
    assert_eq!(monitor.sink().activations(), vec![target().location_url]);
}

#[tokio::test]
async fn no_match_resets_the_run() {
    let source = FakeSource::lines(&[ABNORMAL, ANGER, CALM, ANGER, ABNORMAL, CALM]);
    let mut monitor = monitor(source, FakeSink::ready());

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(summary.outcome, RunOutcome::SourceClosed);
    assert_eq!(summary.classified, 6);
    assert_eq!(summary.anomalies, 4);
    assert!(monitor.sink().activations().is_empty());
    assert_eq!(monitor.source().closes, 1);
}

/// A target that never becomes ready still ends the run, without activating.
#[tokio::test]
async fn not_ready_ends_run_without_activation() {
    let source = FakeSource::lines(&[ANGER, ANGER, ANGER, CALM]);
    let mut monitor = monitor(source, FakeSink::default());

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(
        summary.outcome,
        RunOutcome::Escalated(EscalationOutcome::NotReady { attempts: 3, .. })
    );
    assert_eq!(monitor.sink().polls.load(Ordering::SeqCst), 3);
    assert!(monitor.sink().activations().is_empty());
    assert_eq!(monitor.source().reads, 3);
    assert_eq!(monitor.source().closes, 1);
}

#[tokio::test]
async fn failed_activation_ends_run() {
    let sink = FakeSink {
        fail_activation: true,
        ..FakeSink::ready()
    };
    let mut monitor = monitor(FakeSource::lines(&[ANGER, ANGER, ANGER]), sink);

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(
        summary.outcome,
        RunOutcome::Escalated(EscalationOutcome::ActivationFailed(_))
    );
    assert_eq!(monitor.sink().activations().len(), 1);
}

#[tokio::test]
async fn custom_threshold() {
    let source = FakeSource::lines(&[ANGER, ANGER, ANGER, ANGER, ANGER]);
    let mut monitor = monitor(source, FakeSink::ready()).with_escalation_threshold(5);

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(summary.outcome, RunOutcome::Escalated(_));
    assert_eq!(summary.classified, 5);
}

// ---------------------------------------------------------------------------
// Test: errors do not count as observations
// ---------------------------------------------------------------------------

/// Malformed records, transport errors, idle reads and blank lines
/// neither count as anomalies nor reset the consecutive count.
#[tokio::test]
async fn errors_between_anomalies_are_transparent() {
    let source = FakeSource::new(vec![
        Step::Line(ANGER),
        Step::Line("{\"HeartRate\": 9"),
        Step::Fail,
        Step::Line(ANGER),
        Step::Idle,
        Step::Line(""),
        Step::Line("[1, 2, 3]"),
        Step::Line(ABNORMAL),
    ]);
    let mut monitor = monitor(source, FakeSink::ready());

    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(summary.outcome, RunOutcome::Escalated(EscalationOutcome::Activated { .. }));
    assert_eq!(summary.classified, 3);
    assert_eq!(summary.discarded, 2);
    assert_eq!(summary.transport_errors, 1);
}

#[tokio::test]
async fn tracker_state_visible_after_run() {
    let mut monitor = monitor(FakeSource::lines(&[ANGER, ANGER]), FakeSink::ready());
    monitor.run(&CancellationToken::new()).await;
    assert_eq!(monitor.tracker().count(), 2);
}

// ---------------------------------------------------------------------------
// Test: interrupt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interrupt_before_first_read() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut monitor = monitor(FakeSource::lines(&[ANGER, ANGER, ANGER]), FakeSink::ready());
    let summary = monitor.run(&cancel).await;

    assert_matches!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(monitor.source().reads, 0);
    assert_eq!(monitor.source().closes, 1);
}

/// An interrupt while blocked on a read stops the loop and still closes
/// the source.
#[tokio::test]
async fn interrupt_while_waiting_for_data() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let source = FakeSource::lines(&[ANGER]).hanging();
    let mut monitor = monitor(source, FakeSink::ready());
    let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(&cancel))
        .await
        .expect("run should observe the interrupt");

    assert_matches!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.classified, 1);
    assert_eq!(monitor.source().closes, 1);
}

/// An interrupt during the readiness wait abandons escalation.
#[tokio::test]
async fn interrupt_during_escalation() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let mut monitor = Monitor::new(
        FakeSource::lines(&[ANGER, ANGER, ANGER]),
        FakeSink::default(),
        Classifier::default(),
        target(),
    )
    .with_readiness(ReadinessPolicy {
        interval: Duration::from_secs(60),
        max_attempts: 30,
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), monitor.run(&cancel))
        .await
        .expect("run should observe the interrupt");

    assert_matches!(summary.outcome, RunOutcome::Interrupted);
    assert!(monitor.sink().activations().is_empty());
    assert_eq!(monitor.source().closes, 1);
}

// ---------------------------------------------------------------------------
// Test: TCP bridge transport
// ---------------------------------------------------------------------------

/// Lines from a serial-over-TCP bridge drive the loop until the bridge
/// hangs up.
#[tokio::test]
async fn tcp_bridge_source() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        for line in [ANGER, "garbage", CALM] {
            stream.write_all(line.as_bytes()).await.unwrap();
            stream.write_all(b"\r\n").await.unwrap();
        }
        stream.shutdown().await.unwrap();
    });

    let address = SensorAddress::Tcp(addr.to_string());
    let sensor = open_sensor(&address, 9600, Duration::from_millis(500), Duration::ZERO)
        .await
        .unwrap();

    let mut monitor = Monitor::new(sensor, FakeSink::ready(), Classifier::default(), target());
    let summary = monitor.run(&CancellationToken::new()).await;

    assert_matches!(summary.outcome, RunOutcome::SourceClosed);
    assert_eq!(summary.classified, 2);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.anomalies, 1);
    assert!(monitor.source().is_closed());
}
