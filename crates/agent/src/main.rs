//! `pulsewatch-agent` -- physiological sensor monitor.
//!
//! Reads JSON sensor records line by line, classifies each sample
//! against the threshold table, and after enough consecutive anomalies
//! opens the configured Hugging Face Space once it reports `RUNNING`.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default                  | Description                                   |
//! |--------------------------------|----------|--------------------------|-----------------------------------------------|
//! | `SENSOR_SOURCE`                | no       | `/dev/ttyUSB0`           | Serial port, `file://` or `tcp://` address    |
//! | `SENSOR_BAUD_RATE`             | no       | `9600`                   | Serial line speed                             |
//! | `SENSOR_READ_TIMEOUT_MS`       | no       | `1000`                   | Per-read timeout                              |
//! | `SENSOR_SETTLE_MS`             | no       | `2000`                   | Wait after opening before the first read      |
//! | `SPACE_ID`                     | yes      | --                       | Space to escalate to, `owner/name`            |
//! | `SPACE_URL`                    | yes      | --                       | URL opened on escalation                      |
//! | `HF_TOKEN`                     | no       | --                       | Bearer token for the status check             |
//! | `HF_API_BASE`                  | no       | `https://huggingface.co` | Hub base URL                                  |
//! | `READINESS_POLL_INTERVAL_SECS` | no       | `5`                      | Seconds between readiness polls               |
//! | `READINESS_MAX_ATTEMPTS`       | no       | `30`                     | Readiness polls before giving up              |
//! | `ESCALATION_THRESHOLD`         | no       | `3`                      | Consecutive anomalies that trigger escalation |
//! | `THRESHOLDS_PATH`              | no       | --                       | JSON file replacing the built-in table        |

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulsewatch_agent::config::MonitorConfig;
use pulsewatch_agent::monitor::Monitor;
use pulsewatch_agent::{signal, source};
use pulsewatch_core::classifier::Classifier;
use pulsewatch_space::api::SpaceApi;
use pulsewatch_space::sink::SpaceSink;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pulsewatch_agent=info,pulsewatch_core=info,pulsewatch_space=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let table = config.load_thresholds().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        sensor = %config.sensor_source,
        baud_rate = config.baud_rate,
        read_timeout_ms = config.read_timeout.as_millis() as u64,
        space_id = %config.space_id,
        space_url = %config.space_url,
        hf_api_base = %config.hf_api_base,
        authenticated = config.hf_token.is_some(),
        poll_interval_secs = config.readiness.interval.as_secs(),
        max_attempts = config.readiness.max_attempts,
        escalation_threshold = config.escalation_threshold,
        thresholds = ?config.thresholds_path,
        "Starting pulsewatch-agent",
    );

    let cancel = CancellationToken::new();
    let signal_handle = signal::cancel_on_shutdown(cancel.clone());

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Interrupted during startup");
            return;
        }
        opened = source::open_sensor(
            &config.sensor_source,
            config.baud_rate,
            config.read_timeout,
            config.settle_delay,
        ) => opened,
    };

    let sensor = opened.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to acquire sensor transport");
        std::process::exit(1);
    });

    let sink = SpaceSink::new(SpaceApi::new(
        config.hf_api_base.clone(),
        config.hf_token.clone(),
    ));

    let mut monitor = Monitor::new(
        sensor,
        sink,
        Classifier::new(table),
        config.escalation_target(),
    )
    .with_readiness(config.readiness)
    .with_escalation_threshold(config.escalation_threshold);

    monitor.run(&cancel).await;

    cancel.cancel();
    let _ = signal_handle.await;
    tracing::info!("pulsewatch-agent stopped");
}
