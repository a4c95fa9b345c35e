//! Monitor configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use pulsewatch_core::error::ThresholdTableError;
use pulsewatch_core::escalation::DEFAULT_ESCALATION_THRESHOLD;
use pulsewatch_core::thresholds::ThresholdTable;
use pulsewatch_space::api::{is_valid_space_id, DEFAULT_API_BASE};
use pulsewatch_space::opener::is_openable_url;
use pulsewatch_space::readiness::ReadinessPolicy;
use pulsewatch_space::sink::EscalationTarget;

use crate::source::SensorAddress;

pub const DEFAULT_SENSOR_SOURCE: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_SETTLE_MS: u64 = 2000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} is invalid ('{value}'): {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to read threshold file {}: {source}", .path.display())]
    ThresholdFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid threshold file {}: {source}", .path.display())]
    ThresholdTable {
        path: PathBuf,
        #[source]
        source: ThresholdTableError,
    },
}

/// Startup configuration. Immutable once loaded.
#[derive(Clone)]
pub struct MonitorConfig {
    pub sensor_source: SensorAddress,
    /// Serial line speed. Unused for file and TCP transports.
    pub baud_rate: u32,
    /// Per-read timeout; expiry is "no data", not an error.
    pub read_timeout: Duration,
    /// Delay after opening the transport before the first read.
    pub settle_delay: Duration,
    pub space_id: String,
    pub space_url: String,
    pub hf_token: Option<String>,
    pub hf_api_base: String,
    pub readiness: ReadinessPolicy,
    pub escalation_threshold: u32,
    /// Replacement threshold table; the built-in table when unset.
    pub thresholds_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `SENSOR_SOURCE`                | `/dev/ttyUSB0`           |
    /// | `SENSOR_BAUD_RATE`             | `9600`                   |
    /// | `SENSOR_READ_TIMEOUT_MS`       | `1000`                   |
    /// | `SENSOR_SETTLE_MS`             | `2000`                   |
    /// | `SPACE_ID`                     | required                 |
    /// | `SPACE_URL`                    | required                 |
    /// | `HF_TOKEN`                     | unset                    |
    /// | `HF_API_BASE`                  | `https://huggingface.co` |
    /// | `READINESS_POLL_INTERVAL_SECS` | `5`                      |
    /// | `READINESS_MAX_ATTEMPTS`       | `30`                     |
    /// | `ESCALATION_THRESHOLD`         | `3`                      |
    /// | `THRESHOLDS_PATH`              | unset                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let sensor_raw = var("SENSOR_SOURCE").unwrap_or_else(|| DEFAULT_SENSOR_SOURCE.into());
        let sensor_source =
            SensorAddress::parse(&sensor_raw).ok_or_else(|| ConfigError::Invalid {
                var: "SENSOR_SOURCE",
                value: sensor_raw.clone(),
                reason: "expected a device path, file://path or tcp://host:port",
            })?;

        let baud_rate: u32 = parse_number(&var, "SENSOR_BAUD_RATE", DEFAULT_BAUD_RATE)?;
        if baud_rate == 0 {
            return Err(ConfigError::Invalid {
                var: "SENSOR_BAUD_RATE",
                value: "0".into(),
                reason: "must be greater than zero",
            });
        }

        let read_timeout_ms: u64 =
            parse_number(&var, "SENSOR_READ_TIMEOUT_MS", DEFAULT_READ_TIMEOUT_MS)?;
        if read_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "SENSOR_READ_TIMEOUT_MS",
                value: "0".into(),
                reason: "must be greater than zero",
            });
        }
        let settle_ms: u64 = parse_number(&var, "SENSOR_SETTLE_MS", DEFAULT_SETTLE_MS)?;

        let space_id = var("SPACE_ID").ok_or(ConfigError::Missing("SPACE_ID"))?;
        if !is_valid_space_id(&space_id) {
            return Err(ConfigError::Invalid {
                var: "SPACE_ID",
                value: space_id,
                reason: "expected owner/name",
            });
        }

        let space_url = var("SPACE_URL").ok_or(ConfigError::Missing("SPACE_URL"))?;
        if !is_openable_url(&space_url) {
            return Err(ConfigError::Invalid {
                var: "SPACE_URL",
                value: space_url,
                reason: "must be a plain http or https URL",
            });
        }

        let hf_api_base = var("HF_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into());
        if !is_openable_url(&hf_api_base) {
            return Err(ConfigError::Invalid {
                var: "HF_API_BASE",
                value: hf_api_base,
                reason: "must be a plain http or https URL",
            });
        }

        let interval_secs: u64 = parse_number(
            &var,
            "READINESS_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let max_attempts: u32 = parse_number(&var, "READINESS_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "READINESS_MAX_ATTEMPTS",
                value: "0".into(),
                reason: "must be at least 1",
            });
        }

        let escalation_threshold: u32 =
            parse_number(&var, "ESCALATION_THRESHOLD", DEFAULT_ESCALATION_THRESHOLD)?;
        if escalation_threshold == 0 {
            return Err(ConfigError::Invalid {
                var: "ESCALATION_THRESHOLD",
                value: "0".into(),
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            sensor_source,
            baud_rate,
            read_timeout: Duration::from_millis(read_timeout_ms),
            settle_delay: Duration::from_millis(settle_ms),
            space_id,
            space_url,
            hf_token: var("HF_TOKEN"),
            hf_api_base,
            readiness: ReadinessPolicy {
                interval: Duration::from_secs(interval_secs),
                max_attempts,
            },
            escalation_threshold,
            thresholds_path: var("THRESHOLDS_PATH").map(PathBuf::from),
        })
    }

    pub fn escalation_target(&self) -> EscalationTarget {
        EscalationTarget {
            location_id: self.space_id.clone(),
            location_url: self.space_url.clone(),
        }
    }

    /// The threshold table from `thresholds_path`, or the built-in one.
    pub fn load_thresholds(&self) -> Result<ThresholdTable, ConfigError> {
        let Some(path) = &self.thresholds_path else {
            return Ok(ThresholdTable::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ThresholdFile {
            path: path.clone(),
            source,
        })?;
        ThresholdTable::from_json(&text).map_err(|source| ConfigError::ThresholdTable {
            path: path.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("sensor_source", &self.sensor_source)
            .field("baud_rate", &self.baud_rate)
            .field("read_timeout", &self.read_timeout)
            .field("settle_delay", &self.settle_delay)
            .field("space_id", &self.space_id)
            .field("space_url", &self.space_url)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .field("hf_api_base", &self.hf_api_base)
            .field("readiness", &self.readiness)
            .field("escalation_threshold", &self.escalation_threshold)
            .field("thresholds_path", &self.thresholds_path)
            .finish()
    }
}

fn parse_number<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value: raw,
            reason: "expected a non-negative integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|name| map.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("SPACE_ID", "acme/monitor"),
        ("SPACE_URL", "https://huggingface.co/spaces/acme/monitor"),
    ];

    fn with_required(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        REQUIRED.iter().chain(extra).copied().collect()
    }

    #[test]
    fn defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(
            config.sensor_source,
            SensorAddress::Serial(DEFAULT_SENSOR_SOURCE.into())
        );
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout, Duration::from_millis(1000));
        assert_eq!(config.settle_delay, Duration::from_millis(2000));
        assert_eq!(config.hf_api_base, DEFAULT_API_BASE);
        assert_eq!(config.hf_token, None);
        assert_eq!(config.readiness, ReadinessPolicy::default());
        assert_eq!(config.escalation_threshold, 3);
        assert_eq!(config.thresholds_path, None);
    }

    #[test]
    fn overrides() {
        let config = load(&with_required(&[
            ("SENSOR_SOURCE", "tcp://bridge.local:4000"),
            ("SENSOR_READ_TIMEOUT_MS", "250"),
            ("SENSOR_SETTLE_MS", "0"),
            ("HF_TOKEN", "hf_abc"),
            ("READINESS_POLL_INTERVAL_SECS", "2"),
            ("READINESS_MAX_ATTEMPTS", "10"),
            ("ESCALATION_THRESHOLD", "5"),
            ("THRESHOLDS_PATH", "/etc/pulsewatch/thresholds.json"),
        ]))
        .unwrap();

        assert_eq!(
            config.sensor_source,
            SensorAddress::Tcp("bridge.local:4000".into())
        );
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.hf_token.as_deref(), Some("hf_abc"));
        assert_eq!(config.readiness.interval, Duration::from_secs(2));
        assert_eq!(config.readiness.max_attempts, 10);
        assert_eq!(config.escalation_threshold, 5);
        assert_eq!(
            config.thresholds_path,
            Some(PathBuf::from("/etc/pulsewatch/thresholds.json"))
        );
    }

    #[test]
    fn baud_rate_override() {
        let config = load(&with_required(&[
            ("SENSOR_SOURCE", "COM3"),
            ("SENSOR_BAUD_RATE", "115200"),
        ]))
        .unwrap();
        assert_eq!(config.sensor_source, SensorAddress::Serial("COM3".into()));
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn bad_baud_rate_rejected() {
        assert_matches!(
            load(&with_required(&[("SENSOR_BAUD_RATE", "fast")])),
            Err(ConfigError::Invalid { var: "SENSOR_BAUD_RATE", value, .. }) if value == "fast"
        );
        assert_matches!(
            load(&with_required(&[("SENSOR_BAUD_RATE", "0")])),
            Err(ConfigError::Invalid { var: "SENSOR_BAUD_RATE", .. })
        );
    }

    #[test]
    fn missing_space_id() {
        assert_matches!(
            load(&[("SPACE_URL", "https://huggingface.co/spaces/acme/monitor")]),
            Err(ConfigError::Missing("SPACE_ID"))
        );
    }

    #[test]
    fn empty_value_counts_as_missing() {
        assert_matches!(
            load(&[("SPACE_ID", "acme/monitor"), ("SPACE_URL", "  ")]),
            Err(ConfigError::Missing("SPACE_URL"))
        );
    }

    #[test]
    fn non_http_space_url_rejected() {
        assert_matches!(
            load(&[("SPACE_ID", "acme/monitor"), ("SPACE_URL", "file:///etc/passwd")]),
            Err(ConfigError::Invalid { var: "SPACE_URL", .. })
        );
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn space_url_with_query_accepted() {
        let config = load(&[
            ("SPACE_ID", "acme/monitor"),
            ("SPACE_URL", "https://acme-monitor.hf.space/?__theme=dark&lang=en"),
        ])
        .unwrap();
        assert_eq!(
            config.space_url,
            "https://acme-monitor.hf.space/?__theme=dark&lang=en"
        );
    }

    #[test]
    fn malformed_space_id_rejected() {
        assert_matches!(
            load(&[
                ("SPACE_ID", "monitor"),
                ("SPACE_URL", "https://huggingface.co/spaces/acme/monitor")
            ]),
            Err(ConfigError::Invalid { var: "SPACE_ID", .. })
        );
    }

    #[test]
    fn unparsable_number_rejected() {
        assert_matches!(
            load(&with_required(&[("SENSOR_READ_TIMEOUT_MS", "1s")])),
            Err(ConfigError::Invalid { var: "SENSOR_READ_TIMEOUT_MS", value, .. }) if value == "1s"
        );
        assert_matches!(
            load(&with_required(&[("READINESS_MAX_ATTEMPTS", "-1")])),
            Err(ConfigError::Invalid { var: "READINESS_MAX_ATTEMPTS", .. })
        );
    }

    #[test]
    fn zero_attempts_and_threshold_rejected() {
        assert_matches!(
            load(&with_required(&[("READINESS_MAX_ATTEMPTS", "0")])),
            Err(ConfigError::Invalid { var: "READINESS_MAX_ATTEMPTS", .. })
        );
        assert_matches!(
            load(&with_required(&[("ESCALATION_THRESHOLD", "0")])),
            Err(ConfigError::Invalid { var: "ESCALATION_THRESHOLD", .. })
        );
    }

    #[test]
    fn bad_sensor_source_rejected() {
        assert_matches!(
            load(&with_required(&[("SENSOR_SOURCE", "tcp://bridge")])),
            Err(ConfigError::Invalid { var: "SENSOR_SOURCE", .. })
        );
    }

    #[test]
    fn debug_redacts_token() {
        let config = load(&with_required(&[("HF_TOKEN", "hf_secret")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hf_secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn escalation_target_from_space() {
        let target = load(&REQUIRED).unwrap().escalation_target();
        assert_eq!(target.location_id, "acme/monitor");
        assert_eq!(target.location_url, "https://huggingface.co/spaces/acme/monitor");
    }

    #[test]
    fn built_in_table_without_path() {
        let table = load(&REQUIRED).unwrap().load_thresholds().unwrap();
        assert_eq!(table, ThresholdTable::default());
    }

    #[test]
    fn missing_threshold_file() {
        let config = load(&with_required(&[(
            "THRESHOLDS_PATH",
            "/nonexistent/pulsewatch/thresholds.json",
        )]))
        .unwrap();
        assert_matches!(
            config.load_thresholds(),
            Err(ConfigError::ThresholdFile { .. })
        );
    }
}
