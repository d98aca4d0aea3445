//! Exporter configuration
//!
//! Loaded once at startup from `netwatch.yaml` (or `$NETWATCH_CONFIG`).
//! Every field has a default matching the reference behaviour, and a bad
//! config file never prevents startup: it is logged and the defaults are used.
//! Probe targets are compiled in (see `targets.rs`) and not configurable.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "NETWATCH_CONFIG";
pub const METRICS_PORT_ENV: &str = "NETWATCH_METRICS_PORT";
const DEFAULT_CONFIG_PATH: &str = "netwatch.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub metrics: MetricsConf,
    pub schedule: ScheduleConf,
    pub latency: LatencyConfig,
    pub port: PortConf,
    pub http: HttpConf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConf {
    pub bind: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConf {
    /// Pause between the end of one cycle and the start of the next
    pub interval_secs: u64,
    /// Probes of one kind run at most this many at a time; 1 is fully sequential
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMethod {
    Auto,
    Socket,
    Command,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub method: LatencyMethod,
    pub count: u32,
    pub attempt_timeout_secs: u64,
    pub overall_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConf {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub timeout_secs: u64,
}

impl Default for MetricsConf {
    fn default() -> Self {
        Self { bind: IpAddr::from([0, 0, 0, 0]), port: 8000 }
    }
}

impl Default for ScheduleConf {
    fn default() -> Self {
        Self { interval_secs: 15, max_concurrency: 4 }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            method: LatencyMethod::Auto,
            count: 3,
            attempt_timeout_secs: 5,
            overall_timeout_secs: 10,
        }
    }
}

impl Default for PortConf {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl MonitorConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: MonitorConfig = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.schedule.interval_secs == 0, "schedule.interval_secs"),
            (self.schedule.max_concurrency == 0, "schedule.max_concurrency"),
            (self.latency.count == 0, "latency.count"),
            (self.latency.attempt_timeout_secs == 0, "latency.attempt_timeout_secs"),
            (self.latency.overall_timeout_secs == 0, "latency.overall_timeout_secs"),
            (self.port.timeout_secs == 0, "port.timeout_secs"),
            (self.http.timeout_secs == 0, "http.timeout_secs"),
        ];

        match checks.into_iter().find(|(bad, _)| *bad) {
            Some((_, field)) => Err(ConfigError::Invalid { field, reason: "must be greater than zero" }),
            None => Ok(()),
        }
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(METRICS_PORT_ENV) {
            match raw.parse::<u16>() {
                Ok(port) => self.metrics.port = port,
                Err(_) => warn!("ignoring {}={}: not a port number", METRICS_PORT_ENV, raw),
            }
        }
    }
}

pub async fn read_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    MonitorConfig::from_yaml(&txt)
}

pub async fn load_config() -> MonitorConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let mut cfg = if Path::new(&path).exists() {
        read_config(Path::new(&path)).await.unwrap_or_else(|e| {
            warn!("config {} rejected ({}), using defaults", path, e);
            MonitorConfig::default()
        })
    } else {
        info!("no {} found, using default config", path);
        MonitorConfig::default()
    };

    cfg.apply_env();
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.metrics.port, 8000);
        assert_eq!(config.schedule.interval_secs, 15);
        assert_eq!(config.latency.count, 3);
        assert_eq!(config.latency.attempt_timeout_secs, 5);
        assert_eq!(config.latency.overall_timeout_secs, 10);
        assert_eq!(config.port.timeout_secs, 5);
        assert_eq!(config.http.timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "schedule:\n  interval_secs: 30\nlatency:\n  method: command\n";
        let config = MonitorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.schedule.max_concurrency, 4);
        assert_eq!(config.latency.method, LatencyMethod::Command);
        assert_eq!(config.latency.count, 3);
        assert_eq!(config.metrics.port, 8000);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(MonitorConfig::from_yaml("  \n").unwrap(), MonitorConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MonitorConfig::from_yaml("schedule:\n  interval_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "schedule.interval_secs", .. }));

        let err = MonitorConfig::from_yaml("latency:\n  count: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "latency.count", .. }));

        let err = MonitorConfig::from_yaml("latency:\n  method: carrier-pigeon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[tokio::test]
    async fn test_read_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "metrics:\n  bind: 127.0.0.1\n  port: 9100").unwrap();

        let config = read_config(file.path()).await.unwrap();
        assert_eq!(config.metrics.bind, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.metrics.port, 9100);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_config(Path::new("/nonexistent/netwatch.yaml")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
