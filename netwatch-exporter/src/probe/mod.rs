//! Network probes
//!
//! Three stateless probes, each bounded by its own timeout:
//! - `latency`: ICMP echo round trip, averaged over several attempts
//! - `port`: TCP handshake liveness and connect time
//! - `http`: GET request-to-body elapsed time, status ignored
//!
//! Every probe returns a `ProbeResult`. The failure side is only collapsed to
//! the observable `0` by [`gauge_value`], at the registry boundary.

pub mod http;
mod icmp;
pub mod latency;
pub mod port;

use crate::config::MonitorConfig;
use std::time::Duration;

pub use http::HttpProbe;
pub use latency::LatencyProbe;
pub use port::PortProbe;

/// Why a probe produced no measurement
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("name resolution failed for {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable address for {0}")]
    NoAddress(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("ping command failed: {0}")]
    Command(String),
    #[error("could not parse ping output")]
    Parse,
    #[error("no echo reply received")]
    NoReply,
    #[error("ICMP socket error: {0}")]
    Icmp(#[source] std::io::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ProbeResult = Result<Duration, ProbeError>;

/// Milliseconds as reported on the gauges
pub fn as_millis_f64(elapsed: Duration) -> f64 {
    elapsed.as_nanos() as f64 / 1_000_000.0
}

/// Collapse a probe outcome to the exported value: milliseconds, or 0 on failure
pub fn gauge_value(result: &ProbeResult) -> f64 {
    match result {
        Ok(elapsed) => as_millis_f64(*elapsed),
        Err(_) => 0.0,
    }
}

/// Port probe outcome as `(openness, connect time)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortState {
    pub open: bool,
    pub connect_ms: f64,
}

impl PortState {
    pub fn status(&self) -> f64 {
        if self.open { 1.0 } else { 0.0 }
    }
}

impl From<&ProbeResult> for PortState {
    fn from(result: &ProbeResult) -> Self {
        match result {
            Ok(elapsed) => PortState { open: true, connect_ms: as_millis_f64(*elapsed) },
            Err(_) => PortState { open: false, connect_ms: 0.0 },
        }
    }
}

/// Seam between the collection cycle and the network
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Average ICMP round trip to `host`
    async fn latency(&self, host: &str) -> ProbeResult;

    /// TCP handshake time to `host:port`
    async fn port(&self, host: &str, port: u16) -> ProbeResult;

    /// Full GET round trip for `url`
    async fn http(&self, url: &str) -> ProbeResult;
}

/// Real prober backed by the three network probes
pub struct NetworkProber {
    latency: LatencyProbe,
    port: PortProbe,
    http: HttpProbe,
}

impl NetworkProber {
    pub fn new(config: &MonitorConfig) -> Result<Self, ProbeError> {
        Ok(Self {
            latency: LatencyProbe::new(config.latency.clone()),
            port: PortProbe::new(Duration::from_secs(config.port.timeout_secs)),
            http: HttpProbe::new(Duration::from_secs(config.http.timeout_secs))?,
        })
    }
}

#[async_trait::async_trait]
impl Prober for NetworkProber {
    async fn latency(&self, host: &str) -> ProbeResult {
        self.latency.measure(host).await
    }

    async fn port(&self, host: &str, port: u16) -> ProbeResult {
        self.port.check(host, port).await
    }

    async fn http(&self, url: &str) -> ProbeResult {
        self.http.measure(url).await
    }
}
