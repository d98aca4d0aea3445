//! Probe targets
//!
//! Targets are fixed for the lifetime of the process. The reference set is
//! compiled in; tests build their own `Targets` pointing at local stubs.

use std::fmt;

/// Something addressable by one of the probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Host probed for ICMP round-trip latency
    Host { host: String },
    /// Host + TCP port probed for liveness
    HostPort { host: String, port: u16 },
    /// URL probed for HTTP response time
    Url { url: String },
}

impl Target {
    pub fn host(host: impl Into<String>) -> Self {
        Target::Host { host: host.into() }
    }

    pub fn host_port(host: impl Into<String>, port: u16) -> Self {
        Target::HostPort { host: host.into(), port }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Target::Url { url: url.into() }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host { host } => write!(f, "{host}"),
            Target::HostPort { host, port } => write!(f, "{host}:{port}"),
            Target::Url { url } => write!(f, "{url}"),
        }
    }
}

/// The three ordered target lists walked by a collection cycle
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub ping: Vec<Target>,
    pub ports: Vec<Target>,
    pub http: Vec<Target>,
}

impl Targets {
    /// Compiled-in reference targets
    pub fn reference() -> Self {
        Self {
            ping: ["8.8.8.8", "1.1.1.1", "github.com"]
                .into_iter()
                .map(Target::host)
                .collect(),
            ports: [
                ("google.com", 80),
                ("google.com", 443),
                ("github.com", 80),
                ("github.com", 443),
                ("localhost", 22),
            ]
            .into_iter()
            .map(|(host, port)| Target::host_port(host, port))
            .collect(),
            http: [
                "http://google.com",
                "http://github.com",
                "http://httpbin.org/status/200",
            ]
            .into_iter()
            .map(Target::url)
            .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ping.len() + self.ports.len() + self.http.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
