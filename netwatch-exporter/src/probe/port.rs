//! TCP port liveness probe

use super::{ProbeError, ProbeResult};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub struct PortProbe {
    timeout: Duration,
}

impl PortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Connect to `host:port` and return the handshake time.
    ///
    /// The stream is dropped as soon as the handshake completes. Name
    /// resolution counts towards both the elapsed time and the timeout.
    pub async fn check(&self, host: &str, port: u16) -> ProbeResult {
        let start = Instant::now();

        let stream = timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(ProbeError::Connect)?;
        let elapsed = start.elapsed();
        drop(stream);

        debug!("TCP {}:{} open in {:?}", host, port, elapsed);
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::PortState;
    use netwatch_devkit::{closed_port, StalledTcpListener, StubTcpListener};

    #[tokio::test]
    async fn test_open_port() {
        let listener = StubTcpListener::start().await.unwrap();
        let probe = PortProbe::new(Duration::from_secs(5));

        let result = probe.check("127.0.0.1", listener.port()).await;
        let state = PortState::from(&result);
        assert!(state.open);
        assert!(state.connect_ms > 0.0);

        // Connection is released right away, not held open
        listener.wait_for_connections(1, Duration::from_secs(2)).await;
        assert_eq!(listener.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_port() {
        let port = closed_port().await.unwrap();
        let probe = PortProbe::new(Duration::from_secs(5));

        let result = probe.check("127.0.0.1", port).await;
        assert!(matches!(result, Err(ProbeError::Connect(_))));
        assert_eq!(PortState::from(&result), PortState { open: false, connect_ms: 0.0 });
    }

    #[tokio::test]
    async fn test_timed_out_connect_is_closed() {
        let listener = StalledTcpListener::start().await.unwrap();
        let probe = PortProbe::new(Duration::from_millis(300));

        let start = std::time::Instant::now();
        let result = probe.check("127.0.0.1", listener.port()).await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
        assert_eq!(PortState::from(&result), PortState { open: false, connect_ms: 0.0 });
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let probe = PortProbe::new(Duration::from_secs(5));
        let result = probe.check("does-not-exist.invalid", 80).await;
        assert!(result.is_err());
        assert_eq!(PortState::from(&result).status(), 0.0);
    }
}
