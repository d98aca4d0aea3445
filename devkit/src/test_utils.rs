/*!
Test Harness for NetWatch probes

One call sets up a full local probing environment:
- an HTTP stub answering 200 and another answering 404
- a listening TCP port and a closed one
- counters and assertions over what the stubs received
*/

use crate::stub_server::{closed_port, StubHttpServer, StubTcpListener};
use anyhow::Result;
use std::time::Duration;

pub struct TestHarness {
    pub ok_server: StubHttpServer,
    pub not_found_server: StubHttpServer,
    pub open_listener: StubTcpListener,
    pub closed_port: u16,
}

impl TestHarness {
    pub async fn start() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let harness = Self {
            ok_server: StubHttpServer::start(200).await?,
            not_found_server: StubHttpServer::start(404).await?,
            open_listener: StubTcpListener::start().await?,
            closed_port: closed_port().await?,
        };

        log::info!(
            "🧪 Harness ready: http 200 @ {}, http 404 @ {}, tcp open :{}, tcp closed :{}",
            harness.ok_server.addr(),
            harness.not_found_server.addr(),
            harness.open_listener.port(),
            harness.closed_port
        );
        Ok(harness)
    }

    pub fn open_port(&self) -> u16 {
        self.open_listener.port()
    }

    /// Assert the stubs saw exactly these numbers of HTTP requests
    pub fn assert_http_requests(&self, ok: usize, not_found: usize) -> Result<()> {
        let actual = (self.ok_server.request_count(), self.not_found_server.request_count());
        if actual != (ok, not_found) {
            anyhow::bail!(
                "Expected {} / {} HTTP requests (200 / 404 stubs), got {} / {}",
                ok, not_found, actual.0, actual.1
            );
        }
        Ok(())
    }

    /// Wait until the open listener accepted `count` connections
    pub async fn expect_tcp_connections(&self, count: usize) -> Result<()> {
        if !self.open_listener.wait_for_connections(count, Duration::from_secs(5)).await {
            anyhow::bail!(
                "Expected {} TCP connections, got {}",
                count,
                self.open_listener.connection_count()
            );
        }
        Ok(())
    }

    pub fn get_stats(&self) -> HarnessStats {
        HarnessStats {
            http_requests: self.ok_server.request_count() + self.not_found_server.request_count(),
            tcp_connections: self.open_listener.connection_count(),
        }
    }

    /// Reset recorded requests between scenarios
    pub fn reset(&self) {
        self.ok_server.clear();
        self.not_found_server.clear();
        log::info!("🧹 Test harness reset");
    }
}

#[derive(Debug, PartialEq)]
pub struct HarnessStats {
    pub http_requests: usize,
    pub tcp_connections: usize,
}

impl HarnessStats {
    pub fn print(&self) {
        println!("📊 Harness statistics:");
        println!("  HTTP requests:   {}", self.http_requests);
        println!("  TCP connections: {}", self.tcp_connections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::start().await.unwrap();

        let ok = reqwest::get(harness.ok_server.url("/")).await.unwrap();
        assert_eq!(ok.status().as_u16(), 200);
        let missing = reqwest::get(harness.not_found_server.url("/nope")).await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);
        harness.assert_http_requests(1, 1).unwrap();

        tokio::net::TcpStream::connect(("127.0.0.1", harness.open_port())).await.unwrap();
        harness.expect_tcp_connections(1).await.unwrap();

        let stats = harness.get_stats();
        stats.print();
        assert_eq!(stats, HarnessStats { http_requests: 2, tcp_connections: 1 });

        harness.reset();
        harness.assert_http_requests(0, 0).unwrap();
    }
}
