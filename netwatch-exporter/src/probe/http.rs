//! HTTP response time probe
//!
//! Latency only: the response status is never inspected, so a 404 or 500
//! still yields a timing. Only transport failures count as failures.

use super::{ProbeError, ProbeResult};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netwatch-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and return the time until the whole body was received
    pub async fn measure(&self, url: &str) -> ProbeResult {
        let start = Instant::now();

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let elapsed = start.elapsed();

        debug!("HTTP {} -> {} ({} bytes) in {:?}", url, status, body.len(), elapsed);
        Ok(elapsed)
    }
}
