//! Collection cycle
//!
//! One pass over every configured target: latency targets first, then ports,
//! then URLs. Each result is written to the registry as soon as it is known
//! and echoed as a console line. A failing target only ever affects its own
//! key; nothing a probe does can abort the cycle.
//!
//! Probes of the same kind run at most `max_concurrency` at a time, but
//! results are recorded and printed in target order. With
//! `max_concurrency == 1` the cycle is strictly sequential.

use crate::metrics::ProbeMetrics;
use crate::probe::{Prober, ProbeResult};
use crate::targets::{Target, Targets};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What one cycle did, kept by the health tracker
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_ms: u64,
    pub probes: usize,
    pub failures: usize,
}

impl CycleSummary {
    pub fn new(started_at: OffsetDateTime, duration: Duration, probes: usize, failures: usize) -> Self {
        Self {
            started_at,
            duration_ms: duration.as_millis() as u64,
            probes,
            failures,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Summary plus the console lines printed during the cycle
#[derive(Debug)]
pub struct CycleReport {
    pub summary: CycleSummary,
    pub lines: Vec<String>,
}

pub struct CollectionCycle<P: Prober> {
    prober: P,
    targets: Targets,
    metrics: Arc<ProbeMetrics>,
    max_concurrency: usize,
}

impl<P: Prober> CollectionCycle<P> {
    pub fn new(prober: P, targets: Targets, metrics: Arc<ProbeMetrics>, max_concurrency: usize) -> Self {
        Self {
            prober,
            targets,
            metrics,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run exactly one collection pass
    pub async fn run(&self) -> CycleReport {
        let started_at = OffsetDateTime::now_utc();
        let start = Instant::now();

        print_line(cycle_header(started_at));

        let mut lines = Vec::with_capacity(self.targets.len());
        let mut failures = 0;

        for group in [&self.targets.ping, &self.targets.ports, &self.targets.http] {
            let mut results = stream::iter(group.iter())
                .map(|target| async move { (target, self.probe(target).await) })
                .buffered(self.max_concurrency);

            while let Some((target, result)) = results.next().await {
                if let Err(e) = &result {
                    warn!("probe {} failed: {}", target, e);
                    failures += 1;
                }
                let line = self.record(target, &result);
                print_line(line.clone());
                lines.push(line);
            }
        }

        let summary = CycleSummary::new(started_at, start.elapsed(), lines.len(), failures);
        debug!(
            "cycle finished in {}ms ({} probes, {} failed)",
            summary.duration_ms, summary.probes, summary.failures
        );

        CycleReport { summary, lines }
    }

    async fn probe(&self, target: &Target) -> ProbeResult {
        match target {
            Target::Host { host } => self.prober.latency(host).await,
            Target::HostPort { host, port } => self.prober.port(host, *port).await,
            Target::Url { url } => self.prober.http(url).await,
        }
    }

    // Registry write boundary: outcomes are collapsed to gauge values here
    fn record(&self, target: &Target, result: &ProbeResult) -> String {
        match target {
            Target::Host { host } => {
                let latency = self.metrics.record_latency(host, result);
                latency_line(host, result.is_ok(), latency)
            }
            Target::HostPort { host, port } => {
                let state = self.metrics.record_port(host, *port, result);
                port_line(host, *port, state.open, state.connect_ms)
            }
            Target::Url { url } => {
                let elapsed = self.metrics.record_http(url, result);
                http_line(url, result.is_ok(), elapsed)
            }
        }
    }
}

fn print_line(line: String) {
    println!("{line}");
}

pub fn cycle_header(at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default();
    let rule = "=".repeat(50);
    format!("\n{rule}\n🕐 Collecting metrics at {stamp} UTC\n{rule}")
}

pub fn latency_line(host: &str, ok: bool, latency_ms: f64) -> String {
    let mark = if ok { "✅" } else { "❌" };
    format!("📡 Latency to {host}: {mark} {latency_ms:.2}ms")
}

pub fn port_line(host: &str, port: u16, open: bool, connect_ms: f64) -> String {
    if open {
        format!("🔌 Port {port} on {host}: ✅ OPEN ({connect_ms:.1}ms)")
    } else {
        format!("🔌 Port {port} on {host}: ❌ CLOSED")
    }
}

pub fn http_line(url: &str, ok: bool, elapsed_ms: f64) -> String {
    let mark = if ok { "✅" } else { "❌" };
    format!("🌐 {url}: {mark} {elapsed_ms:.1}ms")
}
