//! Fixed-delay scheduler loop
//!
//! Runs a collection cycle, then sleeps `interval` from the end of that
//! cycle. Cycles never overlap. The shutdown future is raced against both the
//! cycle and the sleep, so an interrupt is honoured within one await point.

use crate::collector::CollectionCycle;
use crate::health::HealthTracker;
use crate::probe::Prober;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Scheduler<P: Prober> {
    cycle: CollectionCycle<P>,
    interval: Duration,
    health: HealthTracker,
}

impl<P: Prober> Scheduler<P> {
    pub fn new(cycle: CollectionCycle<P>, interval: Duration, health: HealthTracker) -> Self {
        Self { cycle, interval, health }
    }

    /// Loop until `shutdown` resolves; returns the number of completed cycles
    pub async fn run<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut completed = 0;

        loop {
            let report = tokio::select! {
                _ = &mut shutdown => break,
                report = self.cycle.run() => report,
            };

            completed += 1;
            if self.health.record_cycle(&report.summary, self.interval) {
                warn!(
                    "cycle took {}ms, longer than the {}s interval",
                    report.summary.duration_ms,
                    self.interval.as_secs()
                );
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        println!("\n🛑 Stopping network monitor...");
        info!("scheduler stopped after {} cycles", completed);
        completed
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
