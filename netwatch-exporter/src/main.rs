/**
 * NETWATCH EXPORTER - Point d'entrée principal
 *
 * RÔLE : Bootstrap du moniteur réseau : config, registre de métriques,
 * serveur de scrape et boucle de collecte.
 *
 * ARCHITECTURE : Scheduler (latence ICMP, ports TCP, temps HTTP) → registre
 * Prometheus ← serveur HTTP /metrics lu en parallèle par le scraper.
 * UTILITÉ : Surveillance continue de la joignabilité réseau.
 */

mod collector;
mod config;
mod health;
mod http;
mod logging;
mod metrics;
mod probe;
mod scheduler;
mod targets;

use crate::collector::CollectionCycle;
use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::metrics::ProbeMetrics;
use crate::probe::NetworkProber;
use crate::scheduler::{shutdown_signal, Scheduler};
use crate::targets::Targets;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cfg = load_config().await;

    // registre + health partagés entre collecte et exposition
    let metrics = Arc::new(ProbeMetrics::new().context("failed to build metrics registry")?);
    let health = HealthTracker::new();

    let prober = NetworkProber::new(&cfg).context("failed to build probes")?;
    let targets = Targets::reference();
    if targets.is_empty() {
        warn!("no targets configured, cycles will only print their header");
    }
    info!(
        "probing {} targets ({} ping, {} ports, {} http), concurrency {}",
        targets.len(),
        targets.ping.len(),
        targets.ports.len(),
        targets.http.len(),
        cfg.schedule.max_concurrency
    );

    // un seul signal d'arrêt pour le serveur et le scheduler
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let addr = SocketAddr::new(cfg.metrics.bind, cfg.metrics.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics server on {addr}"))?;

    println!("Starting Network Monitor...");
    println!("Metrics server started on http://localhost:{}/metrics", cfg.metrics.port);
    println!("Collecting metrics every {} seconds", cfg.schedule.interval_secs);
    println!("Press Ctrl+C to stop");
    info!("metrics server listening on http://{addr}");

    let app_state = AppState { metrics: metrics.clone(), health: health.clone() };
    let server = tokio::spawn(http::serve(listener, app_state, stopped(stop_rx.clone())));

    let cycle = CollectionCycle::new(prober, targets, metrics, cfg.schedule.max_concurrency);
    let scheduler = Scheduler::new(cycle, Duration::from_secs(cfg.schedule.interval_secs), health);
    scheduler.run(stopped(stop_rx)).await;

    match server.await {
        Ok(Ok(())) => info!("metrics server stopped"),
        Ok(Err(e)) => error!("metrics server error: {}", e),
        Err(e) => error!("metrics server task failed: {}", e),
    }

    Ok(())
}

// Resolves once the stop flag is raised (or its sender is gone)
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
