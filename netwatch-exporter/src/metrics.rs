/**
 * METRICS REGISTRY - Gauges exposées au scrape Prometheus
 *
 * ROLE :
 * Seul état mutable partagé du processus. Trois familles de gauges indexées
 * par labels, écrasées à chaque cycle (pas d'historique, pas d'agrégation).
 *
 * FONCTIONNEMENT :
 * - network_latency_ms{target}       : latence moyenne, 0 si échec
 * - port_status{target, port}        : 1 ouvert / 0 fermé ou erreur
 * - http_response_time_ms{url}       : temps de réponse, 0 si échec
 * - Écritures atomiques par clé (Gauge::set), lecture concurrente par /metrics
 * - Une clé jamais mesurée est ABSENTE, jamais à 0
 */

use crate::probe::{gauge_value, PortState, ProbeResult};
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const LATENCY_METRIC: &str = "network_latency_ms";
pub const PORT_STATUS_METRIC: &str = "port_status";
pub const HTTP_RESPONSE_METRIC: &str = "http_response_time_ms";

pub struct ProbeMetrics {
    registry: Registry,
    latency: GaugeVec,
    port_status: GaugeVec,
    http_response: GaugeVec,
}

impl ProbeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let latency = GaugeVec::new(
            Opts::new(LATENCY_METRIC, "Network latency in milliseconds"),
            &["target"],
        )?;
        let port_status = GaugeVec::new(Opts::new(PORT_STATUS_METRIC, "Port status"), &["target", "port"])?;
        let http_response = GaugeVec::new(
            Opts::new(HTTP_RESPONSE_METRIC, "HTTP response time in ms"),
            &["url"],
        )?;

        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(port_status.clone()))?;
        registry.register(Box::new(http_response.clone()))?;

        Ok(Self { registry, latency, port_status, http_response })
    }

    /// Overwrite the latency gauge for `target`; returns the written value
    pub fn record_latency(&self, target: &str, result: &ProbeResult) -> f64 {
        let value = gauge_value(result);
        self.latency.with_label_values(&[target]).set(value);
        value
    }

    pub fn record_port(&self, host: &str, port: u16, result: &ProbeResult) -> PortState {
        let state = PortState::from(result);
        let port = port.to_string();
        self.port_status
            .with_label_values(&[host, port.as_str()])
            .set(state.status());
        state
    }

    pub fn record_http(&self, url: &str, result: &ProbeResult) -> f64 {
        let value = gauge_value(result);
        self.http_response.with_label_values(&[url]).set(value);
        value
    }

    pub fn latency(&self, target: &str) -> Option<f64> {
        read_gauge(&self.latency, &[("target", target)])
    }

    pub fn port_status(&self, host: &str, port: u16) -> Option<f64> {
        let port = port.to_string();
        read_gauge(&self.port_status, &[("target", host), ("port", port.as_str())])
    }

    pub fn http_response_time(&self, url: &str) -> Option<f64> {
        read_gauge(&self.http_response, &[("url", url)])
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

// Reads through `collect()` so that looking up a missing key never creates it
fn read_gauge(vec: &GaugeVec, labels: &[(&str, &str)]) -> Option<f64> {
    let families = vec.collect();
    families
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            let pairs = metric.get_label();
            pairs.len() == labels.len()
                && labels
                    .iter()
                    .all(|(name, value)| pairs.iter().any(|p| p.get_name() == *name && p.get_value() == *value))
        })
        .map(|metric| metric.get_gauge().get_value())
}
