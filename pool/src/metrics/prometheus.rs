use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Front-end metrics, registered once into a private registry.
struct StratumMetrics {
    registry: Registry,
    shares: IntCounterVec,
    job_broadcasts: IntCounter,
    template_updates: IntCounter,
    template_fetch_errors: IntCounter,
    connections: IntGauge,
    sessions: IntGauge,
    template_height: IntGauge,
}

static METRICS: OnceLock<StratumMetrics> = OnceLock::new();

const SHARE_ACCEPTED: &str = "accepted";
const SHARE_INVALID: &str = "invalid";
const SHARE_DUPLICATE: &str = "duplicate";

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("valid counter");
    registry.register(Box::new(c.clone())).expect("register counter");
    c
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let g = IntGauge::new(name, help).expect("valid gauge");
    registry.register(Box::new(g.clone())).expect("register gauge");
    g
}

fn metrics() -> &'static StratumMetrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();
        let shares = IntCounterVec::new(
            Opts::new("stratum_shares_total", "Submitted shares by outcome"),
            &["outcome"],
        )
        .expect("valid share counter");
        registry
            .register(Box::new(shares.clone()))
            .expect("register share counter");

        StratumMetrics {
            job_broadcasts: counter(
                &registry,
                "stratum_job_broadcasts_total",
                "mining.notify fan-outs",
            ),
            template_updates: counter(
                &registry,
                "stratum_template_updates_total",
                "Block templates installed",
            ),
            template_fetch_errors: counter(
                &registry,
                "stratum_template_fetch_errors_total",
                "Failed template polls",
            ),
            connections: gauge(
                &registry,
                "stratum_active_connections",
                "Open miner connections",
            ),
            sessions: gauge(
                &registry,
                "stratum_registered_sessions",
                "Sessions registered by mining.subscribe",
            ),
            template_height: gauge(
                &registry,
                "stratum_template_height",
                "Height of the current block template",
            ),
            shares,
            registry,
        }
    })
}

pub fn inc_accepted() {
    metrics().shares.with_label_values(&[SHARE_ACCEPTED]).inc();
}

pub fn inc_rejected() {
    metrics().shares.with_label_values(&[SHARE_INVALID]).inc();
}

pub fn inc_duplicate() {
    metrics().shares.with_label_values(&[SHARE_DUPLICATE]).inc();
}

pub fn accepted_total() -> u64 {
    metrics().shares.with_label_values(&[SHARE_ACCEPTED]).get()
}

pub fn inc_job_broadcasts() {
    metrics().job_broadcasts.inc();
}

pub fn inc_template_updates() {
    metrics().template_updates.inc();
}

pub fn inc_template_fetch_errors() {
    metrics().template_fetch_errors.inc();
}

pub fn inc_connections() {
    metrics().connections.inc();
}

pub fn dec_connections() {
    metrics().connections.dec();
}

pub fn set_registered_sessions(n: usize) {
    metrics().sessions.set(i64::try_from(n).unwrap_or(i64::MAX));
}

pub fn set_template_height(height: u64) {
    metrics().template_height.set(i64::try_from(height).unwrap_or(i64::MAX));
}

/// Text exposition for `GET /metrics`.
pub fn render() -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metrics().registry.gather(), &mut buf) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_metrics() {
        inc_duplicate();
        inc_accepted();
        set_template_height(42);
        let out = render();
        assert!(out.contains("stratum_shares_total{outcome=\"duplicate\"}"));
        assert!(out.contains("stratum_template_height"));
        assert!(out.contains("stratum_active_connections"));
        assert!(accepted_total() >= 1);
    }
}
