//! Prometheus metrics for the event pipeline.
//!
//! Tracks decoded message throughput by kind, parse errors by stable code,
//! outbound API fetches by outcome, and module executions. When a metrics
//! port is configured, [`serve_endpoint`] exposes the text exposition at
//! `/metrics`; losing the endpoint never takes the pipeline down.

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::error;

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Decoded messages by kind (edit, log, discussions, newusers, error).
    pub static ref MESSAGES: IntCounterVec = IntCounterVec::new(
        Opts::new("kocka_messages_total", "Decoded messages by kind"),
        &["kind"]
    )
    .unwrap();

    /// Parse failures by stable error code.
    pub static ref PARSE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("kocka_parse_errors_total", "Parse failures by code"),
        &["code"]
    )
    .unwrap();

    /// Outbound MediaWiki API fetches by kind and outcome.
    pub static ref FETCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("kocka_fetches_total", "API fetches by kind and outcome"),
        &["kind", "outcome"]
    )
    .unwrap();

    /// Module executions by module and outcome.
    pub static ref MODULE_RUNS: IntCounterVec = IntCounterVec::new(
        Opts::new("kocka_module_runs_total", "Module executions by outcome"),
        &["module", "outcome"]
    )
    .unwrap();
}

/// Register all metrics. Call once at startup, before anything records.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES.clone())).unwrap();
    REGISTRY.register(Box::new(PARSE_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(FETCHES.clone())).unwrap();
    REGISTRY.register(Box::new(MODULE_RUNS.clone())).unwrap();
}

pub fn record_message(kind: &str) {
    MESSAGES.with_label_values(&[kind]).inc();
}

pub fn record_parse_error(code: &str) {
    PARSE_ERRORS.with_label_values(&[code]).inc();
}

pub fn record_fetch(kind: &str, outcome: &str) {
    FETCHES.with_label_values(&[kind, outcome]).inc();
}

pub fn record_module_run(module: &str, outcome: &str) {
    MODULE_RUNS.with_label_values(&[module, outcome]).inc();
}

/// Gather all metrics in Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Serves the text exposition at `0.0.0.0:<port>/metrics` until the
/// process exits. A bind failure loses scraping, nothing else.
pub async fn serve_endpoint(port: u16) {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let exposition = Router::new().route("/metrics", get(|| async { gather_metrics() }));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Metrics endpoint could not bind");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, exposition).await {
        error!(error = %e, "Metrics endpoint terminated");
    }
}
