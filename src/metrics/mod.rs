//! Prometheus metrics for monitoring a test run
//!
//! Exposes metrics for:
//! - Order book reads
//! - Transactions submitted per chain
//! - Lifecycle phase durations and poll ticks
//! - Test case outcomes

use crate::error::{E2eError, E2eResult};

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref BOOK_READS: Counter = register_counter!(
        "oracle_e2e_order_book_reads_total",
        "Total order book snapshots fetched"
    ).unwrap();

    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "oracle_e2e_transactions_submitted_total",
        "Total transactions submitted by chain and kind",
        &["chain", "kind"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "oracle_e2e_transactions_failed_total",
        "Total transaction submissions rejected by chain and kind",
        &["chain", "kind"]
    ).unwrap();

    pub static ref POLL_TICKS: CounterVec = register_counter_vec!(
        "oracle_e2e_poll_ticks_total",
        "Total poll iterations per lifecycle phase",
        &["phase"]
    ).unwrap();

    pub static ref PHASE_DURATION: HistogramVec = register_histogram_vec!(
        "oracle_e2e_phase_duration_seconds",
        "Time spent in each lifecycle phase",
        &["phase"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    pub static ref CASE_OUTCOMES: CounterVec = register_counter_vec!(
        "oracle_e2e_case_outcomes_total",
        "Total test cases by outcome",
        &["outcome"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> E2eResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    render().unwrap_or_else(|e| format!("# failed to encode metrics: {}\n", e))
}

fn render() -> E2eResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| E2eError::Decode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| E2eError::Decode(e.to_string()))
}

// Helper functions to record metrics

pub fn record_book_read() {
    BOOK_READS.inc();
}

pub fn record_tx_submitted(chain: &str, kind: &str) {
    TX_SUBMITTED.with_label_values(&[chain, kind]).inc();
}

pub fn record_tx_failed(chain: &str, kind: &str) {
    TX_FAILED.with_label_values(&[chain, kind]).inc();
}

pub fn record_poll_tick(phase: &str) {
    POLL_TICKS.with_label_values(&[phase]).inc();
}

pub fn record_phase_duration(phase: &str, secs: f64) {
    PHASE_DURATION.with_label_values(&[phase]).observe(secs);
}

pub fn record_case_outcome(passed: bool) {
    CASE_OUTCOMES
        .with_label_values(&[if passed { "passed" } else { "failed" }])
        .inc();
}
