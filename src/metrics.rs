// src/metrics.rs
use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "books_requests_total",
            "Requests answered, by route, method and status."
        );
        describe_histogram!(
            "books_request_duration_ms",
            "Request handling time in milliseconds."
        );
        describe_histogram!(
            "books_pipeline_duration_ms",
            "Fetch-to-terminal time of the scoring pipeline in milliseconds."
        );
        describe_counter!(
            "books_records_fetched_total",
            "Raw records returned by the catalog."
        );
        describe_counter!(
            "books_records_scored_total",
            "Records scored and returned to clients."
        );
        describe_counter!(
            "books_pipeline_failures_total",
            "Pipeline runs that ended in failure, by kind."
        );
        describe_gauge!("books_scoring_engines", "Scoring engines built so far.");
    });
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
