//! Books sentiment service: binary entrypoint.
//! Loads config, trains the classifier, builds the scoring pool and the tokio
//! runtime, then serves the dispatcher until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use books_sentiment::catalog::GoogleBooksClient;
use books_sentiment::config::{LogFormat, ServiceConfig};
use books_sentiment::metrics::Metrics;
use books_sentiment::sentiment::SentimentModel;
use books_sentiment::AppState;

const DEFAULT_LOG_FILTER: &str = "books_sentiment=info,http=info,pipeline=info,tower_http=warn";

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cfg = ServiceConfig::load().context("loading service config")?;
    init_tracing(cfg.log_format);

    // Request handlers block in the pipeline on the blocking pool, at most
    // dispatch_workers at once. Scoring has its own rayon pool.
    let runtime =
        books_sentiment::build_runtime(cfg.dispatch_workers).context("building tokio runtime")?;

    runtime.block_on(serve(cfg))
}

async fn serve(cfg: ServiceConfig) -> anyhow::Result<()> {
    let addr = cfg.socket_addr()?;

    let metrics = if cfg.metrics_enabled {
        Some(Metrics::init()?)
    } else {
        None
    };

    let model = Arc::new(SentimentModel::seeded().context("training sentiment model")?);
    let catalog = Arc::new(GoogleBooksClient::new(&cfg.catalog).context("building catalog client")?);
    let state = AppState::build(
        catalog,
        model,
        cfg.scoring_workers,
        tokio::runtime::Handle::current(),
    )?
    .with_dispatch_limit(cfg.dispatch_workers);
    let app = books_sentiment::app(state, metrics.as_ref());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        catalog = %cfg.catalog.base_url,
        dispatch_workers = cfg.dispatch_workers,
        scoring_workers = cfg.scoring_workers,
        metrics = cfg.metrics_enabled,
        "server start"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; running until killed");
        std::future::pending::<()>().await;
    }
}
