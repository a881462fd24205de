// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod pipeline;
pub mod scorer_pool;
pub mod sentiment;

pub use crate::api::{router, AppState, RequestParams};
pub use crate::pipeline::{PipelineExecutor, PipelineOutcome, ScoredRecord};

use axum::Router;

use crate::scorer_pool::EngineFactory;

/// Blocking threads kept free beyond the dispatch limit for the catalog
/// client's host lookups and other short `spawn_blocking` work.
pub const BLOCKING_HEADROOM: usize = 16;

/// Full application router: the dispatcher plus `/metrics` when a recorder
/// has been installed.
pub fn app<F: EngineFactory + 'static>(
    state: AppState<F>,
    metrics: Option<&crate::metrics::Metrics>,
) -> Router {
    let app = router(state);
    match metrics {
        Some(m) => app.merge(m.router()),
        None => app,
    }
}

/// Service runtime. Pair it with [`AppState::with_dispatch_limit`] using the
/// same `dispatch_workers`: blocked pipelines can then never take every
/// blocking thread.
pub fn build_runtime(dispatch_workers: usize) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(dispatch_workers.max(1) + BLOCKING_HEADROOM)
        .thread_name("books-rt")
        .build()
}
