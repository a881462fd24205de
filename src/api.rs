// src/api.rs
//! HTTP surface: one dispatcher that routes on the lower-cased path.
//!
//! `/health` answers directly, `/books` validates its parameters and hands the
//! request to the blocking pipeline on the runtime's blocking pool, anything
//! else is a 404. At most `dispatch_limit` pipelines block there at once; the
//! rest wait for a permit. The outermost layer logs and counts every request,
//! CORS preflights included. Panics below it become a generic 500.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::Semaphore;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{error, info, warn};

use crate::catalog::CatalogClient;
use crate::error::{ApiError, MSG_INTERNAL};
use crate::pipeline::PipelineExecutor;
use crate::scorer_pool::{build_scoring_pool, EngineFactory, ScorerPool};
use crate::sentiment::SentimentModel;

pub const DEFAULT_MAX_RESULTS: u32 = 5;
pub const MIN_MAX_RESULTS: i32 = 1;
pub const MAX_MAX_RESULTS: i32 = 10;

/// Concurrent `/books` pipelines when no limit is configured.
pub const DEFAULT_DISPATCH_LIMIT: usize = 64;

/// Shared, read-mostly context handed to every request.
pub struct AppState<F: EngineFactory + 'static = Arc<SentimentModel>> {
    pub executor: PipelineExecutor<F>,
    dispatch: Arc<Semaphore>,
    dispatch_limit: usize,
}

impl<F: EngineFactory + 'static> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            dispatch: Arc::clone(&self.dispatch),
            dispatch_limit: self.dispatch_limit,
        }
    }
}

impl<F: EngineFactory + 'static> AppState<F> {
    pub fn new(executor: PipelineExecutor<F>) -> Self {
        Self {
            executor,
            dispatch: Arc::new(Semaphore::new(DEFAULT_DISPATCH_LIMIT)),
            dispatch_limit: DEFAULT_DISPATCH_LIMIT,
        }
    }

    /// Cap the number of pipelines blocked on the blocking pool at once.
    /// The runtime needs more blocking threads than this (see
    /// [`crate::build_runtime`]): the catalog client resolves hosts there too.
    pub fn with_dispatch_limit(mut self, limit: usize) -> Self {
        let limit = limit.max(1);
        self.dispatch = Arc::new(Semaphore::new(limit));
        self.dispatch_limit = limit;
        self
    }

    pub fn dispatch_limit(&self) -> usize {
        self.dispatch_limit
    }
}

impl AppState {
    /// Wire a catalog and a trained model into a ready executor with its own
    /// scoring pool of `scoring_workers` threads.
    pub fn build(
        catalog: Arc<dyn CatalogClient>,
        model: Arc<SentimentModel>,
        scoring_workers: usize,
        runtime: tokio::runtime::Handle,
    ) -> anyhow::Result<Self> {
        let pool = Arc::new(build_scoring_pool(scoring_workers)?);
        let scorers = Arc::new(ScorerPool::new(model, pool.current_num_threads()));
        Ok(Self::new(PipelineExecutor::new(
            catalog, scorers, pool, runtime,
        )))
    }
}

/// Validated `/books` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    pub query: String,
    pub max_results: u32,
}

impl RequestParams {
    /// `q` must be present and not blank. `max` is clamped to 1..=10 and falls
    /// back to 5 when absent or not an integer.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let query = match params.get("q") {
            Some(q) if !q.trim().is_empty() => q.clone(),
            _ => return Err(ApiError::Validation),
        };
        let max_results = params
            .get("max")
            .and_then(|m| m.trim().parse::<i32>().ok())
            .map(|m| m.clamp(MIN_MAX_RESULTS, MAX_MAX_RESULTS) as u32)
            .unwrap_or(DEFAULT_MAX_RESULTS);
        Ok(Self { query, max_results })
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

pub fn router<F: EngineFactory + 'static>(state: AppState<F>) -> Router {
    with_http_guards(Router::new().fallback(dispatch::<F>).with_state(state))
}

/// Panic guard, CORS and request logging, innermost first.
pub fn with_http_guards(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::very_permissive())
        .layer(middleware::from_fn(log_requests))
}

async fn log_requests(req: Request, next: Next) -> Response {
    let t0 = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_lowercase();
    let query = req.uri().query().unwrap_or_default().to_string();
    info!(target: "http", %method, %path, %query, "REQ");

    let resp = next.run(req).await;

    let status = resp.status();
    let route = route_label(&path);
    let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
    counter!(
        "books_requests_total",
        "route" => route,
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    histogram!("books_request_duration_ms", "route" => route).record(elapsed_ms);
    info!(target: "http", %method, status = status.as_u16(), %path, elapsed_ms = elapsed_ms as u64, "RES");
    resp
}

fn route_label(path: &str) -> &'static str {
    match path {
        "/health" => "health",
        "/books" => "books",
        _ => "other",
    }
}

async fn dispatch<F: EngineFactory + 'static>(
    State(state): State<AppState<F>>,
    uri: Uri,
) -> Response {
    let path = uri.path().to_lowercase();
    let result = match path.as_str() {
        "/health" => Ok(json_response(StatusCode::OK, &HealthBody { status: "ok" })),
        "/books" => books(&state, &uri).await,
        _ => Err(ApiError::NotFound),
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            match &e {
                ApiError::Validation | ApiError::NotFound => {
                    warn!(target: "http", %path, reason = %e, "request rejected")
                }
                ApiError::Pipeline(_) | ApiError::Internal(_) => {
                    error!(target: "http", %path, error = %e, "request failed")
                }
            }
            e.into_response()
        }
    }
}

async fn books<F: EngineFactory + 'static>(
    state: &AppState<F>,
    uri: &Uri,
) -> Result<Response, ApiError> {
    let params = Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(p)| p)
        .unwrap_or_default();
    let RequestParams { query, max_results } = RequestParams::from_query(&params)?;

    let permit = Arc::clone(&state.dispatch)
        .acquire_owned()
        .await
        .map_err(|e| ApiError::Internal(format!("dispatch limiter closed: {e}")))?;

    let executor = state.executor.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        executor.execute(&query, max_results)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("pipeline worker ended abnormally: {e}")))?;

    let records = outcome.into_result()?;
    info!(target: "http", count = records.len(), "books scored");
    Ok(json_response(StatusCode::OK, &records))
}

/// Pretty-printed JSON body with `application/json` content type.
pub(crate) fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec_pretty(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            error!(target: "http", error = %e, "response serialization failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                format!("{{\n  \"error\": \"{MSG_INTERNAL}\"\n}}"),
            )
                .into_response()
        }
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(target: "http", panic = %detail, "handler panicked");
    ApiError::Internal(detail.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn blank_or_missing_query_is_rejected() {
        for params in [q(&[]), q(&[("q", "")]), q(&[("q", "   ")]), q(&[("q", "\t\n")])] {
            assert!(matches!(
                RequestParams::from_query(&params),
                Err(ApiError::Validation)
            ));
        }
    }

    #[test]
    fn max_is_clamped_and_defaulted() {
        let cases = [
            (None, 5),
            (Some("abc"), 5),
            (Some(""), 5),
            (Some("1.5"), 5),
            (Some("99999999999"), 5),
            (Some("0"), 1),
            (Some("-7"), 1),
            (Some("1"), 1),
            (Some("7"), 7),
            (Some(" 8 "), 8),
            (Some("10"), 10),
            (Some("11"), 10),
            (Some("2147483647"), 10),
        ];
        for (max, expected) in cases {
            let mut params = q(&[("q", "dogs")]);
            if let Some(m) = max {
                params.insert("max".into(), m.into());
            }
            let p = RequestParams::from_query(&params).unwrap();
            assert_eq!(p.max_results, expected, "max={max:?}");
            assert_eq!(p.query, "dogs");
        }
    }

    #[test]
    fn routes_are_labelled_by_exact_path() {
        assert_eq!(route_label("/health"), "health");
        assert_eq!(route_label("/books"), "books");
        assert_eq!(route_label("/books/"), "other");
        assert_eq!(route_label("/metrics"), "other");
    }

    #[test]
    fn dispatch_limit_is_at_least_one() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let state = AppState::build(
            Arc::new(crate::catalog::FixtureCatalog::from_json("{}")),
            Arc::new(SentimentModel::seeded().unwrap()),
            1,
            rt.handle().clone(),
        )
        .unwrap();
        assert_eq!(state.dispatch_limit(), DEFAULT_DISPATCH_LIMIT);
        assert_eq!(state.clone().with_dispatch_limit(0).dispatch_limit(), 1);
        assert_eq!(state.with_dispatch_limit(8).dispatch_limit(), 8);
    }

    #[test]
    fn panic_response_is_generic_500() {
        let resp = panic_response(Box::new("secret detail".to_string()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
