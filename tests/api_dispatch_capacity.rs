// tests/api_dispatch_capacity.rs
//
// The service runtime with a small dispatch limit, the live catalog client and
// a stub catalog reached by host name. Every dispatch slot is taken by a
// blocked pipeline while the fetches still need the resolver, which runs on
// the same blocking pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    extract::Query,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceExt as _;

use books_sentiment::catalog::GoogleBooksClient;
use books_sentiment::config::CatalogConfig;
use books_sentiment::sentiment::SentimentModel;
use books_sentiment::AppState;

const DOGS: &str = include_str!("fixtures/google_books_dogs.json");
const DISPATCH_WORKERS: usize = 4;

async fn volumes(Query(_q): Query<HashMap<String, String>>) -> String {
    DOGS.to_string()
}

async fn spawn_stub() -> u16 {
    let app = Router::new().route("/books/v1/volumes", get(volumes));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let port = listener.local_addr().expect("stub addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    port
}

async fn run_burst(requests: usize) -> Vec<(StatusCode, usize)> {
    let port = spawn_stub().await;
    let cfg = CatalogConfig {
        base_url: format!("http://localhost:{port}/books/v1/volumes"),
        ..CatalogConfig::default()
    };
    let catalog = Arc::new(GoogleBooksClient::new(&cfg).expect("build client"));
    let model = Arc::new(SentimentModel::seeded().expect("train model"));
    let state = AppState::build(catalog, model, 2, tokio::runtime::Handle::current())
        .expect("build app state")
        .with_dispatch_limit(DISPATCH_WORKERS);
    let app = books_sentiment::app(state, None);

    let handles: Vec<_> = (0..requests)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                let req = Request::get("/books?q=dogs").body(Body::empty()).unwrap();
                let resp = app.oneshot(req).await.unwrap();
                let status = resp.status();
                let bytes = body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
                let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                (status, v.as_array().map(Vec::len).unwrap_or(0))
            })
        })
        .collect();

    let mut out = Vec::with_capacity(requests);
    for h in handles {
        // Well under the client's connect timeout: a starved lookup shows up
        // here rather than as a late 500.
        let joined = tokio::time::timeout(Duration::from_secs(3), h)
            .await
            .expect("request finished before the connect timeout");
        out.push(joined.expect("request task"));
    }
    out
}

#[test]
fn full_dispatch_limit_still_resolves_and_fetches() {
    let rt = books_sentiment::build_runtime(DISPATCH_WORKERS).expect("runtime");
    let results = rt.block_on(run_burst(DISPATCH_WORKERS));
    assert_eq!(results.len(), DISPATCH_WORKERS);
    for (status, count) in results {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count, 2, "two dog records carry descriptions");
    }
}

#[test]
fn requests_beyond_the_limit_wait_for_a_slot() {
    let rt = books_sentiment::build_runtime(DISPATCH_WORKERS).expect("runtime");
    let results = rt.block_on(run_burst(DISPATCH_WORKERS * 3));
    assert_eq!(results.len(), DISPATCH_WORKERS * 3);
    assert!(results
        .iter()
        .all(|(status, count)| *status == StatusCode::OK && *count == 2));
}
