// tests/catalog_google_books.rs
//
// GoogleBooksClient against an in-process stub of the volumes endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::Query,
    http::StatusCode,
    routing::get,
    Router,
};
use tokio::net::TcpListener;

use books_sentiment::catalog::{CatalogClient, GoogleBooksClient};
use books_sentiment::config::CatalogConfig;
use books_sentiment::error::CatalogError;

const DOGS: &str = include_str!("fixtures/google_books_dogs.json");

async fn volumes(Query(q): Query<HashMap<String, String>>) -> (StatusCode, String) {
    match q.get("q").map(String::as_str) {
        Some("dogs") if q.get("maxResults").map(String::as_str) == Some("3") => {
            (StatusCode::OK, DOGS.to_string())
        }
        Some("dogs") => (StatusCode::BAD_REQUEST, "unexpected maxResults".into()),
        Some("garbage") => (StatusCode::OK, "<html>not json</html>".into()),
        Some("quota") => (StatusCode::TOO_MANY_REQUESTS, "quota exceeded".into()),
        _ => (StatusCode::OK, r#"{"kind":"books#volumes","totalItems":0}"#.into()),
    }
}

async fn spawn_stub() -> SocketAddr {
    let app = Router::new().route("/books/v1/volumes", get(volumes));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    addr
}

fn client_for(addr: SocketAddr) -> GoogleBooksClient {
    let cfg = CatalogConfig {
        base_url: format!("http://{addr}/books/v1/volumes"),
        ..CatalogConfig::default()
    };
    GoogleBooksClient::new(&cfg).expect("build client")
}

#[tokio::test]
async fn search_decodes_volumes_and_passes_params() {
    let client = client_for(spawn_stub().await);
    let out = client.search("dogs", 3).await.expect("search ok");
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].title.as_deref(), Some("A Dog's Purpose"));
    assert_eq!(out[2].title, None);
    assert_eq!(client.name(), "google-books");
}

#[tokio::test]
async fn no_items_is_empty_list() {
    let client = client_for(spawn_stub().await);
    let out = client.search("nothing here", 5).await.expect("search ok");
    assert!(out.is_empty());
}

#[tokio::test]
async fn non_success_status_is_status_error() {
    let client = client_for(spawn_stub().await);
    match client.search("quota", 5).await {
        Err(CatalogError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert!(body.contains("quota"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let client = client_for(spawn_stub().await);
    assert!(matches!(
        client.search("garbage", 5).await,
        Err(CatalogError::Decode(_))
    ));
}

#[tokio::test]
async fn unreachable_host_is_http_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(addr);
    assert!(matches!(
        client.search("dogs", 3).await,
        Err(CatalogError::Http(_))
    ));
}
