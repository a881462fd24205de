// src/catalog/google_books.rs
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::{parse_volumes, CatalogClient, RawRecord};
use crate::config::CatalogConfig;
use crate::error::CatalogError;

/// Google Books volumes search. No API key is needed for basic queries.
pub struct GoogleBooksClient {
    http: reqwest::Client,
    base_url: String,
}

impl GoogleBooksClient {
    pub fn new(cfg: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
        })
    }
}

#[async_trait]
impl CatalogClient for GoogleBooksClient {
    async fn search(&self, query: &str, max: u32) -> Result<Vec<RawRecord>, CatalogError> {
        let max_results = max.to_string();
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_volumes(&text)
    }

    fn name(&self) -> &'static str {
        "google-books"
    }
}
