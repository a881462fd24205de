// src/catalog/fixture.rs
use async_trait::async_trait;

use crate::catalog::{parse_volumes, CatalogClient, RawRecord};
use crate::error::CatalogError;

/// Offline catalog that answers every query from a stored volumes payload.
/// Honors `max` the way the live service does.
pub struct FixtureCatalog {
    pub content: String,
}

impl FixtureCatalog {
    pub fn from_json(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

#[async_trait]
impl CatalogClient for FixtureCatalog {
    async fn search(&self, _query: &str, max: u32) -> Result<Vec<RawRecord>, CatalogError> {
        let mut out = parse_volumes(&self.content)?;
        out.truncate(max as usize);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
