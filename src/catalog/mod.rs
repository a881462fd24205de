// src/catalog/mod.rs
//! External book catalog: record type, client trait and payload decoding.

pub mod fixture;
pub mod google_books;

use serde::Deserialize;

use crate::error::CatalogError;

pub use fixture::FixtureCatalog;
pub use google_books::GoogleBooksClient;

/// One unfiltered catalog entry. Lives for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub description: Option<String>,
}

impl RawRecord {
    /// True when the record carries a description worth scoring.
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }
}

#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch up to `max` records matching `query`.
    async fn search(&self, query: &str, max: u32) -> Result<Vec<RawRecord>, CatalogError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct VolumesRoot {
    #[serde(default)]
    items: Option<Vec<VolumeItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeItem {
    #[serde(default)]
    volume_info: Option<VolumeInfo>,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
}

/// Decode a volumes search payload. Items without `volumeInfo` are skipped.
pub fn parse_volumes(text: &str) -> Result<Vec<RawRecord>, CatalogError> {
    let root: VolumesRoot = serde_json::from_str(text)?;
    let out = root
        .items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|it| it.volume_info)
        .map(|vi| RawRecord {
            title: vi.title,
            authors: vi.authors,
            description: vi.description,
        })
        .collect();
    Ok(out)
}
