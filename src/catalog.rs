//! Product records and raw catalog IO.
//!
//! A [`Product`] carries the caller-supplied descriptive fields plus two
//! derived fields maintained by the sync pipeline: `content_hash` and
//! `embedding`. The retrieval layer never mutates either.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Name assigned to products missing one at the ingestion boundary.
pub const DEFAULT_NAME: &str = "Untitled";

/// Category assigned to products missing one at the ingestion boundary.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    /// `None` when the source value was absent or unparseable.
    #[serde(default)]
    pub price: Option<f64>,

    #[serde(default)]
    pub image_url: String,

    /// Fingerprint over the canonical fields, set by the sync pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Fixed-dimensionality vector, present once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read raw catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("raw catalog {path} is not a valid product array: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Load the raw catalog (a JSON array of products without derived fields).
///
/// A missing or malformed raw catalog is fatal for the pipeline, unlike the
/// prior snapshot which is merely a cache.
pub fn load_raw(path: &Path) -> Result<Vec<Product>, CatalogError> {
    let bytes = std::fs::read(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse {
        path: path.display().to_string(),
        source,
    })
}
