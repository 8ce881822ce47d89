//! Raw CSV catalog normalization.
//!
//! Reads the UTF-8 CSV export, applies the ingestion defaulting rules, and
//! writes the raw product JSON consumed by `sync`. Field validation lives
//! here at the boundary so retrieval code never sees half-shaped records.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::catalog::{Product, DEFAULT_CATEGORY, DEFAULT_NAME};
use crate::pipeline::{save_snapshot, SnapshotError};

const REQUIRED_COLUMNS: &[&str] = &["id", "name", "description", "price", "image_url", "category"];

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("input is missing required columns: {0}")]
    MissingColumns(String),

    #[error(transparent)]
    Write(#[from] SnapshotError),
}

/// Normalize the CSV at `input` into a raw product JSON array at `output`.
///
/// Returns the number of products written. Rows without an id and rows
/// duplicating an earlier id are skipped with a warning; a single bad row
/// never fails the pass.
pub fn preprocess(input: &Path, output: &Path) -> Result<usize, IngestError> {
    let mut reader = csv::Reader::from_path(input)?;

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h == **column))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns(missing.join(", ")));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut products: Vec<Product> = Vec::new();

    for row in reader.deserialize::<HashMap<String, String>>() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                log::warn!("skipping unreadable csv row: {err}");
                continue;
            }
        };

        let product = normalize_row(&row);
        if product.id.is_empty() {
            log::warn!("skipping csv row without id (name: {:?})", product.name);
            continue;
        }
        if !seen.insert(product.id.clone()) {
            log::warn!("skipping duplicate id in csv: {}", product.id);
            continue;
        }

        products.push(product);
    }

    // same atomic write discipline as the snapshot
    save_snapshot(output, &products)?;
    log::info!("wrote {} products to {}", products.len(), output.display());

    Ok(products.len())
}

fn field<'a>(row: &'a HashMap<String, String>, name: &str) -> &'a str {
    row.get(name).map(|v| v.trim()).unwrap_or("")
}

fn normalize_row(row: &HashMap<String, String>) -> Product {
    let name = field(row, "name");
    let category = field(row, "category");

    Product {
        id: field(row, "id").to_string(),
        name: if name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            name.to_string()
        },
        description: field(row, "description").to_string(),
        category: if category.is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            category.to_string()
        },
        price: field(row, "price").parse::<f64>().ok(),
        image_url: field(row, "image_url").to_string(),
        content_hash: None,
        embedding: None,
    }
}
