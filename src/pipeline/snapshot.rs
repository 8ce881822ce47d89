//! Snapshot persistence: merge, sort, atomic write.
//!
//! The snapshot is a JSON array of complete product records sorted by `id`,
//! so re-runs and diffs are deterministic. Writes go through a temp file in
//! the target directory followed by a rename; a crash mid-write leaves the
//! previous snapshot readable.

use std::collections::HashMap;
use std::path::Path;

use crate::catalog::Product;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load the prior snapshot.
///
/// The snapshot is a cache: a missing or unparseable file is treated as
/// empty with a warning, which only costs a full re-embed.
pub fn load_snapshot(path: &Path) -> Vec<Product> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return vec![],
    };

    match serde_json::from_slice(&bytes) {
        Ok(products) => products,
        Err(err) => {
            log::warn!(
                "snapshot {} is not valid JSON ({err}), treating as empty",
                path.display()
            );
            vec![]
        }
    }
}

/// Index a snapshot by product id. Records without an id are dropped.
pub fn prior_map(products: Vec<Product>) -> HashMap<String, Product> {
    products
        .into_iter()
        .filter(|p| !p.id.trim().is_empty())
        .map(|p| (p.id.clone(), p))
        .collect()
}

/// Merge kept and freshly embedded records into one snapshot sorted by id.
pub fn merge(kept: Vec<Product>, embedded: Vec<Product>) -> Vec<Product> {
    let mut merged = kept;
    merged.extend(embedded);
    merged.sort_by(|a, b| a.id.cmp(&b.id));
    merged
}

/// Persist the snapshot atomically (temp file in the same directory, then
/// rename over the target).
pub fn save_snapshot(path: &Path, products: &[Product]) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, products)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| SnapshotError::Io(err.error))?;

    Ok(())
}
