//! Change classification against the prior snapshot.
//!
//! Splits a raw catalog pass into `kept` / `updated` / `new` so that only
//! records whose canonical content actually changed are re-embedded.

use std::collections::{HashMap, HashSet};

use crate::catalog::Product;

use super::hash::content_hash;

/// Disjoint classification of one raw catalog pass.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Prior records reused verbatim, embeddings included.
    pub kept: Vec<Product>,
    /// Records whose id existed before with a different fingerprint.
    pub updated: Vec<Product>,
    /// Records with an id not previously seen.
    pub new: Vec<Product>,
    /// Raw records dropped for having no id.
    pub skipped_no_id: usize,
    /// Raw records dropped as duplicate ids (first occurrence wins).
    pub skipped_duplicate: usize,
}

impl ChangeSet {
    /// Number of records that need a fresh embedding.
    pub fn pending_embedding(&self) -> usize {
        self.updated.len() + self.new.len()
    }
}

/// Classify the raw catalog against the prior snapshot.
///
/// Malformed records (missing id, duplicate id) are skipped with a warning;
/// one bad record never aborts the pass. A `kept` record is the *prior*
/// record clone, so its stored hash and embedding survive untouched and the
/// freshly recomputed hash is discarded.
pub fn classify(raw: Vec<Product>, prior: &HashMap<String, Product>) -> ChangeSet {
    let mut seen: HashSet<String> = HashSet::new();
    let mut changes = ChangeSet::default();

    for mut product in raw {
        if product.id.trim().is_empty() {
            log::warn!("skipping product without id (name: {:?})", product.name);
            changes.skipped_no_id += 1;
            continue;
        }

        if !seen.insert(product.id.clone()) {
            log::warn!("skipping duplicate id in raw catalog: {}", product.id);
            changes.skipped_duplicate += 1;
            continue;
        }

        let hash = content_hash(&product);
        match prior.get(&product.id) {
            Some(cached) if cached.content_hash.as_deref() == Some(hash.as_str()) => {
                changes.kept.push(cached.clone());
            }
            Some(_) => {
                product.content_hash = Some(hash);
                product.embedding = None;
                changes.updated.push(product);
            }
            None => {
                product.content_hash = Some(hash);
                product.embedding = None;
                changes.new.push(product);
            }
        }
    }

    changes
}
