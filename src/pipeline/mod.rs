//! Incremental embedding synchronization pipeline.
//!
//! raw catalog -> change classification against the prior snapshot ->
//! one batch encoder call for updated/new records -> merged snapshot,
//! sorted by id and persisted atomically.
//!
//! The prior snapshot is threaded through as an explicit map, never held
//! as ambient state, so every stage stays testable as a pure function.

mod classify;
mod embed;
mod hash;
mod snapshot;

pub use classify::{classify, ChangeSet};
pub use embed::{embed_products, embed_text, EmbedError};
pub use hash::content_hash;
pub use snapshot::{load_snapshot, merge, prior_map, save_snapshot, SnapshotError};

use crate::catalog::{self, CatalogError};
use crate::config::Config;
use crate::encoder::{Encoder, EncoderError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Counts reported after a sync run.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub kept: usize,
    pub updated: usize,
    pub new: usize,
    pub total: usize,
}

/// Run one full synchronization pass.
///
/// The encoder is only loaded when at least one record actually needs a
/// fresh embedding; a no-op pass never touches the model.
pub fn run(config: &Config) -> Result<SyncReport, PipelineError> {
    let raw = catalog::load_raw(&config.paths.raw_json)?;
    let prior = load_snapshot(&config.paths.snapshot);
    log::info!(
        "comparing {} raw products against {} cached records",
        raw.len(),
        prior.len()
    );

    let prior = prior_map(prior);
    let changes = classify(raw, &prior);
    if changes.skipped_no_id + changes.skipped_duplicate > 0 {
        log::warn!(
            "skipped {} records without id and {} duplicate ids",
            changes.skipped_no_id,
            changes.skipped_duplicate
        );
    }
    let (kept, updated, new) = (changes.kept.len(), changes.updated.len(), changes.new.len());

    let embedded = if changes.pending_embedding() > 0 {
        log::info!(
            "{} products need embeddings, loading model '{}'",
            changes.pending_embedding(),
            config.encoder.model
        );
        let encoder = Encoder::new(&config.encoder)?;

        let mut pending = changes.updated;
        pending.extend(changes.new);

        embed_products(pending, config.encoder.vector_dim, |texts| {
            encoder.embed_batch(texts).map_err(Into::into)
        })?
    } else {
        log::info!("no products need re-embedding");
        vec![]
    };

    let merged = merge(changes.kept, embedded);
    save_snapshot(&config.paths.snapshot, &merged)?;

    let report = SyncReport {
        kept,
        updated,
        new,
        total: merged.len(),
    };
    log::info!(
        "snapshot saved to {}: {} records (kept {}, updated {}, new {})",
        config.paths.snapshot.display(),
        report.total,
        report.kept,
        report.updated,
        report.new
    );

    Ok(report)
}
