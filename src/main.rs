use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

mod backend;
mod catalog;
mod cli;
mod config;
mod encoder;
mod ingest;
mod pipeline;
#[cfg(test)]
mod tests;
mod web;

use backend::{BulkReport, EsBackend, SearchBackend};
use config::Config;

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args = cli::Args::parse();
    let config = Config::load(&args.config);

    match args.command {
        cli::Command::Preprocess { input } => {
            let input = input.unwrap_or_else(|| config.paths.raw_csv.clone());
            let count = ingest::preprocess(&input, &config.paths.raw_json)?;
            println!(
                "preprocessed {count} products into {}",
                config.paths.raw_json.display()
            );
            Ok(())
        }

        cli::Command::Sync {} => {
            let report = pipeline::run(&config)?;
            println!(
                "snapshot: {} products (kept: {} | updated: {} | new: {})",
                report.total, report.kept, report.updated, report.new
            );
            Ok(())
        }

        cli::Command::Load {} => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(load_index(&config)),

        cli::Command::Serve {} => web::start_daemon(config),
    }
}

/// Rebuild the backend index from the snapshot.
async fn load_index(config: &Config) -> anyhow::Result<()> {
    let snapshot = pipeline::load_snapshot(&config.paths.snapshot);
    if snapshot.is_empty() {
        bail!(
            "snapshot {} is missing or empty, run `rekko sync` first",
            config.paths.snapshot.display()
        );
    }

    let dims = config.encoder.vector_dim;
    for product in &snapshot {
        match &product.embedding {
            Some(vector) if vector.len() == dims => {}
            Some(vector) => bail!(
                "product {} has a {}-dim embedding but the index is configured for {dims}; \
                 re-run `rekko sync` with the matching model",
                product.id,
                vector.len()
            ),
            None => bail!(
                "product {} has no embedding, run `rekko sync` before loading",
                product.id
            ),
        }
    }

    let backend = EsBackend::new(&config.backend)?;
    backend
        .ping()
        .await
        .with_context(|| format!("search backend unreachable at {}", config.backend.url))?;

    backend.recreate_index(dims).await?;

    let bar = ProgressBar::new(snapshot.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}").expect("valid template"),
    );

    let mut report = BulkReport::default();
    for chunk in snapshot.chunks(config.backend.bulk_chunk_size) {
        report.absorb(backend.bulk_load(chunk).await?);
        bar.inc(chunk.len() as u64);
    }
    bar.finish_and_clear();

    println!(
        "indexed {} products into '{}' ({} failures)",
        report.indexed, config.backend.index, report.failed
    );
    for error in &report.errors {
        log::error!("bulk failure: {error}");
    }
    if report.failed > 0 {
        log::warn!(
            "{} of {} documents failed to index",
            report.failed,
            snapshot.len()
        );
    }
    log::info!("documents become searchable after the backend's refresh interval");

    Ok(())
}
