use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[clap(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Normalize the raw CSV catalog into the raw product JSON file
    Preprocess {
        /// Read the CSV from this path instead of the configured one
        #[clap(long)]
        input: Option<PathBuf>,
    },

    /// Synchronize product embeddings with the raw catalog
    ///
    /// Only products whose content changed since the last run are
    /// re-embedded; everything else reuses the cached vector.
    Sync {},

    /// Rebuild the backend index from the embedded snapshot
    Load {},

    /// Start the HTTP search and recommendation service
    Serve {},
}
