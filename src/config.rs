//! YAML configuration with documented defaults.
//!
//! Every field has a serde default so a partial config file works; invalid
//! values abort startup loudly rather than limping along with a half-valid
//! setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_BACKEND_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX: &str = "products";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CATEGORIES_CAP: u32 = 100;
const DEFAULT_BULK_CHUNK_SIZE: usize = 500;

/// Default embedding model; 384-dim MiniLM keeps the index small.
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_VECTOR_DIM: usize = 384;
const DEFAULT_ENCODE_TIMEOUT_SECS: u64 = 30;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the search backend.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Index name holding the product records.
    #[serde(default = "default_index")]
    pub index: String,

    /// Timeout applied to every backend request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on distinct categories returned by the aggregation.
    /// Categories beyond the cap are silently absent from the result.
    #[serde(default = "default_categories_cap")]
    pub categories_cap: u32,

    /// Documents per bulk indexing request.
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Embedding model name (e.g. "all-MiniLM-L6-v2").
    #[serde(default = "default_model")]
    pub model: String,

    /// Expected vector width; must match both the model output and the
    /// backend mapping.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Directory holding downloaded model files (under `models/`).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Timeout for a single encode call on the serving path.
    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw CSV catalog consumed by `preprocess`.
    #[serde(default = "default_raw_csv")]
    pub raw_csv: PathBuf,

    /// Normalized raw catalog consumed by `sync`.
    #[serde(default = "default_raw_json")]
    pub raw_json: PathBuf,

    /// Snapshot with hashes and embeddings, produced by `sync` and
    /// consumed by `load`.
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for `serve`.
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            index: default_index(),
            request_timeout_secs: default_request_timeout_secs(),
            categories_cap: default_categories_cap(),
            bulk_chunk_size: default_bulk_chunk_size(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            vector_dim: default_vector_dim(),
            cache_dir: default_cache_dir(),
            encode_timeout_secs: default_encode_timeout_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_csv: default_raw_csv(),
            raw_json: default_raw_json(),
            snapshot: default_snapshot(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            encoder: EncoderConfig::default(),
            paths: PathsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_categories_cap() -> u32 {
    DEFAULT_CATEGORIES_CAP
}

fn default_bulk_chunk_size() -> usize {
    DEFAULT_BULK_CHUNK_SIZE
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_vector_dim() -> usize {
    DEFAULT_VECTOR_DIM
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_encode_timeout_secs() -> u64 {
    DEFAULT_ENCODE_TIMEOUT_SECS
}

fn default_raw_csv() -> PathBuf {
    PathBuf::from("data/raw_products.csv")
}

fn default_raw_json() -> PathBuf {
    PathBuf::from("data/products.json")
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("data/products_with_embeddings.json")
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl Config {
    /// Load the config file, creating one with defaults if it is absent.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let default = Self::default();
            let yaml = serde_yml::to_string(&default).expect("default config serializes");
            if let Err(err) = std::fs::write(path, yaml) {
                log::warn!("could not write default config to {}: {err}", path.display());
            } else {
                log::info!("created default config at {}", path.display());
            }
            return default;
        }

        let config_str = std::fs::read_to_string(path)
            .unwrap_or_else(|err| panic!("failed to read config {}: {err}", path.display()));
        let config: Self = serde_yml::from_str(&config_str)
            .unwrap_or_else(|err| panic!("config {} is malformed: {err}", path.display()));

        config.validate();
        config
    }

    fn validate(&self) {
        if url::Url::parse(&self.backend.url).is_err() {
            panic!("backend.url is not a valid URL: {}", self.backend.url);
        }
        if self.backend.index.trim().is_empty() {
            panic!("backend.index must not be empty");
        }
        if self.backend.request_timeout_secs == 0 {
            panic!("backend.request_timeout_secs must be greater than 0");
        }
        if self.backend.categories_cap == 0 {
            panic!("backend.categories_cap must be greater than 0");
        }
        if self.backend.bulk_chunk_size == 0 {
            panic!("backend.bulk_chunk_size must be greater than 0");
        }

        if self.encoder.vector_dim == 0 {
            panic!("encoder.vector_dim must be greater than 0");
        }
        if self.encoder.encode_timeout_secs == 0 {
            panic!("encoder.encode_timeout_secs must be greater than 0");
        }

        if self.server.listen.parse::<SocketAddr>().is_err() {
            panic!(
                "server.listen is not a valid socket address: {}",
                self.server.listen
            );
        }
    }
}
