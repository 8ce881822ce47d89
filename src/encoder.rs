//! Local text encoder backed by fastembed.
//!
//! Wraps fastembed's `TextEmbedding` behind a `Mutex` (its `embed` takes
//! `&mut self`) and pins the vector width: the probed model dimensionality
//! must match the configured one, otherwise startup fails hard rather than
//! producing an index the backend mapping cannot hold.

use std::sync::Mutex;

use fastembed::{InitOptions, TextEmbedding};

use crate::config::EncoderConfig;

/// Seam between the serving path and the concrete model, so request
/// handlers can be exercised without downloading model files.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError>;
}

pub struct Encoder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl TextEncoder for Encoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        self.embed(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("encoder initialization failed: {0}")]
    InitFailed(String),

    #[error("unknown embedding model: {0}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)")]
    InvalidModel(String),

    #[error("model produces {actual}-dimensional vectors but {expected} are configured")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

impl Encoder {
    /// Load the configured model, downloading it into `cache_dir/models` on
    /// first use, and verify its vector width against the configuration.
    pub fn new(config: &EncoderConfig) -> Result<Self, EncoderError> {
        let model_enum = parse_model_name(&config.model)?;

        let models_dir = config.cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|err| {
            EncoderError::InitFailed(format!("failed to create models directory: {err}"))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|err| EncoderError::InitFailed(err.to_string()))?;

        let dimensions = probe_dimensions(&mut model)?;
        if dimensions != config.vector_dim {
            return Err(EncoderError::DimensionMismatch {
                expected: config.vector_dim,
                actual: dimensions,
            });
        }

        Ok(Self {
            model: Mutex::new(model),
            model_name: config.model.clone(),
            dimensions,
        })
    }

    pub fn name(&self) -> &str {
        &self.model_name
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Encode a single text.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut model = self.model.lock().map_err(|err| {
            EncoderError::EmbeddingFailed(format!("failed to acquire model lock: {err}"))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|err| EncoderError::EmbeddingFailed(err.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EmbeddingFailed("no embedding returned".to_string()))
    }

    /// Encode a batch of texts in one call, preserving input order.
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|err| {
            EncoderError::EmbeddingFailed(format!("failed to acquire model lock: {err}"))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|err| EncoderError::EmbeddingFailed(err.to_string()))
    }
}

fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EncoderError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EncoderError::InvalidModel(name.to_string())),
    }
}

/// Probe the model once to learn its output width.
fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EncoderError> {
    let probe = model
        .embed(vec!["probe"], None)
        .map_err(|err| EncoderError::InitFailed(format!("failed to probe dimensions: {err}")))?;

    probe
        .first()
        .map(|v| v.len())
        .ok_or_else(|| EncoderError::InitFailed("model returned no embedding".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;

    fn config(model: &str, dim: usize, cache_dir: &std::path::Path) -> EncoderConfig {
        EncoderConfig {
            model: model.to_string(),
            vector_dim: dim,
            cache_dir: cache_dir.to_path_buf(),
            encode_timeout_secs: 30,
        }
    }

    #[test]
    fn invalid_model_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Encoder::new(&config("nonexistent-model", 384, tmp.path()));
        assert!(matches!(result, Err(EncoderError::InvalidModel(_))));
    }

    #[test]
    fn model_name_parsing_accepts_known_aliases() {
        assert!(parse_model_name("all-MiniLM-L6-v2").is_ok());
        assert!(parse_model_name("BGE-Base-EN-v1.5").is_ok());
        assert!(parse_model_name("bge-large-en-v1.5-q").is_ok());
        assert!(parse_model_name("word2vec").is_err());
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn minilm_produces_configured_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Encoder::new(&config("all-MiniLM-L6-v2", 384, tmp.path())).unwrap();

        assert_eq!(encoder.dimensions(), 384);
        assert_eq!(encoder.embed("hello world").unwrap().len(), 384);
    }

    #[test]
    #[ignore = "requires model download"]
    fn dimension_mismatch_is_a_hard_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = Encoder::new(&config("all-MiniLM-L6-v2", 768, tmp.path()));
        assert!(matches!(
            result,
            Err(EncoderError::DimensionMismatch {
                expected: 768,
                actual: 384
            })
        ));
    }

    #[test]
    #[ignore = "requires model download"]
    fn batch_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Encoder::new(&config("all-MiniLM-L6-v2", 384, tmp.path())).unwrap();

        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = encoder.embed_batch(&texts).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], encoder.embed("first text").unwrap());
        assert_eq!(batch[1], encoder.embed("second text").unwrap());
    }
}
