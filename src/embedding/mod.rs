//! Text-to-vector embedding pipeline.
//!
//! The pipeline is tokenizer → inference engine → mean pooling → L2
//! normalization. The two external pieces sit behind the [`TextTokenizer`]
//! and [`InferenceEngine`] traits; [`Embedder`] owns one of each and produces
//! [`EMBEDDING_DIM`]-dimensional unit vectors. The ONNX-backed adapters live
//! in [`local`] and are built via [`load_local`].

pub mod local;
pub mod pooling;

use std::sync::Arc;

use ndarray::{Array3, Axis};
use thiserror::Error;

use crate::config::ModelConfig;

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// The only model this service loads and reports.
pub const MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Per-token hidden states, shape `[batch = 1, sequence_length, EMBEDDING_DIM]`.
pub type TokenEmbeddings = Array3<f32>;

/// Failure of one pipeline run. Every variant except [`EmbedError::EmptyText`]
/// is a server-side failure.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("missing 'text' field")]
    EmptyText,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("tokenization failed: {0:#}")]
    Tokenization(anyhow::Error),

    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("unexpected token embeddings shape {actual:?}, expected {expected:?}")]
    UnexpectedShape {
        actual: Vec<usize>,
        expected: [usize; 3],
    },

    #[error("embedding has non-finite value {value} at dimension {index}")]
    NonFinite { index: usize, value: f32 },
}

impl EmbedError {
    /// Whether the caller, rather than the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyText)
    }
}

/// Token ids plus attention mask for one text, padded or truncated to a fixed length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl EncodedInput {
    /// Build an encoding, enforcing parallel lengths and a binary mask.
    pub fn new(input_ids: Vec<i64>, attention_mask: Vec<i64>) -> Result<Self, EmbedError> {
        if input_ids.len() != attention_mask.len() {
            return Err(EmbedError::InvalidEncoding(format!(
                "{} input ids but {} mask values",
                input_ids.len(),
                attention_mask.len()
            )));
        }
        if let Some(bad) = attention_mask.iter().find(|&&m| m != 0 && m != 1) {
            return Err(EmbedError::InvalidEncoding(format!(
                "attention mask value {bad} is not 0 or 1"
            )));
        }
        Ok(Self {
            input_ids,
            attention_mask,
        })
    }

    pub fn input_ids(&self) -> &[i64] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[i64] {
        &self.attention_mask
    }

    /// All-zero segment ids; single-segment text only.
    pub fn token_type_ids(&self) -> Vec<i64> {
        vec![0; self.input_ids.len()]
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Maps text to a fixed-length [`EncodedInput`].
///
/// Implementations own their maximum length, truncation and padding policy;
/// that policy must not change after construction.
pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> anyhow::Result<EncodedInput>;
}

/// Runs the encoder network over one encoded input.
///
/// Must be deterministic: identical inputs give identical outputs.
pub trait InferenceEngine: Send + Sync {
    fn run(&self, input: &EncodedInput) -> anyhow::Result<TokenEmbeddings>;
}

/// The full text → unit vector pipeline. Shared read-only across requests.
#[derive(Clone)]
pub struct Embedder {
    tokenizer: Arc<dyn TextTokenizer>,
    engine: Arc<dyn InferenceEngine>,
    max_length: usize,
}

impl Embedder {
    pub fn new(
        tokenizer: Arc<dyn TextTokenizer>,
        engine: Arc<dyn InferenceEngine>,
        max_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            engine,
            max_length,
        }
    }

    /// Embed a single text into an L2-normalized [`EMBEDDING_DIM`]-dim vector.
    ///
    /// Synchronous and CPU-heavy; callers in async contexts should use
    /// `tokio::task::spawn_blocking`.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::EmptyText);
        }

        let encoded = self
            .tokenizer
            .encode(text)
            .map_err(EmbedError::Tokenization)?;
        if encoded.len() != self.max_length {
            return Err(EmbedError::InvalidEncoding(format!(
                "tokenizer produced {} positions, expected {}",
                encoded.len(),
                self.max_length
            )));
        }

        let token_embeddings = self.engine.run(&encoded).map_err(EmbedError::Inference)?;

        let expected = [1, self.max_length, EMBEDDING_DIM];
        if token_embeddings.shape() != expected {
            return Err(EmbedError::UnexpectedShape {
                actual: token_embeddings.shape().to_vec(),
                expected,
            });
        }

        let pooled = pooling::mean_pool(
            token_embeddings.index_axis(Axis(0), 0),
            encoded.attention_mask(),
        );
        let embedding = pooling::l2_normalize(pooled).to_vec();

        if let Some((index, &value)) = embedding.iter().enumerate().find(|(_, x)| !x.is_finite()) {
            return Err(EmbedError::NonFinite { index, value });
        }
        Ok(embedding)
    }
}

/// Load the ONNX session and tokenizer from `config.dir` and wire them into an [`Embedder`].
///
/// Returns an error if either asset is missing or unreadable; run
/// `embed-svc model download` first.
pub fn load_local(config: &ModelConfig) -> anyhow::Result<Embedder> {
    let tokenizer = local::HfTokenizer::load(&config.tokenizer_path(), config.max_length)?;
    let engine = local::OnnxEngine::load(&config.model_path(), config.intra_threads)?;
    Ok(Embedder::new(
        Arc::new(tokenizer),
        Arc::new(engine),
        config.max_length,
    ))
}
