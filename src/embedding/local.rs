//! ONNX Runtime + HuggingFace tokenizers adapters.
//!
//! [`HfTokenizer`] implements [`TextTokenizer`] with fixed-length truncation
//! and padding; [`OnnxEngine`] implements [`InferenceEngine`] over an
//! all-MiniLM-L6-v2 ONNX export via `ort`.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use ndarray::Array3;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{EncodedInput, InferenceEngine, TextTokenizer, TokenEmbeddings, EMBEDDING_DIM};

/// Tokenizer that always emits exactly `max_length` positions.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
}

impl HfTokenizer {
    pub fn load(path: &Path, max_length: usize) -> Result<Self> {
        anyhow::ensure!(
            path.exists(),
            "Tokenizer not found at {}. Run `embed-svc model download` first.",
            path.display()
        );

        let mut tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::Fixed(max_length),
            ..Default::default()
        }));

        tracing::info!(tokenizer = %path.display(), max_length, "tokenizer loaded");

        Ok(Self { tokenizer })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<EncodedInput> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenizer error: {e}"))?;

        let input_ids = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        Ok(EncodedInput::new(input_ids, attention_mask)?)
    }
}

/// ONNX Runtime session for the sentence encoder.
pub struct OnnxEngine {
    // `Session::run` needs `&mut`; requests take turns on the one session.
    session: Mutex<Session>,
}

impl OnnxEngine {
    pub fn load(path: &Path, intra_threads: usize) -> Result<Self> {
        anyhow::ensure!(
            path.exists(),
            "ONNX model not found at {}. Run `embed-svc model download` first.",
            path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %path.display(), intra_threads, "ONNX model loaded");

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceEngine for OnnxEngine {
    fn run(&self, input: &EncodedInput) -> Result<TokenEmbeddings> {
        let seq_len = input.len();
        let shape = vec![1i64, seq_len as i64];

        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input.input_ids().to_vec().into_boxed_slice()))?;
        let attention_mask_tensor = Tensor::from_array((
            shape.clone(),
            input.attention_mask().to_vec().into_boxed_slice(),
        ))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, input.token_type_ids().into_boxed_slice()))?;

        // The session keeps no state between runs, so a poisoned lock is still usable.
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        // The output name varies by ONNX export. Try common names, fall back to index 0.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .context("failed to extract token_embeddings tensor")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 3 && dims[0] == 1 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token_embeddings shape: {dims:?}, expected [1, seq, {EMBEDDING_DIM}]"
        );

        let dims = (dims[0] as usize, dims[1] as usize, dims[2] as usize);
        Array3::from_shape_vec(dims, data.to_vec())
            .context("token_embeddings data does not match its shape")
    }
}
