//! Minimal sentence-embedding service for all-MiniLM-L6-v2.
//!
//! Callers `POST /embed` a JSON `{"text": "..."}` and receive a deterministic,
//! L2-normalized 384-dimensional vector. The model runs locally through ONNX
//! Runtime; text is tokenized with HuggingFace `tokenizers`.
//!
//! # Pipeline
//!
//! | Step | Input | Output |
//! |------|-------|--------|
//! | Tokenize | text | ids + attention mask, padded/truncated to `max_length` |
//! | Infer | ids, mask, zero segment ids | `[1, max_length, 384]` hidden states |
//! | Mean pool | hidden states + mask | 384-dim vector |
//! | Normalize | vector | unit vector (zero vector for an all-zero mask) |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`embedding`]: Tokenizer/engine contracts, pooling, and the ONNX-backed pipeline
//! - [`server`]: Shared service state, axum routes, and HTTP error mapping

pub mod config;
pub mod embedding;
pub mod server;
