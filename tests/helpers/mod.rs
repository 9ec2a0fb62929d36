#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use embed_svc::embedding::{
    EmbedError, EncodedInput, Embedder, InferenceEngine, TextTokenizer, TokenEmbeddings,
    EMBEDDING_DIM,
};
use embed_svc::server::{create_router, ServiceState};
use ndarray::Array3;
use tower::util::ServiceExt;

pub const MAX_LENGTH: usize = 16;

const CLS: i64 = 101;
const SEP: i64 = 102;

/// Whitespace tokenizer: `[CLS] word-hashes... [SEP]`, truncated then zero-padded.
pub struct FakeTokenizer {
    pub max_length: usize,
}

fn word_id(word: &str) -> i64 {
    let hash = word.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    });
    1000 + (hash % 29_000) as i64
}

impl TextTokenizer for FakeTokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<EncodedInput> {
        let mut ids = vec![CLS];
        ids.extend(text.split_whitespace().map(word_id));
        ids.truncate(self.max_length - 1);
        ids.push(SEP);

        let mut mask = vec![1; ids.len()];
        ids.resize(self.max_length, 0);
        mask.resize(self.max_length, 0);
        Ok(EncodedInput::new(ids, mask)?)
    }
}

/// Deterministic engine: each hidden value is a hash of (token id, dim).
pub struct FakeEngine;

impl InferenceEngine for FakeEngine {
    fn run(&self, input: &EncodedInput) -> anyhow::Result<TokenEmbeddings> {
        Ok(Array3::from_shape_fn(
            (1, input.len(), EMBEDDING_DIM),
            |(_, s, d)| {
                let id = input.input_ids()[s] as u64;
                let mixed = id
                    .wrapping_mul(2_654_435_761)
                    .wrapping_add((d as u64 + 1).wrapping_mul(40_503));
                (mixed % 2000) as f32 / 1000.0 - 0.999
            },
        ))
    }
}

pub struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn run(&self, _input: &EncodedInput) -> anyhow::Result<TokenEmbeddings> {
        anyhow::bail!("onnx runtime error: invalid input shape")
    }
}

/// Runs cleanly but emits NaN hidden states.
pub struct NanEngine;

impl InferenceEngine for NanEngine {
    fn run(&self, input: &EncodedInput) -> anyhow::Result<TokenEmbeddings> {
        Ok(Array3::from_elem((1, input.len(), EMBEDDING_DIM), f32::NAN))
    }
}

pub struct PanickingEngine;

impl InferenceEngine for PanickingEngine {
    fn run(&self, _input: &EncodedInput) -> anyhow::Result<TokenEmbeddings> {
        panic!("engine crashed");
    }
}

pub struct SlowEngine(pub Duration);

impl InferenceEngine for SlowEngine {
    fn run(&self, input: &EncodedInput) -> anyhow::Result<TokenEmbeddings> {
        std::thread::sleep(self.0);
        FakeEngine.run(input)
    }
}

pub fn fake_embedder(engine: Arc<dyn InferenceEngine>) -> Embedder {
    Embedder::new(
        Arc::new(FakeTokenizer {
            max_length: MAX_LENGTH,
        }),
        engine,
        MAX_LENGTH,
    )
}

pub fn test_app(engine: Arc<dyn InferenceEngine>) -> Router {
    let state = ServiceState::new(fake_embedder(engine));
    create_router(Arc::new(state))
}

pub fn test_app_with_timeout(engine: Arc<dyn InferenceEngine>, timeout: Duration) -> Router {
    let state = ServiceState::new(fake_embedder(engine)).with_request_timeout(Some(timeout));
    create_router(Arc::new(state))
}

pub fn embed_request(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/embed")
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Send one request through a clone of the router.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn embedding_from(json: &serde_json::Value) -> Vec<f32> {
    json["embedding"]
        .as_array()
        .expect("embedding array")
        .iter()
        .map(|v| v.as_f64().expect("float") as f32)
        .collect()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// The embedding the pipeline computes directly, bypassing HTTP.
pub fn direct_embedding(text: &str) -> Result<Vec<f32>, EmbedError> {
    fake_embedder(Arc::new(FakeEngine)).embed(text)
}
