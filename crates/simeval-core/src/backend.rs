//! Seams to the model servers that do the actual inference.
//!
//! Metrics only see these traits, so a deterministic stub (see
//! [`crate::testing::StubBackend`]) can stand in for real models.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use simeval_types::ModelKind;

/// Maps a model identifier to the kind of backend that serves it.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn resolve(&self, model: &str) -> Result<ModelKind>;
}

/// Bi-encoder: one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode(&self, model: &str, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
}

/// Cross-encoder: one scalar per (prediction, reference) pair, in input order.
#[async_trait]
pub trait PairClassifier: Send + Sync {
    async fn predict(
        &self,
        model: &str,
        pairs: &[(String, String)],
        batch_size: usize,
    ) -> Result<Vec<f32>>;
}

/// Generative judge: returns the raw completion for a prompt.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn generate(&self, model: &str, system: &str, prompt: &str) -> Result<String>;
}

/// One handle per concern, shared by every metric built from it.
#[derive(Clone)]
pub struct Backends {
    pub registry: Arc<dyn ModelRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub classifier: Arc<dyn PairClassifier>,
    pub judge: Arc<dyn JudgeClient>,
}

impl Backends {
    /// Uses one value that serves every concern.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: ModelRegistry + Embedder + PairClassifier + JudgeClient + 'static,
    {
        Self {
            registry: backend.clone(),
            embedder: backend.clone(),
            classifier: backend.clone(),
            judge: backend,
        }
    }
}
