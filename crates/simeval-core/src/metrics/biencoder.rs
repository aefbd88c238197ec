use std::sync::Arc;

use async_trait::async_trait;
use simeval_types::{ModelKind, ScoreResult};
use tracing::{debug, info};

use crate::backend::{Embedder, ModelRegistry};
use crate::error::MetricError;
use crate::metric::{check_backend_len, check_lengths, check_positive, require_kind, SimilarityMetric, DEFAULT_BATCH_SIZE};

pub const DEFAULT_BI_ENCODER_MODEL: &str = "sentence-transformers/paraphrase-multilingual-mpnet-base-v2";

/// Cosine similarity between independently embedded prediction and reference.
/// Scores lie in [-1, 1].
pub struct BiEncoderSimilarity {
    registry: Arc<dyn ModelRegistry>,
    embedder: Arc<dyn Embedder>,
    model_name: String,
    batch_size: usize,
}

impl BiEncoderSimilarity {
    pub fn new(registry: Arc<dyn ModelRegistry>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            registry,
            embedder,
            model_name: DEFAULT_BI_ENCODER_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn compute(
        &self,
        predictions: &[String],
        references: &[String],
        return_average: bool,
    ) -> Result<ScoreResult<f64>, MetricError> {
        check_lengths(&[("predictions", predictions.len()), ("references", references.len())])?;
        check_positive("batch_size", self.batch_size)?;
        require_kind(self.registry.as_ref(), &self.model_name, ModelKind::BiEncoder).await?;
        info!(model = %self.model_name, samples = predictions.len(), "computing bi-encoder similarity");

        let scores = self.score_pairs(predictions, references).await?;
        let result = ScoreResult::new(scores);
        Ok(if return_average { result.with_average() } else { result })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MetricError> {
        let vectors = self
            .embedder
            .encode(&self.model_name, texts, self.batch_size)
            .await
            .map_err(|e| MetricError::backend(&self.model_name, e))?;
        check_backend_len(&self.model_name, texts.len(), vectors.len())?;
        Ok(vectors)
    }
}

#[async_trait]
impl SimilarityMetric for BiEncoderSimilarity {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::BiEncoder
    }

    async fn score_pairs(
        &self,
        predictions: &[String],
        references: &[String],
    ) -> Result<Vec<f64>, MetricError> {
        let p_vecs = self.embed(predictions).await?;
        let r_vecs = self.embed(references).await?;
        debug!(model = %self.model_name, dims = p_vecs.first().map_or(0, Vec::len), "embedded batch");

        p_vecs
            .iter()
            .zip(&r_vecs)
            .map(|(p, r)| {
                if p.len() != r.len() {
                    return Err(MetricError::BackendShape {
                        model: self.model_name.clone(),
                        expected: p.len(),
                        actual: r.len(),
                    });
                }
                Ok(cosine_similarity(p, r))
            })
            .collect()
    }
}

/// Zero-norm inputs score 0.0. Clamped so rounding never escapes [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (a_val, b_val) in a.iter().zip(b.iter()) {
        let x = *a_val as f64;
        let y = *b_val as f64;

        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}
