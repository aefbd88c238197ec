use std::sync::Arc;

use async_trait::async_trait;
use simeval_types::{ModelKind, ScoreResult};
use tracing::info;

use crate::backend::{ModelRegistry, PairClassifier};
use crate::error::MetricError;
use crate::metric::{check_backend_len, check_lengths, check_positive, require_kind, SimilarityMetric, DEFAULT_BATCH_SIZE};

pub const DEFAULT_CROSS_ENCODER_MODEL: &str = "cross-encoder/stsb-roberta-large";

/// Semantic answer similarity: prediction and reference are scored jointly
/// by a pair classifier. Sentence-similarity models yield scores in [0, 1].
pub struct CrossEncoderSimilarity {
    registry: Arc<dyn ModelRegistry>,
    classifier: Arc<dyn PairClassifier>,
    model_name: String,
    batch_size: usize,
}

impl CrossEncoderSimilarity {
    pub fn new(registry: Arc<dyn ModelRegistry>, classifier: Arc<dyn PairClassifier>) -> Self {
        Self {
            registry,
            classifier,
            model_name: DEFAULT_CROSS_ENCODER_MODEL.to_string(),
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
        require_kind(self.registry.as_ref(), &self.model_name, ModelKind::CrossEncoder).await?;
        info!(model = %self.model_name, samples = predictions.len(), "computing semantic answer similarity");

        let scores = self.score_pairs(predictions, references).await?;
        let result = ScoreResult::new(scores);
        Ok(if return_average { result.with_average() } else { result })
    }
}

#[async_trait]
impl SimilarityMetric for CrossEncoderSimilarity {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::CrossEncoder
    }

    async fn score_pairs(
        &self,
        predictions: &[String],
        references: &[String],
    ) -> Result<Vec<f64>, MetricError> {
        let pairs: Vec<(String, String)> = predictions
            .iter()
            .cloned()
            .zip(references.iter().cloned())
            .collect();

        let scores = self
            .classifier
            .predict(&self.model_name, &pairs, self.batch_size)
            .await
            .map_err(|e| MetricError::backend(&self.model_name, e))?;
        check_backend_len(&self.model_name, pairs.len(), scores.len())?;

        Ok(scores.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_scores_within, StubBackend};

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn metric(stub: Arc<StubBackend>) -> CrossEncoderSimilarity {
        CrossEncoderSimilarity::new(stub.clone(), stub)
    }

    #[tokio::test]
    async fn test_default_model_scores_pairs_in_order() {
        let stub = Arc::new(StubBackend::new().with_model(DEFAULT_CROSS_ENCODER_MODEL, ModelKind::CrossEncoder));
        let predictions = strings(&["the sun is in the sky", "coffee is addictive"]);
        let references = strings(&["the sun is in the sky", "green tea"]);
        let result = metric(stub.clone())
            .compute(&predictions, &references, true)
            .await
            .unwrap();

        assert_eq!(result.scores[0], 1.0);
        assert_eq!(result.scores[1], 0.0);
        assert_eq!(result.average, Some(0.5));
        assert_scores_within(&result, 0.0, 1.0).unwrap();

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, DEFAULT_CROSS_ENCODER_MODEL);
        assert_eq!(calls[0].batch_size, DEFAULT_BATCH_SIZE);
    }

    #[tokio::test]
    async fn test_bi_encoder_model_is_an_explicit_error() {
        let stub = Arc::new(
            StubBackend::new().with_model("paraphrase-mpnet", ModelKind::BiEncoder),
        );
        let texts = strings(&["a", "b"]);
        let err = metric(stub.clone())
            .with_model("paraphrase-mpnet")
            .compute(&texts, &texts, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetricError::IncompatibleModel { expected: ModelKind::CrossEncoder, actual: ModelKind::BiEncoder, .. }
        ));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let stub = Arc::new(StubBackend::new().with_model(DEFAULT_CROSS_ENCODER_MODEL, ModelKind::CrossEncoder));
        let texts = strings(&["a"]);
        let err = metric(stub.clone())
            .with_batch_size(0)
            .compute(&texts, &texts, false)
            .await
            .unwrap_err();
        assert!(matches!(err, MetricError::InvalidConfig(_)));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_fails_resolution() {
        let stub = Arc::new(StubBackend::new());
        let texts = strings(&["a"]);
        let err = metric(stub).with_model("missing").compute(&texts, &texts, false).await.unwrap_err();
        assert!(matches!(err, MetricError::ModelResolution { ref model, .. } if model == "missing"));
    }

    #[tokio::test]
    async fn test_short_backend_response_is_rejected() {
        let stub = Arc::new(
            StubBackend::new()
                .with_model("stsb", ModelKind::CrossEncoder)
                .with_fixed_scores("stsb", vec![0.9]),
        );
        let texts = strings(&["a", "b"]);
        let err = metric(stub).with_model("stsb").compute(&texts, &texts, false).await.unwrap_err();
        assert!(matches!(err, MetricError::BackendShape { expected: 2, actual: 1, .. }));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let stub = Arc::new(
            StubBackend::new()
                .with_model("stsb", ModelKind::CrossEncoder)
                .with_failing_model("stsb"),
        );
        let texts = strings(&["a"]);
        let err = metric(stub).with_model("stsb").compute(&texts, &texts, false).await.unwrap_err();
        assert!(matches!(err, MetricError::Backend { .. }));
    }
}
