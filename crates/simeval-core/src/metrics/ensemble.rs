use std::sync::Arc;

use futures::future::try_join_all;
use simeval_types::{ModelKind, ScoreResult};
use tracing::{debug, info};

use crate::backend::{Embedder, ModelRegistry, PairClassifier};
use crate::error::MetricError;
use crate::metric::{check_backend_len, check_lengths, check_positive, resolve_kind, SimilarityMetric, DEFAULT_BATCH_SIZE};
use crate::metrics::biencoder::BiEncoderSimilarity;
use crate::metrics::cross_encoder::CrossEncoderSimilarity;

/// Averages per-sample scores of several bi- and cross-encoder models.
///
/// Each model is routed by the kind its registry entry declares. Members are
/// scored concurrently but combined in `model_names` order.
pub struct EnsembleSimilarity {
    registry: Arc<dyn ModelRegistry>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<dyn PairClassifier>,
    batch_size: usize,
}

impl EnsembleSimilarity {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        embedder: Arc<dyn Embedder>,
        classifier: Arc<dyn PairClassifier>,
    ) -> Self {
        Self {
            registry,
            embedder,
            classifier,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn compute(
        &self,
        model_names: &[String],
        predictions: &[String],
        references: &[String],
        return_average: bool,
    ) -> Result<ScoreResult<f64>, MetricError> {
        if model_names.is_empty() {
            return Err(MetricError::EmptyEnsemble);
        }
        let n = check_lengths(&[("predictions", predictions.len()), ("references", references.len())])?;
        check_positive("batch_size", self.batch_size)?;
        info!(models = model_names.len(), samples = n, "computing ensemble similarity");

        let members = self.members(model_names).await?;
        let per_model = try_join_all(
            members
                .iter()
                .map(|m| m.score_pairs(predictions, references)),
        )
        .await?;

        for (member, scores) in members.iter().zip(&per_model) {
            check_backend_len(member.model_name(), n, scores.len())?;
        }

        let scores = element_wise_mean(&per_model, n);
        let result = ScoreResult::new(scores);
        Ok(if return_average { result.with_average() } else { result })
    }

    async fn members(&self, model_names: &[String]) -> Result<Vec<Box<dyn SimilarityMetric>>, MetricError> {
        let kinds = try_join_all(
            model_names
                .iter()
                .map(|name| resolve_kind(self.registry.as_ref(), name)),
        )
        .await?;

        model_names
            .iter()
            .zip(kinds)
            .map(|(name, kind)| self.member(name, kind))
            .collect()
    }

    fn member(&self, name: &str, kind: ModelKind) -> Result<Box<dyn SimilarityMetric>, MetricError> {
        debug!(model = %name, %kind, "dispatching ensemble member");
        match kind {
            ModelKind::CrossEncoder => Ok(Box::new(
                CrossEncoderSimilarity::new(self.registry.clone(), self.classifier.clone())
                    .with_model(name)
                    .with_batch_size(self.batch_size),
            )),
            ModelKind::BiEncoder => Ok(Box::new(
                BiEncoderSimilarity::new(self.registry.clone(), self.embedder.clone())
                    .with_model(name)
                    .with_batch_size(self.batch_size),
            )),
            ModelKind::Judge => Err(MetricError::IncompatibleModel {
                model: name.to_string(),
                expected: ModelKind::CrossEncoder,
                actual: ModelKind::Judge,
            }),
        }
    }
}

fn element_wise_mean(per_model: &[Vec<f64>], n: usize) -> Vec<f64> {
    let models = per_model.len() as f64;
    (0..n)
        .map(|i| per_model.iter().map(|scores| scores[i]).sum::<f64>() / models)
        .collect()
}
