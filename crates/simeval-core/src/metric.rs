use async_trait::async_trait;
use simeval_types::ModelKind;

use crate::backend::ModelRegistry;
use crate::error::MetricError;

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// A model-backed similarity metric the ensemble can dispatch to.
#[async_trait]
pub trait SimilarityMetric: Send + Sync {
    fn model_name(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// Per-pair scores, without validating the model kind.
    async fn score_pairs(
        &self,
        predictions: &[String],
        references: &[String],
    ) -> Result<Vec<f64>, MetricError>;
}

/// Every named length must equal the first one, and none may be zero.
pub fn check_lengths(columns: &[(&str, usize)]) -> Result<usize, MetricError> {
    let Some(&(first_name, first_len)) = columns.first() else {
        return Err(MetricError::EmptyInput);
    };
    for &(name, len) in &columns[1..] {
        if len != first_len {
            return Err(MetricError::LengthMismatch {
                expected_name: first_name.to_string(),
                expected: first_len,
                actual_name: name.to_string(),
                actual: len,
            });
        }
    }
    if first_len == 0 {
        return Err(MetricError::EmptyInput);
    }
    Ok(first_len)
}

/// Batch sizes and concurrency limits must be at least one.
pub(crate) fn check_positive(name: &str, value: usize) -> Result<(), MetricError> {
    if value == 0 {
        return Err(MetricError::InvalidConfig(format!("{name} must be greater than zero")));
    }
    Ok(())
}

pub(crate) async fn resolve_kind(
    registry: &dyn ModelRegistry,
    model: &str,
) -> Result<ModelKind, MetricError> {
    registry
        .resolve(model)
        .await
        .map_err(|source| MetricError::ModelResolution {
            model: model.to_string(),
            source,
        })
}

pub(crate) async fn require_kind(
    registry: &dyn ModelRegistry,
    model: &str,
    expected: ModelKind,
) -> Result<(), MetricError> {
    let actual = resolve_kind(registry, model).await?;
    if actual != expected {
        return Err(MetricError::IncompatibleModel {
            model: model.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

pub(crate) fn check_backend_len(model: &str, expected: usize, actual: usize) -> Result<(), MetricError> {
    if expected != actual {
        return Err(MetricError::BackendShape {
            model: model.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
