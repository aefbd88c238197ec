use simeval_types::ModelKind;
use thiserror::Error;

/// A judge response that did not yield a usable rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingFailure {
    pub index: usize,
    pub reason: String,
    pub response: String,
}

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("no samples to score")]
    EmptyInput,

    #[error("length mismatch: {expected_name} has {expected} items but {actual_name} has {actual}")]
    LengthMismatch {
        expected_name: String,
        expected: usize,
        actual_name: String,
        actual: usize,
    },

    #[error("ensemble needs at least one model")]
    EmptyEnsemble,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not resolve model `{model}`: {source}")]
    ModelResolution {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("model `{model}` is a {actual} model, expected a {expected} model")]
    IncompatibleModel {
        model: String,
        expected: ModelKind,
        actual: ModelKind,
    },

    #[error("backend call for model `{model}` failed: {source}")]
    Backend {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("backend for model `{model}` returned {actual} results for {expected} inputs")]
    BackendShape {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("{} judge response(s) could not be parsed", failures.len())]
    UnparseableRatings { failures: Vec<RatingFailure> },
}

impl MetricError {
    pub(crate) fn backend(model: &str, source: anyhow::Error) -> Self {
        MetricError::Backend {
            model: model.to_string(),
            source,
        }
    }
}
