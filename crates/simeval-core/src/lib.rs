//! simeval-core: score generated answers against references.
//! Exact-match accuracy, bi-encoder cosine, cross-encoder SAS, their ensemble,
//! and a Prometheus-style LLM judge. Inference is delegated to model servers
//! behind the traits in [`backend`].

pub mod backend;
pub mod config;
pub mod datasource;
pub mod error;
pub mod http;
pub mod metric;
pub mod testing;

pub mod metrics {
    pub mod accuracy;
    pub mod biencoder;
    pub mod cross_encoder;
    pub mod ensemble;
    pub mod judge;
}

pub use backend::{Backends, Embedder, JudgeClient, ModelRegistry, PairClassifier};
pub use config::{ModelEntry, SimevalConfig};
pub use datasource::{JsonlSampleSource, SampleSource, VecSampleSource};
pub use error::{MetricError, RatingFailure};
pub use http::HttpBackend;
pub use metric::{check_lengths, SimilarityMetric, DEFAULT_BATCH_SIZE};
pub use metrics::{
    accuracy::Accuracy,
    biencoder::{BiEncoderSimilarity, DEFAULT_BI_ENCODER_MODEL},
    cross_encoder::{CrossEncoderSimilarity, DEFAULT_CROSS_ENCODER_MODEL},
    ensemble::EnsembleSimilarity,
    judge::{JudgeOptions, JudgeScore, Judgement, Rubric},
};
pub use simeval_types::{mean, ModelKind, Role, Sample, SampleColumns, ScoreResult, ScoreValue, Turn};
