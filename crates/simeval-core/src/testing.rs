//! Deterministic stand-ins for model servers, plus assertion helpers for
//! use in `#[tokio::test]` functions.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use simeval_types::{ModelKind, ScoreResult, ScoreValue};

use crate::backend::{Embedder, JudgeClient, ModelRegistry, PairClassifier};

const STUB_DIMS: usize = 64;

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// A backend call as seen by [`StubBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCall {
    pub op: &'static str,
    pub model: String,
    pub inputs: usize,
    pub batch_size: usize,
}

/// Serves every backend trait from in-memory rules:
///
/// - `encode`: hashed bag-of-words vectors, so identical texts have cosine 1.0;
/// - `predict`: token-set Jaccard overlap in [0, 1], or fixed scores per model;
/// - `generate`: a caller-supplied responder, given the rendered prompt.
pub struct StubBackend {
    kinds: HashMap<String, ModelKind>,
    fixed_scores: HashMap<String, Vec<f32>>,
    failing: HashSet<String>,
    responder: Responder,
    calls: Mutex<Vec<StubCall>>,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
            fixed_scores: HashMap::new(),
            failing: HashSet::new(),
            responder: Box::new(|_| {
                "Feedback: The response agrees with the reference answer. [RESULT] 8".to_string()
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, kind: ModelKind) -> Self {
        self.kinds.insert(name.into(), kind);
        self
    }

    /// `predict` for `model` returns exactly these scores, whatever the input.
    pub fn with_fixed_scores(mut self, model: impl Into<String>, scores: Vec<f32>) -> Self {
        self.fixed_scores.insert(model.into(), scores);
        self
    }

    /// Inference calls for `model` fail; resolution still succeeds.
    pub fn with_failing_model(mut self, model: impl Into<String>) -> Self {
        self.failing.insert(model.into());
        self
    }

    pub fn with_judge<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, op: &'static str, model: &str, inputs: usize, batch_size: usize) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StubCall {
                op,
                model: model.to_string(),
                inputs,
                batch_size,
            });
        if self.failing.contains(model) {
            bail!("stub model `{model}` is unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for StubBackend {
    async fn resolve(&self, model: &str) -> Result<ModelKind> {
        self.kinds
            .get(model)
            .copied()
            .ok_or_else(|| anyhow!("unknown model `{model}`"))
    }
}

#[async_trait]
impl Embedder for StubBackend {
    async fn encode(&self, model: &str, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        self.record("encode", model, texts.len(), batch_size)?;
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

#[async_trait]
impl PairClassifier for StubBackend {
    async fn predict(
        &self,
        model: &str,
        pairs: &[(String, String)],
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        self.record("predict", model, pairs.len(), batch_size)?;
        if let Some(fixed) = self.fixed_scores.get(model) {
            return Ok(fixed.clone());
        }
        Ok(pairs.iter().map(|(a, b)| jaccard(a, b)).collect())
    }
}

#[async_trait]
impl JudgeClient for StubBackend {
    async fn generate(&self, model: &str, _system: &str, prompt: &str) -> Result<String> {
        self.record("generate", model, 1, 1)?;
        Ok((self.responder)(prompt))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; STUB_DIMS];
    for token in tokens(text) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        v[(hasher.finish() % STUB_DIMS as u64) as usize] += 1.0;
    }
    v
}

fn jaccard(a: &str, b: &str) -> f32 {
    let a: HashSet<String> = tokens(a).collect();
    let b: HashSet<String> = tokens(b).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Fails unless the result carries an average of at least `min_average`.
pub fn assert_average_at_least<T>(result: &ScoreResult<T>, min_average: f64) -> Result<()>
where
    T: ScoreValue + Display,
{
    let Some(avg) = result.average else {
        bail!("result has no average; compute it with return_average set");
    };
    if avg < min_average {
        bail!(
            "average {:.4} is below threshold {:.4}\n{}",
            avg,
            min_average,
            result.summary_table(&[])
        );
    }
    Ok(())
}

/// Fails if any per-sample score lies outside `[lo, hi]`.
pub fn assert_scores_within<T>(result: &ScoreResult<T>, lo: f64, hi: f64) -> Result<()>
where
    T: ScoreValue + Display,
{
    if let Some((i, s)) = result
        .scores
        .iter()
        .enumerate()
        .find(|(_, s)| !(lo..=hi).contains(&s.as_f64()))
    {
        bail!("score {} at sample {} is outside [{}, {}]", s, i, lo, hi);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_embed_identically() {
        assert_eq!(bag_of_words("The sun shines"), bag_of_words("the SUN shines!"));
    }

    #[test]
    fn jaccard_bounds() {
        assert_eq!(jaccard("a b", "a b"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert_eq!(jaccard("", ""), 0.0);
        assert!((jaccard("a b", "a c") - 1.0 / 3.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_models_do_not_resolve() {
        let stub = StubBackend::new().with_model("m", ModelKind::Judge);
        assert_eq!(stub.resolve("m").await.unwrap(), ModelKind::Judge);
        assert!(stub.resolve("other").await.is_err());
    }

    #[tokio::test]
    async fn failing_model_records_then_errors() {
        let stub = StubBackend::new().with_failing_model("broken");
        assert!(stub.encode("broken", &["x".to_string()], 8).await.is_err());
        assert_eq!(stub.calls().len(), 1);
    }

    #[test]
    fn average_assertion_reports_threshold() {
        let result = ScoreResult::new(vec![0.2f64, 0.4]).with_average();
        assert!(assert_average_at_least(&result, 0.25).is_ok());
        let err = assert_average_at_least(&result, 0.5).unwrap_err();
        assert!(err.to_string().contains("below threshold"));
    }

    #[test]
    fn bounds_assertion_finds_outlier() {
        let result = ScoreResult::new(vec![0.5f64, 1.5]);
        assert!(assert_scores_within(&result, 0.0, 1.0).is_err());
        assert!(assert_scores_within(&result, 0.0, 2.0).is_ok());
    }
}
