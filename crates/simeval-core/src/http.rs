//! reqwest-backed model servers.
//!
//! - embeddings: OpenAI-compatible `POST /embeddings`
//! - pair classification: text-embeddings-inference `POST /predict`
//! - judge: OpenAI-compatible `POST /chat/completions`
//! - kind probing: text-embeddings-inference `GET /info`

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use simeval_types::ModelKind;
use tracing::debug;

use crate::backend::{Embedder, JudgeClient, ModelRegistry, PairClassifier};
use crate::config::{ModelEntry, SimevalConfig};

pub struct HttpBackend {
    client: Client,
    models: HashMap<String, ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    score: f32,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    model_type: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpBackend {
    pub fn from_config(config: &SimevalConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        let models = config
            .models
            .iter()
            .map(|m| (m.name.clone(), m.clone()))
            .collect();
        Ok(Self { client, models })
    }

    fn entry(&self, model: &str) -> Result<&ModelEntry> {
        self.models
            .get(model)
            .ok_or_else(|| anyhow!("model `{model}` is not configured"))
    }

    fn url(entry: &ModelEntry, path: &str) -> String {
        format!("{}/{}", entry.endpoint.trim_end_matches('/'), path)
    }

    fn authorize(entry: &ModelEntry, req: RequestBuilder) -> Result<RequestBuilder> {
        match &entry.api_key_env {
            Some(var) => {
                let key = std::env::var(var)
                    .with_context(|| format!("API key variable {var} for `{}` is not set", entry.name))?;
                Ok(req.bearer_auth(key))
            }
            None => Ok(req),
        }
    }

    async fn send<T: DeserializeOwned>(entry: &ModelEntry, req: RequestBuilder) -> Result<T> {
        let resp = Self::authorize(entry, req)?
            .send()
            .await
            .with_context(|| format!("request to {} failed", entry.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("HTTP {}: {}", status.as_u16(), body);
        }
        resp.json::<T>()
            .await
            .with_context(|| format!("unexpected response shape from {}", entry.endpoint))
    }

    async fn post<T: DeserializeOwned>(&self, entry: &ModelEntry, path: &str, body: &Value) -> Result<T> {
        let url = Self::url(entry, path);
        debug!(%url, model = %entry.name, "POST");
        Self::send(entry, self.client.post(&url).json(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, entry: &ModelEntry, path: &str) -> Result<T> {
        let url = Self::url(entry, path);
        debug!(%url, model = %entry.name, "GET");
        Self::send(entry, self.client.get(&url)).await
    }
}

fn kind_from_model_type(model_type: &Value) -> Result<ModelKind> {
    let obj = model_type
        .as_object()
        .ok_or_else(|| anyhow!("`model_type` is not an object: {model_type}"))?;
    if obj.contains_key("classifier") || obj.contains_key("reranker") {
        Ok(ModelKind::CrossEncoder)
    } else if obj.contains_key("embedding") {
        Ok(ModelKind::BiEncoder)
    } else {
        bail!("unrecognised model type {model_type}")
    }
}

#[async_trait]
impl ModelRegistry for HttpBackend {
    async fn resolve(&self, model: &str) -> Result<ModelKind> {
        let entry = self.entry(model)?;
        if let Some(kind) = entry.kind {
            return Ok(kind);
        }
        let info: InfoResponse = self
            .get(entry, "info")
            .await
            .with_context(|| format!("could not probe kind of `{model}`; declare `kind` in the config"))?;
        kind_from_model_type(&info.model_type)
    }
}

#[async_trait]
impl Embedder for HttpBackend {
    async fn encode(&self, model: &str, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let entry = self.entry(model)?;
        if batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let resp: EmbeddingResponse = self
                .post(entry, "embeddings", &json!({ "model": model, "input": chunk }))
                .await?;
            let mut data = resp.data;
            if data.len() != chunk.len() {
                bail!("expected {} embeddings, got {}", chunk.len(), data.len());
            }
            data.sort_by_key(|d| d.index);
            if let Some((pos, d)) = data.iter().enumerate().find(|(pos, d)| d.index != *pos) {
                bail!("embedding indices are not 0..{}: found {} at position {pos}", chunk.len(), d.index);
            }
            out.extend(data.into_iter().map(|d| d.embedding));
        }
        Ok(out)
    }
}

#[async_trait]
impl PairClassifier for HttpBackend {
    async fn predict(
        &self,
        model: &str,
        pairs: &[(String, String)],
        batch_size: usize,
    ) -> Result<Vec<f32>> {
        let entry = self.entry(model)?;
        if batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        let mut out = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(batch_size) {
            let inputs: Vec<[&str; 2]> = chunk.iter().map(|(a, b)| [a.as_str(), b.as_str()]).collect();
            let resp: Vec<Vec<Prediction>> = self
                .post(entry, "predict", &json!({ "inputs": inputs }))
                .await?;
            if resp.len() != chunk.len() {
                bail!("expected {} predictions, got {}", chunk.len(), resp.len());
            }
            for labels in resp {
                match labels.as_slice() {
                    [only] => out.push(only.score),
                    _ => {
                        let names: Vec<&str> = labels.iter().filter_map(|p| p.label.as_deref()).collect();
                        bail!(
                            "model `{model}` returned {} labels ({}) per pair; a single-score similarity head is required",
                            labels.len(),
                            names.join(", ")
                        );
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl JudgeClient for HttpBackend {
    async fn generate(&self, model: &str, system: &str, prompt: &str) -> Result<String> {
        let entry = self.entry(model)?;
        let body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0
        });
        let resp: ChatResponse = self.post(entry, "chat/completions", &body).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("judge `{model}` returned no message content"))
    }
}
