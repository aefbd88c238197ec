use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;
use simeval_core::testing::StubBackend;
use simeval_core::{
    Backends, BiEncoderSimilarity, CrossEncoderSimilarity, EnsembleSimilarity, HttpBackend, JudgeOptions,
    JudgeScore, MetricError, ModelEntry, ModelKind, SimevalConfig,
};

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn http_backends(models: Vec<ModelEntry>) -> Backends {
    let config = SimevalConfig {
        models,
        ..SimevalConfig::default()
    };
    Backends::from_shared(Arc::new(HttpBackend::from_config(&config).unwrap()))
}

fn entry(name: &str, endpoint: String, kind: Option<ModelKind>) -> ModelEntry {
    ModelEntry {
        name: name.to_string(),
        endpoint,
        kind,
        api_key_env: None,
    }
}

#[tokio::test]
async fn sas_over_http_probes_kind_then_scores() {
    let mut server = mockito::Server::new_async().await;
    let info = server
        .mock("GET", "/info")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model_type":{"classifier":{"id2label":{"0":"LABEL_0"}}}}"#)
        .create_async()
        .await;
    let predict = server
        .mock("POST", "/predict")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[[{"score":0.75,"label":"LABEL_0"}],[{"score":0.25,"label":"LABEL_0"}]]"#)
        .create_async()
        .await;

    let backends = http_backends(vec![entry("cross-encoder/stsb-roberta-large", server.url(), None)]);
    let result = CrossEncoderSimilarity::new(backends.registry, backends.classifier)
        .compute(
            &strings(&["El sol está en el cielo.", "El café es adictivo."]),
            &strings(&["El sol brilla en el cielo.", "El café es una bebida popular."]),
            true,
        )
        .await
        .unwrap();

    assert_eq!(result.scores, vec![0.75, 0.25]);
    assert_eq!(result.average, Some(0.5));
    info.assert_async().await;
    predict.assert_async().await;
}

#[tokio::test]
async fn sas_with_embedding_server_is_incompatible() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/info")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"model_type":{"embedding":{"pooling":"mean"}}}"#)
        .create_async()
        .await;
    let predict = server.mock("POST", "/predict").expect(0).create_async().await;

    let backends = http_backends(vec![entry("mpnet", server.url(), None)]);
    let err = CrossEncoderSimilarity::new(backends.registry, backends.classifier)
        .with_model("mpnet")
        .compute(&strings(&["a"]), &strings(&["b"]), false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MetricError::IncompatibleModel { expected: ModelKind::CrossEncoder, actual: ModelKind::BiEncoder, .. }
    ));
    predict.assert_async().await;
}

#[tokio::test]
async fn bi_encoder_over_http_identical_text_is_one() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/embeddings")
        .match_body(Matcher::PartialJson(json!({"model": "mpnet"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":[{"index":0,"embedding":[0.3,0.4,0.5]}]}"#)
        .expect(2)
        .create_async()
        .await;

    let backends = http_backends(vec![entry("mpnet", server.url(), Some(ModelKind::BiEncoder))]);
    let result = BiEncoderSimilarity::new(backends.registry, backends.embedder)
        .with_model("mpnet")
        .compute(&strings(&["same"]), &strings(&["same"]), true)
        .await
        .unwrap();

    assert!((result.scores[0] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn judge_over_http_returns_ratings_and_feedback() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("París".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"Feedback: Exactly right. [RESULT] 10"}}]}"#)
        .create_async()
        .await;

    let backends = http_backends(vec![entry("llama", server.url(), Some(ModelKind::Judge))]);
    let result = JudgeScore::new(backends.registry, backends.judge)
        .compute(
            "llama",
            &strings(&["La capital de Francia es París."]),
            &strings(&["París es la capital de Francia."]),
            &strings(&["Francia es un país europeo cuya capital es París."]),
            None,
            JudgeOptions { return_average: true, return_feedbacks: true },
        )
        .await
        .unwrap();

    assert_eq!(result.scores, vec![10]);
    assert_eq!(result.average, Some(10.0));
    assert_eq!(result.feedbacks, Some(vec!["Exactly right.".to_string()]));
}

#[tokio::test]
async fn ensemble_from_shared_stub_backend() {
    let stub = Arc::new(
        StubBackend::new()
            .with_model("mpnet", ModelKind::BiEncoder)
            .with_model("stsb", ModelKind::CrossEncoder),
    );
    let backends = Backends::from_shared(stub.clone());
    let texts = strings(&["el sol brilla", "las bicicletas son ecológicas"]);

    let result = EnsembleSimilarity::new(backends.registry, backends.embedder, backends.classifier)
        .compute(&strings(&["mpnet", "stsb"]), &texts, &texts, true)
        .await
        .unwrap();

    for s in &result.scores {
        assert!((s - 1.0).abs() < 1e-9);
    }
    assert!((result.average.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(stub.calls().len(), 3);
}
