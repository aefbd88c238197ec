use std::sync::Arc;

use simeval_core::testing::StubBackend;
use simeval_core::{
    Accuracy, Backends, EnsembleSimilarity, JsonlSampleSource, JudgeOptions, JudgeScore, ModelKind, Sample,
    SampleColumns, SampleSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example 1: inline samples scored with offline stub models
    let samples = vec![
        Sample::new("El sol está en el cielo.", "El sol brilla en el cielo.").with_id("0"),
        Sample::new("Paris", "paris ").with_id("1"),
    ];
    let cols = SampleColumns::from_samples(&samples);

    let accuracy = Accuracy.compute(&cols.predictions, &cols.references, true)?;
    println!("{}", accuracy.summary_table(&cols.ids));

    let backends = Backends::from_shared(Arc::new(
        StubBackend::new()
            .with_model("mpnet", ModelKind::BiEncoder)
            .with_model("stsb", ModelKind::CrossEncoder)
            .with_model("judge", ModelKind::Judge),
    ));

    let ensemble = EnsembleSimilarity::new(backends.registry.clone(), backends.embedder, backends.classifier)
        .compute(&["mpnet".to_string(), "stsb".to_string()], &cols.predictions, &cols.references, true)
        .await?;
    println!("{}", ensemble.summary_table(&cols.ids));

    let judged = JudgeScore::new(backends.registry, backends.judge)
        .compute(
            "judge",
            &cols.predictions,
            &cols.references,
            &cols.contexts,
            None,
            JudgeOptions { return_average: true, return_feedbacks: true },
        )
        .await?;
    println!("{}", judged.summary_table(&cols.ids));

    // Example 2: exact-match accuracy over a JSONL file if provided
    if let Some(path) = std::env::args().nth(1) {
        let samples = JsonlSampleSource::new(path).load().await?;
        let cols = SampleColumns::from_samples(&samples);
        let result = Accuracy.compute(&cols.predictions, &cols.references, true)?;
        println!("{}", result.summary_table(&cols.ids));
    }

    Ok(())
}
