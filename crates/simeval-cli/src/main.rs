use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use simeval_core::{
	Accuracy, Backends, BiEncoderSimilarity, CrossEncoderSimilarity, EnsembleSimilarity, HttpBackend,
	JsonlSampleSource, JudgeOptions, JudgeScore, SampleColumns, SampleSource, ScoreResult, ScoreValue,
	SimevalConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "simeval", about = "Score generated answers against reference answers")]
struct Cli {
	/// YAML or JSON file listing model servers (required by model-backed metrics)
	#[arg(long, global = true, env = "SIMEVAL_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Exact match after lowercasing and trimming
	Accuracy(CommonArgs),
	/// Cosine similarity of sentence embeddings
	BiEncoder(EncoderArgs),
	/// Semantic answer similarity with a cross-encoder
	Sas(EncoderArgs),
	/// Mean of several bi-/cross-encoder models
	Ensemble(EnsembleArgs),
	/// Rubric rating by an LLM judge
	Judge(JudgeArgs),
}

#[derive(Debug, Clone, Args)]
struct CommonArgs {
	/// JSONL file with lines: { "id"?, "prediction", "reference", "context"?, "conversation"? }
	#[arg(long)]
	data: PathBuf,

	/// Also report the mean score
	#[arg(long, action = ArgAction::SetTrue)]
	average: bool,

	/// Write the result as JSON to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct EncoderArgs {
	#[command(flatten)]
	common: CommonArgs,

	/// Model name; defaults to the metric's standard model
	#[arg(long)]
	model: Option<String>,

	/// Samples per model request (defaults to the config's batch_size)
	#[arg(long)]
	batch_size: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct EnsembleArgs {
	#[command(flatten)]
	common: CommonArgs,

	/// Ensemble member; repeat for each model
	#[arg(long = "model", required = true)]
	models: Vec<String>,

	#[arg(long)]
	batch_size: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct JudgeArgs {
	#[command(flatten)]
	common: CommonArgs,

	/// Judge model name
	#[arg(long)]
	model: String,

	/// Include the judge's rationale per sample
	#[arg(long, action = ArgAction::SetTrue)]
	feedbacks: bool,

	/// Judge requests in flight (defaults to the config's judge_concurrency)
	#[arg(long)]
	concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Accuracy(args) => run_accuracy(args).await?,
		Commands::BiEncoder(args) => run_bi_encoder(cli.config.as_deref(), args).await?,
		Commands::Sas(args) => run_sas(cli.config.as_deref(), args).await?,
		Commands::Ensemble(args) => run_ensemble(cli.config.as_deref(), args).await?,
		Commands::Judge(args) => run_judge(cli.config.as_deref(), args).await?,
	}
	Ok(())
}

async fn load_columns(path: &Path) -> Result<SampleColumns> {
	let samples = JsonlSampleSource::new(path).load().await?;
	info!(samples = samples.len(), path = %path.display(), "loaded samples");
	Ok(SampleColumns::from_samples(&samples))
}

fn load_backends(config: Option<&Path>) -> Result<(SimevalConfig, Backends)> {
	let path = config.context("this metric needs model servers: pass --config or set SIMEVAL_CONFIG")?;
	let config = SimevalConfig::load(path)?;
	let backend = Arc::new(HttpBackend::from_config(&config)?);
	Ok((config, Backends::from_shared(backend)))
}

async fn emit<T>(result: &ScoreResult<T>, cols: &SampleColumns, json_out: Option<&Path>) -> Result<()>
where
	T: ScoreValue + Display + Serialize,
{
	println!("{}", result.summary_table(&cols.ids));
	if let Some(path) = json_out {
		let json = serde_json::to_string_pretty(result)?;
		tokio::fs::write(path, json)
			.await
			.with_context(|| format!("Failed to write {:?}", path))?;
	}
	Ok(())
}

async fn run_accuracy(args: CommonArgs) -> Result<()> {
	let cols = load_columns(&args.data).await?;
	let result = Accuracy.compute(&cols.predictions, &cols.references, args.average)?;
	emit(&result, &cols, args.json_out.as_deref()).await
}

async fn run_bi_encoder(config: Option<&Path>, args: EncoderArgs) -> Result<()> {
	let (config, backends) = load_backends(config)?;
	let cols = load_columns(&args.common.data).await?;

	let mut metric = BiEncoderSimilarity::new(backends.registry, backends.embedder)
		.with_batch_size(args.batch_size.unwrap_or(config.batch_size));
	if let Some(model) = args.model {
		metric = metric.with_model(model);
	}

	let result = metric.compute(&cols.predictions, &cols.references, args.common.average).await?;
	emit(&result, &cols, args.common.json_out.as_deref()).await
}

async fn run_sas(config: Option<&Path>, args: EncoderArgs) -> Result<()> {
	let (config, backends) = load_backends(config)?;
	let cols = load_columns(&args.common.data).await?;

	let mut metric = CrossEncoderSimilarity::new(backends.registry, backends.classifier)
		.with_batch_size(args.batch_size.unwrap_or(config.batch_size));
	if let Some(model) = args.model {
		metric = metric.with_model(model);
	}

	let result = metric.compute(&cols.predictions, &cols.references, args.common.average).await?;
	emit(&result, &cols, args.common.json_out.as_deref()).await
}

async fn run_ensemble(config: Option<&Path>, args: EnsembleArgs) -> Result<()> {
	let (config, backends) = load_backends(config)?;
	let cols = load_columns(&args.common.data).await?;

	let metric = EnsembleSimilarity::new(backends.registry, backends.embedder, backends.classifier)
		.with_batch_size(args.batch_size.unwrap_or(config.batch_size));

	let result = metric
		.compute(&args.models, &cols.predictions, &cols.references, args.common.average)
		.await?;
	emit(&result, &cols, args.common.json_out.as_deref()).await
}

async fn run_judge(config: Option<&Path>, args: JudgeArgs) -> Result<()> {
	let (config, backends) = load_backends(config)?;
	let cols = load_columns(&args.common.data).await?;

	let metric = JudgeScore::new(backends.registry, backends.judge)
		.with_concurrency(args.concurrency.unwrap_or(config.judge_concurrency));
	let options = JudgeOptions {
		return_average: args.common.average,
		return_feedbacks: args.feedbacks,
	};

	let result = metric
		.compute(
			&args.model,
			&cols.predictions,
			&cols.references,
			&cols.contexts,
			Some(cols.histories.as_slice()),
			options,
		)
		.await?;
	emit(&result, &cols, args.common.json_out.as_deref()).await
}
