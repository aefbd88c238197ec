use std::fmt;

use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Role::System => "system",
			Role::User => "user",
			Role::Assistant => "assistant",
		};
		f.write_str(s)
	}
}

/// One turn of the conversation that preceded the evaluated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
	pub role: Role,
	pub content: String,
}

impl Turn {
	pub fn new(role: Role, content: impl Into<String>) -> Self {
		Self { role, content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::new(Role::User, content)
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self::new(Role::Assistant, content)
	}
}

/// A prediction paired with its reference answer, plus optional judge context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub prediction: String,
	pub reference: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub conversation: Vec<Turn>,
}

impl Sample {
	pub fn new(prediction: impl Into<String>, reference: impl Into<String>) -> Self {
		Self {
			id: None,
			prediction: prediction.into(),
			reference: reference.into(),
			context: None,
			conversation: Vec::new(),
		}
	}

	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	pub fn with_context(mut self, context: impl Into<String>) -> Self {
		self.context = Some(context.into());
		self
	}

	pub fn with_conversation(mut self, conversation: Vec<Turn>) -> Self {
		self.conversation = conversation;
		self
	}
}

/// Samples split into the positionally aligned columns the metrics take.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleColumns {
	pub ids: Vec<Option<String>>,
	pub predictions: Vec<String>,
	pub references: Vec<String>,
	/// Missing contexts become empty strings.
	pub contexts: Vec<String>,
	pub histories: Vec<Vec<Turn>>,
}

impl SampleColumns {
	pub fn from_samples(samples: &[Sample]) -> Self {
		let mut cols = SampleColumns::default();
		for s in samples {
			cols.ids.push(s.id.clone());
			cols.predictions.push(s.prediction.clone());
			cols.references.push(s.reference.clone());
			cols.contexts.push(s.context.clone().unwrap_or_default());
			cols.histories.push(s.conversation.clone());
		}
		cols
	}

	pub fn len(&self) -> usize {
		self.predictions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.predictions.is_empty()
	}
}

/// What kind of backend a model identifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
	/// Scores a (prediction, reference) pair jointly.
	CrossEncoder,
	/// Embeds each text independently.
	BiEncoder,
	/// Generative model that rates an answer against a rubric.
	Judge,
}

impl fmt::Display for ModelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ModelKind::CrossEncoder => "cross-encoder",
			ModelKind::BiEncoder => "bi-encoder",
			ModelKind::Judge => "judge",
		};
		f.write_str(s)
	}
}

/// A per-sample score that can be averaged.
pub trait ScoreValue {
	fn as_f64(&self) -> f64;
}

impl ScoreValue for bool {
	fn as_f64(&self) -> f64 {
		if *self { 1.0 } else { 0.0 }
	}
}

impl ScoreValue for u32 {
	fn as_f64(&self) -> f64 {
		*self as f64
	}
}

impl ScoreValue for f32 {
	fn as_f64(&self) -> f64 {
		*self as f64
	}
}

impl ScoreValue for f64 {
	fn as_f64(&self) -> f64 {
		*self
	}
}

/// Unweighted arithmetic mean; `None` when there is nothing to average.
pub fn mean<T: ScoreValue>(values: &[T]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let sum: f64 = values.iter().map(ScoreValue::as_f64).sum();
	Some(sum / values.len() as f64)
}

/// Per-sample scores with an optional average and optional judge feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult<T> {
	pub scores: Vec<T>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub average: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub feedbacks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Tabled)]
struct ScoreRow {
	index: usize,
	id: String,
	score: String,
	feedback: String,
}

impl<T: ScoreValue> ScoreResult<T> {
	pub fn new(scores: Vec<T>) -> Self {
		Self { scores, average: None, feedbacks: None }
	}

	/// Fills `average` with the mean of `scores`.
	pub fn with_average(mut self) -> Self {
		self.average = mean(&self.scores);
		self
	}

	pub fn with_feedbacks(mut self, feedbacks: Vec<String>) -> Self {
		self.feedbacks = Some(feedbacks);
		self
	}

	pub fn len(&self) -> usize {
		self.scores.len()
	}

	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}
}

impl<T: ScoreValue + fmt::Display> ScoreResult<T> {
	/// Renders one row per sample. `ids` may be shorter than `scores`.
	pub fn summary_table(&self, ids: &[Option<String>]) -> String {
		let rows: Vec<ScoreRow> = self.scores.iter().enumerate().map(|(i, s)| {
			let id = ids.get(i).cloned().flatten().unwrap_or_else(|| "-".to_string());
			let feedback = self
				.feedbacks
				.as_ref()
				.and_then(|f| f.get(i))
				.map(|f| truncate(f.clone(), 64))
				.unwrap_or_default();
			ScoreRow { index: i, id, score: format_score(s), feedback }
		}).collect();

		let table_str = Table::new(rows).to_string();
		let summary_text = match self.average {
			Some(avg) => format!("Samples: {}  Average: {:.4}", self.scores.len(), avg),
			None => format!("Samples: {}", self.scores.len()),
		};

		format!("{}\n\n{}\n", table_str, summary_text)
	}
}

fn format_score<T: ScoreValue + fmt::Display>(s: &T) -> String {
	let v = s.as_f64();
	if v.fract() == 0.0 {
		s.to_string()
	} else {
		format!("{:.4}", v)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
