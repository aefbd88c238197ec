use simeval_types::ScoreResult;

use crate::error::MetricError;
use crate::metric::check_lengths;

/// Exact match after lowercasing and trimming surrounding whitespace.
pub struct Accuracy;

impl Accuracy {
	pub fn compute(
		&self,
		predictions: &[String],
		references: &[String],
		return_average: bool,
	) -> Result<ScoreResult<bool>, MetricError> {
		check_lengths(&[("predictions", predictions.len()), ("references", references.len())])?;

		let scores: Vec<bool> = predictions
			.iter()
			.zip(references)
			.map(|(p, r)| normalize(p) == normalize(r))
			.collect();

		let result = ScoreResult::new(scores);
		Ok(if return_average { result.with_average() } else { result })
	}
}

fn normalize(s: &str) -> String {
	s.trim().to_lowercase()
}
