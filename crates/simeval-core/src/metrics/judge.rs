use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use simeval_types::{ModelKind, ScoreResult, Turn};
use tracing::{info, warn};

use crate::backend::{JudgeClient, ModelRegistry};
use crate::error::{MetricError, RatingFailure};
use crate::metric::{check_lengths, check_positive, require_kind};

pub const DEFAULT_JUDGE_CONCURRENCY: usize = 4;

const SYSTEM_PROMPT: &str = "You are a fair judge assistant. You give clear, objective feedback \
based on the given criteria, and every assessment reflects the absolute standard of the rubric.";

const DEFAULT_CRITERIA: &str = "Is the response correct, complete and faithful to the context and \
the reference answer, given the conversation so far?
Score 1-2: The response is wrong, irrelevant or contradicts the context.
Score 3-4: The response is mostly wrong, with only minor relevant elements.
Score 5-6: The response is partially correct but misses or distorts important information.
Score 7-8: The response is correct and relevant, with small omissions or imprecisions.
Score 9-10: The response is fully correct, complete and consistent with the reference answer.";

/// What the judge is asked to assess, and the integer scale it must use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    pub criteria: String,
    pub min: u32,
    pub max: u32,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            criteria: DEFAULT_CRITERIA.to_string(),
            min: 1,
            max: 10,
        }
    }
}

impl Rubric {
    pub fn new(criteria: impl Into<String>, min: u32, max: u32) -> Result<Self, MetricError> {
        if min >= max {
            return Err(MetricError::InvalidConfig(format!(
                "rubric range {min}..={max} is empty or degenerate"
            )));
        }
        Ok(Self {
            criteria: criteria.into(),
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgeOptions {
    pub return_average: bool,
    pub return_feedbacks: bool,
}

/// A parsed judge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub rating: u32,
    pub feedback: String,
}

/// Prometheus-style absolute grading: a generative model rates each answer
/// against the reference and context on an integer rubric scale.
pub struct JudgeScore {
    registry: Arc<dyn ModelRegistry>,
    judge: Arc<dyn JudgeClient>,
    rubric: Rubric,
    concurrency: usize,
}

impl JudgeScore {
    pub fn new(registry: Arc<dyn ModelRegistry>, judge: Arc<dyn JudgeClient>) -> Self {
        Self {
            registry,
            judge,
            rubric: Rubric::default(),
            concurrency: DEFAULT_JUDGE_CONCURRENCY,
        }
    }

    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = rubric;
        self
    }

    /// Maximum judge requests in flight.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Rates every sample. `None` history behaves exactly like empty histories.
    pub async fn compute(
        &self,
        model_name: &str,
        predictions: &[String],
        references: &[String],
        contexts: &[String],
        previous_conversations: Option<&[Vec<Turn>]>,
        options: JudgeOptions,
    ) -> Result<ScoreResult<u32>, MetricError> {
        let mut columns = vec![
            ("predictions", predictions.len()),
            ("references", references.len()),
            ("contexts", contexts.len()),
        ];
        if let Some(history) = previous_conversations {
            columns.push(("previous_conversations", history.len()));
        }
        let n = check_lengths(&columns)?;
        check_positive("judge_concurrency", self.concurrency)?;
        require_kind(self.registry.as_ref(), model_name, ModelKind::Judge).await?;
        info!(model = %model_name, samples = n, "computing judge score");

        let prompts: Vec<String> = (0..n)
            .map(|i| {
                let history = previous_conversations.map_or(&[][..], |h| h[i].as_slice());
                render_prompt(&self.rubric, &contexts[i], history, &references[i], &predictions[i])
            })
            .collect();

        let responses: Vec<String> = stream::iter(prompts.iter())
            .map(|prompt| async move {
                self.judge
                    .generate(model_name, SYSTEM_PROMPT, prompt)
                    .await
                    .map_err(|e| MetricError::backend(model_name, e))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut ratings = Vec::with_capacity(n);
        let mut feedbacks = Vec::with_capacity(n);
        let mut failures = Vec::new();
        for (index, response) in responses.into_iter().enumerate() {
            match parse_judgement(&response, &self.rubric) {
                Ok(j) => {
                    ratings.push(j.rating);
                    feedbacks.push(j.feedback);
                }
                Err(reason) => {
                    warn!(index, %reason, "unparseable judge response");
                    failures.push(RatingFailure {
                        index,
                        reason,
                        response,
                    });
                }
            }
        }
        if !failures.is_empty() {
            return Err(MetricError::UnparseableRatings { failures });
        }

        let mut result = ScoreResult::new(ratings);
        if options.return_feedbacks {
            result = result.with_feedbacks(feedbacks);
        }
        if options.return_average {
            result = result.with_average();
        }
        Ok(result)
    }
}

/// Builds the absolute-grading prompt for one sample.
pub fn render_prompt(
    rubric: &Rubric,
    context: &str,
    history: &[Turn],
    reference: &str,
    prediction: &str,
) -> String {
    let (min, max) = (rubric.min, rubric.max);
    let mut prompt = String::new();

    let _ = write!(
        prompt,
        "###Task Description:\n\
         A conversation history, a context, a response to evaluate, a reference answer that gets a score of {max}, \
         and a score rubric representing the evaluation criteria are given.\n\
         1. Write a detailed feedback that assesses the quality of the response strictly based on the given score rubric, not evaluating in general.\n\
         2. After writing the feedback, write a score that is an integer between {min} and {max}. You should refer to the score rubric.\n\
         3. The output format should look as follows: \"Feedback: (write a feedback for criteria) [RESULT] (an integer number between {min} and {max})\"\n\
         4. Please do not generate any other opening, closing, and explanations.\n\n"
    );

    prompt.push_str("###Conversation history:\n");
    if history.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for turn in history {
            let _ = writeln!(prompt, "{}: {}", turn.role, turn.content);
        }
    }

    let _ = write!(
        prompt,
        "\n###Context:\n{context}\n\n\
         ###Response to evaluate:\n{prediction}\n\n\
         ###Reference Answer (Score {max}):\n{reference}\n\n\
         ###Score Rubric:\n{criteria}\n\n\
         ###Feedback: ",
        criteria = rubric.criteria
    );

    prompt
}

fn result_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[RESULT\]\s*\(?\s*([^\s()\[\]]+)").expect("static pattern"))
}

/// Reads the rating after the last `[RESULT]` marker; the text before it is the feedback.
pub fn parse_judgement(response: &str, rubric: &Rubric) -> Result<Judgement, String> {
    let caps = result_marker()
        .captures_iter(response)
        .last()
        .ok_or_else(|| "missing `[RESULT] <score>` marker".to_string())?;

    let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
        return Err("malformed `[RESULT]` marker".to_string());
    };
    // The whole token must parse; `8.5` and `10abc` are failures, not 8 and 10.
    let rating: i64 = token
        .as_str()
        .parse()
        .map_err(|e| format!("rating `{}` is not an integer: {e}", token.as_str()))?;
    if rating < i64::from(rubric.min) || rating > i64::from(rubric.max) {
        return Err(format!(
            "rating {rating} is outside the rubric range {}..={}",
            rubric.min, rubric.max
        ));
    }

    let before = response[..whole.start()].trim();
    let feedback = before
        .strip_prefix("Feedback:")
        .unwrap_or(before)
        .trim()
        .to_string();

    Ok(Judgement {
        rating: rating as u32,
        feedback,
    })
}
