use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::{CompletionClient, RetryPolicy, complete_with_retry};

/// Minimum 1-5 correctness score that counts as passing.
pub(crate) const CORRECTNESS_PASSING_SCORE: f64 = 4.0;

const SCORE_LINE_PATTERN: &str = r"^\s*(\d+(?:\.\d+)?)";

/// Leading numeric score on the first line of a correctness reply.
pub(crate) fn score_line_pattern() -> Result<Regex> {
    Regex::new(SCORE_LINE_PATTERN).context("failed to compile correctness score regex")
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum JudgeKind {
    Faithfulness,
    Correctness,
    Relevancy,
}

/// Inputs shared by every judge.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JudgeCase<'a> {
    pub query: &'a str,
    pub response: &'a str,
    pub contexts: &'a [String],
    pub reference: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Verdict {
    pub passing: bool,
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct JudgeOutcome {
    pub query: String,
    pub response: String,
    pub contexts: Vec<String>,
    pub passing: Option<bool>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub invalid_result: bool,
    pub invalid_reason: Option<String>,
}

impl JudgeOutcome {
    fn from_case(case: &JudgeCase<'_>) -> Self {
        Self {
            query: case.query.to_string(),
            response: case.response.to_string(),
            contexts: case.contexts.to_vec(),
            passing: None,
            score: None,
            feedback: None,
            invalid_result: false,
            invalid_reason: None,
        }
    }

    fn invalid(case: &JudgeCase<'_>, reason: String) -> Self {
        Self {
            invalid_result: true,
            invalid_reason: Some(reason),
            ..Self::from_case(case)
        }
    }
}

impl JudgeKind {
    pub(crate) const ALL: [JudgeKind; 3] = [Self::Faithfulness, Self::Correctness, Self::Relevancy];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Faithfulness => "FaithfulnessEvaluator",
            Self::Correctness => "CorrectnessEvaluator",
            Self::Relevancy => "RelevancyEvaluator",
        }
    }

    fn missing_input(self, case: &JudgeCase<'_>) -> Option<&'static str> {
        if case.response.trim().is_empty() {
            return Some("response is empty");
        }
        match self {
            Self::Faithfulness | Self::Relevancy if case.contexts.is_empty() => {
                Some("no source contexts to judge against")
            }
            Self::Correctness if case.reference.trim().is_empty() => {
                Some("reference answer is missing")
            }
            _ => None,
        }
    }

    pub(crate) fn build_prompt(self, case: &JudgeCase<'_>) -> String {
        let context = case.contexts.join("\n\n");
        match self {
            Self::Faithfulness => format!(
                "Please tell if a given piece of information is supported by the context.\n\
                 Answer YES if any part of the context supports the information, even if most \
                 of the context is unrelated. Otherwise answer NO.\n\n\
                 Information: {}\n\nContext:\n{}\n\nAnswer: ",
                case.response, context
            ),
            Self::Correctness => format!(
                "You are an expert evaluation system for a question answering chatbot.\n\
                 You are given a user query, a reference answer and a generated answer.\n\
                 Output a single score between 1 and 5 on the first line and your reasoning \
                 on the following lines.\n\
                 - 1: the generated answer is not relevant to the query\n\
                 - 2 or 3: relevant but contains mistakes\n\
                 - 4 or 5: relevant and fully correct\n\n\
                 User Query:\n{}\n\nReference Answer:\n{}\n\nGenerated Answer:\n{}\n",
                case.query, case.reference, case.response
            ),
            Self::Relevancy => format!(
                "Your task is to evaluate if the response for the query is in line with the \
                 context information provided.\n\
                 Answer YES if the response and the context are in line with the query. \
                 Otherwise answer NO.\n\n\
                 Query and Response:\n{}\n{}\n\nContext:\n{}\n\nAnswer: ",
                case.query, case.response, context
            ),
        }
    }

    pub(crate) fn parse_verdict(self, reply: &str, score_line: &Regex) -> Result<Verdict> {
        let feedback = reply.trim().to_string();
        match self {
            Self::Faithfulness | Self::Relevancy => {
                let passing = feedback.to_lowercase().contains("yes");
                Ok(Verdict {
                    passing,
                    score: if passing { 1.0 } else { 0.0 },
                    feedback,
                })
            }
            Self::Correctness => {
                let first_line = feedback.lines().next().unwrap_or_default();
                let Some(captures) = score_line.captures(first_line) else {
                    bail!("correctness reply does not start with a score: {first_line:?}");
                };
                let score = captures[1]
                    .parse::<f64>()
                    .with_context(|| format!("invalid correctness score in {first_line:?}"))?;
                if !(1.0..=5.0).contains(&score) {
                    bail!("correctness score {score} is outside 1-5");
                }
                let reasoning = feedback
                    .lines()
                    .skip(1)
                    .collect::<Vec<&str>>()
                    .join("\n")
                    .trim()
                    .to_string();
                Ok(Verdict {
                    passing: score >= CORRECTNESS_PASSING_SCORE,
                    score,
                    feedback: reasoning,
                })
            }
        }
    }
}

/// Runs judges against one LLM endpoint with bounded retries.
pub(crate) struct ResponseJudge<'a> {
    client: &'a dyn CompletionClient,
    policy: RetryPolicy,
    score_line: Regex,
}

impl<'a> ResponseJudge<'a> {
    pub(crate) fn new(client: &'a dyn CompletionClient, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client,
            policy,
            score_line: score_line_pattern()?,
        })
    }

    pub(crate) fn judge(&self, kind: JudgeKind, case: &JudgeCase<'_>) -> JudgeOutcome {
        if let Some(reason) = kind.missing_input(case) {
            return JudgeOutcome::invalid(case, reason.to_string());
        }

        let prompt = kind.build_prompt(case);
        let reply = match complete_with_retry(self.client, &prompt, self.policy) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(judge = kind.name(), query = %case.query, error = %err, "judge call failed");
                return JudgeOutcome::invalid(case, err.to_string());
            }
        };

        match kind.parse_verdict(&reply, &self.score_line) {
            Ok(verdict) => JudgeOutcome {
                passing: Some(verdict.passing),
                score: Some(verdict.score),
                feedback: Some(verdict.feedback),
                ..JudgeOutcome::from_case(case)
            },
            Err(err) => {
                warn!(judge = kind.name(), query = %case.query, error = %err, "unparseable judge reply");
                JudgeOutcome::invalid(case, format!("{err:#}"))
            }
        }
    }
}
