//! Multi-round judge pipeline: comprehension, completeness, quality,
//! devil's-advocate, verdict, with early exits at comprehension and quality.
//! The numeric score is authoritative; a verdict label that disagrees with
//! it is corrected before the result leaves this module.

use crate::evaluation::prompts::{self, PromptContext};
use crate::infrastructure::llm::{LlmClient, LlmError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("llm call failed in {round} round: {source}")]
    Llm {
        round: &'static str,
        source: LlmError,
    },
    #[error("malformed {round} round output: {detail}")]
    Malformed {
        round: &'static str,
        detail: String,
    },
}

/// Final pipeline output. `passed` is always `score >= pass_threshold`.
#[derive(Debug, Clone)]
pub struct JudgeVerdict {
    pub score: u8,
    pub passed: bool,
    pub reason: String,
    pub round_trace: serde_json::Value,
}

#[derive(Deserialize)]
struct ComprehensionRound {
    addresses_task: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct CompletenessRound {
    met: Vec<String>,
    unmet: Vec<String>,
}

#[derive(Deserialize)]
struct QualityRound {
    score: i64,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
}

#[derive(Deserialize)]
struct DevilsAdvocateRound {
    #[serde(default)]
    objections: Vec<String>,
    #[serde(default)]
    fatal: bool,
}

#[derive(Deserialize)]
struct VerdictRound {
    score: i64,
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    reason: String,
}

fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

pub struct JudgePipeline {
    llm: Arc<dyn LlmClient>,
    pass_threshold: u8,
    temperature: f32,
}

impl JudgePipeline {
    pub fn new(llm: Arc<dyn LlmClient>, pass_threshold: u8, temperature: f32) -> Self {
        Self {
            llm,
            pass_threshold,
            temperature,
        }
    }

    pub fn pass_threshold(&self) -> u8 {
        self.pass_threshold
    }

    async fn round<T: serde::de::DeserializeOwned>(
        &self,
        round: &'static str,
        prompt: &str,
        trace: &mut Vec<serde_json::Value>,
    ) -> Result<T, JudgeError> {
        let raw = self
            .llm
            .evaluate(prompt, self.temperature)
            .await
            .map_err(|source| JudgeError::Llm { round, source })?;

        trace.push(json!({"round": round, "output": raw.clone()}));

        serde_json::from_value(raw).map_err(|e| JudgeError::Malformed {
            round,
            detail: e.to_string(),
        })
    }

    fn finish(&self, score: u8, reason: String, trace: Vec<serde_json::Value>) -> JudgeVerdict {
        JudgeVerdict {
            score,
            passed: score >= self.pass_threshold,
            reason,
            round_trace: serde_json::Value::Array(trace),
        }
    }

    /// Run the pipeline over one submission. Any round failure surfaces as
    /// an error for the orchestrator's failure handling; there is no silent
    /// fallback to a passing verdict.
    pub async fn evaluate(&self, ctx: &PromptContext<'_>) -> Result<JudgeVerdict, JudgeError> {
        let mut trace = Vec::new();

        // Round 1: comprehension. A submission that does not address the
        // task at all short-circuits to a reject.
        let comprehension: ComprehensionRound = self
            .round(
                "comprehension",
                &prompts::comprehension_prompt(ctx),
                &mut trace,
            )
            .await?;
        if !comprehension.addresses_task {
            return Ok(self.finish(
                0,
                format!(
                    "submission does not address the task: {}",
                    comprehension.reasoning
                ),
                trace,
            ));
        }

        // Round 2: completeness against the rubric (or inferred requirements).
        let completeness: CompletenessRound = self
            .round(
                "completeness",
                &prompts::completeness_prompt(ctx),
                &mut trace,
            )
            .await?;

        // Round 3: quality. A near-perfect score with no weaknesses
        // short-circuits to an accept.
        let quality: QualityRound = self
            .round("quality", &prompts::quality_prompt(ctx), &mut trace)
            .await?;
        let quality_score = clamp_score(quality.score);
        if quality_score >= 95 && quality.weaknesses.is_empty() {
            return Ok(self.finish(
                quality_score,
                "accepted on unanimous quality review".to_string(),
                trace,
            ));
        }

        // Round 4: devil's advocate.
        let advocate: DevilsAdvocateRound = self
            .round(
                "devils_advocate",
                &prompts::devils_advocate_prompt(ctx, i64::from(quality_score)),
                &mut trace,
            )
            .await?;

        // Round 5: verdict, synthesizing everything above.
        let summary = format!(
            "comprehension: addresses the task ({reasoning})\n\
            completeness: {met} requirements met, {unmet} unmet ({unmet_list})\n\
            quality: {score}/100, strengths: {strengths}; weaknesses: {weaknesses}\n\
            devil's advocate: {objections} objections ({fatal})",
            reasoning = comprehension.reasoning,
            met = completeness.met.len(),
            unmet = completeness.unmet.len(),
            unmet_list = completeness.unmet.join("; "),
            score = quality_score,
            strengths = quality.strengths.join("; "),
            weaknesses = quality.weaknesses.join("; "),
            objections = advocate.objections.len(),
            fatal = if advocate.fatal {
                "fatal"
            } else {
                "not fatal"
            },
        );
        let verdict: VerdictRound = self
            .round(
                "verdict",
                &prompts::verdict_prompt(ctx, &summary, self.pass_threshold),
                &mut trace,
            )
            .await?;

        let score = clamp_score(verdict.score);
        let derived_pass = score >= self.pass_threshold;
        if verdict.passed.is_some_and(|label| label != derived_pass) {
            tracing::warn!(
                score,
                label = verdict.passed,
                "verdict label disagrees with score, correcting to score"
            );
        }

        Ok(self.finish(score, verdict.reason, trace))
    }
}
