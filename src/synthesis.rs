//! Staged research-brief generation.
//!
//! A run walks `Research → Summarize → Critique → Write → Done`. Each stage
//! consumes a [`PipelineState`] and returns a new one with exactly one more
//! field filled in; fields are write-once and a stage refuses a state that
//! is not at its own position in the sequence.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    budget::ContextBudgeter,
    capability::{Generator, Message},
    chunk::{Chunk, RankedList},
    error::{Error, Result},
    search::Retrieval,
};

pub const SUMMARIZE_INSTRUCTION: &str = "Extract key claims, methods, \
datasets, and limitations. Use bullet points.";

pub const CRITIQUE_INSTRUCTION: &str = "You are a critical reviewer. \
Evaluate the summary for evidence quality, confounds, and recency. Return a \
JSON with fields: strengths, weaknesses, risks.";

pub const WRITE_INSTRUCTION: &str = "Write a concise research brief with \
sections: Background, Findings, Evidence, Caveats, Recommendations. Add \
inline bracketed citations if present in context.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Research,
    Summarize,
    Critique,
    Write,
    Done,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Research => Some(Stage::Summarize),
            Stage::Summarize => Some(Stage::Critique),
            Stage::Critique => Some(Stage::Write),
            Stage::Write => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    /// Name of the state field this stage writes.
    pub fn output_field(self) -> Option<&'static str> {
        match self {
            Stage::Research => Some("retrieved"),
            Stage::Summarize => Some("summary"),
            Stage::Critique => Some("critique"),
            Stage::Write => Some("report"),
            Stage::Done => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Summarize => "summarize",
            Stage::Critique => "critique",
            Stage::Write => "write",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value threaded through a synthesis run.
///
/// Construct with [`PipelineState::new`]; the `with_*` methods are the only
/// way to fill a field and each succeeds once, in stage order.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    question: String,
    retrieved: Option<RankedList>,
    summary: Option<String>,
    critique: Option<String>,
    report: Option<String>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            retrieved: None,
            summary: None,
            critique: None,
            report: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn retrieved(&self) -> Option<&[Chunk]> {
        self.retrieved.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn critique(&self) -> Option<&str> {
        self.critique.as_deref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    /// The stage that should run next.
    pub fn stage(&self) -> Stage {
        if self.retrieved.is_none() {
            Stage::Research
        } else if self.summary.is_none() {
            Stage::Summarize
        } else if self.critique.is_none() {
            Stage::Critique
        } else if self.report.is_none() {
            Stage::Write
        } else {
            Stage::Done
        }
    }

    /// Fail with [`Error::InvariantViolation`] unless `stage` is next.
    pub fn expect_stage(&self, stage: Stage) -> Result<()> {
        let current = self.stage();
        if current == stage {
            return Ok(());
        }

        let detail = if current < stage {
            let missing = current.output_field().unwrap_or("report");
            format!("`{missing}` has not been produced yet")
        } else {
            let written = stage.output_field().unwrap_or("report");
            format!("`{written}` was already produced")
        };
        Err(Error::InvariantViolation { stage, detail })
    }

    pub fn with_retrieved(self, retrieved: RankedList) -> Result<Self> {
        self.expect_stage(Stage::Research)?;
        Ok(Self {
            retrieved: Some(retrieved),
            ..self
        })
    }

    pub fn with_summary(self, summary: String) -> Result<Self> {
        self.expect_stage(Stage::Summarize)?;
        Ok(Self {
            summary: Some(summary),
            ..self
        })
    }

    pub fn with_critique(self, critique: String) -> Result<Self> {
        self.expect_stage(Stage::Critique)?;
        Ok(Self {
            critique: Some(critique),
            ..self
        })
    }

    pub fn with_report(self, report: String) -> Result<Self> {
        self.expect_stage(Stage::Write)?;
        Ok(Self {
            report: Some(report),
            ..self
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Chunks kept by the research stage.
    pub research_count: usize,
    /// Character budget for the summarize stage's context.
    pub summary_budget_chars: usize,
    pub summary_max_tokens: u32,
    pub critique_max_tokens: u32,
    pub report_max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            research_count: 12,
            summary_budget_chars: 8000,
            summary_max_tokens: 700,
            critique_max_tokens: 400,
            report_max_tokens: 900,
        }
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisReport {
    pub report: String,
    pub retrieved_count: usize,
}

pub struct SynthesisPipeline<R, G> {
    retrieval: Arc<R>,
    generator: Arc<G>,
    config: SynthesisConfig,
}

impl<R: Retrieval, G: Generator> SynthesisPipeline<R, G> {
    pub fn new(
        retrieval: Arc<R>,
        generator: Arc<G>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            retrieval,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Run every stage on `question` and return the finished brief.
    ///
    /// Any failure aborts the run; no partial report is returned.
    pub async fn run(&self, question: &str) -> Result<SynthesisReport> {
        let mut state = PipelineState::new(question);
        while state.stage() != Stage::Done {
            state = self.advance(state).await?;
        }

        let retrieved_count = state.retrieved().map_or(0, |r| r.len());
        let report = state.report.unwrap_or_default();
        info!(retrieved_count, chars = report.len(), "research brief written");
        Ok(SynthesisReport {
            report,
            retrieved_count,
        })
    }

    /// Run whichever stage `state` is waiting on.
    pub async fn advance(&self, state: PipelineState) -> Result<PipelineState> {
        match state.stage() {
            Stage::Research => self.research(state).await,
            Stage::Summarize => self.summarize(state).await,
            Stage::Critique => self.critique(state).await,
            Stage::Write => self.write(state).await,
            Stage::Done => Err(Error::InvariantViolation {
                stage: Stage::Done,
                detail: "run is already complete".into(),
            }),
        }
    }

    pub async fn research(&self, state: PipelineState) -> Result<PipelineState> {
        state.expect_stage(Stage::Research)?;

        let results = self
            .retrieval
            .retrieve(state.question(), self.config.research_count)
            .await
            .map_err(|e| e.in_stage(Stage::Research))?;

        debug!(retrieved = results.chunks.len(), "research stage complete");
        state.with_retrieved(results.chunks)
    }

    pub async fn summarize(&self, state: PipelineState) -> Result<PipelineState> {
        state.expect_stage(Stage::Summarize)?;

        let retrieved = state.retrieved().unwrap_or_default();
        let budgeted =
            ContextBudgeter::new(self.config.summary_budget_chars).budget(retrieved);
        let context = budgeted
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = [
            Message::system(SUMMARIZE_INSTRUCTION),
            Message::user(format!("Context: {context}")),
        ];
        let summary = self
            .generator
            .complete(&messages, self.config.summary_max_tokens)
            .await
            .map_err(|e| e.in_stage(Stage::Summarize))?;

        debug!(
            chunks = budgeted.len(),
            context_chars = context.chars().count(),
            "summarize stage complete"
        );
        state.with_summary(summary)
    }

    /// Critique output is passed on verbatim, whether or not it parses.
    pub async fn critique(&self, state: PipelineState) -> Result<PipelineState> {
        state.expect_stage(Stage::Critique)?;

        let messages = [
            Message::system(CRITIQUE_INSTRUCTION),
            Message::user(state.summary().unwrap_or_default()),
        ];
        let critique = self
            .generator
            .complete(&messages, self.config.critique_max_tokens)
            .await
            .map_err(|e| e.in_stage(Stage::Critique))?;

        debug!("critique stage complete");
        state.with_critique(critique)
    }

    pub async fn write(&self, state: PipelineState) -> Result<PipelineState> {
        state.expect_stage(Stage::Write)?;

        let messages = [
            Message::system(WRITE_INSTRUCTION),
            Message::user(format!(
                "Summary: {}\n\nCritique: {}",
                state.summary().unwrap_or_default(),
                state.critique().unwrap_or_default()
            )),
        ];
        let report = self
            .generator
            .complete(&messages, self.config.report_max_tokens)
            .await
            .map_err(|e| e.in_stage(Stage::Write))?;

        debug!("write stage complete");
        state.with_report(report)
    }
}
