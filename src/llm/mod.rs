//! LLM provider abstraction.
//!
//! Every piece of generated text in a cycle flows through one trait:
//! debate turns, judge verdicts, and cycle reflections. The engine holds a
//! `Box<dyn Deliberator>`, so the concrete backend (OpenAI-compatible API,
//! scripted fake in tests) is decided at startup.

pub mod openai;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{AgoraError, CycleScope, ExperienceRecord};

// ---------------------------------------------------------------------------
// Briefs
// ---------------------------------------------------------------------------

/// Everything a party needs to produce its next debate statement.
#[derive(Debug, Clone)]
pub struct TurnBrief {
    pub symbol: String,
    pub trade_date: NaiveDate,
    /// Display name of the speaking party ("advocate", "aggressive", ...).
    pub role: String,
    /// The stance this party must argue, regardless of its own read.
    pub directive: String,
    /// Rendered analyst briefing for the day.
    pub briefing: String,
    /// Combined transcript of all statements so far, oldest first.
    pub transcript: String,
}

/// Which synthesis step is being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeRole {
    /// Buy/sell/hold plan from the advocate/opponent debate.
    Investment,
    /// Final sizing and guardrails from the three-stance risk debate.
    Risk,
}

impl fmt::Display for JudgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeRole::Investment => write!(f, "investment"),
            JudgeRole::Risk => write!(f, "risk"),
        }
    }
}

/// Inputs for a judge verdict over a finished debate.
#[derive(Debug, Clone)]
pub struct JudgeBrief {
    pub judge: JudgeRole,
    pub symbol: String,
    pub trade_date: NaiveDate,
    /// The same analyst briefing the parties argued over.
    pub briefing: String,
    /// Full debate transcript, oldest statement first.
    pub transcript: String,
    /// Past lessons retrieved for today's situation, most relevant first.
    pub experiences: Vec<ExperienceRecord>,
    /// The investment verdict, present for the risk judge only.
    pub prior_plan: Option<String>,
}

/// Inputs for a cycle-boundary reflection over a window of outcomes.
#[derive(Debug, Clone)]
pub struct ReflectionBrief {
    pub symbol: String,
    pub scope: CycleScope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Execution reports for the window, rendered one per line.
    pub reports_digest: String,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Text generator behind debates, judges, and reflection.
///
/// Implementations perform a single attempt per call; callers apply the
/// engine-wide retry policy around each invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Deliberator: Send + Sync {
    /// Produce the next statement for the party described in the brief.
    async fn argue(&self, brief: &TurnBrief) -> Result<String, AgoraError>;

    /// Produce a verdict over a finished debate.
    async fn adjudicate(&self, brief: &JudgeBrief) -> Result<String, AgoraError>;

    /// Distill a window of execution reports into reflection text.
    async fn reflect(&self, brief: &ReflectionBrief) -> Result<String, AgoraError>;

    /// Model identifier, for logs and error messages.
    fn model_name(&self) -> &str;

    /// Cumulative API spend in dollars.
    fn total_cost(&self) -> f64;
}
