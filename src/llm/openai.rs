//! OpenAI-compatible chat client.
//!
//! Implements the `Deliberator` trait against any Chat Completions
//! endpoint (OpenAI, or a compatible gateway via `base_url`). Handles
//! prompt construction, cost tracking, and error classification; the
//! engine-wide retry policy wraps each call at the call site, so this
//! client makes exactly one attempt per invocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Deliberator, JudgeBrief, JudgeRole, ReflectionBrief, TurnBrief};
use crate::types::AgoraError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Approximate cost per 1K input tokens (GPT-4o class).
const INPUT_COST_PER_1K: f64 = 0.005;
/// Approximate cost per 1K output tokens (GPT-4o class).
const OUTPUT_COST_PER_1K: f64 = 0.015;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    total_cost: AtomicU64, // stored as cost * 1_000_000
    total_calls: AtomicU64,
}

impl OpenAiClient {
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<Self, AgoraError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgoraError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            max_tokens,
            temperature,
            total_cost: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// One chat-completions round trip. 429 and 5xx map to retryable
    /// errors; other 4xx would fail identically on retry and do not.
    async fn chat(&self, system: &str, user_message: &str) -> Result<String, AgoraError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgoraError::Llm {
                model: self.model.clone(),
                message: format!("Request error: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.as_u16() >= 500 {
                warn!(status = %status, "Transient API error");
                return Err(AgoraError::Llm {
                    model: self.model.clone(),
                    message: format!("HTTP {status}: {error_text}"),
                });
            }
            return Err(AgoraError::LlmRejected {
                model: self.model.clone(),
                message: format!("HTTP {status}: {error_text}"),
            });
        }

        let body: ChatResponse = response.json().await.map_err(|e| AgoraError::Llm {
            model: self.model.clone(),
            message: format!("Failed to parse response: {e}"),
        })?;

        let text = body
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AgoraError::Llm {
                model: self.model.clone(),
                message: "Empty completion".to_string(),
            });
        }

        let usage = body.usage.unwrap_or_default();
        let cost = (usage.prompt_tokens as f64 / 1000.0) * INPUT_COST_PER_1K
            + (usage.completion_tokens as f64 / 1000.0) * OUTPUT_COST_PER_1K;
        self.total_cost
            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        debug!(
            tokens = usage.total_tokens,
            cost = format!("${cost:.4}"),
            "Chat completion received"
        );

        Ok(text)
    }

    /// Total cumulative cost across all calls, in dollars.
    pub fn cumulative_cost(&self) -> f64 {
        self.total_cost.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    /// Total number of completed API calls.
    pub fn call_count(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    // -- Prompt construction ------------------------------------------------

    /// System prompt for a party turn.
    pub fn turn_system(brief: &TurnBrief) -> String {
        format!(
            "You are the {} in a structured trading debate about {}. {} \
             Engage the most recent opposing points directly instead of restating \
             your case. Answer conversationally in at most six sentences, \
             without bullet lists or headers.",
            brief.role, brief.symbol, brief.directive
        )
    }

    /// User prompt for a party turn.
    pub fn build_turn_prompt(brief: &TurnBrief) -> String {
        let mut prompt = String::with_capacity(2000);

        prompt.push_str(&format!(
            "Instrument: {} | Date: {}\n\nAnalyst briefing:\n{}",
            brief.symbol, brief.trade_date, brief.briefing
        ));

        if brief.transcript.trim().is_empty() {
            prompt.push_str("\n\nThe debate is just starting. Make your opening argument.");
        } else {
            prompt.push_str("\n\nDebate so far:\n");
            prompt.push_str(&brief.transcript);
            prompt.push_str("\n\nMake your next argument.");
        }

        prompt
    }

    /// System prompt for a judge verdict. Pins the exact labeled lines the
    /// verdict parser expects.
    pub fn judge_system(brief: &JudgeBrief) -> String {
        match brief.judge {
            JudgeRole::Investment => format!(
                "You are the portfolio manager judging a debate between an advocate \
                 and an opponent about investing in {}. Weigh the strongest argument \
                 on each side and commit to a recommendation. Do not settle on HOLD \
                 just because both sides make fair points; choose it only when it is \
                 genuinely the strongest case. Learn from the past lessons provided: \
                 if a similar situation went wrong before, say what you are doing \
                 differently.\n\n\
                 Your answer MUST end with exactly these lines:\n\
                 ACTION: BUY, SELL, or HOLD\n\
                 STRATEGY: <short name for the chosen approach>\n\
                 RATIONALE: <two to four sentences>",
                brief.symbol
            ),
            JudgeRole::Risk => format!(
                "You are the risk manager making the final call on {} after hearing \
                 aggressive, neutral, and conservative analysts. Start from the \
                 approved investment plan and adjust it wherever the debate exposed \
                 real risk, using the past lessons provided to avoid repeating \
                 mistakes.\n\n\
                 Your answer MUST end with exactly these lines:\n\
                 ACTION: BUY, SELL, or HOLD\n\
                 POSITION: FULL, PARTIAL, or EMPTY\n\
                 STOP_LOSS: <fraction of entry price, e.g. 0.92, or NONE>\n\
                 TAKE_PROFIT: <fraction of entry price, e.g. 1.15, or NONE>\n\
                 REGIME: <two or three words naming the market regime>\n\
                 EXPECTED: <one sentence on how the position should behave>\n\
                 RATIONALE: <two to four sentences>",
                brief.symbol
            ),
        }
    }

    /// User prompt for a judge verdict.
    pub fn build_judge_prompt(brief: &JudgeBrief) -> String {
        let mut prompt = String::with_capacity(4000);

        prompt.push_str(&format!(
            "Instrument: {} | Date: {}\n\n",
            brief.symbol, brief.trade_date
        ));

        if brief.experiences.is_empty() {
            prompt.push_str("No similar past situations on record.\n");
        } else {
            prompt.push_str("Lessons from similar past situations:\n");
            for (i, exp) in brief.experiences.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, exp.lesson));
            }
        }

        prompt.push_str(&format!("\nAnalyst briefing:\n{}\n", brief.briefing));

        if let Some(plan) = &brief.prior_plan {
            prompt.push_str(&format!("\nApproved investment plan:\n{plan}\n"));
        }

        prompt.push_str(&format!("\nDebate transcript:\n{}\n", brief.transcript));
        prompt.push_str("\nWeigh the arguments and deliver your verdict in the required format.\n");

        prompt
    }

    /// System prompt for cycle reflection.
    pub fn reflection_system() -> &'static str {
        "You review a window of completed trading decisions and extract lessons \
         that will be quoted back to future judges facing similar situations. \
         Be specific about conditions: a lesson that always applies teaches \
         nothing.\n\n\
         Your answer MUST contain exactly these four sections:\n\
         ERRORS: <recurring mistakes and when they occurred, or NONE>\n\
         SUCCESSES: <what worked and under which conditions, or NONE>\n\
         STRATEGY: <conditions where the chosen strategies work or fail>\n\
         BIASES: <decision biases to correct, or NONE>"
    }

    /// User prompt for cycle reflection.
    pub fn build_reflection_prompt(brief: &ReflectionBrief) -> String {
        format!(
            "Instrument: {}\nCycle: {} from {} to {}\n\n\
             Daily execution reports, oldest first:\n{}\n\n\
             Extract the lessons in the required format.\n",
            brief.symbol, brief.scope, brief.start_date, brief.end_date, brief.reports_digest
        )
    }
}

// ---------------------------------------------------------------------------
// Deliberator implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Deliberator for OpenAiClient {
    async fn argue(&self, brief: &TurnBrief) -> Result<String, AgoraError> {
        debug!(
            role = %brief.role,
            date = %brief.trade_date,
            model = %self.model,
            "Requesting debate turn"
        );

        let system = Self::turn_system(brief);
        let user_msg = Self::build_turn_prompt(brief);
        self.chat(&system, &user_msg).await
    }

    async fn adjudicate(&self, brief: &JudgeBrief) -> Result<String, AgoraError> {
        debug!(
            judge = %brief.judge,
            date = %brief.trade_date,
            lessons = brief.experiences.len(),
            model = %self.model,
            "Requesting verdict"
        );

        let system = Self::judge_system(brief);
        let user_msg = Self::build_judge_prompt(brief);
        self.chat(&system, &user_msg).await
    }

    async fn reflect(&self, brief: &ReflectionBrief) -> Result<String, AgoraError> {
        debug!(
            scope = %brief.scope,
            start = %brief.start_date,
            end = %brief.end_date,
            model = %self.model,
            "Requesting cycle reflection"
        );

        let system = Self::reflection_system();
        let user_msg = Self::build_reflection_prompt(brief);
        self.chat(system, &user_msg).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn total_cost(&self) -> f64 {
        self.cumulative_cost()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
