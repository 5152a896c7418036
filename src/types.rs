//! Shared types for the AGORA agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, debate, ledger,
//! and engine modules can depend on them without circular references.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Analysts
// ---------------------------------------------------------------------------

/// The four analyst desks feeding a decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalystKind {
    Market,
    News,
    Sentiment,
    Fundamentals,
}

impl AnalystKind {
    /// All analyst desks, in ingestion order (useful for iteration).
    pub const ALL: &'static [AnalystKind] = &[
        AnalystKind::Market,
        AnalystKind::News,
        AnalystKind::Sentiment,
        AnalystKind::Fundamentals,
    ];

    /// Stable lowercase identifier used in fixtures and persistence keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::News => "news",
            AnalystKind::Sentiment => "sentiment",
            AnalystKind::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalystKind::Market => write!(f, "Market"),
            AnalystKind::News => write!(f, "News"),
            AnalystKind::Sentiment => write!(f, "Sentiment"),
            AnalystKind::Fundamentals => write!(f, "Fundamentals"),
        }
    }
}

impl std::str::FromStr for AnalystKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "market" | "technical" => Ok(AnalystKind::Market),
            "news" => Ok(AnalystKind::News),
            "sentiment" | "social" => Ok(AnalystKind::Sentiment),
            "fundamentals" | "fundamental" => Ok(AnalystKind::Fundamentals),
            _ => Err(anyhow::anyhow!("Unknown analyst kind: {s}")),
        }
    }
}

/// One analyst's condensed findings: the current report plus a rolling
/// historical digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystSummary {
    pub current: String,
    pub history: String,
}

impl AnalystSummary {
    pub fn new(current: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            history: history.into(),
        }
    }

    /// Empty summary: the neutral default when no data exists yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.current.trim().is_empty() && self.history.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    PreOpen,
    MarketOpen,
    PostClose,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::PreOpen => write!(f, "pre-open"),
            SessionPhase::MarketOpen => write!(f, "market-open"),
            SessionPhase::PostClose => write!(f, "post-close"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Direction of the plan the judges converge on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

impl std::str::FromStr for TradeAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "LONG" => Ok(TradeAction::Buy),
            "SELL" | "SHORT" | "EXIT" => Ok(TradeAction::Sell),
            "HOLD" | "WAIT" => Ok(TradeAction::Hold),
            _ => Err(anyhow::anyhow!("Unknown trade action: {s}")),
        }
    }
}

/// Position-sizing posture, both as policy guidance and as the observed
/// post-execution state reported downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Positioning {
    Full,
    Partial,
    Empty,
}

impl fmt::Display for Positioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Positioning::Full => write!(f, "full"),
            Positioning::Partial => write!(f, "partial"),
            Positioning::Empty => write!(f, "empty"),
        }
    }
}

impl std::str::FromStr for Positioning {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "max" => Ok(Positioning::Full),
            "partial" | "half" => Ok(Positioning::Partial),
            "empty" | "none" | "flat" => Ok(Positioning::Empty),
            _ => Err(anyhow::anyhow!("Unknown positioning: {s}")),
        }
    }
}

/// The investment judge's plan, parsed from its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentDecision {
    pub action: TradeAction,
    /// Strategy tag carried through to the position and the execution report.
    pub strategy: String,
    pub rationale: String,
    /// Full verdict text as written into the debate record.
    pub verdict: String,
}

impl fmt::Display for InvestmentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}: {}", self.action, self.strategy, self.rationale)
    }
}

/// The risk judge's trading policy, parsed from its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub action: TradeAction,
    pub positioning: Positioning,
    /// Stop-loss as a fraction of entry price (e.g. 0.92 = 8% below entry).
    pub stop_loss_frac: Option<Decimal>,
    /// Take-profit as a fraction of entry price (e.g. 1.15 = 15% above entry).
    pub take_profit_frac: Option<Decimal>,
    /// The judge's read of the current market regime.
    pub regime: String,
    /// What the judge expects the plan to do, checked at reflection time.
    pub expected_behavior: String,
    pub rationale: String,
    /// Full verdict text as written into the debate record.
    pub verdict: String,
}

impl fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) regime={} stop={:?} take={:?}",
            self.action, self.positioning, self.regime, self.stop_loss_frac, self.take_profit_frac,
        )
    }
}

// ---------------------------------------------------------------------------
// Execution report
// ---------------------------------------------------------------------------

/// The per-day artifact persisted once per symbol per trading day.
/// Shape is a contract with downstream reporting and with cycle-boundary
/// reflection, which consumes these records and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub date: NaiveDate,
    pub symbol: String,
    pub market_regime: String,
    pub selected_strategy: String,
    pub expected_behavior: String,
    pub actual_return: f64,
    pub actual_max_drawdown: f64,
    pub positioning: Positioning,
    pub anomaly: Option<String>,
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {} pos={} ret={:+.2}% dd={:.2}%{}",
            self.date,
            self.symbol,
            self.market_regime,
            self.selected_strategy,
            self.positioning,
            self.actual_return * 100.0,
            self.actual_max_drawdown * 100.0,
            match &self.anomaly {
                Some(a) => format!(" anomaly: {a}"),
                None => String::new(),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Reflection & experience
// ---------------------------------------------------------------------------

/// Reflection window size. Reflection runs on the last trading day of the
/// window and is the only writer to the experience store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleScope {
    Weekly,
    Monthly,
}

impl CycleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleScope::Weekly => "weekly",
            CycleScope::Monthly => "monthly",
        }
    }
}

impl fmt::Display for CycleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CycleScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "week" => Ok(CycleScope::Weekly),
            "monthly" | "month" => Ok(CycleScope::Monthly),
            _ => Err(anyhow::anyhow!("Unknown cycle scope: {s}")),
        }
    }
}

/// Aggregated lessons from one cycle window, distilled from that window's
/// execution reports and written back as future experience.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReflection {
    pub scope: Option<CycleScope>,
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// What went wrong and under which conditions.
    pub error_patterns: String,
    /// What worked and under which conditions.
    pub success_patterns: String,
    /// Per-strategy notes: when each strategy fit the regime.
    pub strategy_conditions: String,
    /// Systematic biases observed in environment judgment.
    pub bias_notes: String,
}

impl CycleReflection {
    /// Non-empty lesson sections, tagged for storage and retrieval.
    pub fn lessons(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        for (tag, text) in [
            ("errors", self.error_patterns.as_str()),
            ("successes", self.success_patterns.as_str()),
            ("strategy", self.strategy_conditions.as_str()),
            ("biases", self.bias_notes.as_str()),
        ] {
            if !text.trim().is_empty() {
                out.push((tag, text));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lessons().is_empty()
    }
}

/// A retrieved situation→lesson pair, scored against the current situation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub situation: String,
    pub lesson: String,
    /// Similarity of `situation` to the current one, in [0, 1].
    pub relevance: f64,
}

impl fmt::Display for ExperienceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}] {}", self.relevance, self.lesson)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type shared across all modules.
#[derive(Error, Debug)]
pub enum AgoraError {
    #[error("LLM error ({model}): {message}")]
    Llm { model: String, message: String },

    /// The endpoint refused the request (4xx other than 429). Retrying an
    /// identical request cannot help.
    #[error("LLM rejected request ({model}): {message}")]
    LlmRejected { model: String, message: String },

    #[error("Data provider error ({provider}): {message}")]
    Data { provider: String, message: String },

    #[error("Experience store error: {0}")]
    Memory(String),

    #[error("Debate protocol error: {0}")]
    Debate(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
}

impl AgoraError {
    /// External-call failures are retryable; protocol, storage, and
    /// configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgoraError::Llm { .. } | AgoraError::Data { .. } | AgoraError::Timeout { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_analyst_kind_roundtrip() {
        for kind in AnalystKind::ALL {
            let parsed: AnalystKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_analyst_kind_aliases() {
        assert_eq!("social".parse::<AnalystKind>().unwrap(), AnalystKind::Sentiment);
        assert_eq!("technical".parse::<AnalystKind>().unwrap(), AnalystKind::Market);
        assert!("astrology".parse::<AnalystKind>().is_err());
    }

    #[test]
    fn test_analyst_summary_empty() {
        assert!(AnalystSummary::empty().is_empty());
        assert!(AnalystSummary::new("  ", "\n").is_empty());
        assert!(!AnalystSummary::new("RSI overbought", "").is_empty());
    }

    #[test]
    fn test_trade_action_parse() {
        assert_eq!("buy".parse::<TradeAction>().unwrap(), TradeAction::Buy);
        assert_eq!(" SELL ".parse::<TradeAction>().unwrap(), TradeAction::Sell);
        assert_eq!("Hold".parse::<TradeAction>().unwrap(), TradeAction::Hold);
        assert!("maybe".parse::<TradeAction>().is_err());
    }

    #[test]
    fn test_positioning_serde_lowercase() {
        let json = serde_json::to_string(&Positioning::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let back: Positioning = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(back, Positioning::Full);
    }

    #[test]
    fn test_execution_report_shape() {
        let report = ExecutionReport {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            symbol: "AAPL".into(),
            market_regime: "range-bound".into(),
            selected_strategy: "mean-reversion".into(),
            expected_behavior: "fade strength near resistance".into(),
            actual_return: 0.0123,
            actual_max_drawdown: 0.05,
            positioning: Positioning::Partial,
            anomaly: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["positioning"], "partial");
        assert!(json["anomaly"].is_null());
        let back: ExecutionReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_reflection_lessons_skips_empty_sections() {
        let reflection = CycleReflection {
            symbol: "AAPL".into(),
            error_patterns: "bought into earnings uncertainty".into(),
            success_patterns: String::new(),
            strategy_conditions: "momentum only worked on trend days".into(),
            bias_notes: "  ".into(),
            ..Default::default()
        };
        let lessons = reflection.lessons();
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].0, "errors");
        assert_eq!(lessons[1].0, "strategy");
        assert!(!reflection.is_empty());
        assert!(CycleReflection::default().is_empty());
    }

    #[test]
    fn test_risk_decision_display() {
        let decision = RiskDecision {
            action: TradeAction::Buy,
            positioning: Positioning::Full,
            stop_loss_frac: Some(dec!(0.92)),
            take_profit_frac: None,
            regime: "trending".into(),
            expected_behavior: "ride the trend".into(),
            rationale: "aggressive case carried the debate".into(),
            verdict: "ACTION: BUY".into(),
        };
        let line = decision.to_string();
        assert!(line.contains("BUY"));
        assert!(line.contains("trending"));
    }

    #[test]
    fn test_error_retryability() {
        let llm = AgoraError::Llm {
            model: "gpt-4o".into(),
            message: "rate limited".into(),
        };
        let timeout = AgoraError::Timeout {
            operation: "get_price".into(),
            seconds: 60,
        };
        let debate = AgoraError::Debate("turn out of order".into());
        let rejected = AgoraError::LlmRejected {
            model: "gpt-4o".into(),
            message: "HTTP 400: bad request".into(),
        };
        assert!(llm.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!debate.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!AgoraError::Config("missing key".into()).is_retryable());
    }

    #[test]
    fn test_cycle_scope_parse() {
        assert_eq!("weekly".parse::<CycleScope>().unwrap(), CycleScope::Weekly);
        assert_eq!("MONTH".parse::<CycleScope>().unwrap(), CycleScope::Monthly);
        assert!("quarterly".parse::<CycleScope>().is_err());
    }
}
