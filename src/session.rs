//! Per-cycle session state: the shared record threaded through every stage
//! of one trading day.
//!
//! Stages never mutate the session in place. Each stage returns a
//! `SessionDelta` which the orchestrator merges, so every write to the
//! blackboard happens at one call site. Debate transcripts live inside the
//! debate sub-state and never appear here; only judge verdicts cross over.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    AnalystKind, AnalystSummary, CycleReflection, ExecutionReport, InvestmentDecision,
    RiskDecision, SessionPhase,
};

// ---------------------------------------------------------------------------
// Analyst inputs
// ---------------------------------------------------------------------------

/// The four analyst summaries for one trading day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystInputs {
    pub market: AnalystSummary,
    pub news: AnalystSummary,
    pub sentiment: AnalystSummary,
    pub fundamentals: AnalystSummary,
}

impl AnalystInputs {
    pub fn get(&self, kind: AnalystKind) -> &AnalystSummary {
        match kind {
            AnalystKind::Market => &self.market,
            AnalystKind::News => &self.news,
            AnalystKind::Sentiment => &self.sentiment,
            AnalystKind::Fundamentals => &self.fundamentals,
        }
    }

    pub fn set(&mut self, kind: AnalystKind, summary: AnalystSummary) {
        match kind {
            AnalystKind::Market => self.market = summary,
            AnalystKind::News => self.news = summary,
            AnalystKind::Sentiment => self.sentiment = summary,
            AnalystKind::Fundamentals => self.fundamentals = summary,
        }
    }

    /// Desks that produced nothing for this day.
    pub fn missing(&self) -> Vec<AnalystKind> {
        AnalystKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything one decision cycle knows, from pre-open inputs to the final
/// execution report. Constructed fresh every trading day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub symbol: String,
    pub trade_date: NaiveDate,
    /// Set when execution actually happens (market-open wall clock).
    pub timestamp: Option<DateTime<Utc>>,
    pub phase: SessionPhase,
    pub inputs: AnalystInputs,
    pub investment: Option<InvestmentDecision>,
    pub risk: Option<RiskDecision>,
    pub execution: Option<ExecutionReport>,
    /// Set only on the last trading day of a cycle window.
    pub reflection: Option<CycleReflection>,
    /// Degradations accumulated across stages, folded into the report.
    pub anomalies: Vec<String>,
}

impl SessionState {
    /// Fresh pre-open session for one symbol and day.
    pub fn open(symbol: impl Into<String>, trade_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            trade_date,
            timestamp: None,
            phase: SessionPhase::PreOpen,
            inputs: AnalystInputs::default(),
            investment: None,
            risk: None,
            execution: None,
            reflection: None,
            anomalies: Vec::new(),
        }
    }

    /// Apply one stage's output. Fields the delta does not set are kept.
    pub fn merge(&mut self, delta: SessionDelta) {
        if let Some(phase) = delta.phase {
            self.phase = phase;
        }
        if let Some(ts) = delta.timestamp {
            self.timestamp = Some(ts);
        }
        for (kind, summary) in delta.summaries {
            self.inputs.set(kind, summary);
        }
        if let Some(investment) = delta.investment {
            self.investment = Some(investment);
        }
        if let Some(risk) = delta.risk {
            self.risk = Some(risk);
        }
        if let Some(execution) = delta.execution {
            self.execution = Some(execution);
        }
        if let Some(reflection) = delta.reflection {
            self.reflection = Some(reflection);
        }
        self.anomalies.extend(delta.anomalies);
    }

    /// The situation description used for experience retrieval. Built from
    /// the four current analyst reports only, so both judges retrieve
    /// against the same text regardless of how the debates went.
    pub fn situation(&self) -> String {
        let mut out = String::new();
        for kind in AnalystKind::ALL {
            let summary = self.inputs.get(*kind);
            let body = if summary.current.trim().is_empty() {
                "(no report)"
            } else {
                summary.current.trim()
            };
            out.push_str(&format!("{}: {}\n", kind, body));
        }
        out
    }

    /// Full briefing for debate prompts: current reports plus rolling
    /// history digests.
    pub fn briefing(&self) -> String {
        let mut out = format!("Instrument: {} | Date: {}\n\n", self.symbol, self.trade_date);
        for kind in AnalystKind::ALL {
            let summary = self.inputs.get(*kind);
            out.push_str(&format!("=== {} analyst ===\n", kind));
            if summary.current.trim().is_empty() {
                out.push_str("(no report)\n");
            } else {
                out.push_str(summary.current.trim());
                out.push('\n');
            }
            if !summary.history.trim().is_empty() {
                out.push_str(&format!("[history] {}\n", summary.history.trim()));
            }
            out.push('\n');
        }
        out
    }

    /// Accumulated anomalies joined for the execution report, if any.
    pub fn anomaly_note(&self) -> Option<String> {
        if self.anomalies.is_empty() {
            None
        } else {
            Some(self.anomalies.join("; "))
        }
    }
}

// ---------------------------------------------------------------------------
// Stage deltas
// ---------------------------------------------------------------------------

/// One stage's contribution to the session. Everything is optional; the
/// orchestrator merges deltas in stage order.
#[derive(Debug, Default)]
pub struct SessionDelta {
    pub phase: Option<SessionPhase>,
    pub timestamp: Option<DateTime<Utc>>,
    pub summaries: Vec<(AnalystKind, AnalystSummary)>,
    pub investment: Option<InvestmentDecision>,
    pub risk: Option<RiskDecision>,
    pub execution: Option<ExecutionReport>,
    pub reflection: Option<CycleReflection>,
    pub anomalies: Vec<String>,
}

impl SessionDelta {
    pub fn with_phase(mut self, phase: SessionPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn note_anomaly(&mut self, note: impl Into<String>) {
        self.anomalies.push(note.into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeAction;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_open_starts_pre_open_and_empty() {
        let session = SessionState::open("AAPL", date(2024, 1, 2));
        assert_eq!(session.phase, SessionPhase::PreOpen);
        assert!(session.investment.is_none());
        assert!(session.execution.is_none());
        assert_eq!(session.inputs.missing().len(), 4);
    }

    #[test]
    fn test_merge_applies_summaries_and_phase() {
        let mut session = SessionState::open("AAPL", date(2024, 1, 2));
        let mut delta = SessionDelta::default().with_phase(SessionPhase::MarketOpen);
        delta
            .summaries
            .push((AnalystKind::News, AnalystSummary::new("earnings beat", "")));
        session.merge(delta);

        assert_eq!(session.phase, SessionPhase::MarketOpen);
        assert_eq!(session.inputs.news.current, "earnings beat");
        // Untouched desks stay empty.
        assert!(session.inputs.market.is_empty());
        assert_eq!(session.inputs.missing().len(), 3);
    }

    #[test]
    fn test_merge_keeps_existing_fields_when_delta_is_silent() {
        let mut session = SessionState::open("AAPL", date(2024, 1, 2));
        session.merge(SessionDelta {
            investment: Some(InvestmentDecision {
                action: TradeAction::Buy,
                strategy: "momentum".into(),
                rationale: "advocate carried it".into(),
                verdict: "ACTION: BUY".into(),
            }),
            ..Default::default()
        });
        // A later, silent delta must not erase the decision.
        session.merge(SessionDelta::default());
        assert!(session.investment.is_some());
    }

    #[test]
    fn test_situation_is_stable_across_decision_merges() {
        let mut session = SessionState::open("AAPL", date(2024, 1, 2));
        let mut delta = SessionDelta::default();
        delta
            .summaries
            .push((AnalystKind::Market, AnalystSummary::new("uptrend intact", "")));
        session.merge(delta);

        let before = session.situation();
        session.merge(SessionDelta {
            investment: Some(InvestmentDecision {
                action: TradeAction::Hold,
                strategy: "wait".into(),
                rationale: "mixed evidence".into(),
                verdict: "ACTION: HOLD".into(),
            }),
            ..Default::default()
        });
        assert_eq!(session.situation(), before);
        assert!(before.contains("Market: uptrend intact"));
        assert!(before.contains("News: (no report)"));
    }

    #[test]
    fn test_anomaly_note_joins_in_order() {
        let mut session = SessionState::open("AAPL", date(2024, 1, 2));
        assert!(session.anomaly_note().is_none());

        let mut first = SessionDelta::default();
        first.note_anomaly("news fetch failed");
        let mut second = SessionDelta::default();
        second.note_anomaly("no open price");
        session.merge(first);
        session.merge(second);

        assert_eq!(
            session.anomaly_note().unwrap(),
            "news fetch failed; no open price"
        );
    }

    #[test]
    fn test_briefing_includes_history_digest() {
        let mut session = SessionState::open("AAPL", date(2024, 1, 2));
        let mut delta = SessionDelta::default();
        delta.summaries.push((
            AnalystKind::Fundamentals,
            AnalystSummary::new("margins expanding", "three straight beats"),
        ));
        session.merge(delta);

        let briefing = session.briefing();
        assert!(briefing.contains("=== Fundamentals analyst ==="));
        assert!(briefing.contains("margins expanding"));
        assert!(briefing.contains("[history] three straight beats"));
    }
}
