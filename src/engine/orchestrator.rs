//! Cycle orchestrator: the per-day state machine.
//!
//! One `run_day` call walks a trading day through its stages in strict
//! sequence: pre-open summary ingestion, the investment debate and judge,
//! the risk debate and judge, market-open execution against the ledger,
//! post-close revaluation, and (on window boundaries) reflection. Each
//! stage returns a `SessionDelta` merged at a single call site; debate
//! transcripts stay inside their `DebateState` and only verdicts cross
//! into the session.
//!
//! Failure policy follows one rule: a stage that fails after retries
//! degrades into empty/neutral data plus an anomaly note, and the day
//! continues. Nothing a single day does can abort the run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};

use crate::data::{PriceKind, PriceProvider, SummaryProvider};
use crate::debate::judge::{parse_investment_verdict, parse_risk_verdict};
use crate::debate::{DebateRules, DebateState};
use crate::ledger::metrics::{DailyStats, PerformanceTracker};
use crate::ledger::{BuySize, PortfolioLedger, PortfolioState};
use crate::llm::{Deliberator, JudgeBrief, JudgeRole, ReflectionBrief, TurnBrief};
use crate::memory::ExperienceStore;
use crate::retry::{with_retry, RetryPolicy};
use crate::session::{SessionDelta, SessionState};
use crate::types::{
    AgoraError, AnalystKind, AnalystSummary, CycleScope, ExecutionReport, ExperienceRecord,
    InvestmentDecision, Positioning, RiskDecision, SessionPhase, TradeAction,
};

use super::reflection::{parse_reflection, window_ends, ReflectionWindow};

/// Cash below this share of total value counts as fully deployed when
/// reporting the post-execution posture.
const FULL_POSTURE_CASH_FRAC: Decimal = dec!(0.05);

/// Engine knobs that stay fixed for a whole run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,
    pub investment_rounds: u32,
    pub risk_rounds: u32,
    /// Experience records retrieved per judge invocation.
    pub retrieve_k: usize,
    pub cycle: CycleScope,
}

/// Everything one completed day produced.
#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub session: SessionState,
    pub portfolio: PortfolioState,
    pub stats: DailyStats,
    /// True when this day closed a cycle window and wrote a reflection.
    pub reflected: bool,
}

/// Per-day state machine over injected providers. Holds no per-day
/// state itself; session and debate state are constructed fresh each
/// `run_day` and discarded after.
pub struct CycleEngine {
    config: EngineConfig,
    retry: RetryPolicy,
    summaries: Arc<dyn SummaryProvider>,
    prices: Arc<dyn PriceProvider>,
    llm: Arc<dyn Deliberator>,
    memory: Arc<dyn ExperienceStore>,
}

impl CycleEngine {
    pub fn new(
        config: EngineConfig,
        retry: RetryPolicy,
        summaries: Arc<dyn SummaryProvider>,
        prices: Arc<dyn PriceProvider>,
        llm: Arc<dyn Deliberator>,
        memory: Arc<dyn ExperienceStore>,
    ) -> Self {
        Self {
            config,
            retry,
            summaries,
            prices,
            llm,
            memory,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    /// Run one complete trading day. The ledger, tracker, and window
    /// persist across days; everything else is cycle-scoped.
    pub async fn run_day(
        &self,
        date: NaiveDate,
        next_trading_day: Option<NaiveDate>,
        ledger: &mut PortfolioLedger,
        tracker: &mut PerformanceTracker,
        window: &mut ReflectionWindow,
    ) -> DayOutcome {
        info!(symbol = %self.config.symbol, %date, "Starting trading day");
        let mut session = SessionState::open(self.config.symbol.clone(), date);

        // Pre-open: the four analyst ingestions in parallel.
        session.merge(self.ingest_summaries(&session).await);

        // Both judges retrieve against the same pre-debate situation.
        let (experiences, mut retrieval_delta) = self.retrieve_experiences(&session).await;
        session.merge(std::mem::take(&mut retrieval_delta));

        // Investment debate and judge.
        session.merge(self.investment_stage(&session, &experiences).await);

        // Risk debate and judge, consuming the investment plan.
        session.merge(self.risk_stage(&session, &experiences).await);

        // Market open: turn the risk verdict into ledger mutations.
        session.merge(self.execution_stage(&session, ledger).await);

        // Post close: revalue the book and derive the day's statistics.
        let (portfolio, stats, valuation_delta) =
            self.valuation_stage(&session, ledger, tracker).await;
        session.merge(valuation_delta);

        // Window boundary: reflect and persist lessons.
        let mut reflected = false;
        if let Some(report) = session.execution.clone() {
            window.push(report);
            if window_ends(date, next_trading_day, self.config.cycle) {
                let delta = self.reflection_stage(window).await;
                reflected = delta.reflection.is_some();
                session.merge(delta);
            }
        }

        info!(
            symbol = %self.config.symbol,
            %date,
            action = %session.risk.as_ref().map(|r| r.action.to_string()).unwrap_or_else(|| "-".into()),
            total_value = %portfolio.total_value,
            daily_return = format!("{:+.2}%", stats.daily_return * 100.0),
            max_drawdown = format!("{:.2}%", stats.max_drawdown * 100.0),
            anomalies = session.anomalies.len(),
            reflected,
            "Day complete"
        );

        DayOutcome {
            session,
            portfolio,
            stats,
            reflected,
        }
    }

    // -- Pre-open ----------------------------------------------------------

    /// Fetch the four analyst summaries concurrently. A failed desk
    /// degrades to an empty summary with an anomaly note.
    async fn ingest_summaries(&self, session: &SessionState) -> SessionDelta {
        let fetches = AnalystKind::ALL.iter().map(|kind| {
            let kind = *kind;
            async move {
                let result = with_retry(&self.retry, kind.as_str(), || {
                    self.summaries.get_summary(
                        kind,
                        &self.config.symbol,
                        session.trade_date,
                        SessionPhase::PreOpen,
                    )
                })
                .await;
                (kind, result)
            }
        });

        let mut delta = SessionDelta::default();
        for (kind, result) in join_all(fetches).await {
            match result {
                Ok(summary) => {
                    if summary.is_empty() {
                        debug!(analyst = %kind, "No report for this day");
                    }
                    delta.summaries.push((kind, summary));
                }
                Err(e) => {
                    warn!(analyst = %kind, error = %e, "Summary fetch failed, using empty");
                    delta.summaries.push((kind, AnalystSummary::empty()));
                    delta.note_anomaly(format!("{kind} summary unavailable"));
                }
            }
        }
        delta
    }

    /// One retrieval serves both judges; failure degrades to no lessons.
    async fn retrieve_experiences(
        &self,
        session: &SessionState,
    ) -> (Vec<ExperienceRecord>, SessionDelta) {
        let situation = session.situation();
        let mut delta = SessionDelta::default();
        let records = match with_retry(&self.retry, "experience_retrieve", || {
            self.memory
                .retrieve(&self.config.symbol, &situation, self.config.retrieve_k)
        })
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Experience retrieval failed, judging without lessons");
                delta.note_anomaly("experience retrieval unavailable");
                Vec::new()
            }
        };
        (records, delta)
    }

    // -- Debates -----------------------------------------------------------

    /// Drive one debate to its terminal state. Turns are atomic: a failed
    /// generation never mutates the debate.
    async fn run_debate(
        &self,
        session: &SessionState,
        rules: &DebateRules,
    ) -> Result<DebateState, AgoraError> {
        let mut state = DebateState::new(rules);
        let briefing = session.briefing();

        while let Some((index, party)) = state.next_party(rules) {
            let brief = TurnBrief {
                symbol: session.symbol.clone(),
                trade_date: session.trade_date,
                role: party.role.clone(),
                directive: party.directive.clone(),
                briefing: briefing.clone(),
                transcript: state.transcript_text(rules),
            };
            let statement =
                with_retry(&self.retry, &format!("{}_turn", rules.kind), || {
                    self.llm.argue(&brief)
                })
                .await?;
            state.advance(rules, index, statement)?;
        }
        debug!(kind = %rules.kind, turns = state.round_counter(), "Debate terminal");
        Ok(state)
    }

    /// Invoke the judge over a terminal debate and write its verdict.
    async fn adjudicate(
        &self,
        session: &SessionState,
        rules: &DebateRules,
        state: &mut DebateState,
        judge: JudgeRole,
        experiences: &[ExperienceRecord],
        prior_plan: Option<String>,
    ) -> Result<String, AgoraError> {
        let brief = JudgeBrief {
            judge,
            symbol: session.symbol.clone(),
            trade_date: session.trade_date,
            briefing: session.briefing(),
            transcript: state.transcript_text(rules),
            experiences: experiences.to_vec(),
            prior_plan,
        };
        let verdict = with_retry(&self.retry, &format!("{judge}_judge"), || {
            self.llm.adjudicate(&brief)
        })
        .await?;
        state.finalize(rules, verdict.clone())?;
        Ok(verdict)
    }

    async fn investment_stage(
        &self,
        session: &SessionState,
        experiences: &[ExperienceRecord],
    ) -> SessionDelta {
        let rules = DebateRules::investment(self.config.investment_rounds);
        let mut delta = SessionDelta::default();

        let decision = match self.run_debate(session, &rules).await {
            Ok(mut state) => {
                match self
                    .adjudicate(
                        session,
                        &rules,
                        &mut state,
                        JudgeRole::Investment,
                        experiences,
                        None,
                    )
                    .await
                {
                    Ok(verdict) => parse_investment_verdict(&verdict),
                    Err(e) => {
                        error!(error = %e, "Investment judge failed, defaulting to HOLD");
                        delta.note_anomaly("investment judge unavailable");
                        hold_investment("investment judge unavailable")
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Investment debate failed, defaulting to HOLD");
                delta.note_anomaly("investment debate incomplete");
                hold_investment("investment debate incomplete")
            }
        };

        info!(
            action = %decision.action,
            strategy = %decision.strategy,
            "Investment decision"
        );
        delta.investment = Some(decision);
        delta
    }

    async fn risk_stage(
        &self,
        session: &SessionState,
        experiences: &[ExperienceRecord],
    ) -> SessionDelta {
        let rules = DebateRules::risk(self.config.risk_rounds);
        let mut delta = SessionDelta::default();

        let investment = session.investment.clone().unwrap_or_else(|| {
            // Reachable only if the orchestrator skipped the investment
            // stage, which it never does; still, degrade rather than panic.
            hold_investment("no investment decision")
        });
        let fallback_action = investment.action;

        let decision = match self.run_debate(session, &rules).await {
            Ok(mut state) => {
                match self
                    .adjudicate(
                        session,
                        &rules,
                        &mut state,
                        JudgeRole::Risk,
                        experiences,
                        Some(investment.verdict.clone()),
                    )
                    .await
                {
                    Ok(verdict) => parse_risk_verdict(&verdict, fallback_action),
                    Err(e) => {
                        error!(error = %e, "Risk judge failed, defaulting to HOLD");
                        delta.note_anomaly("risk judge unavailable");
                        hold_risk("risk judge unavailable")
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Risk debate failed, defaulting to HOLD");
                delta.note_anomaly("risk debate incomplete");
                hold_risk("risk debate incomplete")
            }
        };

        info!(
            action = %decision.action,
            positioning = %decision.positioning,
            regime = %decision.regime,
            "Risk decision"
        );
        delta.risk = Some(decision);
        delta
    }

    // -- Execution ---------------------------------------------------------

    /// Turn the risk decision into ledger mutations at the open price.
    /// No price, no trade: the day degrades to an anomalous hold.
    async fn execution_stage(
        &self,
        session: &SessionState,
        ledger: &mut PortfolioLedger,
    ) -> SessionDelta {
        let mut delta = SessionDelta::default().with_phase(SessionPhase::MarketOpen);
        delta.timestamp = Some(Utc::now());

        let Some(risk) = session.risk.as_ref() else {
            delta.note_anomaly("no risk decision at execution");
            return delta;
        };
        if risk.action == TradeAction::Hold {
            debug!("Holding, no ledger mutation");
            return delta;
        }

        let symbol = &self.config.symbol;
        let open = match with_retry(&self.retry, "open_price", || {
            self.prices
                .get_price(symbol, session.trade_date, PriceKind::Open)
        })
        .await
        {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(%symbol, "No open price, skipping execution");
                delta.note_anomaly("no open price, order skipped");
                return delta;
            }
            Err(e) => {
                warn!(%symbol, error = %e, "Open price lookup failed, skipping execution");
                delta.note_anomaly("open price unavailable, order skipped");
                return delta;
            }
        };

        match (risk.action, risk.positioning) {
            (TradeAction::Buy, Positioning::Empty) => {
                warn!("Buy with empty positioning, treating as hold");
                delta.note_anomaly("contradictory buy/empty plan, no order");
            }
            (TradeAction::Buy, positioning) => {
                let spend = match positioning {
                    Positioning::Full => ledger.cash(),
                    _ => ledger.cash() / dec!(2),
                };
                let strategy = session
                    .investment
                    .as_ref()
                    .map(|i| i.strategy.as_str())
                    .unwrap_or("unspecified");
                let filled = ledger.execute_buy(
                    symbol,
                    open,
                    BuySize::Amount(spend),
                    session.trade_date,
                    strategy,
                );
                if filled {
                    // Protective levels are fractions of the entry price.
                    let stop = risk.stop_loss_frac.map(|f| f * open);
                    let take = risk.take_profit_frac.map(|f| f * open);
                    ledger.set_protection(symbol, stop, take);
                    info!(%symbol, price = %open, %spend, "Buy filled");
                } else {
                    warn!(%symbol, "Buy rejected by ledger");
                    delta.note_anomaly("buy order rejected (no cash)");
                }
            }
            (TradeAction::Sell, positioning) => {
                let shares = match (positioning, ledger.position(symbol)) {
                    (Positioning::Partial, Some(position)) => Some(position.shares / dec!(2)),
                    _ => None, // full exit
                };
                if ledger.execute_sell(symbol, open, shares, session.trade_date) {
                    info!(%symbol, price = %open, "Sell filled");
                } else {
                    debug!(%symbol, "Sell with nothing held, no-op");
                    delta.note_anomaly("sell order with no position");
                }
            }
            (TradeAction::Hold, _) => unreachable!("hold handled above"),
        }
        delta
    }

    // -- Valuation ---------------------------------------------------------

    async fn valuation_stage(
        &self,
        session: &SessionState,
        ledger: &mut PortfolioLedger,
        tracker: &mut PerformanceTracker,
    ) -> (PortfolioState, DailyStats, SessionDelta) {
        let mut delta = SessionDelta::default().with_phase(SessionPhase::PostClose);

        let held: Vec<String> = ledger
            .trades()
            .iter()
            .map(|t| t.symbol.clone())
            .chain(std::iter::once(self.config.symbol.clone()))
            .filter(|s| ledger.has_position(s))
            .collect();

        let mut closes: HashMap<String, Decimal> = HashMap::new();
        for symbol in held {
            if closes.contains_key(&symbol) {
                continue;
            }
            match with_retry(&self.retry, "close_price", || {
                self.prices
                    .get_price(&symbol, session.trade_date, PriceKind::Close)
            })
            .await
            {
                Ok(Some(price)) => {
                    closes.insert(symbol, price);
                }
                Ok(None) => debug!(%symbol, "No close price, keeping last known"),
                Err(e) => warn!(%symbol, error = %e, "Close lookup failed, keeping last known"),
            }
        }

        let portfolio = ledger.revalue(&closes);
        for symbol in &portfolio.failed {
            delta.note_anomaly(format!("stale valuation for {symbol}"));
        }
        let stats = tracker.record(session.trade_date, portfolio.total_value);

        // The report states the posture the book actually ended with.
        let positioning = if !ledger.has_position(&self.config.symbol) {
            Positioning::Empty
        } else if portfolio.cash < portfolio.total_value * FULL_POSTURE_CASH_FRAC {
            Positioning::Full
        } else {
            Positioning::Partial
        };

        let risk = session.risk.clone().unwrap_or_else(|| hold_risk("no risk decision"));
        let report = ExecutionReport {
            date: session.trade_date,
            symbol: self.config.symbol.clone(),
            market_regime: risk.regime,
            selected_strategy: session
                .investment
                .as_ref()
                .map(|i| i.strategy.clone())
                .unwrap_or_else(|| "unspecified".into()),
            expected_behavior: risk.expected_behavior,
            actual_return: stats.daily_return,
            actual_max_drawdown: stats.max_drawdown,
            positioning,
            anomaly: session.anomaly_note().map(|note| {
                // Include degradations noted during this stage as well.
                let mut notes = vec![note];
                notes.extend(delta.anomalies.iter().cloned());
                notes.join("; ")
            }).or_else(|| {
                if delta.anomalies.is_empty() {
                    None
                } else {
                    Some(delta.anomalies.join("; "))
                }
            }),
        };
        delta.execution = Some(report);

        (portfolio, stats, delta)
    }

    // -- Reflection --------------------------------------------------------

    /// Distill the closed window into lessons and persist them. The
    /// window is drained regardless of outcome; a missed reflection is
    /// logged, never retried across days.
    async fn reflection_stage(&self, window: &mut ReflectionWindow) -> SessionDelta {
        let mut delta = SessionDelta::default();
        let (Some(start), Some(end)) = (window.start_date(), window.end_date()) else {
            return delta;
        };
        let digest = window.digest();
        let scope = window.scope;
        window.take();

        let brief = ReflectionBrief {
            symbol: self.config.symbol.clone(),
            scope,
            start_date: start,
            end_date: end,
            reports_digest: digest,
        };

        match with_retry(&self.retry, "reflection", || self.llm.reflect(&brief)).await {
            Ok(text) => {
                let reflection =
                    parse_reflection(&text, &self.config.symbol, scope, start, end);
                if reflection.is_empty() {
                    warn!(%start, %end, "Reflection produced no lessons");
                } else if self.memory.record(&reflection).await {
                    info!(%start, %end, lessons = reflection.lessons().len(), "Reflection recorded");
                } else {
                    warn!(%start, %end, "Reflection could not be persisted");
                    delta.note_anomaly("reflection not persisted");
                }
                delta.reflection = Some(reflection);
            }
            Err(e) => {
                error!(error = %e, %start, %end, "Reflection generation failed");
                delta.note_anomaly("reflection generation failed");
            }
        }
        delta
    }
}

fn hold_investment(reason: &str) -> InvestmentDecision {
    InvestmentDecision {
        action: TradeAction::Hold,
        strategy: "none".into(),
        rationale: reason.into(),
        verdict: String::new(),
    }
}

fn hold_risk(reason: &str) -> RiskDecision {
    RiskDecision {
        action: TradeAction::Hold,
        positioning: Positioning::Empty,
        stop_loss_frac: None,
        take_profit_frac: None,
        regime: "unknown".into(),
        expected_behavior: String::new(),
        rationale: reason.into(),
        verdict: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
