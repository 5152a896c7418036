//! Replay feed: fixture-backed providers for paper runs and tests.
//!
//! The fixture is one JSON document with per-symbol daily bars and
//! per-analyst dated summaries. Missing entries degrade per the provider
//! contracts: empty summaries, `None` prices.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DailyBar, PriceKind, PriceProvider, SummaryProvider};
use crate::types::{AgoraError, AnalystKind, AnalystSummary, SessionPhase};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// On-disk shape of a replay fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// symbol → daily bars (any order; the feed sorts).
    #[serde(default)]
    pub prices: HashMap<String, Vec<DailyBar>>,
    /// analyst kind ("market" | "news" | "sentiment" | "fundamentals")
    /// → trade date → summary.
    #[serde(default)]
    pub summaries: HashMap<String, HashMap<NaiveDate, AnalystSummary>>,
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Fixture-backed implementation of both provider traits.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    fixture: ReplayFixture,
}

impl ReplayFeed {
    pub fn new(fixture: ReplayFixture) -> Self {
        Self { fixture }
    }

    /// Load a fixture file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgoraError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AgoraError::Data {
            provider: "replay".into(),
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let fixture: ReplayFixture = serde_json::from_str(&raw).map_err(|e| AgoraError::Data {
            provider: "replay".into(),
            message: format!("failed to parse {}: {e}", path.display()),
        })?;
        Ok(Self::new(fixture))
    }

    /// Trading days available for `symbol` within `[start, end]`, ordered.
    pub fn trading_days(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .fixture
            .prices
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .map(|b| b.date)
                    .filter(|d| *d >= start && *d <= end)
                    .collect()
            })
            .unwrap_or_default();
        days.sort();
        days.dedup();
        days
    }

    fn bar(&self, symbol: &str, date: NaiveDate) -> Option<&DailyBar> {
        self.fixture
            .prices
            .get(symbol)
            .and_then(|bars| bars.iter().find(|b| b.date == date))
    }
}

#[async_trait]
impl PriceProvider for ReplayFeed {
    async fn get_price(
        &self,
        symbol: &str,
        date: NaiveDate,
        kind: PriceKind,
    ) -> Result<Option<Decimal>, AgoraError> {
        Ok(self.bar(symbol, date).map(|b| match kind {
            PriceKind::Open => b.open,
            PriceKind::Close => b.close,
        }))
    }

    async fn load_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, AgoraError> {
        let mut bars: Vec<DailyBar> = self
            .fixture
            .prices
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

#[async_trait]
impl SummaryProvider for ReplayFeed {
    async fn get_summary(
        &self,
        analyst: AnalystKind,
        _symbol: &str,
        trade_date: NaiveDate,
        _phase: SessionPhase,
    ) -> Result<AnalystSummary, AgoraError> {
        Ok(self
            .fixture
            .summaries
            .get(analyst.as_str())
            .and_then(|by_date| by_date.get(&trade_date))
            .cloned()
            .unwrap_or_else(AnalystSummary::empty))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
