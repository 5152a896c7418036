//! Market data and analyst report providers.
//!
//! Defines the provider traits the engine is wired with. The replay feed
//! (JSON fixtures) implements both; a live feed would slot in the same way.

pub mod replay;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AgoraError, AnalystKind, AnalystSummary, SessionPhase};

/// Which intraday price a lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceKind {
    Open,
    Close,
}

impl fmt::Display for PriceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceKind::Open => write!(f, "open"),
            PriceKind::Close => write!(f, "close"),
        }
    }
}

/// One day of price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub close: Decimal,
}

/// Source of condensed analyst reports.
///
/// Implementors return empty summaries, never an error, when no data exists
/// for the requested day; errors are reserved for connectivity and parse
/// failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn get_summary(
        &self,
        analyst: AnalystKind,
        symbol: &str,
        trade_date: NaiveDate,
        phase: SessionPhase,
    ) -> Result<AnalystSummary, AgoraError>;
}

/// Source of daily prices.
///
/// `None` means no price exists for that day; callers skip the affected
/// update rather than fail the cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_price(
        &self,
        symbol: &str,
        date: NaiveDate,
        kind: PriceKind,
    ) -> Result<Option<Decimal>, AgoraError>;

    /// Ordered bars within `[start, end]`, inclusive.
    async fn load_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, AgoraError>;
}
