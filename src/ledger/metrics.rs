//! Run-level performance statistics over daily valuation snapshots.
//!
//! The tracker owns the sequence of `total_value` snapshots; daily return
//! and max drawdown are derived here, not in the ledger, so the ledger
//! stays a pure book of record.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Annualization for daily returns (√252 convention).
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Statistics for one recorded day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub daily_return: f64,
    /// Max observed peak-to-trough decline to date, as a positive fraction.
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceTracker {
    initial_value: Decimal,
    history: Vec<(NaiveDate, Decimal)>,
    daily_returns: Vec<f64>,
    peak: Decimal,
    max_drawdown: f64,
}

impl PerformanceTracker {
    pub fn new(initial_value: Decimal) -> Self {
        Self {
            initial_value,
            history: Vec::new(),
            daily_returns: Vec::new(),
            peak: initial_value,
            max_drawdown: 0.0,
        }
    }

    /// Record one end-of-day valuation and return that day's stats.
    pub fn record(&mut self, date: NaiveDate, total_value: Decimal) -> DailyStats {
        let previous = self
            .history
            .last()
            .map(|(_, value)| *value)
            .unwrap_or(self.initial_value);

        let daily_return = if previous.is_zero() {
            0.0
        } else {
            (total_value / previous - Decimal::ONE)
                .to_f64()
                .unwrap_or(0.0)
        };

        if total_value > self.peak {
            self.peak = total_value;
        }
        if self.peak > Decimal::ZERO {
            let drawdown = (Decimal::ONE - total_value / self.peak)
                .to_f64()
                .unwrap_or(0.0);
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }

        self.history.push((date, total_value));
        self.daily_returns.push(daily_return);

        DailyStats {
            daily_return,
            max_drawdown: self.max_drawdown,
        }
    }

    pub fn days_recorded(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[(NaiveDate, Decimal)] {
        &self.history
    }

    pub fn latest_value(&self) -> Decimal {
        self.history
            .last()
            .map(|(_, value)| *value)
            .unwrap_or(self.initial_value)
    }

    pub fn peak(&self) -> Decimal {
        self.peak
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_value.is_zero() {
            return 0.0;
        }
        (self.latest_value() / self.initial_value - Decimal::ONE)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Annualized Sharpe ratio over the recorded daily returns (zero
    /// risk-free rate). Zero until two days exist or when returns are
    /// constant.
    pub fn sharpe(&self) -> f64 {
        let returns = &self.daily_returns;
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();
        if std_dev < 1e-12 {
            return 0.0;
        }
        (mean / std_dev) * TRADING_DAYS_PER_YEAR.sqrt()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
