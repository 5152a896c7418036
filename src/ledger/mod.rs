//! Portfolio ledger — the authoritative record of cash, positions, and
//! trades for one run.
//!
//! The ledger is mutated only through `execute_buy`, `execute_sell`,
//! `rebalance`, and `revalue`. Invariant violations (selling what is not
//! held, buying with no cash) are reported as `false` returns, never as
//! errors; callers check and log. Orders are size-clamped so cash never
//! goes negative and sells never exceed the held share count.

pub mod metrics;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Positions and trades
// ---------------------------------------------------------------------------

/// One open holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub shares: Decimal,
    /// Weighted-average entry price across all fills.
    pub avg_price: Decimal,
    pub entry_date: NaiveDate,
    pub current_price: Decimal,
    /// Absolute protective levels, set from the risk judge's fractions.
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub strategy: String,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.shares * self.current_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.avg_price) * self.shares
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        if self.avg_price.is_zero() {
            return 0.0;
        }
        ((self.current_price - self.avg_price) / self.avg_price)
            .to_f64()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Append-only record of one executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub symbol: String,
    pub side: TradeSide,
    pub shares: Decimal,
    pub price: Decimal,
    /// Cash moved: debit for buys, credit for sells.
    pub value: Decimal,
}

/// Order size for a buy: a cash amount to spend or an exact share count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuySize {
    Amount(Decimal),
    Shares(Decimal),
}

/// One step of a rebalance, for upstream logging.
#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceAction {
    Sold { symbol: String, shares: Decimal, price: Decimal },
    Bought { symbol: String, shares: Decimal, price: Decimal },
    Skipped { symbol: String, reason: String },
}

// ---------------------------------------------------------------------------
// Valuation snapshot
// ---------------------------------------------------------------------------

/// Read-only view of the book after a revaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub total_value: Decimal,
    /// `total_value / initial_capital - 1`.
    pub total_return: f64,
    pub positions: Vec<Position>,
    /// Symbols whose price lookup failed; they keep their last known
    /// price and stay in the book.
    pub failed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioLedger {
    cash: Decimal,
    initial_capital: Decimal,
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
    /// Target allocation set by the most recent rebalance.
    targets: Vec<String>,
}

impl PortfolioLedger {
    /// Fresh ledger; created once per run, shared across all its days.
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn positions_value(&self) -> Decimal {
        self.positions.values().map(|p| p.market_value()).sum()
    }

    pub fn total_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    pub fn total_return(&self) -> f64 {
        if self.initial_capital.is_zero() {
            return 0.0;
        }
        (self.total_value() / self.initial_capital - Decimal::ONE)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Buy `symbol` at `price`. Spend is clamped to available cash; a
    /// clamped order of zero shares is a no-op returning `false`.
    pub fn execute_buy(
        &mut self,
        symbol: &str,
        price: Decimal,
        size: BuySize,
        date: NaiveDate,
        strategy: &str,
    ) -> bool {
        if price <= Decimal::ZERO {
            warn!(symbol, %price, "Buy rejected: non-positive price");
            return false;
        }

        let requested_cost = match size {
            BuySize::Amount(amount) => amount,
            BuySize::Shares(shares) => shares * price,
        };
        let spend = requested_cost.min(self.cash);
        if spend <= Decimal::ZERO {
            debug!(symbol, "Buy is a no-op: no cash to commit");
            return false;
        }
        let shares = spend / price;

        self.cash -= spend;
        match self.positions.get_mut(symbol) {
            Some(position) => {
                // Weighted-average merge of the new fill into the position.
                let old_cost = position.avg_price * position.shares;
                let total_shares = position.shares + shares;
                position.avg_price = (old_cost + spend) / total_shares;
                position.shares = total_shares;
                position.current_price = price;
            }
            None => {
                self.positions.insert(
                    symbol.to_string(),
                    Position {
                        symbol: symbol.to_string(),
                        shares,
                        avg_price: price,
                        entry_date: date,
                        current_price: price,
                        stop_loss: None,
                        take_profit: None,
                        strategy: strategy.to_string(),
                    },
                );
            }
        }

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            date,
            symbol: symbol.to_string(),
            side: TradeSide::Buy,
            shares,
            price,
            value: spend,
        });
        debug!(symbol, %shares, %price, cash = %self.cash, "Buy executed");
        true
    }

    /// Sell `shares` of `symbol` at `price` (`None` = full position).
    /// Clamped to held shares; the position is removed when none remain.
    pub fn execute_sell(
        &mut self,
        symbol: &str,
        price: Decimal,
        shares: Option<Decimal>,
        date: NaiveDate,
    ) -> bool {
        if price <= Decimal::ZERO {
            warn!(symbol, %price, "Sell rejected: non-positive price");
            return false;
        }
        let Some(position) = self.positions.get_mut(symbol) else {
            warn!(symbol, "Sell rejected: no position held");
            return false;
        };

        let requested = shares.unwrap_or(position.shares);
        if requested <= Decimal::ZERO {
            warn!(symbol, %requested, "Sell rejected: non-positive share count");
            return false;
        }
        let sold = requested.min(position.shares);

        self.cash += sold * price;
        position.shares -= sold;
        position.current_price = price;
        if position.shares <= Decimal::ZERO {
            self.positions.remove(symbol);
        }

        self.trades.push(TradeRecord {
            id: Uuid::new_v4(),
            date,
            symbol: symbol.to_string(),
            side: TradeSide::Sell,
            shares: sold,
            price,
            value: sold * price,
        });
        debug!(symbol, %sold, %price, cash = %self.cash, "Sell executed");
        true
    }

    /// Set absolute protective levels on a held position. `false` when the
    /// symbol is not held.
    pub fn set_protection(
        &mut self,
        symbol: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> bool {
        match self.positions.get_mut(symbol) {
            Some(position) => {
                position.stop_loss = stop_loss;
                position.take_profit = take_profit;
                true
            }
            None => false,
        }
    }

    /// Replace the held symbol set with `targets`: sell every held symbol
    /// not in the target list, then buy every missing target at an
    /// equal-weight amount. Symbols without a supplied price are skipped
    /// and reported, never fatal.
    pub fn rebalance(
        &mut self,
        targets: &[String],
        prices: &HashMap<String, Decimal>,
        date: NaiveDate,
    ) -> Vec<RebalanceAction> {
        let mut actions = Vec::new();
        self.targets = targets.to_vec();

        // Sell leg: everything held that is no longer wanted.
        let to_sell: Vec<String> = self
            .positions
            .keys()
            .filter(|held| !targets.contains(held))
            .cloned()
            .collect();
        for symbol in to_sell {
            match prices.get(&symbol) {
                Some(&price) => {
                    let shares = self.positions[&symbol].shares;
                    if self.execute_sell(&symbol, price, None, date) {
                        actions.push(RebalanceAction::Sold { symbol, shares, price });
                    }
                }
                None => actions.push(RebalanceAction::Skipped {
                    symbol,
                    reason: "no price for sell leg".into(),
                }),
            }
        }

        // Buy leg: equal weight over the full target list, valued after
        // the sell leg so freed cash is redeployed.
        if targets.is_empty() {
            return actions;
        }
        let target_amount = self.total_value() / Decimal::from(targets.len());
        for symbol in targets {
            if self.has_position(symbol) {
                continue;
            }
            match prices.get(symbol) {
                Some(&price) => {
                    if self.execute_buy(symbol, price, BuySize::Amount(target_amount), date, "rebalance") {
                        let shares = self.positions[symbol].shares;
                        actions.push(RebalanceAction::Bought {
                            symbol: symbol.clone(),
                            shares,
                            price,
                        });
                    }
                }
                None => actions.push(RebalanceAction::Skipped {
                    symbol: symbol.clone(),
                    reason: "no price for buy leg".into(),
                }),
            }
        }
        actions
    }

    /// Mark every held position to the supplied closes. A symbol missing
    /// from `prices` keeps its last known price and is flagged, never
    /// removed. Calling twice with the same prices yields the same state.
    pub fn revalue(&mut self, prices: &HashMap<String, Decimal>) -> PortfolioState {
        let mut failed = Vec::new();
        for (symbol, position) in &mut self.positions {
            match prices.get(symbol) {
                Some(&price) => position.current_price = price,
                None => failed.push(symbol.clone()),
            }
        }
        failed.sort();

        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        PortfolioState {
            cash: self.cash,
            positions_value: self.positions_value(),
            total_value: self.total_value(),
            total_return: self.total_return(),
            positions,
            failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn d1() -> NaiveDate {
        date(2024, 1, 2)
    }

    fn assert_book_invariant(ledger: &PortfolioLedger) {
        assert!(ledger.cash() >= Decimal::ZERO, "cash went negative");
        assert_eq!(
            ledger.total_value(),
            ledger.cash() + ledger.positions_value(),
        );
    }

    #[test]
    fn test_scenario_a_buy_by_amount() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        assert!(ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(50000)), d1(), "momentum"));

        let position = ledger.position("AAA").unwrap();
        assert_eq!(position.shares, dec!(500));
        assert_eq!(position.avg_price, dec!(100));
        assert_eq!(ledger.cash(), dec!(50000));
        assert_eq!(ledger.trades().len(), 1);
        assert_eq!(ledger.trades()[0].side, TradeSide::Buy);
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_scenario_b_partial_sell_keeps_avg_price() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(50000)), d1(), "momentum");

        assert!(ledger.execute_sell("AAA", dec!(110), Some(dec!(200)), d1()));
        assert_eq!(ledger.cash(), dec!(72000));
        let position = ledger.position("AAA").unwrap();
        assert_eq!(position.shares, dec!(300));
        assert_eq!(position.avg_price, dec!(100));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_scenario_d_sell_unheld_is_noop_false() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        assert!(!ledger.execute_sell("GHOST", dec!(50), None, d1()));
        assert_eq!(ledger.cash(), dec!(100000));
        assert_eq!(ledger.position_count(), 0);
        assert!(ledger.trades().is_empty());
    }

    #[test]
    fn test_scenario_e_rebalance_without_price_skips() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        let actions = ledger.rebalance(&["BBB".to_string()], &HashMap::new(), d1());

        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            RebalanceAction::Skipped { symbol, .. } if symbol == "BBB"
        ));
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.cash(), dec!(100000));
    }

    #[test]
    fn test_buy_clamps_to_available_cash() {
        let mut ledger = PortfolioLedger::new(dec!(10000));
        assert!(ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(50000)), d1(), "s"));
        assert_eq!(ledger.cash(), Decimal::ZERO);
        assert_eq!(ledger.position("AAA").unwrap().shares, dec!(100));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_buy_shares_monotonic_in_amount() {
        // Resulting shares never decrease as the requested amount grows,
        // including past the clamp point.
        let amounts = [dec!(1000), dec!(5000), dec!(10000), dec!(20000), dec!(50000)];
        let mut previous = Decimal::ZERO;
        for amount in amounts {
            let mut ledger = PortfolioLedger::new(dec!(10000));
            ledger.execute_buy("AAA", dec!(100), BuySize::Amount(amount), d1(), "s");
            let shares = ledger.position("AAA").map(|p| p.shares).unwrap_or_default();
            assert!(shares >= previous, "shares shrank at amount {amount}");
            previous = shares;
        }
    }

    #[test]
    fn test_buy_with_no_cash_is_noop_false() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(1000)), d1(), "s");
        assert_eq!(ledger.cash(), Decimal::ZERO);

        assert!(!ledger.execute_buy("BBB", dec!(50), BuySize::Amount(dec!(500)), d1(), "s"));
        assert!(!ledger.has_position("BBB"));
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn test_buy_rejects_nonpositive_price_and_size() {
        let mut ledger = PortfolioLedger::new(dec!(1000));
        assert!(!ledger.execute_buy("AAA", Decimal::ZERO, BuySize::Amount(dec!(100)), d1(), "s"));
        assert!(!ledger.execute_buy("AAA", dec!(10), BuySize::Amount(Decimal::ZERO), d1(), "s"));
        assert!(!ledger.execute_buy("AAA", dec!(10), BuySize::Shares(dec!(-5)), d1(), "s"));
        assert_eq!(ledger.cash(), dec!(1000));
    }

    #[test]
    fn test_buy_merges_with_weighted_average() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(100)), d1(), "s");
        ledger.execute_buy("AAA", dec!(200), BuySize::Shares(dec!(100)), d1(), "s");

        let position = ledger.position("AAA").unwrap();
        assert_eq!(position.shares, dec!(200));
        // (100*100 + 100*200) / 200 = 150
        assert_eq!(position.avg_price, dec!(150));
        assert_eq!(ledger.cash(), dec!(70000));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_sell_clamps_and_removes_closed_position() {
        let mut ledger = PortfolioLedger::new(dec!(10000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(50)), d1(), "s");

        // Request more than held: clamped to the full 50.
        assert!(ledger.execute_sell("AAA", dec!(100), Some(dec!(999)), d1()));
        assert!(!ledger.has_position("AAA"));
        assert_eq!(ledger.cash(), dec!(10000));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_sell_default_is_full_position() {
        let mut ledger = PortfolioLedger::new(dec!(10000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(50)), d1(), "s");
        assert!(ledger.execute_sell("AAA", dec!(120), None, d1()));
        assert!(!ledger.has_position("AAA"));
        assert_eq!(ledger.cash(), dec!(11000));
    }

    #[test]
    fn test_sell_shares_is_max_of_zero_and_difference() {
        let mut ledger = PortfolioLedger::new(dec!(10000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(50)), d1(), "s");
        ledger.execute_sell("AAA", dec!(100), Some(dec!(20)), d1());
        assert_eq!(ledger.position("AAA").unwrap().shares, dec!(30));

        ledger.execute_sell("AAA", dec!(100), Some(dec!(30)), d1());
        // Symbol absent iff remaining shares are zero.
        assert!(ledger.position("AAA").is_none());
    }

    #[test]
    fn test_rebalance_swaps_held_set() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("OLD", dec!(50), BuySize::Amount(dec!(40000)), d1(), "s");

        let prices = HashMap::from([
            ("OLD".to_string(), dec!(55)),
            ("NEW".to_string(), dec!(20)),
        ]);
        let actions = ledger.rebalance(&["NEW".to_string()], &prices, d1());

        assert!(!ledger.has_position("OLD"));
        assert!(ledger.has_position("NEW"));
        assert!(actions.iter().any(|a| matches!(a, RebalanceAction::Sold { symbol, .. } if symbol == "OLD")));
        assert!(actions.iter().any(|a| matches!(a, RebalanceAction::Bought { symbol, .. } if symbol == "NEW")));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_rebalance_equal_weight_across_targets() {
        let mut ledger = PortfolioLedger::new(dec!(90000));
        let prices = HashMap::from([
            ("AAA".to_string(), dec!(10)),
            ("BBB".to_string(), dec!(30)),
            ("CCC".to_string(), dec!(100)),
        ]);
        let targets = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];
        ledger.rebalance(&targets, &prices, d1());

        // 30,000 per target at the quoted prices.
        assert_eq!(ledger.position("AAA").unwrap().shares, dec!(3000));
        assert_eq!(ledger.position("BBB").unwrap().shares, dec!(1000));
        assert_eq!(ledger.position("CCC").unwrap().shares, dec!(300));
        assert_book_invariant(&ledger);
    }

    #[test]
    fn test_rebalance_is_idempotent_round_trip() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        let prices = HashMap::from([
            ("AAA".to_string(), dec!(25)),
            ("BBB".to_string(), dec!(50)),
        ]);
        let targets = vec!["AAA".to_string(), "BBB".to_string()];

        let first = ledger.rebalance(&targets, &prices, d1());
        let trades_after_first = ledger.trades().len();
        let second = ledger.rebalance(&targets, &prices, d1());

        assert!(!first.is_empty());
        assert!(second.is_empty(), "second rebalance generated actions: {second:?}");
        assert_eq!(ledger.trades().len(), trades_after_first);
    }

    #[test]
    fn test_revalue_marks_prices_and_flags_failures() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(100)), d1(), "s");
        ledger.execute_buy("BBB", dec!(50), BuySize::Shares(dec!(100)), d1(), "s");

        let prices = HashMap::from([("AAA".to_string(), dec!(110))]);
        let state = ledger.revalue(&prices);

        assert_eq!(state.failed, vec!["BBB".to_string()]);
        assert_eq!(state.positions.len(), 2);
        // AAA marked to 110; BBB keeps its last known price.
        let aaa = state.positions.iter().find(|p| p.symbol == "AAA").unwrap();
        let bbb = state.positions.iter().find(|p| p.symbol == "BBB").unwrap();
        assert_eq!(aaa.current_price, dec!(110));
        assert_eq!(bbb.current_price, dec!(50));
        assert_eq!(state.total_value, state.cash + state.positions_value);
    }

    #[test]
    fn test_revalue_twice_is_identical() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(200)), d1(), "s");

        let prices = HashMap::from([("AAA".to_string(), dec!(95))]);
        let first = ledger.revalue(&prices);
        let second = ledger.revalue(&prices);
        assert_eq!(first, second);
    }

    #[test]
    fn test_total_return_tracks_valuation() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(100000)), d1(), "s");

        let state = ledger.revalue(&HashMap::from([("AAA".to_string(), dec!(110))]));
        assert!((state.total_return - 0.10).abs() < 1e-9);

        let state = ledger.revalue(&HashMap::from([("AAA".to_string(), dec!(90))]));
        assert!((state.total_return + 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_set_protection_requires_position() {
        let mut ledger = PortfolioLedger::new(dec!(10000));
        assert!(!ledger.set_protection("AAA", Some(dec!(92)), None));

        ledger.execute_buy("AAA", dec!(100), BuySize::Shares(dec!(10)), d1(), "s");
        assert!(ledger.set_protection("AAA", Some(dec!(92)), Some(dec!(115))));
        let position = ledger.position("AAA").unwrap();
        assert_eq!(position.stop_loss, Some(dec!(92)));
        assert_eq!(position.take_profit, Some(dec!(115)));
    }

    #[test]
    fn test_position_pnl_math() {
        let position = Position {
            symbol: "AAA".into(),
            shares: dec!(100),
            avg_price: dec!(50),
            entry_date: d1(),
            current_price: dec!(55),
            stop_loss: None,
            take_profit: None,
            strategy: "s".into(),
        };
        assert_eq!(position.market_value(), dec!(5500));
        assert_eq!(position.unrealized_pnl(), dec!(500));
        assert!((position.unrealized_pnl_pct() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_roundtrip_serialization() {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAA", dec!(100), BuySize::Amount(dec!(30000)), d1(), "momentum");
        ledger.set_protection("AAA", Some(dec!(92)), None);

        let json = serde_json::to_string(&ledger).unwrap();
        let back: PortfolioLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cash(), ledger.cash());
        assert_eq!(back.position("AAA"), ledger.position("AAA"));
        assert_eq!(back.trades().len(), 1);
    }
}
