//! Judge synthesis: labeled-verdict parsing into typed decisions.
//!
//! Both judges answer with a free-form rationale followed by labeled lines
//! (`ACTION:`, `POSITION:`, ...) pinned by the prompt. Parsing is lenient:
//! a missing or malformed label degrades to a safe default (HOLD, no
//! protective levels) rather than failing the day. The verdict text is
//! preserved verbatim on the decision for the downstream risk judge and
//! the session record.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::types::{InvestmentDecision, Positioning, RiskDecision, TradeAction};

/// Value of the last occurrence of `LABEL:` at a line start, if any.
fn extract_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let mut found = None;
    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches(['*', '#', '-', ' ']);
        if let Some(rest) = trimmed
            .strip_prefix(label)
            .and_then(|r| r.trim_start().strip_prefix(':'))
        {
            let value = rest.trim().trim_matches('*').trim();
            if !value.is_empty() {
                found = Some(value);
            }
        }
    }
    found
}

/// Parse a fraction-of-entry-price level; `NONE` and junk both map to
/// `None`, out-of-band values are dropped with a warning.
fn parse_level(text: &str, label: &str, below_entry: bool) -> Option<Decimal> {
    let raw = extract_label(text, label)?;
    if raw.eq_ignore_ascii_case("none") {
        return None;
    }
    let Ok(frac) = Decimal::from_str(raw.trim_end_matches('%')) else {
        warn!(label, raw, "Unparseable protective level in verdict");
        return None;
    };
    // A stop must sit below entry, a target above; anything else means the
    // model answered in the wrong units.
    let plausible = if below_entry {
        frac > Decimal::ZERO && frac < Decimal::ONE
    } else {
        frac > Decimal::ONE && frac < Decimal::from(10)
    };
    if !plausible {
        warn!(label, %frac, "Implausible protective level dropped");
        return None;
    }
    Some(frac)
}

/// Parse the investment judge's verdict. Falls back to HOLD when the
/// action label is missing or unreadable.
pub fn parse_investment_verdict(verdict: &str) -> InvestmentDecision {
    let action = extract_label(verdict, "ACTION")
        .and_then(|raw| raw.split_whitespace().next())
        .and_then(|word| TradeAction::from_str(word).ok())
        .unwrap_or_else(|| {
            warn!("Investment verdict missing ACTION label, defaulting to HOLD");
            TradeAction::Hold
        });

    let strategy = extract_label(verdict, "STRATEGY")
        .unwrap_or("unspecified")
        .to_string();

    let rationale = extract_label(verdict, "RATIONALE")
        .unwrap_or(verdict.trim())
        .to_string();

    InvestmentDecision {
        action,
        strategy,
        rationale,
        verdict: verdict.to_string(),
    }
}

/// Parse the risk judge's verdict. `fallback_action` is the investment
/// decision's action, used when the risk verdict omits its own.
pub fn parse_risk_verdict(verdict: &str, fallback_action: TradeAction) -> RiskDecision {
    let action = extract_label(verdict, "ACTION")
        .and_then(|raw| raw.split_whitespace().next())
        .and_then(|word| TradeAction::from_str(word).ok())
        .unwrap_or_else(|| {
            warn!("Risk verdict missing ACTION label, falling back to investment action");
            fallback_action
        });

    let positioning = extract_label(verdict, "POSITION")
        .and_then(|raw| raw.split_whitespace().next())
        .and_then(|word| Positioning::from_str(word).ok())
        .unwrap_or(match action {
            TradeAction::Buy => Positioning::Partial,
            TradeAction::Sell | TradeAction::Hold => Positioning::Empty,
        });

    let stop_loss_frac = parse_level(verdict, "STOP_LOSS", true);
    let take_profit_frac = parse_level(verdict, "TAKE_PROFIT", false);

    let regime = extract_label(verdict, "REGIME")
        .unwrap_or("unclassified")
        .to_string();
    let expected_behavior = extract_label(verdict, "EXPECTED")
        .unwrap_or_default()
        .to_string();
    let rationale = extract_label(verdict, "RATIONALE")
        .unwrap_or(verdict.trim())
        .to_string();

    RiskDecision {
        action,
        positioning,
        stop_loss_frac,
        take_profit_frac,
        regime,
        expected_behavior,
        rationale,
        verdict: verdict.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const INVESTMENT_VERDICT: &str = "\
The advocate's momentum case survived the opponent's valuation attack, \
and breadth has improved since the last pullback.

ACTION: BUY
STRATEGY: momentum continuation
RATIONALE: Trend intact, breadth confirming; the bear case rests on a \
valuation signal that has been early for months.";

    const RISK_VERDICT: &str = "\
The conservative analyst is right that earnings are close, so the plan \
gets a reduced size and a tighter stop.

ACTION: BUY
POSITION: PARTIAL
STOP_LOSS: 0.94
TAKE_PROFIT: 1.12
REGIME: early uptrend
EXPECTED: Grind higher with shallow pullbacks into earnings.
RATIONALE: Upside case intact but event risk justifies half size.";

    #[test]
    fn test_parse_investment_full_verdict() {
        let decision = parse_investment_verdict(INVESTMENT_VERDICT);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.strategy, "momentum continuation");
        assert!(decision.rationale.starts_with("Trend intact"));
        assert_eq!(decision.verdict, INVESTMENT_VERDICT);
    }

    #[test]
    fn test_parse_investment_missing_action_defaults_hold() {
        let decision = parse_investment_verdict("I cannot commit either way today.");
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.strategy, "unspecified");
        // Whole verdict becomes the rationale when no label exists.
        assert!(decision.rationale.contains("cannot commit"));
    }

    #[test]
    fn test_parse_investment_takes_last_action_line() {
        let verdict = "ACTION: SELL\nOn reflection the hedge argument wins.\nACTION: HOLD";
        let decision = parse_investment_verdict(verdict);
        assert_eq!(decision.action, TradeAction::Hold);
    }

    #[test]
    fn test_parse_investment_tolerates_markdown_decoration() {
        let verdict = "**ACTION:** BUY\n- STRATEGY: breakout\nRATIONALE: clean break.";
        let decision = parse_investment_verdict(verdict);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.strategy, "breakout");
    }

    #[test]
    fn test_parse_risk_full_verdict() {
        let decision = parse_risk_verdict(RISK_VERDICT, TradeAction::Hold);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.positioning, Positioning::Partial);
        assert_eq!(decision.stop_loss_frac, Some(dec!(0.94)));
        assert_eq!(decision.take_profit_frac, Some(dec!(1.12)));
        assert_eq!(decision.regime, "early uptrend");
        assert!(decision.expected_behavior.contains("Grind higher"));
    }

    #[test]
    fn test_parse_risk_none_levels() {
        let verdict = "ACTION: HOLD\nPOSITION: EMPTY\nSTOP_LOSS: NONE\n\
                       TAKE_PROFIT: NONE\nREGIME: choppy\nRATIONALE: stand aside.";
        let decision = parse_risk_verdict(verdict, TradeAction::Hold);
        assert_eq!(decision.action, TradeAction::Hold);
        assert_eq!(decision.positioning, Positioning::Empty);
        assert!(decision.stop_loss_frac.is_none());
        assert!(decision.take_profit_frac.is_none());
    }

    #[test]
    fn test_parse_risk_falls_back_to_investment_action() {
        let decision = parse_risk_verdict("The debate settled nothing.", TradeAction::Sell);
        assert_eq!(decision.action, TradeAction::Sell);
        assert_eq!(decision.positioning, Positioning::Empty);
        assert_eq!(decision.regime, "unclassified");
    }

    #[test]
    fn test_parse_risk_default_positioning_for_buy() {
        let decision = parse_risk_verdict("ACTION: BUY\nRATIONALE: size not stated.", TradeAction::Hold);
        assert_eq!(decision.action, TradeAction::Buy);
        // A buy with no stated size defaults to half, not all-in.
        assert_eq!(decision.positioning, Positioning::Partial);
    }

    #[test]
    fn test_implausible_levels_are_dropped() {
        // A stop above entry and a target below entry are wrong-units answers.
        let verdict = "ACTION: BUY\nPOSITION: FULL\nSTOP_LOSS: 1.08\nTAKE_PROFIT: 0.85";
        let decision = parse_risk_verdict(verdict, TradeAction::Buy);
        assert!(decision.stop_loss_frac.is_none());
        assert!(decision.take_profit_frac.is_none());

        let garbage = "ACTION: BUY\nSTOP_LOSS: eight percent";
        let decision = parse_risk_verdict(garbage, TradeAction::Buy);
        assert!(decision.stop_loss_frac.is_none());
    }
}
