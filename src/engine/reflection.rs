//! Cycle-boundary reflection: window tracking and verdict parsing.
//!
//! Daily execution reports accumulate in a `ReflectionWindow`; on the last
//! trading day of the configured window (week or month) the engine asks
//! the deliberator to distill them and parses the labeled answer into a
//! `CycleReflection` for the experience store.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{CycleReflection, CycleScope, ExecutionReport};

/// True when `date` is the last trading day of its window: the next
/// trading day (if any) falls in a different ISO week or calendar month.
pub fn window_ends(date: NaiveDate, next_trading_day: Option<NaiveDate>, scope: CycleScope) -> bool {
    let Some(next) = next_trading_day else {
        // End of the run closes whatever window is open.
        return true;
    };
    match scope {
        CycleScope::Weekly => date.iso_week() != next.iso_week(),
        CycleScope::Monthly => (date.year(), date.month()) != (next.year(), next.month()),
    }
}

/// Execution reports accumulated within the current cycle window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionWindow {
    pub scope: CycleScope,
    reports: Vec<ExecutionReport>,
}

impl ReflectionWindow {
    pub fn new(scope: CycleScope) -> Self {
        Self {
            scope,
            reports: Vec::new(),
        }
    }

    pub fn push(&mut self, report: ExecutionReport) {
        self.reports.push(report);
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.reports.first().map(|r| r.date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.reports.last().map(|r| r.date)
    }

    /// One line per report, oldest first, for the reflection prompt.
    pub fn digest(&self) -> String {
        self.reports
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drain the window for the next cycle, returning its reports.
    pub fn take(&mut self) -> Vec<ExecutionReport> {
        std::mem::take(&mut self.reports)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

const SECTION_LABELS: [(&str, usize); 4] =
    [("ERRORS", 0), ("SUCCESSES", 1), ("STRATEGY", 2), ("BIASES", 3)];

fn match_section(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim().trim_start_matches(['*', '#', '-', ' ']);
    for (label, index) in SECTION_LABELS {
        if let Some(rest) = trimmed
            .strip_prefix(label)
            .and_then(|r| r.trim_start().strip_prefix(':'))
        {
            return Some((index, rest.trim().trim_matches('*').trim()));
        }
    }
    None
}

/// Parse the deliberator's reflection answer into its four sections.
/// Sections may span multiple lines; a bare `NONE` empties the section.
/// Missing sections stay empty rather than failing.
pub fn parse_reflection(
    text: &str,
    symbol: &str,
    scope: CycleScope,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> CycleReflection {
    let mut sections: [Vec<&str>; 4] = Default::default();
    let mut current: Option<usize> = None;

    for line in text.lines() {
        if let Some((index, first)) = match_section(line) {
            current = Some(index);
            if !first.is_empty() {
                sections[index].push(first);
            }
        } else if let Some(index) = current {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                sections[index].push(trimmed);
            }
        }
    }

    let finish = |parts: &[&str]| -> String {
        let joined = parts.join(" ");
        if joined.trim().eq_ignore_ascii_case("none") {
            String::new()
        } else {
            joined
        }
    };

    CycleReflection {
        scope: Some(scope),
        symbol: symbol.to_string(),
        start_date: Some(start_date),
        end_date: Some(end_date),
        error_patterns: finish(&sections[0]),
        success_patterns: finish(&sections[1]),
        strategy_conditions: finish(&sections[2]),
        bias_notes: finish(&sections[3]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
