//! Round-bounded debate state machine.
//!
//! One generic engine drives both deliberations: the 2-party investment
//! debate (advocate vs opponent) and the 3-party risk debate (aggressive,
//! neutral, conservative). Parties are data, not code: each is a role name
//! plus a stance directive consumed by one generic turn function. The
//! transcript never leaves this module; only the judge's verdict crosses
//! the boundary back into session state.

pub mod judge;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::AgoraError;

// ---------------------------------------------------------------------------
// Parties and rules
// ---------------------------------------------------------------------------

/// One debate participant: a display role plus the stance it must argue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub role: String,
    pub directive: String,
}

impl Party {
    pub fn new(role: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            directive: directive.into(),
        }
    }
}

/// Which deliberation a debate instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebateKind {
    Investment,
    Risk,
}

impl fmt::Display for DebateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebateKind::Investment => write!(f, "investment"),
            DebateKind::Risk => write!(f, "risk"),
        }
    }
}

/// Fixed configuration of one debate: its parties in speaking order and
/// the round budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateRules {
    pub kind: DebateKind,
    pub parties: Vec<Party>,
    pub max_rounds: u32,
}

impl DebateRules {
    /// The 2-party investment-merit debate.
    pub fn investment(max_rounds: u32) -> Self {
        Self {
            kind: DebateKind::Investment,
            parties: vec![
                Party::new(
                    "advocate",
                    "Argue for investing. Build the strongest evidence-based bull \
                     case and dismantle the opponent's objections.",
                ),
                Party::new(
                    "opponent",
                    "Argue against investing. Surface the risks, weak evidence, \
                     and downside scenarios the advocate glosses over.",
                ),
            ],
            max_rounds,
        }
    }

    /// The 3-party risk-tolerance debate.
    pub fn risk(max_rounds: u32) -> Self {
        Self {
            kind: DebateKind::Risk,
            parties: vec![
                Party::new(
                    "aggressive analyst",
                    "Push for the boldest stance the evidence can bear: larger \
                     sizing, wider stops, conviction over caution.",
                ),
                Party::new(
                    "neutral analyst",
                    "Weigh both extremes and argue for the balanced course, \
                     calling out where either side overstates its case.",
                ),
                Party::new(
                    "conservative analyst",
                    "Protect capital first: argue for tighter sizing and stops, \
                     and name every way this plan loses money.",
                ),
            ],
            max_rounds,
        }
    }

    /// Total number of turns before the debate is terminal.
    pub fn turn_budget(&self) -> u32 {
        self.parties.len() as u32 * self.max_rounds
    }
}

// ---------------------------------------------------------------------------
// Debate state
// ---------------------------------------------------------------------------

/// Mutable record of one debate in progress. Scratch space scoped to a
/// single cycle; discarded once the judge verdict is extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateState {
    /// Per-party statement history, indexed like `rules.parties`.
    histories: Vec<Vec<String>>,
    /// Chronological (party_index, statement) union of all turns.
    transcript: Vec<(usize, String)>,
    /// Latest statement per party, empty until that party first speaks.
    latest: Vec<String>,
    /// Increments by exactly one per accepted turn.
    round_counter: u32,
    /// Empty until the judge finalizes the debate.
    judge_verdict: String,
}

impl DebateState {
    pub fn new(rules: &DebateRules) -> Self {
        Self {
            histories: vec![Vec::new(); rules.parties.len()],
            transcript: Vec::new(),
            latest: vec![String::new(); rules.parties.len()],
            round_counter: 0,
            judge_verdict: String::new(),
        }
    }

    /// True once the fixed turn budget is exhausted.
    pub fn is_terminal(&self, rules: &DebateRules) -> bool {
        self.round_counter >= rules.turn_budget()
    }

    /// The party due to speak next, or `None` once terminal.
    pub fn next_party<'r>(&self, rules: &'r DebateRules) -> Option<(usize, &'r Party)> {
        if self.is_terminal(rules) {
            return None;
        }
        let index = self.round_counter as usize % rules.parties.len();
        Some((index, &rules.parties[index]))
    }

    /// Accept one party's statement. Validation happens before any
    /// mutation, so a rejected turn leaves the state untouched.
    pub fn advance(
        &mut self,
        rules: &DebateRules,
        party_index: usize,
        statement: String,
    ) -> Result<(), AgoraError> {
        let Some((expected, _)) = self.next_party(rules) else {
            return Err(AgoraError::Debate(format!(
                "{} debate already terminal after {} turns",
                rules.kind, self.round_counter
            )));
        };
        if party_index != expected {
            return Err(AgoraError::Debate(format!(
                "out-of-order turn in {} debate: expected party {expected}, got {party_index}",
                rules.kind
            )));
        }
        if statement.trim().is_empty() {
            return Err(AgoraError::Debate(format!(
                "empty statement from {} in {} debate",
                rules.parties[party_index].role, rules.kind
            )));
        }

        self.histories[party_index].push(statement.clone());
        self.latest[party_index] = statement.clone();
        self.transcript.push((party_index, statement));
        self.round_counter += 1;
        Ok(())
    }

    /// Write the judge's verdict. Allowed exactly once, only after the
    /// debate is terminal; per-party histories are left untouched.
    pub fn finalize(&mut self, rules: &DebateRules, verdict: String) -> Result<(), AgoraError> {
        if !self.is_terminal(rules) {
            return Err(AgoraError::Debate(format!(
                "cannot finalize {} debate at turn {} of {}",
                rules.kind,
                self.round_counter,
                rules.turn_budget()
            )));
        }
        if !self.judge_verdict.is_empty() {
            return Err(AgoraError::Debate(format!(
                "{} debate already finalized",
                rules.kind
            )));
        }
        self.judge_verdict = verdict;
        Ok(())
    }

    pub fn round_counter(&self) -> u32 {
        self.round_counter
    }

    pub fn judge_verdict(&self) -> &str {
        &self.judge_verdict
    }

    pub fn latest_statement(&self, party_index: usize) -> Option<&str> {
        self.latest
            .get(party_index)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn history(&self, party_index: usize) -> &[String] {
        self.histories
            .get(party_index)
            .map(|h| h.as_slice())
            .unwrap_or(&[])
    }

    /// The combined transcript rendered for prompts, oldest turn first.
    pub fn transcript_text(&self, rules: &DebateRules) -> String {
        let mut out = String::new();
        for (index, statement) in &self.transcript {
            let role = rules
                .parties
                .get(*index)
                .map(|p| p.role.as_str())
                .unwrap_or("unknown");
            out.push_str(&format!("{role}: {statement}\n"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
