//! Long-term experience store.
//!
//! Judges retrieve past situation→lesson pairs scored against today's
//! situation digest; cycle-boundary reflection is the only writer. The
//! trait is object-safe so the engine can run against the SQLite store in
//! production and the in-memory store in tests and dry runs.

pub mod sqlite;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{AgoraError, CycleReflection, CycleScope, ExperienceRecord};

/// Read/write contract for past lessons.
///
/// `retrieve` is read-only and called once per judge invocation with the
/// situation digest built from the four analyst summaries. `record`
/// reports failure as `false`, never as an error, so a broken store can
/// degrade a run without aborting it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    async fn retrieve(
        &self,
        symbol: &str,
        situation: &str,
        k: usize,
    ) -> Result<Vec<ExperienceRecord>, AgoraError>;

    async fn record(&self, reflection: &CycleReflection) -> bool;
}

// ---------------------------------------------------------------------------
// Relevance scoring
// ---------------------------------------------------------------------------

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_string())
        .collect()
}

/// Word-overlap similarity between the current situation and a candidate
/// lesson, in [0, 1]. Deliberately crude: lessons state the conditions
/// they apply under, so shared vocabulary is a workable proxy.
pub fn relevance(situation: &str, candidate: &str) -> f64 {
    let a = tokens(situation);
    let b = tokens(candidate);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let overlap = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    overlap / union
}

/// Split stored reflections into candidate lessons, score each against the
/// situation, and keep the top `k`. Shared by both store backends.
pub fn rank_lessons(
    reflections: &[CycleReflection],
    situation: &str,
    k: usize,
) -> Vec<ExperienceRecord> {
    let mut records: Vec<ExperienceRecord> = Vec::new();
    for reflection in reflections {
        let window = match (reflection.start_date, reflection.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "undated window".to_string(),
        };
        for (tag, text) in reflection.lessons() {
            records.push(ExperienceRecord {
                situation: format!("{} {window} ({tag})", reflection.symbol),
                lesson: text.trim().to_string(),
                relevance: relevance(situation, text),
            });
        }
    }
    records.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    records.truncate(k);
    records
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

type ReflectionKey = (CycleScope, String, NaiveDate);

/// Map-backed store for tests and dry runs. Insert-or-replace on
/// `(cycle_type, symbol, end_date)`, same key as the SQLite store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<ReflectionKey, CycleReflection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Most recent reflections for `symbol`, newest first.
    pub async fn query_recent(&self, symbol: &str, limit: usize) -> Vec<CycleReflection> {
        self.rows
            .read()
            .await
            .values()
            .filter(|r| r.symbol == symbol)
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExperienceStore for InMemoryStore {
    async fn retrieve(
        &self,
        symbol: &str,
        situation: &str,
        k: usize,
    ) -> Result<Vec<ExperienceRecord>, AgoraError> {
        let recent = self.query_recent(symbol, 20).await;
        let records = rank_lessons(&recent, situation, k);
        debug!(symbol, candidates = recent.len(), kept = records.len(), "Experience retrieval");
        Ok(records)
    }

    async fn record(&self, reflection: &CycleReflection) -> bool {
        let (Some(scope), Some(end)) = (reflection.scope, reflection.end_date) else {
            debug!("Reflection missing scope or end date, not recorded");
            return false;
        };
        let key = (scope, reflection.symbol.clone(), end);
        self.rows.write().await.insert(key, reflection.clone());
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn reflection(symbol: &str, end: NaiveDate, errors: &str, successes: &str) -> CycleReflection {
        CycleReflection {
            scope: Some(CycleScope::Weekly),
            symbol: symbol.into(),
            start_date: Some(end - chrono::Duration::days(4)),
            end_date: Some(end),
            error_patterns: errors.into(),
            success_patterns: successes.into(),
            strategy_conditions: String::new(),
            bias_notes: String::new(),
        }
    }

    #[test]
    fn test_relevance_orders_by_shared_vocabulary() {
        let situation = "momentum strong, earnings next week, breadth thin";
        let close = relevance(situation, "chasing momentum into earnings week lost money");
        let far = relevance(situation, "dividend capture worked during the quiet summer");
        assert!(close > far);
        assert!(close > 0.0);
        assert!((0.0..=1.0).contains(&close));
    }

    #[test]
    fn test_relevance_empty_inputs_score_zero() {
        assert_eq!(relevance("", "anything"), 0.0);
        assert_eq!(relevance("something", "  ,. "), 0.0);
    }

    #[test]
    fn test_rank_lessons_keeps_top_k() {
        let reflections = vec![
            reflection(
                "AAPL",
                date(2024, 1, 5),
                "bought momentum into earnings and gave it back",
                "trimming before earnings preserved gains",
            ),
            reflection(
                "AAPL",
                date(2024, 1, 12),
                "sold the dip that reversed same day",
                "",
            ),
        ];
        let records = rank_lessons(&reflections, "momentum setup with earnings on deck", 2);
        assert_eq!(records.len(), 2);
        assert!(records[0].relevance >= records[1].relevance);
        assert!(records[0].lesson.contains("earnings"));
    }

    #[tokio::test]
    async fn test_record_then_retrieve_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.is_empty().await);

        let ok = store
            .record(&reflection(
                "AAPL",
                date(2024, 1, 5),
                "chased a gap open that faded",
                "",
            ))
            .await;
        assert!(ok);
        assert_eq!(store.len().await, 1);

        let records = store
            .retrieve("AAPL", "gap open at resistance, faded last time", 2)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].lesson.contains("gap open"));
        assert!(records[0].relevance > 0.0);
    }

    #[tokio::test]
    async fn test_record_is_idempotent_on_key() {
        let store = InMemoryStore::new();
        let end = date(2024, 1, 5);
        store.record(&reflection("AAPL", end, "first version", "")).await;
        store.record(&reflection("AAPL", end, "replaced version", "")).await;

        assert_eq!(store.len().await, 1);
        let recent = store.query_recent("AAPL", 10).await;
        assert_eq!(recent[0].error_patterns, "replaced version");
    }

    #[tokio::test]
    async fn test_retrieve_is_scoped_to_symbol() {
        let store = InMemoryStore::new();
        store.record(&reflection("AAPL", date(2024, 1, 5), "apple lesson", "")).await;
        store.record(&reflection("MSFT", date(2024, 1, 5), "microsoft lesson", "")).await;

        let records = store.retrieve("AAPL", "any situation text here", 5).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].lesson.contains("apple"));
    }

    #[tokio::test]
    async fn test_record_without_window_metadata_fails_soft() {
        let store = InMemoryStore::new();
        let incomplete = CycleReflection {
            symbol: "AAPL".into(),
            error_patterns: "lesson with no window".into(),
            ..Default::default()
        };
        assert!(!store.record(&incomplete).await);
        assert!(store.is_empty().await);
    }
}
