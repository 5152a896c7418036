//! Run persistence.
//!
//! Saves and loads the resumable run state to/from a JSON file: the
//! portfolio ledger, the performance history, the open reflection window,
//! and the last completed trading day. A restart reloads the snapshot and
//! continues from the next day.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::reflection::ReflectionWindow;
use crate::ledger::metrics::PerformanceTracker;
use crate::ledger::PortfolioLedger;

/// Default snapshot file path.
const DEFAULT_SNAPSHOT_FILE: &str = "agora_run.json";

/// Everything a restart needs to continue a run mid-stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub ledger: PortfolioLedger,
    pub tracker: PerformanceTracker,
    pub window: ReflectionWindow,
    pub last_completed: NaiveDate,
}

/// Save the run snapshot to a JSON file.
pub fn save_snapshot(snapshot: &RunSnapshot, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    let json =
        serde_json::to_string_pretty(snapshot).context("Failed to serialise run snapshot")?;

    std::fs::write(path, &json).context(format!("Failed to write snapshot to {path}"))?;

    debug!(
        path,
        last_completed = %snapshot.last_completed,
        total_value = %snapshot.ledger.total_value(),
        "Snapshot saved"
    );
    Ok(())
}

/// Load the run snapshot from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_snapshot(path: Option<&str>) -> Result<Option<RunSnapshot>> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved snapshot found, starting fresh");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).context(format!("Failed to read snapshot from {path}"))?;

    let snapshot: RunSnapshot =
        serde_json::from_str(&json).context(format!("Failed to parse snapshot from {path}"))?;

    info!(
        path,
        last_completed = %snapshot.last_completed,
        total_value = %snapshot.ledger.total_value(),
        days = snapshot.tracker.days_recorded(),
        "Snapshot loaded from disk"
    );

    Ok(Some(snapshot))
}

/// Delete the snapshot file (for testing or reset).
pub fn delete_snapshot(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete snapshot file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BuySize;
    use crate::types::{CycleScope, ExecutionReport, Positioning};
    use rust_decimal_macros::dec;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("agora_test_snapshot_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample_snapshot() -> RunSnapshot {
        let mut ledger = PortfolioLedger::new(dec!(100000));
        ledger.execute_buy("AAPL", dec!(100), BuySize::Amount(dec!(40000)), date(2), "momentum");

        let mut tracker = PerformanceTracker::new(dec!(100000));
        tracker.record(date(2), dec!(101000));

        let mut window = ReflectionWindow::new(CycleScope::Weekly);
        window.push(ExecutionReport {
            date: date(2),
            symbol: "AAPL".into(),
            market_regime: "trending".into(),
            selected_strategy: "momentum".into(),
            expected_behavior: "grind higher".into(),
            actual_return: 0.01,
            actual_max_drawdown: 0.0,
            positioning: Positioning::Partial,
            anomaly: None,
        });

        RunSnapshot {
            ledger,
            tracker,
            window,
            last_completed: date(2),
        }
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        save_snapshot(&sample_snapshot(), Some(&path)).unwrap();

        let loaded = load_snapshot(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.last_completed, date(2));
        assert_eq!(loaded.ledger.cash(), dec!(60000));
        assert_eq!(loaded.ledger.position("AAPL").unwrap().shares, dec!(400));
        assert_eq!(loaded.tracker.days_recorded(), 1);
        assert_eq!(loaded.window.len(), 1);

        delete_snapshot(Some(&path)).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let path = "/tmp/agora_nonexistent_snapshot_12345.json";
        let loaded = load_snapshot(Some(path)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_rejects_corrupt_file() {
        let path = temp_path();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_snapshot(Some(&path)).is_err());
        delete_snapshot(Some(&path)).unwrap();
    }

    #[test]
    fn test_delete_snapshot() {
        let path = temp_path();
        save_snapshot(&sample_snapshot(), Some(&path)).unwrap();
        assert!(Path::new(&path).exists());

        delete_snapshot(Some(&path)).unwrap();
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_delete_nonexistent_ok() {
        assert!(delete_snapshot(Some("/tmp/agora_does_not_exist_xyz.json")).is_ok());
    }
}
