//! SQLite-backed experience store.
//!
//! One row per `(cycle_type, symbol, end_date)` holding the serialized
//! reflection; upsert is insert-or-replace on that key. The schema is
//! created on connect, and all queries are runtime-bound so the crate
//! builds without a database present.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{rank_lessons, ExperienceStore};
use crate::types::{AgoraError, CycleReflection, ExperienceRecord};

/// How many recent reflections are pulled as retrieval candidates before
/// lesson-level ranking.
const CANDIDATE_LIMIT: usize = 20;

pub struct SqliteExperienceStore {
    pool: SqlitePool,
}

impl SqliteExperienceStore {
    /// Open (creating if needed) the store at `db_path` and ensure the
    /// schema exists.
    pub async fn connect(db_path: &str) -> Result<Self, AgoraError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
            .map_err(|e| AgoraError::Memory(format!("invalid database path {db_path}: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| AgoraError::Memory(format!("failed to open {db_path}: {e}")))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!(db_path, "Experience store ready");
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn connect_ephemeral() -> Result<Self, AgoraError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AgoraError::Memory(format!("failed to open in-memory db: {e}")))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), AgoraError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reflections (
              id TEXT PRIMARY KEY,
              cycle_type TEXT NOT NULL,
              symbol TEXT NOT NULL,
              start_date TEXT NOT NULL,
              end_date TEXT NOT NULL,
              payload TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              UNIQUE (cycle_type, symbol, end_date)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AgoraError::Memory(format!("failed to create schema: {e}")))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_reflections_symbol_end
            ON reflections (symbol, end_date DESC);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AgoraError::Memory(format!("failed to create index: {e}")))?;

        Ok(())
    }

    /// Insert-or-replace on `(cycle_type, symbol, end_date)`.
    pub async fn upsert(&self, reflection: &CycleReflection) -> Result<(), AgoraError> {
        let (Some(scope), Some(start), Some(end)) = (
            reflection.scope,
            reflection.start_date,
            reflection.end_date,
        ) else {
            return Err(AgoraError::Memory(
                "reflection missing scope or window dates".into(),
            ));
        };

        let payload = serde_json::to_string(reflection)
            .map_err(|e| AgoraError::Memory(format!("failed to serialize reflection: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO reflections (id, cycle_type, symbol, start_date, end_date, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (cycle_type, symbol, end_date)
            DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(scope.as_str())
        .bind(&reflection.symbol)
        .bind(start.to_string())
        .bind(end.to_string())
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AgoraError::Memory(format!("failed to upsert reflection: {e}")))?;

        Ok(())
    }

    /// Most recent reflections for `symbol`, newest window first. Rows
    /// whose payload no longer parses are skipped, not fatal.
    pub async fn query_recent(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<CycleReflection>, AgoraError> {
        let rows = sqlx::query(
            r#"
            SELECT payload FROM reflections
            WHERE symbol = ?1
            ORDER BY end_date DESC
            LIMIT ?2
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AgoraError::Memory(format!("failed to query reflections: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.try_get("payload").unwrap_or_default();
            match serde_json::from_str::<CycleReflection>(&payload) {
                Ok(reflection) => out.push(reflection),
                Err(e) => debug!(symbol, error = %e, "Skipping unreadable reflection row"),
            }
        }
        Ok(out)
    }

    pub async fn count(&self) -> Result<i64, AgoraError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM reflections")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AgoraError::Memory(format!("failed to count reflections: {e}")))?;
        Ok(row.try_get("n").unwrap_or(0))
    }
}

#[async_trait]
impl ExperienceStore for SqliteExperienceStore {
    async fn retrieve(
        &self,
        symbol: &str,
        situation: &str,
        k: usize,
    ) -> Result<Vec<ExperienceRecord>, AgoraError> {
        let recent = self.query_recent(symbol, CANDIDATE_LIMIT).await?;
        let records = rank_lessons(&recent, situation, k);
        debug!(symbol, candidates = recent.len(), kept = records.len(), "Experience retrieval");
        Ok(records)
    }

    async fn record(&self, reflection: &CycleReflection) -> bool {
        match self.upsert(reflection).await {
            Ok(()) => true,
            Err(e) => {
                error!(symbol = %reflection.symbol, error = %e, "Failed to record reflection");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
