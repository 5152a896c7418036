//! Monitoring API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`;
//! the engine loop writes after each completed day, handlers only read.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ledger::PortfolioState;
use crate::types::ExecutionReport;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub run: RwLock<RunStatus>,
    pub portfolio: RwLock<PortfolioState>,
    pub day_log: RwLock<Vec<DayLogEntry>>,
    pub reports: RwLock<Vec<ExecutionReport>>,
}

/// Run-level counters the status endpoint reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub symbol: String,
    pub status: String,
    pub days_completed: usize,
    pub trades_executed: usize,
    pub llm_cost: f64,
    pub started_at: String,
}

impl DashboardState {
    pub fn new(symbol: impl Into<String>, initial_portfolio: PortfolioState) -> Self {
        Self {
            run: RwLock::new(RunStatus {
                symbol: symbol.into(),
                status: "starting".into(),
                days_completed: 0,
                trades_executed: 0,
                llm_cost: 0.0,
                started_at: chrono::Utc::now().to_rfc3339(),
            }),
            portfolio: RwLock::new(initial_portfolio),
            day_log: RwLock::new(Vec::new()),
            reports: RwLock::new(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub symbol: String,
    pub status: String,
    pub days_completed: usize,
    pub trades_executed: usize,
    pub total_value: f64,
    pub total_return: f64,
    pub llm_cost: f64,
    pub started_at: String,
}

/// One completed day as the day log shows it.
#[derive(Debug, Clone, Serialize)]
pub struct DayLogEntry {
    pub date: String,
    pub action: String,
    pub positioning: String,
    pub total_value: f64,
    pub daily_return: f64,
    pub max_drawdown: f64,
    pub anomalies: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let run = state.run.read().await;
    let portfolio = state.portfolio.read().await;

    Json(StatusResponse {
        symbol: run.symbol.clone(),
        status: run.status.clone(),
        days_completed: run.days_completed,
        trades_executed: run.trades_executed,
        total_value: portfolio.total_value.to_f64().unwrap_or(0.0),
        total_return: portfolio.total_return,
        llm_cost: run.llm_cost,
        started_at: run.started_at.clone(),
    })
}

/// GET /api/portfolio
pub async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioState> {
    let portfolio = state.portfolio.read().await;
    Json(portfolio.clone())
}

/// GET /api/days
pub async fn get_days(State(state): State<AppState>) -> Json<Vec<DayLogEntry>> {
    let log = state.day_log.read().await;
    // Return last 100 days
    let start = log.len().saturating_sub(100);
    Json(log[start..].to_vec())
}

/// GET /api/reports
pub async fn get_reports(State(state): State<AppState>) -> Json<Vec<ExecutionReport>> {
    let reports = state.reports.read().await;
    let start = reports.len().saturating_sub(100);
    Json(reports[start..].to_vec())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
