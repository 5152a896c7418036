//! AGORA — Autonomous Deliberative Trading Agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the run snapshot from disk (or starts fresh), and walks the
//! replay calendar day by day through the deliberation cycle with
//! graceful shutdown between days.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::{error, info};

use agora::config::AppConfig;
use agora::dashboard::{self, DashboardState, DayLogEntry};
use agora::data::replay::ReplayFeed;
use agora::engine::orchestrator::{CycleEngine, DayOutcome, EngineConfig};
use agora::engine::reflection::ReflectionWindow;
use agora::ledger::metrics::PerformanceTracker;
use agora::ledger::PortfolioLedger;
use agora::llm::openai::OpenAiClient;
use agora::llm::Deliberator;
use agora::memory::sqlite::SqliteExperienceStore;
use agora::storage::{self, RunSnapshot};

const BANNER: &str = r#"
    _    ____  ___  ____      _
   / \  / ___|/ _ \|  _ \    / \
  / _ \| |  _| | | | |_) |  / _ \
 / ___ \ |_| | |_| |  _ <  / ___ \
/_/   \_\____|\___/|_| \_\/_/   \_\

  Adversarial deliberation over a daily trading calendar
  v0.1.0 — Autonomous Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        symbol = %cfg.agent.symbol,
        cycle = %cfg.agent.cycle,
        start = %cfg.agent.start_date,
        end = %cfg.agent.end_date,
        initial_capital = %cfg.agent.initial_capital,
        "AGORA starting up"
    );

    // -- Initialise components -------------------------------------------

    // The LLM key is the one fatal startup requirement.
    let api_key = SecretString::new(
        AppConfig::resolve_env(&cfg.llm.api_key_env)
            .context("LLM API key is required to run")?,
    );
    let llm = Arc::new(OpenAiClient::new(
        api_key,
        cfg.llm.base_url.clone(),
        cfg.llm.model.clone(),
        cfg.llm.max_tokens,
        cfg.llm.temperature,
    )?);
    info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "LLM client ready");

    // Replay feed backs both the summary and price providers.
    let feed = Arc::new(ReplayFeed::load(&cfg.data.fixture_path)?);
    let days = feed.trading_days(&cfg.agent.symbol, cfg.agent.start_date, cfg.agent.end_date);
    if days.is_empty() {
        anyhow::bail!(
            "fixture {} has no trading days for {} in the configured range",
            cfg.data.fixture_path,
            cfg.agent.symbol
        );
    }
    info!(days = days.len(), fixture = %cfg.data.fixture_path, "Replay calendar loaded");

    let memory = Arc::new(SqliteExperienceStore::connect(&cfg.memory.db_path).await?);

    let engine = CycleEngine::new(
        EngineConfig {
            symbol: cfg.agent.symbol.clone(),
            investment_rounds: cfg.debate.investment_rounds,
            risk_rounds: cfg.debate.risk_rounds,
            retrieve_k: cfg.debate.retrieve_k,
            cycle: cfg.agent.cycle,
        },
        cfg.retry,
        feed.clone(),
        feed.clone(),
        llm.clone(),
        memory,
    );

    // -- Restore or create run state --------------------------------------

    let snapshot_path = cfg.agent.snapshot_path.as_deref();
    let (mut ledger, mut tracker, mut window, resume_after) =
        match storage::load_snapshot(snapshot_path)? {
            Some(snapshot) => {
                info!(
                    last_completed = %snapshot.last_completed,
                    total_value = %snapshot.ledger.total_value(),
                    "Resumed from saved snapshot"
                );
                (
                    snapshot.ledger,
                    snapshot.tracker,
                    snapshot.window,
                    Some(snapshot.last_completed),
                )
            }
            None => {
                info!(capital = %cfg.agent.initial_capital, "Fresh start");
                (
                    PortfolioLedger::new(cfg.agent.initial_capital),
                    PerformanceTracker::new(cfg.agent.initial_capital),
                    ReflectionWindow::new(cfg.agent.cycle),
                    None,
                )
            }
        };

    // Optional monitoring API
    let dash = if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            cfg.agent.symbol.clone(),
            ledger.revalue(&Default::default()),
        ));
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port)?;
        Some(state)
    } else {
        None
    };

    // -- Day loop ----------------------------------------------------------

    let pacing = Duration::from_secs(cfg.agent.day_pacing_secs);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if let Some(state) = &dash {
        state.run.write().await.status = "running".into();
    }
    info!(days = days.len(), "Entering day loop. Press Ctrl+C to stop between days.");

    let mut interrupted = false;
    for (index, date) in days.iter().enumerate() {
        if let Some(after) = resume_after {
            if *date <= after {
                continue;
            }
        }

        let next_trading_day = days.get(index + 1).copied();
        let outcome = engine
            .run_day(*date, next_trading_day, &mut ledger, &mut tracker, &mut window)
            .await;

        if let Some(state) = &dash {
            publish_day(state, &ledger, &tracker, &outcome, llm.as_ref()).await;
        }

        // Persist after each completed day; a failed save is not fatal.
        let snapshot = RunSnapshot {
            ledger: ledger.clone(),
            tracker: tracker.clone(),
            window: window.clone(),
            last_completed: *date,
        };
        if let Err(e) = storage::save_snapshot(&snapshot, snapshot_path) {
            error!(error = %e, "Failed to save snapshot");
        }

        if next_trading_day.is_none() {
            break;
        }
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                interrupted = true;
            }
            _ = tokio::time::sleep(pacing) => {}
        }
        if interrupted {
            break;
        }
    }

    // -- Run report --------------------------------------------------------

    if let Some(state) = &dash {
        state.run.write().await.status =
            if interrupted { "interrupted".into() } else { "finished".into() };
    }
    info!(
        symbol = %cfg.agent.symbol,
        initial_capital = %ledger.initial_capital(),
        final_value = %ledger.total_value(),
        total_return = format!("{:+.2}%", tracker.total_return() * 100.0),
        max_drawdown = format!("{:.2}%", tracker.max_drawdown() * 100.0),
        sharpe = format!("{:.2}", tracker.sharpe()),
        trades = ledger.trades().len(),
        days = tracker.days_recorded(),
        llm_cost = format!("${:.4}", llm.total_cost()),
        "AGORA run complete."
    );

    Ok(())
}

/// Push one completed day into the shared dashboard state.
async fn publish_day(
    state: &Arc<DashboardState>,
    ledger: &PortfolioLedger,
    tracker: &PerformanceTracker,
    outcome: &DayOutcome,
    llm: &dyn Deliberator,
) {
    use rust_decimal::prelude::ToPrimitive;

    {
        let mut run = state.run.write().await;
        run.days_completed = tracker.days_recorded();
        run.trades_executed = ledger.trades().len();
        run.llm_cost = llm.total_cost();
    }
    *state.portfolio.write().await = outcome.portfolio.clone();
    state.day_log.write().await.push(DayLogEntry {
        date: outcome.session.trade_date.to_string(),
        action: outcome
            .session
            .risk
            .as_ref()
            .map(|r| r.action.to_string())
            .unwrap_or_else(|| "HOLD".into()),
        positioning: outcome
            .session
            .execution
            .as_ref()
            .map(|r| r.positioning.to_string())
            .unwrap_or_else(|| "empty".into()),
        total_value: outcome.portfolio.total_value.to_f64().unwrap_or(0.0),
        daily_return: outcome.stats.daily_return,
        max_drawdown: outcome.stats.max_drawdown,
        anomalies: outcome.session.anomalies.len(),
    });
    if let Some(report) = &outcome.session.execution {
        state.reports.write().await.push(report.clone());
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agora=info"));

    let json_logging = std::env::var("AGORA_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
