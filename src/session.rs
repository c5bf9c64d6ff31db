//! Session controller.
//!
//! Owns the live `Session`, starts one trading-cycle task per session and
//! implements the three commands: start, stop and emergency stop. Commands
//! are serialised through the run-handle lock; the cycle task observes them
//! through its cancellation token.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::automation::probe::OrderProbe;
use crate::automation::UiAutomation;
use crate::config::TradingConfig;
use crate::engine::cycle::TradingCycle;
use crate::engine::{CycleTimings, EngineContext};
use crate::storage::{self, TradeSettings};
use crate::types::{
    parse_amount, validate_amount, CycleState, EndReason, LiquidationReport, RunSummary, Session,
    TraderError,
};

struct RunHandle {
    session_id: Option<String>,
    cancel: CancellationToken,
    join: JoinHandle<RunSummary>,
    done: watch::Receiver<Option<RunSummary>>,
}

/// Snapshot served to status consumers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session: Session,
    pub adapter: String,
    pub polling: bool,
    pub last_run: Option<RunSummary>,
    pub saved_settings: Option<TradeSettings>,
}

pub struct SessionController {
    ctx: EngineContext,
    session: Arc<RwLock<Session>>,
    run: tokio::sync::Mutex<Option<RunHandle>>,
    last_run: Arc<Mutex<Option<RunSummary>>>,
    settings_file: Option<String>,
    saved: Mutex<Option<TradeSettings>>,
}

impl SessionController {
    /// Build a controller over `ui`. Saved settings are read from
    /// `trading.settings_file` when one is configured.
    pub fn new(
        ui: Arc<dyn UiAutomation>,
        probe: Arc<dyn OrderProbe>,
        trading: &TradingConfig,
        timings: CycleTimings,
    ) -> Self {
        let activity = ActivityLog::default();
        let ctx = EngineContext::new(ui, probe, activity, timings, trading.location_pattern.clone());

        let saved = match trading.settings_file.as_deref() {
            Some(path) => storage::load_settings(Some(path)).unwrap_or_else(|e| {
                warn!(path, error = %e, "Ignoring unreadable settings file");
                None
            }),
            None => None,
        };

        Self {
            ctx,
            session: Arc::new(RwLock::new(Session::default())),
            run: tokio::sync::Mutex::new(None),
            last_run: Arc::new(Mutex::new(None)),
            settings_file: trading.settings_file.clone(),
            saved: Mutex::new(saved),
        }
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.ctx.activity
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub fn saved_settings(&self) -> Option<TradeSettings> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn status(&self) -> SessionStatus {
        SessionStatus {
            session: self.session().await,
            adapter: self.ctx.ui.name().to_string(),
            polling: self.ctx.monitor.is_polling(),
            last_run: self.last_run(),
            saved_settings: self.saved_settings(),
        }
    }

    // -- Commands ---------------------------------------------------------

    /// Parse raw user input and start a session.
    pub async fn start_from_input(&self, amount: &str, max_trade_count: u32) -> Result<(), TraderError> {
        let amount = parse_amount(amount).inspect_err(|e| self.activity().error(e.to_string()))?;
        self.start(amount, max_trade_count).await
    }

    /// Validate, persist, run the safety gate, then spawn the cycle.
    pub async fn start(&self, amount: Decimal, max_trade_count: u32) -> Result<(), TraderError> {
        validate_amount(amount).inspect_err(|e| self.activity().error(e.to_string()))?;

        let mut run = self.run.lock().await;
        let live = run.as_ref().is_some_and(|h| !h.join.is_finished());
        if live || self.session.read().await.running {
            return Err(TraderError::AlreadyRunning);
        }

        self.persist(amount, max_trade_count);
        self.ctx.gate().check_preconditions().await?;

        if let Some(previous) = run.take() {
            self.join(previous).await;
        }

        let cancel = CancellationToken::new();
        let session = Session::begin(amount, max_trade_count);
        let limit = if max_trade_count == 0 {
            "unlimited".to_string()
        } else {
            max_trade_count.to_string()
        };
        info!(session_id = ?session.id, amount = %amount, max_trade_count, "Session starting");
        let session_id = session.id.clone();
        *self.session.write().await = session;

        let cycle = TradingCycle::new(&self.ctx, self.session.clone(), cancel.clone());
        let last_run = self.last_run.clone();
        let (done_tx, done) = watch::channel(None);
        let join = tokio::spawn(async move {
            let summary = cycle.run().await;
            *last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(summary.clone());
            let _ = done_tx.send(Some(summary.clone()));
            summary
        });
        *run = Some(RunHandle {
            session_id,
            cancel,
            join,
            done,
        });

        self.activity()
            .success(format!("Trading started: amount {amount}, trade limit {limit}"));
        Ok(())
    }

    /// Stop the running session and wait for its task to exit. Calling it
    /// again, or while idle, does nothing.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let live = run.as_ref().is_some_and(|h| !h.join.is_finished());

        if !live && !self.session.read().await.running {
            if let Some(finished) = run.take() {
                self.join(finished).await;
            }
            debug!("Stop requested with no running session");
            return;
        }

        if let Some(handle) = run.take() {
            handle.cancel.cancel();
            self.join(handle).await;
        }
        self.session.write().await.reset();
        self.activity().info("Trading stopped");
    }

    /// Stop everything and sell the whole position. Works from any state,
    /// including idle. Never fails; problems are logged and reported.
    pub async fn emergency_stop(&self) -> LiquidationReport {
        self.activity().error("Emergency stop triggered");
        let mut run = self.run.lock().await;
        self.mark_emergency().await;

        if let Some(handle) = run.take() {
            handle.cancel.cancel();
            self.join(handle).await;
        }
        self.mark_emergency().await;

        let report = self.ctx.liquidator().liquidate("Emergency stop").await;

        let summary = {
            let mut session = self.session.write().await;
            let summary = RunSummary {
                ended_by: EndReason::EmergencyStop,
                trades_completed: session.current_trade_count,
                consecutive_errors: session.consecutive_errors,
                ended_at: Utc::now(),
            };
            session.reset();
            summary
        };
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(summary);

        if report.is_flat() {
            self.activity().success("Emergency stop complete");
        } else {
            self.activity()
                .error(format!("Emergency stop finished, position may remain: {report:?}"));
        }
        report
    }

    /// Wait for the current run to end and return its summary. The run
    /// handle stays in place while waiting, so `stop` and `emergency_stop`
    /// can still cancel the cycle.
    pub async fn wait_finished(&self) -> Option<RunSummary> {
        let (session_id, mut done) = {
            let run = self.run.lock().await;
            let handle = run.as_ref()?;
            (handle.session_id.clone(), handle.done.clone())
        };

        let summary = match done.wait_for(Option::is_some).await {
            Ok(summary) => summary.clone(),
            Err(_) => None,
        };
        self.reap(session_id).await;
        summary
    }

    // -- Helpers ----------------------------------------------------------

    async fn mark_emergency(&self) {
        let mut session = self.session.write().await;
        session.state = CycleState::EmergencyStop;
        session.running = false;
    }

    /// Join the finished run identified by `session_id` if no other command
    /// has taken it already.
    async fn reap(&self, session_id: Option<String>) {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|h| h.session_id == session_id) {
            if let Some(handle) = run.take() {
                self.join(handle).await;
            }
        }
    }

    async fn join(&self, handle: RunHandle) -> Option<RunSummary> {
        match handle.join.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                self.activity().error(format!("Trading task ended abnormally: {e}"));
                None
            }
        }
    }

    fn persist(&self, amount: Decimal, max_trade_count: u32) {
        let settings = TradeSettings::new(amount, max_trade_count);
        if let Some(path) = self.settings_file.as_deref() {
            if let Err(e) = storage::save_settings(&settings, Some(path)) {
                warn!(path, error = %e, "Failed to save settings");
            }
        }
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(settings);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
