//! Trading cycle state machine.
//!
//! One `TradingCycle` runs per session on its own task:
//!
//! ```text
//! idle → buying → monitoring_buy → (confirm) → selling → monitoring_sell → loop
//! ```
//!
//! The loop counts trades, enforces the consecutive-error budget and, when
//! the trade limit is hit, liquidates and ends the session on its own.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::executor::ActionExecutor;
use super::liquidation::Liquidator;
use super::monitor::OrderMonitor;
use super::safety::SafetyGate;
use super::{pause, CycleTimings, EngineContext};
use crate::activity::ActivityLog;
use crate::types::{CycleState, EndReason, OrderWaitOutcome, RunSummary, Session, Side, TraderError};

/// How a single buy/sell round ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Completed,
    /// The buy could not be confirmed; nothing was sold.
    Unconfirmed,
    /// The session was stopped mid-round.
    Stopped,
}

pub struct TradingCycle {
    session: Arc<RwLock<Session>>,
    cancel: CancellationToken,
    activity: ActivityLog,
    timings: CycleTimings,
    gate: SafetyGate,
    executor: ActionExecutor,
    monitor: OrderMonitor,
    liquidator: Liquidator,
}

impl TradingCycle {
    pub fn new(ctx: &EngineContext, session: Arc<RwLock<Session>>, cancel: CancellationToken) -> Self {
        Self {
            session,
            cancel,
            activity: ctx.activity.clone(),
            timings: ctx.timings.clone(),
            gate: ctx.gate(),
            executor: ctx.executor(),
            monitor: ctx.monitor.clone(),
            liquidator: ctx.liquidator(),
        }
    }

    /// Drive rounds until the session is stopped, the error budget runs
    /// out, or the trade limit triggers auto-stop.
    pub async fn run(self) -> RunSummary {
        {
            let session = self.session.read().await;
            info!(session = %session, "Trading cycle started");
        }

        let ended_by = loop {
            if self.cancel.is_cancelled() || !self.session.read().await.running {
                break EndReason::Stopped;
            }

            if !self.gate.check_runtime().await {
                if !pause(&self.cancel, self.timings.runtime_backoff()).await {
                    break EndReason::Stopped;
                }
                continue;
            }

            match self.round().await {
                Ok(Round::Completed) => {
                    if let Some(reason) = self.on_round_completed().await {
                        break reason;
                    }
                }
                Ok(Round::Unconfirmed) => {
                    self.set_state(CycleState::Idle).await;
                    self.activity.error("Buy could not be confirmed, restarting without selling");
                    if !pause(&self.cancel, self.timings.unconfirmed_backoff()).await {
                        break EndReason::Stopped;
                    }
                }
                Ok(Round::Stopped) => break EndReason::Stopped,
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        debug!(error = %e, "Round failed after stop, not counted");
                        break EndReason::Stopped;
                    }
                    if let Some(reason) = self.on_round_failed(e).await {
                        break reason;
                    }
                }
            }
        };

        self.finish(ended_by).await
    }

    /// One buy → confirm → sell round.
    async fn round(&self) -> Result<Round, TraderError> {
        let amount = self.session.read().await.amount;

        self.set_state(CycleState::Buying).await;
        self.executor.execute_buy_with_retry(amount, &self.cancel).await?;
        if self.cancel.is_cancelled() {
            return Ok(Round::Stopped);
        }

        self.set_state(CycleState::MonitoringBuy).await;
        match self.monitor.wait_for_completion(Side::Buy, &self.cancel).await? {
            OrderWaitOutcome::Completed => {}
            OrderWaitOutcome::CancelledByStop => return Ok(Round::Stopped),
            OrderWaitOutcome::TimedOut => {
                return Err(TraderError::Cycle("buy order did not complete in time".to_string()))
            }
        }

        if !self.monitor.confirm_buy_filled(&self.cancel).await {
            if self.cancel.is_cancelled() {
                return Ok(Round::Stopped);
            }
            return Ok(Round::Unconfirmed);
        }

        self.set_state(CycleState::Selling).await;
        self.executor.execute_sell_with_retry(&self.cancel).await?;
        if self.cancel.is_cancelled() {
            return Ok(Round::Stopped);
        }

        self.set_state(CycleState::MonitoringSell).await;
        match self.monitor.wait_for_completion(Side::Sell, &self.cancel).await? {
            OrderWaitOutcome::Completed => Ok(Round::Completed),
            OrderWaitOutcome::CancelledByStop => Ok(Round::Stopped),
            OrderWaitOutcome::TimedOut => {
                Err(TraderError::Cycle("sell order did not complete in time".to_string()))
            }
        }
    }

    async fn on_round_completed(&self) -> Option<EndReason> {
        let (count, remaining, limit_reached) = {
            let mut session = self.session.write().await;
            session.current_trade_count += 1;
            session.consecutive_errors = 0;
            if !self.cancel.is_cancelled() {
                session.state = CycleState::Idle;
            }
            (
                session.current_trade_count,
                session.remaining_trades(),
                session.limit_reached(),
            )
        };

        if limit_reached {
            self.activity
                .success(format!("Trade {count} completed, trade limit reached"));
            self.auto_stop().await;
            return Some(EndReason::AutoStop);
        }

        match remaining {
            Some(left) if left <= 2 => {
                self.activity.error(format!(
                    "Trade {count} completed, only {left} trade(s) left before auto-stop"
                ));
            }
            Some(left) if left <= 5 => {
                self.activity
                    .info(format!("Trade {count} completed, {left} trades remaining"));
            }
            _ => self.activity.success(format!("Trade {count} completed")),
        }

        if !pause(&self.cancel, self.timings.cycle_pause()).await {
            return Some(EndReason::Stopped);
        }
        None
    }

    async fn on_round_failed(&self, error: TraderError) -> Option<EndReason> {
        let max = self.timings.max_consecutive_errors.max(1);
        let errors = {
            let mut session = self.session.write().await;
            session.consecutive_errors += 1;
            session.state = CycleState::Idle;
            session.consecutive_errors
        };
        self.activity
            .error(format!("Trading cycle error ({errors}/{max}): {error}"));

        if errors >= max {
            self.activity
                .error(format!("{errors} consecutive errors, trading stopped"));
            return Some(EndReason::ErrorBudget);
        }

        if !pause(&self.cancel, self.timings.error_backoff()).await {
            return Some(EndReason::Stopped);
        }
        None
    }

    /// Trade limit reached: end the session, stop any poll, and sell out.
    async fn auto_stop(&self) {
        {
            let mut session = self.session.write().await;
            session.state = CycleState::AutoStop;
            session.running = false;
        }
        self.cancel.cancel();

        let report = self.liquidator.liquidate("Auto-stop").await;
        if report.is_flat() {
            self.activity.success("Auto-stop complete, position closed");
        } else {
            self.activity
                .error(format!("Auto-stop finished but position may remain: {report:?}"));
        }
    }

    async fn set_state(&self, state: CycleState) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut session = self.session.write().await;
        debug!(from = %session.state, to = %state, "State transition");
        session.state = state;
    }

    /// Build the run summary. Self-terminating runs reset the session
    /// here; external stops leave that to the controller.
    async fn finish(&self, ended_by: EndReason) -> RunSummary {
        let mut session = self.session.write().await;
        let summary = RunSummary {
            ended_by,
            trades_completed: session.current_trade_count,
            consecutive_errors: session.consecutive_errors,
            ended_at: Utc::now(),
        };
        if matches!(ended_by, EndReason::ErrorBudget | EndReason::AutoStop) {
            session.reset();
            self.cancel.cancel();
        }
        info!(summary = %summary, "Trading cycle finished");
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
