//! Core engine: the buy → monitor → confirm → sell → monitor loop.

pub mod cycle;
pub mod executor;
pub mod liquidation;
pub mod monitor;
pub mod safety;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::automation::probe::OrderProbe;
use crate::automation::UiAutomation;
use executor::ActionExecutor;
use liquidation::Liquidator;
use monitor::OrderMonitor;
use safety::SafetyGate;

/// Delays, bounds and budgets used by the engine.
///
/// Durations are milliseconds so they read naturally in `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleTimings {
    /// Checks made after clicking a tab before giving up on it.
    pub tab_verify_attempts: u32,
    pub tab_verify_interval_ms: u64,
    /// Settle time after injecting a value.
    pub input_settle_ms: u64,
    /// Settle time after clicking a submit button.
    pub click_settle_ms: u64,
    /// How long to give a confirmation dialog to appear.
    pub dialog_wait_ms: u64,
    pub max_action_retries: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
    /// Order-monitor bound, in ticks.
    pub max_poll_checks: u32,
    pub confirm_settle_ms: u64,
    /// Wait after a failed runtime check.
    pub runtime_backoff_ms: u64,
    /// Wait after a failed iteration.
    pub error_backoff_ms: u64,
    /// Wait after a buy that could not be confirmed.
    pub unconfirmed_backoff_ms: u64,
    /// Pause between completed cycles.
    pub cycle_pause_ms: u64,
    pub max_consecutive_errors: u32,
    pub liquidation_balance_checks: u32,
    pub liquidation_recheck_ms: u64,
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self {
            tab_verify_attempts: 10,
            tab_verify_interval_ms: 300,
            input_settle_ms: 300,
            click_settle_ms: 1_000,
            dialog_wait_ms: 500,
            max_action_retries: 3,
            retry_delay_ms: 2_000,
            poll_interval_ms: 1_000,
            max_poll_checks: 120,
            confirm_settle_ms: 1_000,
            runtime_backoff_ms: 5_000,
            error_backoff_ms: 5_000,
            unconfirmed_backoff_ms: 5_000,
            cycle_pause_ms: 2_000,
            max_consecutive_errors: 3,
            liquidation_balance_checks: 3,
            liquidation_recheck_ms: 1_000,
        }
    }
}

impl CycleTimings {
    pub fn tab_verify_interval(&self) -> Duration {
        Duration::from_millis(self.tab_verify_interval_ms)
    }

    pub fn input_settle(&self) -> Duration {
        Duration::from_millis(self.input_settle_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn dialog_wait(&self) -> Duration {
        Duration::from_millis(self.dialog_wait_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_millis(self.confirm_settle_ms)
    }

    pub fn runtime_backoff(&self) -> Duration {
        Duration::from_millis(self.runtime_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn unconfirmed_backoff(&self) -> Duration {
        Duration::from_millis(self.unconfirmed_backoff_ms)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_millis(self.cycle_pause_ms)
    }

    pub fn liquidation_recheck(&self) -> Duration {
        Duration::from_millis(self.liquidation_recheck_ms)
    }
}

/// Everything the engine components are built from. The order monitor is
/// created once here so every component shares its poll slot.
#[derive(Clone)]
pub struct EngineContext {
    pub ui: Arc<dyn UiAutomation>,
    pub probe: Arc<dyn OrderProbe>,
    pub monitor: OrderMonitor,
    pub activity: ActivityLog,
    pub timings: CycleTimings,
    pub location_pattern: String,
}

impl EngineContext {
    pub fn new(
        ui: Arc<dyn UiAutomation>,
        probe: Arc<dyn OrderProbe>,
        activity: ActivityLog,
        timings: CycleTimings,
        location_pattern: impl Into<String>,
    ) -> Self {
        let monitor = OrderMonitor::new(probe.clone(), activity.clone(), timings.clone());
        Self {
            ui,
            probe,
            monitor,
            activity,
            timings,
            location_pattern: location_pattern.into(),
        }
    }

    pub fn gate(&self) -> SafetyGate {
        SafetyGate::new(self.ui.clone(), self.activity.clone(), self.location_pattern.clone())
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(self.ui.clone(), self.activity.clone(), self.timings.clone())
    }

    pub fn liquidator(&self) -> Liquidator {
        Liquidator::new(
            self.executor(),
            self.monitor.clone(),
            self.probe.clone(),
            self.activity.clone(),
            self.timings.clone(),
        )
    }
}

/// Sleep for `duration` unless `cancel` fires first.
/// Returns `true` if the full duration elapsed.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
