//! Position liquidation.
//!
//! Shared by auto-stop and emergency stop: force the sell tab, then sell
//! whatever position is left and verify the balance reads zero afterwards.
//! Nothing in here returns an error to the caller; every failure ends up in
//! the activity log and the returned report.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::executor::ActionExecutor;
use super::monitor::OrderMonitor;
use super::CycleTimings;
use crate::activity::ActivityLog;
use crate::automation::probe::OrderProbe;
use crate::types::{LiquidationReport, OrderWaitOutcome, Side, TraderError};

pub struct Liquidator {
    executor: ActionExecutor,
    monitor: OrderMonitor,
    probe: Arc<dyn OrderProbe>,
    activity: ActivityLog,
    timings: CycleTimings,
}

impl Liquidator {
    pub fn new(
        executor: ActionExecutor,
        monitor: OrderMonitor,
        probe: Arc<dyn OrderProbe>,
        activity: ActivityLog,
        timings: CycleTimings,
    ) -> Self {
        Self {
            executor,
            monitor,
            probe,
            activity,
            timings,
        }
    }

    /// Force the sell tab and sell everything. `trigger` names the caller
    /// in the log ("Auto-stop", "Emergency stop").
    pub async fn liquidate(&self, trigger: &str) -> LiquidationReport {
        self.activity.info(format!("{trigger}: liquidating position"));

        if let Err(e) = self.executor.switch_tab(Side::Sell).await {
            self.activity
                .error(format!("{trigger}: could not activate sell tab: {e}"));
        }

        let report = match self.safe_sell_all().await {
            Ok(report) => report,
            Err(e) => {
                self.activity.error(format!("{trigger}: {e}"));
                LiquidationReport::Failed {
                    reason: e.to_string(),
                }
            }
        };
        info!(trigger, report = ?report, "Liquidation finished");
        report
    }

    /// Sell the full position if there is one.
    ///
    /// The completion wait uses its own token so that the stop which
    /// triggered liquidation cannot cut it short.
    pub async fn safe_sell_all(&self) -> Result<LiquidationReport, TraderError> {
        let Some(balance) = self.find_position().await else {
            self.activity.success("No position to sell");
            return Ok(LiquidationReport::NothingToSell);
        };
        self.activity.info(format!("Selling position of {balance}"));

        self.executor.maximize_quantity().await?;
        self.executor.click_submit(Side::Sell).await?;
        self.executor.dismiss_confirmation(Side::Sell).await?;

        let uncancelled = CancellationToken::new();
        match self.monitor.wait_for_completion(Side::Sell, &uncancelled).await? {
            OrderWaitOutcome::Completed => {}
            OrderWaitOutcome::TimedOut | OrderWaitOutcome::CancelledByStop => {
                return Err(TraderError::Liquidation(
                    "sell order did not complete".to_string(),
                ));
            }
        }

        tokio::time::sleep(self.timings.confirm_settle()).await;
        let remaining = self
            .probe
            .position_balance()
            .await
            .map_err(|e| TraderError::Liquidation(format!("could not re-check balance: {e:#}")))?;

        if remaining > Decimal::ZERO {
            self.activity.error(format!(
                "Residual balance of {remaining} remains after liquidation, check manually"
            ));
            return Ok(LiquidationReport::Residual { remaining });
        }

        self.activity.success(format!("Position of {balance} liquidated"));
        Ok(LiquidationReport::Sold { balance })
    }

    /// Up to `liquidation_balance_checks` reads, spaced apart, until a
    /// positive balance shows up.
    async fn find_position(&self) -> Option<Decimal> {
        let checks = self.timings.liquidation_balance_checks.max(1);
        for attempt in 1..=checks {
            match self.probe.position_balance().await {
                Ok(balance) if balance > Decimal::ZERO => return Some(balance),
                Ok(_) => {}
                Err(e) => warn!(attempt, error = %e, "Balance check failed"),
            }
            if attempt < checks {
                tokio::time::sleep(self.timings.liquidation_recheck()).await;
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
