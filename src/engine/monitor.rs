//! Order monitor.
//!
//! Polls the order probe until the open orders on one side are gone, the
//! session is cancelled, or the tick budget runs out. At most one poll loop
//! may be alive at a time across every clone of a monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::CycleTimings;
use crate::activity::ActivityLog;
use crate::automation::probe::OrderProbe;
use crate::types::{OrderWaitOutcome, Side, TraderError};

/// Held while a poll loop runs; releases the shared slot on drop.
struct PollSlot {
    busy: Arc<AtomicBool>,
}

impl Drop for PollSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct OrderMonitor {
    probe: Arc<dyn OrderProbe>,
    activity: ActivityLog,
    timings: CycleTimings,
    busy: Arc<AtomicBool>,
}

impl OrderMonitor {
    pub fn new(probe: Arc<dyn OrderProbe>, activity: ActivityLog, timings: CycleTimings) -> Self {
        Self {
            probe,
            activity,
            timings,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a poll loop currently holds the slot.
    pub fn is_polling(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<PollSlot, TraderError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TraderError::PollBusy)?;
        Ok(PollSlot {
            busy: self.busy.clone(),
        })
    }

    /// Wait until no order on `side` is outstanding.
    ///
    /// One probe read per tick, bounded by `max_poll_checks`. Cancellation
    /// resolves immediately. Probe errors are logged and count as an
    /// unsuccessful check.
    pub async fn wait_for_completion(
        &self,
        side: Side,
        cancel: &CancellationToken,
    ) -> Result<OrderWaitOutcome, TraderError> {
        let _slot = self.acquire()?;
        let max_checks = self.timings.max_poll_checks;
        self.activity.info(format!("Waiting for {side} order to complete..."));

        let mut ticker = tokio::time::interval(self.timings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; checks start one interval in.
        ticker.tick().await;

        let mut checks: u32 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(side = %side, checks, "Order wait cancelled");
                    return Ok(OrderWaitOutcome::CancelledByStop);
                }
                _ = ticker.tick() => {}
            }

            checks += 1;
            match self.probe.outstanding_orders(side).await {
                Ok(0) => {
                    info!(side = %side, checks, "Order complete");
                    self.activity.success(format!("{side} order complete"));
                    return Ok(OrderWaitOutcome::Completed);
                }
                Ok(open) => {
                    debug!(side = %side, open, checks, "Order still open");
                }
                Err(e) => {
                    warn!(side = %side, checks, error = %e, "Order status check failed");
                    self.activity.error(format!("Failed to check {side} order status: {e:#}"));
                }
            }

            if checks >= max_checks {
                self.activity.error(format!(
                    "Timed out waiting for {side} order after {max_checks} checks"
                ));
                return Ok(OrderWaitOutcome::TimedOut);
            }
        }
    }

    /// Re-check after a settle delay that the buy really filled: nothing
    /// outstanding on the buy side and a positive position.
    pub async fn confirm_buy_filled(&self, cancel: &CancellationToken) -> bool {
        if !super::pause(cancel, self.timings.confirm_settle()).await {
            return false;
        }

        let outstanding = match self.probe.outstanding_orders(Side::Buy).await {
            Ok(n) => n,
            Err(e) => {
                self.activity.error(format!("Buy confirmation failed: {e:#}"));
                return false;
            }
        };
        if outstanding > 0 {
            self.activity
                .error(format!("Buy not confirmed: {outstanding} buy order(s) still open"));
            return false;
        }

        match self.probe.position_balance().await {
            Ok(balance) if balance > rust_decimal::Decimal::ZERO => {
                self.activity.success(format!("Buy confirmed, holding {balance}"));
                true
            }
            Ok(_) => {
                self.activity.error("Buy not confirmed: no position balance found");
                false
            }
            Err(e) => {
                self.activity.error(format!("Buy confirmation failed: {e:#}"));
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
