//! End-to-end scenarios against the scripted mock page.
//!
//! Every test runs on tokio's paused clock, so the real retry, poll and
//! backoff delays apply without wall-clock waiting.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

use alpha_trader::automation::probe::PageProbe;
use alpha_trader::automation::Control;
use alpha_trader::config::TradingConfig;
use alpha_trader::engine::CycleTimings;
use alpha_trader::session::SessionController;
use alpha_trader::types::{CycleState, EndReason, LiquidationReport, Side, TraderError};

use crate::mock_page::{MockPage, PATTERN};

fn trading() -> TradingConfig {
    TradingConfig {
        location_pattern: PATTERN.to_string(),
        quote_currency: "USDT".to_string(),
        default_amount: None,
        max_trade_count: 0,
        auto_start: false,
        settings_file: None,
    }
}

fn controller(page: &MockPage) -> Arc<SessionController> {
    let ui = Arc::new(page.clone());
    let probe = Arc::new(PageProbe::new(ui.clone(), "USDT"));
    Arc::new(SessionController::new(ui, probe, &trading(), CycleTimings::default()))
}

fn logged(ctl: &SessionController, needle: &str) -> usize {
    ctl.activity()
        .snapshot()
        .iter()
        .filter(|e| e.message.contains(needle))
        .count()
}

fn order_reads(page: &MockPage, side: Side) -> usize {
    let prefix = format!("find_all open {side} order row#0");
    page.calls().iter().filter(|c| **c == prefix).count()
}

// ---- Validation ----

#[tokio::test(start_paused = true)]
async fn test_invalid_amount_touches_nothing() {
    let page = MockPage::new(dec!(100));
    let ctl = controller(&page);

    for input in ["0.05", "0.0999", "0", "-5", "abc", ""] {
        let err = assert_err!(ctl.start_from_input(input, 0).await);
        assert!(matches!(err, TraderError::Validation(_)), "{input}: {err:?}");
    }
    assert_err!(ctl.start(dec!(0.09), 3).await);

    assert_eq!(page.call_count(), 0);
    let session = ctl.session().await;
    assert!(!session.running);
    assert!(session.id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_minimum_amount_accepted() {
    let page = MockPage::new(dec!(100));
    let ctl = controller(&page);
    ctl.start(dec!(0.1), 1).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();
    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(page.buys_placed(), 1);
}

// ---- Preconditions ----

#[tokio::test(start_paused = true)]
async fn test_preconditions_refuse_start() {
    let cases: Vec<(&str, Box<dyn Fn(&MockPage)>)> = vec![
        ("trading page", Box::new(|p: &MockPage| p.set_location("https://www.binance.com/en/futures"))),
        ("not logged in", Box::new(|p: &MockPage| p.set_logged_in(false))),
        ("trading interface not found", Box::new(|p: &MockPage| p.remove(Control::TradingPanel))),
        ("network", Box::new(|p: &MockPage| p.set_online(false))),
    ];

    for (reason, break_page) in cases {
        let page = MockPage::new(dec!(100));
        break_page(&page);
        let ctl = controller(&page);

        let err = assert_err!(ctl.start(dec!(10), 0).await);
        assert!(matches!(err, TraderError::Precondition(ref r) if r.contains(reason)), "{err:?}");
        assert!(!ctl.session().await.running);
        assert_eq!(logged(&ctl, "Safety check failed"), 1);
        assert_eq!(page.clicks_on("submit-buy"), 0);
    }
}

// ---- Trade-count governor ----

#[tokio::test(start_paused = true)]
async fn test_two_cycles_then_auto_stop_once() {
    let page = MockPage::new(dec!(100));
    let ctl = controller(&page);

    ctl.start(dec!(10), 2).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(summary.trades_completed, 2);
    assert_eq!(page.buys_placed(), 2);
    assert_eq!(page.sells_placed(), 2);
    assert_eq!(logged(&ctl, "Auto-stop: liquidating position"), 1);

    let session = ctl.session().await;
    assert!(!session.running);
    assert_eq!(session.state, CycleState::Idle);
    assert_eq!(session.current_trade_count, 0);
    assert_eq!(page.position(), Decimal::ZERO);
    assert_eq!(page.quote(), dec!(100));
}

#[tokio::test(start_paused = true)]
async fn test_never_exceeds_trade_limit() {
    let page = MockPage::new(dec!(1000));
    let ctl = controller(&page);

    ctl.start(dec!(10), 7).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();
    assert_eq!(summary.trades_completed, 7);
    assert_eq!(page.buys_placed(), 7);
    assert_eq!(page.sells_placed(), 7);
    assert_eq!(logged(&ctl, "before auto-stop"), 2);
    assert_eq!(logged(&ctl, "trades remaining"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auto_stop_reports_residual_balance() {
    let page = MockPage::new(dec!(100));
    page.leave_dust(dec!(0.5));
    let ctl = controller(&page);

    ctl.start(dec!(10), 1).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(logged(&ctl, "check manually"), 1);
    assert_eq!(logged(&ctl, "position may remain"), 1);
    assert!(!ctl.session().await.running);
}

// ---- Stop ----

#[tokio::test(start_paused = true)]
async fn test_stop_when_idle_is_a_no_op() {
    let page = MockPage::new(dec!(100));
    let ctl = controller(&page);

    ctl.stop().await;
    ctl.stop().await;

    assert!(ctl.activity().is_empty());
    assert_eq!(page.call_count(), 0);
    assert!(ctl.last_run().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_monitor_ends_polling() {
    let page = MockPage::new(dec!(100));
    page.fill_after(1_000);
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ctl.session().await.state, CycleState::MonitoringBuy);
    assert!(order_reads(&page, Side::Buy) > 0);

    ctl.stop().await;
    let reads = order_reads(&page, Side::Buy);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(order_reads(&page, Side::Buy), reads);
    let status = ctl.status().await;
    assert!(!status.polling);
    assert!(!status.session.running);
    assert_eq!(status.last_run.unwrap().ended_by, EndReason::Stopped);
    assert_eq!(logged(&ctl, "Trading stopped"), 1);

    // A fresh session can start once the old poll is gone.
    ctl.start(dec!(10), 0).await.unwrap();
    ctl.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_reaches_cycle_while_a_waiter_is_pending() {
    let page = MockPage::new(dec!(100));
    page.fill_after(1_000);
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    let waiter = tokio::spawn({
        let ctl = ctl.clone();
        async move { ctl.wait_finished().await }
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(ctl.status().await.polling);

    ctl.stop().await;
    let reads = order_reads(&page, Side::Buy);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(order_reads(&page, Side::Buy), reads);
    assert!(!ctl.status().await.polling);
    let summary = waiter.await.unwrap().unwrap();
    assert_eq!(summary.ended_by, EndReason::Stopped);

    // Only one cycle runs after a restart.
    ctl.start(dec!(10), 0).await.unwrap();
    assert_err!(ctl.start(dec!(10), 0).await);
    ctl.emergency_stop().await;
    assert!(!ctl.status().await.polling);
    assert!(!ctl.session().await.running);
}

// ---- Order monitor ----

#[tokio::test(start_paused = true)]
async fn test_unfilled_buy_times_out_as_cycle_error() {
    let page = MockPage::new(dec!(100));
    page.never_fill();
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    tokio::time::sleep(Duration::from_secs(125)).await;

    assert_eq!(order_reads(&page, Side::Buy), 120);
    assert_eq!(logged(&ctl, "Timed out waiting for buy order after 120 checks"), 1);
    let session = ctl.session().await;
    assert_eq!(session.consecutive_errors, 1);
    assert_eq!(session.current_trade_count, 0);
    assert_eq!(page.clicks_on("submit-sell"), 0);

    ctl.stop().await;
}

// ---- Error budget ----

#[tokio::test(start_paused = true)]
async fn test_failing_buy_exhausts_error_budget() {
    let page = MockPage::new(dec!(100));
    page.fail_submits(100);
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::ErrorBudget);
    assert_eq!(summary.consecutive_errors, 3);
    assert_eq!(page.clicks_on("submit-buy"), 9);
    assert_eq!(page.clicks_on("tab-sell"), 0);
    assert_eq!(page.clicks_on("submit-sell"), 0);
    assert_eq!(logged(&ctl, "Buy failed (3/3)"), 3);
    assert_eq!(logged(&ctl, "3 consecutive errors"), 1);

    let session = ctl.session().await;
    assert!(!session.running);
    assert_eq!(session.state, CycleState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_error_count() {
    let page = MockPage::new(dec!(100));
    // Two whole buy sequences fail, then the third round succeeds.
    page.fail_submits(6);
    let ctl = controller(&page);

    ctl.start(dec!(10), 1).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(summary.trades_completed, 1);
    assert_eq!(summary.consecutive_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_sell_tab_is_a_cycle_error() {
    let page = MockPage::new(dec!(100));
    page.freeze_tabs();
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::ErrorBudget);
    assert_eq!(page.buys_placed(), 3);
    assert_eq!(page.sells_placed(), 0);
    assert!(logged(&ctl, "sell tab did not become active after 10 checks") >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_dialog_without_confirm_fails_buy() {
    let page = MockPage::new(dec!(100));
    page.with_dialogs(false);
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::ErrorBudget);
    assert_eq!(page.buys_placed(), 0);
    assert!(logged(&ctl, "confirmation dialog has no confirm button") >= 1);
}

// ---- Buy confirmation ----

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_buy_skips_sell() {
    let page = MockPage::new(dec!(100));
    page.withhold_buy_credit();
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let session = ctl.session().await;
    assert!(session.running);
    assert_eq!(session.current_trade_count, 0);
    assert_eq!(session.consecutive_errors, 0);
    assert!(page.buys_placed() >= 2);
    assert_eq!(page.clicks_on("submit-sell"), 0);
    assert!(logged(&ctl, "no position balance") >= 2);

    ctl.stop().await;
}

// ---- Runtime checks ----

#[tokio::test(start_paused = true)]
async fn test_network_drop_pauses_without_counting() {
    let page = MockPage::new(dec!(100));
    let ctl = controller(&page);

    ctl.start(dec!(10), 1).await.unwrap();
    page.set_online(false);
    tokio::time::sleep(Duration::from_secs(12)).await;

    assert_eq!(page.buys_placed(), 0);
    assert_eq!(ctl.session().await.consecutive_errors, 0);
    assert!(logged(&ctl, "Network connection lost") >= 2);

    page.set_online(true);
    let summary = ctl.wait_finished().await.unwrap();
    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(summary.trades_completed, 1);
}

// ---- Lookup fallbacks ----

#[tokio::test(start_paused = true)]
async fn test_fallback_strategies_and_dialogs() {
    let page = MockPage::new(dec!(100));
    page.answer_at(Control::SubmitButton(Side::Buy), 2);
    page.answer_at(Control::Tab(Side::Sell), 3);
    page.answer_at(Control::DialogConfirmButton(Side::Buy), 2);
    page.answer_at(Control::DialogConfirmButton(Side::Sell), 3);
    page.remove(Control::QuantitySlider);
    page.with_dialogs(true);
    let ctl = controller(&page);

    ctl.start(dec!(10), 1).await.unwrap();
    let summary = ctl.wait_finished().await.unwrap();

    assert_eq!(summary.ended_by, EndReason::AutoStop);
    assert_eq!(page.buys_placed(), 1);
    assert_eq!(page.sells_placed(), 1);
    assert_eq!(page.clicks_on("max"), 1);
    assert_eq!(page.clicks_on("dialog-confirm"), 2);
    assert_eq!(page.total_input(), "10");
}

// ---- Emergency stop ----

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_during_buy_monitoring() {
    let page = MockPage::new(dec!(100));
    page.fill_after(1_000);
    let ctl = controller(&page);

    ctl.start(dec!(10), 0).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ctl.session().await.state, CycleState::MonitoringBuy);

    page.fill_after(1);
    page.seed_position(dec!(5));
    let emergency = {
        let ctl = ctl.clone();
        tokio::spawn(async move { ctl.emergency_stop().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctl.session().await.state, CycleState::EmergencyStop);
    assert!(!ctl.status().await.polling);

    let buy_reads = order_reads(&page, Side::Buy);
    let report = emergency.await.unwrap();

    assert_eq!(report, LiquidationReport::Sold { balance: dec!(5) });
    assert_eq!(order_reads(&page, Side::Buy), buy_reads);
    assert_eq!(page.active_tab(), Side::Sell);
    assert_eq!(page.position(), Decimal::ZERO);

    let status = ctl.status().await;
    assert_eq!(status.session.state, CycleState::Idle);
    assert!(!status.session.running);
    assert_eq!(status.last_run.unwrap().ended_by, EndReason::EmergencyStop);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_never_raises() {
    let page = MockPage::new(dec!(100));
    page.seed_position(dec!(5));
    page.never_fill();
    page.freeze_tabs();
    let ctl = controller(&page);

    let report = ctl.emergency_stop().await;

    assert!(!report.is_flat());
    assert!(logged(&ctl, "could not activate sell tab") == 1);
    assert_eq!(ctl.last_run().unwrap().ended_by, EndReason::EmergencyStop);
}
