//! ALPHA-TRADER — Autonomous buy/sell cycle driver
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the page adapter and session controller, serves the control API
//! and runs until Ctrl+C, stopping any live session on the way out.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use alpha_trader::automation::paper::PaperPage;
use alpha_trader::automation::probe::PageProbe;
use alpha_trader::config;
use alpha_trader::dashboard;
use alpha_trader::session::SessionController;

const BANNER: &str = r#"
    _    _     ____  _   _    _      _____ ____      _    ____  _____ ____
   / \  | |   |  _ \| | | |  / \    |_   _|  _ \    / \  |  _ \| ____|  _ \
  / _ \ | |   | |_) | |_| | / _ \     | | | |_) |  / _ \ | | | |  _| | |_) |
 / ___ \| |___|  __/|  _  |/ ___ \    | | |  _ <  / ___ \| |_| | |___|  _ <
/_/   \_\_____|_|   |_| |_/_/   \_\   |_| |_| \_\/_/   \_\____/|_____|_| \_\

  Autonomous buy → sell cycle driver
  v0.1.0
"#;

/// How often the main loop logs a status line.
const HEARTBEAT_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        location_pattern = %cfg.trading.location_pattern,
        quote_currency = %cfg.trading.quote_currency,
        "ALPHA-TRADER starting up"
    );

    // -- Initialise components -------------------------------------------

    let page = Arc::new(
        PaperPage::new(&cfg.trading.quote_currency, cfg.paper.quote_balance, cfg.paper.price)
            .with_fill_delay(cfg.paper.fill_delay_polls)
            .with_confirm_dialogs(cfg.paper.confirm_dialogs),
    );
    warn!(
        balance = %cfg.paper.quote_balance,
        price = %cfg.paper.price,
        "No live browser adapter linked, trading against the paper page"
    );
    let probe = Arc::new(PageProbe::new(page.clone(), cfg.trading.quote_currency.clone()));
    let controller = Arc::new(SessionController::new(
        page,
        probe,
        &cfg.trading,
        cfg.timing.clone(),
    ));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(controller.clone(), cfg.dashboard.port).await?;
    }

    // -- Optional auto-start ---------------------------------------------

    if cfg.trading.auto_start {
        let params = controller
            .saved_settings()
            .map(|s| (s.amount, s.max_trade_count))
            .or_else(|| cfg.trading.default_amount.map(|a| (a, cfg.trading.max_trade_count)));
        match params {
            Some((amount, max_trades)) => {
                if let Err(e) = controller.start(amount, max_trades).await {
                    error!(error = %e, "Auto-start failed");
                }
            }
            None => warn!("auto_start is set but no saved settings or default_amount exist"),
        }
    }

    // -- Main loop ---------------------------------------------------------

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Ready. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let status = controller.status().await;
                info!(session = %status.session, polling = status.polling, "Heartbeat");
                if let Some(last) = status.last_run {
                    info!(last_run = %last, "Last run");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    controller.stop().await;
    info!("ALPHA-TRADER shut down cleanly");
    Ok(())
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `ALPHA_TRADER_LOG_JSON` switches
/// to JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alpha_trader=info"));

    let json_logging = std::env::var("ALPHA_TRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
