//! RTP control entry point.
//!
//! Loads configuration, initialises structured logging, builds the session
//! and synthetic player population, optionally serves the dashboard, and
//! ticks rounds on a fixed interval until `max_rounds` or Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use rtp_control::config::AppConfig;
use rtp_control::dashboard::{self, DashboardState};
use rtp_control::engine::{
    OperatorOverride, RoundController, RoundSettlement, SimulationSession, TickEvent,
};
use rtp_control::players::{next_round_input, SyntheticPlayers};

const BANNER: &str = r#"
  ____ _____ ____     ____            _             _
 |  _ \_   _|  _ \   / ___|___  _ __ | |_ _ __ ___ | |
 | |_) || | | |_) | | |   / _ \| '_ \| __| '__/ _ \| |
 |  _ < | | |  __/  | |__| (_) | | | | |_| | | (_) | |
 |_| \_\|_| |_|      \____\___/|_| |_|\__|_|  \___/|_|

  Round outcome selection with RTP and liquidity control
"#;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_or_default(CONFIG_PATH)?;
    init_logging();

    println!("{BANNER}");

    let rules = cfg
        .rules()
        .with_context(|| format!("Invalid configuration in {CONFIG_PATH}"))?;
    let mut session = SimulationSession::new(rules, cfg.simulation.seed);
    let mut players = SyntheticPlayers::new(
        cfg.simulation.players,
        cfg.simulation.seed,
        session.rules().payouts,
    );
    let operator = OperatorOverride::new();

    info!(
        session_id = %session.id(),
        players = players.len(),
        tick_millis = cfg.simulation.tick_millis,
        max_rounds = cfg.simulation.max_rounds,
        "Simulation starting"
    );

    let dashboard_state = if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(&session, operator.clone()));
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
        Some(state)
    } else {
        None
    };

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.simulation.tick_millis.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut round = start_round(&mut session, &mut players, &operator);
    let mut rounds_settled: u64 = 0;
    let mut total_wagered = 0.0;
    let mut total_paid = 0.0;

    info!("Entering main loop. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let event = match round.tick(&mut session) {
                    Ok(event) => event,
                    Err(e) => {
                        error!(error = %e, "Round failed, starting a new one");
                        round = start_round(&mut session, &mut players, &operator);
                        continue;
                    }
                };

                if let Some(state) = &dashboard_state {
                    state.publish(round.snapshot(&session), &session).await;
                }

                if let TickEvent::Settled(settlement) = event {
                    rounds_settled += 1;
                    total_wagered += settlement.total_wagered;
                    total_paid += settlement.total_payout;
                    if let Some(state) = &dashboard_state {
                        state.record_settlement(&settlement).await;
                    }
                    log_settlement(&settlement);

                    let max_rounds = cfg.simulation.max_rounds;
                    if max_rounds > 0 && rounds_settled >= max_rounds {
                        info!(rounds = rounds_settled, "Round limit reached.");
                        break;
                    }
                    round = start_round(&mut session, &mut players, &operator);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let rtp = if total_wagered > 0.0 { total_paid / total_wagered } else { 1.0 };
    info!(
        rounds = rounds_settled,
        wagered = format!("{total_wagered:.2}"),
        paid = format!("{total_paid:.2}"),
        rtp = format!("{rtp:.4}"),
        pool = %session.pool().value().round_dp(2),
        target_rtp = session.pool().current_target_rtp(),
        "Simulation shut down cleanly."
    );

    Ok(())
}

fn start_round(
    session: &mut SimulationSession,
    players: &mut SyntheticPlayers,
    operator: &OperatorOverride,
) -> RoundController {
    let input = next_round_input(players, session.next_round_id());
    session.begin_round(input).with_override(operator.clone())
}

fn log_settlement(settlement: &RoundSettlement) {
    let round_rtp = if settlement.total_wagered > 0.0 {
        settlement.total_payout / settlement.total_wagered
    } else {
        1.0
    };
    info!(
        round = settlement.round_id,
        outcome = %settlement.outcome,
        reason = %settlement.reason,
        round_rtp = format!("{round_rtp:.4}"),
        profit = format!("{:.2}", settlement.platform_profit),
        "Round complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rtp_control=info"));

    let json_logging = std::env::var("RTP_CONTROL_LOG_JSON").is_ok();

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
