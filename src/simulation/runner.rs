//! Headless batch runner.
//!
//! Plays complete rounds back to back (tick until settled) against one
//! session and summarises the platform-level result.

use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::engine::{OperatorOverride, RoundSettlement, SimulationSession};
use crate::error::EngineError;
use crate::players::{next_round_input, BetGenerator, PlayerDirectory};
use crate::strategy::selector::SelectionReason;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// How often each selection path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SelectionCounts {
    pub within_confidence: u64,
    pub payout_capped: u64,
    pub fallback: u64,
    pub forced: u64,
}

impl SelectionCounts {
    fn record(&mut self, reason: SelectionReason) {
        match reason {
            SelectionReason::WithinConfidence { .. } => self.within_confidence += 1,
            SelectionReason::PayoutCapped => self.payout_capped += 1,
            SelectionReason::Fallback => self.fallback += 1,
            SelectionReason::Forced => self.forced += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.within_confidence + self.payout_capped + self.fallback + self.forced
    }
}

/// State after one round, for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundPoint {
    pub round_id: u64,
    pub pool_value: Decimal,
    pub target_rtp: f64,
    pub round_rtp: f64,
    pub cumulative_rtp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub rounds_run: u64,
    pub total_wagered: f64,
    pub total_paid: f64,
    /// Paid over wagered; 1.0 when nothing was wagered.
    pub realised_rtp: f64,
    pub platform_profit: f64,
    pub initial_pool: Decimal,
    pub final_pool: Decimal,
    pub final_target_rtp: f64,
    pub selections: SelectionCounts,
    pub trajectory: Vec<RoundPoint>,
}

fn ratio_or_one(paid: f64, wagered: f64) -> f64 {
    if wagered > 0.0 {
        paid / wagered
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct SimulationRunner<P> {
    session: SimulationSession,
    players: P,
    operator: OperatorOverride,
}

impl<P> SimulationRunner<P>
where
    P: BetGenerator + PlayerDirectory,
{
    pub fn new(session: SimulationSession, players: P) -> Self {
        Self {
            session,
            players,
            operator: OperatorOverride::new(),
        }
    }

    /// Share an override slot with every round this runner plays.
    pub fn with_override(mut self, operator: OperatorOverride) -> Self {
        self.operator = operator;
        self
    }

    /// Play one full round.
    pub fn play_round(&mut self) -> Result<RoundSettlement, EngineError> {
        let round_id = self.session.next_round_id();
        let input = next_round_input(&mut self.players, round_id);
        let mut round = self
            .session
            .begin_round(input)
            .with_override(self.operator.clone());
        round.run_to_completion(&mut self.session)
    }

    /// Play `rounds` full rounds.
    pub fn run(&mut self, rounds: u64) -> Result<SimulationReport, EngineError> {
        let initial_pool = self.session.pool().value();
        let mut total_wagered = 0.0;
        let mut total_paid = 0.0;
        let mut selections = SelectionCounts::default();
        let mut trajectory = Vec::with_capacity(rounds as usize);

        for _ in 0..rounds {
            let settled = self.play_round()?;
            total_wagered += settled.total_wagered;
            total_paid += settled.total_payout;
            selections.record(settled.reason);
            trajectory.push(RoundPoint {
                round_id: settled.round_id,
                pool_value: settled.pool_after,
                target_rtp: settled.target_rtp,
                round_rtp: ratio_or_one(settled.total_payout, settled.total_wagered),
                cumulative_rtp: ratio_or_one(total_paid, total_wagered),
            });
        }

        let report = SimulationReport {
            rounds_run: rounds,
            total_wagered,
            total_paid,
            realised_rtp: ratio_or_one(total_paid, total_wagered),
            platform_profit: total_wagered - total_paid,
            initial_pool,
            final_pool: self.session.pool().value(),
            final_target_rtp: self.session.pool().current_target_rtp(),
            selections,
            trajectory,
        };

        info!(
            rounds = report.rounds_run,
            wagered = format!("{:.2}", report.total_wagered),
            paid = format!("{:.2}", report.total_paid),
            rtp = format!("{:.4}", report.realised_rtp),
            pool = %report.final_pool.round_dp(2),
            "Simulation complete"
        );

        Ok(report)
    }

    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    pub fn players(&self) -> &P {
        &self.players
    }

    pub fn into_session(self) -> SimulationSession {
        self.session
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::settlement::to_money;
    use crate::players::SyntheticPlayers;
    use crate::types::{OutcomeArea, WinningStructure};

    fn runner(seed: u64) -> SimulationRunner<SyntheticPlayers> {
        let rules = AppConfig::default().rules().unwrap();
        let players = SyntheticPlayers::new(60, seed, rules.payouts);
        SimulationRunner::new(SimulationSession::new(rules, seed), players)
    }

    #[test]
    fn test_report_totals_match_ledger() {
        let mut runner = runner(4);
        let report = runner.run(15).unwrap();

        assert_eq!(report.rounds_run, 15);
        assert_eq!(report.trajectory.len(), 15);
        assert_eq!(report.selections.total(), 15);

        let ledger = runner.session().ledger();
        assert_eq!(ledger.rounds().len(), 15);
        let wagered: f64 = ledger.rounds().iter().map(|r| r.total_bet).sum();
        let paid: f64 = ledger.rounds().iter().map(|r| r.total_payout).sum();
        assert!((wagered - report.total_wagered).abs() < 1e-6);
        assert!((paid - report.total_paid).abs() < 1e-6);
        assert_eq!(report.trajectory.last().unwrap().pool_value, report.final_pool);
    }

    #[test]
    fn test_pool_reconciles_with_player_entries() {
        let mut runner = runner(12);
        let report = runner.run(10).unwrap();
        let tax = runner.session().pool().tax_rate();

        let expected = runner
            .session()
            .ledger()
            .players()
            .iter()
            .fold(report.initial_pool, |pool, e| {
                pool + to_money(e.total_bet) * (Decimal::ONE - tax) - to_money(e.payout)
            });
        assert_eq!(report.final_pool, expected);
    }

    #[test]
    fn test_forced_rounds_are_counted() {
        let operator = OperatorOverride::new();
        let mut runner = runner(2).with_override(operator.clone());
        let areas = vec![OutcomeArea::new(3).unwrap()];
        operator.set(WinningStructure::new(areas.clone(), 1930));

        let report = runner.run(3).unwrap();
        assert_eq!(report.selections.forced, 1);
        assert_eq!(runner.session().ledger().rounds()[0].winning_areas, areas);
    }

    #[test]
    fn test_zero_rounds() {
        let mut runner = runner(1);
        let report = runner.run(0).unwrap();
        assert_eq!(report.rounds_run, 0);
        assert_eq!(report.realised_rtp, 1.0);
        assert_eq!(report.final_pool, report.initial_pool);
    }
}
