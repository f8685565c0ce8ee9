//! Settlement: pays out a finished round and records it.
//!
//! For every player in the sheet: stake into the pool (net of tax), payout
//! out of it, account update, ledger detail. Then one round summary.

use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::engine::session::SimulationSession;
use crate::strategy::selector::SelectionReason;
use crate::types::{BetSheet, PlayerId, WinningStructure};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSettlement {
    pub player_id: PlayerId,
    pub stake: f64,
    pub payout: f64,
}

/// Summary of a settled round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSettlement {
    pub round_id: u64,
    pub outcome: WinningStructure,
    pub reason: SelectionReason,
    pub total_wagered: f64,
    pub total_payout: f64,
    pub platform_profit: f64,
    pub pool_before: Decimal,
    pub pool_after: Decimal,
    /// Target RTP for the pool level after settlement.
    pub target_rtp: f64,
    pub players: Vec<PlayerSettlement>,
}

/// Stake or payout as pool money. Non-finite amounts never reach here from
/// a validated sheet; they would count as zero.
pub(crate) fn to_money(amount: f64) -> Decimal {
    Decimal::from_f64(amount).unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Cashier
// ---------------------------------------------------------------------------

pub struct Cashier;

impl Cashier {
    /// Apply `outcome` to `bets` against the session's persistent state.
    pub fn settle(
        session: &mut SimulationSession,
        round_id: u64,
        bets: &BetSheet,
        outcome: &WinningStructure,
        reason: SelectionReason,
    ) -> RoundSettlement {
        let pool_before = session.pool.value();
        let mut players = Vec::with_capacity(bets.len());

        for (player_id, area_bets) in bets.iter() {
            let stake = area_bets.total();
            let payout = session.rules.payouts.payout(area_bets, &outcome.areas);

            session.pool.inflow(to_money(stake));
            session.pool.outflow(to_money(payout));

            session
                .accounts
                .entry(player_id.clone())
                .or_default()
                .update(stake, payout);

            session
                .ledger
                .record_player_detail(round_id, player_id, *area_bets, stake, payout);

            players.push(PlayerSettlement {
                player_id: player_id.clone(),
                stake,
                payout,
            });
        }

        let total_wagered: f64 = players.iter().map(|p| p.stake).sum();
        let total_payout: f64 = players.iter().map(|p| p.payout).sum();
        session.ledger.record_round_summary(
            round_id,
            bets,
            bets.area_totals(),
            &outcome.areas,
            total_wagered,
            total_payout,
        );

        let pool_after = session.pool.value();
        let target_rtp = session.pool.current_target_rtp();

        info!(
            round_id,
            outcome = %outcome,
            reason = %reason,
            players = players.len(),
            wagered = format!("{total_wagered:.2}"),
            paid = format!("{total_payout:.2}"),
            pool = %pool_after.round_dp(2),
            target_rtp,
            "Round settled"
        );

        RoundSettlement {
            round_id,
            outcome: outcome.clone(),
            reason,
            total_wagered,
            total_payout,
            platform_profit: total_wagered - total_payout,
            pool_before,
            pool_after,
            target_rtp,
            players,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
