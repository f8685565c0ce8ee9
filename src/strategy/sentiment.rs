//! Player sentiment ("memory effect") scoring.
//!
//! Simulates how each candidate structure would move the decay-weighted
//! profit memory of players who both wagered this round and have recharged,
//! then measures the recharge-weighted dispersion of those simulated
//! sentiments. Lower dispersion means the structure disturbs paying players
//! less evenly, which is used as a tie-breaker between acceptable
//! structures.
//!
//! Every recharging, wagering player is included regardless of how extreme
//! their current sentiment is.

use serde::Serialize;
use tracing::debug;

use crate::config::GameRules;
use crate::engine::ledger::{decay_weighted_sum, normalised_profit, Ledger};
use crate::types::{AreaBets, BetSheet, PlayerId, Recharges, WinningStructure};

/// Memory effect of one candidate structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEffect {
    pub structure: WinningStructure,
    pub memory_effect: f64,
    pub affected_players: Vec<PlayerId>,
}

/// History a player brings into the round; independent of the structure.
struct PlayerMemory<'b> {
    player_id: &'b PlayerId,
    bets: &'b AreaBets,
    recharge: f64,
    trailing_wagered: Vec<f64>,
    /// Most recent first.
    trailing_profits: Vec<f64>,
}

/// Recharge-weighted standard deviation around the weighted mean; 0 when
/// the total weight is 0.
pub fn weighted_dispersion(samples: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = samples.iter().map(|(w, _)| w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let mean = samples.iter().map(|(w, x)| w * x).sum::<f64>() / total_weight;
    let variance = samples
        .iter()
        .map(|(w, x)| w * (x - mean).powi(2))
        .sum::<f64>()
        / total_weight;
    variance.sqrt()
}

pub struct SentimentScorer<'a> {
    rules: &'a GameRules,
    ledger: &'a Ledger,
}

impl<'a> SentimentScorer<'a> {
    pub fn new(rules: &'a GameRules, ledger: &'a Ledger) -> Self {
        Self { rules, ledger }
    }

    /// Memory effect for every configured structure, in configuration
    /// order. Reads the ledger only.
    pub fn evaluate_memory_effect(
        &self,
        bets: &BetSheet,
        recharges: &Recharges,
        round_id: u64,
    ) -> Vec<MemoryEffect> {
        let window = self.rules.memory_window;

        let members: Vec<PlayerMemory<'_>> = bets
            .iter()
            .filter(|(_, b)| b.total() > 0.0)
            .filter_map(|(pid, b)| {
                let recharge = recharges.get(pid).copied().unwrap_or(0.0);
                if recharge <= 0.0 {
                    return None;
                }
                Some(PlayerMemory {
                    player_id: pid,
                    bets: b,
                    recharge,
                    trailing_wagered: self
                        .ledger
                        .recent_wagered_amounts(pid, round_id, window)
                        .collect(),
                    trailing_profits: self
                        .ledger
                        .recent_memory_profits(pid, round_id, window)
                        .collect(),
                })
            })
            .collect();

        self.rules
            .structures
            .iter()
            .map(|structure| {
                let samples: Vec<(f64, f64)> = members
                    .iter()
                    .map(|m| (m.recharge, self.simulated_sentiment(m, structure)))
                    .collect();
                let memory_effect = weighted_dispersion(&samples);

                debug!(
                    structure = %structure,
                    players = members.len(),
                    memory_effect = format!("{memory_effect:.4}"),
                    "Memory effect evaluated"
                );

                MemoryEffect {
                    structure: structure.clone(),
                    memory_effect,
                    affected_players: members.iter().map(|m| m.player_id.clone()).collect(),
                }
            })
            .collect()
    }

    /// Decay-weighted sentiment if `structure` were drawn: this round's
    /// simulated memory profit first, then recorded history newest to
    /// oldest.
    fn simulated_sentiment(&self, member: &PlayerMemory<'_>, structure: &WinningStructure) -> f64 {
        let stake = member.bets.total();
        let payout = self.rules.payouts.payout(member.bets, &structure.areas);
        let simulated_profit =
            normalised_profit(payout - stake, member.trailing_wagered.iter().copied());

        let combined = std::iter::once(simulated_profit)
            .chain(member.trailing_profits.iter().copied());
        decay_weighted_sum(
            combined,
            self.rules.memory_decay_alpha,
            self.rules.memory_window,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
