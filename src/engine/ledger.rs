//! Append-only round and player history.
//!
//! Every memory/decay statistic is derived from this log by walking it
//! backward from a given round, skipping rounds where the player did not
//! wager. Entries are never mutated after they are appended.

use serde::Serialize;
use tracing::debug;

use crate::types::{AreaBets, BetSheet, OutcomeArea, PlayerId};

/// Averages at or below this are treated as zero.
const AVERAGE_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Platform-level view of one settled round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundLedgerEntry {
    pub round_id: u64,
    pub bets_by_player: BetSheet,
    pub area_totals: AreaBets,
    pub winning_areas: Vec<OutcomeArea>,
    pub total_bet: f64,
    pub total_payout: f64,
    pub platform_profit: f64,
}

/// One player's result in one settled round.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerLedgerEntry {
    pub round_id: u64,
    pub player_id: PlayerId,
    pub area_bets: AreaBets,
    pub total_bet: f64,
    pub payout: f64,
    pub net_profit: f64,
    /// Net profit normalised by the player's trailing average stake.
    pub memory_profit: f64,
}

// ---------------------------------------------------------------------------
// Decay helpers
// ---------------------------------------------------------------------------

/// Σ value[i] · e^(−α·i) over at most `window` values, i = 0 first.
pub fn decay_weighted_sum(values: impl IntoIterator<Item = f64>, alpha: f64, window: usize) -> f64 {
    values
        .into_iter()
        .take(window)
        .enumerate()
        .map(|(i, v)| v * (-alpha * i as f64).exp())
        .sum()
}

/// `net_profit / mean(wagered)`, or 0 with no history or a ~0 mean.
pub fn normalised_profit(net_profit: f64, wagered: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = wagered
        .into_iter()
        .fold((0.0, 0usize), |(s, n), w| (s + w, n + 1));
    if count == 0 {
        return 0.0;
    }
    let average = sum / count as f64;
    if average.abs() <= AVERAGE_EPSILON {
        0.0
    } else {
        net_profit / average
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Ledger {
    memory_window: usize,
    decay_alpha: f64,
    rounds: Vec<RoundLedgerEntry>,
    players: Vec<PlayerLedgerEntry>,
}

impl Ledger {
    pub fn new(memory_window: usize, decay_alpha: f64) -> Self {
        Self {
            memory_window,
            decay_alpha,
            rounds: Vec::new(),
            players: Vec::new(),
        }
    }

    pub fn memory_window(&self) -> usize {
        self.memory_window
    }

    pub fn decay_alpha(&self) -> f64 {
        self.decay_alpha
    }

    /// Append the aggregate record for a settled round.
    pub fn record_round_summary(
        &mut self,
        round_id: u64,
        bets_by_player: &BetSheet,
        area_totals: AreaBets,
        winning_areas: &[OutcomeArea],
        total_bet: f64,
        total_payout: f64,
    ) -> &RoundLedgerEntry {
        self.rounds.push(RoundLedgerEntry {
            round_id,
            bets_by_player: bets_by_player.clone(),
            area_totals,
            winning_areas: winning_areas.to_vec(),
            total_bet,
            total_payout,
            platform_profit: total_bet - total_payout,
        });
        &self.rounds[self.rounds.len() - 1]
    }

    /// Append one player's result, deriving net and memory profit from the
    /// history recorded so far.
    pub fn record_player_detail(
        &mut self,
        round_id: u64,
        player_id: &str,
        area_bets: AreaBets,
        total_bet: f64,
        payout: f64,
    ) -> &PlayerLedgerEntry {
        let net_profit = payout - total_bet;
        let memory_profit = normalised_profit(
            net_profit,
            self.recent_wagered_amounts(player_id, round_id, self.memory_window),
        );

        debug!(
            round_id,
            player_id,
            total_bet,
            payout,
            memory_profit = format!("{memory_profit:.4}"),
            "Player detail recorded"
        );

        self.players.push(PlayerLedgerEntry {
            round_id,
            player_id: player_id.to_string(),
            area_bets,
            total_bet,
            payout,
            net_profit,
            memory_profit,
        });
        &self.players[self.players.len() - 1]
    }

    /// Up to `window` entries for `player_id` from rounds strictly before
    /// `before_round` in which the player wagered, most recent first.
    fn trailing_entries<'a>(
        &'a self,
        player_id: &'a str,
        before_round: u64,
        window: usize,
    ) -> impl Iterator<Item = &'a PlayerLedgerEntry> + 'a {
        self.players
            .iter()
            .rev()
            .filter(move |e| {
                e.player_id == player_id && e.round_id < before_round && e.total_bet > 0.0
            })
            .take(window)
    }

    /// Trailing total-wagered values, most recent first. Lazy; collect and
    /// reverse for oldest-first.
    pub fn recent_wagered_amounts<'a>(
        &'a self,
        player_id: &'a str,
        before_round: u64,
        window: usize,
    ) -> impl Iterator<Item = f64> + 'a {
        self.trailing_entries(player_id, before_round, window)
            .map(|e| e.total_bet)
    }

    /// Trailing memory-profit values, most recent first. Same window and
    /// filtering as [`recent_wagered_amounts`](Self::recent_wagered_amounts).
    pub fn recent_memory_profits<'a>(
        &'a self,
        player_id: &'a str,
        before_round: u64,
        window: usize,
    ) -> impl Iterator<Item = f64> + 'a {
        self.trailing_entries(player_id, before_round, window)
            .map(|e| e.memory_profit)
    }

    /// Decay-weighted sentiment from recorded history alone (no simulated
    /// round), most recent round weighted highest.
    pub fn memory_attitude(&self, player_id: &str, round_id: u64) -> f64 {
        decay_weighted_sum(
            self.recent_memory_profits(player_id, round_id, self.memory_window),
            self.decay_alpha,
            self.memory_window,
        )
    }

    /// Cumulative RTP after each settled round the player took part in.
    pub fn player_rtp_history(&self, player_id: &str) -> Vec<f64> {
        let mut wagered = 0.0;
        let mut returned = 0.0;
        self.players
            .iter()
            .filter(|e| e.player_id == player_id)
            .map(|e| {
                wagered += e.total_bet;
                returned += e.payout;
                if wagered == 0.0 {
                    1.0
                } else {
                    returned / wagered
                }
            })
            .collect()
    }

    pub fn rounds(&self) -> &[RoundLedgerEntry] {
        &self.rounds
    }

    pub fn players(&self) -> &[PlayerLedgerEntry] {
        &self.players
    }

    /// The last `n` round summaries, oldest first.
    pub fn recent_rounds(&self, n: usize) -> &[RoundLedgerEntry] {
        let start = self.rounds.len().saturating_sub(n);
        &self.rounds[start..]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
