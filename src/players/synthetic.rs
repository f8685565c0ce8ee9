//! Seeded synthetic player population.
//!
//! Each player gets a stake tier, an area-spread style and a recharge figure
//! at creation. Every round, players drift in and out of participation and
//! active players split a stake of roughly their tier's scale across a few
//! areas, in 500-unit chunks weighted toward low-multiplier areas.

use std::collections::BTreeMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use statrs::distribution::LogNormal;
use tracing::debug;

use super::{BetGenerator, PlayerDirectory};
use crate::types::{AreaBets, BetSheet, OutcomeArea, PayoutTable, PlayerId, AREA_COUNT};

/// Stakes are allocated in multiples of this.
pub const STAKE_UNIT: f64 = 500.0;

const FIRST_ROUND_PARTICIPATION: f64 = 0.3;
const DROP_OUT_PROBABILITY: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeTier {
    High,
    Mid,
    Low,
}

impl StakeTier {
    const ALL: [StakeTier; 3] = [StakeTier::High, StakeTier::Mid, StakeTier::Low];
    const WEIGHTS: [u32; 3] = [1, 2, 10];

    /// Typical round stake.
    pub fn scale(self) -> u32 {
        match self {
            StakeTier::High => 10_000,
            StakeTier::Mid => 2_000,
            StakeTier::Low => 1_000,
        }
    }

    /// (μ, σ, min, max, rounding step) of the recharge distribution.
    fn recharge_profile(self) -> (f64, f64, f64, f64, f64) {
        match self {
            StakeTier::High => (4.0, 0.5, 100.0, 5000.0, 100.0),
            StakeTier::Mid => (3.0, 0.4, 30.0, 100.0, 10.0),
            StakeTier::Low => (2.0, 0.3, 0.0, 30.0, 5.0),
        }
    }
}

/// Inclusive range of how many areas a player spreads over.
const AREA_STYLES: [(usize, usize); 3] = [(6, 8), (3, 5), (1, 2)];
const AREA_STYLE_WEIGHTS: [u32; 3] = [1, 6, 1];

#[derive(Debug, Clone)]
pub struct SyntheticPlayer {
    pub tier: StakeTier,
    pub area_range: (usize, usize),
    pub recharge: f64,
    pub active: bool,
    pub consecutive_missed: u32,
}

pub struct SyntheticPlayers {
    rng: StdRng,
    payouts: PayoutTable,
    players: BTreeMap<PlayerId, SyntheticPlayer>,
    rounds_generated: u64,
}

impl SyntheticPlayers {
    pub fn new(count: usize, seed: u64, payouts: PayoutTable) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tiers = WeightedIndex::new(StakeTier::WEIGHTS).ok();
        let styles = WeightedIndex::new(AREA_STYLE_WEIGHTS).ok();

        let mut players = BTreeMap::new();
        for i in 1..=count {
            let tier = tiers
                .as_ref()
                .map_or(StakeTier::Low, |d| StakeTier::ALL[d.sample(&mut rng)]);
            let area_range = styles
                .as_ref()
                .map_or(AREA_STYLES[1], |d| AREA_STYLES[d.sample(&mut rng)]);
            let recharge = draw_recharge(tier, &mut rng);
            players.insert(
                format!("player_{i}"),
                SyntheticPlayer {
                    tier,
                    area_range,
                    recharge,
                    active: false,
                    consecutive_missed: 0,
                },
            );
        }

        Self {
            rng,
            payouts,
            players,
            rounds_generated: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, player_id: &str) -> Option<&SyntheticPlayer> {
        self.players.get(player_id)
    }

    /// Update participation for the coming round.
    fn churn(&mut self) {
        let first_round = self.rounds_generated == 0;
        for player in self.players.values_mut() {
            if first_round {
                player.active = self.rng.gen_bool(FIRST_ROUND_PARTICIPATION);
                player.consecutive_missed = u32::from(!player.active);
            } else if player.active {
                if self.rng.gen_bool(DROP_OUT_PROBABILITY) {
                    player.active = false;
                    player.consecutive_missed = 1;
                }
            } else {
                let restore = (0.1 + 0.05 * player.consecutive_missed as f64).min(1.0);
                if self.rng.gen_bool(restore) {
                    player.active = true;
                    player.consecutive_missed = 0;
                } else {
                    player.consecutive_missed += 1;
                }
            }
        }
    }

    /// Spread roughly one tier-scale stake across the player's areas.
    fn draw_bets(&mut self, tier: StakeTier, area_range: (usize, usize)) -> AreaBets {
        let scale = tier.scale();
        let total = self.rng.gen_range(scale * 4 / 5..=scale * 6 / 5);
        let (min_areas, max_areas) = area_range;
        let count = self.rng.gen_range(min_areas..=max_areas).clamp(1, AREA_COUNT);
        let areas: Vec<OutcomeArea> = sample(&mut self.rng, AREA_COUNT, count)
            .into_iter()
            .map(|i| OutcomeArea::ALL[i])
            .collect();

        let weights: Vec<f64> = areas
            .iter()
            .map(|&a| 1.0 / self.payouts.multiplier(a))
            .collect();
        let Ok(chooser) = WeightedIndex::new(&weights) else {
            return AreaBets::new();
        };

        let mut bets = AreaBets::new();
        let units = (f64::from(total) / STAKE_UNIT).floor() as usize;
        for _ in 0..units {
            bets.add(areas[chooser.sample(&mut self.rng)], STAKE_UNIT);
        }
        bets
    }
}

fn draw_recharge(tier: StakeTier, rng: &mut StdRng) -> f64 {
    let (mu, sigma, min, max, step) = tier.recharge_profile();
    let raw = LogNormal::new(mu, sigma).map_or(min, |d| d.sample(rng));
    let clamped = raw.floor().clamp(min, max);
    (clamped / step).floor() * step
}

impl BetGenerator for SyntheticPlayers {
    fn generate_bets(&mut self, round_id: u64) -> BetSheet {
        self.churn();
        self.rounds_generated += 1;

        let active: Vec<(PlayerId, StakeTier, (usize, usize))> = self
            .players
            .iter()
            .filter(|(_, p)| p.active)
            .map(|(id, p)| (id.clone(), p.tier, p.area_range))
            .collect();

        let sheet: BetSheet = active
            .into_iter()
            .map(|(id, tier, range)| (id, self.draw_bets(tier, range)))
            .filter(|(_, bets)| !bets.is_empty())
            .collect();

        debug!(
            round_id,
            players = sheet.len(),
            wagered = sheet.total_wagered(),
            "Synthetic bets generated"
        );
        sheet
    }
}

impl PlayerDirectory for SyntheticPlayers {
    fn recharge_amount(&self, player_id: &str) -> f64 {
        self.players.get(player_id).map_or(0.0, |p| p.recharge)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
