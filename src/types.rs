//! Shared types for the round-control engine.
//!
//! Outcome areas form a small closed set, so per-area data lives in
//! fixed-size arrays indexed by area. Player-keyed collections are ordered
//! maps: every aggregate over players is then independent of the order in
//! which bets arrived.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

/// Number of outcome areas on the table.
pub const AREA_COUNT: usize = 8;

/// Player identifier as supplied by the bet generator.
pub type PlayerId = String;

/// Cumulative accounts for every player that has settled at least once.
pub type AccountBook = BTreeMap<PlayerId, PlayerAccount>;

/// Recharge amount per player, as supplied by the player directory.
pub type Recharges = BTreeMap<PlayerId, f64>;

// ---------------------------------------------------------------------------
// Outcome areas
// ---------------------------------------------------------------------------

/// One of the eight betting areas, identified 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct OutcomeArea(u8);

impl OutcomeArea {
    /// All areas in ascending order.
    pub const ALL: [OutcomeArea; AREA_COUNT] = [
        OutcomeArea(1),
        OutcomeArea(2),
        OutcomeArea(3),
        OutcomeArea(4),
        OutcomeArea(5),
        OutcomeArea(6),
        OutcomeArea(7),
        OutcomeArea(8),
    ];

    pub fn new(id: u8) -> Option<Self> {
        (1..=AREA_COUNT as u8).contains(&id).then_some(Self(id))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Zero-based slot in per-area arrays.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for OutcomeArea {
    type Error = ConfigError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id).ok_or(ConfigError::UnknownArea(id))
    }
}

impl From<OutcomeArea> for u8 {
    fn from(area: OutcomeArea) -> u8 {
        area.0
    }
}

impl fmt::Display for OutcomeArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a list of raw area ids, rejecting anything outside 1..=8.
pub fn parse_areas(ids: &[u8]) -> Result<Vec<OutcomeArea>, ConfigError> {
    ids.iter().map(|&id| OutcomeArea::try_from(id)).collect()
}

// ---------------------------------------------------------------------------
// Per-area amounts
// ---------------------------------------------------------------------------

/// Wagered amount per outcome area. Amounts are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaBets([f64; AREA_COUNT]);

impl AreaBets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(area, amount)` pairs; repeated areas accumulate.
    pub fn from_pairs(pairs: &[(OutcomeArea, f64)]) -> Self {
        let mut bets = Self::new();
        for &(area, amount) in pairs {
            bets.add(area, amount);
        }
        bets
    }

    pub fn get(&self, area: OutcomeArea) -> f64 {
        self.0[area.index()]
    }

    pub fn set(&mut self, area: OutcomeArea, amount: f64) {
        self.0[area.index()] = amount.max(0.0);
    }

    pub fn add(&mut self, area: OutcomeArea, amount: f64) {
        let slot = &mut self.0[area.index()];
        *slot = (*slot + amount).max(0.0);
    }

    /// Total stake across all areas.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&a| a == 0.0)
    }

    /// Areas carrying a non-zero stake, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (OutcomeArea, f64)> + '_ {
        OutcomeArea::ALL
            .iter()
            .map(|&area| (area, self.get(area)))
            .filter(|&(_, amount)| amount > 0.0)
    }

    /// Element-wise sum.
    pub fn merged(&self, other: &AreaBets) -> Self {
        let mut out = *self;
        for (slot, add) in out.0.iter_mut().zip(other.0.iter()) {
            *slot += add;
        }
        out
    }

    pub fn as_array(&self) -> &[f64; AREA_COUNT] {
        &self.0
    }
}

/// Payout multiplier per outcome area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoutTable([f64; AREA_COUNT]);

impl PayoutTable {
    /// Build from multipliers ordered by area id. Validation happens in
    /// [`AppConfig::rules`](crate::config::AppConfig::rules).
    pub fn new(multipliers: [f64; AREA_COUNT]) -> Self {
        Self(multipliers)
    }

    pub fn multiplier(&self, area: OutcomeArea) -> f64 {
        self.0[area.index()]
    }

    /// Largest multiplier on the table.
    pub fn max_multiplier(&self) -> f64 {
        self.0.iter().copied().fold(0.0, f64::max)
    }

    /// Σ stake × multiplier over the winning areas.
    pub fn payout(&self, bets: &AreaBets, winning: &[OutcomeArea]) -> f64 {
        winning
            .iter()
            .map(|&area| bets.get(area) * self.multiplier(area))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Winning structures
// ---------------------------------------------------------------------------

/// One possible draw result: the set of areas that pay out together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningStructure {
    pub areas: Vec<OutcomeArea>,
    /// Relative draw weight. Informational only; never used in scoring.
    pub weight: u32,
}

impl WinningStructure {
    pub fn new(areas: Vec<OutcomeArea>, weight: u32) -> Self {
        Self { areas, weight }
    }

    pub fn contains(&self, area: OutcomeArea) -> bool {
        self.areas.contains(&area)
    }
}

impl fmt::Display for WinningStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.areas.iter().map(|a| a.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Bet sheet
// ---------------------------------------------------------------------------

/// Per-player, per-area stakes for one round.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetSheet(BTreeMap<PlayerId, AreaBets>);

impl BetSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: impl Into<PlayerId>, bets: AreaBets) {
        self.0.insert(player.into(), bets);
    }

    pub fn get(&self, player: &str) -> Option<&AreaBets> {
        self.0.get(player)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &AreaBets)> {
        self.0.iter()
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerId> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total wagered by all players.
    pub fn total_wagered(&self) -> f64 {
        self.0.values().map(AreaBets::total).sum()
    }

    /// Stake per area summed over players.
    pub fn area_totals(&self) -> AreaBets {
        self.0
            .values()
            .fold(AreaBets::new(), |acc, bets| acc.merged(bets))
    }

    /// Total payout if `structure` were drawn.
    pub fn total_payout(&self, payouts: &PayoutTable, structure: &WinningStructure) -> f64 {
        self.0
            .values()
            .map(|bets| payouts.payout(bets, &structure.areas))
            .sum()
    }
}

impl FromIterator<(PlayerId, AreaBets)> for BetSheet {
    fn from_iter<I: IntoIterator<Item = (PlayerId, AreaBets)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Player accounts
// ---------------------------------------------------------------------------

/// Lifetime wagered/returned totals for one player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerAccount {
    pub total_wagered: f64,
    pub total_returned: f64,
}

impl PlayerAccount {
    pub fn update(&mut self, stake: f64, payout: f64) {
        self.total_wagered += stake;
        self.total_returned += payout;
    }

    /// The account as it would look after settling one more round.
    pub fn settled(mut self, stake: f64, payout: f64) -> Self {
        self.update(stake, payout);
        self
    }

    /// Return-to-player; 1.0 before anything was wagered.
    pub fn rtp(&self) -> f64 {
        if self.total_wagered == 0.0 {
            1.0
        } else {
            self.total_returned / self.total_wagered
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate metrics
// ---------------------------------------------------------------------------

/// Evaluation of one candidate structure for the current round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureMetric {
    pub structure: WinningStructure,
    /// Weighted RTP standard deviation after simulated settlement.
    pub simulated_std: f64,
    pub within_confidence: bool,
    /// Recharge-weighted dispersion of simulated player sentiment.
    pub memory_effect: f64,
}

/// Acceptable range of weighted RTP standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StdBounds {
    pub low: f64,
    pub high: f64,
}

impl StdBounds {
    pub fn contains(&self, std: f64) -> bool {
        self.low <= std && std <= self.high
    }
}

// ---------------------------------------------------------------------------
// Round phases
// ---------------------------------------------------------------------------

/// Phase lengths in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDurations {
    pub betting: u32,
    pub waiting: u32,
    pub animation: u32,
}

impl RoundDurations {
    pub fn total(&self) -> u32 {
        self.betting + self.waiting + self.animation
    }
}

/// Where a round stands, derived from its countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundPhase {
    Betting,
    Waiting,
    Animation,
    Settled,
}

impl RoundPhase {
    /// Phase for a countdown running from `durations.total()` down to 0.
    pub fn from_countdown(countdown: u32, durations: &RoundDurations) -> Self {
        if countdown > durations.total() - durations.betting {
            RoundPhase::Betting
        } else if countdown > durations.animation {
            RoundPhase::Waiting
        } else if countdown > 0 {
            RoundPhase::Animation
        } else {
            RoundPhase::Settled
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Betting => write!(f, "Betting"),
            RoundPhase::Waiting => write!(f, "Waiting"),
            RoundPhase::Animation => write!(f, "Animation"),
            RoundPhase::Settled => write!(f, "Settled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
