//! Round controller: the per-round phase state machine.
//!
//! One countdown runs from the total round length down to 0, one step per
//! [`RoundController::tick`]. The phase is always derived from the countdown
//! (see [`RoundPhase::from_countdown`]):
//!
//! - Betting ticks reveal scheduled bets and refresh the candidate cache.
//! - The tick that lands on the animation length picks the outcome.
//! - The tick that lands on 0 settles the round.
//!
//! A round takes exactly `total + 1` ticks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameRules;
use crate::engine::session::SimulationSession;
use crate::engine::settlement::{Cashier, RoundSettlement};
use crate::error::EngineError;
use crate::strategy::selector::{SelectionReason, StructureSelector};
use crate::strategy::{CandidateEvaluator, CandidateSet};
use crate::types::{
    AreaBets, BetSheet, OutcomeArea, PlayerId, Recharges, RoundDurations, RoundPhase, StdBounds,
    StructureMetric, WinningStructure,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// What the upstream collaborators supply for one round.
#[derive(Debug, Clone, Default)]
pub struct RoundInput {
    /// Each player's full intended bet for the round.
    pub plan: BetSheet,
    pub recharges: Recharges,
}

/// Operator-forced outcome shared with the presentation layer.
///
/// Clones share one slot. A round takes the value once, when it picks its
/// outcome; anything written after that waits for the next round.
#[derive(Debug, Clone, Default)]
pub struct OperatorOverride(Arc<Mutex<Option<WinningStructure>>>);

impl OperatorOverride {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<WinningStructure>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, structure: WinningStructure) {
        *self.slot() = Some(structure);
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }

    pub fn peek(&self) -> Option<WinningStructure> {
        self.slot().clone()
    }

    pub fn take(&self) -> Option<WinningStructure> {
        self.slot().take()
    }
}

// ---------------------------------------------------------------------------
// Events and snapshots
// ---------------------------------------------------------------------------

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    /// `revealed` players had bets revealed at second `elapsed`.
    BetsRevealed { elapsed: u32, revealed: usize },
    Waiting { countdown: u32 },
    OutcomeChosen {
        outcome: WinningStructure,
        reason: SelectionReason,
    },
    Animating { countdown: u32 },
    Settled(RoundSettlement),
}

/// Everything the presentation layer shows for a round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSnapshot {
    pub session_id: Uuid,
    pub round_id: u64,
    pub countdown: u32,
    pub phase: RoundPhase,
    pub candidates: Vec<StructureMetric>,
    pub std_bounds: StdBounds,
    pub sample_size: usize,
    pub outcome: Option<WinningStructure>,
    pub reason: Option<SelectionReason>,
    pub forced: bool,
    pub area_totals: AreaBets,
    /// The chosen areas, or before that every area of a candidate inside
    /// the confidence band.
    pub highlight_areas: Vec<OutcomeArea>,
    pub total_wagered: f64,
    pub pool_value: Decimal,
    pub target_rtp: f64,
    pub taken_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct RoundController {
    round_id: u64,
    durations: RoundDurations,
    /// Countdown of the last processed tick.
    countdown: u32,
    started: bool,
    running: bool,
    rng: StdRng,
    plan: BetSheet,
    recharges: Recharges,
    /// Sorted reveal seconds (1-based) per player.
    schedule: BTreeMap<PlayerId, Vec<u32>>,
    scheduled: bool,
    live: BetSheet,
    candidates: CandidateSet,
    outcome: Option<(WinningStructure, SelectionReason)>,
    operator: OperatorOverride,
}

impl RoundController {
    /// A round whose bets are revealed on a random schedule derived from
    /// `seed` and `round_id`.
    pub fn new(round_id: u64, rules: &GameRules, seed: u64, input: RoundInput) -> Self {
        Self {
            round_id,
            durations: rules.durations,
            countdown: rules.durations.total(),
            started: false,
            running: true,
            rng: StdRng::seed_from_u64(seed ^ round_id.rotate_left(32)),
            plan: input.plan,
            recharges: input.recharges,
            schedule: BTreeMap::new(),
            scheduled: false,
            live: BetSheet::new(),
            candidates: CandidateSet::default(),
            outcome: None,
            operator: OperatorOverride::new(),
        }
    }

    /// A round whose live sheet is `bets` in full from the start.
    pub fn with_imported_bets(
        round_id: u64,
        rules: &GameRules,
        bets: BetSheet,
        recharges: Recharges,
    ) -> Self {
        let mut controller = Self::new(
            round_id,
            rules,
            0,
            RoundInput {
                plan: bets.clone(),
                recharges,
            },
        );
        controller.live = bets;
        controller.scheduled = true;
        controller
    }

    /// Share an override slot with this round.
    pub fn with_override(mut self, operator: OperatorOverride) -> Self {
        self.operator = operator;
        self
    }

    /// Advance one step.
    pub fn tick(&mut self, session: &mut SimulationSession) -> Result<TickEvent, EngineError> {
        if !self.running {
            return Err(EngineError::RoundSettled {
                round_id: self.round_id,
            });
        }

        let total = self.durations.total();
        let countdown = if self.started {
            self.countdown.saturating_sub(1)
        } else {
            total
        };
        self.started = true;
        self.countdown = countdown;

        match RoundPhase::from_countdown(countdown, &self.durations) {
            RoundPhase::Betting => {
                if !self.scheduled {
                    self.schedule_bets();
                }
                let elapsed = total - countdown + 1;
                let revealed = self.reveal(elapsed);
                self.refresh_candidates(session);
                Ok(TickEvent::BetsRevealed { elapsed, revealed })
            }
            RoundPhase::Waiting => {
                if countdown == total - self.durations.betting {
                    info!(
                        round_id = self.round_id,
                        players = self.live.len(),
                        wagered = format!("{:.2}", self.live.total_wagered()),
                        "Betting closed"
                    );
                }
                Ok(TickEvent::Waiting { countdown })
            }
            RoundPhase::Animation if countdown == self.durations.animation => self.finalize(session),
            RoundPhase::Animation => Ok(TickEvent::Animating { countdown }),
            RoundPhase::Settled => self.settle(session),
        }
    }

    /// Tick until the round settles.
    pub fn run_to_completion(
        &mut self,
        session: &mut SimulationSession,
    ) -> Result<RoundSettlement, EngineError> {
        loop {
            if let TickEvent::Settled(report) = self.tick(session)? {
                return Ok(report);
            }
        }
    }

    /// Draw each player's reveal seconds: a random subset of
    /// `1..=betting`, of random size `1..=betting`.
    fn schedule_bets(&mut self) {
        let seconds_available = self.durations.betting as usize;
        for (player_id, bets) in self.plan.iter() {
            if bets.is_empty() {
                continue;
            }
            let count = self.rng.gen_range(1..=seconds_available);
            let mut seconds: Vec<u32> = sample(&mut self.rng, seconds_available, count)
                .into_iter()
                .map(|s| s as u32 + 1)
                .collect();
            seconds.sort_unstable();
            self.schedule.insert(player_id.clone(), seconds);
        }
        self.scheduled = true;

        info!(
            round_id = self.round_id,
            players = self.schedule.len(),
            planned = format!("{:.2}", self.plan.total_wagered()),
            "Betting opened"
        );
    }

    /// A player's whole plan goes live at their first scheduled second.
    /// Later scheduled seconds rewrite the same plan.
    fn reveal(&mut self, elapsed: u32) -> usize {
        let mut revealed = 0;
        for (player_id, seconds) in &self.schedule {
            if !seconds.contains(&elapsed) {
                continue;
            }
            let Some(plan) = self.plan.get(player_id) else {
                continue;
            };
            self.live.insert(player_id.clone(), *plan);
            revealed += 1;
        }

        debug!(round_id = self.round_id, elapsed, revealed, "Bets revealed");
        revealed
    }

    fn refresh_candidates(&mut self, session: &SimulationSession) {
        self.candidates = CandidateEvaluator::new(&session.rules, &session.ledger).evaluate(
            &session.accounts,
            &self.live,
            &self.recharges,
            self.round_id,
        );
    }

    fn finalize(&mut self, session: &SimulationSession) -> Result<TickEvent, EngineError> {
        let (outcome, reason) = match self.operator.take() {
            Some(forced) => {
                warn!(round_id = self.round_id, outcome = %forced, "Operator override applied");
                (forced, SelectionReason::Forced)
            }
            None => {
                let target_rtp = session.pool.current_target_rtp();
                let selection = StructureSelector::new(&session.rules.payouts)
                    .select(
                        &self.candidates.candidates,
                        &self.live,
                        self.candidates.std_bounds,
                        target_rtp,
                    )
                    .ok_or(EngineError::NoCandidates {
                        round_id: self.round_id,
                    })?;
                (
                    self.candidates.candidates[selection.index].structure.clone(),
                    selection.reason,
                )
            }
        };

        self.outcome = Some((outcome.clone(), reason));
        Ok(TickEvent::OutcomeChosen { outcome, reason })
    }

    fn settle(&mut self, session: &mut SimulationSession) -> Result<TickEvent, EngineError> {
        let (outcome, reason) = self.outcome.clone().ok_or(EngineError::MissingOutcome {
            round_id: self.round_id,
        })?;
        let report = Cashier::settle(session, self.round_id, &self.live, &outcome, reason);
        self.running = false;
        Ok(TickEvent::Settled(report))
    }

    // -- Read accessors ---------------------------------------------------

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn phase(&self) -> RoundPhase {
        RoundPhase::from_countdown(self.countdown, &self.durations)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn live_bets(&self) -> &BetSheet {
        &self.live
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn outcome(&self) -> Option<&(WinningStructure, SelectionReason)> {
        self.outcome.as_ref()
    }

    pub fn operator_override(&self) -> OperatorOverride {
        self.operator.clone()
    }

    fn highlight_areas(&self) -> Vec<OutcomeArea> {
        let mut areas: Vec<OutcomeArea> = match &self.outcome {
            Some((structure, _)) => structure.areas.clone(),
            None => self
                .candidates
                .candidates
                .iter()
                .filter(|c| c.within_confidence)
                .flat_map(|c| c.structure.areas.iter().copied())
                .collect(),
        };
        areas.sort_unstable();
        areas.dedup();
        areas
    }

    pub fn snapshot(&self, session: &SimulationSession) -> RoundSnapshot {
        let reason = self.outcome.as_ref().map(|(_, r)| *r);
        RoundSnapshot {
            session_id: session.id(),
            round_id: self.round_id,
            countdown: self.countdown,
            phase: self.phase(),
            candidates: self.candidates.candidates.clone(),
            std_bounds: self.candidates.std_bounds,
            sample_size: self.candidates.sample_size,
            outcome: self.outcome.as_ref().map(|(s, _)| s.clone()),
            reason,
            forced: reason == Some(SelectionReason::Forced),
            area_totals: self.live.area_totals(),
            highlight_areas: self.highlight_areas(),
            total_wagered: self.live.total_wagered(),
            pool_value: session.pool.value(),
            target_rtp: session.pool.current_target_rtp(),
            taken_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
