//! Simulation session: the state that outlives a single round.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::GameRules;
use crate::engine::controller::{RoundController, RoundInput};
use crate::engine::ledger::Ledger;
use crate::engine::pool::LiquidityPool;
use crate::types::{AccountBook, BetSheet, Recharges};

/// Owns the ledger, pool and player accounts shared by consecutive rounds.
/// Rounds borrow it mutably only while they tick.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    seed: u64,
    next_round_id: u64,
    pub(crate) rules: GameRules,
    pub(crate) ledger: Ledger,
    pub(crate) pool: LiquidityPool,
    pub(crate) accounts: AccountBook,
}

impl SimulationSession {
    /// `seed` drives every round's bet schedule.
    pub fn new(rules: GameRules, seed: u64) -> Self {
        let ledger = Ledger::new(rules.memory_window, rules.memory_decay_alpha);
        let pool = LiquidityPool::new(
            rules.pool.initial_value,
            rules.pool.tax_rate,
            rules.pool.bands.clone(),
        );
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            seed,
            next_round_id: 1,
            rules,
            ledger,
            pool,
            accounts: AccountBook::new(),
        };

        info!(
            session_id = %session.id,
            seed,
            structures = session.rules.structures.len(),
            pool = %session.pool.value(),
            "Simulation session created"
        );
        session
    }

    /// Start the next round with a scheduled bet plan.
    pub fn begin_round(&mut self, input: RoundInput) -> RoundController {
        let round_id = self.allocate_round_id();
        RoundController::new(round_id, &self.rules, self.seed, input)
    }

    /// Start the next round with an already complete bet sheet.
    pub fn begin_imported_round(&mut self, bets: BetSheet, recharges: Recharges) -> RoundController {
        let round_id = self.allocate_round_id();
        RoundController::with_imported_bets(round_id, &self.rules, bets, recharges)
    }

    fn allocate_round_id(&mut self) -> u64 {
        let id = self.next_round_id;
        self.next_round_id += 1;
        id
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Id the next `begin_round` call will use.
    pub fn next_round_id(&self) -> u64 {
        self.next_round_id
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pool(&self) -> &LiquidityPool {
        &self.pool
    }

    pub fn accounts(&self) -> &AccountBook {
        &self.accounts
    }
}
