//! Core engine: round state machine, settlement, and the persistent
//! ledger and liquidity pool behind it.

pub mod controller;
pub mod ledger;
pub mod pool;
pub mod session;
pub mod settlement;

pub use controller::{OperatorOverride, RoundController, RoundInput, RoundSnapshot, TickEvent};
pub use session::SimulationSession;
pub use settlement::RoundSettlement;
