//! Error types.
//!
//! Configuration problems are fatal and surface at startup; engine errors
//! indicate a controller was driven outside its state machine. Missing
//! history and zero denominators are not errors at all: the evaluators
//! resolve them to fixed neutral values.

use thiserror::Error;

/// A violated configuration invariant. Raised only while building
/// [`GameRules`](crate::config::GameRules); a simulation never starts with
/// an invalid configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no winning structures configured")]
    NoStructures,

    #[error("winning structure #{index} has no outcome areas")]
    EmptyStructure { index: usize },

    #[error("winning structure #{index} lists area {area} more than once")]
    DuplicateArea { index: usize, area: u8 },

    #[error("outcome area {0} is outside 1..=8")]
    UnknownArea(u8),

    #[error("expected {expected} payout multipliers, found {found}")]
    PayoutTableSize { expected: usize, found: usize },

    #[error("payout multiplier for area {area} must be positive and finite, got {value}")]
    InvalidMultiplier { area: u8, value: f64 },

    #[error("{phase} duration must be at least one tick")]
    ZeroDuration { phase: &'static str },

    #[error("confidence level must lie strictly between 0 and 1, got {0}")]
    ConfidenceLevel(f64),

    #[error("{name} must be a non-negative finite number, got {value}")]
    NegativeParameter { name: &'static str, value: f64 },

    #[error("memory window must contain at least one round")]
    ZeroMemoryWindow,

    #[error("tax rate must lie in [0, 1), got {0}")]
    TaxRate(String),

    #[error("RTP bands do not partition the real line: {0}")]
    BandPartition(String),
}

/// Misuse of a round controller or an inconsistent candidate set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("round {round_id} is already settled")]
    RoundSettled { round_id: u64 },

    #[error("round {round_id} has no candidate structures to select from")]
    NoCandidates { round_id: u64 },

    #[error("round {round_id} reached settlement without a final outcome")]
    MissingOutcome { round_id: u64 },
}
