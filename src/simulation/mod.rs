//! Batch simulation over many rounds.

pub mod runner;

pub use runner::{SimulationReport, SimulationRunner};
