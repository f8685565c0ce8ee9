//! RTP control: round-based outcome-selection simulator.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod players;
pub mod simulation;
pub mod strategy;
pub mod types;
