//! Final structure selection.
//!
//! Decision policy, in order:
//! 1. Among structures inside the confidence band, the lowest memory
//!    effect wins (first one on ties).
//! 2. Otherwise, among structures whose payout ratio is at most
//!    [`MAX_PAYOUT_RATIO`], the lowest std wins.
//! 3. Otherwise the globally lowest std wins.

use serde::Serialize;
use std::fmt;
use tracing::info;

use crate::types::{BetSheet, PayoutTable, StdBounds, StructureMetric};

/// Total payout may be at most this multiple of total stake before the
/// structure is only considered as a last resort.
pub const MAX_PAYOUT_RATIO: f64 = 2.0;

/// Why the final structure was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// Inside the band; `matching` candidates were inside.
    WithinConfidence { matching: usize },
    /// Nothing inside the band; lowest std under the payout cap.
    PayoutCapped,
    /// Every structure breached the payout cap.
    Fallback,
    /// Operator override.
    Forced,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::WithinConfidence { matching } => {
                write!(f, "within confidence ({matching} matching)")
            }
            SelectionReason::PayoutCapped => write!(f, "payout capped"),
            SelectionReason::Fallback => write!(f, "fallback"),
            SelectionReason::Forced => write!(f, "forced"),
        }
    }
}

/// Index into the candidate slice plus the reason.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub reason: SelectionReason,
}

/// Index of the first minimum of `key` over `items`.
fn first_min_by<T>(items: impl Iterator<Item = (usize, T)>, key: impl Fn(&T) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, item) in items {
        let k = key(&item);
        match best {
            Some((_, current)) if k >= current => {}
            _ => best = Some((i, k)),
        }
    }
    best.map(|(i, _)| i)
}

pub struct StructureSelector<'a> {
    payouts: &'a PayoutTable,
}

impl<'a> StructureSelector<'a> {
    pub fn new(payouts: &'a PayoutTable) -> Self {
        Self { payouts }
    }

    /// Choose one structure. `None` only for an empty candidate slice.
    ///
    /// `dynamic_target_rtp` is the pool-driven target in force for this
    /// decision. It is recorded in the selection log only and takes no
    /// part in ranking candidates.
    pub fn select(
        &self,
        candidates: &[StructureMetric],
        bets: &BetSheet,
        std_bounds: StdBounds,
        dynamic_target_rtp: f64,
    ) -> Option<Selection> {
        let matching = candidates.iter().filter(|c| c.within_confidence).count();

        let selection = if matching > 0 {
            first_min_by(
                candidates.iter().enumerate().filter(|(_, c)| c.within_confidence),
                |c| c.memory_effect,
            )
            .map(|index| Selection {
                index,
                reason: SelectionReason::WithinConfidence { matching },
            })
        } else {
            let total_wagered = bets.total_wagered();
            let capped = first_min_by(
                candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| self.payout_ratio(bets, c, total_wagered) <= MAX_PAYOUT_RATIO),
                |c| c.simulated_std,
            );
            match capped {
                Some(index) => Some(Selection {
                    index,
                    reason: SelectionReason::PayoutCapped,
                }),
                None => first_min_by(candidates.iter().enumerate(), |c| c.simulated_std).map(
                    |index| Selection {
                        index,
                        reason: SelectionReason::Fallback,
                    },
                ),
            }
        }?;

        let chosen = &candidates[selection.index];
        info!(
            structure = %chosen.structure,
            reason = %selection.reason,
            std = format!("{:.4}", chosen.simulated_std),
            memory_effect = format!("{:.4}", chosen.memory_effect),
            std_low = std_bounds.low,
            std_high = std_bounds.high,
            dynamic_target_rtp,
            "Structure selected"
        );

        Some(selection)
    }

    /// Total simulated payout over total stake; 0 with nothing staked.
    fn payout_ratio(&self, bets: &BetSheet, candidate: &StructureMetric, total_wagered: f64) -> f64 {
        if total_wagered > 0.0 {
            bets.total_payout(self.payouts, &candidate.structure) / total_wagered
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
