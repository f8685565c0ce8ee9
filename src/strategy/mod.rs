//! Strategy engine: structure metrics, sentiment scoring and final
//! selection.

pub mod metrics;
pub mod selector;
pub mod sentiment;

use serde::Serialize;
use tracing::debug;

use crate::config::GameRules;
use crate::engine::ledger::Ledger;
use crate::types::{AccountBook, BetSheet, Recharges, StdBounds, StructureMetric};
use metrics::{MetricsEvaluator, StructureDiagnostics};
use sentiment::SentimentScorer;

// ---------------------------------------------------------------------------
// Candidate set
// ---------------------------------------------------------------------------

/// The cached result of one evaluation pass, in structure configuration
/// order. This is what the presentation layer and the selector read.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CandidateSet {
    pub candidates: Vec<StructureMetric>,
    #[serde(skip)]
    pub diagnostics: Vec<StructureDiagnostics>,
    pub std_bounds: StdBounds,
    pub sample_size: usize,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of candidates inside the confidence band.
    pub fn within_confidence(&self) -> usize {
        self.candidates.iter().filter(|c| c.within_confidence).count()
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Runs the metrics pass and the sentiment pass over the same bet sheet and
/// merges them per structure.
pub struct CandidateEvaluator<'a> {
    rules: &'a GameRules,
    ledger: &'a Ledger,
}

impl<'a> CandidateEvaluator<'a> {
    pub fn new(rules: &'a GameRules, ledger: &'a Ledger) -> Self {
        Self { rules, ledger }
    }

    /// Pure: neither `accounts` nor the ledger are modified.
    pub fn evaluate(
        &self,
        accounts: &AccountBook,
        bets: &BetSheet,
        recharges: &Recharges,
        round_id: u64,
    ) -> CandidateSet {
        let report = MetricsEvaluator::new(self.rules).evaluate_structures(
            accounts,
            bets,
            self.rules.confidence_level,
            self.rules.std_threshold,
        );
        let effects =
            SentimentScorer::new(self.rules, self.ledger).evaluate_memory_effect(bets, recharges, round_id);

        // Both passes walk `rules.structures` in order.
        let candidates: Vec<StructureMetric> = report
            .results
            .into_iter()
            .zip(effects)
            .map(|(std, effect)| StructureMetric {
                structure: std.structure,
                simulated_std: std.std,
                within_confidence: std.within_confidence,
                memory_effect: effect.memory_effect,
            })
            .collect();

        let set = CandidateSet {
            candidates,
            diagnostics: report.diagnostics,
            std_bounds: report.std_bounds,
            sample_size: report.eligible_sample_size,
        };

        debug!(
            round_id,
            players = bets.len(),
            sample_size = set.sample_size,
            within_confidence = set.within_confidence(),
            std_high = format!("{:.4}", set.std_bounds.high),
            "Candidates refreshed"
        );

        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::types::{AreaBets, OutcomeArea};

    fn area(id: u8) -> OutcomeArea {
        OutcomeArea::new(id).unwrap()
    }

    #[test]
    fn test_zero_wagered_round_is_all_within_confidence() {
        let rules = AppConfig::default().rules().unwrap();
        let ledger = Ledger::new(rules.memory_window, rules.memory_decay_alpha);
        let set = CandidateEvaluator::new(&rules, &ledger).evaluate(
            &AccountBook::new(),
            &BetSheet::new(),
            &Recharges::new(),
            1,
        );

        assert_eq!(set.candidates.len(), rules.structures.len());
        assert_eq!(set.sample_size, 0);
        assert_eq!(set.std_bounds.high, rules.std_threshold);
        for c in &set.candidates {
            assert_eq!(c.simulated_std, 0.0);
            assert!(c.within_confidence);
            assert_eq!(c.memory_effect, 0.0);
        }
        assert_eq!(set.within_confidence(), rules.structures.len());
    }

    #[test]
    fn test_candidates_follow_configuration_order() {
        let rules = AppConfig::default().rules().unwrap();
        let ledger = Ledger::new(rules.memory_window, rules.memory_decay_alpha);
        let mut bets = BetSheet::new();
        bets.insert("p1", AreaBets::from_pairs(&[(area(1), 500.0), (area(5), 500.0)]));
        let recharges: Recharges = [("p1".to_string(), 10.0)].into_iter().collect();

        let set = CandidateEvaluator::new(&rules, &ledger).evaluate(&AccountBook::new(), &bets, &recharges, 1);
        let order: Vec<_> = set.candidates.iter().map(|c| c.structure.clone()).collect();
        assert_eq!(order, rules.structures);
        assert_eq!(set.sample_size, 1);
        assert_eq!(set.diagnostics.len(), rules.structures.len());
    }
}
