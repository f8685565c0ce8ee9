//! Structure-level RTP statistics.
//!
//! For every candidate structure, settles the current bet sheet against a
//! scratch copy of each player's account and measures how far the
//! stake-weighted player RTPs spread around the target. The spread is then
//! checked against a confidence band widened by a sample-size margin.

use serde::Serialize;
use statrs::function::erf::erf_inv;
use std::f64::consts::SQRT_2;
use tracing::debug;

use crate::config::GameRules;
use crate::types::{AccountBook, BetSheet, PlayerAccount, PlayerId, StdBounds, WinningStructure};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Weighted RTP spread for one candidate structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureStd {
    pub structure: WinningStructure,
    pub std: f64,
    pub within_confidence: bool,
}

/// Per-player breakdown behind a structure's std.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerDiagnostic {
    pub player_id: PlayerId,
    /// Cumulative wagered after the simulated settlement.
    pub stake: f64,
    /// Cumulative returned after the simulated settlement.
    pub returned: f64,
    pub rtp: f64,
    /// Share of the total weight.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureDiagnostics {
    pub structure: WinningStructure,
    pub std: f64,
    pub target_rtp: f64,
    pub weighted_variance: f64,
    pub players: Vec<PlayerDiagnostic>,
}

/// Everything one evaluation pass produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub results: Vec<StructureStd>,
    pub diagnostics: Vec<StructureDiagnostics>,
    pub std_bounds: StdBounds,
    pub eligible_sample_size: usize,
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Two-sided standard-normal quantile: Φ⁻¹(1 − (1 − c)/2) = √2·erf⁻¹(c).
pub fn two_sided_z(confidence_level: f64) -> f64 {
    SQRT_2 * erf_inv(confidence_level)
}

/// `[0, base + z·base/√n]`, or exactly `[0, base]` when n ≤ 1.
pub fn confidence_band(base_std: f64, confidence_level: f64, sample_size: usize) -> StdBounds {
    if sample_size <= 1 {
        return StdBounds { low: 0.0, high: base_std };
    }
    let margin = two_sided_z(confidence_level) * base_std / (sample_size as f64).sqrt();
    StdBounds {
        low: 0.0,
        high: base_std + margin,
    }
}

/// √(Σ w·(x − target)² / Σ w) and the variance; (0, 0) when Σ w = 0.
pub fn weighted_deviation(samples: &[(f64, f64)], target: f64) -> (f64, f64) {
    let total_weight: f64 = samples.iter().map(|(w, _)| w).sum();
    if total_weight == 0.0 {
        return (0.0, 0.0);
    }
    let variance = samples
        .iter()
        .map(|(w, x)| w * (x - target).powi(2))
        .sum::<f64>()
        / total_weight;
    (variance.sqrt(), variance)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct MetricsEvaluator<'a> {
    rules: &'a GameRules,
}

impl<'a> MetricsEvaluator<'a> {
    pub fn new(rules: &'a GameRules) -> Self {
        Self { rules }
    }

    /// Evaluate every configured structure against the live bet sheet.
    ///
    /// Pure: accounts are read, never written. Players absent from
    /// `accounts` start from an empty account.
    pub fn evaluate_structures(
        &self,
        accounts: &AccountBook,
        bets: &BetSheet,
        confidence_level: f64,
        base_std: f64,
    ) -> MetricsReport {
        let threshold = self.rules.minimum_bet_threshold;
        let eligible: Vec<(&PlayerId, f64)> = bets
            .iter()
            .map(|(pid, b)| (pid, b.total()))
            .filter(|&(_, stake)| stake >= threshold)
            .collect();
        let eligible_sample_size = eligible.len();
        let std_bounds = confidence_band(base_std, confidence_level, eligible_sample_size);

        let mut results = Vec::with_capacity(self.rules.structures.len());
        let mut diagnostics = Vec::with_capacity(self.rules.structures.len());

        for structure in &self.rules.structures {
            let simulated: Vec<(&PlayerId, PlayerAccount)> = eligible
                .iter()
                .map(|&(pid, stake)| {
                    let payout = bets
                        .get(pid)
                        .map_or(0.0, |b| self.rules.payouts.payout(b, &structure.areas));
                    let account = accounts.get(pid).copied().unwrap_or_default();
                    (pid, account.settled(stake, payout))
                })
                .collect();

            let samples: Vec<(f64, f64)> = simulated
                .iter()
                .map(|(_, acc)| (acc.total_wagered, acc.rtp()))
                .collect();
            let (std, weighted_variance) = weighted_deviation(&samples, self.rules.target_rtp);
            let within_confidence = std_bounds.contains(std);

            debug!(
                structure = %structure,
                std = format!("{std:.4}"),
                within_confidence,
                "Structure std evaluated"
            );

            let total_weight: f64 = samples.iter().map(|(w, _)| w).sum();
            let players = simulated
                .iter()
                .map(|(pid, acc)| PlayerDiagnostic {
                    player_id: (*pid).clone(),
                    stake: acc.total_wagered,
                    returned: acc.total_returned,
                    rtp: acc.rtp(),
                    weight: if total_weight > 0.0 {
                        acc.total_wagered / total_weight
                    } else {
                        0.0
                    },
                })
                .collect();

            results.push(StructureStd {
                structure: structure.clone(),
                std,
                within_confidence,
            });
            diagnostics.push(StructureDiagnostics {
                structure: structure.clone(),
                std,
                target_rtp: self.rules.target_rtp,
                weighted_variance,
                players,
            });
        }

        MetricsReport {
            results,
            diagnostics,
            std_bounds,
            eligible_sample_size,
        }
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

    fn rules() -> GameRules {
        AppConfig::default().rules().unwrap()
    }

    fn area(id: u8) -> OutcomeArea {
        OutcomeArea::new(id).unwrap()
    }

    fn sheet(entries: &[(&str, &[(u8, f64)])]) -> BetSheet {
        entries
            .iter()
            .map(|(pid, pairs)| {
                let pairs: Vec<(OutcomeArea, f64)> =
                    pairs.iter().map(|&(a, v)| (area(a), v)).collect();
                (pid.to_string(), AreaBets::from_pairs(&pairs))
            })
            .collect()
    }

    #[test]
    fn test_z_score_matches_normal_quantile() {
        assert!((two_sided_z(0.95) - 1.959_963_985).abs() < 1e-6);
        assert!((two_sided_z(0.99) - 2.575_829_304).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_band_small_sample() {
        assert_eq!(confidence_band(0.15, 0.95, 0), StdBounds { low: 0.0, high: 0.15 });
        assert_eq!(confidence_band(0.15, 0.95, 1), StdBounds { low: 0.0, high: 0.15 });
    }

    #[test]
    fn test_confidence_band_narrows_with_sample_size() {
        let four = confidence_band(0.15, 0.95, 4);
        let hundred = confidence_band(0.15, 0.95, 100);
        assert_eq!(four.low, 0.0);
        assert!((four.high - (0.15 + two_sided_z(0.95) * 0.15 / 2.0)).abs() < 1e-12);
        assert!(hundred.high < four.high);
        assert!(hundred.high > 0.15);
    }

    #[test]
    fn test_weighted_deviation() {
        let (std, var) = weighted_deviation(&[(1.0, 1.0), (3.0, 0.0)], 0.0);
        assert!((var - 0.25).abs() < 1e-12);
        assert!((std - 0.5).abs() < 1e-12);
        assert_eq!(weighted_deviation(&[], 1.0), (0.0, 0.0));
        assert_eq!(weighted_deviation(&[(0.0, 5.0)], 1.0), (0.0, 0.0));
    }

    #[test]
    fn test_single_player_std_per_structure() {
        let rules = rules();
        let eval = MetricsEvaluator::new(&rules);
        let bets = sheet(&[("p1", &[(1, 500.0), (5, 500.0)])]);
        let report = eval.evaluate_structures(&AccountBook::new(), &bets, 0.95, 0.15);

        assert_eq!(report.eligible_sample_size, 1);
        assert_eq!(report.std_bounds, StdBounds { low: 0.0, high: 0.15 });
        // Structure [1] → payout 2500 → rtp 2.5 → std = |2.5 − 0.995|
        let s1 = &report.results[0];
        assert!((s1.std - 1.505).abs() < 1e-12);
        assert!(!s1.within_confidence);
        // Structure [5] → payout 5000 → rtp 5.0
        assert!((report.results[4].std - 4.005).abs() < 1e-12);
        // Structure [6] → nothing paid
        assert!((report.results[5].std - 0.995).abs() < 1e-12);
    }

    #[test]
    fn test_ineligible_players_are_excluded() {
        let rules = rules();
        let eval = MetricsEvaluator::new(&rules);
        let bets = sheet(&[("small", &[(1, 100.0)]), ("big", &[(2, 1000.0)])]);
        let report = eval.evaluate_structures(&AccountBook::new(), &bets, 0.95, 0.15);
        assert_eq!(report.eligible_sample_size, 1);
        assert!(report.diagnostics[0]
            .players
            .iter()
            .all(|p| p.player_id == "big"));
    }

    #[test]
    fn test_history_dampens_simulated_rtp() {
        let rules = rules();
        let eval = MetricsEvaluator::new(&rules);
        let mut accounts = AccountBook::new();
        accounts.insert(
            "p1".into(),
            PlayerAccount { total_wagered: 9000.0, total_returned: 9000.0 },
        );
        let bets = sheet(&[("p1", &[(1, 1000.0)])]);
        let report = eval.evaluate_structures(&accounts, &bets, 0.95, 0.15);
        // [1] pays 5000 → (9000+5000)/10000 = 1.4
        let diag = &report.diagnostics[0];
        assert!((diag.players[0].rtp - 1.4).abs() < 1e-12);
        assert_eq!(diag.players[0].stake, 10_000.0);
        assert_eq!(diag.players[0].weight, 1.0);
        // the real account is untouched
        assert_eq!(accounts["p1"].total_wagered, 9000.0);
    }

    #[test]
    fn test_zero_wagered_round() {
        let rules = rules();
        let eval = MetricsEvaluator::new(&rules);
        let report = eval.evaluate_structures(&AccountBook::new(), &BetSheet::new(), 0.95, 0.15);
        assert_eq!(report.eligible_sample_size, 0);
        assert_eq!(report.results.len(), rules.structures.len());
        for r in &report.results {
            assert_eq!(r.std, 0.0);
            assert!(r.within_confidence);
        }
    }

    #[test]
    fn test_order_invariance_and_idempotence() {
        let rules = rules();
        let eval = MetricsEvaluator::new(&rules);
        let entries: [(&str, &[(u8, f64)]); 4] = [
            ("a", &[(1, 1500.0), (7, 500.0)]),
            ("b", &[(5, 2000.0)]),
            ("c", &[(2, 500.0), (3, 500.0), (8, 500.0)]),
            ("d", &[(4, 10_000.0)]),
        ];
        let forward = sheet(&entries);
        let mut reversed_entries = entries;
        reversed_entries.reverse();
        let backward = sheet(&reversed_entries);

        let mut accounts = AccountBook::new();
        accounts.insert("c".into(), PlayerAccount { total_wagered: 3000.0, total_returned: 1000.0 });

        let r1 = eval.evaluate_structures(&accounts, &forward, 0.95, 0.15);
        let r2 = eval.evaluate_structures(&accounts, &backward, 0.95, 0.15);
        let r3 = eval.evaluate_structures(&accounts, &forward, 0.95, 0.15);

        assert_eq!(r1, r2);
        assert_eq!(r1, r3);
        for (a, b) in r1.results.iter().zip(r3.results.iter()) {
            assert_eq!(a.std.to_bits(), b.std.to_bits());
        }
    }
}
