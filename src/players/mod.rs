//! Upstream collaborators: where bets and recharge figures come from.
//!
//! The engine treats both as opaque inputs. [`synthetic::SyntheticPlayers`]
//! is the bundled implementation used by the binary and the batch runner.

pub mod synthetic;

use crate::engine::controller::RoundInput;
use crate::types::{BetSheet, Recharges};

pub use synthetic::SyntheticPlayers;

/// Supplies each player's full intended bet for a round.
#[cfg_attr(test, mockall::automock)]
pub trait BetGenerator: Send {
    fn generate_bets(&mut self, round_id: u64) -> BetSheet;
}

/// Supplies per-player recharge amounts, read only by sentiment scoring.
#[cfg_attr(test, mockall::automock)]
pub trait PlayerDirectory: Send + Sync {
    /// 0 for unknown players.
    fn recharge_amount(&self, player_id: &str) -> f64;
}

/// Pair a plan with the recharge figures of the players in it.
pub fn round_input(plan: BetSheet, directory: &dyn PlayerDirectory) -> RoundInput {
    let recharges: Recharges = plan
        .players()
        .map(|pid| (pid.clone(), directory.recharge_amount(pid)))
        .collect();
    RoundInput { plan, recharges }
}

/// Generate the next round's plan and look up recharges for it.
pub fn next_round_input<P>(players: &mut P, round_id: u64) -> RoundInput
where
    P: BetGenerator + PlayerDirectory,
{
    let plan = players.generate_bets(round_id);
    round_input(plan, players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::engine::SimulationSession;
    use crate::types::{AreaBets, OutcomeArea};

    fn area(id: u8) -> OutcomeArea {
        OutcomeArea::new(id).unwrap()
    }

    #[test]
    fn test_round_input_looks_up_every_planned_player() {
        let mut plan = BetSheet::new();
        plan.insert("a", AreaBets::from_pairs(&[(area(1), 500.0)]));
        plan.insert("b", AreaBets::from_pairs(&[(area(2), 500.0)]));

        let mut directory = MockPlayerDirectory::new();
        directory
            .expect_recharge_amount()
            .times(2)
            .returning(|pid| if pid == "a" { 50.0 } else { 0.0 });

        let input = round_input(plan, &directory);
        assert_eq!(input.recharges.len(), 2);
        assert_eq!(input.recharges["a"], 50.0);
        assert_eq!(input.recharges["b"], 0.0);
    }

    #[test]
    fn test_generator_feeds_a_round() {
        let mut generator = MockBetGenerator::new();
        generator.expect_generate_bets().times(1).returning(|round_id| {
            let mut sheet = BetSheet::new();
            sheet.insert(format!("p{round_id}"), AreaBets::from_pairs(&[(area(5), 1000.0)]));
            sheet
        });
        let mut directory = MockPlayerDirectory::new();
        directory.expect_recharge_amount().returning(|_| 10.0);

        let mut session = SimulationSession::new(AppConfig::default().rules().unwrap(), 9);
        let round_id = session.next_round_id();
        let input = round_input(generator.generate_bets(round_id), &directory);
        let mut round = session.begin_round(input);
        let report = round.run_to_completion(&mut session).unwrap();

        assert_eq!(report.total_wagered, 1000.0);
        assert_eq!(report.players[0].player_id, "p1");
    }
}
