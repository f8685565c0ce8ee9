//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults matching the reference game, so a partial (or
//! missing) file is fine. [`AppConfig::rules`] validates the raw values and
//! produces the immutable [`GameRules`] the engine runs on.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::engine::pool::{default_bands, validate_bands, RtpBand};
use crate::error::ConfigError;
use crate::types::{parse_areas, PayoutTable, RoundDurations, WinningStructure, AREA_COUNT};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub game: GameConfig,
    pub schedule: ScheduleConfig,
    pub control: ControlConfig,
    pub memory: MemoryConfig,
    pub pool: PoolConfig,
    pub structures: Vec<StructureConfig>,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for bet generation and bet scheduling.
    pub seed: u64,
    /// Number of synthetic players.
    pub players: usize,
    /// Stop after this many rounds (0 = run until interrupted).
    pub max_rounds: u64,
    /// Wall-clock length of one tick in the binary.
    pub tick_millis: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    /// Payout multiplier per area, ordered by area id 1..=8.
    pub payout_rates: Vec<f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub betting_secs: u32,
    pub waiting_secs: u32,
    pub animation_secs: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    /// Base standard deviation of weighted player RTP.
    pub std_threshold: f64,
    pub confidence_level: f64,
    /// Players staking less than this in a round are not sampled.
    pub minimum_bet_threshold: f64,
    pub target_rtp: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of trailing wagering rounds considered.
    pub window: usize,
    /// Exponential decay rate per round of age.
    pub decay_alpha: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    pub initial_value: Decimal,
    /// Fraction of each stake withheld (0.01 = 1%).
    pub tax_rate: Decimal,
    /// Highest float first; must partition the real line.
    pub bands: Vec<RtpBand>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StructureConfig {
    pub areas: Vec<u8>,
    #[serde(default)]
    pub weight: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            game: GameConfig::default(),
            schedule: ScheduleConfig::default(),
            control: ControlConfig::default(),
            memory: MemoryConfig::default(),
            pool: PoolConfig::default(),
            structures: default_structures(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            players: 200,
            max_rounds: 0,
            tick_millis: 1000,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            payout_rates: vec![5.0, 5.0, 5.0, 5.0, 10.0, 15.0, 25.0, 45.0],
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            betting_secs: 3,
            waiting_secs: 1,
            animation_secs: 1,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            std_threshold: 0.15,
            confidence_level: 0.95,
            minimum_bet_threshold: 500.0,
            target_rtp: 0.995,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window: 30,
            decay_alpha: 0.1,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_value: dec!(5000000),
            tax_rate: dec!(0.01),
            bands: default_bands(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

fn default_structures() -> Vec<StructureConfig> {
    [
        (vec![1], 1930),
        (vec![2], 1930),
        (vec![3], 1930),
        (vec![4], 1930),
        (vec![5], 965),
        (vec![6], 640),
        (vec![7], 390),
        (vec![8], 215),
        (vec![1, 2, 3, 4], 60),
        (vec![5, 6, 7, 8], 10),
    ]
    .into_iter()
    .map(|(areas, weight)| StructureConfig { areas, weight })
    .collect()
}

// ---------------------------------------------------------------------------
// Validated rules
// ---------------------------------------------------------------------------

/// Pool parameters after validation.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub initial_value: Decimal,
    pub tax_rate: Decimal,
    pub bands: Vec<RtpBand>,
}

/// Immutable, validated game configuration shared by every component.
#[derive(Debug, Clone)]
pub struct GameRules {
    pub payouts: PayoutTable,
    pub structures: Vec<WinningStructure>,
    pub durations: RoundDurations,
    pub std_threshold: f64,
    pub confidence_level: f64,
    pub minimum_bet_threshold: f64,
    pub target_rtp: f64,
    pub memory_window: usize,
    pub memory_decay_alpha: f64,
    pub pool: PoolSettings,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate every invariant and build the engine's rule set.
    pub fn rules(&self) -> Result<GameRules, ConfigError> {
        let payouts = self.payout_table()?;
        let structures = self.winning_structures()?;

        let s = &self.schedule;
        if s.betting_secs == 0 {
            return Err(ConfigError::ZeroDuration { phase: "betting" });
        }
        if s.animation_secs == 0 {
            return Err(ConfigError::ZeroDuration { phase: "animation" });
        }

        let c = &self.control;
        if !(c.confidence_level > 0.0 && c.confidence_level < 1.0) {
            return Err(ConfigError::ConfidenceLevel(c.confidence_level));
        }
        non_negative("std_threshold", c.std_threshold)?;
        non_negative("minimum_bet_threshold", c.minimum_bet_threshold)?;
        non_negative("target_rtp", c.target_rtp)?;

        if self.memory.window == 0 {
            return Err(ConfigError::ZeroMemoryWindow);
        }
        non_negative("decay_alpha", self.memory.decay_alpha)?;

        let p = &self.pool;
        if p.tax_rate < Decimal::ZERO || p.tax_rate >= Decimal::ONE {
            return Err(ConfigError::TaxRate(p.tax_rate.to_string()));
        }
        validate_bands(&p.bands)?;

        Ok(GameRules {
            payouts,
            structures,
            durations: RoundDurations {
                betting: s.betting_secs,
                waiting: s.waiting_secs,
                animation: s.animation_secs,
            },
            std_threshold: c.std_threshold,
            confidence_level: c.confidence_level,
            minimum_bet_threshold: c.minimum_bet_threshold,
            target_rtp: c.target_rtp,
            memory_window: self.memory.window,
            memory_decay_alpha: self.memory.decay_alpha,
            pool: PoolSettings {
                initial_value: p.initial_value,
                tax_rate: p.tax_rate,
                bands: p.bands.clone(),
            },
        })
    }

    fn payout_table(&self) -> Result<PayoutTable, ConfigError> {
        let rates = &self.game.payout_rates;
        if rates.len() != AREA_COUNT {
            return Err(ConfigError::PayoutTableSize {
                expected: AREA_COUNT,
                found: rates.len(),
            });
        }
        let mut table = [0.0; AREA_COUNT];
        for (i, &rate) in rates.iter().enumerate() {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::InvalidMultiplier {
                    area: i as u8 + 1,
                    value: rate,
                });
            }
            table[i] = rate;
        }
        Ok(PayoutTable::new(table))
    }

    fn winning_structures(&self) -> Result<Vec<WinningStructure>, ConfigError> {
        if self.structures.is_empty() {
            return Err(ConfigError::NoStructures);
        }
        self.structures
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                if raw.areas.is_empty() {
                    return Err(ConfigError::EmptyStructure { index });
                }
                let mut seen = HashSet::new();
                if let Some(&area) = raw.areas.iter().find(|a| !seen.insert(**a)) {
                    return Err(ConfigError::DuplicateArea { index, area });
                }
                Ok(WinningStructure::new(parse_areas(&raw.areas)?, raw.weight))
            })
            .collect()
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeParameter { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = AppConfig::default().rules().unwrap();
        assert_eq!(rules.structures.len(), 10);
        assert_eq!(rules.durations.total(), 5);
        assert_eq!(rules.memory_window, 30);
        assert_eq!(rules.pool.initial_value, dec!(5000000));
        assert_eq!(rules.payouts.max_multiplier(), 45.0);
    }

    #[test]
    fn test_load_config() {
        // Only meaningful when config.toml is in the working directory.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            let rules = cfg.rules().unwrap();
            assert!(!rules.structures.is_empty());
            assert!(rules.confidence_level > 0.0 && rules.confidence_level < 1.0);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [control]
            target_rtp = 0.97

            [schedule]
            betting_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.control.target_rtp, 0.97);
        assert_eq!(cfg.control.confidence_level, 0.95);
        assert_eq!(cfg.schedule.betting_secs, 10);
        assert_eq!(cfg.schedule.waiting_secs, 1);
        assert_eq!(cfg.structures.len(), 10);
        assert!(cfg.rules().is_ok());
    }

    #[test]
    fn test_toml_structures_and_bands() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [[structures]]
            areas = [1, 2]
            weight = 3

            [pool]
            initial_value = 1000
            tax_rate = 0.02

            [[pool.bands]]
            target_rtp = 1.1
            lower = 500

            [[pool.bands]]
            target_rtp = 0.9
            upper = 500
            "#,
        )
        .unwrap();
        let rules = cfg.rules().unwrap();
        assert_eq!(rules.structures.len(), 1);
        assert_eq!(rules.structures[0].areas.len(), 2);
        assert_eq!(rules.pool.bands.len(), 2);
        assert!(rules.pool.tax_rate > dec!(0.019) && rules.pool.tax_rate < dec!(0.021));
    }

    #[test]
    fn test_empty_structures_rejected() {
        let mut cfg = AppConfig::default();
        cfg.structures.clear();
        assert_eq!(cfg.rules().unwrap_err(), ConfigError::NoStructures);
    }

    #[test]
    fn test_unknown_area_rejected() {
        let mut cfg = AppConfig::default();
        cfg.structures[0].areas = vec![9];
        assert_eq!(cfg.rules().unwrap_err(), ConfigError::UnknownArea(9));
    }

    #[test]
    fn test_duplicate_area_rejected() {
        let mut cfg = AppConfig::default();
        cfg.structures[2].areas = vec![3, 3];
        assert_eq!(
            cfg.rules().unwrap_err(),
            ConfigError::DuplicateArea { index: 2, area: 3 }
        );
    }

    #[test]
    fn test_payout_table_size_and_values() {
        let mut cfg = AppConfig::default();
        cfg.game.payout_rates.pop();
        assert!(matches!(cfg.rules(), Err(ConfigError::PayoutTableSize { .. })));

        let mut cfg = AppConfig::default();
        cfg.game.payout_rates[4] = 0.0;
        assert!(matches!(
            cfg.rules(),
            Err(ConfigError::InvalidMultiplier { area: 5, .. })
        ));
    }

    #[test]
    fn test_parameter_ranges() {
        let mut cfg = AppConfig::default();
        cfg.control.confidence_level = 1.0;
        assert!(matches!(cfg.rules(), Err(ConfigError::ConfidenceLevel(_))));

        let mut cfg = AppConfig::default();
        cfg.schedule.betting_secs = 0;
        assert!(matches!(cfg.rules(), Err(ConfigError::ZeroDuration { .. })));

        let mut cfg = AppConfig::default();
        cfg.memory.window = 0;
        assert_eq!(cfg.rules().unwrap_err(), ConfigError::ZeroMemoryWindow);

        let mut cfg = AppConfig::default();
        cfg.pool.tax_rate = dec!(1);
        assert!(matches!(cfg.rules(), Err(ConfigError::TaxRate(_))));

        let mut cfg = AppConfig::default();
        cfg.control.std_threshold = -0.1;
        assert!(matches!(cfg.rules(), Err(ConfigError::NegativeParameter { .. })));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(AppConfig::load("/nonexistent/rtp_control.toml").is_err());
        assert!(AppConfig::load_or_default("/nonexistent/rtp_control.toml").is_ok());
    }
}
