//! Platform liquidity pool.
//!
//! Tracks the platform's net float (stakes in after tax, payouts out) and
//! maps the float level to a dynamic RTP target through ordered bands.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Target returned when no band matches. Unreachable with a validated band
/// set.
pub const FALLBACK_TARGET_RTP: f64 = 1.00;

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// Half-open pool range `[lower, upper)` with its RTP target. `None` means
/// unbounded on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpBand {
    pub target_rtp: f64,
    pub lower: Option<Decimal>,
    pub upper: Option<Decimal>,
}

impl RtpBand {
    pub fn new(target_rtp: f64, lower: Option<Decimal>, upper: Option<Decimal>) -> Self {
        Self { target_rtp, lower, upper }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        let above_lower = self.lower.map_or(true, |lo| value >= lo);
        let below_upper = self.upper.map_or(true, |hi| value < hi);
        above_lower && below_upper
    }
}

/// The standard seven-band ladder, highest float first.
pub fn default_bands() -> Vec<RtpBand> {
    vec![
        RtpBand::new(1.20, Some(dec!(10000000)), None),
        RtpBand::new(1.10, Some(dec!(8000000)), Some(dec!(10000000))),
        RtpBand::new(1.05, Some(dec!(6000000)), Some(dec!(8000000))),
        RtpBand::new(1.00, Some(dec!(4000000)), Some(dec!(6000000))),
        RtpBand::new(0.95, Some(dec!(2000000)), Some(dec!(4000000))),
        RtpBand::new(0.90, Some(dec!(0)), Some(dec!(2000000))),
        RtpBand::new(0.80, None, Some(dec!(0))),
    ]
}

/// Check that `bands` is ordered high-to-low and covers the real line with
/// no gaps or overlaps.
pub fn validate_bands(bands: &[RtpBand]) -> Result<(), ConfigError> {
    let (first, last) = match (bands.first(), bands.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(ConfigError::BandPartition("no bands configured".into())),
    };
    if first.upper.is_some() {
        return Err(ConfigError::BandPartition(
            "highest band must be unbounded above".into(),
        ));
    }
    if last.lower.is_some() {
        return Err(ConfigError::BandPartition(
            "lowest band must be unbounded below".into(),
        ));
    }

    for (i, band) in bands.iter().enumerate() {
        if !band.target_rtp.is_finite() || band.target_rtp < 0.0 {
            return Err(ConfigError::BandPartition(format!(
                "band #{i} has invalid target {}",
                band.target_rtp
            )));
        }
        if let (Some(lo), Some(hi)) = (band.lower, band.upper) {
            if lo >= hi {
                return Err(ConfigError::BandPartition(format!(
                    "band #{i} is empty: [{lo}, {hi})"
                )));
            }
        }
    }

    for (i, pair) in bands.windows(2).enumerate() {
        let (upper_band, lower_band) = (&pair[0], &pair[1]);
        match (upper_band.lower, lower_band.upper) {
            (Some(a), Some(b)) if a == b => {}
            (a, b) => {
                return Err(ConfigError::BandPartition(format!(
                    "band #{i} starts at {a:?} but band #{} ends at {b:?}",
                    i + 1
                )))
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    In,
    Out,
}

/// One recorded movement of the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDelta {
    pub direction: FlowDirection,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct LiquidityPool {
    value: Decimal,
    /// Fraction withheld from every stake (0.01 = 1%).
    tax_rate: Decimal,
    bands: Vec<RtpBand>,
    history: Vec<PoolDelta>,
}

impl LiquidityPool {
    /// Bands are expected to have passed [`validate_bands`].
    pub fn new(initial_value: Decimal, tax_rate: Decimal, bands: Vec<RtpBand>) -> Self {
        Self {
            value: initial_value,
            tax_rate,
            bands,
            history: Vec::new(),
        }
    }

    /// Credit a stake net of tax. Returns the amount credited.
    pub fn inflow(&mut self, bet_amount: Decimal) -> Decimal {
        let taxed = bet_amount * (Decimal::ONE - self.tax_rate);
        self.value += taxed;
        self.history.push(PoolDelta {
            direction: FlowDirection::In,
            amount: taxed,
        });
        taxed
    }

    /// Debit a payout.
    pub fn outflow(&mut self, payout_amount: Decimal) {
        self.value -= payout_amount;
        self.history.push(PoolDelta {
            direction: FlowDirection::Out,
            amount: payout_amount,
        });
    }

    /// RTP target for the band containing the current value.
    pub fn current_target_rtp(&self) -> f64 {
        match self.band_for(self.value) {
            Some(band) => {
                debug!(pool = %self.value, target = band.target_rtp, "RTP band resolved");
                band.target_rtp
            }
            None => {
                warn!(pool = %self.value, "Pool value outside every RTP band, using fallback");
                FALLBACK_TARGET_RTP
            }
        }
    }

    /// First band (in descending order) containing `value`.
    pub fn band_for(&self, value: Decimal) -> Option<&RtpBand> {
        self.bands.iter().find(|band| band.contains(value))
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    pub fn bands(&self) -> &[RtpBand] {
        &self.bands
    }

    /// The last `n` deltas, oldest first.
    pub fn recent_deltas(&self, n: usize) -> &[PoolDelta] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_pool() -> LiquidityPool {
        LiquidityPool::new(dec!(5000000), dec!(0.01), default_bands())
    }

    #[test]
    fn test_inflow_outflow_scenario() {
        let mut pool = standard_pool();
        let credited = pool.inflow(dec!(1000));
        assert_eq!(credited, dec!(990));
        assert_eq!(pool.value(), dec!(5000990));

        pool.outflow(dec!(500));
        assert_eq!(pool.value(), dec!(5000490));
        assert_eq!(pool.current_target_rtp(), 1.00);
    }

    #[test]
    fn test_recent_deltas_are_logged_in_order() {
        let mut pool = standard_pool();
        pool.inflow(dec!(100));
        pool.outflow(dec!(40));
        pool.inflow(dec!(200));

        let last_two = pool.recent_deltas(2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].direction, FlowDirection::Out);
        assert_eq!(last_two[0].amount, dec!(40));
        assert_eq!(last_two[1].amount, dec!(198));
        assert_eq!(pool.recent_deltas(100).len(), 3);
    }

    #[test]
    fn test_band_edges_are_half_open() {
        let pool = standard_pool();
        assert_eq!(pool.band_for(dec!(10000000)).unwrap().target_rtp, 1.20);
        assert_eq!(pool.band_for(dec!(9999999.99)).unwrap().target_rtp, 1.10);
        assert_eq!(pool.band_for(dec!(0)).unwrap().target_rtp, 0.90);
        assert_eq!(pool.band_for(dec!(-0.01)).unwrap().target_rtp, 0.80);
        assert_eq!(pool.band_for(dec!(-1000000000)).unwrap().target_rtp, 0.80);
    }

    #[test]
    fn test_every_value_matches_exactly_one_band() {
        let bands = default_bands();
        let probes = [
            dec!(-5000000),
            dec!(0),
            dec!(1999999),
            dec!(2000000),
            dec!(4000000),
            dec!(5500000),
            dec!(6000000),
            dec!(8000000),
            dec!(12345678),
        ];
        for value in probes {
            let matches = bands.iter().filter(|b| b.contains(value)).count();
            assert_eq!(matches, 1, "value {value} matched {matches} bands");
        }
    }

    #[test]
    fn test_target_is_pure_in_pool_value() {
        let mut pool = standard_pool();
        pool.outflow(dec!(3500000)); // 1.5M → 0.90 band
        let first = pool.current_target_rtp();
        let second = pool.current_target_rtp();
        assert_eq!(first, 0.90);
        assert_eq!(first, second);
    }

    #[test]
    fn test_default_bands_validate() {
        assert!(validate_bands(&default_bands()).is_ok());
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut bands = default_bands();
        bands[3].lower = Some(dec!(4500000));
        assert!(matches!(
            validate_bands(&bands),
            Err(ConfigError::BandPartition(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bounded_ends() {
        let mut bands = default_bands();
        bands[0].upper = Some(dec!(20000000));
        assert!(validate_bands(&bands).is_err());

        let mut bands = default_bands();
        bands.pop();
        assert!(validate_bands(&bands).is_err());
        assert!(validate_bands(&[]).is_err());
    }

    #[test]
    fn test_validate_rejects_ascending_order() {
        let mut bands = default_bands();
        bands.reverse();
        assert!(validate_bands(&bands).is_err());
    }

    #[test]
    fn test_fallback_without_matching_band() {
        // Deliberately unvalidated: only positive values are covered.
        let pool = LiquidityPool::new(
            dec!(-10),
            dec!(0.01),
            vec![RtpBand::new(1.1, Some(dec!(0)), None)],
        );
        assert_eq!(pool.current_target_rtp(), FALLBACK_TARGET_RTP);
    }
}
