//! Ledger monetary units
//!
//! Output values are stored as integral base units so that balances add up exactly.
//! The service boundary speaks in coins (`f64`) and converts here.

use crate::error::{LedgerError, Result};

/// Number of base units in one coin
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// Reward locked to the recipient of every coinbase transaction (1000 coins)
pub const BLOCK_REWARD: u64 = 1_000 * UNITS_PER_COIN;

/// Convert a positive coin amount to base units.
///
/// # Examples
/// ```
/// use sealed_ledger::core::monetary::coins_to_units;
/// assert_eq!(coins_to_units(1.0).unwrap(), 100_000_000);
/// assert_eq!(coins_to_units(150.0).unwrap(), 15_000_000_000);
/// assert!(coins_to_units(-1.0).is_err());
/// ```
pub fn coins_to_units(coins: f64) -> Result<u64> {
    if !coins.is_finite() {
        return Err(LedgerError::InvalidAmount(format!("{coins} is not finite")));
    }
    if coins <= 0.0 {
        return Err(LedgerError::InvalidAmount(format!(
            "{coins} must be positive"
        )));
    }
    let units = (coins * UNITS_PER_COIN as f64).round();
    if units < 1.0 {
        return Err(LedgerError::InvalidAmount(format!(
            "{coins} is below the smallest unit"
        )));
    }
    if units >= u64::MAX as f64 {
        return Err(LedgerError::InvalidAmount(format!("{coins} is too large")));
    }
    Ok(units as u64)
}

/// Convert base units to coins.
///
/// # Examples
/// ```
/// use sealed_ledger::core::monetary::units_to_coins;
/// assert_eq!(units_to_coins(85_000_000_000), 850.0);
/// ```
pub fn units_to_coins(units: u64) -> f64 {
    units as f64 / UNITS_PER_COIN as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_reward_in_coins() {
        assert_eq!(units_to_coins(BLOCK_REWARD), 1000.0);
    }

    #[test]
    fn test_fractional_amounts() {
        assert_eq!(coins_to_units(0.5).unwrap(), 50_000_000);
        assert_eq!(coins_to_units(0.00000001).unwrap(), 1);
        // 0.1 is not exact in binary; rounding keeps it on the unit grid
        assert_eq!(coins_to_units(0.1).unwrap(), 10_000_000);
    }

    #[test]
    fn test_rejects_bad_amounts() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY, 1e-12, 1e30] {
            assert!(
                matches!(coins_to_units(bad), Err(LedgerError::InvalidAmount(_))),
                "{bad} was accepted"
            );
        }
    }
}
