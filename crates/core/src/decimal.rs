//! Fixed-point scaling, RAY/WAD conversion, and USD valuation.
//!
//! All math stays in native `U256` until the final USD step; floats only
//! appear at the display boundary. Builds on the `u256_math` module's
//! lookup tables and constants under the `scaleTo18`/`scaleFrom18`/
//! `applyRay`/`usd` naming the rest of the engine expects.

use alloy::primitives::U256;
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// RAY constant: 1e27 for 27-decimal fixed-point arithmetic.
pub const RAY: U256 = U256::from_limbs([1000000000000000000000000000u128 as u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Oracle price decimals (8), matching Chainlink USD feeds.
pub const PRICE_DECIMALS: u8 = 8;

/// Maximum plausible USD magnitude; anything beyond this is almost
/// certainly a decoding or decimals error rather than a real balance.
pub const MAX_PLAUSIBLE_USD: f64 = 1e9;

#[derive(Debug, Error, PartialEq)]
pub enum DecimalError {
    #[error("usd value is not finite")]
    NotFinite,
    #[error("usd value is negative: {0}")]
    Negative(f64),
    #[error("usd value exceeds plausible magnitude: {0}")]
    TooLarge(f64),
}

const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power-of-10 lookup, up to 10^38.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Scale a raw token amount with `dec` decimals up to 18-decimal WAD.
#[inline(always)]
pub fn scale_to_18(raw: U256, dec: u8) -> U256 {
    if dec == 18 {
        raw
    } else if dec < 18 {
        raw * pow10(18 - dec)
    } else {
        raw / pow10(dec - 18)
    }
}

/// Scale an 18-decimal WAD value down to `dec` decimals.
#[inline(always)]
pub fn scale_from_18(value: U256, dec: u8) -> U256 {
    if dec == 18 {
        value
    } else if dec < 18 {
        value / pow10(18 - dec)
    } else {
        value * pow10(dec - 18)
    }
}

/// Apply a RAY-scaled index: `v * index_ray / 10^27`.
#[inline(always)]
pub fn apply_ray(v: U256, index_ray: U256) -> U256 {
    (v * index_ray) / RAY
}

/// Apply basis points reduction: `value * (10000 - bps) / 10000`.
#[inline(always)]
pub fn apply_basis_points(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u16.saturating_sub(basis_points));
    (value * factor) / BPS_DENOMINATOR
}

/// Apply basis points increase: `value * (10000 + bps) / 10000`.
#[inline(always)]
pub fn apply_basis_points_up(value: U256, basis_points: u16) -> U256 {
    let factor = U256::from(10000u16.saturating_add(basis_points));
    (value * factor) / BPS_DENOMINATOR
}

/// USD value from a raw token amount and an oracle price, as a float.
///
/// Formula: `amount * price * 10^(18 - dec - price_dec)`, converted to
/// float only at the end. `price_dec` is usually [`PRICE_DECIMALS`] but is
/// taken as a parameter since some feeds report a different precision.
pub fn usd(raw: U256, dec: u8, price_raw: U256, price_dec: u8) -> f64 {
    wad_to_f64(usd_wad(raw, dec, price_raw, price_dec))
}

/// Same as [`usd`] but keeps the result in WAD fixed point.
#[inline(always)]
pub fn usd_wad(raw: U256, dec: u8, price_raw: U256, price_dec: u8) -> U256 {
    if raw.is_zero() || price_raw.is_zero() {
        return U256::ZERO;
    }

    let target_decimals = 18i32;
    let scale_adjustment = target_decimals - dec as i32 - price_dec as i32;

    if scale_adjustment >= 0 {
        raw * price_raw * pow10(scale_adjustment as u8)
    } else {
        (raw * price_raw) / pow10((-scale_adjustment) as u8)
    }
}

/// Convert a WAD value to f64. Use only for display/logging, never to
/// feed back into integer computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Convert an f64 to WAD. Use only for converting external input.
#[inline(always)]
pub fn f64_to_wad(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Reject a USD figure that is non-finite, negative, or implausibly large.
///
/// A `> 1e9` magnitude almost always indicates a decimals/price decode bug
/// rather than a real position, so it is treated as invalid rather than
/// silently accepted.
pub fn validate_usd(value: f64) -> Result<(), DecimalError> {
    if !value.is_finite() {
        return Err(DecimalError::NotFinite);
    }
    if value < 0.0 {
        return Err(DecimalError::Negative(value));
    }
    if value > MAX_PLAUSIBLE_USD {
        return Err(DecimalError::TooLarge(value));
    }
    Ok(())
}

/// Percentage difference in basis points: `(new - old) * 10000 / old`.
/// Positive = increase, negative = decrease.
#[inline(always)]
pub fn pct_diff_bps(old: U256, new: U256) -> i64 {
    if old.is_zero() {
        return 0;
    }

    if new >= old {
        let diff = new - old;
        let bps = (diff * BPS_DENOMINATOR) / old;
        bps.to::<i64>()
    } else {
        let diff = old - new;
        let bps = (diff * BPS_DENOMINATOR) / old;
        -(bps.to::<i64>())
    }
}

/// Multiply two WAD values: `(a * b) / WAD`.
#[inline(always)]
pub fn wad_mul(a: U256, b: U256) -> U256 {
    (a * b) / WAD
}

/// Divide two WAD values: `(a * WAD) / b`.
#[inline(always)]
pub fn wad_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    (a * WAD) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_between_decimals_and_wad() {
        let raw = U256::from(1_000_000u64); // 1 USDC, 6 decimals
        let wad = scale_to_18(raw, 6);
        assert_eq!(wad, WAD);
        assert_eq!(scale_from_18(wad, 6), raw);
    }

    #[test]
    fn apply_ray_scales_by_index() {
        let v = U256::from(1000u64) * WAD;
        let index = RAY + RAY / U256::from(20u64); // 1.05 index
        let scaled = apply_ray(v, index);
        assert_eq!(scaled, v + v / U256::from(20u64));
    }

    #[test]
    fn usd_matches_known_value() {
        let amount = U256::from(1000_000000u64); // 1000 USDC
        let price = U256::from(100_000_000u64); // $1.00
        assert_eq!(usd(amount, 6, price, PRICE_DECIMALS), 1000.0);
    }

    #[test]
    fn validate_usd_rejects_bad_values() {
        assert_eq!(validate_usd(f64::NAN), Err(DecimalError::NotFinite));
        assert_eq!(validate_usd(-1.0), Err(DecimalError::Negative(-1.0)));
        assert_eq!(validate_usd(2e9), Err(DecimalError::TooLarge(2e9)));
        assert_eq!(validate_usd(500.0), Ok(()));
    }

    #[test]
    fn pct_diff_bps_signed() {
        assert_eq!(pct_diff_bps(U256::from(100u64), U256::from(110u64)), 1000);
        assert_eq!(pct_diff_bps(U256::from(100u64), U256::from(90u64)), -1000);
    }
}
