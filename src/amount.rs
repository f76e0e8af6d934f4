//! Exact decimal ↔ minor-unit conversion
//!
//! Each ledger counts the asset in its own minor units (USDC uses 6 decimals on
//! both Base and Aptos, other deployments differ). Conversion goes through
//! `BigDecimal` so no amount ever touches floating point.

use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use crate::error::TransferError;

/// Largest decimals value accepted by either side of a transfer
pub const MAX_DECIMALS: u8 = 18;

/// Convert a decimal string (e.g. `"1.5"`) into minor units.
///
/// Rejects non-numeric, zero, negative, and over-precise inputs. Exponent
/// notation such as `"1e3"` is not a plain decimal and is rejected as well.
pub fn to_minor_units(amount: &str, decimals: u8) -> Result<u128, TransferError> {
    if decimals > MAX_DECIMALS {
        return Err(TransferError::InvalidAmount(format!(
            "unsupported decimals {}",
            decimals
        )));
    }

    let trimmed = amount.trim();
    if trimmed.contains(['e', 'E']) {
        return Err(TransferError::InvalidAmount(format!(
            "{:?}: exponent notation is not accepted",
            amount
        )));
    }
    let value = BigDecimal::from_str(trimmed)
        .map_err(|e| TransferError::InvalidAmount(format!("{:?}: {}", amount, e)))?;

    if value <= BigDecimal::zero() {
        return Err(TransferError::InvalidAmount(format!(
            "{:?}: must be greater than zero",
            amount
        )));
    }

    let scale = BigDecimal::from(10u64.pow(decimals as u32));
    let scaled = value * scale;
    if !scaled.is_integer() {
        return Err(TransferError::InvalidAmount(format!(
            "{:?}: more than {} decimal places",
            amount, decimals
        )));
    }

    let (digits, _) = scaled.with_scale(0).as_bigint_and_exponent();
    digits
        .to_u128()
        .ok_or_else(|| TransferError::InvalidAmount(format!("{:?}: out of range", amount)))
}

/// Render minor units as a decimal string, keeping at least one fractional digit
pub fn format_minor_units(raw: u128, decimals: u8) -> String {
    if decimals == 0 {
        return format!("{}.0", raw);
    }
    let unit = 10u128.pow(decimals as u32);
    let whole = raw / unit;
    let frac = format!("{:0width$}", raw % unit, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, frac)
    }
}

/// Re-express an amount in another chain's precision.
///
/// Scaling down must not drop nonzero digits.
pub fn rescale(raw: u128, from_decimals: u8, to_decimals: u8) -> Result<u128, TransferError> {
    if from_decimals == to_decimals {
        return Ok(raw);
    }
    if to_decimals > from_decimals {
        let factor = 10u128.pow((to_decimals - from_decimals) as u32);
        return raw.checked_mul(factor).ok_or_else(|| {
            TransferError::InvalidAmount(format!("{} overflows at {} decimals", raw, to_decimals))
        });
    }
    let factor = 10u128.pow((from_decimals - to_decimals) as u32);
    if raw % factor != 0 {
        return Err(TransferError::InvalidAmount(format!(
            "{} loses precision at {} decimals",
            raw, to_decimals
        )));
    }
    Ok(raw / factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units("1.0", 6).unwrap(), 1_000_000);
        assert_eq!(to_minor_units("0.000001", 6).unwrap(), 1);
        assert_eq!(to_minor_units("10", 8).unwrap(), 1_000_000_000);
        assert_eq!(to_minor_units(" 2.5 ", 6).unwrap(), 2_500_000);
    }

    #[test]
    fn test_to_minor_units_rejects_invalid() {
        for bad in ["", "abc", "0", "0.0", "-1", "1.0000001", "1e3", "2E-1", "1.5e0"] {
            let err = to_minor_units(bad, 6).unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT", "input {:?}", bad);
        }
        assert!(to_minor_units("1", 19).is_err());
    }

    #[test]
    fn test_format_minor_units() {
        assert_eq!(format_minor_units(1_000_000, 6), "1.0");
        assert_eq!(format_minor_units(1_500_000, 6), "1.5");
        assert_eq!(format_minor_units(1, 6), "0.000001");
        assert_eq!(format_minor_units(0, 6), "0.0");
        assert_eq!(format_minor_units(42, 0), "42.0");
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(1_000_000, 6, 8).unwrap(), 100_000_000);
        assert_eq!(rescale(100_000_000, 8, 6).unwrap(), 1_000_000);
        assert!(rescale(100_000_001, 8, 6).is_err());
        assert_eq!(rescale(7, 6, 6).unwrap(), 7);
    }
}
