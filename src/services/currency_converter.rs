//! Currency Converter
//!
//! Pure conversions between Naira (NGN), USDT and SUI. Nothing here does I/O
//! or holds state; callers supply the rates.
//!
//! Rounding is half-up: SUI amounts to 6 decimal places, Naira to 2.

use bigdecimal::{BigDecimal, RoundingMode, Signed, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{AppError, ValidationError};

/// Decimal places kept for SUI amounts
pub const NATIVE_DECIMALS: i64 = 6;
/// Decimal places kept for Naira and USDT amounts
pub const FIAT_DECIMALS: i64 = 2;
/// 1 SUI = 10^9 MIST
pub const MIST_PER_SUI: i64 = 1_000_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Invalid rate '{rate}': {reason}")]
    InvalidRate { rate: String, reason: String },

    #[error("Unsupported currency '{0}'")]
    UnsupportedCurrency(String),
}

pub type ConversionResult<T> = Result<T, ConversionError>;

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        let validation = match err {
            ConversionError::InvalidAmount { amount, reason } => {
                ValidationError::InvalidAmount { amount, reason }
            }
            ConversionError::InvalidRate { rate, reason } => {
                ValidationError::InvalidRate { rate, reason }
            }
            ConversionError::UnsupportedCurrency(currency) => ValidationError::InvalidCurrency {
                currency,
                reason: "Supported currencies are NGN, SUI and USDT".to_string(),
            },
        };
        AppError::validation(validation)
    }
}

/// Currencies the platform prices in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "NGN")]
    Ngn,
    #[serde(rename = "SUI")]
    Sui,
    #[serde(rename = "USDT")]
    Usdt,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Ngn => "NGN",
            Currency::Sui => "SUI",
            Currency::Usdt => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NGN" => Ok(Currency::Ngn),
            "SUI" => Ok(Currency::Sui),
            "USDT" => Ok(Currency::Usdt),
            other => Err(ConversionError::UnsupportedCurrency(other.to_string())),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn ensure_positive_amount(amount: &BigDecimal) -> ConversionResult<()> {
    if !amount.is_positive() {
        return Err(ConversionError::InvalidAmount {
            amount: amount.to_string(),
            reason: "Amount must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn ensure_positive_rate(rate: &BigDecimal) -> ConversionResult<()> {
    if !rate.is_positive() {
        return Err(ConversionError::InvalidRate {
            rate: rate.to_string(),
            reason: "Rate must be greater than zero".to_string(),
        });
    }
    Ok(())
}

fn round(value: BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfUp)
}

// ============================================================================
// Conversions
// ============================================================================

/// Naira to SUI at `rate` Naira per SUI, rounded to 6 dp
pub fn to_native(fiat_amount: &BigDecimal, rate: &BigDecimal) -> ConversionResult<BigDecimal> {
    ensure_positive_amount(fiat_amount)?;
    ensure_positive_rate(rate)?;
    Ok(round(fiat_amount / rate, NATIVE_DECIMALS))
}

/// SUI to Naira at `rate` Naira per SUI, rounded to 2 dp
pub fn to_fiat(native_amount: &BigDecimal, rate: &BigDecimal) -> ConversionResult<BigDecimal> {
    ensure_positive_amount(native_amount)?;
    ensure_positive_rate(rate)?;
    Ok(round(native_amount * rate, FIAT_DECIMALS))
}

/// NGN → USDT → SUI using a merchant USDT/NGN rate and the live SUI/USDT price
pub fn fiat_to_native_via_usdt(
    fiat_amount: &BigDecimal,
    usdt_to_ngn: &BigDecimal,
    sui_usdt_price: &BigDecimal,
) -> ConversionResult<BigDecimal> {
    ensure_positive_amount(fiat_amount)?;
    ensure_positive_rate(usdt_to_ngn)?;
    ensure_positive_rate(sui_usdt_price)?;
    let usdt = fiat_amount / usdt_to_ngn;
    Ok(round(usdt / sui_usdt_price, NATIVE_DECIMALS))
}

/// SUI → USDT → NGN, the inverse of [`fiat_to_native_via_usdt`]
pub fn native_to_fiat_via_usdt(
    native_amount: &BigDecimal,
    sui_usdt_price: &BigDecimal,
    usdt_to_ngn: &BigDecimal,
) -> ConversionResult<BigDecimal> {
    ensure_positive_amount(native_amount)?;
    ensure_positive_rate(sui_usdt_price)?;
    ensure_positive_rate(usdt_to_ngn)?;
    Ok(round(
        native_amount * sui_usdt_price * usdt_to_ngn,
        FIAT_DECIMALS,
    ))
}

/// Naira per SUI implied by the live price and a USDT/NGN rate, 2 dp
pub fn implied_fiat_rate(
    sui_usdt_price: &BigDecimal,
    usdt_to_ngn: &BigDecimal,
) -> ConversionResult<BigDecimal> {
    ensure_positive_rate(sui_usdt_price)?;
    ensure_positive_rate(usdt_to_ngn)?;
    Ok(round(sui_usdt_price * usdt_to_ngn, FIAT_DECIMALS))
}

/// SUI amount to MIST, truncating sub-MIST precision
pub fn native_to_smallest_units(amount: &BigDecimal) -> ConversionResult<i128> {
    let units = (amount * BigDecimal::from(MIST_PER_SUI)).with_scale_round(0, RoundingMode::Floor);
    units.to_i128().ok_or_else(|| ConversionError::InvalidAmount {
        amount: amount.to_string(),
        reason: "Amount does not fit in MIST units".to_string(),
    })
}

/// MIST to SUI, exact
pub fn smallest_units_to_native(units: i128) -> BigDecimal {
    BigDecimal::from(units) / BigDecimal::from(MIST_PER_SUI)
}

// ============================================================================
// Parsing & formatting
// ============================================================================

/// Parse an amount from a JSON number or numeric string.
///
/// NaN, infinities, booleans and other JSON types are `InvalidAmount`.
pub fn parse_amount(value: &serde_json::Value) -> ConversionResult<BigDecimal> {
    let raw = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => {
            return Err(ConversionError::InvalidAmount {
                amount: other.to_string(),
                reason: "Amount must be a number".to_string(),
            })
        }
    };

    BigDecimal::from_str(&raw).map_err(|_| ConversionError::InvalidAmount {
        amount: raw.clone(),
        reason: "Amount must be a finite number".to_string(),
    })
}

/// Convert an `f64` into a decimal, rejecting NaN and infinities
pub fn decimal_from_f64(value: f64) -> ConversionResult<BigDecimal> {
    if !value.is_finite() {
        return Err(ConversionError::InvalidAmount {
            amount: value.to_string(),
            reason: "Amount must be a finite number".to_string(),
        });
    }
    BigDecimal::from_str(&value.to_string()).map_err(|_| ConversionError::InvalidAmount {
        amount: value.to_string(),
        reason: "Amount must be a finite number".to_string(),
    })
}

/// Display formatting: `₦1,500.00`, `1.500000 SUI`, `1.00 USDT`
pub fn format_currency(amount: &BigDecimal, currency: Currency) -> String {
    match currency {
        Currency::Ngn => format!("₦{}", group_thousands(&round(amount.clone(), FIAT_DECIMALS))),
        Currency::Sui => format!("{} SUI", round(amount.clone(), NATIVE_DECIMALS)),
        Currency::Usdt => format!("{} USDT", round(amount.clone(), FIAT_DECIMALS)),
    }
}

fn group_thousands(value: &BigDecimal) -> String {
    let text = value.to_string();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::Zero;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_to_native_rounds_to_six_places() {
        assert_eq!(to_native(&dec("150000"), &dec("1500")).unwrap(), dec("100.000000"));
        assert_eq!(to_native(&dec("1000"), &dec("3")).unwrap(), dec("333.333333"));
        assert_eq!(to_native(&dec("2000"), &dec("3")).unwrap(), dec("666.666667"));
    }

    #[test]
    fn test_to_fiat_rounds_to_two_places() {
        assert_eq!(to_fiat(&dec("0.5"), &dec("1500")).unwrap(), dec("750.00"));
        assert_eq!(to_fiat(&dec("0.333333"), &dec("1500")).unwrap(), dec("500.00"));
        assert_eq!(to_fiat(&dec("1.234567"), &dec("1000")).unwrap(), dec("1234.57"));
    }

    #[test]
    fn test_round_trip_is_within_rounding_error() {
        let rates = ["100", "1500", "1623.75", "9999.99"];
        let amounts = ["0.000001", "0.49", "1", "3.141592", "100", "12345.678901"];
        for r in rates {
            for x in amounts {
                let rate = dec(r);
                let x = dec(x);
                let fiat = match to_fiat(&x, &rate) {
                    Ok(fiat) => fiat,
                    // tiny amounts at low rates round to zero Naira
                    Err(_) => continue,
                };
                if fiat.is_zero() {
                    continue;
                }
                let back = match to_native(&fiat, &rate) {
                    Ok(back) => back,
                    Err(_) => continue,
                };
                // 0.005 NGN of fiat rounding, divided by the rate, plus 6dp rounding
                let bound = dec("0.005") / &rate + dec("0.0000005");
                assert!(
                    (&back - &x).abs() <= bound,
                    "x={} rate={} fiat={} back={}",
                    x,
                    rate,
                    fiat,
                    back
                );
            }
        }
    }

    #[test]
    fn test_rejects_zero_and_negative_amounts() {
        for bad in ["0", "-1", "-0.000001"] {
            assert!(matches!(
                to_native(&dec(bad), &dec("1500")),
                Err(ConversionError::InvalidAmount { .. })
            ));
            assert!(matches!(
                to_fiat(&dec(bad), &dec("1500")),
                Err(ConversionError::InvalidAmount { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_non_positive_rates() {
        assert!(matches!(
            to_native(&dec("100"), &dec("0")),
            Err(ConversionError::InvalidRate { .. })
        ));
        assert!(matches!(
            to_fiat(&dec("100"), &dec("-5")),
            Err(ConversionError::InvalidRate { .. })
        ));
    }

    #[test]
    fn test_non_finite_and_non_numeric_inputs() {
        assert!(decimal_from_f64(f64::NAN).is_err());
        assert!(decimal_from_f64(f64::INFINITY).is_err());
        assert_eq!(decimal_from_f64(2.5).unwrap(), dec("2.5"));

        assert!(parse_amount(&serde_json::json!("NaN")).is_err());
        assert!(parse_amount(&serde_json::json!("abc")).is_err());
        assert!(parse_amount(&serde_json::json!(true)).is_err());
        assert!(parse_amount(&serde_json::json!(null)).is_err());
        assert_eq!(parse_amount(&serde_json::json!(150000)).unwrap(), dec("150000"));
        assert_eq!(parse_amount(&serde_json::json!(" 0.5 ")).unwrap(), dec("0.5"));
    }

    #[test]
    fn test_live_path_conversions() {
        // 1500 NGN at 1500 NGN/USDT = 1 USDT; at 2.50 USDT/SUI = 0.4 SUI
        let sui = fiat_to_native_via_usdt(&dec("1500"), &dec("1500"), &dec("2.50")).unwrap();
        assert_eq!(sui, dec("0.400000"));

        let ngn = native_to_fiat_via_usdt(&dec("0.4"), &dec("2.50"), &dec("1500")).unwrap();
        assert_eq!(ngn, dec("1500.00"));

        assert_eq!(implied_fiat_rate(&dec("2.5"), &dec("1500")).unwrap(), dec("3750.00"));
    }

    #[test]
    fn test_smallest_units() {
        assert_eq!(native_to_smallest_units(&dec("100")).unwrap(), 100_000_000_000);
        assert_eq!(native_to_smallest_units(&dec("0.49")).unwrap(), 490_000_000);
        // sub-MIST precision is truncated
        assert_eq!(native_to_smallest_units(&dec("0.0000000019")).unwrap(), 1);
        assert_eq!(smallest_units_to_native(1_500_000_000), dec("1.5"));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(&dec("1500"), Currency::Ngn), "₦1,500.00");
        assert_eq!(format_currency(&dec("1234567.891"), Currency::Ngn), "₦1,234,567.89");
        assert_eq!(format_currency(&dec("999"), Currency::Ngn), "₦999.00");
        assert_eq!(format_currency(&dec("1.5"), Currency::Sui), "1.500000 SUI");
        assert_eq!(format_currency(&dec("1"), Currency::Usdt), "1.00 USDT");
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("ngn".parse::<Currency>().unwrap(), Currency::Ngn);
        assert_eq!(" SUI ".parse::<Currency>().unwrap(), Currency::Sui);
        assert!("EUR".parse::<Currency>().is_err());
        assert_eq!(serde_json::to_value(Currency::Usdt).unwrap(), "USDT");
    }
}
