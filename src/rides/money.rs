use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serializer;

/// Monetary amounts are carried as exact decimals and quantized to two
/// places, round half up, before storage or display.
pub fn quantize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fixed two-decimal rendering used everywhere money leaves the API.
pub fn to_fixed_string(amount: Decimal) -> String {
    format!("{:.2}", quantize(amount))
}

pub fn serialize_amount<S>(amount: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&to_fixed_string(*amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    #[test]
    fn quantizes_round_half_up() {
        assert_eq!(to_fixed_string(dec("19.999")), "20.00");
        assert_eq!(to_fixed_string(dec("19.994")), "19.99");
        assert_eq!(to_fixed_string(dec("19.995")), "20.00");
    }

    #[test]
    fn pads_to_two_places() {
        assert_eq!(to_fixed_string(dec("5")), "5.00");
        assert_eq!(to_fixed_string(dec("5.1")), "5.10");
    }

    #[test]
    fn negative_amounts_round_away_from_zero() {
        assert_eq!(to_fixed_string(dec("-19.995")), "-20.00");
        // A negative amount that quantizes to zero renders unsigned.
        assert_eq!(to_fixed_string(dec("-0.004")), "0.00");
    }

    #[test]
    fn no_float_drift_on_repeated_math() {
        let mut total = Decimal::ZERO;
        for _ in 0..100 {
            total += dec("0.10");
        }
        assert_eq!(to_fixed_string(total), "10.00");
    }
}
