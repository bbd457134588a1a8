//! Canonical text forms of rules-engine figures.
//!
//! Generated documents must quote these strings verbatim, so every renderer
//! here is total and deterministic.

use rust_decimal::{Decimal, RoundingStrategy};

/// `$1,234,567.89`, with a leading `-` for negatives.
#[must_use]
pub fn money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${}.{frac}", group_thousands(whole))
}

/// `7.250%`, to `dp` places.
#[must_use]
pub fn percent(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}%", prec = dp as usize)
}

/// `1.35x`.
#[must_use]
pub fn multiple(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}x")
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("0", "$0.00")]
    #[case("12", "$12.00")]
    #[case("1234.5", "$1,234.50")]
    #[case("1000000", "$1,000,000.00")]
    #[case("999999.995", "$1,000,000.00")]
    #[case("-2500.125", "-$2,500.13")]
    fn money_rendering(#[case] raw: &str, #[case] shown: &str) {
        assert_eq!(money(Decimal::from_str(raw).unwrap()), shown);
    }

    #[test]
    fn percent_and_multiple_rendering() {
        assert_eq!(percent(Decimal::from_str("7.25").unwrap(), 3), "7.250%");
        assert_eq!(percent(Decimal::from_str("62.5").unwrap(), 2), "62.50%");
        assert_eq!(multiple(Decimal::from_str("1.3456").unwrap()), "1.35x");
    }
}
