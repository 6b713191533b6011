//! Instrument identifiers, weekly expiry resolution and strike arithmetic.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Opaque identifier of a tradable instrument in the upstream venue's namespace,
/// eg/ `NSE_INDEX|Nifty 50` or `NSE_FO|NIFTY25JANFUT`.
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct InstrumentKey(pub SmolStr);

impl InstrumentKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for InstrumentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Next weekly expiry strictly after `today` that falls on `weekday`.
///
/// An expiry day maps to the following week's expiry, eg/ Tuesday -> next Tuesday.
pub fn next_weekly_expiry(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let today_index = today.weekday().num_days_from_monday() as i64;
    let target_index = weekday.num_days_from_monday() as i64;

    let mut days_ahead = target_index - today_index;
    if days_ahead <= 0 {
        days_ahead += 7;
    }

    today + Duration::days(days_ahead)
}

/// Format an expiry date the way the option-chain endpoint expects it (`YYYY-MM-DD`).
pub fn format_expiry(expiry: NaiveDate) -> String {
    expiry.format("%Y-%m-%d").to_string()
}

/// Monthly futures contract name for the month of the next weekly expiry,
/// eg/ `NIFTY25JANFUT`.
pub fn futures_contract_name(prefix: &str, today: NaiveDate, weekday: Weekday) -> String {
    let expiry = next_weekly_expiry(today, weekday);
    format!(
        "{prefix}{}{}FUT",
        expiry.format("%y"),
        expiry.format("%b").to_string().to_uppercase()
    )
}

/// Instrument key of the current futures contract, eg/ `NSE_FO|NIFTY25JANFUT`.
pub fn futures_instrument_key(
    segment: &str,
    prefix: &str,
    today: NaiveDate,
    weekday: Weekday,
) -> InstrumentKey {
    InstrumentKey::new(format!(
        "{segment}|{}",
        futures_contract_name(prefix, today, weekday)
    ))
}

/// At-the-money strike: spot rounded to the nearest multiple of `strike_gap`.
///
/// Exact midpoints round to the even multiple, so `24175` with a gap of `50` gives `24200`
/// and `24125` gives `24100`. `None` for a non-positive gap, a non-finite spot or a strike
/// outside the `i64` range.
pub fn calculate_atm_strike(spot_price: f64, strike_gap: i64) -> Option<i64> {
    if strike_gap <= 0 || !spot_price.is_finite() {
        return None;
    }

    let multiple = (spot_price / strike_gap as f64).round_ties_even();
    if multiple.abs() >= i64::MAX as f64 {
        return None;
    }

    (multiple as i64).checked_mul(strike_gap)
}

/// Inclusive `(min, max)` strike band of `num_strikes` gaps either side of `atm_strike`, or
/// `None` when the band does not fit in `i64`.
pub fn get_strike_range(atm_strike: i64, num_strikes: u32, strike_gap: i64) -> Option<(i64, i64)> {
    let width = i64::from(num_strikes).checked_mul(strike_gap)?;
    Some((atm_strike.checked_sub(width)?, atm_strike.checked_add(width)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_next_weekly_expiry() {
        struct TestCase {
            input: NaiveDate,
            expected: NaiveDate,
        }

        let tests = vec![
            TestCase {
                // TC0: Monday -> the next day
                input: date(2025, 1, 6),
                expected: date(2025, 1, 7),
            },
            TestCase {
                // TC1: Tuesday -> following Tuesday
                input: date(2025, 1, 7),
                expected: date(2025, 1, 14),
            },
            TestCase {
                // TC2: Wednesday -> six days ahead
                input: date(2025, 1, 8),
                expected: date(2025, 1, 14),
            },
            TestCase {
                // TC3: Sunday rolls across a month boundary
                input: date(2025, 1, 26),
                expected: date(2025, 1, 28),
            },
            TestCase {
                // TC4: year boundary
                input: date(2024, 12, 31),
                expected: date(2025, 1, 7),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = next_weekly_expiry(test.input, Weekday::Tue);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_futures_contract_name_follows_expiry_month() {
        // Expiry on 2025-02-04 moves the contract into February
        assert_eq!(
            futures_contract_name("NIFTY", date(2025, 1, 30), Weekday::Tue),
            "NIFTY25FEBFUT"
        );
        assert_eq!(
            futures_instrument_key("NSE_FO", "NIFTY", date(2025, 1, 8), Weekday::Tue).as_str(),
            "NSE_FO|NIFTY25JANFUT"
        );
        assert_eq!(format_expiry(date(2025, 1, 7)), "2025-01-07");
    }

    #[test]
    fn test_calculate_atm_strike() {
        struct TestCase {
            spot: f64,
            strike_gap: i64,
            expected: Option<i64>,
        }

        let tests = vec![
            TestCase {
                // TC0: rounds up to the nearest strike
                spot: 24183.0,
                strike_gap: 50,
                expected: Some(24200),
            },
            TestCase {
                // TC1: rounds down
                spot: 24174.9,
                strike_gap: 50,
                expected: Some(24150),
            },
            TestCase {
                // TC2: midpoint to the even multiple
                spot: 24175.0,
                strike_gap: 50,
                expected: Some(24200),
            },
            TestCase {
                // TC3: midpoint to the even multiple, downwards
                spot: 24125.0,
                strike_gap: 50,
                expected: Some(24100),
            },
            TestCase {
                // TC4: already on a strike
                spot: 24200.0,
                strike_gap: 50,
                expected: Some(24200),
            },
            TestCase {
                // TC5: product overflows i64
                spot: 1e19,
                strike_gap: 50,
                expected: None,
            },
            TestCase {
                // TC6: multiple itself beyond i64
                spot: 1e300,
                strike_gap: 50,
                expected: None,
            },
            TestCase {
                // TC7: zero gap
                spot: 24183.0,
                strike_gap: 0,
                expected: None,
            },
            TestCase {
                // TC8: negative gap
                spot: 24183.0,
                strike_gap: -50,
                expected: None,
            },
            TestCase {
                // TC9: non-finite spot
                spot: f64::INFINITY,
                strike_gap: 50,
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = calculate_atm_strike(test.spot, test.strike_gap);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_get_strike_range() {
        assert_eq!(get_strike_range(24200, 2, 50), Some((24100, 24300)));
        assert_eq!(get_strike_range(24200, 0, 50), Some((24200, 24200)));
        assert_eq!(get_strike_range(i64::MAX - 10, 2, 50), None);
        assert_eq!(get_strike_range(i64::MIN + 10, 2, 50), None);
        assert_eq!(get_strike_range(0, u32::MAX, i64::MAX), None);
    }
}
