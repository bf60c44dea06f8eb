//! Canonicalises the date and amount spellings found in bank exports.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use hackspace_core::{DateOrder, Money};
use regex::Regex;
use rust_decimal::Decimal;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_date_iso, r"^(\d{4})-(\d{1,2})-(\d{1,2})$");
re!(re_date_numeric, r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})$");
re!(re_date_abbr_month, r"(?i)^(\d{1,2})[\s\-]+([a-z]{3})[\s\-]+(\d{4})$");

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Accepts `YYYY-MM-DD`, `D/M/YYYY` (also `-` or `.` separated) and
/// `D MMM YYYY`. Returns `None` for anything else or for impossible dates.
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let s = raw.trim();

    if let Some(c) = re_date_iso().captures(s) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }

    if let Some(c) = re_date_numeric().captures(s) {
        let first: u32 = c[1].parse().ok()?;
        let second: u32 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        // A first group above 12 can only be a day, whatever the policy.
        let (day, month) = match order {
            _ if first > 12 => (first, second),
            DateOrder::DayFirst => (first, second),
            DateOrder::MonthFirst => (second, first),
        };
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(c) = re_date_abbr_month().captures(s) {
        let day: u32 = c[1].parse().ok()?;
        let name = c[2].to_lowercase();
        let month = MONTHS.iter().position(|m| *m == name)? as u32 + 1;
        let year: i32 = c[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Parses a signed amount. Negatives may be written `-45.00`, `(45.00)` or
/// `45.00 DR`; a `CR` suffix marks an explicit credit. Currency symbols,
/// thousands separators and whitespace are ignored. Blank input is `None`,
/// as is any value too large to store in whole pence.
pub fn parse_amount(raw: &str) -> Option<Money> {
    let s = raw.trim();

    let (sign, s) = if let Some(head) = strip_suffix_ignore_case(s, "DR") {
        (Some(false), head)
    } else if let Some(head) = strip_suffix_ignore_case(s, "CR") {
        (Some(true), head)
    } else {
        (None, s)
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ',') && !c.is_whitespace())
        .collect();

    let (sign, cleaned) = match cleaned.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (Some(false), inner.to_string()),
        None => (sign, cleaned),
    };

    if cleaned.is_empty() {
        return None;
    }

    let value = Decimal::from_str(&cleaned).ok()?;
    let value = match sign {
        Some(true) => value.abs(),
        Some(false) => -value.abs(),
        None => value,
    };
    Some(Money::from_decimal(value)).filter(|m| m.to_cents().is_some())
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    #[test]
    fn day_above_twelve_forces_day_first() {
        assert_eq!(parse_date("13/02/2024", DateOrder::DayFirst), Some(d(2024, 2, 13)));
        assert_eq!(parse_date("13/02/2024", DateOrder::MonthFirst), Some(d(2024, 2, 13)));
    }

    #[test]
    fn ambiguous_date_follows_policy() {
        assert_eq!(parse_date("02/03/2024", DateOrder::DayFirst), Some(d(2024, 3, 2)));
        assert_eq!(parse_date("02/03/2024", DateOrder::MonthFirst), Some(d(2024, 2, 3)));
    }

    #[test]
    fn dash_and_dot_separators() {
        assert_eq!(parse_date("5-1-2024", DateOrder::DayFirst), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("25.12.2023", DateOrder::DayFirst), Some(d(2023, 12, 25)));
    }

    #[test]
    fn iso_dates() {
        assert_eq!(parse_date("2024-01-25", DateOrder::DayFirst), Some(d(2024, 1, 25)));
        assert_eq!(parse_date(" 2024-1-5 ", DateOrder::DayFirst), Some(d(2024, 1, 5)));
    }

    #[test]
    fn abbreviated_month_names() {
        assert_eq!(parse_date("5 Jan 2024", DateOrder::DayFirst), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("25 DEC 2023", DateOrder::DayFirst), Some(d(2023, 12, 25)));
        assert_eq!(parse_date("01-feb-2024", DateOrder::DayFirst), Some(d(2024, 2, 1)));
    }

    #[test]
    fn unrecognised_dates_are_none() {
        assert_eq!(parse_date("", DateOrder::DayFirst), None);
        assert_eq!(parse_date("yesterday", DateOrder::DayFirst), None);
        assert_eq!(parse_date("31/31/2024", DateOrder::DayFirst), None);
        assert_eq!(parse_date("30/02/2024", DateOrder::DayFirst), None);
        assert_eq!(parse_date("5 Foo 2024", DateOrder::DayFirst), None);
        assert_eq!(parse_date("01/02/24", DateOrder::DayFirst), None);
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn negative_spellings_agree() {
        let expected = Some(Money::from_cents(-4500));
        assert_eq!(parse_amount("(45.00)"), expected);
        assert_eq!(parse_amount("-45.00"), expected);
        assert_eq!(parse_amount("45.00 DR"), expected);
        assert_eq!(parse_amount("45.00dr"), expected);
    }

    #[test]
    fn positive_spellings_agree() {
        let expected = Some(Money::from_cents(4500));
        assert_eq!(parse_amount("45.00 CR"), expected);
        assert_eq!(parse_amount("45.00"), expected);
        assert_eq!(parse_amount("45"), expected);
    }

    #[test]
    fn currency_symbols_and_separators() {
        assert_eq!(parse_amount("£1,234.56"), Some(Money::from_cents(123456)));
        assert_eq!(parse_amount("$ 99.99"), Some(Money::from_cents(9999)));
        assert_eq!(parse_amount("€-12.50"), Some(Money::from_cents(-1250)));
        assert_eq!(parse_amount("(£1,000.00)"), Some(Money::from_cents(-100000)));
    }

    #[test]
    fn amounts_beyond_pence_range_are_none() {
        assert_eq!(parse_amount("79228162514264337593543950335"), None);
        assert_eq!(parse_amount("92233720368547758.08"), None);
        assert_eq!(
            parse_amount("92233720368547758.07"),
            Some(Money::from_cents(i64::MAX))
        );
    }

    #[test]
    fn blank_is_none() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("£"), None);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_amount("twenty"), None);
        assert_eq!(parse_amount("12.3.4"), None);
    }
}
