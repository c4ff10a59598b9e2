//! Free-text salary parsing and annualization.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use rja_core::{NormalizedSalary, PayPeriod};

pub const HOURS_PER_YEAR: f64 = 2080.0;
pub const MONTHS_PER_YEAR: f64 = 12.0;
pub const DAYS_PER_YEAR: f64 = 260.0;

/// Figures below this are noise (step numbers, hours, bullet indices).
const NOISE_FLOOR: f64 = 7.0;

/// Once more than two figures survive the noise floor, figures under this are
/// assumed to be metadata rather than pay.
const MULTI_VALUE_FLOOR: f64 = 10.0;

static NEGOTIABLE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bDOE\b",
        r"(?i)\bDOQ\b",
        r"(?i)\bD\.O\.E\b",
        r"(?i)\bD\.O\.Q\b",
        r"(?i)depends?\s+on\s+(experience|qualifications)",
        r"(?i)commensurate\s+with\s+experience",
        r"(?i)negotiable",
        r"(?i)competitive",
    ])
    .expect("negotiable patterns are valid")
});

/// Checked in order; the first family with any hit decides the period.
static PERIOD_CUES: LazyLock<Vec<(PayPeriod, RegexSet)>> = LazyLock::new(|| {
    let cues: [(PayPeriod, &[&str]); 4] = [
        (
            PayPeriod::Hourly,
            &[
                r"/\s*hr\b",
                r"/\s*hour",
                r"per\s+hour",
                r"hourly",
                r"/\s*h\b",
                r"an\s+hour",
            ],
        ),
        (
            PayPeriod::Monthly,
            &[r"/\s*mo\b", r"/\s*month", r"per\s+month", r"monthly", r"/\s*mon\b"],
        ),
        (
            PayPeriod::Annual,
            &[
                r"/\s*yr\b",
                r"/\s*year",
                r"per\s+year",
                r"annually",
                r"annual",
                r"/\s*annum",
                r"p\.a\.",
            ],
        ),
        (PayPeriod::Daily, &[r"/\s*day", r"per\s+day", r"daily", r"/\s*diem"]),
    ];
    cues.into_iter()
        .map(|(period, patterns)| {
            let set = RegexSet::new(patterns.iter().map(|p| format!("(?i){p}")))
                .expect("pay period patterns are valid");
            (period, set)
        })
        .collect()
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern is valid"));

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:,\d{3})*(?:\.\d+)?)\s*(?:-|to|through)\s*(\d+(?:,\d{3})*(?:\.\d+)?)")
        .expect("range pattern is valid")
});

/// Parse salary text into annual min/max plus the period it was quoted in.
///
/// Negotiable/DOE text and text without a usable figure both yield
/// [`NormalizedSalary::none`]; the caller keeps the original text to tell them apart.
pub fn parse_salary(text: Option<&str>) -> NormalizedSalary {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return NormalizedSalary::none();
    };
    let lower = text.to_lowercase();

    if NEGOTIABLE.is_match(&lower) {
        return NormalizedSalary::none();
    }

    let period = detect_pay_period(&lower);
    let Some((min_val, max_val)) = extract_values(&lower) else {
        return NormalizedSalary::none();
    };

    let (pay_period, factor) = match period {
        Some(PayPeriod::Hourly) => (PayPeriod::Hourly, HOURS_PER_YEAR),
        Some(PayPeriod::Monthly) => (PayPeriod::Monthly, MONTHS_PER_YEAR),
        Some(PayPeriod::Daily) => (PayPeriod::Daily, DAYS_PER_YEAR),
        // Unit-less figures are assumed to be annual.
        _ => (PayPeriod::Annual, 1.0),
    };

    let min_annual = annualize(min_val, factor);
    let max_annual = max_val.map(|v| annualize(v, factor)).unwrap_or(min_annual);

    NormalizedSalary {
        min_annual: Some(min_annual),
        max_annual: Some(max_annual),
        pay_period,
    }
}

pub fn detect_pay_period(text: &str) -> Option<PayPeriod> {
    PERIOD_CUES
        .iter()
        .find(|(_, set)| set.is_match(text))
        .map(|(period, _)| *period)
}

/// Convert a figure quoted per `period` into an annual amount.
pub fn normalize_to_annual(value: f64, period: PayPeriod) -> i64 {
    let factor = match period {
        PayPeriod::Hourly => HOURS_PER_YEAR,
        PayPeriod::Monthly => MONTHS_PER_YEAR,
        PayPeriod::Daily => DAYS_PER_YEAR,
        PayPeriod::Annual | PayPeriod::Unknown => 1.0,
    };
    annualize(value, factor)
}

fn annualize(value: f64, factor: f64) -> i64 {
    (value * factor) as i64
}

fn extract_values(text: &str) -> Option<(f64, Option<f64>)> {
    let clean = text.replace(['$', ','], "");

    let values: Vec<f64> = NUMBER
        .find_iter(&clean)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| *v >= NOISE_FLOOR)
        .collect();
    if values.is_empty() {
        return None;
    }

    if let Some(caps) = RANGE.captures(&clean) {
        let low = caps[1].replace(',', "").parse::<f64>().ok();
        let high = caps[2].replace(',', "").parse::<f64>().ok();
        if let (Some(low), Some(high)) = (low, high) {
            return Some((low, Some(high)));
        }
    }

    match values.as_slice() {
        [single] => Some((*single, None)),
        [a, b] => Some((a.min(*b), Some(a.max(*b)))),
        _ => {
            let pay: Vec<f64> = values
                .iter()
                .copied()
                .filter(|v| *v >= MULTI_VALUE_FLOOR)
                .collect();
            match pay.as_slice() {
                [] => Some((values[0], None)),
                [single] => Some((*single, None)),
                _ => {
                    let min = pay.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = pay.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    Some((min, Some(max)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> (Option<i64>, Option<i64>, PayPeriod) {
        let s = parse_salary(Some(text));
        (s.min_annual, s.max_annual, s.pay_period)
    }

    #[test]
    fn hourly_range_is_annualized() {
        assert_eq!(
            parsed("$20.00 - $25.00/hr"),
            (Some(41_600), Some(52_000), PayPeriod::Hourly)
        );
    }

    #[test]
    fn single_unitless_value_is_annual() {
        assert_eq!(parsed("$55,000"), (Some(55_000), Some(55_000), PayPeriod::Annual));
    }

    #[test]
    fn negotiable_text_yields_nulls() {
        assert_eq!(parsed("DOE"), (None, None, PayPeriod::Unknown));
        assert_eq!(parsed("Salary is negotiable"), (None, None, PayPeriod::Unknown));
        assert_eq!(parsed("Commensurate with experience"), (None, None, PayPeriod::Unknown));
        assert_eq!(parse_salary(None), NormalizedSalary::none());
        assert_eq!(parse_salary(Some("   ")), NormalizedSalary::none());
    }

    #[test]
    fn monthly_and_daily_cues_use_fixed_constants() {
        assert_eq!(
            parsed("$4,000 - $5,000 per month"),
            (Some(48_000), Some(60_000), PayPeriod::Monthly)
        );
        assert_eq!(parsed("$150/day"), (Some(39_000), Some(39_000), PayPeriod::Daily));
        assert_eq!(parsed("$18 an hour"), (Some(37_440), Some(37_440), PayPeriod::Hourly));
    }

    #[test]
    fn range_words_are_recognized() {
        assert_eq!(
            parsed("$45,000 to $60,000 annually"),
            (Some(45_000), Some(60_000), PayPeriod::Annual)
        );
    }

    #[test]
    fn sub_threshold_noise_is_dropped() {
        assert_eq!(parsed("Step 1 of 5"), (None, None, PayPeriod::Unknown));
    }

    #[test]
    fn several_values_take_the_extremes_above_metadata_floor() {
        assert_eq!(
            parsed("Steps: $21.50, 8 hrs, $23.75, $26.10 hourly"),
            (Some(44_720), Some(54_288), PayPeriod::Hourly)
        );
    }

    #[test]
    fn normalize_to_annual_matches_period_constants() {
        assert_eq!(normalize_to_annual(30.0, PayPeriod::Hourly), 62_400);
        assert_eq!(normalize_to_annual(5_000.0, PayPeriod::Monthly), 60_000);
        assert_eq!(normalize_to_annual(70_000.0, PayPeriod::Unknown), 70_000);
    }
}
