//! Human-readable check-in intervals ("2 days", "1 week").
//!
//! Parsing is lenient: anything that does not match yields `0`, which
//! callers treat as "never overdue by duration". Months are 30 days and years 365 days;
//! there is no calendar-aware arithmetic.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const SECOND_MS: u64 = 1_000;
pub const MINUTE_MS: u64 = 60 * SECOND_MS;
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
pub const DAY_MS: u64 = 24 * HOUR_MS;
pub const WEEK_MS: u64 = 7 * DAY_MS;
pub const MONTH_MS: u64 = 30 * DAY_MS;
pub const YEAR_MS: u64 = 365 * DAY_MS;

static INTERVAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(second|minute|hour|day|week|month|year)s?\s*$")
        .expect("valid interval regex")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    pub const ALL: [IntervalUnit; 7] = [
        IntervalUnit::Second,
        IntervalUnit::Minute,
        IntervalUnit::Hour,
        IntervalUnit::Day,
        IntervalUnit::Week,
        IntervalUnit::Month,
        IntervalUnit::Year,
    ];

    pub fn millis(self) -> u64 {
        match self {
            IntervalUnit::Second => SECOND_MS,
            IntervalUnit::Minute => MINUTE_MS,
            IntervalUnit::Hour => HOUR_MS,
            IntervalUnit::Day => DAY_MS,
            IntervalUnit::Week => WEEK_MS,
            IntervalUnit::Month => MONTH_MS,
            IntervalUnit::Year => YEAR_MS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
            IntervalUnit::Week => "week",
            IntervalUnit::Month => "month",
            IntervalUnit::Year => "year",
        }
    }

    fn from_lowercase(s: &str) -> Option<Self> {
        IntervalUnit::ALL.into_iter().find(|u| u.as_str() == s)
    }
}

/// A parsed `<count> <unit>` interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    pub count: u64,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn new(count: u64, unit: IntervalUnit) -> Self {
        Self { count, unit }
    }

    /// Length in milliseconds, saturating instead of overflowing.
    pub fn as_millis(&self) -> u64 {
        self.count.saturating_mul(self.unit.millis())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.count == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.count, self.unit.as_str(), plural)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an interval like \"1 day\" or \"2 weeks\"")]
pub struct InvalidInterval(pub String);

impl FromStr for Interval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = INTERVAL_RE
            .captures(s)
            .ok_or_else(|| InvalidInterval(s.to_string()))?;
        // The digit group can exceed u64; treat that as saturated rather than invalid.
        let count = caps[1].parse::<u64>().unwrap_or(u64::MAX);
        let unit = IntervalUnit::from_lowercase(&caps[2].to_ascii_lowercase())
            .ok_or_else(|| InvalidInterval(s.to_string()))?;
        Ok(Interval { count, unit })
    }
}

/// Convert an interval string to milliseconds. Unmatched input yields `0`.
pub fn parse_interval_ms(input: &str) -> u64 {
    input
        .parse::<Interval>()
        .map(|i| i.as_millis())
        .unwrap_or(0)
}

/// Render a span in its largest whole unit, e.g. `"3 hours"` or `"2 days"`.
///
/// Months and years are not used for display; weeks are the coarsest unit.
pub fn format_duration_ms(ms: u64) -> String {
    const DISPLAY_UNITS: [IntervalUnit; 5] = [
        IntervalUnit::Week,
        IntervalUnit::Day,
        IntervalUnit::Hour,
        IntervalUnit::Minute,
        IntervalUnit::Second,
    ];
    for unit in DISPLAY_UNITS {
        let count = ms / unit.millis();
        if count >= 1 {
            return Interval::new(count, unit).to_string();
        }
    }
    "0 seconds".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_interval_ms("30 seconds"), 30 * SECOND_MS);
        assert_eq!(parse_interval_ms("15 minutes"), 15 * MINUTE_MS);
        assert_eq!(parse_interval_ms("12 hours"), 12 * HOUR_MS);
        assert_eq!(parse_interval_ms("1 day"), DAY_MS);
        assert_eq!(parse_interval_ms("2 weeks"), 2 * WEEK_MS);
        assert_eq!(parse_interval_ms("1 month"), 30 * DAY_MS);
        assert_eq!(parse_interval_ms("1 year"), 365 * DAY_MS);
    }

    #[test]
    fn is_case_insensitive_and_plural_optional() {
        assert_eq!(parse_interval_ms("2 DAYS"), 2 * DAY_MS);
        assert_eq!(parse_interval_ms("2 day"), 2 * DAY_MS);
        assert_eq!(parse_interval_ms("1 Hours"), HOUR_MS);
        assert_eq!(parse_interval_ms(" 3 weeks "), 3 * WEEK_MS);
    }

    #[test]
    fn unmatched_input_is_zero() {
        assert_eq!(parse_interval_ms(""), 0);
        assert_eq!(parse_interval_ms("daily"), 0);
        assert_eq!(parse_interval_ms("-1 day"), 0);
        assert_eq!(parse_interval_ms("1.5 days"), 0);
        assert_eq!(parse_interval_ms("1 fortnight"), 0);
        assert_eq!(parse_interval_ms("1 day and 2 hours"), 0);
    }

    #[test]
    fn huge_counts_saturate() {
        assert_eq!(parse_interval_ms("99999999999999999999999 years"), u64::MAX);
    }

    #[test]
    fn re_expressing_in_the_same_unit_round_trips() {
        for unit in IntervalUnit::ALL {
            for count in [1u64, 2, 7, 30] {
                let text = Interval::new(count, unit).to_string();
                let ms = parse_interval_ms(&text);
                assert_eq!(ms / unit.millis(), count, "{text}");
                assert_eq!(ms % unit.millis(), 0, "{text}");
            }
        }
    }

    #[test]
    fn typed_parse_reports_invalid_input() {
        let err = "soon".parse::<Interval>().unwrap_err();
        assert_eq!(err, InvalidInterval("soon".into()));
        let ok: Interval = "4 Hours".parse().unwrap();
        assert_eq!(ok, Interval::new(4, IntervalUnit::Hour));
        assert_eq!(ok.to_string(), "4 hours");
    }

    #[test]
    fn formats_largest_whole_unit() {
        assert_eq!(format_duration_ms(3 * HOUR_MS + 20 * MINUTE_MS), "3 hours");
        assert_eq!(format_duration_ms(2 * DAY_MS), "2 days");
        assert_eq!(format_duration_ms(DAY_MS), "1 day");
        assert_eq!(format_duration_ms(15 * DAY_MS), "2 weeks");
        assert_eq!(format_duration_ms(59 * SECOND_MS), "59 seconds");
        assert_eq!(format_duration_ms(10), "0 seconds");
    }
}
