//! Overdue evaluation.
//!
//! There is exactly one definition of "overdue": an event is overdue once the time
//! since its last check-in reaches `missed_checkin_threshold * check_in_frequency`.
//! The older single-interval rule is the `threshold = 1` case of the same formula.

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::entity::event;
use crate::interval::{format_duration_ms, parse_interval_ms};

/// Coarse colour bucket for dashboards, from `elapsed / alert_window`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Good,
    Caution,
    Warning,
    Urgent,
    Critical,
}

impl Urgency {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.35 {
            Urgency::Good
        } else if ratio < 0.65 {
            Urgency::Caution
        } else if ratio < 0.85 {
            Urgency::Warning
        } else if ratio < 1.0 {
            Urgency::Urgent
        } else {
            Urgency::Critical
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OverduePolicy {
    pub frequency_ms: u64,
    pub threshold: u32,
}

impl OverduePolicy {
    /// A missing or non-positive threshold means a single missed interval.
    pub fn new(frequency_ms: u64, threshold: Option<i32>) -> Self {
        let threshold = threshold
            .and_then(|t| u32::try_from(t).ok())
            .filter(|t| *t >= 1)
            .unwrap_or(1);
        Self {
            frequency_ms,
            threshold,
        }
    }

    pub fn from_frequency(check_in_frequency: &str, threshold: Option<i32>) -> Self {
        Self::new(parse_interval_ms(check_in_frequency), threshold)
    }

    pub fn for_event(event: &event::Model) -> Self {
        Self::from_frequency(
            &event.check_in_frequency,
            Some(event.missed_checkin_threshold),
        )
    }

    pub fn alert_window_ms(&self) -> u64 {
        self.frequency_ms.saturating_mul(u64::from(self.threshold))
    }

    pub fn evaluate(&self, last_check_in: OffsetDateTime, now: OffsetDateTime) -> Evaluation {
        let elapsed_ms = clamp_i64((now - last_check_in).whole_milliseconds());
        let alert_window_ms = self.alert_window_ms();
        let time_left_ms = clamp_i64(i128::from(alert_window_ms) - i128::from(elapsed_ms));

        let (overdue, ratio) = if alert_window_ms == 0 {
            // Unparseable frequency: never overdue by duration.
            (false, 0.0)
        } else {
            let ratio = elapsed_ms.max(0) as f64 / alert_window_ms as f64;
            (time_left_ms <= 0, ratio)
        };

        Evaluation {
            overdue,
            elapsed_ms,
            alert_window_ms,
            time_left_ms,
            ratio,
            urgency: if alert_window_ms == 0 {
                Urgency::Good
            } else {
                Urgency::from_ratio(ratio)
            },
        }
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Evaluation {
    pub overdue: bool,
    /// Milliseconds since the last check-in (negative if the check-in is in the future)
    pub elapsed_ms: i64,
    /// `threshold * frequency`; zero when the frequency could not be parsed
    pub alert_window_ms: u64,
    /// Positive while time remains, zero or negative once overdue
    pub time_left_ms: i64,
    /// `elapsed / alert_window`, zero when there is no window
    pub ratio: f64,
    pub urgency: Urgency,
}

impl Evaluation {
    /// Human-readable remaining time, e.g. "3 hours left" or "2 days overdue".
    pub fn display(&self) -> String {
        if self.alert_window_ms == 0 {
            return "no deadline".to_string();
        }
        if self.time_left_ms > 0 {
            format!("{} left", format_duration_ms(self.time_left_ms as u64))
        } else {
            format!(
                "{} overdue",
                format_duration_ms(self.time_left_ms.unsigned_abs())
            )
        }
    }

    /// Not yet overdue but far enough into the window to warn the owner.
    pub fn in_reminder_window(&self, lead_ratio: f64) -> bool {
        !self.overdue && self.alert_window_ms > 0 && self.ratio >= lead_ratio
    }
}
