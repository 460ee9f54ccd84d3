//! Constraint types for scheduling limits and working hours.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Per-operation scheduling limits.
///
/// Loaded once per calculator instance and snapshot-copied to callers; a
/// copy already handed out is never mutated by a later update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConstraints {
    /// Maximum booked hours per user per day.
    pub max_hours_per_day: f64,
    /// Maximum lessons per user per day.
    pub max_lessons_per_day: u32,
    /// Maximum booked hours per user per Monday-aligned week.
    pub max_hours_per_week: f64,
    /// Maximum lessons per user per Monday-aligned week.
    pub max_lessons_per_week: u32,
    /// Earliest slot start, "HH:MM" 24-hour zero-padded.
    pub earliest_start_time: String,
    /// Latest slot end, "HH:MM" 24-hour zero-padded.
    pub latest_end_time: String,
    /// Minimum idle minutes required between two lessons.
    pub min_buffer_minutes: i64,
}

impl Default for SchedulingConstraints {
    fn default() -> Self {
        Self {
            max_hours_per_day: 6.0,
            max_lessons_per_day: 6,
            max_hours_per_week: 25.0,
            max_lessons_per_week: 25,
            earliest_start_time: "09:00".to_string(),
            latest_end_time: "17:00".to_string(),
            min_buffer_minutes: 15,
        }
    }
}

impl SchedulingConstraints {
    /// The flat operating window, with malformed strings falling back to
    /// midnight (logged, never fatal).
    pub fn operating_window(&self) -> (NaiveTime, NaiveTime) {
        (
            parse_time_of_day(&self.earliest_start_time),
            parse_time_of_day(&self.latest_end_time),
        )
    }
}

/// Parse an "HH:MM" time-of-day string.
///
/// Bad configuration must never crash a booking flow: unparseable input
/// falls back to midnight and is logged as a data-quality warning.
pub fn parse_time_of_day(s: &str) -> NaiveTime {
    match NaiveTime::parse_from_str(s, "%H:%M") {
        Ok(t) => t,
        Err(_) => {
            tracing::warn!("Malformed time of day {:?}, falling back to 00:00", s);
            NaiveTime::MIN
        }
    }
}

fn validate_time_of_day(s: &str) -> Result<()> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map(|_| ())
        .map_err(|_| ValidationError::MalformedTime(s.to_string()).into())
}

/// Working hours for a single weekday.
///
/// When present for a day, this supersedes the flat operating-hours fields
/// of [`SchedulingConstraints`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    /// Day start, "HH:MM".
    pub start: String,
    /// Day end, "HH:MM".
    pub end: String,
    /// Whether the day is bookable at all.
    pub enabled: bool,
}

impl DayHours {
    /// A disabled day (weekend, closed).
    pub fn disabled() -> Self {
        Self {
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            enabled: false,
        }
    }
}

/// Per-weekday working-hours overrides, indexed Monday-first.
///
/// `None` for a day means no override: the flat operating window applies
/// and the day is bookable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklySchedule {
    /// Overrides for Monday..Sunday.
    pub days: [Option<DayHours>; 7],
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        let mut days: [Option<DayHours>; 7] = [None, None, None, None, None, None, None];
        // Weekends closed unless configured otherwise.
        days[5] = Some(DayHours::disabled());
        days[6] = Some(DayHours::disabled());
        Self { days }
    }
}

impl WeeklySchedule {
    /// The override for a weekday, if any.
    pub fn for_weekday(&self, weekday: Weekday) -> Option<&DayHours> {
        self.days[weekday.num_days_from_monday() as usize].as_ref()
    }

    /// Set the override for a weekday.
    pub fn set(&mut self, weekday: Weekday, hours: Option<DayHours>) {
        self.days[weekday.num_days_from_monday() as usize] = hours;
    }
}

/// Partial update for scheduling constraints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hours_per_day: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lessons_per_day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hours_per_week: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lessons_per_week: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_buffer_minutes: Option<i64>,
}

impl ConstraintUpdate {
    /// Validate the update in isolation and against the target it will be
    /// applied to. Updates are rejected up front; the lenient midnight
    /// fallback is reserved for already-persisted configuration.
    pub fn validate(&self, target: &SchedulingConstraints) -> Result<()> {
        if let Some(h) = self.max_hours_per_day {
            if h < 0.0 {
                return Err(ValidationError::InvalidDuration((h * 60.0) as i64).into());
            }
        }
        if let Some(h) = self.max_hours_per_week {
            if h < 0.0 {
                return Err(ValidationError::InvalidDuration((h * 60.0) as i64).into());
            }
        }
        if let Some(b) = self.min_buffer_minutes {
            if b < 0 {
                return Err(ValidationError::InvalidDuration(b).into());
            }
        }
        if let Some(ref s) = self.earliest_start_time {
            validate_time_of_day(s)?;
        }
        if let Some(ref s) = self.latest_end_time {
            validate_time_of_day(s)?;
        }

        let start = self
            .earliest_start_time
            .as_deref()
            .unwrap_or(&target.earliest_start_time);
        let end = self
            .latest_end_time
            .as_deref()
            .unwrap_or(&target.latest_end_time);
        if start >= end {
            return Err(ValidationError::InvalidTimeRange.into());
        }

        Ok(())
    }

    /// Apply this update to a constraints value.
    pub fn apply_to(&self, constraints: &mut SchedulingConstraints) {
        if let Some(v) = self.max_hours_per_day {
            constraints.max_hours_per_day = v;
        }
        if let Some(v) = self.max_lessons_per_day {
            constraints.max_lessons_per_day = v;
        }
        if let Some(v) = self.max_hours_per_week {
            constraints.max_hours_per_week = v;
        }
        if let Some(v) = self.max_lessons_per_week {
            constraints.max_lessons_per_week = v;
        }
        if let Some(ref v) = self.earliest_start_time {
            constraints.earliest_start_time = v.clone();
        }
        if let Some(ref v) = self.latest_end_time {
            constraints.latest_end_time = v.clone();
        }
        if let Some(v) = self.min_buffer_minutes {
            constraints.min_buffer_minutes = v;
        }
    }
}
