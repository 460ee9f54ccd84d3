//! Candidate slot generation within a day's working window.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::SchedulingConstraints;

/// Why a slot is not bookable.
///
/// The `Display` strings are the user-facing reasons surfaced through
/// conflict errors; a slot carries at most one reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    Overlap,
    DailyHourLimit,
    DailyLessonLimit,
    WeeklyHourLimit,
    WeeklyLessonLimit,
    InsufficientBuffer,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnavailableReason::Overlap => "conflicts with an existing booking",
            UnavailableReason::DailyHourLimit => "daily hour limit exceeded",
            UnavailableReason::DailyLessonLimit => "daily lesson limit exceeded",
            UnavailableReason::WeeklyHourLimit => "weekly hour limit exceeded",
            UnavailableReason::WeeklyLessonLimit => "weekly lesson limit exceeded",
            UnavailableReason::InsufficientBuffer => "insufficient buffer time between lessons",
        };
        write!(f, "{}", s)
    }
}

/// A candidate bookable time window of fixed duration.
///
/// Immutable once produced: re-annotation builds a new slot via
/// [`TimeSlot::blocked`] rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

impl TimeSlot {
    /// A fresh, available slot.
    pub fn open(start: DateTime<Utc>, duration_minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(duration_minutes),
            duration_minutes,
            available: true,
            reason: None,
        }
    }

    /// A copy of this slot marked unavailable with the given reason.
    pub fn blocked(&self, reason: UnavailableReason) -> Self {
        Self {
            start: self.start,
            end: self.end,
            duration_minutes: self.duration_minutes,
            available: false,
            reason: Some(reason),
        }
    }
}

/// Generates the raw, evenly spaced candidate slots for a day.
///
/// No conflict knowledge lives here; every emitted slot starts available.
pub struct SlotGenerator {
    buffer_minutes: i64,
}

impl SlotGenerator {
    pub fn new(constraints: &SchedulingConstraints) -> Self {
        Self {
            buffer_minutes: constraints.min_buffer_minutes.max(0),
        }
    }

    /// Emit candidate slots of `duration_minutes` within `window`.
    ///
    /// The cursor starts at the window open and advances by
    /// `duration + buffer`; a slot is emitted while it still ends at or
    /// before the window close. A disabled day (`window == None`) or a
    /// duration that exceeds the whole window yields an empty sequence,
    /// not an error.
    pub fn generate(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        window: Option<(NaiveTime, NaiveTime)>,
    ) -> Vec<TimeSlot> {
        if duration_minutes <= 0 {
            return Vec::new();
        }
        let Some((open, close)) = window else {
            return Vec::new();
        };

        let day_start = date.and_time(open).and_utc();
        let day_end = date.and_time(close).and_utc();
        let duration = Duration::minutes(duration_minutes);
        let step = Duration::minutes(duration_minutes + self.buffer_minutes);

        let mut slots = Vec::new();
        let mut cursor = day_start;
        while cursor + duration <= day_end {
            slots.push(TimeSlot::open(cursor, duration_minutes));
            cursor += step;
        }
        slots
    }
}
