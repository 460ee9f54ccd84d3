//! Conflict filtering: busy-time overlap, per-user caps, buffer adjacency.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::booking::{Booking, BookingStatus};
use crate::constraints::SchedulingConstraints;
use crate::remote::CalendarEvent;

use super::slots::{TimeSlot, UnavailableReason};

/// A busy time interval, whatever its origin (local booking or synced
/// calendar event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    fn valid(&self) -> bool {
        self.start < self.end
    }
}

/// The Monday of the week containing `date`.
pub(crate) fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Annotates candidate slots against busy time and per-user limits.
///
/// Checks are applied in a fixed order (hard overlap, daily caps, weekly
/// caps, buffer adjacency) and the first failing check's reason sticks; a
/// slot never carries two reasons.
pub struct ConflictResolver {
    constraints: SchedulingConstraints,
}

impl ConflictResolver {
    pub fn new(constraints: SchedulingConstraints) -> Self {
        Self { constraints }
    }

    /// Collect busy intervals from confirmed bookings and blocking events.
    ///
    /// Degenerate intervals (end not after start) are skipped rather than
    /// rejected: third-party data is sometimes malformed, and a broken
    /// event must not take down the whole computation.
    pub fn busy_intervals(bookings: &[Booking], events: &[CalendarEvent]) -> Vec<BusyInterval> {
        let mut busy: Vec<BusyInterval> = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed)
            .map(|b| BusyInterval {
                start: b.start,
                end: b.end,
            })
            .chain(events.iter().filter(|e| e.is_blocking()).map(|e| BusyInterval {
                start: e.start,
                end: e.end,
            }))
            .filter(BusyInterval::valid)
            .collect();
        busy.sort_by_key(|b| b.start);
        busy
    }

    /// Mark slots that overlap busy time outright.
    pub fn mark_overlaps(&self, slots: Vec<TimeSlot>, busy: &[BusyInterval]) -> Vec<TimeSlot> {
        slots
            .into_iter()
            .map(|slot| {
                if slot.available
                    && busy
                        .iter()
                        .any(|b| slot.start < b.end && slot.end > b.start)
                {
                    slot.blocked(UnavailableReason::Overlap)
                } else {
                    slot
                }
            })
            .collect()
    }

    /// Mark slots that land closer than the buffer to a busy boundary.
    ///
    /// A gap of exactly the buffer is allowed; anything shorter, on either
    /// side, is not. This runs after the overlap check so the two cases get
    /// distinct reasons.
    pub fn mark_buffer_adjacency(
        &self,
        slots: Vec<TimeSlot>,
        busy: &[BusyInterval],
    ) -> Vec<TimeSlot> {
        let buffer = Duration::minutes(self.constraints.min_buffer_minutes.max(0));
        if buffer.is_zero() {
            return slots;
        }

        slots
            .into_iter()
            .map(|slot| {
                if slot.available && busy.iter().any(|b| too_close(&slot, b, buffer)) {
                    slot.blocked(UnavailableReason::InsufficientBuffer)
                } else {
                    slot
                }
            })
            .collect()
    }

    /// Apply a user's daily and weekly ceilings to the remaining slots.
    ///
    /// `user_bookings` must cover the whole Monday-aligned week containing
    /// `date`; daily and weekly consumption are both derived from it. The
    /// requested duration counts against the hour caps, so a user at
    /// exactly the ceiling gets no further slots.
    pub fn apply_user_caps(
        &self,
        slots: Vec<TimeSlot>,
        date: NaiveDate,
        duration_minutes: i64,
        user_bookings: &[Booking],
    ) -> Vec<TimeSlot> {
        let reason = self.cap_violation(date, duration_minutes, user_bookings);
        let Some(reason) = reason else {
            return slots;
        };

        slots
            .into_iter()
            .map(|slot| {
                if slot.available {
                    slot.blocked(reason)
                } else {
                    slot
                }
            })
            .collect()
    }

    /// The first cap a request of `duration_minutes` on `date` would break,
    /// if any. Order: daily hours, daily lessons, weekly hours, weekly
    /// lessons.
    pub fn cap_violation(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_bookings: &[Booking],
    ) -> Option<UnavailableReason> {
        let requested_hours = duration_minutes as f64 / 60.0;

        let day_start = date.and_hms_opt(0, 0, 0)?.and_utc();
        let (daily_hours, daily_count) =
            consumption(user_bookings, day_start, day_start + Duration::days(1));
        if daily_hours + requested_hours > self.constraints.max_hours_per_day {
            return Some(UnavailableReason::DailyHourLimit);
        }
        if daily_count >= self.constraints.max_lessons_per_day {
            return Some(UnavailableReason::DailyLessonLimit);
        }

        let monday = week_start(date).and_hms_opt(0, 0, 0)?.and_utc();
        let (weekly_hours, weekly_count) =
            consumption(user_bookings, monday, monday + Duration::days(7));
        if weekly_hours + requested_hours > self.constraints.max_hours_per_week {
            return Some(UnavailableReason::WeeklyHourLimit);
        }
        if weekly_count >= self.constraints.max_lessons_per_week {
            return Some(UnavailableReason::WeeklyLessonLimit);
        }

        None
    }

    /// Confirmed hours and lesson count a user holds inside a window.
    pub fn consumed(
        user_bookings: &[Booking],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> (f64, u32) {
        consumption(user_bookings, window_start, window_end)
    }
}

fn too_close(slot: &TimeSlot, busy: &BusyInterval, buffer: Duration) -> bool {
    // Busy block ends before the slot starts: gap in front of the slot.
    if busy.end <= slot.start {
        return slot.start - busy.end < buffer;
    }
    // Busy block starts after the slot ends: gap behind the slot.
    if busy.start >= slot.end {
        return busy.start - slot.end < buffer;
    }
    // Overlapping intervals are the overlap check's business.
    false
}

fn consumption(
    bookings: &[Booking],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> (f64, u32) {
    let mut minutes = 0i64;
    let mut count = 0u32;
    for booking in bookings {
        if booking.status != BookingStatus::Confirmed {
            continue;
        }
        if booking.start >= window_start && booking.start < window_end {
            minutes += booking.duration_minutes();
            count += 1;
        }
    }
    (minutes as f64 / 60.0, count)
}
