//! Day and week availability aggregation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::Booking;
use crate::constraints::ConstraintSnapshot;
use crate::remote::CalendarEvent;

use super::conflicts::{week_start, ConflictResolver};
use super::slots::{SlotGenerator, TimeSlot};

/// Which configured limits shaped a day's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintFlags {
    /// The user's daily hour or lesson ceiling blocked further slots.
    pub daily_limit_reached: bool,
    /// The user's weekly hour or lesson ceiling blocked further slots.
    pub weekly_limit_reached: bool,
    /// The day has no operating window at all (disabled or vacation).
    pub outside_operating_hours: bool,
}

/// Computed availability for one day.
///
/// Derived data, recomputed fresh on every call and never patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    /// All candidate slots in start order, annotated with reasons.
    pub slots: Vec<TimeSlot>,
    pub total_available_slots: usize,
    pub total_available_hours: f64,
    pub flags: ConstraintFlags,
}

impl DayAvailability {
    /// Only the bookable slots.
    pub fn available_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|s| s.available)
    }
}

/// Computed availability for a Monday-aligned week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekAvailability {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: Vec<DayAvailability>,
    pub total_weekly_hours: f64,
    pub remaining_weekly_hours: f64,
    pub remaining_weekly_lessons: u32,
}

/// Orchestrates slot generation and conflict filtering over days and weeks.
///
/// The calculator is pure: it works on a constraint snapshot and the
/// bookings/events handed to it, so a concurrent configuration reload or
/// calendar sync cannot change the rules mid-computation.
pub struct AvailabilityCalculator {
    snapshot: ConstraintSnapshot,
    generator: SlotGenerator,
    resolver: ConflictResolver,
}

impl AvailabilityCalculator {
    pub fn new(snapshot: ConstraintSnapshot) -> Self {
        let generator = SlotGenerator::new(&snapshot.constraints);
        let resolver = ConflictResolver::new(snapshot.constraints.clone());
        Self {
            snapshot,
            generator,
            resolver,
        }
    }

    pub fn snapshot(&self) -> &ConstraintSnapshot {
        &self.snapshot
    }

    /// Compute a day's availability.
    ///
    /// Every confirmed booking and blocking event removes its slots for
    /// everyone. When `user_id` is given, that user's caps and the buffer
    /// rules are additionally applied; `bookings` must then cover the whole
    /// Monday-aligned week containing `date` so the weekly arithmetic sees
    /// the full picture.
    pub fn day_availability(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
        bookings: &[Booking],
        events: &[CalendarEvent],
    ) -> DayAvailability {
        let window = self.snapshot.window_for(date);
        let outside_operating_hours = window.is_none();

        let slots = self.generator.generate(date, duration_minutes, window);
        let busy = ConflictResolver::busy_intervals(bookings, events);
        let mut slots = self.resolver.mark_overlaps(slots, &busy);

        let mut flags = ConstraintFlags {
            outside_operating_hours,
            ..Default::default()
        };

        if let Some(user) = user_id {
            let user_bookings: Vec<Booking> = bookings
                .iter()
                .filter(|b| b.user_id == user)
                .cloned()
                .collect();

            if let Some(reason) =
                self.resolver
                    .cap_violation(date, duration_minutes, &user_bookings)
            {
                use super::slots::UnavailableReason::*;
                match reason {
                    DailyHourLimit | DailyLessonLimit => flags.daily_limit_reached = true,
                    WeeklyHourLimit | WeeklyLessonLimit => flags.weekly_limit_reached = true,
                    _ => {}
                }
                slots = self
                    .resolver
                    .apply_user_caps(slots, date, duration_minutes, &user_bookings);
            }
        }

        let slots = self.resolver.mark_buffer_adjacency(slots, &busy);

        let total_available_slots = slots.iter().filter(|s| s.available).count();
        let total_available_hours =
            total_available_slots as f64 * duration_minutes as f64 / 60.0;

        DayAvailability {
            date,
            slots,
            total_available_slots,
            total_available_hours,
            flags,
        }
    }

    /// Compute a week's availability, aligned to the Monday of the week
    /// containing `week_start`.
    pub fn week_availability(
        &self,
        week_start_date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
        bookings: &[Booking],
        events: &[CalendarEvent],
    ) -> WeekAvailability {
        let monday = week_start(week_start_date);

        let days: Vec<DayAvailability> = (0..7)
            .map(|offset| {
                self.day_availability(
                    monday + Duration::days(offset),
                    duration_minutes,
                    user_id,
                    bookings,
                    events,
                )
            })
            .collect();

        let total_weekly_hours = days.iter().map(|d| d.total_available_hours).sum();

        let constraints = &self.snapshot.constraints;
        let (remaining_weekly_hours, remaining_weekly_lessons) = match user_id {
            Some(user) => {
                let user_bookings: Vec<Booking> = bookings
                    .iter()
                    .filter(|b| b.user_id == user)
                    .cloned()
                    .collect();
                let window_start = monday.and_hms_opt(0, 0, 0).unwrap().and_utc();
                let (hours, lessons) = ConflictResolver::consumed(
                    &user_bookings,
                    window_start,
                    window_start + Duration::days(7),
                );
                (
                    (constraints.max_hours_per_week - hours).max(0.0),
                    constraints.max_lessons_per_week.saturating_sub(lessons),
                )
            }
            None => (
                constraints.max_hours_per_week,
                constraints.max_lessons_per_week,
            ),
        };

        WeekAvailability {
            week_start: monday,
            week_end: monday + Duration::days(7),
            days,
            total_weekly_hours,
            remaining_weekly_hours,
            remaining_weekly_lessons,
        }
    }

    /// The first available slot in a day starting at or after `not_before`.
    pub fn first_open_slot(
        day: &DayAvailability,
        not_before: DateTime<Utc>,
    ) -> Option<TimeSlot> {
        day.slots
            .iter()
            .find(|s| s.available && s.start >= not_before)
            .cloned()
    }
}
