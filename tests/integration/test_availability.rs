//! Availability read paths: slot grids, caching, forward search.

use std::sync::Arc;

use chrono::{Duration, Timelike, Utc};

use rota::{Config, ConstraintUpdate, Scheduler, UnavailableReason};

use super::support::{at, future_monday, scheduler_with_calendar, FakeCalendar};

#[tokio::test]
async fn test_default_day_grid() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();

    // 09:00-17:00 with a 15-minute buffer: 09:00, 10:15, ..., 15:15.
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0].start, at(monday, 9, 0));
    assert_eq!(slots.last().unwrap().start, at(monday, 15, 15));
    assert!(slots.iter().all(|s| (s.end - s.start).num_minutes() == 60));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_weekend_and_vacation_days_are_empty() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();
    let saturday = monday + Duration::days(5);

    let slots = scheduler.get_available_slots(saturday, 60, None).await.unwrap();
    assert!(slots.is_empty());

    scheduler.add_vacation(monday).await.unwrap();
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(slots.is_empty());

    let day = scheduler.get_day_availability(monday, 60, None).await.unwrap();
    assert!(day.flags.outside_operating_hours);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_external_event_blocks_and_buffers() {
    let calendar = Arc::new(FakeCalendar::new());
    let monday = future_monday();
    calendar.add_busy(at(monday, 10, 0), 60).await;

    let scheduler = scheduler_with_calendar(calendar);
    let day = scheduler.get_day_availability(monday, 60, None).await.unwrap();

    for slot in &day.slots {
        match (slot.start.hour(), slot.start.minute()) {
            // Ends at the event start with zero gap.
            (9, 0) => assert_eq!(slot.reason, Some(UnavailableReason::InsufficientBuffer)),
            // Overlaps the event outright.
            (10, 15) => assert_eq!(slot.reason, Some(UnavailableReason::Overlap)),
            _ => assert!(slot.available),
        }
    }

    // No available slot intersects the buffered window around the event.
    let buffer = Duration::minutes(15);
    let event_start = at(monday, 10, 0);
    let event_end = at(monday, 11, 0);
    for slot in day.slots.iter().filter(|s| s.available) {
        assert!(!(slot.start < event_end + buffer && slot.end > event_start - buffer));
    }
    scheduler.shutdown();
}

#[tokio::test]
async fn test_identical_reads_are_idempotent_and_cached() {
    let calendar = Arc::new(FakeCalendar::new());
    let monday = future_monday();
    calendar.add_busy(at(monday, 11, 30), 60).await;

    let scheduler = scheduler_with_calendar(calendar.clone());

    let first = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    let reads_after_first = calendar.read_calls.load(std::sync::atomic::Ordering::SeqCst);
    let second = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    let reads_after_second = calendar.read_calls.load(std::sync::atomic::Ordering::SeqCst);

    assert_eq!(first, second);
    // The second read came from cache without another provider call.
    assert_eq!(reads_after_first, reads_after_second);

    let stats = scheduler.cache_stats().await;
    assert_eq!(stats.day.hits, 1);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_duration_scopes_the_cache_key() {
    let calendar = Arc::new(FakeCalendar::new());
    let scheduler = scheduler_with_calendar(calendar.clone());
    let monday = future_monday();

    scheduler.get_available_slots(monday, 60, None).await.unwrap();
    scheduler.get_available_slots(monday, 30, None).await.unwrap();

    // Different duration, different entry: both were provider misses.
    let stats = scheduler.cache_stats().await;
    assert_eq!(stats.day.misses, 2);
    assert_eq!(stats.day.entries, 2);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_week_availability_aggregates_and_aligns() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();
    let thursday = monday + Duration::days(3);

    let week = scheduler.get_week_availability(thursday, 60, None).await.unwrap();

    assert_eq!(week.week_start, monday);
    assert_eq!(week.days.len(), 7);
    // Five open weekdays, six hour-long slots each.
    assert!((week.total_weekly_hours - 30.0).abs() < f64::EPSILON);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_find_next_skips_full_and_closed_days() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();
    let tuesday = monday + Duration::days(1);

    // Day 1 is closed entirely.
    scheduler.add_vacation(monday).await.unwrap();

    let from = at(monday, 0, 0);
    let slot = scheduler
        .find_next_available_slot(from, 60, None)
        .await
        .unwrap()
        .expect("day 2 should have an opening");

    assert_eq!(slot.start, at(tuesday, 9, 0));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_find_next_respects_start_bound_within_day() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let from = at(monday, 12, 0);
    let slot = scheduler
        .find_next_available_slot(from, 60, None)
        .await
        .unwrap()
        .unwrap();

    // First grid slot at or after noon.
    assert_eq!(slot.start, at(monday, 12, 45));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_constraint_update_reshapes_slots_and_drops_cache() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let before = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert_eq!(before.len(), 6);

    scheduler
        .update_constraints(ConstraintUpdate {
            min_buffer_minutes: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();

    // Back-to-back slots now fit; a stale cache would still say 6.
    let after = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert_eq!(after.len(), 8);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_validation_rejects_bad_durations() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    assert!(scheduler.get_available_slots(monday, 0, None).await.is_err());
    assert!(scheduler.get_available_slots(monday, -15, None).await.is_err());
    assert!(scheduler
        .find_next_available_slot(Utc::now(), 0, None)
        .await
        .is_err());
    scheduler.shutdown();
}
