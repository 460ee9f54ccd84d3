//! Booking write paths: validation, conflicts, caps, mirroring, rollback.

use std::sync::Arc;

use chrono::{Duration, Utc};

use rota::{
    BookingRequest, Config, ConflictError, MemoryConstraintRepository, RotaError, Scheduler,
    SchedulingConstraints, UnavailableReason, WeeklySchedule,
};

use super::support::{at, future_monday, scheduler_with_calendar, FakeCalendar};

fn request(user: &str, start: chrono::DateTime<Utc>, minutes: i64) -> BookingRequest {
    BookingRequest {
        user_id: user.to_string(),
        start,
        duration_minutes: minutes,
        title: "Lesson".to_string(),
        description: None,
    }
}

#[tokio::test]
async fn test_booked_slot_disappears_for_everyone() {
    let calendar = Arc::new(FakeCalendar::new());
    let scheduler = scheduler_with_calendar(calendar);
    let monday = future_monday();

    // Prime the cache first so this also proves write-through invalidation.
    let before = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(before.iter().any(|s| s.start == at(monday, 9, 0)));

    let booking = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();
    assert_eq!(booking.duration_minutes(), 60);

    let after = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(!after.iter().any(|s| s.start == at(monday, 9, 0)));

    // Other users see the occupancy too.
    let for_bob = scheduler
        .get_available_slots(monday, 60, Some("bob"))
        .await
        .unwrap();
    assert!(!for_bob.iter().any(|s| s.start == at(monday, 9, 0)));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_double_booking_is_rejected_with_reason() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    scheduler
        .create_booking(request("ada", at(monday, 10, 15), 60))
        .await
        .unwrap();

    let result = scheduler
        .create_booking(request("bob", at(monday, 10, 15), 60))
        .await;

    match result {
        Err(RotaError::Conflict(ConflictError::SlotUnavailable { reason })) => {
            assert_eq!(reason, UnavailableReason::Overlap);
        }
        other => panic!("expected overlap conflict, got {:?}", other.err()),
    }
    scheduler.shutdown();
}

#[tokio::test]
async fn test_off_grid_start_is_rejected() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let result = scheduler
        .create_booking(request("ada", at(monday, 9, 37), 60))
        .await;
    assert!(matches!(
        result,
        Err(RotaError::Conflict(ConflictError::OutsideSchedule))
    ));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_past_start_is_rejected() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let yesterday = Utc::now() - Duration::days(1);

    let result = scheduler.create_booking(request("ada", yesterday, 60)).await;
    assert!(matches!(result, Err(RotaError::Validation(_))));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_daily_cap_blocks_one_user_not_another() {
    let constraints = SchedulingConstraints {
        max_hours_per_day: 2.0,
        ..Default::default()
    };
    let repo = Arc::new(MemoryConstraintRepository::new(
        constraints,
        WeeklySchedule::default(),
    ));
    let scheduler = Scheduler::builder(Config::default())
        .constraint_repository(repo)
        .build()
        .unwrap();
    let monday = future_monday();

    scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();
    scheduler
        .create_booking(request("ada", at(monday, 11, 30), 60))
        .await
        .unwrap();

    // Ada is at her two-hour ceiling.
    let result = scheduler
        .create_booking(request("ada", at(monday, 14, 0), 60))
        .await;
    match result {
        Err(RotaError::Conflict(ConflictError::SlotUnavailable { reason })) => {
            assert_eq!(reason, UnavailableReason::DailyHourLimit);
        }
        other => panic!("expected daily-cap conflict, got {:?}", other.err()),
    }

    // The same slot is still open for Bob.
    scheduler
        .create_booking(request("bob", at(monday, 14, 0), 60))
        .await
        .unwrap();
    scheduler.shutdown();
}

#[tokio::test]
async fn test_weekly_quota_decreases_and_floors_at_zero() {
    let constraints = SchedulingConstraints {
        max_hours_per_week: 2.0,
        max_lessons_per_week: 2,
        ..Default::default()
    };
    let repo = Arc::new(MemoryConstraintRepository::new(
        constraints,
        WeeklySchedule::default(),
    ));
    let scheduler = Scheduler::builder(Config::default())
        .constraint_repository(repo)
        .build()
        .unwrap();
    let monday = future_monday();

    let quota = scheduler.remaining_quota("ada", monday).await.unwrap();
    assert!((quota.weekly_hours - 2.0).abs() < f64::EPSILON);

    scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();
    let quota = scheduler.remaining_quota("ada", monday).await.unwrap();
    assert!((quota.weekly_hours - 1.0).abs() < f64::EPSILON);
    assert_eq!(quota.weekly_lessons, 1);

    scheduler
        .create_booking(request("ada", at(monday, 11, 30), 60))
        .await
        .unwrap();
    let quota = scheduler.remaining_quota("ada", monday).await.unwrap();
    assert_eq!(quota.weekly_hours, 0.0);
    assert_eq!(quota.weekly_lessons, 0);

    // Exhausted quota never goes negative, and the week is closed to Ada.
    let week = scheduler
        .get_week_availability(monday, 60, Some("ada"))
        .await
        .unwrap();
    assert_eq!(week.remaining_weekly_hours, 0.0);
    assert_eq!(week.remaining_weekly_lessons, 0);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_cancel_frees_the_slot() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let booking = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();

    assert!(scheduler.cancel_booking(booking.id).await.unwrap());

    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(slots.iter().any(|s| s.start == at(monday, 9, 0)));

    // Cancelling again, or cancelling a ghost, reports nothing to do.
    assert!(!scheduler.cancel_booking(booking.id).await.unwrap());
    assert!(!scheduler.cancel_booking(uuid::Uuid::new_v4()).await.unwrap());
    scheduler.shutdown();
}

#[tokio::test]
async fn test_reschedule_moves_and_revalidates() {
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let booking = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();
    scheduler
        .create_booking(request("bob", at(monday, 14, 0), 60))
        .await
        .unwrap();

    // Moving onto Bob's slot fails; the booking does not compete with its
    // own old time.
    let taken = scheduler
        .reschedule_booking(booking.id, at(monday, 14, 0), None)
        .await;
    assert!(taken.is_err());

    let moved = scheduler
        .reschedule_booking(booking.id, at(monday, 11, 30), None)
        .await
        .unwrap();
    assert_eq!(moved.start, at(monday, 11, 30));

    // The old slot is open again, the new one is not.
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(slots.iter().any(|s| s.start == at(monday, 9, 0)));
    assert!(!slots.iter().any(|s| s.start == at(monday, 11, 30)));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_external_write_failure_rolls_back_booking() {
    let calendar = Arc::new(FakeCalendar::new());
    let scheduler = scheduler_with_calendar(calendar.clone());
    let monday = future_monday();

    calendar.set_fail_writes(true);
    let result = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await;
    assert!(matches!(result, Err(RotaError::Remote(_))));

    // The slot is available again: the local booking was rolled back.
    calendar.set_fail_writes(false);
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(slots.iter().any(|s| s.start == at(monday, 9, 0)));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_bookings_are_mirrored_to_the_calendar() {
    let calendar = Arc::new(FakeCalendar::new());
    let scheduler = scheduler_with_calendar(calendar.clone());
    let monday = future_monday();

    let booking = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();
    let external_id = booking.external_event_id.clone().expect("mirrored event id");

    {
        let events = calendar.events.read().await;
        assert!(events.iter().any(|e| e.id == external_id));
    }

    scheduler.cancel_booking(booking.id).await.unwrap();
    let events = calendar.events.read().await;
    assert!(!events.iter().any(|e| e.id == external_id));
    scheduler.shutdown();
}

#[tokio::test]
async fn test_failed_remote_delete_keeps_booking_confirmed() {
    let calendar = Arc::new(FakeCalendar::new());
    let scheduler = scheduler_with_calendar(calendar.clone());
    let monday = future_monday();

    let booking = scheduler
        .create_booking(request("ada", at(monday, 9, 0), 60))
        .await
        .unwrap();

    calendar.set_fail_writes(true);
    assert!(scheduler.cancel_booking(booking.id).await.is_err());

    // Still blocking: the conservative direction when the provider is down.
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(!slots.iter().any(|s| s.start == at(monday, 9, 0)));
    scheduler.shutdown();
}
