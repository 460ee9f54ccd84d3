//! External calendar behavior as seen through the scheduling engine.

use std::sync::Arc;

use chrono::Duration;

use rota::{CalendarProvider, Config, EventStatus, Scheduler};

use super::support::{at, future_monday, scheduler_with_calendar, FakeCalendar};

#[tokio::test]
async fn test_cancelled_external_events_do_not_block() {
    let calendar = Arc::new(FakeCalendar::new());
    let monday = future_monday();
    calendar
        .add_event(at(monday, 10, 0), 60, EventStatus::Cancelled)
        .await;
    calendar
        .add_event(at(monday, 12, 45), 60, EventStatus::Tentative)
        .await;

    let scheduler = scheduler_with_calendar(calendar);
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();

    // Neither the cancelled nor the tentative event removes a slot.
    assert_eq!(slots.len(), 6);
    scheduler.shutdown();
}

#[tokio::test]
async fn test_all_day_style_event_blocks_the_whole_day() {
    let calendar = Arc::new(FakeCalendar::new());
    let monday = future_monday();
    // Midnight to one second before next midnight, as the normalizer
    // produces for an all-day provider event.
    calendar
        .add_busy(at(monday, 0, 0), 24 * 60 - 1)
        .await;

    let scheduler = scheduler_with_calendar(calendar);
    let slots = scheduler.get_available_slots(monday, 60, None).await.unwrap();
    assert!(slots.is_empty());

    // The next day is untouched.
    let tuesday = monday + Duration::days(1);
    let slots = scheduler.get_available_slots(tuesday, 60, None).await.unwrap();
    assert!(!slots.is_empty());
    scheduler.shutdown();
}

#[tokio::test]
async fn test_free_busy_check_honors_buffer() {
    let calendar = Arc::new(FakeCalendar::new());
    let monday = future_monday();
    calendar.add_busy(at(monday, 10, 0), 60).await;

    // 11:05 is clear of the event itself but inside a 15-minute buffer.
    assert!(calendar
        .is_busy(at(monday, 11, 5), at(monday, 12, 5), 15)
        .await
        .unwrap());
    assert!(!calendar
        .is_busy(at(monday, 11, 15), at(monday, 12, 15), 0)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_engine_runs_without_an_external_calendar() {
    // Default config: remote disabled, NullCalendar, no mirroring.
    let scheduler = Scheduler::new(Config::default()).unwrap();
    let monday = future_monday();

    let booking = scheduler
        .create_booking(rota::BookingRequest {
            user_id: "ada".to_string(),
            start: at(monday, 9, 0),
            duration_minutes: 60,
            title: "Lesson".to_string(),
            description: None,
        })
        .await
        .unwrap();

    // Nothing to mirror to, so no external id.
    assert!(booking.external_event_id.is_none());
    assert!(scheduler.cancel_booking(booking.id).await.unwrap());
    scheduler.shutdown();
}
