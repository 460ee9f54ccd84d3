//! Shared test fixtures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;

use rota::{
    CalendarEvent, CalendarProvider, Config, EventDraft, EventStatus, RemoteError, Result,
    Scheduler,
};

/// In-memory calendar provider recording every mirror write.
#[derive(Default)]
pub struct FakeCalendar {
    pub events: RwLock<Vec<CalendarEvent>>,
    next_id: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub read_calls: AtomicUsize,
}

impl FakeCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a confirmed busy event.
    pub async fn add_busy(&self, start: DateTime<Utc>, minutes: i64) {
        self.add_event(start, minutes, EventStatus::Confirmed).await;
    }

    pub async fn add_event(&self, start: DateTime<Utc>, minutes: i64, status: EventStatus) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.events.write().await.push(CalendarEvent {
            id: format!("seed-{}", id),
            title: "Busy".to_string(),
            description: String::new(),
            start,
            end: start + Duration::minutes(minutes),
            all_day: false,
            status,
            attendees: Vec::new(),
        });
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write_error() -> rota::RotaError {
        RemoteError::Http {
            status: 503,
            message: "provider unavailable".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl CalendarProvider for FakeCalendar {
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.start < end && e.end > start)
            .cloned()
            .collect())
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::write_error());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = CalendarEvent {
            id: format!("ext-{}", id),
            title: draft.title.clone(),
            description: draft.description.clone(),
            start: draft.start,
            end: draft.end,
            all_day: false,
            status: EventStatus::Confirmed,
            attendees: draft.attendees.clone(),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn update_event(&self, id: &str, draft: &EventDraft) -> Result<CalendarEvent> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::write_error());
        }
        let mut events = self.events.write().await;
        let Some(event) = events.iter_mut().find(|e| e.id == id) else {
            return Err(RemoteError::Http {
                status: 404,
                message: "not found".to_string(),
            }
            .into());
        };
        event.title = draft.title.clone();
        event.start = draft.start;
        event.end = draft.end;
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::write_error());
        }
        self.events.write().await.retain(|e| e.id != id);
        Ok(())
    }

    async fn is_busy(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> Result<bool> {
        let padded_start = start - Duration::minutes(buffer_minutes);
        let padded_end = end + Duration::minutes(buffer_minutes);
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.status == EventStatus::Confirmed)
            .any(|e| e.start < padded_end && e.end > padded_start))
    }
}

/// A Monday at least a week in the future, so booking starts are never in
/// the past while the test runs.
pub fn future_monday() -> NaiveDate {
    let today = Utc::now().date_naive();
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    monday + Duration::days(14)
}

/// 09:00 UTC on the given date.
pub fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

/// A scheduler wired to the fake calendar with default constraints.
pub fn scheduler_with_calendar(calendar: Arc<FakeCalendar>) -> Scheduler {
    Scheduler::builder(Config::default())
        .calendar(calendar)
        .build()
        .unwrap()
}
