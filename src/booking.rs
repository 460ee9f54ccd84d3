//! Local booking records and the booking-store seam.
//!
//! The engine treats the application's persistence as a simple keyed
//! read/write interface returning booking-shaped records; the in-memory
//! implementation here backs tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StorageError, ValidationError};

/// Lifecycle status of a booking.
///
/// Only confirmed bookings participate in conflict detection and cap
/// arithmetic; cancelled bookings are ignored everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A booked lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Unique identifier.
    pub id: Uuid,
    /// The booking user.
    pub user_id: String,
    /// Start time.
    pub start: DateTime<Utc>,
    /// End time.
    pub end: DateTime<Utc>,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Short title shown on calendars.
    pub title: String,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Mirrored event id on the external calendar, once created there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_event_id: Option<String>,
    /// When the booking was created.
    pub created_at: DateTime<Utc>,
    /// When the booking was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Booked length in whole minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A request to create a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BookingRequest {
    /// Reject malformed input up front: empty user, non-positive duration,
    /// or a start in the past.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("user_id").into());
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title").into());
        }
        if self.duration_minutes <= 0 {
            return Err(ValidationError::InvalidDuration(self.duration_minutes).into());
        }
        if self.start < now {
            return Err(ValidationError::PastStart.into());
        }
        Ok(())
    }

    /// The requested end time.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(self.duration_minutes)
    }
}

/// Persistence seam for bookings.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a new booking.
    async fn create(&self, booking: Booking) -> Result<Booking>;

    /// Fetch a booking by id.
    async fn get(&self, id: Uuid) -> Result<Option<Booking>>;

    /// Replace a stored booking.
    async fn update(&self, booking: Booking) -> Result<Booking>;

    /// All bookings intersecting `[start, end)`, any user, any status.
    async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>>;

    /// A user's bookings intersecting `[start, end)`, any status.
    async fn list_for_user(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>>;
}

/// In-memory booking store.
#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn intersects(booking: &Booking, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    booking.start < end && booking.end > start
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn create(&self, booking: Booking) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StorageError::Duplicate(booking.id.to_string()).into());
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn update(&self, booking: Booking) -> Result<Booking> {
        let mut bookings = self.bookings.write().await;
        if !bookings.contains_key(&booking.id) {
            return Err(StorageError::NotFound(booking.id.to_string()).into());
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn list_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| intersects(b, start, end))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start);
        Ok(found)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_id == user_id && intersects(b, start, end))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start);
        Ok(found)
    }
}
