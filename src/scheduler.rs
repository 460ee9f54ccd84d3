//! The scheduling composition root.
//!
//! [`Scheduler`] wires the constraint store, availability calculator,
//! caches, booking store, and external calendar behind the operations the
//! booking UI, admin tooling, and assistants call:
//!
//! - Day and week availability (cached, short TTL)
//! - Forward search for the next open slot
//! - Booking create/cancel/reschedule with synchronous re-validation
//! - Constraint reads and updates
//!
//! Every dependency is injected through [`SchedulerBuilder`], so tests run
//! against fresh in-memory instances rather than shared globals.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::{week_start, AvailabilityCalculator, DayAvailability, TimeSlot, WeekAvailability};
use crate::booking::{Booking, BookingRequest, BookingStatus, BookingStore, MemoryBookingStore};
use crate::cache::{CacheStats, TtlCache};
use crate::config::Config;
use crate::constraints::{
    ConstraintRepository, ConstraintStore, ConstraintUpdate, MemoryConstraintRepository,
    SchedulingConstraints,
};
use crate::error::{ConflictError, Result, ValidationError};
use crate::metrics::get_metrics;
use crate::remote::{
    CalendarProvider, CredentialRefresher, EventDraft, HttpCalendarClient, HttpCredentialExchange,
    NullCalendar,
};

/// How much a user may still book on a day and in its week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingQuota {
    pub daily_hours: f64,
    pub daily_lessons: u32,
    pub weekly_hours: f64,
    pub weekly_lessons: u32,
}

/// Cache statistics for both availability caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerCacheStats {
    pub day: CacheStats,
    pub week: CacheStats,
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    config: Config,
    booking_store: Option<Arc<dyn BookingStore>>,
    calendar: Option<Arc<dyn CalendarProvider>>,
    constraint_repository: Option<Arc<dyn ConstraintRepository>>,
}

impl SchedulerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            booking_store: None,
            calendar: None,
            constraint_repository: None,
        }
    }

    /// Use a specific booking store.
    pub fn booking_store(mut self, store: Arc<dyn BookingStore>) -> Self {
        self.booking_store = Some(store);
        self
    }

    /// Use a specific calendar provider. Bookings are mirrored to it.
    pub fn calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Use a specific constraint repository.
    pub fn constraint_repository(mut self, repository: Arc<dyn ConstraintRepository>) -> Self {
        self.constraint_repository = Some(repository);
        self
    }

    /// Build the scheduler. Must run inside a Tokio runtime: the caches
    /// spawn their background sweeps here.
    pub fn build(self) -> Result<Scheduler> {
        let config = self.config;

        let (calendar, mirror_bookings): (Arc<dyn CalendarProvider>, bool) = match self.calendar {
            Some(provider) => (provider, true),
            None if config.remote.enabled => {
                let exchange = Arc::new(HttpCredentialExchange::new(&config.credentials)?);
                let refresher =
                    CredentialRefresher::new(exchange, config.credentials.safety_buffer_secs);
                info!(
                    "External calendar enabled: {} ({})",
                    config.remote.base_url, config.remote.calendar_id
                );
                (
                    Arc::new(HttpCalendarClient::new(&config.remote, refresher)?),
                    true,
                )
            }
            None => (Arc::new(NullCalendar), false),
        };

        let booking_store = self
            .booking_store
            .unwrap_or_else(|| Arc::new(MemoryBookingStore::new()));
        let constraint_repository = self
            .constraint_repository
            .unwrap_or_else(|| Arc::new(MemoryConstraintRepository::default()));

        let (day_cache, week_cache) = if config.cache.enabled {
            let ttl = StdDuration::from_secs(config.cache.availability_ttl_secs);
            let sweep = StdDuration::from_secs(config.cache.sweep_interval_secs);
            (
                TtlCache::new(config.cache.max_entries, ttl, sweep),
                TtlCache::new(config.cache.max_entries, ttl, sweep),
            )
        } else {
            (TtlCache::disabled(), TtlCache::disabled())
        };

        Ok(Scheduler {
            config,
            constraints: Arc::new(ConstraintStore::new(constraint_repository)),
            bookings: booking_store,
            calendar,
            mirror_bookings,
            day_cache,
            week_cache,
        })
    }
}

/// The scheduling engine.
pub struct Scheduler {
    config: Config,
    constraints: Arc<ConstraintStore>,
    bookings: Arc<dyn BookingStore>,
    calendar: Arc<dyn CalendarProvider>,
    /// Whether bookings are mirrored to the external calendar.
    mirror_bookings: bool,
    day_cache: TtlCache<DayAvailability>,
    week_cache: TtlCache<WeekAvailability>,
}

impl Scheduler {
    /// A scheduler with default in-memory collaborators.
    pub fn new(config: Config) -> Result<Self> {
        SchedulerBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    // ========================================================================
    // Availability
    // ========================================================================

    /// A day's full availability, with unavailable slots annotated.
    ///
    /// Served from the short-TTL cache when possible; a different duration
    /// or user is a different cache entry.
    pub async fn get_day_availability(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
    ) -> Result<DayAvailability> {
        validate_duration(duration_minutes)?;

        let key = day_key(date, duration_minutes, user_id);
        if let Some(cached) = self.day_cache.get(&key).await {
            return Ok(cached);
        }

        let day = self.compute_day(date, duration_minutes, user_id).await?;
        self.day_cache.set(key, day.clone()).await;
        Ok(day)
    }

    /// Only the bookable slots for a day.
    pub async fn get_available_slots(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
    ) -> Result<Vec<TimeSlot>> {
        let day = self
            .get_day_availability(date, duration_minutes, user_id)
            .await?;
        Ok(day.slots.into_iter().filter(|s| s.available).collect())
    }

    /// Availability for the Monday-aligned week containing `week_start_date`.
    pub async fn get_week_availability(
        &self,
        week_start_date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
    ) -> Result<WeekAvailability> {
        validate_duration(duration_minutes)?;

        let monday = week_start(week_start_date);
        let key = week_key(monday, duration_minutes, user_id);
        if let Some(cached) = self.week_cache.get(&key).await {
            return Ok(cached);
        }

        let calculator = self.calculator().await?;
        let range_start = monday.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let range_end = range_start + Duration::days(7);

        // The events fetch completes before any filtering begins.
        let events = self
            .calendar
            .get_events(range_start - Duration::hours(1), range_end + Duration::hours(1))
            .await?;
        let bookings = self.bookings.list_in_range(range_start, range_end).await?;

        let metrics = get_metrics();
        metrics.availability_computations_total.inc();
        let timer = metrics.availability_duration_seconds.start_timer();
        let week =
            calculator.week_availability(monday, duration_minutes, user_id, &bookings, &events);
        timer.observe_duration();

        self.week_cache.set(key, week.clone()).await;
        Ok(week)
    }

    /// The next open slot at or after `from`, scanning day by day.
    ///
    /// Most callers only want the very next opening, so this walks forward
    /// one day at a time and stops at the first hit instead of computing
    /// the whole horizon.
    pub async fn find_next_available_slot(
        &self,
        from: DateTime<Utc>,
        duration_minutes: i64,
        user_id: Option<&str>,
    ) -> Result<Option<TimeSlot>> {
        validate_duration(duration_minutes)?;

        for offset in 0..self.config.scheduling.max_search_days as i64 {
            let date = (from + Duration::days(offset)).date_naive();
            let day = self.compute_day(date, duration_minutes, user_id).await?;
            if let Some(slot) = AvailabilityCalculator::first_open_slot(&day, from) {
                debug!("Next available slot found on {}: {}", date, slot.start);
                return Ok(Some(slot));
            }
        }

        debug!(
            "No available slot within {} days of {}",
            self.config.scheduling.max_search_days, from
        );
        Ok(None)
    }

    /// How much a user may still book on `date` and in its week.
    pub async fn remaining_quota(&self, user_id: &str, date: NaiveDate) -> Result<RemainingQuota> {
        let snapshot = self.constraints.snapshot().await?;
        let monday = week_start(date);
        let week_start_at = monday.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let week_end_at = week_start_at + Duration::days(7);

        let user_bookings = self
            .bookings
            .list_for_user(user_id, week_start_at, week_end_at)
            .await?;

        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let (daily_hours, daily_lessons) = crate::availability::ConflictResolver::consumed(
            &user_bookings,
            day_start,
            day_start + Duration::days(1),
        );
        let (weekly_hours, weekly_lessons) = crate::availability::ConflictResolver::consumed(
            &user_bookings,
            week_start_at,
            week_end_at,
        );

        let c = &snapshot.constraints;
        Ok(RemainingQuota {
            daily_hours: (c.max_hours_per_day - daily_hours).max(0.0),
            daily_lessons: c.max_lessons_per_day.saturating_sub(daily_lessons),
            weekly_hours: (c.max_hours_per_week - weekly_hours).max(0.0),
            weekly_lessons: c.max_lessons_per_week.saturating_sub(weekly_lessons),
        })
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Validate and persist a booking, invalidate cached availability, and
    /// mirror it to the external calendar.
    ///
    /// Validation always re-runs against freshly fetched events, never a
    /// cached availability answer, closing the race between "user viewed
    /// availability" and "user submitted booking".
    pub async fn create_booking(&self, request: BookingRequest) -> Result<Booking> {
        let now = Utc::now();
        request.validate(now)?;

        let date = request.start.date_naive();
        let day = self
            .compute_day(date, request.duration_minutes, Some(&request.user_id))
            .await?;

        let slot = day.slots.iter().find(|s| s.start == request.start);
        match slot {
            None => {
                get_metrics().booking_conflicts_total.inc();
                return Err(ConflictError::OutsideSchedule.into());
            }
            Some(slot) if !slot.available => {
                get_metrics().booking_conflicts_total.inc();
                // Annotated slots always carry their reason.
                let reason = slot.reason.expect("unavailable slot without reason");
                return Err(ConflictError::SlotUnavailable { reason }.into());
            }
            Some(_) => {}
        }

        let mut booking = Booking {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            start: request.start,
            end: request.end(),
            status: BookingStatus::Confirmed,
            title: request.title.clone(),
            description: request.description.clone(),
            external_event_id: None,
            created_at: now,
            updated_at: now,
        };

        self.bookings.create(booking.clone()).await?;
        // Readers that start after this point must not see pre-write state.
        self.invalidate_availability(date).await;

        if self.mirror_bookings {
            let draft = EventDraft {
                title: booking.title.clone(),
                description: booking.description.clone().unwrap_or_default(),
                start: booking.start,
                end: booking.end,
                attendees: Vec::new(),
            };

            match self.calendar.create_event(&draft).await {
                Ok(event) => {
                    booking.external_event_id = Some(event.id);
                    booking.updated_at = Utc::now();
                    self.bookings.update(booking.clone()).await?;
                }
                Err(e) => {
                    warn!(
                        "External calendar write failed for booking {}; rolling back: {}",
                        booking.id, e
                    );
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = Utc::now();
                    if let Err(rollback) = self.bookings.update(booking.clone()).await {
                        warn!("Rollback of booking {} failed: {}", booking.id, rollback);
                    }
                    self.invalidate_availability(date).await;
                    return Err(e);
                }
            }
        }

        get_metrics().bookings_created_total.inc();
        info!(
            "Created booking {} for {} at {}",
            booking.id, booking.user_id, booking.start
        );
        Ok(booking)
    }

    /// Cancel a booking. Returns `false` when there is nothing to cancel.
    ///
    /// The external calendar delete runs first: if it fails, the local
    /// booking stays confirmed (and keeps blocking slots), which is the
    /// recoverable direction.
    pub async fn cancel_booking(&self, id: Uuid) -> Result<bool> {
        let Some(mut booking) = self.bookings.get(id).await? else {
            return Ok(false);
        };
        if booking.status == BookingStatus::Cancelled {
            return Ok(false);
        }

        if self.mirror_bookings {
            if let Some(ref event_id) = booking.external_event_id {
                self.calendar.delete_event(event_id).await?;
            }
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = Utc::now();
        self.bookings.update(booking.clone()).await?;
        self.invalidate_availability(booking.start.date_naive()).await;

        get_metrics().bookings_cancelled_total.inc();
        info!("Cancelled booking {}", booking.id);
        Ok(true)
    }

    /// Move a booking to a new start (and optionally a new duration),
    /// re-validating as if it were created fresh but without competing
    /// against itself.
    pub async fn reschedule_booking(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_duration_minutes: Option<i64>,
    ) -> Result<Booking> {
        let Some(booking) = self.bookings.get(id).await? else {
            return Err(ConflictError::NotFound(id.to_string()).into());
        };
        if booking.status == BookingStatus::Cancelled {
            return Err(ConflictError::AlreadyCancelled(id.to_string()).into());
        }

        let duration_minutes = new_duration_minutes.unwrap_or(booking.duration_minutes());
        validate_duration(duration_minutes)?;
        let now = Utc::now();
        if new_start < now {
            return Err(ValidationError::PastStart.into());
        }

        let date = new_start.date_naive();
        let day = self
            .compute_day_excluding(date, duration_minutes, Some(&booking.user_id), Some(id))
            .await?;

        let slot = day.slots.iter().find(|s| s.start == new_start);
        match slot {
            None => {
                get_metrics().booking_conflicts_total.inc();
                return Err(ConflictError::OutsideSchedule.into());
            }
            Some(slot) if !slot.available => {
                get_metrics().booking_conflicts_total.inc();
                let reason = slot.reason.expect("unavailable slot without reason");
                return Err(ConflictError::SlotUnavailable { reason }.into());
            }
            Some(_) => {}
        }

        let old_date = booking.start.date_naive();
        let mut updated = booking.clone();
        updated.start = new_start;
        updated.end = new_start + Duration::minutes(duration_minutes);
        updated.updated_at = now;

        if self.mirror_bookings {
            if let Some(ref event_id) = updated.external_event_id {
                let draft = EventDraft {
                    title: updated.title.clone(),
                    description: updated.description.clone().unwrap_or_default(),
                    start: updated.start,
                    end: updated.end,
                    attendees: Vec::new(),
                };
                // Remote first: a failed update leaves the local booking
                // where it was.
                self.calendar.update_event(event_id, &draft).await?;
            }
        }

        let updated = self.bookings.update(updated).await?;
        self.invalidate_availability(old_date).await;
        if week_start(date) != week_start(old_date) {
            self.invalidate_availability(date).await;
        }

        info!("Rescheduled booking {} to {}", updated.id, updated.start);
        Ok(updated)
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Current scheduling constraints (snapshot copy).
    pub async fn get_constraints(&self) -> Result<SchedulingConstraints> {
        self.constraints.constraints().await
    }

    /// Apply a partial constraint update. All cached availability is
    /// dropped: the rules just changed under it.
    pub async fn update_constraints(
        &self,
        update: ConstraintUpdate,
    ) -> Result<SchedulingConstraints> {
        let updated = self.constraints.update_constraints(update).await?;
        self.day_cache.clear().await;
        self.week_cache.clear().await;
        Ok(updated)
    }

    /// Mark a date as vacation and drop affected cached availability.
    pub async fn add_vacation(&self, date: NaiveDate) -> Result<()> {
        self.constraints.add_vacation(date).await?;
        self.invalidate_availability(date).await;
        Ok(())
    }

    /// Remove a vacation date and drop affected cached availability.
    pub async fn remove_vacation(&self, date: NaiveDate) -> Result<()> {
        self.constraints.remove_vacation(date).await?;
        self.invalidate_availability(date).await;
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Hit/miss statistics for both availability caches.
    pub async fn cache_stats(&self) -> SchedulerCacheStats {
        SchedulerCacheStats {
            day: self.day_cache.stats().await,
            week: self.week_cache.stats().await,
        }
    }

    /// Stop background cache sweeps.
    pub fn shutdown(&self) {
        self.day_cache.shutdown();
        self.week_cache.shutdown();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn calculator(&self) -> Result<AvailabilityCalculator> {
        Ok(AvailabilityCalculator::new(self.constraints.snapshot().await?))
    }

    /// Compute a day fresh: events first, then local bookings, then the
    /// pure calculation.
    async fn compute_day(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
    ) -> Result<DayAvailability> {
        self.compute_day_excluding(date, duration_minutes, user_id, None)
            .await
    }

    async fn compute_day_excluding(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
        user_id: Option<&str>,
        exclude_booking: Option<Uuid>,
    ) -> Result<DayAvailability> {
        let calculator = self.calculator().await?;

        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + Duration::days(1);

        // Events padded by an hour on both sides so boundary buffers around
        // midnight still see their neighbors.
        let events = self
            .calendar
            .get_events(day_start - Duration::hours(1), day_end + Duration::hours(1))
            .await?;

        // Weekly caps need the whole Monday-aligned week of bookings.
        let monday = week_start(date).and_hms_opt(0, 0, 0).unwrap().and_utc();
        let mut bookings = self
            .bookings
            .list_in_range(monday, monday + Duration::days(7))
            .await?;
        if let Some(excluded) = exclude_booking {
            bookings.retain(|b| b.id != excluded);
        }

        let metrics = get_metrics();
        metrics.availability_computations_total.inc();
        let timer = metrics.availability_duration_seconds.start_timer();
        let day =
            calculator.day_availability(date, duration_minutes, user_id, &bookings, &events);
        timer.observe_duration();
        Ok(day)
    }

    /// Drop every cached availability entry whose dates fall in the
    /// Monday-aligned week of `date`. Runs before any write returns.
    async fn invalidate_availability(&self, date: NaiveDate) {
        let monday = week_start(date);
        let dates: Vec<String> = (0..7)
            .map(|offset| (monday + Duration::days(offset)).to_string())
            .collect();

        let day_pattern = Regex::new(&format!("^day:({}):", dates.join("|")))
            .expect("day invalidation pattern is valid");
        self.day_cache.invalidate_pattern(&day_pattern).await;

        let week_pattern =
            Regex::new(&format!("^week:{}:", monday)).expect("week invalidation pattern is valid");
        self.week_cache.invalidate_pattern(&week_pattern).await;
    }
}

fn validate_duration(duration_minutes: i64) -> Result<()> {
    if duration_minutes <= 0 || duration_minutes > 24 * 60 {
        return Err(ValidationError::InvalidDuration(duration_minutes).into());
    }
    Ok(())
}

fn day_key(date: NaiveDate, duration_minutes: i64, user_id: Option<&str>) -> String {
    format!(
        "day:{}:{}:{}",
        date,
        duration_minutes,
        user_id.unwrap_or("any")
    )
}

fn week_key(monday: NaiveDate, duration_minutes: i64, user_id: Option<&str>) -> String {
    format!(
        "week:{}:{}:{}",
        monday,
        duration_minutes,
        user_id.unwrap_or("any")
    )
}
