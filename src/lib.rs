//! Rota: lesson scheduling and availability engine.
//!
//! Rota computes bookable time windows from operating-hours configuration,
//! per-user booking limits, buffer requirements, and existing appointments
//! (local bookings plus events synced from an external calendar), and
//! validates proposed bookings against the same logic at write time.

pub mod availability;
pub mod booking;
pub mod cache;
pub mod config;
pub mod constraints;
pub mod error;
pub mod metrics;
pub mod remote;
pub mod scheduler;

pub use availability::{
    AvailabilityCalculator, ConflictResolver, ConstraintFlags, DayAvailability, SlotGenerator,
    TimeSlot, UnavailableReason, WeekAvailability,
};
pub use booking::{Booking, BookingRequest, BookingStatus, BookingStore, MemoryBookingStore};
pub use cache::{CacheStats, TtlCache};
pub use config::{CacheConfig, Config, CredentialConfig, RemoteCalendarConfig, SchedulingConfig};
pub use constraints::{
    ConstraintRepository, ConstraintSnapshot, ConstraintStore, ConstraintUpdate, DayHours,
    MemoryConstraintRepository, SchedulingConstraints, WeeklySchedule,
};
pub use error::{
    ConfigError, ConflictError, RemoteError, Result, RotaError, StorageError, ValidationError,
};
pub use metrics::{get_metrics, Metrics, MetricsSnapshot};
pub use remote::{
    CachedCredential, CalendarEvent, CalendarProvider, CredentialExchange, CredentialRefresher,
    EventDraft, EventStatus, HttpCalendarClient, HttpCredentialExchange, NullCalendar,
};
pub use scheduler::{RemainingQuota, Scheduler, SchedulerBuilder, SchedulerCacheStats};
