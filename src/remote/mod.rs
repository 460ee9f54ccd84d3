//! External calendar synchronization.
//!
//! Everything that talks to the third-party calendar lives here:
//!
//! - **types**: the normalized [`CalendarEvent`] model and the single
//!   translation function raw provider payloads pass through
//! - **client**: the [`CalendarProvider`] seam and its HTTP implementation
//!   with transparent pagination, bounded retries, and degraded-mode reads
//! - **credentials**: cached short-lived access tokens with single-flight
//!   refresh coalescing

mod client;
mod credentials;
mod types;

pub use client::{CalendarProvider, HttpCalendarClient, NullCalendar};
pub use credentials::{
    CachedCredential, CredentialExchange, CredentialRefresher, HttpCredentialExchange,
};
pub use types::{
    normalize_event, CalendarEvent, EventDraft, EventStatus, ProviderAttendee, ProviderBusyInterval,
    ProviderEvent, ProviderEventPage, ProviderFreeBusy, ProviderTime,
};

/// Retry attempts for mutating calls and credential refreshes.
pub(crate) const RETRY_MAX_ATTEMPTS: usize = 3;

const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Exponential backoff delay for a zero-based attempt number, capped at
/// five seconds.
pub(crate) fn backoff_delay(attempt: usize) -> std::time::Duration {
    let ms = RETRY_BASE_DELAY_MS
        .saturating_mul(2u64.saturating_pow(attempt as u32))
        .min(RETRY_MAX_DELAY_MS);
    std::time::Duration::from_millis(ms)
}
