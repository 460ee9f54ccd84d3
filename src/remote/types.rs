//! Normalized calendar events and the provider wire payloads they come from.
//!
//! Untyped provider payloads never leak past this boundary: every event the
//! rest of the engine sees went through [`normalize_event`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status of a calendar event.
///
/// Only [`EventStatus::Confirmed`] events participate in conflict
/// detection. Unknown provider statuses map to `Confirmed`: blocking a slot
/// that may be free is acceptable, showing a taken slot as free is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    fn from_provider(s: Option<&str>) -> Self {
        match s {
            Some("tentative") => EventStatus::Tentative,
            Some("cancelled") | Some("canceled") => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        }
    }
}

/// A normalized external calendar event.
///
/// All fields are defaulted (empty string, empty vec) so downstream
/// consumers never branch on presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub status: EventStatus,
    pub attendees: Vec<String>,
}

impl CalendarEvent {
    /// Whether this event should block availability.
    pub fn is_blocking(&self) -> bool {
        self.status == EventStatus::Confirmed
    }
}

/// Fields for creating or updating a provider event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

// ============================================================================
// Provider wire payloads
// ============================================================================

/// Provider time field: either a timed instant or an all-day date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ProviderTime {
    pub fn timed(at: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(at.to_rfc3339()),
            date: None,
        }
    }
}

/// Attendee entry as the provider returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderAttendee {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Raw event payload from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ProviderTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ProviderTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<ProviderAttendee>>,
}

/// One page of a provider event listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEventPage {
    #[serde(default)]
    pub items: Vec<ProviderEvent>,
    pub next_page_token: Option<String>,
}

/// Busy interval from the provider free/busy endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBusyInterval {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Free/busy response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFreeBusy {
    #[serde(default)]
    pub busy: Vec<ProviderBusyInterval>,
}

// ============================================================================
// Normalization
// ============================================================================

enum ResolvedTime {
    Timed(DateTime<Utc>),
    AllDay(NaiveDate),
}

fn resolve_time(t: &ProviderTime) -> Option<ResolvedTime> {
    if let Some(ref dt) = t.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|d| ResolvedTime::Timed(d.with_timezone(&Utc)));
    }
    if let Some(ref d) = t.date {
        return NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .ok()
            .map(ResolvedTime::AllDay);
    }
    None
}

/// Translate a raw provider event into a [`CalendarEvent`].
///
/// Events with a missing or unparseable start or end are dropped: malformed
/// third-party data must not break availability computation. All-day events
/// carry an exclusive end date on the wire; it is converted to the last
/// second of the previous day so a lesson booked on the following morning
/// does not register a false conflict.
pub fn normalize_event(raw: ProviderEvent) -> Option<CalendarEvent> {
    let start = raw.start.as_ref().and_then(resolve_time);
    let end = raw.end.as_ref().and_then(resolve_time);

    let (start, end, all_day) = match (start, end) {
        (Some(ResolvedTime::Timed(s)), Some(ResolvedTime::Timed(e))) => (s, e, false),
        (Some(ResolvedTime::AllDay(s)), Some(ResolvedTime::AllDay(e))) => {
            let start = s.and_hms_opt(0, 0, 0)?.and_utc();
            // Exclusive end-of-day boundary, inclusive-end normalization.
            let end = e.and_hms_opt(0, 0, 0)?.and_utc() - Duration::seconds(1);
            (start, end, true)
        }
        _ => {
            debug!(
                "Dropping provider event {:?}: missing or mixed start/end",
                raw.id
            );
            return None;
        }
    };

    if end <= start {
        debug!("Dropping provider event {:?}: end not after start", raw.id);
        return None;
    }

    Some(CalendarEvent {
        id: raw.id.unwrap_or_default(),
        title: raw.summary.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        start,
        end,
        all_day,
        status: EventStatus::from_provider(raw.status.as_deref()),
        attendees: raw
            .attendees
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.email)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn timed_raw(start: &str, end: &str) -> ProviderEvent {
        ProviderEvent {
            id: Some("evt-1".to_string()),
            summary: Some("Dentist".to_string()),
            start: Some(ProviderTime {
                date_time: Some(start.to_string()),
                date: None,
            }),
            end: Some(ProviderTime {
                date_time: Some(end.to_string()),
                date: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_timed_event_normalization() {
        let event =
            normalize_event(timed_raw("2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z")).unwrap();
        assert!(!event.all_day);
        assert_eq!(event.title, "Dentist");
        assert_eq!((event.end - event.start).num_minutes(), 60);
        assert!(event.is_blocking());
    }

    #[test]
    fn test_all_day_inclusive_end() {
        let raw = ProviderEvent {
            id: Some("evt-2".to_string()),
            start: Some(ProviderTime {
                date_time: None,
                date: Some("2026-08-10".to_string()),
            }),
            // Provider convention: exclusive end date (the day after).
            end: Some(ProviderTime {
                date_time: None,
                date: Some("2026-08-11".to_string()),
            }),
            ..Default::default()
        };

        let event = normalize_event(raw).unwrap();
        assert!(event.all_day);
        assert_eq!(event.end.date_naive(), event.start.date_naive());
        assert_eq!(event.end.hour(), 23);
        assert_eq!(event.end.minute(), 59);
    }

    #[test]
    fn test_missing_times_are_dropped() {
        assert!(normalize_event(ProviderEvent::default()).is_none());

        let half = ProviderEvent {
            start: Some(ProviderTime {
                date_time: Some("2026-08-10T10:00:00Z".to_string()),
                date: None,
            }),
            ..Default::default()
        };
        assert!(normalize_event(half).is_none());
    }

    #[test]
    fn test_inverted_times_are_dropped() {
        let raw = timed_raw("2026-08-10T11:00:00Z", "2026-08-10T10:00:00Z");
        assert!(normalize_event(raw).is_none());
    }

    #[test]
    fn test_status_mapping() {
        let mut raw = timed_raw("2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z");
        raw.status = Some("cancelled".to_string());
        assert!(!normalize_event(raw.clone()).unwrap().is_blocking());

        raw.status = Some("busy".to_string());
        assert!(normalize_event(raw.clone()).unwrap().is_blocking());

        // Unknown statuses block rather than silently freeing the slot.
        raw.status = Some("mystery".to_string());
        assert!(normalize_event(raw).unwrap().is_blocking());
    }

    #[test]
    fn test_defaulted_fields() {
        let event =
            normalize_event(timed_raw("2026-08-10T10:00:00Z", "2026-08-10T11:00:00Z")).unwrap();
        assert_eq!(event.description, "");
        assert!(event.attendees.is_empty());
    }
}
