//! Calendar provider seam and its HTTP implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::Future;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::RemoteCalendarConfig;
use crate::error::{RemoteError, Result, RotaError};
use crate::metrics::get_metrics;

use super::credentials::CredentialRefresher;
use super::types::{
    normalize_event, CalendarEvent, EventDraft, ProviderEvent, ProviderEventPage, ProviderFreeBusy,
    ProviderTime,
};
use super::{backoff_delay, RETRY_MAX_ATTEMPTS};

/// Operations the engine needs from an external calendar.
///
/// Read paths degrade gracefully (no credential means an empty result) so
/// availability computation falls back to "no external conflicts known";
/// write paths fail loudly, since silently dropping a write would corrupt
/// the provider's state.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// All events intersecting `[start, end)`, pagination handled inside.
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;

    /// Create an event, retrying transient failures.
    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent>;

    /// Update an event, retrying transient failures.
    async fn update_event(&self, id: &str, draft: &EventDraft) -> Result<CalendarEvent>;

    /// Delete an event, retrying transient failures.
    async fn delete_event(&self, id: &str) -> Result<()>;

    /// Whether any busy time intersects `[start - buffer, end + buffer)`.
    ///
    /// Cheaper than fetching full event bodies when only a yes/no answer is
    /// needed.
    async fn is_busy(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> Result<bool>;
}

/// Provider used when no external calendar is configured.
///
/// Reads report an empty calendar; writes fail loudly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCalendar;

#[async_trait]
impl CalendarProvider for NullCalendar {
    async fn get_events(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(Vec::new())
    }

    async fn create_event(&self, _draft: &EventDraft) -> Result<CalendarEvent> {
        Err(RemoteError::Unreachable("no external calendar configured".to_string()).into())
    }

    async fn update_event(&self, _id: &str, _draft: &EventDraft) -> Result<CalendarEvent> {
        Err(RemoteError::Unreachable("no external calendar configured".to_string()).into())
    }

    async fn delete_event(&self, _id: &str) -> Result<()> {
        Err(RemoteError::Unreachable("no external calendar configured".to_string()).into())
    }

    async fn is_busy(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _buffer_minutes: i64,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// HTTP client for a token-paginated calendar provider API.
pub struct HttpCalendarClient {
    client: reqwest::Client,
    base_url: String,
    calendar_id: String,
    page_size: usize,
    credentials: CredentialRefresher,
}

impl HttpCalendarClient {
    pub fn new(config: &RemoteCalendarConfig, credentials: CredentialRefresher) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            page_size: config.page_size,
            credentials,
        })
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    /// A token for this calendar, or `None` in degraded mode.
    async fn token(&self) -> Option<String> {
        self.credentials.get_valid_token(&self.calendar_id).await
    }

    /// A token for this calendar, required for writes.
    async fn token_required(&self) -> Result<String> {
        self.token()
            .await
            .ok_or_else(|| RemoteError::Credential(self.calendar_id.clone()).into())
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let metrics = get_metrics();
        metrics.remote_requests_total.inc();

        let response = request.send().await.map_err(|e| {
            metrics.remote_request_errors_total.inc();
            map_reqwest_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics.remote_request_errors_total.inc();
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()).into())
    }

    async fn send_delete(&self, url: &str, token: &str) -> Result<()> {
        let metrics = get_metrics();
        metrics.remote_requests_total.inc();

        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                metrics.remote_request_errors_total.inc();
                RotaError::from(map_reqwest_error(e))
            })?;

        let status = response.status();
        // Deleting an already-gone event is a success.
        if status.is_success() || status.as_u16() == 404 || status.as_u16() == 410 {
            return Ok(());
        }

        metrics.remote_request_errors_total.inc();
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Http {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    fn draft_to_wire(draft: &EventDraft) -> ProviderEvent {
        ProviderEvent {
            summary: Some(draft.title.clone()),
            description: Some(draft.description.clone()),
            start: Some(ProviderTime::timed(draft.start)),
            end: Some(ProviderTime::timed(draft.end)),
            attendees: if draft.attendees.is_empty() {
                None
            } else {
                Some(
                    draft
                        .attendees
                        .iter()
                        .map(|email| super::types::ProviderAttendee {
                            email: Some(email.clone()),
                        })
                        .collect(),
                )
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl CalendarProvider for HttpCalendarClient {
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let Some(token) = self.token().await else {
            warn!(
                "No credential for calendar {}; treating external calendar as empty",
                self.calendar_id
            );
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.events_url())
                .bearer_auth(&token)
                .query(&[
                    ("timeMin", start.to_rfc3339()),
                    ("timeMax", end.to_rfc3339()),
                    ("maxResults", self.page_size.to_string()),
                ]);
            if let Some(ref cursor) = page_token {
                request = request.query(&[("pageToken", cursor.as_str())]);
            }

            let page: ProviderEventPage = self.send_json(request).await?;
            events.extend(page.items.into_iter().filter_map(normalize_event));

            match page.next_page_token {
                Some(cursor) if !cursor.is_empty() => page_token = Some(cursor),
                _ => break,
            }
        }

        debug!(
            "Fetched {} events from calendar {} for [{}, {})",
            events.len(),
            self.calendar_id,
            start,
            end
        );
        Ok(events)
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent> {
        let token = self.token_required().await?;
        let body = Self::draft_to_wire(draft);

        let raw: ProviderEvent = with_retry("create_event", || {
            let request = self
                .client
                .post(self.events_url())
                .bearer_auth(&token)
                .json(&body);
            self.send_json(request)
        })
        .await?;

        normalize_event(raw)
            .ok_or_else(|| RemoteError::MalformedResponse("unusable created event".to_string()).into())
    }

    async fn update_event(&self, id: &str, draft: &EventDraft) -> Result<CalendarEvent> {
        let token = self.token_required().await?;
        let body = Self::draft_to_wire(draft);
        let url = format!("{}/{}", self.events_url(), id);

        let raw: ProviderEvent = with_retry("update_event", || {
            let request = self.client.put(&url).bearer_auth(&token).json(&body);
            self.send_json(request)
        })
        .await?;

        normalize_event(raw)
            .ok_or_else(|| RemoteError::MalformedResponse("unusable updated event".to_string()).into())
    }

    async fn delete_event(&self, id: &str) -> Result<()> {
        let token = self.token_required().await?;
        let url = format!("{}/{}", self.events_url(), id);

        with_retry("delete_event", || self.send_delete(&url, &token)).await
    }

    async fn is_busy(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        buffer_minutes: i64,
    ) -> Result<bool> {
        let Some(token) = self.token().await else {
            warn!(
                "No credential for calendar {}; free/busy check degrades to free",
                self.calendar_id
            );
            return Ok(false);
        };

        let padded_start = start - Duration::minutes(buffer_minutes.max(0));
        let padded_end = end + Duration::minutes(buffer_minutes.max(0));

        let request = self
            .client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(&token)
            .json(&json!({
                "timeMin": padded_start.to_rfc3339(),
                "timeMax": padded_end.to_rfc3339(),
                "items": [{ "id": self.calendar_id }],
            }));

        let body: ProviderFreeBusy = self.send_json(request).await?;

        let busy = body.busy.iter().any(|interval| {
            let parsed_start = interval
                .start
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            let parsed_end = interval
                .end
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
            match (parsed_start, parsed_end) {
                (Some(s), Some(e)) => {
                    s.with_timezone(&Utc) < padded_end && e.with_timezone(&Utc) > padded_start
                }
                // Malformed intervals are skipped, not fatal.
                _ => false,
            }
        });

        Ok(busy)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unreachable(e.to_string())
    }
}

/// Run a mutating call with bounded exponential backoff.
///
/// Transient failures (network, 5xx) are retried up to three attempts;
/// anything else propagates immediately.
async fn with_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<RotaError> = None;

    for attempt in 0..RETRY_MAX_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(RotaError::Remote(e)) if e.is_transient() => {
                warn!("{} failed (attempt {}): {}", operation, attempt + 1, e);
                last_error = Some(RotaError::Remote(e));
                if attempt + 1 < RETRY_MAX_ATTEMPTS {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(RemoteError::RetriesExhausted {
        attempts: RETRY_MAX_ATTEMPTS,
        last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
    }
    .into())
}
