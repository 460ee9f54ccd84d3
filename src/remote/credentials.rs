//! Short-lived credential cache with single-flight refresh.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::CredentialConfig;
use crate::error::{RemoteError, Result, RotaError};
use crate::metrics::get_metrics;

use super::{backoff_delay, RETRY_MAX_ATTEMPTS};

/// A cached access credential.
///
/// Replaced wholesale on refresh, never mutated field by field.
#[derive(Debug, Clone)]
pub struct CachedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The upstream exchange that trades configuration for a bearer token.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self, subject: &str) -> Result<CachedCredential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2-style client-credentials exchange against a token endpoint.
pub struct HttpCredentialExchange {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpCredentialExchange {
    pub fn new(config: &CredentialConfig) -> Result<Self> {
        let client_secret = config
            .client_secret
            .clone()
            .or_else(|| std::env::var("ROTA_CLIENT_SECRET").ok())
            .unwrap_or_default();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Unreachable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret,
        })
    }
}

#[async_trait]
impl CredentialExchange for HttpCredentialExchange {
    async fn exchange(&self, subject: &str) -> Result<CachedCredential> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", subject),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteError::Timeout
                } else {
                    RemoteError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;

        Ok(CachedCredential {
            token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Option<CachedCredential>>>;

struct RefresherInner {
    exchange: Arc<dyn CredentialExchange>,
    cache: RwLock<HashMap<String, CachedCredential>>,
    in_flight: Mutex<HashMap<String, RefreshFuture>>,
    safety_buffer: Duration,
}

/// Keeps the external calendar connection alive without blocking request
/// paths.
///
/// State machine per subject: empty, then refreshing, then cached until
/// `expires_at - safety_buffer`, then refreshing again. Concurrent callers for
/// the same subject share one in-flight refresh; availability checks fan
/// out into several external calls at once and must not trigger a refresh
/// stampede.
#[derive(Clone)]
pub struct CredentialRefresher {
    inner: Arc<RefresherInner>,
}

impl CredentialRefresher {
    pub fn new(exchange: Arc<dyn CredentialExchange>, safety_buffer_secs: i64) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                exchange,
                cache: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                safety_buffer: Duration::seconds(safety_buffer_secs.max(0)),
            }),
        }
    }

    /// A token valid for at least the safety buffer, refreshing if needed.
    ///
    /// Returns `None` when the refresh fails after retries; callers decide
    /// whether that degrades (reads) or fails loudly (writes).
    pub async fn get_valid_token(&self, subject: &str) -> Option<String> {
        let now = Utc::now();
        {
            let cache = self.inner.cache.read().await;
            if let Some(cred) = cache.get(subject) {
                if cred.expires_at - self.inner.safety_buffer > now {
                    return Some(cred.token.clone());
                }
            }
        }

        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(subject) {
                Some(existing) => existing.clone(),
                None => {
                    let fut: RefreshFuture =
                        run_refresh(self.inner.clone(), subject.to_string())
                            .boxed()
                            .shared();
                    in_flight.insert(subject.to_string(), fut.clone());
                    fut
                }
            }
        };

        let result = refresh.await;
        // Cleared once the refresh settles, success or failure.
        self.inner.in_flight.lock().await.remove(subject);
        result.map(|c| c.token)
    }

    /// Drop a cached credential, forcing the next caller to refresh.
    pub async fn invalidate(&self, subject: &str) {
        self.inner.cache.write().await.remove(subject);
        debug!("Evicted cached credential for subject: {}", subject);
    }
}

async fn run_refresh(inner: Arc<RefresherInner>, subject: String) -> Option<CachedCredential> {
    let metrics = get_metrics();
    metrics.credential_refreshes_total.inc();

    for attempt in 0..RETRY_MAX_ATTEMPTS {
        match inner.exchange.exchange(&subject).await {
            Ok(credential) => {
                inner
                    .cache
                    .write()
                    .await
                    .insert(subject.clone(), credential.clone());
                debug!(
                    "Refreshed credential for {} (valid until {})",
                    subject, credential.expires_at
                );
                return Some(credential);
            }
            Err(RotaError::Remote(e)) if e.is_transient() => {
                warn!(
                    "Credential refresh for {} failed (attempt {}): {}",
                    subject,
                    attempt + 1,
                    e
                );
                if attempt + 1 < RETRY_MAX_ATTEMPTS {
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
            Err(e) => {
                warn!("Credential refresh for {} rejected: {}", subject, e);
                break;
            }
        }
    }

    metrics.credential_refresh_failures_total.inc();
    inner.cache.write().await.remove(&subject);
    None
}
