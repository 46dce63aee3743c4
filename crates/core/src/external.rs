//! Optional outbound integrations.
//!
//! Both clients are best-effort by contract: the caller must treat any
//! error as a signal to fall back to the deterministic path. The model
//! service gets one bounded attempt; the narrative service gets at most
//! one retry with linear backoff plus a TTL response cache keyed by a
//! content fingerprint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::domain::deal::DealContext;
use crate::domain::recommendation::RecommendationResult;
use crate::errors::ApplicationError;

pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_NARRATIVE_RETRIES: u32 = 1;
pub const DEFAULT_NARRATIVE_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_NARRATIVE_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// A remotely hosted scoring model. Implementations must be cheap to call
/// and honest about failure; there is no retry on this path.
pub trait ModelService: Send + Sync {
    fn score_deal(&self, deal: &DealContext) -> Result<RecommendationResult, ApplicationError>;
}

pub struct HttpModelService {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpModelService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ApplicationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self { endpoint: endpoint.into(), client })
    }
}

impl ModelService for HttpModelService {
    fn score_deal(&self, deal: &DealContext) -> Result<RecommendationResult, ApplicationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(deal)
            .send()
            .map_err(|error| ApplicationError::ExternalService(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApplicationError::ExternalService(format!(
                "model service returned {status}"
            )));
        }

        response
            .json::<RecommendationResult>()
            .map_err(|error| ApplicationError::ExternalService(error.to_string()))
    }
}

/// Turns a recommendation into seller-facing prose.
pub trait NarrativeGenerator: Send + Sync {
    fn narrative(&self, recommendation: &RecommendationResult) -> Result<String, ApplicationError>;
}

/// TTL cache for narrative responses. Entries are only ever removed by
/// expiry; a stale hit behaves exactly like a miss.
pub struct NarrativeCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl NarrativeCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .get(key)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn put(&self, key: String, value: String) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|_, (inserted, _)| inserted.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

/// Stable fingerprint of the recommendation content; identical
/// recommendations share a cache slot across requests.
pub fn narrative_fingerprint(recommendation: &RecommendationResult) -> String {
    let payload = serde_json::to_vec(recommendation).unwrap_or_default();
    blake3::hash(&payload).to_hex().to_string()
}

#[derive(Debug, Deserialize)]
struct NarrativeResponse {
    narrative: String,
}

pub struct HttpNarrativeClient {
    endpoint: String,
    api_key: Option<SecretString>,
    client: reqwest::blocking::Client,
    cache: NarrativeCache,
    max_retries: u32,
    backoff: Duration,
}

impl HttpNarrativeClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        cache_ttl: Duration,
    ) -> Result<Self, ApplicationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
            cache: NarrativeCache::new(cache_ttl),
            max_retries: DEFAULT_NARRATIVE_RETRIES,
            backoff: DEFAULT_NARRATIVE_BACKOFF,
        })
    }

    fn request_once(
        &self,
        recommendation: &RecommendationResult,
    ) -> Result<String, NarrativeAttemptError> {
        let mut request = self.client.post(&self.endpoint).json(recommendation);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().map_err(|error| NarrativeAttemptError::Fatal(error.to_string()))?;
        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(NarrativeAttemptError::Retryable(format!(
                "narrative service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(NarrativeAttemptError::Fatal(format!(
                "narrative service returned {status}"
            )));
        }

        response
            .json::<NarrativeResponse>()
            .map(|body| body.narrative)
            .map_err(|error| NarrativeAttemptError::Fatal(error.to_string()))
    }
}

enum NarrativeAttemptError {
    Retryable(String),
    Fatal(String),
}

impl NarrativeGenerator for HttpNarrativeClient {
    fn narrative(&self, recommendation: &RecommendationResult) -> Result<String, ApplicationError> {
        let fingerprint = narrative_fingerprint(recommendation);
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "narrative cache hit");
            return Ok(cached);
        }

        let mut attempt = 0;
        loop {
            match self.request_once(recommendation) {
                Ok(narrative) => {
                    self.cache.put(fingerprint, narrative.clone());
                    return Ok(narrative);
                }
                Err(NarrativeAttemptError::Retryable(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, reason = %message, "narrative request retrying");
                    std::thread::sleep(self.backoff * attempt);
                }
                Err(NarrativeAttemptError::Retryable(message))
                | Err(NarrativeAttemptError::Fatal(message)) => {
                    return Err(ApplicationError::ExternalService(message));
                }
            }
        }
    }
}
