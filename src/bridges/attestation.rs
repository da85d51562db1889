use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::traits::{BridgeError, BridgeResult, ErrorKind};

/// State of an off-chain attestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AttestationStatus {
    Pending,
    Complete { attestation: String },
}

/// Remote service producing attestations/proofs for a backend.
/// The payload is opaque to the orchestration core.
#[async_trait]
pub trait AttestationSource: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, message_id: &str) -> BridgeResult<AttestationStatus>;
}

/// Bounded exponential backoff for attestation polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 20,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given (0-based) attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let delay = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay as u64)
    }
}

/// Poll `source` until the attestation is complete or the policy is exhausted.
///
/// Network errors count as an attempt and polling continues; any other
/// error aborts immediately.
pub async fn poll_attestation(
    source: &dyn AttestationSource,
    message_id: &str,
    policy: &BackoffPolicy,
) -> BridgeResult<String> {
    for attempt in 0..policy.max_attempts {
        match source.fetch(message_id).await {
            Ok(AttestationStatus::Complete { attestation }) => {
                debug!("📜 어테스테이션 수신: {} (시도 {})", message_id, attempt + 1);
                return Ok(attestation);
            }
            Ok(AttestationStatus::Pending) => {
                debug!("⏳ 어테스테이션 대기 중: {} (시도 {})", message_id, attempt + 1);
            }
            Err(e) if e.kind == ErrorKind::NetworkError => {
                warn!("어테스테이션 조회 실패, 재시도: {}", e);
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }

    Err(BridgeError::new(
        ErrorKind::AttestationTimeout,
        format!(
            "Attestation for {} not ready after {} attempts",
            message_id, policy.max_attempts
        ),
    ))
}

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    status: String,
    attestation: Option<String>,
}

/// Attestation service reached over HTTP: `GET {base}/attestations/{id}`
#[derive(Debug, Clone)]
pub struct HttpAttestationSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAttestationSource {
    pub fn new(base_url: impl Into<String>) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BridgeError::new(ErrorKind::InitializationFailed, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn attestation_url(&self, message_id: &str) -> String {
        format!("{}/attestations/{}", self.base_url, message_id)
    }

    fn parse(body: AttestationResponse) -> AttestationStatus {
        match (body.status.to_ascii_lowercase().as_str(), body.attestation) {
            ("complete", Some(attestation)) if !attestation.is_empty() => {
                AttestationStatus::Complete { attestation }
            }
            _ => AttestationStatus::Pending,
        }
    }
}

#[async_trait]
impl AttestationSource for HttpAttestationSource {
    async fn fetch(&self, message_id: &str) -> BridgeResult<AttestationStatus> {
        let url = self.attestation_url(message_id);

        let mut headers = header::HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = format!("Bearer {}", api_key)
                .parse()
                .map_err(|_| BridgeError::new(ErrorKind::InitializationFailed, "Invalid API key header"))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| BridgeError::new(ErrorKind::NetworkError, format!("Attestation request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // 아직 인덱싱되지 않은 메시지
            return Ok(AttestationStatus::Pending);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::new(
                ErrorKind::NetworkError,
                format!("Attestation API error {}: {}", status, text),
            ));
        }

        let body: AttestationResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::new(ErrorKind::NetworkError, format!("Malformed attestation response: {}", e)))?;
        Ok(Self::parse(body))
    }
}

/// In-memory attestation service that completes after a fixed number of polls
#[derive(Debug, Default)]
pub struct MockAttestationSource {
    ready_after: u32,
    polls: Mutex<HashMap<String, u32>>,
}

impl MockAttestationSource {
    pub fn new(ready_after: u32) -> Self {
        Self {
            ready_after,
            polls: Mutex::new(HashMap::new()),
        }
    }

    /// Polls so far for a message that has not completed yet
    pub fn polls_for(&self, message_id: &str) -> u32 {
        self.polls
            .lock()
            .map(|polls| polls.get(message_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Messages still waiting for an attestation
    pub fn in_flight(&self) -> usize {
        self.polls.lock().map(|polls| polls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AttestationSource for MockAttestationSource {
    async fn fetch(&self, message_id: &str) -> BridgeResult<AttestationStatus> {
        let mut polls = self
            .polls
            .lock()
            .map_err(|_| BridgeError::new(ErrorKind::Unknown, "attestation mock poisoned"))?;
        let count = polls.entry(message_id.to_string()).or_insert(0);
        *count += 1;

        if *count > self.ready_after {
            polls.remove(message_id);
            Ok(AttestationStatus::Complete {
                attestation: format!("0x{}", hex::encode(message_id.as_bytes())),
            })
        } else {
            Ok(AttestationStatus::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 4,
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_poll_until_complete() {
        let source = MockAttestationSource::new(2);
        let attestation = poll_attestation(&source, "msg-1", &fast_policy(5)).await.unwrap();

        assert_eq!(attestation, format!("0x{}", hex::encode("msg-1")));
        assert_eq!(source.polls_for("msg-1"), 0);
        assert_eq!(source.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_completed_messages_are_forgotten() {
        let source = MockAttestationSource::new(1);

        assert_eq!(source.fetch("a").await.unwrap(), AttestationStatus::Pending);
        assert_eq!(source.fetch("b").await.unwrap(), AttestationStatus::Pending);
        assert_eq!(source.in_flight(), 2);

        assert!(matches!(source.fetch("a").await.unwrap(), AttestationStatus::Complete { .. }));
        assert_eq!(source.in_flight(), 1);
        assert_eq!(source.polls_for("b"), 1);

        // a fresh message with a reused id starts counting again
        assert_eq!(source.fetch("a").await.unwrap(), AttestationStatus::Pending);
        assert_eq!(source.polls_for("a"), 1);
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let source = MockAttestationSource::new(10);
        let err = poll_attestation(&source, "msg-2", &fast_policy(3)).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::AttestationTimeout);
        assert_eq!(source.polls_for("msg-2"), 3);
    }

    #[test]
    fn test_http_response_parsing() {
        let complete: AttestationResponse =
            serde_json::from_str(r#"{"status":"complete","attestation":"0xabc"}"#).unwrap();
        assert_eq!(
            HttpAttestationSource::parse(complete),
            AttestationStatus::Complete { attestation: "0xabc".to_string() }
        );

        let pending: AttestationResponse =
            serde_json::from_str(r#"{"status":"pending_confirmations","attestation":null}"#).unwrap();
        assert_eq!(HttpAttestationSource::parse(pending), AttestationStatus::Pending);
    }

    #[test]
    fn test_attestation_url() {
        let source = HttpAttestationSource::new("https://iris.example.com/v1/").unwrap();
        assert_eq!(
            source.attestation_url("0xdead"),
            "https://iris.example.com/v1/attestations/0xdead"
        );
    }
}
