use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::bridges::traits::ErrorKind;
use crate::constants::{STATUS_DEGRADED_RATE, STATUS_GOOD_RATE, STATUS_OPTIMAL_RATE};
use crate::types::BackendHealth;

/// Overall system status band
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Optimal,
    Good,
    Degraded,
    Critical,
}

impl SystemStatus {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= STATUS_OPTIMAL_RATE {
            SystemStatus::Optimal
        } else if rate >= STATUS_GOOD_RATE {
            SystemStatus::Good
        } else if rate >= STATUS_DEGRADED_RATE {
            SystemStatus::Degraded
        } else {
            SystemStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Optimal => "optimal",
            SystemStatus::Good => "good",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub status: SystemStatus,
    /// Successful execution attempts / all execution attempts
    pub overall_success_rate: f64,
    /// Execution attempts across all backends
    pub total_transfers: u64,
    pub total_failures: u64,
    /// Mean duration of successful attempts
    pub avg_time_ms: f64,
    /// `bridge()` calls, including ones rejected before execution
    pub requests: u64,
    pub fallbacks: u64,
    pub errors_by_kind: HashMap<String, u64>,
    pub backends: Vec<BackendHealth>,
    pub recommendations: Vec<String>,
    pub uptime_secs: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct TransferStats {
    requests: u64,
    attempts: u64,
    failures: u64,
    fallbacks: u64,
    success_time_ms: f64,
    errors_by_kind: HashMap<ErrorKind, u64>,
}

/// 전송 성능 추적기
///
/// 실행 시도 단위의 성공/실패, 소요 시간, 오류 종류별 횟수를 누적합니다.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    stats: Arc<RwLock<TransferStats>>,
    start_time: Instant,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(TransferStats::default())),
            start_time: Instant::now(),
        }
    }

    pub async fn record_request(&self) {
        self.stats.write().await.requests += 1;
    }

    pub async fn record_success(&self, elapsed: Duration) {
        let mut stats = self.stats.write().await;
        stats.attempts += 1;
        stats.success_time_ms += elapsed.as_secs_f64() * 1000.0;
    }

    pub async fn record_failure(&self, kind: ErrorKind) {
        let mut stats = self.stats.write().await;
        stats.attempts += 1;
        stats.failures += 1;
        *stats.errors_by_kind.entry(kind).or_insert(0) += 1;
        debug!("실패 기록: {} (누적 {})", kind, stats.failures);
    }

    pub async fn record_fallback(&self) {
        self.stats.write().await.fallbacks += 1;
    }

    /// Snapshot without recommendations; `backends` is the health list to embed
    pub async fn snapshot(&self, mut backends: Vec<BackendHealth>) -> PerformanceSnapshot {
        let stats = self.stats.read().await.clone();

        let successes = stats.attempts - stats.failures;
        let overall_success_rate = if stats.attempts == 0 {
            1.0
        } else {
            successes as f64 / stats.attempts as f64
        };
        let avg_time_ms = if successes == 0 {
            0.0
        } else {
            stats.success_time_ms / successes as f64
        };

        backends.sort_by(|a, b| a.backend.cmp(&b.backend));
        let recommendations = backends
            .iter()
            .filter(|h| !h.is_healthy())
            .map(|h| {
                format!(
                    "Backend {} is unhealthy ({:.1}% success rate, {} consecutive failures); consider disabling it",
                    h.backend,
                    h.success_rate * 100.0,
                    h.consecutive_failures
                )
            })
            .collect();

        PerformanceSnapshot {
            status: SystemStatus::from_success_rate(overall_success_rate),
            overall_success_rate,
            total_transfers: stats.attempts,
            total_failures: stats.failures,
            avg_time_ms,
            requests: stats.requests,
            fallbacks: stats.fallbacks,
            errors_by_kind: stats
                .errors_by_kind
                .iter()
                .map(|(kind, count)| (kind.as_str().to_string(), *count))
                .collect(),
            backends,
            recommendations,
            uptime_secs: self.start_time.elapsed().as_secs(),
            generated_at: Utc::now(),
        }
    }

    pub async fn reset(&self) {
        *self.stats.write().await = TransferStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bands() {
        assert_eq!(SystemStatus::from_success_rate(1.0), SystemStatus::Optimal);
        assert_eq!(SystemStatus::from_success_rate(0.95), SystemStatus::Optimal);
        assert_eq!(SystemStatus::from_success_rate(0.90), SystemStatus::Good);
        assert_eq!(SystemStatus::from_success_rate(0.70), SystemStatus::Degraded);
        assert_eq!(SystemStatus::from_success_rate(0.69), SystemStatus::Critical);
    }

    #[tokio::test]
    async fn test_no_traffic_is_optimal() {
        let tracker = PerformanceTracker::new();
        let snapshot = tracker.snapshot(Vec::new()).await;
        assert_eq!(snapshot.status, SystemStatus::Optimal);
        assert_eq!(snapshot.total_transfers, 0);
        assert_eq!(snapshot.avg_time_ms, 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_aggregates_attempts() {
        let tracker = PerformanceTracker::new();
        tracker.record_success(Duration::from_millis(1_000)).await;
        tracker.record_success(Duration::from_millis(3_000)).await;
        tracker.record_failure(ErrorKind::NetworkError).await;
        tracker.record_failure(ErrorKind::NetworkError).await;

        let mut sick = BackendHealth::new("wormhole").with_profile(0.5, 1_000.0);
        sick.consecutive_failures = 2;
        let snapshot = tracker.snapshot(vec![sick, BackendHealth::new("cctp")]).await;

        assert_eq!(snapshot.total_transfers, 4);
        assert_eq!(snapshot.total_failures, 2);
        assert!((snapshot.overall_success_rate - 0.5).abs() < 1e-9);
        assert!((snapshot.avg_time_ms - 2_000.0).abs() < 1e-6);
        assert_eq!(snapshot.status, SystemStatus::Critical);
        assert_eq!(snapshot.errors_by_kind["NETWORK_ERROR"], 2);
        assert_eq!(snapshot.backends[0].backend, "cctp");
        assert_eq!(snapshot.recommendations.len(), 1);
        assert!(snapshot.recommendations[0].contains("wormhole"));
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let tracker = PerformanceTracker::new();
        tracker.record_request().await;
        tracker.record_failure(ErrorKind::TransactionFailed).await;
        tracker.record_fallback().await;
        tracker.record_success(Duration::from_millis(500)).await;

        tracker.reset().await;
        let snapshot = tracker.snapshot(Vec::new()).await;

        assert_eq!(snapshot.total_transfers, 0);
        assert_eq!(snapshot.total_failures, 0);
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.fallbacks, 0);
        assert!(snapshot.errors_by_kind.is_empty());
        assert_eq!(snapshot.status, SystemStatus::Optimal);
    }
}
