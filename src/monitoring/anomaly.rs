use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::constants::{
    ANOMALY_BACKEND_LATENCY_FACTOR, ANOMALY_BACKEND_MAX_CONSECUTIVE_FAILURES, ANOMALY_HISTORY_LIMIT,
    ANOMALY_MIN_SUCCESS_RATE, ANOMALY_SPIKE_MAX_SUCCESS_RATE, DEFAULT_ANOMALY_INTERVAL_SECS,
    DEFAULT_FAILURE_SPIKE_THRESHOLD, DEFAULT_LATENCY_CEILING_MS,
};
use crate::core::performance_tracker::PerformanceSnapshot;

/// Anything that can produce the aggregate metrics snapshot
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn performance_snapshot(&self) -> PerformanceSnapshot;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    FailureSpike,
    LatencyRegression,
    SuccessRateAnomaly,
    BackendAnomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub backend: Option<String>,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}

impl Anomaly {
    fn new(kind: AnomalyKind, backend: Option<&str>, message: String) -> Self {
        Self {
            kind,
            backend: backend.map(str::to_string),
            message,
            detected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Failures above this count (with a low success rate) are a spike
    pub failure_spike: u64,
    pub latency_ceiling_ms: f64,
    pub interval_secs: u64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            failure_spike: DEFAULT_FAILURE_SPIKE_THRESHOLD,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
            interval_secs: DEFAULT_ANOMALY_INTERVAL_SECS,
        }
    }
}

/// 이상 징후 탐지기
///
/// 집계 스냅샷을 주기적으로 검사해 실패 급증, 지연 증가, 성공률 저하,
/// 백엔드별 이상을 찾습니다. 탐지 결과는 로그와 권고 사항으로만 남기며
/// 백엔드를 자동으로 비활성화하지 않습니다.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
    history: Arc<RwLock<VecDeque<Anomaly>>>,
    is_running: Arc<RwLock<bool>>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyThresholds::default())
    }
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self {
            thresholds,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(ANOMALY_HISTORY_LIMIT))),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Pure detection over one snapshot
    pub fn detect(&self, snapshot: &PerformanceSnapshot) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let rate = snapshot.overall_success_rate;

        if snapshot.total_failures > self.thresholds.failure_spike && rate < ANOMALY_SPIKE_MAX_SUCCESS_RATE {
            anomalies.push(Anomaly::new(
                AnomalyKind::FailureSpike,
                None,
                format!(
                    "Failure spike: {} failed transfers, overall success rate {:.1}%",
                    snapshot.total_failures,
                    rate * 100.0
                ),
            ));
        }

        if snapshot.avg_time_ms > self.thresholds.latency_ceiling_ms {
            anomalies.push(Anomaly::new(
                AnomalyKind::LatencyRegression,
                None,
                format!(
                    "Latency regression: average transfer time {:.0}s exceeds {:.0}s",
                    snapshot.avg_time_ms / 1000.0,
                    self.thresholds.latency_ceiling_ms / 1000.0
                ),
            ));
        }

        if rate < ANOMALY_MIN_SUCCESS_RATE {
            anomalies.push(Anomaly::new(
                AnomalyKind::SuccessRateAnomaly,
                None,
                format!("Overall success rate {:.1}% is below 70%", rate * 100.0),
            ));
        }

        for health in &snapshot.backends {
            if health.success_rate < ANOMALY_MIN_SUCCESS_RATE
                && health.consecutive_failures > ANOMALY_BACKEND_MAX_CONSECUTIVE_FAILURES
            {
                anomalies.push(Anomaly::new(
                    AnomalyKind::BackendAnomaly,
                    Some(&health.backend),
                    format!(
                        "Backend {} failing: {:.1}% success rate, {} consecutive failures",
                        health.backend,
                        health.success_rate * 100.0,
                        health.consecutive_failures
                    ),
                ));
            } else if snapshot.avg_time_ms > 0.0
                && health.avg_completion_time_ms > ANOMALY_BACKEND_LATENCY_FACTOR * snapshot.avg_time_ms
            {
                anomalies.push(Anomaly::new(
                    AnomalyKind::BackendAnomaly,
                    Some(&health.backend),
                    format!(
                        "Backend {} is slow: {:.0}s average vs {:.0}s system-wide",
                        health.backend,
                        health.avg_completion_time_ms / 1000.0,
                        snapshot.avg_time_ms / 1000.0
                    ),
                ));
            }
        }

        anomalies
    }

    /// One detection pass: fetch, detect, log, remember
    pub async fn check(&self, source: &dyn MetricsSource) -> Vec<Anomaly> {
        let snapshot = source.performance_snapshot().await;
        let anomalies = self.detect(&snapshot);

        if anomalies.is_empty() {
            debug!("이상 징후 없음 (상태: {})", snapshot.status);
            return anomalies;
        }

        let mut history = self.history.write().await;
        for anomaly in &anomalies {
            warn!("🚨 이상 징후 감지 [{:?}]: {}", anomaly.kind, anomaly.message);
            if history.len() == ANOMALY_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(anomaly.clone());
        }
        anomalies
    }

    /// Most recent anomalies, oldest first
    pub async fn history(&self) -> Vec<Anomaly> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Spawn the fixed-interval detection loop
    pub async fn start(&self, source: Arc<dyn MetricsSource>) -> Result<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            warn!("⚠️ 이상 징후 탐지기가 이미 실행 중입니다");
            return Ok(());
        }
        *is_running = true;
        drop(is_running);

        let detector = self.clone();
        let period = Duration::from_secs(self.thresholds.interval_secs.max(1));
        info!("🔎 이상 징후 탐지 시작 (주기 {}초)", period.as_secs());

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // 첫 tick은 즉시 완료되므로 건너뜀
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !detector.is_running().await {
                    break;
                }
                detector.check(source.as_ref()).await;
            }
            debug!("이상 징후 탐지 루프 종료");
        });
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        *self.is_running.write().await = false;
        info!("⏹️ 이상 징후 탐지 중지");
        Ok(())
    }
}
