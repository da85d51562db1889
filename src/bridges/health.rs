use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::traits::{BridgeBackend, ErrorKind};
use crate::constants::{DEFAULT_HEALTH_CACHE_TTL_SECS, HEALTH_EMA_ALPHA};
use crate::types::BackendHealth;

/// One observed execution outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Success { elapsed: Duration },
    Failure { kind: ErrorKind },
}

/// 백엔드별 상태 슬롯. 슬롯 단위 Mutex로 같은 백엔드의 업데이트를 직렬화합니다.
#[derive(Debug)]
struct HealthSlot {
    health: BackendHealth,
    /// 오케스트레이터가 실제 결과를 한 번이라도 기록했는지
    observed: bool,
}

#[derive(Debug, Clone)]
struct CachedHealth {
    health: BackendHealth,
    cached_at: Instant,
}

/// 브리지 백엔드 헬스 추적기
///
/// 실행 결과마다 성공률(EMA), 평균 완료 시간, 연속 실패 횟수를 갱신합니다.
/// - 결과 기록 전에는 백엔드 자체 보고값을 사용
/// - 조회 결과는 짧은 TTL로 캐시하고 새 결과가 기록되면 즉시 무효화
#[derive(Debug)]
pub struct HealthTracker {
    slots: DashMap<String, Arc<Mutex<HealthSlot>>>,
    cache: DashMap<String, CachedHealth>,
    cache_ttl: Duration,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_HEALTH_CACHE_TTL_SECS))
    }
}

/// `rate' = rate + α·(outcome − rate)`
pub fn ema(current: f64, observation: f64) -> f64 {
    (current + HEALTH_EMA_ALPHA * (observation - current)).clamp(0.0, 1.0)
}

impl HealthTracker {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            cache: DashMap::new(),
            cache_ttl,
        }
    }

    /// 캐시된 헬스 조회 (라우트 랭킹용)
    pub async fn health(&self, backend: &dyn BridgeBackend) -> BackendHealth {
        let name = backend.name();

        if let Some(cached) = self.cache.get(name) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                return cached.health.clone();
            }
        }

        let slot = self.slot(backend).await;
        let mut guard = slot.lock().await;
        if !guard.observed {
            // 아직 관측값이 없으면 자체 보고값을 다시 반영
            guard.health = self_report(backend).await;
        }
        let health = guard.health.clone();

        self.cache.insert(
            name.to_string(),
            CachedHealth {
                health: health.clone(),
                cached_at: Instant::now(),
            },
        );
        health
    }

    /// 실행 결과 기록. 갱신된 스냅샷을 반환합니다.
    pub async fn record(&self, backend: &dyn BridgeBackend, outcome: Outcome) -> BackendHealth {
        let slot = self.slot(backend).await;
        let mut guard = slot.lock().await;
        let now = Utc::now();
        let health = &mut guard.health;

        health.total_attempts += 1;
        match outcome {
            Outcome::Success { elapsed } => {
                let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
                health.success_rate = ema(health.success_rate, 1.0);
                health.avg_completion_time_ms = if health.avg_completion_time_ms <= 0.0 {
                    elapsed_ms
                } else {
                    health.avg_completion_time_ms + HEALTH_EMA_ALPHA * (elapsed_ms - health.avg_completion_time_ms)
                };
                health.consecutive_failures = 0;
                health.last_success = Some(now);
                debug!(
                    "💚 {} 성공 기록: 성공률 {:.3}, 평균 {:.0}ms",
                    health.backend, health.success_rate, health.avg_completion_time_ms
                );
            }
            Outcome::Failure { kind } => {
                health.success_rate = ema(health.success_rate, 0.0);
                health.consecutive_failures += 1;
                health.total_failures += 1;
                health.last_error = Some(kind);
                health.last_failure = Some(now);
                warn!(
                    "💔 {} 실패 기록 ({}): 성공률 {:.3}, 연속 실패 {}",
                    health.backend, kind, health.success_rate, health.consecutive_failures
                );
            }
        }
        guard.observed = true;
        let snapshot = guard.health.clone();

        // 슬롯 잠금 중에 무효화해서 다음 조회가 새 값을 보도록 함
        self.cache.remove(backend.name());
        snapshot
    }

    pub async fn record_success(&self, backend: &dyn BridgeBackend, elapsed: Duration) -> BackendHealth {
        self.record(backend, Outcome::Success { elapsed }).await
    }

    pub async fn record_failure(&self, backend: &dyn BridgeBackend, kind: ErrorKind) -> BackendHealth {
        self.record(backend, Outcome::Failure { kind }).await
    }

    /// 캐시를 거치지 않은 현재 상태 (이미 추적 중인 백엔드만)
    pub async fn snapshot(&self, name: &str) -> Option<BackendHealth> {
        let slot = self.slots.get(name).map(|s| Arc::clone(s.value()))?;
        let guard = slot.lock().await;
        Some(guard.health.clone())
    }

    /// 추적 중인 모든 백엔드 상태
    pub async fn all(&self) -> HashMap<String, BackendHealth> {
        let slots: Vec<(String, Arc<Mutex<HealthSlot>>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut result = HashMap::with_capacity(slots.len());
        for (name, slot) in slots {
            result.insert(name, slot.lock().await.health.clone());
        }
        result
    }

    pub async fn is_healthy(&self, backend: &dyn BridgeBackend) -> bool {
        self.health(backend).await.is_healthy()
    }

    /// 관리자용: 특정 백엔드 상태 초기화
    pub fn reset(&self, name: &str) {
        self.slots.remove(name);
        self.cache.remove(name);
        info!("🔄 헬스 상태 초기화: {}", name);
    }

    pub fn reset_all(&self) {
        self.slots.clear();
        self.cache.clear();
        info!("🔄 전체 헬스 상태 초기화");
    }

    async fn slot(&self, backend: &dyn BridgeBackend) -> Arc<Mutex<HealthSlot>> {
        if let Some(slot) = self.slots.get(backend.name()) {
            return Arc::clone(slot.value());
        }

        // 맵 잠금 밖에서 자체 보고값 조회
        let initial = self_report(backend).await;
        self.slots
            .entry(backend.name().to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HealthSlot {
                    health: initial,
                    observed: false,
                }))
            })
            .value()
            .clone()
    }
}

async fn self_report(backend: &dyn BridgeBackend) -> BackendHealth {
    let mut health = backend.health().await;
    health.backend = backend.name().to_string();
    health.success_rate = health.success_rate.clamp(0.0, 1.0);
    health
}
