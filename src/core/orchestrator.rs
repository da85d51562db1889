use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::bridges::health::HealthTracker;
use crate::bridges::ranker::RouteRanker;
use crate::bridges::registry::BackendRegistry;
use crate::bridges::traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind};
use crate::common::validation::parse_positive_amount;
use crate::constants::{
    DEFAULT_ESTIMATE_CACHE_TTL_SECS, DEFAULT_ESTIMATE_TIMEOUT_MS, DEFAULT_HEALTH_CACHE_TTL_SECS,
    DEFAULT_MAX_FALLBACK_ATTEMPTS,
};
use crate::core::performance_tracker::{PerformanceSnapshot, PerformanceTracker};
use crate::monitoring::anomaly::{AnomalyDetector, AnomalyThresholds, MetricsSource};
use crate::strategies::{SelectionStrategy, StrategyKind, StrategyManager, StrategyThresholds};
use crate::types::{BackendHealth, Route, TransferRequest, TransferResult, TransferStage};

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub fallback_enabled: bool,
    /// Fallback hops after the first attempt
    pub max_fallback_attempts: u32,
    pub estimate_timeout: Duration,
    /// Per-attempt deadline on `execute`; `None` leaves bounding to the backend
    pub execute_timeout: Option<Duration>,
    pub health_cache_ttl: Duration,
    pub estimate_cache_ttl: Duration,
    pub thresholds: StrategyThresholds,
    pub enabled_strategies: Vec<StrategyKind>,
    pub anomaly: AnomalyThresholds,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            max_fallback_attempts: DEFAULT_MAX_FALLBACK_ATTEMPTS,
            estimate_timeout: Duration::from_millis(DEFAULT_ESTIMATE_TIMEOUT_MS),
            execute_timeout: None,
            health_cache_ttl: Duration::from_secs(DEFAULT_HEALTH_CACHE_TTL_SECS),
            estimate_cache_ttl: Duration::from_secs(DEFAULT_ESTIMATE_CACHE_TTL_SECS),
            thresholds: StrategyThresholds::default(),
            enabled_strategies: StrategyKind::ALL.to_vec(),
            anomaly: AnomalyThresholds::default(),
        }
    }
}

enum Attempt {
    /// Backend pre-flight check refused the request
    Rejected(TransferResult),
    Finished(TransferResult),
}

/// 크로스체인 브리지 오케스트레이터
///
/// 요청 검증 → 백엔드 선택(라우트 랭킹 + 전략) → 실행 → 실패 시 폴백의
/// 상태 머신을 담당하는 단일 진입점입니다.
#[derive(Debug)]
pub struct BridgeOrchestrator {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    ranker: RouteRanker,
    strategies: StrategyManager,
    performance: PerformanceTracker,
    detector: AnomalyDetector,
    settings: OrchestratorSettings,
}

impl BridgeOrchestrator {
    pub fn new(registry: Arc<BackendRegistry>, settings: OrchestratorSettings) -> Self {
        let health = Arc::new(HealthTracker::new(settings.health_cache_ttl));
        let ranker = RouteRanker::new(Arc::clone(&registry), Arc::clone(&health))
            .with_estimate_cache_ttl(settings.estimate_cache_ttl)
            .with_estimate_timeout(settings.estimate_timeout);
        let strategies = StrategyManager::new(settings.thresholds, &settings.enabled_strategies);
        let detector = AnomalyDetector::new(settings.anomaly.clone());

        info!(
            "🌉 브리지 오케스트레이터 초기화: 백엔드 {}개, 폴백 {} (최대 {}회)",
            registry.len(),
            if settings.fallback_enabled { "활성" } else { "비활성" },
            settings.max_fallback_attempts
        );

        Self {
            registry,
            health,
            ranker,
            strategies,
            performance: PerformanceTracker::new(),
            detector,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health_tracker(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn strategies(&self) -> &StrategyManager {
        &self.strategies
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one transfer end to end. Never panics and never returns an error:
    /// every outcome, including internal faults, is a `TransferResult`.
    pub async fn bridge(&self, request: TransferRequest) -> TransferResult {
        self.run_guarded(request, None).await
    }

    /// Same as [`bridge`](Self::bridge) but with a forced selection strategy
    pub async fn bridge_with_strategy(&self, kind: StrategyKind, request: TransferRequest) -> TransferResult {
        self.run_guarded(request, Some(kind)).await
    }

    /// Synchronous request checks, run before any backend is touched
    pub fn validate_request(&self, request: &TransferRequest) -> BridgeResult<()> {
        if request.transfer_id.trim().is_empty() {
            return Err(BridgeError::invalid_input("Transfer id is required"));
        }
        if request.source_address.trim().is_empty() {
            return Err(BridgeError::invalid_input("Source address is required"));
        }
        if request.destination_address.trim().is_empty() {
            return Err(BridgeError::invalid_input("Destination address is required"));
        }
        if request.amount.trim().is_empty() {
            return Err(BridgeError::invalid_input("Amount is required"));
        }
        if request.parsed_amount().is_none() {
            return Err(BridgeError::invalid_input(format!("Invalid amount: {}", request.amount)));
        }
        if parse_positive_amount(&request.amount).is_none() {
            return Err(BridgeError::invalid_input(format!("Amount must be positive: {}", request.amount)));
        }
        Ok(())
    }

    /// Route preview: every eligible backend, best first
    pub async fn estimate_all_routes(&self, request: &TransferRequest) -> Vec<Route> {
        self.ranker.rank(request).await.routes
    }

    /// Current health of every active backend
    pub async fn get_system_health(&self) -> HashMap<String, BackendHealth> {
        let backends = self.registry.active_backends();
        let lookups = backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            async move {
                let health = self.health.health(backend.as_ref()).await;
                (backend.name().to_string(), health)
            }
        });
        futures::future::join_all(lookups).await.into_iter().collect()
    }

    /// Aggregate metrics with anomaly-derived recommendations
    pub async fn get_performance_metrics(&self) -> PerformanceSnapshot {
        let backends = self.get_system_health().await.into_values().collect();
        let mut snapshot = self.performance.snapshot(backends).await;
        for anomaly in self.detector.detect(&snapshot) {
            warn!("🚨 이상 징후 감지 [{:?}]: {}", anomaly.kind, anomaly.message);
            snapshot.recommendations.push(anomaly.message);
        }
        snapshot
    }

    async fn run_guarded(&self, request: TransferRequest, forced: Option<StrategyKind>) -> TransferResult {
        let started = Instant::now();
        let notifier = request.clone();
        self.performance.record_request().await;

        let outcome = AssertUnwindSafe(self.run(request, forced)).catch_unwind().await;
        let mut result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("💥 오케스트레이터 내부 오류 [{}]: {}", notifier.transfer_id, message);
                TransferResult::failed(
                    notifier.transfer_id.clone(),
                    "",
                    &BridgeError::new(ErrorKind::Unknown, format!("Unexpected orchestrator fault: {}", message)),
                )
            }
        };
        result.transfer_id = notifier.transfer_id.clone();
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        let result = result.normalized();

        if result.success {
            notifier.emit(
                TransferStage::Complete,
                Some(&result.backend),
                serde_json::json!({
                    "dry_run": notifier.dry_run,
                    "source_tx": result.source_tx,
                    "destination_tx": result.destination_tx,
                }),
            );
        } else {
            notifier.emit(
                TransferStage::Failed,
                Some(&result.backend).filter(|b| !b.is_empty()).map(String::as_str),
                serde_json::json!({
                    "error_code": result.error_code,
                    "error": result.error,
                }),
            );
        }
        result
    }

    async fn run(&self, request: TransferRequest, forced: Option<StrategyKind>) -> TransferResult {
        request.emit(
            TransferStage::Validating,
            None,
            serde_json::json!({
                "source_chain": request.source_chain,
                "destination_chain": request.destination_chain,
                "amount": request.amount,
            }),
        );
        if let Err(e) = self.validate_request(&request) {
            warn!("❌ 요청 검증 실패 [{}]: {}", request.transfer_id, e);
            return TransferResult::failed(request.transfer_id.clone(), "", &e);
        }

        request.emit(TransferStage::Selecting, None, serde_json::Value::Null);
        let (backend, strategy) = match self.select(&request, forced).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!("❌ 백엔드 선택 실패 [{}]: {}", request.transfer_id, e);
                let backend = e.backend.clone().unwrap_or_default();
                return TransferResult::failed(request.transfer_id.clone(), backend, &e);
            }
        };

        if request.dry_run {
            info!("🧪 드라이런 [{}]: {} 선택됨", request.transfer_id, backend.name());
            let mut result = TransferResult::completed(request.transfer_id.clone(), backend.name(), None, None);
            result.strategy = strategy.map(|k| k.as_str().to_string());
            return result;
        }

        self.execute_with_fallback(request, backend, strategy).await
    }

    async fn select(
        &self,
        request: &TransferRequest,
        forced: Option<StrategyKind>,
    ) -> BridgeResult<(Arc<dyn BridgeBackend>, Option<StrategyKind>)> {
        if let Some(name) = &request.preferred_backend {
            let backend = self.registry.resolve(name)?;
            if !backend.supports(request.source_chain, request.destination_chain) {
                return Err(
                    BridgeError::unsupported_route(request.source_chain, request.destination_chain).with_backend(name)
                );
            }
            debug!("명시적 백엔드 사용: {}", name);
            return Ok((backend, None));
        }

        let routes = self.ranker.rank_routes(request).await?;
        let strategy = match forced {
            Some(kind) => self
                .strategies
                .get(kind)
                .unwrap_or_else(|| SelectionStrategy::builtin(kind)),
            None => self.strategies.select(request),
        };

        let chosen = strategy
            .choose(&routes)
            .or_else(|| routes.first().cloned())
            .ok_or_else(|| {
                BridgeError::new(ErrorKind::ProtocolUnavailable, "No route available after ranking")
            })?;

        info!(
            "🎯 [{}] {} 전략 → {} (성공률 {:.2}, {}ms)",
            request.transfer_id,
            strategy.kind,
            chosen.backend,
            chosen.success_rate(),
            chosen.estimated_time_ms()
        );
        let backend = self.registry.resolve(&chosen.backend)?;
        Ok((backend, Some(strategy.kind)))
    }

    async fn execute_with_fallback(
        &self,
        request: TransferRequest,
        backend: Arc<dyn BridgeBackend>,
        strategy: Option<StrategyKind>,
    ) -> TransferResult {
        let mut request = request;
        let mut backend = backend;
        let mut failed_from: Option<String> = None;
        let mut last_failure: Option<TransferResult> = None;
        let mut hops = 0u32;

        loop {
            request.emit(
                TransferStage::Executing,
                Some(backend.name()),
                serde_json::json!({ "attempt": hops + 1 }),
            );

            let mut result = match self.attempt(backend.as_ref(), &request).await {
                Attempt::Finished(result) => result,
                Attempt::Rejected(rejection) => match last_failure.take() {
                    // 첫 시도의 사전 검증 실패는 잘못된 요청
                    None => return rejection,
                    Some(previous) => {
                        // 폴백 후보의 거부는 요청 오류가 아님: 후보만 제외
                        warn!(
                            "🔁 폴백 후보 {} 사전 검증 거부, 다음 후보 탐색 [{}]",
                            backend.name(),
                            request.transfer_id
                        );
                        let next_request = request.for_fallback(backend.name());
                        match self.next_candidate(&next_request).await {
                            Some(next) => {
                                backend = next;
                                request = next_request;
                                last_failure = Some(previous);
                                continue;
                            }
                            None => {
                                warn!("🔁 대체 백엔드 없음 [{}]", request.transfer_id);
                                return previous;
                            }
                        }
                    }
                },
            };
            result.strategy = strategy.map(|k| k.as_str().to_string());
            result.fallback_from = failed_from.clone();

            if result.success {
                info!("✅ 전송 완료 [{}] via {}", request.transfer_id, backend.name());
                return result;
            }

            warn!(
                "❌ {} 실행 실패 [{}]: {}",
                backend.name(),
                request.transfer_id,
                result.error.as_deref().unwrap_or("unknown error")
            );

            if !self.settings.fallback_enabled || !request.fallback_allowed {
                debug!("폴백 비활성화, 실패 결과 반환");
                return result;
            }
            if hops >= self.settings.max_fallback_attempts {
                warn!("폴백 한도 도달 ({}회)", hops);
                return result;
            }

            let next_request = request.for_fallback(backend.name());
            let next = match self.next_candidate(&next_request).await {
                Some(next) => next,
                None => {
                    warn!("🔁 대체 백엔드 없음 [{}]", request.transfer_id);
                    return result;
                }
            };

            info!("🔁 폴백: {} → {} [{}]", backend.name(), next.name(), request.transfer_id);
            next_request.emit(
                TransferStage::Retrying,
                Some(next.name()),
                serde_json::json!({
                    "failed_backend": backend.name(),
                    "error_code": result.error_code,
                    "reason": result.error,
                }),
            );
            self.performance.record_fallback().await;

            failed_from = Some(backend.name().to_string());
            last_failure = Some(result);
            backend = next;
            request = next_request;
            hops += 1;
        }
    }

    /// Ranker's recommended backend for a fallback hop
    async fn next_candidate(&self, request: &TransferRequest) -> Option<Arc<dyn BridgeBackend>> {
        let ranking = self.ranker.rank(request).await;
        let name = ranking.recommended()?.backend.clone();
        self.registry.lookup(&name)
    }

    async fn attempt(&self, backend: &dyn BridgeBackend, request: &TransferRequest) -> Attempt {
        let validation = backend.validate(request);
        if !validation.valid {
            let reason = validation
                .error
                .unwrap_or_else(|| format!("{} rejected the request", backend.name()));
            warn!("❌ {} 사전 검증 실패: {}", backend.name(), reason);
            let error = BridgeError::invalid_input(reason).with_backend(backend.name());
            return Attempt::Rejected(TransferResult::failed(
                request.transfer_id.clone(),
                backend.name(),
                &error,
            ));
        }

        let started = Instant::now();
        let outcome = self.invoke(backend, request).await;
        let elapsed = started.elapsed();

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => TransferResult::failed(request.transfer_id.clone(), backend.name(), &e)
                .with_fallback_suggestion(format!("{} hit an unexpected error", backend.name())),
        };
        result.transfer_id = request.transfer_id.clone();
        result.backend = backend.name().to_string();
        let result = result.normalized();

        if result.success {
            self.health.record_success(backend, elapsed).await;
            self.performance.record_success(elapsed).await;
        } else {
            let kind = result.error_code.unwrap_or(ErrorKind::Unknown);
            self.health.record_failure(backend, kind).await;
            self.performance.record_failure(kind).await;
        }
        Attempt::Finished(result)
    }

    /// `execute` with panic containment and the optional deadline
    async fn invoke(&self, backend: &dyn BridgeBackend, request: &TransferRequest) -> BridgeResult<TransferResult> {
        let guarded = AssertUnwindSafe(backend.execute(request)).catch_unwind();
        let outcome = match self.settings.execute_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("⏰ {} 실행 타임아웃 ({:?})", backend.name(), deadline);
                    return Err(BridgeError::new(
                        ErrorKind::TransactionTimeout,
                        format!("{} did not finish within {}s", backend.name(), deadline.as_secs_f64()),
                    )
                    .with_backend(backend.name()));
                }
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                error!("💥 {} 예상치 못한 오류: {}", backend.name(), e);
                Err(BridgeError::new(ErrorKind::Unknown, e.to_string())
                    .with_backend(backend.name())
                    .with_details(serde_json::json!({ "raised": e.kind.as_str() })))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("💥 {} 패닉: {}", backend.name(), message);
                Err(BridgeError::new(ErrorKind::Unknown, format!("Backend panicked: {}", message))
                    .with_backend(backend.name()))
            }
        }
    }
}

#[async_trait]
impl MetricsSource for BridgeOrchestrator {
    async fn performance_snapshot(&self) -> PerformanceSnapshot {
        self.get_performance_metrics().await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
