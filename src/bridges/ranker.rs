use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use super::health::HealthTracker;
use super::registry::BackendRegistry;
use super::traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind};
use crate::constants::{DEFAULT_ESTIMATE_CACHE_TTL_SECS, DEFAULT_ESTIMATE_TIMEOUT_MS, RANKING_TIE_BAND};
use crate::types::{ChainId, Route, TransferEstimate, TransferRequest};

/// (backend, source, destination, amount bucket)
type EstimateKey = (String, ChainId, ChainId, u32);

#[derive(Debug, Clone)]
struct CachedEstimate {
    estimate: TransferEstimate,
    /// Amount the estimate was quoted for
    quoted_amount: Option<Decimal>,
    cached_at: Instant,
}

impl CachedEstimate {
    /// Cached quote restated for `amount`; fee and output scale with the amount
    fn for_amount(&self, amount: Option<Decimal>) -> TransferEstimate {
        let mut estimate = self.estimate.clone();
        if let (Some(quoted), Some(amount)) = (self.quoted_amount, amount) {
            if quoted > Decimal::ZERO && quoted != amount {
                let ratio = amount / quoted;
                estimate.fee = self.estimate.fee * ratio;
                estimate.amount_out = self.estimate.amount_out.map(|out| out * ratio);
            }
        }
        estimate
    }
}

/// Decimal order of magnitude of an amount; amounts below 10 share bucket 0
pub fn amount_bucket(amount: Decimal) -> u32 {
    let mut value = amount.abs().trunc();
    let mut bucket = 0;
    while value >= Decimal::TEN {
        value /= Decimal::TEN;
        bucket += 1;
    }
    bucket
}

/// Output of one ranking pass
#[derive(Debug, Clone, Default)]
pub struct RouteRanking {
    /// Ranked routes, best first
    pub routes: Vec<Route>,
    /// Backends whose `supports` held for the pair
    pub supported: Vec<String>,
    /// Backends dropped because their estimate failed or timed out
    pub failed: Vec<(String, ErrorKind)>,
}

impl RouteRanking {
    pub fn recommended(&self) -> Option<&Route> {
        self.routes.iter().find(|r| r.recommended)
    }

    pub fn is_unsupported(&self) -> bool {
        self.supported.is_empty()
    }

    /// Routes, or the error the orchestrator reports when there are none
    pub fn into_routes(self, request: &TransferRequest) -> BridgeResult<Vec<Route>> {
        if self.supported.is_empty() {
            return Err(BridgeError::unsupported_route(request.source_chain, request.destination_chain));
        }
        if self.routes.is_empty() {
            return Err(BridgeError::new(
                ErrorKind::ProtocolUnavailable,
                format!(
                    "No backend could quote {} -> {} ({} supporting, all estimates failed)",
                    request.source_chain,
                    request.destination_chain,
                    self.supported.len()
                ),
            )
            .with_details(serde_json::json!({
                "supported": self.supported,
                "failed": self.failed.iter().map(|(name, kind)| (name.clone(), kind.as_str())).collect::<Vec<_>>(),
            })));
        }
        Ok(self.routes)
    }
}

/// 라우트 랭커
///
/// 요청 체인 쌍을 지원하는 모든 백엔드에 동시에 견적을 요청하고
/// 헬스 스냅샷과 합쳐 정렬된 후보 목록을 만듭니다.
/// - 성공률 내림차순, 0.10 이내 차이는 동률
/// - 동률 구간 안에서는 예상 시간 오름차순
/// - 견적 실패/타임아웃 백엔드는 제외 (전체 실패 아님)
#[derive(Debug)]
pub struct RouteRanker {
    registry: Arc<BackendRegistry>,
    health: Arc<HealthTracker>,
    estimate_cache: DashMap<EstimateKey, CachedEstimate>,
    estimate_cache_ttl: Duration,
    estimate_timeout: Duration,
}

impl RouteRanker {
    pub fn new(registry: Arc<BackendRegistry>, health: Arc<HealthTracker>) -> Self {
        Self {
            registry,
            health,
            estimate_cache: DashMap::new(),
            estimate_cache_ttl: Duration::from_secs(DEFAULT_ESTIMATE_CACHE_TTL_SECS),
            estimate_timeout: Duration::from_millis(DEFAULT_ESTIMATE_TIMEOUT_MS),
        }
    }

    pub fn with_estimate_cache_ttl(mut self, ttl: Duration) -> Self {
        self.estimate_cache_ttl = ttl;
        self
    }

    pub fn with_estimate_timeout(mut self, estimate_timeout: Duration) -> Self {
        self.estimate_timeout = estimate_timeout;
        self
    }

    /// Rank every eligible backend for `request`
    pub async fn rank(&self, request: &TransferRequest) -> RouteRanking {
        let (src, dst) = (request.source_chain, request.destination_chain);

        let candidates: Vec<Arc<dyn BridgeBackend>> = self
            .registry
            .active_backends()
            .into_iter()
            .filter(|backend| !request.is_excluded(backend.name()))
            .filter(|backend| backend.supports(src, dst))
            .collect();

        let supported: Vec<String> = candidates.iter().map(|b| b.name().to_string()).collect();
        if candidates.is_empty() {
            debug!("지원 백엔드 없음: {} -> {}", src, dst);
            return RouteRanking::default();
        }

        debug!("🔍 {}개 백엔드에서 견적 조회: {} -> {}", candidates.len(), src, dst);

        let bucket = request.parsed_amount().map(amount_bucket).unwrap_or(0);
        let futures = candidates.iter().map(|backend| {
            let backend = Arc::clone(backend);
            async move {
                let (estimate, health) = tokio::join!(
                    self.cached_estimate(backend.as_ref(), request, bucket),
                    self.health.health(backend.as_ref())
                );
                (backend, estimate, health)
            }
        });
        let results = futures::future::join_all(futures).await;

        let mut routes = Vec::with_capacity(results.len());
        let mut failed = Vec::new();
        for (backend, estimate, health) in results {
            match estimate {
                Ok(estimate) => routes.push(Route {
                    backend: backend.name().to_string(),
                    estimate,
                    health,
                    asset_representation: backend.asset_representation(),
                    recommended: false,
                    reason: String::new(),
                }),
                Err(e) => {
                    warn!("⚠️ {} 견적 실패, 라우트 제외: {}", backend.name(), e);
                    failed.push((backend.name().to_string(), e.kind));
                }
            }
        }

        let routes = annotate(order_routes(routes));
        if let Some(best) = routes.first() {
            info!(
                "🧭 {} -> {} 라우트 {}개, 추천: {} (성공률 {:.2}, {}ms)",
                src,
                dst,
                routes.len(),
                best.backend,
                best.success_rate(),
                best.estimated_time_ms()
            );
        }

        RouteRanking {
            routes,
            supported,
            failed,
        }
    }

    /// Ranked routes, or `UnsupportedRoute` / `ProtocolUnavailable`
    pub async fn rank_routes(&self, request: &TransferRequest) -> BridgeResult<Vec<Route>> {
        self.rank(request).await.into_routes(request)
    }

    pub fn clear_estimates(&self) {
        self.estimate_cache.clear();
    }

    async fn cached_estimate(
        &self,
        backend: &dyn BridgeBackend,
        request: &TransferRequest,
        bucket: u32,
    ) -> BridgeResult<TransferEstimate> {
        let key: EstimateKey = (
            backend.name().to_string(),
            request.source_chain,
            request.destination_chain,
            bucket,
        );

        let amount = request.parsed_amount();
        if let Some(cached) = self.estimate_cache.get(&key) {
            if cached.cached_at.elapsed() < self.estimate_cache_ttl {
                return Ok(cached.for_amount(amount));
            }
        }

        let mut estimate = match timeout(self.estimate_timeout, backend.estimate(request)).await {
            Ok(Ok(estimate)) => estimate,
            Ok(Err(e)) => {
                return Err(BridgeError::new(ErrorKind::EstimationFailed, e.message)
                    .with_backend(backend.name())
                    .with_details(serde_json::json!({ "cause": e.kind.as_str() })))
            }
            Err(_) => {
                warn!("⏰ {} 견적 타임아웃 ({:?})", backend.name(), self.estimate_timeout);
                return Err(BridgeError::new(
                    ErrorKind::EstimationFailed,
                    format!("Estimate timed out after {}ms", self.estimate_timeout.as_millis()),
                )
                .with_backend(backend.name()));
            }
        };
        estimate.backend = backend.name().to_string();

        self.estimate_cache.insert(
            key,
            CachedEstimate {
                estimate: estimate.clone(),
                quoted_amount: amount,
                cached_at: Instant::now(),
            },
        );
        Ok(estimate)
    }
}

fn by_rate_desc(a: &Route, b: &Route) -> Ordering {
    b.success_rate()
        .partial_cmp(&a.success_rate())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.backend.cmp(&b.backend))
}

/// Tie-band ordering.
///
/// Routes are sorted by success rate; each band starts at the best route not
/// yet placed and takes every following route less than 0.10 below it. Inside
/// a band routes are ordered by estimated time, then name.
pub fn order_routes(mut routes: Vec<Route>) -> Vec<Route> {
    routes.sort_by(by_rate_desc);

    let mut ordered = Vec::with_capacity(routes.len());
    while !routes.is_empty() {
        let leader = routes[0].success_rate();
        let split = routes
            .iter()
            .position(|r| leader - r.success_rate() >= RANKING_TIE_BAND)
            .unwrap_or(routes.len());

        let mut band: Vec<Route> = routes.drain(..split).collect();
        band.sort_by(|a, b| {
            a.estimated_time_ms()
                .cmp(&b.estimated_time_ms())
                .then_with(|| a.backend.cmp(&b.backend))
        });
        ordered.extend(band);
    }
    ordered
}

fn annotate(mut routes: Vec<Route>) -> Vec<Route> {
    for (index, route) in routes.iter_mut().enumerate() {
        route.recommended = index == 0;
        route.reason = if index == 0 {
            format!(
                "Recommended: {:.1}% success rate, ~{}s",
                route.success_rate() * 100.0,
                route.estimated_time_ms() / 1000
            )
        } else {
            format!(
                "Alternative #{}: {:.1}% success rate, ~{}s, fee {} {}",
                index,
                route.success_rate() * 100.0,
                route.estimated_time_ms() / 1000,
                route.estimate.fee,
                route.estimate.fee_asset
            )
        };
    }
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::StubBackend;
    use std::str::FromStr;

    const PAIR: (ChainId, ChainId) = (ChainId::Ethereum, ChainId::Base);

    fn stub(name: &str, rate: f64, time_ms: u64) -> StubBackend {
        StubBackend::new(name).with_pairs(&[PAIR]).with_profile(rate, time_ms)
    }

    fn ranker_with(backends: Vec<StubBackend>) -> RouteRanker {
        let registry = Arc::new(BackendRegistry::new());
        for backend in backends {
            let name = backend.name().to_string();
            registry.register(name, Arc::new(backend));
        }
        RouteRanker::new(registry, Arc::new(HealthTracker::default()))
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::new(
            PAIR.0,
            PAIR.1,
            "0x1111111111111111111111111111111111111111",
            "0x2222222222222222222222222222222222222222",
            amount,
        )
    }

    #[test]
    fn test_amount_bucket() {
        let bucket = |s: &str| amount_bucket(Decimal::from_str(s).unwrap());
        assert_eq!(bucket("0.5"), 0);
        assert_eq!(bucket("9.99"), 0);
        assert_eq!(bucket("10"), 1);
        assert_eq!(bucket("50"), 1);
        assert_eq!(bucket("50000"), 4);
    }

    #[tokio::test]
    async fn test_tied_routes_order_by_time() {
        let ranker = ranker_with(vec![
            stub("slow", 0.99, 60_000),
            stub("fast", 0.96, 5_000),
            stub("flaky", 0.50, 1_000),
        ]);

        let routes = ranker.rank_routes(&request("50")).await.unwrap();
        let names: Vec<&str> = routes.iter().map(|r| r.backend.as_str()).collect();

        assert_eq!(names, vec!["fast", "slow", "flaky"]);
        assert!(routes[0].recommended);
        assert!(routes.iter().skip(1).all(|r| !r.recommended));
    }

    #[tokio::test]
    async fn test_band_starts_at_best_unplaced_route() {
        // 0.95 / 0.90 동률, 0.84는 새 구간 (0.90과는 0.10 미만이어도)
        let ranker = ranker_with(vec![
            stub("a", 0.95, 9_000),
            stub("b", 0.90, 1_000),
            stub("c", 0.84, 100),
        ]);

        let routes = ranker.rank_routes(&request("50")).await.unwrap();
        let names: Vec<&str> = routes.iter().map(|r| r.backend.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_unsupported_pair_yields_no_routes() {
        let ranker = ranker_with(vec![stub("cctp", 0.99, 1_000)]);
        let other = TransferRequest::new(ChainId::Solana, ChainId::Stacks, "a", "b", "10");

        let ranking = ranker.rank(&other).await;
        assert!(ranking.is_unsupported());
        assert!(ranking.routes.is_empty());
        assert_eq!(
            ranking.into_routes(&other).unwrap_err().kind,
            ErrorKind::UnsupportedRoute
        );
    }

    #[tokio::test]
    async fn test_failed_estimate_excludes_route() {
        let ranker = ranker_with(vec![
            stub("broken", 0.99, 1_000).with_failing_estimate(ErrorKind::NetworkError),
            stub("ok", 0.90, 5_000),
        ]);

        let ranking = ranker.rank(&request("50")).await;
        assert_eq!(ranking.routes.len(), 1);
        assert_eq!(ranking.routes[0].backend, "ok");
        assert_eq!(ranking.failed, vec![("broken".to_string(), ErrorKind::EstimationFailed)]);
    }

    #[tokio::test]
    async fn test_hanging_estimate_is_bounded() {
        let ranker = ranker_with(vec![
            stub("hung", 0.99, 1_000).with_estimate_delay(Duration::from_secs(30)),
            stub("ok", 0.90, 5_000),
        ])
        .with_estimate_timeout(Duration::from_millis(50));

        let routes = ranker.rank_routes(&request("50")).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].backend, "ok");
    }

    #[tokio::test]
    async fn test_all_estimates_failing_is_unavailable() {
        let ranker = ranker_with(vec![stub("broken", 0.99, 1_000).with_failing_estimate(ErrorKind::NetworkError)]);
        let err = ranker.rank_routes(&request("50")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolUnavailable);
    }

    #[tokio::test]
    async fn test_ranking_is_idempotent_and_cached() {
        let registry = Arc::new(BackendRegistry::new());
        let a = Arc::new(stub("a", 0.96, 5_000));
        let b = Arc::new(stub("b", 0.99, 60_000));
        registry.register("a", a.clone());
        registry.register("b", b.clone());
        let ranker = RouteRanker::new(registry, Arc::new(HealthTracker::default()));

        let first = ranker.rank_routes(&request("50")).await.unwrap();
        let second = ranker.rank_routes(&request("70")).await.unwrap();

        let order = |routes: &[Route]| routes.iter().map(|r| r.backend.clone()).collect::<Vec<_>>();
        assert_eq!(order(&first), order(&second));
        // 같은 버킷은 캐시 사용
        assert_eq!(a.estimate_calls(), 1);
        assert_eq!(b.estimate_calls(), 1);

        ranker.rank_routes(&request("5000")).await.unwrap();
        assert_eq!(a.estimate_calls(), 2);
    }

    #[tokio::test]
    async fn test_cached_estimate_tracks_requested_amount() {
        use crate::mocks::{BackendProfile, SimulatedBackend};

        let profile = BackendProfile {
            name: "bps".to_string(),
            chains: vec![PAIR.0, PAIR.1],
            fee_bps: 100,
            base_time_ms: 5_000,
            success_probability: 1.0,
            asset_representation: Default::default(),
            min_amount: Decimal::ZERO,
            attestation: false,
            stage_delay_ms: 1,
        };
        let registry = Arc::new(BackendRegistry::new());
        registry.register("bps", Arc::new(SimulatedBackend::new(profile)));
        let ranker = RouteRanker::new(registry, Arc::new(HealthTracker::default()));

        let small = ranker.rank_routes(&request("10")).await.unwrap();
        assert_eq!(small[0].estimate.fee, Decimal::from_str("0.10").unwrap());
        assert_eq!(small[0].estimate.amount_out, Some(Decimal::from_str("9.90").unwrap()));

        let large = ranker.rank_routes(&request("99")).await.unwrap();
        assert_eq!(large[0].estimate.fee, Decimal::from_str("0.99").unwrap());
        assert_eq!(large[0].estimate.amount_out, Some(Decimal::from_str("98.01").unwrap()));
        assert_eq!(large[0].estimated_time_ms(), 5_000);

        ranker.clear_estimates();
        let fresh = ranker.rank_routes(&request("99")).await.unwrap();
        assert_eq!(fresh[0].estimate.fee, large[0].estimate.fee);
        assert_eq!(fresh[0].estimate.amount_out, large[0].estimate.amount_out);
    }

    #[tokio::test]
    async fn test_excluded_and_disabled_backends_are_skipped() {
        let registry = Arc::new(BackendRegistry::new());
        registry.register("a", Arc::new(stub("a", 0.96, 5_000)));
        registry.register("b", Arc::new(stub("b", 0.99, 60_000)));
        registry.register("c", Arc::new(stub("c", 0.99, 30_000)));
        registry.disable("c");
        assert!(registry.is_disabled("c"));
        let ranker = RouteRanker::new(registry, Arc::new(HealthTracker::default()));

        let retry = request("50").for_fallback("a");
        let routes = ranker.rank_routes(&retry).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].backend, "b");
    }
}
