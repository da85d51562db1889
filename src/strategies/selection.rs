use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bridges::traits::{BridgeError, ErrorKind};
use crate::constants::{
    DEFAULT_HIGH_VALUE_THRESHOLD, DEFAULT_SMALL_TRANSFER_THRESHOLD, PERFORMANCE_MIN_SUCCESS_RATE, PRIORITY_COST,
    PRIORITY_DEFAULT, PRIORITY_PERFORMANCE, PRIORITY_RELIABILITY, PRIORITY_SECURITY,
    SECURITY_MAX_CONSECUTIVE_FAILURES, SECURITY_MIN_SUCCESS_RATE,
};
use crate::core::BridgeOrchestrator;
use crate::types::{Route, TransferRequest, TransferResult};

/// Built-in selection goals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Default,
    Performance,
    Reliability,
    Cost,
    Security,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Default,
        StrategyKind::Performance,
        StrategyKind::Reliability,
        StrategyKind::Cost,
        StrategyKind::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Default => "default",
            StrategyKind::Performance => "performance",
            StrategyKind::Reliability => "reliability",
            StrategyKind::Cost => "cost",
            StrategyKind::Security => "security",
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            StrategyKind::Default => PRIORITY_DEFAULT,
            StrategyKind::Cost => PRIORITY_COST,
            StrategyKind::Performance => PRIORITY_PERFORMANCE,
            StrategyKind::Security => PRIORITY_SECURITY,
            StrategyKind::Reliability => PRIORITY_RELIABILITY,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| BridgeError::new(ErrorKind::Unknown, format!("Unknown strategy: {}", s)))
    }
}

/// Amount thresholds that decide strategy applicability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyThresholds {
    pub small_transfer: Decimal,
    pub high_value: Decimal,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self {
            small_transfer: Decimal::from_str(DEFAULT_SMALL_TRANSFER_THRESHOLD).unwrap_or(Decimal::ONE_THOUSAND),
            high_value: Decimal::from_str(DEFAULT_HIGH_VALUE_THRESHOLD)
                .unwrap_or_else(|_| Decimal::ONE_THOUSAND * Decimal::TEN),
        }
    }
}

pub type ApplicabilityFn = Arc<dyn Fn(&TransferRequest, &StrategyThresholds) -> bool + Send + Sync>;
pub type ChooseFn = Arc<dyn Fn(&[Route]) -> Option<Route> + Send + Sync>;

/// A selection policy expressed as data: priority, applicability predicate
/// and a chooser over ranked routes.
#[derive(Clone)]
pub struct SelectionStrategy {
    pub kind: StrategyKind,
    pub priority: u32,
    applicable: ApplicabilityFn,
    choose: ChooseFn,
}

impl std::fmt::Debug for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStrategy")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish()
    }
}

impl SelectionStrategy {
    pub fn new(kind: StrategyKind, priority: u32, applicable: ApplicabilityFn, choose: ChooseFn) -> Self {
        Self {
            kind,
            priority,
            applicable,
            choose,
        }
    }

    pub fn is_applicable(&self, request: &TransferRequest, thresholds: &StrategyThresholds) -> bool {
        (self.applicable)(request, thresholds)
    }

    /// Pick one of the ranked routes (best first)
    pub fn choose(&self, routes: &[Route]) -> Option<Route> {
        (self.choose)(routes)
    }

    /// Run the transfer through the orchestrator with this strategy's pick
    pub async fn execute(&self, orchestrator: &BridgeOrchestrator, request: TransferRequest) -> TransferResult {
        orchestrator.bridge_with_strategy(self.kind, request).await
    }

    pub fn builtin(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Default => Self::default_strategy(),
            StrategyKind::Performance => Self::performance(),
            StrategyKind::Reliability => Self::reliability(),
            StrategyKind::Cost => Self::cost(),
            StrategyKind::Security => Self::security(),
        }
    }

    /// Always applicable; takes the ranker's recommendation
    pub fn default_strategy() -> Self {
        Self::new(
            StrategyKind::Default,
            PRIORITY_DEFAULT,
            Arc::new(|_: &TransferRequest, _: &StrategyThresholds| true),
            Arc::new(|routes: &[Route]| routes.first().cloned()),
        )
    }

    /// Small transfers: fastest route among those above 0.85 success rate
    pub fn performance() -> Self {
        Self::new(
            StrategyKind::Performance,
            PRIORITY_PERFORMANCE,
            Arc::new(|request: &TransferRequest, thresholds: &StrategyThresholds| {
                request
                    .parsed_amount()
                    .map_or(false, |amount| amount <= thresholds.small_transfer)
            }),
            Arc::new(|routes: &[Route]| {
                routes
                    .iter()
                    .filter(|r| r.success_rate() > PERFORMANCE_MIN_SUCCESS_RATE)
                    .min_by_key(|r| r.estimated_time_ms())
                    .or_else(|| routes.first())
                    .cloned()
            }),
        )
    }

    /// Mid-size transfers: highest success rate regardless of time
    pub fn reliability() -> Self {
        Self::new(
            StrategyKind::Reliability,
            PRIORITY_RELIABILITY,
            Arc::new(|request: &TransferRequest, thresholds: &StrategyThresholds| {
                request.parsed_amount().map_or(false, |amount| {
                    amount > thresholds.small_transfer && amount <= thresholds.high_value
                })
            }),
            Arc::new(|routes: &[Route]| most_reliable(routes.iter()).cloned()),
        )
    }

    /// Always applicable; lowest quoted fee
    pub fn cost() -> Self {
        Self::new(
            StrategyKind::Cost,
            PRIORITY_COST,
            Arc::new(|_: &TransferRequest, _: &StrategyThresholds| true),
            Arc::new(|routes: &[Route]| routes.iter().min_by_key(|r| r.estimate.fee).cloned()),
        )
    }

    /// High-value transfers: strict reliability floor on native assets,
    /// otherwise the most reliable route
    pub fn security() -> Self {
        Self::new(
            StrategyKind::Security,
            PRIORITY_SECURITY,
            Arc::new(|request: &TransferRequest, thresholds: &StrategyThresholds| {
                request
                    .parsed_amount()
                    .map_or(false, |amount| amount > thresholds.high_value)
            }),
            Arc::new(|routes: &[Route]| {
                let secure = routes.iter().filter(|r| {
                    r.success_rate() > SECURITY_MIN_SUCCESS_RATE
                        && r.health.consecutive_failures < SECURITY_MAX_CONSECUTIVE_FAILURES
                        && r.uses_native_asset()
                });
                most_reliable(secure)
                    .or_else(|| most_reliable(routes.iter()))
                    .cloned()
            }),
        )
    }
}

/// Highest success rate; the earliest (best ranked) wins ties
fn most_reliable<'a>(routes: impl Iterator<Item = &'a Route>) -> Option<&'a Route> {
    routes.min_by(|a, b| {
        b.success_rate()
            .partial_cmp(&a.success_rate())
            .unwrap_or(Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetRepresentation, BackendHealth, ChainId, TransferEstimate};
    use chrono::Utc;

    fn route(name: &str, rate: f64, time_ms: u64, fee: i64) -> Route {
        Route {
            backend: name.to_string(),
            estimate: TransferEstimate {
                backend: name.to_string(),
                fee: Decimal::from(fee),
                fee_asset: "USDC".to_string(),
                estimated_time_ms: time_ms,
                amount_out: None,
                quoted_at: Utc::now(),
            },
            health: BackendHealth::new(name).with_profile(rate, time_ms as f64),
            asset_representation: AssetRepresentation::Native,
            recommended: false,
            reason: String::new(),
        }
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::new(ChainId::Ethereum, ChainId::Base, "0xa", "0xb", amount)
    }

    #[test]
    fn test_applicability_bands() {
        let t = StrategyThresholds::default();
        let perf = SelectionStrategy::performance();
        let rel = SelectionStrategy::reliability();
        let sec = SelectionStrategy::security();

        assert!(perf.is_applicable(&request("50"), &t));
        assert!(perf.is_applicable(&request("1000"), &t));
        assert!(!perf.is_applicable(&request("1000.01"), &t));

        assert!(rel.is_applicable(&request("5000"), &t));
        assert!(!rel.is_applicable(&request("50000"), &t));

        assert!(sec.is_applicable(&request("50000"), &t));
        assert!(!sec.is_applicable(&request("10000"), &t));

        assert!(SelectionStrategy::default_strategy().is_applicable(&request("abc"), &t));
        assert!(!perf.is_applicable(&request("abc"), &t));
    }

    #[test]
    fn test_performance_picks_fastest_healthy() {
        let routes = vec![route("slow", 0.99, 60_000, 1), route("fast", 0.96, 5_000, 1), route("flaky", 0.5, 100, 1)];
        let chosen = SelectionStrategy::performance().choose(&routes).unwrap();
        assert_eq!(chosen.backend, "fast");
    }

    #[test]
    fn test_performance_without_healthy_routes_uses_recommended() {
        let routes = vec![route("a", 0.80, 60_000, 1), route("b", 0.60, 100, 1)];
        let chosen = SelectionStrategy::performance().choose(&routes).unwrap();
        assert_eq!(chosen.backend, "a");
    }

    #[test]
    fn test_cost_picks_cheapest_keeping_rank_order_on_ties() {
        let routes = vec![route("a", 0.9, 1, 5), route("b", 0.9, 1, 2), route("c", 0.9, 1, 2)];
        assert_eq!(SelectionStrategy::cost().choose(&routes).unwrap().backend, "b");
    }

    #[test]
    fn test_security_filters_wrapped_and_unstable() {
        let mut wrapped = route("wrapped", 0.999, 1_000, 1);
        wrapped.asset_representation = AssetRepresentation::Wrapped;
        let mut unstable = route("unstable", 0.99, 1_000, 1);
        unstable.health.consecutive_failures = 2;
        let routes = vec![wrapped, unstable, route("solid", 0.97, 90_000, 1)];

        assert_eq!(SelectionStrategy::security().choose(&routes).unwrap().backend, "solid");
    }

    #[test]
    fn test_security_falls_back_to_most_reliable() {
        let routes = vec![route("a", 0.90, 1_000, 1), route("b", 0.94, 90_000, 1)];
        assert_eq!(SelectionStrategy::security().choose(&routes).unwrap().backend, "b");
    }

    #[test]
    fn test_empty_routes_choose_nothing() {
        for kind in StrategyKind::ALL {
            assert!(SelectionStrategy::builtin(kind).choose(&[]).is_none());
        }
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Security".parse::<StrategyKind>().unwrap(), StrategyKind::Security);
        assert!("fastest".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Reliability.priority(), 300);
    }
}
