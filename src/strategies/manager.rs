use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info};

use super::selection::{SelectionStrategy, StrategyKind, StrategyThresholds};
use crate::types::TransferRequest;

#[derive(Debug, Clone)]
pub struct StrategyStats {
    pub selections: u64,
    pub last_selected: Option<Instant>,
}

/// 선택 전략 관리자
///
/// 요청에 적용 가능한 전략 중 우선순위가 가장 높은 전략을 고릅니다.
/// Default 전략은 항상 등록되어 있으므로 선택은 실패하지 않습니다.
#[derive(Debug)]
pub struct StrategyManager {
    /// 우선순위 내림차순
    strategies: Vec<SelectionStrategy>,
    thresholds: StrategyThresholds,
    stats: DashMap<StrategyKind, StrategyStats>,
}

impl Default for StrategyManager {
    fn default() -> Self {
        Self::new(StrategyThresholds::default(), &StrategyKind::ALL)
    }
}

impl StrategyManager {
    /// Built-in strategies for `enabled`; Default is always included
    pub fn new(thresholds: StrategyThresholds, enabled: &[StrategyKind]) -> Self {
        let mut manager = Self {
            strategies: Vec::new(),
            thresholds,
            stats: DashMap::new(),
        };

        manager.register(SelectionStrategy::default_strategy());
        for kind in enabled.iter().copied().filter(|k| *k != StrategyKind::Default) {
            manager.register(SelectionStrategy::builtin(kind));
        }

        info!(
            "🎯 선택 전략 {}개 활성화: {}",
            manager.strategies.len(),
            manager.strategies.iter().map(|s| s.kind.as_str()).collect::<Vec<_>>().join(", ")
        );
        manager
    }

    /// Add or replace a strategy
    pub fn register(&mut self, strategy: SelectionStrategy) {
        self.strategies.retain(|s| s.kind != strategy.kind);
        self.strategies.push(strategy);
        self.strategies.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn thresholds(&self) -> &StrategyThresholds {
        &self.thresholds
    }

    /// Highest-priority applicable strategy
    pub fn select(&self, request: &TransferRequest) -> SelectionStrategy {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.is_applicable(request, &self.thresholds))
            .cloned()
            .unwrap_or_else(SelectionStrategy::default_strategy);

        debug!("전략 선택: {} (금액 {})", strategy.kind, request.amount);
        self.record_selection(strategy.kind);
        strategy
    }

    /// Strategy by kind, when enabled
    pub fn get(&self, kind: StrategyKind) -> Option<SelectionStrategy> {
        let strategy = self.strategies.iter().find(|s| s.kind == kind).cloned();
        if strategy.is_some() {
            self.record_selection(kind);
        }
        strategy
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind).collect()
    }

    pub fn stats(&self) -> HashMap<StrategyKind, StrategyStats> {
        self.stats.iter().map(|e| (*e.key(), e.value().clone())).collect()
    }

    fn record_selection(&self, kind: StrategyKind) {
        let mut entry = self.stats.entry(kind).or_insert(StrategyStats {
            selections: 0,
            last_selected: None,
        });
        entry.selections += 1;
        entry.last_selected = Some(Instant::now());
    }
}
