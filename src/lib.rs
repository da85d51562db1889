// Cross-chain bridge orchestration library

pub mod bridges;
pub mod common;
pub mod config;
pub mod constants;
pub mod core;
pub mod mocks;
pub mod monitoring;
pub mod strategies;
pub mod types;

// Re-exports for convenience
pub use bridges::{BackendRegistry, BridgeBackend, BridgeError, BridgeResult, ErrorKind, HealthTracker, RouteRanker};
pub use config::Config;
pub use core::{BridgeOrchestrator, OrchestratorSettings, PerformanceSnapshot};
pub use monitoring::{AnomalyDetector, MonitoringManager};
pub use strategies::{SelectionStrategy, StrategyKind, StrategyManager};
pub use types::*;
