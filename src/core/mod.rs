pub mod orchestrator;
pub mod performance_tracker;

pub use orchestrator::{BridgeOrchestrator, OrchestratorSettings};
pub use performance_tracker::{PerformanceSnapshot, PerformanceTracker, SystemStatus};
