pub mod anomaly;
pub mod manager;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyKind, AnomalyThresholds, MetricsSource};
pub use manager::MonitoringManager;
