// Health tracking
pub const HEALTH_EMA_ALPHA: f64 = 0.2;
pub const HEALTHY_MIN_SUCCESS_RATE: f64 = 0.7;
pub const HEALTHY_MAX_CONSECUTIVE_FAILURES: u32 = 5;
pub const DEFAULT_HEALTH_CACHE_TTL_SECS: u64 = 60;

// Route ranking
pub const RANKING_TIE_BAND: f64 = 0.10;
pub const DEFAULT_ESTIMATE_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_ESTIMATE_TIMEOUT_MS: u64 = 10_000;

// Strategy priorities (higher wins)
pub const PRIORITY_DEFAULT: u32 = 100;
pub const PRIORITY_COST: u32 = 150;
pub const PRIORITY_PERFORMANCE: u32 = 200;
pub const PRIORITY_SECURITY: u32 = 250;
pub const PRIORITY_RELIABILITY: u32 = 300;

// Strategy floors
pub const PERFORMANCE_MIN_SUCCESS_RATE: f64 = 0.85;
pub const SECURITY_MIN_SUCCESS_RATE: f64 = 0.95;
pub const SECURITY_MAX_CONSECUTIVE_FAILURES: u32 = 2;

// Default amount thresholds (source asset units)
pub const DEFAULT_SMALL_TRANSFER_THRESHOLD: &str = "1000";
pub const DEFAULT_HIGH_VALUE_THRESHOLD: &str = "10000";

// Anomaly detection
pub const ANOMALY_SPIKE_MAX_SUCCESS_RATE: f64 = 0.8;
pub const ANOMALY_MIN_SUCCESS_RATE: f64 = 0.7;
pub const ANOMALY_BACKEND_MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const ANOMALY_BACKEND_LATENCY_FACTOR: f64 = 2.0;
pub const DEFAULT_FAILURE_SPIKE_THRESHOLD: u64 = 5;
pub const DEFAULT_LATENCY_CEILING_MS: f64 = 600_000.0; // 10 minutes
pub const DEFAULT_ANOMALY_INTERVAL_SECS: u64 = 60;
pub const ANOMALY_HISTORY_LIMIT: usize = 100;

// System status bands
pub const STATUS_OPTIMAL_RATE: f64 = 0.95;
pub const STATUS_GOOD_RATE: f64 = 0.85;
pub const STATUS_DEGRADED_RATE: f64 = 0.70;

// Orchestrator
pub const DEFAULT_MAX_FALLBACK_ATTEMPTS: u32 = 1;
pub const DEFAULT_API_PORT: u16 = 9090;
