use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::core::OrchestratorSettings;
use crate::mocks::BackendProfile;
use crate::monitoring::AnomalyThresholds;
use crate::strategies::{StrategyKind, StrategyThresholds};

/// Environment variable prefix; `BRIDGE__ORCHESTRATOR__FALLBACK_ENABLED=false`
pub const ENV_PREFIX: &str = "BRIDGE";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub health: HealthConfig,
    pub routing: RoutingConfig,
    pub strategies: StrategiesConfig,
    pub monitoring: MonitoringConfig,
    pub backends: Vec<BackendProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub fallback_enabled: bool,
    pub max_fallback_attempts: u32,
    pub estimate_timeout_ms: u64,
    /// 실행 단계 타임아웃 (없으면 백엔드에 위임)
    pub execute_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub estimate_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub small_transfer_threshold: String,
    pub high_value_threshold: String,
    pub enabled: Vec<StrategyKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub anomaly_interval_secs: u64,
    pub failure_spike_threshold: u64,
    pub latency_ceiling_ms: f64,
    pub api_port: u16,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            health: HealthConfig::default(),
            routing: RoutingConfig::default(),
            strategies: StrategiesConfig::default(),
            monitoring: MonitoringConfig::default(),
            backends: BackendProfile::defaults(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            max_fallback_attempts: DEFAULT_MAX_FALLBACK_ATTEMPTS,
            estimate_timeout_ms: DEFAULT_ESTIMATE_TIMEOUT_MS,
            execute_timeout_secs: None,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_HEALTH_CACHE_TTL_SECS,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            estimate_cache_ttl_secs: DEFAULT_ESTIMATE_CACHE_TTL_SECS,
        }
    }
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            small_transfer_threshold: DEFAULT_SMALL_TRANSFER_THRESHOLD.to_string(),
            high_value_threshold: DEFAULT_HIGH_VALUE_THRESHOLD.to_string(),
            enabled: StrategyKind::ALL.to_vec(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            anomaly_interval_secs: DEFAULT_ANOMALY_INTERVAL_SECS,
            failure_spike_threshold: DEFAULT_FAILURE_SPIKE_THRESHOLD,
            latency_ceiling_ms: DEFAULT_LATENCY_CEILING_MS,
            api_port: DEFAULT_API_PORT,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 설정 로드: 기본값 → TOML 파일(있으면) → `BRIDGE__*` 환경 변수 순으로 덮어씀
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Toml).required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let small = parse_threshold("small_transfer_threshold", &self.strategies.small_transfer_threshold)?;
        let high = parse_threshold("high_value_threshold", &self.strategies.high_value_threshold)?;
        if small > high {
            return Err(anyhow::anyhow!(
                "small_transfer_threshold ({}) must not exceed high_value_threshold ({})",
                small,
                high
            ));
        }

        if self.orchestrator.fallback_enabled && self.orchestrator.max_fallback_attempts == 0 {
            return Err(anyhow::anyhow!("max_fallback_attempts must be at least 1 when fallback is enabled"));
        }
        if self.health.cache_ttl_secs == 0 || self.routing.estimate_cache_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Cache TTLs must be greater than 0"));
        }
        if self.orchestrator.estimate_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Estimate timeout must be greater than 0"));
        }
        if self.orchestrator.execute_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Execute timeout must be greater than 0 when set"));
        }
        if self.monitoring.anomaly_interval_secs == 0 {
            return Err(anyhow::anyhow!("Anomaly interval must be greater than 0"));
        }
        if self.monitoring.latency_ceiling_ms <= 0.0 {
            return Err(anyhow::anyhow!("Latency ceiling must be positive"));
        }

        let mut names = std::collections::HashSet::new();
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Backend name cannot be empty"));
            }
            if !names.insert(backend.name.as_str()) {
                return Err(anyhow::anyhow!("Duplicate backend name: {}", backend.name));
            }
            if !(0.0..=1.0).contains(&backend.success_probability) {
                return Err(anyhow::anyhow!(
                    "Backend {} success_probability must be within [0, 1]",
                    backend.name
                ));
            }
            if backend.chains.len() < 2 {
                return Err(anyhow::anyhow!("Backend {} must list at least two chains", backend.name));
            }
        }

        Ok(())
    }

    pub fn thresholds(&self) -> Result<StrategyThresholds> {
        Ok(StrategyThresholds {
            small_transfer: parse_threshold("small_transfer_threshold", &self.strategies.small_transfer_threshold)?,
            high_value: parse_threshold("high_value_threshold", &self.strategies.high_value_threshold)?,
        })
    }

    pub fn orchestrator_settings(&self) -> Result<OrchestratorSettings> {
        Ok(OrchestratorSettings {
            fallback_enabled: self.orchestrator.fallback_enabled,
            max_fallback_attempts: self.orchestrator.max_fallback_attempts,
            estimate_timeout: Duration::from_millis(self.orchestrator.estimate_timeout_ms),
            execute_timeout: self.orchestrator.execute_timeout_secs.map(Duration::from_secs),
            health_cache_ttl: Duration::from_secs(self.health.cache_ttl_secs),
            estimate_cache_ttl: Duration::from_secs(self.routing.estimate_cache_ttl_secs),
            thresholds: self.thresholds()?,
            enabled_strategies: self.strategies.enabled.clone(),
            anomaly: AnomalyThresholds {
                failure_spike: self.monitoring.failure_spike_threshold,
                latency_ceiling_ms: self.monitoring.latency_ceiling_ms,
                interval_secs: self.monitoring.anomaly_interval_secs,
            },
        })
    }
}

fn parse_threshold(field: &str, value: &str) -> Result<Decimal> {
    let parsed = Decimal::from_str(value.trim()).map_err(|_| anyhow::anyhow!("Invalid {}: {}", field, value))?;
    if parsed <= Decimal::ZERO {
        return Err(anyhow::anyhow!("{} must be positive", field));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.orchestrator.fallback_enabled);
        assert_eq!(config.orchestrator.max_fallback_attempts, 1);
        assert_eq!(config.health.cache_ttl_secs, 60);
        assert_eq!(config.routing.estimate_cache_ttl_secs, 30);
        assert_eq!(config.strategies.enabled.len(), 5);
        assert_eq!(config.monitoring.api_port, DEFAULT_API_PORT);
        assert_eq!(config.backends.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.strategies.small_transfer_threshold = "abc".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.strategies.small_transfer_threshold = "50000".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.orchestrator.execute_timeout_secs = Some(0);
        assert!(config.validate().is_err());

        config = Config::default();
        config.orchestrator.max_fallback_attempts = 0;
        assert!(config.validate().is_err());
        config.orchestrator.fallback_enabled = false;
        assert!(config.validate().is_ok());

        config = Config::default();
        config.health.cache_ttl_secs = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        let duplicate = config.backends[0].clone();
        config.backends.push(duplicate);
        assert!(config.validate().is_err());

        config = Config::default();
        config.backends[0].success_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_orchestrator_settings_mapping() {
        let mut config = Config::default();
        config.orchestrator.fallback_enabled = false;
        config.orchestrator.execute_timeout_secs = Some(120);
        config.strategies.enabled = vec![StrategyKind::Cost];
        config.monitoring.failure_spike_threshold = 9;

        let settings = config.orchestrator_settings().unwrap();
        assert!(!settings.fallback_enabled);
        assert_eq!(settings.execute_timeout, Some(Duration::from_secs(120)));
        assert_eq!(settings.estimate_timeout, Duration::from_millis(DEFAULT_ESTIMATE_TIMEOUT_MS));
        assert_eq!(settings.enabled_strategies, vec![StrategyKind::Cost]);
        assert_eq!(settings.thresholds.small_transfer, Decimal::from(1000));
        assert_eq!(settings.thresholds.high_value, Decimal::from(10000));
        assert_eq!(settings.anomaly.failure_spike, 9);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let content = config.to_toml().unwrap();
        let parsed = Config::from_toml(&content).unwrap();
        assert_eq!(parsed.backends.len(), config.backends.len());
        assert_eq!(parsed.strategies.enabled, config.strategies.enabled);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[orchestrator]
fallback_enabled = false
max_fallback_attempts = 2

[strategies]
enabled = ["default", "reliability"]

[[backends]]
name = "cctp"
chains = ["ethereum", "base"]
base_time_ms = 900000
success_probability = 0.99
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(!config.orchestrator.fallback_enabled);
        assert_eq!(config.orchestrator.max_fallback_attempts, 2);
        assert_eq!(config.orchestrator.estimate_timeout_ms, DEFAULT_ESTIMATE_TIMEOUT_MS);
        assert_eq!(config.strategies.enabled, vec![StrategyKind::Default, StrategyKind::Reliability]);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].chains, vec![ChainId::Ethereum, ChainId::Base]);
        assert_eq!(config.backends[0].stage_delay_ms, 50);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.backends.len(), 4);
    }

    #[test]
    fn test_bundled_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let config = Config::load(path).unwrap();
        let names: Vec<_> = config.backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["cctp", "wormhole", "near-intents", "sbtc"]);
        assert_eq!(config.backends[1].asset_representation, crate::types::AssetRepresentation::Wrapped);
    }
}
