use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridges::attestation::{poll_attestation, BackoffPolicy, MockAttestationSource};
use crate::bridges::traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind, ValidationOutcome};
use crate::common::validation::{is_valid_address_for, parse_positive_amount};
use crate::types::{
    AssetRepresentation, BackendHealth, ChainId, TransferEstimate, TransferRequest, TransferResult, TransferStage,
};

/// Simulated backend configuration (`[[backends]]` in the config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProfile {
    pub name: String,
    /// Every ordered pair of distinct chains in this list is supported
    pub chains: Vec<ChainId>,
    #[serde(default)]
    pub fee_bps: u32,
    /// Quoted completion time
    pub base_time_ms: u64,
    pub success_probability: f64,
    #[serde(default)]
    pub asset_representation: AssetRepresentation,
    #[serde(default)]
    pub min_amount: Decimal,
    /// Wait for an off-chain attestation between burn and mint
    #[serde(default)]
    pub attestation: bool,
    /// Real delay per simulated stage
    #[serde(default = "default_stage_delay_ms")]
    pub stage_delay_ms: u64,
}

fn default_stage_delay_ms() -> u64 {
    50
}

impl BackendProfile {
    /// Demo backend set used when the config lists none
    pub fn defaults() -> Vec<BackendProfile> {
        use ChainId::*;

        vec![
            BackendProfile {
                name: "cctp".to_string(),
                chains: vec![Ethereum, Base, Arbitrum, Optimism, Polygon, Solana],
                fee_bps: 1,
                base_time_ms: 900_000,
                success_probability: 0.99,
                asset_representation: AssetRepresentation::Native,
                min_amount: Decimal::ONE,
                attestation: true,
                stage_delay_ms: default_stage_delay_ms(),
            },
            BackendProfile {
                name: "wormhole".to_string(),
                chains: vec![Ethereum, Base, Arbitrum, Optimism, Polygon, Solana],
                fee_bps: 10,
                base_time_ms: 300_000,
                success_probability: 0.95,
                asset_representation: AssetRepresentation::Wrapped,
                min_amount: Decimal::ZERO,
                attestation: true,
                stage_delay_ms: default_stage_delay_ms(),
            },
            BackendProfile {
                name: "near-intents".to_string(),
                chains: vec![Ethereum, Base, Arbitrum, Solana, Near, Bitcoin],
                fee_bps: 5,
                base_time_ms: 60_000,
                success_probability: 0.93,
                asset_representation: AssetRepresentation::Native,
                min_amount: Decimal::TEN,
                attestation: false,
                stage_delay_ms: default_stage_delay_ms(),
            },
            BackendProfile {
                name: "sbtc".to_string(),
                chains: vec![Bitcoin, Stacks],
                fee_bps: 20,
                base_time_ms: 1_800_000,
                success_probability: 0.9,
                asset_representation: AssetRepresentation::Native,
                min_amount: Decimal::ZERO,
                attestation: false,
                stage_delay_ms: default_stage_delay_ms(),
            },
        ]
    }
}

/// Backend that walks through the usual burn/attest/mint stages without
/// touching a chain. Outcomes are random according to the profile.
#[derive(Debug)]
pub struct SimulatedBackend {
    profile: BackendProfile,
    attestations: MockAttestationSource,
}

impl SimulatedBackend {
    pub fn new(profile: BackendProfile) -> Self {
        Self {
            profile,
            attestations: MockAttestationSource::new(2),
        }
    }

    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    async fn stage(&self, request: &TransferRequest, stage: TransferStage, details: serde_json::Value) {
        debug!("  {} [{}] {}", self.profile.name, request.transfer_id, stage);
        request.emit(stage, Some(&self.profile.name), details);
        tokio::time::sleep(Duration::from_millis(self.profile.stage_delay_ms)).await;
    }

    fn fee_for(&self, amount: Decimal) -> Decimal {
        amount * Decimal::from(self.profile.fee_bps) / Decimal::from(10_000u32)
    }

    fn random_failure() -> ErrorKind {
        const FAILURES: [ErrorKind; 3] = [
            ErrorKind::TransactionFailed,
            ErrorKind::NetworkError,
            ErrorKind::AttestationTimeout,
        ];
        FAILURES[fastrand::usize(..FAILURES.len())]
    }

    fn mock_tx_hash() -> String {
        let bytes: Vec<u8> = (0..32).map(|_| fastrand::u8(..)).collect();
        format!("0x{}", hex::encode(bytes))
    }
}

#[async_trait]
impl BridgeBackend for SimulatedBackend {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn supports(&self, source: ChainId, destination: ChainId) -> bool {
        source != destination && self.profile.chains.contains(&source) && self.profile.chains.contains(&destination)
    }

    fn asset_representation(&self) -> AssetRepresentation {
        self.profile.asset_representation
    }

    async fn estimate(&self, request: &TransferRequest) -> BridgeResult<TransferEstimate> {
        let amount = parse_positive_amount(&request.amount).ok_or_else(|| {
            BridgeError::new(ErrorKind::EstimationFailed, format!("Cannot quote amount {}", request.amount))
                .with_backend(self.name())
        })?;
        let fee = self.fee_for(amount);

        Ok(TransferEstimate {
            backend: self.profile.name.clone(),
            fee,
            fee_asset: request.asset.clone().unwrap_or_else(|| "USDC".to_string()),
            estimated_time_ms: self.profile.base_time_ms,
            amount_out: Some(amount - fee),
            quoted_at: Utc::now(),
        })
    }

    async fn execute(&self, request: &TransferRequest) -> BridgeResult<TransferResult> {
        let id = request.transfer_id.clone();
        let source_tx = Self::mock_tx_hash();

        self.stage(request, TransferStage::Approve, serde_json::Value::Null).await;
        self.stage(request, TransferStage::Approved, serde_json::Value::Null).await;
        self.stage(request, TransferStage::Burning, serde_json::json!({ "tx": source_tx })).await;

        if self.profile.attestation {
            request.emit(TransferStage::WaitingAttestation, Some(self.name()), serde_json::json!({ "message": id }));
            let policy = BackoffPolicy {
                initial_delay_ms: self.profile.stage_delay_ms.max(1),
                max_delay_ms: self.profile.stage_delay_ms.max(1) * 4,
                max_attempts: 5,
                ..BackoffPolicy::default()
            };
            if let Err(e) = poll_attestation(&self.attestations, &id, &policy).await {
                warn!("⏰ {} 어테스테이션 실패: {}", self.name(), e);
                return Ok(TransferResult::failed(id, self.name(), &e)
                    .with_fallback_suggestion("Attestation service did not respond"));
            }
        }

        if fastrand::f64() >= self.profile.success_probability {
            let kind = Self::random_failure();
            let error = BridgeError::new(kind, format!("Simulated {} failure on {}", kind, self.name()));
            let mut result = TransferResult::failed(id, self.name(), &error)
                .with_fallback_suggestion(format!("{} is experiencing issues, another bridge may succeed", self.name()));
            result.source_tx = Some(source_tx);
            return Ok(result);
        }

        self.stage(request, TransferStage::Minting, serde_json::Value::Null).await;
        Ok(TransferResult::completed(id, self.name(), Some(source_tx), Some(Self::mock_tx_hash())))
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth::new(self.name()).with_profile(self.profile.success_probability, self.profile.base_time_ms as f64)
    }

    fn validate(&self, request: &TransferRequest) -> ValidationOutcome {
        if !is_valid_address_for(request.source_chain, &request.source_address) {
            return ValidationOutcome::invalid(format!(
                "Invalid {} source address: {}",
                request.source_chain, request.source_address
            ));
        }
        if !is_valid_address_for(request.destination_chain, &request.destination_address) {
            return ValidationOutcome::invalid(format!(
                "Invalid {} destination address: {}",
                request.destination_chain, request.destination_address
            ));
        }
        match parse_positive_amount(&request.amount) {
            Some(amount) if amount >= self.profile.min_amount => ValidationOutcome::ok(),
            Some(_) => ValidationOutcome::invalid(format!(
                "{} requires at least {} per transfer",
                self.name(),
                self.profile.min_amount
            )),
            None => ValidationOutcome::invalid(format!("Invalid amount: {}", request.amount)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusSink;

    fn profile(success_probability: f64) -> BackendProfile {
        BackendProfile {
            name: "sim".to_string(),
            chains: vec![ChainId::Ethereum, ChainId::Base],
            fee_bps: 10,
            base_time_ms: 5_000,
            success_probability,
            asset_representation: AssetRepresentation::Native,
            min_amount: Decimal::ONE,
            attestation: true,
            stage_delay_ms: 1,
        }
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::new(
            ChainId::Ethereum,
            ChainId::Base,
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
            "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
            amount,
        )
    }

    #[test]
    fn test_supports_distinct_listed_chains() {
        let backend = SimulatedBackend::new(profile(1.0));
        assert!(backend.supports(ChainId::Ethereum, ChainId::Base));
        assert!(backend.supports(ChainId::Base, ChainId::Ethereum));
        assert!(!backend.supports(ChainId::Base, ChainId::Base));
        assert!(!backend.supports(ChainId::Ethereum, ChainId::Solana));
    }

    #[tokio::test]
    async fn test_estimate_charges_fee_bps() {
        let backend = SimulatedBackend::new(profile(1.0));
        let estimate = backend.estimate(&request("1000")).await.unwrap();
        assert_eq!(estimate.fee, Decimal::ONE);
        assert_eq!(estimate.amount_out, Some(Decimal::from(999)));
        assert_eq!(estimate.estimated_time_ms, 5_000);
    }

    #[test]
    fn test_validate_checks_addresses_and_minimum() {
        let backend = SimulatedBackend::new(profile(1.0));
        assert!(backend.validate(&request("10")).valid);
        assert!(!backend.validate(&request("0.5")).valid);

        let mut bad = request("10");
        bad.destination_address = "alice.near".to_string();
        assert!(!backend.validate(&bad).valid);
    }

    #[tokio::test]
    async fn test_execute_emits_stages_in_order() {
        let backend = SimulatedBackend::new(profile(1.0));
        let (sink, mut events) = StatusSink::channel();

        let result = backend.execute(&request("10").with_status_sink(sink)).await.unwrap();
        assert!(result.success);

        let mut stages = Vec::new();
        while let Ok(event) = events.try_recv() {
            stages.push(event.stage.as_str().to_string());
        }
        assert_eq!(stages, vec!["approve", "approved", "burning", "waiting_attestation", "minting"]);
    }

    #[tokio::test]
    async fn test_zero_probability_always_fails_with_suggestion() {
        let backend = SimulatedBackend::new(profile(0.0));
        let result = backend.execute(&request("10")).await.unwrap();
        assert!(!result.success);
        assert!(result.suggest_fallback);
        assert!(result.error_code.is_some());
    }
}
