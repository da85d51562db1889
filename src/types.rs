use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use std::str::FromStr;
use uuid::Uuid;

use crate::bridges::traits::{BridgeError, ErrorKind};
use crate::constants::{HEALTHY_MAX_CONSECUTIVE_FAILURES, HEALTHY_MIN_SUCCESS_RATE};

// ================================
// Chains
// ================================

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Base,
    Arbitrum,
    Optimism,
    Polygon,
    Solana,
    Near,
    Stacks,
    Bitcoin,
}

/// Address/transaction format family a chain belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Evm,
    Solana,
    Near,
    Stacks,
    Bitcoin,
}

impl ChainId {
    pub const ALL: [ChainId; 9] = [
        ChainId::Ethereum,
        ChainId::Base,
        ChainId::Arbitrum,
        ChainId::Optimism,
        ChainId::Polygon,
        ChainId::Solana,
        ChainId::Near,
        ChainId::Stacks,
        ChainId::Bitcoin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Base => "base",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Polygon => "polygon",
            ChainId::Solana => "solana",
            ChainId::Near => "near",
            ChainId::Stacks => "stacks",
            ChainId::Bitcoin => "bitcoin",
        }
    }

    pub fn native_token(&self) -> &'static str {
        match self {
            ChainId::Ethereum | ChainId::Base | ChainId::Arbitrum | ChainId::Optimism => "ETH",
            ChainId::Polygon => "POL",
            ChainId::Solana => "SOL",
            ChainId::Near => "NEAR",
            ChainId::Stacks => "STX",
            ChainId::Bitcoin => "BTC",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Ethereum
            | ChainId::Base
            | ChainId::Arbitrum
            | ChainId::Optimism
            | ChainId::Polygon => ChainFamily::Evm,
            ChainId::Solana => ChainFamily::Solana,
            ChainId::Near => ChainFamily::Near,
            ChainId::Stacks => ChainFamily::Stacks,
            ChainId::Bitcoin => ChainFamily::Bitcoin,
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChainId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ChainId::ALL
            .iter()
            .copied()
            .find(|chain| chain.name() == lowered)
            .ok_or_else(|| BridgeError::new(ErrorKind::UnsupportedRoute, format!("Unknown chain: {}", s)))
    }
}

/// How a backend represents the bridged asset on the destination chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetRepresentation {
    /// Burn-and-mint or canonical issuance: the destination holds the issuer's own asset
    #[default]
    Native,
    /// Lock-and-mint IOU issued by the bridge
    Wrapped,
}

// ================================
// Status events
// ================================

/// Progress stage reported through the status sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    Validating,
    Selecting,
    Executing,
    Approve,
    Approved,
    Burning,
    WaitingAttestation,
    Minting,
    Retrying,
    Complete,
    Failed,
    /// Backend-specific stage such as `solver_waiting_deposit`
    Extension(String),
}

impl TransferStage {
    pub fn as_str(&self) -> &str {
        match self {
            TransferStage::Validating => "validating",
            TransferStage::Selecting => "selecting",
            TransferStage::Executing => "executing",
            TransferStage::Approve => "approve",
            TransferStage::Approved => "approved",
            TransferStage::Burning => "burning",
            TransferStage::WaitingAttestation => "waiting_attestation",
            TransferStage::Minting => "minting",
            TransferStage::Retrying => "retrying",
            TransferStage::Complete => "complete",
            TransferStage::Failed => "failed",
            TransferStage::Extension(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One `(stage, details)` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub transfer_id: String,
    pub stage: TransferStage,
    pub backend: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget sink for status events.
///
/// Sending never blocks and never fails the transfer: a dropped receiver
/// just means nobody is listening any more.
#[derive(Debug, Clone)]
pub struct StatusSink {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusSink {
    pub fn new(sender: mpsc::UnboundedSender<StatusEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }
}

// ================================
// Transfer request
// ================================

fn new_transfer_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_true() -> bool {
    true
}

/// A single cross-chain transfer request.
///
/// Requests are never edited in place; the builder methods consume `self`
/// and fallback attempts derive a fresh request via [`TransferRequest::for_fallback`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(default = "new_transfer_id")]
    pub transfer_id: String,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub source_address: String,
    pub destination_address: String,
    /// Decimal string; chain-native precision is resolved by the backend
    pub amount: String,
    /// Asset symbol, e.g. "USDC"
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub preferred_backend: Option<String>,
    #[serde(default = "default_true")]
    pub fallback_allowed: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Backends that already failed for this transfer
    #[serde(default)]
    pub excluded_backends: Vec<String>,
    #[serde(skip)]
    pub status_sink: Option<StatusSink>,
}

impl TransferRequest {
    pub fn new(
        source_chain: ChainId,
        destination_chain: ChainId,
        source_address: impl Into<String>,
        destination_address: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            transfer_id: new_transfer_id(),
            source_chain,
            destination_chain,
            source_address: source_address.into(),
            destination_address: destination_address.into(),
            amount: amount.into(),
            asset: None,
            preferred_backend: None,
            fallback_allowed: true,
            dry_run: false,
            excluded_backends: Vec::new(),
            status_sink: None,
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.preferred_backend = Some(backend.into());
        self
    }

    pub fn with_fallback(mut self, allowed: bool) -> Self {
        self.fallback_allowed = allowed;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_status_sink(mut self, sink: StatusSink) -> Self {
        self.status_sink = Some(sink);
        self
    }

    /// Amount as an exact decimal, `None` when it does not parse
    pub fn parsed_amount(&self) -> Option<Decimal> {
        Decimal::from_str(self.amount.trim()).ok()
    }

    pub fn is_excluded(&self, backend: &str) -> bool {
        self.excluded_backends.iter().any(|b| b == backend)
    }

    /// Copy of this request for the next fallback hop: same transfer, the
    /// failed backend excluded and any explicit preference dropped.
    pub fn for_fallback(&self, failed_backend: &str) -> Self {
        let mut next = self.clone();
        next.preferred_backend = None;
        if !next.is_excluded(failed_backend) {
            next.excluded_backends.push(failed_backend.to_string());
        }
        next
    }

    /// Push a status notification if the caller supplied a sink
    pub fn emit(&self, stage: TransferStage, backend: Option<&str>, details: serde_json::Value) {
        if let Some(sink) = &self.status_sink {
            sink.emit(StatusEvent {
                transfer_id: self.transfer_id.clone(),
                stage,
                backend: backend.map(str::to_string),
                details,
                timestamp: Utc::now(),
            });
        }
    }
}

// ================================
// Estimates, results, routes
// ================================

/// Fee and expected duration for one backend/request pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferEstimate {
    pub backend: String,
    /// Fee in source asset units
    pub fee: Decimal,
    pub fee_asset: String,
    pub estimated_time_ms: u64,
    /// Expected amount on the destination, when the backend quotes it
    pub amount_out: Option<Decimal>,
    pub quoted_at: DateTime<Utc>,
}

/// Chain-side state of a transfer attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Validating,
    Approving,
    Broadcasting,
    Attesting,
    Minting,
    Complete,
    Failed,
}

/// Outcome of one execution attempt.
///
/// `status == Complete` holds exactly when `success` is true; use the
/// constructors or [`TransferResult::normalized`] to keep it that way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer_id: String,
    pub success: bool,
    pub backend: String,
    pub status: TransferStatus,
    pub source_tx: Option<String>,
    pub destination_tx: Option<String>,
    pub error_code: Option<ErrorKind>,
    pub error: Option<String>,
    pub suggest_fallback: bool,
    pub fallback_reason: Option<String>,
    /// Backend that failed before this result was produced by a fallback hop
    pub fallback_from: Option<String>,
    /// Strategy that picked the backend, when one did
    pub strategy: Option<String>,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl TransferResult {
    pub fn completed(
        transfer_id: impl Into<String>,
        backend: impl Into<String>,
        source_tx: Option<String>,
        destination_tx: Option<String>,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            success: true,
            backend: backend.into(),
            status: TransferStatus::Complete,
            source_tx,
            destination_tx,
            error_code: None,
            error: None,
            suggest_fallback: false,
            fallback_reason: None,
            fallback_from: None,
            strategy: None,
            elapsed_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(transfer_id: impl Into<String>, backend: impl Into<String>, error: &BridgeError) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            success: false,
            backend: backend.into(),
            status: TransferStatus::Failed,
            source_tx: None,
            destination_tx: None,
            error_code: Some(error.kind),
            error: Some(error.message.clone()),
            suggest_fallback: false,
            fallback_reason: None,
            fallback_from: None,
            strategy: None,
            elapsed_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn with_fallback_suggestion(mut self, reason: impl Into<String>) -> Self {
        self.suggest_fallback = true;
        self.fallback_reason = Some(reason.into());
        self
    }

    /// Enforce the success/status invariant and make sure failures carry a
    /// code and a human-readable message.
    pub fn normalized(mut self) -> Self {
        if self.success {
            self.status = TransferStatus::Complete;
            self.error_code = None;
            self.error = None;
        } else {
            self.status = TransferStatus::Failed;
            let code = *self.error_code.get_or_insert(ErrorKind::Unknown);
            if self.error.as_deref().map_or(true, str::is_empty) {
                self.error = Some(format!("Transfer failed ({})", code));
            }
        }
        self
    }
}

/// Rolling reliability/latency profile of one backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendHealth {
    pub backend: String,
    /// Exponential moving average of outcomes, always within [0, 1]
    pub success_rate: f64,
    pub avg_completion_time_ms: f64,
    pub consecutive_failures: u32,
    pub total_attempts: u64,
    pub total_failures: u64,
    pub last_error: Option<ErrorKind>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl BackendHealth {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            success_rate: 1.0,
            avg_completion_time_ms: 0.0,
            consecutive_failures: 0,
            total_attempts: 0,
            total_failures: 0,
            last_error: None,
            last_success: None,
            last_failure: None,
        }
    }

    pub fn with_profile(mut self, success_rate: f64, avg_completion_time_ms: f64) -> Self {
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self.avg_completion_time_ms = avg_completion_time_ms.max(0.0);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.success_rate > HEALTHY_MIN_SUCCESS_RATE
            && self.consecutive_failures < HEALTHY_MAX_CONSECUTIVE_FAILURES
    }
}

/// A ranked candidate for satisfying one transfer request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub backend: String,
    pub estimate: TransferEstimate,
    pub health: BackendHealth,
    pub asset_representation: AssetRepresentation,
    pub recommended: bool,
    pub reason: String,
}

impl Route {
    pub fn success_rate(&self) -> f64 {
        self.health.success_rate
    }

    pub fn estimated_time_ms(&self) -> u64 {
        self.estimate.estimated_time_ms
    }

    pub fn uses_native_asset(&self) -> bool {
        self.asset_representation == AssetRepresentation::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_parsing() {
        assert_eq!("Ethereum".parse::<ChainId>().unwrap(), ChainId::Ethereum);
        assert_eq!(" near ".parse::<ChainId>().unwrap(), ChainId::Near);
        assert!("dogecoin".parse::<ChainId>().is_err());
        assert_eq!(ChainId::Base.family(), ChainFamily::Evm);
    }

    #[test]
    fn test_fallback_request_excludes_failed_backend() {
        let request = TransferRequest::new(ChainId::Ethereum, ChainId::Base, "0xa", "0xb", "10")
            .with_backend("cctp");
        let retry = request.for_fallback("cctp");

        assert_eq!(retry.transfer_id, request.transfer_id);
        assert!(retry.preferred_backend.is_none());
        assert!(retry.is_excluded("cctp"));
        // 원본 요청은 그대로
        assert!(request.excluded_backends.is_empty());
        assert_eq!(retry.for_fallback("cctp").excluded_backends.len(), 1);
    }

    #[test]
    fn test_result_normalization_keeps_status_invariant() {
        let mut result = TransferResult::completed("t1", "cctp", None, None);
        result.success = false;
        let result = result.normalized();
        assert_eq!(result.status, TransferStatus::Failed);
        assert_eq!(result.error_code, Some(ErrorKind::Unknown));
        assert!(result.error.is_some());

        let mut ok = TransferResult::failed("t2", "cctp", &BridgeError::new(ErrorKind::NetworkError, "boom"));
        ok.success = true;
        let ok = ok.normalized();
        assert_eq!(ok.status, TransferStatus::Complete);
        assert!(ok.error_code.is_none());
    }

    #[test]
    fn test_status_sink_survives_dropped_receiver() {
        let (sink, receiver) = StatusSink::channel();
        drop(receiver);
        let request = TransferRequest::new(ChainId::Ethereum, ChainId::Base, "0xa", "0xb", "1")
            .with_status_sink(sink);
        request.emit(TransferStage::Validating, None, serde_json::Value::Null);
    }

    #[test]
    fn test_backend_health_flag() {
        let mut health = BackendHealth::new("wormhole").with_profile(0.9, 1000.0);
        assert!(health.is_healthy());
        health.consecutive_failures = 5;
        assert!(!health.is_healthy());
        let low = BackendHealth::new("wormhole").with_profile(0.7, 1000.0);
        assert!(!low.is_healthy());
    }
}
