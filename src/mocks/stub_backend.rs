use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::bridges::traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind, ValidationOutcome};
use crate::types::{
    AssetRepresentation, BackendHealth, ChainId, TransferEstimate, TransferRequest, TransferResult, TransferStage,
};

/// Scripted execution outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Complete the transfer
    Succeed,
    /// Return a failed result with this error code
    Fail(ErrorKind),
    /// Return `Err` (unexpected condition)
    Error(ErrorKind),
    /// Panic inside `execute`
    Panic,
}

/// Deterministic backend with call counters, used as a spy in tests
#[derive(Debug)]
pub struct StubBackend {
    name: String,
    pairs: Vec<(ChainId, ChainId)>,
    fee: Decimal,
    time_ms: u64,
    health: BackendHealth,
    behavior: StubBehavior,
    estimate_error: Option<ErrorKind>,
    estimate_delay: Option<Duration>,
    execute_delay: Option<Duration>,
    representation: AssetRepresentation,
    rejection: Option<String>,
    execute_calls: AtomicUsize,
    estimate_calls: AtomicUsize,
    validate_calls: AtomicUsize,
}

impl StubBackend {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            health: BackendHealth::new(name.clone()),
            name,
            pairs: Vec::new(),
            fee: Decimal::ONE,
            time_ms: 60_000,
            behavior: StubBehavior::Succeed,
            estimate_error: None,
            estimate_delay: None,
            execute_delay: None,
            representation: AssetRepresentation::Native,
            rejection: None,
            execute_calls: AtomicUsize::new(0),
            estimate_calls: AtomicUsize::new(0),
            validate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_pairs(mut self, pairs: &[(ChainId, ChainId)]) -> Self {
        self.pairs = pairs.to_vec();
        self
    }

    /// Self-reported health only
    pub fn with_health(mut self, success_rate: f64, avg_completion_time_ms: f64) -> Self {
        self.health = BackendHealth::new(self.name.clone()).with_profile(success_rate, avg_completion_time_ms);
        self
    }

    /// Self-reported health plus a matching estimated time
    pub fn with_profile(self, success_rate: f64, time_ms: u64) -> Self {
        let mut stub = self.with_health(success_rate, time_ms as f64);
        stub.time_ms = time_ms;
        stub
    }

    pub fn with_estimate(mut self, fee: Decimal, time_ms: u64) -> Self {
        self.fee = fee;
        self.time_ms = time_ms;
        self
    }

    pub fn with_consecutive_failures(mut self, count: u32) -> Self {
        self.health.consecutive_failures = count;
        self
    }

    pub fn with_behavior(mut self, behavior: StubBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing(self) -> Self {
        self.with_behavior(StubBehavior::Fail(ErrorKind::TransactionFailed))
    }

    pub fn with_failing_estimate(mut self, kind: ErrorKind) -> Self {
        self.estimate_error = Some(kind);
        self
    }

    pub fn with_estimate_delay(mut self, delay: Duration) -> Self {
        self.estimate_delay = Some(delay);
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn wrapped(mut self) -> Self {
        self.representation = AssetRepresentation::Wrapped;
        self
    }

    /// Fail the backend-level pre-flight check
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.rejection = Some(reason.into());
        self
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn estimate_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Whether any backend operation with side effects or cost was invoked
    pub fn was_invoked(&self) -> bool {
        self.execute_calls() + self.estimate_calls() + self.validate_calls() > 0
    }
}

#[async_trait]
impl BridgeBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, source: ChainId, destination: ChainId) -> bool {
        self.pairs.contains(&(source, destination))
    }

    fn asset_representation(&self) -> AssetRepresentation {
        self.representation
    }

    async fn estimate(&self, request: &TransferRequest) -> BridgeResult<TransferEstimate> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.estimate_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = self.estimate_error {
            return Err(BridgeError::new(kind, "stub estimate failure").with_backend(&self.name));
        }

        Ok(TransferEstimate {
            backend: self.name.clone(),
            fee: self.fee,
            fee_asset: request.asset.clone().unwrap_or_else(|| "USDC".to_string()),
            estimated_time_ms: self.time_ms,
            amount_out: request.parsed_amount().map(|amount| amount - self.fee),
            quoted_at: Utc::now(),
        })
    }

    async fn execute(&self, request: &TransferRequest) -> BridgeResult<TransferResult> {
        let call = self.execute_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }

        match self.behavior {
            StubBehavior::Succeed => {
                request.emit(TransferStage::Burning, Some(&self.name), serde_json::json!({ "call": call }));
                request.emit(TransferStage::Minting, Some(&self.name), serde_json::Value::Null);
                Ok(TransferResult::completed(
                    request.transfer_id.clone(),
                    self.name.clone(),
                    Some(format!("0x{:064x}", call)),
                    Some(format!("0x{:064x}", call + 1_000)),
                ))
            }
            StubBehavior::Fail(kind) => {
                let error = BridgeError::new(kind, format!("{} stub failure", self.name));
                Ok(TransferResult::failed(request.transfer_id.clone(), self.name.clone(), &error)
                    .with_fallback_suggestion(format!("{} failed, try another backend", self.name)))
            }
            StubBehavior::Error(kind) => Err(BridgeError::new(kind, "stub raised").with_backend(&self.name)),
            StubBehavior::Panic => panic!("{} stub panicked", self.name),
        }
    }

    async fn health(&self) -> BackendHealth {
        self.health.clone()
    }

    fn validate(&self, _request: &TransferRequest) -> ValidationOutcome {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        match &self.rejection {
            Some(reason) => ValidationOutcome::invalid(reason.clone()),
            None => ValidationOutcome::ok(),
        }
    }
}
