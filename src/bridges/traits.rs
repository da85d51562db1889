use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    AssetRepresentation, BackendHealth, ChainId, TransferEstimate, TransferRequest, TransferResult,
};

/// Bridge operation result type
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error taxonomy shared by the orchestrator and every backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InsufficientBalance,
    InvalidAddress,
    UnsupportedRoute,
    ProtocolUnavailable,
    AttestationTimeout,
    TransactionFailed,
    TransactionTimeout,
    WalletRejected,
    NetworkError,
    EstimationFailed,
    InitializationFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::InvalidAddress => "INVALID_ADDRESS",
            ErrorKind::UnsupportedRoute => "UNSUPPORTED_ROUTE",
            ErrorKind::ProtocolUnavailable => "PROTOCOL_UNAVAILABLE",
            ErrorKind::AttestationTimeout => "ATTESTATION_TIMEOUT",
            ErrorKind::TransactionFailed => "TRANSACTION_FAILED",
            ErrorKind::TransactionTimeout => "TRANSACTION_TIMEOUT",
            ErrorKind::WalletRejected => "WALLET_REJECTED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::EstimationFailed => "ESTIMATION_FAILED",
            ErrorKind::InitializationFailed => "INITIALIZATION_FAILED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bridge-specific error
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Backend the error originated from, if any
    pub backend: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            backend: None,
            details: None,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAddress, message)
    }

    pub fn unsupported_route(from: ChainId, to: ChainId) -> Self {
        Self::new(ErrorKind::UnsupportedRoute, format!("Unsupported route: {} -> {}", from, to))
    }

    pub fn unavailable(backend: &str) -> Self {
        Self::new(ErrorKind::ProtocolUnavailable, format!("Bridge backend unavailable: {}", backend))
            .with_backend(backend)
    }
}

/// Result of a backend's local pre-flight check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(reason.into()),
        }
    }
}

/// Cross-chain bridge backend capability.
///
/// `execute` reports expected failures as a `TransferResult` with
/// `success = false` and a typed error code; an `Err` is reserved for
/// conditions the backend did not anticipate and is normalized to
/// `ErrorKind::Unknown` by the orchestrator.
#[async_trait]
pub trait BridgeBackend: Send + Sync + std::fmt::Debug {
    /// Registry name of the backend
    fn name(&self) -> &str;

    /// Pure, total predicate over the chain-pair space
    fn supports(&self, source: ChainId, destination: ChainId) -> bool;

    /// Destination asset representation produced by this backend
    fn asset_representation(&self) -> AssetRepresentation {
        AssetRepresentation::Native
    }

    /// Quote fee and duration; must not mutate shared state
    async fn estimate(&self, request: &TransferRequest) -> BridgeResult<TransferEstimate>;

    /// Perform the transfer
    async fn execute(&self, request: &TransferRequest) -> BridgeResult<TransferResult>;

    /// Self-reported health, used until the orchestrator has observed outcomes
    async fn health(&self) -> BackendHealth {
        BackendHealth::new(self.name())
    }

    /// Cheap local parameter check run before execution
    fn validate(&self, request: &TransferRequest) -> ValidationOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind() {
        let err = BridgeError::unsupported_route(ChainId::Solana, ChainId::Stacks).with_backend("wormhole");
        assert_eq!(err.kind, ErrorKind::UnsupportedRoute);
        assert_eq!(err.to_string(), "UNSUPPORTED_ROUTE: Unsupported route: solana -> stacks");
        assert_eq!(err.backend.as_deref(), Some("wormhole"));
    }

    #[test]
    fn test_error_kind_serde_names() {
        let json = serde_json::to_string(&ErrorKind::AttestationTimeout).unwrap();
        assert_eq!(json, "\"AttestationTimeout\"");
    }
}
