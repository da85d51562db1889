pub mod attestation;
pub mod health;
pub mod ranker;
pub mod registry;
pub mod traits;

// Re-exports
pub use attestation::{poll_attestation, AttestationSource, AttestationStatus, BackoffPolicy, HttpAttestationSource};
pub use health::{HealthTracker, Outcome};
pub use ranker::{RouteRanker, RouteRanking};
pub use registry::{BackendFactory, BackendRegistry};
pub use traits::{BridgeBackend, BridgeError, BridgeResult, ErrorKind, ValidationOutcome};
