//! 테스트/데모용 백엔드
//!
//! - `StubBackend`: 결과가 고정된 스파이 백엔드 (호출 횟수 기록)
//! - `SimulatedBackend`: 프로파일 기반 확률적 백엔드 (CLI 데모)

pub mod simulated_backend;
pub mod stub_backend;

pub use simulated_backend::{BackendProfile, SimulatedBackend};
pub use stub_backend::{StubBackend, StubBehavior};
