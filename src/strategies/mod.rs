//! 브리지 선택 전략
//!
//! 전략은 데이터(우선순위, 적용 조건, 라우트 선택 함수)로 표현됩니다.

pub mod manager;
pub mod selection;

pub use manager::{StrategyManager, StrategyStats};
pub use selection::{SelectionStrategy, StrategyKind, StrategyThresholds};
