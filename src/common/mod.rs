//! 공통 유틸리티 모듈
//!
//! 체인별 주소/금액 검증과 로그/CLI 출력용 포맷 함수를 포함합니다.

pub mod formatting;
pub mod validation;

pub use formatting::*;
pub use validation::*;
