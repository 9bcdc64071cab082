//! Porla 공통 크레이트
//!
//! `record` 싱크와 그 라이브러리가 공유하는 에러 계층, `porla.toml` 설정,
//! 메트릭 이름을 제공합니다.

pub mod config;
pub mod error;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, PorlaError};

// 설정
pub use config::PorlaConfig;
