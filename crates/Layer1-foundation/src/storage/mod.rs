//! Storage module for FeatureForge
//!
//! - `json`: JSON - 범용 파일 저장/로드 (설정, 설치 기록)

mod json;

// JSON Storage (범용)
pub use json::{JsonStore, APP_DIR_NAME, PROJECT_DIR_NAME};
