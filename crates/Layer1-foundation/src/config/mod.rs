//! Config - 통합 설정 관리
//!
//! - `feature.rs` - FeatureConfig 통합 설정

mod feature;

pub use feature::{FeatureConfig, DEFAULT_CONTENT_DIR, DEFAULT_EVENT_HISTORY, FEATURE_CONFIG_FILE};
