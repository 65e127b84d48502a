//! # feature-foundation
//!
//! Foundation layer for FeatureForge:
//! - Error: 공통 에러 타입 (thiserror)
//! - Config: 통합 설정 (FeatureConfig, 글로벌 + 프로젝트 병합)
//! - Storage: JsonStore (범용 JSON 파일 저장소)
//! - Event: 동기 발행 이벤트 버스 (플러그인 상태 변화 알림)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  feature-core (Plugin lifecycle state machines)          │
//! │                     │                                    │
//! │          ┌──────────┼──────────┐                         │
//! │          ▼          ▼          ▼                         │
//! │    FeatureConfig  EventBus   Error/Result                │
//! │          │                                               │
//! │          ▼                                               │
//! │      JsonStore (~/.config/featureforge, .featureforge)   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{FeatureConfig, DEFAULT_CONTENT_DIR, DEFAULT_EVENT_HISTORY, FEATURE_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, APP_DIR_NAME, PROJECT_DIR_NAME};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    EventBus, EventBusConfig, EventCategory, EventFilter, EventId, EventListener, EventSeverity,
    FeatureEvent, ListenerId,
};
