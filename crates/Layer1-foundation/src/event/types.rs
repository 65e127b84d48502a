//! Event Types - 시스템 전체에서 사용되는 이벤트 타입 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// 시스템 이벤트 (시작, 종료, 설정 변경)
    System,
    /// 플러그인 라이프사이클 이벤트
    Plugin,
    /// 에러 이벤트
    Error,
}

impl EventCategory {
    /// 카테고리 문자열 반환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Plugin => "plugin",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// Event Severity
// ============================================================================

/// 이벤트 심각도
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// FeatureEvent - 핵심 이벤트 타입
// ============================================================================

/// FeatureForge 시스템 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEvent {
    /// 이벤트 ID
    pub id: EventId,

    /// 이벤트 타입 (예: "plugin.state_changed")
    pub event_type: String,

    /// 이벤트 카테고리
    pub category: EventCategory,

    /// 심각도
    pub severity: EventSeverity,

    /// 이벤트 발생 시간
    pub timestamp: DateTime<Utc>,

    /// 이벤트 소스 (레이어/모듈)
    pub source: String,

    /// 이벤트 데이터
    pub data: Value,
}

impl FeatureEvent {
    /// 새 이벤트 생성
    pub fn new(event_type: impl Into<String>, category: EventCategory) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            category,
            severity: EventSeverity::Info,
            timestamp: Utc::now(),
            source: String::new(),
            data: Value::Null,
        }
    }

    /// 심각도 설정
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// 소스 설정
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 데이터 설정
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_feature_event_creation() {
        let event = FeatureEvent::new("plugin.state_changed", EventCategory::Plugin)
            .with_severity(EventSeverity::Warning)
            .with_source("subsystem")
            .with_data(serde_json::json!({"state": "Installed"}));

        assert_eq!(event.event_type, "plugin.state_changed");
        assert_eq!(event.category, EventCategory::Plugin);
        assert_eq!(event.severity, EventSeverity::Warning);
        assert_eq!(event.source, "subsystem");
        assert_eq!(event.data["state"], "Installed");
    }

    #[test]
    fn test_severity_order() {
        assert!(EventSeverity::Error > EventSeverity::Warning);
        assert_eq!(EventSeverity::default(), EventSeverity::Info);
    }
}
