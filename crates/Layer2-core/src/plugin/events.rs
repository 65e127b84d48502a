//! Plugin Events - 상태 머신 이벤트를 `FeatureEvent`로 변환

use serde::{Deserialize, Serialize};
use serde_json::json;

use feature_foundation::{EventCategory, EventSeverity, FeatureEvent};

use super::machine::StateMachine;
use super::result::TransitionResult;

/// 이벤트 소스
pub const EVENT_SOURCE: &str = "feature-core::subsystem";

/// 플러그인 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginEventKind {
    /// 전이 커밋
    StateChanged,
    /// 목적지 도달
    TransitionCompleted,
    /// 실패 보고
    TransitionFailed,
}

impl PluginEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateChanged => "plugin.state_changed",
            Self::TransitionCompleted => "plugin.transition_completed",
            Self::TransitionFailed => "plugin.transition_failed",
        }
    }
}

impl std::fmt::Display for PluginEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn payload(machine: &StateMachine, error: Option<&str>) -> serde_json::Value {
    let info = machine.current_state_info();
    json!({
        "url": machine.url().map(|url| url.to_string()),
        "name": machine.plugin_name(),
        "state": info.state,
        "destination": machine.destination_state(),
        "progress": info.progress,
        "error": error,
    })
}

/// 상태 변화 이벤트
pub fn state_changed(machine: &StateMachine) -> FeatureEvent {
    FeatureEvent::new(PluginEventKind::StateChanged.as_str(), EventCategory::Plugin)
        .with_severity(EventSeverity::Debug)
        .with_source(EVENT_SOURCE)
        .with_data(payload(machine, None))
}

/// 전이 결과 이벤트 (완료 / 실패)
pub fn transition_finished(machine: &StateMachine, result: &TransitionResult) -> FeatureEvent {
    match result {
        Ok(()) => FeatureEvent::new(
            PluginEventKind::TransitionCompleted.as_str(),
            EventCategory::Plugin,
        )
        .with_source(EVENT_SOURCE)
        .with_data(payload(machine, None)),
        Err(error) => FeatureEvent::new(
            PluginEventKind::TransitionFailed.as_str(),
            EventCategory::Error,
        )
        .with_severity(EventSeverity::Error)
        .with_source(EVENT_SOURCE)
        .with_data(payload(machine, Some(error.message()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::result::TransitionError;
    use crate::plugin::state::StateId;

    #[test]
    fn test_kind_names() {
        assert_eq!(PluginEventKind::StateChanged.to_string(), "plugin.state_changed");
        assert_eq!(
            PluginEventKind::TransitionFailed.as_str(),
            "plugin.transition_failed"
        );
    }

    #[test]
    fn test_payload_of_uninitialized_machine() {
        let (dispatcher, _rx) = crate::plugin::dispatch::Dispatcher::new(std::sync::Arc::new(
            crate::plugin::file_backend::FileBackend::new(),
        ));
        let machine = StateMachine::new(dispatcher);

        let event = state_changed(&machine);
        assert_eq!(event.event_type, "plugin.state_changed");
        assert_eq!(event.data["state"], "Uninitialized");
        assert!(event.data["url"].is_null());

        let failed = transition_finished(&machine, &Err(TransitionError::new("disk full")));
        assert_eq!(failed.category, EventCategory::Error);
        assert_eq!(failed.data["error"], "disk full");
        assert_eq!(failed.data["destination"], serde_json::json!(StateId::Uninitialized));
    }
}
