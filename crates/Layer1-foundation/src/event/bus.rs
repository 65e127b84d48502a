//! Event Bus - 이벤트 브로드캐스트 시스템
//!
//! 발행은 동기식입니다. 상태 머신 드라이버처럼 await 할 수 없는 곳에서도
//! 이벤트를 내보낼 수 있어야 하기 때문입니다.

use super::types::{EventCategory, EventSeverity, FeatureEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

// ============================================================================
// EventListener Trait
// ============================================================================

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
pub trait EventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 관심 있는 이벤트 카테고리 (None이면 모든 이벤트)
    fn categories(&self) -> Option<Vec<EventCategory>> {
        None
    }

    /// 이벤트 처리
    fn on_event(&self, event: &FeatureEvent);
}

// ============================================================================
// EventFilter
// ============================================================================

/// 이벤트 필터
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// 카테고리 필터
    pub categories: Option<Vec<EventCategory>>,

    /// 이벤트 타입 패턴 (prefix 매칭)
    pub event_types: Option<Vec<String>>,

    /// 최소 심각도
    pub min_severity: Option<EventSeverity>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_event_types(mut self, types: Vec<String>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// 이벤트가 필터를 통과하는지 확인
    pub fn matches(&self, event: &FeatureEvent) -> bool {
        if let Some(ref cats) = self.categories {
            if !cats.contains(&event.category) {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| event.event_type.starts_with(t)) {
                return false;
            }
        }

        if let Some(min_sev) = self.min_severity {
            if event.severity < min_sev {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 브로드캐스트 채널 용량
    pub channel_capacity: usize,

    /// 이벤트 히스토리 보관 개수
    pub history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_size: 100,
        }
    }
}

struct RegisteredListener {
    listener: Arc<dyn EventListener>,
    filter: Option<EventFilter>,
}

/// 이벤트 버스
///
/// ```ignore
/// let bus = EventBus::new();
/// let id = bus.subscribe(Arc::new(MyListener));
/// bus.publish(FeatureEvent::new("plugin.state_changed", EventCategory::Plugin));
/// bus.unsubscribe(id);
/// ```
pub struct EventBus {
    config: EventBusConfig,

    /// 브로드캐스트 채널 송신자 (스트림 구독자용)
    sender: broadcast::Sender<FeatureEvent>,

    listeners: RwLock<HashMap<ListenerId, RegisteredListener>>,

    listener_counter: AtomicU64,

    history: Mutex<VecDeque<FeatureEvent>>,

    event_count: AtomicU64,
}

impl EventBus {
    /// 기본 설정으로 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 이벤트 버스 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);

        Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_size)),
            config,
            sender,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.subscribe_with_filter(listener, None)
    }

    /// 필터와 함께 리스너 등록
    pub fn subscribe_with_filter(
        &self,
        listener: Arc<dyn EventListener>,
        filter: Option<EventFilter>,
    ) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        self.listeners
            .write()
            .insert(id, RegisteredListener { listener, filter });
        id
    }

    /// 리스너 해제
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().remove(&id).is_some();
        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }
        removed
    }

    /// 이벤트 발행
    pub fn publish(&self, event: FeatureEvent) {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);
        trace!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Publishing event #{}", event_count + 1
        );

        {
            let mut history = self.history.lock();
            history.push_back(event.clone());
            while history.len() > self.config.history_size {
                history.pop_front();
            }
        }

        // 구독자가 없어도 OK
        let _ = self.sender.send(event.clone());

        // 리스너가 버스를 다시 호출할 수 있으므로 잠금을 풀고 전달
        let targets: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .values()
            .filter(|registered| match &registered.filter {
                Some(filter) => filter.matches(&event),
                None => match registered.listener.categories() {
                    Some(cats) => cats.contains(&event.category),
                    None => true,
                },
            })
            .map(|registered| Arc::clone(&registered.listener))
            .collect();

        for listener in targets {
            listener.on_event(&event);
        }
    }

    /// 브로드캐스트 수신자 생성 (스트림 방식)
    pub fn receiver(&self) -> broadcast::Receiver<FeatureEvent> {
        self.sender.subscribe()
    }

    /// 최근 이벤트 히스토리 조회 (최신순)
    pub fn history(&self, limit: Option<usize>) -> Vec<FeatureEvent> {
        let history = self.history.lock();
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// 등록된 리스너 수
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct TestListener {
        name: String,
        count: AtomicUsize,
    }

    impl TestListener {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                count: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl EventListener for TestListener {
        fn name(&self) -> &str {
            &self.name
        }

        fn categories(&self) -> Option<Vec<EventCategory>> {
            Some(vec![EventCategory::Plugin])
        }

        fn on_event(&self, _event: &FeatureEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_event_bus_basic() {
        let bus = EventBus::new();

        let listener = Arc::new(TestListener::new("test"));
        let id = bus.subscribe(listener.clone());
        assert_eq!(bus.listener_count(), 1);

        bus.publish(FeatureEvent::new("plugin.state_changed", EventCategory::Plugin));
        bus.publish(FeatureEvent::new("system.started", EventCategory::System));

        // 카테고리 필터로 Plugin 이벤트만 전달
        assert_eq!(listener.call_count(), 1);
        assert_eq!(bus.event_count(), 2);

        assert!(bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .with_categories(vec![EventCategory::Plugin])
            .with_event_types(vec!["plugin.".to_string()])
            .with_min_severity(EventSeverity::Warning);

        let failed = FeatureEvent::new("plugin.transition_failed", EventCategory::Plugin)
            .with_severity(EventSeverity::Error);
        let changed = FeatureEvent::new("plugin.state_changed", EventCategory::Plugin);
        let system = FeatureEvent::new("system.started", EventCategory::System);

        assert!(filter.matches(&failed));
        assert!(!filter.matches(&changed));
        assert!(!filter.matches(&system));
    }

    #[test]
    fn test_event_history() {
        let bus = EventBus::with_config(EventBusConfig {
            history_size: 5,
            ..Default::default()
        });

        for i in 0..10 {
            bus.publish(FeatureEvent::new(
                format!("plugin.event.{}", i),
                EventCategory::Plugin,
            ));
        }

        let history = bus.history(None);
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].event_type, "plugin.event.9");
    }

    #[tokio::test]
    async fn test_event_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.receiver();

        bus.publish(FeatureEvent::new("system.started", EventCategory::System));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type, "system.started");
    }
}
