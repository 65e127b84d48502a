//! Plugin Subsystem - 모든 플러그인 머신의 소유자
//!
//! - URL별 머신 생성/조회 (`find_or_create_machine`)
//! - 의존성 해석: 마운트된 매니페스트의 의존 URL → 형제 머신
//! - 상태 변화 또는 실패 보고 시 WaitingForDependencies 머신 재확인
//! - 비동기 결과 큐 펌프 (`pump_pending`, `run_until_idle`)

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

use feature_foundation::{
    Error, EventBus, EventBusConfig, FeatureConfig, Result, DEFAULT_EVENT_HISTORY,
};

use super::backend::PluginBackend;
use super::context::{CompletionCallback, DependencyResolver};
use super::dispatch::{AsyncMessage, Dispatcher};
use super::events;
use super::machine::{StateChangedHandler, StateMachine, TransitionResultHandler};
use super::result::TransitionResult;
use super::state::StateId;
use super::url::PluginUrl;

// ============================================================================
// SubsystemConfig
// ============================================================================

/// 서브시스템 설정
#[derive(Debug, Clone)]
pub struct SubsystemConfig {
    /// 의존 플러그인을 Registered까지 직접 구동
    pub drive_dependencies: bool,

    /// 이벤트 히스토리 보관 개수
    pub event_history_size: usize,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            drive_dependencies: true,
            event_history_size: DEFAULT_EVENT_HISTORY,
        }
    }
}

impl From<&FeatureConfig> for SubsystemConfig {
    fn from(config: &FeatureConfig) -> Self {
        Self {
            drive_dependencies: config.drive_dependencies(),
            event_history_size: config.event_history_size(),
        }
    }
}

/// 서브시스템 요약
#[derive(Debug, Clone, Default)]
pub struct SubsystemSummary {
    pub total: usize,
    pub in_flight: usize,
    pub by_state: BTreeMap<StateId, usize>,
}

// ============================================================================
// PluginSubsystem
// ============================================================================

struct SubsystemInner {
    machines: RefCell<BTreeMap<String, Rc<StateMachine>>>,
    dispatcher: Dispatcher,
    /// 머신 스레드에서만 빌림 (await 중에는 빌리지 않음)
    receiver: RefCell<UnboundedReceiver<AsyncMessage>>,
    config: SubsystemConfig,
    event_bus: Arc<EventBus>,
    weak_self: Weak<SubsystemInner>,
}

/// 플러그인 서브시스템 (머신 스레드 전용)
pub struct PluginSubsystem {
    inner: Rc<SubsystemInner>,
}

impl PluginSubsystem {
    pub fn new(backend: Arc<dyn PluginBackend>, config: SubsystemConfig) -> Self {
        let (dispatcher, receiver) = Dispatcher::new(backend);
        let event_bus = Arc::new(EventBus::with_config(EventBusConfig {
            history_size: config.event_history_size,
            ..Default::default()
        }));

        let inner = Rc::new_cyclic(|weak_self| SubsystemInner {
            machines: RefCell::new(BTreeMap::new()),
            dispatcher,
            receiver: RefCell::new(receiver),
            config,
            event_bus,
            weak_self: weak_self.clone(),
        });

        Self { inner }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    pub fn config(&self) -> &SubsystemConfig {
        &self.inner.config
    }

    // ========================================================================
    // 머신 관리
    // ========================================================================

    /// URL의 머신을 찾거나 생성 (생성 시 초기화까지)
    pub fn find_or_create_machine(&self, url: &str) -> Result<Rc<StateMachine>> {
        self.inner.find_or_create_machine(url)
    }

    pub fn machine(&self, url: &str) -> Option<Rc<StateMachine>> {
        let url = PluginUrl::parse(url).ok()?;
        self.inner.lookup(&url)
    }

    pub fn machines(&self) -> Vec<Rc<StateMachine>> {
        self.inner.machines.borrow().values().cloned().collect()
    }

    pub fn plugin_state(&self, url: &str) -> Option<StateId> {
        self.machine(url).map(|machine| machine.current_state())
    }

    // ========================================================================
    // 상태 변경 명령
    // ========================================================================

    /// 목적지 요청
    ///
    /// 완료 콜백 직전에 `plugin.transition_finished` 이벤트를 발행합니다.
    pub fn change_plugin_state<F>(&self, url: &str, destination: StateId, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        let machine = self.find_or_create_machine(url)?;
        info!(url = %url, destination = %destination, "Changing plugin state");

        let weak = Rc::downgrade(&self.inner);
        let callback: CompletionCallback =
            Box::new(move |machine: &StateMachine, result: TransitionResult| {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .event_bus
                        .publish(events::transition_finished(machine, &result));
                }
                on_complete(machine, result);
            });

        machine.set_destination_state(destination, callback)
    }

    pub fn load_plugin<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        self.change_plugin_state(url, StateId::Loaded, on_complete)
    }

    pub fn activate_plugin<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        self.change_plugin_state(url, StateId::Active, on_complete)
    }

    pub fn deactivate_plugin<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        self.change_plugin_state(url, StateId::Loaded, on_complete)
    }

    pub fn unload_plugin<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        self.change_plugin_state(url, StateId::Registered, on_complete)
    }

    pub fn uninstall_plugin<F>(&self, url: &str, on_complete: F) -> Result<()>
    where
        F: FnOnce(&StateMachine, TransitionResult) + 'static,
    {
        self.change_plugin_state(url, StateId::StatusKnown, on_complete)
    }

    // ========================================================================
    // 비동기 결과 펌프
    // ========================================================================

    /// 대기 없이 큐에 쌓인 메시지를 모두 처리. 처리한 개수 반환
    pub fn pump_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            // 전달 중 콜백이 다시 펌프할 수 있으므로 빌림은 꺼내는 동안만
            let message = self.inner.receiver.borrow_mut().try_recv().ok();
            let Some(message) = message else {
                break;
            };
            self.inner.deliver(message);
            delivered += 1;
        }
        delivered
    }

    /// 진행 중인 작업이 없을 때까지 메시지 처리
    pub async fn run_until_idle(&self) {
        self.pump_pending();
        while self.inner.dispatcher.in_flight() > 0 {
            let message =
                std::future::poll_fn(|cx| self.inner.receiver.borrow_mut().poll_recv(cx)).await;
            match message {
                Some(message) => self.inner.deliver(message),
                None => break,
            }
            self.pump_pending();
        }
    }

    /// 진행 중인 비동기 작업 수
    pub fn in_flight(&self) -> usize {
        self.inner.dispatcher.in_flight()
    }

    pub fn summary(&self) -> SubsystemSummary {
        let machines = self.inner.machines.borrow();
        let mut by_state = BTreeMap::new();
        for machine in machines.values() {
            *by_state.entry(machine.current_state()).or_insert(0) += 1;
        }
        SubsystemSummary {
            total: machines.len(),
            in_flight: self.inner.dispatcher.in_flight(),
            by_state,
        }
    }
}

impl SubsystemInner {
    fn lookup(&self, url: &PluginUrl) -> Option<Rc<StateMachine>> {
        self.machines.borrow().get(url.as_str()).cloned()
    }

    fn find_or_create_machine(&self, url: &str) -> Result<Rc<StateMachine>> {
        let url = PluginUrl::parse(url)?;
        if let Some(machine) = self.lookup(&url) {
            return Ok(machine);
        }

        let machine = StateMachine::new(self.dispatcher.clone());
        machine.set_drive_dependencies(self.config.drive_dependencies);

        let weak = self.weak_self.clone();
        let handler: StateChangedHandler = Rc::new(move |machine: &StateMachine| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_state_changed(machine);
            }
        });
        machine.on_state_changed(handler);

        // 콜백 슬롯과 무관하게 실패를 대기 머신에 전파
        let weak = self.weak_self.clone();
        let on_result: TransitionResultHandler =
            Rc::new(move |machine: &StateMachine, result: &TransitionResult| {
                if result.is_err() {
                    if let Some(inner) = weak.upgrade() {
                        inner.notify_waiters(machine);
                    }
                }
            });
        machine.on_transition_result(on_result);

        // 초기화 중 상태 변화 알림이 맵을 조회할 수 있도록 먼저 등록
        self.machines
            .borrow_mut()
            .insert(url.to_string(), Rc::clone(&machine));

        let weak = self.weak_self.clone();
        let resolver: DependencyResolver = Rc::new(move |url: &PluginUrl| {
            match weak.upgrade() {
                Some(inner) => inner.resolve_dependencies(url),
                None => Err(Error::Internal("plugin subsystem dropped".into())),
            }
        });

        debug!(url = %url, "Created plugin state machine");
        if let Err(e) = machine.init_state_machine(url.clone(), resolver) {
            self.machines.borrow_mut().remove(url.as_str());
            return Err(e);
        }
        Ok(machine)
    }

    /// 매니페스트 의존성 → 형제 머신 (선택적 의존성은 실패 시 건너뜀)
    fn resolve_dependencies(&self, url: &PluginUrl) -> Result<Vec<Rc<StateMachine>>> {
        let machine = self
            .lookup(url)
            .ok_or_else(|| Error::NotFound(format!("no state machine for {}", url)))?;

        let mut siblings = Vec::new();
        for dependency in machine.dependencies() {
            let sibling = match self.find_or_create_machine(&dependency.url) {
                Ok(sibling) => sibling,
                Err(e) if dependency.optional => {
                    warn!(url = %url, dependency = %dependency.name, error = %e, "Skipping optional dependency");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if Rc::ptr_eq(&sibling, &machine) {
                warn!(url = %url, "Ignoring self dependency");
                continue;
            }
            siblings.push(sibling);
        }
        Ok(siblings)
    }

    fn handle_state_changed(&self, machine: &StateMachine) {
        self.event_bus.publish(events::state_changed(machine));
        self.notify_waiters(machine);
    }

    /// WaitingForDependencies 머신들에게 재확인 요청
    fn notify_waiters(&self, changed: &StateMachine) {
        let waiters: Vec<Rc<StateMachine>> = self
            .machines
            .borrow()
            .values()
            .filter(|machine| {
                machine.current_state() == StateId::WaitingForDependencies
                    && !std::ptr::eq(machine.as_ref(), changed)
            })
            .cloned()
            .collect();

        for waiter in waiters {
            trace!(url = ?waiter.url().map(|url| url.to_string()), "Re-checking dependencies");
            waiter.update_state_machine();
        }
    }

    fn deliver(&self, message: AsyncMessage) {
        match message {
            AsyncMessage::Completed {
                url,
                ticket,
                outcome,
            } => match self.lookup(&url) {
                Some(machine) => {
                    machine.complete_async(ticket, outcome);
                }
                None => {
                    error!(url = %url, ticket, "Completion for unknown plugin");
                    self.dispatcher.settle();
                }
            },
            AsyncMessage::Progress {
                url,
                ticket,
                fraction,
            } => {
                if let Some(machine) = self.lookup(&url) {
                    if machine.report_progress(ticket, fraction) {
                        trace!(url = %url, fraction, "Progress");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::file_backend::FileBackend;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, name: &str, dependencies: &[&str]) -> String {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("Content")).unwrap();
        std::fs::write(dir.join("Content").join("data.asset"), name).unwrap();

        let deps: Vec<_> = dependencies
            .iter()
            .map(|dep| {
                serde_json::json!({
                    "name": dep,
                    "url": format!("file:{}", root.join(dep).join(format!("{}.uplugin", dep)).display()),
                })
            })
            .collect();
        let manifest = dir.join(format!("{}.uplugin", name));
        std::fs::write(
            &manifest,
            serde_json::json!({ "name": name, "dependencies": deps }).to_string(),
        )
        .unwrap();
        format!("file:{}", manifest.display())
    }

    fn subsystem(drive: bool) -> PluginSubsystem {
        PluginSubsystem::new(
            Arc::new(FileBackend::new()),
            SubsystemConfig {
                drive_dependencies: drive,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let subsystem = subsystem(true);
        let a = subsystem.find_or_create_machine("file:/plugins/Foo/Foo.uplugin").unwrap();
        let b = subsystem.find_or_create_machine("FILE:/plugins/Foo/Foo.uplugin").unwrap();

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.current_state(), StateId::UnknownStatus);
        assert_eq!(subsystem.summary().total, 1);
        assert!(matches!(
            subsystem.find_or_create_machine("nope"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_with_driven_dependency() {
        let temp = TempDir::new().unwrap();
        let bar = write_manifest(temp.path(), "Bar", &[]);
        let foo = write_manifest(temp.path(), "Foo", &["Bar"]);
        let subsystem = subsystem(true);

        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&results);
        subsystem
            .activate_plugin(&foo, move |_, result| sink.borrow_mut().push(result))
            .unwrap();
        subsystem.run_until_idle().await;

        assert_eq!(*results.borrow(), vec![Ok(())]);
        assert_eq!(subsystem.plugin_state(&foo), Some(StateId::Active));
        assert_eq!(subsystem.plugin_state(&bar), Some(StateId::Registered));
        assert_eq!(subsystem.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_verbatim() {
        let temp = TempDir::new().unwrap();
        let foo = write_manifest(temp.path(), "Foo", &["Ghost"]);
        let subsystem = subsystem(true);

        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&results);
        subsystem
            .load_plugin(&foo, move |_, result| sink.borrow_mut().push(result))
            .unwrap();
        subsystem.run_until_idle().await;

        let ghost = format!(
            "file:{}",
            temp.path().join("Ghost").join("Ghost.uplugin").display()
        );
        let expected = format!("Plugin {} is not available", ghost);
        assert_eq!(results.borrow().len(), 1);
        assert_eq!(results.borrow()[0].as_ref().unwrap_err().message(), expected);
        assert_eq!(subsystem.plugin_state(&foo), Some(StateId::Installed));
        assert_eq!(subsystem.plugin_state(&ghost), Some(StateId::StatusKnown));
    }

    #[tokio::test]
    async fn test_events_published() {
        let temp = TempDir::new().unwrap();
        let foo = write_manifest(temp.path(), "Foo", &[]);
        let subsystem = subsystem(true);

        subsystem.change_plugin_state(&foo, StateId::Installed, |_, _| {}).unwrap();
        subsystem.run_until_idle().await;

        let history = subsystem.event_bus().history(None);
        assert_eq!(history[0].event_type, "plugin.transition_completed");
        assert_eq!(history[0].data["state"], "Installed");
        // UnknownStatus (init), CheckingStatus, StatusKnown, Downloading, Installed
        let changes = history
            .iter()
            .filter(|event| event.event_type == "plugin.state_changed")
            .count();
        assert_eq!(changes, 5);
    }

    #[tokio::test]
    async fn test_summary_counts_states() {
        let temp = TempDir::new().unwrap();
        let foo = write_manifest(temp.path(), "Foo", &[]);
        let bar = write_manifest(temp.path(), "Bar", &[]);
        let subsystem = subsystem(true);

        subsystem.load_plugin(&foo, |_, _| {}).unwrap();
        subsystem.find_or_create_machine(&bar).unwrap();
        subsystem.run_until_idle().await;

        let summary = subsystem.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.in_flight, 0);
        assert_eq!(summary.by_state.get(&StateId::Loaded), Some(&1));
        assert_eq!(summary.by_state.get(&StateId::UnknownStatus), Some(&1));
    }

    #[tokio::test]
    async fn test_pump_from_completion_callback() {
        let temp = TempDir::new().unwrap();
        let foo = write_manifest(temp.path(), "Foo", &[]);
        let bar = write_manifest(temp.path(), "Bar", &[]);
        let subsystem = Rc::new(subsystem(true));

        // 전달 도중 콜백이 다시 큐를 비워도 빌림이 겹치지 않아야 함
        let pumped = Rc::new(RefCell::new(Vec::new()));
        for url in [&foo, &bar] {
            let sink = Rc::clone(&pumped);
            let nested = Rc::downgrade(&subsystem);
            subsystem
                .change_plugin_state(url, StateId::Installed, move |_, result| {
                    assert!(result.is_ok());
                    if let Some(subsystem) = nested.upgrade() {
                        sink.borrow_mut().push(subsystem.pump_pending());
                    }
                })
                .unwrap();
        }
        subsystem.run_until_idle().await;

        assert_eq!(pumped.borrow().len(), 2);
        assert_eq!(subsystem.plugin_state(&foo), Some(StateId::Installed));
        assert_eq!(subsystem.plugin_state(&bar), Some(StateId::Installed));
        assert_eq!(subsystem.in_flight(), 0);
    }
}
