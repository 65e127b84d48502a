//! Plugin States - 상태별 동작
//!
//! 목적지 가능 상태(plateau)는 방향에 따라 다음 전이 상태만 고르고,
//! 전이 상태는 비동기 작업 하나를 시작해 결과에 따라 성공/실패 상태로 갑니다.

use std::rc::Rc;
use tracing::debug;

use super::backend::{BackendOp, OpOutput};
use super::context::{ContextCell, SharedContext};
use super::machine::StateMachine;
use super::result::{TransitionError, TransitionResult};
use super::state::{Direction, State, StateId, StateStatus};
use super::url::PluginProtocol;

/// 상태 테이블 생성 (인덱스 == `StateId::index()`)
pub(crate) fn create_states() -> Vec<Box<dyn State>> {
    StateId::ALL.iter().map(|&id| create_state(id)).collect()
}

fn create_state(id: StateId) -> Box<dyn State> {
    use StateId::*;

    match id {
        Uninitialized => Box::new(UninitializedState),
        UnknownStatus => Box::new(UnknownStatusState),
        CheckingStatus => Box::new(AsyncStep::new(
            id,
            BackendOp::QueryStatus,
            StatusKnown,
            UnknownStatus,
            apply_status,
        )),
        StatusKnown => Box::new(StatusKnownState),
        Uninstalling => Box::new(AsyncStep::new(
            id,
            BackendOp::Uninstall,
            StatusKnown,
            Installed,
            apply_uninstalled,
        )),
        Downloading => Box::new(AsyncStep::new(
            id,
            BackendOp::Download,
            Installed,
            StatusKnown,
            apply_installed,
        )),
        Installed => Box::new(Plateau::new(id, Some(Mounting), Some(Uninstalling))),
        Unmounting => Box::new(AsyncStep::new(
            id,
            BackendOp::Unmount,
            Installed,
            Installed,
            apply_unmounted,
        )),
        Mounting => Box::new(AsyncStep::new(
            id,
            BackendOp::Mount,
            WaitingForDependencies,
            Installed,
            apply_mounted,
        )),
        WaitingForDependencies => Box::new(WaitingForDependenciesState),
        Unregistering => Box::new(AsyncStep::new(
            id,
            BackendOp::Unregister,
            Unmounting,
            Registered,
            apply_done,
        )),
        Registering => Box::new(AsyncStep::new(
            id,
            BackendOp::Register,
            Registered,
            Unmounting,
            apply_done,
        )),
        Registered => Box::new(Plateau::new(id, Some(Loading), Some(Unregistering))),
        Unloading => Box::new(AsyncStep::new(
            id,
            BackendOp::Unload,
            Registered,
            Loaded,
            apply_unloaded,
        )),
        Loading => Box::new(AsyncStep::new(
            id,
            BackendOp::Load,
            Loaded,
            Registered,
            apply_loaded,
        )),
        Loaded => Box::new(Plateau::new(id, Some(Activating), Some(Unloading))),
        Deactivating => Box::new(AsyncStep::new(
            id,
            BackendOp::Deactivate,
            Loaded,
            Active,
            apply_done,
        )),
        Activating => Box::new(AsyncStep::new(
            id,
            BackendOp::Activate,
            Active,
            Loaded,
            apply_done,
        )),
        Active => Box::new(Plateau::new(id, None, Some(Deactivating))),
    }
}

// ============================================================================
// 초기 상태
// ============================================================================

struct UninitializedState;

impl State for UninitializedState {
    fn id(&self) -> StateId {
        StateId::Uninitialized
    }

    fn update_state(&mut self, _ctx: &ContextCell, _direction: Direction) -> StateStatus {
        StateStatus::transition(StateId::UnknownStatus)
    }
}

struct UnknownStatusState;

impl State for UnknownStatusState {
    fn id(&self) -> StateId {
        StateId::UnknownStatus
    }

    fn begin_state(&mut self, ctx: &ContextCell) {
        let mut ctx = ctx.borrow_mut();
        ctx.status_known = false;
        ctx.is_available = false;
    }

    fn update_state(&mut self, _ctx: &ContextCell, direction: Direction) -> StateStatus {
        match direction {
            Direction::Forward => StateStatus::transition(StateId::CheckingStatus),
            _ => StateStatus::stay(),
        }
    }
}

struct StatusKnownState;

impl State for StatusKnownState {
    fn id(&self) -> StateId {
        StateId::StatusKnown
    }

    fn update_state(&mut self, ctx: &ContextCell, direction: Direction) -> StateStatus {
        match direction {
            Direction::Forward => {
                let ctx = ctx.borrow();
                if ctx.is_available {
                    StateStatus::transition(StateId::Downloading)
                } else {
                    StateStatus::fail_in_place(TransitionError::new(format!(
                        "Plugin {} is not available",
                        ctx.url
                    )))
                }
            }
            Direction::Backward => StateStatus::transition(StateId::UnknownStatus),
            Direction::Arrived => StateStatus::stay(),
        }
    }
}

// ============================================================================
// Plateau - 방향에 따라 다음 상태만 선택
// ============================================================================

struct Plateau {
    id: StateId,
    forward: Option<StateId>,
    backward: Option<StateId>,
}

impl Plateau {
    fn new(id: StateId, forward: Option<StateId>, backward: Option<StateId>) -> Self {
        Self {
            id,
            forward,
            backward,
        }
    }
}

impl State for Plateau {
    fn id(&self) -> StateId {
        self.id
    }

    fn update_state(&mut self, _ctx: &ContextCell, direction: Direction) -> StateStatus {
        let next = match direction {
            Direction::Forward => self.forward,
            Direction::Backward => self.backward,
            Direction::Arrived => None,
        };
        next.map_or_else(StateStatus::stay, StateStatus::transition)
    }
}

// ============================================================================
// AsyncStep - 비동기 작업 하나를 기다리는 전이 상태
// ============================================================================

/// 작업 결과를 컨텍스트에 반영
type ApplyOutput = fn(&mut SharedContext, OpOutput) -> Result<(), TransitionError>;

struct AsyncStep {
    id: StateId,
    op: BackendOp,
    success: StateId,
    failure: StateId,
    apply: ApplyOutput,
}

impl AsyncStep {
    fn new(id: StateId, op: BackendOp, success: StateId, failure: StateId, apply: ApplyOutput) -> Self {
        Self {
            id,
            op,
            success,
            failure,
            apply,
        }
    }
}

impl State for AsyncStep {
    fn id(&self) -> StateId {
        self.id
    }

    fn begin_state(&mut self, ctx: &ContextCell) {
        debug!(url = %ctx.url(), state = %self.id, op = %self.op, "Starting async step");
        ctx.start_async(self.op);
    }

    fn update_state(&mut self, ctx: &ContextCell, _direction: Direction) -> StateStatus {
        match ctx.take_async_outcome() {
            None => StateStatus::stay(),
            Some(Ok(output)) => {
                let applied = (self.apply)(&mut ctx.borrow_mut(), output);
                match applied {
                    Ok(()) => StateStatus::transition(self.success),
                    Err(error) => StateStatus::fail(self.failure, error),
                }
            }
            Some(Err(error)) => StateStatus::fail(self.failure, error.into()),
        }
    }

    fn end_state(&mut self, ctx: &ContextCell) {
        ctx.cancel_async();
    }
}

fn unexpected(output: &OpOutput) -> TransitionError {
    TransitionError::new(format!("Unexpected backend output: {:?}", output))
}

fn apply_status(ctx: &mut SharedContext, output: OpOutput) -> Result<(), TransitionError> {
    match output {
        OpOutput::Status(report) => {
            ctx.status_known = true;
            ctx.is_available = report.available;
            ctx.installed_filename = report.installed_filename;
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn apply_installed(ctx: &mut SharedContext, output: OpOutput) -> Result<(), TransitionError> {
    match output {
        OpOutput::Installed(path) => {
            ctx.installed_filename = Some(path);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn apply_uninstalled(ctx: &mut SharedContext, _output: OpOutput) -> Result<(), TransitionError> {
    // 로컬 매니페스트는 그대로 남음
    if ctx.url.protocol() == PluginProtocol::Web {
        ctx.installed_filename = None;
    }
    Ok(())
}

fn apply_mounted(ctx: &mut SharedContext, output: OpOutput) -> Result<(), TransitionError> {
    match output {
        OpOutput::Mounted(descriptor) => {
            if !descriptor.name.is_empty() {
                ctx.plugin_name = descriptor.name.clone();
            }
            ctx.descriptor = Some(descriptor);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn apply_unmounted(ctx: &mut SharedContext, _output: OpOutput) -> Result<(), TransitionError> {
    ctx.descriptor = None;
    Ok(())
}

fn apply_loaded(ctx: &mut SharedContext, output: OpOutput) -> Result<(), TransitionError> {
    match output {
        OpOutput::Loaded(data) => {
            ctx.plugin_data = Some(data);
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

fn apply_unloaded(ctx: &mut SharedContext, _output: OpOutput) -> Result<(), TransitionError> {
    ctx.plugin_data = None;
    Ok(())
}

fn apply_done(_ctx: &mut SharedContext, _output: OpOutput) -> Result<(), TransitionError> {
    Ok(())
}

// ============================================================================
// WaitingForDependencies
// ============================================================================

/// 모든 의존 플러그인이 Registered 이상이 될 때까지 대기
///
/// 형제 머신은 매번 resolver로 다시 조회합니다. 형제를 호출하는 동안에는
/// 컨텍스트를 빌리지 않으므로, 형제의 드라이버가 이 머신을 다시 구동해도
/// 재진입 가드에 흡수됩니다.
struct WaitingForDependenciesState;

impl State for WaitingForDependenciesState {
    fn id(&self) -> StateId {
        StateId::WaitingForDependencies
    }

    fn update_state(&mut self, ctx: &ContextCell, _direction: Direction) -> StateStatus {
        // 목적지가 아래로 바뀌면 대기 중단
        if ctx.destination() < StateId::Registered {
            return StateStatus::transition(StateId::Unmounting);
        }

        let siblings = match ctx.request_dependency_machines() {
            Ok(siblings) => siblings,
            Err(error) => return StateStatus::fail(StateId::Unmounting, error.into()),
        };

        let (drive, request_update) = {
            let ctx = ctx.borrow();
            (ctx.drive_dependencies, Rc::clone(&ctx.on_request_update))
        };

        let mut waiting = 0usize;
        for sibling in &siblings {
            if sibling.current_state() >= StateId::Registered {
                continue;
            }
            if let Err(error) = sibling.last_result() {
                return StateStatus::fail(StateId::Unmounting, error);
            }

            if drive && sibling.destination_state() < StateId::Registered {
                let request = Rc::clone(&request_update);
                let pushed = sibling.set_destination_state(
                    StateId::Registered,
                    Box::new(move |_: &StateMachine, _: TransitionResult| request()),
                );
                if let Err(error) = pushed {
                    return StateStatus::fail(StateId::Unmounting, error.into());
                }

                // 형제가 동기적으로 진행했을 수 있음
                if sibling.current_state() >= StateId::Registered {
                    continue;
                }
                if let Err(error) = sibling.last_result() {
                    return StateStatus::fail(StateId::Unmounting, error);
                }
            }

            waiting += 1;
        }

        if waiting == 0 {
            StateStatus::transition(StateId::Registering)
        } else {
            debug!(url = %ctx.url(), waiting, "Waiting for dependencies");
            StateStatus::stay()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::backend::{OpRequest, PluginBackend, PluginData, StatusReport};
    use crate::plugin::context::SharedContext;
    use crate::plugin::dispatch::{Dispatcher, ProgressSink};
    use crate::plugin::manifest::PluginDescriptor;
    use crate::plugin::url::PluginUrl;
    use async_trait::async_trait;
    use feature_foundation::Result;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct NullBackend;

    #[async_trait]
    impl PluginBackend for NullBackend {
        async fn query_status(&self, _request: &OpRequest) -> Result<StatusReport> {
            Ok(StatusReport::available())
        }

        async fn download(&self, _request: &OpRequest, _progress: &ProgressSink) -> Result<PathBuf> {
            Ok(PathBuf::from("/tmp/Null.uplugin"))
        }

        async fn uninstall(&self, _request: &OpRequest, _progress: &ProgressSink) -> Result<()> {
            Ok(())
        }

        async fn mount(&self, _request: &OpRequest) -> Result<PluginDescriptor> {
            Ok(PluginDescriptor::new("Null"))
        }

        async fn register(&self, _request: &OpRequest) -> Result<()> {
            Ok(())
        }

        async fn load(&self, _request: &OpRequest) -> Result<PluginData> {
            Ok(PluginData::new(()))
        }
    }

    fn test_context(url: &str) -> ContextCell {
        let (dispatcher, _rx) = Dispatcher::new(Arc::new(NullBackend));
        ContextCell::new(SharedContext::new(
            PluginUrl::parse(url).unwrap(),
            dispatcher,
            Rc::new(|_: &PluginUrl| -> Result<Vec<Rc<StateMachine>>> { Ok(Vec::new()) }),
            Rc::new(|| {}),
        ))
    }

    #[test]
    fn test_table_matches_ids() {
        let states = create_states();
        assert_eq!(states.len(), StateId::COUNT);
        for (state, id) in states.iter().zip(StateId::ALL) {
            assert_eq!(state.id(), id);
            assert_eq!(state.can_be_destination_state(), id.can_be_destination());
        }
    }

    #[test]
    fn test_plateau_directions() {
        let ctx = test_context("file:/plugins/Foo/Foo.uplugin");
        let mut installed = create_state(StateId::Installed);

        assert_eq!(
            installed.update_state(&ctx, Direction::Forward),
            StateStatus::transition(StateId::Mounting)
        );
        assert_eq!(
            installed.update_state(&ctx, Direction::Backward),
            StateStatus::transition(StateId::Uninstalling)
        );
        assert_eq!(installed.update_state(&ctx, Direction::Arrived), StateStatus::stay());

        let mut active = create_state(StateId::Active);
        assert_eq!(active.update_state(&ctx, Direction::Forward), StateStatus::stay());
    }

    #[test]
    fn test_status_known_requires_availability() {
        let ctx = test_context("web:Foo");
        let mut state = create_state(StateId::StatusKnown);

        let status = state.update_state(&ctx, Direction::Forward);
        assert_eq!(status.transition_to, None);
        assert_eq!(
            status.result.unwrap_err().message(),
            "Plugin web:Foo is not available"
        );

        ctx.borrow_mut().is_available = true;
        assert_eq!(
            state.update_state(&ctx, Direction::Forward),
            StateStatus::transition(StateId::Downloading)
        );
    }

    #[test]
    fn test_waiting_without_dependencies_proceeds() {
        let ctx = test_context("file:/plugins/Foo/Foo.uplugin");
        ctx.borrow_mut().destination = StateId::Active;
        let mut state = create_state(StateId::WaitingForDependencies);

        assert_eq!(
            state.update_state(&ctx, Direction::Forward),
            StateStatus::transition(StateId::Registering)
        );
    }

    #[test]
    fn test_waiting_aborts_when_redirected_down() {
        let ctx = test_context("file:/plugins/Foo/Foo.uplugin");
        ctx.borrow_mut().destination = StateId::Installed;
        let mut state = create_state(StateId::WaitingForDependencies);

        assert_eq!(
            state.update_state(&ctx, Direction::Forward),
            StateStatus::transition(StateId::Unmounting)
        );
    }

    #[test]
    fn test_resolver_error_takes_failure_path() {
        let (dispatcher, _rx) = Dispatcher::new(Arc::new(NullBackend));
        let ctx = ContextCell::new(SharedContext::new(
            PluginUrl::parse("web:Foo").unwrap(),
            dispatcher,
            Rc::new(|_: &PluginUrl| -> Result<Vec<Rc<StateMachine>>> {
                Err(feature_foundation::Error::InvalidUrl("Bar".into()))
            }),
            Rc::new(|| {}),
        ));
        ctx.borrow_mut().destination = StateId::Registered;
        let mut state = create_state(StateId::WaitingForDependencies);

        let status = state.update_state(&ctx, Direction::Forward);
        assert_eq!(status.transition_to, Some(StateId::Unmounting));
        assert_eq!(status.result.unwrap_err().message(), "Invalid plugin URL: Bar");
    }

    #[test]
    fn test_apply_mounted_sets_name() {
        let ctx = test_context("file:/plugins/Foo/Foo.uplugin");
        let descriptor = PluginDescriptor::new("FooFeature");

        apply_mounted(&mut ctx.borrow_mut(), OpOutput::Mounted(descriptor)).unwrap();
        assert_eq!(ctx.borrow().plugin_name, "FooFeature");
        assert!(ctx.borrow().descriptor.is_some());

        assert!(apply_mounted(&mut ctx.borrow_mut(), OpOutput::Done).is_err());
    }
}
