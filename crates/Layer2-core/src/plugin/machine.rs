//! Plugin State Machine - 상태 테이블과 드라이버 루프
//!
//! 머신은 상태마다 객체 하나를 소유(arena)하고, 목적지에 도달하거나
//! 비동기 작업을 기다려야 할 때까지 `update_state_machine`으로 구동됩니다.
//!
//! - 재진입 가드: 구동 중 다시 호출되면 즉시 반환 (바깥 루프가 변화를 관찰)
//! - 실패: 다음 목적지 가능 상태에서 완료 콜백으로 보고, 목적지를 현재 상태로 고정
//! - 새 목적지: 이전 콜백은 호출되지 않고 폐기

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace, warn};

use feature_foundation::{Error, Result};

use super::backend::{OpOutput, PluginData};
use super::context::{
    CompletionCallback, ContextCell, DependencyResolver, SharedContext, UpdateRequest,
};
use super::dispatch::Dispatcher;
use super::manifest::{PluginDependency, PluginDescriptor};
use super::result::{TransitionError, TransitionResult};
use super::state::{Direction, State, StateId, StateInfo};
use super::states::create_states;
use super::url::PluginUrl;

/// 상태 변화 핸들러 - 전이가 커밋될 때마다 한 번
pub type StateChangedHandler = Rc<dyn Fn(&StateMachine)>;

/// 결과 핸들러 - 결과가 보고될 때마다 (완료 콜백 유무와 무관)
pub type TransitionResultHandler = Rc<dyn Fn(&StateMachine, &TransitionResult)>;

// ============================================================================
// StateMachine
// ============================================================================

/// 플러그인 하나의 라이프사이클 상태 머신
///
/// 단일 스레드 전용입니다 (`Rc` 공유). 비동기 작업의 결과는
/// [`complete_async`](Self::complete_async)로 전달됩니다.
pub struct StateMachine {
    context: OnceCell<ContextCell>,
    states: RefCell<Vec<Box<dyn State>>>,
    info: Cell<StateInfo>,
    in_update: Cell<bool>,

    /// 아직 보고되지 않은 실패 (첫 실패 유지)
    pending_error: RefCell<Option<TransitionError>>,
    /// 마지막으로 보고된 결과 (형제 머신이 읽음)
    last_result: RefCell<TransitionResult>,

    state_changed: RefCell<Vec<StateChangedHandler>>,
    result_handlers: RefCell<Vec<TransitionResultHandler>>,
    dispatcher: Dispatcher,
    drive_dependencies: Cell<bool>,
    weak_self: Weak<StateMachine>,
}

impl StateMachine {
    pub fn new(dispatcher: Dispatcher) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            context: OnceCell::new(),
            states: RefCell::new(Vec::new()),
            info: Cell::new(StateInfo::new(StateId::Uninitialized)),
            in_update: Cell::new(false),
            pending_error: RefCell::new(None),
            last_result: RefCell::new(Ok(())),
            state_changed: RefCell::new(Vec::new()),
            result_handlers: RefCell::new(Vec::new()),
            dispatcher,
            drive_dependencies: Cell::new(true),
            weak_self: weak_self.clone(),
        })
    }

    /// 의존 플러그인을 직접 Registered까지 끌어올릴지 (기본 true)
    pub fn set_drive_dependencies(&self, drive: bool) {
        self.drive_dependencies.set(drive);
        if let Some(ctx) = self.context.get() {
            ctx.borrow_mut().drive_dependencies = drive;
        }
    }

    /// 상태 변화 핸들러 등록
    pub fn on_state_changed(&self, handler: StateChangedHandler) {
        self.state_changed.borrow_mut().push(handler);
    }

    /// 결과 핸들러 등록
    ///
    /// 완료 콜백이 호출된 뒤, 콜백이 없거나 교체된 경우에도 호출됩니다.
    /// 이 머신을 기다리는 다른 머신을 깨우는 용도입니다.
    pub fn on_transition_result(&self, handler: TransitionResultHandler) {
        self.result_handlers.borrow_mut().push(handler);
    }

    // ========================================================================
    // 명령
    // ========================================================================

    /// URL 저장, 상태 테이블 생성 후 UnknownStatus로 이동
    pub fn init_state_machine(&self, url: PluginUrl, resolver: DependencyResolver) -> Result<()> {
        if self.context.get().is_some() {
            return Err(Error::AlreadyInitialized(url.to_string()));
        }

        let weak = self.weak_self.clone();
        let request_update: UpdateRequest = Rc::new(move || {
            if let Some(machine) = weak.upgrade() {
                machine.update_state_machine();
            }
        });

        let mut context =
            SharedContext::new(url.clone(), self.dispatcher.clone(), resolver, request_update);
        context.drive_dependencies = self.drive_dependencies.get();
        context.destination = StateId::UnknownStatus;

        if self.context.set(ContextCell::new(context)).is_err() {
            return Err(Error::AlreadyInitialized(url.to_string()));
        }
        *self.states.borrow_mut() = create_states();
        self.info.set(StateInfo::new(StateId::Uninitialized));

        debug!(url = %url, "Initialized plugin state machine");
        self.update_state_machine();
        Ok(())
    }

    /// 목적지 설정 후 구동
    ///
    /// 이전 요청의 콜백은 호출되지 않고 폐기됩니다.
    pub fn set_destination_state(
        &self,
        destination: StateId,
        on_complete: CompletionCallback,
    ) -> Result<()> {
        let ctx = self.context.get().ok_or(Error::NotInitialized)?;
        if !destination.can_be_destination() {
            return Err(Error::InvalidInput(format!(
                "{} cannot be a destination state",
                destination
            )));
        }

        let superseded = {
            let mut ctx = ctx.borrow_mut();
            debug!(
                url = %ctx.url,
                current = %self.info.get().state,
                destination = %destination,
                "Destination requested"
            );
            ctx.destination = destination;
            ctx.on_transition_complete.replace(on_complete)
        };
        if superseded.is_some() {
            debug!(state = %self.info.get().state, "Superseded pending completion callback");
        }
        drop(superseded);

        self.pending_error.replace(None);
        self.last_result.replace(Ok(()));
        self.update_state_machine();
        Ok(())
    }

    /// 드라이버 루프
    pub fn update_state_machine(&self) {
        let Some(ctx) = self.context.get() else {
            return;
        };
        if self.in_update.replace(true) {
            trace!(state = %self.info.get().state, "Re-entrant update ignored");
            return;
        }

        loop {
            let current = self.info.get().state;
            let destination = ctx.destination();

            if current.can_be_destination() {
                let error = self.pending_error.borrow_mut().take();
                if current == destination || error.is_some() {
                    if self.complete_transition(ctx, current, error) {
                        continue;
                    }
                    break;
                }
            }

            let direction = current
                .committed_direction()
                .unwrap_or_else(|| Direction::between(current, destination));
            let status = self.states.borrow_mut()[current.index()].update_state(ctx, direction);

            if let Err(error) = status.result {
                warn!(url = %ctx.url(), state = %current, error = %error, "Transition step failed");
                let mut pending = self.pending_error.borrow_mut();
                if pending.is_none() {
                    *pending = Some(error);
                }
            }

            match status.transition_to {
                Some(next) if next != current => self.commit_transition(ctx, current, next),
                _ => {
                    // 목적지 가능 상태에서 실패하면 바로 보고
                    if current.can_be_destination() && self.pending_error.borrow().is_some() {
                        continue;
                    }
                    break;
                }
            }
        }

        self.in_update.set(false);
    }

    /// 목적지 도달 또는 실패 보고. 콜백이 목적지를 바꿨으면 `true`
    fn complete_transition(
        &self,
        ctx: &ContextCell,
        current: StateId,
        error: Option<TransitionError>,
    ) -> bool {
        let result = match error {
            Some(error) => {
                ctx.borrow_mut().destination = current;
                warn!(url = %ctx.url(), state = %current, error = %error, "Transition failed");
                Err(error)
            }
            None => Ok(()),
        };
        self.last_result.replace(result.clone());

        let callback = ctx.borrow_mut().on_transition_complete.take();
        match callback {
            Some(callback) => {
                if result.is_ok() {
                    info!(url = %ctx.url(), state = %current, "Transition complete");
                }
                callback(self, result.clone());
            }
            None => debug!(url = %ctx.url(), state = %current, "Reached destination"),
        }

        let handlers: Vec<TransitionResultHandler> = self.result_handlers.borrow().clone();
        for handler in handlers {
            handler(self, &result);
        }

        ctx.destination() != self.info.get().state
    }

    fn commit_transition(&self, ctx: &ContextCell, from: StateId, to: StateId) {
        {
            let mut states = self.states.borrow_mut();
            states[from.index()].end_state(ctx);
            self.info.set(StateInfo::new(to));
            states[to.index()].begin_state(ctx);
        }
        info!(url = %ctx.url(), from = %from, to = %to, "State changed");

        let handlers: Vec<StateChangedHandler> = self.state_changed.borrow().clone();
        for handler in handlers {
            handler(self);
        }
    }

    // ========================================================================
    // 비동기 결과 수신
    // ========================================================================

    /// 작업 완료 전달. 현재 기다리는 작업이면 재구동 후 `true`
    pub fn complete_async(&self, ticket: u64, outcome: Result<OpOutput>) -> bool {
        let Some(ctx) = self.context.get() else {
            return false;
        };
        if !ctx.accept_async_outcome(ticket, outcome) {
            debug!(url = %ctx.url(), ticket, "Ignoring stale completion");
            return false;
        }
        ctx.request_update();
        true
    }

    /// 진행률 전달 (현재 작업일 때만 반영)
    pub fn report_progress(&self, ticket: u64, fraction: f32) -> bool {
        let Some(ctx) = self.context.get() else {
            return false;
        };
        if !ctx.is_running(ticket) {
            return false;
        }
        self.info.set(self.info.get().with_progress(fraction));
        true
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn is_initialized(&self) -> bool {
        self.context.get().is_some()
    }

    pub fn url(&self) -> Option<PluginUrl> {
        self.context.get().map(ContextCell::url)
    }

    pub fn current_state(&self) -> StateId {
        self.info.get().state
    }

    pub fn destination_state(&self) -> StateId {
        self.context
            .get()
            .map_or(StateId::Uninitialized, ContextCell::destination)
    }

    pub fn current_state_info(&self) -> StateInfo {
        self.info.get()
    }

    pub fn is_status_known(&self) -> bool {
        self.context
            .get()
            .is_some_and(|ctx| ctx.borrow().status_known)
    }

    /// 상태를 알기 전에는 항상 `false`
    pub fn is_available(&self) -> bool {
        self.context.get().is_some_and(|ctx| {
            let ctx = ctx.borrow();
            ctx.status_known && ctx.is_available
        })
    }

    /// 구동 중인지 (재진입 가드)
    pub fn is_updating(&self) -> bool {
        self.in_update.get()
    }

    /// 비동기 작업을 기다리는 중인지
    pub fn is_waiting_for_async(&self) -> bool {
        self.context
            .get()
            .is_some_and(|ctx| ctx.borrow().pending_ticket().is_some())
    }

    /// 마지막으로 보고된 결과
    pub fn last_result(&self) -> TransitionResult {
        self.last_result.borrow().clone()
    }

    pub fn plugin_name(&self) -> Option<String> {
        self.context.get().map(|ctx| ctx.borrow().plugin_name.clone())
    }

    pub fn installed_filename(&self) -> Option<PathBuf> {
        self.context
            .get()
            .and_then(|ctx| ctx.borrow().installed_filename.clone())
    }

    pub fn descriptor(&self) -> Option<PluginDescriptor> {
        self.context
            .get()
            .and_then(|ctx| ctx.borrow().descriptor.clone())
    }

    pub fn plugin_data(&self) -> Option<PluginData> {
        self.context
            .get()
            .and_then(|ctx| ctx.borrow().plugin_data.clone())
    }

    /// 마운트된 매니페스트의 의존성 목록
    pub fn dependencies(&self) -> Vec<PluginDependency> {
        self.descriptor()
            .map(|descriptor| descriptor.dependencies)
            .unwrap_or_default()
    }
}

impl Drop for StateMachine {
    fn drop(&mut self) {
        if let Some(ctx) = self.context.get() {
            ctx.cancel_async();
        }
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("url", &self.url().map(|url| url.to_string()))
            .field("current", &self.current_state())
            .field("destination", &self.destination_state())
            .finish()
    }
}
