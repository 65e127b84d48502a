//! Shared Context - 한 머신의 상태 객체들이 공유하는 데이터
//!
//! 머신 초기화 시 생성되며, 같은 머신의 상태 객체와 드라이버만 수정합니다.
//! 대여는 항상 짧게: 콜백이나 형제 머신을 호출하기 전에 반드시 해제합니다.

use std::cell::{Ref, RefCell, RefMut};
use std::path::PathBuf;
use std::rc::Rc;

use feature_foundation::Result;

use super::backend::{BackendOp, OpOutput, OpRequest, PluginData};
use super::dispatch::{Dispatcher, PendingOp};
use super::machine::StateMachine;
use super::manifest::PluginDescriptor;
use super::result::TransitionResult;
use super::state::StateId;
use super::url::PluginUrl;

// ============================================================================
// 콜백 타입
// ============================================================================

/// 전이 완료 콜백 - 목적지 도달(또는 실패) 시 정확히 한 번 호출
pub type CompletionCallback = Box<dyn FnOnce(&StateMachine, TransitionResult)>;

/// 의존성 해석 - 이 플러그인이 의존하는 형제 머신 목록
pub type DependencyResolver = Rc<dyn Fn(&PluginUrl) -> Result<Vec<Rc<StateMachine>>>>;

/// 자기 머신 재구동 요청
pub type UpdateRequest = Rc<dyn Fn()>;

// ============================================================================
// SharedContext
// ============================================================================

/// 머신 단위 공유 데이터
pub struct SharedContext {
    pub url: PluginUrl,
    pub plugin_name: String,
    pub destination: StateId,

    // 상태 조회 결과
    pub status_known: bool,
    pub is_available: bool,
    pub installed_filename: Option<PathBuf>,

    /// Mounting에서 채워지고 Unmounting에서 비워짐
    pub descriptor: Option<PluginDescriptor>,
    /// Loading에서 채워지고 Unloading에서 비워짐
    pub plugin_data: Option<PluginData>,

    /// 의존 플러그인을 Registered까지 직접 끌어올릴지
    pub drive_dependencies: bool,

    pub on_transition_complete: Option<CompletionCallback>,
    pub on_request_dependency_machines: DependencyResolver,
    pub on_request_update: UpdateRequest,

    dispatcher: Dispatcher,
    pending: Option<PendingOp>,
}

impl SharedContext {
    pub fn new(
        url: PluginUrl,
        dispatcher: Dispatcher,
        resolver: DependencyResolver,
        request_update: UpdateRequest,
    ) -> Self {
        Self {
            plugin_name: url.default_name(),
            url,
            destination: StateId::Uninitialized,
            status_known: false,
            is_available: false,
            installed_filename: None,
            descriptor: None,
            plugin_data: None,
            drive_dependencies: true,
            on_transition_complete: None,
            on_request_dependency_machines: resolver,
            on_request_update: request_update,
            dispatcher,
            pending: None,
        }
    }

    /// 현재 컨텍스트로 작업 요청 생성
    pub fn op_request(&self) -> OpRequest {
        OpRequest {
            url: self.url.clone(),
            installed_filename: self.installed_filename.clone(),
            descriptor: self.descriptor.clone(),
            plugin_data: self.plugin_data.clone(),
        }
    }

    pub fn pending_ticket(&self) -> Option<u64> {
        self.pending.as_ref().map(PendingOp::ticket)
    }
}

// ============================================================================
// ContextCell
// ============================================================================

/// `SharedContext`의 내부 가변 셀
pub struct ContextCell(RefCell<SharedContext>);

impl ContextCell {
    pub fn new(context: SharedContext) -> Self {
        Self(RefCell::new(context))
    }

    pub fn borrow(&self) -> Ref<'_, SharedContext> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, SharedContext> {
        self.0.borrow_mut()
    }

    pub fn url(&self) -> PluginUrl {
        self.borrow().url.clone()
    }

    pub fn destination(&self) -> StateId {
        self.borrow().destination
    }

    /// 자기 머신 재구동 (대여 없이 호출)
    pub fn request_update(&self) {
        let request = Rc::clone(&self.borrow().on_request_update);
        request();
    }

    /// 의존 형제 머신 조회 (대여 없이 호출)
    pub fn request_dependency_machines(&self) -> Result<Vec<Rc<StateMachine>>> {
        let (resolver, url) = {
            let ctx = self.borrow();
            (Rc::clone(&ctx.on_request_dependency_machines), ctx.url.clone())
        };
        resolver(&url)
    }

    // ========================================================================
    // 비동기 작업
    // ========================================================================

    /// 작업 시작 (이전 작업은 취소)
    pub fn start_async(&self, op: BackendOp) {
        let mut ctx = self.borrow_mut();
        let request = ctx.op_request();
        let pending = ctx.dispatcher.spawn(op, request);
        if let Some(previous) = ctx.pending.replace(pending) {
            previous.cancel(&ctx.dispatcher);
        }
    }

    /// 도착한 결과 꺼내기 (아직이면 `None`)
    pub fn take_async_outcome(&self) -> Option<Result<OpOutput>> {
        let mut ctx = self.borrow_mut();
        let outcome = ctx.pending.as_mut().and_then(PendingOp::take_outcome);
        if outcome.is_some() {
            ctx.pending = None;
        }
        outcome
    }

    /// 진행 중 작업 취소
    pub fn cancel_async(&self) {
        let mut ctx = self.borrow_mut();
        if let Some(pending) = ctx.pending.take() {
            pending.cancel(&ctx.dispatcher);
        }
    }

    /// 작업 결과 수신. 티켓이 맞을 때만 받아들임
    pub(crate) fn accept_async_outcome(&self, ticket: u64, outcome: Result<OpOutput>) -> bool {
        let mut ctx = self.borrow_mut();
        let accepted = ctx
            .pending
            .as_mut()
            .is_some_and(|pending| pending.accept(ticket, outcome));
        if accepted {
            ctx.dispatcher.settle();
        }
        accepted
    }

    /// 진행 중 작업의 티켓인지 (진행률 메시지 검증용)
    pub(crate) fn is_running(&self, ticket: u64) -> bool {
        self.borrow()
            .pending
            .as_ref()
            .is_some_and(|pending| pending.ticket() == ticket && !pending.is_settled())
    }
}
