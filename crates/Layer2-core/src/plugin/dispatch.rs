//! Async Dispatch - 백엔드 작업 실행과 결과 회수
//!
//! 머신은 단일 스레드에서만 구동됩니다. 작업은 tokio 런타임에서 실행되고,
//! 완료/진행률은 [`AsyncMessage`]로 큐에 쌓여 구독 스레드가 꺼내 처리합니다.
//!
//! ```text
//! State::begin_state ──spawn──▶ tokio task ──▶ PluginBackend
//!        ▲                          │
//!        │                          ▼
//!   request_update ◀── pump ◀── AsyncMessage queue
//! ```

use futures::FutureExt;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use feature_foundation::{Error, Result};

use super::backend::{BackendOp, OpOutput, OpRequest, PluginBackend};
use super::url::PluginUrl;

// ============================================================================
// AsyncMessage
// ============================================================================

/// 작업 스레드에서 머신 스레드로 전달되는 메시지
#[derive(Debug)]
pub enum AsyncMessage {
    Completed {
        url: PluginUrl,
        ticket: u64,
        outcome: Result<OpOutput>,
    },
    Progress {
        url: PluginUrl,
        ticket: u64,
        fraction: f32,
    },
}

// ============================================================================
// ProgressSink
// ============================================================================

/// 백엔드가 진행률을 보고하는 채널
#[derive(Debug, Clone)]
pub struct ProgressSink {
    url: PluginUrl,
    ticket: u64,
    sender: Option<mpsc::UnboundedSender<AsyncMessage>>,
}

impl ProgressSink {
    fn new(url: PluginUrl, ticket: u64, sender: mpsc::UnboundedSender<AsyncMessage>) -> Self {
        Self {
            url,
            ticket,
            sender: Some(sender),
        }
    }

    /// 보고를 버리는 싱크 (백엔드 단독 테스트용)
    pub fn detached(url: PluginUrl) -> Self {
        Self {
            url,
            ticket: 0,
            sender: None,
        }
    }

    /// 진행률 보고 (0.0 ~ 1.0)
    pub fn report(&self, fraction: f32) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(AsyncMessage::Progress {
                url: self.url.clone(),
                ticket: self.ticket,
                fraction: fraction.clamp(0.0, 1.0),
            });
        }
    }
}

// ============================================================================
// PendingOp
// ============================================================================

/// 상태가 기다리는 진행 중 작업
#[derive(Debug)]
pub struct PendingOp {
    ticket: u64,
    op: BackendOp,
    handle: Option<JoinHandle<()>>,
    outcome: Option<Result<OpOutput>>,
}

impl PendingOp {
    fn running(ticket: u64, op: BackendOp, handle: JoinHandle<()>) -> Self {
        Self {
            ticket,
            op,
            handle: Some(handle),
            outcome: None,
        }
    }

    fn settled(ticket: u64, op: BackendOp, outcome: Result<OpOutput>) -> Self {
        Self {
            ticket,
            op,
            handle: None,
            outcome: Some(outcome),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn op(&self) -> BackendOp {
        self.op
    }

    /// 결과가 도착했는지
    pub fn is_settled(&self) -> bool {
        self.handle.is_none()
    }

    /// 같은 티켓의 결과만 받아들임
    pub(crate) fn accept(&mut self, ticket: u64, outcome: Result<OpOutput>) -> bool {
        if ticket != self.ticket || self.is_settled() {
            return false;
        }
        self.handle = None;
        self.outcome = Some(outcome);
        true
    }

    pub(crate) fn take_outcome(&mut self) -> Option<Result<OpOutput>> {
        self.outcome.take()
    }

    /// 아직 실행 중이면 중단
    pub(crate) fn cancel(mut self, dispatcher: &Dispatcher) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            dispatcher.settle();
            debug!(op = %self.op, ticket = self.ticket, "Cancelled backend operation");
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct DispatcherInner {
    backend: Arc<dyn PluginBackend>,
    sender: mpsc::UnboundedSender<AsyncMessage>,
    in_flight: Cell<usize>,
    next_ticket: Cell<u64>,
}

/// 백엔드 작업 실행기 (머신 스레드 전용, 복제 가능)
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<DispatcherInner>,
}

impl Dispatcher {
    /// 디스패처와 결과 큐 수신단 생성
    pub fn new(backend: Arc<dyn PluginBackend>) -> (Self, mpsc::UnboundedReceiver<AsyncMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = Self {
            inner: Rc::new(DispatcherInner {
                backend,
                sender,
                in_flight: Cell::new(0),
                next_ticket: Cell::new(1),
            }),
        };
        (dispatcher, receiver)
    }

    /// 작업 시작
    ///
    /// 런타임이 없으면 즉시 실패한 작업을 반환합니다.
    pub fn spawn(&self, op: BackendOp, request: OpRequest) -> PendingOp {
        let ticket = self.inner.next_ticket.get();
        self.inner.next_ticket.set(ticket + 1);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(url = %request.url, op = %op, "No async runtime, failing operation");
                return PendingOp::settled(
                    ticket,
                    op,
                    Err(Error::Internal("no async runtime available".into())),
                );
            }
        };

        let url = request.url.clone();
        let backend = Arc::clone(&self.inner.backend);
        let sender = self.inner.sender.clone();
        let progress = ProgressSink::new(url.clone(), ticket, sender.clone());

        self.inner.in_flight.set(self.inner.in_flight.get() + 1);
        debug!(url = %url, op = %op, ticket, "Dispatching backend operation");

        let handle = runtime.spawn(async move {
            let outcome = AssertUnwindSafe(op.run(backend.as_ref(), &request, &progress))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(Error::Internal(format!("{} operation panicked", op))));

            let _ = sender.send(AsyncMessage::Completed {
                url,
                ticket,
                outcome,
            });
        });

        PendingOp::running(ticket, op, handle)
    }

    /// 결과가 회수되었거나 취소된 작업 정리
    pub(crate) fn settle(&self) {
        let count = self.inner.in_flight.get();
        self.inner.in_flight.set(count.saturating_sub(1));
    }

    /// 결과를 기다리는 작업 수
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.get()
    }
}
