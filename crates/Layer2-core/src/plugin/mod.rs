//! # Plugin Lifecycle
//!
//! 플러그인 하나마다 상태 머신 하나가 라이프사이클을 관리합니다.
//!
//! ## 개요
//!
//! - 호출자는 목적지 상태만 요청 (`set_destination_state`)
//! - 머신은 중간 상태를 하나씩 거치며, 비동기 작업은 백엔드에 위임
//! - 의존 플러그인은 Registered 이상이 된 뒤에 등록 진행
//! - 실패 메시지는 가장 깊은 단계에서 완료 콜백까지 그대로 전달
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginSubsystem                         │
//! │  ┌───────────────┬───────────────┬───────────────────────┐  │
//! │  │ StateMachine  │ StateMachine  │ StateMachine          │  │
//! │  │ file:Foo      │ file:Bar      │ web:Baz               │  │
//! │  │ [State; 19]   │ [State; 19]   │ [State; 19]           │  │
//! │  └───────┬───────┴───────┬───────┴───────────┬───────────┘  │
//! │          │  Dispatcher (tokio::spawn)        │              │
//! │          ▼                                   ▼              │
//! │   ProtocolBackend ── FileBackend / WebBackend (+InstallStore)│
//! │          │                                                  │
//! │          └──▶ AsyncMessage queue ──▶ pump ──▶ StateMachine  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let backend = ProtocolBackend::from_config(&config).await?;
//! let subsystem = PluginSubsystem::new(Arc::new(backend), SubsystemConfig::from(&config));
//!
//! subsystem.activate_plugin("file:/plugins/Foo/Foo.uplugin", |machine, result| {
//!     println!("{:?} -> {:?}", machine.current_state(), result);
//! })?;
//! subsystem.run_until_idle().await;
//! ```

mod backend;
mod context;
mod dispatch;
mod events;
mod file_backend;
mod machine;
mod manifest;
mod result;
mod state;
mod states;
mod store;
mod subsystem;
mod url;
mod web_backend;

pub use backend::{
    BackendOp, OpOutput, OpRequest, PluginBackend, PluginData, ProtocolBackend, StatusReport,
};
pub use context::{CompletionCallback, ContextCell, DependencyResolver, SharedContext, UpdateRequest};
pub use dispatch::{AsyncMessage, Dispatcher, PendingOp, ProgressSink};
pub use events::{state_changed, transition_finished, PluginEventKind, EVENT_SOURCE};
pub use file_backend::{FileBackend, LoadedPlugin};
pub use machine::{StateChangedHandler, StateMachine, TransitionResultHandler};
pub use manifest::{PluginDependency, PluginDescriptor, PluginVersion};
pub use result::{TransitionError, TransitionResult};
pub use state::{Direction, State, StateId, StateInfo, StateStatus};
pub use store::{InstallStore, InstalledPlugin, InstalledPluginsFile, INSTALLED_FILE};
pub use subsystem::{PluginSubsystem, SubsystemConfig, SubsystemSummary};
pub use url::{PluginProtocol, PluginUrl, MANIFEST_EXTENSION};
pub use web_backend::WebBackend;
