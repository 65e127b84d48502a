//! feature-core: Core Runtime for FeatureForge
//!
//! Layer2 - 플러그인 라이프사이클 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 상태 머신, 상태 객체, 백엔드(file:/web:), 설치 저장소, 서브시스템
//!
//! # 사용 예시
//!
//! ```ignore
//! use feature_core::{PluginSubsystem, ProtocolBackend, StateId, SubsystemConfig};
//!
//! let config = FeatureConfig::load()?;
//! let backend = ProtocolBackend::from_config(&config).await?;
//! let subsystem = PluginSubsystem::new(Arc::new(backend), SubsystemConfig::from(&config));
//!
//! // Foo를 Active까지
//! subsystem.change_plugin_state("file:/plugins/Foo/Foo.uplugin", StateId::Active, |m, result| {
//!     println!("{} finished: {:?}", m.current_state(), result);
//! })?;
//! subsystem.run_until_idle().await;
//! ```

pub mod plugin;

// Re-exports: State machine
pub use plugin::{
    CompletionCallback, DependencyResolver, Direction, State, StateChangedHandler, StateId,
    StateInfo, StateMachine, StateStatus, TransitionError, TransitionResult,
    TransitionResultHandler,
};

// Re-exports: Subsystem
pub use plugin::{PluginSubsystem, SubsystemConfig, SubsystemSummary};

// Re-exports: Backends
pub use plugin::{
    FileBackend, InstallStore, InstalledPlugin, LoadedPlugin, OpRequest, PluginBackend,
    PluginData, ProgressSink, ProtocolBackend, StatusReport, WebBackend,
};

// Re-exports: Manifest / URL
pub use plugin::{
    PluginDependency, PluginDescriptor, PluginProtocol, PluginUrl, PluginVersion,
};
