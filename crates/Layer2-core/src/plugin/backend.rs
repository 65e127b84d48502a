//! Plugin Backend - 상태 머신이 위임하는 외부 작업
//!
//! 상태 객체는 직접 I/O를 하지 않고, 비동기 작업을 [`PluginBackend`]에
//! 요청합니다. 결과는 큐를 통해 머신 스레드로 돌아옵니다 (`dispatch` 참고).

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use feature_foundation::{Error, FeatureConfig, Result};

use super::dispatch::ProgressSink;
use super::file_backend::FileBackend;
use super::manifest::PluginDescriptor;
use super::store::InstallStore;
use super::url::{PluginProtocol, PluginUrl};
use super::web_backend::WebBackend;

// ============================================================================
// PluginData - Loading이 만들고 Unloading이 회수하는 불투명 핸들
// ============================================================================

/// 로드된 플러그인 데이터 (백엔드마다 타입이 다름)
#[derive(Clone)]
pub struct PluginData(Arc<dyn Any + Send + Sync>);

impl PluginData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for PluginData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PluginData(..)")
    }
}

// ============================================================================
// 요청 / 응답
// ============================================================================

/// CheckingStatus 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// 설치(다운로드) 가능 여부
    pub available: bool,
    /// 이미 설치되어 있는지
    pub installed: bool,
    /// 설치된 매니페스트 경로
    pub installed_filename: Option<PathBuf>,
}

impl StatusReport {
    pub fn installed(path: impl Into<PathBuf>) -> Self {
        Self {
            available: true,
            installed: true,
            installed_filename: Some(path.into()),
        }
    }

    pub fn available() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// 작업 요청 - 컨텍스트의 스냅샷 (작업 스레드로 이동 가능)
#[derive(Debug, Clone)]
pub struct OpRequest {
    pub url: PluginUrl,
    pub installed_filename: Option<PathBuf>,
    pub descriptor: Option<PluginDescriptor>,
    pub plugin_data: Option<PluginData>,
}

impl OpRequest {
    pub fn new(url: PluginUrl) -> Self {
        Self {
            url,
            installed_filename: None,
            descriptor: None,
            plugin_data: None,
        }
    }

    /// 설치된 매니페스트 경로 (없으면 에러)
    pub fn require_installed_filename(&self) -> Result<&PathBuf> {
        self.installed_filename
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("{} is not installed", self.url)))
    }

    pub fn require_descriptor(&self) -> Result<&PluginDescriptor> {
        self.descriptor
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("{} has no mounted descriptor", self.url)))
    }

    pub fn require_plugin_data(&self) -> Result<&PluginData> {
        self.plugin_data
            .as_ref()
            .ok_or_else(|| Error::Internal(format!("{} has no loaded plugin data", self.url)))
    }
}

/// 작업 결과
#[derive(Debug, Clone)]
pub enum OpOutput {
    Status(StatusReport),
    Installed(PathBuf),
    Mounted(PluginDescriptor),
    Loaded(PluginData),
    Done,
}

/// 비동기 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    QueryStatus,
    Download,
    Uninstall,
    Mount,
    Unmount,
    Register,
    Unregister,
    Load,
    Unload,
    Activate,
    Deactivate,
}

impl BackendOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryStatus => "query_status",
            Self::Download => "download",
            Self::Uninstall => "uninstall",
            Self::Mount => "mount",
            Self::Unmount => "unmount",
            Self::Register => "register",
            Self::Unregister => "unregister",
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }

    /// 백엔드 호출
    pub async fn run(
        self,
        backend: &dyn PluginBackend,
        request: &OpRequest,
        progress: &ProgressSink,
    ) -> Result<OpOutput> {
        match self {
            Self::QueryStatus => backend.query_status(request).await.map(OpOutput::Status),
            Self::Download => backend
                .download(request, progress)
                .await
                .map(OpOutput::Installed),
            Self::Uninstall => backend
                .uninstall(request, progress)
                .await
                .map(|_| OpOutput::Done),
            Self::Mount => backend.mount(request).await.map(OpOutput::Mounted),
            Self::Unmount => backend.unmount(request).await.map(|_| OpOutput::Done),
            Self::Register => backend.register(request).await.map(|_| OpOutput::Done),
            Self::Unregister => backend.unregister(request).await.map(|_| OpOutput::Done),
            Self::Load => backend.load(request).await.map(OpOutput::Loaded),
            Self::Unload => backend.unload(request).await.map(|_| OpOutput::Done),
            Self::Activate => backend.activate(request).await.map(|_| OpOutput::Done),
            Self::Deactivate => backend.deactivate(request).await.map(|_| OpOutput::Done),
        }
    }
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PluginBackend trait
// ============================================================================

/// 플러그인 작업 백엔드
///
/// 모든 메서드는 런타임 작업 스레드에서 실행되므로 `Send + Sync`여야 합니다.
/// 되돌리기 작업(unmount, unregister, unload, deactivate)은 기본적으로 성공합니다.
#[async_trait]
pub trait PluginBackend: Send + Sync {
    /// 가용성 / 설치 여부 조회
    async fn query_status(&self, request: &OpRequest) -> Result<StatusReport>;

    /// 설치 후 매니페스트 경로 반환
    async fn download(&self, request: &OpRequest, progress: &ProgressSink) -> Result<PathBuf>;

    async fn uninstall(&self, request: &OpRequest, progress: &ProgressSink) -> Result<()>;

    /// 매니페스트 로드
    async fn mount(&self, request: &OpRequest) -> Result<PluginDescriptor>;

    async fn unmount(&self, _request: &OpRequest) -> Result<()> {
        Ok(())
    }

    async fn register(&self, request: &OpRequest) -> Result<()>;

    async fn unregister(&self, _request: &OpRequest) -> Result<()> {
        Ok(())
    }

    async fn load(&self, request: &OpRequest) -> Result<PluginData>;

    async fn unload(&self, _request: &OpRequest) -> Result<()> {
        Ok(())
    }

    async fn activate(&self, _request: &OpRequest) -> Result<()> {
        Ok(())
    }

    async fn deactivate(&self, _request: &OpRequest) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// ProtocolBackend - 프로토콜별 라우팅
// ============================================================================

/// `file:` 은 FileBackend, `web:` 은 WebBackend로 라우팅
pub struct ProtocolBackend {
    file: Arc<FileBackend>,
    web: Option<Arc<WebBackend>>,
}

impl ProtocolBackend {
    pub fn new(file: FileBackend) -> Self {
        Self {
            file: Arc::new(file),
            web: None,
        }
    }

    /// 설정으로 생성 (`webBaseUrl`이 있을 때만 `web:` 활성화)
    pub async fn from_config(config: &FeatureConfig) -> Result<Self> {
        let files = FileBackend::new().with_content_dir(config.content_dir_name());
        let mut backend = Self::new(files.clone());

        if let Some(base_url) = config.web_base_url.as_deref() {
            let store = InstallStore::open(config.install_dir()).await?;
            let web = WebBackend::new(Arc::new(store))
                .with_base_url(base_url)
                .with_files(files);
            backend = backend.with_web(web);
        }
        Ok(backend)
    }

    pub fn with_web(mut self, web: WebBackend) -> Self {
        self.web = Some(Arc::new(web));
        self
    }

    fn route(&self, url: &PluginUrl) -> Result<&dyn PluginBackend> {
        match url.protocol() {
            PluginProtocol::File => Ok(self.file.as_ref()),
            PluginProtocol::Web => self
                .web
                .as_deref()
                .map(|web| web as &dyn PluginBackend)
                .ok_or_else(|| Error::Config("web protocol is not configured".into())),
        }
    }
}

#[async_trait]
impl PluginBackend for ProtocolBackend {
    async fn query_status(&self, request: &OpRequest) -> Result<StatusReport> {
        self.route(&request.url)?.query_status(request).await
    }

    async fn download(&self, request: &OpRequest, progress: &ProgressSink) -> Result<PathBuf> {
        self.route(&request.url)?.download(request, progress).await
    }

    async fn uninstall(&self, request: &OpRequest, progress: &ProgressSink) -> Result<()> {
        self.route(&request.url)?.uninstall(request, progress).await
    }

    async fn mount(&self, request: &OpRequest) -> Result<PluginDescriptor> {
        self.route(&request.url)?.mount(request).await
    }

    async fn unmount(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.unmount(request).await
    }

    async fn register(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.register(request).await
    }

    async fn unregister(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.unregister(request).await
    }

    async fn load(&self, request: &OpRequest) -> Result<PluginData> {
        self.route(&request.url)?.load(request).await
    }

    async fn unload(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.unload(request).await
    }

    async fn activate(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.activate(request).await
    }

    async fn deactivate(&self, request: &OpRequest) -> Result<()> {
        self.route(&request.url)?.deactivate(request).await
    }
}
