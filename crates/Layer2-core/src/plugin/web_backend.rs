//! Web Backend - `web:<key>` 플러그인 (원격 아카이브)
//!
//! `<webBaseUrl>/<key>.tar.gz`를 내려받아 설치 디렉토리에 풀고,
//! 이후 작업은 풀린 매니페스트에 대해 [`FileBackend`]로 위임합니다.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use feature_foundation::{Error, Result};

use super::backend::{OpRequest, PluginBackend, PluginData, StatusReport};
use super::dispatch::ProgressSink;
use super::file_backend::FileBackend;
use super::manifest::PluginDescriptor;
use super::store::{InstallStore, InstalledPlugin};
use super::url::MANIFEST_EXTENSION;

const USER_AGENT: &str = "FeatureForge";

/// 원격 배포 백엔드
pub struct WebBackend {
    client: Client,
    base_url: Option<String>,
    store: Arc<InstallStore>,
    files: FileBackend,
    /// 다운로드 임시 디렉토리의 상위 경로
    temp_root: PathBuf,
}

impl WebBackend {
    pub fn new(store: Arc<InstallStore>) -> Self {
        Self {
            client: Client::new(),
            base_url: None,
            store,
            files: FileBackend::new(),
            temp_root: std::env::temp_dir(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_files(mut self, files: FileBackend) -> Self {
        self.files = files;
        self
    }

    pub fn store(&self) -> &Arc<InstallStore> {
        &self.store
    }

    /// 패키지 아카이브 URL
    pub fn archive_url(&self, key: &str) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("webBaseUrl is not configured".into()))?;
        Ok(format!("{}/{}.tar.gz", base.trim_end_matches('/'), key))
    }

    /// 설치 기록이 있고 매니페스트가 남아 있으면 그 경로
    async fn installed_manifest(&self, key: &str) -> Result<Option<PathBuf>> {
        match self.store.get(key).await {
            Some(record) if fs::try_exists(&record.manifest).await? => Ok(Some(record.manifest)),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // 다운로드 / 설치
    // ========================================================================

    async fn install(&self, key: &str, progress: &ProgressSink) -> Result<PathBuf> {
        let url = self.archive_url(key)?;
        info!("Installing {} from {}", key, url);

        // 작업이 중단되어 future가 드롭되어도 TempDir가 정리됨
        fs::create_dir_all(&self.temp_root).await?;
        let temp_dir = tempfile::Builder::new()
            .prefix("featureforge_")
            .tempdir_in(&self.temp_root)?;

        let archive = temp_dir.path().join("archive.tar.gz");
        self.download_file(&url, &archive, progress).await?;
        self.install_archive(&archive, key, &url).await
    }

    /// 아카이브를 패키지 디렉토리에 풀고 설치 기록
    async fn install_archive(&self, archive: &Path, key: &str, url: &str) -> Result<PathBuf> {
        self.store.remove_plugin_dir(key).await?;
        let target_dir = self.store.create_plugin_dir(key).await?;
        let partial = PartialInstall::new(&target_dir);

        extract_tarball(archive, &target_dir).await?;

        let manifest = find_manifest(&target_dir).await?;
        let descriptor = PluginDescriptor::load(&manifest).await?;

        let record = InstalledPlugin::new(key, url, &target_dir, &manifest)
            .with_name(descriptor.display_name())
            .with_version(descriptor.version.to_string());
        self.store.record_install(record).await?;
        partial.keep();

        info!("Installed {} v{}", key, descriptor.version);
        Ok(manifest)
    }

    /// 스트리밍 다운로드 (content-length 기준 진행률)
    async fn download_file(&self, url: &str, dest: &Path, progress: &ProgressSink) -> Result<()> {
        debug!("Downloading {} to {:?}", url, dest);

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::download(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::download(url, format!("HTTP {}", response.status())));
        }

        let total = response.content_length().filter(|&len| len > 0);
        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::download(url, e.to_string()))?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if let Some(total) = total {
                progress.report(received as f32 / total as f32);
            }
        }
        file.flush().await?;

        debug!("Downloaded {} bytes from {}", received, url);
        Ok(())
    }
}

/// 설치가 기록되기 전에 실패하거나 중단되면 풀던 패키지 디렉토리 삭제
struct PartialInstall {
    dir: Option<PathBuf>,
}

impl PartialInstall {
    fn new(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
        }
    }

    fn keep(mut self) {
        self.dir = None;
    }
}

impl Drop for PartialInstall {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            debug!("Removing partial install {:?}", dir);
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial install {:?}: {}", dir, e);
                }
            }
        }
    }
}

/// tar -xzf 로 압축 해제
async fn extract_tarball(archive: &Path, dest: &Path) -> Result<()> {
    debug!("Extracting {:?} to {:?}", archive, dest);

    let archive = archive.to_string_lossy().to_string();
    let dest = dest.to_string_lossy().to_string();
    let output = tokio::process::Command::new("tar")
        .args(["-xzf", archive.as_str(), "-C", dest.as_str()])
        .output()
        .await?;

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "Failed to extract archive: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// 풀린 디렉토리에서 매니페스트 찾기 (최상위 또는 한 단계 아래)
async fn find_manifest(dir: &Path) -> Result<PathBuf> {
    let patterns = [
        dir.join(format!("*.{}", MANIFEST_EXTENSION)),
        dir.join("*").join(format!("*.{}", MANIFEST_EXTENSION)),
    ];

    for pattern in patterns {
        let pattern = pattern.to_string_lossy().to_string();
        let found = tokio::task::spawn_blocking(move || {
            glob::glob(&pattern)
                .ok()
                .and_then(|mut entries| entries.find_map(|entry| entry.ok()))
        })
        .await
        .map_err(|e| Error::Internal(format!("manifest search failed: {}", e)))?;

        if let Some(path) = found {
            return Ok(path);
        }
    }

    Err(Error::NotFound(format!(
        "No .{} manifest found in {}",
        MANIFEST_EXTENSION,
        dir.display()
    )))
}

#[async_trait]
impl PluginBackend for WebBackend {
    async fn query_status(&self, request: &OpRequest) -> Result<StatusReport> {
        let key = request.url.identifier();
        if let Some(manifest) = self.installed_manifest(key).await? {
            return Ok(StatusReport::installed(manifest));
        }

        let url = self.archive_url(key)?;
        let response = self
            .client
            .head(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(StatusReport::available())
        } else {
            debug!("{} is not available: HTTP {}", url, response.status());
            Ok(StatusReport::unavailable())
        }
    }

    async fn download(&self, request: &OpRequest, progress: &ProgressSink) -> Result<PathBuf> {
        let key = request.url.identifier();
        if let Some(manifest) = self.installed_manifest(key).await? {
            debug!("{} already installed", key);
            progress.report(1.0);
            return Ok(manifest);
        }
        self.install(key, progress).await
    }

    async fn uninstall(&self, request: &OpRequest, progress: &ProgressSink) -> Result<()> {
        let key = request.url.identifier();
        self.store.remove_plugin_dir(key).await?;
        progress.report(0.5);
        self.store.record_uninstall(key).await?;
        progress.report(1.0);
        Ok(())
    }

    async fn mount(&self, request: &OpRequest) -> Result<PluginDescriptor> {
        request.require_installed_filename()?;
        self.files.mount(request).await
    }

    async fn unmount(&self, request: &OpRequest) -> Result<()> {
        self.files.unmount(request).await
    }

    async fn register(&self, request: &OpRequest) -> Result<()> {
        request.require_installed_filename()?;
        self.files.register(request).await
    }

    async fn unregister(&self, request: &OpRequest) -> Result<()> {
        self.files.unregister(request).await
    }

    async fn load(&self, request: &OpRequest) -> Result<PluginData> {
        request.require_installed_filename()?;
        self.files.load(request).await
    }

    async fn unload(&self, request: &OpRequest) -> Result<()> {
        self.files.unload(request).await
    }

    async fn activate(&self, request: &OpRequest) -> Result<()> {
        self.files.activate(request).await
    }

    async fn deactivate(&self, request: &OpRequest) -> Result<()> {
        self.files.deactivate(request).await
    }
}
