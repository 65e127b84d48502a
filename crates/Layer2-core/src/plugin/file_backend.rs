//! File Backend - `file:` 플러그인 (로컬 매니페스트)
//!
//! ```text
//! /plugins/Foo/
//! ├── Foo.uplugin        # 매니페스트 (URL의 identifier)
//! └── Content/           # 등록/로드 대상 에셋
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use feature_foundation::{Error, Result, DEFAULT_CONTENT_DIR};

use super::backend::{OpRequest, PluginBackend, PluginData, StatusReport};
use super::dispatch::ProgressSink;
use super::manifest::PluginDescriptor;

// ============================================================================
// LoadedPlugin
// ============================================================================

/// Loading 결과 - `PluginData`로 전달됨
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub descriptor: PluginDescriptor,
    pub root: PathBuf,
    pub assets: Vec<PathBuf>,
}

// ============================================================================
// FileBackend
// ============================================================================

/// 로컬 파일 시스템 백엔드
#[derive(Debug, Clone)]
pub struct FileBackend {
    content_dir_name: String,
}

impl Default for FileBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FileBackend {
    pub fn new() -> Self {
        Self {
            content_dir_name: DEFAULT_CONTENT_DIR.to_string(),
        }
    }

    pub fn with_content_dir(mut self, name: impl Into<String>) -> Self {
        self.content_dir_name = name.into();
        self
    }

    fn plugin_root(manifest: &Path) -> PathBuf {
        manifest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// 매니페스트 경로 - 설치 경로 우선, 없으면 URL
    fn manifest_path(request: &OpRequest) -> Result<PathBuf> {
        if let Some(path) = &request.installed_filename {
            return Ok(path.clone());
        }
        request
            .url
            .manifest_path()
            .ok_or_else(|| Error::NotFound(format!("{} is not installed", request.url)))
    }

    /// `<root>/<content>/**/*` 파일 목록
    pub async fn scan_assets(&self, manifest: &Path) -> Result<Vec<PathBuf>> {
        let content_dir = Self::plugin_root(manifest).join(&self.content_dir_name);
        let pattern = content_dir.join("**").join("*").to_string_lossy().to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let entries = glob::glob(&pattern)
                .map_err(|e| Error::InvalidInput(format!("bad asset pattern {}: {}", pattern, e)))?;
            let mut assets: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .filter(|path| path.is_file())
                .collect();
            assets.sort();
            Ok(assets)
        })
        .await
        .map_err(|e| Error::Internal(format!("asset scan failed: {}", e)))?
    }
}

#[async_trait]
impl PluginBackend for FileBackend {
    async fn query_status(&self, request: &OpRequest) -> Result<StatusReport> {
        let path = Self::manifest_path(request)?;
        if fs::try_exists(&path).await? {
            Ok(StatusReport::installed(path))
        } else {
            debug!("Manifest {:?} does not exist", path);
            Ok(StatusReport::unavailable())
        }
    }

    async fn download(&self, request: &OpRequest, progress: &ProgressSink) -> Result<PathBuf> {
        // 로컬 콘텐츠는 이미 설치된 상태
        let path = Self::manifest_path(request)?;
        if !fs::try_exists(&path).await? {
            return Err(Error::NotFound(format!(
                "Plugin manifest {} does not exist",
                path.display()
            )));
        }
        progress.report(1.0);
        Ok(path)
    }

    async fn uninstall(&self, request: &OpRequest, _progress: &ProgressSink) -> Result<()> {
        debug!("Leaving local content of {} in place", request.url);
        Ok(())
    }

    async fn mount(&self, request: &OpRequest) -> Result<PluginDescriptor> {
        let path = Self::manifest_path(request)?;
        let descriptor = PluginDescriptor::load(&path).await?;
        debug!(
            "Mounted {} v{} ({} dependencies)",
            descriptor.name,
            descriptor.version,
            descriptor.dependencies.len()
        );
        Ok(descriptor)
    }

    async fn register(&self, request: &OpRequest) -> Result<()> {
        let path = Self::manifest_path(request)?;
        let assets = self.scan_assets(&path).await?;
        debug!("Registered {} assets for {}", assets.len(), request.url);
        Ok(())
    }

    async fn load(&self, request: &OpRequest) -> Result<PluginData> {
        let path = Self::manifest_path(request)?;
        let descriptor = request.require_descriptor()?.clone();
        let assets = self.scan_assets(&path).await?;

        info!("Loaded {} ({} assets)", descriptor.display_name(), assets.len());
        Ok(PluginData::new(LoadedPlugin {
            descriptor,
            root: Self::plugin_root(&path),
            assets,
        }))
    }

    async fn activate(&self, request: &OpRequest) -> Result<()> {
        let data = request.require_plugin_data()?;
        match data.downcast_ref::<LoadedPlugin>() {
            Some(loaded) => {
                info!("Activated {}", loaded.descriptor.display_name());
                Ok(())
            }
            None => Err(Error::Internal(format!(
                "{} was loaded by a different backend",
                request.url
            ))),
        }
    }
}
