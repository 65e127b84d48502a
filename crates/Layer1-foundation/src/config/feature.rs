//! Feature Config - 통합 설정
//!
//! 글로벌 설정과 프로젝트 설정을 병합하여 사용합니다.

use crate::storage::{JsonStore, APP_DIR_NAME};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 설정 파일명
pub const FEATURE_CONFIG_FILE: &str = "config.json";

/// 기본 컨텐츠 디렉토리 이름
pub const DEFAULT_CONTENT_DIR: &str = "Content";

/// 기본 이벤트 히스토리 크기
pub const DEFAULT_EVENT_HISTORY: usize = 100;

// ============================================================================
// Feature Config (통합)
// ============================================================================

/// FeatureForge 통합 설정
///
/// 값이 없는 항목은 접근자에서 기본값으로 대체됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// `web:` 플러그인 배포 서버 주소
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_base_url: Option<String>,

    /// `web:` 플러그인 설치 디렉토리
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// 의존성 플러그인을 Registered 까지 자동으로 구동할지 여부
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_dependencies: Option<bool>,

    /// 플러그인 내부 에셋 디렉토리 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_dir_name: Option<String>,

    /// 이벤트 히스토리 보관 개수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_history_size: Option<usize>,
}

impl FeatureConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let global = JsonStore::global().ok();
        let project = JsonStore::current_project().ok();
        Self::load_from(global.as_ref(), project.as_ref())
    }

    /// 지정된 저장소들에서 병합 로드 (project가 우선)
    pub fn load_from(global: Option<&JsonStore>, project: Option<&JsonStore>) -> Result<Self> {
        let mut config = Self::new();

        for store in [global, project].into_iter().flatten() {
            if let Some(loaded) = store.load_optional::<FeatureConfig>(FEATURE_CONFIG_FILE)? {
                config.merge(loaded);
            }
        }

        Ok(config)
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(FEATURE_CONFIG_FILE, self)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(FEATURE_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: FeatureConfig) {
        if other.web_base_url.is_some() {
            self.web_base_url = other.web_base_url;
        }
        if other.install_dir.is_some() {
            self.install_dir = other.install_dir;
        }
        if other.drive_dependencies.is_some() {
            self.drive_dependencies = other.drive_dependencies;
        }
        if other.content_dir_name.is_some() {
            self.content_dir_name = other.content_dir_name;
        }
        if other.event_history_size.is_some() {
            self.event_history_size = other.event_history_size;
        }
    }

    // ========================================================================
    // 접근자 (기본값 적용)
    // ========================================================================

    pub fn install_dir(&self) -> PathBuf {
        self.install_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("plugins")
        })
    }

    pub fn drive_dependencies(&self) -> bool {
        self.drive_dependencies.unwrap_or(true)
    }

    pub fn content_dir_name(&self) -> &str {
        self.content_dir_name.as_deref().unwrap_or(DEFAULT_CONTENT_DIR)
    }

    pub fn event_history_size(&self) -> usize {
        self.event_history_size.unwrap_or(DEFAULT_EVENT_HISTORY)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_web_base_url(mut self, url: impl Into<String>) -> Self {
        self.web_base_url = Some(url.into());
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_drive_dependencies(mut self, drive: bool) -> Self {
        self.drive_dependencies = Some(drive);
        self
    }
}

fn default_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_feature_config_default() {
        let config = FeatureConfig::new();
        assert_eq!(config.version, 1);
        assert!(config.web_base_url.is_none());
        assert!(config.drive_dependencies());
        assert_eq!(config.content_dir_name(), "Content");
        assert_eq!(config.event_history_size(), 100);
    }

    #[test]
    fn test_config_merge() {
        let mut base = FeatureConfig::new().with_web_base_url("https://cdn.example.com");

        let overlay = FeatureConfig::new()
            .with_install_dir("/opt/plugins")
            .with_drive_dependencies(false);

        base.merge(overlay);

        assert_eq!(base.web_base_url.as_deref(), Some("https://cdn.example.com"));
        assert_eq!(base.install_dir(), PathBuf::from("/opt/plugins"));
        assert!(!base.drive_dependencies());
    }

    #[test]
    fn test_load_project_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = JsonStore::new(temp.path().join("global"));
        let project = JsonStore::new(temp.path().join("project"));

        global
            .save(
                FEATURE_CONFIG_FILE,
                &FeatureConfig::new()
                    .with_web_base_url("https://global.example.com")
                    .with_drive_dependencies(false),
            )
            .unwrap();
        project
            .save(
                FEATURE_CONFIG_FILE,
                &FeatureConfig::new().with_web_base_url("https://project.example.com"),
            )
            .unwrap();

        let config = FeatureConfig::load_from(Some(&global), Some(&project)).unwrap();
        assert_eq!(config.web_base_url.as_deref(), Some("https://project.example.com"));
        assert!(!config.drive_dependencies());
    }

    #[test]
    fn test_camel_case_keys() {
        let json = r#"{ "webBaseUrl": "https://x", "contentDirName": "Assets" }"#;
        let config: FeatureConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.web_base_url.as_deref(), Some("https://x"));
        assert_eq!(config.content_dir_name(), "Assets");
    }
}
