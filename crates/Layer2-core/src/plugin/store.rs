//! Install Store - `web:` 플러그인 설치 기록
//!
//! 설치 디렉토리의 installed.json으로 설치된 패키지를 관리합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use feature_foundation::{Error, Result};

use super::url::is_package_key;

/// 설치 기록 파일 이름
pub const INSTALLED_FILE: &str = "installed.json";

// ============================================================================
// InstalledPlugin
// ============================================================================

/// 설치된 플러그인 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPlugin {
    /// 패키지 키 (`web:<key>`)
    pub key: String,

    pub name: String,

    pub version: String,

    pub installed_at: DateTime<Utc>,

    /// 다운로드한 아카이브 URL
    pub source: String,

    /// 압축 해제 디렉토리
    pub path: PathBuf,

    /// 매니페스트 경로
    pub manifest: PathBuf,
}

impl InstalledPlugin {
    pub fn new(
        key: impl Into<String>,
        source: impl Into<String>,
        path: impl Into<PathBuf>,
        manifest: impl Into<PathBuf>,
    ) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            version: "1.0.0".to_string(),
            installed_at: Utc::now(),
            source: source.into(),
            path: path.into(),
            manifest: manifest.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

// ============================================================================
// InstalledPluginsFile
// ============================================================================

/// installed.json 파일 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPluginsFile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub plugins: Vec<InstalledPlugin>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for InstalledPluginsFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            plugins: Vec::new(),
        }
    }
}

// ============================================================================
// InstallStore
// ============================================================================

/// 설치 저장소 - 설치 디렉토리와 installed.json 관리
pub struct InstallStore {
    base_dir: PathBuf,
    cache: RwLock<InstalledPluginsFile>,
}

impl InstallStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(InstalledPluginsFile::default()),
        }
    }

    /// 생성 후 installed.json 로드
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(base_dir);
        store.load().await?;
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn installed_file(&self) -> PathBuf {
        self.base_dir.join(INSTALLED_FILE)
    }

    /// 패키지 설치 디렉토리 (설치 디렉토리 바로 아래만 허용)
    pub fn plugin_dir(&self, key: &str) -> Result<PathBuf> {
        if !is_package_key(key) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid package key",
                key
            )));
        }
        Ok(self.base_dir.join(key))
    }

    // ========================================================================
    // 로드 / 저장
    // ========================================================================

    pub async fn load(&self) -> Result<()> {
        let path = self.installed_file();

        if !fs::try_exists(&path).await? {
            debug!("{} not found at {:?}, using empty", INSTALLED_FILE, path);
            return Ok(());
        }

        let content = fs::read_to_string(&path).await?;
        let file: InstalledPluginsFile = serde_json::from_str(&content)?;
        let count = file.plugins.len();
        *self.cache.write().await = file;

        info!("Loaded {} installed plugins", count);
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;

        let cache = self.cache.read().await;
        let content = serde_json::to_string_pretty(&*cache)?;
        fs::write(self.installed_file(), content).await?;

        debug!("Saved {} with {} plugins", INSTALLED_FILE, cache.plugins.len());
        Ok(())
    }

    // ========================================================================
    // 설치 기록
    // ========================================================================

    pub async fn list(&self) -> Vec<InstalledPlugin> {
        self.cache.read().await.plugins.clone()
    }

    pub async fn get(&self, key: &str) -> Option<InstalledPlugin> {
        self.cache
            .read()
            .await
            .plugins
            .iter()
            .find(|p| p.key == key)
            .cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.read().await.plugins.iter().any(|p| p.key == key)
    }

    /// 설치 기록 (같은 키는 덮어씀)
    pub async fn record_install(&self, plugin: InstalledPlugin) -> Result<()> {
        {
            let mut cache = self.cache.write().await;
            if let Some(existing) = cache.plugins.iter_mut().find(|p| p.key == plugin.key) {
                info!("Updating plugin: {} -> v{}", plugin.key, plugin.version);
                *existing = plugin;
            } else {
                info!("Installing plugin: {} v{}", plugin.key, plugin.version);
                cache.plugins.push(plugin);
            }
        }

        self.save().await
    }

    pub async fn record_uninstall(&self, key: &str) -> Result<Option<InstalledPlugin>> {
        let removed = {
            let mut cache = self.cache.write().await;
            match cache.plugins.iter().position(|p| p.key == key) {
                Some(index) => {
                    info!("Uninstalled plugin: {}", key);
                    Some(cache.plugins.remove(index))
                }
                None => {
                    warn!("Plugin not found for uninstall: {}", key);
                    None
                }
            }
        };

        if removed.is_some() {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.plugins.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.plugins.is_empty()
    }

    // ========================================================================
    // 디렉토리
    // ========================================================================

    pub async fn create_plugin_dir(&self, key: &str) -> Result<PathBuf> {
        let dir = self.plugin_dir(key)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub async fn remove_plugin_dir(&self, key: &str) -> Result<()> {
        let dir = self.plugin_dir(key)?;
        if fs::try_exists(&dir).await? {
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (InstallStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = InstallStore::new(temp.path().join("plugins"));
        (store, temp)
    }

    fn sample(store: &InstallStore, key: &str) -> InstalledPlugin {
        let dir = store.plugin_dir(key).unwrap();
        InstalledPlugin::new(
            key,
            format!("https://cdn.example.com/{}.tar.gz", key),
            &dir,
            dir.join(format!("{}.uplugin", key)),
        )
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (store, _temp) = test_store();
        store.load().await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.get("Foo").await.is_none());
    }

    #[tokio::test]
    async fn test_record_install_and_reload() {
        let (store, _temp) = test_store();
        store
            .record_install(sample(&store, "Foo").with_name("Foo Feature").with_version("1.2.0"))
            .await
            .unwrap();
        assert!(store.contains("Foo").await);

        let reopened = InstallStore::open(store.base_dir()).await.unwrap();
        let record = reopened.get("Foo").await.unwrap();
        assert_eq!(record.name, "Foo Feature");
        assert_eq!(record.version, "1.2.0");
        assert!(record.manifest.ends_with("Foo/Foo.uplugin"));
    }

    #[tokio::test]
    async fn test_update_existing() {
        let (store, _temp) = test_store();
        store.record_install(sample(&store, "Foo")).await.unwrap();
        store
            .record_install(sample(&store, "Foo").with_version("2.0.0"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("Foo").await.unwrap().version, "2.0.0");
    }

    #[tokio::test]
    async fn test_uninstall_removes_record_and_dir() {
        let (store, _temp) = test_store();
        let dir = store.create_plugin_dir("Foo").await.unwrap();
        store.record_install(sample(&store, "Foo")).await.unwrap();

        let removed = store.record_uninstall("Foo").await.unwrap();
        assert!(removed.is_some());
        store.remove_plugin_dir("Foo").await.unwrap();

        assert!(!dir.exists());
        assert!(!store.contains("Foo").await);
        assert!(store.record_uninstall("Foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plugin_dir_stays_inside_base_dir() {
        let (store, temp) = test_store();
        store.create_plugin_dir("Foo").await.unwrap();
        let sentinel = temp.path().join("sentinel.txt");
        std::fs::write(&sentinel, "keep").unwrap();

        for key in ["..", ".", "", "../plugins", "a/b"] {
            assert!(
                matches!(store.plugin_dir(key), Err(Error::InvalidInput(_))),
                "{:?}",
                key
            );
            assert!(store.remove_plugin_dir(key).await.is_err());
            assert!(store.create_plugin_dir(key).await.is_err());
        }

        assert!(sentinel.exists());
        assert!(store.base_dir().join("Foo").exists());
        assert_eq!(store.plugin_dir("Foo").unwrap(), store.base_dir().join("Foo"));
    }
}
