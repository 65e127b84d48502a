//! Plugin Descriptor - `.uplugin` 매니페스트 정의
//!
//! ```json
//! {
//!   "name": "Foo",
//!   "friendlyName": "Foo Feature",
//!   "version": "1.2.0",
//!   "dependencies": [
//!     { "name": "Bar", "url": "file:/plugins/Bar/Bar.uplugin" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tokio::fs;

use feature_foundation::{Error, Result};

// ============================================================================
// PluginVersion
// ============================================================================

/// 플러그인 버전 (매니페스트에서는 "1.2.3" 문자열)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// 버전 문자열 파싱 ("1", "1.2", "1.2.3" 허용)
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse::<u32>).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse::<u32>).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl TryFrom<String> for PluginVersion {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid version '{}'", value))
    }
}

impl From<PluginVersion> for String {
    fn from(version: PluginVersion) -> Self {
        version.to_string()
    }
}

// ============================================================================
// PluginDependency
// ============================================================================

/// 다른 플러그인에 대한 의존성
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDependency {
    /// 의존 플러그인 이름
    pub name: String,

    /// 의존 플러그인 URL (`file:` / `web:`)
    pub url: String,

    /// 선택적 의존성 - 해석에 실패해도 무시
    #[serde(default)]
    pub optional: bool,
}

impl PluginDependency {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

// ============================================================================
// PluginDescriptor
// ============================================================================

/// 매니페스트 - Mounting 단계에서 읽힘
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// 플러그인 이름 (비어 있으면 파일 이름 사용)
    #[serde(default)]
    pub name: String,

    /// 표시 이름
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default)]
    pub version: PluginVersion,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Registering 이전에 Registered 이상이어야 하는 플러그인들
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: PluginVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_dependency(mut self, dependency: PluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// JSON 문자열에서 파싱
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Manifest(e.to_string()))
    }

    /// 매니페스트 파일 로드 (이름이 비어 있으면 파일 이름으로 채움)
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Manifest(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut descriptor = Self::from_json(&content)
            .map_err(|e| Error::Manifest(format!("{}: {}", path.display(), e)))?;

        if descriptor.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                descriptor.name = stem.to_string_lossy().to_string();
            }
        }

        Ok(descriptor)
    }

    /// 표시 이름 (없으면 이름)
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }

    /// 의존 플러그인 URL 목록
    pub fn dependency_urls(&self) -> Vec<&str> {
        self.dependencies.iter().map(|d| d.url.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_parse() {
        assert_eq!(PluginVersion::parse("1.2.3"), Some(PluginVersion::new(1, 2, 3)));
        assert_eq!(PluginVersion::parse("2"), Some(PluginVersion::new(2, 0, 0)));
        assert_eq!(PluginVersion::parse("1.x"), None);
        assert_eq!(PluginVersion::parse("1.2.3.4"), None);
        assert!(PluginVersion::new(1, 10, 0) > PluginVersion::new(1, 9, 9));
    }

    #[test]
    fn test_descriptor_from_json() {
        let descriptor = PluginDescriptor::from_json(
            r#"{
                "name": "Foo",
                "friendlyName": "Foo Feature",
                "version": "1.2.0",
                "dependencies": [
                    { "name": "Bar", "url": "file:/plugins/Bar/Bar.uplugin" },
                    { "name": "Baz", "url": "web:Baz", "optional": true }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.display_name(), "Foo Feature");
        assert_eq!(descriptor.version, PluginVersion::new(1, 2, 0));
        assert_eq!(
            descriptor.dependency_urls(),
            vec!["file:/plugins/Bar/Bar.uplugin", "web:Baz"]
        );
        assert!(descriptor.dependencies[1].optional);
    }

    #[test]
    fn test_descriptor_bad_version() {
        let err = PluginDescriptor::from_json(r#"{"version": "one"}"#).unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[tokio::test]
    async fn test_load_fills_name_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Qux.uplugin");
        std::fs::write(&path, "{}").unwrap();

        let descriptor = PluginDescriptor::load(&path).await.unwrap();
        assert_eq!(descriptor.name, "Qux");
        assert_eq!(descriptor.version, PluginVersion::default());
        assert!(descriptor.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = PluginDescriptor::load(Path::new("/nonexistent/Foo.uplugin"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }
}
