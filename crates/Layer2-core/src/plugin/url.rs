//! Plugin URL - `<protocol>:<identifier>` 파싱
//!
//! - `file:/plugins/Foo/Foo.uplugin` - 로컬 매니페스트 경로
//! - `web:Foo` - 원격 저장소의 패키지 키

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use feature_foundation::{Error, Result};

/// 매니페스트 파일 확장자
pub const MANIFEST_EXTENSION: &str = "uplugin";

/// 설치 디렉터리 아래 한 단계 이름으로만 쓰일 수 있는 키인지
///
/// `.`, `..`, 구분자, 드라이브 접두사는 거부합니다.
pub(crate) fn is_package_key(key: &str) -> bool {
    if key.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// ============================================================================
// PluginProtocol
// ============================================================================

/// 플러그인 소스 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginProtocol {
    /// 로컬 파일 시스템
    File,
    /// 원격 다운로드 후 설치
    Web,
}

impl PluginProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Web => "web",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

// ============================================================================
// PluginUrl
// ============================================================================

/// 정규화된 플러그인 URL (머신 식별 키)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginUrl {
    protocol: PluginProtocol,
    identifier: String,
    raw: String,
}

impl PluginUrl {
    /// URL 문자열 파싱
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let (protocol, identifier) = source
            .split_once(':')
            .ok_or_else(|| Error::InvalidUrl(format!("{} (missing protocol)", source)))?;

        let protocol = PluginProtocol::parse(protocol)
            .ok_or_else(|| Error::InvalidUrl(format!("{} (unknown protocol '{}')", source, protocol)))?;

        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::InvalidUrl(format!("{} (empty identifier)", source)));
        }

        if protocol == PluginProtocol::Web && !is_package_key(identifier) {
            return Err(Error::InvalidUrl(format!(
                "{} (web identifiers are plain package keys)",
                source
            )));
        }

        Ok(Self {
            raw: format!("{}:{}", protocol.as_str(), identifier),
            protocol,
            identifier: identifier.to_string(),
        })
    }

    /// 로컬 매니페스트 경로로부터 생성
    pub fn from_manifest_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(&format!("file:{}", path.as_ref().display()))
    }

    pub fn protocol(&self) -> PluginProtocol {
        self.protocol
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `file:` URL의 매니페스트 경로
    pub fn manifest_path(&self) -> Option<PathBuf> {
        match self.protocol {
            PluginProtocol::File => Some(PathBuf::from(&self.identifier)),
            PluginProtocol::Web => None,
        }
    }

    /// 매니페스트를 읽기 전의 기본 플러그인 이름
    pub fn default_name(&self) -> String {
        match self.protocol {
            PluginProtocol::File => Path::new(&self.identifier)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| self.identifier.clone()),
            PluginProtocol::Web => self.identifier.clone(),
        }
    }
}

impl fmt::Display for PluginUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PluginUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_url() {
        let url = PluginUrl::parse("file:/plugins/Foo/Foo.uplugin").unwrap();
        assert_eq!(url.protocol(), PluginProtocol::File);
        assert_eq!(url.identifier(), "/plugins/Foo/Foo.uplugin");
        assert_eq!(
            url.manifest_path(),
            Some(PathBuf::from("/plugins/Foo/Foo.uplugin"))
        );
        assert_eq!(url.default_name(), "Foo");
    }

    #[test]
    fn test_parse_web_url() {
        let url: PluginUrl = "WEB:Bar".parse().unwrap();
        assert_eq!(url.protocol(), PluginProtocol::Web);
        assert_eq!(url.as_str(), "web:Bar");
        assert_eq!(url.manifest_path(), None);
        assert_eq!(url.default_name(), "Bar");
    }

    #[test]
    fn test_invalid_urls() {
        assert!(matches!(
            PluginUrl::parse("/plugins/Foo.uplugin"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            PluginUrl::parse("ftp:Foo"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(PluginUrl::parse("file:"), Err(Error::InvalidUrl(_))));
        assert!(matches!(
            PluginUrl::parse("web:a/b"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_web_key_must_be_single_name() {
        for bad in ["web:..", "web:.", "web: .. ", "web:a\\b", "web:../Foo", "web:./Foo"] {
            assert!(
                matches!(PluginUrl::parse(bad), Err(Error::InvalidUrl(_))),
                "{} should be rejected",
                bad
            );
        }
        assert!(PluginUrl::parse("web:Foo.Bar").is_ok());
        assert!(PluginUrl::parse("web:..Foo").is_ok());

        assert!(is_package_key("Foo"));
        assert!(!is_package_key(".."));
        assert!(!is_package_key(""));
    }

    #[test]
    fn test_windows_style_path_keeps_drive() {
        let url = PluginUrl::parse("file:C:/Plugins/Foo.uplugin").unwrap();
        assert_eq!(url.identifier(), "C:/Plugins/Foo.uplugin");
    }
}
