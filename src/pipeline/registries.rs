//! 公共包仓库查询：PyPI / npm
//!
//! 200 ⇒ 存在，404 ⇒ 不存在，其余状态码与网络错误 ⇒ 无法判定（不算失败，避免误报）。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::RegistriesSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Missing,
    Inconclusive,
}

impl Existence {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Self::Exists,
            StatusCode::NOT_FOUND => Self::Missing,
            _ => Self::Inconclusive,
        }
    }
}

#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// 展示用名称（写入失败日志）
    fn name(&self) -> &str;

    async fn exists(&self, package: &str) -> Existence;
}

fn http_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("forge/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

async fn probe(client: &Client, url: &str) -> Existence {
    match client.get(url).send().await {
        Ok(resp) => Existence::from_status(resp.status()),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "registry lookup inconclusive");
            Existence::Inconclusive
        }
    }
}

/// GET {base}/{name}/json
pub struct PyPiRegistry {
    client: Client,
    base_url: String,
}

impl PyPiRegistry {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &RegistriesSection) -> Self {
        Self::new(cfg.pypi_url.clone(), cfg.timeout_secs)
    }
}

#[async_trait]
impl PackageRegistry for PyPiRegistry {
    fn name(&self) -> &str {
        "PyPI"
    }

    async fn exists(&self, package: &str) -> Existence {
        probe(&self.client, &format!("{}/{}/json", self.base_url, package)).await
    }
}

/// GET {base}/{name}；scoped 包 `@scope/pkg` 转义为 `@scope%2Fpkg`
pub struct NpmRegistry {
    client: Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &RegistriesSection) -> Self {
        Self::new(cfg.npm_url.clone(), cfg.timeout_secs)
    }

    pub fn package_path(package: &str) -> String {
        package.replace('/', "%2F")
    }
}

#[async_trait]
impl PackageRegistry for NpmRegistry {
    fn name(&self) -> &str {
        "npm"
    }

    async fn exists(&self, package: &str) -> Existence {
        probe(&self.client, &format!("{}/{}", self.base_url, Self::package_path(package))).await
    }
}

/// 固定名单的仓库（测试与离线运行）：名单内 ⇒ 存在，unreachable 内 ⇒ 无法判定，其余 ⇒ 不存在
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    label: String,
    known: HashSet<String>,
    unreachable: HashSet<String>,
}

impl StaticRegistry {
    pub fn new<I, S>(label: impl Into<String>, known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            known: known.into_iter().map(Into::into).collect(),
            unreachable: HashSet::new(),
        }
    }

    pub fn with_unreachable(mut self, package: impl Into<String>) -> Self {
        self.unreachable.insert(package.into());
        self
    }
}

#[async_trait]
impl PackageRegistry for StaticRegistry {
    fn name(&self) -> &str {
        &self.label
    }

    async fn exists(&self, package: &str) -> Existence {
        if self.unreachable.contains(package) {
            Existence::Inconclusive
        } else if self.known.contains(package) {
            Existence::Exists
        } else {
            Existence::Missing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(Existence::from_status(StatusCode::OK), Existence::Exists);
        assert_eq!(Existence::from_status(StatusCode::NOT_FOUND), Existence::Missing);
        assert_eq!(Existence::from_status(StatusCode::TOO_MANY_REQUESTS), Existence::Inconclusive);
        assert_eq!(Existence::from_status(StatusCode::BAD_GATEWAY), Existence::Inconclusive);
    }

    #[test]
    fn test_scoped_npm_path() {
        assert_eq!(NpmRegistry::package_path("@types/node"), "@types%2Fnode");
        assert_eq!(NpmRegistry::package_path("react"), "react");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_inconclusive() {
        let registry = PyPiRegistry::new("http://127.0.0.1:9", 2);
        assert_eq!(registry.exists("flask").await, Existence::Inconclusive);
    }

    #[tokio::test]
    async fn test_static_registry() {
        let registry = StaticRegistry::new("PyPI", ["flask"]).with_unreachable("slowpkg");
        assert_eq!(registry.exists("flask").await, Existence::Exists);
        assert_eq!(registry.exists("flasck-fake").await, Existence::Missing);
        assert_eq!(registry.exists("slowpkg").await, Existence::Inconclusive);
    }
}
