//! Backend repositories and the fetch strategy resolved from a watch key.


use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use crate::Error;
use crate::FetchError;
use crate::ResourceKind;
use crate::Result;
use crate::WatchKey;

/// Opaque continuation token returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for Cursor {
    fn from(index: u64) -> Self {
        Self(index.to_string())
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Cursor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request options handed to a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub cursor: Option<Cursor>,
    pub filter: Option<String>,
}

/// Response of one poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Cursor to pass on the next poll. `None` keeps the previous cursor.
    pub cursor: Option<Cursor>,
    pub body: serde_json::Value,
}

impl FetchResponse {
    pub fn new(
        cursor: Option<Cursor>,
        body: serde_json::Value,
    ) -> Self {
        Self { cursor, body }
    }
}

pub type FetchResult = std::result::Result<FetchResponse, FetchError>;

/// One backend resource repository
///
/// Lookups a repository does not serve keep the default implementation and
/// fail with a `405` fetch error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn find_all_by_datacenter(
        &self,
        _dc: &str,
        _options: FetchOptions,
    ) -> FetchResult {
        Err(FetchError::unsupported("find_all_by_datacenter"))
    }

    async fn find_by_slug(
        &self,
        _slug: &str,
        _dc: &str,
        _options: FetchOptions,
    ) -> FetchResult {
        Err(FetchError::unsupported("find_by_slug"))
    }

    async fn find_by_node(
        &self,
        _node: &str,
        _dc: &str,
        _options: FetchOptions,
    ) -> FetchResult {
        Err(FetchError::unsupported("find_by_node"))
    }

    async fn find_instance_by_slug(
        &self,
        _id: &str,
        _node: &str,
        _service: &str,
        _dc: &str,
        _options: FetchOptions,
    ) -> FetchResult {
        Err(FetchError::unsupported("find_instance_by_slug"))
    }
}

/// Lookup table from repository name to implementation
#[derive(Clone, Default)]
pub struct Repositories {
    by_name: HashMap<String, Arc<dyn Repository>>,
}

impl Repositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        repository: Arc<dyn Repository>,
    ) {
        self.by_name.insert(name.into(), repository);
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Arc<dyn Repository>> {
        self.by_name.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl fmt::Debug for Repositories {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Repositories")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fetch strategy bound to one watch key
///
/// Resolved once when a source is created; every poll cycle only supplies the
/// cursor.
#[derive(Clone)]
pub struct Finder {
    repository: Arc<dyn Repository>,
    dc: String,
    kind: ResourceKind,
}

impl Finder {
    pub fn resolve(
        key: &WatchKey,
        repositories: &Repositories,
    ) -> Result<Self> {
        let kind = key.kind()?;
        let repository = repositories
            .get(key.repository())
            .ok_or_else(|| Error::UnknownRepository(key.repository().to_string()))?;

        Ok(Self {
            repository,
            dc: key.dc().to_string(),
            kind,
        })
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub async fn fetch(
        &self,
        cursor: Option<Cursor>,
    ) -> FetchResult {
        trace!(dc = %self.dc, kind = ?self.kind, cursor = ?cursor, "fetch");
        let dc = self.dc.as_str();
        match &self.kind {
            ResourceKind::Collection { filter } => {
                self.repository
                    .find_all_by_datacenter(
                        dc,
                        FetchOptions {
                            cursor,
                            filter: filter.clone(),
                        },
                    )
                    .await
            }
            ResourceKind::Session { node } => {
                self.repository
                    .find_by_node(node, dc, FetchOptions { cursor, filter: None })
                    .await
            }
            ResourceKind::ServiceInstance { id, node, service } | ResourceKind::Proxy { id, node, service } => {
                self.repository
                    .find_instance_by_slug(id, node, service, dc, FetchOptions { cursor, filter: None })
                    .await
            }
            ResourceKind::Item { slug } => {
                self.repository
                    .find_by_slug(slug, dc, FetchOptions { cursor, filter: None })
                    .await
            }
        }
    }
}

impl fmt::Debug for Finder {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Finder")
            .field("dc", &self.dc)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
