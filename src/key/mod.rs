//! Watch keys and the resource kinds they resolve to.
//!
//! A watch key has the shape `<scheme>/<datacenter>/<model>/<selector>` with an
//! optional `?filter=<expr>` suffix. The raw string, filter included, identifies
//! the watch for deduplication and caching.


use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::Result;

const FILTER_MARKER: &str = "?filter=";
const COLLECTION_SELECTOR: &str = "*";

/// Parsed watch key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    raw: String,
    scheme: String,
    dc: String,
    model: String,
    selector: String,
    filter: Option<String>,
}

/// What a watch key asks the backend for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Every `model` in the datacenter, optionally filtered
    Collection { filter: Option<String> },
    /// Sessions owned by a node
    Session { node: String },
    /// One instance of a service on a node
    ServiceInstance {
        id: String,
        node: String,
        service: String,
    },
    /// The sidecar proxy of a service instance
    Proxy {
        id: String,
        node: String,
        service: String,
    },
    /// A single item looked up by slug
    Item { slug: String },
}

impl WatchKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let (path, filter) = match raw.split_once(FILTER_MARKER) {
            Some((path, filter)) => (path, Some(filter.to_string())),
            None => (raw, None),
        };

        let mut segments = path.splitn(4, '/');
        let scheme = segments.next().unwrap_or_default();
        let (Some(dc), Some(model), Some(selector)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(invalid(raw, "expected <scheme>/<dc>/<model>/<selector>"));
        };

        if dc.is_empty() || model.is_empty() || selector.is_empty() {
            return Err(invalid(raw, "datacenter, model and selector must not be empty"));
        }

        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            dc: dc.to_string(),
            model: model.to_string(),
            selector: selector.to_string(),
            filter,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn dc(&self) -> &str {
        &self.dc
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Name of the repository serving this key.
    ///
    /// Service instances are served by the `service` repository.
    pub fn repository(&self) -> &str {
        match self.model.as_str() {
            "service-instance" => "service",
            model => model,
        }
    }

    /// Resolves the selector into a resource kind
    pub fn kind(&self) -> Result<ResourceKind> {
        if self.selector == COLLECTION_SELECTOR {
            return Ok(ResourceKind::Collection {
                filter: self.filter.clone(),
            });
        }

        let kind = match self.model.as_str() {
            "session" => ResourceKind::Session {
                node: self.selector.clone(),
            },
            "service-instance" => {
                let (id, node, service) = self.instance_parts()?;
                ResourceKind::ServiceInstance { id, node, service }
            }
            "proxy" => {
                let (id, node, service) = self.instance_parts()?;
                ResourceKind::Proxy { id, node, service }
            }
            _ => ResourceKind::Item {
                slug: self.selector.clone(),
            },
        };
        Ok(kind)
    }

    fn instance_parts(&self) -> Result<(String, String, String)> {
        let mut parts = self.selector.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(node), Some(service))
                if !id.is_empty() && !node.is_empty() && !service.is_empty() =>
            {
                Ok((id.to_string(), node.to_string(), service.to_string()))
            }
            _ => Err(invalid(&self.raw, "instance selector must be <id>/<node>/<service>")),
        }
    }
}

fn invalid(
    raw: &str,
    reason: &str,
) -> Error {
    Error::InvalidWatchKey {
        key: raw.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for WatchKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
