//! Runtime settings consulted before every poll cycle.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Client settings as stored under a slug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Whether long-polling is permitted. When false every cycle is a full fetch
    /// and the source closes after it.
    #[serde(default = "default_blocking")]
    pub blocking: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            blocking: default_blocking(),
        }
    }
}

fn default_blocking() -> bool {
    true
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SettingsProvider: Send + Sync + 'static {
    async fn find_by_slug(
        &self,
        slug: &str,
    ) -> Result<ClientSettings>;
}

/// In-process settings whose values can be swapped at runtime
#[derive(Debug)]
pub struct StaticSettings {
    current: ArcSwap<ClientSettings>,
}

impl StaticSettings {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
        }
    }

    pub fn set_blocking(
        &self,
        blocking: bool,
    ) {
        self.current.store(Arc::new(ClientSettings { blocking }));
    }

    pub fn current(&self) -> ClientSettings {
        **self.current.load()
    }
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self::new(ClientSettings::default())
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn find_by_slug(
        &self,
        _slug: &str,
    ) -> Result<ClientSettings> {
        Ok(self.current())
    }
}
