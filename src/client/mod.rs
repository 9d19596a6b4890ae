//! Blocking query client
//!
//! Deduplicates long-poll watches by uri and reference counts them per subscriber:
//! - [`BlockingClient`] - `open`/`close` entry points
//! - [`BlockingClientBuilder`] - wiring of settings, transport and repositories
//! - [`Registry`] - active sources, reference sets and the cursor cache
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use blocking_query::{AvailabilityGate, BlockingClient, RefToken, Repository, StaticSettings};
//!
//! # async fn run(services: Arc<dyn Repository>) -> blocking_query::Result<()> {
//! let client = BlockingClient::builder(
//!     Arc::new(StaticSettings::default()),
//!     Arc::new(AvailabilityGate::default()),
//! )
//! .repository("service", services)
//! .build()?;
//!
//! let view = RefToken::generate();
//! let source = client.open("consul/dc1/service/*", &view)?;
//! let mut events = source.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! client.close(&source, &view);
//! # Ok(())
//! # }
//! ```

mod builder;
mod registry;

pub use builder::*;
pub use registry::*;


use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use tracing::debug;
use tracing::trace;

use crate::metrics::CACHE_HITS;
use crate::source::PollContext;
use crate::BlockingConfig;
use crate::CacheEntry;
use crate::Finder;
use crate::Repositories;
use crate::Result;
use crate::Source;
use crate::WatchKey;

/// Opaque token identifying one subscriber of a source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefToken(String);

impl RefToken {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RefToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RefToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RefToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point for long-poll watches
///
/// Cheap to clone; clones share sources, reference sets and cache.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: BlockingConfig,
    repositories: Repositories,
    ctx: Arc<PollContext>,
    registry: Arc<Registry>,
}

impl BlockingClient {
    /// Create a configured client builder
    pub fn builder(
        settings: Arc<dyn crate::SettingsProvider>,
        transport: Arc<dyn crate::Transport>,
    ) -> BlockingClientBuilder {
        BlockingClientBuilder::new(settings, transport)
    }

    pub(crate) fn from_parts(
        config: BlockingConfig,
        repositories: Repositories,
        ctx: Arc<PollContext>,
        registry: Arc<Registry>,
    ) -> Self {
        crate::metrics::register_custom_metrics();
        Self {
            inner: Arc::new(ClientInner {
                config,
                repositories,
                ctx,
                registry,
            }),
        }
    }

    /// Subscribes `subscriber` to the watch identified by `uri`.
    ///
    /// Reuses the live source for `uri` when there is one, otherwise creates a
    /// source seeded from the cache. Starts or resumes its poll loop.
    ///
    /// # Errors
    /// - [`crate::Error::InvalidWatchKey`] for malformed uris
    /// - [`crate::Error::UnknownRepository`] when no repository serves the model
    ///
    /// # Panics
    /// When called outside a Tokio runtime, since the poll loop is spawned
    /// with `tokio::spawn`.
    pub fn open(
        &self,
        uri: &str,
        subscriber: &RefToken,
    ) -> Result<Source> {
        let mut state = self.inner.registry.lock();

        let source = match state.get_live(uri) {
            Some(source) if source.open() => {
                trace!(uri, source_id = source.id(), "reusing source");
                source
            }
            _ => {
                let predecessor = state.get(uri);
                let source = self.create(uri, predecessor.as_ref())?;
                state.insert(source.clone());
                source.open();
                source
            }
        };

        state.add_ref(&source, subscriber.clone());
        debug!(uri, source_id = source.id(), subscriber = %subscriber, "opened");
        Ok(source)
    }

    /// Unsubscribes `subscriber`; the last one out closes the source.
    pub fn close(
        &self,
        source: &Source,
        subscriber: &RefToken,
    ) {
        let closing = {
            let mut state = self.inner.registry.lock();
            if state.remove_ref(source, subscriber) {
                source.shutdown()
            } else {
                None
            }
        };

        debug!(
            uri = %source.uri(),
            source_id = source.id(),
            subscriber = %subscriber,
            last = closing.is_some(),
            "unsubscribed"
        );
        if let Some(entry) = closing {
            source.finish_close(entry);
        }
    }

    pub fn config(&self) -> &BlockingConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Number of sources currently registered by uri
    pub fn active_sources(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn subscriber_count(
        &self,
        source: &Source,
    ) -> usize {
        self.inner.registry.ref_count(source)
    }

    /// Cursor and last event left by the most recently closed source of `uri`
    pub fn cached(
        &self,
        uri: &str,
    ) -> Option<CacheEntry> {
        self.inner.registry.cache_get(uri)
    }

    /// Builds a source for `uri`.
    ///
    /// A closed `predecessor` still registered under `uri` has not written the
    /// cache yet, so its final state seeds the new source directly.
    fn create(
        &self,
        uri: &str,
        predecessor: Option<&Source>,
    ) -> Result<Source> {
        let key = WatchKey::parse(uri)?;
        let finder = Finder::resolve(&key, &self.inner.repositories)?;

        let seed = if self.inner.config.cache_enabled {
            predecessor
                .map(Source::snapshot)
                .or_else(|| self.inner.registry.cache_get(uri))
        } else {
            None
        };
        if seed.is_some() {
            CACHE_HITS.inc();
            debug!(uri, "resuming from cached cursor");
        }

        let id = self.inner.registry.next_id();
        let source = Source::new(id, key, finder, self.inner.ctx.clone(), seed.unwrap_or_default());

        let registry: Weak<Registry> = Arc::downgrade(&self.inner.registry);
        let cache_enabled = self.inner.config.cache_enabled;
        source.on_close(Box::new(move |source: &Source, entry: CacheEntry| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if cache_enabled {
                registry.cache_put(source.uri(), entry);
            }
            registry.evict_if_current(source);
        }));

        Ok(source)
    }
}

impl fmt::Debug for BlockingClient {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BlockingClient")
            .field("config", &self.inner.config)
            .field("repositories", &self.inner.repositories)
            .field("active_sources", &self.active_sources())
            .finish()
    }
}
