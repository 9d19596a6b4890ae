use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::MutexGuard;

use crate::metrics::ACTIVE_SOURCES;
use crate::CacheEntry;
use crate::RefToken;
use crate::Source;

/// Sources, reference sets and the cursor cache of one or more clients.
///
/// Sources and reference sets share one lock so that `open` and `close` see a
/// consistent view of both. The cache is independent. Source ids are handed
/// out here so they stay unique across every client sharing the registry.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    cache: DashMap<String, CacheEntry>,
    next_id: AtomicU64,
}

#[derive(Default)]
pub(crate) struct RegistryState {
    sources: HashMap<String, Source>,
    refs: HashMap<u64, HashSet<RefToken>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock()
    }

    pub fn len(&self) -> usize {
        self.state.lock().sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(
        &self,
        uri: &str,
    ) -> Option<Source> {
        self.state.lock().sources.get(uri).cloned()
    }

    pub fn ref_count(
        &self,
        source: &Source,
    ) -> usize {
        self.state
            .lock()
            .refs
            .get(&source.id())
            .map_or(0, HashSet::len)
    }

    /// Removes `source` from the active map unless another source replaced it
    pub fn evict_if_current(
        &self,
        source: &Source,
    ) -> bool {
        self.state.lock().evict_if_current(source)
    }

    pub fn cache_get(
        &self,
        uri: &str,
    ) -> Option<CacheEntry> {
        self.cache.get(uri).map(|entry| entry.value().clone())
    }

    pub fn cache_put(
        &self,
        uri: &str,
        entry: CacheEntry,
    ) {
        self.cache.insert(uri.to_string(), entry);
    }
}

impl RegistryState {
    /// Source registered for `uri` that has not closed itself
    pub(crate) fn get_live(
        &self,
        uri: &str,
    ) -> Option<Source> {
        self.sources.get(uri).filter(|source| !source.is_closed()).cloned()
    }

    /// Source registered for `uri`, closed or not
    pub(crate) fn get(
        &self,
        uri: &str,
    ) -> Option<Source> {
        self.sources.get(uri).cloned()
    }

    pub(crate) fn insert(
        &mut self,
        source: Source,
    ) {
        if self.sources.insert(source.uri().to_string(), source).is_none() {
            ACTIVE_SOURCES.inc();
        }
    }

    pub(crate) fn evict_if_current(
        &mut self,
        source: &Source,
    ) -> bool {
        let current = self
            .sources
            .get(source.uri())
            .is_some_and(|registered| registered.id() == source.id());
        if current {
            self.sources.remove(source.uri());
            ACTIVE_SOURCES.dec();
        }
        current
    }

    pub(crate) fn add_ref(
        &mut self,
        source: &Source,
        subscriber: RefToken,
    ) {
        self.refs.entry(source.id()).or_default().insert(subscriber);
    }

    /// Returns true when `subscriber` was the last reference to `source`
    pub(crate) fn remove_ref(
        &mut self,
        source: &Source,
        subscriber: &RefToken,
    ) -> bool {
        let Some(subscribers) = self.refs.get_mut(&source.id()) else {
            return true;
        };
        subscribers.remove(subscriber);
        if subscribers.is_empty() {
            self.refs.remove(&source.id());
            return true;
        }
        false
    }
}
