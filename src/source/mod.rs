//! One long-poll cycle per watch key.
//!
//! A [`Source`] owns at most one running poll task at a time. Each task is
//! tied to a [`CancellationToken`]; closing the source cancels the token so the
//! task drops whatever its in-flight request returns and exits. Cycles of one
//! source are strictly sequential:
//!
//! ```text
//! settings.find_by_slug() -> finder.fetch(cursor) -> record + broadcast
//!        ^                                                  |
//!        +------------------ blocking enabled --------------+
//! ```


use std::fmt;
use std::sync::Arc;

use futures::Stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::metrics::FETCH_ERRORS;
use crate::metrics::POLL_CYCLES;
use crate::Cursor;
use crate::Error;
use crate::FetchResponse;
use crate::Finder;
use crate::Result;
use crate::SettingsProvider;
use crate::Transport;
use crate::WatchKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Created, loop not started yet
    Idle,
    /// Loop running or waiting for the transport
    Polling,
    /// Loop ended on an error; the next open resumes it
    Stopped,
    /// Closed for good; the source is no longer registered
    Closed,
}

/// Notification delivered to everyone subscribed to a source
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Message(Arc<FetchResponse>),
    Error(Arc<Error>),
    Closed,
}

/// What a closed source leaves behind for the next source of the same key
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub cursor: Option<Cursor>,
    pub current_event: Option<Arc<FetchResponse>>,
}

pub(crate) type CloseHook = Box<dyn FnOnce(&Source, CacheEntry) + Send>;

/// Collaborators shared by every source of one client
pub(crate) struct PollContext {
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) settings_slug: String,
    pub(crate) event_capacity: usize,
}

struct SourceState {
    status: SourceStatus,
    cursor: Option<Cursor>,
    current_event: Option<Arc<FetchResponse>>,
    run: Option<CancellationToken>,
}

struct SourceInner {
    id: u64,
    key: WatchKey,
    finder: Finder,
    ctx: Arc<PollContext>,
    state: Mutex<SourceState>,
    events: broadcast::Sender<SourceEvent>,
    close_hook: Mutex<Option<CloseHook>>,
}

/// Shared handle to one watch
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

impl Source {
    pub(crate) fn new(
        id: u64,
        key: WatchKey,
        finder: Finder,
        ctx: Arc<PollContext>,
        seed: CacheEntry,
    ) -> Self {
        let (events, _) = broadcast::channel(ctx.event_capacity);
        Self {
            inner: Arc::new(SourceInner {
                id,
                key,
                finder,
                ctx,
                state: Mutex::new(SourceState {
                    status: SourceStatus::Idle,
                    cursor: seed.cursor,
                    current_event: seed.current_event,
                    run: None,
                }),
                events,
                close_hook: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn uri(&self) -> &str {
        self.inner.key.as_str()
    }

    pub fn key(&self) -> &WatchKey {
        &self.inner.key
    }

    pub fn status(&self) -> SourceStatus {
        self.inner.state.lock().status
    }

    pub fn is_closed(&self) -> bool {
        self.status() == SourceStatus::Closed
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.inner.state.lock().cursor.clone()
    }

    /// Last response received, or the one replayed from the cache
    pub fn current_event(&self) -> Option<Arc<FetchResponse>> {
        self.inner.state.lock().current_event.clone()
    }

    /// Live events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.inner.events.subscribe()
    }

    /// Current event first (if any), then live events. Lagged events are skipped.
    pub fn stream(&self) -> impl Stream<Item = SourceEvent> + Send + 'static {
        let rx = self.subscribe();
        let current = self.current_event().map(SourceEvent::Message);
        futures::stream::iter(current).chain(
            BroadcastStream::new(rx).filter_map(|event| futures::future::ready(event.ok())),
        )
    }

    pub(crate) fn on_close(
        &self,
        hook: CloseHook,
    ) {
        *self.inner.close_hook.lock() = Some(hook);
    }

    /// Starts the poll loop unless it is already running.
    ///
    /// Returns false for a closed source, which can not be reopened.
    pub(crate) fn open(&self) -> bool {
        let token = {
            let mut state = self.inner.state.lock();
            match state.status {
                SourceStatus::Closed => return false,
                SourceStatus::Polling => return true,
                SourceStatus::Idle | SourceStatus::Stopped => {}
            }
            let token = CancellationToken::new();
            state.status = SourceStatus::Polling;
            state.run = Some(token.clone());
            token
        };

        debug!(uri = %self.uri(), source_id = self.id(), "start polling");
        let source = self.clone();
        tokio::spawn(async move { source.poll(token).await });
        true
    }

    /// Stops polling and hands the cursor and last event to the close hook.
    ///
    /// A request already in flight is not aborted; its result is discarded.
    pub(crate) fn close(&self) {
        if let Some(entry) = self.shutdown() {
            self.finish_close(entry);
        }
    }

    /// Marks the source closed and cancels its run.
    ///
    /// Returns the final cursor and event, or `None` if it was closed already.
    pub(crate) fn shutdown(&self) -> Option<CacheEntry> {
        let mut state = self.inner.state.lock();
        if state.status == SourceStatus::Closed {
            return None;
        }
        state.status = SourceStatus::Closed;
        if let Some(run) = state.run.take() {
            run.cancel();
        }
        Some(CacheEntry {
            cursor: state.cursor.clone(),
            current_event: state.current_event.clone(),
        })
    }

    /// Runs the close hook and notifies subscribers. Must follow [`Self::shutdown`].
    pub(crate) fn finish_close(
        &self,
        entry: CacheEntry,
    ) {
        debug!(uri = %self.uri(), source_id = self.id(), cursor = ?entry.cursor, "closed");
        let hook = self.inner.close_hook.lock().take();
        if let Some(hook) = hook {
            hook(self, entry);
        }
        let _ = self.inner.events.send(SourceEvent::Closed);
    }

    /// Cursor and last event as they stand now
    pub(crate) fn snapshot(&self) -> CacheEntry {
        let state = self.inner.state.lock();
        CacheEntry {
            cursor: state.cursor.clone(),
            current_event: state.current_event.clone(),
        }
    }

    async fn poll(
        self,
        token: CancellationToken,
    ) {
        let model = self.inner.key.model().to_string();
        loop {
            let blocking = match self.blocking_enabled().await {
                Ok(blocking) => blocking,
                Err(e) => return self.fail(&token, e),
            };
            if token.is_cancelled() {
                return;
            }

            let cursor = {
                let mut state = self.inner.state.lock();
                if !blocking {
                    state.cursor = None;
                }
                state.cursor.clone()
            };
            trace!(uri = %self.uri(), cursor = ?cursor, blocking, "poll cycle");

            let result = self.inner.finder.fetch(cursor).await;
            if token.is_cancelled() {
                debug!(uri = %self.uri(), "closed while request in flight, dropping result");
                return;
            }

            match result {
                Ok(response) => {
                    POLL_CYCLES.with_label_values(&[model.as_str()]).inc();
                    if !self.record(&token, response) {
                        return;
                    }

                    let keep_blocking = blocking
                        && match self.blocking_enabled().await {
                            Ok(blocking) => blocking,
                            Err(e) => return self.fail(&token, e),
                        };
                    if token.is_cancelled() {
                        return;
                    }
                    if !keep_blocking {
                        debug!(uri = %self.uri(), "blocking disabled, closing after full fetch");
                        self.close();
                        return;
                    }
                }
                Err(e) if e.is_abort() => {
                    FETCH_ERRORS.with_label_values(&["abort"]).inc();
                    debug!(uri = %self.uri(), "request aborted, waiting for transport");
                    tokio::select! {
                        _ = token.cancelled() => return,
                        available = self.inner.ctx.transport.when_available(&e) => {
                            if let Err(err) = available {
                                return self.fail(&token, err);
                            }
                        }
                    }
                }
                Err(e) => {
                    FETCH_ERRORS.with_label_values(&["fatal"]).inc();
                    return self.fail(&token, Error::Fetch(e));
                }
            }
        }
    }

    async fn blocking_enabled(&self) -> Result<bool> {
        let ctx = &self.inner.ctx;
        ctx.settings
            .find_by_slug(&ctx.settings_slug)
            .await
            .map(|settings| settings.blocking)
    }

    /// Stores the response unless the run was cancelled meanwhile
    fn record(
        &self,
        token: &CancellationToken,
        response: FetchResponse,
    ) -> bool {
        let event = {
            let mut state = self.inner.state.lock();
            if token.is_cancelled() {
                return false;
            }
            if let Some(cursor) = &response.cursor {
                state.cursor = Some(cursor.clone());
            }
            let event = Arc::new(response);
            state.current_event = Some(event.clone());
            event
        };

        let _ = self.inner.events.send(SourceEvent::Message(event));
        true
    }

    fn fail(
        &self,
        token: &CancellationToken,
        err: Error,
    ) {
        {
            let mut state = self.inner.state.lock();
            if token.is_cancelled() {
                return;
            }
            state.status = SourceStatus::Stopped;
            state.run = None;
        }

        warn!(uri = %self.uri(), source_id = self.id(), error = %err, "watch stopped");
        let _ = self.inner.events.send(SourceEvent::Error(Arc::new(err)));
    }
}

impl fmt::Debug for Source {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("uri", &self.inner.key.as_str())
            .field("status", &state.status)
            .field("cursor", &state.cursor)
            .finish()
    }
}
