#![allow(dead_code)]

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blocking_query::AvailabilityGate;
use blocking_query::BlockingClient;
use blocking_query::Cursor;
use blocking_query::FetchError;
use blocking_query::FetchOptions;
use blocking_query::FetchResponse;
use blocking_query::FetchResult;
use blocking_query::Repository;
use blocking_query::SourceEvent;
use blocking_query::StaticSettings;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::watch;
use tokio::time::timeout;

/// In-memory catalog answering like a blocking query endpoint:
/// a request carrying the current index parks until the catalog changes.
pub struct FakeCatalog {
    state: watch::Sender<(u64, Value)>,
    seen: Mutex<Vec<Option<Cursor>>>,
    abort_next: AtomicBool,
}

impl FakeCatalog {
    pub fn new(body: Value) -> Arc<Self> {
        let (state, _) = watch::channel((1, body));
        Arc::new(Self {
            state,
            seen: Mutex::new(Vec::new()),
            abort_next: AtomicBool::new(false),
        })
    }

    /// Replaces the catalog body and bumps the index
    pub fn update(
        &self,
        body: Value,
    ) {
        self.state.send_modify(|(index, current)| {
            *index += 1;
            *current = body;
        });
    }

    /// The next request fails like a connection torn down by the client
    pub fn abort_next(&self) {
        self.abort_next.store(true, Ordering::SeqCst);
    }

    pub fn seen_cursors(&self) -> Vec<Option<Cursor>> {
        self.seen.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }

    async fn serve(
        &self,
        options: FetchOptions,
    ) -> FetchResult {
        self.seen.lock().push(options.cursor.clone());
        if self.abort_next.swap(false, Ordering::SeqCst) {
            return Err(FetchError::aborted());
        }

        let mut rx = self.state.subscribe();
        let cursor = options.cursor;
        let (index, body) = rx
            .wait_for(move |(index, _)| cursor.as_ref() != Some(&Cursor::from(*index)))
            .await
            .map(|state| state.clone())
            .map_err(|e| FetchError::new("500", e.to_string()))?;
        Ok(FetchResponse::new(Some(Cursor::from(index)), body))
    }
}

#[async_trait]
impl Repository for FakeCatalog {
    async fn find_all_by_datacenter(
        &self,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.serve(options).await
    }

    async fn find_by_slug(
        &self,
        _slug: &str,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.serve(options).await
    }
}

pub struct TestClient {
    pub client: BlockingClient,
    pub catalog: Arc<FakeCatalog>,
    pub settings: Arc<StaticSettings>,
    pub gate: Arc<AvailabilityGate>,
}

pub fn test_client(catalog: Arc<FakeCatalog>) -> TestClient {
    let settings = Arc::new(StaticSettings::default());
    let gate = Arc::new(AvailabilityGate::default());
    let client = BlockingClient::builder(settings.clone(), gate.clone())
        .repository("service", catalog.clone())
        .build()
        .expect("client should build with default config");
    TestClient {
        client,
        catalog,
        settings,
        gate,
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<SourceEvent>) -> SourceEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for source event")
        .expect("source event channel closed")
}

pub async fn next_body(rx: &mut broadcast::Receiver<SourceEvent>) -> Value {
    match next_event(rx).await {
        SourceEvent::Message(response) => response.body.clone(),
        other => panic!("expected message, got {:?}", other),
    }
}

pub async fn assert_quiet(rx: &mut broadcast::Receiver<SourceEvent>) {
    let result = timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
