use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use crate::Cursor;
use crate::FetchOptions;
use crate::FetchResponse;
use crate::FetchResult;
use crate::Repository;

/// Repository answering from a queue of scripted results.
///
/// Once the queue is empty a call blocks like a long-poll with no changes,
/// until another result is pushed.
#[derive(Default)]
pub struct ScriptedRepository {
    responses: Mutex<VecDeque<FetchResult>>,
    calls: Mutex<Vec<FetchOptions>>,
    pushed: Notify,
}

impl ScriptedRepository {
    pub fn new(responses: impl IntoIterator<Item = FetchResult>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn push(
        &self,
        response: FetchResult,
    ) {
        self.responses.lock().push_back(response);
        self.pushed.notify_one();
    }

    /// Options of every call received so far
    pub fn calls(&self) -> Vec<FetchOptions> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    async fn next(
        &self,
        options: FetchOptions,
    ) -> FetchResult {
        self.calls.lock().push(options);
        loop {
            let next = self.responses.lock().pop_front();
            if let Some(response) = next {
                return response;
            }
            self.pushed.notified().await;
        }
    }
}

#[async_trait]
impl Repository for ScriptedRepository {
    async fn find_all_by_datacenter(
        &self,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.next(options).await
    }

    async fn find_by_slug(
        &self,
        _slug: &str,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.next(options).await
    }

    async fn find_by_node(
        &self,
        _node: &str,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.next(options).await
    }

    async fn find_instance_by_slug(
        &self,
        _id: &str,
        _node: &str,
        _service: &str,
        _dc: &str,
        options: FetchOptions,
    ) -> FetchResult {
        self.next(options).await
    }
}

/// Successful response carrying `cursor` and a small body naming it
pub fn response(cursor: u64) -> FetchResult {
    Ok(FetchResponse::new(
        Some(Cursor::from(cursor)),
        json!({ "index": cursor }),
    ))
}
