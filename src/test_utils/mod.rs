//! the test_utils folder here will share fakes and helpers between unit tests
mod mock;

pub use mock::*;

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::SourceEvent;

/// Waits for the next event, failing the test after one second
pub async fn next_event(rx: &mut broadcast::Receiver<SourceEvent>) -> SourceEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for source event")
        .expect("source event channel closed")
}

/// Asserts nothing is delivered within a short grace period
pub async fn assert_no_event(rx: &mut broadcast::Receiver<SourceEvent>) {
    let result = timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

/// Waits until `condition` holds, polling every few milliseconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
