//! Transport availability used to recover from aborted requests.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tracing::debug;

use crate::Error;
use crate::FetchError;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolves once the backend is believed reachable again after `error`
    async fn when_available(
        &self,
        error: &FetchError,
    ) -> Result<()>;
}

/// Availability flag shared between the transport owner and waiting sources
///
/// Typically flipped to unavailable when the connection is torn down on purpose
/// (page hidden, network offline) and back when it may be used again.
#[derive(Debug)]
pub struct AvailabilityGate {
    tx: watch::Sender<bool>,
}

impl AvailabilityGate {
    pub fn new(available: bool) -> Self {
        let (tx, _rx) = watch::channel(available);
        Self { tx }
    }

    pub fn set_available(
        &self,
        available: bool,
    ) {
        self.tx.send_replace(available);
    }

    pub fn is_available(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AvailabilityGate {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Transport for AvailabilityGate {
    async fn when_available(
        &self,
        error: &FetchError,
    ) -> Result<()> {
        let mut rx = self.tx.subscribe();
        if !*rx.borrow() {
            debug!(status = %error.status, "waiting for transport to become available");
        }
        rx.wait_for(|available| *available)
            .await
            .map(|_| ())
            .map_err(|e| Error::Unavailable(e.to_string()))
    }
}
