//! Blocking Query Error Hierarchy
//!
//! Errors are split by who can act on them:
//! - configuration and watch key errors are programming errors reported by `open`
//! - fetch errors come from the backend; the abort status is recoverable
//! - settings and transport errors stop the current watch cycle

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration load or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backend fetch failures surfaced to listeners
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Watch key does not match `<scheme>/<dc>/<model>/<selector>`
    #[error("Invalid watch key {key:?}: {reason}")]
    InvalidWatchKey { key: String, reason: String },

    /// No repository is registered for the model named by the watch key
    #[error("No repository registered for model {0:?}")]
    UnknownRepository(String),

    /// Settings provider could not answer whether blocking is enabled
    #[error("Settings lookup for {slug:?} failed: {reason}")]
    Settings { slug: String, reason: String },

    /// Transport gave up waiting for the backend to become reachable
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Returns the backend status code when this is a fetch error
    pub fn status(&self) -> Option<&str> {
        match self {
            Error::Fetch(e) => Some(e.status.as_str()),
            _ => None,
        }
    }
}

/// Failure reported by a repository fetch
///
/// `status` carries the HTTP status as a string. The transport reports a
/// client-initiated abort as status `"0"`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Fetch failed with status {status}: {message}")]
pub struct FetchError {
    pub status: String,
    pub message: String,
}

impl FetchError {
    /// Status used by the transport for aborted requests
    pub const ABORT_STATUS: &'static str = "0";

    pub fn new(
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Client-initiated abort, e.g. the connection was dropped while hidden
    pub fn aborted() -> Self {
        Self::new(Self::ABORT_STATUS, "request aborted")
    }

    /// Lookup the repository does not support
    pub fn unsupported(operation: &'static str) -> Self {
        Self::new("405", format!("{operation} is not supported by this repository"))
    }

    pub fn is_abort(&self) -> bool {
        self.status == Self::ABORT_STATUS
    }
}
