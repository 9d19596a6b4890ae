//! Long-poll ("blocking query") watches over service-discovery resources.
//!
//! Subscribers open a watch key through [`BlockingClient`]; concurrent
//! subscriptions to one key share a single [`Source`] whose poll loop passes
//! the last seen [`Cursor`] back to the backend. When the last subscriber
//! leaves, the cursor and last event are cached and the next source for that
//! key resumes from them.

mod client;
mod config;
mod errors;
mod key;
mod repository;
mod settings;
mod source;
mod transport;
pub mod metrics;

pub use client::*;
pub use self::config::*;
pub use errors::*;
pub use key::*;
pub use repository::*;
pub use settings::*;
pub use source::*;
pub use transport::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
