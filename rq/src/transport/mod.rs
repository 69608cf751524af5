//! Transport adapter
//!
//! The scheduler decides when a request goes out; a [`Transport`] decides
//! how. Implementations perform one attempt and report either a response or
//! a [`TransportError`]. Callback delivery and retries are handled by the
//! runtime, not the transport.

mod error;
mod http;
mod response;

use async_trait::async_trait;

pub use error::TransportError;
pub use http::{HttpConfig, HttpTransport};
pub use response::{Outcome, Response};

use crate::request::{Callbacks, Lifecycle, Request};

/// Sink for download progress of one attempt
pub struct Progress<'a> {
    callbacks: Option<&'a Callbacks>,
}

impl<'a> Progress<'a> {
    pub fn new(callbacks: &'a Callbacks) -> Self {
        Self {
            callbacks: Some(callbacks),
        }
    }

    /// A sink that discards reports
    pub fn none() -> Self {
        Self { callbacks: None }
    }

    /// Report bytes received so far
    pub fn report(&self, loaded: u64, total: Option<u64>) {
        if let Some(callbacks) = self.callbacks {
            callbacks.emit(Lifecycle::Progress, loaded, total);
        }
    }
}

/// Performs one attempt of a request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request, progress: &Progress<'_>) -> Result<Response, TransportError>;
}
