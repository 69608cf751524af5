//! requeue - client-side request admission scheduler
//!
//! Requests are queued on named, independent threads. Each thread serves its
//! own queue in priority order with at most one request in flight; the
//! scheduler serves threads round robin under a global concurrency limit and
//! retries failed attempts up to a per-request maximum.
//!
//! # Modules
//!
//! - [`request`] - request options, normalization, body encoding, callbacks
//! - [`scheduler`] - threads, priority queues and the admission loop
//! - [`transport`] - the transport trait and an HTTP implementation
//! - [`runtime`] - the tokio task that drives a scheduler and its handles
//! - [`config`] - configuration types and loading
//! - [`batch`] - YAML batch files for the CLI
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use requeue::{HttpConfig, HttpTransport, RequestOptions, RuntimeConfig, SchedulerHandle, Settings, ThreadOptions};
//!
//! let transport = HttpTransport::from_config(&HttpConfig::default())?;
//! let handle = SchedulerHandle::spawn(Settings::default(), Arc::new(transport), &RuntimeConfig::default());
//! let uploads = handle.create_thread("uploads", ThreadOptions::default().max_attempts(3)).await?;
//! uploads
//!     .enqueue(RequestOptions::new("https://example.com/upload").method("POST").on_success(|_| println!("done")))
//!     .await?;
//! handle.wait_idle().await?;
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod request;
pub mod runtime;
pub mod scheduler;
pub mod transport;

pub use batch::{AttemptReport, AttemptSink, Batch, BatchThread};
pub use config::Config;
pub use request::{Body, CallbackKey, DataType, Lifecycle, Method, ProgressEvent, Request, RequestError, RequestOptions};
pub use runtime::{RuntimeConfig, RuntimeResponse, SchedulerHandle, ThreadHandle};
pub use scheduler::{
    RetryGate, Scheduler, SchedulerError, SchedulerStats, Settings, SettingsPatch, ThreadEvent, ThreadOptions,
    ThreadSnapshot, ThreadView,
};
pub use transport::{HttpConfig, HttpTransport, Outcome, Progress, Response, Transport, TransportError};
