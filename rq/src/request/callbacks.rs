//! Per-request callbacks
//!
//! Outcome callbacks are keyed by a closed set of keys: the three terminal
//! outcomes plus exact HTTP status codes. Lifecycle callbacks mirror the XHR
//! progress events. String keys are parsed explicitly and unknown ones are
//! rejected.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use super::error::RequestError;
use crate::transport::{Outcome, TransportError};

/// Callback observing a settled attempt
pub type OutcomeCallback = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// Callback observing a lifecycle event
pub type LifecycleCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Key for an outcome callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKey {
    /// 2xx response
    Success,
    /// 4xx/5xx response, network failure or abort
    Error,
    /// The request's timeout elapsed
    Timeout,
    /// Exact HTTP status code
    Status(u16),
}

impl fmt::Display for CallbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Status(code) => write!(f, "{}", code),
        }
    }
}

impl FromStr for CallbackKey {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            other => match other.parse::<u16>() {
                Ok(code) if (100..600).contains(&code) => Ok(Self::Status(code)),
                _ => Err(RequestError::UnknownCallback(s.to_string())),
            },
        }
    }
}

/// Transport lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    LoadStart,
    Progress,
    Load,
    Abort,
    Error,
    LoadEnd,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LoadStart => "loadstart",
            Self::Progress => "progress",
            Self::Load => "load",
            Self::Abort => "abort",
            Self::Error => "error",
            Self::LoadEnd => "loadend",
        };
        f.write_str(s)
    }
}

impl FromStr for Lifecycle {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loadstart" => Ok(Self::LoadStart),
            "progress" => Ok(Self::Progress),
            "load" => Ok(Self::Load),
            "abort" => Ok(Self::Abort),
            "error" => Ok(Self::Error),
            "loadend" => Ok(Self::LoadEnd),
            _ => Err(RequestError::UnknownCallback(s.to_string())),
        }
    }
}

/// Lifecycle notification, modeled on the XHR ProgressEvent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub kind: Lifecycle,
    pub loaded: u64,
    pub total: Option<u64>,
}

/// The callback set of one request
#[derive(Clone, Default)]
pub struct Callbacks {
    outcome: HashMap<CallbackKey, OutcomeCallback>,
    lifecycle: HashMap<Lifecycle, LifecycleCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outcome callback, replacing any previous one for `key`
    pub fn on(&mut self, key: CallbackKey, callback: impl Fn(&Outcome) + Send + Sync + 'static) {
        self.outcome.insert(key, Arc::new(callback));
    }

    /// Register a lifecycle callback, replacing any previous one for `kind`
    pub fn on_lifecycle(&mut self, kind: Lifecycle, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.lifecycle.insert(kind, Arc::new(callback));
    }

    pub fn contains(&self, key: CallbackKey) -> bool {
        self.outcome.contains_key(&key)
    }

    pub fn contains_lifecycle(&self, kind: Lifecycle) -> bool {
        self.lifecycle.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.outcome.is_empty() && self.lifecycle.is_empty()
    }

    fn fire(&self, key: CallbackKey, outcome: &Outcome) {
        if let Some(callback) = self.outcome.get(&key) {
            debug!(%key, "Callbacks::fire: invoking");
            callback(outcome);
        }
    }

    /// Fire a lifecycle event
    pub(crate) fn emit(&self, kind: Lifecycle, loaded: u64, total: Option<u64>) {
        if let Some(callback) = self.lifecycle.get(&kind) {
            debug!(%kind, loaded, "Callbacks::emit: invoking");
            callback(&ProgressEvent { kind, loaded, total });
        }
    }

    /// Deliver a settled attempt to the matching callbacks
    ///
    /// Exactly one of success/error/timeout fires (none for 1xx/3xx), then any
    /// exact status callback. `loadend` is left to [`Callbacks::finish`].
    pub(crate) fn deliver(&self, outcome: &Outcome) {
        debug!("Callbacks::deliver: called");
        match outcome {
            Outcome::Completed(response) => {
                let size = response.body.len() as u64;
                self.emit(Lifecycle::Load, size, Some(size));
                match response.status_class() {
                    2 => self.fire(CallbackKey::Success, outcome),
                    4 | 5 => self.fire(CallbackKey::Error, outcome),
                    _ => {}
                }
                self.fire(CallbackKey::Status(response.status), outcome);
            }
            Outcome::Failed(TransportError::Timeout(_)) => {
                self.emit(Lifecycle::Abort, 0, None);
                self.fire(CallbackKey::Timeout, outcome);
            }
            Outcome::Failed(TransportError::Aborted) => {
                self.emit(Lifecycle::Abort, 0, None);
                self.fire(CallbackKey::Error, outcome);
            }
            Outcome::Failed(TransportError::Network(_)) => {
                self.emit(Lifecycle::Error, 0, None);
                self.fire(CallbackKey::Error, outcome);
            }
        }
    }

    /// Fire `loadend`; runs once per attempt, after [`Callbacks::deliver`]
    pub(crate) fn finish(&self, outcome: &Outcome) {
        let loaded = match outcome {
            Outcome::Completed(response) => response.body.len() as u64,
            Outcome::Failed(_) => 0,
        };
        self.emit(Lifecycle::LoadEnd, loaded, None);
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut outcome: Vec<String> = self.outcome.keys().map(|k| k.to_string()).collect();
        outcome.sort();
        let mut lifecycle: Vec<String> = self.lifecycle.keys().map(|k| k.to_string()).collect();
        lifecycle.sort();
        f.debug_struct("Callbacks")
            .field("outcome", &outcome)
            .field("lifecycle", &lifecycle)
            .finish()
    }
}
