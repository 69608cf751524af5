//! Requests and their construction
//!
//! A [`Request`] is built once from [`RequestOptions`] and the owning thread's
//! settings. After that only its attempt counter changes.

mod callbacks;
mod encode;
mod error;
mod options;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub use callbacks::{CallbackKey, Callbacks, Lifecycle, LifecycleCallback, OutcomeCallback, ProgressEvent};
pub use encode::{MAX_DEPTH, encode_body, encode_component, is_structured};
pub use error::RequestError;
pub use options::{Body, DEFAULT_PRIORITY, DataType, Method, RequestOptions};

use crate::scheduler::ThreadSettings;

/// Content type used when a body is present and none was given
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Marker header identifying scripted requests
pub const REQUESTED_WITH: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

/// A normalized request, ready for the transport
#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    method: Method,
    asynchronous: bool,
    data_type: DataType,
    body: Option<String>,
    headers: HashMap<String, String>,
    priority: i32,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    delay: Duration,
    max_attempts: u32,
    attempts: u32,
    callbacks: Callbacks,
}

impl Request {
    /// Build a request, filling unset options from `settings`
    pub fn new(opts: RequestOptions, settings: &ThreadSettings) -> Result<Self, RequestError> {
        debug!(url = %opts.url, method = %opts.method, priority = opts.priority, "Request::new: called");
        if opts.url.is_empty() {
            debug!("Request::new: empty url, rejecting");
            return Err(RequestError::MissingUrl);
        }

        let method = opts.method;
        let mut url = opts.url;
        let mut headers = opts.headers;

        if !headers.contains_key("Accept")
            && let Some(accept) = opts.data_type.accept()
        {
            headers.insert("Accept".to_string(), accept.to_string());
        }

        let body = match opts.data {
            None => None,
            Some(Body::Raw(raw)) => Some(raw),
            Some(Body::Structured(value)) if opts.convert_data && is_structured(&value) => {
                let encoded = encode_body(&value)?;
                if method == Method::Get {
                    debug!("Request::new: moving encoded body into query string");
                    url.push('?');
                    url.push_str(&encoded);
                    None
                } else {
                    Some(encoded)
                }
            }
            Some(Body::Structured(serde_json::Value::String(s))) => Some(s),
            Some(Body::Structured(value)) => Some(value.to_string()),
        };

        if let Some(content_type) = opts.content_type {
            headers.insert("Content-Type".to_string(), content_type);
        } else if !headers.contains_key("Content-Type") && body.as_deref().is_some_and(|b| !b.is_empty()) {
            headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
        }

        let (marker, marker_value) = REQUESTED_WITH;
        headers
            .entry(marker.to_string())
            .or_insert_with(|| marker_value.to_string());

        Ok(Self {
            url,
            method,
            asynchronous: opts.asynchronous,
            data_type: opts.data_type,
            body,
            headers,
            priority: opts.priority,
            username: opts.username,
            password: opts.password,
            // 0 counts as unset
            timeout: opts
                .timeout_ms
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis)
                .or(settings.timeout),
            delay: opts.delay_ms.map(Duration::from_millis).unwrap_or(settings.delay),
            max_attempts: opts.max_attempts.unwrap_or(settings.max_attempts),
            attempts: 0,
            callbacks: opts.callbacks,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// True while another attempt is allowed after a failure
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Count a dispatch attempt
    pub(crate) fn begin_attempt(&mut self) {
        self.attempts += 1;
        debug!(url = %self.url, attempts = self.attempts, "Request::begin_attempt: called");
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            url: self.url.clone(),
            method: self.method,
            priority: self.priority,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
        }
    }
}

/// Plain-data view of a request for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub url: String,
    pub method: Method,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
}
