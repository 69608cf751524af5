//! Caller-supplied request options
//!
//! Everything here is optional except the URL. Missing timing and retry
//! values fall back to the owning thread's settings when the options are
//! turned into a [`Request`](super::Request).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::callbacks::{CallbackKey, Callbacks, Lifecycle, ProgressEvent};
use crate::transport::Outcome;

/// Default priority for new requests (lower is served first)
pub const DEFAULT_PRIORITY: i32 = 10;

/// HTTP method
///
/// Only the four verbs below are supported. Anything else normalizes to GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Normalize an arbitrary method string
    pub fn normalize(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            _ => Self::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Method {
    fn from(s: String) -> Self {
        Self::normalize(&s)
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<Method> for String {
    fn from(m: Method) -> Self {
        m.as_str().to_string()
    }
}

/// Declared response type, used to pick a default Accept header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    Text,
    Html,
    Xml,
    Json,
    Script,
    #[default]
    Unspecified,
}

impl DataType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "text" => Self::Text,
            "html" => Self::Html,
            "xml" => Self::Xml,
            "json" => Self::Json,
            "script" => Self::Script,
            _ => Self::Unspecified,
        }
    }

    /// Accept header value for this response type
    pub fn accept(&self) -> Option<&'static str> {
        match self {
            Self::Text => Some("text/plain, */*; q=0.1"),
            Self::Html => Some("text/html, */*; q=0.1"),
            Self::Xml => Some("application/xml, text/xml, */*; q=0.1"),
            Self::Json => Some("application/json, text/javascript, */*; q=0.1"),
            Self::Script => Some(
                "text/javascript, application/javascript, application/ecmascript, application/x-ecmascript, */*; q=0.1",
            ),
            Self::Unspecified => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Script => "script",
            Self::Unspecified => "none",
        };
        f.write_str(s)
    }
}

impl From<String> for DataType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<DataType> for String {
    fn from(d: DataType) -> Self {
        d.to_string()
    }
}

/// Request body as supplied by the caller
///
/// A `Raw` body is sent as-is. A `Structured` body is flattened into a
/// form-urlencoded string at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Raw(String),
    Structured(serde_json::Value),
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Raw(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Raw(s.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Raw(s),
            other => Self::Structured(other),
        }
    }
}

/// Options for a single request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Target URL (required)
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub method: Method,

    /// Dispatch asynchronously (the default); `false` runs the request inline
    #[serde(rename = "async", default = "default_async")]
    pub asynchronous: bool,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default)]
    pub data: Option<Body>,

    /// Flatten structured bodies into key=value pairs
    #[serde(default = "default_convert_data")]
    pub convert_data: bool,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Lower values are served first
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Timeout in milliseconds (falls back to the thread setting)
    #[serde(rename = "timeout", default)]
    pub timeout_ms: Option<u64>,

    /// Delay before dispatch in milliseconds (falls back to the thread setting)
    #[serde(rename = "delay", default)]
    pub delay_ms: Option<u64>,

    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(skip)]
    pub callbacks: Callbacks,
}

fn default_async() -> bool {
    true
}

fn default_convert_data() -> bool {
    true
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: Method::Get,
            asynchronous: default_async(),
            data_type: DataType::Unspecified,
            data: None,
            convert_data: default_convert_data(),
            content_type: None,
            priority: DEFAULT_PRIORITY,
            headers: HashMap::new(),
            username: None,
            password: None,
            timeout_ms: None,
            delay_ms: None,
            max_attempts: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: impl Into<Method>) -> Self {
        self.method = method.into();
        self
    }

    pub fn data(mut self, data: impl Into<Body>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(delay.as_millis() as u64);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Run the request inline on the scheduler task instead of in the background
    pub fn sync(mut self) -> Self {
        self.asynchronous = false;
        self
    }

    /// Send structured bodies as JSON text instead of flattening them
    pub fn raw_data(mut self) -> Self {
        self.convert_data = false;
        self
    }

    pub fn on(mut self, key: CallbackKey, callback: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.callbacks.on(key, callback);
        self
    }

    pub fn on_success(self, callback: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.on(CallbackKey::Success, callback)
    }

    pub fn on_error(self, callback: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.on(CallbackKey::Error, callback)
    }

    pub fn on_timeout(self, callback: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.on(CallbackKey::Timeout, callback)
    }

    pub fn on_status(self, status: u16, callback: impl Fn(&Outcome) + Send + Sync + 'static) -> Self {
        self.on(CallbackKey::Status(status), callback)
    }

    pub fn on_lifecycle(mut self, kind: Lifecycle, callback: impl Fn(&ProgressEvent) + Send + Sync + 'static) -> Self {
        self.callbacks.on_lifecycle(kind, callback);
        self
    }
}
