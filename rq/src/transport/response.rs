//! Responses and attempt outcomes

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use super::error::TransportError;

/// A response as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Leading digit of the status code (2 for 2xx and so on)
    pub fn status_class(&self) -> u16 {
        self.status / 100
    }

    pub fn is_success(&self) -> bool {
        self.status_class() == 2
    }

    /// Header lookup, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// How one transport attempt settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered, whatever the status
    Completed(Response),
    Failed(TransportError),
}

impl Outcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Completed(response) => Some(response),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Status code, if a response arrived
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }
}

impl From<Result<Response, TransportError>> for Outcome {
    fn from(result: Result<Response, TransportError>) -> Self {
        match result {
            Ok(response) => Self::Completed(response),
            Err(err) => Self::Failed(err),
        }
    }
}
