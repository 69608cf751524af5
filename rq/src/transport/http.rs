//! HTTP transport built on reqwest

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Progress, Response, Transport, TransportError};
use crate::request::{Method, Request};

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Prefix for request URLs that are not absolute
    #[serde(default)]
    pub base_url: Option<String>,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("requeue/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// [`Transport`] that issues real HTTP requests
///
/// Per-attempt timeouts are enforced by the runtime, so the client itself
/// only bounds connection setup.
pub struct HttpTransport {
    http: Client,
    base_url: Option<String>,
}

impl HttpTransport {
    pub fn from_config(config: &HttpConfig) -> Result<Self, TransportError> {
        debug!(?config, "HttpTransport::from_config: called");
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    /// Absolute URL for a request URL
    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/')),
            None => url.to_string(),
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request, progress: &Progress<'_>) -> Result<Response, TransportError> {
        let url = self.resolve_url(request.url());
        debug!(%url, method = %request.method(), "HttpTransport::execute: called");

        let mut builder = self.http.request(to_reqwest_method(request.method()), url.as_str());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(username) = request.username() {
            builder = builder.basic_auth(username, request.password());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            debug!(error = %e, "HttpTransport::execute: send failed");
            TransportError::from(e)
        })?;

        let status = response.status().as_u16();
        let total = response.content_length();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        debug!(status, ?total, "HttpTransport::execute: response received");

        let mut buf = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buf.extend_from_slice(&chunk);
            progress.report(buf.len() as u64, total);
        }
        debug!(body_len = buf.len(), "HttpTransport::execute: body read");

        Ok(Response {
            status,
            headers,
            body: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}
