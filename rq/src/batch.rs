//! Batch files
//!
//! A batch describes settings, named threads with their queued requests, and
//! one-off requests, as YAML:
//!
//! ```yaml
//! settings:
//!   maxAsync: 2
//! threads:
//!   - id: uploads
//!     limit: 10
//!     maxAttempts: 3
//!     requests:
//!       - url: /upload
//!         method: POST
//!         data: { name: report, tags: [q1, draft] }
//! requests:
//!   - url: /ping
//! ```

use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::request::{Method, RequestOptions};
use crate::runtime::{RuntimeResponse, SchedulerHandle};
use crate::scheduler::{SchedulerStats, SettingsPatch, ThreadOptions};
use crate::transport::Outcome;

/// A named thread and the requests to queue on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchThread {
    pub id: String,

    #[serde(flatten)]
    pub options: ThreadOptions,

    #[serde(default)]
    pub requests: Vec<RequestOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Applied over the configured scheduler settings
    #[serde(default)]
    pub settings: SettingsPatch,

    #[serde(default)]
    pub threads: Vec<BatchThread>,

    /// Sent one-off, outside any thread
    #[serde(default)]
    pub requests: Vec<RequestOptions>,
}

/// One settled attempt, as seen by a batch run
#[derive(Debug, Clone)]
pub struct AttemptReport {
    /// Owning thread, `None` for one-off requests
    pub thread: Option<String>,
    pub method: Method,
    pub url: String,
    pub outcome: Outcome,
}

/// Receives a report per settled attempt
pub type AttemptSink = Arc<dyn Fn(AttemptReport) + Send + Sync>;

impl Batch {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Batch::load: called");
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read batch file: {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to parse batch file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let batch: Batch = serde_yaml::from_str(content)?;
        Ok(batch)
    }

    /// Total number of requests in the batch
    pub fn request_count(&self) -> usize {
        self.requests.len() + self.threads.iter().map(|t| t.requests.len()).sum::<usize>()
    }

    /// Queue everything on the runtime and wait until it has all settled
    pub async fn run(&self, handle: &SchedulerHandle, sink: AttemptSink) -> RuntimeResponse<SchedulerStats> {
        debug!(
            threads = self.threads.len(),
            requests = self.request_count(),
            "Batch::run: called"
        );
        handle.update_settings(self.settings.clone()).await?;

        for thread in &self.threads {
            let thread_handle = handle.create_thread(&thread.id, thread.options.clone()).await?;
            for opts in &thread.requests {
                thread_handle.enqueue(instrument(opts.clone(), Some(&thread.id), &sink)).await?;
            }
        }
        for opts in &self.requests {
            handle.send(instrument(opts.clone(), None, &sink)).await?;
        }

        handle.wait_idle().await?;
        let stats = handle.stats().await?;
        info!(?stats, "Batch finished");
        Ok(stats)
    }
}

/// Attach callbacks that forward every terminal outcome to `sink`
fn instrument(opts: RequestOptions, thread: Option<&str>, sink: &AttemptSink) -> RequestOptions {
    let method = opts.method;
    let url = opts.url.clone();
    let forward = |sink: &AttemptSink| {
        let sink = sink.clone();
        let thread = thread.map(str::to_string);
        let url = url.clone();
        move |outcome: &Outcome| {
            sink(AttemptReport {
                thread: thread.clone(),
                method,
                url: url.clone(),
                outcome: outcome.clone(),
            })
        }
    };
    opts.on_success(forward(sink))
        .on_error(forward(sink))
        .on_timeout(forward(sink))
}
