//! Handles for talking to the scheduler runtime

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::actor::{Runtime, actor_loop};
use super::config::RuntimeConfig;
use super::messages::{RuntimeCommand, RuntimeResponse};
use crate::request::RequestOptions;
use crate::scheduler::{
    EventHandler, Scheduler, SchedulerError, SchedulerStats, Settings, SettingsPatch, ThreadEvent, ThreadOptions,
    ThreadSnapshot,
};
use crate::transport::Transport;

/// Send a command and wait for its reply
async fn call<T>(
    tx: &mpsc::Sender<RuntimeCommand>,
    build: impl FnOnce(oneshot::Sender<T>) -> RuntimeCommand,
) -> Result<T, SchedulerError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(build(reply_tx)).await.map_err(|_| SchedulerError::Closed)?;
    reply_rx.await.map_err(|_| SchedulerError::Closed)
}

/// Handle to the scheduler runtime
///
/// Cheap to clone. The runtime task stops on [`shutdown`](Self::shutdown) or
/// when the last handle is dropped.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<RuntimeCommand>,
}

impl SchedulerHandle {
    /// Spawn the runtime task on the current tokio runtime
    pub fn spawn(settings: Settings, transport: Arc<dyn Transport>, config: &RuntimeConfig) -> Self {
        debug!(?settings, ?config, "SchedulerHandle::spawn: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let runtime = Runtime::new(Scheduler::new(settings), transport, events_tx);
        tokio::spawn(actor_loop(runtime, rx, events_rx));

        info!("Scheduler runtime spawned");
        Self { tx }
    }

    /// Update global settings
    pub async fn update_settings(&self, patch: SettingsPatch) -> RuntimeResponse<()> {
        debug!(?patch, "SchedulerHandle::update_settings: called");
        call(&self.tx, |reply| RuntimeCommand::UpdateSettings { patch, reply }).await
    }

    /// Update global settings from a JSON object; unknown keys are ignored
    pub async fn apply_settings(&self, value: Value) -> RuntimeResponse<()> {
        debug!(%value, "SchedulerHandle::apply_settings: called");
        call(&self.tx, |reply| RuntimeCommand::ApplySettings { value, reply }).await?
    }

    /// Register a named thread
    pub async fn create_thread(&self, id: &str, options: ThreadOptions) -> RuntimeResponse<ThreadHandle> {
        debug!(%id, ?options, "SchedulerHandle::create_thread: called");
        call(&self.tx, |reply| RuntimeCommand::CreateThread {
            id: id.to_string(),
            options,
            reply,
        })
        .await??;
        Ok(self.thread_handle(id))
    }

    /// Look up a named thread
    pub async fn thread(&self, id: &str) -> RuntimeResponse<Option<ThreadHandle>> {
        debug!(%id, "SchedulerHandle::thread: called");
        let exists = call(&self.tx, |reply| RuntimeCommand::HasThread {
            id: id.to_string(),
            reply,
        })
        .await?;
        Ok(exists.then(|| self.thread_handle(id)))
    }

    fn thread_handle(&self, id: &str) -> ThreadHandle {
        ThreadHandle {
            id: id.to_string(),
            tx: self.tx.clone(),
        }
    }

    /// Enqueue into a named thread
    pub async fn enqueue(&self, id: &str, opts: RequestOptions) -> RuntimeResponse<()> {
        debug!(%id, url = %opts.url, "SchedulerHandle::enqueue: called");
        call(&self.tx, |reply| RuntimeCommand::Enqueue {
            id: id.to_string(),
            opts,
            reply,
        })
        .await?
    }

    /// Send a one-off request through the backlog
    pub async fn send(&self, opts: RequestOptions) -> RuntimeResponse<()> {
        debug!(url = %opts.url, "SchedulerHandle::send: called");
        call(&self.tx, |reply| RuntimeCommand::Send { opts, reply }).await?
    }

    /// Send a one-off GET with default options
    pub async fn send_url(&self, url: impl Into<String>) -> RuntimeResponse<()> {
        self.send(RequestOptions::new(url)).await
    }

    /// Whether the global concurrency limit is saturated
    pub async fn async_limit_reached(&self) -> RuntimeResponse<bool> {
        call(&self.tx, |reply| RuntimeCommand::AsyncLimitReached { reply }).await
    }

    pub async fn stats(&self) -> RuntimeResponse<SchedulerStats> {
        call(&self.tx, |reply| RuntimeCommand::Stats { reply }).await
    }

    /// Wait until no admitted request is outstanding
    ///
    /// Requests held back by paused threads do not count.
    pub async fn wait_idle(&self) -> RuntimeResponse<()> {
        debug!("SchedulerHandle::wait_idle: called");
        call(&self.tx, |reply| RuntimeCommand::WaitIdle { reply }).await
    }

    /// Stop the runtime task
    pub async fn shutdown(&self) -> RuntimeResponse<()> {
        debug!("SchedulerHandle::shutdown: called");
        self.tx
            .send(RuntimeCommand::Shutdown)
            .await
            .map_err(|_| SchedulerError::Closed)
    }
}

/// Public proxy for one named thread
#[derive(Clone)]
pub struct ThreadHandle {
    id: String,
    tx: mpsc::Sender<RuntimeCommand>,
}

impl ThreadHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn enqueue(&self, opts: RequestOptions) -> RuntimeResponse<()> {
        debug!(id = %self.id, url = %opts.url, "ThreadHandle::enqueue: called");
        call(&self.tx, |reply| RuntimeCommand::Enqueue {
            id: self.id.clone(),
            opts,
            reply,
        })
        .await?
    }

    /// Stop dispatching after the in-flight request, if any
    pub async fn pause(&self) -> RuntimeResponse<()> {
        debug!(id = %self.id, "ThreadHandle::pause: called");
        call(&self.tx, |reply| RuntimeCommand::Pause {
            id: self.id.clone(),
            reply,
        })
        .await?
    }

    pub async fn resume(&self) -> RuntimeResponse<()> {
        debug!(id = %self.id, "ThreadHandle::resume: called");
        call(&self.tx, |reply| RuntimeCommand::Resume {
            id: self.id.clone(),
            reply,
        })
        .await?
    }

    /// Drop every queued request; the in-flight one is unaffected
    pub async fn clear(&self) -> RuntimeResponse<()> {
        debug!(id = %self.id, "ThreadHandle::clear: called");
        call(&self.tx, |reply| RuntimeCommand::Clear {
            id: self.id.clone(),
            reply,
        })
        .await?
    }

    /// Register an event handler, replacing any previous one
    pub async fn on(&self, event: ThreadEvent, handler: EventHandler) -> RuntimeResponse<()> {
        debug!(id = %self.id, %event, "ThreadHandle::on: called");
        call(&self.tx, |reply| RuntimeCommand::On {
            id: self.id.clone(),
            event,
            handler,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> RuntimeResponse<ThreadSnapshot> {
        call(&self.tx, |reply| RuntimeCommand::Snapshot {
            id: self.id.clone(),
            reply,
        })
        .await?
    }

    pub async fn len(&self) -> RuntimeResponse<usize> {
        Ok(self.snapshot().await?.length)
    }

    pub async fn is_empty(&self) -> RuntimeResponse<bool> {
        Ok(self.snapshot().await?.is_empty())
    }

    pub async fn is_paused(&self) -> RuntimeResponse<bool> {
        Ok(self.snapshot().await?.paused)
    }

    pub async fn is_pending(&self) -> RuntimeResponse<bool> {
        Ok(self.snapshot().await?.pending)
    }
}
