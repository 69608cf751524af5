//! Runtime messages
//!
//! Commands sent by handles, and the events dispatch tasks report back.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::request::{Request, RequestOptions};
use crate::scheduler::{
    EventHandler, SchedulerError, SchedulerStats, SettingsPatch, Slot, ThreadEvent, ThreadOptions, ThreadSnapshot,
};
use crate::transport::Outcome;

/// Response from runtime operations
pub type RuntimeResponse<T> = Result<T, SchedulerError>;

/// Commands sent to the runtime task
pub enum RuntimeCommand {
    UpdateSettings {
        patch: SettingsPatch,
        reply: oneshot::Sender<()>,
    },
    ApplySettings {
        value: Value,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    CreateThread {
        id: String,
        options: ThreadOptions,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    HasThread {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Enqueue {
        id: String,
        opts: RequestOptions,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    Send {
        opts: RequestOptions,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    Pause {
        id: String,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    Resume {
        id: String,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    Clear {
        id: String,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    On {
        id: String,
        event: ThreadEvent,
        handler: EventHandler,
        reply: oneshot::Sender<RuntimeResponse<()>>,
    },
    Snapshot {
        id: String,
        reply: oneshot::Sender<RuntimeResponse<ThreadSnapshot>>,
    },
    AsyncLimitReached {
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<SchedulerStats>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

impl RuntimeCommand {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateSettings { .. } => "UpdateSettings",
            Self::ApplySettings { .. } => "ApplySettings",
            Self::CreateThread { .. } => "CreateThread",
            Self::HasThread { .. } => "HasThread",
            Self::Enqueue { .. } => "Enqueue",
            Self::Send { .. } => "Send",
            Self::Pause { .. } => "Pause",
            Self::Resume { .. } => "Resume",
            Self::Clear { .. } => "Clear",
            Self::On { .. } => "On",
            Self::Snapshot { .. } => "Snapshot",
            Self::AsyncLimitReached { .. } => "AsyncLimitReached",
            Self::Stats { .. } => "Stats",
            Self::WaitIdle { .. } => "WaitIdle",
            Self::Shutdown => "Shutdown",
        }
    }
}

/// Events reported by dispatch tasks
#[derive(Debug)]
pub enum DispatchEvent {
    /// An asynchronous attempt settled
    Settled {
        slot: Slot,
        request: Request,
        outcome: Outcome,
    },
    /// A synchronous request's delay elapsed; run it inline
    SyncReady { slot: Slot, request: Request },
}
