//! Scheduler runtime with actor pattern
//!
//! One tokio task owns the scheduler and the transport. Handles talk to it
//! over channels, so all scheduling state is touched from a single task.

mod actor;
mod config;
mod handle;
mod messages;

pub use config::RuntimeConfig;
pub use handle::{SchedulerHandle, ThreadHandle};
pub use messages::RuntimeResponse;
