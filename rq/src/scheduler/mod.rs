//! Request scheduling
//!
//! Threads, priority queues, the global concurrency gate and retry policy,
//! held in one synchronous state machine.

mod admission;
mod config;
mod error;
mod queue;
mod thread;

pub use admission::{Dispatch, Scheduler, SchedulerStats, Slot};
pub use config::{RetryGate, SETTING_KEYS, Settings, SettingsPatch, ThreadOptions, ThreadSettings};
pub use error::SchedulerError;
pub use queue::{Prioritized, PriorityQueue};
pub use thread::{EventHandler, Thread, ThreadEvent, ThreadSnapshot, ThreadView};
