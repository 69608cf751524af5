//! Scheduler implementation
//!
//! The scheduler is a plain state machine: callers feed it edge events
//! (enqueue, settlement, settings changes) and then ask it which requests to
//! dispatch next. It never performs I/O or waits; the runtime does that.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use super::config::{Settings, SettingsPatch, ThreadOptions, ThreadSettings};
use super::error::SchedulerError;
use super::thread::{EventHandler, Thread, ThreadEvent, ThreadView, ViewEnqueues};
use crate::request::{Request, RequestOptions};
use crate::transport::Outcome;

/// Where a dispatched request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Backlog,
    Thread(usize),
}

/// A request admitted for dispatch
#[derive(Debug)]
pub struct Dispatch {
    pub slot: Slot,
    pub request: Request,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_enqueued: u64,
    pub total_dropped: u64,
    pub total_dispatched: u64,
    pub total_settled: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub peak_concurrent: usize,
}

/// Process-wide request scheduler
///
/// Holds the registered threads (in registration order), the backlog thread
/// for one-off requests, the global concurrency counter and the round-robin
/// cursor.
pub struct Scheduler {
    settings: Settings,
    threads: Vec<Thread>,
    index: HashMap<String, usize>,
    backlog: Thread,
    concurrent: usize,
    last_served: Option<usize>,
    stats: SchedulerStats,
}

fn limit_reached(concurrent: usize, max_async: Option<usize>) -> bool {
    max_async.is_some_and(|max| concurrent >= max)
}

impl Scheduler {
    /// Create a new scheduler with the given settings
    pub fn new(settings: Settings) -> Self {
        debug!(?settings, "Scheduler::new: called");
        let backlog = Thread::backlog(ThreadSettings::from(&settings));
        Self {
            settings,
            threads: Vec::new(),
            index: HashMap::new(),
            backlog,
            concurrent: 0,
            last_served: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Update global settings
    ///
    /// Existing named threads keep the settings they resolved at creation;
    /// the backlog follows the new globals.
    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        debug!(?patch, "Scheduler::update_settings: called");
        self.settings.apply(patch);
        self.backlog.set_settings(ThreadSettings::from(&self.settings));
    }

    /// Update global settings from a loosely typed object (unknown keys ignored)
    pub fn apply_settings(&mut self, value: &serde_json::Value) -> Result<(), serde_json::Error> {
        debug!(%value, "Scheduler::apply_settings: called");
        self.settings.apply_value(value)?;
        self.backlog.set_settings(ThreadSettings::from(&self.settings));
        Ok(())
    }

    /// Register a new named thread
    pub fn create_thread(&mut self, id: &str, options: &ThreadOptions) -> Result<(), SchedulerError> {
        debug!(%id, ?options, "Scheduler::create_thread: called");
        if self.index.contains_key(id) {
            debug!(%id, "Scheduler::create_thread: duplicate id, rejecting");
            return Err(SchedulerError::ThreadExists(id.to_string()));
        }
        let thread = Thread::new(id, options.resolve(&self.settings));
        self.index.insert(id.to_string(), self.threads.len());
        self.threads.push(thread);
        info!(%id, threads = self.threads.len(), "Created thread");
        Ok(())
    }

    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.index.get(id).map(|&i| &self.threads[i])
    }

    /// Identifiers in registration order
    pub fn thread_ids(&self) -> impl Iterator<Item = &str> {
        self.threads.iter().filter_map(Thread::id)
    }

    pub fn backlog(&self) -> &Thread {
        &self.backlog
    }

    fn thread_mut(&mut self, id: &str) -> Result<&mut Thread, SchedulerError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.threads[i]),
            None => Err(SchedulerError::UnknownThread(id.to_string())),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Thread {
        match slot {
            Slot::Backlog => &mut self.backlog,
            Slot::Thread(i) => &mut self.threads[i],
        }
    }

    /// Run `f` against a thread's capability view
    pub fn with_thread<R>(&mut self, id: &str, f: impl FnOnce(&mut dyn ThreadView) -> R) -> Result<R, SchedulerError> {
        let thread = self.thread_mut(id)?;
        let result = thread.with_view(f);
        let enqueues = thread.take_view_enqueues();
        self.record_view_enqueues(enqueues);
        Ok(result)
    }

    /// Enqueue into a named thread
    ///
    /// A request beyond the thread's limit is dropped silently.
    pub fn enqueue(&mut self, id: &str, opts: RequestOptions) -> Result<(), SchedulerError> {
        debug!(%id, url = %opts.url, "Scheduler::enqueue: called");
        let accepted = self.thread_mut(id)?.enqueue(opts)?;
        self.record_enqueue(accepted);
        Ok(())
    }

    /// Enqueue a one-off request into the backlog
    pub fn send(&mut self, opts: RequestOptions) -> Result<(), SchedulerError> {
        debug!(url = %opts.url, "Scheduler::send: called");
        let accepted = self.backlog.enqueue(opts)?;
        self.record_enqueue(accepted);
        Ok(())
    }

    fn record_enqueue(&mut self, accepted: bool) {
        if accepted {
            self.stats.total_enqueued += 1;
        } else {
            self.stats.total_dropped += 1;
        }
    }

    /// Count requests event handlers enqueued through a thread's view
    fn record_view_enqueues(&mut self, enqueues: ViewEnqueues) {
        self.stats.total_enqueued += enqueues.accepted;
        self.stats.total_dropped += enqueues.dropped;
    }

    pub fn pause(&mut self, id: &str) -> Result<(), SchedulerError> {
        self.thread_mut(id)?.pause();
        Ok(())
    }

    pub fn resume(&mut self, id: &str) -> Result<(), SchedulerError> {
        self.thread_mut(id)?.resume();
        Ok(())
    }

    pub fn clear(&mut self, id: &str) -> Result<(), SchedulerError> {
        self.thread_mut(id)?.clear();
        Ok(())
    }

    pub fn on(&mut self, id: &str, event: ThreadEvent, handler: EventHandler) -> Result<(), SchedulerError> {
        self.thread_mut(id)?.on(event, handler);
        Ok(())
    }

    /// True when the global concurrency limit is saturated
    pub fn async_limit_reached(&self) -> bool {
        limit_reached(self.concurrent, self.settings.max_async)
    }

    /// Requests currently admitted and not yet settled
    pub fn concurrent(&self) -> usize {
        self.concurrent
    }

    /// Nothing admitted is still outstanding
    pub fn is_idle(&self) -> bool {
        self.concurrent == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    /// One admission pass
    ///
    /// Drains the backlog first, then visits every registered thread once,
    /// starting just after the last served one, taking at most one request
    /// per eligible thread while the concurrency limit allows.
    pub fn serve(&mut self) -> Vec<Dispatch> {
        debug!(concurrent = self.concurrent, threads = self.threads.len(), "Scheduler::serve: called");
        let max_async = self.settings.max_async;
        let mut admitted = Vec::new();

        while !limit_reached(self.concurrent, max_async) {
            let Some(request) = self.backlog.take_next() else {
                break;
            };
            self.admit(Slot::Backlog, request, &mut admitted);
        }

        let count = self.threads.len();
        if count == 0 {
            return admitted;
        }

        let mut index = match self.last_served {
            Some(last) if last + 1 < count => last + 1,
            _ => 0,
        };

        for _ in 0..count {
            let thread = &mut self.threads[index];
            let eligible = !limit_reached(self.concurrent, max_async)
                && !thread.is_paused()
                && !thread.is_empty()
                && !thread.is_pending();

            if eligible {
                thread.trigger(ThreadEvent::BeforeNext);
                let enqueues = thread.take_view_enqueues();
                self.stats.total_enqueued += enqueues.accepted;
                self.stats.total_dropped += enqueues.dropped;
                if !thread.is_paused() && !thread.is_empty() {
                    if let Some(request) = thread.dequeue_for_dispatch() {
                        self.admit(Slot::Thread(index), request, &mut admitted);
                    }
                    self.last_served = Some(index);
                } else {
                    debug!(index, "Scheduler::serve: beforeNext handler withdrew thread");
                }
            }
            index = (index + 1) % count;
        }

        admitted
    }

    /// Run admission passes until one admits nothing
    pub fn serve_until_settled(&mut self) -> Vec<Dispatch> {
        let mut admitted = Vec::new();
        loop {
            let pass = self.serve();
            if pass.is_empty() {
                break;
            }
            admitted.extend(pass);
        }
        admitted
    }

    fn admit(&mut self, slot: Slot, request: Request, admitted: &mut Vec<Dispatch>) {
        self.concurrent += 1;
        self.stats.total_dispatched += 1;
        self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.concurrent);
        debug!(?slot, url = %request.url(), concurrent = self.concurrent, "Scheduler::admit: admitted");
        admitted.push(Dispatch { slot, request });
    }

    /// Record the end of one transport attempt
    ///
    /// Failures go through the owning thread's retry policy, then the thread's
    /// completion hook runs and the concurrency slot is released. Call
    /// [`serve`](Self::serve) afterwards to re-evaluate admission.
    pub fn settle(&mut self, slot: Slot, request: Request, outcome: &Outcome) {
        debug!(?slot, url = %request.url(), attempts = request.attempts(), "Scheduler::settle: called");
        let thread = self.slot_mut(slot);
        let retried = match outcome {
            Outcome::Completed(_) => false,
            Outcome::Failed(err) if err.is_abort() => thread.on_transport_abort(&request),
            Outcome::Failed(_) => thread.on_transport_error(&request),
        };
        thread.on_transport_complete(request);
        let enqueues = thread.take_view_enqueues();
        self.record_view_enqueues(enqueues);

        self.concurrent = self.concurrent.saturating_sub(1);
        self.stats.total_settled += 1;
        if matches!(outcome, Outcome::Failed(_)) {
            self.stats.total_failed += 1;
        }
        if retried {
            self.stats.total_retried += 1;
        }
    }
}
