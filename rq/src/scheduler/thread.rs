//! Request threads
//!
//! A thread is an independently scheduled queue of requests. At most one of
//! its requests is in flight at a time; the scheduler serves threads round
//! robin and each thread serves its own queue in priority order.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::config::ThreadSettings;
use super::error::SchedulerError;
use super::queue::PriorityQueue;
use crate::request::{Request, RequestError, RequestOptions, RequestSummary};

/// Handler for thread events
///
/// Handlers only ever see the restricted [`ThreadView`] of their thread.
pub type EventHandler = Arc<dyn Fn(&mut dyn ThreadView) + Send + Sync>;

/// Events a thread raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadEvent {
    /// About to hand the next request to the transport
    BeforeNext,
    /// A completion left the queue empty
    Empty,
}

impl fmt::Display for ThreadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeNext => write!(f, "beforeNext"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

impl FromStr for ThreadEvent {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beforeNext" => Ok(Self::BeforeNext),
            "empty" => Ok(Self::Empty),
            _ => Err(SchedulerError::UnknownEvent(s.to_string())),
        }
    }
}

/// Capability view of a thread handed to event handlers
///
/// Exposes what a handler may observe and do without reaching scheduler
/// internals such as the pending flag or dispatch.
pub trait ThreadView {
    /// Identifier, `None` for the backlog
    fn id(&self) -> Option<&str>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_pending(&self) -> bool;

    /// Enqueue a request, subject to the thread's limit
    fn enqueue(&mut self, opts: RequestOptions) -> Result<(), RequestError>;

    fn pause(&mut self);

    fn resume(&mut self);

    fn clear(&mut self);

    fn on(&mut self, event: ThreadEvent, handler: EventHandler);

    /// Partition holding the next request in line
    fn next_partition(&self) -> Option<&VecDeque<Request>>;

    /// Request whose completion was recorded last
    fn last_served(&self) -> Option<&Request>;
}

/// Read-only summary of a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSnapshot {
    pub id: Option<String>,
    pub length: usize,
    pub paused: bool,
    pub pending: bool,
    pub last_served: Option<RequestSummary>,
}

impl ThreadSnapshot {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// A named queue of requests with its own settings and state
pub struct Thread {
    id: Option<String>,
    settings: ThreadSettings,
    queue: PriorityQueue<Request>,
    paused: bool,
    pending: bool,
    last_served: Option<Request>,
    handlers: HashMap<ThreadEvent, EventHandler>,
    view_enqueues: ViewEnqueues,
}

/// Enqueue results of handlers since the scheduler last collected them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ViewEnqueues {
    pub accepted: u64,
    pub dropped: u64,
}

impl Thread {
    /// Create a named thread
    pub fn new(id: impl Into<String>, settings: ThreadSettings) -> Self {
        let id = id.into();
        debug!(%id, ?settings, "Thread::new: called");
        Self::build(Some(id), settings)
    }

    /// Create the unnamed backlog thread
    pub(crate) fn backlog(settings: ThreadSettings) -> Self {
        debug!(?settings, "Thread::backlog: called");
        Self::build(None, settings)
    }

    fn build(id: Option<String>, settings: ThreadSettings) -> Self {
        Self {
            id,
            settings,
            queue: PriorityQueue::new(),
            paused: false,
            pending: false,
            last_served: None,
            handlers: HashMap::new(),
            view_enqueues: ViewEnqueues::default(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn settings(&self) -> &ThreadSettings {
        &self.settings
    }

    pub(crate) fn set_settings(&mut self, settings: ThreadSettings) {
        self.settings = settings;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn last_served(&self) -> Option<&Request> {
        self.last_served.as_ref()
    }

    pub fn next_partition(&self) -> Option<&VecDeque<Request>> {
        self.queue.peek()
    }

    fn at_limit(&self) -> bool {
        self.settings.limit.is_some_and(|limit| self.queue.len() >= limit)
    }

    /// Build and queue a request
    ///
    /// Returns `Ok(false)` when the queue is already at its limit: the request
    /// is dropped without an error. Callers that need feedback should check
    /// the length first.
    pub(crate) fn enqueue(&mut self, opts: RequestOptions) -> Result<bool, RequestError> {
        debug!(id = ?self.id, url = %opts.url, "Thread::enqueue: called");
        if self.at_limit() {
            debug!(id = ?self.id, limit = ?self.settings.limit, "Thread::enqueue: at limit, dropping request");
            return Ok(false);
        }
        let request = Request::new(opts, &self.settings)?;
        self.queue.push(request);
        Ok(true)
    }

    /// Take the next request for the transport and mark the thread pending
    ///
    /// Returns `None` while a request is already in flight.
    pub(crate) fn dequeue_for_dispatch(&mut self) -> Option<Request> {
        if self.pending {
            debug!(id = ?self.id, "Thread::dequeue_for_dispatch: already pending, refusing");
            return None;
        }
        let request = self.queue.shift()?;
        self.pending = true;
        debug!(id = ?self.id, url = %request.url(), "Thread::dequeue_for_dispatch: dequeued");
        Some(request)
    }

    /// Take the next request without touching the pending flag (backlog only)
    pub(crate) fn take_next(&mut self) -> Option<Request> {
        self.queue.shift()
    }

    /// Retry hook for a failed attempt; returns true when re-queued
    pub(crate) fn on_transport_error(&mut self, request: &Request) -> bool {
        debug!(id = ?self.id, url = %request.url(), attempts = request.attempts(), "Thread::on_transport_error: called");
        self.maybe_retry(request)
    }

    /// Retry hook for an aborted or timed out attempt; returns true when re-queued
    pub(crate) fn on_transport_abort(&mut self, request: &Request) -> bool {
        debug!(id = ?self.id, url = %request.url(), attempts = request.attempts(), "Thread::on_transport_abort: called");
        self.maybe_retry(request)
    }

    fn maybe_retry(&mut self, request: &Request) -> bool {
        if !request.can_retry() {
            debug!(id = ?self.id, "Thread::maybe_retry: attempts exhausted, dropping");
            return false;
        }
        if !self.settings.retry_gate.allows(self.queue.len(), self.settings.limit) {
            debug!(id = ?self.id, gate = %self.settings.retry_gate, "Thread::maybe_retry: gate closed, dropping");
            return false;
        }
        self.queue.push(request.clone());
        true
    }

    /// Completion hook: clears pending, records the request and fires `empty`
    pub(crate) fn on_transport_complete(&mut self, request: Request) {
        debug!(id = ?self.id, url = %request.url(), "Thread::on_transport_complete: called");
        self.pending = false;
        self.last_served = Some(request);
        if self.queue.is_empty() {
            self.trigger(ThreadEvent::Empty);
        }
    }

    pub(crate) fn pause(&mut self) {
        debug!(id = ?self.id, "Thread::pause: called");
        self.paused = true;
    }

    pub(crate) fn resume(&mut self) {
        debug!(id = ?self.id, "Thread::resume: called");
        self.paused = false;
    }

    pub(crate) fn clear(&mut self) {
        debug!(id = ?self.id, len = self.queue.len(), "Thread::clear: called");
        self.queue.clear();
    }

    /// Register a handler, replacing any previous one for the event
    pub(crate) fn on(&mut self, event: ThreadEvent, handler: EventHandler) {
        debug!(id = ?self.id, %event, "Thread::on: called");
        self.handlers.insert(event, handler);
    }

    /// Run the handler for `event`, if any
    pub(crate) fn trigger(&mut self, event: ThreadEvent) {
        if let Some(handler) = self.handlers.get(&event).cloned() {
            debug!(id = ?self.id, %event, "Thread::trigger: invoking handler");
            handler(&mut Capability(self));
        }
    }

    /// Take the enqueue results recorded through the capability view
    pub(crate) fn take_view_enqueues(&mut self) -> ViewEnqueues {
        std::mem::take(&mut self.view_enqueues)
    }

    /// Run `f` against this thread's capability view
    pub(crate) fn with_view<R>(&mut self, f: impl FnOnce(&mut dyn ThreadView) -> R) -> R {
        f(&mut Capability(self))
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            id: self.id.clone(),
            length: self.queue.len(),
            paused: self.paused,
            pending: self.pending,
            last_served: self.last_served.as_ref().map(Request::summary),
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("len", &self.queue.len())
            .field("paused", &self.paused)
            .field("pending", &self.pending)
            .finish()
    }
}

/// [`ThreadView`] backed by a real thread
struct Capability<'a>(&'a mut Thread);

impl ThreadView for Capability<'_> {
    fn id(&self) -> Option<&str> {
        self.0.id()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }

    fn is_pending(&self) -> bool {
        self.0.is_pending()
    }

    fn enqueue(&mut self, opts: RequestOptions) -> Result<(), RequestError> {
        if self.0.enqueue(opts)? {
            self.0.view_enqueues.accepted += 1;
        } else {
            self.0.view_enqueues.dropped += 1;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.0.pause();
    }

    fn resume(&mut self) {
        self.0.resume();
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn on(&mut self, event: ThreadEvent, handler: EventHandler) {
        self.0.on(event, handler);
    }

    fn next_partition(&self) -> Option<&VecDeque<Request>> {
        self.0.next_partition()
    }

    fn last_served(&self) -> Option<&Request> {
        self.0.last_served()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RetryGate, Settings};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn thread(limit: Option<usize>, max_attempts: u32) -> Thread {
        let mut settings = ThreadSettings::from(&Settings::default());
        settings.limit = limit;
        settings.max_attempts = max_attempts;
        Thread::new("t", settings)
    }

    #[test]
    fn test_enqueue_respects_limit() {
        let mut t = thread(Some(2), 5);
        assert!(t.enqueue(RequestOptions::new("/1")).unwrap());
        assert!(t.enqueue(RequestOptions::new("/2")).unwrap());
        assert!(!t.enqueue(RequestOptions::new("/3")).unwrap());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_enqueue_invalid_request() {
        let mut t = thread(None, 5);
        assert_eq!(t.enqueue(RequestOptions::new("")), Err(RequestError::MissingUrl));
        assert!(t.is_empty());
    }

    #[test]
    fn test_pending_blocks_second_dequeue() {
        let mut t = thread(None, 5);
        t.enqueue(RequestOptions::new("/1")).unwrap();
        t.enqueue(RequestOptions::new("/2")).unwrap();

        let first = t.dequeue_for_dispatch().unwrap();
        assert!(t.is_pending());
        assert!(t.dequeue_for_dispatch().is_none());
        assert_eq!(t.len(), 1);

        t.on_transport_complete(first);
        assert!(!t.is_pending());
        assert_eq!(t.last_served().unwrap().url(), "/1");
        assert!(t.dequeue_for_dispatch().is_some());
    }

    #[test]
    fn test_retry_until_max_attempts() {
        let mut t = thread(None, 2);
        t.enqueue(RequestOptions::new("/flaky")).unwrap();

        let mut request = t.dequeue_for_dispatch().unwrap();
        request.begin_attempt();
        assert!(t.on_transport_error(&request));
        t.on_transport_complete(request);
        assert_eq!(t.len(), 1);

        let mut request = t.dequeue_for_dispatch().unwrap();
        assert_eq!(request.attempts(), 1);
        request.begin_attempt();
        assert!(!t.on_transport_error(&request));
        t.on_transport_complete(request);
        assert!(t.is_empty());
    }

    #[test]
    fn test_at_limit_gate_blocks_retry_with_room() {
        let mut t = thread(Some(3), 5);
        t.settings.retry_gate = RetryGate::AtLimit;
        t.enqueue(RequestOptions::new("/a")).unwrap();

        let mut request = t.dequeue_for_dispatch().unwrap();
        request.begin_attempt();
        assert!(!t.on_transport_abort(&request));
    }

    #[test]
    fn test_empty_event_fires_on_drained_completion() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut t = thread(None, 5);
        let counter = fired.clone();
        t.on(
            ThreadEvent::Empty,
            Arc::new(move |view: &mut dyn ThreadView| {
                assert!(view.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        t.enqueue(RequestOptions::new("/1")).unwrap();
        t.enqueue(RequestOptions::new("/2")).unwrap();
        let r = t.dequeue_for_dispatch().unwrap();
        t.on_transport_complete(r);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let r = t.dequeue_for_dispatch().unwrap();
        t.on_transport_complete(r);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_refill_through_view() {
        let mut t = thread(None, 5);
        t.on(
            ThreadEvent::Empty,
            Arc::new(|view: &mut dyn ThreadView| {
                if view.last_served().is_some_and(|r| r.url() == "/first") {
                    view.enqueue(RequestOptions::new("/second")).unwrap();
                }
            }),
        );

        t.enqueue(RequestOptions::new("/first")).unwrap();
        let r = t.dequeue_for_dispatch().unwrap();
        t.on_transport_complete(r);
        assert_eq!(t.len(), 1);
        assert_eq!(t.next_partition().unwrap().front().unwrap().url(), "/second");
    }

    #[test]
    fn test_clear_keeps_in_flight() {
        let mut t = thread(None, 5);
        t.enqueue(RequestOptions::new("/1")).unwrap();
        t.enqueue(RequestOptions::new("/2")).unwrap();
        let r = t.dequeue_for_dispatch().unwrap();
        t.clear();
        assert!(t.is_empty());
        assert!(t.is_pending());
        t.on_transport_complete(r);
        assert!(!t.is_pending());
    }

    #[test]
    fn test_parse_events() {
        assert_eq!("beforeNext".parse::<ThreadEvent>().unwrap(), ThreadEvent::BeforeNext);
        assert_eq!("empty".parse::<ThreadEvent>().unwrap(), ThreadEvent::Empty);
        assert!("done".parse::<ThreadEvent>().is_err());
    }

    #[test]
    fn test_snapshot() {
        let mut t = thread(None, 5);
        t.enqueue(RequestOptions::new("/1")).unwrap();
        t.pause();
        let snap = t.snapshot();
        assert_eq!(snap.id.as_deref(), Some("t"));
        assert_eq!(snap.length, 1);
        assert!(snap.paused);
        assert!(!snap.pending);
        assert!(snap.last_served.is_none());
    }
}
