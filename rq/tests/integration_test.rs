//! Integration tests for requeue
//!
//! These drive the full runtime (handles, actor, scheduler) against a
//! scripted in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use requeue::request::{DataType, Lifecycle};
use requeue::scheduler::{SettingsPatch, ThreadView};
use requeue::{
    Progress, Request, RequestOptions, Response, RuntimeConfig, SchedulerHandle, Settings, ThreadEvent, ThreadOptions,
    Transport, TransportError,
};

// =============================================================================
// Scripted transport
// =============================================================================

type Responder = Box<dyn Fn(&Request) -> Result<Response, TransportError> + Send + Sync>;

/// Answers every request through `responder`, recording what it saw
struct ScriptedTransport {
    responder: Responder,
    latency: Duration,
    seen: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    fn new(responder: impl Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn ok() -> Self {
        Self::new(|_| Ok(Response::new(200, "ok")))
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn urls(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|r| r.url().to_string()).collect()
    }

    fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &Request, progress: &Progress<'_>) -> Result<Response, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let result = (self.responder)(request);
        if let Ok(response) = &result {
            let size = response.body.len() as u64;
            progress.report(size, Some(size));
        }
        result
    }
}

fn spawn(settings: Settings, transport: &Arc<ScriptedTransport>) -> SchedulerHandle {
    SchedulerHandle::spawn(settings, transport.clone(), &RuntimeConfig::default())
}

/// Settings that admit nothing until `open_gate` raises the limit
fn gated() -> Settings {
    Settings {
        max_async: Some(0),
        ..Default::default()
    }
}

async fn open_gate(handle: &SchedulerHandle, max_async: usize) {
    handle
        .update_settings(SettingsPatch {
            max_async: Some(Some(max_async)),
            ..Default::default()
        })
        .await
        .unwrap();
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_round_robin_across_threads() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(gated(), &transport);

    for id in ["a", "b", "c"] {
        let thread = handle.create_thread(id, ThreadOptions::default()).await.unwrap();
        for n in 0..2 {
            thread.enqueue(RequestOptions::new(format!("/{}/{}", id, n))).await.unwrap();
        }
    }
    assert!(handle.async_limit_reached().await.unwrap());

    open_gate(&handle, 1).await;
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls(), vec!["/a/0", "/b/0", "/c/0", "/a/1", "/b/1", "/c/1"]);
}

#[tokio::test]
async fn test_priority_then_fifo_within_thread() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(gated(), &transport);
    let thread = handle.create_thread("t", ThreadOptions::default()).await.unwrap();

    for (url, priority) in [("/p20", 20), ("/p5-first", 5), ("/p10", 10), ("/p5-second", 5)] {
        thread.enqueue(RequestOptions::new(url).priority(priority)).await.unwrap();
    }

    open_gate(&handle, 4).await;
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls(), vec!["/p5-first", "/p5-second", "/p10", "/p20"]);
    // One thread never has two requests in flight
    assert_eq!(transport.peak(), 1);
}

#[tokio::test]
async fn test_max_async_is_never_exceeded() {
    let transport = Arc::new(ScriptedTransport::ok().with_latency(Duration::from_millis(50)));
    let handle = spawn(
        Settings {
            max_async: Some(3),
            ..Default::default()
        },
        &transport,
    );

    for n in 0..6 {
        let thread = handle
            .create_thread(&format!("t{}", n), ThreadOptions::default())
            .await
            .unwrap();
        thread.enqueue(RequestOptions::new(format!("/{}", n))).await.unwrap();
    }
    for n in 0..4 {
        handle.send_url(format!("/one-off/{}", n)).await.unwrap();
    }

    handle.wait_idle().await.unwrap();
    assert_eq!(transport.urls().len(), 10);
    assert!(transport.peak() <= 3);
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.peak_concurrent, 3);
    assert_eq!(stats.total_settled, 10);
}

#[tokio::test]
async fn test_one_off_sends_run_concurrently() {
    let transport = Arc::new(ScriptedTransport::ok().with_latency(Duration::from_millis(40)));
    let handle = spawn(Settings::default(), &transport);

    handle.send_url("/one").await.unwrap();
    handle.send_url("/two").await.unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.peak(), 2);
}

#[tokio::test]
async fn test_null_max_async_lifts_limit() {
    let transport = Arc::new(ScriptedTransport::ok().with_latency(Duration::from_millis(40)));
    let handle = spawn(gated(), &transport);

    for n in 0..3 {
        handle.send_url(format!("/{}", n)).await.unwrap();
    }
    handle.apply_settings(json!({"maxAsync": null})).await.unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls().len(), 3);
    assert_eq!(transport.peak(), 3);
    assert!(!handle.async_limit_reached().await.unwrap());
}

// =============================================================================
// Retries and failures
// =============================================================================

#[tokio::test]
async fn test_failed_request_retried_up_to_max_attempts() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        Err(TransportError::Network("connection reset".to_string()))
    }));
    let handle = spawn(Settings::default(), &transport);
    let thread = handle
        .create_thread("T", ThreadOptions::default().max_attempts(2))
        .await
        .unwrap();

    let (empties, empty_count) = counter();
    thread
        .on(
            ThreadEvent::Empty,
            Arc::new(move |_: &mut dyn ThreadView| {
                empties.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

    let (errors, error_count) = counter();
    thread
        .enqueue(RequestOptions::new("/flaky").on_error(move |_| {
            errors.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    let attempts: Vec<u32> = transport.seen().iter().map(Request::attempts).collect();
    assert_eq!(attempts, vec![1, 2]);
    assert_eq!(error_count.load(Ordering::SeqCst), 2);
    assert_eq!(empty_count.load(Ordering::SeqCst), 1);
    assert!(thread.is_empty().await.unwrap());
    assert!(!thread.is_pending().await.unwrap());
}

#[tokio::test]
async fn test_timeout_counts_as_abort_and_fires_timeout_callback() {
    let transport = Arc::new(ScriptedTransport::ok().with_latency(Duration::from_millis(300)));
    let handle = spawn(Settings::default(), &transport);
    let thread = handle
        .create_thread(
            "slow",
            ThreadOptions::default()
                .timeout(Duration::from_millis(20))
                .max_attempts(2),
        )
        .await
        .unwrap();

    let (timeouts, timeout_count) = counter();
    let (loadends, loadend_count) = counter();
    let (successes, success_count) = counter();
    thread
        .enqueue(
            RequestOptions::new("/slow")
                .on_timeout(move |_| {
                    timeouts.fetch_add(1, Ordering::SeqCst);
                })
                .on_success(move |_| {
                    successes.fetch_add(1, Ordering::SeqCst);
                })
                .on_lifecycle(Lifecycle::LoadEnd, move |_| {
                    loadends.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(timeout_count.load(Ordering::SeqCst), 2);
    assert_eq!(loadend_count.load(Ordering::SeqCst), 2);
    assert_eq!(success_count.load(Ordering::SeqCst), 0);
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.total_failed, 2);
    assert_eq!(stats.total_retried, 1);
}

#[tokio::test]
async fn test_http_error_status_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new(|_| Ok(Response::new(404, "missing"))));
    let handle = spawn(Settings::default(), &transport);

    let (errors, error_count) = counter();
    let (not_found, not_found_count) = counter();
    handle
        .send(
            RequestOptions::new("/missing")
                .on_error(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
                .on_status(404, move |_| {
                    not_found.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls(), vec!["/missing"]);
    assert_eq!(error_count.load(Ordering::SeqCst), 1);
    assert_eq!(not_found_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_backpressure_drops_silently() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(gated(), &transport);
    let thread = handle
        .create_thread("bounded", ThreadOptions::default().limit(2))
        .await
        .unwrap();

    for n in 0..3 {
        thread.enqueue(RequestOptions::new(format!("/{}", n))).await.unwrap();
    }
    assert_eq!(thread.len().await.unwrap(), 2);

    open_gate(&handle, 1).await;
    handle.wait_idle().await.unwrap();
    assert_eq!(transport.urls(), vec!["/0", "/1"]);
    assert_eq!(handle.stats().await.unwrap().total_dropped, 1);
}

// =============================================================================
// Request normalization
// =============================================================================

#[tokio::test]
async fn test_get_with_structured_data_moves_to_query() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(Settings::default(), &transport);

    handle
        .send(
            RequestOptions::new("/search")
                .data(json!({"q": "rust lang", "tags": ["a", "b"]}))
                .data_type(DataType::parse("json")),
        )
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    let seen = transport.seen();
    let request = &seen[0];
    assert_eq!(request.url(), "/search?q=rust lang&tags[]=a&tags[]=b");
    assert_eq!(request.body(), None);
    assert_eq!(request.header("Content-Type"), None);
    assert_eq!(request.header("X-Requested-With"), Some("XMLHttpRequest"));
    assert_eq!(
        request.header("Accept"),
        Some("application/json, text/javascript, */*; q=0.1")
    );
}

#[tokio::test]
async fn test_post_body_is_form_encoded() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(Settings::default(), &transport);

    handle
        .send(
            RequestOptions::new("/users")
                .method("post")
                .data(json!({"user": {"name": "ana", "roles": ["admin"]}})),
        )
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    let request = &transport.seen()[0];
    assert_eq!(request.body(), Some("user[name]=ana&user[roles][]=admin"));
    assert_eq!(
        request.header("Content-Type"),
        Some("application/x-www-form-urlencoded; charset=UTF-8")
    );
}

#[tokio::test]
async fn test_missing_url_rejected_at_enqueue() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(Settings::default(), &transport);
    let thread = handle.create_thread("t", ThreadOptions::default()).await.unwrap();

    assert!(thread.enqueue(RequestOptions::new("")).await.is_err());
    assert!(thread.is_empty().await.unwrap());
}

// =============================================================================
// Thread events
// =============================================================================

#[tokio::test]
async fn test_before_next_handler_can_pause_thread() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(Settings::default(), &transport);
    let thread = handle.create_thread("t", ThreadOptions::default()).await.unwrap();
    thread
        .on(
            ThreadEvent::BeforeNext,
            Arc::new(|view: &mut dyn ThreadView| view.pause()),
        )
        .await
        .unwrap();

    thread.enqueue(RequestOptions::new("/held")).await.unwrap();
    handle.wait_idle().await.unwrap();

    assert!(transport.urls().is_empty());
    let snapshot = thread.snapshot().await.unwrap();
    assert!(snapshot.paused);
    assert_eq!(snapshot.length, 1);
    assert!(!snapshot.pending);
}

#[tokio::test]
async fn test_empty_handler_can_refill_thread() {
    let transport = Arc::new(ScriptedTransport::ok());
    let handle = spawn(Settings::default(), &transport);
    let thread = handle.create_thread("t", ThreadOptions::default()).await.unwrap();
    thread
        .on(
            ThreadEvent::Empty,
            Arc::new(|view: &mut dyn ThreadView| {
                if view.last_served().is_some_and(|r| r.url() == "/page/1") {
                    view.enqueue(RequestOptions::new("/page/2")).unwrap();
                }
            }),
        )
        .await
        .unwrap();

    thread.enqueue(RequestOptions::new("/page/1")).await.unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls(), vec!["/page/1", "/page/2"]);
    let snapshot = thread.snapshot().await.unwrap();
    assert_eq!(snapshot.last_served.unwrap().url, "/page/2");
}

#[tokio::test]
async fn test_clear_drops_queued_but_not_in_flight() {
    let transport = Arc::new(ScriptedTransport::ok().with_latency(Duration::from_millis(30)));
    let handle = spawn(Settings::default(), &transport);
    let thread = handle.create_thread("t", ThreadOptions::default()).await.unwrap();

    for n in 0..3 {
        thread.enqueue(RequestOptions::new(format!("/{}", n))).await.unwrap();
    }
    assert!(thread.is_pending().await.unwrap());
    thread.clear().await.unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(transport.urls(), vec!["/0"]);
}

#[tokio::test]
async fn test_progress_events_reach_callbacks() {
    let transport = Arc::new(ScriptedTransport::new(|_| Ok(Response::new(200, "0123456789"))));
    let handle = spawn(Settings::default(), &transport);

    let loaded = Arc::new(Mutex::new(Vec::new()));
    let sink = loaded.clone();
    handle
        .send(RequestOptions::new("/download").on_lifecycle(Lifecycle::Progress, move |event| {
            sink.lock().unwrap().push((event.loaded, event.total));
        }))
        .await
        .unwrap();
    handle.wait_idle().await.unwrap();

    assert_eq!(*loaded.lock().unwrap(), vec![(10, Some(10))]);
}
