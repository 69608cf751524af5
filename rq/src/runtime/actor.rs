//! Runtime task
//!
//! Owns the [`Scheduler`] and the [`Transport`]. Every command and every
//! settled attempt is an edge event: it is applied to the scheduler, then
//! admission runs until a pass admits nothing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{DispatchEvent, RuntimeCommand};
use crate::request::{Lifecycle, Request};
use crate::scheduler::{Dispatch, Scheduler, SchedulerError};
use crate::transport::{Outcome, Progress, Transport, TransportError};

/// Run one transport attempt and deliver its callbacks
///
/// Counts the attempt, fires `loadstart`, then the outcome callbacks and
/// finally `loadend`, all before the caller reports settlement.
pub(crate) async fn attempt(transport: &dyn Transport, request: &mut Request, timeout: Option<Duration>) -> Outcome {
    request.begin_attempt();
    let request = &*request;
    debug!(url = %request.url(), attempt = request.attempts(), ?timeout, "attempt: called");

    let callbacks = request.callbacks();
    callbacks.emit(Lifecycle::LoadStart, 0, None);
    let progress = Progress::new(callbacks);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, transport.execute(request, &progress)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(url = %request.url(), ?limit, "attempt: timed out");
                Err(TransportError::Timeout(limit))
            }
        },
        None => transport.execute(request, &progress).await,
    };

    let outcome = Outcome::from(result);
    callbacks.deliver(&outcome);
    callbacks.finish(&outcome);
    outcome
}

pub(super) struct Runtime {
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<DispatchEvent>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl Runtime {
    pub(super) fn new(
        scheduler: Scheduler,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<DispatchEvent>,
    ) -> Self {
        Self {
            scheduler,
            transport,
            events,
            idle_waiters: Vec::new(),
        }
    }

    fn handle_command(&mut self, cmd: RuntimeCommand) {
        debug!(command = cmd.name(), "Runtime::handle_command: called");
        match cmd {
            RuntimeCommand::UpdateSettings { patch, reply } => {
                self.scheduler.update_settings(&patch);
                let _ = reply.send(());
                self.pump();
            }

            RuntimeCommand::ApplySettings { value, reply } => {
                let result = self
                    .scheduler
                    .apply_settings(&value)
                    .map_err(|e| SchedulerError::InvalidSettings(e.to_string()));
                let _ = reply.send(result);
                self.pump();
            }

            RuntimeCommand::CreateThread { id, options, reply } => {
                let _ = reply.send(self.scheduler.create_thread(&id, &options));
            }

            RuntimeCommand::HasThread { id, reply } => {
                let _ = reply.send(self.scheduler.thread(&id).is_some());
            }

            RuntimeCommand::Enqueue { id, opts, reply } => {
                let _ = reply.send(self.scheduler.enqueue(&id, opts));
                self.pump();
            }

            RuntimeCommand::Send { opts, reply } => {
                let _ = reply.send(self.scheduler.send(opts));
                self.pump();
            }

            RuntimeCommand::Pause { id, reply } => {
                let _ = reply.send(self.scheduler.pause(&id));
            }

            RuntimeCommand::Resume { id, reply } => {
                let _ = reply.send(self.scheduler.resume(&id));
                self.pump();
            }

            RuntimeCommand::Clear { id, reply } => {
                let _ = reply.send(self.scheduler.clear(&id));
            }

            RuntimeCommand::On {
                id,
                event,
                handler,
                reply,
            } => {
                let _ = reply.send(self.scheduler.on(&id, event, handler));
            }

            RuntimeCommand::Snapshot { id, reply } => {
                let result = self
                    .scheduler
                    .thread(&id)
                    .map(|t| t.snapshot())
                    .ok_or(SchedulerError::UnknownThread(id));
                let _ = reply.send(result);
            }

            RuntimeCommand::AsyncLimitReached { reply } => {
                let _ = reply.send(self.scheduler.async_limit_reached());
            }

            RuntimeCommand::Stats { reply } => {
                let _ = reply.send(self.scheduler.stats());
            }

            RuntimeCommand::WaitIdle { reply } => {
                if self.scheduler.is_idle() {
                    let _ = reply.send(());
                } else {
                    self.idle_waiters.push(reply);
                }
            }

            RuntimeCommand::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Settled { slot, request, outcome } => {
                debug!(?slot, url = %request.url(), "Runtime::handle_event: settled");
                self.scheduler.settle(slot, request, &outcome);
            }
            DispatchEvent::SyncReady { slot, mut request } => {
                debug!(?slot, url = %request.url(), "Runtime::handle_event: running synchronous request");
                let outcome = attempt(self.transport.as_ref(), &mut request, None).await;
                self.scheduler.settle(slot, request, &outcome);
            }
        }
        self.pump();
    }

    /// Admit everything the scheduler allows, then wake idle waiters
    fn pump(&mut self) {
        for dispatch in self.scheduler.serve_until_settled() {
            self.dispatch(dispatch);
        }
        if self.scheduler.is_idle() && !self.idle_waiters.is_empty() {
            debug!(waiters = self.idle_waiters.len(), "Runtime::pump: idle, waking waiters");
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn dispatch(&self, dispatch: Dispatch) {
        let Dispatch { slot, request } = dispatch;
        let events = self.events.clone();
        let delay = request.delay();

        if request.is_async() {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let mut request = request;
                let timeout = request.timeout();
                let outcome = attempt(transport.as_ref(), &mut request, timeout).await;
                if events.send(DispatchEvent::Settled { slot, request, outcome }).is_err() {
                    debug!("dispatch: runtime gone, dropping settlement");
                }
            });
        } else {
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if events.send(DispatchEvent::SyncReady { slot, request }).is_err() {
                    debug!("dispatch: runtime gone, dropping synchronous request");
                }
            });
        }
    }

    fn in_flight(&self) -> usize {
        self.scheduler.concurrent()
    }
}

pub(super) async fn actor_loop(
    mut runtime: Runtime,
    mut rx: mpsc::Receiver<RuntimeCommand>,
    mut events: mpsc::UnboundedReceiver<DispatchEvent>,
) {
    debug!("actor_loop: called");
    info!("Scheduler runtime started");

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(RuntimeCommand::Shutdown) => {
                    debug!("actor_loop: shutdown requested");
                    break;
                }
                Some(cmd) => runtime.handle_command(cmd),
                None => {
                    debug!("actor_loop: all handles dropped");
                    break;
                }
            },
            Some(event) = events.recv() => runtime.handle_event(event).await,
        }
    }

    let in_flight = runtime.in_flight();
    if in_flight > 0 {
        warn!(in_flight, "Scheduler runtime stopped with requests in flight");
    } else {
        info!("Scheduler runtime stopped");
    }
}
