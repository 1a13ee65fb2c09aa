//! In-process publish/subscribe dispatcher.
//!
//! Publishing only enqueues; a single dispatch loop ([`EventBus::run`])
//! dequeues events in FIFO order and spawns one task per subscribed handler.
//! The loop never waits on a handler. Spawned handler tasks are tracked in a
//! `JoinSet` so that failures and panics are logged and counted, and so that
//! stopping the bus can abandon whatever is still in flight.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::event::Event;
use crate::error::BusError;

/// Future returned by a handler invocation.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A subscribed handler.
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

/// Counters reported when the dispatch loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events_dispatched: u64,
    pub events_without_subscribers: u64,
    pub handlers_spawned: u64,
    pub handlers_succeeded: u64,
    pub handlers_failed: u64,
    pub handlers_panicked: u64,
    pub handlers_abandoned: u64,
}

/// What a handler task reports back to the loop.
struct HandlerOutcome {
    event: String,
    job_id: String,
    result: Result<anyhow::Result<()>, String>,
}

impl DispatchStats {
    fn record(&mut self, joined: Result<HandlerOutcome, JoinError>) {
        match joined {
            Ok(outcome) => match outcome.result {
                Ok(Ok(())) => self.handlers_succeeded += 1,
                Ok(Err(err)) => {
                    self.handlers_failed += 1;
                    error!(
                        event = %outcome.event,
                        job_id = %outcome.job_id,
                        error = %format!("{:#}", err),
                        "Event handler failed"
                    );
                }
                Err(panic) => {
                    self.handlers_panicked += 1;
                    error!(
                        event = %outcome.event,
                        job_id = %outcome.job_id,
                        panic = %panic,
                        "Event handler panicked"
                    );
                }
            },
            Err(join_err) if join_err.is_cancelled() => self.handlers_abandoned += 1,
            Err(join_err) => {
                self.handlers_panicked += 1;
                error!(error = %join_err, "Event handler task failed to join");
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Cloneable, non-blocking handle for enqueuing events.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<Event>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl Publisher {
    /// Enqueue `event` for dispatch. Never waits on any handler.
    pub fn publish(&self, event: impl Into<Event>) -> Result<(), BusError> {
        let event = event.into();
        let name = event.name();
        debug!(event = %name, job_id = %event.job_id(), "Publishing event");
        self.tx.send(event).map_err(|_| BusError::Closed(name))
    }
}

/// The event bus.
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    publisher: Publisher,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = handlers.keys().collect();
        names.sort();
        f.debug_struct("EventBus")
            .field("subscriptions", &names)
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            handlers: RwLock::new(HashMap::new()),
            publisher: Publisher { tx },
            receiver: Mutex::new(Some(rx)),
            shutdown,
        }
    }

    /// Register `handler` for events named `name`.
    ///
    /// Several handlers may share a name; each receives its own copy of the
    /// event. Registering the same handler twice delivers twice.
    pub fn subscribe<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handler: Handler = Arc::new(move |event| handler(event).boxed());
        debug!(event = %name, "Subscribing handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(handler);
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Handle for publishing onto this bus.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Shorthand for `self.publisher().publish(event)`.
    pub fn publish(&self, event: impl Into<Event>) -> Result<(), BusError> {
        self.publisher.publish(event)
    }

    /// Ask the dispatch loop to exit. Safe to call before, during, or after `run`.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run the dispatch loop until [`EventBus::stop`] is called.
    ///
    /// May run at most once per bus. On exit every handler still in flight
    /// is aborted and counted as abandoned; afterwards publishing fails with
    /// [`BusError::Closed`].
    pub async fn run(&self) -> Result<DispatchStats, BusError> {
        let mut rx = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BusError::AlreadyRunning)?;
        let mut shutdown = self.shutdown.subscribe();
        let mut in_flight: JoinSet<HandlerOutcome> = JoinSet::new();
        let mut stats = DispatchStats::default();

        info!("Event bus dispatch loop started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    stats.record(joined);
                }
                received = rx.recv() => match received {
                    Some(event) => self.dispatch(event, &mut in_flight, &mut stats),
                    None => break,
                },
            }
        }

        rx.close();
        drop(rx);

        let pending = in_flight.len();
        if pending > 0 {
            warn!(pending, "Abandoning in-flight event handlers");
        }
        in_flight.abort_all();
        while let Some(joined) = in_flight.join_next().await {
            stats.record(joined);
        }

        info!(
            events = stats.events_dispatched,
            handlers = stats.handlers_spawned,
            failed = stats.handlers_failed,
            panicked = stats.handlers_panicked,
            abandoned = stats.handlers_abandoned,
            "Event bus dispatch loop stopped"
        );

        Ok(stats)
    }

    fn dispatch(
        &self,
        event: Event,
        in_flight: &mut JoinSet<HandlerOutcome>,
        stats: &mut DispatchStats,
    ) {
        let name = event.name();
        stats.events_dispatched += 1;

        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            stats.events_without_subscribers += 1;
            debug!(event = %name, "No subscribers for event");
            return;
        }

        debug!(event = %name, handlers = handlers.len(), "Dispatching event");

        for handler in handlers {
            let invocation = handler(event.clone());
            let event_name = name.clone();
            let job_id = event.job_id().to_string();
            stats.handlers_spawned += 1;
            in_flight.spawn(async move {
                let result = AssertUnwindSafe(invocation)
                    .catch_unwind()
                    .await
                    .map_err(panic_message);
                HandlerOutcome {
                    event: event_name,
                    job_id,
                    result,
                }
            });
        }
    }
}
