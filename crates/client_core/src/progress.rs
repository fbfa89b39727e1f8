//! Server-sent progress events for a generating book.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::StreamExt;
use reqwest::{header::ACCEPT, Client};
use shared::domain::{BookId, ProgressEvent};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    error::StreamError,
    reconnect::{ReconnectPolicy, RetryBudget},
    sse::SseDecoder,
    GenerationClient,
};

const LAST_EVENT_ID: &str = "Last-Event-ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Unsubscribed, or the server ended the stream.
    Closed,
    Errored,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Listener {
    on_progress: ProgressCallback,
    on_error: Option<ErrorCallback>,
}

impl Listener {
    pub(crate) fn new(on_progress: ProgressCallback, on_error: Option<ErrorCallback>) -> Self {
        Self {
            on_progress,
            on_error,
        }
    }

    fn report(&self, err: &StreamError) {
        if let Some(on_error) = &self.on_error {
            on_error(err);
        }
    }
}

pub(crate) struct SubscriptionShared {
    closed: AtomicBool,
    state: watch::Sender<ConnectionState>,
}

impl SubscriptionShared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            closed: AtomicBool::new(false),
            state,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// No-op once the subscription has been closed by its owner.
    fn set_state(&self, next: ConnectionState) {
        if self.is_closed() {
            return;
        }
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Live progress connection for one book.
///
/// Dropping the handle closes the connection. `unsubscribe` may be called any
/// number of times; only the first call has an effect. On a multi-threaded
/// runtime one callback that already passed its closed check may still run
/// after `unsubscribe` returns; no later event is delivered.
pub struct Subscription {
    book_id: BookId,
    shared: Arc<SubscriptionShared>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition of this subscription.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn unsubscribe(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        self.shared
            .state
            .send_modify(|state| *state = ConnectionState::Closed);
        info!(book_id = %self.book_id, "progress subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl GenerationClient {
    pub(crate) fn events_url(&self, id: BookId) -> String {
        self.endpoint(&format!("/events/{id}"))
    }

    /// Opens `GET /events/{id}` and forwards each well-formed progress event
    /// to `on_progress`. Malformed events are logged and dropped; transport
    /// failures are logged and end the subscription without reconnecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe_to_progress<F>(&self, id: BookId, on_progress: F) -> Subscription
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.spawn_subscription(
            id,
            Listener::new(Arc::new(on_progress), None),
            ReconnectPolicy::none(),
        )
    }

    /// Like [`subscribe_to_progress`](Self::subscribe_to_progress), but also
    /// hands every parse and transport failure to `on_error`.
    pub fn subscribe_to_progress_with_errors<F, E>(
        &self,
        id: BookId,
        on_progress: F,
        on_error: E,
    ) -> Subscription
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
        E: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.spawn_subscription(
            id,
            Listener::new(Arc::new(on_progress), Some(Arc::new(on_error))),
            ReconnectPolicy::none(),
        )
    }

    pub(crate) fn spawn_subscription(
        &self,
        id: BookId,
        listener: Listener,
        policy: ReconnectPolicy,
    ) -> Subscription {
        let shared = Arc::new(SubscriptionShared::new());
        let http = self.http.clone();
        let url = self.events_url(id);
        let task_shared = Arc::clone(&shared);

        info!(book_id = %id, %url, "opening progress subscription");
        let task = tokio::spawn(async move {
            let mut budget = RetryBudget::new(policy);
            let mut last_event_id = None;
            loop {
                let outcome = pump_events(
                    &http,
                    &url,
                    id,
                    last_event_id.take(),
                    &listener,
                    &task_shared,
                )
                .await;
                last_event_id = outcome.last_event_id;
                if task_shared.is_closed() {
                    return;
                }
                if let Some(err) = &outcome.error {
                    error!(book_id = %id, error = %err, "progress stream error");
                    listener.report(err);
                }

                let Some(delay) = budget.after_connection(outcome.delivered) else {
                    let final_state = if outcome.error.is_some() {
                        ConnectionState::Errored
                    } else {
                        debug!(book_id = %id, "progress stream ended by server");
                        ConnectionState::Closed
                    };
                    task_shared.set_state(final_state);
                    return;
                };

                warn!(
                    book_id = %id,
                    attempt = budget.used(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting progress stream"
                );
                task_shared.set_state(ConnectionState::Connecting);
                tokio::time::sleep(delay).await;
            }
        });

        Subscription {
            book_id: id,
            shared,
            task,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StreamOutcome {
    pub(crate) delivered: usize,
    pub(crate) error: Option<StreamError>,
    /// Carried into the `Last-Event-ID` header of the next connection.
    pub(crate) last_event_id: Option<String>,
}

/// Runs one connection to completion: until the server closes the body, the
/// transport fails, or the subscription is closed.
async fn pump_events(
    http: &Client,
    url: &str,
    book_id: BookId,
    last_event_id: Option<String>,
    listener: &Listener,
    shared: &SubscriptionShared,
) -> StreamOutcome {
    let mut outcome = StreamOutcome {
        last_event_id: last_event_id.clone(),
        ..StreamOutcome::default()
    };

    let mut request = http.get(url).header(ACCEPT, "text/event-stream");
    if let Some(id) = &last_event_id {
        request = request.header(LAST_EVENT_ID, id.as_str());
    }
    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            outcome.error = Some(StreamError::transport(
                err.status().map(|status| status.as_u16()),
                err.to_string(),
            ));
            return outcome;
        }
    };

    let status = response.status();
    if !status.is_success() {
        outcome.error = Some(StreamError::transport(
            Some(status.as_u16()),
            status.canonical_reason().unwrap_or("unexpected status"),
        ));
        return outcome;
    }

    shared.set_state(ConnectionState::Open);
    debug!(%book_id, "progress stream open");

    let mut decoder = SseDecoder::resuming(last_event_id);
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let frames = match chunk {
            Ok(chunk) => decoder.push(&chunk),
            Err(err) => Err(StreamError::transport(None, err.to_string())),
        };
        outcome.last_event_id = decoder.last_event_id().map(str::to_string);
        let frames = match frames {
            Ok(frames) => frames,
            Err(err) => {
                outcome.error = Some(err);
                return outcome;
            }
        };

        for frame in frames {
            if shared.is_closed() {
                return outcome;
            }
            if !frame.is_message() {
                debug!(%book_id, event = ?frame.event, id = ?frame.id, "ignoring named event");
                continue;
            }
            match serde_json::from_str::<ProgressEvent>(&frame.data) {
                Ok(event) => {
                    (listener.on_progress)(event);
                    outcome.delivered += 1;
                }
                Err(err) => {
                    let failure = StreamError::Parse {
                        data: frame.data,
                        reason: err.to_string(),
                    };
                    warn!(%book_id, error = %failure, "error parsing event data");
                    listener.report(&failure);
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
