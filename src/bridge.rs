//! Provider events as a cancellable stream
//!
//! [`subscribe`] registers a listener on the provider and hands back an
//! [`EventStream`] yielding each payload in arrival order. The stream ends for
//! good once the stop signal flips to `true`; the provider listener is then
//! removed exactly once, whether that happens on the next poll, through
//! [`EventStream::close`] or on drop.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::provider::{EventHandler, ListenerId, Provider};

struct Listener {
    provider: Arc<dyn Provider>,
    event: String,
    id: ListenerId,
}

pub struct EventStream<T> {
    payloads: mpsc::UnboundedReceiver<Value>,
    stop: watch::Receiver<bool>,
    listener: Option<Listener>,
    decode: fn(Value) -> Option<T>,
}

enum Step {
    Payload(Option<Value>),
    StopChanged(bool),
}

/// Listen for `event` on `provider` until `stop` becomes `true`.
///
/// `decode` turns a raw payload into a value; payloads it rejects are logged
/// and skipped.
pub fn subscribe<T>(
    provider: Arc<dyn Provider>,
    event: &str,
    stop: watch::Receiver<bool>,
    decode: fn(Value) -> Option<T>,
) -> EventStream<T> {
    let (tx, payloads) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |payload| {
        // receiver gone means the stream closed; late events are dropped
        let _ = tx.send(payload);
    });

    let id = provider.on(event, handler);
    debug!(event, id, "registered provider listener");

    EventStream {
        payloads,
        stop,
        listener: Some(Listener {
            provider,
            event: event.to_string(),
            id,
        }),
        decode,
    }
}

impl<T> EventStream<T> {
    /// Next decoded event, or `None` once the stream has terminated
    pub async fn next(&mut self) -> Option<T> {
        loop {
            if self.listener.is_none() {
                return None;
            }
            if *self.stop.borrow() {
                self.close();
                return None;
            }

            let step = tokio::select! {
                biased;
                changed = self.stop.changed() => Step::StopChanged(changed.is_ok()),
                payload = self.payloads.recv() => Step::Payload(payload),
            };

            match step {
                // sender dropped: nobody can stop us any more, treat as stopped
                Step::StopChanged(false) => {
                    self.close();
                    return None;
                }
                Step::StopChanged(true) => continue,
                Step::Payload(None) => {
                    self.close();
                    return None;
                }
                Step::Payload(Some(payload)) => match (self.decode)(payload.clone()) {
                    Some(value) => return Some(value),
                    None => {
                        warn!(event = self.event(), %payload, "ignoring undecodable provider event");
                    }
                },
            }
        }
    }

    /// Remove the provider listener; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener
                .provider
                .remove_listener(&listener.event, listener.id);
            self.payloads.close();
            debug!(event = %listener.event, id = listener.id, "removed provider listener");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }

    fn event(&self) -> &str {
        self.listener
            .as_ref()
            .map(|listener| listener.event.as_str())
            .unwrap_or_default()
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}
