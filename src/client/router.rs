//! Topic multiplexing over the shared push connection.
//!
//! The router keeps the *desired* subscriptions (topic → registration) apart
//! from the transport state. While connected every change is mirrored to the
//! server immediately; on each `Connected` event the whole desired set is
//! replayed. Inbound MESSAGE frames are routed by their `subscription` header;
//! frames for an id that is no longer registered are dropped.
//!
//! Handlers run synchronously on the router's dispatch task. Once
//! [`TopicRouter::unsubscribe`] returns, the removed handler is never called
//! again.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::client::channel::{
    Command, ConnectionEvent, ConnectionEvents, ConnectionHandle, Frame,
};
use crate::shared::error::SyncResult;

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// A message delivered on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub body: String,
    pub message_id: Option<String>,
}

impl Delivery {
    /// Decode the JSON body
    pub fn json<T: DeserializeOwned>(&self) -> SyncResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

pub type TopicHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Non-owning reference to one registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    topic: String,
    registration: u64,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct Registration {
    id: u64,
    stomp_id: String,
    handler: TopicHandler,
}

#[derive(Default)]
struct RouterState {
    by_topic: HashMap<String, Registration>,
    topic_by_stomp_id: HashMap<String, String>,
    connected: bool,
    next_id: u64,
}

struct RouterInner {
    state: Mutex<RouterState>,
    // Held for the duration of every handler call
    dispatch_gate: Mutex<()>,
    connection: ConnectionHandle,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Multiplexes topic subscriptions over one [`ConnectionHandle`]
#[derive(Clone)]
pub struct TopicRouter {
    inner: Arc<RouterInner>,
}

struct DispatchGuard;

impl DispatchGuard {
    fn enter() -> Self {
        DISPATCHING.with(|flag| flag.set(true));
        DispatchGuard
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|flag| flag.set(false));
    }
}

impl TopicRouter {
    /// Take over the connection's event stream
    pub fn new(connection: ConnectionHandle, events: ConnectionEvents) -> Self {
        let inner = Arc::new(RouterInner {
            state: Mutex::new(RouterState::default()),
            dispatch_gate: Mutex::new(()),
            connection,
            pump: Mutex::new(None),
        });
        let task = tokio::spawn(pump(Arc::downgrade(&inner), events));
        *inner.pump.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(task);
        Self { inner }
    }

    /// Register `handler` for `topic`, replacing any previous handler for it
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionHandle
    where
        F: Fn(Delivery) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let (handle, replaced) = {
            let mut state = self.inner.state();
            state.next_id += 1;
            let id = state.next_id;
            let stomp_id = format!("sub-{}", id);

            let replaced = match state.by_topic.remove(&topic) {
                Some(old) => {
                    state.topic_by_stomp_id.remove(&old.stomp_id);
                    if state.connected {
                        self.inner.send(&Frame::unsubscribe(&old.stomp_id));
                    }
                    tracing::debug!("replacing subscription {} on {}", old.stomp_id, topic);
                    true
                }
                None => false,
            };

            if state.connected {
                self.inner.send(&Frame::subscribe(&stomp_id, &topic));
            }
            state.topic_by_stomp_id.insert(stomp_id.clone(), topic.clone());
            state.by_topic.insert(
                topic.clone(),
                Registration {
                    id,
                    stomp_id,
                    handler: Arc::new(handler),
                },
            );
            (
                SubscriptionHandle {
                    topic,
                    registration: id,
                },
                replaced,
            )
        };
        if replaced {
            self.inner.wait_for_dispatch();
        }
        handle
    }

    /// Remove a registration. Returns `false` for a stale handle.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        {
            let mut state = self.inner.state();
            let current = state
                .by_topic
                .get(&handle.topic)
                .map(|registration| registration.id);
            if current != Some(handle.registration) {
                tracing::debug!("ignoring stale unsubscribe for {}", handle.topic);
                return false;
            }
            if let Some(old) = state.by_topic.remove(&handle.topic) {
                state.topic_by_stomp_id.remove(&old.stomp_id);
                if state.connected {
                    self.inner.send(&Frame::unsubscribe(&old.stomp_id));
                }
            }
        }
        self.inner.wait_for_dispatch();
        true
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.state().by_topic.contains_key(topic)
    }

    /// Desired topics, sorted
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.state().by_topic.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.inner.connection
    }

    /// Stop routing and close the connection
    pub fn shutdown(&self) {
        let task = self
            .inner
            .pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.inner.connection.disconnect();
        let mut state = self.inner.state();
        state.connected = false;
        state.by_topic.clear();
        state.topic_by_stomp_id.clear();
    }
}

impl RouterInner {
    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send(&self, frame: &Frame) {
        if let Err(e) = self.connection.send(frame) {
            tracing::debug!("{} deferred until reconnect: {}", frame.command, e);
        }
    }

    fn wait_for_dispatch(&self) {
        if DISPATCHING.with(|flag| flag.get()) {
            return;
        }
        drop(self.dispatch_gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
    }

    fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                let mut state = self.state();
                state.connected = true;
                for (topic, registration) in &state.by_topic {
                    self.send(&Frame::subscribe(&registration.stomp_id, topic));
                }
                tracing::info!("replayed {} subscription(s)", state.by_topic.len());
            }
            ConnectionEvent::Disconnected => {
                self.state().connected = false;
            }
            ConnectionEvent::Error(e) => {
                tracing::debug!("connection error seen by router: {}", e);
            }
            ConnectionEvent::Frame(frame) if frame.command == Command::Message => {
                self.dispatch(frame);
            }
            ConnectionEvent::Frame(frame) => {
                tracing::debug!("router ignoring {} frame", frame.command);
            }
        }
    }

    fn dispatch(&self, frame: Frame) {
        let Some(stomp_id) = frame.get_header("subscription").map(str::to_string) else {
            tracing::warn!("discarding MESSAGE without subscription header");
            return;
        };

        let _gate = self.dispatch_gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let target = {
            let state = self.state();
            state.topic_by_stomp_id.get(&stomp_id).and_then(|topic| {
                state
                    .by_topic
                    .get(topic)
                    .map(|registration| (topic.clone(), registration.handler.clone()))
            })
        };
        let Some((topic, handler)) = target else {
            tracing::warn!("discarding frame for unknown subscription {}", stomp_id);
            return;
        };

        let delivery = Delivery {
            topic,
            message_id: frame.get_header("message-id").map(str::to_string),
            body: frame.body,
        };
        let _dispatching = DispatchGuard::enter();
        handler(delivery);
    }
}

async fn pump(inner: Weak<RouterInner>, mut events: ConnectionEvents) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
}
