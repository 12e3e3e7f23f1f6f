//! State change dispatch
//!
//! Provides `StateDispatcher`, the notification primitive behind the
//! low- and high-frequency state streams. Subscribers are either
//! synchronous handlers invoked on the publishing thread, or async
//! consumers draining a broadcast receiver. A failing or panicking
//! handler is logged and never prevents the remaining handlers from
//! running.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Subscription handle for unsubscribing a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

type Handler<S> = Box<dyn Fn(S) -> anyhow::Result<()> + Send + Sync>;

/// Broadcast point for one published state stream
pub struct StateDispatcher<S: Clone + Send + 'static> {
    sender: broadcast::Sender<S>,
    handlers: RwLock<HashMap<SubscriptionId, Handler<S>>>,
}

impl<S: Clone + Send + 'static> StateDispatcher<S> {
    /// Create a dispatcher with the given broadcast channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a synchronous handler
    ///
    /// The handler runs on the publishing thread and should return
    /// quickly. Errors and panics are caught, logged, and do not affect
    /// other subscribers.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(S) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, Box::new(handler));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Remove a previously registered handler
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.handlers.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get a receiver for async consumption in a tokio task
    pub fn receiver(&self) -> broadcast::Receiver<S> {
        self.sender.subscribe()
    }

    /// Publish a state to every subscriber
    ///
    /// Every handler is invoked even if earlier ones fail. Returns the
    /// number of handlers that completed without error.
    pub fn publish(&self, state: S) -> usize {
        let handlers = self.handlers.read();
        let mut delivered = 0;
        for (id, handler) in handlers.iter() {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| handler(state.clone())));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Subscriber {} failed: {:#}", id, e);
                }
                Err(_) => {
                    tracing::error!("Subscriber {} panicked", id);
                }
            }
        }
        drop(handlers);

        // Async receivers; a send error just means nobody is listening.
        let _ = self.sender.send(state);
        delivered
    }

    /// Number of registered synchronous handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl<S: Clone + Send + 'static> std::fmt::Debug for StateDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
