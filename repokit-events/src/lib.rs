//! Typed publish/subscribe for repokit.
//!
//! [`EventBus`] is the seam the data layer talks to; [`LocalEventBus`] is the
//! in-process implementation. Events are plain structs dispatched by type.
//! The `Serialize`/`DeserializeOwned` bounds keep the trait implementable by
//! brokers that put events on a wire.

use std::future::Future;
use std::sync::Arc;

pub mod local;

pub use local::{LocalEventBus, DEFAULT_MAX_CONCURRENCY};

/// A typed event bus.
pub trait EventBus: Send + Sync + 'static {
    /// Register a handler for events of type `E`.
    fn subscribe<E, F, Fut>(&self, handler: F) -> impl Future<Output = ()> + Send
    where
        E: serde::de::DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static;

    /// Publish an event without waiting for handlers to finish.
    fn emit<E>(&self, event: E) -> impl Future<Output = ()> + Send
    where
        E: serde::Serialize + Send + Sync + 'static;

    /// Publish an event and return once every handler has completed.
    fn emit_and_wait<E>(&self, event: E) -> impl Future<Output = ()> + Send
    where
        E: serde::Serialize + Send + Sync + 'static;

    /// Drop every registered handler.
    fn clear(&self) -> impl Future<Output = ()> + Send;
}

pub mod prelude {
    //! Re-exports of the most commonly used event types.
    pub use crate::{EventBus, LocalEventBus};
}
