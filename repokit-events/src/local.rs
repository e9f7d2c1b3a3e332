use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use crate::EventBus;

type Handler = Arc<
    dyn Fn(Arc<dyn Any + Send + Sync>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Default maximum concurrent handlers for [`EventBus::emit`].
pub const DEFAULT_MAX_CONCURRENCY: usize = 1024;

/// In-process event bus dispatching by `TypeId`.
///
/// Subscribers register for a concrete event type and receive an `Arc<E>`.
///
/// - [`emit`](EventBus::emit) spawns every handler and returns immediately.
///   A semaphore bounds how many spawned handlers run at once; when the limit
///   is reached `emit()` waits for a slot.
/// - [`emit_and_wait`](EventBus::emit_and_wait) spawns each handler and
///   awaits it before starting the next, in subscription order, so it returns
///   when the last one finishes. Spawning isolates panics: a panicking
///   handler is logged and does not abort the others.
///
/// `LocalEventBus` is `Clone`; clones share subscribers.
#[derive(Clone)]
pub struct LocalEventBus {
    handlers: Arc<RwLock<HashMap<TypeId, Vec<Handler>>>>,
    semaphore: Option<Arc<Semaphore>>,
}

impl LocalEventBus {
    /// Create a bus with the default concurrency limit (1024).
    pub fn new() -> Self {
        Self::with_concurrency(DEFAULT_MAX_CONCURRENCY)
    }

    /// Create a bus with a custom limit on concurrently spawned handlers.
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Some(Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Create a bus with no limit on spawned handlers.
    pub fn unbounded() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            semaphore: None,
        }
    }

    /// Permits currently free for spawned handlers, or `None` if unbounded.
    pub fn available_permits(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    async fn handlers_for(&self, type_id: TypeId) -> Vec<Handler> {
        let map = self.handlers.read().await;
        map.get(&type_id).cloned().unwrap_or_default()
    }
}

impl EventBus for LocalEventBus {
    fn subscribe<E, F, Fut>(&self, handler: F) -> impl Future<Output = ()> + Send
    where
        E: serde::de::DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handlers = self.handlers.clone();
        async move {
            let handler: Handler = Arc::new(
                move |any: Arc<dyn Any + Send + Sync>| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                    match any.downcast::<E>() {
                        Ok(event) => Box::pin(handler(event)),
                        // keyed by TypeId::of::<E>, so this arm is never taken
                        Err(_) => Box::pin(async {}),
                    }
                },
            );
            let mut map = handlers.write().await;
            map.entry(TypeId::of::<E>()).or_default().push(handler);
        }
    }

    fn emit<E>(&self, event: E) -> impl Future<Output = ()> + Send
    where
        E: serde::Serialize + Send + Sync + 'static,
    {
        async move {
            let subs = self.handlers_for(TypeId::of::<E>()).await;
            if subs.is_empty() {
                return;
            }
            let event = Arc::new(event) as Arc<dyn Any + Send + Sync>;
            for handler in subs {
                let e = event.clone();
                match &self.semaphore {
                    Some(sem) => {
                        let Ok(permit) = sem.clone().acquire_owned().await else {
                            tracing::warn!("event bus semaphore closed, dropping event");
                            return;
                        };
                        tokio::spawn(async move {
                            handler(e).await;
                            drop(permit);
                        });
                    }
                    None => {
                        tokio::spawn(async move {
                            handler(e).await;
                        });
                    }
                }
            }
        }
    }

    fn emit_and_wait<E>(&self, event: E) -> impl Future<Output = ()> + Send
    where
        E: serde::Serialize + Send + Sync + 'static,
    {
        async move {
            let subs = self.handlers_for(TypeId::of::<E>()).await;
            let event = Arc::new(event) as Arc<dyn Any + Send + Sync>;
            for handler in subs {
                let e = event.clone();
                if let Err(err) = tokio::spawn(async move { handler(e).await }).await {
                    tracing::warn!(
                        event = std::any::type_name::<E>(),
                        error = %err,
                        "event handler failed"
                    );
                }
            }
        }
    }

    fn clear(&self) -> impl Future<Output = ()> + Send {
        let handlers = self.handlers.clone();
        async move {
            handlers.write().await.clear();
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Deleted {
        id: usize,
    }

    #[derive(Serialize, Deserialize)]
    struct Created;

    #[derive(Serialize, Deserialize)]
    struct Slow;

    #[tokio::test]
    async fn test_emit_and_wait_reaches_subscriber() {
        let bus = LocalEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        bus.subscribe(move |event: Arc<Deleted>| {
            let c = c.clone();
            async move {
                c.fetch_add(event.id, Ordering::SeqCst);
            }
        })
        .await;

        bus.emit_and_wait(Deleted { id: 42 }).await;
        assert_eq!(counter.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_emit_and_wait_runs_in_subscription_order() {
        let bus = LocalEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = seen.clone();
            bus.subscribe(move |_: Arc<Deleted>| {
                let seen = seen.clone();
                async move {
                    // later subscribers finish faster; order must still hold
                    tokio::time::sleep(Duration::from_millis(30 - n * 10)).await;
                    seen.lock().unwrap().push(n);
                }
            })
            .await;
        }

        bus.emit_and_wait(Deleted { id: 1 }).await;
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_no_cross_type_dispatch() {
        let bus = LocalEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        bus.subscribe(move |_: Arc<Deleted>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.emit_and_wait(Created).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_the_rest() {
        let bus = LocalEventBus::new();
        bus.subscribe(move |_: Arc<Deleted>| async move {
            panic!("boom");
        })
        .await;

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.subscribe(move |_: Arc<Deleted>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.emit_and_wait(Deleted { id: 1 }).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_respects_concurrency_limit() {
        let bus = LocalEventBus::with_concurrency(3);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let (a, m, c) = (active.clone(), max_seen.clone(), completed.clone());
        bus.subscribe(move |_: Arc<Slow>| {
            let (active, max_seen, completed) = (a.clone(), m.clone(), c.clone());
            async move {
                let current = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        for _ in 0..10 {
            bus.emit(Slow).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(completed.load(Ordering::SeqCst), 10);
        assert_eq!(bus.available_permits(), Some(3));
    }

    #[tokio::test]
    async fn test_unbounded_reports_no_limit() {
        assert!(LocalEventBus::unbounded().available_permits().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_subscribers() {
        let bus = LocalEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        bus.subscribe(move |_: Arc<Deleted>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.clear().await;
        bus.emit_and_wait(Deleted { id: 1 }).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
