//! Queue dispatcher.
//!
//! Routes each message to its type-specific handlers plus the wildcard list,
//! with all-settled semantics: every handler runs, individual failures are
//! logged and do not affect siblings, and the message is considered consumed
//! either way. Handlers own their idempotence; re-running a completed
//! handler on redelivery is worse than losing one failure.

use std::collections::HashMap;
use std::sync::Arc;

use agora_core::envelope::DomainEvent;
use agora_core::fmt::{BoxedError, FmtCompact as _};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

const LOG_TARGET: &str = "agora::dispatch";

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once before each batch. Batch-scoped caches are built here.
    async fn begin_batch(&self) {}

    /// Called once after each batch; batch-scoped caches must not outlive
    /// this.
    async fn end_batch(&self) {}

    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxedError>;
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    wildcard: Vec<Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startup-time registration; the dispatcher is read-only afterwards.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    pub fn register_wildcard(&mut self, handler: Arc<dyn EventHandler>) {
        self.wildcard.push(handler);
    }

    fn all_handlers(&self) -> Vec<&Arc<dyn EventHandler>> {
        let mut seen: Vec<&Arc<dyn EventHandler>> = Vec::new();
        for handler in self
            .handlers
            .values()
            .flatten()
            .chain(self.wildcard.iter())
        {
            if !seen.iter().any(|h| Arc::ptr_eq(h, handler)) {
                seen.push(handler);
            }
        }
        seen
    }

    pub async fn dispatch_batch(&self, events: &[DomainEvent]) {
        let all = self.all_handlers();
        join_all(all.iter().map(|h| h.begin_batch())).await;

        for event in events {
            let specific = self
                .handlers
                .get(&event.event_type)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let handlers: Vec<_> = specific.iter().chain(self.wildcard.iter()).collect();
            if handlers.is_empty() {
                debug!(
                    target: LOG_TARGET,
                    event_type = %event.event_type,
                    "No handlers registered, skipping"
                );
                continue;
            }

            let results = join_all(handlers.iter().map(|h| h.handle(event))).await;
            for (handler, result) in handlers.iter().zip(results) {
                if let Err(err) = result {
                    warn!(
                        target: LOG_TARGET,
                        handler = handler.name(),
                        event_type = %event.event_type,
                        err = %err.fmt_compact(),
                        "Handler failed"
                    );
                }
            }
        }

        join_all(all.iter().map(|h| h.end_batch())).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use agora_core::envelope::event_type;
    use agora_core::payload;

    use super::*;

    #[derive(Default)]
    struct Counting {
        handled: AtomicUsize,
        batches: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn begin_batch(&self) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }

        async fn handle(&self, _event: &DomainEvent) -> Result<(), BoxedError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn wildcard_runs_alongside_specific_and_failures_are_isolated() {
        let failing = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let wildcard = Arc::new(Counting::default());

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(event_type::EVENT_CHECKIN, failing.clone());
        dispatcher.register_wildcard(wildcard.clone());

        let events = vec![
            DomainEvent::new(event_type::EVENT_CHECKIN, payload! {}),
            DomainEvent::new(event_type::EVENT_RSVP, payload! {}),
        ];
        dispatcher.dispatch_batch(&events).await;

        // Specific handler saw only its type; the failure did not stop the
        // wildcard from seeing both messages.
        assert_eq!(failing.handled.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard.handled.load(Ordering::SeqCst), 2);
        assert_eq!(wildcard.batches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_handler_set_acknowledges_and_skips() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .dispatch_batch(&[DomainEvent::new("unknown.type", payload! {})])
            .await;
    }
}
