//! Domain-event bus.
//!
//! A bounded channel between the producing side (services, sync) and the
//! queue consumer. Two emit paths with different back-pressure behavior:
//!
//! - [`BusSender::emit`] awaits channel capacity; request-path producers
//!   block under sustained overload.
//! - [`BusSender::emit_nowait`] never awaits; queue handlers emitting
//!   follow-up events use it so a full queue cannot deadlock the consumer.
//!   Overflow drops the event with a logged error.
//!
//! Delivery is at-least-once from the handlers' point of view; handlers are
//! idempotent (see the dispatcher).

use agora_core::envelope::DomainEvent;
use agora_core::fmt::FmtCompact as _;
use snafu::Snafu;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::Dispatcher;

const LOG_TARGET: &str = "agora::bus";

pub const DEFAULT_BUS_CAPACITY: usize = 1024;
const BATCH_SIZE: usize = 32;

#[derive(Debug, Snafu)]
#[snafu(display("Event bus is closed"))]
pub struct BusClosedError;

#[derive(Clone)]
pub struct BusSender {
    tx: mpsc::Sender<DomainEvent>,
}

pub struct BusReceiver {
    rx: mpsc::Receiver<DomainEvent>,
}

impl BusReceiver {
    /// Non-blocking receive; `None` when the queue is currently empty.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        self.rx.try_recv().ok()
    }
}

pub fn bus_channel(capacity: usize) -> (BusSender, BusReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (BusSender { tx }, BusReceiver { rx })
}

impl BusSender {
    /// Enqueue, waiting for capacity. The envelope's timestamp is preserved
    /// exactly as stamped by the caller.
    pub async fn emit(&self, event: DomainEvent) -> Result<(), BusClosedError> {
        debug!(target: LOG_TARGET, event_type = %event.event_type, "Emitting event");
        self.tx.send(event).await.map_err(|_| BusClosedError)
    }

    /// Enqueue without waiting; drops with a logged error when the queue is
    /// full or closed.
    pub fn emit_nowait(&self, event: DomainEvent) {
        let event_type = event.event_type.clone();
        match self.tx.try_send(event) {
            Ok(()) => {
                debug!(target: LOG_TARGET, event_type = %event_type, "Emitting event");
            }
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    event_type = %event_type,
                    err = %err.fmt_compact(),
                    "Dropping event, bus unavailable"
                );
            }
        }
    }
}

/// Consume the bus until every sender is gone, dispatching in batches.
pub async fn run_queue(mut receiver: BusReceiver, dispatcher: Dispatcher) {
    loop {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let received = receiver.rx.recv_many(&mut batch, BATCH_SIZE).await;
        if received == 0 {
            debug!(target: LOG_TARGET, "Bus closed, queue consumer exiting");
            return;
        }
        dispatcher.dispatch_batch(&batch).await;
    }
}

#[cfg(test)]
mod tests {
    use agora_core::envelope::event_type;
    use agora_core::payload;

    use super::*;

    #[tokio::test]
    async fn emit_nowait_drops_on_overflow_without_blocking() {
        let (tx, _rx) = bus_channel(1);
        tx.emit_nowait(DomainEvent::new(event_type::EVENT_CHECKIN, payload! {}));
        // Queue is full now; this must return immediately instead of hanging.
        tx.emit_nowait(DomainEvent::new(event_type::EVENT_CHECKIN, payload! {}));
    }

    #[tokio::test]
    async fn emit_preserves_caller_timestamp() {
        let (tx, mut rx) = bus_channel(4);
        let mut event = DomainEvent::new(event_type::EVENT_CHECKIN, payload! {});
        event.timestamp = agora_core::Timestamp::from(12_345);
        tx.emit(event).await.expect("open");
        let received = rx.rx.recv().await.expect("one event");
        assert_eq!(received.timestamp, agora_core::Timestamp::from(12_345));
    }
}
