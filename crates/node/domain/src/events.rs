//! Ledger events.

use std::sync::Arc;

use alloy_primitives::B256;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use parking_lot::Mutex;

use crate::{Log, TxId};

/// Events emitted by the ledger.
#[derive(Clone, Debug)]
pub enum LedgerEvent {
    /// A transaction was accepted into the mempool.
    TransactionSubmitted(TxId),
    /// A block was committed.
    BlockCommitted {
        /// Committed height.
        height: u64,
        /// Committed block hash.
        hash: B256,
    },
    /// Logs produced by a committed block.
    Logs(Vec<Log>),
}

/// Pub-sub registry for ledger events.
#[derive(Clone, Debug)]
pub struct LedgerEvents {
    listeners: Arc<Mutex<Vec<UnboundedSender<LedgerEvent>>>>,
}

impl LedgerEvents {
    /// Create a new, empty event registry.
    #[must_use]
    pub fn new() -> Self {
        Self { listeners: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Publish an event to all current subscribers, dropping closed channels.
    pub fn publish(&self, event: LedgerEvent) {
        let mut guard = self.listeners.lock();
        guard.retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }

    /// Subscribe to ledger events.
    pub fn subscribe(&self) -> UnboundedReceiver<LedgerEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.lock().push(sender);
        receiver
    }

    /// Number of live subscribers.
    pub fn subscribers(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for LedgerEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, Bytes};

    use super::*;

    #[test]
    fn subscribe_adds_listener() {
        let events = LedgerEvents::default();
        assert_eq!(events.subscribers(), 0);
        let _r1 = events.subscribe();
        let _r2 = events.subscribe();
        assert_eq!(events.subscribers(), 2);
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let events = LedgerEvents::new();
        let mut r1 = events.subscribe();
        let mut r2 = events.subscribe();

        events.publish(LedgerEvent::TransactionSubmitted(TxId(B256::repeat_byte(0x42))));

        let e1 = r1.try_next().expect("channel open").expect("r1 should receive");
        let e2 = r2.try_next().expect("channel open").expect("r2 should receive");
        assert!(matches!(e1, LedgerEvent::TransactionSubmitted(id) if id.0 == B256::repeat_byte(0x42)));
        assert!(matches!(e2, LedgerEvent::TransactionSubmitted(_)));
    }

    #[test]
    fn logs_event_carries_logs() {
        let events = LedgerEvents::new();
        let mut receiver = events.subscribe();
        let log = Log {
            address: Address::repeat_byte(1),
            topics: vec![B256::repeat_byte(2)],
            data: Bytes::from_static(b"hi"),
            ..Default::default()
        };

        events.publish(LedgerEvent::Logs(vec![log.clone()]));

        match receiver.try_next().expect("channel open").expect("event") {
            LedgerEvent::Logs(logs) => assert_eq!(logs, vec![log]),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn closed_channels_are_dropped() {
        let events = LedgerEvents::new();
        let receiver = events.subscribe();
        drop(receiver);

        events.publish(LedgerEvent::BlockCommitted { height: 1, hash: B256::ZERO });
        assert_eq!(events.subscribers(), 0);
    }
}
