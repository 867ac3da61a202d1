use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::CommandData;

/// Inbound commands shared between the receiver thread and the simulation
/// thread. The lock is only held for a push or a drain.
#[derive(Debug, Default)]
pub(crate) struct SharedQueue {
    items: Mutex<VecDeque<CommandData>>,
    received: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl SharedQueue {
    pub(crate) fn push(&self, command: CommandData) {
        self.items.lock().push_back(command);
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn drain(&self) -> Vec<CommandData> {
        self.items.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, failed: bool) {
        let counter = if failed { &self.failed } else { &self.executed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> ProxyStats {
        ProxyStats {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Counters since the proxy was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Commands accepted onto the queue, from the network or in-process.
    pub received: u64,
    /// Datagrams or enqueues dropped before reaching the queue.
    pub rejected: u64,
    pub executed: u64,
    pub failed: u64,
}

/// Cloneable, `Send` handle for injecting commands from other threads.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    shared: Arc<SharedQueue>,
}

impl QueueHandle {
    pub(crate) fn new(shared: Arc<SharedQueue>) -> Self {
        Self { shared }
    }

    /// Queues `command` for `target_frame`. Blank commands are dropped and
    /// counted as rejected; returns whether the command was queued.
    pub fn enqueue(&self, target_frame: i32, command: impl Into<String>) -> bool {
        let command = command.into();
        let trimmed = command.trim();
        if trimmed.is_empty() {
            self.shared.record_rejected();
            return false;
        }
        let command = if trimmed.len() == command.len() {
            command
        } else {
            trimmed.to_string()
        };
        self.shared.push(CommandData::new(target_frame, command));
        true
    }

    /// Commands waiting for the next drain. Parked future-frame commands are
    /// not counted.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ProxyStats {
        self.shared.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_arrival_order() {
        let queue = Arc::new(SharedQueue::default());
        let handle = QueueHandle::new(queue.clone());
        assert!(handle.enqueue(3, "a"));
        assert!(handle.enqueue(0, " b "));
        assert!(!handle.enqueue(0, "   "));
        assert_eq!(handle.len(), 2);
        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![CommandData::new(3, "a"), CommandData::new(0, "b")]
        );
        assert!(handle.is_empty());
        let stats = handle.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.rejected, 1);
    }
}
