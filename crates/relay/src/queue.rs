//! Per-subscriber inbound queues.
//!
//! Each attached subscriber owns one bounded queue the pump writes
//! into. Backpressure policy is deliberately not uniform: the billing
//! queue must never lose a chargeable event, so overflowing it fails
//! the run; history and UI queues evict their oldest entry and count
//! the loss.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use rr_domain::event::{AiEvent, TerminalReason};

/// What happens when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Reject the push; the relay fails the run with an internal error.
    FailRunWhenFull,
    /// Evict the oldest queued event and count it.
    DropOldest,
}

/// One item on a subscriber queue.
#[derive(Debug, Clone)]
pub(crate) enum QueueItem {
    Event(Arc<AiEvent>),
    /// The terminal transition; always the last item a queue carries.
    Terminal(TerminalReason),
}

/// Queue-full rejection under [`QueuePolicy::FailRunWhenFull`].
#[derive(Debug)]
pub(crate) struct QueueFull {
    pub capacity: usize,
}

/// Bounded FIFO with a policy-driven overflow behavior.
pub(crate) struct EventQueue {
    capacity: usize,
    policy: QueuePolicy,
    inner: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize, policy: QueuePolicy) -> Self {
        Self {
            capacity,
            policy,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item. Terminal items are always admitted, even past
    /// capacity — the terminal transition must reach every subscriber.
    pub(crate) fn push(&self, item: QueueItem) -> Result<(), QueueFull> {
        let mut inner = self.inner.lock();

        if !matches!(item, QueueItem::Terminal(_)) && inner.len() >= self.capacity {
            match self.policy {
                QueuePolicy::FailRunWhenFull => {
                    return Err(QueueFull {
                        capacity: self.capacity,
                    });
                }
                QueuePolicy::DropOldest => {
                    // The front is the oldest event; terminals are only
                    // ever pushed last, so this never evicts one.
                    inner.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        inner.push_back(item);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next item.
    pub(crate) async fn pop(&self) -> QueueItem {
        loop {
            if let Some(item) = self.inner.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Number of events evicted under [`QueuePolicy::DropOldest`].
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
