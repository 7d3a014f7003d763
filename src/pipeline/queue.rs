//! Bounded ingestion queue between the capture task and the processing task.
//!
//! A thin layer over `tokio::sync::mpsc` that adds the overflow policy and
//! counters. The producer side is synchronous so it can be driven from the
//! blocking capture thread; the consumer side is async.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// What the producer does when the queue is busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard new arrivals once the overflow threshold is reached.
    #[default]
    #[value(alias = "drop_newest")]
    DropNewest,
    /// Wait for space when the queue is full. Never loses packets.
    #[value(alias = "block_producer")]
    BlockProducer,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DropNewest => write!(f, "drop_newest"),
            Self::BlockProducer => write!(f, "block_producer"),
        }
    }
}

/// Queue sizing, checked at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    capacity: usize,
    overflow_threshold: usize,
    policy: OverflowPolicy,
}

impl QueueSettings {
    pub fn new(
        capacity: usize,
        overflow_threshold: usize,
        policy: OverflowPolicy,
    ) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if overflow_threshold == 0 || overflow_threshold > capacity {
            return Err(QueueError::InvalidThreshold {
                threshold: overflow_threshold,
                capacity,
            });
        }
        Ok(Self {
            capacity,
            overflow_threshold,
            policy,
        })
    }

    pub fn from_config(config: &crate::config::QueueConfig) -> Result<Self, QueueError> {
        Self::new(config.capacity, config.overflow_threshold, config.overflow_policy)
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn overflow_threshold(&self) -> usize {
        self.overflow_threshold
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("overflow threshold {threshold} must be between 1 and the capacity ({capacity})")]
    InvalidThreshold { threshold: usize, capacity: usize },
}

/// The consumer is gone; nothing will ever dequeue again.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("ingestion queue closed")]
pub struct QueueClosed;

/// Result of a single enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    Dropped,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub accepted: u64,
    pub dropped: u64,
    pub delivered: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue: {} accepted, {} dropped, {} delivered",
            self.accepted, self.dropped, self.delivered
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Create a queue and return its two ends.
pub fn bounded<T>(settings: QueueSettings) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = mpsc::channel(settings.capacity);
    let counters = Arc::new(Counters::default());
    (
        QueueProducer {
            tx,
            settings,
            counters: Arc::clone(&counters),
        },
        QueueConsumer { rx, counters },
    )
}

// ============================================================================
// Producer
// ============================================================================

/// Capture-side handle. Dropping it closes the queue.
#[derive(Debug)]
pub struct QueueProducer<T> {
    tx: mpsc::Sender<T>,
    settings: QueueSettings,
    counters: Arc<Counters>,
}

impl<T> QueueProducer<T> {
    /// Items currently resident.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Offer one item according to the overflow policy.
    ///
    /// Under `BlockProducer` this waits for space and must not be called from
    /// inside an async task.
    pub fn enqueue(&self, item: T) -> Result<Enqueued, QueueClosed> {
        match self.settings.policy {
            OverflowPolicy::DropNewest => self.enqueue_or_drop(item),
            OverflowPolicy::BlockProducer => {
                self.tx.blocking_send(item).map_err(|_| QueueClosed)?;
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(Enqueued::Accepted)
            }
        }
    }

    fn enqueue_or_drop(&self, item: T) -> Result<Enqueued, QueueClosed> {
        if self.tx.is_closed() {
            return Err(QueueClosed);
        }
        if self.len() >= self.settings.overflow_threshold {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(Enqueued::Dropped);
        }
        match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(Enqueued::Accepted)
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(Enqueued::Dropped)
            }
            Err(TrySendError::Closed(_)) => Err(QueueClosed),
        }
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Processing-side handle.
#[derive(Debug)]
pub struct QueueConsumer<T> {
    rx: mpsc::Receiver<T>,
    counters: Arc<Counters>,
}

impl<T> QueueConsumer<T> {
    /// Wait for the next item in arrival order.
    ///
    /// Returns `None` once the producer is gone and the queue is drained.
    /// Cancel-safe: dropping the future never loses an item.
    pub async fn dequeue(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Items currently resident.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Refuse further enqueues. Items already resident can still be dequeued.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}
