//! Dispatcher metrics for observability
//!
//! Counters describing how records moved through the queue: how many were
//! accepted, delivered, refused by every sink, rejected after stop, or
//! discarded on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the queue dispatcher
///
/// # Example
///
/// ```
/// use axum_structlog::DispatcherMetrics;
///
/// let metrics = DispatcherMetrics::new();
/// metrics.record_enqueued();
/// metrics.record_delivered();
///
/// assert_eq!(metrics.enqueued(), 1);
/// assert_eq!(metrics.pending(), 0);
/// ```
#[derive(Debug)]
pub struct DispatcherMetrics {
    /// Records accepted into the queue
    enqueued: AtomicU64,

    /// Records accepted by at least one sink
    delivered: AtomicU64,

    /// Records every sink refused
    failed: AtomicU64,

    /// Individual sink write failures (one record may fail on several sinks)
    sink_failures: AtomicU64,

    /// Records accepted but never delivered (left in the queue on stop)
    discarded: AtomicU64,

    /// Records refused at enqueue (dispatcher stopped or overflow timeout)
    rejected: AtomicU64,

    /// Number of times a producer waited for queue capacity
    block_events: AtomicU64,
}

impl DispatcherMetrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    /// Records accepted but not yet delivered, failed or discarded
    pub fn pending(&self) -> u64 {
        self.enqueued()
            .saturating_sub(self.delivered())
            .saturating_sub(self.failed())
            .saturating_sub(self.discarded())
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.delivered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_failed(&self) -> u64 {
        self.failed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_sink_failure(&self) -> u64 {
        self.sink_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_discarded(&self, count: u64) -> u64 {
        self.discarded.fetch_add(count, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rejected(&self) -> u64 {
        self.rejected.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for DispatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DispatcherMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            enqueued: AtomicU64::new(self.enqueued()),
            delivered: AtomicU64::new(self.delivered()),
            failed: AtomicU64::new(self.failed()),
            sink_failures: AtomicU64::new(self.sink_failures()),
            discarded: AtomicU64::new(self.discarded()),
            rejected: AtomicU64::new(self.rejected()),
            block_events: AtomicU64::new(self.block_events()),
        }
    }
}
