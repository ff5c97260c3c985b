use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Counters shared across a worker's threads and readable by the Manager
/// for the periodic liveness status line. Queue-length/drop based, never
/// CPU-usage based.
#[derive(Default)]
pub struct WorkerStats {
    received: AtomicU64,
    sent: AtomicU64,
    dropped_inbound: AtomicU64,
    dropped_outbound: AtomicU64,
    decode_errors: AtomicU64,
    last_activity_ms: AtomicU64,
    fatal: AtomicBool,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl WorkerStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// `n` is the number of frames carried by the dropped batch, not 1
    /// per drop event — drop-tail discards a whole `InboundBatch` at a
    /// time, and every frame in it must still be accounted for against
    /// `received` (spec.md §8 P5's "accounts for every message").
    pub fn record_dropped_inbound(&self, n: u64) {
        self.dropped_inbound.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_dropped_outbound(&self) {
        self.dropped_outbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks the worker as having hit a fatal transport error (spec.md §7
    /// item 5: "During steady state, fatal transport errors terminate the
    /// worker and the manager is notified via liveness probing"). The
    /// caller is still expected to trip the worker's exit latch so every
    /// other thread unwinds too; this flag is purely the Manager-visible
    /// signal that the shutdown was involuntary.
    pub fn record_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_inbound: self.dropped_inbound.load(Ordering::Relaxed),
            dropped_outbound: self.dropped_outbound.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            last_activity_ms: self.last_activity_ms.load(Ordering::Relaxed),
            fatal: self.is_fatal(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub dropped_inbound: u64,
    pub dropped_outbound: u64,
    pub decode_errors: u64,
    pub last_activity_ms: u64,
    pub fatal: bool,
}
