//! Process-wide counters for H4 hosts

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counters aggregated across every host in the process
#[derive(Debug, Default)]
pub struct GlobalMetrics {
    /// Packets delivered to upper layers
    pub packets_delivered: AtomicU64,
    /// Discardable events dropped under pool pressure
    pub events_discarded: AtomicU64,
    /// Allocations that had to wait for a pool release
    pub alloc_deferrals: AtomicU64,
    /// Receive paths ended by a fatal error
    pub fatal_errors: AtomicU64,
    /// Total bytes read off transports
    pub bytes_received: AtomicU64,
    /// Total bytes written to transports
    pub bytes_sent: AtomicU64,
    /// Commands sent by hosts
    pub commands_sent: AtomicU64,
}

impl GlobalMetrics {
    /// Record a delivered packet of `bytes` on-wire bytes
    pub fn packet_delivered(&self, bytes: usize) {
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a dropped discardable event of `bytes` on-wire bytes
    pub fn event_discarded(&self, bytes: usize) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a deferred allocation
    pub fn alloc_deferred(&self) {
        self.alloc_deferrals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fatal receive-path error
    pub fn fatal_error(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `bytes` written to a transport
    pub fn bytes_written(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a command send
    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            alloc_deferrals: self.alloc_deferrals.load(Ordering::Relaxed),
            fatal_errors: self.fatal_errors.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub packets_delivered: u64,
    pub events_discarded: u64,
    pub alloc_deferrals: u64,
    pub fatal_errors: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub commands_sent: u64,
}

impl MetricsSnapshot {
    /// Fraction of received packets that were dropped
    pub fn discard_rate(&self) -> f64 {
        let total = self.packets_delivered + self.events_discarded;
        if total == 0 {
            0.0
        } else {
            self.events_discarded as f64 / total as f64
        }
    }
}

lazy_static::lazy_static! {
    /// Global metrics instance
    pub static ref GLOBAL_METRICS: GlobalMetrics = GlobalMetrics::default();
}

/// Get global metrics
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

/// Format metrics for human-readable display
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    format!(
        "H4 Metrics:\n\
         Packets: {} delivered, {} discarded ({:.1}% drop rate)\n\
         Traffic: {} bytes in, {} bytes out\n\
         Commands sent: {}\n\
         Deferred allocations: {}, fatal errors: {}",
        snapshot.packets_delivered,
        snapshot.events_discarded,
        snapshot.discard_rate() * 100.0,
        snapshot.bytes_received,
        snapshot.bytes_sent,
        snapshot.commands_sent,
        snapshot.alloc_deferrals,
        snapshot.fatal_errors,
    )
}
