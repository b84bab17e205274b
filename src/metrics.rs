//! Atomic counters for session and message activity
//!
//! Process-wide, updated by the manager and the wire layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Session metrics
    pub sessions_opened: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub sessions_aborted: AtomicU64,
    pub sessions_failed: AtomicU64,

    // Close handshake
    pub close_violations: AtomicU64,

    // Traffic metrics
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_aborted: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            close_violations: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_aborted(&self) {
        self.sessions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn close_violation(&self) {
        self.close_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_tx(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_rx(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_aborted: self.sessions_aborted.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            close_violations: self.close_violations.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_aborted: u64,
    pub sessions_failed: u64,
    pub close_violations: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "sessions: opened={} closed={} aborted={} failed={}",
            self.sessions_opened, self.sessions_closed, self.sessions_aborted, self.sessions_failed
        )?;
        writeln!(f, "close violations: {}", self.close_violations)?;
        write!(
            f,
            "messages: sent={} ({} bytes) received={} ({} bytes)",
            self.messages_sent, self.bytes_sent, self.messages_received, self.bytes_received
        )
    }
}
