//! SMTP session metrics
//!
//! Tracks the capture server's SMTP activity:
//! - Currently open connections
//! - Messages received and stored
//! - Warn/error log volume
//!
//! The counters are plain atomics updated from session workers without
//! further synchronisation; there is no export pipeline, callers read them
//! directly.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// SMTP metrics collector
#[derive(Debug)]
pub struct SmtpMetrics {
    /// Number of currently open SMTP connections
    connections_active: AtomicI64,

    /// Total number of messages stored across all recipients
    received_total: AtomicU64,

    /// Total number of warn-level session events
    warns_total: AtomicU64,

    /// Total number of error-level session events
    errors_total: AtomicU64,
}

impl SmtpMetrics {
    const fn new() -> Self {
        Self {
            connections_active: AtomicI64::new(0),
            received_total: AtomicU64::new(0),
            warns_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
        }
    }

    /// Record a new SMTP connection
    pub fn record_connection(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed SMTP connection
    pub fn record_connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a message stored for one recipient
    pub fn record_message_received(&self) {
        self.received_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a warn-level session event
    pub fn record_warn(&self) {
        self.warns_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error-level session event
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Current number of open connections
    #[must_use]
    pub fn active_connections(&self) -> i64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Total messages stored so far
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received_total.load(Ordering::Relaxed)
    }

    /// Total warn events so far
    #[must_use]
    pub fn warns(&self) -> u64 {
        self.warns_total.load(Ordering::Relaxed)
    }

    /// Total error events so far
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }
}

/// Global metrics instance, live for the whole process
static METRICS: SmtpMetrics = SmtpMetrics::new();

/// Get a reference to the process-wide metrics instance
#[must_use]
pub fn metrics() -> &'static SmtpMetrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_gauge_balances() {
        let m = SmtpMetrics::new();
        m.record_connection();
        m.record_connection();
        assert_eq!(m.active_connections(), 2);

        m.record_connection_closed();
        m.record_connection_closed();
        assert_eq!(m.active_connections(), 0);
    }

    #[test]
    fn totals_only_grow() {
        let m = SmtpMetrics::new();
        m.record_message_received();
        m.record_warn();
        m.record_warn();
        m.record_error();

        assert_eq!(m.received(), 1);
        assert_eq!(m.warns(), 2);
        assert_eq!(m.errors(), 1);
    }
}
