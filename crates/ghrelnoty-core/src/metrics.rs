//! Counters and gauges for the poll loop
//!
//! [`Metrics`] is a plain handle of atomics. The coordinator receives it
//! explicitly (usually as `Arc<Metrics>`) and an HTTP endpoint, if any, reads
//! it concurrently. Nothing here is process-global, so every test can use its
//! own instance.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of every exported metric name
pub const NAMESPACE: &str = "ghrelnoty";

/// Atomic counters and gauges observed at each decision point
#[derive(Debug, Default)]
pub struct Metrics {
    db_open_errors: AtomicU64,
    db_errors: AtomicU64,
    rate_limit_risks: AtomicU64,
    rate_limited: AtomicU64,
    rate_limit: AtomicU64,
    rate_limit_used: AtomicU64,
    release_get_errors: AtomicU64,
    new_releases_found: AtomicU64,
    notification_errors: AtomicU64,
    notifications_sent: AtomicU64,
    routing_errors: AtomicU64,
    sweeps: AtomicU64,
}

/// Point-in-time copy of every metric value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub db_open_errors: u64,
    pub db_errors: u64,
    pub rate_limit_risks: u64,
    pub rate_limited: u64,
    pub rate_limit: u64,
    pub rate_limit_used: u64,
    pub release_get_errors: u64,
    pub new_releases_found: u64,
    pub notification_errors: u64,
    pub notifications_sent: u64,
    pub routing_errors: u64,
    pub sweeps: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn db_open_error(&self) {
        self.db_open_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn db_error(&self) {
        self.db_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limit_risk(&self) {
        self.rate_limit_risks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_rate_limit(&self, limit: u64) {
        self.rate_limit.store(limit, Ordering::Relaxed);
    }

    pub fn set_rate_limit_used(&self, used: u64) {
        self.rate_limit_used.store(used, Ordering::Relaxed);
    }

    pub fn release_get_error(&self) {
        self.release_get_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn new_release_found(&self) {
        self.new_releases_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification_error(&self) {
        self.notification_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routing_error(&self) {
        self.routing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sweep_completed(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            db_open_errors: self.db_open_errors.load(Ordering::Relaxed),
            db_errors: self.db_errors.load(Ordering::Relaxed),
            rate_limit_risks: self.rate_limit_risks.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            rate_limit: self.rate_limit.load(Ordering::Relaxed),
            rate_limit_used: self.rate_limit_used.load(Ordering::Relaxed),
            release_get_errors: self.release_get_errors.load(Ordering::Relaxed),
            new_releases_found: self.new_releases_found.load(Ordering::Relaxed),
            notification_errors: self.notification_errors.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            routing_errors: self.routing_errors.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let s = self.snapshot();
        let rows: [(&str, &str, &str, u64); 12] = [
            (
                "db_open_errors_total",
                "counter",
                "Total number of database open errors",
                s.db_open_errors,
            ),
            ("db_errors_total", "counter", "Total number of database errors", s.db_errors),
            (
                "rate_limit_risks_total",
                "counter",
                "Total times there was a risk of hitting rate limits",
                s.rate_limit_risks,
            ),
            ("rate_limited_total", "counter", "Total times rate limits were hit", s.rate_limited),
            ("github_rate_limit", "gauge", "Value of the upstream rate limit", s.rate_limit),
            (
                "github_rate_limit_used",
                "gauge",
                "Current usage of the upstream rate limit",
                s.rate_limit_used,
            ),
            (
                "release_get_errors_total",
                "counter",
                "Total times it was not possible to get the latest release",
                s.release_get_errors,
            ),
            (
                "new_releases_founds_total",
                "counter",
                "Total times a new release was found",
                s.new_releases_found,
            ),
            (
                "notification_errors_total",
                "counter",
                "Total times there were problems notifying",
                s.notification_errors,
            ),
            (
                "notifications_sent_total",
                "counter",
                "Total notifications delivered",
                s.notifications_sent,
            ),
            (
                "routing_errors_total",
                "counter",
                "Total releases whose destination was not configured",
                s.routing_errors,
            ),
            ("sweeps_total", "counter", "Total completed sweeps over all repositories", s.sweeps),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in rows {
            // Writing to a String cannot fail
            let _ = writeln!(out, "# HELP {NAMESPACE}_{name} {help}");
            let _ = writeln!(out, "# TYPE {NAMESPACE}_{name} {kind}");
            let _ = writeln!(out, "{NAMESPACE}_{name} {value}");
        }
        out
    }
}
