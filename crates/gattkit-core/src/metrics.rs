//! Per-session job metrics.
//!
//! Counters are updated by the session's state machine as jobs complete and
//! can be read at any time from any thread through [`SessionMetrics::summary`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::job::JobKind;

/// Snapshot of one class of jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Jobs completed.
    pub count: u64,
    /// Jobs the transport reported as successful.
    pub success_count: u64,
    /// Jobs that failed or timed out.
    pub failure_count: u64,
    /// Sum of in-flight durations.
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: Option<f64>,
}

/// Lock-free accumulator behind [`OperationMetrics`].
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record one completed job.
    pub fn record(&self, duration: Duration, success: bool) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let (min_duration_ms, max_duration_ms, avg_duration_ms) = if count == 0 {
            (None, None, None)
        } else {
            (
                Some(self.min_duration_ms.load(Ordering::Relaxed)),
                Some(self.max_duration_ms.load(Ordering::Relaxed)),
                Some(total_duration_ms as f64 / count as f64),
            )
        };

        OperationMetrics {
            count,
            success_count,
            failure_count: count - success_count,
            total_duration_ms,
            min_duration_ms,
            max_duration_ms,
            avg_duration_ms,
        }
    }
}

/// Counters for one session.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connected_at: Mutex<Option<Instant>>,
    pub discovery: AtomicOperationMetrics,
    pub reads: AtomicOperationMetrics,
    pub writes: AtomicOperationMetrics,
    notifications: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    max_queue_depth: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_connected(&self) {
        *self.connected_at.lock() = Some(Instant::now());
    }

    /// Time since the transport opened.
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.lock().map(|t| t.elapsed())
    }

    pub(crate) fn record_job(&self, kind: JobKind, duration: Duration, success: bool) {
        let bucket = match kind {
            JobKind::ServiceDiscovery
            | JobKind::CharacteristicDiscovery
            | JobKind::DescriptorDiscovery => &self.discovery,
            JobKind::Read => &self.reads,
            JobKind::Write => &self.writes,
        };
        bucket.record(duration, success);
    }

    pub(crate) fn record_bytes_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn observe_queue_depth(&self, depth: usize) {
        self.max_queue_depth.fetch_max(depth as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> SessionMetricsSummary {
        SessionMetricsSummary {
            uptime_ms: self
                .uptime()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            discovery: self.discovery.snapshot(),
            reads: self.reads.snapshot(),
            writes: self.writes.snapshot(),
            notifications: self.notifications.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Serializable summary of [`SessionMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetricsSummary {
    pub uptime_ms: Option<u64>,
    pub discovery: OperationMetrics,
    pub reads: OperationMetrics,
    pub writes: OperationMetrics,
    /// Value notifications and indications received.
    pub notifications: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Most jobs ever waiting behind the in-flight one.
    pub max_queue_depth: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_metrics_min_max_avg() {
        let metrics = AtomicOperationMetrics::new();
        metrics.record(Duration::from_millis(100), true);
        metrics.record(Duration::from_millis(300), false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.min_duration_ms, Some(100));
        assert_eq!(snapshot.max_duration_ms, Some(300));
        assert_eq!(snapshot.avg_duration_ms, Some(200.0));
    }

    #[test]
    fn test_empty_snapshot_has_no_extremes() {
        let snapshot = AtomicOperationMetrics::new().snapshot();
        assert_eq!(snapshot, OperationMetrics::default());
    }

    #[test]
    fn test_session_metrics_buckets() {
        let metrics = SessionMetrics::new();
        assert!(metrics.uptime().is_none());
        metrics.mark_connected();
        metrics.record_job(JobKind::DescriptorDiscovery, Duration::from_millis(5), true);
        metrics.record_job(JobKind::Read, Duration::from_millis(7), true);
        metrics.record_bytes_read(4);
        metrics.record_notification();
        metrics.observe_queue_depth(3);
        metrics.observe_queue_depth(1);

        let summary = metrics.summary();
        assert!(summary.uptime_ms.is_some());
        assert_eq!(summary.discovery.count, 1);
        assert_eq!(summary.reads.count, 1);
        assert_eq!(summary.writes.count, 0);
        assert_eq!(summary.bytes_read, 4);
        assert_eq!(summary.notifications, 1);
        assert_eq!(summary.max_queue_depth, 3);
    }
}
