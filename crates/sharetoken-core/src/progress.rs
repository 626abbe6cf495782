//! Progress accounting and throttled reporting.

use std::time::Duration;

use tokio::time::Instant;

/// Per-run tallies. `failed` includes invalid records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
}

/// A point-in-time view of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub counts: Counts,
    pub total: usize,
    pub elapsed: Duration,
    /// Records per second.
    pub rate: f64,
    /// `None` until a rate can be computed.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.counts.processed as f64 * 100.0 / self.total as f64
        }
    }
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%) | ok:{} fail:{} skip:{} | rate: {:.1}/s | ETA: {}",
            self.counts.processed,
            self.total,
            self.percent(),
            self.counts.succeeded,
            self.counts.failed,
            self.counts.skipped,
            self.rate,
            self.eta
                .map(format_duration)
                .unwrap_or_else(|| "calculating...".into()),
        )
    }
}

/// Emits a snapshot at most once per `interval`.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    interval: Duration,
    started_at: Instant,
    last_report: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            total,
            interval,
            started_at: now,
            last_report: now,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshot unconditionally.
    pub fn snapshot_at(&self, now: Instant, counts: Counts) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started_at);
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            counts.processed as f64 / secs
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(counts.processed);
        let eta = (rate > 0.0 && remaining > 0)
            .then(|| Duration::from_secs_f64(remaining as f64 / rate));
        ProgressSnapshot {
            counts,
            total: self.total,
            elapsed,
            rate,
            eta,
        }
    }

    /// Snapshot if the reporting interval has passed since the last one.
    pub fn tick_at(&mut self, now: Instant, counts: Counts) -> Option<ProgressSnapshot> {
        if now.saturating_duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(self.snapshot_at(now, counts))
    }

    pub fn tick(&mut self, counts: Counts) -> Option<ProgressSnapshot> {
        self.tick_at(Instant::now(), counts)
    }
}

/// Human-readable duration, rounded up to whole seconds: `1h 2m 3s`,
/// `2m 3s`, `3s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    let (h, rem) = (total / 3_600, total % 3_600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
