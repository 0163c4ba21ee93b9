//! Metrics collection for the delivery engine.
//!
//! Lock-free atomic counters exported in Prometheus text format via the
//! intake server's `/metrics` endpoint.

use std::{
    fmt::Write as _,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use crate::models::ATTEMPT_SLOTS;

static METRICS: OnceLock<Arc<Metrics>> = OnceLock::new();

/// Returns the process-wide metrics instance.
pub fn global_metrics() -> &'static Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new()))
}

/// Application metrics collector.
#[derive(Debug)]
pub struct Metrics {
    /// Queue rows accepted by the intake endpoint.
    pub webhooks_received: AtomicU64,
    /// Intake requests rejected (missing or inactive configuration).
    pub webhooks_rejected: AtomicU64,

    /// Delivery attempts executed, per retry tier.
    pub attempts_by_tier: [AtomicU64; ATTEMPT_SLOTS],
    /// Attempts ending in a 2xx response.
    pub attempts_succeeded: AtomicU64,
    /// Attempts ending in a non-2xx response or transport error.
    pub attempts_failed: AtomicU64,
    /// Rows that exhausted all seven attempts.
    pub deliveries_exhausted: AtomicU64,
    /// Total attempt wall time in microseconds.
    pub attempt_duration_us_total: AtomicU64,
    /// Attempt count for average calculation.
    pub attempt_duration_count: AtomicU64,

    /// Claim calls that returned a storage error.
    pub claim_errors: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            webhooks_received: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            attempts_by_tier: [ZERO; ATTEMPT_SLOTS],
            attempts_succeeded: AtomicU64::new(0),
            attempts_failed: AtomicU64::new(0),
            deliveries_exhausted: AtomicU64::new(0),
            attempt_duration_us_total: AtomicU64::new(0),
            attempt_duration_count: AtomicU64::new(0),
            claim_errors: AtomicU64::new(0),
        }
    }

    /// Records one webhook accepted at intake.
    pub fn record_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one webhook rejected at intake.
    pub fn record_rejected(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one delivery attempt at the given tier.
    pub fn record_attempt(&self, tier: i32, succeeded: bool, duration: Duration) {
        if let Some(counter) =
            usize::try_from(tier).ok().and_then(|t| self.attempts_by_tier.get(t))
        {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if succeeded {
            self.attempts_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.attempts_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.attempt_duration_us_total
            .fetch_add(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
        self.attempt_duration_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a row whose retries were exhausted.
    pub fn record_exhausted(&self) {
        self.deliveries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a claim call that failed at the storage layer.
    pub fn record_claim_error(&self) {
        self.claim_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn average_attempt_duration_us(&self) -> u64 {
        let total = self.attempt_duration_us_total.load(Ordering::Relaxed);
        let count = self.attempt_duration_count.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Exports all counters in Prometheus text format.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP conveyor_webhooks_received_total Webhooks accepted at intake\n");
        out.push_str("# TYPE conveyor_webhooks_received_total counter\n");
        let _ = writeln!(
            out,
            "conveyor_webhooks_received_total {}",
            self.webhooks_received.load(Ordering::Relaxed)
        );

        out.push_str("# HELP conveyor_webhooks_rejected_total Webhooks rejected at intake\n");
        out.push_str("# TYPE conveyor_webhooks_rejected_total counter\n");
        let _ = writeln!(
            out,
            "conveyor_webhooks_rejected_total {}",
            self.webhooks_rejected.load(Ordering::Relaxed)
        );

        out.push_str("# HELP conveyor_attempts_total Delivery attempts by retry tier\n");
        out.push_str("# TYPE conveyor_attempts_total counter\n");
        for (tier, counter) in self.attempts_by_tier.iter().enumerate() {
            let _ = writeln!(
                out,
                "conveyor_attempts_total{{tier=\"{tier}\"}} {}",
                counter.load(Ordering::Relaxed)
            );
        }

        out.push_str("# HELP conveyor_attempts_by_outcome Delivery attempts by outcome\n");
        out.push_str("# TYPE conveyor_attempts_by_outcome counter\n");
        let _ = writeln!(
            out,
            "conveyor_attempts_by_outcome{{outcome=\"success\"}} {}",
            self.attempts_succeeded.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "conveyor_attempts_by_outcome{{outcome=\"failure\"}} {}",
            self.attempts_failed.load(Ordering::Relaxed)
        );

        out.push_str(
            "# HELP conveyor_deliveries_exhausted_total Rows failed after all attempts\n",
        );
        out.push_str("# TYPE conveyor_deliveries_exhausted_total counter\n");
        let _ = writeln!(
            out,
            "conveyor_deliveries_exhausted_total {}",
            self.deliveries_exhausted.load(Ordering::Relaxed)
        );

        out.push_str("# HELP conveyor_attempt_duration_avg_us Average attempt wall time\n");
        out.push_str("# TYPE conveyor_attempt_duration_avg_us gauge\n");
        let _ =
            writeln!(out, "conveyor_attempt_duration_avg_us {}", self.average_attempt_duration_us());

        out.push_str("# HELP conveyor_claim_errors_total Claim calls failing at storage\n");
        out.push_str("# TYPE conveyor_claim_errors_total counter\n");
        let _ = writeln!(
            out,
            "conveyor_claim_errors_total {}",
            self.claim_errors.load(Ordering::Relaxed)
        );

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_recording_updates_tier_and_outcome() {
        let metrics = Metrics::new();

        metrics.record_attempt(0, true, Duration::from_millis(10));
        metrics.record_attempt(0, false, Duration::from_millis(30));
        metrics.record_attempt(3, false, Duration::from_millis(20));

        assert_eq!(metrics.attempts_by_tier[0].load(Ordering::Relaxed), 2);
        assert_eq!(metrics.attempts_by_tier[3].load(Ordering::Relaxed), 1);
        assert_eq!(metrics.attempts_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.attempts_failed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.average_attempt_duration_us(), 20_000);
    }

    #[test]
    fn out_of_range_tier_does_not_panic() {
        let metrics = Metrics::new();
        metrics.record_attempt(99, false, Duration::from_millis(1));
        assert_eq!(metrics.attempts_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn prometheus_export_contains_counters() {
        let metrics = Metrics::new();
        metrics.record_received();
        metrics.record_attempt(1, true, Duration::from_millis(5));
        metrics.record_exhausted();

        let text = metrics.to_prometheus();
        assert!(text.contains("conveyor_webhooks_received_total 1"));
        assert!(text.contains("conveyor_attempts_total{tier=\"1\"} 1"));
        assert!(text.contains("conveyor_attempts_by_outcome{outcome=\"success\"} 1"));
        assert!(text.contains("conveyor_deliveries_exhausted_total 1"));
    }
}
