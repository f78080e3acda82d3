//! Per-provider health records and router-wide statistics.

use crate::core::types::ErrorKind;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Mutable health record for one provider.
///
/// Invariant: `healthy` is false exactly when `consecutive_errors >= 3`;
/// a successful call resets the count and restores health.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub healthy: bool,
    pub consecutive_errors: u32,
    pub success_count: u64,
    /// Exponential moving average of response time, seconds
    pub avg_response_time: f64,
    pub last_check: Instant,
    pub last_error: Option<ErrorKind>,
}

impl ProviderStatus {
    pub fn healthy_now() -> Self {
        Self {
            healthy: true,
            consecutive_errors: 0,
            success_count: 0,
            avg_response_time: 0.0,
            last_check: Instant::now(),
            last_error: None,
        }
    }

    pub fn record_success(&mut self, latency_secs: f64) {
        self.success_count += 1;
        self.consecutive_errors = 0;
        self.healthy = true;
        self.last_check = Instant::now();
        self.avg_response_time = if self.avg_response_time == 0.0 {
            latency_secs
        } else {
            (self.avg_response_time + latency_secs) / 2.0
        };
    }

    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.consecutive_errors += 1;
        self.last_error = Some(kind);
        self.last_check = Instant::now();
        if self.consecutive_errors >= 3 {
            self.healthy = false;
        }
    }

    /// Apply the outcome of an explicit health probe.
    ///
    /// A failed probe pins `consecutive_errors` at the unhealthy
    /// threshold so the healthy flag and the counter stay consistent.
    pub fn apply_probe(&mut self, passed: bool) {
        self.last_check = Instant::now();
        if passed {
            self.healthy = true;
            self.consecutive_errors = 0;
        } else {
            self.healthy = false;
            self.consecutive_errors = self.consecutive_errors.max(3);
        }
    }
}

/// Lock-free request counters plus per-provider usage and cost.
#[derive(Debug, Default)]
pub struct RouterStats {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub fallback_count: AtomicU64,
    pub provider_usage: DashMap<String, u64>,
    pub cost_tracking: DashMap<String, f64>,
}

impl RouterStats {
    pub fn record_usage(&self, provider: &str) {
        *self.provider_usage.entry(provider.to_string()).or_insert(0) += 1;
    }

    pub fn record_cost(&self, provider: &str, cost: f64) {
        *self
            .cost_tracking
            .entry(provider.to_string())
            .or_insert(0.0) += cost;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            fallback_count: self.fallback_count.load(Ordering::Relaxed),
            provider_usage: self
                .provider_usage
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            cost_tracking: self
                .cost_tracking
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }
}

/// Point-in-time copy of the router statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub fallback_count: u64,
    pub provider_usage: HashMap<String, u64>,
    pub cost_tracking: HashMap<String, f64>,
}

impl StatsSnapshot {
    /// Total successful calls attributed to providers. Always equals
    /// `successful_requests`.
    pub fn total_provider_usage(&self) -> u64 {
        self.provider_usage.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_mark_unhealthy() {
        let mut status = ProviderStatus::healthy_now();
        status.record_failure(ErrorKind::Server);
        status.record_failure(ErrorKind::Server);
        assert!(status.healthy);
        status.record_failure(ErrorKind::Server);
        assert!(!status.healthy);
        assert_eq!(status.consecutive_errors, 3);
    }

    #[test]
    fn success_resets_error_count_and_health() {
        let mut status = ProviderStatus::healthy_now();
        for _ in 0..3 {
            status.record_failure(ErrorKind::Network);
        }
        assert!(!status.healthy);
        status.record_success(0.5);
        assert!(status.healthy);
        assert_eq!(status.consecutive_errors, 0);
        assert_eq!(status.success_count, 1);
    }

    #[test]
    fn ema_seeds_then_averages() {
        let mut status = ProviderStatus::healthy_now();
        status.record_success(2.0);
        assert!((status.avg_response_time - 2.0).abs() < f64::EPSILON);
        status.record_success(4.0);
        assert!((status.avg_response_time - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failed_probe_pins_the_error_threshold() {
        let mut status = ProviderStatus::healthy_now();
        status.record_failure(ErrorKind::Timeout);
        status.apply_probe(false);
        assert!(!status.healthy);
        assert_eq!(status.consecutive_errors, 3);
        status.apply_probe(true);
        assert!(status.healthy);
        assert_eq!(status.consecutive_errors, 0);
    }
}
