//! Prometheus metrics for the muncher proxy
//!
//! Exposes metrics in Prometheus format for monitoring and observability.

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for muncher metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Request Metrics ==============

    /// Total requests counter with route and status labels
    pub static ref REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("requests_total", "Total number of requests")
            .namespace("muncher"),
        &["route", "status"]
    ).expect("metric can be created");

    /// Request duration histogram with route label
    pub static ref REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "request_duration_seconds",
            "Request duration in seconds"
        )
        .namespace("muncher")
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["route"]
    ).expect("metric can be created");

    /// Requests currently being handled
    pub static ref ACTIVE_REQUESTS: Gauge = Gauge::with_opts(
        Opts::new("active_requests", "Number of requests currently being handled")
            .namespace("muncher")
    ).expect("metric can be created");

    // ============== Admission Metrics ==============

    /// Admission decisions with decision label
    pub static ref ADMISSION_DECISIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("admission_decisions_total", "Admission decisions")
            .namespace("muncher"),
        &["decision"]
    ).expect("metric can be created");

    /// Callers with a live admission bucket
    pub static ref TRACKED_CALLERS: IntGauge = IntGauge::with_opts(
        Opts::new("tracked_callers", "Callers with a live admission bucket")
            .namespace("muncher")
    ).expect("metric can be created");

    // ============== Queue Metrics ==============

    /// Current queue size gauge
    pub static ref QUEUE_SIZE: IntGauge = IntGauge::with_opts(
        Opts::new("queue_size", "Upstream calls waiting in the dispatch queue")
            .namespace("muncher")
    ).expect("metric can be created");

    /// Queue wait time histogram
    pub static ref QUEUE_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "queue_wait_seconds",
            "Time between submission and start of an upstream call"
        )
        .namespace("muncher")
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0])
    ).expect("metric can be created");

    // ============== Upstream Metrics ==============

    /// Upstream call outcomes with call and outcome labels
    pub static ref UPSTREAM_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("upstream_calls_total", "Upstream calls by outcome")
            .namespace("muncher"),
        &["call", "outcome"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_REQUESTS.clone()))?;

    REGISTRY.register(Box::new(ADMISSION_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKED_CALLERS.clone()))?;

    REGISTRY.register(Box::new(QUEUE_SIZE.clone()))?;
    REGISTRY.register(Box::new(QUEUE_WAIT_SECONDS.clone()))?;

    REGISTRY.register(Box::new(UPSTREAM_CALLS_TOTAL.clone()))?;

    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Helper struct for tracking request duration.
/// Counts the request as an error if dropped without an explicit record.
pub struct RequestTimer {
    route: &'static str,
    start: std::time::Instant,
}

impl RequestTimer {
    /// Start a new request timer for the given route.
    pub fn new(route: &'static str) -> Self {
        ACTIVE_REQUESTS.inc();
        Self { route, start: std::time::Instant::now() }
    }

    /// Record the request with the given response status.
    pub fn finish(self, status: u16) {
        self.observe(&status.to_string());
        std::mem::forget(self);
    }

    fn observe(&self, status: &str) {
        REQUEST_DURATION_SECONDS
            .with_label_values(&[self.route])
            .observe(self.start.elapsed().as_secs_f64());
        REQUESTS_TOTAL.with_label_values(&[self.route, status]).inc();
        ACTIVE_REQUESTS.dec();
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.observe("error");
    }
}

/// Record an admission decision.
pub fn record_admission(admitted: bool) {
    let decision = if admitted { "admitted" } else { "denied" };
    ADMISSION_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

/// Update tracked callers gauge.
pub fn set_tracked_callers(count: usize) {
    TRACKED_CALLERS.set(count as i64);
}

/// Update queue size gauge.
pub fn set_queue_size(size: usize) {
    QUEUE_SIZE.set(size as i64);
}

/// Record queue wait time.
pub fn record_queue_wait(wait_secs: f64) {
    QUEUE_WAIT_SECONDS.observe(wait_secs);
}

/// Record how an upstream call ended.
pub fn record_upstream(call: &str, outcome: &str) {
    UPSTREAM_CALLS_TOTAL.with_label_values(&[call, outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timer() {
        let timer = RequestTimer::new("status");
        timer.finish(200);
        assert!(REQUESTS_TOTAL.with_label_values(&["status", "200"]).get() >= 1.0);
    }

    #[test]
    fn test_dropped_timer_counts_as_error() {
        drop(RequestTimer::new("dropped"));
        assert!(REQUESTS_TOTAL.with_label_values(&["dropped", "error"]).get() >= 1.0);
    }

    #[test]
    fn test_upstream_and_admission_metrics() {
        record_upstream("replay", "success");
        record_admission(false);
        assert!(UPSTREAM_CALLS_TOTAL.with_label_values(&["replay", "success"]).get() >= 1.0);
        assert!(ADMISSION_DECISIONS_TOTAL.with_label_values(&["denied"]).get() >= 1.0);
    }

    #[test]
    fn test_encode_metrics() {
        let output = encode_metrics();
        // Empty until registered, muncher-prefixed afterwards
        assert!(output.is_empty() || output.starts_with('#') || output.contains("muncher"));
    }
}
