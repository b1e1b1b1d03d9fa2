// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(%err, "failed to encode metrics");
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,
    pub request_size_bytes: HistogramVec,
    pub response_size_bytes: HistogramVec,

    // Fault injection
    pub faults_injected_total: IntCounterVec,

    // Stress jobs
    pub jobs_started_total: IntCounterVec,
    pub jobs_active: IntGauge,

    // Workloads
    pub work_errors_total: IntCounterVec,
    pub setup_failures_total: IntCounterVec,
    pub worker_resources_open: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("chaos_requests_total", "Total number of requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "chaos_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let request_size_bytes = HistogramVec::new(
            HistogramOpts::new("chaos_request_size_bytes", "Request size in bytes"),
            &["method"],
        )?;
        registry.register(Box::new(request_size_bytes.clone()))?;

        let response_size_bytes = HistogramVec::new(
            HistogramOpts::new("chaos_response_size_bytes", "Response size in bytes"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(response_size_bytes.clone()))?;

        let faults_injected_total = IntCounterVec::new(
            Opts::new(
                "chaos_faults_injected_total",
                "Requests short-circuited by a simulated fault",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(faults_injected_total.clone()))?;

        let jobs_started_total = IntCounterVec::new(
            Opts::new("chaos_jobs_started_total", "Stress jobs started"),
            &["job", "mode"],
        )?;
        registry.register(Box::new(jobs_started_total.clone()))?;

        let jobs_active = IntGauge::new("chaos_jobs_active", "Stress jobs currently running")?;
        registry.register(Box::new(jobs_active.clone()))?;

        let work_errors_total = IntCounterVec::new(
            Opts::new(
                "chaos_work_errors_total",
                "Failed units of work inside running jobs",
            ),
            &["workload"],
        )?;
        registry.register(Box::new(work_errors_total.clone()))?;

        let setup_failures_total = IntCounterVec::new(
            Opts::new(
                "chaos_setup_failures_total",
                "Workers that could not open their resource",
            ),
            &["workload"],
        )?;
        registry.register(Box::new(setup_failures_total.clone()))?;

        let worker_resources_open = IntGaugeVec::new(
            Opts::new(
                "chaos_worker_resources_open",
                "Connections or clients currently held by workers",
            ),
            &["workload"],
        )?;
        registry.register(Box::new(worker_resources_open.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            request_size_bytes,
            response_size_bytes,
            faults_injected_total,
            jobs_started_total,
            jobs_active,
            work_errors_total,
            setup_failures_total,
            worker_resources_open,
        })
    }

    pub fn record_request(
        &self,
        method: &str,
        status_code: u16,
        duration: Duration,
        request_size: u64,
        response_size: u64,
    ) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, &status])
            .observe(duration.as_secs_f64());

        self.request_size_bytes
            .with_label_values(&[method])
            .observe(request_size as f64);

        self.response_size_bytes
            .with_label_values(&[method, &status])
            .observe(response_size as f64);
    }

    pub fn record_fault(&self, kind: &str) {
        self.faults_injected_total.with_label_values(&[kind]).inc();
    }

    pub fn job_started(&self, job: &str, run_async: bool) {
        let mode = if run_async { "async" } else { "sync" };
        self.jobs_started_total.with_label_values(&[job, mode]).inc();
        self.jobs_active.inc();
    }

    pub fn job_finished(&self) {
        self.jobs_active.dec();
    }

    pub fn record_work_error(&self, workload: &str) {
        self.work_errors_total.with_label_values(&[workload]).inc();
    }

    pub fn record_setup_failure(&self, workload: &str) {
        self.setup_failures_total.with_label_values(&[workload]).inc();
    }

    pub fn resource_opened(&self, workload: &str) {
        self.worker_resources_open.with_label_values(&[workload]).inc();
    }

    pub fn resource_closed(&self, workload: &str) {
        self.worker_resources_open.with_label_values(&[workload]).dec();
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
