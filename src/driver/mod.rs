// src/driver/mod.rs
//! Time-boxed execution of stress workloads.
//!
//! Three shapes are offered: a single loop over one resource ([`Driver::repeat`],
//! [`Driver::single`]), independent workers sharing a deadline
//! ([`Driver::fan_out`]), and a rate-limited ramp that holds what it opened
//! until the deadline ([`Driver::ramp_up`]).

mod cadence;
mod fan_out;
mod ramp;
mod workload;

pub use cadence::Cadence;
pub use ramp::RampPlan;
pub use workload::Workload;

use crate::metrics::MetricsCollector;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Roughly thirty years; stands in for "never" when a deadline overflows.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + duration`, saturating at a far-future instant.
pub fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycles: u64,
    pub errors: u64,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutReport {
    pub workers: usize,
    pub setup_failures: usize,
    pub cycles: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RampReport {
    pub opened: usize,
    pub failed: usize,
    pub peak: usize,
    #[serde(with = "millis")]
    pub elapsed: Duration,
}

#[derive(Clone, Default)]
pub struct Driver {
    metrics: Option<Arc<MetricsCollector>>,
}

impl Driver {
    pub fn new(metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { metrics }
    }

    async fn open<W: Workload>(&self, workload: &W, worker: usize) -> anyhow::Result<W::Resource> {
        match workload.open(worker).await {
            Ok(resource) => {
                if let Some(metrics) = &self.metrics {
                    metrics.resource_opened(workload.name());
                }
                Ok(resource)
            }
            Err(err) => {
                warn!(workload = workload.name(), worker, %err, "failed to open resource");
                if let Some(metrics) = &self.metrics {
                    metrics.record_setup_failure(workload.name());
                }
                Err(err)
            }
        }
    }

    async fn close<W: Workload>(&self, workload: &W, resource: W::Resource) {
        workload.close(resource).await;
        if let Some(metrics) = &self.metrics {
            metrics.resource_closed(workload.name());
        }
    }

    fn work_failed(&self, label: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_work_error(label);
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Workload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fake back end that counts opens, closes and concurrently held resources.
    #[derive(Debug, Default)]
    pub struct CountingWorkload {
        opened: AtomicUsize,
        closed: AtomicUsize,
        attempts: AtomicUsize,
        current: AtomicUsize,
        peak: AtomicUsize,
        work: AtomicUsize,
        opened_at: Mutex<Vec<Instant>>,
        fail_every: usize,
    }

    pub struct Token;

    impl CountingWorkload {
        /// Every `n`th open attempt fails.
        pub fn failing_every(n: usize) -> Self {
            Self {
                fail_every: n,
                ..Self::default()
            }
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn current(&self) -> usize {
            self.current.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        pub fn work_done(&self) -> usize {
            self.work.load(Ordering::SeqCst)
        }

        /// Successful opens bucketed by whole seconds since `start`.
        pub fn opens_per_second(&self, start: Instant) -> Vec<usize> {
            let mut buckets = Vec::new();
            for at in self.opened_at.lock().unwrap().iter() {
                let second = at.duration_since(start).as_secs() as usize;
                if buckets.len() <= second {
                    buckets.resize(second + 1, 0);
                }
                buckets[second] += 1;
            }
            buckets
        }
    }

    #[async_trait]
    impl Workload for CountingWorkload {
        type Resource = Token;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn open(&self, _worker: usize) -> anyhow::Result<Token> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && attempt % self.fail_every == 0 {
                anyhow::bail!("connection refused");
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.opened_at.lock().unwrap().push(Instant::now());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Ok(Token)
        }

        async fn unit_of_work(&self, _resource: &mut Token, _worker: usize) -> anyhow::Result<()> {
            self.work.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self, _resource: Token) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
