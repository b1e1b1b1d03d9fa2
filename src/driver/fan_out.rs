// src/driver/fan_out.rs
use super::{Cadence, Driver, FanOutReport, Workload};
use std::sync::Arc;
use tracing::{error, info};

impl Driver {
    /// Launch `workers` independent loops, each owning its own resource, and
    /// wait for all of them. A worker that cannot open its resource exits
    /// early without affecting the others.
    pub async fn fan_out<W: Workload>(
        &self,
        cadence: Cadence,
        workload: Arc<W>,
        workers: usize,
    ) -> FanOutReport {
        let deadline = cadence.deadline();
        let mut tasks = Vec::new();

        for worker in 0..workers {
            let driver = self.clone();
            let workload = workload.clone();
            let task = tokio::spawn(async move {
                let resource = driver.open(workload.as_ref(), worker).await.ok()?;
                Some(
                    driver
                        .hold(workload.as_ref(), resource, worker, cadence.interval, deadline)
                        .await,
                )
            });
            tasks.push(task);
        }

        let results = futures::future::join_all(tasks).await;

        let mut report = FanOutReport {
            workers,
            ..FanOutReport::default()
        };
        for result in results {
            match result {
                Ok(Some(cycle)) => {
                    report.cycles += cycle.cycles;
                    report.errors += cycle.errors;
                }
                Ok(None) => report.setup_failures += 1,
                Err(e) => {
                    error!("Worker task join error: {}", e);
                    report.setup_failures += 1;
                }
            }
        }

        info!(
            workload = workload.name(),
            workers,
            setup_failures = report.setup_failures,
            cycles = report.cycles,
            "fan-out finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::CountingWorkload;

    #[tokio::test(flavor = "current_thread")]
    async fn every_worker_releases_its_resource() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());

        let report = driver
            .fan_out(Cadence::from_secs(3, 1), workload.clone(), 8)
            .await;

        assert_eq!(report.workers, 8);
        assert_eq!(report.setup_failures, 0);
        assert_eq!(report.cycles, 24);
        assert_eq!(workload.opened(), 8);
        assert_eq!(workload.closed(), 8);
        assert_eq!(workload.current(), 0);
        assert_eq!(workload.peak(), 8);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn setup_failure_skips_only_that_worker() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::failing_every(3));

        let report = driver
            .fan_out(Cadence::from_secs(2, 1), workload.clone(), 6)
            .await;

        assert_eq!(report.setup_failures, 2);
        assert_eq!(workload.opened(), 4);
        assert_eq!(workload.closed(), 4);
        assert_eq!(workload.current(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_workers_returns_immediately() {
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());
        let report = driver
            .fan_out(Cadence::from_secs(60, 1), workload.clone(), 0)
            .await;
        assert_eq!(report, FanOutReport::default());
        assert_eq!(workload.attempts(), 0);
    }
}
