// src/driver/cadence.rs
use super::{deadline_after, CycleReport, Driver, Workload};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// How long a job runs and how long it rests between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub duration: Duration,
    pub interval: Duration,
}

impl Cadence {
    pub fn new(duration: Duration, interval: Duration) -> Self {
        Self { duration, interval }
    }

    pub fn from_secs(duration: u64, interval: u64) -> Self {
        Self::new(Duration::from_secs(duration), Duration::from_secs(interval))
    }

    pub fn deadline(&self) -> Instant {
        deadline_after(Instant::now(), self.duration)
    }
}

/// Rest for one interval, never past `deadline`. A zero interval only yields.
pub(crate) async fn rest(interval: Duration, deadline: Instant) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
        return;
    }
    let wake = deadline_after(Instant::now(), interval).min(deadline);
    sleep_until(wake).await;
}

impl Driver {
    /// Run `work` until the deadline, resting `interval` between cycles.
    /// Failed cycles are logged and the loop carries on.
    pub async fn repeat<F, Fut>(&self, label: &str, cadence: Cadence, mut work: F) -> CycleReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let started = Instant::now();
        let deadline = deadline_after(started, cadence.duration);
        let mut report = CycleReport::default();

        while Instant::now() < deadline {
            report.cycles += 1;
            if let Err(err) = work().await {
                report.errors += 1;
                warn!(job = label, cycle = report.cycles, %err, "work cycle failed");
                self.work_failed(label);
            }
            rest(cadence.interval, deadline).await;
        }

        report.elapsed = started.elapsed();
        info!(
            job = label,
            cycles = report.cycles,
            errors = report.errors,
            elapsed = ?report.elapsed,
            "job loop finished"
        );
        report
    }

    /// Open one resource, drive it until the deadline and release it.
    pub async fn single<W: Workload>(
        &self,
        cadence: Cadence,
        workload: &W,
    ) -> anyhow::Result<CycleReport> {
        let resource = self.connect(workload).await?;
        Ok(self.drive(cadence, workload, resource).await)
    }

    /// Open the resource of a single-loop job, so a setup failure can be
    /// reported before the job is started.
    pub async fn connect<W: Workload>(&self, workload: &W) -> anyhow::Result<W::Resource> {
        self.open(workload, 0).await
    }

    /// Drive a resource from [`Driver::connect`] for `cadence.duration`.
    pub async fn drive<W: Workload>(
        &self,
        cadence: Cadence,
        workload: &W,
        resource: W::Resource,
    ) -> CycleReport {
        self.hold(workload, resource, 0, cadence.interval, cadence.deadline())
            .await
    }

    /// Shape A over an already opened resource. Always closes it.
    pub(crate) async fn hold<W: Workload>(
        &self,
        workload: &W,
        mut resource: W::Resource,
        worker: usize,
        interval: Duration,
        deadline: Instant,
    ) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        while Instant::now() < deadline {
            report.cycles += 1;
            if let Err(err) = workload.unit_of_work(&mut resource, worker).await {
                report.errors += 1;
                debug!(workload = workload.name(), worker, %err, "unit of work failed");
                self.work_failed(workload.name());
            }
            rest(interval, deadline).await;
        }

        self.close(workload, resource).await;
        report.elapsed = started.elapsed();
        debug!(
            workload = workload.name(),
            worker,
            cycles = report.cycles,
            elapsed = ?report.elapsed,
            "worker finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::CountingWorkload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(flavor = "current_thread")]
    async fn repeat_runs_until_deadline() {
        tokio::time::pause();
        let driver = Driver::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let report = driver
            .repeat("tick", Cadence::from_secs(5, 1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.cycles, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.elapsed.as_secs(), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rest_is_capped_at_deadline() {
        tokio::time::pause();
        let driver = Driver::default();
        let report = driver
            .repeat("long-interval", Cadence::from_secs(2, 30), || async { Ok(()) })
            .await;

        assert_eq!(report.cycles, 1);
        assert_eq!(report.elapsed.as_secs(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    #[tracing_test::traced_test]
    async fn failed_cycles_are_logged_not_fatal() {
        tokio::time::pause();
        let driver = Driver::default();
        let report = driver
            .repeat("flaky", Cadence::from_secs(3, 1), || async {
                Err(anyhow::anyhow!("query refused"))
            })
            .await;

        assert_eq!(report.cycles, 3);
        assert_eq!(report.errors, 3);
        assert!(logs_contain("work cycle failed"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn endless_duration_keeps_cycling() {
        tokio::time::pause();
        let driver = Driver::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let run = driver.repeat("endless", Cadence::from_secs(u64::MAX, 1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let outcome = tokio::time::timeout(Duration::from_millis(4500), run).await;

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(Cadence::from_secs(u64::MAX, 1).deadline() > Instant::now());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_duration_runs_nothing() {
        tokio::time::pause();
        let driver = Driver::default();
        let report = driver
            .repeat("noop", Cadence::from_secs(0, 1), || async { Ok(()) })
            .await;
        assert_eq!(report.cycles, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn single_closes_its_resource() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = CountingWorkload::default();

        let report = driver
            .single(Cadence::from_secs(3, 1), &workload)
            .await
            .unwrap();

        assert_eq!(report.cycles, 3);
        assert_eq!(workload.opened(), 1);
        assert_eq!(workload.closed(), 1);
        assert_eq!(workload.current(), 0);
        assert_eq!(workload.work_done(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn single_surfaces_setup_failure() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = CountingWorkload::failing_every(1);

        let result = driver.single(Cadence::from_secs(3, 1), &workload).await;
        assert!(result.is_err());
        assert_eq!(workload.closed(), 0);
    }
}
