// src/driver/ramp.rs
use super::{deadline_after, Driver, RampReport, Workload, FAR_FUTURE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

const MIN_RAMP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPlan {
    pub target: usize,
    pub increase_per_interval: usize,
    pub interval: Duration,
    pub duration: Duration,
}

impl Driver {
    /// Open up to `increase_per_interval` resources per tick until `target`
    /// are held or the deadline passes, hold them until the deadline, then
    /// close all of them.
    pub async fn ramp_up<W: Workload>(&self, plan: RampPlan, workload: Arc<W>) -> RampReport {
        let started = Instant::now();
        let deadline = deadline_after(started, plan.duration);
        let held: Arc<Mutex<Vec<W::Resource>>> = Arc::new(Mutex::new(Vec::new()));
        let mut report = RampReport::default();

        let mut ticker = interval_at(started, plan.interval.clamp(MIN_RAMP_INTERVAL, FAR_FUTURE));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while plan.increase_per_interval > 0 {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = sleep_until(deadline) => break,
            }
            if Instant::now() >= deadline {
                break;
            }

            let current = held.lock().await.len();
            if current >= plan.target {
                break;
            }
            let batch = plan.increase_per_interval.min(plan.target - current);

            let mut attempts = Vec::new();
            for slot in 0..batch {
                let driver = self.clone();
                let workload = workload.clone();
                let held = held.clone();
                let worker = current + slot;
                attempts.push(tokio::spawn(async move {
                    let resource = driver.open(workload.as_ref(), worker).await.ok()?;
                    let mut held = held.lock().await;
                    held.push(resource);
                    Some(held.len())
                }));
            }

            for attempt in futures::future::join_all(attempts).await {
                match attempt {
                    Ok(Some(now_held)) => {
                        report.opened += 1;
                        report.peak = report.peak.max(now_held);
                    }
                    Ok(None) => report.failed += 1,
                    Err(e) => {
                        error!("Ramp task join error: {}", e);
                        report.failed += 1;
                    }
                }
            }
            debug!(
                workload = workload.name(),
                peak = report.peak,
                target = plan.target,
                "ramp tick"
            );

            if held.lock().await.len() >= plan.target {
                break;
            }
        }

        sleep_until(deadline).await;

        let drained = std::mem::take(&mut *held.lock().await);
        let released = drained.len();
        for resource in drained {
            self.close(workload.as_ref(), resource).await;
        }

        report.elapsed = started.elapsed();
        info!(
            workload = workload.name(),
            opened = report.opened,
            failed = report.failed,
            peak = report.peak,
            released,
            "ramp finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::CountingWorkload;

    fn plan(target: usize, step: usize, interval: u64, duration: u64) -> RampPlan {
        RampPlan {
            target,
            increase_per_interval: step,
            interval: Duration::from_secs(interval),
            duration: Duration::from_secs(duration),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reaches_target_then_holds_until_deadline() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());

        let report = driver.ramp_up(plan(5, 2, 1, 10), workload.clone()).await;

        assert_eq!(report.opened, 5);
        assert_eq!(report.peak, 5);
        assert_eq!(report.elapsed.as_secs(), 10);
        assert_eq!(workload.peak(), 5);
        assert_eq!(workload.current(), 0);
        assert_eq!(workload.closed(), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn never_exceeds_step_per_tick() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());

        // Three ticks (t=0, 1, 2) fit before the deadline at 2.5 s.
        let plan = RampPlan {
            target: 100,
            increase_per_interval: 3,
            interval: Duration::from_secs(1),
            duration: Duration::from_millis(2500),
        };
        let started = Instant::now();
        let report = driver.ramp_up(plan, workload.clone()).await;

        assert_eq!(workload.opens_per_second(started), vec![3, 3, 3]);
        assert_eq!(report.opened, 9);
        assert_eq!(workload.peak(), 9);
        assert_eq!(workload.current(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn endless_plan_opens_the_first_step_and_holds() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());
        let plan = RampPlan {
            target: 10,
            increase_per_interval: 2,
            interval: Duration::MAX,
            duration: Duration::MAX,
        };

        let run = driver.ramp_up(plan, workload.clone());
        let outcome = tokio::time::timeout(Duration::from_secs(3), run).await;

        assert!(outcome.is_err());
        assert_eq!(workload.opened(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_opens_do_not_count_toward_target() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::failing_every(2));

        let report = driver.ramp_up(plan(4, 2, 1, 10), workload.clone()).await;

        // Attempts 2, 4 and 6 fail; the fourth tick needs a single open.
        assert_eq!(report.opened, 4);
        assert_eq!(report.failed, 3);
        assert_eq!(workload.attempts(), 7);
        assert_eq!(workload.peak(), 4);
        assert_eq!(workload.closed(), 4);
        assert_eq!(workload.current(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_step_only_waits_out_the_deadline() {
        tokio::time::pause();
        let driver = Driver::default();
        let workload = Arc::new(CountingWorkload::default());

        let report = driver.ramp_up(plan(5, 0, 1, 3), workload.clone()).await;

        assert_eq!(report.opened, 0);
        assert_eq!(report.elapsed.as_secs(), 3);
        assert_eq!(workload.attempts(), 0);
    }
}
