// src/jobs/mod.rs
//! In-memory registry of stress jobs, queried by the job endpoints.

use crate::metrics::MetricsCollector;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Finished records kept before the oldest are evicted.
pub const MAX_FINISHED_JOBS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum JobStatus {
    Running,
    Completed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub mode: JobMode,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(skip)]
    finish_seq: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub running: usize,
    pub finished: usize,
}

pub struct JobTracker {
    jobs: DashMap<Uuid, JobRecord>,
    finish_seq: AtomicU64,
    metrics: Option<Arc<MetricsCollector>>,
}

impl JobTracker {
    pub fn new(metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            jobs: DashMap::new(),
            finish_seq: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn start(&self, name: &str, run_async: bool, params: serde_json::Value) -> Uuid {
        let id = Uuid::new_v4();
        let mode = if run_async { JobMode::Async } else { JobMode::Sync };
        self.jobs.insert(
            id,
            JobRecord {
                id,
                name: name.to_string(),
                mode,
                params,
                status: JobStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                report: None,
                finish_seq: None,
            },
        );
        if let Some(metrics) = &self.metrics {
            metrics.job_started(name, run_async);
        }
        tracing::debug!(job = name, %id, ?mode, "job registered");
        id
    }

    pub fn finish(&self, id: Uuid, outcome: &anyhow::Result<serde_json::Value>) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.finished_at = Some(Utc::now());
            record.finish_seq = Some(self.finish_seq.fetch_add(1, Ordering::Relaxed));
            match outcome {
                Ok(report) => {
                    record.status = JobStatus::Completed;
                    record.report = Some(report.clone());
                }
                Err(err) => {
                    record.status = JobStatus::Failed {
                        error: err.to_string(),
                    };
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.job_finished();
        }
        self.evict_finished();
    }

    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id).map(|record| record.value().clone())
    }

    /// Every known job, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.jobs.iter() {
            match record.status {
                JobStatus::Running => counts.running += 1,
                _ => counts.finished += 1,
            }
        }
        counts
    }

    fn evict_finished(&self) {
        let mut finished: Vec<(u64, Uuid)> = self
            .jobs
            .iter()
            .filter_map(|r| r.finish_seq.map(|seq| (seq, r.id)))
            .collect();
        if finished.len() <= MAX_FINISHED_JOBS {
            return;
        }
        finished.sort();
        let excess = finished.len() - MAX_FINISHED_JOBS;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }
}
