// src/api/backend.rs
//! `/<backend>/{heavy,multi_heavy,connection}`: the three driver shapes
//! applied to SQL engines, Redis and Kafka.

use super::{dispatch, non_negative, seconds, AppState};
use crate::backends::{lorem_ipsum, BackendKind, KafkaWorkload, RedisWorkload, SqlWorkload};
use crate::driver::{Cadence, RampPlan, Workload};
use crate::duck::DuckInt;
use crate::server::ApiError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendOp {
    #[default]
    Heavy,
    MultiHeavy,
    Connection,
}

impl BackendOp {
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "heavy" => Some(BackendOp::Heavy),
            "multi_heavy" => Some(BackendOp::MultiHeavy),
            "connection" => Some(BackendOp::Connection),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendOp::Heavy => "heavy",
            BackendOp::MultiHeavy => "multi_heavy",
            BackendOp::Connection => "connection",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackendPayload {
    pub reads: bool,
    pub writes: bool,
    pub messages: String,
    pub maintain_second: DuckInt<1, 60>,
    pub interval_second: DuckInt<1, 5>,
    pub query_per_interval: DuckInt<1, 100>,
    pub produce_per_interval: DuckInt<1, 100>,
    pub connection_counts: DuckInt<1, 50>,
    pub increase_per_interval: DuckInt<1, 10>,
    #[serde(rename = "async")]
    pub run_async: bool,
}

/// Resolved knobs of one back-end job. Only the fields the operation uses
/// are resolved; the rest stay zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendJob {
    pub op: BackendOp,
    pub maintain_second: u64,
    pub interval_second: u64,
    pub per_interval: u64,
    pub connection_counts: u64,
    pub increase_per_interval: u64,
    pub run_async: bool,
}

impl BackendJob {
    pub fn resolve(op: BackendOp, payload: &BackendPayload, kind: BackendKind) -> Result<Self, ApiError> {
        let mut job = BackendJob {
            op,
            maintain_second: non_negative(payload.maintain_second.resolve()?),
            interval_second: non_negative(payload.interval_second.resolve()?),
            run_async: payload.run_async,
            ..BackendJob::default()
        };
        match op {
            BackendOp::Heavy | BackendOp::MultiHeavy => {
                let per_interval = match kind {
                    BackendKind::Kafka => payload.produce_per_interval.resolve()?,
                    _ => payload.query_per_interval.resolve()?,
                };
                job.per_interval = non_negative(per_interval);
                if op == BackendOp::MultiHeavy {
                    job.connection_counts = non_negative(payload.connection_counts.resolve()?);
                }
            }
            BackendOp::Connection => {
                job.connection_counts = non_negative(payload.connection_counts.resolve()?);
                job.increase_per_interval = non_negative(payload.increase_per_interval.resolve()?);
            }
        }
        Ok(job)
    }

    fn cadence(&self) -> Cadence {
        Cadence::from_secs(self.maintain_second, self.interval_second)
    }

    /// Parameters echoed in the reply and recorded with the job.
    pub fn params(&self, kind: BackendKind) -> Value {
        let per_interval_key = match kind {
            BackendKind::Kafka => "produce_per_interval",
            _ => "query_per_interval",
        };
        let mut params = json!({
            "maintain_second": self.maintain_second,
            "interval_second": self.interval_second,
        });
        match self.op {
            BackendOp::Heavy => {
                params[per_interval_key] = json!(self.per_interval);
            }
            BackendOp::MultiHeavy => {
                params[per_interval_key] = json!(self.per_interval);
                params["connection_counts"] = json!(self.connection_counts);
            }
            BackendOp::Connection => {
                params["connection_counts"] = json!(self.connection_counts);
                params["increase_per_interval"] = json!(self.increase_per_interval);
            }
        }
        params
    }

    fn label(&self, kind: BackendKind) -> String {
        let display = kind.display_name();
        match (self.op, kind) {
            (BackendOp::Heavy, BackendKind::Kafka) => "Kafka heavy produce".to_string(),
            (BackendOp::MultiHeavy, BackendKind::Kafka) => "Kafka multi heavy produce".to_string(),
            (BackendOp::Heavy, _) => format!("{display} heavy query (single connection)"),
            (BackendOp::MultiHeavy, _) => format!("{display} multi heavy query"),
            (BackendOp::Connection, _) => format!("{display} connection stress"),
        }
    }
}

pub(super) async fn handle(
    state: &Arc<AppState>,
    kind: BackendKind,
    op: BackendOp,
    payload: BackendPayload,
) -> Result<Value, ApiError> {
    let job = BackendJob::resolve(op, &payload, kind)?;
    let settings = &state.settings;
    match kind {
        BackendKind::Sql(engine) => {
            let workload = SqlWorkload::new(
                settings.sql(engine)?,
                payload.reads,
                payload.writes,
                job.per_interval,
            );
            launch(state, kind, job, Arc::new(workload)).await
        }
        BackendKind::Redis => {
            let workload =
                RedisWorkload::new(settings.redis()?, payload.reads, payload.writes, job.per_interval);
            launch(state, kind, job, Arc::new(workload)).await
        }
        BackendKind::Kafka => {
            let message = match payload.messages.trim() {
                "" => lorem_ipsum(&mut rand::thread_rng()),
                text => text.to_string(),
            };
            let keyed_by_worker = op == BackendOp::MultiHeavy;
            let workload = KafkaWorkload::new(settings.kafka()?, message, job.per_interval, keyed_by_worker);
            launch(state, kind, job, Arc::new(workload)).await
        }
    }
}

/// Run `workload` in the shape the job's operation names, registered under
/// `<kind>_<op>`.
pub async fn launch<W: Workload>(
    state: &Arc<AppState>,
    kind: BackendKind,
    job: BackendJob,
    workload: Arc<W>,
) -> Result<Value, ApiError> {
    let name = format!("{}_{}", kind.name(), job.op.name());
    let label = job.label(kind);
    let params = job.params(kind);
    let driver = state.driver.clone();

    match job.op {
        BackendOp::Heavy => {
            let resource = driver.connect(workload.as_ref()).await.map_err(|err| {
                ApiError::upstream(
                    kind.error_code(),
                    format!("failed to connect to {}: {err}", kind.display_name()),
                )
            })?;
            let cadence = job.cadence();
            dispatch(state, &name, &label, job.run_async, params, async move {
                let report = driver.drive(cadence, workload.as_ref(), resource).await;
                Ok(serde_json::to_value(report)?)
            })
            .await
        }
        BackendOp::MultiHeavy => {
            let cadence = job.cadence();
            let workers = job.connection_counts as usize;
            dispatch(state, &name, &label, job.run_async, params, async move {
                let report = driver.fan_out(cadence, workload, workers).await;
                Ok(serde_json::to_value(report)?)
            })
            .await
        }
        BackendOp::Connection => {
            let plan = RampPlan {
                target: job.connection_counts as usize,
                increase_per_interval: job.increase_per_interval as usize,
                interval: seconds(job.interval_second as i64),
                duration: seconds(job.maintain_second as i64),
            };
            dispatch(state, &name, &label, job.run_async, params, async move {
                let report = driver.ramp_up(plan, workload).await;
                Ok(serde_json::to_value(report)?)
            })
            .await
        }
    }
}
