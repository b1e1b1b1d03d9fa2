// src/api/network.rs
//! Control endpoints that arm the fault toggles read by the interceptors.
//! In sync mode the reply is held back until the toggle lapses.

use super::{dispatch, non_negative, seconds, AppState};
use crate::duck::{DuckFloat, DuckInt};
use crate::server::ApiError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LatencyPayload {
    latency_ms: DuckInt<100, 1000>,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PacketLossPayload {
    loss_percentage: DuckInt<1, 101>,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorInjectionPayload {
    error_rate: DuckFloat,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DowntimePayload {
    downtime_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

async fn hold_flag(
    state: &Arc<AppState>,
    job: &str,
    label: &str,
    run_async: bool,
    lifetime: Duration,
    params: Value,
) -> Result<Value, ApiError> {
    dispatch(state, job, label, run_async, params, async move {
        tokio::time::sleep(lifetime).await;
        Ok(Value::Null)
    })
    .await
}

pub(super) async fn latency(state: &Arc<AppState>, payload: LatencyPayload) -> Result<Value, ApiError> {
    let delay = non_negative(payload.latency_ms.resolve()?);
    let maintain = payload.maintain_second.resolve()?;
    let lifetime = seconds(maintain);
    state.simulation.set_latency(Duration::from_millis(delay), lifetime);

    let params = json!({ "latency_ms": delay, "maintain_second": non_negative(maintain) });
    hold_flag(state, "network_latency", "network latency simulation", payload.run_async, lifetime, params).await
}

pub(super) async fn packet_loss(
    state: &Arc<AppState>,
    payload: PacketLossPayload,
) -> Result<Value, ApiError> {
    let percent = payload.loss_percentage.resolve()?.clamp(0, 100) as u32;
    let maintain = payload.maintain_second.resolve()?;
    let lifetime = seconds(maintain);
    state.simulation.set_packet_loss(percent, lifetime);

    let params = json!({ "loss_percentage": percent, "maintain_second": non_negative(maintain) });
    hold_flag(state, "packet_loss", "packet loss simulation", payload.run_async, lifetime, params).await
}

pub(super) async fn error_injection(
    state: &Arc<AppState>,
    payload: ErrorInjectionPayload,
) -> Result<Value, ApiError> {
    let rate = payload.error_rate.resolve()?.clamp(0.0, 1.0);
    let maintain = payload.maintain_second.resolve()?;
    let lifetime = seconds(maintain);
    state.simulation.set_error_rate(rate, lifetime);

    let params = json!({ "error_rate": rate, "maintain_second": non_negative(maintain) });
    hold_flag(state, "error_injection", "error injection", payload.run_async, lifetime, params).await
}

pub(super) async fn downtime(state: &Arc<AppState>, payload: DowntimePayload) -> Result<Value, ApiError> {
    let downtime = payload.downtime_second.resolve()?;
    let lifetime = seconds(downtime);
    state.simulation.set_downtime(lifetime);

    let params = json!({ "downtime_second": non_negative(downtime) });
    hold_flag(state, "downtime", "downtime simulation", payload.run_async, lifetime, params).await
}
