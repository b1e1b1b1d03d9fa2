// src/api/flood.rs
//! Outbound request floods: against this service, or a third-party URL.

use super::{dispatch, non_negative, seconds, AppState};
use crate::driver::Cadence;
use crate::duck::DuckInt;
use crate::server::{ApiError, RequestInfo};
use anyhow::bail;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

const FLOOD_TIMEOUT: Duration = Duration::from_secs(5);
const SIMULATED_ERROR_RATIO: f64 = 0.2;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FloodPayload {
    target_endpoint: String,
    request_count: DuckInt<1, 100>,
    attack_intensity: DuckInt<1, 1000>,
    maintain_second: DuckInt<1, 60>,
    interval_second: DuckInt<1, 5>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThirdPartyPayload {
    target_url: String,
    call_rate: DuckInt<1, 100>,
    maintain_second: DuckInt<1, 60>,
    interval_second: DuckInt<1, 5>,
    simulate_errors: bool,
    #[serde(rename = "async")]
    run_async: bool,
}

/// One cycle: `count` concurrent GETs, each on its own task. A cycle fails
/// when any request fails; skipped calls are only logged.
async fn burst(
    client: reqwest::Client,
    url: Arc<str>,
    count: u64,
    simulate_errors: bool,
    job: &'static str,
) -> anyhow::Result<()> {
    let mut tasks = Vec::new();
    for _ in 0..count {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            if simulate_errors && rand::random::<f64>() < SIMULATED_ERROR_RATIO {
                error!(job, "simulated third-party call error");
                return Ok(());
            }
            client.get(url.as_ref()).send().await.map(drop)
        }));
    }

    let mut failed = 0;
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(job, %err, "flood request failed");
                failed += 1;
            }
            Err(err) => {
                error!(job, "Flood task join error: {}", err);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {count} requests failed");
    }
    Ok(())
}

fn flood_client() -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(FLOOD_TIMEOUT)
        .build()
        .map_err(|err| ApiError::Internal(err.into()))
}

/// `http://<host of this request><target>`.
fn self_url(request: &RequestInfo, target: &str) -> Result<String, ApiError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ApiError::InvalidPayload("target_endpoint is required".to_string()));
    }
    if request.host.is_empty() {
        return Err(ApiError::InvalidPayload("request carries no host header".to_string()));
    }
    let separator = if target.starts_with('/') { "" } else { "/" };
    Ok(format!("http://{}{}{}", request.host, separator, target))
}

async fn flood(
    state: &Arc<AppState>,
    job: &'static str,
    label: &str,
    count_key: &str,
    count: i64,
    request: &RequestInfo,
    payload: &FloodPayload,
) -> Result<Value, ApiError> {
    let url: Arc<str> = self_url(request, &payload.target_endpoint)?.into();
    let count = non_negative(count);
    let maintain = payload.maintain_second.resolve()?;
    let interval = payload.interval_second.resolve()?;

    let mut params = json!({
        "target_endpoint": payload.target_endpoint,
        "maintain_second": non_negative(maintain),
        "interval_second": non_negative(interval),
    });
    params[count_key] = json!(count);

    let client = flood_client()?;
    let cadence = Cadence::new(seconds(maintain), seconds(interval));
    let driver = state.driver.clone();
    dispatch(state, job, label, payload.run_async, params, async move {
        let report = driver
            .repeat(job, cadence, move || burst(client.clone(), url.clone(), count, false, job))
            .await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

pub(super) async fn concurrent_flood(
    state: &Arc<AppState>,
    request: &RequestInfo,
    payload: FloodPayload,
) -> Result<Value, ApiError> {
    let count = payload.request_count.resolve()?;
    flood(
        state,
        "concurrent_flood",
        "concurrent flood simulation",
        "request_count",
        count,
        request,
        &payload,
    )
    .await
}

pub(super) async fn ddos(
    state: &Arc<AppState>,
    request: &RequestInfo,
    payload: FloodPayload,
) -> Result<Value, ApiError> {
    let count = payload.attack_intensity.resolve()?;
    flood(
        state,
        "ddos",
        "DDoS attack simulation",
        "attack_intensity",
        count,
        request,
        &payload,
    )
    .await
}

pub(super) async fn third_party(
    state: &Arc<AppState>,
    payload: ThirdPartyPayload,
) -> Result<Value, ApiError> {
    let target = payload.target_url.trim().to_string();
    url::Url::parse(&target)
        .map_err(|err| ApiError::InvalidPayload(format!("invalid target_url: {err}")))?;
    let rate = non_negative(payload.call_rate.resolve()?);
    let maintain = payload.maintain_second.resolve()?;
    let interval = payload.interval_second.resolve()?;
    let params = json!({
        "target_url": target,
        "maintain_second": non_negative(maintain),
        "call_rate": rate,
        "interval_second": non_negative(interval),
        "simulate_errors": payload.simulate_errors,
    });

    let client = flood_client()?;
    let url: Arc<str> = target.into();
    let simulate_errors = payload.simulate_errors;
    let cadence = Cadence::new(seconds(maintain), seconds(interval));
    let driver = state.driver.clone();
    dispatch(
        state,
        "third_party",
        "third-party API call simulation",
        payload.run_async,
        params,
        async move {
            let report = driver
                .repeat("third_party", cadence, move || {
                    burst(client.clone(), url.clone(), rate, simulate_errors, "third_party")
                })
                .await;
            Ok(serde_json::to_value(report)?)
        },
    )
    .await
}
