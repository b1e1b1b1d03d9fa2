// src/api/health.rs
//! Liveness probes, the back-end reachability report and the HTTP relay.

use super::AppState;
use crate::backends::BackendKind;
use crate::server::{ApiError, RequestInfo};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn healthcheck() -> Value {
    json!({ "message": "ok" })
}

/// Sleep for `?wait=N` seconds, or a random 1..=5 when it is missing or not
/// a non-negative integer.
pub(super) async fn slow(request: &RequestInfo) -> Value {
    let wait = request
        .query_param("wait")
        .and_then(|text| text.trim().parse::<u64>().ok())
        .unwrap_or_else(|| rand::thread_rng().gen_range(1..=5));
    tokio::time::sleep(Duration::from_secs(wait)).await;
    json!({ "message": "ok", "wait_second": wait })
}

#[derive(Debug)]
struct ProbeResult {
    backend: &'static str,
    status: String,
}

async fn probe(state: Arc<AppState>, kind: BackendKind) -> ProbeResult {
    let status = if !kind.is_configured(&state.settings) {
        "not configured".to_string()
    } else {
        match timeout(PROBE_TIMEOUT, kind.probe(&state.settings)).await {
            Ok(Ok(())) => "ok".to_string(),
            Ok(Err(err)) => format!("failed: {err:#}"),
            Err(_) => "failed: probe timed out".to_string(),
        }
    };
    ProbeResult {
        backend: kind.name(),
        status,
    }
}

/// Probe every back end concurrently, one task each.
pub(super) async fn external(state: &Arc<AppState>) -> Value {
    let mut tasks = Vec::with_capacity(BackendKind::ALL.len());
    for kind in BackendKind::ALL {
        let state = state.clone();
        tasks.push(tokio::spawn(probe(state, kind)));
    }

    let mut report = Map::new();
    let mut failing = 0;
    for (kind, result) in BackendKind::ALL.iter().zip(futures::future::join_all(tasks).await) {
        let status = match result {
            Ok(result) => result.status,
            Err(e) => {
                error!("Probe task join error: {}", e);
                format!("failed: {e}")
            }
        };
        if status.starts_with("failed") {
            failing += 1;
            warn!(backend = kind.name(), %status, "back end unreachable");
        } else {
            debug!(backend = kind.name(), %status, "back end probed");
        }
        report.insert(kind.name().to_string(), Value::String(status));
    }

    info!(failing, "external health check complete");
    Value::Object(report)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayPayload {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    body: String,
}

/// Relay one request and return what came back.
pub(super) async fn hops(state: &Arc<AppState>, payload: RelayPayload) -> Result<Value, ApiError> {
    let method = match payload.method.trim() {
        "" => reqwest::Method::GET,
        name => reqwest::Method::from_str(&name.to_ascii_uppercase())
            .map_err(|err| ApiError::upstream("REQUEST_CREATION_FAILED", err))?,
    };
    let url = reqwest::Url::parse(payload.url.trim())
        .map_err(|err| ApiError::upstream("REQUEST_CREATION_FAILED", err))?;

    let mut request = state.client.request(method, url);
    for (name, value) in &payload.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if !payload.body.is_empty() {
        request = request.body(payload.body);
    }
    let request = request
        .build()
        .map_err(|err| ApiError::upstream("REQUEST_CREATION_FAILED", err))?;

    let response = state
        .client
        .execute(request)
        .await
        .map_err(|err| ApiError::upstream("REQUEST_FAILED", err))?;

    let status = response.status().as_u16();
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in response.headers() {
        headers
            .entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    let body = response
        .text()
        .await
        .map_err(|err| ApiError::upstream("READ_RESPONSE_FAILED", err))?;

    Ok(json!({
        "status_code": status,
        "headers": headers,
        "body": body,
    }))
}
