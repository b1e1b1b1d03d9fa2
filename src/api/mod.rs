// src/api/mod.rs
//! Route table and the request handlers behind it.

pub mod backend;
mod flood;
mod health;
mod jobs;
mod metadata;
mod network;
mod simple;
mod stress;
mod system;

use crate::backends::BackendKind;
use crate::config::Settings;
use crate::driver::Driver;
use crate::jobs::JobTracker;
use crate::logformat::LogFormat;
use crate::metrics::MetricsCollector;
use crate::server::response::{json_response, ApiError, RequestInfo};
use crate::simulation::SimulationState;
use anyhow::Result;
use backend::BackendOp;
use hyper::{Body, Method, Response, StatusCode};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, warn};

pub use metadata::MetadataSources;

/// Everything a handler may touch, shared by every connection.
pub struct AppState {
    pub settings: Settings,
    pub log_format: Arc<LogFormat>,
    pub simulation: Arc<SimulationState>,
    pub jobs: Arc<JobTracker>,
    pub metrics: Option<Arc<MetricsCollector>>,
    pub driver: Driver,
    pub client: reqwest::Client,
    pub metadata: MetadataSources,
    /// Blocks retained by the memory leak job for the life of the process.
    leaked: Arc<Mutex<Vec<Vec<u8>>>>,
    default_color: String,
    system: Mutex<sysinfo::System>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        log_format: LogFormat,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let default_color = format!("#{:06X}", rand::thread_rng().gen_range(0..=0xFFFFFFu32));

        Ok(Self {
            settings,
            log_format: Arc::new(log_format),
            simulation: Arc::new(SimulationState::new()),
            jobs: Arc::new(JobTracker::new(metrics.clone())),
            driver: Driver::new(metrics.clone()),
            metrics,
            client,
            metadata: MetadataSources::default(),
            leaked: Arc::new(Mutex::new(Vec::new())),
            default_color,
            system: Mutex::new(sysinfo::System::new()),
        })
    }

    pub fn with_metadata(mut self, metadata: MetadataSources) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Cpu,
    Memory,
    MemoryLeak,
    FileWrite,
    FileRead,
    Logs,
    Latency,
    PacketLoss,
    ErrorInjection,
    Downtime,
    Crash,
    ConcurrentFlood,
    Ddos,
    ThirdParty,
    Backend(BackendKind, BackendOp),
    Jobs,
    Job(String),
    Health,
    HealthSlow,
    HealthExternal,
    HealthHops,
    Simple,
    SimpleFoo,
    SimpleBar,
    SimpleColor,
    SimpleLarge,
    MetadataAll,
    RevisionColor,
    SystemMetrics,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Result<Route, ApiError> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let (allowed, route) = match path {
            "/stress/cpu" => (Method::POST, Route::Cpu),
            "/stress/memory" => (Method::POST, Route::Memory),
            "/stress/memory_leak" => (Method::POST, Route::MemoryLeak),
            "/stress/filesystem/write" => (Method::POST, Route::FileWrite),
            "/stress/filesystem/read" => (Method::POST, Route::FileRead),
            "/stress/logs" => (Method::POST, Route::Logs),
            "/stress/network/latency" => (Method::POST, Route::Latency),
            "/stress/network/packet_loss" => (Method::POST, Route::PacketLoss),
            "/stress/error_injection" => (Method::POST, Route::ErrorInjection),
            "/stress/downtime" => (Method::POST, Route::Downtime),
            "/stress/crash" => (Method::POST, Route::Crash),
            "/stress/concurrent_flood" => (Method::POST, Route::ConcurrentFlood),
            "/stress/ddos" => (Method::POST, Route::Ddos),
            "/stress/third_party" => (Method::POST, Route::ThirdParty),
            "/stress/jobs" => (Method::GET, Route::Jobs),
            "/healthcheck" => (Method::GET, Route::Health),
            "/healthcheck/slow" => (Method::GET, Route::HealthSlow),
            "/healthcheck/external" => (Method::GET, Route::HealthExternal),
            "/healthcheck/hops" => (Method::POST, Route::HealthHops),
            "/simple" => (Method::GET, Route::Simple),
            "/simple/foo" => (Method::GET, Route::SimpleFoo),
            "/simple/bar" => (Method::POST, Route::SimpleBar),
            "/simple/color" => (Method::GET, Route::SimpleColor),
            "/simple/large" => (Method::GET, Route::SimpleLarge),
            "/metadata/all" => (Method::GET, Route::MetadataAll),
            "/metadata/revision_color" => (Method::GET, Route::RevisionColor),
            "/metrics/system" => (Method::GET, Route::SystemMetrics),
            _ => Self::resolve_nested(path)?,
        };

        if method != allowed {
            return Err(ApiError::MethodNotAllowed);
        }
        Ok(route)
    }

    fn resolve_nested(path: &str) -> Result<(Method, Route), ApiError> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["stress", "jobs", id] => Ok((Method::GET, Route::Job(id.to_string()))),
            [kind, op] => {
                let kind = BackendKind::parse(kind).ok_or(ApiError::NotFound)?;
                let op = BackendOp::parse(op).ok_or(ApiError::NotFound)?;
                Ok((Method::POST, Route::Backend(kind, op)))
            }
            _ => Err(ApiError::NotFound),
        }
    }
}

/// Resolve and run the route for one request. Handler errors become JSON
/// error bodies here.
pub async fn route(state: Arc<AppState>, request: Arc<RequestInfo>) -> Response<Body> {
    match handle(&state, &request).await {
        Ok(response) => response,
        Err(err) => {
            if err.status().is_server_error() {
                error!(path = %request.path, code = err.code(), %err, "request failed");
            } else {
                warn!(path = %request.path, code = err.code(), %err, "request rejected");
            }
            err.into_response(&request)
        }
    }
}

async fn handle(state: &Arc<AppState>, request: &RequestInfo) -> Result<Response<Body>, ApiError> {
    let route = Route::resolve(&request.method, &request.path)?;
    match route {
        Route::Cpu => ok(stress::cpu(state, parse(request)?).await?),
        Route::Memory => ok(stress::memory(state, parse(request)?).await?),
        Route::MemoryLeak => ok(stress::memory_leak(state, parse(request)?).await?),
        Route::FileWrite => ok(stress::file_write(state, parse(request)?).await?),
        Route::FileRead => ok(stress::file_read(state, parse(request)?).await?),
        Route::Logs => ok(stress::logs(state, parse(request)?).await?),
        Route::Crash => ok(stress::crash(state, parse(request)?).await?),
        Route::Latency => ok(network::latency(state, parse(request)?).await?),
        Route::PacketLoss => ok(network::packet_loss(state, parse(request)?).await?),
        Route::ErrorInjection => ok(network::error_injection(state, parse(request)?).await?),
        Route::Downtime => ok(network::downtime(state, parse(request)?).await?),
        Route::ConcurrentFlood => ok(flood::concurrent_flood(state, request, parse(request)?).await?),
        Route::Ddos => ok(flood::ddos(state, request, parse(request)?).await?),
        Route::ThirdParty => ok(flood::third_party(state, parse(request)?).await?),
        Route::Backend(kind, op) => ok(backend::handle(state, kind, op, parse(request)?).await?),
        Route::Jobs => ok(jobs::list(state)),
        Route::Job(id) => ok(jobs::get(state, &id)?),
        Route::Health => ok(health::healthcheck()),
        Route::HealthSlow => ok(health::slow(request).await),
        Route::HealthExternal => ok(health::external(state).await),
        Route::HealthHops => ok(health::hops(state, parse(request)?).await?),
        Route::Simple => ok(simple::simple()),
        Route::SimpleFoo => ok(simple::foo(request)),
        Route::SimpleBar => ok(simple::bar(request)),
        Route::SimpleColor => Ok(simple::color(state, request)),
        Route::SimpleLarge => ok(simple::large(request)?),
        Route::MetadataAll => ok(metadata::all(state).await),
        Route::RevisionColor => Ok(metadata::revision_color(state).await),
        Route::SystemMetrics => ok(system::report(state)),
    }
}

fn ok(value: Value) -> Result<Response<Body>, ApiError> {
    Ok(json_response(StatusCode::OK, value))
}

/// Decode a JSON body. An empty body decodes as the payload's defaults.
fn parse<T: DeserializeOwned + Default>(request: &RequestInfo) -> Result<T, ApiError> {
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&request.body)?)
}

/// Resolved counts and durations: negative values count as zero.
fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

fn seconds(value: i64) -> Duration {
    Duration::from_secs(non_negative(value))
}

/// Register a job, then run it inline (sync) or detached (async). The reply
/// echoes `params` under a `"<label> started|completed"` message.
async fn dispatch<F>(
    state: &AppState,
    job: &str,
    label: &str,
    run_async: bool,
    params: Value,
    work: F,
) -> Result<Value, ApiError>
where
    F: Future<Output = Result<Value>> + Send + 'static,
{
    let id = state.jobs.start(job, run_async, params.clone());
    let mut body = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("job_id".to_string(), Value::String(id.to_string()));

    if run_async {
        let jobs = state.jobs.clone();
        let job = job.to_string();
        tokio::spawn(async move {
            let outcome = work.await;
            if let Err(err) = &outcome {
                warn!(job = %job, %id, %err, "background job failed");
            }
            jobs.finish(id, &outcome);
        });
        body.insert("message".to_string(), Value::String(format!("{label} started")));
    } else {
        let outcome = work.await;
        state.jobs.finish(id, &outcome);
        let report = outcome?;
        body.insert("message".to_string(), Value::String(format!("{label} completed")));
        if !report.is_null() {
            body.insert("report".to_string(), report);
        }
    }
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> Arc<AppState> {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        Arc::new(AppState::new(settings, LogFormat::parse("{method}"), None).unwrap())
    }

    #[test]
    fn routes_resolve_with_methods() {
        assert_eq!(Route::resolve(&Method::POST, "/stress/cpu").unwrap(), Route::Cpu);
        assert_eq!(Route::resolve(&Method::GET, "/simple/").unwrap(), Route::Simple);
        assert_eq!(
            Route::resolve(&Method::POST, "/redshift/connection").unwrap(),
            Route::Backend(
                BackendKind::Sql(crate::config::SqlEngine::Redshift),
                BackendOp::Connection
            )
        );
        assert_eq!(
            Route::resolve(&Method::GET, "/stress/jobs/abc").unwrap(),
            Route::Job("abc".into())
        );
        assert!(matches!(
            Route::resolve(&Method::GET, "/stress/cpu"),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            Route::resolve(&Method::POST, "/mongo/heavy"),
            Err(ApiError::NotFound)
        ));
        assert!(matches!(Route::resolve(&Method::GET, "/a/b/c"), Err(ApiError::NotFound)));
    }

    #[test]
    fn empty_body_decodes_as_defaults() {
        #[derive(Debug, Default, serde::Deserialize)]
        struct Payload {
            #[serde(default)]
            flag: bool,
        }
        let request = RequestInfo::default();
        let payload: Payload = parse(&request).unwrap();
        assert!(!payload.flag);

        let request = RequestInfo {
            body: hyper::body::Bytes::from_static(b"{not json"),
            ..RequestInfo::default()
        };
        assert!(matches!(parse::<Payload>(&request), Err(ApiError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn sync_dispatch_completes_and_records_the_job() {
        let state = state();
        let body = dispatch(&state, "noop", "noop job", false, json!({"n": 1}), async {
            Ok(json!({"cycles": 1}))
        })
        .await
        .unwrap();

        assert_eq!(body["message"], "noop job completed");
        assert_eq!(body["n"], 1);
        assert_eq!(body["report"]["cycles"], 1);
        assert_eq!(state.jobs.counts().finished, 1);
    }

    #[tokio::test]
    async fn async_dispatch_acknowledges_immediately() {
        let state = state();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let body = dispatch(&state, "noop", "noop job", true, json!({}), async move {
            let _ = wait.await;
            Ok(Value::Null)
        })
        .await
        .unwrap();

        assert_eq!(body["message"], "noop job started");
        assert!(body["job_id"].is_string());
        assert_eq!(state.jobs.counts().running, 1);
        let _ = release.send(());
    }

    #[tokio::test]
    async fn sync_failure_surfaces_as_internal_error() {
        let state = state();
        let err = dispatch(&state, "noop", "noop job", false, json!({}), async {
            Err(anyhow::anyhow!("disk full"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
