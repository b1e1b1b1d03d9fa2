// src/server/middleware.rs
//! Tower layers wrapped around every route: the access log (outermost, so
//! rejected requests are logged too) and the fault interceptors.

use crate::logformat::{LogEvent, LogFormat};
use crate::metrics::{MetricsCollector, Timer};
use crate::server::response::{ApiError, RequestInfo};
use crate::simulation::{FaultKind, SimulationState};
use chrono::Utc;
use futures::future::BoxFuture;
use hyper::body::HttpBody;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{info, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone)]
pub struct AccessLogLayer {
    format: Arc<LogFormat>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AccessLogLayer {
    pub fn new(format: Arc<LogFormat>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { format, metrics }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLog {
            inner,
            format: self.format.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Buffers the request body into a [`RequestInfo`] extension and renders one
/// line per request with the process log format.
#[derive(Clone)]
pub struct AccessLog<S> {
    inner: S,
    format: Arc<LogFormat>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<S> Service<Request<Body>> for AccessLog<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let format = self.format.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            let timer = Timer::new();
            let time = Utc::now();

            let (mut parts, body) = req.into_parts();
            let body = hyper::body::to_bytes(body).await?;
            let info = Arc::new(RequestInfo::from_parts(&parts, body.clone()));
            parts.extensions.insert(info.clone());

            let response = inner.call(Request::from_parts(parts, Body::from(body))).await?;

            let event = LogEvent {
                time,
                status_code: response.status().as_u16(),
                method: info.method.to_string(),
                path: info.path.clone(),
                client_ip: info.client_ip.clone(),
                latency: timer.elapsed(),
                user_agent: info.user_agent.clone(),
                protocol: info.protocol.clone(),
                request_size: info.body.len() as u64,
                response_size: response.body().size_hint().exact().unwrap_or(0),
            };
            info!(target: "access", "{}", format.render(&event));

            if let Some(metrics) = &metrics {
                metrics.record_request(
                    &event.method,
                    event.status_code,
                    event.latency,
                    event.request_size,
                    event.response_size,
                );
            }
            Ok(response)
        })
    }
}

#[derive(Clone)]
pub struct FaultLayer {
    simulation: Arc<SimulationState>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FaultLayer {
    pub fn new(simulation: Arc<SimulationState>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            simulation,
            metrics,
        }
    }
}

impl<S> Layer<S> for FaultLayer {
    type Service = FaultInjection<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FaultInjection {
            inner,
            simulation: self.simulation.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Consults the simulation toggles in the order downtime, latency, packet
/// loss, error injection before the request reaches a route.
#[derive(Clone)]
pub struct FaultInjection<S> {
    inner: S,
    simulation: Arc<SimulationState>,
    metrics: Option<Arc<MetricsCollector>>,
}

async fn intercept(simulation: &SimulationState) -> Option<FaultKind> {
    if simulation.downtime_active() {
        return Some(FaultKind::ServiceDown);
    }
    if let Some(delay) = simulation.latency() {
        tokio::time::sleep(delay).await;
    }
    let mut rng = rand::thread_rng();
    simulation.roll(&mut rng)
}

impl<S> Service<Request<Body>> for FaultInjection<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let simulation = self.simulation.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            if let Some(kind) = intercept(&simulation).await {
                if let Some(metrics) = &metrics {
                    metrics.record_fault(kind.label());
                }
                let info = req
                    .extensions()
                    .get::<Arc<RequestInfo>>()
                    .cloned()
                    .unwrap_or_default();
                warn!(fault = kind.label(), path = %info.path, "request rejected by simulated fault");
                return Ok(ApiError::Fault(kind).into_response(&info));
            }
            inner.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::response::json_response;
    use hyper::StatusCode;
    use std::time::Duration;
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn ok_service() -> BoxCloneService<Request<Body>, Response<Body>, BoxError> {
        BoxCloneService::new(service_fn(|_req: Request<Body>| async {
            Ok::<_, BoxError>(json_response(StatusCode::OK, serde_json::json!({"message": "ok"})))
        }))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn downtime_short_circuits_before_the_route() {
        let simulation = Arc::new(SimulationState::new());
        simulation.set_downtime(Duration::from_secs(5));

        let service = ServiceBuilder::new()
            .layer(FaultLayer::new(simulation, None))
            .service(ok_service());
        let response = service
            .oneshot(Request::get("/simple").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn latency_delays_then_passes_through() {
        tokio::time::pause();
        let simulation = Arc::new(SimulationState::new());
        simulation.set_latency(Duration::from_millis(300), Duration::from_secs(10));

        let service = ServiceBuilder::new()
            .layer(FaultLayer::new(simulation, None))
            .service(ok_service());
        let started = tokio::time::Instant::now();
        let response = service
            .oneshot(Request::get("/simple").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn access_log_renders_one_line_per_request() {
        let format = Arc::new(LogFormat::parse("{method} {path} {status_code}"));
        let simulation = Arc::new(SimulationState::new());
        simulation.set_packet_loss(100, Duration::from_secs(5));

        let service = ServiceBuilder::new()
            .layer(AccessLogLayer::new(format, None))
            .layer(FaultLayer::new(simulation, None))
            .service(ok_service());
        let response = service
            .oneshot(
                Request::post("/stress/cpu")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(logs_contain("POST /stress/cpu 503"));
    }
}
