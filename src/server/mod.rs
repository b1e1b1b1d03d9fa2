pub mod builder;
pub mod handler;
pub mod middleware;
pub mod response;

pub use builder::ServerBuilder;
pub use handler::RequestHandler;
pub use middleware::{AccessLogLayer, BoxError, FaultLayer};
pub use response::{ApiError, ClientAddr, RequestInfo};

use crate::api::AppState;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use tower::util::BoxCloneService;

/// The full per-request stack: access log, fault interceptors, routes.
pub fn service(state: Arc<AppState>) -> BoxCloneService<Request<Body>, Response<Body>, BoxError> {
    let stack = tower::ServiceBuilder::new()
        .layer(AccessLogLayer::new(state.log_format.clone(), state.metrics.clone()))
        .layer(FaultLayer::new(state.simulation.clone(), state.metrics.clone()))
        .service(RequestHandler::new(state));
    BoxCloneService::new(stack)
}
