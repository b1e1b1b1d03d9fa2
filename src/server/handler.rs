// src/server/handler.rs
use crate::api::{self, AppState};
use crate::server::middleware::BoxError;
use crate::server::response::RequestInfo;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Innermost service: hands the buffered request to the route table.
#[derive(Clone)]
pub struct RequestHandler {
    state: Arc<AppState>,
}

impl RequestHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = BoxError;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            let info = match req.extensions().get::<Arc<RequestInfo>>().cloned() {
                Some(info) => info,
                None => {
                    let (parts, body) = req.into_parts();
                    let body = hyper::body::to_bytes(body).await?;
                    Arc::new(RequestInfo::from_parts(&parts, body))
                }
            };
            Ok(api::route(state, info).await)
        })
    }
}
