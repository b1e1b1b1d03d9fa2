// src/server/response.rs
use crate::config::ConfigError;
use crate::duck::DuckError;
use crate::simulation::FaultKind;
use chrono::{SecondsFormat, Utc};
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::http::request::Parts;
use hyper::{Body, Method, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// What the access log, error bodies and echo endpoints need to know about
/// an inbound request. The body is buffered once by the access-log layer.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub host: String,
    pub client_ip: String,
    pub user_agent: String,
    pub protocol: String,
    pub cookies: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query: String::new(),
            host: String::new(),
            client_ip: String::new(),
            user_agent: String::new(),
            protocol: "HTTP/1.1".to_string(),
            cookies: BTreeMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Peer address of the connection a request arrived on.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub std::net::SocketAddr);

impl RequestInfo {
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let header = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let forwarded = header(header::HeaderName::from_static("x-forwarded-for")).and_then(
            |value| {
                value
                    .split(',')
                    .next()
                    .map(|first| first.trim().to_string())
                    .filter(|first| !first.is_empty())
            },
        );
        let client_ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ClientAddr>()
                    .map(|addr| addr.0.ip().to_string())
            })
            .unwrap_or_default();

        let cookies = header(header::COOKIE)
            .map(|raw| {
                raw.split(';')
                    .filter_map(|pair| {
                        let (name, value) = pair.split_once('=')?;
                        Some((name.trim().to_string(), value.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            host: header(header::HOST)
                .or_else(|| parts.uri.authority().map(|a| a.to_string()))
                .unwrap_or_default(),
            client_ip,
            user_agent: header(header::USER_AGENT).unwrap_or_default(),
            protocol: format!("{:?}", parts.version),
            cookies,
            body,
        }
    }

    /// Query parameters grouped by name, in arrival order.
    pub fn query_params(&self) -> BTreeMap<String, Vec<String>> {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url::form_urlencoded::parse(self.query.as_bytes()) {
            params
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        params
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// The `request` object echoed in error bodies and by `/simple/foo`.
    pub fn details(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "ip": self.client_ip,
            "query": self.query_params(),
            "cookies": self.cookies,
            "body": {
                "length": self.body.len(),
                "payload": String::from_utf8_lossy(&self.body),
            },
        })
    }
}

pub fn requested_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// JSON body stamped with `requested_at`. Non-object values are wrapped in
/// `{"data": ...}`.
pub fn json_response(status: StatusCode, value: Value) -> Response<Body> {
    let mut object = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    object.insert("requested_at".to_string(), Value::String(requested_at()));

    let body = serde_json::to_vec(&Value::Object(object)).unwrap_or_default();
    with_content_type(status, Body::from(body), "application/json")
}

pub fn html_response(status: StatusCode, html: String) -> Response<Body> {
    with_content_type(status, Body::from(html), "text/html; charset=utf-8")
}

pub fn text_response(status: StatusCode, body: impl Into<Body>, content_type: &'static str) -> Response<Body> {
    with_content_type(status, body.into(), content_type)
}

fn with_content_type(status: StatusCode, body: Body, content_type: &'static str) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{message}")]
    Upstream { code: &'static str, message: String },

    #[error("route not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("job not found")]
    JobNotFound,

    #[error("{}", fault_message(*.0))]
    Fault(FaultKind),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn fault_message(kind: FaultKind) -> &'static str {
    match kind {
        FaultKind::ServiceDown => "service is temporarily unavailable",
        FaultKind::PacketLoss => "simulated packet loss, request dropped",
        FaultKind::RandomError => "simulated random error injection",
    }
}

impl From<DuckError> for ApiError {
    fn from(err: DuckError) -> Self {
        if err.is_range_error() {
            ApiError::InvalidRange(err.to_string())
        } else {
            ApiError::InvalidPayload(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidPayload(err.to_string())
    }
}

impl ApiError {
    pub fn upstream(code: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Upstream {
            code,
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) | ApiError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::JobNotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Fault(FaultKind::ServiceDown) | ApiError::Fault(FaultKind::PacketLoss) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Fault(FaultKind::RandomError)
            | ApiError::Config(_)
            | ApiError::Upstream { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::InvalidRange(_) => "INVALID_RANGE",
            ApiError::Config(_) => "CONFIG_ERROR",
            ApiError::Upstream { code, .. } => code,
            ApiError::NotFound => "NOT_FOUND",
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::JobNotFound => "JOB_NOT_FOUND",
            ApiError::Fault(FaultKind::ServiceDown) => "SERVICE_DOWN",
            ApiError::Fault(FaultKind::PacketLoss) => "PACKET_LOSS",
            ApiError::Fault(FaultKind::RandomError) => "RANDOM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn into_response(&self, request: &RequestInfo) -> Response<Body> {
        json_response(
            self.status(),
            json!({
                "error": self.code(),
                "message": self.to_string(),
                "request": request.details(),
            }),
        )
    }
}
