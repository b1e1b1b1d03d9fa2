// src/api/simple.rs
//! Echo endpoints used as cheap targets for floods and probes.

use super::AppState;
use crate::server::response::{html_response, requested_at};
use crate::server::{ApiError, RequestInfo};
use hyper::{Body, Response, StatusCode};
use rand::Rng;
use serde_json::{json, Value};

const DEFAULT_SENTENCE: &str = "This is a sample sentence.";
const DEFAULT_REPEAT: usize = 10;
const MAX_LARGE_BYTES: usize = 256 * 1024 * 1024;

pub(super) fn simple() -> Value {
    json!({ "message": "ok" })
}

pub(super) fn foo(request: &RequestInfo) -> Value {
    let mut details = request.details();
    details["message"] = json!("foo ok");
    details
}

/// Like `foo`, with the body decoded as JSON (`null` when it is not JSON).
pub(super) fn bar(request: &RequestInfo) -> Value {
    let payload: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let mut details = request.details();
    details["body"] = json!({ "payload": payload });
    details["message"] = json!("bar ok");
    details
}

/// A bare `RANDOM` becomes `randomValue-<n>`; anything else is kept.
fn random_token(text: &str) -> String {
    if text.trim() == "RANDOM" {
        format!("randomValue-{}", rand::thread_rng().gen_range(0..1000))
    } else {
        text.to_string()
    }
}

fn random_color() -> String {
    format!("#{:06X}", rand::thread_rng().gen_range(0..=0xFFFFFFu32))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// The page colour: `?color=` (where `RANDOM` draws a colour), else
/// `RANDOM_HTML_API_COLOR`, else the colour picked at startup.
fn pick_color(state: &AppState, request: &RequestInfo) -> String {
    match request.query_param("color").filter(|c| !c.trim().is_empty()) {
        Some(color) if color.trim() == "RANDOM" => random_color(),
        Some(color) => color,
        None => state
            .settings
            .html_color()
            .unwrap_or_else(|| state.default_color.clone()),
    }
}

pub(super) fn color(state: &AppState, request: &RequestInfo) -> Response<Body> {
    let color = pick_color(state, request);

    let mut paragraphs = String::new();
    if let Value::Object(details) = request.details() {
        for (key, value) in details {
            paragraphs.push_str(&format!("<p>{}: {}</p>", escape(&key), escape(&value.to_string())));
        }
    }

    let html = format!(
        r#"<html>
<head><title>Random Color API</title></head>
<body style="background-color:{};">
<h1>Color API</h1>
{}
<p>requested_at: {}</p>
</body>
</html>
"#,
        escape(&color),
        paragraphs,
        requested_at()
    );
    html_response(StatusCode::OK, html)
}

/// `?sentence=` repeated `?length=` times, space separated.
pub(super) fn large(request: &RequestInfo) -> Result<Value, ApiError> {
    let length = request
        .query_param("length")
        .and_then(|text| text.trim().parse::<i64>().ok())
        .filter(|length| *length > 0)
        .map(|length| length as usize)
        .unwrap_or(DEFAULT_REPEAT);
    let sentence = request
        .query_param("sentence")
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| random_token(&sentence))
        .unwrap_or_else(|| DEFAULT_SENTENCE.to_string());

    let fits = (sentence.len() + 1)
        .checked_mul(length)
        .is_some_and(|bytes| bytes <= MAX_LARGE_BYTES);
    if !fits {
        return Err(ApiError::InvalidPayload(format!(
            "length {length} exceeds {MAX_LARGE_BYTES} bytes of text"
        )));
    }
    Ok(json!({ "large_text": vec![sentence.as_str(); length].join(" ") }))
}
