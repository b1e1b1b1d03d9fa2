// src/logformat/event.rs
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

const STATUS_CODES: &[u16] = &[200, 201, 204, 301, 400, 401, 404, 500, 502, 503];
const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];
const PATHS: &[&str] = &[
    "/api/random",
    "/api/orders",
    "/api/users",
    "/test",
    "/stress",
    "/metrics",
    "/healthcheck",
];
const CLIENT_IPS: &[&str] = &[
    "192.168.1.1",
    "10.0.0.5",
    "172.16.0.3",
    "10.42.0.12",
    "10.44.0.22",
];
const USER_AGENTS: &[&str] = &[
    "curl/8.4.0",
    "Mozilla/5.0 (X11; Linux x86_64)",
    "python-requests/2.31.0",
    "Go-http-client/1.1",
];
const PROTOCOLS: &[&str] = &["HTTP/1.0", "HTTP/1.1", "HTTP/2.0"];

/// Everything a log line can refer to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEvent {
    pub time: DateTime<Utc>,
    pub status_code: u16,
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub latency: Duration,
    pub user_agent: String,
    pub protocol: String,
    pub request_size: u64,
    pub response_size: u64,
}

impl LogEvent {
    /// A plausible but made-up request, used by the synthetic log generator.
    pub fn synthetic<R: Rng + ?Sized>(rng: &mut R, time: DateTime<Utc>) -> Self {
        Self {
            time,
            status_code: *STATUS_CODES.choose(rng).unwrap_or(&200),
            method: pick(rng, METHODS),
            path: pick(rng, PATHS),
            client_ip: pick(rng, CLIENT_IPS),
            latency: Duration::from_micros(rng.gen_range(100..500_000)),
            user_agent: pick(rng, USER_AGENTS),
            protocol: pick(rng, PROTOCOLS),
            request_size: rng.gen_range(0..16_384),
            response_size: rng.gen_range(64..2_000_000),
        }
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}
