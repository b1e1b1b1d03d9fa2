// src/api/metadata.rs
//! Cloud metadata scraping: EC2 instance metadata (IMDSv2 with a v1
//! fallback), ECS task metadata v2 and the EKS downward-API environment.

use super::AppState;
use crate::server::response::{html_response, requested_at};
use hyper::{Body, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);
const TOKEN_TTL_SECONDS: &str = "21600";
const EKS_KEYS: [&str; 5] = ["POD_NAME", "POD_NAMESPACE", "POD_IP", "NODE_NAME", "REPLICA_SET"];

/// Where the metadata services live. Overridable so tests can point them at
/// a local server.
#[derive(Debug, Clone)]
pub struct MetadataSources {
    pub imds_base: String,
    pub ecs_url: String,
}

impl Default for MetadataSources {
    fn default() -> Self {
        Self {
            imds_base: "http://169.254.169.254".to_string(),
            ecs_url: "http://169.254.170.2/v2/metadata".to_string(),
        }
    }
}

async fn fetch_text(request: reqwest::RequestBuilder) -> Option<String> {
    let response = request.timeout(METADATA_TIMEOUT).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

async fn ec2(state: &AppState) -> Map<String, Value> {
    let client = &state.client;
    let instance_url = format!("{}/latest/meta-data/instance-id", state.metadata.imds_base);
    let mut metadata = Map::new();

    let token = fetch_text(
        client
            .put(format!("{}/latest/api/token", state.metadata.imds_base))
            .header("X-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS),
    )
    .await;
    if let Some(token) = token {
        let id = fetch_text(
            client
                .get(&instance_url)
                .header("X-aws-ec2-metadata-token", token),
        )
        .await;
        if let Some(id) = id {
            metadata.insert("instance_id_v2".to_string(), Value::String(id));
        }
    }

    if let Some(id) = fetch_text(client.get(&instance_url)).await {
        metadata.insert("instance_id_v1".to_string(), Value::String(id));
    }
    metadata
}

async fn ecs(state: &AppState) -> anyhow::Result<Value> {
    let response = state
        .client
        .get(&state.metadata.ecs_url)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

fn eks_from<F: Fn(&str) -> Option<String>>(lookup: F) -> Map<String, Value> {
    EKS_KEYS
        .iter()
        .filter_map(|key| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map(|value| (key.to_string(), Value::String(value)))
        })
        .collect()
}

fn eks() -> Map<String, Value> {
    eks_from(|key| std::env::var(key).ok())
}

pub(super) async fn all(state: &AppState) -> Value {
    let (ec2, ecs) = tokio::join!(ec2(state), ecs(state));
    let eks = eks();
    let eks = if eks.is_empty() {
        json!("not available")
    } else {
        Value::Object(eks)
    };

    json!({
        "ec2": ec2,
        "ecs": ecs.unwrap_or_else(|err| json!(format!("error: {err}"))),
        "eks": eks,
    })
}

/// Task definition revision: the `Revision` field, else the suffix of a
/// `task-definition/<family>:<revision>` ARN.
fn ecs_revision(metadata: &Value) -> Option<String> {
    if let Some(revision) = metadata.get("Revision").and_then(Value::as_str) {
        if !revision.is_empty() {
            return Some(revision.to_string());
        }
    }
    let arn = metadata.get("TaskARN").and_then(Value::as_str)?;
    let (_, resource) = arn.split_once("task-definition/")?;
    let (_, revision) = resource.rsplit_once(':')?;
    (!revision.is_empty()).then(|| revision.to_string())
}

/// `REPLICA_SET`, else the hash suffix of `POD_NAME`.
fn eks_revision(metadata: &Map<String, Value>) -> Option<String> {
    if let Some(replica) = metadata.get("REPLICA_SET").and_then(Value::as_str) {
        return Some(replica.to_string());
    }
    let pod = metadata.get("POD_NAME").and_then(Value::as_str)?;
    let (_, suffix) = pod.rsplit_once('-')?;
    (!suffix.is_empty()).then(|| suffix.to_string())
}

fn revision_to_color(revision: &str) -> String {
    let sum: u32 = revision.chars().map(|c| c as u32).sum();
    format!("#{:06X}", sum % 0xFFFFFF)
}

fn combined_revision(ecs: Option<String>, eks: Option<String>) -> Option<String> {
    match (ecs, eks) {
        (Some(ecs), Some(eks)) => Some(format!("{ecs}-{eks}")),
        (ecs, eks) => ecs.or(eks),
    }
}

pub(super) async fn revision_color(state: &AppState) -> Response<Body> {
    let ecs_revision = match ecs(state).await {
        Ok(metadata) => ecs_revision(&metadata),
        Err(err) => {
            debug!(%err, "ECS metadata unavailable");
            None
        }
    };
    let revision = combined_revision(ecs_revision, eks_revision(&eks()));

    let (color, message) = match revision {
        Some(revision) => (revision_to_color(&revision), format!("Revision: {revision}")),
        None => ("#000000".to_string(), "ECS or EKS metadata unavailable".to_string()),
    };
    let html = format!(
        r#"<html>
<head><title>Revision Color</title></head>
<body style="background-color:{color};">
<h1>Revision Color</h1>
<p>{message}</p>
<p>requested_at: {}</p>
</body>
</html>
"#,
        requested_at()
    );
    html_response(StatusCode::OK, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::logformat::LogFormat;

    fn state(server: &mockito::ServerGuard) -> AppState {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        AppState::new(settings, LogFormat::parse("{path}"), None)
            .unwrap()
            .with_metadata(MetadataSources {
                imds_base: server.url(),
                ecs_url: format!("{}/v2/metadata", server.url()),
            })
    }

    #[test]
    fn revisions_and_colors() {
        let metadata = json!({"TaskARN": "arn:aws:ecs:us-east-1:1234:task-definition/web:42"});
        assert_eq!(ecs_revision(&metadata).as_deref(), Some("42"));
        assert_eq!(ecs_revision(&json!({"Revision": "7"})).as_deref(), Some("7"));
        assert_eq!(ecs_revision(&json!({})), None);

        let pod = eks_from(|key| (key == "POD_NAME").then(|| "web-7f8d4b9b7f".to_string()));
        assert_eq!(eks_revision(&pod).as_deref(), Some("7f8d4b9b7f"));

        assert_eq!(
            combined_revision(Some("42".into()), Some("abc".into())).as_deref(),
            Some("42-abc")
        );
        assert_eq!(combined_revision(None, None), None);
        // '4' + '2' = 52 + 50
        assert_eq!(revision_to_color("42"), "#000066");
    }

    #[tokio::test]
    async fn all_collects_ec2_and_ecs() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("PUT", "/latest/api/token")
            .match_header("x-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECONDS)
            .with_body("tok")
            .create_async()
            .await;
        let _v2 = server
            .mock("GET", "/latest/meta-data/instance-id")
            .match_header("x-aws-ec2-metadata-token", "tok")
            .with_body("i-v2")
            .create_async()
            .await;
        let _v1 = server
            .mock("GET", "/latest/meta-data/instance-id")
            .match_header("x-aws-ec2-metadata-token", mockito::Matcher::Missing)
            .with_body("i-v1")
            .create_async()
            .await;
        let _ecs = server
            .mock("GET", "/v2/metadata")
            .with_header("content-type", "application/json")
            .with_body(r#"{"Cluster": "default"}"#)
            .create_async()
            .await;

        let body = all(&state(&server)).await;
        assert_eq!(body["ec2"]["instance_id_v2"], "i-v2");
        assert_eq!(body["ec2"]["instance_id_v1"], "i-v1");
        assert_eq!(body["ecs"]["Cluster"], "default");
    }

    #[tokio::test]
    async fn ecs_failures_are_reported_inline() {
        let server = mockito::Server::new_async().await;
        let body = all(&state(&server)).await;
        assert!(body["ecs"].as_str().unwrap().starts_with("error: "));
        assert_eq!(body["ec2"], json!({}));
    }
}
