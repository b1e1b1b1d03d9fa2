// src/api/jobs.rs
use super::AppState;
use crate::server::ApiError;
use serde_json::{json, Value};
use uuid::Uuid;

pub(super) fn list(state: &AppState) -> Value {
    json!({
        "jobs": state.jobs.list(),
        "counts": state.jobs.counts(),
    })
}

pub(super) fn get(state: &AppState, id: &str) -> Result<Value, ApiError> {
    let id = Uuid::parse_str(id).map_err(|_| ApiError::JobNotFound)?;
    let record = state.jobs.get(&id).ok_or(ApiError::JobNotFound)?;
    Ok(serde_json::to_value(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::logformat::LogFormat;

    fn state() -> AppState {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        AppState::new(settings, LogFormat::parse("{path}"), None).unwrap()
    }

    #[test]
    fn known_jobs_are_returned() {
        let state = state();
        let id = state.jobs.start("cpu", true, json!({"cpu_percent": 40}));

        let job = get(&state, &id.to_string()).unwrap();
        assert_eq!(job["name"], "cpu");
        assert_eq!(job["mode"], "async");
        assert_eq!(job["status"]["state"], "running");

        let all = list(&state);
        assert_eq!(all["jobs"].as_array().unwrap().len(), 1);
        assert_eq!(all["counts"]["running"], 1);
    }

    #[test]
    fn unknown_or_malformed_ids_are_not_found() {
        let state = state();
        assert!(matches!(get(&state, "not-a-uuid"), Err(ApiError::JobNotFound)));
        assert!(matches!(
            get(&state, &Uuid::new_v4().to_string()),
            Err(ApiError::JobNotFound)
        ));
    }
}
