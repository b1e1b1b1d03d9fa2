// src/api/system.rs
use super::AppState;
use serde_json::{json, Value};

/// Host load, the active fault toggles and job counts.
///
/// CPU usage is measured against the previous call, so the first report
/// after startup reads 0.
pub(super) fn report(state: &AppState) -> Value {
    let (cpu_load, memory_usage) = match state.system.lock() {
        Ok(mut system) => {
            system.refresh_cpu();
            system.refresh_memory();
            let total = system.total_memory();
            let used = system.used_memory();
            let percent = if total == 0 { 0.0 } else { used as f64 * 100.0 / total as f64 };
            (
                json!(system.global_cpu_info().cpu_usage()),
                json!({ "total_bytes": total, "used_bytes": used, "percent": percent }),
            )
        }
        Err(_) => (Value::Null, Value::Null),
    };

    json!({
        "cpu_load": cpu_load,
        "memory_usage": memory_usage,
        "stress_tests": state.simulation.snapshot(),
        "jobs": state.jobs.counts(),
    })
}
