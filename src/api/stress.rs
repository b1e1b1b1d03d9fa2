// src/api/stress.rs
//! Jobs that stress the service's own host: CPU, memory, disk and logs.

use super::{dispatch, non_negative, seconds, AppState};
use crate::driver::Cadence;
use crate::duck::DuckInt;
use crate::logformat::{LogEvent, LogFormat};
use crate::server::ApiError;
use anyhow::{anyhow, Context};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

const CPU_CYCLE: Duration = Duration::from_millis(100);
const LEAK_TICK: Duration = Duration::from_millis(500);
const MIB: usize = 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CpuPayload {
    cpu_percent: DuckInt<1, 101>,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemoryPayload {
    memory_percent: DuckInt<1, 101>,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MemoryLeakPayload {
    leak_size_mb: DuckInt<1, 101>,
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileWritePayload {
    file_size: DuckInt<1024, 1048576>,
    file_count: DuckInt<1, 100>,
    maintain_second: DuckInt<1, 60>,
    interval_second: DuckInt<1, 5>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileReadPayload {
    file_path: String,
    read_frequency: DuckInt<1, 100>,
    maintain_second: DuckInt<1, 60>,
    interval_second: DuckInt<1, 5>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogsPayload {
    log_count_per_interval: DuckInt<1, 100>,
    line_per_log: DuckInt<1, 10>,
    maintain_second: DuckInt<1, 60>,
    interval_seconds: DuckInt<1, 5>,
    #[serde(rename = "async")]
    run_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CrashPayload {
    maintain_second: DuckInt<1, 60>,
    #[serde(rename = "async")]
    run_async: bool,
}

/// Busy-spin for `percent` of every 100 ms cycle.
pub(super) async fn cpu(state: &Arc<AppState>, payload: CpuPayload) -> Result<Value, ApiError> {
    let percent = payload.cpu_percent.resolve()?.clamp(0, 100) as u64;
    let maintain = payload.maintain_second.resolve()?;
    let params = json!({
        "chosen_cpu_percent": percent,
        "maintain_second": non_negative(maintain),
    });

    let busy = CPU_CYCLE.mul_f64(percent as f64 / 100.0);
    let cadence = Cadence::new(seconds(maintain), CPU_CYCLE - busy);
    let driver = state.driver.clone();
    dispatch(state, "cpu", "cpu stress", payload.run_async, params, async move {
        let report = driver.repeat("cpu", cadence, move || burn(busy)).await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

async fn burn(busy: Duration) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        let started = std::time::Instant::now();
        while started.elapsed() < busy {
            std::hint::spin_loop();
        }
    })
    .await?;
    Ok(())
}

fn random_block(bytes: usize) -> anyhow::Result<Vec<u8>> {
    let mut block = Vec::new();
    block
        .try_reserve_exact(bytes)
        .with_context(|| format!("cannot allocate {bytes} bytes"))?;
    block.resize(bytes, 0);
    rand::thread_rng().fill(&mut block[..]);
    Ok(block)
}

fn mebibytes(key: &str, mib: usize) -> Result<usize, ApiError> {
    mib.checked_mul(MIB)
        .ok_or_else(|| ApiError::InvalidPayload(format!("{key} is too large: {mib} MiB")))
}

/// Allocate `memory_percent` MiB of random bytes and hold it.
pub(super) async fn memory(state: &Arc<AppState>, payload: MemoryPayload) -> Result<Value, ApiError> {
    let mib = non_negative(payload.memory_percent.resolve()?) as usize;
    let maintain = payload.maintain_second.resolve()?;
    let params = json!({
        "chosen_memory_percent": mib,
        "maintain_second": non_negative(maintain),
    });
    let bytes = mebibytes("memory_percent", mib)?;

    dispatch(state, "memory", "memory stress", payload.run_async, params, async move {
        let block = tokio::task::spawn_blocking(move || random_block(bytes)).await??;
        tokio::time::sleep(seconds(maintain)).await;
        let allocated = block.len();
        drop(block);
        info!(allocated, "memory stress released its block");
        Ok(json!({ "allocated_bytes": allocated }))
    })
    .await
}

/// Grow a process-wide store every 500 ms until `leak_size_mb` is retained.
/// Nothing is ever freed.
pub(super) async fn memory_leak(
    state: &Arc<AppState>,
    payload: MemoryLeakPayload,
) -> Result<Value, ApiError> {
    let mib = non_negative(payload.leak_size_mb.resolve()?) as usize;
    let maintain = payload.maintain_second.resolve()?;
    let params = json!({
        "chosen_leak_size_mb": mib,
        "maintain_second": non_negative(maintain),
    });

    let cadence = Cadence::new(seconds(maintain), LEAK_TICK);
    let allocations = (cadence.duration.as_millis() / LEAK_TICK.as_millis()).max(1) as usize;
    let chunk = mebibytes("leak_size_mb", mib)? / allocations;
    let leaked = state.leaked.clone();
    let driver = state.driver.clone();

    dispatch(state, "memory_leak", "memory leak simulation", payload.run_async, params, async move {
        let report = driver
            .repeat("memory_leak", cadence, move || {
                let leaked = leaked.clone();
                async move {
                    let block = random_block(chunk)?;
                    leaked
                        .lock()
                        .map_err(|_| anyhow!("leak store is poisoned"))?
                        .push(block);
                    Ok(())
                }
            })
            .await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

/// Write and delete `count` temporary files of `size` random bytes in `dir`.
async fn write_batch(dir: &Path, size: usize, count: u64) -> anyhow::Result<()> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    for i in 0..count {
        let path = dir.join(format!("biggie_write_{stamp}_{i}.tmp"));
        tokio::fs::write(&path, random_block(size)?).await?;
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}

pub(super) async fn file_write(
    state: &Arc<AppState>,
    payload: FileWritePayload,
) -> Result<Value, ApiError> {
    let size = non_negative(payload.file_size.resolve()?);
    let count = non_negative(payload.file_count.resolve()?);
    let maintain = payload.maintain_second.resolve()?;
    let interval = payload.interval_second.resolve()?;
    let params = json!({
        "file_size": size,
        "file_count": count,
        "maintain_second": non_negative(maintain),
        "interval_second": non_negative(interval),
    });

    let cadence = Cadence::new(seconds(maintain), seconds(interval));
    let dir = std::env::temp_dir();
    let driver = state.driver.clone();
    dispatch(state, "file_write", "file write stress", payload.run_async, params, async move {
        let report = driver
            .repeat("file_write", cadence, move || {
                let dir = dir.clone();
                async move { write_batch(&dir, size as usize, count).await }
            })
            .await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

async fn read_batch(path: &Path, times: u64) -> anyhow::Result<()> {
    for _ in 0..times {
        tokio::fs::read(path).await?;
    }
    Ok(())
}

pub(super) async fn file_read(
    state: &Arc<AppState>,
    payload: FileReadPayload,
) -> Result<Value, ApiError> {
    if payload.file_path.trim().is_empty() {
        return Err(ApiError::InvalidPayload("file_path is required".to_string()));
    }
    let frequency = non_negative(payload.read_frequency.resolve()?);
    let maintain = payload.maintain_second.resolve()?;
    let interval = payload.interval_second.resolve()?;
    let params = json!({
        "file_path": payload.file_path,
        "read_frequency": frequency,
        "maintain_second": non_negative(maintain),
        "interval_second": non_negative(interval),
    });

    let cadence = Cadence::new(seconds(maintain), seconds(interval));
    let path = PathBuf::from(payload.file_path);
    let driver = state.driver.clone();
    dispatch(state, "file_read", "file read stress", payload.run_async, params, async move {
        let report = driver
            .repeat("file_read", cadence, move || {
                let path = path.clone();
                async move { read_batch(&path, frequency).await }
            })
            .await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

/// One synthetic message of `lines` made-up requests rendered with `format`.
fn synthetic_message(format: &LogFormat, lines: u64) -> String {
    let mut rng = rand::thread_rng();
    (0..lines)
        .map(|_| format.render(&LogEvent::synthetic(&mut rng, Utc::now())))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(super) async fn logs(state: &Arc<AppState>, payload: LogsPayload) -> Result<Value, ApiError> {
    let count = non_negative(payload.log_count_per_interval.resolve()?);
    let lines = non_negative(payload.line_per_log.resolve()?);
    let maintain = payload.maintain_second.resolve()?;
    let interval = payload.interval_seconds.resolve()?;
    let params = json!({
        "maintain_second": non_negative(maintain),
        "log_count_per_interval": count,
        "line_per_log": lines,
        "interval_seconds": non_negative(interval),
    });

    let cadence = Cadence::new(seconds(maintain), seconds(interval));
    let format = state.log_format.clone();
    let driver = state.driver.clone();
    dispatch(state, "logs", "Logs generation", payload.run_async, params, async move {
        let report = driver
            .repeat("logs", cadence, move || {
                for _ in 0..count {
                    info!(target: "synthetic", "{}", synthetic_message(&format, lines));
                }
                async { Ok(()) }
            })
            .await;
        Ok(serde_json::to_value(report)?)
    })
    .await
}

async fn crash_after(delay: Duration) {
    tokio::time::sleep(delay).await;
    error!("simulated crash: exiting process");
    std::process::exit(1);
}

/// Exit the process with status 1 after `maintain_second`. In sync mode the
/// caller never receives a reply.
pub(super) async fn crash(_state: &Arc<AppState>, payload: CrashPayload) -> Result<Value, ApiError> {
    let maintain = payload.maintain_second.resolve()?;
    let delay = seconds(maintain);
    info!(maintain_second = non_negative(maintain), "crash simulation scheduled");

    if payload.run_async {
        tokio::spawn(crash_after(delay));
        return Ok(json!({
            "message": "crash simulation started",
            "maintain_second": non_negative(maintain),
        }));
    }
    crash_after(delay).await;
    Ok(json!({
        "message": "crash simulation completed",
        "maintain_second": non_negative(maintain),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn state() -> Arc<AppState> {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        Arc::new(AppState::new(settings, LogFormat::parse("{method} {path}"), None).unwrap())
    }

    fn payload<T: serde::de::DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn cpu_echoes_resolved_percent() {
        let body = cpu(
            &state(),
            payload(json!({"cpu_percent": "RANDOM:10:20", "maintain_second": 0})),
        )
        .await
        .unwrap();
        let percent = body["chosen_cpu_percent"].as_u64().unwrap();
        assert!((10..20).contains(&percent));
        assert_eq!(body["message"], "cpu stress completed");
    }

    #[tokio::test]
    async fn bad_range_is_rejected_before_the_job() {
        let state = state();
        let err = cpu(&state, payload(json!({"cpu_percent": "RANDOM:50:10"})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_RANGE");
        assert_eq!(state.jobs.counts(), Default::default());
    }

    #[tokio::test]
    async fn file_batches_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_batch(dir.path(), 2048, 3).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn file_read_requires_a_path() {
        let err = file_read(&state(), payload(json!({"read_frequency": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn file_read_counts_missing_file_as_cycle_errors() {
        let body = file_read(
            &state(),
            payload(json!({
                "file_path": "/nonexistent/biggie.txt",
                "read_frequency": 2,
                "maintain_second": 1,
                "interval_second": 1
            })),
        )
        .await
        .unwrap();
        assert_eq!(body["report"]["cycles"], 1);
        assert_eq!(body["report"]["errors"], 1);
    }

    #[test]
    fn synthetic_messages_have_one_line_per_request() {
        let format = LogFormat::parse("{method} {path} {status_code}");
        let message = synthetic_message(&format, 4);
        assert_eq!(message.lines().count(), 4);
        assert!(!message.contains("ERR"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn logs_job_emits_synthetic_lines() {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        let format = LogFormat::parse("synthetic-line {status_code}");
        let state = Arc::new(AppState::new(settings, format, None).unwrap());
        let body = logs(
            &state,
            payload(json!({
                "log_count_per_interval": 2,
                "line_per_log": 1,
                "maintain_second": 1,
                "interval_seconds": 1
            })),
        )
        .await
        .unwrap();
        assert_eq!(body["message"], "Logs generation completed");
        assert_eq!(body["report"]["cycles"], 1);
        assert!(logs_contain("synthetic-line"));
    }

    #[tokio::test]
    async fn memory_leak_retains_its_blocks() {
        let state = state();
        memory_leak(&state, payload(json!({"leak_size_mb": 1, "maintain_second": 1})))
            .await
            .unwrap();
        let retained: usize = state.leaked.lock().unwrap().iter().map(Vec::len).sum();
        assert_eq!(retained, MIB);
    }

    #[tokio::test]
    async fn oversized_leak_is_rejected_before_the_job() {
        let state = state();
        let err = memory_leak(
            &state,
            payload(json!({"leak_size_mb": 17592186044416_i64, "maintain_second": 1, "async": true})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
        assert_eq!(state.jobs.counts(), Default::default());

        let err = memory(&state, payload(json!({"memory_percent": i64::MAX, "async": true})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
        assert!(state.jobs.list().is_empty());
    }

    #[test]
    fn unallocatable_block_is_an_error() {
        assert!(random_block(usize::MAX).is_err());
        assert_eq!(random_block(16).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn endless_cpu_job_is_accepted() {
        let state = state();
        let body = cpu(
            &state,
            payload(json!({"cpu_percent": 1, "maintain_second": i64::MAX, "async": true})),
        )
        .await
        .unwrap();
        assert_eq!(body["message"], "cpu stress started");
        assert_eq!(body["maintain_second"], i64::MAX);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(state.jobs.counts().running, 1);
    }
}
