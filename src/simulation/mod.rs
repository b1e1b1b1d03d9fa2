// src/simulation/mod.rs
//! Process-wide fault toggles consulted by the request interceptors.
//!
//! Each toggle is armed by its control endpoint with a value and a lifetime
//! and lapses on its own once the lifetime has passed. Reads are lock-free.

use crate::driver::deadline_after;
use arc_swap::ArcSwapOption;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ServiceDown,
    PacketLoss,
    RandomError,
}

impl FaultKind {
    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::ServiceDown => "downtime",
            FaultKind::PacketLoss => "packet_loss",
            FaultKind::RandomError => "error_injection",
        }
    }
}

#[derive(Debug)]
struct Fault<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct SimulationState {
    latency: ArcSwapOption<Fault<Duration>>,
    packet_loss: ArcSwapOption<Fault<u32>>,
    error_rate: ArcSwapOption<Fault<f64>>,
    downtime: ArcSwapOption<Fault<()>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActiveFault<T> {
    pub value: T,
    pub remaining_ms: u64,
}

/// Point-in-time view of every toggle, for reporting.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimulationSnapshot {
    pub latency_ms: Option<ActiveFault<u64>>,
    pub packet_loss_percent: Option<ActiveFault<u32>>,
    pub error_rate: Option<ActiveFault<f64>>,
    pub downtime: Option<ActiveFault<bool>>,
}

fn arm<T>(slot: &ArcSwapOption<Fault<T>>, value: T, lifetime: Duration) {
    slot.store(Some(Arc::new(Fault {
        value,
        expires_at: deadline_after(Instant::now(), lifetime),
    })));
}

fn active<T: Clone>(slot: &ArcSwapOption<Fault<T>>) -> Option<ActiveFault<T>> {
    let fault = slot.load_full()?;
    let now = Instant::now();
    if now >= fault.expires_at {
        return None;
    }
    Some(ActiveFault {
        value: fault.value.clone(),
        remaining_ms: (fault.expires_at - now).as_millis() as u64,
    })
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, delay: Duration, lifetime: Duration) {
        arm(&self.latency, delay, lifetime);
    }

    pub fn set_packet_loss(&self, percent: u32, lifetime: Duration) {
        arm(&self.packet_loss, percent.min(100), lifetime);
    }

    pub fn set_error_rate(&self, rate: f64, lifetime: Duration) {
        arm(&self.error_rate, rate.clamp(0.0, 1.0), lifetime);
    }

    pub fn set_downtime(&self, lifetime: Duration) {
        arm(&self.downtime, (), lifetime);
    }

    pub fn downtime_active(&self) -> bool {
        active(&self.downtime).is_some()
    }

    pub fn latency(&self) -> Option<Duration> {
        active(&self.latency).map(|f| f.value)
    }

    /// Roll packet loss, then error injection. At most one fault is returned.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<FaultKind> {
        if let Some(loss) = active(&self.packet_loss) {
            if rng.gen_range(0..100) < loss.value {
                return Some(FaultKind::PacketLoss);
            }
        }
        if let Some(rate) = active(&self.error_rate) {
            if rng.gen::<f64>() < rate.value {
                return Some(FaultKind::RandomError);
            }
        }
        None
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            latency_ms: active(&self.latency).map(|f| ActiveFault {
                value: f.value.as_millis() as u64,
                remaining_ms: f.remaining_ms,
            }),
            packet_loss_percent: active(&self.packet_loss),
            error_rate: active(&self.error_rate),
            downtime: active(&self.downtime).map(|f| ActiveFault {
                value: true,
                remaining_ms: f.remaining_ms,
            }),
        }
    }
}
