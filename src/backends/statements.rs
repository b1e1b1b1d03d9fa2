// src/backends/statements.rs
use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

/// A connection able to issue the stress read and write statements.
#[async_trait]
pub trait StressStatements: Send {
    async fn read(&mut self) -> Result<()>;
    async fn write(&mut self) -> Result<()>;
}

/// The reads and writes issued on every cycle of a query-driven job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryMix {
    pub reads: bool,
    pub writes: bool,
    pub queries: u64,
}

#[derive(Debug, Default)]
struct Tally {
    issued: u64,
    failed: u64,
}

impl Tally {
    fn record(&mut self, backend: &'static str, statement: &'static str, outcome: Result<()>) {
        self.issued += 1;
        if let Err(err) = outcome {
            self.failed += 1;
            warn!(backend, statement, %err, "stress statement failed");
        }
    }
}

impl QueryMix {
    /// Issue one cycle of statements on `conn`. Failed statements are logged
    /// and skipped; the cycle counts as failed if any of them did.
    pub async fn run<S: StressStatements + ?Sized>(
        &self,
        backend: &'static str,
        conn: &mut S,
    ) -> Result<()> {
        let mut tally = Tally::default();
        for _ in 0..self.queries {
            if self.reads {
                tally.record(backend, "read", conn.read().await);
            }
            if self.writes {
                tally.record(backend, "write", conn.write().await);
            }
        }
        if tally.failed > 0 {
            bail!("{} of {} statements failed", tally.failed, tally.issued);
        }
        Ok(())
    }
}
