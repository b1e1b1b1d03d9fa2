// src/driver/workload.rs
use async_trait::async_trait;

/// A back end the driver can put under load.
///
/// `open` acquires the per-worker resource (a connection, a client, a
/// producer), `unit_of_work` runs one cycle against it and `close` releases
/// it. The driver calls `close` exactly once for every resource it opened.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    type Resource: Send + 'static;

    fn name(&self) -> &'static str;

    async fn open(&self, worker: usize) -> anyhow::Result<Self::Resource>;

    async fn unit_of_work(&self, resource: &mut Self::Resource, worker: usize)
        -> anyhow::Result<()>;

    async fn close(&self, resource: Self::Resource);
}
