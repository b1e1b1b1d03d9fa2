// src/backends/broker.rs
use crate::config::KafkaSettings;
use crate::driver::Workload;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use std::collections::BTreeMap;
use tracing::warn;

const PARTITION: i32 = 0;

const LOREM: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat",
];

/// Ten to twenty lorem ipsum words, used when a request names no message.
pub fn lorem_ipsum<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.gen_range(10..=20);
    (0..count)
        .filter_map(|_| LOREM.choose(rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn client(settings: &KafkaSettings) -> Result<Client> {
    if settings.tls {
        warn!("KAFKA_TLS_ENABLED is set but TLS is not supported, connecting in plaintext");
    }
    Ok(ClientBuilder::new(settings.servers.clone()).build().await?)
}

pub(super) async fn probe(settings: &KafkaSettings) -> Result<()> {
    client(settings).await?.list_topics().await?;
    Ok(())
}

/// A partition producer owned by one worker.
pub struct Producer {
    partition: PartitionClient,
}

pub struct KafkaWorkload {
    settings: KafkaSettings,
    message: String,
    per_interval: u64,
    keyed_by_worker: bool,
}

impl KafkaWorkload {
    /// `keyed_by_worker` prefixes record keys with the worker number, as the
    /// fan-out job does.
    pub fn new(settings: KafkaSettings, message: String, per_interval: u64, keyed_by_worker: bool) -> Self {
        Self {
            settings,
            message,
            per_interval,
            keyed_by_worker,
        }
    }

    fn key(&self, worker: usize, n: u64) -> String {
        if self.keyed_by_worker {
            format!("conn-{worker}-key-{n}")
        } else {
            format!("key-{n}")
        }
    }
}

#[async_trait]
impl Workload for KafkaWorkload {
    type Resource = Producer;

    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn open(&self, _worker: usize) -> Result<Producer> {
        let partition = client(&self.settings)
            .await?
            .partition_client(self.settings.topic.clone(), PARTITION, UnknownTopicHandling::Error)
            .await?;
        Ok(Producer { partition })
    }

    async fn unit_of_work(&self, producer: &mut Producer, worker: usize) -> Result<()> {
        if self.per_interval == 0 {
            return Ok(());
        }
        let mut records = Vec::new();
        for n in 0..self.per_interval {
            records.push(Record {
                key: Some(self.key(worker, n).into_bytes()),
                value: Some(self.message.clone().into_bytes()),
                headers: BTreeMap::new(),
                timestamp: Utc::now(),
            });
        }
        producer
            .partition
            .produce(records, Compression::NoCompression)
            .await?;
        Ok(())
    }

    async fn close(&self, producer: Producer) {
        drop(producer);
    }
}
