//! Background write and delete queues.
//!
//! Publishing never waits for storage. Each queue is drained by one task in
//! arrival order, and every port call runs on the blocking pool. Failures are
//! logged and counted, never returned to the publisher.

use crate::backend::StoragePort;
use crate::core::{DbError, Record, Result};
use crate::model::{self, Entity, EntityMetadata};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

enum Job {
    Save {
        meta: Arc<EntityMetadata>,
        record: Record,
        write_counters: bool,
    },
    Delete {
        meta: Arc<EntityMetadata>,
        id: String,
    },
    DeleteAll {
        meta: Arc<EntityMetadata>,
    },
}

impl Job {
    fn run(self, port: &dyn StoragePort) -> Result<()> {
        match self {
            Job::Save { meta, record, write_counters } => port.save(&meta, &record, write_counters),
            Job::Delete { meta, id } => port.delete(&meta, &id),
            Job::DeleteAll { meta } => port.delete_all(&meta),
        }
    }

    fn family(&self) -> &str {
        match self {
            Job::Save { meta, .. } | Job::Delete { meta, .. } | Job::DeleteAll { meta } => meta.family(),
        }
    }
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub completed: u64,
    pub failed: u64,
}

pub struct StoreMonitor {
    writes: UnboundedSender<Job>,
    deletes: UnboundedSender<Job>,
    handles: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl StoreMonitor {
    pub(crate) fn spawn(port: Arc<dyn StoragePort>) -> Self {
        let counters = Arc::new(Counters::default());
        let (writes, write_rx) = mpsc::unbounded_channel();
        let (deletes, delete_rx) = mpsc::unbounded_channel();

        let handles = vec![
            tokio::spawn(drain("write", write_rx, port.clone(), counters.clone())),
            tokio::spawn(drain("delete", delete_rx, port, counters.clone())),
        ];

        Self {
            writes,
            deletes,
            handles,
            counters,
        }
    }

    pub fn publish_save<T: Entity>(&self, entity: &T) -> Result<()> {
        self.publish_record(entity, false)
    }

    pub fn publish_save_with_counters<T: Entity>(&self, entity: &T) -> Result<()> {
        self.publish_record(entity, true)
    }

    fn publish_record<T: Entity>(&self, entity: &T, write_counters: bool) -> Result<()> {
        let mapping = model::mapping::<T>()?;
        let record = mapping.to_record(entity)?;
        let job = Job::Save {
            meta: mapping.metadata().clone(),
            record,
            write_counters,
        };
        send(&self.writes, job)
    }

    pub fn publish_delete<T: Entity>(&self, id: &str) -> Result<()> {
        let job = Job::Delete {
            meta: model::metadata::<T>()?,
            id: id.to_string(),
        };
        send(&self.deletes, job)
    }

    pub fn publish_delete_all<T: Entity>(&self) -> Result<()> {
        send(&self.deletes, Job::DeleteAll { meta: model::metadata::<T>()? })
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Closes both queues and waits until everything published has run.
    pub async fn shutdown(self) -> Result<MonitorStats> {
        let Self {
            writes,
            deletes,
            handles,
            counters,
        } = self;
        drop(writes);
        drop(deletes);

        for handle in handles {
            handle
                .await
                .map_err(|err| DbError::ExecutionError(format!("monitor task join: {}", err)))?;
        }
        Ok(MonitorStats {
            completed: counters.completed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
        })
    }
}

fn send(queue: &UnboundedSender<Job>, job: Job) -> Result<()> {
    queue
        .send(job)
        .map_err(|_| DbError::ExecutionError("monitor queue is closed".to_string()))
}

async fn drain(
    queue: &'static str,
    mut rx: UnboundedReceiver<Job>,
    port: Arc<dyn StoragePort>,
    counters: Arc<Counters>,
) {
    while let Some(job) = rx.recv().await {
        let family = job.family().to_string();
        let port = port.clone();
        match tokio::task::spawn_blocking(move || job.run(port.as_ref())).await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(err)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!(queue, family = %family, error = %err, "background job failed");
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(queue, family = %family, error = %err, "background job panicked");
            }
        }
    }
    debug!(queue, "monitor queue drained");
}
