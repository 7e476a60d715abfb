// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Count- and age-bounded log batching.
//!
//! The batcher is an actor: [`LogBatcherHandle`]s send commands over a channel
//! and a single [`LogBatcherService`] task owns the open batch, so counters and
//! timers never race.
//!
//! # States
//!
//! ```text
//!            add_log                      count >= max_logs_per_batch
//!   ┌──────┐ ───────> ┌──────────────────┐ ─────────────────────────┐
//!   │ Idle │          │ Open (timer runs)│   age timer fired        │
//!   └──────┘ <─────── └──────────────────┘ ─────────────────────────┤
//!      ^                                     flush / shutdown       │
//!      └────────────────── batch_finished(delegate) <──────────────┘
//! ```
//!
//! Each open batch carries a generation number and so does its timer. Finishing
//! a batch aborts its timer; a timer that already fired and queued its expiry
//! is ignored because its generation no longer matches the open batch.

use std::sync::Arc;
use std::time::Duration;

use datadog_telemetry_store::LogRecord;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BatcherError;
use crate::logs::repository::LogRepository;

/// Bounds applied to every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBatchLimits {
    /// A batch is finished as soon as it holds this many logs.
    pub max_logs_per_batch: usize,
    /// A batch is finished this long after its first log was added.
    pub max_batch_age: Duration,
}

impl Default for LogBatchLimits {
    fn default() -> Self {
        Self {
            max_logs_per_batch: 20,
            max_batch_age: Duration::from_secs(60),
        }
    }
}

/// A finished, non-empty group of logs.
#[derive(Debug, Clone, PartialEq)]
pub struct LogBatch {
    logs: Vec<LogRecord>,
}

impl LogBatch {
    pub(crate) fn from_logs(logs: Vec<LogRecord>) -> Self {
        Self { logs }
    }

    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    pub fn into_logs(self) -> Vec<LogRecord> {
        self.logs
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

/// Receives finished batches. Called from the batcher task, at most once per batch.
pub trait LogBatchDelegate: Send + Sync {
    fn batch_finished(&self, batch: LogBatch);
}

/// Commands processed by the [`LogBatcherService`].
#[derive(Debug)]
pub enum BatcherCommand {
    AddLog(LogRecord),
    /// Finish the open batch, if any, then acknowledge.
    Flush(oneshot::Sender<()>),
    /// Sent by the age timer of the batch with this generation.
    BatchExpired { generation: u64 },
    Shutdown,
}

/// Cloneable entry point used by log producers.
#[derive(Clone)]
pub struct LogBatcherHandle {
    tx: mpsc::UnboundedSender<BatcherCommand>,
    repository: Arc<dyn LogRepository>,
}

impl LogBatcherHandle {
    /// Persists `log`, then adds it to the current batch.
    ///
    /// The log is batched even when persisting fails; the store error is
    /// returned afterwards so the caller still learns about it.
    pub async fn add_log(&self, log: LogRecord) -> Result<(), BatcherError> {
        let persisted = self.repository.create_log(log.clone()).await;
        if let Err(err) = &persisted {
            warn!("LOGS | Failed to persist log {}: {err}", log.id);
        }
        self.tx
            .send(BatcherCommand::AddLog(log))
            .map_err(|_| BatcherError::Stopped)?;
        persisted.map_err(BatcherError::from)
    }

    /// Finishes the open batch and waits until the delegate has been called.
    pub async fn flush(&self) -> Result<(), BatcherError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(BatcherCommand::Flush(ack_tx))
            .map_err(|_| BatcherError::Stopped)?;
        ack_rx.await.map_err(|_| BatcherError::Stopped)
    }

    /// Finishes the open batch and stops the service.
    pub fn shutdown(&self) -> Result<(), BatcherError> {
        self.tx
            .send(BatcherCommand::Shutdown)
            .map_err(|_| BatcherError::Stopped)
    }
}

struct OpenBatch {
    generation: u64,
    logs: Vec<LogRecord>,
    timer: JoinHandle<()>,
}

/// Task owning the batch state. Run it with `tokio::spawn(service.run())`.
pub struct LogBatcherService {
    rx: mpsc::UnboundedReceiver<BatcherCommand>,
    // Weak so that dropping every handle still ends `run`.
    timer_tx: mpsc::WeakUnboundedSender<BatcherCommand>,
    limits: LogBatchLimits,
    delegate: Arc<dyn LogBatchDelegate>,
    open: Option<OpenBatch>,
    next_generation: u64,
}

impl LogBatcherService {
    pub fn new(
        limits: LogBatchLimits,
        repository: Arc<dyn LogRepository>,
        delegate: Arc<dyn LogBatchDelegate>,
    ) -> (Self, LogBatcherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            rx,
            timer_tx: tx.downgrade(),
            limits: LogBatchLimits {
                max_logs_per_batch: limits.max_logs_per_batch.max(1),
                ..limits
            },
            delegate,
            open: None,
            next_generation: 0,
        };
        (service, LogBatcherHandle { tx, repository })
    }

    pub async fn run(mut self) {
        debug!("LOGS | Batcher started with {:?}", self.limits);
        while let Some(command) = self.rx.recv().await {
            match command {
                BatcherCommand::AddLog(log) => self.add_log(log),
                BatcherCommand::Flush(ack) => {
                    self.finish_batch();
                    let _ = ack.send(());
                }
                BatcherCommand::BatchExpired { generation } => self.expire(generation),
                BatcherCommand::Shutdown => {
                    self.finish_batch();
                    break;
                }
            }
        }
        // Handles dropped without a shutdown: don't leave a timer behind.
        if let Some(batch) = self.open.take() {
            batch.timer.abort();
        }
        debug!("LOGS | Batcher stopped");
    }

    fn add_log(&mut self, log: LogRecord) {
        let max_logs = self.limits.max_logs_per_batch;
        let batch = match self.open.take() {
            Some(batch) => batch,
            None => self.open_batch(),
        };
        let batch = self.open.insert(batch);
        batch.logs.push(log);
        if batch.logs.len() >= max_logs {
            self.finish_batch();
        }
    }

    fn open_batch(&mut self) -> OpenBatch {
        let generation = self.next_generation;
        self.next_generation += 1;

        let age = self.limits.max_batch_age;
        let timer_tx = self.timer_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(age).await;
            if let Some(tx) = timer_tx.upgrade() {
                let _ = tx.send(BatcherCommand::BatchExpired { generation });
            }
        });

        OpenBatch {
            generation,
            logs: Vec::new(),
            timer,
        }
    }

    fn expire(&mut self, generation: u64) {
        match &self.open {
            Some(batch) if batch.generation == generation => self.finish_batch(),
            _ => debug!("LOGS | Ignoring expiry of already finished batch {generation}"),
        }
    }

    fn finish_batch(&mut self) {
        let Some(batch) = self.open.take() else {
            return;
        };
        batch.timer.abort();
        if batch.logs.is_empty() {
            return;
        }
        debug!(
            "LOGS | Finished batch {} with {} logs",
            batch.generation,
            batch.logs.len()
        );
        self.delegate.batch_finished(LogBatch::from_logs(batch.logs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use datadog_telemetry_store::{LogSeverity, ProcessIdentifier, StoreError};
    use std::sync::Mutex;
    use time::OffsetDateTime;
    use tokio::time::sleep;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct SpyRepository {
        stored: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LogRepository for SpyRepository {
        async fn create_log(&self, log: LogRecord) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::WorkerStopped);
            }
            self.stored.lock().unwrap().push(log.id);
            Ok(())
        }
    }

    struct ChannelDelegate(mpsc::UnboundedSender<LogBatch>);

    impl LogBatchDelegate for ChannelDelegate {
        fn batch_finished(&self, batch: LogBatch) {
            let _ = self.0.send(batch);
        }
    }

    fn start(
        max_logs_per_batch: usize,
        max_batch_age: Duration,
        repository: Arc<SpyRepository>,
    ) -> (LogBatcherHandle, mpsc::UnboundedReceiver<LogBatch>) {
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();
        let (service, handle) = LogBatcherService::new(
            LogBatchLimits {
                max_logs_per_batch,
                max_batch_age,
            },
            repository,
            Arc::new(ChannelDelegate(batches_tx)),
        );
        tokio::spawn(service.run());
        (handle, batches_rx)
    }

    fn log(body: &str) -> LogRecord {
        LogRecord::new(
            ProcessIdentifier::new("00000001").unwrap(),
            LogSeverity::Info,
            body,
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_limit_of_one_finishes_every_log() {
        let (handle, mut batches) =
            start(1, Duration::from_secs(60), Arc::new(SpyRepository::default()));

        handle.add_log(log("first")).await.unwrap();
        handle.add_log(log("second")).await.unwrap();

        let first = batches.recv().await.unwrap();
        let second = batches.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.logs()[0].body, "first");
        assert_eq!(second.len(), 1);
        assert_eq!(second.logs()[0].body, "second");
        sleep(Duration::from_secs(120)).await;
        assert!(batches.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_limit_finishes_batch_once() {
        let (handle, mut batches) = start(
            10,
            Duration::from_millis(100),
            Arc::new(SpyRepository::default()),
        );

        handle.add_log(log("only")).await.unwrap();
        sleep(Duration::from_millis(150)).await;

        let batch = batches.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        sleep(Duration::from_secs(5)).await;
        assert!(batches.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_limit_cancels_pending_timer() {
        let (handle, mut batches) = start(
            2,
            Duration::from_millis(100),
            Arc::new(SpyRepository::default()),
        );

        handle.add_log(log("a")).await.unwrap();
        handle.add_log(log("b")).await.unwrap();
        assert_eq!(batches.recv().await.unwrap().len(), 2);

        sleep(Duration::from_millis(300)).await;
        assert!(batches.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_batch_restarts_age_timer() {
        let (handle, mut batches) = start(
            10,
            Duration::from_millis(100),
            Arc::new(SpyRepository::default()),
        );

        handle.add_log(log("first")).await.unwrap();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(batches.try_recv().unwrap().len(), 1);

        sleep(Duration::from_millis(50)).await;
        handle.add_log(log("second")).await.unwrap();
        sleep(Duration::from_millis(60)).await;
        assert!(batches.try_recv().is_err());

        sleep(Duration::from_millis(60)).await;
        let batch = batches.try_recv().unwrap();
        assert_eq!(batch.logs()[0].body, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_finishes_batch_and_cancels_timer() {
        let (handle, mut batches) = start(
            10,
            Duration::from_millis(100),
            Arc::new(SpyRepository::default()),
        );

        handle.flush().await.unwrap();
        assert!(batches.try_recv().is_err());

        handle.add_log(log("a")).await.unwrap();
        handle.flush().await.unwrap();
        assert_eq!(batches.try_recv().unwrap().len(), 1);

        sleep(Duration::from_millis(500)).await;
        assert!(batches.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logs_are_persisted_before_batching() {
        let repository = Arc::new(SpyRepository::default());
        let (handle, mut batches) = start(1, Duration::from_secs(60), Arc::clone(&repository));

        let record = log("stored");
        let id = record.id.clone();
        handle.add_log(record).await.unwrap();

        assert_eq!(*repository.stored.lock().unwrap(), vec![id]);
        assert_eq!(batches.recv().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_store_failure_is_reported_but_log_is_batched() {
        let repository = Arc::new(SpyRepository {
            fail: true,
            ..Default::default()
        });
        let (handle, mut batches) = start(1, Duration::from_secs(60), repository);

        let result = handle.add_log(log("unsaved")).await;

        assert!(matches!(result, Err(BatcherError::Store(_))));
        assert_eq!(batches.recv().await.unwrap().logs()[0].body, "unsaved");
        assert!(logs_contain("Failed to persist log"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_open_batch() {
        let (handle, mut batches) = start(
            10,
            Duration::from_secs(60),
            Arc::new(SpyRepository::default()),
        );

        handle.add_log(log("last")).await.unwrap();
        handle.shutdown().unwrap();

        assert_eq!(batches.recv().await.unwrap().len(), 1);
        // The service dropped the delegate when it stopped.
        assert!(batches.recv().await.is_none());
        assert!(matches!(
            handle.add_log(log("late")).await,
            Err(BatcherError::Stopped)
        ));
    }
}
