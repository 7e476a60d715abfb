// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serial worker owning the database connection.
//!
//! ```text
//!    ┌──────────────┐
//!    │ Store handles│ (Clone, any thread)
//!    └──────┬───────┘
//!           │ jobs via channel, submission order
//!           v
//!    ┌──────────────┐
//!    │ Worker thread│ (one job at a time)
//!    └──────┬───────┘
//!           │ owns
//!           v
//!    ┌──────────────┐
//!    │   Database   │
//!    └──────────────┘
//! ```
//!
//! Jobs never run concurrently, which is the only concurrency control the store
//! has. A job must not call back into a synchronous store method: it would wait
//! on itself.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc as std_mpsc;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::database::Database;
use crate::error::StoreError;

pub(crate) type Job = Box<dyn FnOnce(&mut Database) + Send + 'static>;

const WORKER_THREAD_NAME: &str = "dd-telemetry-store";

/// Sending half of the job queue.
#[derive(Debug, Clone)]
pub(crate) struct Worker {
    tx: mpsc::UnboundedSender<Job>,
}

impl Worker {
    /// Moves `db` onto a new worker thread.
    pub(crate) fn spawn(mut db: Database) -> Result<Self, StoreError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job(&mut db);
                }
                debug!("STORE | Worker stopped, closing connection");
            })?;
        Ok(Self { tx })
    }

    fn submit(&self, job: Job) -> Result<(), StoreError> {
        self.tx.send(job).map_err(|_| StoreError::WorkerStopped)
    }

    /// Runs `f` on the worker and blocks until it finished.
    pub(crate) fn run_sync<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        // std channel: a tokio oneshot cannot be waited on from inside a runtime.
        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.submit(Box::new(move |db| {
            let _ = reply_tx.send(f(db));
        }))?;
        reply_rx.recv().map_err(|_| StoreError::WorkerStopped)?
    }

    /// Queues `f` right away and returns a future for its result.
    pub(crate) fn run_async<F, R>(&self, f: F) -> StoreTask<R>
    where
        F: FnOnce(&mut Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        match self.submit(Box::new(move |db| {
            let _ = reply_tx.send(f(db));
        })) {
            Ok(()) => StoreTask::Pending(reply_rx),
            Err(err) => StoreTask::Failed(Some(err)),
        }
    }
}

/// Result of a job submitted with an `_async` store method.
///
/// The job is already queued when this value is returned; awaiting it only
/// waits for the outcome. Dropping it does not cancel the job.
#[derive(Debug)]
#[must_use = "the job runs regardless, but its outcome is lost unless awaited"]
pub enum StoreTask<T> {
    #[doc(hidden)]
    Pending(oneshot::Receiver<Result<T, StoreError>>),
    #[doc(hidden)]
    Failed(Option<StoreError>),
}

impl<T> Future for StoreTask<T> {
    type Output = Result<T, StoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut() {
            StoreTask::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|reply| reply.unwrap_or(Err(StoreError::WorkerStopped))),
            StoreTask::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(StoreError::WorkerStopped)))
            }
        }
    }
}
