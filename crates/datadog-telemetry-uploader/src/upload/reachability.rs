// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connectivity edge detection.

use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Unavailable,
    Available,
}

/// Calls `on_regained` each time the status goes from unavailable to available.
///
/// The callback runs on the monitor task and must return quickly; anything
/// slow belongs in a task of its own.
pub struct ReachabilityMonitor<F> {
    status: watch::Receiver<NetworkStatus>,
    last: NetworkStatus,
    on_regained: F,
}

impl<F> ReachabilityMonitor<F>
where
    F: Fn() + Send + 'static,
{
    /// The status at construction time is the baseline: a change published
    /// before [`ReachabilityMonitor::run`] is first polled still counts.
    pub fn new(mut status: watch::Receiver<NetworkStatus>, on_regained: F) -> Self {
        let last = *status.borrow_and_update();
        Self {
            status,
            last,
            on_regained,
        }
    }

    /// Runs until the sending side of the status channel is dropped.
    pub async fn run(mut self) {
        while self.status.changed().await.is_ok() {
            let current = *self.status.borrow_and_update();
            if self.last == NetworkStatus::Unavailable && current == NetworkStatus::Available {
                info!("UPLOAD | Connectivity regained, retrying cached uploads");
                (self.on_regained)();
            }
            self.last = current;
        }
        debug!("UPLOAD | Connectivity channel closed");
    }
}
