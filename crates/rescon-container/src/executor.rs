// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs synchronous bundle code on blocking workers under a deadline.
//!
//! When the deadline passes the worker's cancellation token fires and the
//! caller stops waiting. The worker itself is detached: blocking threads
//! cannot be interrupted, so a handler that ignores its token keeps its
//! thread until it returns.

use std::time::Duration;

use rescon_core::{ContainerError, Operation};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::recording;

/// Result of a bounded call.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Failed(ContainerError),
    TimedOut,
}

impl<T> Outcome<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "ok",
            Outcome::Failed(_) => "failed",
            Outcome::TimedOut => "timeout",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    timeout: Duration,
    handle: Handle,
}

impl BoundedExecutor {
    pub fn new(timeout: Duration, handle: Handle) -> Self {
        Self { timeout, handle }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `call` on a blocking worker and wait at most the configured timeout.
    pub async fn run<T, F>(&self, op: Operation, uri: &str, call: F) -> Outcome<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, ContainerError> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let worker = self.handle.spawn_blocking({
            let cancel = cancel.clone();
            move || call(cancel)
        });

        match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(Ok(value))) => Outcome::Completed(value),
            Ok(Ok(Err(e))) => Outcome::Failed(e),
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    let payload = join.into_panic();
                    payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string())
                } else {
                    join.to_string()
                };
                Outcome::Failed(ContainerError::Plugin(format!(
                    "{op} handler for {uri} panicked: {message}"
                )))
            }
            Err(_) => {
                cancel.cancel();
                recording::record_abandoned(op);
                tracing::warn!(
                    %uri,
                    %op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "handler exceeded timeout; worker detached"
                );
                Outcome::TimedOut
            }
        }
    }
}
