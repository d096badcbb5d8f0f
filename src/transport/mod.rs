// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

//! Reconnecting WebSocket transport.
//!
//! One background worker thread owns the connection and is the only code
//! that touches the socket. Other threads hand it work through the bounded
//! queue and observe a snapshot of [`ConnectionState`]; they never hold the
//! state lock across I/O.

pub mod frames;
pub(crate) mod queue;
mod url;
mod worker;

pub use url::BackendUrl;

use queue::MessageQueue;

use crate::shared::constants::{HEARTBEAT_INTERVAL, MAX_RECONNECT_ATTEMPTS, MESSAGE_QUEUE_SIZE};
use anyhow::Context;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Connection lifecycle. Transitions are linear forward on success and
/// collapse to `Disconnected` on any failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
}

/// Transport tuning. The defaults are the production protocol values; tests
/// scale them down.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: BackendUrl,
    /// Pre-encoded `register` frame, sent first on every connection.
    pub register_frame: String,
    pub heartbeat_interval: Duration,
    pub queue_capacity: usize,
    pub max_reconnect_attempts: u32,
    pub debug: bool,
}

impl TransportOptions {
    pub fn new(url: BackendUrl, register_frame: String) -> Self {
        Self {
            url,
            register_frame,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            queue_capacity: MESSAGE_QUEUE_SIZE,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            debug: false,
        }
    }
}

pub(crate) struct TransportShared {
    state: Mutex<ConnectionState>,
    queue: MessageQueue,
    wake: tokio::sync::Notify,
}

impl TransportShared {
    fn new(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            queue: MessageQueue::new(queue_capacity),
            wake: tokio::sync::Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub(crate) fn queue(&self) -> &MessageQueue {
        &self.queue
    }
}

/// Handle to the background transport worker.
pub struct Transport {
    shared: Arc<TransportShared>,
    cancel: CancellationToken,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl Transport {
    /// Starts the worker thread. The endpoint has already been parsed, so
    /// the only failure here is thread creation.
    pub fn spawn(options: TransportOptions) -> anyhow::Result<Self> {
        let shared = Arc::new(TransportShared::new(options.queue_capacity));
        let cancel = CancellationToken::new();
        let worker_shared = Arc::clone(&shared);
        let worker_cancel = cancel.clone();
        let worker = std::thread::Builder::new()
            .name("aivory-monitor-ws".to_string())
            .spawn(move || worker::run(worker_shared, worker_cancel, options))
            .context("failed to spawn transport worker thread")?;
        Ok(Self {
            shared,
            cancel,
            worker: Some(worker),
        })
    }

    /// Queues an encoded exception record and nudges the worker. If the
    /// connection is authenticated the record is written on the next
    /// writability window; otherwise it waits out the disconnection in the
    /// bounded queue.
    pub fn send_exception(&self, record: String) {
        self.shared.queue.push(record);
        self.shared.wake.notify_one();
    }

    /// Queue-only variant safe to call from a signal handler: a plain
    /// mutex-guarded push with no waker involvement. The worker's service
    /// tick picks the record up within its polling cadence.
    pub(crate) fn enqueue_from_signal(&self, record: String) {
        self.shared.queue.push(record);
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of records currently waiting in the backlog.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Stops the worker and joins it. Idempotent.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("transport worker panicked during shutdown");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
