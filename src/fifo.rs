/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Bounded, cancellable FIFOs and the connection-state-change signal.
//!
//! Grounded on `aes67-rs::buffer`'s `receiver_buffer_channel`/
//! `sender_buffer_channel` pairing: a bounded `tokio::sync::mpsc` channel
//! per FIFO role, combined with a `tokio_util::sync::CancellationToken` so a
//! blocking read unblocks on shutdown exactly like the teacher's
//! `select! { ..., _ = subsys.on_shutdown_requested() => break }` loops.

use crate::error::FifoError;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// A bounded FIFO split into a writer and reader half, used for both the
/// payload FIFO and the callback FIFO (`spec` §5: "a single bounded MPSC
/// queue per role"). Writer and reader are held by distinct tasks.
pub struct FifoWriter<T> {
    tx: mpsc::Sender<T>,
    shutdown: CancellationToken,
}

pub struct FifoReader<T> {
    rx: mpsc::Receiver<T>,
    shutdown: CancellationToken,
}

pub fn bounded_fifo<T>(capacity: usize, shutdown: CancellationToken) -> (FifoWriter<T>, FifoReader<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        FifoWriter {
            tx,
            shutdown: shutdown.clone(),
        },
        FifoReader { rx, shutdown },
    )
}

impl<T> FifoWriter<T> {
    /// Blocking write with an optional timeout. Fails with
    /// `FifoError::WriteAfterShutdown` if the worker-shutdown signal has
    /// already fired.
    pub async fn write(&self, value: T, timeout: Option<Duration>) -> Result<(), FifoError> {
        if self.shutdown.is_cancelled() {
            return Err(FifoError::WriteAfterShutdown);
        }
        let send = self.tx.send(value);
        match timeout {
            Some(d) => tokio::time::timeout(d, send)
                .await
                .map_err(|_| FifoError::TimedOut)?
                .map_err(|_| FifoError::Closed),
            None => send.await.map_err(|_| FifoError::Closed),
        }
    }

    pub fn try_write(&self, value: T) -> Result<(), FifoError> {
        if self.shutdown.is_cancelled() {
            return Err(FifoError::WriteAfterShutdown);
        }
        self.tx.try_send(value).map_err(|_| FifoError::Closed)
    }
}

impl<T> FifoReader<T> {
    /// Blocking read, cancellable by the worker-shutdown signal. Returns
    /// `None` once shutdown is requested or the channel closes. `timeout =
    /// None` represents an infinite wait (`spec` §5).
    pub async fn read(&mut self, timeout: Option<Duration>) -> Option<T> {
        let recv = async {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                v = self.rx.recv() => v,
            }
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, recv).await.ok().flatten(),
            None => recv.await,
        }
    }

    /// Non-blocking drain used by the receive worker to process the
    /// callback FIFO after each poll iteration (`spec` §4.4.2).
    pub fn try_read(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drains every item still buffered, without blocking (`spec` §5: "an
    /// explicit `flush` before destroy"). Called by each FIFO's owning
    /// worker as it shuts down, so outstanding frames can still be
    /// released/disposed of by the caller instead of leaking.
    pub fn flush(&mut self) -> Vec<T> {
        let mut drained = Vec::new();
        while let Some(v) = self.try_read() {
            drained.push(v);
        }
        drained
    }
}

/// The `connection_state_change` signal: a publish/subscribe latest-value
/// channel, grounded on `aes67-rs::buffer::receiver_buffer_channel`'s use of
/// `tokio::sync::watch` for the "latest received frame" watermark.
pub fn state_change_signal<T: Clone>(initial: T) -> (watch::Sender<T>, watch::Receiver<T>) {
    watch::channel(initial)
}
