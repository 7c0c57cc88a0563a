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

//! The AVM↔NDI media bridge connection (`spec` §4.4). Ties together the
//! receive worker, transmit driver, receive-callback handler and
//! connection state machine.
//!
//! Grounded on `vsc::VirtualSoundCard`'s actor-task shape: `Connection`
//! spawns its workers and runs an api-message loop mirroring
//! `VirtualSoundCard::run`'s `Stats`/`Stop`-style request/reply handling.
//! The teacher wraps each subsystem in its own OS thread + current-thread
//! runtime (`app::spawn_child_app`) because it must interoperate with a
//! worterbuch/tokio-metrics harness this crate has no use for; here the
//! workers are plain tasks on the caller's existing runtime instead.

pub mod api;
pub mod receiver;
pub mod rx_callback;
pub mod state;
pub mod transmit;

use crate::clock::{BridgeClock, PtpTimestamp};
use crate::config::ConnectionConfig;
use crate::error::CdiResult;
use crate::fifo::bounded_fifo;
use crate::frame::FrameData;
use crate::monitoring::BridgeStats;
use crate::pool::FramePool;
use crate::transport::{AvmTransport, UpstreamMedia};
use api::{ConnectionApi, ConnectionApiMessage};
use rx_callback::ReceiveCallbackHandler;
use state::{ConnectionState, ConnectionStateSignal};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The two mutually-exclusive top-level modes of a connection (`spec`
/// §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Upstream source → AVM sender.
    RxToTx,
    /// AVM receiver → upstream sink.
    TxToRx,
}

/// Everything `Connection::spawn` hands back to the caller: the actor
/// handle, and — only in [`Direction::TxToRx`] — the receive-callback
/// handler the transport's own Rx callback thread must invoke directly
/// (`spec` §5: that thread is transport-owned, never one of ours).
pub struct ConnectionHandles {
    pub api: ConnectionApi,
    pub rx_callback: Option<Arc<ReceiveCallbackHandler>>,
    pub state_rx: watch::Receiver<ConnectionState>,
}

pub struct Connection {
    config: ConnectionConfig,
    transport: Arc<dyn AvmTransport>,
    upstream: Arc<dyn UpstreamMedia>,
    state_signal: ConnectionStateSignal,
    stats: Arc<BridgeStats>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    pool: Arc<FramePool<()>>,
}

impl Connection {
    /// Setup order per `spec` §4.4.1: the adapter and transport connection
    /// and upstream endpoint are assumed already created by the caller
    /// (they own the `transport`/`upstream` handles passed in); this
    /// function's job is strictly "spawn the bridge worker(s), then signal
    /// `Connected`".
    pub fn spawn(
        config: ConnectionConfig,
        direction: Direction,
        transport: Arc<dyn AvmTransport>,
        upstream: Arc<dyn UpstreamMedia>,
        start_time: PtpTimestamp,
    ) -> CdiResult<ConnectionHandles> {
        config.validate()?;

        let pool = FramePool::new(config.pool_capacity, || ());
        let shutdown = CancellationToken::new();
        let stats = BridgeStats::new();
        let (state_signal, state_rx) = ConnectionStateSignal::new(ConnectionState::Init);
        state_signal.set(ConnectionState::WaitingForPeer);

        let (payload_tx, payload_rx) = bounded_fifo::<Arc<FrameData>>(config.fifo_capacity, shutdown.clone());
        let (callback_tx, callback_rx) = bounded_fifo::<Arc<FrameData>>(config.fifo_capacity, shutdown.clone());

        let mut workers = Vec::new();
        let rx_callback = match direction {
            Direction::RxToTx => {
                let recv_worker = receiver::ReceiveWorker::new(
                    upstream.clone(),
                    pool.clone(),
                    payload_tx,
                    callback_rx,
                    shutdown.clone(),
                    stats.clone(),
                    state_rx.clone(),
                );
                workers.push(tokio::spawn(async move {
                    if let Err(e) = recv_worker.run().await {
                        tracing::error!("receive worker terminated: {e}");
                    }
                }));

                let clock = BridgeClock::new(start_time);
                let xmit_driver = transmit::TransmitDriver::new(
                    payload_rx,
                    callback_tx,
                    pool.clone(),
                    transport.clone(),
                    clock,
                    stats.clone(),
                    Arc::new(config.clone()),
                    state_rx.clone(),
                );
                workers.push(tokio::spawn(async move {
                    if let Err(e) = xmit_driver.run().await {
                        tracing::error!("transmit driver terminated: {e}");
                    }
                }));
                None
            }
            Direction::TxToRx => {
                let handler = Arc::new(ReceiveCallbackHandler::new(
                    pool.clone(),
                    payload_tx,
                    transport.clone(),
                    stats.clone(),
                ));
                workers.push(tokio::spawn(run_sink_driver(payload_rx, pool.clone(), upstream.clone())));
                drop(callback_tx);
                Some(handler)
            }
        };

        state_signal.set(ConnectionState::Connected);
        info!("connection '{}' established ({direction:?})", config.name);

        let driver = Connection {
            config,
            transport,
            upstream,
            state_signal,
            stats,
            shutdown,
            workers,
            pool,
        };

        let (api_tx, api_rx) = mpsc::channel(64);
        tokio::spawn(driver.run(api_rx));

        Ok(ConnectionHandles {
            api: ConnectionApi::new(api_tx),
            rx_callback,
            state_rx,
        })
    }

    async fn run(mut self, mut api_rx: mpsc::Receiver<ConnectionApiMessage>) {
        while let Some(msg) = api_rx.recv().await {
            match msg {
                ConnectionApiMessage::Stats(reply) => {
                    reply.send(self.stats.snapshot()).ok();
                }
                ConnectionApiMessage::State(reply) => {
                    reply.send(self.state_signal.get()).ok();
                }
                ConnectionApiMessage::Stop(reply) => {
                    self.teardown().await;
                    reply.send(()).ok();
                    break;
                }
            }
        }
    }

    /// Teardown in reverse setup order (`spec` §4.4.1, §4.4.7): drain into
    /// `Draining`, cancel the shutdown signal so blocking FIFO reads
    /// unblock and each worker flushes its own FIFO reader as its last
    /// action before returning, join every worker, destroy the upstream
    /// endpoint, destroy the transport connection, drain the pool, then
    /// `Closed`.
    async fn teardown(&mut self) {
        info!("tearing down connection '{}'", self.config.name);
        self.state_signal.set(ConnectionState::Draining);
        self.shutdown.cancel();
        for worker in self.workers.drain(..) {
            worker.await.ok();
        }
        self.upstream.destroy();
        self.transport.connection_destroy();
        while self.pool.try_acquire().is_ok() {}
        self.state_signal.set(ConnectionState::Closed);
        info!("connection '{}' closed", self.config.name);
    }
}

/// TX→RX direction's outbound half: delivers AVM-originated frames queued
/// by [`ReceiveCallbackHandler`] to the upstream sink and releases the pool
/// slot. These frames are never shared with a repeat slot, so a single
/// `release()` always frees them.
async fn run_sink_driver(
    mut payload_rx: crate::fifo::FifoReader<Arc<FrameData>>,
    pool: Arc<FramePool<()>>,
    upstream: Arc<dyn UpstreamMedia>,
) {
    while let Some(frame) = payload_rx.read(None).await {
        upstream.deliver(frame.body.clone());
        if frame.release() {
            pool.release(());
        }
    }
    for frame in payload_rx.flush() {
        if frame.release() {
            pool.release(());
        }
    }
}

/// Blocks until the connection reaches `Connected` or `Closed`, whichever
/// comes first (`spec` §4.4.1: "wait on a connection-established signal
/// before producing payloads").
pub async fn wait_until_settled(mut state_rx: watch::Receiver<ConnectionState>) -> ConnectionState {
    loop {
        let state = *state_rx.borrow_and_update();
        if matches!(state, ConnectionState::Connected | ConnectionState::Closed) {
            return state;
        }
        if state_rx.changed().await.is_err() {
            return ConnectionState::Closed;
        }
    }
}
