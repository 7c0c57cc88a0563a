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

//! Illustrative bridge driver CLI (`spec` §6: "exposed by the outer
//! program, not the core"). Wires `bridge::Connection` to a logging stub
//! transport/upstream pair, since the real AVM/NDI endpoints are explicitly
//! out-of-scope collaborators. Grounded on `bin/aes-vsc-sender.rs`'s
//! `clap::Parser` + `tokio_graceful_shutdown::Toplevel` + `miette::Result`
//! shape.

use cdi_rs::bridge::{Connection, Direction, wait_until_settled};
use cdi_rs::clock::PtpTimestamp;
use cdi_rs::config::{BaselineConfig, ConnectionConfig};
use cdi_rs::frame::FrameBody;
use cdi_rs::transport::{AvmTransport, CaptureEvent, StreamKind, TransportError, TxOutcome, UpstreamError, UpstreamMedia};
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliDirection {
    RxToTx,
    TxToRx,
}

impl From<CliDirection> for Direction {
    fn from(d: CliDirection) -> Self {
        match d {
            CliDirection::RxToTx => Direction::RxToTx,
            CliDirection::TxToRx => Direction::TxToRx,
        }
    }
}

/// `spec` §6's illustrative bridge CLI surface.
#[derive(Debug, Parser)]
#[command(name = "cdi-bridge")]
struct Args {
    /// Path to a YAML `ConnectionConfig` document.
    #[arg(long)]
    config: PathBuf,

    /// Selects RX (upstream → AVM sender) vs TX (AVM receiver → upstream).
    #[arg(long, value_enum)]
    direction: CliDirection,

    /// Use NDI-carried timestamps instead of synthesizing from the bridge clock.
    #[arg(long, env = "CDI_USE_NDI_TIMESTAMPS")]
    use_ndi_timestamps: bool,

    /// Logs every outgoing/incoming timestamp at debug level.
    #[arg(long)]
    log_timestamps: bool,

    /// Stop after this many payloads have passed through the connection.
    /// Runs until shutdown is requested when unset.
    #[arg(long)]
    num_transactions: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let result = Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("cdi-bridge", move |s| run(s, args)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(1))
    .await;

    result.into_diagnostic()
}

async fn run(subsys: SubsystemHandle, args: Args) -> Result<()> {
    let content = std::fs::read_to_string(&args.config).into_diagnostic()?;
    let mut config = ConnectionConfig::from_yaml(&content).into_diagnostic()?;
    config.use_ndi_timestamps = args.use_ndi_timestamps;

    let transport = Arc::new(LoggingTransport::new(args.log_timestamps, args.num_transactions));
    let upstream = Arc::new(LoggingUpstream::default());

    let handles = Connection::spawn(
        config,
        args.direction.into(),
        transport,
        upstream,
        PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        },
    )?;

    let state = wait_until_settled(handles.state_rx.clone()).await;
    info!("connection settled at {state:?}");

    subsys.on_shutdown_requested().await;
    handles.api.stop().await;
    Ok(())
}

/// Logs every payload instead of touching real AVM hardware. Stands in for
/// the out-of-scope `TxCreate`/`RxCreate`/`TxPayload` collaborator (`spec`
/// §1).
struct LoggingTransport {
    log_timestamps: bool,
    sent: AtomicU64,
    limit: Option<u64>,
}

impl LoggingTransport {
    fn new(log_timestamps: bool, limit: Option<u64>) -> Self {
        LoggingTransport {
            log_timestamps,
            sent: AtomicU64::new(0),
            limit,
        }
    }
}

impl AvmTransport for LoggingTransport {
    fn tx_payload(
        &self,
        stream: StreamKind,
        _config: &BaselineConfig,
        timestamp: PtpTimestamp,
        payload: &[u8],
    ) -> Result<TxOutcome, TransportError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        if self.log_timestamps {
            info!("tx {stream:?} ts={timestamp:?} bytes={}", payload.len());
        }
        if let Some(limit) = self.limit {
            if n > limit {
                return Ok(TxOutcome::QueueFull);
            }
        }
        Ok(TxOutcome::Sent)
    }

    fn rx_free_buffer(&self, _stream: StreamKind, _buffer: &[u8]) {}

    fn connection_destroy(&self) {
        info!("transport connection destroyed, {} payloads sent", self.sent.load(Ordering::SeqCst));
    }
}

/// Stands in for the out-of-scope upstream media source/sink.
#[derive(Default)]
struct LoggingUpstream;

impl UpstreamMedia for LoggingUpstream {
    fn capture(&self, timeout: Duration) -> Result<Option<CaptureEvent>, UpstreamError> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn release_frame(&self, _body: &FrameBody) {}

    fn deliver(&self, body: FrameBody) {
        info!("delivered frame to upstream sink: {body:?}");
    }

    fn destroy(&self) {
        info!("upstream endpoint destroyed");
    }
}
