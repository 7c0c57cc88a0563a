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

//! Capability traits for the two out-of-scope external collaborators named
//! in `spec` §1: the AVM transport (opaque `TxCreate`/`RxCreate`/
//! `TxPayload`/`ConnectionDestroy`/`RxFreeBuffer` handles) and the upstream
//! media transport. Neither trait opens a socket or owns OS resources —
//! that stays outside this crate, same as the teacher's separation between
//! `aes67-rs::socket` (real I/O) and the rest of the library (protocol
//! logic against a `tokio::net::UdpSocket` it's handed).

use crate::clock::PtpTimestamp;
use crate::config::BaselineConfig;
use crate::frame::FrameBody;
use std::time::Duration;

/// Stream identifier selecting which AVM stream a payload belongs to
/// (`spec` §4.4.3: "Select stream identifier by frame kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Ancillary,
}

/// Result of a `TxPayload` call (`spec` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Sent,
    QueueFull,
}

/// One upstream capture result (`spec` §4.4.2): `none` is modeled as
/// `Ok(None)` from [`UpstreamMedia::capture`], the remaining variants by
/// this enum.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Frame(FrameBody),
    StatusChange,
}

/// The opaque upstream media transport: a "capture" primitive with a
/// millisecond timeout, plus frame release. Modeled as a trait rather than
/// a C function pointer + `void*` context, per `spec` §9's "capability
/// trait" design note.
pub trait UpstreamMedia: Send + Sync {
    /// Blocks for at most `timeout`, returning `Ok(None)` on a timed-out
    /// empty poll (`spec`'s `none` case), `Ok(Some(event))` on a delivered
    /// event, or `Err` on a fatal upstream error.
    fn capture(&self, timeout: Duration) -> Result<Option<CaptureEvent>, UpstreamError>;

    /// Returns a previously captured buffer to the upstream library once
    /// the bridge is done with it.
    fn release_frame(&self, body: &FrameBody);

    /// Delivers a frame converted from the AVM side to the upstream sink
    /// (`spec` §4.4.1's TX→RX direction: "AVM receiver → upstream sink").
    fn deliver(&self, body: FrameBody);

    /// Tears down the upstream endpoint. Called only after the bridge
    /// workers for this connection have joined and their FIFOs have been
    /// flushed, and before the transport connection itself is destroyed
    /// (`spec` §4.4.7 teardown order).
    fn destroy(&self);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream media source reported a fatal error")]
    Fatal,
}

/// The opaque AVM transport connection: `TxCreate`/`RxCreate`/`TxPayload`/
/// `ConnectionDestroy`/`RxFreeBuffer` generalized into a trait (`spec` §1,
/// §9). Implementations own the real socket/NIC/PTP machinery, entirely
/// outside this crate's scope.
pub trait AvmTransport: Send + Sync {
    /// Sends one payload on the given stream, tagged with its AVM baseline
    /// config and outgoing PTP timestamp (`spec` §4.4.3).
    fn tx_payload(
        &self,
        stream: StreamKind,
        config: &BaselineConfig,
        timestamp: PtpTimestamp,
        payload: &[u8],
    ) -> Result<TxOutcome, TransportError>;

    /// Frees a buffer handed to the bridge by an `Rx` callback
    /// (`RxFreeBuffer`, `spec` §2 data flow A).
    fn rx_free_buffer(&self, stream: StreamKind, buffer: &[u8]);

    /// Tears down the transport connection. Called only after the bridge
    /// workers for this connection have joined (`spec` §4.4.1 teardown
    /// order).
    fn connection_destroy(&self);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport send queue is full")]
    QueueFull,
    #[error("transport connection was lost")]
    ConnectionLost,
    #[error("transport reported a fatal error: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubTransport {
        sent: AtomicUsize,
        fail_once: Mutex<bool>,
    }

    impl AvmTransport for StubTransport {
        fn tx_payload(
            &self,
            _stream: StreamKind,
            _config: &BaselineConfig,
            _timestamp: PtpTimestamp,
            _payload: &[u8],
        ) -> Result<TxOutcome, TransportError> {
            let mut fail_once = self.fail_once.lock().unwrap();
            if *fail_once {
                *fail_once = false;
                return Ok(TxOutcome::QueueFull);
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(TxOutcome::Sent)
        }

        fn rx_free_buffer(&self, _stream: StreamKind, _buffer: &[u8]) {}

        fn connection_destroy(&self) {}
    }

    #[test]
    fn queue_full_then_retry_succeeds() {
        use crate::config::{AncillaryConfig, BaselineConfig};
        let transport = StubTransport {
            sent: AtomicUsize::new(0),
            fail_once: Mutex::new(true),
        };
        let cfg = BaselineConfig::Ancillary(AncillaryConfig { version: 1 });
        let ts = PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        };
        let first = transport
            .tx_payload(StreamKind::Ancillary, &cfg, ts, &[])
            .unwrap();
        assert_eq!(first, TxOutcome::QueueFull);
        let second = transport
            .tx_payload(StreamKind::Ancillary, &cfg, ts, &[])
            .unwrap();
        assert_eq!(second, TxOutcome::Sent);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    }
}
