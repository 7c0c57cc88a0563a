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

//! The transmit driver (bridge → AVM, `spec` §4.4.3) and the transmit
//! callback (AVM acknowledged send, `spec` §4.4.4). Grounded on
//! `aes67-rs::sender::Sender::send`'s build-payload/send/report-stats
//! shape; the MTU-exceeded early return becomes the `QueueFull`
//! bounded-retry loop this protocol calls for instead.

use crate::bridge::state::ConnectionState;
use crate::clock::{BridgeClock, PtpTimestamp};
use crate::config::{BaselineConfig, ConnectionConfig};
use crate::convert;
use crate::error::BridgeInternalResult;
use crate::fifo::{FifoReader, FifoWriter};
use crate::frame::{FrameBody, FrameData};
use crate::monitoring::BridgeStats;
use crate::pool::FramePool;
use crate::transport::{AvmTransport, StreamKind, TransportError, TxOutcome};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Upper bound on in-place retries of a `QueueFull` send (`spec` §4.4.3:
/// "retry the same payload with a bounded spin").
const MAX_QUEUE_FULL_RETRIES: u32 = 64;

pub struct TransmitDriver {
    payload_rx: FifoReader<Arc<FrameData>>,
    callback_tx: FifoWriter<Arc<FrameData>>,
    pool: Arc<FramePool<()>>,
    transport: Arc<dyn AvmTransport>,
    clock: BridgeClock,
    stats: Arc<BridgeStats>,
    connection: Arc<ConnectionConfig>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl TransmitDriver {
    pub fn new(
        payload_rx: FifoReader<Arc<FrameData>>,
        callback_tx: FifoWriter<Arc<FrameData>>,
        pool: Arc<FramePool<()>>,
        transport: Arc<dyn AvmTransport>,
        clock: BridgeClock,
        stats: Arc<BridgeStats>,
        connection: Arc<ConnectionConfig>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self {
        TransmitDriver {
            payload_rx,
            callback_tx,
            pool,
            transport,
            clock,
            stats,
            connection,
            state_rx,
        }
    }

    pub async fn run(mut self) -> BridgeInternalResult<()> {
        while let Some(frame) = self.payload_rx.read(None).await {
            self.send(frame).await?;
        }
        self.flush_remaining();
        Ok(())
    }

    /// Drains any payloads left queued once shutdown has been requested,
    /// disposing of each the same way a completed send would (`spec` §5:
    /// "an explicit `flush` before destroy").
    fn flush_remaining(&mut self) {
        for frame in self.payload_rx.flush() {
            self.finish_frame(frame);
        }
    }

    /// `spec` §4.4.7: payload production is gated on `Connected`; a
    /// payload produced while disconnected is discarded (frame released)
    /// without error.
    fn can_produce_payloads(&self) -> bool {
        self.state_rx.borrow().can_produce_payloads()
    }

    async fn send(&mut self, frame: Arc<FrameData>) -> BridgeInternalResult<()> {
        if !self.can_produce_payloads() {
            self.finish_frame(frame);
            return Ok(());
        }

        let stream = stream_kind_for(&frame.body);
        let config = self.connection.media.iter().find(|m| matches_stream(m, stream));
        let Some(config) = config else {
            warn!("no baseline config configured for stream {stream:?}, dropping payload");
            self.finish_frame(frame);
            return Ok(());
        };

        let (timestamp, payload) = match self.build_payload(&frame.body) {
            Ok(it) => it,
            Err(e) => {
                warn!("format conversion failed, dropping payload: {e}");
                self.finish_frame(frame);
                return Ok(());
            }
        };

        let mut attempts = 0;
        loop {
            match self.transport.tx_payload(stream, config, timestamp, &payload) {
                Ok(TxOutcome::Sent) => {
                    self.stats.record_payload_callback();
                    break;
                }
                Ok(TxOutcome::QueueFull) => {
                    attempts += 1;
                    if attempts >= MAX_QUEUE_FULL_RETRIES {
                        warn!("transport queue full after {attempts} retries, dropping payload");
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                Err(TransportError::ConnectionLost) => {
                    warn!("connection lost mid-send, dropping payload");
                    break;
                }
                Err(e) => {
                    warn!("transmit error, dropping payload: {e}");
                    break;
                }
            }
        }

        self.finish_frame(frame);
        Ok(())
    }

    fn build_payload(&mut self, body: &FrameBody) -> BridgeInternalResult<(PtpTimestamp, Vec<u8>)> {
        match body {
            FrameBody::Video(v) => {
                let use_ndi = self.connection.use_ndi_timestamps;
                let ts = if use_ndi {
                    PtpTimestamp::from_100ns_ticks(v.timestamp_100ns)
                } else {
                    let count = self.stats.record_video_frame();
                    self.clock.video_timestamp(count, v.rate_num, v.rate_den)
                };
                let payload = if v.bit_depth == 10 {
                    convert::video::repack_10_to_8(&v.data)?
                } else {
                    v.data.to_vec()
                };
                Ok((ts, payload))
            }
            FrameBody::Audio(a) => {
                let use_ndi = self.connection.use_ndi_timestamps;
                let ts = if use_ndi {
                    PtpTimestamp::from_100ns_ticks(a.timestamp_100ns)
                } else {
                    let count = self.stats.record_audio_samples(a.samples_per_channel as u64);
                    self.clock.audio_timestamp(count, a.sample_rate)
                };
                let channels: Vec<&[f32]> = (0..a.channels as usize)
                    .map(|c| &a.data[c * a.channel_stride..c * a.channel_stride + a.samples_per_channel])
                    .collect();
                let payload =
                    convert::audio::planar_f32_to_interleaved_be24(&channels, a.samples_per_channel);
                Ok((ts, payload))
            }
            FrameBody::Metadata(m) => {
                let ts = PtpTimestamp::from_100ns_ticks(m.timestamp_100ns);
                Ok((ts, m.data.to_vec()))
            }
        }
    }

    /// `spec` §4.4.4: video frames go onto the callback FIFO for
    /// ref-count-safe release by the receive worker; audio/metadata are
    /// released immediately since they were never shared with a repeat
    /// slot.
    fn finish_frame(&self, frame: Arc<FrameData>) {
        match &frame.body {
            FrameBody::Video(_) => {
                self.callback_tx.try_write(frame).ok();
            }
            FrameBody::Audio(_) | FrameBody::Metadata(_) => {
                if frame.release() {
                    self.pool.release(());
                }
            }
        }
    }
}

fn stream_kind_for(body: &FrameBody) -> StreamKind {
    match body {
        FrameBody::Video(_) => StreamKind::Video,
        FrameBody::Audio(_) => StreamKind::Audio,
        FrameBody::Metadata(_) => StreamKind::Ancillary,
    }
}

fn matches_stream(config: &BaselineConfig, stream: StreamKind) -> bool {
    matches!(
        (config, stream),
        (BaselineConfig::Video(_), StreamKind::Video)
            | (BaselineConfig::Audio(_), StreamKind::Audio)
            | (BaselineConfig::Ancillary(_), StreamKind::Ancillary)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PtpTimestamp;
    use crate::config::{AudioConfig, PictureWindow, PixelAspectRatio, VideoConfig};
    use crate::frame::{AudioFrameBody, PixelLayout, VideoFrameBody};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct CountingTransport {
        sent: Mutex<Vec<StreamKind>>,
    }

    impl AvmTransport for CountingTransport {
        fn tx_payload(
            &self,
            stream: StreamKind,
            _config: &BaselineConfig,
            _timestamp: PtpTimestamp,
            _payload: &[u8],
        ) -> Result<TxOutcome, TransportError> {
            self.sent.lock().unwrap().push(stream);
            Ok(TxOutcome::Sent)
        }

        fn rx_free_buffer(&self, _stream: StreamKind, _buffer: &[u8]) {}
        fn connection_destroy(&self) {}
    }

    fn connected_state() -> watch::Receiver<ConnectionState> {
        watch::channel(ConnectionState::Connected).1
    }

    fn connection_config() -> Arc<ConnectionConfig> {
        Arc::new(ConnectionConfig {
            name: "test".to_owned(),
            media: vec![
                BaselineConfig::Video(VideoConfig {
                    width: 1920,
                    height: 1080,
                    rate_num: 60000,
                    rate_den: 1001,
                    bit_depth: 8,
                    sampling: crate::config::Sampling::Yuv422,
                    interlace_mode: crate::config::InterlaceMode::Progressive,
                    range: crate::config::Range::Narrow,
                    tcs: crate::config::Tcs::Sdr,
                    pixel_aspect_ratio: PixelAspectRatio {
                        width: 1,
                        height: 1,
                    },
                    picture_window: PictureWindow {
                        x: 0,
                        y: 0,
                        width: 1920,
                        height: 1080,
                    },
                }),
                BaselineConfig::Audio(AudioConfig {
                    channels: 2,
                    sample_rate: 48000,
                    language: "eng".to_owned(),
                }),
            ],
            pool_capacity: 4,
            fifo_capacity: 16,
            use_ndi_timestamps: false,
        })
    }

    #[tokio::test]
    async fn video_frame_goes_onto_callback_fifo_not_pool() {
        let shutdown = CancellationToken::new();
        let (payload_tx, payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (callback_tx, mut callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let pool = FramePool::new(2, || ());
        let transport = Arc::new(CountingTransport {
            sent: Mutex::new(vec![]),
        });
        let clock = BridgeClock::new(PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        });
        let stats = BridgeStats::new();
        let mut driver = TransmitDriver::new(
            payload_rx,
            callback_tx,
            pool,
            transport.clone(),
            clock,
            stats,
            connection_config(),
            connected_state(),
        );
        let frame = Arc::new(FrameData::with_ref_count(
            FrameBody::Video(VideoFrameBody {
                width: 1920,
                height: 1080,
                pixel_layout: PixelLayout::Uyvy,
                bit_depth: 8,
                interlaced: false,
                rate_num: 60000,
                rate_den: 1001,
                data: Arc::from(vec![0u8; 8]),
                timestamp_100ns: 0,
            }),
            2,
        ));
        payload_tx.try_write(frame).unwrap();
        let received = driver.payload_rx.read(None).await.unwrap();
        driver.send(received).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert!(callback_rx.try_read().is_some());
    }

    #[tokio::test]
    async fn audio_frame_releases_to_pool_immediately() {
        let shutdown = CancellationToken::new();
        let (payload_tx, payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (callback_tx, _callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let pool = FramePool::new(1, || ());
        pool.try_acquire().unwrap();
        let transport = Arc::new(CountingTransport {
            sent: Mutex::new(vec![]),
        });
        let clock = BridgeClock::new(PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        });
        let stats = BridgeStats::new();
        let mut driver = TransmitDriver::new(
            payload_rx,
            callback_tx,
            pool.clone(),
            transport,
            clock,
            stats,
            connection_config(),
            connected_state(),
        );
        let frame = Arc::new(FrameData::new(FrameBody::Audio(AudioFrameBody {
            sample_rate: 48000,
            channels: 2,
            samples_per_channel: 4,
            channel_stride: 4,
            data: Arc::from(vec![0.0f32; 8]),
            timestamp_100ns: 0,
        })));
        payload_tx.try_write(frame).unwrap();
        let frame = driver.payload_rx.read(None).await.unwrap();
        driver.send(frame).await.unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn disconnected_state_discards_payload_without_sending() {
        let shutdown = CancellationToken::new();
        let (payload_tx, payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (callback_tx, _callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let pool = FramePool::new(1, || ());
        pool.try_acquire().unwrap();
        let transport = Arc::new(CountingTransport {
            sent: Mutex::new(vec![]),
        });
        let clock = BridgeClock::new(PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        });
        let stats = BridgeStats::new();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Draining);
        let mut driver = TransmitDriver::new(
            payload_rx,
            callback_tx,
            pool.clone(),
            transport.clone(),
            clock,
            stats,
            connection_config(),
            state_rx,
        );
        let frame = Arc::new(FrameData::new(FrameBody::Audio(AudioFrameBody {
            sample_rate: 48000,
            channels: 2,
            samples_per_channel: 4,
            channel_stride: 4,
            data: Arc::from(vec![0.0f32; 8]),
            timestamp_100ns: 0,
        })));
        payload_tx.try_write(frame).unwrap();
        let frame = driver.payload_rx.read(None).await.unwrap();
        driver.send(frame).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 0);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn flush_remaining_disposes_of_queued_payloads_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (payload_tx, payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (callback_tx, _callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let pool = FramePool::new(1, || ());
        pool.try_acquire().unwrap();
        let transport = Arc::new(CountingTransport {
            sent: Mutex::new(vec![]),
        });
        let clock = BridgeClock::new(PtpTimestamp {
            seconds: 0,
            nanoseconds: 0,
        });
        let stats = BridgeStats::new();
        let mut driver = TransmitDriver::new(
            payload_rx,
            callback_tx,
            pool.clone(),
            transport,
            clock,
            stats,
            connection_config(),
            connected_state(),
        );
        let frame = Arc::new(FrameData::new(FrameBody::Audio(AudioFrameBody {
            sample_rate: 48000,
            channels: 2,
            samples_per_channel: 4,
            channel_stride: 4,
            data: Arc::from(vec![0.0f32; 8]),
            timestamp_100ns: 0,
        })));
        payload_tx.try_write(frame).unwrap();
        drop(payload_tx);
        shutdown.cancel();
        driver.flush_remaining();
        assert_eq!(pool.available(), 1);
    }
}
