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

//! The receive worker (upstream → AVM, data flow B, `spec` §4.4.2).
//! Grounded on `aes67-rs::sender::Sender::run`'s `select!`-over-shutdown-
//! token loop shape, specialized to a timeout-driven poll instead of a
//! channel read since the upstream collaborator exposes a blocking
//! "capture" primitive rather than a `tokio` channel.

use crate::bridge::state::ConnectionState;
use crate::clock::BridgeClock;
use crate::error::{BridgeInternalError, BridgeInternalResult};
use crate::fifo::{FifoReader, FifoWriter};
use crate::frame::{FrameBody, FrameData};
use crate::monitoring::BridgeStats;
use crate::pool::FramePool;
use crate::transport::{CaptureEvent, UpstreamMedia};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound used for the repeat-frame deadline's "no video yet" case
/// (`spec` §4.4.2: "`current_time + 1.3·frame_period`, whichever is
/// appropriate").
const REPEAT_SLACK: f64 = 1.3;

pub struct ReceiveWorker {
    upstream: Arc<dyn UpstreamMedia>,
    pool: Arc<FramePool<()>>,
    payload_tx: FifoWriter<Arc<FrameData>>,
    callback_rx: FifoReader<Arc<FrameData>>,
    shutdown: CancellationToken,
    stats: Arc<BridgeStats>,
    state_rx: watch::Receiver<ConnectionState>,
    last_video_frame: Option<Arc<FrameData>>,
    last_video_time: Instant,
    frame_period: Duration,
    repeat_counter: u32,
}

impl ReceiveWorker {
    pub fn new(
        upstream: Arc<dyn UpstreamMedia>,
        pool: Arc<FramePool<()>>,
        payload_tx: FifoWriter<Arc<FrameData>>,
        callback_rx: FifoReader<Arc<FrameData>>,
        shutdown: CancellationToken,
        stats: Arc<BridgeStats>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self {
        ReceiveWorker {
            upstream,
            pool,
            payload_tx,
            callback_rx,
            shutdown,
            stats,
            state_rx,
            last_video_frame: None,
            last_video_time: Instant::now(),
            frame_period: Duration::from_millis(1),
            repeat_counter: 0,
        }
    }

    pub async fn run(mut self) -> BridgeInternalResult<()> {
        info!("receive worker started");
        while !self.shutdown.is_cancelled() {
            let timeout = self.capture_timeout();
            match self.upstream.capture(timeout) {
                Ok(Some(CaptureEvent::Frame(body))) => self.handle_frame(body)?,
                Ok(Some(CaptureEvent::StatusChange)) => debug!("upstream status change"),
                Ok(None) => self.maybe_repeat()?,
                Err(e) => {
                    error!("upstream capture failed fatally: {e}");
                    return Err(BridgeInternalError::Fatal(e.to_string()));
                }
            }
            self.drain_callback_fifo();
        }
        self.drain_callback_fifo();
        info!("receive worker stopped");
        Ok(())
    }

    /// The per-iteration capture timeout (`spec` §4.4.2): wake by
    /// `last_video_time + repeat_counter·frame_period`, or by
    /// `current_time + 1.3·frame_period` when no video has been seen yet.
    fn capture_timeout(&self) -> Duration {
        if self.last_video_frame.is_some() {
            let deadline =
                self.last_video_time + self.frame_period * (self.repeat_counter + 1);
            deadline.saturating_duration_since(Instant::now())
        } else {
            Duration::from_secs_f64(self.frame_period.as_secs_f64() * REPEAT_SLACK)
        }
    }

    fn handle_frame(&mut self, body: FrameBody) -> BridgeInternalResult<()> {
        if !self.can_produce_payloads() {
            self.upstream.release_frame(&body);
            return Ok(());
        }
        match body {
            FrameBody::Video(v) => {
                self.pool.try_acquire()?;
                self.frame_period =
                    Duration::from_nanos(BridgeClock::frame_period_nanos(v.rate_num, v.rate_den));
                let frame = Arc::new(FrameData::with_ref_count(FrameBody::Video(v), 2));
                if let Some(prev) = self.last_video_frame.take() {
                    if prev.release() {
                        self.pool.release(());
                    }
                }
                self.last_video_frame = Some(frame.clone());
                self.last_video_time = Instant::now();
                self.repeat_counter = 0;
                self.payload_tx
                    .try_write(frame)
                    .map_err(BridgeInternalError::from)
            }
            FrameBody::Audio(_) | FrameBody::Metadata(_) => {
                self.pool.try_acquire()?;
                let frame = Arc::new(FrameData::new(body));
                self.payload_tx
                    .try_write(frame)
                    .map_err(BridgeInternalError::from)
            }
        }
    }

    /// Re-posts the last-seen video frame once its repeat deadline has
    /// elapsed. This crate tracks repeat cadence via wall-clock deadlines
    /// rather than mutating the frame's embedded timestamp in place — the
    /// outgoing PTP timestamp is synthesized by the transmit driver from
    /// `BridgeClock`'s own frame counter (`spec` §4.4.3/§4.4.6), so the
    /// repeated frame's wire timestamp already advances by exactly one
    /// `frame_period` per repeat without needing to rewrite the frame body.
    fn maybe_repeat(&mut self) -> BridgeInternalResult<()> {
        if !self.can_produce_payloads() {
            return Ok(());
        }
        let Some(last) = self.last_video_frame.clone() else {
            return Ok(());
        };
        let deadline = self.last_video_time + self.frame_period * (self.repeat_counter + 1);
        if Instant::now() < deadline {
            return Ok(());
        }
        last.increment_ref_count();
        self.repeat_counter += 1;
        self.stats.record_repeat_frame();
        self.payload_tx
            .try_write(last)
            .map_err(BridgeInternalError::from)
    }

    /// Drains the callback FIFO non-blockingly, decrementing ref counts and
    /// releasing the pool slot for frames that reach zero (`spec` §4.4.2's
    /// "after each iteration it drains the callback FIFO"; also the
    /// callback FIFO's `spec` §5 "explicit flush before destroy" step when
    /// called one last time as the worker shuts down).
    fn drain_callback_fifo(&mut self) {
        for frame in self.callback_rx.flush() {
            if frame.release() {
                self.pool.release(());
            }
        }
    }

    fn can_produce_payloads(&self) -> bool {
        self.state_rx.borrow().can_produce_payloads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFrameBody, PixelLayout, VideoFrameBody};
    use crate::transport::UpstreamError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubUpstream {
        events: Mutex<Vec<Option<CaptureEvent>>>,
        calls: AtomicUsize,
    }

    impl UpstreamMedia for StubUpstream {
        fn capture(&self, _timeout: Duration) -> Result<Option<CaptureEvent>, UpstreamError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut events = self.events.lock().unwrap();
            if idx < events.len() {
                Ok(events[idx].take())
            } else {
                Ok(None)
            }
        }

        fn release_frame(&self, _body: &FrameBody) {}

        fn deliver(&self, _body: FrameBody) {}

        fn destroy(&self) {}
    }

    fn video_body() -> FrameBody {
        FrameBody::Video(VideoFrameBody {
            width: 1920,
            height: 1080,
            pixel_layout: PixelLayout::Uyvy,
            bit_depth: 8,
            interlaced: false,
            rate_num: 60000,
            rate_den: 1001,
            data: Arc::from(vec![0u8; 4]),
            timestamp_100ns: 0,
        })
    }

    fn connected_state() -> watch::Receiver<ConnectionState> {
        watch::channel(ConnectionState::Connected).1
    }

    fn audio_body() -> FrameBody {
        FrameBody::Audio(AudioFrameBody {
            sample_rate: 48000,
            channels: 2,
            samples_per_channel: 4,
            channel_stride: 4,
            data: Arc::from(vec![0.0f32; 8]),
            timestamp_100ns: 0,
        })
    }

    #[tokio::test]
    async fn video_frame_is_pooled_and_queued_with_ref_count_two() {
        let upstream = Arc::new(StubUpstream {
            events: Mutex::new(vec![Some(CaptureEvent::Frame(video_body()))]),
            calls: AtomicUsize::new(0),
        });
        let pool = FramePool::new(2, || ());
        let shutdown = CancellationToken::new();
        let (payload_tx, mut payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (_callback_tx, callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let stats = BridgeStats::new();
        let mut worker = ReceiveWorker::new(
            upstream, pool, payload_tx, callback_rx, shutdown, stats, connected_state(),
        );
        worker.handle_frame(video_body()).unwrap();
        let frame = payload_rx.read(None).await.unwrap();
        assert_eq!(frame.ref_count(), 2);
    }

    #[tokio::test]
    async fn pool_exhaustion_is_fatal() {
        let upstream = Arc::new(StubUpstream {
            events: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let pool = FramePool::new(0, || ());
        let shutdown = CancellationToken::new();
        let (payload_tx, _payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (_callback_tx, callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let stats = BridgeStats::new();
        let mut worker = ReceiveWorker::new(
            upstream, pool, payload_tx, callback_rx, shutdown, stats, connected_state(),
        );
        assert!(worker.handle_frame(audio_body()).is_err());
    }

    #[tokio::test]
    async fn callback_drain_releases_pool_slot_once() {
        let upstream = Arc::new(StubUpstream {
            events: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let pool = FramePool::new(1, || ());
        pool.try_acquire().unwrap();
        let shutdown = CancellationToken::new();
        let (payload_tx, _payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (callback_tx, callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let stats = BridgeStats::new();
        let mut worker = ReceiveWorker::new(
            upstream, pool.clone(), payload_tx, callback_rx, shutdown, stats, connected_state(),
        );
        let frame = Arc::new(FrameData::with_ref_count(audio_body(), 1));
        callback_tx.try_write(frame).unwrap();
        worker.drain_callback_fifo();
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn disconnected_state_discards_frame_without_pooling() {
        let upstream = Arc::new(StubUpstream {
            events: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        });
        let pool = FramePool::new(1, || ());
        let shutdown = CancellationToken::new();
        let (payload_tx, mut payload_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let (_callback_tx, callback_rx) = crate::fifo::bounded_fifo(4, shutdown.clone());
        let stats = BridgeStats::new();
        let (_state_tx, state_rx) = watch::channel(ConnectionState::WaitingForPeer);
        let mut worker = ReceiveWorker::new(
            upstream, pool.clone(), payload_tx, callback_rx, shutdown, stats, state_rx,
        );
        worker.handle_frame(audio_body()).unwrap();
        assert_eq!(pool.available(), 1);
        assert!(payload_rx.try_read().is_none());
    }
}
