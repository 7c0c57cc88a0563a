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

//! Per-connection statistics, simplified from the teacher's
//! `MonitoringEvent`/`Report`-over-a-channel shape (`aes67-rs/src/
//! monitoring.rs`) into a plain atomic-counters struct cloned into every
//! bridge worker — the supplemented "Connection statistics surface"
//! feature.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a connection's running counters (`spec` §5's `ref_count`,
/// `payload_cb_count`, `total_video_frames`, `total_audio_samples`, plus
/// the diagnostics counters named in `spec` §4.4.2/§7).
#[derive(Debug, Default)]
pub struct BridgeStats {
    payload_cb_count: AtomicU64,
    total_video_frames: AtomicU64,
    total_audio_samples: AtomicU64,
    repeat_frame_count: AtomicU64,
    parity_error_count: AtomicU64,
    checksum_error_count: AtomicU64,
}

/// Immutable point-in-time read of [`BridgeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStatsSnapshot {
    pub payload_cb_count: u64,
    pub total_video_frames: u64,
    pub total_audio_samples: u64,
    pub repeat_frame_count: u64,
    pub parity_error_count: u64,
    pub checksum_error_count: u64,
}

impl BridgeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(BridgeStats::default())
    }

    pub fn record_payload_callback(&self) {
        self.payload_cb_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_frame(&self) -> u64 {
        self.total_video_frames.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_audio_samples(&self, count: u64) -> u64 {
        self.total_audio_samples.fetch_add(count, Ordering::Relaxed)
    }

    pub fn record_repeat_frame(&self) {
        self.repeat_frame_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parity_error(&self) {
        self.parity_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checksum_error(&self) {
        self.checksum_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            payload_cb_count: self.payload_cb_count.load(Ordering::Relaxed),
            total_video_frames: self.total_video_frames.load(Ordering::Relaxed),
            total_audio_samples: self.total_audio_samples.load(Ordering::Relaxed),
            repeat_frame_count: self.repeat_frame_count.load(Ordering::Relaxed),
            parity_error_count: self.parity_error_count.load(Ordering::Relaxed),
            checksum_error_count: self.checksum_error_count.load(Ordering::Relaxed),
        }
    }
}
