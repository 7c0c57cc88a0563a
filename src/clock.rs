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

//! PTP timestamp synthesis for the outgoing AVM stream.
//!
//! Generalizes `aes67-rs::time::{Clock, MediaClock}`: instead of
//! disciplining a system/PHC/statime clock, the bridge's default clock
//! free-runs from `connection_start_time` plus per-stream frame/sample
//! counters, decoupling the outgoing PTP from upstream jitter (`spec`
//! §4.4.3/§4.4.6). An optional mode derives the timestamp from the
//! upstream frame's own 100 ns timestamp instead.

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// `{seconds: u32, nanoseconds: u32}`, per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpTimestamp {
    pub seconds: u32,
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    pub fn from_nanos_since_epoch(total_nanos: u64) -> Self {
        PtpTimestamp {
            seconds: (total_nanos / NANOS_PER_SEC) as u32,
            nanoseconds: (total_nanos % NANOS_PER_SEC) as u32,
        }
    }

    pub fn to_nanos(self) -> u64 {
        self.seconds as u64 * NANOS_PER_SEC + self.nanoseconds as u64
    }

    /// Splits an upstream 100 ns timestamp into seconds+nanoseconds, for
    /// `use_ndi_timestamps` mode.
    pub fn from_100ns_ticks(ticks_100ns: u64) -> Self {
        Self::from_nanos_since_epoch(ticks_100ns * 100)
    }
}

/// Synthesizes outgoing PTP timestamps from frame/sample counters rooted at
/// `connection_start_time`. One instance per connection; video/metadata
/// share a frame counter, audio uses a sample counter, matching `spec`
/// §4.4.3's `total_video_frames`/`total_audio_samples` atomic counters.
#[derive(Debug, Clone, Copy)]
pub struct BridgeClock {
    start: PtpTimestamp,
}

impl BridgeClock {
    pub fn new(start: PtpTimestamp) -> Self {
        BridgeClock { start }
    }

    /// `start_time + frame_count · rate_den · 1e9 / rate_num` ns.
    pub fn video_timestamp(&self, frame_count: u64, rate_num: u32, rate_den: u32) -> PtpTimestamp {
        let offset_nanos =
            (frame_count as u128 * rate_den as u128 * NANOS_PER_SEC as u128) / rate_num as u128;
        PtpTimestamp::from_nanos_since_epoch(self.start.to_nanos() + offset_nanos as u64)
    }

    /// `start_time + sample_count · 1e9 / sample_rate` ns.
    pub fn audio_timestamp(&self, sample_count: u64, sample_rate: u32) -> PtpTimestamp {
        let offset_nanos = (sample_count as u128 * NANOS_PER_SEC as u128) / sample_rate as u128;
        PtpTimestamp::from_nanos_since_epoch(self.start.to_nanos() + offset_nanos as u64)
    }

    /// Duration of one video frame in nanoseconds: `rate_den · 1e9 /
    /// rate_num`, used by the repeat-frame deadline computation.
    pub fn frame_period_nanos(rate_num: u32, rate_den: u32) -> u64 {
        ((rate_den as u128 * NANOS_PER_SEC as u128) / rate_num as u128) as u64
    }
}
