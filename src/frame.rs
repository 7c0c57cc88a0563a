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

//! The upstream frame body: a disjoint union over {video, audio, metadata},
//! and the pooled, ref-counted wrapper the bridge moves through its FIFOs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Pixel layout FOURCC of an upstream video frame, pre-conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Uyvy,
    Uyva,
    Nv12,
    Rgba,
    Rgbx,
}

/// Upstream video frame body.
#[derive(Debug, Clone)]
pub struct VideoFrameBody {
    pub width: u32,
    pub height: u32,
    pub pixel_layout: PixelLayout,
    pub bit_depth: u8,
    pub interlaced: bool,
    pub rate_num: u32,
    pub rate_den: u32,
    pub data: Arc<[u8]>,
    /// 100 ns ticks, as delivered by the upstream source.
    pub timestamp_100ns: u64,
}

/// Upstream audio frame body: planar 32-bit float samples with a per-channel
/// stride.
#[derive(Debug, Clone)]
pub struct AudioFrameBody {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_channel: usize,
    pub channel_stride: usize,
    pub data: Arc<[f32]>,
    pub timestamp_100ns: u64,
}

/// Opaque ancillary/metadata frame body.
#[derive(Debug, Clone)]
pub struct MetadataFrameBody {
    pub data: Arc<[u8]>,
    pub timestamp_100ns: u64,
}

/// The tagged union carried by the bridge's FIFOs.
#[derive(Debug, Clone)]
pub enum FrameBody {
    Video(VideoFrameBody),
    Audio(AudioFrameBody),
    Metadata(MetadataFrameBody),
}

impl FrameBody {
    pub fn timestamp_100ns(&self) -> u64 {
        match self {
            FrameBody::Video(v) => v.timestamp_100ns,
            FrameBody::Audio(a) => a.timestamp_100ns,
            FrameBody::Metadata(m) => m.timestamp_100ns,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, FrameBody::Video(_))
    }
}

/// A pooled frame slot. Carries the upstream-format frame body, the receive
/// wall time, and a `ref_count` protecting shared lifetimes for repeated
/// video frames: the producer sets it to 2 (FIFO + repeat slot), the
/// transmit callback and the receive worker's repeat-slot release each
/// decrement it, and only the decrement that observes a post-decrement of 1
/// performs the actual upstream-frame release.
#[derive(Debug)]
pub struct FrameData {
    pub body: FrameBody,
    pub received_at: Instant,
    ref_count: AtomicU32,
}

impl FrameData {
    pub fn new(body: FrameBody) -> Self {
        FrameData {
            body,
            received_at: Instant::now(),
            ref_count: AtomicU32::new(1),
        }
    }

    pub fn with_ref_count(body: FrameBody, ref_count: u32) -> Self {
        FrameData {
            body,
            received_at: Instant::now(),
            ref_count: AtomicU32::new(ref_count),
        }
    }

    pub fn set_ref_count(&self, value: u32) {
        self.ref_count.store(value, Ordering::Release);
    }

    pub fn increment_ref_count(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the ref count. Returns `true` exactly once, for the
    /// decrement that observes the count reaching zero — that caller is the
    /// one responsible for releasing the upstream frame.
    pub fn release(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }
}
