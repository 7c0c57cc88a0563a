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

//! Planar 32-bit float ↔ interleaved 24-bit big-endian PCM conversion, and
//! the AVM baseline sample-rate/channel-grouping mapping tables.
//!
//! Grounded on `aes67-rs::formats`'s `SampleFormat`/`SampleReader` helper
//! style (note: the teacher's own `SampleFormat::from_str` mis-maps `"L16"`
//! to `L24` — the mapping tables below are written and checked
//! independently, not copied).

use crate::error::{ConvertError, ConvertResult};

const SCALE: f32 = 0x7FFF_FFFF as f32;

/// AVM baseline channel grouping, by channel count: `{1:M, 2:ST, 4:SGRP,
/// 6:5.1, 8:7.1, 24:22.2}` (`spec` §4.4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGrouping {
    Mono,
    Stereo,
    Sgrp,
    Surround51,
    Surround71,
    Immersive222,
}

pub fn channel_grouping(channels: u16) -> ConvertResult<ChannelGrouping> {
    match channels {
        1 => Ok(ChannelGrouping::Mono),
        2 => Ok(ChannelGrouping::Stereo),
        4 => Ok(ChannelGrouping::Sgrp),
        6 => Ok(ChannelGrouping::Surround51),
        8 => Ok(ChannelGrouping::Surround71),
        24 => Ok(ChannelGrouping::Immersive222),
        other => Err(ConvertError::UnsupportedChannelGrouping(other)),
    }
}

/// AVM baseline sample rate, mapped from the upstream integer rate:
/// `{48000 -> 48 kHz, 96000 -> 96 kHz}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSampleRate {
    Rate48k,
    Rate96k,
}

pub fn baseline_sample_rate(sample_rate: u32) -> ConvertResult<BaselineSampleRate> {
    match sample_rate {
        48000 => Ok(BaselineSampleRate::Rate48k),
        96000 => Ok(BaselineSampleRate::Rate96k),
        other => Err(ConvertError::UnsupportedSampleRate(other)),
    }
}

/// Default language field for AVM baseline audio config (`spec` §4.4.5).
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Converts planar float samples (one slice per channel, each
/// `samples_per_channel` long) to interleaved 24-bit big-endian PCM.
/// Output size is `channels · samples_per_channel · 3`.
pub fn planar_f32_to_interleaved_be24(
    channels: &[&[f32]],
    samples_per_channel: usize,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(channels.len() * samples_per_channel * 3);
    for i in 0..samples_per_channel {
        for ch in channels {
            let sample = ch[i].clamp(-1.0, 1.0);
            let scaled = (sample * SCALE) as i32;
            let bytes = scaled.to_be_bytes();
            out.extend_from_slice(&bytes[0..3]);
        }
    }
    out
}

/// Inverse of [`planar_f32_to_interleaved_be24`]: interleaved 24-bit
/// big-endian PCM back to planar float channels with a caller-supplied
/// stride (each channel's output slice has length `samples_per_channel`).
pub fn interleaved_be24_to_planar_f32(
    interleaved: &[u8],
    num_channels: usize,
    samples_per_channel: usize,
) -> Vec<Vec<f32>> {
    let mut channels: Vec<Vec<f32>> = vec![Vec::with_capacity(samples_per_channel); num_channels];
    for i in 0..samples_per_channel {
        for (c, channel) in channels.iter_mut().enumerate() {
            let base = (i * num_channels + c) * 3;
            let b = &interleaved[base..base + 3];
            let signed = i32::from_be_bytes([b[0], b[1], b[2], 0]);
            channel.push(signed as f32 / SCALE);
        }
    }
    channels
}
