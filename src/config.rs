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

//! `BaselineConfig` and the bridge `ConnectionConfig`, following
//! `aes67-rs/src/config.rs`'s `#[serde(rename_all = "camelCase")]` /
//! `#[serde(default = "...")]` convention.

use crate::convert::audio::{baseline_sample_rate, channel_grouping, DEFAULT_LANGUAGE};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sampling {
    Yuv422,
    Yuv444,
    Rgb444,
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Yuv422
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Range {
    Narrow,
    Full,
}

impl Default for Range {
    fn default() -> Self {
        Range::Narrow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tcs {
    Sdr,
    Hdr,
    Pq,
}

impl Default for Tcs {
    fn default() -> Self {
        Tcs::Sdr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterlaceMode {
    Progressive,
    InterlacedInterleaved,
}

impl Default for InterlaceMode {
    fn default() -> Self {
        InterlaceMode::Progressive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelAspectRatio {
    pub width: u32,
    pub height: u32,
}

fn default_par() -> PixelAspectRatio {
    PixelAspectRatio {
        width: 1,
        height: 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PictureWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Video leg of `BaselineConfig` (`spec` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub rate_num: u32,
    pub rate_den: u32,
    pub bit_depth: u8,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub interlace_mode: InterlaceMode,
    #[serde(default)]
    pub range: Range,
    #[serde(default)]
    pub tcs: Tcs,
    #[serde(default = "default_par")]
    pub pixel_aspect_ratio: PixelAspectRatio,
    pub picture_window: PictureWindow,
}

impl VideoConfig {
    /// Colorimetry is derived, never configured (`spec` §4.4.5).
    pub fn colorimetry(&self) -> crate::convert::video::Colorimetry {
        crate::convert::video::colorimetry_for_width(self.width)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.bit_depth != 8 && self.bit_depth != 10 {
            return Err(ConfigError::Invalid(format!(
                "unsupported video bit depth {}, only 8 and 10 are supported",
                self.bit_depth
            )));
        }
        if self.rate_num == 0 || self.rate_den == 0 {
            return Err(ConfigError::Invalid(
                "video frame rate numerator/denominator must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Audio leg of `BaselineConfig` (`spec` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub channels: u16,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_owned()
}

impl AudioConfig {
    fn validate(&self) -> ConfigResult<()> {
        baseline_sample_rate(self.sample_rate)?;
        channel_grouping(self.channels)?;
        Ok(())
    }
}

/// Ancillary leg of `BaselineConfig` (`spec` §3): carries only a protocol
/// version per spec.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AncillaryConfig {
    #[serde(default = "default_anc_version")]
    pub version: u8,
}

fn default_anc_version() -> u8 {
    1
}

/// Tagged {video, audio, ancillary} baseline media configuration (`spec` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BaselineConfig {
    Video(VideoConfig),
    Audio(AudioConfig),
    Ancillary(AncillaryConfig),
}

impl BaselineConfig {
    /// Validates the mapping tables of `spec` §4.4.5 at construction time
    /// rather than deferring rejection to first-frame conversion.
    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            BaselineConfig::Video(v) => v.validate(),
            BaselineConfig::Audio(a) => a.validate(),
            BaselineConfig::Ancillary(_) => Ok(()),
        }
    }
}

/// Per-connection bridge configuration, the aggregate passed to
/// `bridge::Connection::spawn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub name: String,
    pub media: Vec<BaselineConfig>,
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default = "default_fifo_capacity")]
    pub fifo_capacity: usize,
    #[serde(default)]
    pub use_ndi_timestamps: bool,
}

fn default_pool_capacity() -> usize {
    8
}

fn default_fifo_capacity() -> usize {
    64
}

impl ConnectionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.media.is_empty() {
            return Err(ConfigError::Invalid(
                "connection config must carry at least one media leg".to_owned(),
            ));
        }
        for m in &self.media {
            m.validate()?;
        }
        if self.pool_capacity == 0 || self.fifo_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pool_capacity and fifo_capacity must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: ConnectionConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
