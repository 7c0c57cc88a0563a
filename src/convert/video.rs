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

//! Video pixel-layout mapping and 10-bit → 8-bit repacking.

use crate::error::{ConvertError, ConvertResult};
use crate::frame::PixelLayout;

/// AVM baseline pixel format, the target of the upstream {@link
/// PixelLayout} mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselinePixelFormat {
    YCbCr422,
    YCbCr422Alpha,
    Rgb,
    RgbAlpha,
}

/// Colorimetry inferred purely from horizontal resolution (`spec` §4.4.5):
/// `<1280 -> BT.709`, `>1920 -> BT.2020`, otherwise `BT.709`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorimetry {
    Bt709,
    Bt2020,
}

pub fn colorimetry_for_width(width: u32) -> Colorimetry {
    if width > 1920 {
        Colorimetry::Bt2020
    } else {
        Colorimetry::Bt709
    }
}

/// Maps an upstream pixel-layout FOURCC onto the AVM baseline pixel format.
/// Unrecognized layouts are a structural `InvalidPayload` condition.
pub fn map_pixel_layout(layout: PixelLayout) -> ConvertResult<BaselinePixelFormat> {
    match layout {
        PixelLayout::Uyvy => Ok(BaselinePixelFormat::YCbCr422),
        PixelLayout::Uyva => Ok(BaselinePixelFormat::YCbCr422Alpha),
        PixelLayout::Nv12 => Ok(BaselinePixelFormat::YCbCr422),
        PixelLayout::Rgba => Ok(BaselinePixelFormat::RgbAlpha),
        PixelLayout::Rgbx => Ok(BaselinePixelFormat::Rgb),
    }
}

/// Repacks every 5 input bytes (4 samples at 10 bits each, packed MSB-first
/// across the 40-bit group) into 4 output bytes by truncating each 10-bit
/// sample to its high 8 bits. `input.len()` must be a multiple of 5.
///
/// The first sample's high 8 bits are exactly the group's first byte; the
/// remaining three samples' high 8 bits are read off a 32-bit big-endian
/// view of the other four bytes, at shifts 22/12/2 (each sample starts 10
/// bits after the previous one and only the top 8 of each are kept).
pub fn repack_10_to_8(input: &[u8]) -> ConvertResult<Vec<u8>> {
    if input.len() % 5 != 0 {
        return Err(ConvertError::UnsupportedBitDepth(10));
    }
    let mut out = Vec::with_capacity(input.len() / 5 * 4);
    for group in input.chunks_exact(5) {
        let word = u32::from_be_bytes([group[1], group[2], group[3], group[4]]);
        out.push(group[0]);
        out.push(((word >> 22) & 0xFF) as u8);
        out.push(((word >> 12) & 0xFF) as u8);
        out.push(((word >> 2) & 0xFF) as u8);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colorimetry_thresholds() {
        assert_eq!(colorimetry_for_width(1279), Colorimetry::Bt709);
        assert_eq!(colorimetry_for_width(1920), Colorimetry::Bt709);
        assert_eq!(colorimetry_for_width(1921), Colorimetry::Bt2020);
    }

    #[test]
    fn pixel_layout_mapping_round_trip() {
        assert_eq!(
            map_pixel_layout(PixelLayout::Uyvy).unwrap(),
            BaselinePixelFormat::YCbCr422
        );
        assert_eq!(
            map_pixel_layout(PixelLayout::Rgba).unwrap(),
            BaselinePixelFormat::RgbAlpha
        );
    }

    #[test]
    fn repack_10_to_8_matches_high_byte_rule() {
        // 4 samples each 0b11_1111_1100 (0x3FC, top 8 bits = 0xFF) packed
        // MSB-first across the remaining 4 bytes of the 5-byte group.
        let group: [u8; 5] = [0x00, 0xFF, 0xFF, 0xFF, 0xFC];
        let out = repack_10_to_8(&group).unwrap();
        assert_eq!(out.len(), 4);
        let word = u32::from_be_bytes([group[1], group[2], group[3], group[4]]);
        assert_eq!(out[0], group[0]);
        assert_eq!(out[1], ((word >> 22) & 0xFF) as u8);
        assert_eq!(out[2], ((word >> 12) & 0xFF) as u8);
        assert_eq!(out[3], ((word >> 2) & 0xFF) as u8);
    }

    #[test]
    fn repack_rejects_non_multiple_of_5() {
        assert!(repack_10_to_8(&[0u8; 4]).is_err());
    }
}
