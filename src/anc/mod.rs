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

//! Bit-exact encode/decode of ancillary-data (VANC) packets.
//!
//! A payload is a two-word header (version + [`FieldKind`] + packet count)
//! followed by one bit-packed record per packet, each zero-padded to a
//! 32-bit boundary. See the module's wire-layout doc on [`packetize`] and
//! [`unpacketize`] for the exact bit layout.

mod bits;

use crate::error::{AncError, AncResult, Status};
use crate::sgl::SgList;
use bits::{BitReader, BitWriter, pack_udw9, pack_udw10, unpack_udw9, unpack_udw10};

const WIRE_VERSION: u8 = 1;
const HEADER_BYTES: usize = 8;

/// Field parity of a video frame carrying ancillary data. One value per
/// payload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldKind {
    Unspecified,
    Invalid,
    InterlacedFirst,
    InterlacedSecond,
}

impl FieldKind {
    fn to_wire(self) -> u8 {
        match self {
            FieldKind::Unspecified => 0,
            FieldKind::Invalid => 1,
            FieldKind::InterlacedFirst => 2,
            FieldKind::InterlacedSecond => 3,
        }
    }

    fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(FieldKind::Unspecified),
            1 => Some(FieldKind::Invalid),
            2 => Some(FieldKind::InterlacedFirst),
            3 => Some(FieldKind::InterlacedSecond),
            _ => None,
        }
    }
}

/// One VANC packet. `user_data[0..data_count]` holds the low 8 bits of each
/// UDW; UDW parity bits are computed on encode, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AncPacket {
    pub packet_offset: u32,
    pub packet_size: u32,
    pub is_color_difference_channel: bool,
    pub line_number: u16,
    pub horizontal_offset: u16,
    pub has_source_stream_number: bool,
    pub source_stream_number: u8,
    pub did: u8,
    pub sdid: u8,
    pub data_count: u8,
    pub user_data: Vec<u8>,
}

impl AncPacket {
    /// Validates the invariant `data_count <= 255` and that `user_data`
    /// holds exactly `data_count` bytes.
    pub fn validate(&self) -> AncResult<()> {
        if self.user_data.len() != self.data_count as usize {
            return Err(AncError::DataCountTooLarge(self.data_count));
        }
        if self.line_number > 0x7FF {
            return Err(AncError::EncodeError("line_number exceeds 11 bits".into()));
        }
        if self.horizontal_offset > 0xFFF {
            return Err(AncError::EncodeError(
                "horizontal_offset exceeds 12 bits".into(),
            ));
        }
        if self.source_stream_number > 0x7F {
            return Err(AncError::EncodeError(
                "source_stream_number exceeds 7 bits".into(),
            ));
        }
        Ok(())
    }
}

fn packet_bit_size(data_count: u8) -> usize {
    32 + 9 * 3 + data_count as usize * 10 + 9
}

fn packet_byte_size(data_count: u8) -> usize {
    packet_bit_size(data_count).div_ceil(32) * 4
}

/// Deterministic size in bytes of the serialized payload for a set of
/// packets whose UDW counts are `data_counts[i]`.
pub fn compute_size(data_counts: &[u8]) -> usize {
    HEADER_BYTES + data_counts.iter().map(|&dc| packet_byte_size(dc)).sum::<usize>()
}

fn checksum_of(did_w9: u32, sdid_w9: u32, dc_w9: u32, user_data_w9: &[u32]) -> u32 {
    let mut sum = did_w9 + sdid_w9 + dc_w9;
    for w in user_data_w9 {
        sum += w;
    }
    sum % 512
}

fn encode_packet(w: &mut BitWriter<'_>, packet: &AncPacket) -> AncResult<()> {
    packet.validate()?;

    w.write_bits(packet.is_color_difference_channel as u32, 1)?;
    w.write_bits(packet.line_number as u32, 11)?;
    w.write_bits(packet.horizontal_offset as u32, 12)?;
    w.write_bits(packet.has_source_stream_number as u32, 1)?;
    w.write_bits(packet.source_stream_number as u32, 7)?;

    let did_w9 = pack_udw9(packet.did);
    let sdid_w9 = pack_udw9(packet.sdid);
    let dc_w9 = pack_udw9(packet.data_count);

    w.write_bits(did_w9, 9)?;
    w.write_bits(sdid_w9, 9)?;
    w.write_bits(dc_w9, 9)?;

    let mut user_data_w9 = Vec::with_capacity(packet.user_data.len());
    for &byte in &packet.user_data {
        let w10 = pack_udw10(byte);
        w.write_bits(w10, 10)?;
        user_data_w9.push(w10 & 0x1FF);
    }

    let checksum = checksum_of(did_w9, sdid_w9, dc_w9, &user_data_w9);
    w.write_bits(checksum, 9)?;

    w.pad_to_32()?;
    Ok(())
}

/// Emits a two-word header then concatenates encoded packets in the order
/// produced by `produce_next`, writing into `buf`. Reports the number of
/// bytes written via `buf_size_bytes`.
pub fn packetize(
    field_kind: FieldKind,
    mut produce_next: impl FnMut() -> Option<AncPacket>,
    buf: &mut [u8],
    buf_size_bytes: &mut usize,
) -> Status {
    *buf_size_bytes = 0;

    if buf.len() < HEADER_BYTES {
        return Status::InvalidPayload;
    }

    let mut packets = Vec::new();
    while let Some(p) = produce_next() {
        packets.push(p);
    }

    let Ok(count) = u32::try_from(packets.len()) else {
        return Status::InvalidPayload;
    };

    let mut w = BitWriter::new(buf);
    if w.write_bits(WIRE_VERSION as u32, 8).is_err() {
        return Status::InvalidPayload;
    }
    let _ = w.write_bits(field_kind.to_wire() as u32, 8);
    let _ = w.write_bits(0, 16);
    let _ = w.write_bits(count, 32);

    for packet in &packets {
        if encode_packet(&mut w, packet).is_err() {
            return Status::InvalidPayload;
        }
    }

    *buf_size_bytes = w.bytes_written();
    Status::Ok
}

fn decode_packet(r: &mut BitReader<'_>) -> AncResult<(AncPacket, bool, bool)> {
    let is_color_difference_channel = r.read_bits(1)? != 0;
    let line_number = r.read_bits(11)? as u16;
    let horizontal_offset = r.read_bits(12)? as u16;
    let has_source_stream_number = r.read_bits(1)? != 0;
    let source_stream_number = r.read_bits(7)? as u8;

    let did_w9 = r.read_bits(9)?;
    let sdid_w9 = r.read_bits(9)?;
    let dc_w9 = r.read_bits(9)?;

    let (did, did_ok) = unpack_udw9(did_w9);
    let (sdid, sdid_ok) = unpack_udw9(sdid_w9);
    let (data_count, dc_ok) = unpack_udw9(dc_w9);

    let mut user_data = Vec::with_capacity(data_count as usize);
    let mut user_data_w9 = Vec::with_capacity(data_count as usize);
    for _ in 0..data_count {
        let w10 = r.read_bits(10)?;
        let (value, low9) = unpack_udw10(w10);
        user_data.push(value);
        user_data_w9.push(low9);
    }

    let checksum_stored = r.read_bits(9)?;
    let checksum_computed = checksum_of(did_w9, sdid_w9, dc_w9, &user_data_w9);

    r.skip_to_32();

    let packet = AncPacket {
        packet_offset: 0,
        packet_size: 0,
        is_color_difference_channel,
        line_number,
        horizontal_offset,
        has_source_stream_number,
        source_stream_number,
        did,
        sdid,
        data_count,
        user_data,
    };

    let has_parity_error = !(did_ok && sdid_ok && dc_ok);
    let has_checksum_error = checksum_stored != checksum_computed;

    Ok((packet, has_parity_error, has_checksum_error))
}

/// Decodes a payload gathered from `sgl`, calling `consume_next` once per
/// packet (and once with `None` on structural truncation would instead
/// return `InvalidPayload` without invoking the callback for that packet).
/// The packet count in the header is authoritative.
pub fn unpacketize(
    sgl: &SgList<'_>,
    mut consume_next: impl FnMut(FieldKind, Option<&AncPacket>, bool, bool),
) -> Status {
    let total = sgl.total_data_size();
    let mut payload = vec![0u8; total];
    let copied = crate::sgl::gather(sgl, 0, &mut payload);
    if copied != total {
        return Status::InvalidPayload;
    }

    if payload.len() < HEADER_BYTES {
        return Status::InvalidPayload;
    }

    let mut r = BitReader::new(&payload);
    let version = match r.read_bits(8) {
        Ok(v) => v as u8,
        Err(_) => return Status::InvalidPayload,
    };
    if version != WIRE_VERSION {
        return Status::InvalidPayload;
    }
    let field_kind_raw = match r.read_bits(8) {
        Ok(v) => v as u8,
        Err(_) => return Status::InvalidPayload,
    };
    let Some(field_kind) = FieldKind::from_wire(field_kind_raw) else {
        return Status::InvalidPayload;
    };
    if field_kind == FieldKind::Invalid {
        return Status::InvalidPayload;
    }
    let _reserved = r.read_bits(16);
    let count = match r.read_bits(32) {
        Ok(v) => v,
        Err(_) => return Status::InvalidPayload,
    };

    let mut any_error = false;
    for _ in 0..count {
        match decode_packet(&mut r) {
            Ok((packet, has_parity_error, has_checksum_error)) => {
                any_error |= has_parity_error || has_checksum_error;
                consume_next(field_kind, Some(&packet), has_parity_error, has_checksum_error);
            }
            Err(_) => return Status::InvalidPayload,
        }
    }

    if any_error {
        Status::RxPayloadError
    } else {
        Status::Ok
    }
}
