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

//! Reader/writer for `RIFF <size> CDI <chunk: FOURCC+size+payload>*` files
//! carrying ancillary-data (`ANC `) chunks.

use crate::error::{RiffError, RiffResult};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const FORM_TYPE: &[u8; 4] = b"CDI ";
const ANC_FOURCC: &[u8; 4] = b"ANC ";
const FILE_HEADER_LEN: u64 = 12;
const CHUNK_HEADER_LEN: u64 = 8;

/// Size bound applied to any chunk payload a reader will accept.
pub struct RiffStream {
    pub max_payload_size: u32,
}

impl Default for RiffStream {
    fn default() -> Self {
        RiffStream {
            max_payload_size: 64 * 1024 * 1024,
        }
    }
}

/// A RIFF reader positioned just after the 12-byte file header. `File`
/// loops: reaching EOF rewinds to the first chunk and retries once.
pub struct RiffReader {
    file: File,
}

impl RiffReader {
    /// Validates the `RIFF` marker and `CDI ` form type, leaving the file
    /// positioned after the 12-byte header.
    pub fn open_riff(path: impl AsRef<Path>) -> RiffResult<Self> {
        let mut file = File::open(path)?;
        let mut header = [0u8; 12];
        file.read_exact(&mut header)?;

        if &header[0..4] != b"RIFF" {
            return Err(RiffError::BadRiffMarker);
        }
        if &header[8..12] != FORM_TYPE {
            return Err(RiffError::BadFormType);
        }

        Ok(RiffReader { file })
    }

    /// Reads the next chunk header, returning its payload size. Rejects any
    /// FOURCC other than `ANC `. On EOF, rewinds to offset 12 and retries
    /// once (the file loops).
    pub fn next_chunk_size(&mut self, stream: &RiffStream) -> RiffResult<u32> {
        match self.read_chunk_header() {
            Ok(size) => Ok(self.check_payload_size(size, stream)?),
            Err(RiffError::TruncatedHeader) => {
                self.file.seek(SeekFrom::Start(FILE_HEADER_LEN))?;
                let size = self.read_chunk_header()?;
                self.check_payload_size(size, stream)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the payload of the chunk whose size was just returned by
    /// [`RiffReader::next_chunk_size`].
    pub fn read_chunk_payload(&mut self, size: u32) -> RiffResult<Vec<u8>> {
        let mut payload = vec![0u8; size as usize];
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn read_chunk_header(&mut self) -> RiffResult<u32> {
        let mut header = [0u8; 8];
        if self.file.read_exact(&mut header).is_err() {
            return Err(RiffError::TruncatedHeader);
        }
        let fourcc: [u8; 4] = header[0..4].try_into().expect("slice is 4 bytes");
        if &fourcc != ANC_FOURCC {
            return Err(RiffError::UnexpectedFourCc { found: fourcc });
        }
        Ok(u32::from_le_bytes(header[4..8].try_into().expect("slice is 4 bytes")))
    }

    fn check_payload_size(&self, size: u32, stream: &RiffStream) -> RiffResult<u32> {
        if size > stream.max_payload_size {
            return Err(RiffError::PayloadTooLarge {
                size,
                max: stream.max_payload_size,
            });
        }
        Ok(size)
    }
}

/// A RIFF writer. Writes a placeholder 12-byte header up front; `close`
/// patches in the final file size.
pub struct RiffWriter {
    file: File,
}

impl RiffWriter {
    pub fn create(path: impl AsRef<Path>) -> RiffResult<Self> {
        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&0u32.to_le_bytes())?;
        file.write_all(FORM_TYPE)?;
        Ok(RiffWriter { file })
    }

    /// Writes one `ANC ` chunk: an 8-byte chunk header followed by `payload`.
    pub fn write_anc_chunk(&mut self, payload: &[u8]) -> RiffResult<()> {
        self.file.write_all(ANC_FOURCC)?;
        self.file.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.file.write_all(payload)?;
        Ok(())
    }

    /// Seeks back and patches the file-size field: the stream's total
    /// length minus one `RiffChunkHeader` (the 8-byte `RIFF`+size prefix is
    /// not counted, matching the RIFF convention that the size field
    /// excludes itself and the `RIFF` tag).
    pub fn close(mut self) -> RiffResult<()> {
        let end = self.file.stream_position()?;
        let file_size = end - CHUNK_HEADER_LEN;
        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&(file_size as u32).to_le_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}
