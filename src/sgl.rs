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

//! Scatter-gather list: a borrowed, singly-linked sequence of memory ranges
//! describing a logically contiguous byte range without copying.
//!
//! Entries never own their bytes — the producer does, for as long as the
//! `SgList` is alive. This mirrors the raw-pointer discipline
//! `AudioBufferPointer` uses in the teacher's buffer module: a view, not an
//! owner.

/// One entry of an [`SgList`]: a borrowed byte range.
#[derive(Debug, Clone, Copy)]
pub struct SglEntry<'a> {
    bytes: &'a [u8],
}

impl<'a> SglEntry<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        SglEntry { bytes }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// An ordered sequence of borrowed byte ranges. `total_data_size` always
/// equals the sum of each entry's `size_in_bytes`.
#[derive(Debug, Clone, Default)]
pub struct SgList<'a> {
    entries: Vec<SglEntry<'a>>,
    total_data_size: usize,
}

impl<'a> SgList<'a> {
    pub fn new() -> Self {
        SgList {
            entries: Vec::new(),
            total_data_size: 0,
        }
    }

    pub fn with_entry(bytes: &'a [u8]) -> Self {
        let mut sgl = SgList::new();
        sgl.push(bytes);
        sgl
    }

    /// Appends a borrowed byte range. Zero-length entries are kept (they
    /// contribute nothing to `gather`, but the iteration law still holds).
    pub fn push(&mut self, bytes: &'a [u8]) {
        self.total_data_size += bytes.len();
        self.entries.push(SglEntry::new(bytes));
    }

    pub fn total_data_size(&self) -> usize {
        self.total_data_size
    }

    pub fn entries(&self) -> &[SglEntry<'a>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Asserts the iteration law: `Σ entry.size_in_bytes == total_data_size`.
    /// A producer that violates this has a bug; callers of this crate's test
    /// suite should assert both sides rather than trust the cached total.
    pub fn assert_consistent(&self) {
        let sum: usize = self.entries.iter().map(SglEntry::size_in_bytes).sum();
        assert_eq!(
            sum, self.total_data_size,
            "SgList total_data_size disagrees with the sum of entry sizes"
        );
    }
}

/// Copies up to `dest.len()` bytes starting at logical offset `start_offset`
/// from the concatenation of `sgl`'s entries into `dest`. Returns the number
/// of bytes actually written: `min(dest.len(), sgl.total_data_size() -
/// start_offset)`, or 0 if `start_offset >= sgl.total_data_size()`.
///
/// Pure: no allocation, no mutation of `sgl`. Skips zero-length entries.
/// Never reads past an entry's own length.
pub fn gather(sgl: &SgList<'_>, start_offset: usize, dest: &mut [u8]) -> usize {
    if start_offset >= sgl.total_data_size() || dest.is_empty() {
        return 0;
    }

    let mut logical_pos = 0usize;
    let mut written = 0usize;

    for entry in sgl.entries() {
        let entry_len = entry.size_in_bytes();
        if entry_len == 0 {
            continue;
        }
        let entry_end = logical_pos + entry_len;

        if entry_end > start_offset && written < dest.len() {
            let local_start = start_offset.saturating_sub(logical_pos);
            let available_in_entry = entry_len - local_start;
            let remaining_dest = dest.len() - written;
            let to_copy = available_in_entry.min(remaining_dest);

            dest[written..written + to_copy]
                .copy_from_slice(&entry.bytes[local_start..local_start + to_copy]);
            written += to_copy;

            if written >= dest.len() {
                break;
            }
        }

        logical_pos = entry_end;
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_gather() {
        let bytes: Vec<u8> = (0..=255).collect();
        let sgl = SgList::with_entry(&bytes[0..256]);
        let mut dest = [0u8; 256];
        let n = gather(&sgl, 0, &mut dest);
        assert_eq!(n, 256);
        assert_eq!(&dest[..], &bytes[0..256]);
    }

    #[test]
    fn split_gather_with_offset() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mut sgl = SgList::new();
        sgl.push(&bytes[10..28]);
        sgl.push(&bytes[16..17]);
        sgl.push(&bytes[33..58]);
        sgl.assert_consistent();

        let logical: Vec<u8> = bytes[10..28]
            .iter()
            .chain(bytes[16..17].iter())
            .chain(bytes[33..58].iter())
            .copied()
            .collect();

        let mut dest = [0u8; 25];
        let n = gather(&sgl, 9, &mut dest);
        assert_eq!(n, 25);
        assert_eq!(&dest[..], &logical[9..34]);
    }

    #[test]
    fn gather_boundary_at_total_size_returns_zero() {
        let bytes = [1u8, 2, 3, 4];
        let sgl = SgList::with_entry(&bytes);
        let mut dest = [0u8; 8];
        assert_eq!(gather(&sgl, 4, &mut dest), 0);
    }

    #[test]
    fn gather_unbounded_count_returns_total_size() {
        let bytes = [1u8, 2, 3, 4, 5];
        let sgl = SgList::with_entry(&bytes);
        let mut dest = [0u8; 1024];
        assert_eq!(gather(&sgl, 0, &mut dest), 5);
    }

    #[test]
    fn skips_zero_length_entries() {
        let a = [1u8, 2, 3];
        let b: [u8; 0] = [];
        let c = [4u8, 5];
        let mut sgl = SgList::new();
        sgl.push(&a);
        sgl.push(&b);
        sgl.push(&c);
        let mut dest = [0u8; 5];
        assert_eq!(gather(&sgl, 0, &mut dest), 5);
        assert_eq!(dest, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn iteration_law_holds_for_constructed_list() {
        let a = [0u8; 7];
        let b = [0u8; 3];
        let mut sgl = SgList::new();
        sgl.push(&a);
        sgl.push(&b);
        sgl.assert_consistent();
        assert_eq!(sgl.total_data_size(), 10);
    }
}
