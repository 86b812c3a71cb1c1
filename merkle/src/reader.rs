// Copyright (C) 2015-2021 Vaultos Systems Inc.
// This file is part of the vaultos library.

// The vaultos library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The vaultos library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the vaultos library. If not, see <https://www.gnu.org/licenses/>.

use std::io::Read;

use crate::accumulator::{Accumulator, Proof};
use crate::error::MerkleError;
use crate::hasher::{Digest, MerkleHasher};

/// Fill `buf` from `reader`, returning the number of bytes read. A short
/// count means the stream ended; the remainder of `buf` is zeroed.
fn read_segment<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    for byte in buf[filled..].iter_mut() {
        *byte = 0;
    }
    Ok(filled)
}

/// The Merkle root over a stream split into `segment_size` leaves. A final
/// short segment is zero-padded to the full segment size; an empty stream
/// has no leaves and therefore no root.
pub fn reader_root<H: MerkleHasher, R: Read>(
    hasher: H,
    reader: &mut R,
    segment_size: usize,
) -> Result<Option<Digest>, MerkleError> {
    let mut acc = Accumulator::new(hasher);
    let mut segment = vec![0u8; segment_size];
    loop {
        let n = read_segment(reader, &mut segment)?;
        if n == 0 {
            break;
        }
        acc.push(&segment);
    }
    Ok(acc.root())
}

/// Build the inclusion proof for segment `index` of a stream, with the same
/// padding rules as [`reader_root`].
pub fn reader_proof<H: MerkleHasher, R: Read>(
    hasher: H,
    reader: &mut R,
    segment_size: usize,
    index: u64,
) -> Result<Option<Proof>, MerkleError> {
    let mut acc = Accumulator::new(hasher);
    acc.set_index(index)?;
    let mut segment = vec![0u8; segment_size];
    loop {
        let n = read_segment(reader, &mut segment)?;
        if n == 0 {
            break;
        }
        acc.push(&segment);
    }
    Ok(acc.prove())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Blake2bHasher;
    use crate::proof::verify_proof;

    const SEGMENT_SIZE: usize = 64;

    #[test]
    fn empty_reader_has_no_root() {
        // An empty stream is treated as zero leaves, not as one zero-padded
        // segment.
        let mut empty: &[u8] = &[];
        let root = reader_root(Blake2bHasher, &mut empty, SEGMENT_SIZE).unwrap();
        assert_eq!(root, None);
    }

    #[test]
    fn short_reader_pads_with_zeros() {
        let data = b"less than one segment";
        let mut padded = data.to_vec();
        padded.resize(SEGMENT_SIZE, 0);

        let mut short: &[u8] = data;
        let mut full: &[u8] = &padded;
        let short_root = reader_root(Blake2bHasher, &mut short, SEGMENT_SIZE).unwrap();
        let full_root = reader_root(Blake2bHasher, &mut full, SEGMENT_SIZE).unwrap();
        assert!(short_root.is_some());
        assert_eq!(short_root, full_root);
    }

    #[test]
    fn reader_root_matches_accumulator() {
        let data: Vec<u8> = (0..=255u8).cycle().take(SEGMENT_SIZE * 3).collect();
        let mut acc = Accumulator::default();
        for chunk in data.chunks(SEGMENT_SIZE) {
            acc.push(chunk);
        }
        let mut reader: &[u8] = &data;
        let root = reader_root(Blake2bHasher, &mut reader, SEGMENT_SIZE).unwrap();
        assert_eq!(root, acc.root());
    }

    #[test]
    fn reader_proof_verifies_including_padded_tail() {
        // 4000 bytes: 62 full segments plus one 32-byte tail.
        let data: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let num_leaves = (data.len() + SEGMENT_SIZE - 1) / SEGMENT_SIZE;

        let mut reader: &[u8] = &data;
        let root = reader_root(Blake2bHasher, &mut reader, SEGMENT_SIZE)
            .unwrap()
            .unwrap();

        for index in [0u64, 1, 30, num_leaves as u64 - 1] {
            let mut reader: &[u8] = &data;
            let proof = reader_proof(Blake2bHasher, &mut reader, SEGMENT_SIZE, index)
                .unwrap()
                .unwrap();
            assert_eq!(proof.root, root);
            assert_eq!(proof.num_leaves, num_leaves as u64);
            assert!(verify_proof(
                &Blake2bHasher,
                &root,
                &proof.proof_set,
                index,
                num_leaves as u64
            ));
        }
    }

    #[test]
    fn reader_proof_for_out_of_range_index_is_none() {
        let data = [7u8; SEGMENT_SIZE * 2];
        let mut reader: &[u8] = &data[..];
        let proof = reader_proof(Blake2bHasher, &mut reader, SEGMENT_SIZE, 5).unwrap();
        assert!(proof.is_none());
    }
}
