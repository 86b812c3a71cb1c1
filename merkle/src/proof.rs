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

use crate::hasher::{Digest, MerkleHasher};

/// Check a single-leaf inclusion proof against a committed root.
///
/// `proof_set[0]` is the raw leaf data; subsequent elements are subtree
/// roots, ordered bottom-up. Returns `true` iff every element is consumed
/// and the folded result equals `root`.
pub fn verify_proof<H: MerkleHasher>(
    hasher: &H,
    root: &Digest,
    proof_set: &[Vec<u8>],
    prove_index: u64,
    num_leaves: u64,
) -> bool {
    if num_leaves == 0 || prove_index >= num_leaves || proof_set.is_empty() {
        return false;
    }

    let mut height = 1usize;
    let mut sum = hasher.hash_leaf(&proof_set[0]);

    // Climb while the subtree at the current height is complete, picking the
    // join side from the position of the proof index within the subtree.
    // `stable_end` is the last index of the deepest complete subtree seen.
    let mut stable_end = prove_index;
    loop {
        let subtree_size = match 1u64.checked_shl(height as u32) {
            Some(size) => size,
            None => return false,
        };
        let subtree_start = (prove_index / subtree_size) * subtree_size;
        let subtree_end = subtree_start + subtree_size - 1;
        if subtree_end >= num_leaves {
            break;
        }
        stable_end = subtree_end;

        let sibling = match proof_set.get(height) {
            Some(sibling) if sibling.len() == 32 => digest(sibling),
            _ => return false,
        };
        if prove_index - subtree_start < subtree_size / 2 {
            sum = hasher.hash_node(&sum, &sibling);
        } else {
            sum = hasher.hash_node(&sibling, &sum);
        }
        height += 1;
    }

    // A trailing incomplete subtree folds in on the right.
    if stable_end != num_leaves - 1 {
        let sibling = match proof_set.get(height) {
            Some(sibling) if sibling.len() == 32 => digest(sibling),
            _ => return false,
        };
        sum = hasher.hash_node(&sum, &sibling);
        height += 1;
    }

    // Every remaining element is the root of a larger subtree on the left.
    while height < proof_set.len() {
        let sibling = match proof_set.get(height) {
            Some(sibling) if sibling.len() == 32 => digest(sibling),
            _ => return false,
        };
        sum = hasher.hash_node(&sibling, &sum);
        height += 1;
    }

    sum == *root
}

fn digest(bytes: &[u8]) -> Digest {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}
