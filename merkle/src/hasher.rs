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

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};

/// A 32-byte tree digest.
pub type Digest = [u8; 32];

pub type Blake2b256 = Blake2b<U32>;

// Domain separation prefixes. A leaf hash can never collide with an
// interior node hash.
const LEAF_PREFIX: &[u8] = &[0x00];
const NODE_PREFIX: &[u8] = &[0x01];

/// The hash function a tree is built with.
pub trait MerkleHasher: Clone {
    /// Hash a leaf into a height-1 subtree root.
    fn hash_leaf(&self, leaf: &[u8]) -> Digest;

    /// Combine two subtree roots into their parent.
    fn hash_node(&self, left: &Digest, right: &Digest) -> Digest;
}

/// The standard tree hasher: Blake2b-256 with leaf/node prefixes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Blake2bHasher;

impl MerkleHasher for Blake2bHasher {
    fn hash_leaf(&self, leaf: &[u8]) -> Digest {
        let mut hasher = Blake2b256::new();
        hasher.update(LEAF_PREFIX);
        hasher.update(leaf);
        hasher.finalize().into()
    }

    fn hash_node(&self, left: &Digest, right: &Digest) -> Digest {
        let mut hasher = Blake2b256::new();
        hasher.update(NODE_PREFIX);
        hasher.update(left);
        hasher.update(right);
        hasher.finalize().into()
    }
}
