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

use crate::error::MerkleError;
use crate::hasher::{Blake2bHasher, Digest, MerkleHasher};

/// A single-leaf inclusion proof produced by [`Accumulator::prove`].
///
/// The first element of `proof_set` is the original leaf data at
/// `prove_index`; every subsequent element is a 32-byte subtree root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub root: Digest,
    pub proof_set: Vec<Vec<u8>>,
    pub prove_index: u64,
    pub num_leaves: u64,
}

/// An in-flight subtree. A subtree of height `h` covers `2^(h-1)` leaves.
#[derive(Clone, Debug)]
struct SubTree {
    height: usize,
    sum: Digest,
}

/// An incremental Merkle tree builder.
///
/// Leaves are absorbed one at a time; equal-height subtrees are merged as
/// they appear, so at any moment the in-flight subtrees have strictly
/// decreasing heights from oldest to newest. Calling [`set_index`] before
/// the first push additionally records the sibling hashes needed to prove
/// the membership of one leaf.
///
/// [`set_index`]: Accumulator::set_index
#[derive(Clone, Debug)]
pub struct Accumulator<H: MerkleHasher = Blake2bHasher> {
    hasher: H,
    // Oldest (largest) subtree first.
    stack: Vec<SubTree>,
    current_index: u64,
    proof_index: u64,
    proof_tracked: bool,
    proof_set: Vec<Vec<u8>>,
}

impl Default for Accumulator<Blake2bHasher> {
    fn default() -> Self {
        Self::new(Blake2bHasher)
    }
}

impl<H: MerkleHasher> Accumulator<H> {
    pub fn new(hasher: H) -> Self {
        Self {
            hasher,
            stack: vec![],
            current_index: 0,
            proof_index: 0,
            proof_tracked: false,
            proof_set: vec![],
        }
    }

    /// The number of leaves absorbed so far.
    pub fn num_leaves(&self) -> u64 {
        self.current_index
    }

    /// Select the leaf index that [`prove`](Accumulator::prove) will target.
    /// Must be called before the first [`push`](Accumulator::push).
    pub fn set_index(&mut self, index: u64) -> Result<(), MerkleError> {
        if self.current_index != 0 {
            return Err(MerkleError::AlreadyPushed);
        }
        self.proof_index = index;
        self.proof_tracked = true;
        Ok(())
    }

    /// Absorb one leaf.
    pub fn push(&mut self, leaf: &[u8]) {
        if self.proof_tracked && self.current_index == self.proof_index {
            self.proof_set.push(leaf.to_vec());
        }

        let mut new = SubTree {
            height: 1,
            sum: self.hasher.hash_leaf(leaf),
        };

        // Merge equal-height neighbors. Whenever the subtree being merged has
        // the same height as the proof set, one of the two halves is the
        // sibling of the half holding the proof index; record its root.
        while let Some(top) = self.stack.last() {
            if top.height != new.height {
                break;
            }
            if self.proof_tracked && new.height == self.proof_set.len() {
                // combined_size leaves span [start, start + combined_size).
                let combined_size = 1u64 << new.height;
                let start = (self.current_index / combined_size) * combined_size;
                let mid = start + combined_size / 2;
                if self.proof_index < mid {
                    self.proof_set.push(new.sum.to_vec());
                } else {
                    self.proof_set.push(top.sum.to_vec());
                }
            }
            let top = self.stack.pop().expect("peeked above");
            new = SubTree {
                height: new.height + 1,
                sum: self.hasher.hash_node(&top.sum, &new.sum),
            };
        }

        self.stack.push(new);
        self.current_index += 1;
    }

    /// The root over all absorbed leaves, or `None` if nothing was pushed.
    /// Leftover subtrees are folded together with the larger subtree always
    /// on the left; the accumulator itself is not altered.
    pub fn root(&self) -> Option<Digest> {
        let mut iter = self.stack.iter().rev();
        let mut sum = iter.next()?.sum;
        for subtree in iter {
            sum = self.hasher.hash_node(&subtree.sum, &sum);
        }
        Some(sum)
    }

    /// Produce the inclusion proof for the index selected with
    /// [`set_index`](Accumulator::set_index). Returns `None` if no leaves
    /// were pushed or the selected index was never reached.
    pub fn prove(&self) -> Option<Proof> {
        let root = self.root()?;
        if !self.proof_tracked || self.proof_set.is_empty() {
            return None;
        }

        let mut proof_set = self.proof_set.clone();

        // The proof set already covers the completed subtree containing the
        // proof index; its height equals the proof set length. Subtrees
        // newer (smaller) than it are combined into a single root and
        // appended, then every older (larger) subtree follows in increasing
        // height order.
        let proof_height = proof_set.len();
        let mut idx = self.stack.len();
        let mut tail: Option<Digest> = None;
        while idx > 0 && self.stack[idx - 1].height < proof_height {
            idx -= 1;
            tail = Some(match tail {
                None => self.stack[idx].sum,
                Some(sum) => self.hasher.hash_node(&self.stack[idx].sum, &sum),
            });
        }
        if let Some(sum) = tail {
            proof_set.push(sum.to_vec());
        }

        // stack[idx - 1] is the subtree holding the proof index; skip it.
        debug_assert!(idx > 0 && self.stack[idx - 1].height == proof_height);
        for subtree in self.stack[..idx.saturating_sub(1)].iter().rev() {
            proof_set.push(subtree.sum.to_vec());
        }

        Some(Proof {
            root,
            proof_set,
            prove_index: self.proof_index,
            num_leaves: self.current_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::verify_proof;

    fn leaves(n: u64) -> Vec<Vec<u8>> {
        (0..n).map(|i| i.to_le_bytes().to_vec()).collect()
    }

    #[test]
    fn empty_accumulator_has_no_root() {
        let acc = Accumulator::default();
        assert_eq!(acc.root(), None);
        assert!(acc.prove().is_none());
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let mut acc = Accumulator::default();
        acc.push(b"segment");
        assert_eq!(acc.root(), Some(Blake2bHasher.hash_leaf(b"segment")));
    }

    #[test]
    fn root_matches_manual_construction() {
        // Five leaves: ((0,1),(2,3)) joined with the orphan 4 on the right.
        let h = Blake2bHasher;
        let data = leaves(5);
        let l: Vec<Digest> = data.iter().map(|d| h.hash_leaf(d)).collect();
        let n01 = h.hash_node(&l[0], &l[1]);
        let n23 = h.hash_node(&l[2], &l[3]);
        let n0123 = h.hash_node(&n01, &n23);
        let expected = h.hash_node(&n0123, &l[4]);

        let mut acc = Accumulator::default();
        for d in &data {
            acc.push(d);
        }
        assert_eq!(acc.root(), Some(expected));
    }

    #[test]
    fn set_index_after_push_fails() {
        let mut acc = Accumulator::default();
        acc.push(b"leaf");
        assert!(matches!(acc.set_index(0), Err(MerkleError::AlreadyPushed)));
    }

    #[test]
    fn proof_roundtrip_small_trees() {
        // Exhaustive check over every (size, index) pair for small trees,
        // including the incomplete sizes.
        for n in 1..=17u64 {
            for i in 0..n {
                let mut acc = Accumulator::default();
                acc.set_index(i).unwrap();
                for d in &leaves(n) {
                    acc.push(d);
                }
                let proof = acc.prove().expect("proof must exist");
                assert_eq!(proof.num_leaves, n);
                assert_eq!(proof.prove_index, i);
                assert_eq!(Some(proof.root), acc.root());
                assert!(
                    verify_proof(&Blake2bHasher, &proof.root, &proof.proof_set, i, n),
                    "proof failed for n={} i={}",
                    n,
                    i
                );

                // The proof must not verify for any other index.
                for j in 0..n {
                    if j != i {
                        assert!(
                            !verify_proof(&Blake2bHasher, &proof.root, &proof.proof_set, j, n),
                            "proof for i={} verified at j={} (n={})",
                            i,
                            j,
                            n
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn proof_rejects_tampered_leaf() {
        let mut acc = Accumulator::default();
        acc.set_index(3).unwrap();
        for d in &leaves(9) {
            acc.push(d);
        }
        let mut proof = acc.prove().unwrap();
        proof.proof_set[0] = b"not the leaf".to_vec();
        assert!(!verify_proof(
            &Blake2bHasher,
            &proof.root,
            &proof.proof_set,
            3,
            9
        ));
    }

    #[test]
    fn proof_rejects_truncated_set() {
        let mut acc = Accumulator::default();
        acc.set_index(5).unwrap();
        for d in &leaves(12) {
            acc.push(d);
        }
        let mut proof = acc.prove().unwrap();
        proof.proof_set.pop();
        assert!(!verify_proof(
            &Blake2bHasher,
            &proof.root,
            &proof.proof_set,
            5,
            12
        ));
    }
}
