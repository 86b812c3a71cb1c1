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

use std::fmt;
use std::io::{Read, Result as IoResult, Write};

use primitive_types::{U256, U512};

use crate::encoding::{FromBytes, ToBytes};
use crate::hash::BlockId;

/// A 32-byte proof-of-work target, compared as a big-endian integer. A block
/// id meets the target iff `id <= target`. Difficulty math treats a target
/// `t` as the difficulty `ROOT_DEPTH / t`, so summing difficulties across
/// blocks composes targets harmonically.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(pub [u8; 32]);

impl Target {
    /// The easiest possible target; difficulty 1.
    pub const ROOT_DEPTH: Target = Target([0xff; 32]);

    pub fn meets(&self, id: &BlockId) -> bool {
        id.as_bytes() <= &self.0
    }

    fn to_u256(self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    fn from_u256(value: U256) -> Target {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Target(bytes)
    }

    /// The number of expected hashes to find a block at this target.
    pub fn difficulty(&self) -> U256 {
        let value = self.to_u256();
        if value.is_zero() {
            return U256::MAX;
        }
        U256::MAX / value
    }

    /// The target whose difficulty is `difficulty`.
    pub fn from_difficulty(difficulty: U256) -> Target {
        if difficulty.is_zero() {
            return Target::ROOT_DEPTH;
        }
        Target::from_u256(U256::MAX / difficulty)
    }

    /// A target with the combined difficulty of `self` and `other`.
    pub fn add_difficulties(&self, other: &Target) -> Target {
        let sum = self
            .difficulty()
            .checked_add(other.difficulty())
            .unwrap_or(U256::MAX);
        Target::from_difficulty(sum)
    }

    /// `self * num / den` in target space, saturating at the root depth.
    pub fn scale(&self, num: u64, den: u64) -> Target {
        let wide: U512 = self.to_u256().full_mul(U256::from(num)) / U512::from(den);
        match U256::try_from(wide) {
            Ok(value) => Target::from_u256(value),
            Err(_) => Target::ROOT_DEPTH,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl ToBytes for Target {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.0.write(writer)
    }
}

impl FromBytes for Target {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(Target(<[u8; 32]>::read(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_bytes, Hash};

    #[test]
    fn meets_compares_lexicographically() {
        let mut target_bytes = [0u8; 32];
        target_bytes[0] = 0x10;
        let target = Target(target_bytes);

        let low = BlockId(Hash([0x0f; 32]));
        let high = BlockId(Hash([0x11; 32]));
        assert!(target.meets(&low));
        assert!(!target.meets(&high));
        assert!(Target::ROOT_DEPTH.meets(&BlockId(hash_bytes(b"anything"))));
    }

    #[test]
    fn difficulty_roundtrips() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        let target = Target(bytes);
        let restored = Target::from_difficulty(target.difficulty());
        // Integer division loses at most the low bits.
        assert_eq!(restored.0[0], 0x01);
    }

    #[test]
    fn harder_target_has_higher_difficulty() {
        let mut easy = [0u8; 32];
        easy[0] = 0x10;
        let mut hard = [0u8; 32];
        hard[0] = 0x01;
        assert!(Target(hard).difficulty() > Target(easy).difficulty());
    }

    #[test]
    fn combined_difficulty_is_monotone() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x10;
        let target = Target(bytes);
        let combined = target.add_difficulties(&target);
        assert!(combined.difficulty() >= target.difficulty());
        assert!(combined.0 < target.0);
    }

    #[test]
    fn scale_adjusts_in_target_space() {
        let mut bytes = [0u8; 32];
        bytes[1] = 0xe8;
        let target = Target(bytes);
        let up = target.scale(1004, 1000);
        let down = target.scale(1000, 1004);
        assert!(up.0 > target.0);
        assert!(down.0 < target.0);
    }
}
