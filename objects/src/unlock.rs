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

use std::io::{Read, Result as IoResult, Write};

use vaultos_merkle::Accumulator;

use crate::encoding::{FromBytes, ToBytes};
use crate::hash::{Specifier, UnlockHash, SPECIFIER_ED25519};
use crate::BlockHeight;

/// A public key tagged with its signature algorithm. Unknown algorithms are
/// carried opaquely so that future schemes soft-fork cleanly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublicKey {
    pub algorithm: Specifier,
    pub key: Vec<u8>,
}

impl PublicKey {
    pub fn ed25519(key: [u8; 32]) -> PublicKey {
        PublicKey {
            algorithm: SPECIFIER_ED25519,
            key: key.to_vec(),
        }
    }
}

impl ToBytes for PublicKey {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.algorithm.write(writer)?;
        self.key.write(writer)
    }
}

impl FromBytes for PublicKey {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(PublicKey {
            algorithm: Specifier::read(reader)?,
            key: Vec::read(reader)?,
        })
    }
}

/// The spending policy of an output: after `timelock`, any
/// `signatures_required` of `public_keys` may authorize a spend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnlockConditions {
    pub timelock: BlockHeight,
    pub public_keys: Vec<PublicKey>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// The common single-key policy: one ed25519 key, one signature, no
    /// timelock.
    pub fn standard(key: [u8; 32]) -> UnlockConditions {
        UnlockConditions {
            timelock: 0,
            public_keys: vec![PublicKey::ed25519(key)],
            signatures_required: 1,
        }
    }

    /// The Merkle root over the condition fields. Committing to a root
    /// rather than the conditions keeps outputs small and hides the policy
    /// until spend time.
    pub fn unlock_hash(&self) -> UnlockHash {
        let mut acc = Accumulator::default();
        acc.push(&self.timelock.to_bytes());
        for key in &self.public_keys {
            acc.push(&key.to_bytes());
        }
        acc.push(&self.signatures_required.to_bytes());
        let root = acc.root().expect("unlock conditions always have leaves");
        UnlockHash(crate::hash::Hash(root))
    }
}

impl ToBytes for UnlockConditions {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.timelock.write(writer)?;
        self.public_keys.write(writer)?;
        self.signatures_required.write(writer)
    }
}

impl FromBytes for UnlockConditions {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(UnlockConditions {
            timelock: BlockHeight::read(reader)?,
            public_keys: Vec::read(reader)?,
            signatures_required: u64::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_hash_is_deterministic() {
        let conditions = UnlockConditions::standard([7u8; 32]);
        assert_eq!(conditions.unlock_hash(), conditions.unlock_hash());
    }

    #[test]
    fn unlock_hash_binds_every_field() {
        let base = UnlockConditions::standard([7u8; 32]);

        let mut timelocked = base.clone();
        timelocked.timelock = 10;
        assert_ne!(base.unlock_hash(), timelocked.unlock_hash());

        let mut other_key = base.clone();
        other_key.public_keys[0] = PublicKey::ed25519([8u8; 32]);
        assert_ne!(base.unlock_hash(), other_key.unlock_hash());

        let mut multisig = base.clone();
        multisig.signatures_required = 2;
        assert_ne!(base.unlock_hash(), multisig.unlock_hash());
    }

    #[test]
    fn conditions_roundtrip_through_encoding() {
        let conditions = UnlockConditions {
            timelock: 42,
            public_keys: vec![PublicKey::ed25519([1u8; 32]), PublicKey::ed25519([2u8; 32])],
            signatures_required: 2,
        };
        let decoded = UnlockConditions::from_bytes(&conditions.to_bytes()).unwrap();
        assert_eq!(decoded, conditions);
    }
}
