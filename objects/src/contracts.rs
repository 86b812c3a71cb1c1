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

use crate::currency::Currency;
use crate::encoding::{FromBytes, ToBytes};
use crate::hash::{hash_all, FileContractId, Hash, SiacoinOutputId, UnlockHash, SPECIFIER_STORAGE_PROOF};
use crate::params::SEGMENT_SIZE;
use crate::transaction::SiacoinOutput;
use crate::unlock::UnlockConditions;
use crate::BlockHeight;

/// An on-chain commitment by a host to store `filesize` bytes whose segment
/// Merkle root is `merkle_root`, settled between `window_start` and
/// `window_end`. A storage proof accepted inside the window pays the valid
/// outputs; an expired window pays the missed outputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileContract {
    pub filesize: u64,
    pub merkle_root: Hash,
    pub window_start: BlockHeight,
    pub window_end: BlockHeight,
    pub payout: Currency,
    pub valid_proof_outputs: Vec<SiacoinOutput>,
    pub missed_proof_outputs: Vec<SiacoinOutput>,
    pub unlock_hash: UnlockHash,
    pub revision_number: u64,
}

impl FileContract {
    /// The number of 64-byte segments covered by the contract.
    pub fn segment_count(&self) -> u64 {
        (self.filesize + SEGMENT_SIZE as u64 - 1) / SEGMENT_SIZE as u64
    }

    pub fn valid_proof_output_sum(&self) -> Currency {
        self.valid_proof_outputs.iter().map(|o| o.value).sum()
    }

    pub fn missed_proof_output_sum(&self) -> Currency {
        self.missed_proof_outputs.iter().map(|o| o.value).sum()
    }
}

impl ToBytes for FileContract {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.filesize.write(writer)?;
        self.merkle_root.write(writer)?;
        self.window_start.write(writer)?;
        self.window_end.write(writer)?;
        self.payout.write(writer)?;
        self.valid_proof_outputs.write(writer)?;
        self.missed_proof_outputs.write(writer)?;
        self.unlock_hash.write(writer)?;
        self.revision_number.write(writer)
    }
}

impl FromBytes for FileContract {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(FileContract {
            filesize: u64::read(reader)?,
            merkle_root: Hash::read(reader)?,
            window_start: BlockHeight::read(reader)?,
            window_end: BlockHeight::read(reader)?,
            payout: Currency::read(reader)?,
            valid_proof_outputs: Vec::read(reader)?,
            missed_proof_outputs: Vec::read(reader)?,
            unlock_hash: UnlockHash::read(reader)?,
            revision_number: u64::read(reader)?,
        })
    }
}

impl FileContractId {
    /// The id of the delayed payout output created when the contract closes.
    /// `proof_valid` selects between the valid and missed output lists.
    pub fn storage_proof_output_id(&self, proof_valid: bool, index: u64) -> SiacoinOutputId {
        SiacoinOutputId(hash_all(&[
            SPECIFIER_STORAGE_PROOF.as_bytes(),
            self.as_bytes(),
            &(proof_valid as u8).to_bytes(),
            &index.to_bytes(),
        ]))
    }
}

/// Replaces the terms of an open file contract. Only accepted while the
/// contract's proof window has not opened, with a strictly higher revision
/// number, authorized by the conditions hashing to the contract's unlock
/// hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileContractRevision {
    pub parent_id: FileContractId,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_filesize: u64,
    pub new_merkle_root: Hash,
    pub new_window_start: BlockHeight,
    pub new_window_end: BlockHeight,
    pub new_valid_proof_outputs: Vec<SiacoinOutput>,
    pub new_missed_proof_outputs: Vec<SiacoinOutput>,
    pub new_unlock_hash: UnlockHash,
}

impl ToBytes for FileContractRevision {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.unlock_conditions.write(writer)?;
        self.new_revision_number.write(writer)?;
        self.new_filesize.write(writer)?;
        self.new_merkle_root.write(writer)?;
        self.new_window_start.write(writer)?;
        self.new_window_end.write(writer)?;
        self.new_valid_proof_outputs.write(writer)?;
        self.new_missed_proof_outputs.write(writer)?;
        self.new_unlock_hash.write(writer)
    }
}

impl FromBytes for FileContractRevision {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(FileContractRevision {
            parent_id: FileContractId::read(reader)?,
            unlock_conditions: UnlockConditions::read(reader)?,
            new_revision_number: u64::read(reader)?,
            new_filesize: u64::read(reader)?,
            new_merkle_root: Hash::read(reader)?,
            new_window_start: BlockHeight::read(reader)?,
            new_window_end: BlockHeight::read(reader)?,
            new_valid_proof_outputs: Vec::read(reader)?,
            new_missed_proof_outputs: Vec::read(reader)?,
            new_unlock_hash: UnlockHash::read(reader)?,
        })
    }
}

/// Asserts that `segment` sits at the consensus-chosen index of the tree
/// committed by a file contract. The sibling hashes in `hash_set` connect
/// the segment to the committed root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageProof {
    pub parent_id: FileContractId,
    pub segment: [u8; SEGMENT_SIZE],
    pub hash_set: Vec<Hash>,
}

impl Default for StorageProof {
    fn default() -> Self {
        StorageProof {
            parent_id: FileContractId::default(),
            segment: [0u8; SEGMENT_SIZE],
            hash_set: vec![],
        }
    }
}

impl ToBytes for StorageProof {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.segment.write(writer)?;
        self.hash_set.write(writer)
    }
}

impl FromBytes for StorageProof {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(StorageProof {
            parent_id: FileContractId::read(reader)?,
            segment: <[u8; SEGMENT_SIZE]>::read(reader)?,
            hash_set: Vec::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_count_rounds_up() {
        let mut fc = FileContract::default();
        fc.filesize = 0;
        assert_eq!(fc.segment_count(), 0);
        fc.filesize = 64;
        assert_eq!(fc.segment_count(), 1);
        fc.filesize = 65;
        assert_eq!(fc.segment_count(), 2);
        fc.filesize = 4000;
        assert_eq!(fc.segment_count(), 63);
    }

    #[test]
    fn proof_output_ids_distinguish_valid_and_missed() {
        let id = FileContractId::default();
        assert_ne!(
            id.storage_proof_output_id(true, 0),
            id.storage_proof_output_id(false, 0)
        );
        assert_ne!(
            id.storage_proof_output_id(true, 0),
            id.storage_proof_output_id(true, 1)
        );
    }

    #[test]
    fn contract_roundtrips_through_encoding() {
        let fc = FileContract {
            filesize: 4000,
            merkle_root: crate::hash::hash_bytes(b"root"),
            window_start: 10,
            window_end: 20,
            payout: Currency::from_coins(5),
            valid_proof_outputs: vec![SiacoinOutput {
                value: Currency::from_coins(4),
                unlock_hash: UnlockHash::default(),
            }],
            missed_proof_outputs: vec![SiacoinOutput {
                value: Currency::from_coins(4),
                unlock_hash: UnlockHash::default(),
            }],
            unlock_hash: UnlockHash::default(),
            revision_number: 3,
        };
        assert_eq!(FileContract::from_bytes(&fc.to_bytes()).unwrap(), fc);
    }
}
