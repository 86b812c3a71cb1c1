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

use std::io::{Error, ErrorKind, Read, Result as IoResult, Write};

use crate::contracts::{FileContract, FileContractRevision, StorageProof};
use crate::currency::Currency;
use crate::encoding::{FromBytes, ToBytes};
use crate::hash::{
    hash_bytes, FileContractId, Hash, SiacoinOutputId, SiafundOutputId, TransactionId, UnlockHash,
    SPECIFIER_FILE_CONTRACT, SPECIFIER_SIACOIN_OUTPUT, SPECIFIER_SIAFUND_OUTPUT,
};
use crate::unlock::UnlockConditions;
use crate::BlockHeight;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SiacoinOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
}

impl ToBytes for SiacoinOutput {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.value.write(writer)?;
        self.unlock_hash.write(writer)
    }
}

impl FromBytes for SiacoinOutput {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(SiacoinOutput {
            value: Currency::read(reader)?,
            unlock_hash: UnlockHash::read(reader)?,
        })
    }
}

/// A siafund output additionally snapshots the siafund pool at creation in
/// `claim_start`; the pool growth since then is the holder's unclaimed
/// siacoin share.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SiafundOutput {
    pub value: Currency,
    pub unlock_hash: UnlockHash,
    pub claim_start: Currency,
}

impl ToBytes for SiafundOutput {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.value.write(writer)?;
        self.unlock_hash.write(writer)?;
        self.claim_start.write(writer)
    }
}

impl FromBytes for SiafundOutput {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(SiafundOutput {
            value: Currency::read(reader)?,
            unlock_hash: UnlockHash::read(reader)?,
            claim_start: Currency::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiacoinInput {
    pub parent_id: SiacoinOutputId,
    pub unlock_conditions: UnlockConditions,
}

impl ToBytes for SiacoinInput {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.unlock_conditions.write(writer)
    }
}

impl FromBytes for SiacoinInput {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(SiacoinInput {
            parent_id: SiacoinOutputId::read(reader)?,
            unlock_conditions: UnlockConditions::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiafundInput {
    pub parent_id: SiafundOutputId,
    pub unlock_conditions: UnlockConditions,
    /// Receives the pool share released by spending the parent output.
    pub claim_unlock_hash: UnlockHash,
}

impl ToBytes for SiafundInput {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.unlock_conditions.write(writer)?;
        self.claim_unlock_hash.write(writer)
    }
}

impl FromBytes for SiafundInput {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(SiafundInput {
            parent_id: SiafundOutputId::read(reader)?,
            unlock_conditions: UnlockConditions::read(reader)?,
            claim_unlock_hash: UnlockHash::read(reader)?,
        })
    }
}

/// Selects the transaction fields a signature commits to. Index lists must
/// be sorted and duplicate-free; `whole_transaction` covers every field and
/// leaves only other signatures to be opted into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoveredFields {
    pub whole_transaction: bool,
    pub siacoin_inputs: Vec<u64>,
    pub siacoin_outputs: Vec<u64>,
    pub file_contracts: Vec<u64>,
    pub file_contract_revisions: Vec<u64>,
    pub storage_proofs: Vec<u64>,
    pub siafund_inputs: Vec<u64>,
    pub siafund_outputs: Vec<u64>,
    pub miner_fees: Vec<u64>,
    pub arbitrary_data: Vec<u64>,
    pub transaction_signatures: Vec<u64>,
}

impl CoveredFields {
    pub fn whole_transaction() -> CoveredFields {
        CoveredFields {
            whole_transaction: true,
            ..CoveredFields::default()
        }
    }
}

impl ToBytes for CoveredFields {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.whole_transaction.write(writer)?;
        self.siacoin_inputs.write(writer)?;
        self.siacoin_outputs.write(writer)?;
        self.file_contracts.write(writer)?;
        self.file_contract_revisions.write(writer)?;
        self.storage_proofs.write(writer)?;
        self.siafund_inputs.write(writer)?;
        self.siafund_outputs.write(writer)?;
        self.miner_fees.write(writer)?;
        self.arbitrary_data.write(writer)?;
        self.transaction_signatures.write(writer)
    }
}

impl FromBytes for CoveredFields {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(CoveredFields {
            whole_transaction: bool::read(reader)?,
            siacoin_inputs: Vec::read(reader)?,
            siacoin_outputs: Vec::read(reader)?,
            file_contracts: Vec::read(reader)?,
            file_contract_revisions: Vec::read(reader)?,
            storage_proofs: Vec::read(reader)?,
            siafund_inputs: Vec::read(reader)?,
            siafund_outputs: Vec::read(reader)?,
            miner_fees: Vec::read(reader)?,
            arbitrary_data: Vec::read(reader)?,
            transaction_signatures: Vec::read(reader)?,
        })
    }
}

/// Authorizes one public key of the unlock conditions spending the object
/// named by `parent_id`. The signed message is the hash of the covered
/// fields plus this signature's own metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionSignature {
    pub parent_id: Hash,
    pub public_key_index: u64,
    pub timelock: BlockHeight,
    pub covered_fields: CoveredFields,
    pub signature: Vec<u8>,
}

impl ToBytes for TransactionSignature {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.public_key_index.write(writer)?;
        self.timelock.write(writer)?;
        self.covered_fields.write(writer)?;
        self.signature.write(writer)
    }
}

impl FromBytes for TransactionSignature {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(TransactionSignature {
            parent_id: Hash::read(reader)?,
            public_key_index: u64::read(reader)?,
            timelock: BlockHeight::read(reader)?,
            covered_fields: CoveredFields::read(reader)?,
            signature: Vec::read(reader)?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub siacoin_inputs: Vec<SiacoinInput>,
    pub siacoin_outputs: Vec<SiacoinOutput>,
    pub file_contracts: Vec<FileContract>,
    pub file_contract_revisions: Vec<FileContractRevision>,
    pub storage_proofs: Vec<StorageProof>,
    pub siafund_inputs: Vec<SiafundInput>,
    pub siafund_outputs: Vec<SiafundOutput>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<Vec<u8>>,
    pub transaction_signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// Everything except the signatures, in field order. This is the
    /// preimage of the transaction id and of whole-transaction signature
    /// hashes.
    fn write_unsigned_fields<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.siacoin_inputs.write(writer)?;
        self.siacoin_outputs.write(writer)?;
        self.file_contracts.write(writer)?;
        self.file_contract_revisions.write(writer)?;
        self.storage_proofs.write(writer)?;
        self.siafund_inputs.write(writer)?;
        self.siafund_outputs.write(writer)?;
        self.miner_fees.write(writer)?;
        self.arbitrary_data.write(writer)
    }

    pub fn id(&self) -> TransactionId {
        let mut bytes = vec![];
        self.write_unsigned_fields(&mut bytes)
            .expect("writing to a Vec never fails");
        TransactionId(hash_bytes(&bytes))
    }

    pub fn siacoin_output_id(&self, index: u64) -> SiacoinOutputId {
        SiacoinOutputId(crate::hash::hash_all(&[
            SPECIFIER_SIACOIN_OUTPUT.as_bytes(),
            self.id().as_bytes(),
            &index.to_bytes(),
        ]))
    }

    pub fn siafund_output_id(&self, index: u64) -> SiafundOutputId {
        SiafundOutputId(crate::hash::hash_all(&[
            SPECIFIER_SIAFUND_OUTPUT.as_bytes(),
            self.id().as_bytes(),
            &index.to_bytes(),
        ]))
    }

    pub fn file_contract_id(&self, index: u64) -> FileContractId {
        FileContractId(crate::hash::hash_all(&[
            SPECIFIER_FILE_CONTRACT.as_bytes(),
            self.id().as_bytes(),
            &index.to_bytes(),
        ]))
    }

    pub fn size(&self) -> u64 {
        self.to_bytes().len() as u64
    }

    /// The message signed by `transaction_signatures[sig_index]`. Both
    /// coverage modes append the signature's own parent id, key index and
    /// timelock, so a signature cannot be replayed for a different slot.
    pub fn sig_hash(&self, sig_index: usize) -> IoResult<Hash> {
        let sig = self.transaction_signatures.get(sig_index).ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, "signature index out of range")
        })?;
        let covered = &sig.covered_fields;

        let mut bytes = vec![];
        if covered.whole_transaction {
            self.write_unsigned_fields(&mut bytes)?;
        } else {
            write_covered(&mut bytes, &covered.siacoin_inputs, &self.siacoin_inputs)?;
            write_covered(&mut bytes, &covered.siacoin_outputs, &self.siacoin_outputs)?;
            write_covered(&mut bytes, &covered.file_contracts, &self.file_contracts)?;
            write_covered(
                &mut bytes,
                &covered.file_contract_revisions,
                &self.file_contract_revisions,
            )?;
            write_covered(&mut bytes, &covered.storage_proofs, &self.storage_proofs)?;
            write_covered(&mut bytes, &covered.siafund_inputs, &self.siafund_inputs)?;
            write_covered(&mut bytes, &covered.siafund_outputs, &self.siafund_outputs)?;
            write_covered(&mut bytes, &covered.miner_fees, &self.miner_fees)?;
            write_covered(&mut bytes, &covered.arbitrary_data, &self.arbitrary_data)?;
        }
        sig.parent_id.write(&mut bytes)?;
        sig.public_key_index.write(&mut bytes)?;
        sig.timelock.write(&mut bytes)?;
        write_covered(
            &mut bytes,
            &covered.transaction_signatures,
            &self.transaction_signatures,
        )?;

        Ok(hash_bytes(&bytes))
    }
}

fn write_covered<W: Write, T: ToBytes>(
    writer: &mut W,
    indices: &[u64],
    items: &[T],
) -> IoResult<()> {
    for &index in indices {
        let item = items.get(index as usize).ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, "covered field index out of range")
        })?;
        item.write(writer)?;
    }
    Ok(())
}

impl ToBytes for Transaction {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.write_unsigned_fields(writer)?;
        self.transaction_signatures.write(writer)
    }
}

impl FromBytes for Transaction {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(Transaction {
            siacoin_inputs: Vec::read(reader)?,
            siacoin_outputs: Vec::read(reader)?,
            file_contracts: Vec::read(reader)?,
            file_contract_revisions: Vec::read(reader)?,
            storage_proofs: Vec::read(reader)?,
            siafund_inputs: Vec::read(reader)?,
            siafund_outputs: Vec::read(reader)?,
            miner_fees: Vec::read(reader)?,
            arbitrary_data: Vec::read(reader)?,
            transaction_signatures: Vec::read(reader)?,
        })
    }
}
