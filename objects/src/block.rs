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

use crate::currency::Currency;
use crate::encoding::{FromBytes, ToBytes};
use crate::hash::{hash_all, BlockId, Hash, SiacoinOutputId};
use crate::transaction::{SiacoinOutput, Transaction};

/// One block of the chain. The id commits to the parent, the proof-of-work
/// nonce, the timestamp, and the Merkle root over the payouts and
/// transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub parent_id: BlockId,
    pub nonce: [u8; 8],
    pub timestamp: i64,
    pub miner_payouts: Vec<SiacoinOutput>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The Merkle root over the miner payouts followed by the transactions.
    pub fn merkle_root(&self) -> Hash {
        let mut acc = Accumulator::default();
        for payout in &self.miner_payouts {
            acc.push(&payout.to_bytes());
        }
        for txn in &self.transactions {
            acc.push(&txn.to_bytes());
        }
        Hash(acc.root().unwrap_or_default())
    }

    pub fn id(&self) -> BlockId {
        BlockId(hash_all(&[
            self.parent_id.as_bytes(),
            &self.nonce,
            &self.timestamp.to_bytes(),
            self.merkle_root().as_bytes(),
        ]))
    }

    /// The id of the delayed output paying `miner_payouts[index]`.
    pub fn miner_payout_id(&self, index: u64) -> SiacoinOutputId {
        SiacoinOutputId(hash_all(&[self.id().as_bytes(), &index.to_bytes()]))
    }

    pub fn miner_payout_sum(&self) -> Currency {
        self.miner_payouts.iter().map(|p| p.value).sum()
    }

    /// Total fees offered by the block's transactions.
    pub fn transaction_fee_sum(&self) -> Currency {
        self.transactions
            .iter()
            .flat_map(|txn| txn.miner_fees.iter().copied())
            .sum()
    }

    /// The encoded size, which is what the block size limit constrains.
    pub fn size(&self) -> u64 {
        self.to_bytes().len() as u64
    }
}

impl ToBytes for Block {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.parent_id.write(writer)?;
        self.nonce.write(writer)?;
        self.timestamp.write(writer)?;
        self.miner_payouts.write(writer)?;
        self.transactions.write(writer)
    }
}

impl FromBytes for Block {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(Block {
            parent_id: BlockId::read(reader)?,
            nonce: <[u8; 8]>::read(reader)?,
            timestamp: i64::read(reader)?,
            miner_payouts: Vec::read(reader)?,
            transactions: Vec::read(reader)?,
        })
    }
}
