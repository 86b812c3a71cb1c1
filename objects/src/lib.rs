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

#![forbid(unsafe_code)]

pub mod block;
pub use block::Block;

pub mod contracts;
pub use contracts::{FileContract, FileContractRevision, StorageProof};

pub mod currency;
pub use currency::Currency;

pub mod encoding;
pub use encoding::{FromBytes, ToBytes};

pub mod hash;
pub use hash::{
    BlockId, FileContractId, Hash, SiacoinOutputId, SiafundOutputId, Specifier, TransactionId,
    UnlockHash,
};

pub mod params;
pub use params::{Network, Params, BLOCK_SIZE_LIMIT, SECTOR_SIZE, SEGMENT_SIZE};

pub mod target;
pub use target::Target;

pub mod transaction;
pub use transaction::{
    CoveredFields, SiacoinInput, SiacoinOutput, SiafundInput, SiafundOutput, Transaction,
    TransactionSignature,
};

pub mod unlock;
pub use unlock::{PublicKey, UnlockConditions};

/// The height of a block in the canonical chain. Genesis is height 0.
pub type BlockHeight = u64;
