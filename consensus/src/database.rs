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

//! Bucket layout of the consensus database and the typed accessors over it.
//! The block tree is an arena keyed by block id; traversals walk ids, never
//! pointers.

use std::io::{Read, Result as IoResult, Write};

use vaultos_kv::{Metadata, Tx};
use vaultos_objects::{
    Block, BlockHeight, BlockId, Currency, FileContract, FileContractId, FromBytes, Hash,
    SiacoinOutput, SiacoinOutputId, SiafundOutput, SiafundOutputId, Target, ToBytes,
};

use crate::diffs::BlockDiffs;
use crate::error::ConsensusError;

pub const DB_METADATA: Metadata = Metadata {
    header: "Consensus Set Database",
    version: "0.5.0",
};

pub const BUCKET_BLOCK_HEIGHT: &str = "BlockHeight";
pub const BUCKET_BLOCK_MAP: &str = "BlockMap";
pub const BUCKET_BLOCK_PATH: &str = "BlockPath";
pub const BUCKET_OAK: &str = "Oak";
pub const BUCKET_CHANGE_LOG: &str = "ChangeLog";
pub const BUCKET_CHANGE_LOG_TAIL: &str = "ChangeLogTailID";
pub const BUCKET_CONSISTENCY: &str = "Consistency";
pub const BUCKET_FILE_CONTRACTS: &str = "FileContracts";
pub const BUCKET_SIACOIN_OUTPUTS: &str = "SiacoinOutputs";
pub const BUCKET_SIAFUND_OUTPUTS: &str = "SiafundOutputs";
pub const BUCKET_SIAFUND_POOL: &str = "SiafundPool";
/// Logical per-height `DSCO_<be64>` buckets, realized as a big-endian height
/// prefix on the key.
pub const BUCKET_DSCO: &str = "DelayedSiacoinOutputs";
/// Logical per-height `FCEX_<be64>` buckets, same realization.
pub const BUCKET_FCEX: &str = "FileContractExpirations";

const KEY_BLOCK_HEIGHT: &[u8] = b"BlockHeight";
const KEY_SIAFUND_POOL: &[u8] = b"SiafundPool";
const KEY_CONSISTENCY: &[u8] = b"Consistency";

pub fn buckets() -> &'static [&'static str] {
    &[
        BUCKET_BLOCK_HEIGHT,
        BUCKET_BLOCK_MAP,
        BUCKET_BLOCK_PATH,
        BUCKET_OAK,
        BUCKET_CHANGE_LOG,
        BUCKET_CHANGE_LOG_TAIL,
        BUCKET_CONSISTENCY,
        BUCKET_FILE_CONTRACTS,
        BUCKET_SIACOIN_OUTPUTS,
        BUCKET_SIAFUND_OUTPUTS,
        BUCKET_SIAFUND_POOL,
        BUCKET_DSCO,
        BUCKET_FCEX,
    ]
}

/// A block in the arena, together with everything needed to place it in the
/// tree and to undo it: its height, cumulative weight, the target its
/// children must meet, and the diffs it generated when it was last applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub block: Block,
    pub height: BlockHeight,
    pub depth: Target,
    pub child_target: Target,
    pub diffs_generated: bool,
    pub diffs: BlockDiffs,
    pub consensus_checksum: Hash,
}

impl StoredBlock {
    pub fn id(&self) -> BlockId {
        self.block.id()
    }

    /// The cumulative weight of this block's children. Depth shrinks as
    /// work accumulates; the heaviest chain has the smallest depth.
    pub fn child_depth(&self) -> Target {
        self.depth.add_difficulties(&self.child_target)
    }
}

impl ToBytes for StoredBlock {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.block.write(writer)?;
        self.height.write(writer)?;
        self.depth.write(writer)?;
        self.child_target.write(writer)?;
        self.diffs_generated.write(writer)?;
        self.diffs.write(writer)?;
        self.consensus_checksum.write(writer)
    }
}

impl FromBytes for StoredBlock {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(StoredBlock {
            block: Block::read(reader)?,
            height: BlockHeight::read(reader)?,
            depth: Target::read(reader)?,
            child_target: Target::read(reader)?,
            diffs_generated: bool::read(reader)?,
            diffs: BlockDiffs::read(reader)?,
            consensus_checksum: Hash::read(reader)?,
        })
    }
}

pub fn height_key(height: BlockHeight) -> [u8; 8] {
    height.to_be_bytes()
}

/// Key of a delayed output inside its logical per-height bucket.
pub fn dsco_key(maturity_height: BlockHeight, id: &SiacoinOutputId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&height_key(maturity_height));
    key.extend_from_slice(id.as_bytes());
    key
}

/// Key of a contract inside its logical per-expiration-height bucket.
pub fn fcex_key(expiration_height: BlockHeight, id: &FileContractId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&height_key(expiration_height));
    key.extend_from_slice(id.as_bytes());
    key
}

fn decode<T: FromBytes>(bytes: Vec<u8>) -> Result<T, ConsensusError> {
    Ok(T::from_bytes(&bytes)?)
}

pub fn current_height(tx: &Tx<'_>) -> Result<BlockHeight, ConsensusError> {
    match tx.get(BUCKET_BLOCK_HEIGHT, KEY_BLOCK_HEIGHT)? {
        Some(bytes) => decode(bytes),
        None => Err(ConsensusError::Inconsistency("missing current height")),
    }
}

pub fn set_current_height(tx: &Tx<'_>, height: BlockHeight) -> Result<(), ConsensusError> {
    Ok(tx.put(BUCKET_BLOCK_HEIGHT, KEY_BLOCK_HEIGHT, &height.to_bytes())?)
}

pub fn block_id_at_height(
    tx: &Tx<'_>,
    height: BlockHeight,
) -> Result<Option<BlockId>, ConsensusError> {
    match tx.get(BUCKET_BLOCK_PATH, &height_key(height))? {
        Some(bytes) => Ok(Some(decode(bytes)?)),
        None => Ok(None),
    }
}

pub fn current_block_id(tx: &Tx<'_>) -> Result<BlockId, ConsensusError> {
    let height = current_height(tx)?;
    block_id_at_height(tx, height)?
        .ok_or(ConsensusError::Inconsistency("canonical path has no tip"))
}

/// Extend the canonical path with a block at `height`.
pub fn push_path(tx: &Tx<'_>, height: BlockHeight, id: &BlockId) -> Result<(), ConsensusError> {
    tx.put(BUCKET_BLOCK_PATH, &height_key(height), &id.to_bytes())?;
    set_current_height(tx, height)
}

/// Drop the canonical tip at `height`.
pub fn pop_path(tx: &Tx<'_>, height: BlockHeight) -> Result<(), ConsensusError> {
    tx.delete(BUCKET_BLOCK_PATH, &height_key(height))?;
    set_current_height(tx, height - 1)
}

pub fn stored_block(tx: &Tx<'_>, id: &BlockId) -> Result<Option<StoredBlock>, ConsensusError> {
    match tx.get(BUCKET_BLOCK_MAP, id.as_bytes())? {
        Some(bytes) => Ok(Some(decode(bytes)?)),
        None => Ok(None),
    }
}

pub fn require_stored_block(tx: &Tx<'_>, id: &BlockId) -> Result<StoredBlock, ConsensusError> {
    stored_block(tx, id)?
        .ok_or(ConsensusError::Inconsistency("block map is missing a block"))
}

pub fn put_stored_block(tx: &Tx<'_>, stored: &StoredBlock) -> Result<(), ConsensusError> {
    Ok(tx.put(
        BUCKET_BLOCK_MAP,
        stored.id().as_bytes(),
        &stored.to_bytes(),
    )?)
}

pub fn block_map_contains(tx: &Tx<'_>, id: &BlockId) -> Result<bool, ConsensusError> {
    Ok(tx.contains(BUCKET_BLOCK_MAP, id.as_bytes())?)
}

pub fn siacoin_output(
    tx: &Tx<'_>,
    id: &SiacoinOutputId,
) -> Result<Option<SiacoinOutput>, ConsensusError> {
    match tx.get(BUCKET_SIACOIN_OUTPUTS, id.as_bytes())? {
        Some(bytes) => Ok(Some(decode(bytes)?)),
        None => Ok(None),
    }
}

pub fn file_contract(
    tx: &Tx<'_>,
    id: &FileContractId,
) -> Result<Option<FileContract>, ConsensusError> {
    match tx.get(BUCKET_FILE_CONTRACTS, id.as_bytes())? {
        Some(bytes) => Ok(Some(decode(bytes)?)),
        None => Ok(None),
    }
}

pub fn siafund_output(
    tx: &Tx<'_>,
    id: &SiafundOutputId,
) -> Result<Option<SiafundOutput>, ConsensusError> {
    match tx.get(BUCKET_SIAFUND_OUTPUTS, id.as_bytes())? {
        Some(bytes) => Ok(Some(decode(bytes)?)),
        None => Ok(None),
    }
}

pub fn siafund_pool(tx: &Tx<'_>) -> Result<Currency, ConsensusError> {
    match tx.get(BUCKET_SIAFUND_POOL, KEY_SIAFUND_POOL)? {
        Some(bytes) => decode(bytes),
        None => Ok(Currency::ZERO),
    }
}

pub fn set_siafund_pool(tx: &Tx<'_>, pool: &Currency) -> Result<(), ConsensusError> {
    Ok(tx.put(BUCKET_SIAFUND_POOL, KEY_SIAFUND_POOL, &pool.to_bytes())?)
}

/// Whether `id` currently sits in any maturity bucket. Only consulted on
/// the failure path of an input lookup, to distinguish immature spends
/// from missing ones.
pub fn is_delayed_output(tx: &Tx<'_>, id: &SiacoinOutputId) -> Result<bool, ConsensusError> {
    let mut found = false;
    tx.for_each(BUCKET_DSCO, |key, _| {
        if key.len() == 40 && &key[8..] == id.as_bytes() {
            found = true;
        }
        Ok(())
    })?;
    Ok(found)
}

pub fn is_inconsistent(tx: &Tx<'_>) -> Result<bool, ConsensusError> {
    Ok(tx.contains(BUCKET_CONSISTENCY, KEY_CONSISTENCY)?)
}

pub fn mark_inconsistent(tx: &Tx<'_>) -> Result<(), ConsensusError> {
    Ok(tx.put(BUCKET_CONSISTENCY, KEY_CONSISTENCY, &[1])?)
}
