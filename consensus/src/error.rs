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

use std::fmt::Debug;

use vaultos_kv::KvError;
use vaultos_objects::BlockId;

/// Possible block and transaction rejection reasons.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("block is already known")]
    BlockKnown,

    #[error("block's parent {:?} is unknown", _0)]
    Orphan(BlockId),

    #[error("block extends a chain that is not the heaviest")]
    NonExtending,

    #[error("timestamp {} is earlier than the median {}", _0, _1)]
    EarlyTimestamp(i64, i64),

    #[error("timestamp {} is too far in the future; block parked for retry", _0)]
    FutureTimestamp(i64),

    #[error("timestamp {} is in the extreme future", _0)]
    ExtremeFutureTimestamp(i64),

    #[error("block id {:?} does not meet the child target", _0)]
    MissedTarget(BlockId),

    #[error("block of {} bytes exceeds the {} byte limit", _0, _1)]
    LargeBlock(u64, u64),

    #[error("miner payouts do not equal the subsidy plus fees")]
    BadMinerPayouts,

    #[error("block {:?} previously failed deep validation", _0)]
    DoSBlock(BlockId),

    #[error("siacoin inputs do not equal siacoin outputs, fees, and contract payouts")]
    SiacoinInputOutputMismatch,

    #[error("storage proof does not verify against the committed root")]
    InvalidStorageProof,

    #[error("file contract window is malformed or has already opened")]
    LateFileContract,

    #[error("file contract revision number does not increase")]
    BadRevisionNumber,

    #[error("transaction references a nonexistent output or contract")]
    MissingInput,

    #[error("transaction spends an output that has not matured")]
    ImmatureInput,

    #[error("unlock conditions do not hash to the committed unlock hash")]
    UnlockHashMismatch,

    #[error("missing, frivolous, or unverifiable signature")]
    InvalidSignature,

    #[error("siafund inputs do not equal siafund outputs")]
    SiafundMiscount,

    #[error("file contract outputs do not sum to the payout minus the tax")]
    SiacoinMiscount,

    #[error("change id is not present in the change log")]
    InvalidChangeId,

    #[error("consensus set has been closed")]
    Closed,

    #[error("consensus set is inconsistent: {}", _0)]
    Inconsistency(&'static str),

    #[error("{}", _0)]
    Kv(#[from] KvError),

    #[error("{}", _0)]
    Io(#[from] std::io::Error),
}

impl ConsensusError {
    /// Whether a failure of this kind quarantines the block id: a repeat
    /// submission is rejected without re-running deep validation.
    pub(crate) fn marks_dos(&self) -> bool {
        matches!(
            self,
            ConsensusError::BadMinerPayouts
                | ConsensusError::SiacoinInputOutputMismatch
                | ConsensusError::InvalidStorageProof
                | ConsensusError::LateFileContract
                | ConsensusError::BadRevisionNumber
                | ConsensusError::MissingInput
                | ConsensusError::ImmatureInput
                | ConsensusError::UnlockHashMismatch
                | ConsensusError::InvalidSignature
                | ConsensusError::SiafundMiscount
                | ConsensusError::SiacoinMiscount
        )
    }
}
