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

//! Block acceptance: cheap header checks, placement in the block arena, and
//! the fork decision. Deep validation happens only when a block actually
//! joins the heaviest chain.

use chrono::Utc;
use tracing::{debug, error, warn};
use vaultos_kv::Tx;
use vaultos_objects::{Block, BlockId, Hash};

use crate::changelog;
use crate::database::{self, StoredBlock};
use crate::diffs::BlockDiffs;
use crate::error::ConsensusError;
use crate::forks;
use crate::oak;
use crate::ConsensusSet;

/// What a committed acceptance did to the canonical chain.
enum Outcome {
    Extended,
    NonExtending,
}

impl ConsensusSet {
    /// Validate `block` and either extend the canonical chain, store it on
    /// a side chain (`NonExtending`), or reorganize to it. One change entry
    /// is emitted per canonical mutation.
    pub fn accept_block(&self, block: Block) -> Result<(), ConsensusError> {
        let _writer = self.writer_lock();
        if self.is_closed() {
            return Err(ConsensusError::Closed);
        }

        let id = block.id();
        if self.dos_blocks().lock().contains(&id) {
            return Err(ConsensusError::DoSBlock(id));
        }

        let outcome = self
            .db()
            .update(|tx| self.accept_block_tx(tx, &block, &id));
        match outcome {
            Ok(Outcome::Extended) => {
                self.notify_change();
                Ok(())
            }
            Ok(Outcome::NonExtending) => Err(ConsensusError::NonExtending),
            Err(ConsensusError::FutureTimestamp(ts)) => {
                self.park_future_block(block);
                Err(ConsensusError::FutureTimestamp(ts))
            }
            Err(err @ ConsensusError::Inconsistency(_)) => {
                error!("fatal: {}", err);
                let _ = self
                    .db()
                    .update::<_, ConsensusError>(|tx| database::mark_inconsistent(tx));
                if cfg!(debug_assertions) {
                    panic!("consensus set is inconsistent: {}", err);
                }
                Err(err)
            }
            Err(err) => {
                if err.marks_dos() {
                    warn!("block {:?} failed deep validation: {}", id, err);
                    self.dos_blocks().lock().insert(id);
                }
                Err(err)
            }
        }
    }

    fn accept_block_tx(
        &self,
        tx: &Tx<'_>,
        block: &Block,
        id: &BlockId,
    ) -> Result<Outcome, ConsensusError> {
        if database::is_inconsistent(tx)? {
            return Err(ConsensusError::Inconsistency("refusing writes"));
        }
        if database::block_map_contains(tx, id)? {
            return Err(ConsensusError::BlockKnown);
        }
        let parent = database::stored_block(tx, &block.parent_id)?
            .ok_or(ConsensusError::Orphan(block.parent_id))?;

        self.validate_header(tx, &parent, block, id)?;

        // Place the block in the arena with its difficulty bookkeeping.
        let parent_totals = oak::oak_totals(tx, &parent.id())?;
        let totals = oak::child_totals(
            self.params(),
            &parent_totals,
            &parent.child_target,
            parent.block.timestamp,
            block.timestamp,
        );
        let child_target = oak::child_target(self.params(), &totals, &parent.child_target);
        let stored = StoredBlock {
            block: block.clone(),
            height: parent.height + 1,
            depth: parent.child_depth(),
            child_target,
            diffs_generated: false,
            diffs: BlockDiffs::default(),
            consensus_checksum: Hash::default(),
        };
        database::put_stored_block(tx, &stored)?;
        oak::put_oak_totals(tx, id, &totals)?;

        // Fork choice: smaller child depth means more cumulative work.
        let current_id = database::current_block_id(tx)?;
        let current = database::require_stored_block(tx, &current_id)?;
        if stored.child_depth() >= current.child_depth() {
            debug!(
                "block {:?} stored on a side chain at height {}",
                id, stored.height
            );
            return Ok(Outcome::NonExtending);
        }

        let (reverted, applied) = forks::apply_fork(tx, self.params(), id)?;
        changelog::append(tx, reverted, applied)?;
        Ok(Outcome::Extended)
    }

    fn validate_header(
        &self,
        tx: &Tx<'_>,
        parent: &StoredBlock,
        block: &Block,
        id: &BlockId,
    ) -> Result<(), ConsensusError> {
        let params = self.params();

        let size = block.size();
        if size > params.block_size_limit {
            return Err(ConsensusError::LargeBlock(size, params.block_size_limit));
        }

        if !parent.child_target.meets(id) {
            return Err(ConsensusError::MissedTarget(*id));
        }

        let minimum = median_timestamp(tx, params.median_timestamp_window, parent)?;
        if block.timestamp < minimum {
            return Err(ConsensusError::EarlyTimestamp(block.timestamp, minimum));
        }

        let now = Utc::now().timestamp();
        if block.timestamp > now + params.extreme_future_threshold {
            return Err(ConsensusError::ExtremeFutureTimestamp(block.timestamp));
        }
        if block.timestamp > now + params.future_threshold {
            return Err(ConsensusError::FutureTimestamp(block.timestamp));
        }

        let expected = params.block_subsidy(parent.height + 1) + block.transaction_fee_sum();
        if block.miner_payout_sum() != expected {
            return Err(ConsensusError::BadMinerPayouts);
        }
        Ok(())
    }
}

/// The median of the last `window` timestamps ending at `tip`. A child's
/// timestamp must not precede it.
pub(crate) fn median_timestamp(
    tx: &Tx<'_>,
    window: usize,
    tip: &StoredBlock,
) -> Result<i64, ConsensusError> {
    let mut timestamps = Vec::with_capacity(window);
    let mut cursor = tip.clone();
    loop {
        timestamps.push(cursor.block.timestamp);
        if timestamps.len() == window || cursor.height == 0 {
            break;
        }
        cursor = database::require_stored_block(tx, &cursor.block.parent_id)?;
    }
    timestamps.sort_unstable();
    Ok(timestamps[timestamps.len() / 2])
}
