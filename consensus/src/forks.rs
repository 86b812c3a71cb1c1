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

//! Switching the canonical chain to a heavier tip. Runs entirely inside the
//! caller's transaction, so a validation failure anywhere along the new
//! branch rolls the whole switch back.

use tracing::{debug, warn};
use vaultos_kv::Tx;
use vaultos_objects::{BlockId, Params};

use crate::apply;
use crate::database::{self, StoredBlock};
use crate::error::ConsensusError;

/// Make `new_tip_id` the canonical tip: revert down to the common ancestor,
/// then apply the new branch upward. Returns the reverted ids in
/// reverse-application order and the applied ids in forward order.
pub fn apply_fork(
    tx: &Tx<'_>,
    params: &Params,
    new_tip_id: &BlockId,
) -> Result<(Vec<BlockId>, Vec<BlockId>), ConsensusError> {
    // The branch from the new tip down to (but excluding) the first block
    // that is already canonical.
    let mut branch: Vec<StoredBlock> = vec![];
    let mut cursor = database::require_stored_block(tx, new_tip_id)?;
    while database::block_id_at_height(tx, cursor.height)? != Some(cursor.id()) {
        let parent_id = cursor.block.parent_id;
        branch.push(cursor);
        cursor = database::require_stored_block(tx, &parent_id)?;
    }
    let ancestor = cursor;

    let current_height = database::current_height(tx)?;
    if current_height > ancestor.height {
        warn!(
            "reorganizing: reverting {} blocks to height {}",
            current_height - ancestor.height,
            ancestor.height
        );
    }

    let mut reverted = vec![];
    while database::current_height(tx)? > ancestor.height {
        let tip_id = database::current_block_id(tx)?;
        let tip = database::require_stored_block(tx, &tip_id)?;
        apply::revert_block(tx, params, &tip)?;
        reverted.push(tip_id);
    }

    let mut applied = vec![];
    for mut stored in branch.into_iter().rev() {
        let id = stored.id();
        apply::apply_block(tx, params, &mut stored)?;
        applied.push(id);
    }
    debug!(
        "canonical chain now at height {} ({} reverted, {} applied)",
        database::current_height(tx)?,
        reverted.len(),
        applied.len()
    );
    Ok((reverted, applied))
}
