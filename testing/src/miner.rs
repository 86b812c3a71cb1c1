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

use anyhow::{anyhow, Result};
use vaultos_consensus::ConsensusSet;
use vaultos_objects::{Block, SiacoinOutput, Transaction, UnlockHash};

/// Assemble and solve the next block on the current tip: correct subsidy
/// payout, parent timestamp plus one, nonce searched against the child
/// target. Cheap under the testing target.
pub fn mine_block(
    cs: &ConsensusSet,
    transactions: Vec<Transaction>,
    payout_unlock_hash: UnlockHash,
) -> Result<Block> {
    let height = cs.current_height()?;
    let parent = cs
        .block_at_height(height)?
        .ok_or_else(|| anyhow!("missing tip block"))?;
    let target = cs.child_target()?;

    let mut block = Block {
        parent_id: parent.id(),
        nonce: [0; 8],
        timestamp: parent.timestamp + 1,
        miner_payouts: vec![],
        transactions,
    };
    let value = cs.params().block_subsidy(height + 1) + block.transaction_fee_sum();
    block.miner_payouts.push(SiacoinOutput {
        value,
        unlock_hash: payout_unlock_hash,
    });

    for nonce in 0u64.. {
        block.nonce = nonce.to_le_bytes();
        if target.meets(&block.id()) {
            return Ok(block);
        }
    }
    Err(anyhow!("nonce space exhausted"))
}
