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

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use vaultos_consensus::ConsensusSet;
use vaultos_objects::{Block, Currency, Params, SiacoinOutputId, Transaction};

use crate::keys::TestKey;
use crate::miner::mine_block;

/// The seed of the key holding the genesis siafund allocation in tests.
pub const GENESIS_SIAFUND_SEED: u8 = 1;

/// A consensus set on the testing network, backed by a temporary directory,
/// with a funded key. Two fresh nodes share the same genesis.
pub struct TestNode {
    pub cs: Arc<ConsensusSet>,
    pub params: Params,
    pub key: TestKey,
    _dir: TempDir,
}

impl TestNode {
    pub fn new() -> Result<TestNode> {
        let siafund_key = TestKey::from_seed(GENESIS_SIAFUND_SEED);
        let params =
            Params::testing().with_genesis_siafund_unlock_hash(siafund_key.unlock_hash());
        Self::with_params(params)
    }

    pub fn with_params(params: Params) -> Result<TestNode> {
        let dir = TempDir::new()?;
        let cs = ConsensusSet::open(params.clone(), dir.path())?;
        Ok(TestNode {
            cs,
            params,
            key: TestKey::from_seed(2),
            _dir: dir,
        })
    }

    /// Mine and accept one block carrying `transactions`, paying this
    /// node's key.
    pub fn mine_and_accept(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let block = mine_block(&self.cs, transactions, self.key.unlock_hash())?;
        self.cs.accept_block(block.clone())?;
        Ok(block)
    }

    pub fn mine_empty_blocks(&self, count: u64) -> Result<()> {
        for _ in 0..count {
            self.mine_and_accept(vec![])?;
        }
        Ok(())
    }

    /// Mine a payout to this node's key and ride out the maturity delay, so
    /// the returned output is live and spendable.
    pub fn mine_spendable_payout(&self) -> Result<(SiacoinOutputId, Currency)> {
        let block = self.mine_and_accept(vec![])?;
        let id = block.miner_payout_id(0);
        let value = block.miner_payouts[0].value;
        self.mine_empty_blocks(self.params.maturity_delay)?;
        Ok((id, value))
    }
}
