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

use vaultos_consensus::ConsensusError;
use vaultos_objects::{
    Currency, FileContract, Hash, SiacoinInput, SiacoinOutput, SiafundInput, SiafundOutput,
    Transaction,
};
use vaultos_testing::{mine_block, TestKey, TestNode};
use vaultos_testing::node::GENESIS_SIAFUND_SEED;

/// Open a contract so the pool accrues a tax.
fn grow_pool(node: &TestNode) -> Currency {
    let (payout_id, payout_value) = node.mine_spendable_payout().unwrap();
    let height = node.cs.current_height().unwrap();
    let tax = node.params.tax(height + 1, &payout_value);
    let after_tax = payout_value.checked_sub(&tax).unwrap();

    let contract = FileContract {
        filesize: 0,
        merkle_root: Hash::default(),
        window_start: height + 5,
        window_end: height + 6,
        payout: payout_value,
        valid_proof_outputs: vec![SiacoinOutput {
            value: after_tax,
            unlock_hash: node.key.unlock_hash(),
        }],
        missed_proof_outputs: vec![SiacoinOutput {
            value: after_tax,
            unlock_hash: node.key.unlock_hash(),
        }],
        unlock_hash: node.key.unlock_hash(),
        revision_number: 1,
    };
    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        file_contracts: vec![contract],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);
    node.mine_and_accept(vec![txn]).unwrap();

    let pool = node.cs.siafund_pool().unwrap();
    assert!(!pool.is_zero());
    pool
}

#[test]
fn siafund_spend_claims_pool_share() {
    let node = TestNode::new().unwrap();
    let pool = grow_pool(&node);

    let genesis_txn = &node.params.genesis_block().transactions[0];
    let siafund_id = genesis_txn.siafund_output_id(0);
    let holder = TestKey::from_seed(GENESIS_SIAFUND_SEED);
    let heir = TestKey::from_seed(7);

    let mut txn = Transaction {
        siafund_inputs: vec![SiafundInput {
            parent_id: siafund_id,
            unlock_conditions: holder.unlock_conditions(),
            claim_unlock_hash: holder.unlock_hash(),
        }],
        siafund_outputs: vec![SiafundOutput {
            value: Currency::from_u64(node.params.siafund_count),
            unlock_hash: heir.unlock_hash(),
            claim_start: Currency::ZERO,
        }],
        ..Transaction::default()
    };
    holder.sign_transaction(&mut txn, &[siafund_id.0]);
    let new_siafund_id = txn.siafund_output_id(0);

    node.mine_and_accept(vec![txn]).unwrap();
    let height = node.cs.current_height().unwrap();

    // The old output is gone; the new one snapshots the pool.
    assert!(node.cs.siafund_output(&siafund_id).unwrap().is_none());
    let moved = node.cs.siafund_output(&new_siafund_id).unwrap().unwrap();
    assert_eq!(moved.claim_start, pool);
    assert_eq!(moved.unlock_hash, heir.unlock_hash());

    // The holder's claim covers the entire pool growth since genesis and
    // matures like any delayed output.
    let claim_id = siafund_id.sia_claim_output_id();
    let claim = node
        .cs
        .delayed_siacoin_output(height + node.params.maturity_delay, &claim_id)
        .unwrap()
        .unwrap();
    assert_eq!(claim.value, pool);
    assert_eq!(claim.unlock_hash, holder.unlock_hash());

    node.mine_empty_blocks(node.params.maturity_delay).unwrap();
    assert!(node.cs.siacoin_output(&claim_id).unwrap().is_some());
}

#[test]
fn unbalanced_siafund_transaction_is_rejected() {
    let node = TestNode::new().unwrap();

    let genesis_txn = &node.params.genesis_block().transactions[0];
    let siafund_id = genesis_txn.siafund_output_id(0);
    let holder = TestKey::from_seed(GENESIS_SIAFUND_SEED);

    let mut txn = Transaction {
        siafund_inputs: vec![SiafundInput {
            parent_id: siafund_id,
            unlock_conditions: holder.unlock_conditions(),
            claim_unlock_hash: holder.unlock_hash(),
        }],
        siafund_outputs: vec![SiafundOutput {
            value: Currency::from_u64(node.params.siafund_count - 1),
            unlock_hash: holder.unlock_hash(),
            claim_start: Currency::ZERO,
        }],
        ..Transaction::default()
    };
    holder.sign_transaction(&mut txn, &[siafund_id.0]);

    let block = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();
    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::SiafundMiscount));
}

#[test]
fn wrong_holder_cannot_spend_siafunds() {
    let node = TestNode::new().unwrap();

    let genesis_txn = &node.params.genesis_block().transactions[0];
    let siafund_id = genesis_txn.siafund_output_id(0);
    let thief = TestKey::from_seed(66);

    let mut txn = Transaction {
        siafund_inputs: vec![SiafundInput {
            parent_id: siafund_id,
            unlock_conditions: thief.unlock_conditions(),
            claim_unlock_hash: thief.unlock_hash(),
        }],
        siafund_outputs: vec![SiafundOutput {
            value: Currency::from_u64(node.params.siafund_count),
            unlock_hash: thief.unlock_hash(),
            claim_start: Currency::ZERO,
        }],
        ..Transaction::default()
    };
    thief.sign_transaction(&mut txn, &[siafund_id.0]);

    let block = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();
    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::UnlockHashMismatch));
}
