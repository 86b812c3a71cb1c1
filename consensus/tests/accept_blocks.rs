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

use chrono::Utc;
use vaultos_consensus::ConsensusError;
use vaultos_objects::hash::hash_bytes;
use vaultos_objects::{
    Block, BlockId, Currency, SiacoinInput, SiacoinOutput, Transaction,
};
use vaultos_testing::{mine_block, TestKey, TestNode};

/// Re-solve a block's nonce after its fields were tampered with.
fn solve(node: &TestNode, block: &mut Block) {
    let target = node.cs.child_target().unwrap();
    for nonce in 0u64.. {
        block.nonce = nonce.to_le_bytes();
        if target.meets(&block.id()) {
            return;
        }
    }
}

#[test]
fn genesis_resubmission_is_block_known() {
    let node = TestNode::new().unwrap();
    let height = node.cs.current_height().unwrap();

    let err = node
        .cs
        .accept_block(node.params.genesis_block())
        .unwrap_err();
    assert!(matches!(err, ConsensusError::BlockKnown));
    assert_eq!(node.cs.current_height().unwrap(), height);
}

#[test]
fn unknown_parent_is_orphan() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.parent_id = BlockId(hash_bytes(b"nonexistent parent"));

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::Orphan(_)));
    assert_eq!(node.cs.current_height().unwrap(), 0);
}

#[test]
fn tampered_nonce_misses_target() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();

    let target = node.cs.child_target().unwrap();
    for nonce in 0u64.. {
        block.nonce = nonce.to_le_bytes();
        if !target.meets(&block.id()) {
            break;
        }
    }
    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::MissedTarget(_)));
}

#[test]
fn oversized_block_is_rejected() {
    let node = TestNode::new().unwrap();
    let filler = Transaction {
        arbitrary_data: vec![vec![0u8; node.params.block_size_limit as usize]],
        ..Transaction::default()
    };
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.transactions.push(filler);
    solve(&node, &mut block);

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::LargeBlock(_, _)));
}

#[test]
fn wrong_miner_payout_is_rejected() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.miner_payouts[0].value = block.miner_payouts[0].value + Currency::from_u64(1);
    solve(&node, &mut block);

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::BadMinerPayouts));
}

#[test]
fn early_timestamp_is_rejected() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.timestamp = node.params.genesis_timestamp - 1;
    solve(&node, &mut block);

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::EarlyTimestamp(_, _)));
}

#[test]
fn extreme_future_timestamp_is_rejected() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.timestamp = Utc::now().timestamp() + node.params.extreme_future_threshold + 3600;
    solve(&node, &mut block);

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::ExtremeFutureTimestamp(_)));
    assert_eq!(node.cs.current_height().unwrap(), 0);
}

#[test]
fn future_timestamp_is_parked() {
    let node = TestNode::new().unwrap();
    let mut block = mine_block(&node.cs, vec![], node.key.unlock_hash()).unwrap();
    block.timestamp = Utc::now().timestamp() + node.params.future_threshold + 3600;
    solve(&node, &mut block);

    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::FutureTimestamp(_)));
    // Not canonical, but not forgotten either; it will be retried once the
    // clock catches up.
    assert_eq!(node.cs.current_height().unwrap(), 0);
}

#[test]
fn empty_blocks_extend_the_chain() {
    let node = TestNode::new().unwrap();
    node.mine_empty_blocks(5).unwrap();
    assert_eq!(node.cs.current_height().unwrap(), 5);

    let tip = node.cs.block_at_height(5).unwrap().unwrap();
    assert_eq!(node.cs.current_block_id().unwrap(), tip.id());
}

#[test]
fn miner_payout_matures_after_delay() {
    let node = TestNode::new().unwrap();
    let block = node.mine_and_accept(vec![]).unwrap();
    let payout_id = block.miner_payout_id(0);
    let maturity = 1 + node.params.maturity_delay;

    // Delayed, not yet spendable.
    assert!(node
        .cs
        .delayed_siacoin_output(maturity, &payout_id)
        .unwrap()
        .is_some());
    assert!(node.cs.siacoin_output(&payout_id).unwrap().is_none());

    node.mine_empty_blocks(node.params.maturity_delay).unwrap();

    assert!(node
        .cs
        .delayed_siacoin_output(maturity, &payout_id)
        .unwrap()
        .is_none());
    let live = node.cs.siacoin_output(&payout_id).unwrap().unwrap();
    assert_eq!(live.value, block.miner_payouts[0].value);
}

#[test]
fn immature_payout_cannot_be_spent() {
    let node = TestNode::new().unwrap();
    let block = node.mine_and_accept(vec![]).unwrap();
    let payout_id = block.miner_payout_id(0);

    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value: block.miner_payouts[0].value,
            unlock_hash: node.key.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);

    let spend = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();
    let err = node.cs.accept_block(spend).unwrap_err();
    assert!(matches!(err, ConsensusError::ImmatureInput));
}

#[test]
fn matured_payout_spends_with_valid_signature() {
    let node = TestNode::new().unwrap();
    let (payout_id, value) = node.mine_spendable_payout().unwrap();

    let recipient = TestKey::from_seed(9);
    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value,
            unlock_hash: recipient.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);
    let new_output_id = txn.siacoin_output_id(0);

    node.mine_and_accept(vec![txn]).unwrap();

    assert!(node.cs.siacoin_output(&payout_id).unwrap().is_none());
    let moved = node.cs.siacoin_output(&new_output_id).unwrap().unwrap();
    assert_eq!(moved.unlock_hash, recipient.unlock_hash());
}

#[test]
fn forged_signature_is_rejected() {
    let node = TestNode::new().unwrap();
    let (payout_id, value) = node.mine_spendable_payout().unwrap();

    // Signed by a key that is not in the unlock conditions.
    let thief = TestKey::from_seed(66);
    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value,
            unlock_hash: thief.unlock_hash(),
        }],
        ..Transaction::default()
    };
    thief.sign_transaction(&mut txn, &[payout_id.0]);

    let block = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();
    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidSignature));
    assert_eq!(
        node.cs.current_height().unwrap(),
        1 + node.params.maturity_delay
    );
}

#[test]
fn unbalanced_transaction_is_rejected() {
    let node = TestNode::new().unwrap();
    let (payout_id, value) = node.mine_spendable_payout().unwrap();

    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value: value + Currency::from_u64(1),
            unlock_hash: node.key.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);

    let block = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();
    let err = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(err, ConsensusError::SiacoinInputOutputMismatch));
}

#[test]
fn dos_block_is_rejected_cheaply_on_resubmission() {
    let node = TestNode::new().unwrap();
    let (payout_id, value) = node.mine_spendable_payout().unwrap();

    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value: value + Currency::from_u64(1),
            unlock_hash: node.key.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);
    let block = mine_block(&node.cs, vec![txn], node.key.unlock_hash()).unwrap();

    let first = node.cs.accept_block(block.clone()).unwrap_err();
    assert!(matches!(first, ConsensusError::SiacoinInputOutputMismatch));

    let second = node.cs.accept_block(block).unwrap_err();
    assert!(matches!(second, ConsensusError::DoSBlock(_)));
}

#[test]
fn validate_transaction_set_checks_without_committing() {
    let node = TestNode::new().unwrap();
    let (payout_id, value) = node.mine_spendable_payout().unwrap();

    let mut txn = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: payout_id,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value,
            unlock_hash: node.key.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut txn, &[payout_id.0]);

    // A dependent spend of the first transaction's output.
    let child_parent = txn.siacoin_output_id(0);
    let mut child = Transaction {
        siacoin_inputs: vec![SiacoinInput {
            parent_id: child_parent,
            unlock_conditions: node.key.unlock_conditions(),
        }],
        siacoin_outputs: vec![SiacoinOutput {
            value,
            unlock_hash: node.key.unlock_hash(),
        }],
        ..Transaction::default()
    };
    node.key.sign_transaction(&mut child, &[child_parent.0]);

    node.cs
        .validate_transaction_set(&[txn.clone(), child.clone()])
        .unwrap();
    // Nothing was committed: the set validates again.
    node.cs.validate_transaction_set(&[txn, child]).unwrap();

    // The dependent child alone has a missing input.
    let mut lone = Transaction::default();
    lone.siacoin_inputs.push(SiacoinInput {
        parent_id: child_parent,
        unlock_conditions: node.key.unlock_conditions(),
    });
    let err = node.cs.validate_transaction_set(&[lone]).unwrap_err();
    assert!(matches!(err, ConsensusError::MissingInput));

    assert!(node.cs.siacoin_output(&payout_id).unwrap().is_some());
}
