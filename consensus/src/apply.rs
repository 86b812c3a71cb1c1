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

//! Block application and reversal. All consensus-set mutations flow through
//! the diff commit functions here, so a revert is exactly the apply run
//! backwards.

use tracing::{debug, trace};
use vaultos_kv::Tx;
use vaultos_objects::{
    BlockHeight, FileContract, FileContractId, FileContractRevision, FromBytes, Hash, Params,
    SiacoinOutput, SiacoinOutputId, ToBytes, Transaction,
};

use crate::consistency;
use crate::database::{
    self, dsco_key, fcex_key, height_key, StoredBlock, BUCKET_DSCO, BUCKET_FCEX,
    BUCKET_FILE_CONTRACTS, BUCKET_SIACOIN_OUTPUTS, BUCKET_SIAFUND_OUTPUTS,
};
use crate::diffs::{
    BlockDiffs, DelayedSiacoinOutputDiff, DiffDirection, FileContractDiff, SiacoinOutputDiff,
    SiafundOutputDiff, SiafundPoolDiff,
};
use crate::error::ConsensusError;
use crate::validation;

pub fn commit_siacoin_output_diff(
    tx: &Tx<'_>,
    diff: &SiacoinOutputDiff,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    if diff.direction == dir {
        tx.put(BUCKET_SIACOIN_OUTPUTS, diff.id.as_bytes(), &diff.output.to_bytes())?;
    } else {
        tx.delete(BUCKET_SIACOIN_OUTPUTS, diff.id.as_bytes())?;
    }
    Ok(())
}

pub fn commit_file_contract_diff(
    tx: &Tx<'_>,
    diff: &FileContractDiff,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    let expiration = fcex_key(diff.contract.window_end, &diff.id);
    if diff.direction == dir {
        tx.put(BUCKET_FILE_CONTRACTS, diff.id.as_bytes(), &diff.contract.to_bytes())?;
        tx.put(BUCKET_FCEX, &expiration, &[])?;
    } else {
        tx.delete(BUCKET_FILE_CONTRACTS, diff.id.as_bytes())?;
        tx.delete(BUCKET_FCEX, &expiration)?;
    }
    Ok(())
}

pub fn commit_siafund_output_diff(
    tx: &Tx<'_>,
    diff: &SiafundOutputDiff,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    if diff.direction == dir {
        tx.put(BUCKET_SIAFUND_OUTPUTS, diff.id.as_bytes(), &diff.output.to_bytes())?;
    } else {
        tx.delete(BUCKET_SIAFUND_OUTPUTS, diff.id.as_bytes())?;
    }
    Ok(())
}

pub fn commit_delayed_siacoin_output_diff(
    tx: &Tx<'_>,
    diff: &DelayedSiacoinOutputDiff,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    let key = dsco_key(diff.maturity_height, &diff.id);
    if diff.direction == dir {
        tx.put(BUCKET_DSCO, &key, &diff.output.to_bytes())?;
    } else {
        tx.delete(BUCKET_DSCO, &key)?;
    }
    Ok(())
}

pub fn commit_siafund_pool_diff(
    tx: &Tx<'_>,
    diff: &SiafundPoolDiff,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    match dir {
        DiffDirection::Apply => database::set_siafund_pool(tx, &diff.adjusted),
        DiffDirection::Revert => database::set_siafund_pool(tx, &diff.previous),
    }
}

/// Commit every diff of a block. Forward order on apply; reverse order,
/// lists reversed, on revert.
pub fn commit_diffs(
    tx: &Tx<'_>,
    diffs: &BlockDiffs,
    dir: DiffDirection,
) -> Result<(), ConsensusError> {
    match dir {
        DiffDirection::Apply => {
            for diff in &diffs.siacoin_output_diffs {
                commit_siacoin_output_diff(tx, diff, dir)?;
            }
            for diff in &diffs.file_contract_diffs {
                commit_file_contract_diff(tx, diff, dir)?;
            }
            for diff in &diffs.siafund_output_diffs {
                commit_siafund_output_diff(tx, diff, dir)?;
            }
            for diff in &diffs.delayed_siacoin_output_diffs {
                commit_delayed_siacoin_output_diff(tx, diff, dir)?;
            }
            for diff in &diffs.siafund_pool_diffs {
                commit_siafund_pool_diff(tx, diff, dir)?;
            }
        }
        DiffDirection::Revert => {
            for diff in diffs.siafund_pool_diffs.iter().rev() {
                commit_siafund_pool_diff(tx, diff, dir)?;
            }
            for diff in diffs.delayed_siacoin_output_diffs.iter().rev() {
                commit_delayed_siacoin_output_diff(tx, diff, dir)?;
            }
            for diff in diffs.siafund_output_diffs.iter().rev() {
                commit_siafund_output_diff(tx, diff, dir)?;
            }
            for diff in diffs.file_contract_diffs.iter().rev() {
                commit_file_contract_diff(tx, diff, dir)?;
            }
            for diff in diffs.siacoin_output_diffs.iter().rev() {
                commit_siacoin_output_diff(tx, diff, dir)?;
            }
        }
    }
    Ok(())
}

fn contract_from_revision(old: &FileContract, rev: &FileContractRevision) -> FileContract {
    FileContract {
        filesize: rev.new_filesize,
        merkle_root: rev.new_merkle_root,
        window_start: rev.new_window_start,
        window_end: rev.new_window_end,
        payout: old.payout,
        valid_proof_outputs: rev.new_valid_proof_outputs.clone(),
        missed_proof_outputs: rev.new_missed_proof_outputs.clone(),
        unlock_hash: rev.new_unlock_hash,
        revision_number: rev.new_revision_number,
    }
}

/// Apply one already-validated transaction, recording its diffs.
pub fn apply_transaction(
    tx: &Tx<'_>,
    params: &Params,
    diffs: &mut BlockDiffs,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    // Spent siacoin inputs.
    for input in &txn.siacoin_inputs {
        let output =
            database::siacoin_output(tx, &input.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        let diff = SiacoinOutputDiff {
            direction: DiffDirection::Revert,
            id: input.parent_id,
            output,
        };
        commit_siacoin_output_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.siacoin_output_diffs.push(diff);
    }

    // Created siacoin outputs.
    for (i, output) in txn.siacoin_outputs.iter().enumerate() {
        let diff = SiacoinOutputDiff {
            direction: DiffDirection::Apply,
            id: txn.siacoin_output_id(i as u64),
            output: *output,
        };
        commit_siacoin_output_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.siacoin_output_diffs.push(diff);
    }

    // New file contracts: open the contract and divert the tax to the pool.
    for (i, contract) in txn.file_contracts.iter().enumerate() {
        let diff = FileContractDiff {
            direction: DiffDirection::Apply,
            id: txn.file_contract_id(i as u64),
            contract: contract.clone(),
        };
        commit_file_contract_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.file_contract_diffs.push(diff);

        let previous = database::siafund_pool(tx)?;
        let adjusted = previous + params.tax(height, &contract.payout);
        let pool_diff = SiafundPoolDiff { previous, adjusted };
        commit_siafund_pool_diff(tx, &pool_diff, DiffDirection::Apply)?;
        diffs.siafund_pool_diffs.push(pool_diff);
    }

    // Revisions replace the open contract wholesale.
    for rev in &txn.file_contract_revisions {
        let old =
            database::file_contract(tx, &rev.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        let out_diff = FileContractDiff {
            direction: DiffDirection::Revert,
            id: rev.parent_id,
            contract: old.clone(),
        };
        commit_file_contract_diff(tx, &out_diff, DiffDirection::Apply)?;
        diffs.file_contract_diffs.push(out_diff);

        let in_diff = FileContractDiff {
            direction: DiffDirection::Apply,
            id: rev.parent_id,
            contract: contract_from_revision(&old, rev),
        };
        commit_file_contract_diff(tx, &in_diff, DiffDirection::Apply)?;
        diffs.file_contract_diffs.push(in_diff);
    }

    // Accepted storage proofs close their contract with the valid outputs,
    // delayed to maturity.
    for proof in &txn.storage_proofs {
        let contract =
            database::file_contract(tx, &proof.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        for (i, output) in contract.valid_proof_outputs.iter().enumerate() {
            let diff = DelayedSiacoinOutputDiff {
                direction: DiffDirection::Apply,
                id: proof.parent_id.storage_proof_output_id(true, i as u64),
                output: *output,
                maturity_height: height + params.maturity_delay,
            };
            commit_delayed_siacoin_output_diff(tx, &diff, DiffDirection::Apply)?;
            diffs.delayed_siacoin_output_diffs.push(diff);
        }
        let diff = FileContractDiff {
            direction: DiffDirection::Revert,
            id: proof.parent_id,
            contract,
        };
        commit_file_contract_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.file_contract_diffs.push(diff);
        trace!("storage proof closed contract {:?}", proof.parent_id);
    }

    // Spent siafund inputs release the pool share accrued since claim_start.
    for input in &txn.siafund_inputs {
        let output =
            database::siafund_output(tx, &input.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        let pool = database::siafund_pool(tx)?;
        let claim = validation::siafund_claim(params, &pool, &output);
        let claim_diff = DelayedSiacoinOutputDiff {
            direction: DiffDirection::Apply,
            id: input.parent_id.sia_claim_output_id(),
            output: SiacoinOutput {
                value: claim,
                unlock_hash: input.claim_unlock_hash,
            },
            maturity_height: height + params.maturity_delay,
        };
        commit_delayed_siacoin_output_diff(tx, &claim_diff, DiffDirection::Apply)?;
        diffs.delayed_siacoin_output_diffs.push(claim_diff);

        let diff = SiafundOutputDiff {
            direction: DiffDirection::Revert,
            id: input.parent_id,
            output,
        };
        commit_siafund_output_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.siafund_output_diffs.push(diff);
    }

    // Created siafund outputs snapshot the pool.
    for (i, output) in txn.siafund_outputs.iter().enumerate() {
        let mut output = *output;
        output.claim_start = database::siafund_pool(tx)?;
        let diff = SiafundOutputDiff {
            direction: DiffDirection::Apply,
            id: txn.siafund_output_id(i as u64),
            output,
        };
        commit_siafund_output_diff(tx, &diff, DiffDirection::Apply)?;
        diffs.siafund_output_diffs.push(diff);
    }

    Ok(())
}

/// Queue the miner payouts as delayed outputs.
fn apply_miner_payouts(
    tx: &Tx<'_>,
    params: &Params,
    stored: &mut StoredBlock,
) -> Result<(), ConsensusError> {
    let height = stored.height;
    for (i, payout) in stored.block.miner_payouts.iter().enumerate() {
        let diff = DelayedSiacoinOutputDiff {
            direction: DiffDirection::Apply,
            id: stored.block.miner_payout_id(i as u64),
            output: *payout,
            maturity_height: height + params.maturity_delay,
        };
        commit_delayed_siacoin_output_diff(tx, &diff, DiffDirection::Apply)?;
        stored.diffs.delayed_siacoin_output_diffs.push(diff);
    }
    Ok(())
}

/// Mature the delayed bucket at `height` and expire contracts whose window
/// closed.
fn apply_maintenance(
    tx: &Tx<'_>,
    params: &Params,
    stored: &mut StoredBlock,
) -> Result<(), ConsensusError> {
    let height = stored.height;

    // Matured siacoin outputs move from the delayed bucket to the live set.
    let mut matured: Vec<(Vec<u8>, Vec<u8>)> = vec![];
    tx.for_each_prefix(BUCKET_DSCO, &height_key(height), |key, value| {
        matured.push((key.to_vec(), value.to_vec()));
        Ok(())
    })?;
    for (key, value) in matured {
        let id = SiacoinOutputId(Hash(key[8..].try_into().map_err(|_| {
            ConsensusError::Inconsistency("malformed delayed output key")
        })?));
        let output = SiacoinOutput::from_bytes(&value)?;

        let out_diff = DelayedSiacoinOutputDiff {
            direction: DiffDirection::Revert,
            id,
            output,
            maturity_height: height,
        };
        commit_delayed_siacoin_output_diff(tx, &out_diff, DiffDirection::Apply)?;
        stored.diffs.delayed_siacoin_output_diffs.push(out_diff);

        let in_diff = SiacoinOutputDiff {
            direction: DiffDirection::Apply,
            id,
            output,
        };
        commit_siacoin_output_diff(tx, &in_diff, DiffDirection::Apply)?;
        stored.diffs.siacoin_output_diffs.push(in_diff);
    }

    // Contracts whose window ends here missed their proof; pay the missed
    // outputs, delayed.
    let mut expired: Vec<FileContractId> = vec![];
    tx.for_each_prefix(BUCKET_FCEX, &height_key(height), |key, _| {
        if key.len() == 40 {
            let mut id = [0u8; 32];
            id.copy_from_slice(&key[8..]);
            expired.push(FileContractId(Hash(id)));
        }
        Ok(())
    })?;
    for id in expired {
        let contract = database::file_contract(tx, &id)?.ok_or(
            ConsensusError::Inconsistency("expiration index references a missing contract"),
        )?;
        for (i, output) in contract.missed_proof_outputs.iter().enumerate() {
            let diff = DelayedSiacoinOutputDiff {
                direction: DiffDirection::Apply,
                id: id.storage_proof_output_id(false, i as u64),
                output: *output,
                maturity_height: height + params.maturity_delay,
            };
            commit_delayed_siacoin_output_diff(tx, &diff, DiffDirection::Apply)?;
            stored.diffs.delayed_siacoin_output_diffs.push(diff);
        }
        let diff = FileContractDiff {
            direction: DiffDirection::Revert,
            id,
            contract,
        };
        commit_file_contract_diff(tx, &diff, DiffDirection::Apply)?;
        stored.diffs.file_contract_diffs.push(diff);
        debug!("contract {:?} expired without a storage proof", id);
    }

    Ok(())
}

/// Apply `stored` on top of the current tip, generating diffs if this is
/// the first application and replaying them otherwise. The stored block in
/// the arena is updated in place.
pub fn apply_block(
    tx: &Tx<'_>,
    params: &Params,
    stored: &mut StoredBlock,
) -> Result<(), ConsensusError> {
    let id = stored.id();
    database::push_path(tx, stored.height, &id)?;

    if stored.diffs_generated {
        commit_diffs(tx, &stored.diffs, DiffDirection::Apply)?;
    } else {
        for txn in &stored.block.transactions {
            validation::valid_transaction(tx, params, txn, stored.height)?;
            apply_transaction(tx, params, &mut stored.diffs, txn, stored.height)?;
        }
        apply_miner_payouts(tx, params, stored)?;
        apply_maintenance(tx, params, stored)?;
        stored.diffs_generated = true;
    }

    if params.check_consistency {
        let checksum = consistency::consensus_checksum(tx)?;
        if stored.consensus_checksum.is_zero() {
            stored.consensus_checksum = checksum;
        } else if stored.consensus_checksum != checksum {
            return Err(ConsensusError::Inconsistency(
                "reapplied block produced a different checksum",
            ));
        }
        consistency::audit(tx, params, stored.height)?;
    }
    database::put_stored_block(tx, stored)?;
    trace!("applied block {:?} at height {}", id, stored.height);
    Ok(())
}

/// Undo the current tip. The inverse of [`apply_block`].
pub fn revert_block(
    tx: &Tx<'_>,
    params: &Params,
    stored: &StoredBlock,
) -> Result<(), ConsensusError> {
    commit_diffs(tx, &stored.diffs, DiffDirection::Revert)?;
    database::pop_path(tx, stored.height)?;

    if params.check_consistency {
        let parent = database::require_stored_block(tx, &stored.block.parent_id)?;
        if !parent.consensus_checksum.is_zero() {
            let checksum = consistency::consensus_checksum(tx)?;
            if checksum != parent.consensus_checksum {
                return Err(ConsensusError::Inconsistency(
                    "revert did not restore the parent checksum",
                ));
            }
        }
    }
    trace!("reverted block {:?} at height {}", stored.id(), stored.height);
    Ok(())
}
