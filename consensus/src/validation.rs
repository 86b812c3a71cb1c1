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

//! Read-only transaction validation against the current consensus set.
//! Every check here runs before the transaction mutates anything.

use std::collections::{HashMap, HashSet};

use ed25519_dalek::{Signature, VerifyingKey};
use primitive_types::U256;
use vaultos_kv::Tx;
use vaultos_merkle::{verify_proof, Blake2bHasher};
use vaultos_objects::hash::{hash_all, SPECIFIER_ED25519};
use vaultos_objects::{
    BlockHeight, Currency, FileContract, FileContractId, Hash, Params, SiafundOutput, Transaction,
    UnlockConditions, SEGMENT_SIZE,
};

use crate::database;
use crate::error::ConsensusError;

/// The siacoin share a siafund output releases when spent: its fraction of
/// the pool growth since the output was created. Division is exact once
/// taxes round to the siafund count.
pub fn siafund_claim(params: &Params, pool: &Currency, output: &SiafundOutput) -> Currency {
    let accrued = pool
        .checked_sub(&output.claim_start)
        .unwrap_or(Currency::ZERO);
    accrued.mul_div_u64(output.value.low_u64(), params.siafund_count)
}

/// The consensus-chosen segment index for a proof of storage: derived from
/// the id of the last block before the proof window opens, so a host cannot
/// grind a convenient segment in advance.
pub fn storage_proof_segment_index(
    tx: &Tx<'_>,
    contract: &FileContract,
    contract_id: &FileContractId,
) -> Result<u64, ConsensusError> {
    let segments = contract.segment_count();
    if segments == 0 {
        return Ok(0);
    }
    let trigger_height = contract.window_start - 1;
    let trigger_id = database::block_id_at_height(tx, trigger_height)?
        .ok_or(ConsensusError::InvalidStorageProof)?;
    let digest = hash_all(&[trigger_id.as_bytes(), contract_id.as_bytes()]);
    let index = U256::from_big_endian(digest.as_bytes()) % U256::from(segments);
    Ok(index.low_u64())
}

fn valid_siacoins(
    tx: &Tx<'_>,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    let mut seen: HashSet<_> = HashSet::new();
    let mut input_sum = Currency::ZERO;
    for input in &txn.siacoin_inputs {
        if !seen.insert(input.parent_id) {
            return Err(ConsensusError::MissingInput);
        }
        let output = match database::siacoin_output(tx, &input.parent_id)? {
            Some(output) => output,
            None if database::is_delayed_output(tx, &input.parent_id)? => {
                return Err(ConsensusError::ImmatureInput);
            }
            None => return Err(ConsensusError::MissingInput),
        };
        if input.unlock_conditions.unlock_hash() != output.unlock_hash {
            return Err(ConsensusError::UnlockHashMismatch);
        }
        if input.unlock_conditions.timelock > height {
            return Err(ConsensusError::InvalidSignature);
        }
        input_sum += output.value;
    }

    let mut output_sum: Currency = txn.siacoin_outputs.iter().map(|o| o.value).sum();
    output_sum += txn.miner_fees.iter().copied().sum();
    output_sum += txn.file_contracts.iter().map(|fc| fc.payout).sum();

    if input_sum != output_sum {
        return Err(ConsensusError::SiacoinInputOutputMismatch);
    }
    Ok(())
}

fn valid_file_contracts(
    params: &Params,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    for contract in &txn.file_contracts {
        if contract.window_start <= height || contract.window_end <= contract.window_start {
            return Err(ConsensusError::LateFileContract);
        }
        let tax = params.tax(height, &contract.payout);
        let expected = contract
            .payout
            .checked_sub(&tax)
            .ok_or(ConsensusError::SiacoinMiscount)?;
        if contract.valid_proof_output_sum() != expected
            || contract.missed_proof_output_sum() != expected
        {
            return Err(ConsensusError::SiacoinMiscount);
        }
    }
    Ok(())
}

fn valid_file_contract_revisions(
    tx: &Tx<'_>,
    params: &Params,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    for rev in &txn.file_contract_revisions {
        let contract =
            database::file_contract(tx, &rev.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        if height >= contract.window_start {
            return Err(ConsensusError::LateFileContract);
        }
        if rev.new_window_start <= height || rev.new_window_end <= rev.new_window_start {
            return Err(ConsensusError::LateFileContract);
        }
        if rev.new_revision_number <= contract.revision_number {
            return Err(ConsensusError::BadRevisionNumber);
        }
        if rev.unlock_conditions.unlock_hash() != contract.unlock_hash
            || rev.new_unlock_hash != contract.unlock_hash
        {
            return Err(ConsensusError::UnlockHashMismatch);
        }
        if rev.unlock_conditions.timelock > height {
            return Err(ConsensusError::InvalidSignature);
        }

        let tax = params.tax(height, &contract.payout);
        let expected = contract
            .payout
            .checked_sub(&tax)
            .ok_or(ConsensusError::SiacoinMiscount)?;
        let valid_sum: Currency = rev.new_valid_proof_outputs.iter().map(|o| o.value).sum();
        let missed_sum: Currency = rev.new_missed_proof_outputs.iter().map(|o| o.value).sum();
        if valid_sum != expected || missed_sum != expected {
            return Err(ConsensusError::SiacoinMiscount);
        }
    }
    Ok(())
}

fn valid_storage_proofs(
    tx: &Tx<'_>,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    if txn.storage_proofs.is_empty() {
        return Ok(());
    }
    // A transaction carrying a proof may not create outputs of its own;
    // otherwise a miner could reorganize the proof away and keep payouts
    // that depended on it.
    if !txn.siacoin_outputs.is_empty()
        || !txn.file_contracts.is_empty()
        || !txn.file_contract_revisions.is_empty()
        || !txn.siafund_outputs.is_empty()
    {
        return Err(ConsensusError::InvalidStorageProof);
    }

    let mut seen: HashSet<FileContractId> = HashSet::new();
    for proof in &txn.storage_proofs {
        if !seen.insert(proof.parent_id) {
            return Err(ConsensusError::InvalidStorageProof);
        }
        let contract =
            database::file_contract(tx, &proof.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        if height < contract.window_start {
            return Err(ConsensusError::InvalidStorageProof);
        }

        // A contract over zero bytes is provable only by the empty proof
        // against an empty commitment.
        if contract.filesize == 0 {
            if !proof.hash_set.is_empty()
                || proof.segment != [0u8; SEGMENT_SIZE]
                || contract.merkle_root != Hash::default()
            {
                return Err(ConsensusError::InvalidStorageProof);
            }
            continue;
        }

        let index = storage_proof_segment_index(tx, &contract, &proof.parent_id)?;
        let mut proof_set: Vec<Vec<u8>> = Vec::with_capacity(1 + proof.hash_set.len());
        proof_set.push(proof.segment.to_vec());
        for hash in &proof.hash_set {
            proof_set.push(hash.as_bytes().to_vec());
        }
        if !verify_proof(
            &Blake2bHasher,
            contract.merkle_root.as_bytes(),
            &proof_set,
            index,
            contract.segment_count(),
        ) {
            return Err(ConsensusError::InvalidStorageProof);
        }
    }
    Ok(())
}

fn valid_siafunds(tx: &Tx<'_>, txn: &Transaction, height: BlockHeight) -> Result<(), ConsensusError> {
    let mut seen: HashSet<_> = HashSet::new();
    let mut input_sum = Currency::ZERO;
    for input in &txn.siafund_inputs {
        if !seen.insert(input.parent_id) {
            return Err(ConsensusError::MissingInput);
        }
        let output =
            database::siafund_output(tx, &input.parent_id)?.ok_or(ConsensusError::MissingInput)?;
        if input.unlock_conditions.unlock_hash() != output.unlock_hash {
            return Err(ConsensusError::UnlockHashMismatch);
        }
        if input.unlock_conditions.timelock > height {
            return Err(ConsensusError::InvalidSignature);
        }
        input_sum += output.value;
    }
    let output_sum: Currency = txn.siafund_outputs.iter().map(|o| o.value).sum();
    if input_sum != output_sum {
        return Err(ConsensusError::SiafundMiscount);
    }
    Ok(())
}

fn strictly_increasing(indices: &[u64], len: usize) -> bool {
    indices.windows(2).all(|w| w[0] < w[1])
        && indices.last().map_or(true, |&last| (last as usize) < len)
}

fn valid_covered_fields(txn: &Transaction, sig_index: usize) -> bool {
    let cf = &txn.transaction_signatures[sig_index].covered_fields;
    if cf.whole_transaction {
        // Whole coverage leaves only other signatures to opt into.
        if !(cf.siacoin_inputs.is_empty()
            && cf.siacoin_outputs.is_empty()
            && cf.file_contracts.is_empty()
            && cf.file_contract_revisions.is_empty()
            && cf.storage_proofs.is_empty()
            && cf.siafund_inputs.is_empty()
            && cf.siafund_outputs.is_empty()
            && cf.miner_fees.is_empty()
            && cf.arbitrary_data.is_empty())
        {
            return false;
        }
    } else {
        if !(strictly_increasing(&cf.siacoin_inputs, txn.siacoin_inputs.len())
            && strictly_increasing(&cf.siacoin_outputs, txn.siacoin_outputs.len())
            && strictly_increasing(&cf.file_contracts, txn.file_contracts.len())
            && strictly_increasing(
                &cf.file_contract_revisions,
                txn.file_contract_revisions.len(),
            )
            && strictly_increasing(&cf.storage_proofs, txn.storage_proofs.len())
            && strictly_increasing(&cf.siafund_inputs, txn.siafund_inputs.len())
            && strictly_increasing(&cf.siafund_outputs, txn.siafund_outputs.len())
            && strictly_increasing(&cf.miner_fees, txn.miner_fees.len())
            && strictly_increasing(&cf.arbitrary_data, txn.arbitrary_data.len()))
        {
            return false;
        }
    }
    strictly_increasing(
        &cf.transaction_signatures,
        txn.transaction_signatures.len(),
    )
}

struct SigEntity {
    conditions: UnlockConditions,
    used_keys: HashSet<u64>,
    remaining: u64,
}

/// Check that every spend policy in the transaction is satisfied: the
/// required number of signatures, distinct key indices, satisfied
/// timelocks, and verifying ed25519 signatures over the covered-field hash.
/// Signatures for unknown parents, or beyond the required count, are
/// rejected outright.
fn valid_signatures(txn: &Transaction, height: BlockHeight) -> Result<(), ConsensusError> {
    let mut entities: HashMap<Hash, SigEntity> = HashMap::new();
    let mut add = |parent: Hash, conditions: &UnlockConditions| {
        let replaced = entities.insert(
            parent,
            SigEntity {
                conditions: conditions.clone(),
                used_keys: HashSet::new(),
                remaining: conditions.signatures_required,
            },
        );
        match replaced {
            Some(_) => Err(ConsensusError::InvalidSignature),
            None => Ok(()),
        }
    };

    for input in &txn.siacoin_inputs {
        add(input.parent_id.0, &input.unlock_conditions)?;
    }
    for input in &txn.siafund_inputs {
        add(input.parent_id.0, &input.unlock_conditions)?;
    }
    for rev in &txn.file_contract_revisions {
        add(rev.parent_id.0, &rev.unlock_conditions)?;
    }

    for (i, sig) in txn.transaction_signatures.iter().enumerate() {
        let entity = entities
            .get_mut(&sig.parent_id)
            .ok_or(ConsensusError::InvalidSignature)?;
        if entity.remaining == 0 {
            return Err(ConsensusError::InvalidSignature);
        }
        if sig.timelock > height {
            return Err(ConsensusError::InvalidSignature);
        }
        if !valid_covered_fields(txn, i) {
            return Err(ConsensusError::InvalidSignature);
        }
        if !entity.used_keys.insert(sig.public_key_index) {
            return Err(ConsensusError::InvalidSignature);
        }
        let key = entity
            .conditions
            .public_keys
            .get(sig.public_key_index as usize)
            .ok_or(ConsensusError::InvalidSignature)?;

        if key.algorithm == SPECIFIER_ED25519 {
            let key_bytes: [u8; 32] = key
                .key
                .as_slice()
                .try_into()
                .map_err(|_| ConsensusError::InvalidSignature)?;
            let verifying_key = VerifyingKey::from_bytes(&key_bytes)
                .map_err(|_| ConsensusError::InvalidSignature)?;
            let sig_bytes: [u8; 64] = sig
                .signature
                .as_slice()
                .try_into()
                .map_err(|_| ConsensusError::InvalidSignature)?;
            let signature = Signature::from_bytes(&sig_bytes);
            let message = txn.sig_hash(i)?;
            verifying_key
                .verify_strict(message.as_bytes(), &signature)
                .map_err(|_| ConsensusError::InvalidSignature)?;
        }
        // Unrecognized algorithms are accepted without verification, so new
        // schemes can be introduced as a soft fork.

        entity.remaining -= 1;
    }

    if entities.values().any(|entity| entity.remaining > 0) {
        return Err(ConsensusError::InvalidSignature);
    }
    Ok(())
}

/// Run every check for one transaction against the current state.
pub fn valid_transaction(
    tx: &Tx<'_>,
    params: &Params,
    txn: &Transaction,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    valid_siacoins(tx, txn, height)?;
    valid_file_contracts(params, txn, height)?;
    valid_file_contract_revisions(tx, params, txn, height)?;
    valid_storage_proofs(tx, txn, height)?;
    valid_siafunds(tx, txn, height)?;
    valid_signatures(txn, height)
}
