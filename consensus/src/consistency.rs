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

//! Whole-state audits. The checksum is a Merkle root over every
//! deterministic bucket; the currency counts re-derive the issuance
//! schedule from the live state. Either failing means the database can no
//! longer be trusted.

use vaultos_kv::{bucket_checksum, Tx};
use vaultos_objects::{
    BlockHeight, Currency, FileContract, FromBytes, Hash, Params, SiacoinOutput, SiafundOutput,
};

use crate::database::{
    self, BUCKET_BLOCK_PATH, BUCKET_DSCO, BUCKET_FCEX, BUCKET_FILE_CONTRACTS,
    BUCKET_SIACOIN_OUTPUTS, BUCKET_SIAFUND_OUTPUTS, BUCKET_SIAFUND_POOL,
};
use crate::error::ConsensusError;
use crate::validation::siafund_claim;

/// The buckets folded into the consensus checksum, in their fixed order.
/// The delayed-output and expiration families iterate in be64 height order,
/// which equals their logical byte-sorted bucket-name order.
const CHECKSUM_BUCKETS: &[&str] = &[
    BUCKET_BLOCK_PATH,
    BUCKET_SIACOIN_OUTPUTS,
    BUCKET_FILE_CONTRACTS,
    BUCKET_SIAFUND_OUTPUTS,
    BUCKET_SIAFUND_POOL,
    BUCKET_DSCO,
    BUCKET_FCEX,
];

/// The Merkle root over all deterministic consensus buckets. Two nodes with
/// the same canonical chain produce the same value.
pub fn consensus_checksum(tx: &Tx<'_>) -> Result<Hash, ConsensusError> {
    let root = bucket_checksum(tx, CHECKSUM_BUCKETS)?;
    Ok(Hash(root.unwrap_or_default()))
}

/// The deterministic issuance at `height`: the sum of every block subsidy
/// since genesis. Claims and taxes only move existing coins.
pub fn expected_siacoin_supply(params: &Params, height: BlockHeight) -> Currency {
    let mut supply = Currency::ZERO;
    for h in 1..=height {
        supply += params.block_subsidy(h);
    }
    supply
}

fn check_siacoin_count(
    tx: &Tx<'_>,
    params: &Params,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    let mut total = Currency::ZERO;

    tx.for_each(BUCKET_SIACOIN_OUTPUTS, |_, value| {
        total += SiacoinOutput::from_bytes(value)
            .map_err(|_| corrupt("undecodable siacoin output"))?
            .value;
        Ok(())
    })?;
    tx.for_each(BUCKET_DSCO, |_, value| {
        total += SiacoinOutput::from_bytes(value)
            .map_err(|_| corrupt("undecodable delayed output"))?
            .value;
        Ok(())
    })?;
    tx.for_each(BUCKET_FILE_CONTRACTS, |_, value| {
        total += FileContract::from_bytes(value)
            .map_err(|_| corrupt("undecodable file contract"))?
            .valid_proof_output_sum();
        Ok(())
    })?;

    // Unclaimed pool shares of the outstanding siafund outputs.
    let pool = database::siafund_pool(tx)?;
    tx.for_each(BUCKET_SIAFUND_OUTPUTS, |_, value| {
        let output = SiafundOutput::from_bytes(value)
            .map_err(|_| corrupt("undecodable siafund output"))?;
        total += siafund_claim(params, &pool, &output);
        Ok(())
    })?;

    if total != expected_siacoin_supply(params, height) {
        return Err(ConsensusError::Inconsistency(
            "siacoin supply does not match the issuance schedule",
        ));
    }
    Ok(())
}

fn check_siafund_count(tx: &Tx<'_>, params: &Params) -> Result<(), ConsensusError> {
    let mut total = Currency::ZERO;
    tx.for_each(BUCKET_SIAFUND_OUTPUTS, |_, value| {
        total += SiafundOutput::from_bytes(value)
            .map_err(|_| corrupt("undecodable siafund output"))?
            .value;
        Ok(())
    })?;
    if total != Currency::from_u64(params.siafund_count) {
        return Err(ConsensusError::Inconsistency(
            "siafund total does not equal the fixed count",
        ));
    }
    Ok(())
}

fn check_delayed_output_heights(
    tx: &Tx<'_>,
    params: &Params,
    height: BlockHeight,
) -> Result<(), ConsensusError> {
    let mut ok = true;
    tx.for_each(BUCKET_DSCO, |key, _| {
        if key.len() != 40 {
            ok = false;
            return Ok(());
        }
        let maturity = u64::from_be_bytes(key[..8].try_into().expect("checked length"));
        if maturity <= height || maturity > height + params.maturity_delay {
            ok = false;
        }
        Ok(())
    })?;
    if !ok {
        return Err(ConsensusError::Inconsistency(
            "delayed output outside the maturity window",
        ));
    }
    Ok(())
}

fn corrupt(msg: &'static str) -> vaultos_kv::KvError {
    vaultos_kv::KvError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// Run every audit. Any failure is fatal: the caller marks the database
/// inconsistent and refuses further writes.
pub fn audit(tx: &Tx<'_>, params: &Params, height: BlockHeight) -> Result<(), ConsensusError> {
    check_siacoin_count(tx, params, height)?;
    check_siafund_count(tx, params)?;
    check_delayed_output_heights(tx, params, height)
}
