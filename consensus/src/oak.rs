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

//! The Oak difficulty algorithm. Each block on the canonical chain carries
//! exponentially decayed running totals of elapsed time and accumulated
//! difficulty; the child target tracks the hashrate those totals imply,
//! clamped to a small per-block adjustment.

use primitive_types::{U256, U512};
use vaultos_kv::Tx;
use vaultos_objects::{BlockId, FromBytes, Params, Target, ToBytes};

use crate::database::BUCKET_OAK;
use crate::error::ConsensusError;

/// The decayed running totals stored per canonical block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OakTotals {
    pub total_time: i64,
    pub total_target: Target,
}

impl OakTotals {
    /// The totals seeded at genesis: no elapsed time, difficulty one.
    pub fn genesis() -> OakTotals {
        OakTotals {
            total_time: 0,
            total_target: Target::ROOT_DEPTH,
        }
    }
}

pub fn oak_totals(tx: &Tx<'_>, id: &BlockId) -> Result<OakTotals, ConsensusError> {
    let bytes = tx
        .get(BUCKET_OAK, id.as_bytes())?
        .ok_or(ConsensusError::Inconsistency("missing oak totals"))?;
    let mut reader = &bytes[..];
    let total_time = i64::read(&mut reader)?;
    let total_target = Target::read(&mut reader)?;
    Ok(OakTotals {
        total_time,
        total_target,
    })
}

pub fn put_oak_totals(
    tx: &Tx<'_>,
    id: &BlockId,
    totals: &OakTotals,
) -> Result<(), ConsensusError> {
    let mut bytes = totals.total_time.to_bytes();
    bytes.extend(totals.total_target.to_bytes());
    Ok(tx.put(BUCKET_OAK, id.as_bytes(), &bytes)?)
}

/// Decay a difficulty by `num/den` without intermediate overflow.
fn decay_difficulty(difficulty: U256, num: u64, den: u64) -> U256 {
    let wide: U512 = difficulty.full_mul(U256::from(num)) / U512::from(den);
    U256::try_from(wide).expect("decay with num <= den never grows")
}

/// The totals a child block inherits: decay the parent's totals, then add
/// the elapsed time and the difficulty of the target the child had to meet.
pub fn child_totals(
    params: &Params,
    parent_totals: &OakTotals,
    parent_child_target: &Target,
    parent_timestamp: i64,
    block_timestamp: i64,
) -> OakTotals {
    let num = params.oak_decay_numerator;
    let den = params.oak_decay_denominator;

    let decayed_time = parent_totals.total_time.saturating_mul(num as i64) / den as i64;
    let total_time = decayed_time.saturating_add(block_timestamp - parent_timestamp);

    let decayed_difficulty = decay_difficulty(parent_totals.total_target.difficulty(), num, den);
    let total_difficulty = decayed_difficulty
        .checked_add(parent_child_target.difficulty())
        .unwrap_or(U256::MAX);

    OakTotals {
        total_time,
        total_target: Target::from_difficulty(total_difficulty),
    }
}

/// The target the child's own children must meet.
pub fn child_target(params: &Params, totals: &OakTotals, parent_child_target: &Target) -> Target {
    // Estimated network hashrate over the visible window, then the
    // difficulty that hits one block per BLOCK_FREQUENCY at that rate.
    let visible_time = totals.total_time.max(1) as u64;
    let hashrate = totals.total_target.difficulty() / U256::from(visible_time);
    let wide: U512 = hashrate.full_mul(U256::from(params.block_frequency.max(1) as u64));
    let target = match U256::try_from(wide) {
        Ok(difficulty) => Target::from_difficulty(difficulty),
        Err(_) => Target::from_difficulty(U256::MAX),
    };

    // Limit the per-block swing relative to the parent's child target.
    let easiest = parent_child_target.scale(
        params.oak_max_rise_numerator,
        params.oak_max_rise_denominator,
    );
    let hardest = parent_child_target.scale(
        params.oak_max_drop_numerator,
        params.oak_max_drop_denominator,
    );
    target.clamp(hardest, easiest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params::testing()
    }

    #[test]
    fn on_schedule_blocks_keep_target_stable() {
        let params = params();
        let root = params.root_target;
        let mut totals = OakTotals::genesis();
        let mut target = root;
        let mut timestamp = params.genesis_timestamp;

        for _ in 0..50 {
            totals = child_totals(
                &params,
                &totals,
                &target,
                timestamp,
                timestamp + params.block_frequency,
            );
            timestamp += params.block_frequency;
            target = child_target(&params, &totals, &target);
        }
        // The per-block clamp bounds the drift to 1.004^50 of the root
        // target in either direction.
        let easiest = root.scale(1300, 1000);
        let hardest = root.scale(1000, 1300);
        assert!(target <= easiest && target >= hardest);
    }

    #[test]
    fn fast_blocks_harden_the_target() {
        let params = params();
        let totals = OakTotals {
            total_time: 1,
            total_target: Target::from_difficulty(U256::from(1_000_000u64)),
        };
        let parent_target = params.root_target;
        let fast = child_target(&params, &totals, &parent_target);
        // Fast blocks imply a high hashrate, so the child target cannot be
        // easier than the parent's clamp allows, and here it pins to the
        // hardest bound.
        let hardest = parent_target.scale(
            params.oak_max_drop_numerator,
            params.oak_max_drop_denominator,
        );
        assert_eq!(fast, hardest);
    }

    #[test]
    fn slow_blocks_ease_the_target() {
        let params = params();
        let totals = OakTotals {
            total_time: 1_000_000_000,
            total_target: Target::from_difficulty(U256::from(2u64)),
        };
        let parent_target = params.root_target;
        let slow = child_target(&params, &totals, &parent_target);
        let easiest = parent_target.scale(
            params.oak_max_rise_numerator,
            params.oak_max_rise_denominator,
        );
        assert_eq!(slow, easiest);
    }

    #[test]
    fn decay_never_grows() {
        let difficulty = U256::from(u64::MAX);
        assert!(decay_difficulty(difficulty, 995, 1000) < difficulty);
    }
}
