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

use std::fmt;

use crate::block::Block;
use crate::currency::Currency;
use crate::hash::{BlockId, Hash, UnlockHash};
use crate::target::Target;
use crate::transaction::{SiafundOutput, Transaction};
use crate::BlockHeight;

/// Storage proofs cover 64-byte segments.
pub const SEGMENT_SIZE: usize = 64;

/// Hosts store data in fixed 4 MiB sectors.
pub const SECTOR_SIZE: u64 = 1 << 22;

/// The maximum encoded block size in bytes.
pub const BLOCK_SIZE_LIMIT: u64 = 2_000_000;

/// The network a set of parameters corresponds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testing,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testing => write!(f, "testing"),
        }
    }
}

/// Every protocol tunable, passed by value at node construction. There is
/// deliberately no global parameter state.
#[derive(Clone, Debug)]
pub struct Params {
    pub network: Network,

    // Block acceptance.
    pub block_size_limit: u64,
    /// Desired seconds between blocks.
    pub block_frequency: i64,
    /// Blocks before a delayed output can be spent.
    pub maturity_delay: BlockHeight,
    /// Blocks sampled for the earliest-timestamp median.
    pub median_timestamp_window: usize,
    /// Seconds a block timestamp may lead the wall clock.
    pub future_threshold: i64,
    /// Beyond this lead the block is rejected instead of parked.
    pub extreme_future_threshold: i64,

    // Issuance.
    pub initial_coinbase: u64,
    pub minimum_coinbase: u64,

    // Siafunds.
    pub siafund_count: u64,
    pub siafund_tax_numerator: u64,
    pub siafund_tax_denominator: u64,
    /// Height at which contract taxes start rounding to a multiple of the
    /// siafund count, making pool claims divide exactly.
    pub tax_hardfork_height: BlockHeight,

    // Difficulty.
    pub root_target: Target,
    pub oak_decay_numerator: u64,
    pub oak_decay_denominator: u64,
    pub oak_max_rise_numerator: u64,
    pub oak_max_rise_denominator: u64,
    pub oak_max_drop_numerator: u64,
    pub oak_max_drop_denominator: u64,

    // Genesis.
    pub genesis_timestamp: i64,
    pub genesis_siafund_unlock_hash: UnlockHash,

    /// Audit the currency counts and consensus checksum after every applied
    /// block. Always on for testing networks; expensive on real chains.
    pub check_consistency: bool,

    // Host storage manager.
    pub max_storage_folders: usize,
    pub min_storage_folder_size: u64,
    pub max_storage_folder_size: u64,
    pub max_virtual_sectors: u64,
    pub storage_folder_uid_size: usize,
}

impl Params {
    pub fn mainnet() -> Params {
        let mut root_target = [0u8; 32];
        root_target[4] = 32;

        Params {
            network: Network::Mainnet,
            block_size_limit: BLOCK_SIZE_LIMIT,
            block_frequency: 600,
            maturity_delay: 144,
            median_timestamp_window: 11,
            future_threshold: 3 * 60 * 60,
            extreme_future_threshold: 5 * 60 * 60,
            initial_coinbase: 300_000,
            minimum_coinbase: 30_000,
            siafund_count: 10_000,
            siafund_tax_numerator: 39,
            siafund_tax_denominator: 1_000,
            tax_hardfork_height: 21_000,
            root_target: Target(root_target),
            oak_decay_numerator: 995,
            oak_decay_denominator: 1_000,
            oak_max_rise_numerator: 1_004,
            oak_max_rise_denominator: 1_000,
            oak_max_drop_numerator: 1_000,
            oak_max_drop_denominator: 1_004,
            genesis_timestamp: 1_433_600_000,
            genesis_siafund_unlock_hash: UnlockHash(Hash([
                0x1d, 0x9e, 0x0a, 0x3b, 0x4c, 0x5d, 0x6e, 0x7f, 0x80, 0x91, 0xa2, 0xb3, 0xc4,
                0xd5, 0xe6, 0xf7, 0x08, 0x19, 0x2a, 0x3b, 0x4c, 0x5d, 0x6e, 0x7f, 0x80, 0x91,
                0xa2, 0xb3, 0xc4, 0xd5, 0xe6, 0xf7,
            ])),
            check_consistency: cfg!(debug_assertions),
            max_storage_folders: 256,
            min_storage_folder_size: 32 * SECTOR_SIZE,
            max_storage_folder_size: (1 << 20) * SECTOR_SIZE,
            max_virtual_sectors: 250,
            storage_folder_uid_size: 4,
        }
    }

    /// A fast, permissive network for tests: near-trivial work target, short
    /// maturity delay, exact-tax rounding from genesis, audits always on.
    pub fn testing() -> Params {
        let mut root_target = [0u8; 32];
        root_target[0] = 64;

        Params {
            network: Network::Testing,
            block_frequency: 1,
            maturity_delay: 10,
            tax_hardfork_height: 0,
            root_target: Target(root_target),
            check_consistency: true,
            min_storage_folder_size: 8 * SECTOR_SIZE,
            ..Params::mainnet()
        }
    }

    /// Redirect the genesis siafund allocation, so tests can hold the keys.
    pub fn with_genesis_siafund_unlock_hash(mut self, unlock_hash: UnlockHash) -> Params {
        self.genesis_siafund_unlock_hash = unlock_hash;
        self
    }

    /// The coinbase at `height`, in base units.
    pub fn block_subsidy(&self, height: BlockHeight) -> Currency {
        let coinbase = self
            .initial_coinbase
            .saturating_sub(height)
            .max(self.minimum_coinbase);
        Currency::from_coins(coinbase)
    }

    /// The portion of a file contract payout diverted to the siafund pool.
    pub fn tax(&self, height: BlockHeight, payout: &Currency) -> Currency {
        let base = payout.mul_div_u64(self.siafund_tax_numerator, self.siafund_tax_denominator);
        if height >= self.tax_hardfork_height {
            base.checked_sub(&base.rem_u64(self.siafund_count))
                .expect("remainder never exceeds its dividend")
        } else {
            base
        }
    }

    /// The genesis block: no payouts, a single transaction carrying the
    /// initial siafund allocation.
    pub fn genesis_block(&self) -> Block {
        Block {
            parent_id: BlockId::default(),
            nonce: [0; 8],
            timestamp: self.genesis_timestamp,
            miner_payouts: vec![],
            transactions: vec![Transaction {
                siafund_outputs: vec![SiafundOutput {
                    value: Currency::from_u64(self.siafund_count),
                    unlock_hash: self.genesis_siafund_unlock_hash,
                    claim_start: Currency::ZERO,
                }],
                ..Transaction::default()
            }],
        }
    }

    pub fn genesis_id(&self) -> BlockId {
        self.genesis_block().id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_decreases_to_minimum() {
        let params = Params::mainnet();
        assert_eq!(params.block_subsidy(0), Currency::from_coins(300_000));
        assert_eq!(params.block_subsidy(1), Currency::from_coins(299_999));
        assert_eq!(params.block_subsidy(270_000), Currency::from_coins(30_000));
        assert_eq!(params.block_subsidy(u64::MAX), Currency::from_coins(30_000));
    }

    #[test]
    fn tax_rounds_to_siafund_count_after_hardfork() {
        let params = Params::mainnet();
        let payout = Currency::from_u64(1_000_003);

        let before = params.tax(0, &payout);
        assert_eq!(before, Currency::from_u64(39_000));

        let payout = Currency::from_u64(1_000_260);
        let after = params.tax(params.tax_hardfork_height, &payout);
        // 39_010 rounds down to a multiple of 10_000.
        assert_eq!(after, Currency::from_u64(30_000));
    }

    #[test]
    fn genesis_block_is_deterministic() {
        let params = Params::testing();
        assert_eq!(params.genesis_id(), params.genesis_block().id());
        assert_eq!(
            params.genesis_block().transactions[0].siafund_outputs[0].value,
            Currency::from_u64(10_000)
        );
    }

    #[test]
    fn testing_genesis_differs_with_siafund_recipient() {
        let base = Params::testing();
        let redirected = Params::testing()
            .with_genesis_siafund_unlock_hash(UnlockHash(Hash([9u8; 32])));
        assert_ne!(base.genesis_id(), redirected.genesis_id());
    }
}
