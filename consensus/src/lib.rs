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

#![forbid(unsafe_code)]

pub mod accept;
pub mod apply;
pub mod changelog;
pub mod consistency;
pub mod database;
pub mod diffs;
pub mod error;
pub mod forks;
pub mod oak;
pub mod validation;

pub use changelog::{ChangeEntry, ChangeId, ChangeSubscriber};
pub use database::StoredBlock;
pub use diffs::{BlockDiffs, DiffDirection};
pub use error::ConsensusError;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use vaultos_kv::Database;
use vaultos_objects::{
    Block, BlockHeight, BlockId, FileContractId, FromBytes, Hash, Params, Target, Transaction,
};

use crate::database::DB_METADATA;
use crate::diffs::SiafundOutputDiff;

/// A block whose timestamp was ahead of the clock, parked until it can be
/// retried.
struct FutureBlock {
    retry_at: i64,
    block: Block,
}

/// The consensus engine: validates blocks, maintains the consensus set in
/// its database, drives reorganizations, and journals every canonical
/// mutation for subscribers.
///
/// One writer at a time; readers go through database views and never block
/// the writer for long.
pub struct ConsensusSet {
    params: Params,
    db: Database,
    writer: Mutex<()>,
    dos_blocks: Mutex<HashSet<BlockId>>,
    change_seq: Mutex<u64>,
    change_cond: Condvar,
    future_blocks: Mutex<Vec<FutureBlock>>,
    future_cond: Condvar,
    stop: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConsensusSet {
    /// Open (or create) the consensus database under `dir` and start the
    /// retry worker for parked future blocks.
    pub fn open(params: Params, dir: &Path) -> Result<Arc<ConsensusSet>, ConsensusError> {
        std::fs::create_dir_all(dir)?;
        let db = Database::open(dir.join("consensus.db"), DB_METADATA, database::buckets())?;

        let cs = Arc::new(ConsensusSet {
            params,
            db,
            writer: Mutex::new(()),
            dos_blocks: Mutex::new(HashSet::new()),
            change_seq: Mutex::new(0),
            change_cond: Condvar::new(),
            future_blocks: Mutex::new(vec![]),
            future_cond: Condvar::new(),
            stop: AtomicBool::new(false),
            worker: Mutex::new(None),
        });
        cs.init_genesis()?;

        let weak = Arc::downgrade(&cs);
        let handle = std::thread::Builder::new()
            .name("future-blocks".into())
            .spawn(move || future_block_worker(weak))?;
        *cs.worker.lock() = Some(handle);

        info!(
            "consensus set open on {} at height {}",
            cs.params.network,
            cs.current_height()?
        );
        Ok(cs)
    }

    /// Commit the genesis block on first open.
    fn init_genesis(&self) -> Result<(), ConsensusError> {
        self.db.update(|tx| -> Result<(), ConsensusError> {
            if tx.get(database::BUCKET_BLOCK_HEIGHT, b"BlockHeight")?.is_some() {
                return Ok(());
            }
            let block = self.params.genesis_block();
            let id = block.id();

            // The genesis allocation is the only state the genesis block
            // introduces.
            let mut diffs = BlockDiffs::default();
            for txn in &block.transactions {
                for (i, output) in txn.siafund_outputs.iter().enumerate() {
                    let diff = SiafundOutputDiff {
                        direction: DiffDirection::Apply,
                        id: txn.siafund_output_id(i as u64),
                        output: *output,
                    };
                    apply::commit_siafund_output_diff(tx, &diff, DiffDirection::Apply)?;
                    diffs.siafund_output_diffs.push(diff);
                }
            }
            let mut stored = StoredBlock {
                height: 0,
                depth: Target::ROOT_DEPTH,
                child_target: self.params.root_target,
                diffs_generated: true,
                diffs,
                consensus_checksum: Hash::default(),
                block,
            };
            database::push_path(tx, 0, &id)?;
            oak::put_oak_totals(tx, &id, &oak::OakTotals::genesis())?;
            if self.params.check_consistency {
                stored.consensus_checksum = consistency::consensus_checksum(tx)?;
            }
            database::put_stored_block(tx, &stored)?;
            changelog::append(tx, vec![], vec![id])?;
            debug!("committed genesis block {:?}", id);
            Ok(())
        })
    }

    /// Stop the retry worker and drain in-flight operations. No operation
    /// outlives this call.
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.future_cond.notify_all();
        self.change_cond.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            // The worker itself can be the last holder of the set.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
        // Taking the writer lock drains any acceptance in flight.
        let _writer = self.writer.lock();
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn writer_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    pub(crate) fn dos_blocks(&self) -> &Mutex<HashSet<BlockId>> {
        &self.dos_blocks
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn current_height(&self) -> Result<BlockHeight, ConsensusError> {
        self.db.view(|tx| database::current_height(tx))
    }

    pub fn current_block_id(&self) -> Result<BlockId, ConsensusError> {
        self.db.view(|tx| database::current_block_id(tx))
    }

    pub fn genesis_id(&self) -> BlockId {
        self.params.genesis_id()
    }

    pub fn block_at_height(&self, height: BlockHeight) -> Result<Option<Block>, ConsensusError> {
        self.db.view(|tx| {
            match database::block_id_at_height(tx, height)? {
                Some(id) => Ok(database::stored_block(tx, &id)?.map(|stored| stored.block)),
                None => Ok(None),
            }
        })
    }

    /// The target the next block must meet.
    pub fn child_target(&self) -> Result<Target, ConsensusError> {
        self.db.view(|tx| {
            let id = database::current_block_id(tx)?;
            Ok(database::require_stored_block(tx, &id)?.child_target)
        })
    }

    /// The minimum timestamp the next block may carry.
    pub fn earliest_child_timestamp(&self) -> Result<i64, ConsensusError> {
        self.db.view(|tx| {
            let id = database::current_block_id(tx)?;
            let tip = database::require_stored_block(tx, &id)?;
            accept::median_timestamp(tx, self.params.median_timestamp_window, &tip)
        })
    }

    /// A live siacoin output, if present.
    pub fn siacoin_output(
        &self,
        id: &vaultos_objects::SiacoinOutputId,
    ) -> Result<Option<vaultos_objects::SiacoinOutput>, ConsensusError> {
        self.db.view(|tx| database::siacoin_output(tx, id))
    }

    /// A delayed siacoin output in the maturity bucket at `maturity_height`.
    pub fn delayed_siacoin_output(
        &self,
        maturity_height: BlockHeight,
        id: &vaultos_objects::SiacoinOutputId,
    ) -> Result<Option<vaultos_objects::SiacoinOutput>, ConsensusError> {
        self.db.view(|tx| -> Result<_, ConsensusError> {
            match tx.get(
                database::BUCKET_DSCO,
                &database::dsco_key(maturity_height, id),
            )? {
                Some(bytes) => Ok(Some(vaultos_objects::SiacoinOutput::from_bytes(&bytes)?)),
                None => Ok(None),
            }
        })
    }

    /// An open file contract, if present.
    pub fn file_contract(
        &self,
        id: &FileContractId,
    ) -> Result<Option<vaultos_objects::FileContract>, ConsensusError> {
        self.db.view(|tx| database::file_contract(tx, id))
    }

    /// A siafund output, if present.
    pub fn siafund_output(
        &self,
        id: &vaultos_objects::SiafundOutputId,
    ) -> Result<Option<vaultos_objects::SiafundOutput>, ConsensusError> {
        self.db.view(|tx| database::siafund_output(tx, id))
    }

    /// The current siafund pool.
    pub fn siafund_pool(&self) -> Result<vaultos_objects::Currency, ConsensusError> {
        self.db.view(|tx| database::siafund_pool(tx))
    }

    /// The Merkle root over every deterministic consensus bucket.
    pub fn consensus_checksum(&self) -> Result<Hash, ConsensusError> {
        self.db.view(|tx| consistency::consensus_checksum(tx))
    }

    /// The segment index a storage proof for `contract_id` must cover.
    pub fn storage_proof_segment_index(
        &self,
        contract_id: &FileContractId,
    ) -> Result<u64, ConsensusError> {
        self.db.view(|tx| {
            let contract = database::file_contract(tx, contract_id)?
                .ok_or(ConsensusError::MissingInput)?;
            validation::storage_proof_segment_index(tx, &contract, contract_id)
        })
    }

    /// Validate a dependent sequence of transactions against the current
    /// consensus set without committing anything. The transaction-pool
    /// seam.
    pub fn validate_transaction_set(&self, txns: &[Transaction]) -> Result<(), ConsensusError> {
        self.db.trial(|tx| {
            let height = database::current_height(tx)?;
            let mut diffs = BlockDiffs::default();
            for txn in txns {
                validation::valid_transaction(tx, &self.params, txn, height)?;
                apply::apply_transaction(tx, &self.params, &mut diffs, txn, height)?;
            }
            Ok(())
        })
    }

    /// Follow the change log. With `start = None` delivery begins at the
    /// first entry; otherwise strictly after `start`, which must exist.
    pub fn subscribe(
        self: &Arc<Self>,
        start: Option<ChangeId>,
    ) -> Result<ChangeSubscriber, ConsensusError> {
        if let Some(id) = start {
            let known = self
                .db
                .view(|tx| changelog::entry(tx, &id))?
                .is_some();
            if !known {
                return Err(ConsensusError::InvalidChangeId);
            }
        }
        Ok(ChangeSubscriber {
            cs: self.clone(),
            cursor: start,
        })
    }

    pub(crate) fn notify_change(&self) {
        *self.change_seq.lock() += 1;
        self.change_cond.notify_all();
    }

    pub(crate) fn wait_for_change(&self, timeout: Duration) {
        let mut seq = self.change_seq.lock();
        self.change_cond.wait_for(&mut seq, timeout);
    }

    /// Park a block whose timestamp leads the clock, to be retried once the
    /// clock catches up.
    pub(crate) fn park_future_block(&self, block: Block) {
        let retry_at = block.timestamp - self.params.future_threshold;
        debug!(
            "parking future block {:?} until {}",
            block.id(),
            retry_at
        );
        self.future_blocks.lock().push(FutureBlock { retry_at, block });
        self.future_cond.notify_all();
    }
}

impl Drop for ConsensusSet {
    fn drop(&mut self) {
        self.close();
    }
}

/// Retries parked future blocks once their timestamps become acceptable.
fn future_block_worker(cs: Weak<ConsensusSet>) {
    loop {
        let due = {
            let cs = match cs.upgrade() {
                Some(cs) => cs,
                None => return,
            };
            if cs.is_closed() {
                return;
            }
            let mut parked = cs.future_blocks.lock();
            let now = Utc::now().timestamp();
            let due: Vec<Block> = {
                let mut still_parked = vec![];
                let mut due = vec![];
                for fb in parked.drain(..) {
                    if fb.retry_at <= now {
                        due.push(fb.block);
                    } else {
                        still_parked.push(fb);
                    }
                }
                *parked = still_parked;
                due
            };
            if due.is_empty() {
                cs.future_cond
                    .wait_for(&mut parked, Duration::from_millis(500));
            }
            due
        };

        let cs = match cs.upgrade() {
            Some(cs) => cs,
            None => return,
        };
        for block in due {
            let id = block.id();
            match cs.accept_block(block) {
                Ok(()) => debug!("parked block {:?} accepted on retry", id),
                Err(err) => warn!("parked block {:?} rejected on retry: {}", id, err),
            }
        }
    }
}
