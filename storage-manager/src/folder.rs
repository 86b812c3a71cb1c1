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

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vaultos_objects::SECTOR_SIZE;

/// Capacity accounting for one folder. Kept behind its own short lock so
/// slow disk I/O never holds it.
#[derive(Clone, Copy, Debug)]
pub struct FolderState {
    pub size: u64,
    pub size_remaining: u64,
}

/// A directory a host dedicates to sector storage, addressed by a short
/// random uid. Reads and writes are tallied per folder so operators can
/// spot failing disks.
#[derive(Debug)]
pub struct StorageFolder {
    pub path: PathBuf,
    pub uid: Vec<u8>,
    state: Mutex<FolderState>,
    pub failed_reads: AtomicU64,
    pub failed_writes: AtomicU64,
    pub successful_reads: AtomicU64,
    pub successful_writes: AtomicU64,
}

impl StorageFolder {
    pub fn new(path: PathBuf, uid: Vec<u8>, size: u64) -> StorageFolder {
        StorageFolder {
            path,
            uid,
            state: Mutex::new(FolderState {
                size,
                size_remaining: size,
            }),
            failed_reads: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            successful_reads: AtomicU64::new(0),
            successful_writes: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> FolderState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: FolderState) {
        *self.state.lock() = state;
    }

    /// Reserve or release sector-sized chunks of capacity.
    pub fn adjust_remaining(&self, delta: i64) {
        let mut state = self.state.lock();
        if delta >= 0 {
            state.size_remaining = state.size_remaining.saturating_add(delta as u64);
        } else {
            state.size_remaining = state.size_remaining.saturating_sub((-delta) as u64);
        }
    }

    pub fn used(&self) -> u64 {
        let state = self.state.lock();
        state.size - state.size_remaining
    }

    pub fn hex_uid(&self) -> String {
        hex::encode(&self.uid)
    }

    pub fn note_read(&self, ok: bool) {
        if ok {
            self.successful_reads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_reads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn note_write(&self, ok: bool) {
        if ok {
            self.successful_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A read-only snapshot of one folder for callers outside the manager.
#[derive(Clone, Debug)]
pub struct StorageFolderInfo {
    pub path: PathBuf,
    pub uid: Vec<u8>,
    pub size: u64,
    pub size_remaining: u64,
    pub failed_reads: u64,
    pub failed_writes: u64,
    pub successful_reads: u64,
    pub successful_writes: u64,
}

impl StorageFolderInfo {
    pub fn from_folder(folder: &StorageFolder) -> StorageFolderInfo {
        let state = folder.state();
        StorageFolderInfo {
            path: folder.path.clone(),
            uid: folder.uid.clone(),
            size: state.size,
            size_remaining: state.size_remaining,
            failed_reads: folder.failed_reads.load(Ordering::Relaxed),
            failed_writes: folder.failed_writes.load(Ordering::Relaxed),
            successful_reads: folder.successful_reads.load(Ordering::Relaxed),
            successful_writes: folder.successful_writes.load(Ordering::Relaxed),
        }
    }
}

/// The emptiest folder with room for a full sector: the greatest
/// `size_remaining / size` ratio, skipping `exclude` uids. Cross-multiplied
/// to stay in integers.
pub fn emptiest_folder(
    folders: &[Arc<StorageFolder>],
    exclude: &[Vec<u8>],
) -> Option<Arc<StorageFolder>> {
    let mut best: Option<(Arc<StorageFolder>, FolderState)> = None;
    for folder in folders {
        if exclude.contains(&folder.uid) {
            continue;
        }
        let state = folder.state();
        if state.size_remaining < SECTOR_SIZE || state.size == 0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, best_state)) => {
                (state.size_remaining as u128) * (best_state.size as u128)
                    > (best_state.size_remaining as u128) * (state.size as u128)
            }
        };
        if better {
            best = Some((folder.clone(), state));
        }
    }
    best.map(|(folder, _)| folder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(uid: u8, size: u64, remaining: u64) -> Arc<StorageFolder> {
        let f = StorageFolder::new(PathBuf::from(format!("/tmp/{}", uid)), vec![uid], size);
        f.set_state(FolderState {
            size,
            size_remaining: remaining,
        });
        Arc::new(f)
    }

    #[test]
    fn emptiest_prefers_highest_ratio() {
        let a = folder(1, 100 * SECTOR_SIZE, 10 * SECTOR_SIZE); // 10%
        let b = folder(2, 10 * SECTOR_SIZE, 5 * SECTOR_SIZE); // 50%
        let chosen = emptiest_folder(&[a, b.clone()], &[]).unwrap();
        assert_eq!(chosen.uid, b.uid);
    }

    #[test]
    fn emptiest_requires_a_full_sector_of_room() {
        let full = folder(1, 10 * SECTOR_SIZE, SECTOR_SIZE - 1);
        assert!(emptiest_folder(&[full], &[]).is_none());
    }

    #[test]
    fn emptiest_skips_excluded_folders() {
        let a = folder(1, 10 * SECTOR_SIZE, 9 * SECTOR_SIZE);
        let b = folder(2, 10 * SECTOR_SIZE, SECTOR_SIZE);
        let chosen = emptiest_folder(&[a.clone(), b.clone()], &[a.uid.clone()]).unwrap();
        assert_eq!(chosen.uid, b.uid);
    }
}
