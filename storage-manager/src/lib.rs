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

pub mod error;
pub use error::StorageManagerError;

pub mod folder;
pub use folder::{StorageFolder, StorageFolderInfo};

pub mod folders;
pub mod persist;
pub use persist::SectorUsage;

pub mod sectors;
pub use sectors::sector_root;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rand::RngCore;
use tracing::{info, warn};
use vaultos_kv::Database;
use vaultos_objects::{Hash, Params, SECTOR_SIZE};

use crate::folder::{FolderState, StorageFolder as Folder};
use crate::persist::{
    create_folder_link, folder_link, sector_file_name, SectorUsage as Usage, Settings,
    SettingsFolder, BUCKET_SECTOR_USAGE, DB_FILE, DB_METADATA,
};

/// Places fixed-size sectors across a set of storage folders, tracks
/// virtual references per sector, and rebalances capacity when folders are
/// added, resized, or removed.
///
/// Sector operations hold the folder list read lock; folder mutations are
/// serialized. The resource lock is held shared for the duration of any
/// operation and exclusively by [`close`](StorageManager::close), which
/// therefore drains everything in flight.
pub struct StorageManager {
    params: Params,
    persist_dir: PathBuf,
    db: Database,
    salt: [u8; 32],
    folders: RwLock<Vec<Arc<Folder>>>,
    folder_op: Mutex<()>,
    resource_lock: RwLock<()>,
    closed: AtomicBool,
}

impl StorageManager {
    /// Open the storage manager rooted at `persist_dir`, creating fresh
    /// state on first use and reconciling folder accounting against the
    /// usage bucket otherwise.
    pub fn open(params: Params, persist_dir: &Path) -> Result<StorageManager, StorageManagerError> {
        std::fs::create_dir_all(persist_dir)?;
        let (settings, fresh) = match Settings::load(persist_dir)? {
            Some(settings) => (settings, false),
            None => {
                let mut salt = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut salt);
                (Settings::fresh(salt), true)
            }
        };
        let salt = settings.salt_bytes()?;
        let db = Database::open(
            persist_dir.join(DB_FILE),
            DB_METADATA,
            &[BUCKET_SECTOR_USAGE],
        )?;

        let mut folders: Vec<Arc<Folder>> = vec![];
        for entry in &settings.folders {
            let uid = hex::decode(&entry.uid).map_err(|_| {
                StorageManagerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "malformed folder uid in settings",
                ))
            })?;
            // Symlinks are recreated if the persist directory was moved.
            create_folder_link(persist_dir, &entry.uid, &entry.path)?;
            folders.push(Arc::new(Folder::new(entry.path.clone(), uid, entry.size)));
        }

        let sm = StorageManager {
            params,
            persist_dir: persist_dir.to_path_buf(),
            db,
            salt,
            folders: RwLock::new(folders),
            folder_op: Mutex::new(()),
            resource_lock: RwLock::new(()),
            closed: AtomicBool::new(false),
        };
        sm.reconcile()?;
        if fresh {
            sm.persist_settings()?;
        }
        info!(
            "storage manager open with {} folders",
            sm.folders.read().len()
        );
        Ok(sm)
    }

    /// Rebuild per-folder capacity accounting from the usage bucket. Heals
    /// a crash between a sector file landing on disk and its record
    /// committing.
    fn reconcile(&self) -> Result<(), StorageManagerError> {
        let mut used: HashMap<Vec<u8>, u64> = HashMap::new();
        self.db
            .view::<_, vaultos_kv::KvError>(|tx| {
                tx.for_each(BUCKET_SECTOR_USAGE, |_, value| {
                    if let Ok(usage) = bincode::deserialize::<Usage>(value) {
                        *used.entry(usage.folder_uid).or_insert(0) += SECTOR_SIZE;
                    }
                    Ok(())
                })
            })?;
        for folder in self.folders.read().iter() {
            let size = folder.state().size;
            let used = used.get(&folder.uid).copied().unwrap_or(0);
            if used > size {
                warn!(
                    "folder {} records more sectors than capacity",
                    folder.hex_uid()
                );
            }
            folder.set_state(FolderState {
                size,
                size_remaining: size.saturating_sub(used),
            });
        }
        Ok(())
    }

    /// Shared guard held for the duration of every operation.
    pub(crate) fn guard(&self) -> Result<RwLockReadGuard<'_, ()>, StorageManagerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageManagerError::Closed);
        }
        Ok(self.resource_lock.read())
    }

    pub(crate) fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    pub(crate) fn folders(&self) -> &RwLock<Vec<Arc<Folder>>> {
        &self.folders
    }

    pub(crate) fn folder_op(&self) -> &Mutex<()> {
        &self.folder_op
    }

    pub(crate) fn folder_by_uid(&self, uid: &[u8]) -> Option<Arc<Folder>> {
        self.folders
            .read()
            .iter()
            .find(|folder| folder.uid == uid)
            .cloned()
    }

    /// The path of the sector file for `id` inside `folder`, addressed
    /// through the folder's symlink.
    pub(crate) fn sector_path(&self, folder: &Folder, id: &Hash) -> PathBuf {
        folder_link(&self.persist_dir, &folder.hex_uid())
            .join(sector_file_name(&self.salt, id))
    }

    pub(crate) fn persist_settings(&self) -> Result<(), StorageManagerError> {
        let folders = self.folders.read();
        let settings = Settings {
            salt: hex::encode(self.salt),
            folders: folders
                .iter()
                .map(|folder| SettingsFolder {
                    path: folder.path.clone(),
                    uid: folder.hex_uid(),
                    size: folder.state().size,
                })
                .collect(),
        };
        drop(folders);
        settings.save(&self.persist_dir)
    }

    pub(crate) fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    /// Snapshot of every folder for callers outside the manager.
    pub fn storage_folders(&self) -> Vec<StorageFolderInfo> {
        self.folders
            .read()
            .iter()
            .map(|folder| StorageFolderInfo::from_folder(folder))
            .collect()
    }

    /// The usage record for a sector, if any. `count` is the virtual
    /// reference count.
    pub fn sector_usage(&self, id: &Hash) -> Result<Option<SectorUsage>, StorageManagerError> {
        let bytes = self
            .db
            .view::<_, vaultos_kv::KvError>(|tx| tx.get(BUCKET_SECTOR_USAGE, id.as_bytes()))?;
        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Drain in-flight operations and persist the folder set. No operation
    /// outlives this call.
    pub fn close(&self) -> Result<(), StorageManagerError> {
        self.closed.store(true, Ordering::SeqCst);
        let _exclusive = self.resource_lock.write();
        self.persist_settings()
    }
}
