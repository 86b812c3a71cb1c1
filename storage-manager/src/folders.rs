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

//! Folder membership and rebalancing. Adding is cheap; removing and
//! shrinking offload sectors to the remaining folders first, skipping
//! folders as their disks fail.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, info, warn};
use vaultos_objects::{Hash, SECTOR_SIZE};

use crate::error::StorageManagerError;
use crate::folder::{emptiest_folder, FolderState, StorageFolder};
use crate::persist::{
    create_folder_link, remove_folder_link, SectorUsage, BUCKET_SECTOR_USAGE,
};
use crate::StorageManager;

impl StorageManager {
    /// Dedicate `path` as a storage folder of `size` bytes.
    pub fn add_storage_folder(
        &self,
        path: PathBuf,
        size: u64,
    ) -> Result<(), StorageManagerError> {
        let _guard = self.guard()?;
        let _op = self.folder_op().lock();
        let params = self.params();

        if size < params.min_storage_folder_size || size > params.max_storage_folder_size {
            return Err(StorageManagerError::InvalidFolderSize(size));
        }
        if !path.is_dir() {
            return Err(StorageManagerError::NotADirectory(path));
        }
        {
            let folders = self.folders().read();
            if folders.len() >= params.max_storage_folders {
                return Err(StorageManagerError::MaxStorageFolders);
            }
            if folders.iter().any(|folder| folder.path == path) {
                return Err(StorageManagerError::DuplicateFolder(path));
            }
        }

        let uid = self.mint_folder_uid();
        let folder = Arc::new(StorageFolder::new(path.clone(), uid, size));
        create_folder_link(self.persist_dir(), &folder.hex_uid(), &path)?;
        self.folders().write().push(folder.clone());
        self.persist_settings()?;
        info!(
            "added storage folder {} at {:?} ({} bytes)",
            folder.hex_uid(),
            path,
            size
        );
        Ok(())
    }

    /// A uid no current folder uses.
    fn mint_folder_uid(&self) -> Vec<u8> {
        let folders = self.folders().read();
        loop {
            let mut uid = vec![0u8; self.params().storage_folder_uid_size];
            rand::thread_rng().fill_bytes(&mut uid);
            if !folders.iter().any(|folder| folder.uid == uid) {
                return uid;
            }
        }
    }

    /// Remove the folder at `index`, offloading its sectors first. With
    /// `force`, removal proceeds even if some sectors could not be moved;
    /// their data is lost and their records dropped.
    pub fn remove_storage_folder(
        &self,
        index: usize,
        force: bool,
    ) -> Result<(), StorageManagerError> {
        let _guard = self.guard()?;
        let _op = self.folder_op().lock();

        let folder = self
            .folders()
            .read()
            .get(index)
            .cloned()
            .ok_or(StorageManagerError::BadFolderIndex(index))?;

        let offload_result = self.offload(&folder, folder.used());
        match offload_result {
            Ok(()) => {}
            Err(err @ StorageManagerError::IncompleteOffload { .. }) if !force => {
                self.persist_settings()?;
                return Err(err);
            }
            Err(StorageManagerError::IncompleteOffload { offloaded, required }) => {
                warn!(
                    "force removing folder {} with {} of {} bytes stranded",
                    folder.hex_uid(),
                    required - offloaded,
                    required
                );
                self.drop_stranded_records(&folder)?;
            }
            Err(err) => return Err(err),
        }

        remove_folder_link(self.persist_dir(), &folder.hex_uid())?;
        self.folders().write().retain(|f| f.uid != folder.uid);
        self.persist_settings()?;
        info!("removed storage folder {}", folder.hex_uid());
        Ok(())
    }

    /// Delete the usage rows of sectors that still point at a
    /// force-removed folder.
    fn drop_stranded_records(
        &self,
        folder: &StorageFolder,
    ) -> Result<(), StorageManagerError> {
        let stranded = self.sectors_in_folder(folder)?;
        self.db().update(|tx| -> Result<(), StorageManagerError> {
            for (id, _) in &stranded {
                tx.delete(BUCKET_SECTOR_USAGE, id.as_bytes())?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Grow or shrink the folder at `index`. Shrinking below current
    /// contents offloads the excess first.
    pub fn resize_storage_folder(
        &self,
        index: usize,
        new_size: u64,
    ) -> Result<(), StorageManagerError> {
        let _guard = self.guard()?;
        let _op = self.folder_op().lock();
        let params = self.params();

        if new_size < params.min_storage_folder_size || new_size > params.max_storage_folder_size {
            return Err(StorageManagerError::InvalidFolderSize(new_size));
        }
        let folder = self
            .folders()
            .read()
            .get(index)
            .cloned()
            .ok_or(StorageManagerError::BadFolderIndex(index))?;

        let used = folder.used();
        if used > new_size {
            self.offload(&folder, used - new_size)?;
        }
        let used = folder.used();
        folder.set_state(FolderState {
            size: new_size,
            size_remaining: new_size.saturating_sub(used),
        });
        self.persist_settings()?;
        info!(
            "resized storage folder {} to {} bytes",
            folder.hex_uid(),
            new_size
        );
        Ok(())
    }

    /// The sectors whose physical copy lives in `folder`.
    fn sectors_in_folder(
        &self,
        folder: &StorageFolder,
    ) -> Result<Vec<(Hash, SectorUsage)>, StorageManagerError> {
        let mut sectors = vec![];
        self.db().view::<_, vaultos_kv::KvError>(|tx| {
            tx.for_each(BUCKET_SECTOR_USAGE, |key, value| {
                if key.len() != 32 {
                    return Ok(());
                }
                if let Ok(usage) = bincode::deserialize::<SectorUsage>(value) {
                    if usage.folder_uid == folder.uid {
                        let mut id = [0u8; 32];
                        id.copy_from_slice(key);
                        sectors.push((Hash(id), usage));
                    }
                }
                Ok(())
            })
        })?;
        Ok(sectors)
    }

    /// Move at least `amount` bytes of sectors out of `folder` into the
    /// emptiest other folders. Unreadable sectors are skipped; folders that
    /// fail a write are dropped from the candidate set for the rest of the
    /// call.
    pub(crate) fn offload(
        &self,
        folder: &Arc<StorageFolder>,
        amount: u64,
    ) -> Result<(), StorageManagerError> {
        if amount == 0 {
            return Ok(());
        }
        debug!(
            "offloading {} bytes from folder {}",
            amount,
            folder.hex_uid()
        );

        let mut excluded: Vec<Vec<u8>> = vec![folder.uid.clone()];
        let mut offloaded = 0u64;

        for (id, mut usage) in self.sectors_in_folder(folder)? {
            if offloaded >= amount {
                break;
            }

            let source_path = self.sector_path(folder, &id);
            let data = match fs::read(&source_path) {
                Ok(data) => {
                    folder.note_read(true);
                    data
                }
                Err(err) => {
                    folder.note_read(false);
                    warn!("skipping unreadable sector {:?}: {}", id, err);
                    continue;
                }
            };

            // Find a destination that accepts the write.
            let target = loop {
                let folders = self.folders().read();
                let candidate = match emptiest_folder(&folders, &excluded) {
                    Some(candidate) => candidate,
                    None => {
                        return Err(StorageManagerError::IncompleteOffload {
                            offloaded,
                            required: amount,
                        });
                    }
                };
                drop(folders);

                let target_path = self.sector_path(&candidate, &id);
                match fs::write(&target_path, &data) {
                    Ok(()) => {
                        candidate.note_write(true);
                        break candidate;
                    }
                    Err(err) => {
                        candidate.note_write(false);
                        warn!(
                            "folder {} rejected sector write: {}",
                            candidate.hex_uid(),
                            err
                        );
                        let _ = fs::remove_file(&target_path);
                        excluded.push(candidate.uid.clone());
                    }
                }
            };

            if let Err(err) = fs::remove_file(&source_path) {
                warn!("failed to delete offloaded sector source: {}", err);
            }
            usage.folder_uid = target.uid.clone();
            self.db().update(|tx| -> Result<(), StorageManagerError> {
                tx.put(
                    BUCKET_SECTOR_USAGE,
                    id.as_bytes(),
                    &bincode::serialize(&usage)?,
                )?;
                Ok(())
            })?;

            folder.adjust_remaining(SECTOR_SIZE as i64);
            target.adjust_remaining(-(SECTOR_SIZE as i64));
            offloaded += SECTOR_SIZE;
        }

        if offloaded < amount {
            return Err(StorageManagerError::IncompleteOffload {
                offloaded,
                required: amount,
            });
        }
        Ok(())
    }
}
