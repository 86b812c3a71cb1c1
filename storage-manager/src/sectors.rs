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

//! Sector placement and retrieval. A sector is stored physically once and
//! referenced virtually up to the cap; the file write and the usage-record
//! update commit together.

use std::fs;

use tracing::{debug, warn};
use vaultos_merkle::{reader_root, Blake2bHasher};
use vaultos_objects::{BlockHeight, Hash, SECTOR_SIZE, SEGMENT_SIZE};

use crate::error::StorageManagerError;
use crate::folder::emptiest_folder;
use crate::persist::{SectorUsage, BUCKET_SECTOR_USAGE};
use crate::StorageManager;

/// The id of a sector: the Merkle root over its 64-byte segments.
pub fn sector_root(data: &[u8]) -> Hash {
    let mut reader = data;
    Hash(
        reader_root(Blake2bHasher, &mut reader, SEGMENT_SIZE)
            .expect("reading from a slice never fails")
            .unwrap_or_default(),
    )
}

impl StorageManager {
    /// Store one sector under a contract expiring at `expiry_height`.
    /// Re-adding a known sector only bumps its virtual count.
    pub fn add_sector(
        &self,
        id: &Hash,
        expiry_height: BlockHeight,
        data: &[u8],
    ) -> Result<(), StorageManagerError> {
        let _guard = self.guard()?;
        if data.len() as u64 != SECTOR_SIZE {
            return Err(StorageManagerError::WrongSectorSize(data.len()));
        }

        let max_virtual = self.params().max_virtual_sectors;
        self.db().update(|tx| -> Result<(), StorageManagerError> {
            if let Some(bytes) = tx.get(BUCKET_SECTOR_USAGE, id.as_bytes())? {
                let mut usage: SectorUsage = bincode::deserialize(&bytes)?;
                if usage.count >= max_virtual {
                    return Err(StorageManagerError::MaxVirtualSectors);
                }
                usage.count += 1;
                usage.expiration_heights.push(expiry_height);
                tx.put(
                    BUCKET_SECTOR_USAGE,
                    id.as_bytes(),
                    &bincode::serialize(&usage)?,
                )?;
                return Ok(());
            }

            let folders = self.folders().read();
            let folder =
                emptiest_folder(&folders, &[]).ok_or(StorageManagerError::InsufficientStorage)?;
            drop(folders);

            let path = self.sector_path(&folder, id);
            if let Err(err) = fs::write(&path, data) {
                folder.note_write(false);
                return Err(err.into());
            }
            folder.note_write(true);

            let usage = SectorUsage {
                count: 1,
                folder_uid: folder.uid.clone(),
                expiration_heights: vec![expiry_height],
            };
            tx.put(
                BUCKET_SECTOR_USAGE,
                id.as_bytes(),
                &bincode::serialize(&usage)?,
            )?;
            // Reserve the capacity while still serialized by the update, so
            // concurrent placements see it.
            folder.adjust_remaining(-(SECTOR_SIZE as i64));
            debug!("sector {:?} placed in folder {}", id, folder.hex_uid());
            Ok(())
        })
    }

    /// Drop one virtual reference; the physical sector and its record are
    /// removed when the last reference goes.
    pub fn remove_sector(
        &self,
        id: &Hash,
        expiry_height: BlockHeight,
    ) -> Result<(), StorageManagerError> {
        let _guard = self.guard()?;

        self.db().update(|tx| -> Result<(), StorageManagerError> {
            let bytes = tx
                .get(BUCKET_SECTOR_USAGE, id.as_bytes())?
                .ok_or(StorageManagerError::SectorNotFound)?;
            let mut usage: SectorUsage = bincode::deserialize(&bytes)?;

            if let Some(at) = usage
                .expiration_heights
                .iter()
                .position(|&h| h == expiry_height)
            {
                usage.expiration_heights.remove(at);
            }
            usage.count -= 1;

            if usage.count > 0 {
                tx.put(
                    BUCKET_SECTOR_USAGE,
                    id.as_bytes(),
                    &bincode::serialize(&usage)?,
                )?;
                return Ok(());
            }

            tx.delete(BUCKET_SECTOR_USAGE, id.as_bytes())?;
            if let Some(folder) = self.folder_by_uid(&usage.folder_uid) {
                let path = self.sector_path(&folder, id);
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to delete sector file {:?}: {}", path, err);
                }
                folder.adjust_remaining(SECTOR_SIZE as i64);
            }
            Ok(())
        })
    }

    /// Fetch a sector's data.
    pub fn read_sector(&self, id: &Hash) -> Result<Vec<u8>, StorageManagerError> {
        let _guard = self.guard()?;
        let usage = self
            .sector_usage(id)?
            .ok_or(StorageManagerError::SectorNotFound)?;
        let folder = self
            .folder_by_uid(&usage.folder_uid)
            .ok_or(StorageManagerError::SectorNotFound)?;
        match fs::read(self.sector_path(&folder, id)) {
            Ok(data) => {
                folder.note_read(true);
                Ok(data)
            }
            Err(err) => {
                folder.note_read(false);
                Err(err.into())
            }
        }
    }
}
