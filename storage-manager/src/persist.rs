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

//! On-disk state of the storage manager: the sector-usage bucket, the
//! settings file listing folders and the sector salt, and one symlink per
//! folder named by its uid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vaultos_kv::Metadata;
use vaultos_objects::Hash;

use crate::error::StorageManagerError;

pub const DB_METADATA: Metadata = Metadata {
    header: "Storage Manager Database",
    version: "0.5.0",
};

pub const BUCKET_SECTOR_USAGE: &str = "BucketSectorUsage";

pub const SETTINGS_FILE: &str = "settings.json";
pub const DB_FILE: &str = "storagemanager.db";

/// One record per physical sector, keyed by the sector's Merkle root.
/// `count` tracks virtual references; the sector file lives in the folder
/// named by `folder_uid`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorUsage {
    pub count: u64,
    pub folder_uid: Vec<u8>,
    pub expiration_heights: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingsFolder {
    pub path: PathBuf,
    pub uid: String,
    pub size: u64,
}

/// The JSON settings file. The salt blinds sector ids in on-disk file
/// names, so a host's directory listing does not reveal which sectors it
/// stores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub salt: String,
    pub folders: Vec<SettingsFolder>,
}

impl Settings {
    pub fn fresh(salt: [u8; 32]) -> Settings {
        Settings {
            salt: hex::encode(salt),
            folders: vec![],
        }
    }

    pub fn salt_bytes(&self) -> Result<[u8; 32], StorageManagerError> {
        let bytes = hex::decode(&self.salt).map_err(|_| bad_settings("salt"))?;
        bytes.try_into().map_err(|_| bad_settings("salt length"))
    }

    pub fn load(persist_dir: &Path) -> Result<Option<Settings>, StorageManagerError> {
        let path = persist_dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(path)?;
        Ok(Some(serde_json::from_reader(file)?))
    }

    pub fn save(&self, persist_dir: &Path) -> Result<(), StorageManagerError> {
        let tmp = persist_dir.join(format!("{}.tmp", SETTINGS_FILE));
        let file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(file, self)?;
        fs::rename(tmp, persist_dir.join(SETTINGS_FILE))?;
        Ok(())
    }
}

fn bad_settings(what: &str) -> StorageManagerError {
    StorageManagerError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("malformed settings file: {}", what),
    ))
}

/// The symlink through which a folder's sectors are addressed.
pub fn folder_link(persist_dir: &Path, hex_uid: &str) -> PathBuf {
    persist_dir.join(hex_uid)
}

pub fn create_folder_link(
    persist_dir: &Path,
    hex_uid: &str,
    target: &Path,
) -> Result<(), StorageManagerError> {
    let link = folder_link(persist_dir, hex_uid);
    if link.exists() {
        return Ok(());
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

pub fn remove_folder_link(persist_dir: &Path, hex_uid: &str) -> Result<(), StorageManagerError> {
    let link = folder_link(persist_dir, hex_uid);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    Ok(())
}

/// The on-disk file name of a sector: the salted hash of its id.
pub fn sector_file_name(salt: &[u8; 32], id: &Hash) -> String {
    hex::encode(
        vaultos_objects::hash::hash_all(&[salt, id.as_bytes()]).as_bytes(),
    )
}
