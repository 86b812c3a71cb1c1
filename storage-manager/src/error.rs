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

use std::fmt::Debug;
use std::path::PathBuf;

use vaultos_kv::KvError;

#[derive(Debug, thiserror::Error)]
pub enum StorageManagerError {
    #[error("no storage folder has room for another sector")]
    InsufficientStorage,

    #[error("sector already has the maximum number of virtual references")]
    MaxVirtualSectors,

    #[error("the maximum number of storage folders are already in use")]
    MaxStorageFolders,

    #[error("storage folder size {} is outside the permitted range", _0)]
    InvalidFolderSize(u64),

    #[error("storage folder path {:?} is not a directory", _0)]
    NotADirectory(PathBuf),

    #[error("storage folder path {:?} is already in use", _0)]
    DuplicateFolder(PathBuf),

    #[error("no storage folder with index {}", _0)]
    BadFolderIndex(usize),

    #[error("could only offload {} of {} bytes", offloaded, required)]
    IncompleteOffload { offloaded: u64, required: u64 },

    #[error("sector is not stored by this host")]
    SectorNotFound,

    #[error("sector data must be exactly one sector in size, got {} bytes", _0)]
    WrongSectorSize(usize),

    #[error("storage manager has been closed")]
    Closed,

    #[error("{}", _0)]
    Kv(#[from] KvError),

    #[error("{}", _0)]
    Io(#[from] std::io::Error),

    #[error("{}", _0)]
    Json(#[from] serde_json::Error),

    #[error("{}", _0)]
    Encoding(#[from] bincode::Error),
}
