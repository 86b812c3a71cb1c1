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

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("unknown bucket {:?}", _0)]
    NoBucket(String),

    #[error("write attempted through a read-only transaction")]
    ReadOnly,

    #[error("database header mismatch: expected {:?}, found {:?}", _0, _1)]
    BadHeader(String, String),

    #[error("database version mismatch: expected {:?}, found {:?}", _0, _1)]
    BadVersion(String, String),

    #[error("{}", _0)]
    Rocks(#[from] rocksdb::Error),

    #[error("{}", _0)]
    Io(#[from] std::io::Error),
}
