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

pub mod accumulator;
pub use accumulator::{Accumulator, Proof};

pub mod error;
pub use error::MerkleError;

pub mod hasher;
pub use hasher::{Blake2bHasher, Digest, MerkleHasher};

pub mod proof;
pub use proof::verify_proof;

pub mod reader;
pub use reader::{reader_proof, reader_root};
