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
use std::io::{Read, Result as IoResult, Write};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};

use crate::encoding::{FromBytes, ToBytes};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte Blake2b-256 digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

impl ToBytes for Hash {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.0.write(writer)
    }
}

impl FromBytes for Hash {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(Hash(<[u8; 32]>::read(reader)?))
    }
}

/// Hash a single byte string.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

/// Hash the concatenation of several byte strings.
pub fn hash_all(parts: &[&[u8]]) -> Hash {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

/// A 16-byte tag that scopes derived identifiers and key algorithms.
/// Shorter names are zero-padded.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specifier(pub [u8; 16]);

impl Specifier {
    pub const fn from_static(name: &[u8]) -> Specifier {
        let mut buf = [0u8; 16];
        let mut i = 0;
        while i < name.len() {
            buf[i] = name[i];
            i += 1;
        }
        Specifier(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(16);
        write!(f, "{}", String::from_utf8_lossy(&self.0[..end]))
    }
}

impl ToBytes for Specifier {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.0.write(writer)
    }
}

impl FromBytes for Specifier {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(Specifier(<[u8; 16]>::read(reader)?))
    }
}

pub const SPECIFIER_ED25519: Specifier = Specifier::from_static(b"ed25519");
pub const SPECIFIER_SIACOIN_OUTPUT: Specifier = Specifier::from_static(b"siacoin output");
pub const SPECIFIER_SIAFUND_OUTPUT: Specifier = Specifier::from_static(b"siafund output");
pub const SPECIFIER_FILE_CONTRACT: Specifier = Specifier::from_static(b"file contract");
pub const SPECIFIER_STORAGE_PROOF: Specifier = Specifier::from_static(b"storage proof");

macro_rules! hash_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub Hash);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }

        impl From<Hash> for $name {
            fn from(hash: Hash) -> Self {
                $name(hash)
            }
        }

        impl ToBytes for $name {
            fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
                self.0.write(writer)
            }
        }

        impl FromBytes for $name {
            fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
                Ok($name(Hash::read(reader)?))
            }
        }
    };
}

hash_newtype!(
    /// The id of a block: the hash of its header fields.
    BlockId
);
hash_newtype!(
    /// The id of a transaction: the hash of every field except signatures.
    TransactionId
);
hash_newtype!(
    /// The id of a siacoin output, derived from its parent object.
    SiacoinOutputId
);
hash_newtype!(
    /// The id of a siafund output, derived from its parent transaction.
    SiafundOutputId
);
hash_newtype!(
    /// The id of a file contract, derived from its parent transaction.
    FileContractId
);
hash_newtype!(
    /// The Merkle root of a set of unlock conditions; authorizes spending.
    UnlockHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specifier_is_zero_padded() {
        let tag = Specifier::from_static(b"ed25519");
        assert_eq!(&tag.0[..7], b"ed25519");
        assert!(tag.0[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn hash_all_matches_concatenation() {
        assert_eq!(hash_all(&[b"ab", b"cd"]), hash_bytes(b"abcd"));
        assert_ne!(hash_all(&[b"ab", b"cd"]), hash_bytes(b"abdc"));
    }

    #[test]
    fn hash_roundtrips_through_encoding() {
        let h = hash_bytes(b"payload");
        assert_eq!(Hash::from_bytes(&h.to_bytes()).unwrap(), h);
        assert_eq!(h.to_bytes().len(), 32);
    }
}
