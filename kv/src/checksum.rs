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

use vaultos_merkle::{Accumulator, Digest};

use crate::database::Tx;
use crate::error::KvError;

/// Fold every `(key, value)` pair of the named buckets, in the given bucket
/// order and byte-sorted key order within each bucket, into a Merkle
/// accumulator. Two stores agree on the listed buckets iff the roots agree.
pub fn bucket_checksum(tx: &Tx<'_>, buckets: &[&str]) -> Result<Option<Digest>, KvError> {
    let mut acc = Accumulator::default();
    for bucket in buckets {
        tx.for_each(bucket, |key, value| {
            acc.push(key);
            acc.push(value);
            Ok(())
        })?;
    }
    Ok(acc.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Database, Metadata};

    const META: Metadata = Metadata {
        header: "Test Database",
        version: "0.5.0",
    };

    #[test]
    fn checksum_is_order_insensitive_to_insertion() {
        let dir = tempfile::tempdir().unwrap();
        let a = Database::open(dir.path().join("a"), META, &["X", "Y"]).unwrap();
        let b = Database::open(dir.path().join("b"), META, &["X", "Y"]).unwrap();

        a.update::<_, KvError>(|tx| {
            tx.put("X", b"1", b"one")?;
            tx.put("X", b"2", b"two")?;
            tx.put("Y", b"3", b"three")
        })
        .unwrap();
        // Same contents, different insertion order.
        b.update::<_, KvError>(|tx| {
            tx.put("Y", b"3", b"three")?;
            tx.put("X", b"2", b"two")?;
            tx.put("X", b"1", b"one")
        })
        .unwrap();

        let ca = a
            .view::<_, KvError>(|tx| bucket_checksum(tx, &["X", "Y"]))
            .unwrap();
        let cb = b
            .view::<_, KvError>(|tx| bucket_checksum(tx, &["X", "Y"]))
            .unwrap();
        assert!(ca.is_some());
        assert_eq!(ca, cb);
    }

    #[test]
    fn checksum_changes_with_contents_and_bucket_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("db"), META, &["X", "Y"]).unwrap();
        db.update::<_, KvError>(|tx| {
            tx.put("X", b"1", b"one")?;
            tx.put("Y", b"2", b"two")
        })
        .unwrap();

        let (xy, yx) = db
            .view::<_, KvError>(|tx| {
                let xy = bucket_checksum(tx, &["X", "Y"])?;
                let yx = bucket_checksum(tx, &["Y", "X"])?;
                Ok((xy, yx))
            })
            .unwrap();
        assert_ne!(xy, yx);

        db.update::<_, KvError>(|tx| tx.put("X", b"1", b"uno"))
            .unwrap();
        let xy2 = db
            .view::<_, KvError>(|tx| bucket_checksum(tx, &["X", "Y"]))
            .unwrap();
        assert_ne!(xy, xy2);
    }

    #[test]
    fn empty_buckets_have_no_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("db"), META, &["X"]).unwrap();
        let checksum = db
            .view::<_, KvError>(|tx| bucket_checksum(tx, &["X"]))
            .unwrap();
        assert_eq!(checksum, None);
    }
}
