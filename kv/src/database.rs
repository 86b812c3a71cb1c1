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

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, Transaction,
    TransactionDB, TransactionDBOptions, DB,
};
use tracing::debug;

use crate::error::KvError;

/// The bucket every database reserves for its own identity header.
pub const BUCKET_METADATA: &str = "Metadata";

const KEY_HEADER: &[u8] = b"Header";
const KEY_VERSION: &[u8] = b"Version";

/// Identifies what a database file contains and which layout version wrote
/// it. A mismatch on open is a refusal, never a silent migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub header: &'static str,
    pub version: &'static str,
}

/// An ordered key-value store organized into byte-named buckets, with
/// single-writer ACID transactions. Buckets are RocksDB column families;
/// iteration within a bucket is in byte order.
pub struct Database {
    db: TransactionDB,
    writer: Mutex<()>,
    path: PathBuf,
}

impl Database {
    /// Open or create the database at `path` with the given buckets. The
    /// metadata header is written on creation and verified on reopen.
    pub fn open<P: AsRef<Path>>(
        path: P,
        metadata: Metadata,
        buckets: &[&str],
    ) -> Result<Database, KvError> {
        let path = path.as_ref().to_path_buf();

        // Keep every column family that already exists on disk, so an open
        // with a narrower bucket list cannot silently orphan data.
        let mut names: BTreeSet<String> = buckets.iter().map(|b| b.to_string()).collect();
        names.insert(BUCKET_METADATA.to_string());
        if let Ok(existing) = DB::list_cf(&Options::default(), &path) {
            names.extend(existing);
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.increase_parallelism(3);

        let descriptors: Vec<ColumnFamilyDescriptor> = names
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_max_write_buffer_number(16);
                ColumnFamilyDescriptor::new(name, cf_opts)
            })
            .collect();

        let db = TransactionDB::open_cf_descriptors(
            &db_opts,
            &TransactionDBOptions::default(),
            &path,
            descriptors,
        )?;
        debug!("opened database at {:?} with {} buckets", path, names.len());

        let database = Database {
            db,
            writer: Mutex::new(()),
            path,
        };
        database.check_metadata(metadata)?;
        Ok(database)
    }

    fn check_metadata(&self, metadata: Metadata) -> Result<(), KvError> {
        self.update(|tx| {
            let check = |key: &[u8], expected: &'static str, bad: fn(String, String) -> KvError| {
                match tx.get(BUCKET_METADATA, key)? {
                    Some(found) => {
                        let found = String::from_utf8_lossy(&found).into_owned();
                        if found != expected {
                            return Err(bad(expected.to_string(), found));
                        }
                        Ok(())
                    }
                    None => tx.put(BUCKET_METADATA, key, expected.as_bytes()),
                }
            };
            check(KEY_HEADER, metadata.header, KvError::BadHeader)?;
            check(KEY_VERSION, metadata.version, KvError::BadVersion)
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a writable transaction. Writers are serialized; the
    /// transaction commits iff `f` returns `Ok`, and is rolled back whole
    /// otherwise.
    pub fn update<T, E: From<KvError>>(
        &self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let _guard = self.writer.lock();
        let tx = Tx {
            db: &self.db,
            inner: self.db.transaction(),
            writable: true,
        };
        match f(&tx) {
            Ok(value) => {
                tx.inner.commit().map_err(KvError::from)?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.inner.rollback();
                Err(err)
            }
        }
    }

    /// Run `f` inside a writable transaction that is unconditionally rolled
    /// back. Lets callers validate hypothetical state transitions with
    /// read-your-writes semantics and no side effects.
    pub fn trial<T, E: From<KvError>>(
        &self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let _guard = self.writer.lock();
        let tx = Tx {
            db: &self.db,
            inner: self.db.transaction(),
            writable: true,
        };
        let result = f(&tx);
        let _ = tx.inner.rollback();
        result
    }

    /// Run `f` inside a read-only transaction. Concurrent with writers.
    pub fn view<T, E: From<KvError>>(
        &self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let tx = Tx {
            db: &self.db,
            inner: self.db.transaction(),
            writable: false,
        };
        let result = f(&tx);
        let _ = tx.inner.rollback();
        result
    }
}

/// One transaction over the bucket set.
pub struct Tx<'a> {
    db: &'a TransactionDB,
    inner: Transaction<'a, TransactionDB>,
    writable: bool,
}

impl<'a> Tx<'a> {
    fn cf(&self, bucket: &str) -> Result<&ColumnFamily, KvError> {
        self.db
            .cf_handle(bucket)
            .ok_or_else(|| KvError::NoBucket(bucket.to_string()))
    }

    pub fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.inner.get_cf(self.cf(bucket)?, key)?)
    }

    pub fn contains(&self, bucket: &str, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.get(bucket, key)?.is_some())
    }

    pub fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if !self.writable {
            return Err(KvError::ReadOnly);
        }
        Ok(self.inner.put_cf(self.cf(bucket)?, key, value)?)
    }

    pub fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), KvError> {
        if !self.writable {
            return Err(KvError::ReadOnly);
        }
        Ok(self.inner.delete_cf(self.cf(bucket)?, key)?)
    }

    /// Visit every `(key, value)` pair of `bucket` in ascending byte order.
    /// Uncommitted writes of this transaction are visible.
    pub fn for_each(
        &self,
        bucket: &str,
        mut f: impl FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        let cf = self.cf(bucket)?;
        for item in self.inner.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            f(&key, &value)?;
        }
        Ok(())
    }

    /// Visit every pair whose key starts with `prefix`, in ascending order.
    pub fn for_each_prefix(
        &self,
        bucket: &str,
        prefix: &[u8],
        mut f: impl FnMut(&[u8], &[u8]) -> Result<(), KvError>,
    ) -> Result<(), KvError> {
        let cf = self.cf(bucket)?;
        let mode = IteratorMode::From(prefix, Direction::Forward);
        for item in self.inner.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            f(&key, &value)?;
        }
        Ok(())
    }
}
