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

//! The persisted subscriber journal. Every atomic advance or reorg of the
//! canonical chain appends exactly one entry; entries form a singly linked
//! list in the database, and subscribers walk it with their own cursors.
//! The writer never blocks on a subscriber.

use std::fmt;
use std::io::{Read, Result as IoResult, Write};
use std::sync::Arc;
use std::time::Duration;

use vaultos_kv::Tx;
use vaultos_objects::hash::hash_all;
use vaultos_objects::{BlockId, FromBytes, Hash, ToBytes};

use crate::database::{BUCKET_CHANGE_LOG, BUCKET_CHANGE_LOG_TAIL};
use crate::error::ConsensusError;
use crate::ConsensusSet;

const KEY_HEAD: &[u8] = b"Head";
const KEY_TAIL: &[u8] = b"Tail";

/// Identifies one change entry. Derived by chaining the predecessor's id
/// into the entry hash, so ids are unique along the log.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeId(pub Hash);

impl ChangeId {
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl ToBytes for ChangeId {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.0.write(writer)
    }
}

impl FromBytes for ChangeId {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(ChangeId(Hash::read(reader)?))
    }
}

/// One atomic chain mutation. `reverted` lists blocks in
/// reverse-application order, `applied` in forward order. `next` is zero at
/// the tail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeEntry {
    pub reverted: Vec<BlockId>,
    pub applied: Vec<BlockId>,
    pub next: ChangeId,
}

impl ToBytes for ChangeEntry {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.reverted.write(writer)?;
        self.applied.write(writer)?;
        self.next.write(writer)
    }
}

impl FromBytes for ChangeEntry {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(ChangeEntry {
            reverted: Vec::read(reader)?,
            applied: Vec::read(reader)?,
            next: ChangeId::read(reader)?,
        })
    }
}

fn get_pointer(tx: &Tx<'_>, key: &[u8]) -> Result<Option<ChangeId>, ConsensusError> {
    match tx.get(BUCKET_CHANGE_LOG_TAIL, key)? {
        Some(bytes) => Ok(Some(ChangeId::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

pub fn entry(tx: &Tx<'_>, id: &ChangeId) -> Result<Option<ChangeEntry>, ConsensusError> {
    match tx.get(BUCKET_CHANGE_LOG, id.as_bytes())? {
        Some(bytes) => Ok(Some(ChangeEntry::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

pub fn head(tx: &Tx<'_>) -> Result<Option<ChangeId>, ConsensusError> {
    get_pointer(tx, KEY_HEAD)
}

pub fn tail(tx: &Tx<'_>) -> Result<Option<ChangeId>, ConsensusError> {
    get_pointer(tx, KEY_TAIL)
}

/// Append one entry for an advance or reorg and stitch the tail pointer.
pub fn append(
    tx: &Tx<'_>,
    reverted: Vec<BlockId>,
    applied: Vec<BlockId>,
) -> Result<ChangeId, ConsensusError> {
    let prev_tail = tail(tx)?.unwrap_or_default();

    let new_entry = ChangeEntry {
        reverted,
        applied,
        next: ChangeId::default(),
    };
    let id = ChangeId(hash_all(&[
        prev_tail.as_bytes(),
        &new_entry.reverted.to_bytes(),
        &new_entry.applied.to_bytes(),
    ]));
    tx.put(BUCKET_CHANGE_LOG, id.as_bytes(), &new_entry.to_bytes())?;

    if prev_tail.is_zero() {
        tx.put(BUCKET_CHANGE_LOG_TAIL, KEY_HEAD, &id.to_bytes())?;
    } else {
        let mut prev = entry(tx, &prev_tail)?
            .ok_or(ConsensusError::Inconsistency("change log tail is dangling"))?;
        prev.next = id;
        tx.put(BUCKET_CHANGE_LOG, prev_tail.as_bytes(), &prev.to_bytes())?;
    }
    tx.put(BUCKET_CHANGE_LOG_TAIL, KEY_TAIL, &id.to_bytes())?;
    Ok(id)
}

/// A pull cursor over the change log. Entries arrive in append order,
/// exactly once per subscriber.
pub struct ChangeSubscriber {
    pub(crate) cs: Arc<ConsensusSet>,
    /// Last delivered id; `None` means nothing delivered yet.
    pub(crate) cursor: Option<ChangeId>,
}

impl ChangeSubscriber {
    /// The next undelivered entry, or `None` if the subscriber is caught
    /// up.
    pub fn try_next(&mut self) -> Result<Option<(ChangeId, ChangeEntry)>, ConsensusError> {
        let cursor = self.cursor;
        let next = self.cs.db().view(|tx| -> Result<_, ConsensusError> {
            let next_id = match cursor {
                None => head(tx)?,
                Some(current) => {
                    let current = entry(tx, &current)?
                        .ok_or(ConsensusError::Inconsistency("subscriber cursor is dangling"))?;
                    if current.next.is_zero() {
                        None
                    } else {
                        Some(current.next)
                    }
                }
            };
            match next_id {
                Some(id) => {
                    let entry = entry(tx, &id)?
                        .ok_or(ConsensusError::Inconsistency("change log link is dangling"))?;
                    Ok(Some((id, entry)))
                }
                None => Ok(None),
            }
        })?;

        if let Some((id, _)) = &next {
            self.cursor = Some(*id);
        }
        Ok(next)
    }

    /// Like [`try_next`](ChangeSubscriber::try_next), but waits up to
    /// `timeout` for a new entry before reporting `None`.
    pub fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<(ChangeId, ChangeEntry)>, ConsensusError> {
        if let Some(next) = self.try_next()? {
            return Ok(Some(next));
        }
        self.cs.wait_for_change(timeout);
        self.try_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultos_objects::hash::hash_bytes;

    #[test]
    fn entry_roundtrips_through_encoding() {
        let entry = ChangeEntry {
            reverted: vec![BlockId(hash_bytes(b"r1")), BlockId(hash_bytes(b"r0"))],
            applied: vec![BlockId(hash_bytes(b"a0")), BlockId(hash_bytes(b"a1"))],
            next: ChangeId(hash_bytes(b"next")),
        };
        assert_eq!(ChangeEntry::from_bytes(&entry.to_bytes()).unwrap(), entry);
    }
}
