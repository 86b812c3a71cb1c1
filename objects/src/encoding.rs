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

//! The canonical binary encoding shared by everything that is hashed or
//! persisted: little-endian integers, single-byte bools, raw fixed-size
//! arrays, and `u64`-length-prefixed vectors. The byte layout is part of the
//! network protocol and must not change.

use std::io::{Error, ErrorKind, Read, Result as IoResult, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Upper bound on any decoded length prefix. Nothing legitimate approaches
/// this; it bounds allocation on malformed input.
const MAX_DECODE_LEN: u64 = 100 * (1 << 20);

pub trait ToBytes {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![];
        self.write(&mut bytes)
            .expect("writing to a Vec never fails");
        bytes
    }
}

pub trait FromBytes: Sized {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self>;

    fn from_bytes(bytes: &[u8]) -> IoResult<Self> {
        let mut reader = bytes;
        let value = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "trailing bytes after decoded value",
            ));
        }
        Ok(value)
    }
}

pub fn write_len<W: Write>(writer: &mut W, len: usize) -> IoResult<()> {
    writer.write_u64::<LittleEndian>(len as u64)
}

pub fn read_len<R: Read>(reader: &mut R) -> IoResult<usize> {
    let len = reader.read_u64::<LittleEndian>()?;
    if len > MAX_DECODE_LEN {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("length prefix {} exceeds decode limit", len),
        ));
    }
    Ok(len as usize)
}

impl ToBytes for u8 {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_u8(*self)
    }
}

impl FromBytes for u8 {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        reader.read_u8()
    }
}

impl ToBytes for bool {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_u8(*self as u8)
    }
}

impl FromBytes for bool {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid boolean byte {}", other),
            )),
        }
    }
}

impl ToBytes for u64 {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_u64::<LittleEndian>(*self)
    }
}

impl FromBytes for u64 {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        reader.read_u64::<LittleEndian>()
    }
}

impl ToBytes for i64 {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_i64::<LittleEndian>(*self)
    }
}

impl FromBytes for i64 {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        reader.read_i64::<LittleEndian>()
    }
}

impl<const N: usize> ToBytes for [u8; N] {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_all(self)
    }
}

impl<const N: usize> FromBytes for [u8; N] {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        let mut bytes = [0u8; N];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

impl<T: ToBytes> ToBytes for Vec<T> {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        write_len(writer, self.len())?;
        for item in self {
            item.write(writer)?;
        }
        Ok(())
    }
}

impl<T: FromBytes> FromBytes for Vec<T> {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        let len = read_len(reader)?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}
