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
use std::io::{Error, ErrorKind, Read, Result as IoResult, Write};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use primitive_types::{U256, U512};

use crate::encoding::{read_len, write_len, FromBytes, ToBytes};

/// A non-negative amount of coins. 256 bits is far beyond the total issuance,
/// so plain `+` is only used where overflow is structurally impossible;
/// validation paths use the checked operations.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(U256);

impl Currency {
    pub const ZERO: Currency = Currency(U256::zero());

    pub fn from_u64(value: u64) -> Currency {
        Currency(U256::from(value))
    }

    /// `value` whole coins, at 10^24 base units per coin.
    pub fn from_coins(value: u64) -> Currency {
        Currency(U256::from(value) * U256::from(10u64).pow(U256::from(24u64)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The low 64 bits of the value. Only meaningful where the value is
    /// known to be small, e.g. siafund denominations.
    pub fn low_u64(&self) -> u64 {
        self.0.low_u64()
    }

    pub fn checked_add(&self, rhs: &Currency) -> Option<Currency> {
        self.0.checked_add(rhs.0).map(Currency)
    }

    pub fn checked_sub(&self, rhs: &Currency) -> Option<Currency> {
        self.0.checked_sub(rhs.0).map(Currency)
    }

    pub fn checked_mul_u64(&self, rhs: u64) -> Option<Currency> {
        self.0.checked_mul(U256::from(rhs)).map(Currency)
    }

    /// Floor division.
    pub fn div_u64(&self, rhs: u64) -> Currency {
        Currency(self.0 / U256::from(rhs))
    }

    pub fn rem_u64(&self, rhs: u64) -> Currency {
        Currency(self.0 % U256::from(rhs))
    }

    /// `self * num / den`, floored. Never overflows for `num <= den`; the
    /// intermediate product is carried at 512 bits.
    pub fn mul_div_u64(&self, num: u64, den: u64) -> Currency {
        let wide: U512 = self.0.full_mul(U256::from(num)) / U512::from(den);
        Currency(U256::try_from(wide).expect("quotient fits in 256 bits for num <= den"))
    }
}

impl Add for Currency {
    type Output = Currency;

    fn add(self, rhs: Currency) -> Currency {
        match self.checked_add(&rhs) {
            Some(sum) => sum,
            None => panic!("currency addition overflow"),
        }
    }
}

impl AddAssign for Currency {
    fn add_assign(&mut self, rhs: Currency) {
        *self = *self + rhs;
    }
}

impl Sum for Currency {
    fn sum<I: Iterator<Item = Currency>>(iter: I) -> Currency {
        iter.fold(Currency::ZERO, |acc, c| acc + c)
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Self {
        Currency::from_u64(value)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// The wire form is the big-endian magnitude with leading zeros trimmed,
// length-prefixed. Zero encodes as an empty slice.
impl ToBytes for Currency {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        let mut buf = [0u8; 32];
        self.0.to_big_endian(&mut buf);
        let start = buf.iter().position(|&b| b != 0).unwrap_or(32);
        write_len(writer, 32 - start)?;
        writer.write_all(&buf[start..])
    }
}

impl FromBytes for Currency {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        let len = read_len(reader)?;
        if len > 32 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("currency magnitude of {} bytes exceeds 256 bits", len),
            ));
        }
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        if bytes.first() == Some(&0) {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "currency magnitude has a leading zero",
            ));
        }
        Ok(Currency(U256::from_big_endian(&bytes)))
    }
}
