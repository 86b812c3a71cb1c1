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

//! Every mutation of the consensus set is expressed as a diff, recorded in
//! the block that produced it. Applying a block commits its diffs forward;
//! reverting commits them backward. Reorganizations are therefore mechanical.

use std::io::{Error, ErrorKind, Read, Result as IoResult, Write};

use vaultos_objects::{
    Currency, FileContract, FileContractId, FromBytes, SiacoinOutput, SiacoinOutputId,
    SiafundOutput, SiafundOutputId, ToBytes,
};
use vaultos_objects::BlockHeight;

/// Whether a diff's value is introduced or withdrawn when the owning block
/// is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn inverse(self) -> DiffDirection {
        match self {
            DiffDirection::Apply => DiffDirection::Revert,
            DiffDirection::Revert => DiffDirection::Apply,
        }
    }
}

impl ToBytes for DiffDirection {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        (matches!(self, DiffDirection::Apply)).write(writer)
    }
}

impl FromBytes for DiffDirection {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        match bool::read(reader)? {
            true => Ok(DiffDirection::Apply),
            false => Ok(DiffDirection::Revert),
        }
    }
}

macro_rules! value_diff {
    ($(#[$doc:meta])* $name:ident, $id:ty, $value_field:ident, $value:ty) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name {
            pub direction: DiffDirection,
            pub id: $id,
            pub $value_field: $value,
        }

        impl ToBytes for $name {
            fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
                self.direction.write(writer)?;
                self.id.write(writer)?;
                self.$value_field.write(writer)
            }
        }

        impl FromBytes for $name {
            fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
                Ok($name {
                    direction: DiffDirection::read(reader)?,
                    id: <$id>::read(reader)?,
                    $value_field: <$value>::read(reader)?,
                })
            }
        }
    };
}

value_diff!(
    /// Creation or destruction of a live siacoin output.
    SiacoinOutputDiff,
    SiacoinOutputId,
    output,
    SiacoinOutput
);
value_diff!(
    /// Creation or destruction of an open file contract.
    FileContractDiff,
    FileContractId,
    contract,
    FileContract
);
value_diff!(
    /// Creation or destruction of a siafund output.
    SiafundOutputDiff,
    SiafundOutputId,
    output,
    SiafundOutput
);

/// Creation or destruction of a delayed siacoin output in the maturity
/// bucket at `maturity_height`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelayedSiacoinOutputDiff {
    pub direction: DiffDirection,
    pub id: SiacoinOutputId,
    pub output: SiacoinOutput,
    pub maturity_height: BlockHeight,
}

impl ToBytes for DelayedSiacoinOutputDiff {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.direction.write(writer)?;
        self.id.write(writer)?;
        self.output.write(writer)?;
        self.maturity_height.write(writer)
    }
}

impl FromBytes for DelayedSiacoinOutputDiff {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(DelayedSiacoinOutputDiff {
            direction: DiffDirection::read(reader)?,
            id: SiacoinOutputId::read(reader)?,
            output: SiacoinOutput::read(reader)?,
            maturity_height: BlockHeight::read(reader)?,
        })
    }
}

/// A move of the siafund pool between two values. The pool only grows on
/// apply; `previous <= adjusted` always.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiafundPoolDiff {
    pub previous: Currency,
    pub adjusted: Currency,
}

impl ToBytes for SiafundPoolDiff {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.previous.write(writer)?;
        self.adjusted.write(writer)
    }
}

impl FromBytes for SiafundPoolDiff {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        let previous = Currency::read(reader)?;
        let adjusted = Currency::read(reader)?;
        if adjusted < previous {
            return Err(Error::new(
                ErrorKind::InvalidData,
                "siafund pool diff shrinks the pool",
            ));
        }
        Ok(SiafundPoolDiff { previous, adjusted })
    }
}

/// Every diff generated by one block, in application order within each
/// list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDiffs {
    pub siacoin_output_diffs: Vec<SiacoinOutputDiff>,
    pub file_contract_diffs: Vec<FileContractDiff>,
    pub siafund_output_diffs: Vec<SiafundOutputDiff>,
    pub delayed_siacoin_output_diffs: Vec<DelayedSiacoinOutputDiff>,
    pub siafund_pool_diffs: Vec<SiafundPoolDiff>,
}

impl ToBytes for BlockDiffs {
    fn write<W: Write>(&self, writer: &mut W) -> IoResult<()> {
        self.siacoin_output_diffs.write(writer)?;
        self.file_contract_diffs.write(writer)?;
        self.siafund_output_diffs.write(writer)?;
        self.delayed_siacoin_output_diffs.write(writer)?;
        self.siafund_pool_diffs.write(writer)
    }
}

impl FromBytes for BlockDiffs {
    fn read<R: Read>(reader: &mut R) -> IoResult<Self> {
        Ok(BlockDiffs {
            siacoin_output_diffs: Vec::read(reader)?,
            file_contract_diffs: Vec::read(reader)?,
            siafund_output_diffs: Vec::read(reader)?,
            delayed_siacoin_output_diffs: Vec::read(reader)?,
            siafund_pool_diffs: Vec::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultos_objects::hash::hash_bytes;
    use vaultos_objects::UnlockHash;

    #[test]
    fn diffs_roundtrip_through_encoding() {
        let diffs = BlockDiffs {
            siacoin_output_diffs: vec![SiacoinOutputDiff {
                direction: DiffDirection::Revert,
                id: SiacoinOutputId(hash_bytes(b"sco")),
                output: SiacoinOutput {
                    value: Currency::from_coins(3),
                    unlock_hash: UnlockHash::default(),
                },
            }],
            delayed_siacoin_output_diffs: vec![DelayedSiacoinOutputDiff {
                direction: DiffDirection::Apply,
                id: SiacoinOutputId(hash_bytes(b"dsco")),
                output: SiacoinOutput {
                    value: Currency::from_coins(1),
                    unlock_hash: UnlockHash::default(),
                },
                maturity_height: 55,
            }],
            siafund_pool_diffs: vec![SiafundPoolDiff {
                previous: Currency::ZERO,
                adjusted: Currency::from_coins(1),
            }],
            ..BlockDiffs::default()
        };
        assert_eq!(BlockDiffs::from_bytes(&diffs.to_bytes()).unwrap(), diffs);
    }

    #[test]
    fn shrinking_pool_diff_is_rejected() {
        let diff = SiafundPoolDiff {
            previous: Currency::from_coins(2),
            adjusted: Currency::from_coins(1),
        };
        let mut bytes = diff.previous.to_bytes();
        bytes.extend(diff.adjusted.to_bytes());
        assert!(SiafundPoolDiff::from_bytes(&bytes).is_err());
    }

    #[test]
    fn direction_inverse_flips() {
        assert_eq!(DiffDirection::Apply.inverse(), DiffDirection::Revert);
        assert_eq!(DiffDirection::Revert.inverse(), DiffDirection::Apply);
    }
}
