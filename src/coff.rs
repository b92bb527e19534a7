//! COFF File Header structures and parsing.

use bitflags::bitflags;
use strum::{FromRepr, IntoStaticStr};

use crate::reader::SliceReader;
use crate::{Error, Result};

/// PE signature "PE\0\0".
pub const PE_SIGNATURE: u32 = 0x00004550;

/// Target architecture from the `Machine` field.
///
/// Only the architectures a loader is likely to meet are named; any other
/// value is kept raw in [`CoffHeader::machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u16)]
#[non_exhaustive]
pub enum MachineType {
    Unknown = 0x0000,
    I386 = 0x014C,
    Arm = 0x01C0,
    ArmNt = 0x01C4,
    Ia64 = 0x0200,
    Ebc = 0x0EBC,
    RiscV32 = 0x5032,
    RiscV64 = 0x5064,
    Amd64 = 0x8664,
    Arm64 = 0xAA64,
}

impl MachineType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::from_repr(value)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

bitflags! {
    /// `Characteristics` of the file header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;
        /// Addresses above 2 GiB are handled.
        const LARGE_ADDRESS_AWARE = 0x0020;
        const BYTES_REVERSED_LO = 0x0080;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP = 0x0800;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}

/// COFF file header (IMAGE_FILE_HEADER), directly after the PE signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: u16,
    /// Length of the section table that follows the optional header.
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    /// Declared optional header length, data directories included. The
    /// section table starts right after it.
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    /// Size of the COFF header in bytes.
    pub const SIZE: usize = 20;

    /// Parse a COFF header from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::buffer_too_small(Self::SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        Ok(Self {
            machine: r.read_u16_at(0)?,
            number_of_sections: r.read_u16_at(2)?,
            time_date_stamp: r.read_u32_at(4)?,
            pointer_to_symbol_table: r.read_u32_at(8)?,
            number_of_symbols: r.read_u32_at(12)?,
            size_of_optional_header: r.read_u16_at(16)?,
            characteristics: r.read_u16_at(18)?,
        })
    }

    /// Parse a COFF header at `offset` within a larger buffer.
    pub fn read_from(reader: &SliceReader<'_>, offset: usize) -> Result<Self> {
        Self::parse(reader.bytes_at(offset, Self::SIZE)?)
    }

    /// The machine as a known architecture, if it is one.
    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_u16(self.machine)
    }

    /// Characteristics as typed flags; unknown bits are dropped.
    pub fn flags(&self) -> FileCharacteristics {
        FileCharacteristics::from_bits_truncate(self.characteristics)
    }

    pub fn is_dll(&self) -> bool {
        self.flags().contains(FileCharacteristics::DLL)
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(FileCharacteristics::EXECUTABLE_IMAGE)
    }
}

/// Verify PE signature at the given offset.
pub fn verify_pe_signature(reader: &SliceReader<'_>, offset: usize) -> Result<()> {
    let sig = reader.read_u32_at(offset)?;
    if sig != PE_SIGNATURE {
        return Err(Error::InvalidPeSignature);
    }
    Ok(())
}
