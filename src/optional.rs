//! Optional Header structures and parsing.
//!
//! The optional header comes in two shapes that differ in field widths:
//! PE32 carries a 32-bit image base plus `BaseOfData`, PE32+ a 64-bit image
//! base and 64-bit stack/heap sizes. The data-directory array that follows the
//! fixed part therefore starts at a different offset in each.

use strum::FromRepr;

use crate::reader::SliceReader;
use crate::{Error, Result};

/// PE32 magic number.
pub const PE32_MAGIC: u16 = 0x10B;
/// PE32+ (64-bit) magic number.
pub const PE32PLUS_MAGIC: u16 = 0x20B;

/// Windows subsystem values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u16)]
pub enum Subsystem {
    Unknown = 0,
    Native = 1,
    WindowsGui = 2,
    WindowsCui = 3,
    Os2Cui = 5,
    PosixCui = 7,
    NativeWindows = 8,
    WindowsCeGui = 9,
    EfiApplication = 10,
    EfiBootServiceDriver = 11,
    EfiRuntimeDriver = 12,
    EfiRom = 13,
    Xbox = 14,
    WindowsBootApplication = 16,
}

impl Subsystem {
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::from_repr(value)
    }
}

/// Fields both optional-header shapes expose, widened where they differ.
pub trait OptionalHeaderFields {
    /// Magic value identifying this shape.
    const MAGIC: u16;
    /// Size of the fixed part, i.e. the offset of the data-directory array.
    const BASE_SIZE: usize;

    fn parse(data: &[u8]) -> Result<Self>
    where
        Self: Sized;

    fn address_of_entry_point(&self) -> u32;
    fn image_base(&self) -> u64;
    fn section_alignment(&self) -> u32;
    fn file_alignment(&self) -> u32;
    fn size_of_image(&self) -> u32;
    fn size_of_headers(&self) -> u32;
    fn subsystem(&self) -> u16;
    /// Declared length of the data-directory array.
    fn number_of_rva_and_sizes(&self) -> u32;

    /// Parse the fixed part at `offset` within a larger buffer.
    fn read_from(reader: &SliceReader<'_>, offset: usize) -> Result<Self>
    where
        Self: Sized,
    {
        let data = reader
            .bytes_at(offset, Self::BASE_SIZE)
            .map_err(|_| Error::buffer_too_small(Self::BASE_SIZE, reader.len().saturating_sub(offset)))?;
        Self::parse(data)
    }
}

/// PE32 Optional Header (32-bit), without its data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// PE32+ Optional Header (64-bit), without its data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeaderFields for OptionalHeader32 {
    const MAGIC: u16 = PE32_MAGIC;
    const BASE_SIZE: usize = 96;

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::BASE_SIZE {
            return Err(Error::buffer_too_small(Self::BASE_SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        let magic = r.read_u16_at(0)?;
        if magic != Self::MAGIC {
            return Err(Error::InvalidOptionalHeaderMagic(magic));
        }

        Ok(Self {
            magic,
            major_linker_version: data[2],
            minor_linker_version: data[3],
            size_of_code: r.read_u32_at(4)?,
            size_of_initialized_data: r.read_u32_at(8)?,
            size_of_uninitialized_data: r.read_u32_at(12)?,
            address_of_entry_point: r.read_u32_at(16)?,
            base_of_code: r.read_u32_at(20)?,
            base_of_data: r.read_u32_at(24)?,
            image_base: r.read_u32_at(28)?,
            section_alignment: r.read_u32_at(32)?,
            file_alignment: r.read_u32_at(36)?,
            major_operating_system_version: r.read_u16_at(40)?,
            minor_operating_system_version: r.read_u16_at(42)?,
            major_image_version: r.read_u16_at(44)?,
            minor_image_version: r.read_u16_at(46)?,
            major_subsystem_version: r.read_u16_at(48)?,
            minor_subsystem_version: r.read_u16_at(50)?,
            win32_version_value: r.read_u32_at(52)?,
            size_of_image: r.read_u32_at(56)?,
            size_of_headers: r.read_u32_at(60)?,
            check_sum: r.read_u32_at(64)?,
            subsystem: r.read_u16_at(68)?,
            dll_characteristics: r.read_u16_at(70)?,
            size_of_stack_reserve: r.read_u32_at(72)?,
            size_of_stack_commit: r.read_u32_at(76)?,
            size_of_heap_reserve: r.read_u32_at(80)?,
            size_of_heap_commit: r.read_u32_at(84)?,
            loader_flags: r.read_u32_at(88)?,
            number_of_rva_and_sizes: r.read_u32_at(92)?,
        })
    }

    fn address_of_entry_point(&self) -> u32 {
        self.address_of_entry_point
    }

    fn image_base(&self) -> u64 {
        self.image_base as u64
    }

    fn section_alignment(&self) -> u32 {
        self.section_alignment
    }

    fn file_alignment(&self) -> u32 {
        self.file_alignment
    }

    fn size_of_image(&self) -> u32 {
        self.size_of_image
    }

    fn size_of_headers(&self) -> u32 {
        self.size_of_headers
    }

    fn subsystem(&self) -> u16 {
        self.subsystem
    }

    fn number_of_rva_and_sizes(&self) -> u32 {
        self.number_of_rva_and_sizes
    }
}

impl OptionalHeaderFields for OptionalHeader64 {
    const MAGIC: u16 = PE32PLUS_MAGIC;
    const BASE_SIZE: usize = 112;

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::BASE_SIZE {
            return Err(Error::buffer_too_small(Self::BASE_SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        let magic = r.read_u16_at(0)?;
        if magic != Self::MAGIC {
            return Err(Error::InvalidOptionalHeaderMagic(magic));
        }

        Ok(Self {
            magic,
            major_linker_version: data[2],
            minor_linker_version: data[3],
            size_of_code: r.read_u32_at(4)?,
            size_of_initialized_data: r.read_u32_at(8)?,
            size_of_uninitialized_data: r.read_u32_at(12)?,
            address_of_entry_point: r.read_u32_at(16)?,
            base_of_code: r.read_u32_at(20)?,
            image_base: r.read_u64_at(24)?,
            section_alignment: r.read_u32_at(32)?,
            file_alignment: r.read_u32_at(36)?,
            major_operating_system_version: r.read_u16_at(40)?,
            minor_operating_system_version: r.read_u16_at(42)?,
            major_image_version: r.read_u16_at(44)?,
            minor_image_version: r.read_u16_at(46)?,
            major_subsystem_version: r.read_u16_at(48)?,
            minor_subsystem_version: r.read_u16_at(50)?,
            win32_version_value: r.read_u32_at(52)?,
            size_of_image: r.read_u32_at(56)?,
            size_of_headers: r.read_u32_at(60)?,
            check_sum: r.read_u32_at(64)?,
            subsystem: r.read_u16_at(68)?,
            dll_characteristics: r.read_u16_at(70)?,
            size_of_stack_reserve: r.read_u64_at(72)?,
            size_of_stack_commit: r.read_u64_at(80)?,
            size_of_heap_reserve: r.read_u64_at(88)?,
            size_of_heap_commit: r.read_u64_at(96)?,
            loader_flags: r.read_u32_at(104)?,
            number_of_rva_and_sizes: r.read_u32_at(108)?,
        })
    }

    fn address_of_entry_point(&self) -> u32 {
        self.address_of_entry_point
    }

    fn image_base(&self) -> u64 {
        self.image_base
    }

    fn section_alignment(&self) -> u32 {
        self.section_alignment
    }

    fn file_alignment(&self) -> u32 {
        self.file_alignment
    }

    fn size_of_image(&self) -> u32 {
        self.size_of_image
    }

    fn size_of_headers(&self) -> u32 {
        self.size_of_headers
    }

    fn subsystem(&self) -> u16 {
        self.subsystem
    }

    fn number_of_rva_and_sizes(&self) -> u32 {
        self.number_of_rva_and_sizes
    }
}
