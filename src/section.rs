//! Section Header structures and the section table.

use bitflags::bitflags;
use log::warn;

use crate::reader::SliceReader;
use crate::{Error, Result};

bitflags! {
    /// Section characteristics flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        /// Section contains executable code.
        const CODE = 0x00000020;
        /// Section contains initialized data.
        const INITIALIZED_DATA = 0x00000040;
        /// Section contains uninitialized data.
        const UNINITIALIZED_DATA = 0x00000080;
        /// Section cannot be cached.
        const NO_CACHE = 0x04000000;
        /// Section is not pageable.
        const NO_PAGE = 0x08000000;
        /// Section is shared.
        const SHARED = 0x10000000;
        /// Section is executable.
        const EXECUTE = 0x20000000;
        /// Section is readable.
        const READ = 0x40000000;
        /// Section is writable.
        const WRITE = 0x80000000;
    }
}

/// Section Header (IMAGE_SECTION_HEADER).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section name (8-byte null-padded ASCII).
    pub name: [u8; 8],
    /// Virtual size of the section.
    pub virtual_size: u32,
    /// RVA of the section.
    pub virtual_address: u32,
    /// Size of raw data on disk.
    pub size_of_raw_data: u32,
    /// File offset to raw data.
    pub pointer_to_raw_data: u32,
    /// File offset to relocations.
    pub pointer_to_relocations: u32,
    /// File offset to line numbers.
    pub pointer_to_linenumbers: u32,
    /// Number of relocations.
    pub number_of_relocations: u16,
    /// Number of line numbers.
    pub number_of_linenumbers: u16,
    /// Section characteristics.
    pub characteristics: u32,
}

impl SectionHeader {
    /// Size of a section header in bytes.
    pub const SIZE: usize = 40;

    /// Parse a section header from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::buffer_too_small(Self::SIZE, data.len()));
        }

        let mut name = [0u8; 8];
        name.copy_from_slice(&data[0..8]);

        let r = SliceReader::new(data);
        Ok(Self {
            name,
            virtual_size: r.read_u32_at(8)?,
            virtual_address: r.read_u32_at(12)?,
            size_of_raw_data: r.read_u32_at(16)?,
            pointer_to_raw_data: r.read_u32_at(20)?,
            pointer_to_relocations: r.read_u32_at(24)?,
            pointer_to_linenumbers: r.read_u32_at(28)?,
            number_of_relocations: r.read_u16_at(32)?,
            number_of_linenumbers: r.read_u16_at(34)?,
            characteristics: r.read_u32_at(36)?,
        })
    }

    /// Get the section name as a string (trimmed of null bytes).
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Characteristics as typed flags; unknown bits are dropped.
    pub fn flags(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_truncate(self.characteristics)
    }

    /// Check if the section is executable.
    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::EXECUTE)
    }

    /// Check if the section is readable.
    pub fn is_readable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::READ)
    }

    /// Check if the section is writable.
    pub fn is_writable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::WRITE)
    }

    /// Whether `rva` lies in `[VirtualAddress, VirtualAddress + max(VirtualSize, SizeOfRawData))`.
    pub fn contains_rva(&self, rva: u64) -> bool {
        let start = self.virtual_address as u64;
        let size = self.virtual_size.max(self.size_of_raw_data) as u64;
        rva >= start && rva < start + size
    }

    /// Whether `offset` lies in `[PointerToRawData, PointerToRawData + SizeOfRawData)`.
    pub fn contains_offset(&self, offset: u64) -> bool {
        let start = self.pointer_to_raw_data as u64;
        offset >= start && offset < start + self.size_of_raw_data as u64
    }
}

/// The section table, in the order the image declares it.
///
/// No ordering or non-overlap is assumed; every lookup returns the first
/// matching record. A table running past the end of the buffer holds only the
/// records that fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeaders {
    headers: Vec<SectionHeader>,
    table_offset: usize,
    declared: usize,
}

impl SectionHeaders {
    /// Read up to `count` consecutive section headers starting at `offset`.
    pub fn read_from(reader: &SliceReader<'_>, offset: usize, count: usize) -> Result<Self> {
        let tail = reader.tail_at(offset).unwrap_or(&[]);
        let readable = count.min(tail.len() / SectionHeader::SIZE);
        if readable < count {
            warn!("section table declares {count} sections, {readable} fit in the buffer");
        }

        let headers = tail[..readable * SectionHeader::SIZE]
            .chunks_exact(SectionHeader::SIZE)
            .map(SectionHeader::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            headers,
            table_offset: offset,
            declared: count,
        })
    }

    /// Offset of the first section header within the buffer.
    pub fn table_offset(&self) -> usize {
        self.table_offset
    }

    /// Number of records read, at most [`declared_len`](Self::declared_len).
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// `NumberOfSections` as the file header states it.
    pub fn declared_len(&self) -> usize {
        self.declared
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn as_slice(&self) -> &[SectionHeader] {
        &self.headers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SectionHeader> {
        self.headers.iter()
    }

    /// Get a section by name.
    pub fn by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.headers.iter().find(|s| s.name_str() == name)
    }

    /// First section whose virtual range contains `rva`.
    pub fn rva_to_section_header(&self, rva: u64) -> Option<&SectionHeader> {
        self.headers.iter().find(|s| s.contains_rva(rva))
    }

    /// First section whose raw-data range contains `offset`.
    pub fn offset_to_section_header(&self, offset: u64) -> Option<&SectionHeader> {
        self.headers.iter().find(|s| s.contains_offset(offset))
    }

    /// Translate an RVA to a file offset, or `0` if no raw data backs it.
    ///
    /// An RVA in the zero-filled tail past `SizeOfRawData` still belongs to
    /// its section but has no file counterpart.
    pub fn rva_to_offset(&self, rva: u64) -> u64 {
        if rva == 0 {
            return 0;
        }
        match self.rva_to_section_header(rva) {
            Some(section) => {
                let delta = rva - section.virtual_address as u64;
                if delta < section.size_of_raw_data as u64 {
                    section.pointer_to_raw_data as u64 + delta
                } else {
                    0
                }
            }
            None => 0,
        }
    }

    /// Translate a file offset to an RVA, or `0` if no section maps it.
    pub fn offset_to_rva(&self, offset: u64) -> u64 {
        if offset == 0 {
            return 0;
        }
        match self.offset_to_section_header(offset) {
            Some(section) => offset - section.pointer_to_raw_data as u64 + section.virtual_address as u64,
            None => 0,
        }
    }
}

impl<'s> IntoIterator for &'s SectionHeaders {
    type Item = &'s SectionHeader;
    type IntoIter = std::slice::Iter<'s, SectionHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
