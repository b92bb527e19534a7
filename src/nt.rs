//! NT headers: PE signature, COFF file header and optional header.
//!
//! The optional-header magic picks one of two shapes once, at parse time;
//! [`NtHeader`] carries that choice as an enum so callers never re-check it.

use crate::coff::{verify_pe_signature, CoffHeader};
use crate::data_dir::DataDirectoryEntries;
use crate::optional::{
    OptionalHeader32, OptionalHeader64, OptionalHeaderFields, Subsystem, PE32PLUS_MAGIC,
    PE32_MAGIC,
};
use crate::reader::SliceReader;
use crate::{Error, Result};

/// Which optional-header shape an [`NtHeader`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NtHeaderKind {
    /// PE32, magic 0x10B.
    Header32,
    /// PE32+, magic 0x20B.
    Header64,
}

/// NT headers for one optional-header shape (IMAGE_NT_HEADERS32/64).
#[derive(Debug, Clone)]
pub struct NtHeaders<'a, O> {
    offset: usize,
    file_header: CoffHeader,
    optional_header: O,
    data_directories: DataDirectoryEntries<'a>,
}

/// PE32 NT headers.
pub type NtHeader32<'a> = NtHeaders<'a, OptionalHeader32>;
/// PE32+ NT headers.
pub type NtHeader64<'a> = NtHeaders<'a, OptionalHeader64>;

impl<'a, O: OptionalHeaderFields> NtHeaders<'a, O> {
    /// Parse the headers whose "PE\0\0" signature sits at `offset`.
    fn read_from(reader: &SliceReader<'a>, offset: usize, file_header: CoffHeader) -> Result<Self> {
        let optional_offset = offset + 4 + CoffHeader::SIZE;
        let optional_header = O::read_from(reader, optional_offset)?;
        let data_directories = DataDirectoryEntries::new(
            reader,
            optional_offset + O::BASE_SIZE,
            optional_header.number_of_rva_and_sizes(),
        );

        Ok(Self {
            offset,
            file_header,
            optional_header,
            data_directories,
        })
    }

    /// Offset of the PE signature within the buffer (`e_lfanew`).
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn file_header(&self) -> &CoffHeader {
        &self.file_header
    }

    pub fn optional_header(&self) -> &O {
        &self.optional_header
    }

    pub fn data_directories(&self) -> &DataDirectoryEntries<'a> {
        &self.data_directories
    }

    /// Offset of the first section header: right after the declared optional header.
    pub fn section_table_offset(&self) -> usize {
        self.offset + 4 + CoffHeader::SIZE + self.file_header.size_of_optional_header as usize
    }
}

/// NT headers of either shape.
#[derive(Debug, Clone)]
pub enum NtHeader<'a> {
    Header32(NtHeader32<'a>),
    Header64(NtHeader64<'a>),
}

macro_rules! dispatch {
    ($self:expr, $h:ident => $body:expr) => {
        match $self {
            NtHeader::Header32($h) => $body,
            NtHeader::Header64($h) => $body,
        }
    };
}

impl<'a> NtHeader<'a> {
    /// Parse the NT headers at `offset`, validating signature and magic.
    pub fn parse(reader: &SliceReader<'a>, offset: usize) -> Result<Self> {
        verify_pe_signature(reader, offset)?;
        let file_header = CoffHeader::read_from(reader, offset + 4)?;

        let magic = reader.read_u16_at(offset + 4 + CoffHeader::SIZE)?;
        match magic {
            PE32_MAGIC => Ok(Self::Header32(NtHeaders::read_from(reader, offset, file_header)?)),
            PE32PLUS_MAGIC => Ok(Self::Header64(NtHeaders::read_from(reader, offset, file_header)?)),
            _ => Err(Error::InvalidOptionalHeaderMagic(magic)),
        }
    }

    pub fn kind(&self) -> NtHeaderKind {
        match self {
            Self::Header32(_) => NtHeaderKind::Header32,
            Self::Header64(_) => NtHeaderKind::Header64,
        }
    }

    pub fn is_64bit(&self) -> bool {
        self.kind() == NtHeaderKind::Header64
    }

    pub fn offset(&self) -> usize {
        dispatch!(self, h => h.offset())
    }

    pub fn file_header(&self) -> &CoffHeader {
        dispatch!(self, h => h.file_header())
    }

    pub fn data_directories(&self) -> &DataDirectoryEntries<'a> {
        dispatch!(self, h => h.data_directories())
    }

    pub fn number_of_sections(&self) -> u16 {
        self.file_header().number_of_sections
    }

    pub fn section_table_offset(&self) -> usize {
        dispatch!(self, h => h.section_table_offset())
    }

    /// Get the entry point RVA.
    pub fn entry_point(&self) -> u32 {
        dispatch!(self, h => h.optional_header().address_of_entry_point())
    }

    /// Get the preferred image base address.
    pub fn image_base(&self) -> u64 {
        dispatch!(self, h => h.optional_header().image_base())
    }

    pub fn section_alignment(&self) -> u32 {
        dispatch!(self, h => h.optional_header().section_alignment())
    }

    pub fn file_alignment(&self) -> u32 {
        dispatch!(self, h => h.optional_header().file_alignment())
    }

    pub fn size_of_image(&self) -> u32 {
        dispatch!(self, h => h.optional_header().size_of_image())
    }

    pub fn size_of_headers(&self) -> u32 {
        dispatch!(self, h => h.optional_header().size_of_headers())
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        dispatch!(self, h => Subsystem::from_u16(h.optional_header().subsystem()))
    }
}

/// Read just enough of the headers at `base` to learn `SizeOfImage`.
///
/// `probe` must cover the DOS header plus the NT header up to and including
/// the `SizeOfImage` field; see [`probe_len`].
pub(crate) fn probe_size_of_image(probe: &SliceReader<'_>, nt_offset: usize) -> Result<u32> {
    verify_pe_signature(probe, nt_offset)?;
    let optional_offset = nt_offset + 4 + CoffHeader::SIZE;
    match probe.read_u16_at(optional_offset)? {
        PE32_MAGIC | PE32PLUS_MAGIC => probe.read_u32_at(optional_offset + SIZE_OF_IMAGE_OFFSET),
        magic => Err(Error::InvalidOptionalHeaderMagic(magic)),
    }
}

/// Bytes needed from the start of the image for [`probe_size_of_image`].
pub(crate) fn probe_len(nt_offset: usize) -> usize {
    nt_offset + 4 + CoffHeader::SIZE + SIZE_OF_IMAGE_OFFSET + 4
}

// Same position in both optional-header shapes.
const SIZE_OF_IMAGE_OFFSET: usize = 56;

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(magic: u16, dirs: u32, extra: usize) -> Vec<u8> {
        let base = if magic == PE32_MAGIC { 96 } else { 112 };
        let opt_size = base + dirs as usize * 8;
        let mut buf = vec![0u8; 0x10 + 24 + opt_size + extra];
        buf[0x10..0x14].copy_from_slice(b"PE\0\0");
        buf[0x14..0x16].copy_from_slice(&0x8664u16.to_le_bytes());
        buf[0x16..0x18].copy_from_slice(&3u16.to_le_bytes());
        buf[0x24..0x26].copy_from_slice(&(opt_size as u16).to_le_bytes());
        let opt = 0x10 + 24;
        buf[opt..opt + 2].copy_from_slice(&magic.to_le_bytes());
        buf[opt + 56..opt + 60].copy_from_slice(&0x5000u32.to_le_bytes());
        buf[opt + base - 4..opt + base].copy_from_slice(&dirs.to_le_bytes());
        buf
    }

    #[test]
    fn test_parse_pe32() {
        let buf = headers(PE32_MAGIC, 16, 0);
        let nt = NtHeader::parse(&SliceReader::new(&buf), 0x10).unwrap();
        assert_eq!(nt.kind(), NtHeaderKind::Header32);
        assert!(!nt.is_64bit());
        assert_eq!(nt.number_of_sections(), 3);
        assert_eq!(nt.data_directories().len(), 16);
        assert_eq!(nt.size_of_image(), 0x5000);
        assert_eq!(nt.section_table_offset(), 0x10 + 24 + 96 + 128);
    }

    #[test]
    fn test_parse_pe64() {
        let buf = headers(PE32PLUS_MAGIC, 16, 0);
        let nt = NtHeader::parse(&SliceReader::new(&buf), 0x10).unwrap();
        assert_eq!(nt.kind(), NtHeaderKind::Header64);
        assert_eq!(nt.offset(), 0x10);
        assert_eq!(nt.section_table_offset(), 0x10 + 24 + 112 + 128);
    }

    #[test]
    fn test_parse_bad_signature() {
        let mut buf = headers(PE32PLUS_MAGIC, 16, 0);
        buf[0x12] = b'X';
        assert!(matches!(
            NtHeader::parse(&SliceReader::new(&buf), 0x10),
            Err(Error::InvalidPeSignature)
        ));
    }

    #[test]
    fn test_parse_bad_magic() {
        let buf = headers(0x107, 16, 112);
        assert!(matches!(
            NtHeader::parse(&SliceReader::new(&buf), 0x10),
            Err(Error::InvalidOptionalHeaderMagic(0x107))
        ));
    }

    #[test]
    fn test_parse_truncated_directories() {
        let mut buf = headers(PE32PLUS_MAGIC, 16, 0);
        buf.truncate(buf.len() - 8);
        let nt = NtHeader::parse(&SliceReader::new(&buf), 0x10).unwrap();
        assert_eq!(nt.data_directories().len(), 16);
        assert_eq!(nt.data_directories().readable(), 15);
    }

    #[test]
    fn test_parse_truncated_optional_header() {
        let mut buf = headers(PE32PLUS_MAGIC, 0, 0);
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            NtHeader::parse(&SliceReader::new(&buf), 0x10),
            Err(Error::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_probe_size_of_image() {
        let buf = headers(PE32_MAGIC, 0, 0);
        let probe = SliceReader::new(&buf[..probe_len(0x10)]);
        assert_eq!(probe_size_of_image(&probe, 0x10).unwrap(), 0x5000);
    }
}
