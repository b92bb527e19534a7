//! DOS Header and DOS stub.

use crate::reader::SliceReader;
use crate::{Error, Result};

/// DOS "MZ" signature.
pub const DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"

/// The 64-byte real-mode header at offset 0 (IMAGE_DOS_HEADER).
///
/// Only `e_magic` and `e_lfanew` matter to a PE loader; the remaining fields
/// describe the DOS stub program and are decoded for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    /// "MZ".
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// Offset of the "PE\0\0" signature. Signed on disk; negative values are
    /// rejected by [`nt_header_offset`](Self::nt_header_offset).
    pub e_lfanew: i32,
}

impl DosHeader {
    /// Size of the DOS header in bytes.
    pub const SIZE: usize = 64;

    /// Parse a DOS header from the start of a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::buffer_too_small(Self::SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        let e_magic = r.read_u16_at(0)?;
        if e_magic != DOS_SIGNATURE {
            return Err(Error::InvalidDosSignature);
        }

        let mut e_res = [0u16; 4];
        for (i, word) in e_res.iter_mut().enumerate() {
            *word = r.read_u16_at(28 + i * 2)?;
        }
        let mut e_res2 = [0u16; 10];
        for (i, word) in e_res2.iter_mut().enumerate() {
            *word = r.read_u16_at(40 + i * 2)?;
        }

        Ok(Self {
            e_magic,
            e_cblp: r.read_u16_at(2)?,
            e_cp: r.read_u16_at(4)?,
            e_crlc: r.read_u16_at(6)?,
            e_cparhdr: r.read_u16_at(8)?,
            e_minalloc: r.read_u16_at(10)?,
            e_maxalloc: r.read_u16_at(12)?,
            e_ss: r.read_u16_at(14)?,
            e_sp: r.read_u16_at(16)?,
            e_csum: r.read_u16_at(18)?,
            e_ip: r.read_u16_at(20)?,
            e_cs: r.read_u16_at(22)?,
            e_lfarlc: r.read_u16_at(24)?,
            e_ovno: r.read_u16_at(26)?,
            e_res,
            e_oemid: r.read_u16_at(36)?,
            e_oeminfo: r.read_u16_at(38)?,
            e_res2,
            e_lfanew: r.read_i32_at(60)?,
        })
    }

    /// Whether the header carries the "MZ" magic.
    pub fn is_valid(&self) -> bool {
        self.e_magic == DOS_SIGNATURE
    }

    /// Offset of the NT header from the start of the buffer.
    pub fn nt_header_offset(&self) -> Result<usize> {
        usize::try_from(self.e_lfanew).map_err(|_| Error::InvalidNtHeaderOffset(self.e_lfanew))
    }
}

/// The bytes between the DOS header and the NT header.
///
/// Usually a tiny real-mode program printing "This program cannot be run in
/// DOS mode", often followed by a Rich header. Empty when `e_lfanew` points
/// inside the DOS header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosStub<'a> {
    bytes: &'a [u8],
}

impl<'a> DosStub<'a> {
    /// Borrow the stub out of `data`, which must be the buffer the header was parsed from.
    pub fn new(data: &'a [u8], dos_header: &DosHeader) -> Result<Self> {
        let end = dos_header.nt_header_offset()?;
        if end <= DosHeader::SIZE {
            return Ok(Self { bytes: &[] });
        }
        let bytes = SliceReader::new(data).bytes_at(DosHeader::SIZE, end - DosHeader::SIZE)?;
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
