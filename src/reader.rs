//! Bounds-checked reads over a borrowed byte buffer.
//!
//! Every structure in this crate is decoded through a [`SliceReader`], which
//! never copies the underlying buffer and turns every out-of-range access into
//! an [`Error`] instead of a panic.

use crate::{Error, Result};

/// Little-endian reader over a borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct SliceReader<'a> {
    data: &'a [u8],
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(Error::OffsetOutOfBounds {
            offset,
            size: self.data.len(),
        })?;
        self.data.get(offset..end).ok_or(Error::OffsetOutOfBounds {
            offset,
            size: self.data.len(),
        })
    }

    /// Borrow everything from `offset` to the end of the buffer.
    pub fn tail_at(&self, offset: usize) -> Result<&'a [u8]> {
        self.data.get(offset..).ok_or(Error::OffsetOutOfBounds {
            offset,
            size: self.data.len(),
        })
    }

    fn array_at<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.bytes_at(offset, N)?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Read a u16 at the given offset (little-endian).
    pub fn read_u16_at(&self, offset: usize) -> Result<u16> {
        self.array_at(offset).map(u16::from_le_bytes)
    }

    /// Read a u32 at the given offset (little-endian).
    pub fn read_u32_at(&self, offset: usize) -> Result<u32> {
        self.array_at(offset).map(u32::from_le_bytes)
    }

    /// Read a u64 at the given offset (little-endian).
    pub fn read_u64_at(&self, offset: usize) -> Result<u64> {
        self.array_at(offset).map(u64::from_le_bytes)
    }

    /// Read an i32 at the given offset (little-endian).
    pub fn read_i32_at(&self, offset: usize) -> Result<i32> {
        self.array_at(offset).map(i32::from_le_bytes)
    }

    /// Borrow the NUL-terminated string at `offset`, without the terminator.
    ///
    /// Returns `None` if `offset` is out of range or no NUL follows it.
    pub fn cstr_at(&self, offset: usize) -> Option<&'a [u8]> {
        let tail = self.data.get(offset..)?;
        let end = tail.iter().position(|&b| b == 0)?;
        Some(&tail[..end])
    }
}

/// Truncate a byte string at its first NUL, the way C string comparison sees it.
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_reader() {
        let data = [0x4D, 0x5A, 0x90, 0x00];
        let reader = SliceReader::new(&data);
        assert_eq!(reader.len(), 4);
        assert_eq!(reader.read_u16_at(0).unwrap(), 0x5A4D);
        assert_eq!(reader.read_u32_at(0).unwrap(), 0x00905A4D);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0x4D, 0x5A];
        let reader = SliceReader::new(&data);
        assert!(matches!(
            reader.read_u32_at(0),
            Err(Error::OffsetOutOfBounds { offset: 0, size: 2 })
        ));
        assert!(reader.read_u16_at(1).is_err());
        assert!(reader.read_u16_at(usize::MAX).is_err());
        assert!(reader.bytes_at(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_tail_at() {
        let data = [1, 2, 3];
        let reader = SliceReader::new(&data);
        assert_eq!(reader.tail_at(1).unwrap(), &[2, 3]);
        assert!(reader.tail_at(3).unwrap().is_empty());
        assert!(reader.tail_at(4).is_err());
    }

    #[test]
    fn test_cstr_at() {
        let data = b"Foo\0Bar";
        let reader = SliceReader::new(data);
        assert_eq!(reader.cstr_at(0), Some(&b"Foo"[..]));
        assert_eq!(reader.cstr_at(3), Some(&b""[..]));
        assert_eq!(reader.cstr_at(4), None);
        assert_eq!(reader.cstr_at(100), None);
    }

    #[test]
    fn test_until_nul() {
        assert_eq!(until_nul(b"Foo\0junk"), b"Foo");
        assert_eq!(until_nul(b"Foo"), b"Foo");
    }
}
