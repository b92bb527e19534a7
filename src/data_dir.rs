//! Data Directory structures and the directory table view.

use log::warn;
use strum::{EnumCount, EnumIter, FromRepr, IntoStaticStr};

use crate::reader::SliceReader;
use crate::{Error, Result};

/// Data directory type - type-safe enum for data directory indices.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, FromRepr, IntoStaticStr,
)]
#[repr(usize)]
pub enum DataDirectoryType {
    /// Export table (.edata)
    Export = 0,
    /// Import table (.idata)
    Import = 1,
    /// Resource table (.rsrc)
    Resource = 2,
    /// Exception table (.pdata)
    Exception = 3,
    /// Certificate/Security table
    Security = 4,
    /// Base relocation table (.reloc)
    BaseReloc = 5,
    /// Debug directory
    Debug = 6,
    /// Architecture-specific data
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage (.tls)
    #[strum(serialize = "TLS")]
    Tls = 9,
    /// Load configuration
    LoadConfig = 10,
    /// Bound import table
    BoundImport = 11,
    /// Import address table
    #[strum(serialize = "IAT")]
    Iat = 12,
    /// Delay import descriptor
    DelayImport = 13,
    /// CLR runtime header
    #[strum(serialize = "CLR")]
    ClrRuntime = 14,
    /// Reserved
    Reserved = 15,
}

impl DataDirectoryType {
    /// Get the index value.
    pub const fn as_index(self) -> usize {
        self as usize
    }

    /// Try to create from an index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::from_repr(index)
    }

    /// Get the name of this directory type.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Number of data directories a standard image declares.
pub const NUMBER_OF_DIRECTORY_ENTRIES: usize = DataDirectoryType::COUNT;

/// Data Directory entry (IMAGE_DATA_DIRECTORY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    /// RVA (Relative Virtual Address) of the table.
    pub virtual_address: u32,
    /// Size of the table in bytes.
    pub size: u32,
}

impl DataDirectory {
    /// Size of a data directory entry in bytes.
    pub const SIZE: usize = 8;

    /// Parse a data directory from a byte slice.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::buffer_too_small(Self::SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        Ok(Self {
            virtual_address: r.read_u32_at(0)?,
            size: r.read_u32_at(4)?,
        })
    }

    /// A directory is present when its size is non-zero.
    pub fn is_present(&self) -> bool {
        self.size != 0
    }

    /// Whether `rva` falls inside `[virtual_address, virtual_address + size)`.
    pub fn contains(&self, rva: u32) -> bool {
        let start = self.virtual_address as u64;
        let end = start + self.size as u64;
        (start..end).contains(&(rva as u64))
    }
}

/// The data-directory array at the tail of the optional header.
///
/// Entries are decoded from the buffer on every access; nothing is cached.
/// `NumberOfRvaAndSizes` is taken as declared, but only the entries that lie
/// inside the buffer are readable.
#[derive(Debug, Clone, Copy)]
pub struct DataDirectoryEntries<'a> {
    table: SliceReader<'a>,
    count: u32,
}

impl<'a> DataDirectoryEntries<'a> {
    /// View `count` entries starting at `offset` in `reader`.
    ///
    /// An array running past the end of the buffer is clipped to the entries
    /// that fit; reading a clipped entry fails with [`Error::OffsetOutOfBounds`].
    pub fn new(reader: &SliceReader<'a>, offset: usize, count: u32) -> Self {
        let tail = reader.tail_at(offset).unwrap_or(&[]);
        let fits = tail.len() / DataDirectory::SIZE;
        let readable = (count as usize).min(fits);
        if readable < count as usize {
            warn!("data directory array declares {count} entries, {readable} fit in the buffer");
        }
        Self {
            table: SliceReader::new(&tail[..readable * DataDirectory::SIZE]),
            count,
        }
    }

    /// Declared number of entries (`NumberOfRvaAndSizes`).
    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of entries actually present in the buffer.
    pub fn readable(&self) -> u32 {
        (self.table.len() / DataDirectory::SIZE) as u32
    }

    /// Read the entry at a raw index.
    pub fn get_index(&self, index: usize) -> Result<DataDirectory> {
        if index >= self.count as usize {
            return Err(Error::DirectoryIndexOutOfRange {
                index,
                count: self.count,
            });
        }
        DataDirectory::parse(self.table.bytes_at(index * DataDirectory::SIZE, DataDirectory::SIZE)?)
    }

    /// Read the entry for a directory type.
    pub fn get(&self, ty: DataDirectoryType) -> Result<DataDirectory> {
        self.get_index(ty.as_index())
    }

    /// Whether the directory has a non-zero size.
    pub fn has_directory(&self, ty: DataDirectoryType) -> Result<bool> {
        self.get(ty).map(|dir| dir.is_present())
    }

    /// Iterate over the readable entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = DataDirectory> + 'a {
        let table = self.table;
        (0..self.readable() as usize).filter_map(move |i| {
            table
                .bytes_at(i * DataDirectory::SIZE, DataDirectory::SIZE)
                .and_then(DataDirectory::parse)
                .ok()
        })
    }
}
