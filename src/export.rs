//! Export directory decoding and symbol resolution.
//!
//! [`ExportReader`] views the three parallel export tables in place:
//!
//! - the name pointer table: RVAs of NUL-terminated names, sorted ascending
//!   by byte value so a loader can binary-search it;
//! - the name ordinal table: for each name, an index into the address table;
//! - the export address table: function RVAs, indexed by `ordinal - Base`.
//!
//! Lookups by exact name use binary search; lookups by predicate scan the
//! name table in order. A name table that is not actually sorted only makes
//! the binary search miss names, never read out of bounds.

use std::cmp::Ordering;

use log::{trace, warn};

use crate::data_dir::{DataDirectory, DataDirectoryType};
use crate::image::PeImage;
use crate::reader::{until_nul, SliceReader};
use crate::{Error, Result};

/// IMAGE_EXPORT_DIRECTORY - 40 bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportDirectory {
    /// Export flags (reserved, must be 0).
    pub characteristics: u32,
    /// Time/date stamp.
    pub time_date_stamp: u32,
    /// Major version.
    pub major_version: u16,
    /// Minor version.
    pub minor_version: u16,
    /// RVA to the DLL name.
    pub name_rva: u32,
    /// Starting ordinal number.
    pub base: u32,
    /// Number of entries in the Export Address Table.
    pub number_of_functions: u32,
    /// Number of entries in the Name Pointer Table.
    pub number_of_names: u32,
    /// RVA to the Export Address Table (EAT).
    pub address_of_functions: u32,
    /// RVA to the Export Name Pointer Table.
    pub address_of_names: u32,
    /// RVA to the Export Ordinal Table.
    pub address_of_name_ordinals: u32,
}

impl ExportDirectory {
    pub const SIZE: usize = 40;

    /// Parse from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::buffer_too_small(Self::SIZE, data.len()));
        }

        let r = SliceReader::new(data);
        Ok(Self {
            characteristics: r.read_u32_at(0)?,
            time_date_stamp: r.read_u32_at(4)?,
            major_version: r.read_u16_at(8)?,
            minor_version: r.read_u16_at(10)?,
            name_rva: r.read_u32_at(12)?,
            base: r.read_u32_at(16)?,
            number_of_functions: r.read_u32_at(20)?,
            number_of_names: r.read_u32_at(24)?,
            address_of_functions: r.read_u32_at(28)?,
            address_of_names: r.read_u32_at(32)?,
            address_of_name_ordinals: r.read_u32_at(36)?,
        })
    }
}

/// A resolved export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export<'a> {
    name: Option<&'a [u8]>,
    ordinal: u32,
    rva: u32,
    data: &'a [u8],
    forwarded: bool,
}

impl<'a> Export<'a> {
    /// The export name, if it is exported by name.
    pub fn name(&self) -> Option<&'a [u8]> {
        self.name
    }

    /// The export name as UTF-8, if it is exported by name and valid UTF-8.
    pub fn name_str(&self) -> Option<&'a str> {
        self.name.and_then(|n| std::str::from_utf8(n).ok())
    }

    /// Biased ordinal (`Base` + address table index).
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// RVA from the export address table.
    pub fn rva(&self) -> u32 {
        self.rva
    }

    /// The buffer from the export's position to its end.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Address of the export within the buffer.
    ///
    /// For a forwarder this is the address of the forwarder string.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Whether the RVA points back into the export directory, i.e. at a
    /// "MODULE.Symbol" string rather than at code or data.
    pub fn is_forwarder(&self) -> bool {
        self.forwarded
    }

    /// The forwarder string, for a forwarded export.
    pub fn forwarder(&self) -> Option<&'a [u8]> {
        self.forwarded.then(|| until_nul(self.data))
    }
}

/// Cursor over an image's export directory.
///
/// Iterating yields named exports in name-table order and advances an
/// internal cursor; the lookup methods do not touch the cursor. Entries with
/// name RVA 0 are skipped, and an entry that cannot be resolved is yielded as
/// `Err` without ending the iteration.
#[derive(Debug, Clone)]
pub struct ExportReader<'i, 'a> {
    image: &'i PeImage<'a>,
    entry: DataDirectory,
    directory: ExportDirectory,
    names: SliceReader<'a>,
    ordinals: SliceReader<'a>,
    functions: SliceReader<'a>,
    cursor: u32,
}

impl<'i, 'a> ExportReader<'i, 'a> {
    /// Bind to the export directory of `image`.
    ///
    /// Fails with [`Error::InvalidImage`] if `image` is not a PE image and
    /// [`Error::NotAnExportDirectory`] if it declares no exports. The three
    /// tables must fit in the buffer at their declared lengths.
    pub fn new(image: &'i PeImage<'a>) -> Result<Self> {
        let entry = match image.directory_entry(DataDirectoryType::Export) {
            Ok(entry) if entry.is_present() => entry,
            Ok(_) | Err(Error::DirectoryIndexOutOfRange { .. }) => {
                return Err(Error::NotAnExportDirectory)
            }
            Err(e) => return Err(e),
        };

        let directory = ExportDirectory::parse(image.rva_to_data(entry.virtual_address)?)?;
        let names = Self::table(image, directory.address_of_names, directory.number_of_names, 4)?;
        let ordinals = Self::table(
            image,
            directory.address_of_name_ordinals,
            directory.number_of_names,
            2,
        )?;
        let functions = Self::table(
            image,
            directory.address_of_functions,
            directory.number_of_functions,
            4,
        )?;

        Ok(Self {
            image,
            entry,
            directory,
            names,
            ordinals,
            functions,
            cursor: 0,
        })
    }

    fn table(image: &PeImage<'a>, rva: u32, count: u32, width: usize) -> Result<SliceReader<'a>> {
        if count == 0 {
            return Ok(SliceReader::new(&[]));
        }
        let data = image.rva_to_data(rva)?;
        let len = (count as usize)
            .checked_mul(width)
            .ok_or(Error::buffer_too_small(usize::MAX, data.len()))?;
        SliceReader::new(data).bytes_at(0, len).map(SliceReader::new)
    }

    pub fn directory(&self) -> &ExportDirectory {
        &self.directory
    }

    /// The export data directory entry this reader was built from.
    pub fn directory_entry(&self) -> DataDirectory {
        self.entry
    }

    pub fn number_of_names(&self) -> u32 {
        self.directory.number_of_names
    }

    pub fn number_of_functions(&self) -> u32 {
        self.directory.number_of_functions
    }

    /// The module's own name as recorded by the linker.
    pub fn dll_name(&self) -> Result<&'a [u8]> {
        self.image.cstr_at_rva(self.directory.name_rva)
    }

    /// RVA of the `index`th name.
    pub fn name_rva(&self, index: u32) -> Result<u32> {
        self.names.read_u32_at(index as usize * 4)
    }

    /// The `index`th name, without its terminator.
    pub fn name(&self, index: u32) -> Result<&'a [u8]> {
        let rva = self.name_rva(index)?;
        self.image.cstr_at_rva(rva).inspect_err(|e| {
            warn!("export name {index} at RVA {rva:#x} unreadable: {e}");
        })
    }

    /// Address table index for the `index`th name.
    pub fn name_ordinal(&self, index: u32) -> Result<u16> {
        self.ordinals.read_u16_at(index as usize * 2)
    }

    /// RVA stored in the address table at an unbiased ordinal.
    pub fn function_rva(&self, ordinal_index: u32) -> Result<u32> {
        if ordinal_index >= self.directory.number_of_functions {
            warn!(
                "export ordinal {ordinal_index} past address table of {} entries",
                self.directory.number_of_functions
            );
            return Err(Error::ExportOrdinalOutOfRange {
                ordinal: ordinal_index,
                count: self.directory.number_of_functions,
            });
        }
        self.functions.read_u32_at(ordinal_index as usize * 4)
    }

    fn resolve(&self, ordinal_index: u32, name: Option<&'a [u8]>) -> Result<Export<'a>> {
        let rva = self.function_rva(ordinal_index)?;
        Ok(Export {
            name,
            ordinal: self.directory.base.wrapping_add(ordinal_index),
            rva,
            data: self.image.rva_to_data(rva)?,
            forwarded: self.entry.contains(rva),
        })
    }

    /// Resolve the `index`th named export.
    pub fn export_at(&self, index: u32) -> Result<Export<'a>> {
        let name = self.name(index)?;
        let ordinal_index = self.name_ordinal(index)?;
        self.resolve(ordinal_index as u32, Some(name))
    }

    /// The `index`th name as the lookups see it.
    ///
    /// `Some(None)` for an entry whose name RVA is 0, `None` for a name that
    /// cannot be read (already logged by [`name`](Self::name)).
    fn lookup_name(&self, index: u32) -> Option<Option<&'a [u8]>> {
        match self.name_rva(index) {
            Ok(0) => Some(None),
            Ok(_) => self.name(index).ok().map(Some),
            Err(e) => {
                warn!("export name pointer {index} unreadable: {e}");
                None
            }
        }
    }

    /// Exact, case-sensitive lookup by binary search over the sorted name table.
    ///
    /// Comparison stops at the first NUL in `name`, as for a C string. A name
    /// entry with RVA 0 sorts before every name and never matches. Reaching an
    /// unreadable name ends the search with `Ok(None)`.
    pub fn find(&self, name: impl AsRef<[u8]>) -> Result<Option<Export<'a>>> {
        let target = until_nul(name.as_ref());
        let mut lo = 0u32;
        let mut hi = self.number_of_names();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let ordering = match self.lookup_name(mid) {
                Some(Some(candidate)) => {
                    trace!(
                        "export probe [{lo}, {hi}) at {mid}: {}",
                        String::from_utf8_lossy(candidate)
                    );
                    target.cmp(candidate)
                }
                Some(None) => Ordering::Greater,
                None => return Ok(None),
            };
            match ordering {
                Ordering::Equal => return self.export_at(mid).map(Some),
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
            }
        }
        Ok(None)
    }

    /// First named export, in table order, whose name satisfies `predicate`.
    ///
    /// Names with RVA 0 and names that cannot be read are skipped.
    pub fn find_by<F>(&self, mut predicate: F) -> Result<Option<Export<'a>>>
    where
        F: FnMut(&[u8]) -> bool,
    {
        for index in 0..self.number_of_names() {
            let Some(Some(name)) = self.lookup_name(index) else {
                continue;
            };
            if predicate(name) {
                return self.export_at(index).map(Some);
            }
        }
        Ok(None)
    }

    /// Lookup by biased ordinal. Empty address table slots resolve to `None`;
    /// an export whose name is missing or unreadable resolves without a name.
    pub fn find_by_ordinal(&self, ordinal: u32) -> Result<Option<Export<'a>>> {
        let ordinal_index = match ordinal.checked_sub(self.directory.base) {
            Some(i) if i < self.directory.number_of_functions => i,
            _ => return Ok(None),
        };
        if self.function_rva(ordinal_index)? == 0 {
            return Ok(None);
        }

        let mut name = None;
        for index in 0..self.number_of_names() {
            if self.name_ordinal(index)? as u32 == ordinal_index {
                name = self.lookup_name(index).flatten();
                break;
            }
        }
        self.resolve(ordinal_index, name).map(Some)
    }
}

impl<'a> Iterator for ExportReader<'_, 'a> {
    type Item = Result<Export<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.number_of_names() {
            let index = self.cursor;
            self.cursor += 1;
            match self.name_rva(index) {
                Ok(0) => continue,
                Ok(_) => return Some(self.export_at(index)),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Resolve an export by exact name, returning its address within the buffer.
///
/// `Ok(None)` when no export has that name.
pub fn find_export_address(image: &PeImage<'_>, name: impl AsRef<[u8]>) -> Result<Option<*const u8>> {
    Ok(ExportReader::new(image)?.find(name)?.map(|e| e.as_ptr()))
}

/// Resolve the first export whose name satisfies `predicate(context, name)`.
pub fn find_export_address_with<C, F>(
    image: &PeImage<'_>,
    context: &C,
    mut predicate: F,
) -> Result<Option<*const u8>>
where
    C: ?Sized,
    F: FnMut(&C, &[u8]) -> bool,
{
    Ok(ExportReader::new(image)?
        .find_by(|name| predicate(context, name))?
        .map(|e| e.as_ptr()))
}

/// [`find_export_address`] on a module mapped into this process.
///
/// # Safety
///
/// Same contract as [`PeImage::from_module_base`].
pub unsafe fn find_module_export_address(
    module: *const u8,
    name: impl AsRef<[u8]>,
) -> Result<Option<*const u8>> {
    // SAFETY: forwarded to the caller.
    let image = unsafe { PeImage::from_module_base(module) };
    find_export_address(&image, name)
}

/// [`find_export_address_with`] on a module mapped into this process.
///
/// # Safety
///
/// Same contract as [`PeImage::from_module_base`].
pub unsafe fn find_module_export_address_with<C, F>(
    module: *const u8,
    context: &C,
    predicate: F,
) -> Result<Option<*const u8>>
where
    C: ?Sized,
    F: FnMut(&C, &[u8]) -> bool,
{
    // SAFETY: forwarded to the caller.
    let image = unsafe { PeImage::from_module_base(module) };
    find_export_address_with(&image, context, predicate)
}
