//! The [`PeImage`] facade over a borrowed buffer.

use std::slice;

use log::debug;

use crate::data_dir::{DataDirectory, DataDirectoryType};
use crate::dos::{DosHeader, DosStub};
use crate::nt::{probe_len, probe_size_of_image, NtHeader, NtHeaderKind};
use crate::reader::SliceReader;
use crate::section::SectionHeaders;
use crate::{Error, Result};

/// How the buffer is laid out, which decides how RVAs reach buffer positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    /// On-disk layout: RVAs are remapped through the section table.
    #[default]
    File,
    /// Loaded-module layout: an RVA is already an offset into the buffer.
    Mapped,
}

impl From<bool> for Layout {
    fn from(is_mapped: bool) -> Self {
        if is_mapped {
            Layout::Mapped
        } else {
            Layout::File
        }
    }
}

/// Public classification of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Never returned for a decoded image; [`PeImage::image_type`] fails
    /// with [`Error::InvalidImage`] instead.
    Unknown,
    Pe32,
    Pe64,
}

impl From<NtHeaderKind> for ImageType {
    fn from(kind: NtHeaderKind) -> Self {
        match kind {
            NtHeaderKind::Header32 => ImageType::Pe32,
            NtHeaderKind::Header64 => ImageType::Pe64,
        }
    }
}

#[derive(Debug, Clone)]
struct Headers<'a> {
    dos_header: DosHeader,
    nt_header: NtHeader<'a>,
    sections: SectionHeaders,
}

/// A PE image decoded in place from a caller-owned buffer.
///
/// Construction never fails: a buffer that is not a PE image produces a
/// `PeImage` whose [`is_pe`](Self::is_pe) is `false`, and every accessor
/// other than the validity checks then returns [`Error::InvalidImage`].
///
/// The buffer is borrowed for `'a` and never copied. Headers are parsed once,
/// at construction; data directories and export tables are read from the
/// buffer on each access.
///
/// # Example
///
/// ```no_run
/// use peview::{DataDirectoryType, Layout, PeImage};
///
/// let bytes = std::fs::read("example.dll").unwrap();
/// let image = PeImage::new(&bytes, Layout::File);
/// if image.is_pe() {
///     println!("{:?}", image.image_type()?);
///     println!("exports: {}", image.has_directory(DataDirectoryType::Export)?);
/// }
/// # Ok::<(), peview::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct PeImage<'a> {
    data: &'a [u8],
    layout: Layout,
    headers: std::result::Result<Headers<'a>, Error>,
}

impl<'a> PeImage<'a> {
    /// Decode the headers of `data`.
    ///
    /// `layout` accepts a [`Layout`] or a plain `is_mapped` flag.
    pub fn new(data: &'a [u8], layout: impl Into<Layout>) -> Self {
        let layout = layout.into();
        let headers = Self::load(data);
        match &headers {
            Ok(h) => debug!(
                "decoded {:?} image: {} sections, {:?} layout",
                h.nt_header.kind(),
                h.sections.len(),
                layout
            ),
            Err(e) => debug!("rejected {} byte buffer as PE image: {e}", data.len()),
        }
        Self {
            data,
            layout,
            headers,
        }
    }

    /// Like [`new`](Self::new), but returns the reason the buffer is not a PE image.
    pub fn parse(data: &'a [u8], layout: impl Into<Layout>) -> Result<Self> {
        let image = Self::new(data, layout);
        match &image.headers {
            Ok(_) => Ok(image),
            Err(e) => Err(e.clone()),
        }
    }

    /// Decode a module already mapped into this process.
    ///
    /// The image is sized by its own `SizeOfImage` and uses [`Layout::Mapped`].
    /// A null `base` yields an invalid image.
    ///
    /// # Safety
    ///
    /// `base` must be null or point to a loaded module whose headers and
    /// `SizeOfImage` bytes are readable, and that memory must stay mapped and
    /// unmodified for `'a`.
    pub unsafe fn from_module_base(base: *const u8) -> Self {
        if base.is_null() {
            return Self::new(&[], Layout::Mapped);
        }

        // SAFETY: the caller guarantees the headers are readable.
        let dos_bytes = unsafe { slice::from_raw_parts(base, DosHeader::SIZE) };
        let nt_offset = match DosHeader::parse(dos_bytes).and_then(|dos| dos.nt_header_offset()) {
            Ok(offset) => offset,
            Err(_) => return Self::new(dos_bytes, Layout::Mapped),
        };

        // SAFETY: as above; the probe stops at SizeOfImage.
        let probe = unsafe { slice::from_raw_parts(base, probe_len(nt_offset)) };
        let len = match probe_size_of_image(&SliceReader::new(probe), nt_offset) {
            Ok(size) => (size as usize).max(probe.len()),
            Err(_) => return Self::new(probe, Layout::Mapped),
        };

        // SAFETY: the caller guarantees SizeOfImage bytes are readable for 'a.
        Self::new(unsafe { slice::from_raw_parts(base, len) }, Layout::Mapped)
    }

    fn load(data: &'a [u8]) -> Result<Headers<'a>> {
        let reader = SliceReader::new(data);

        let dos_header = DosHeader::parse(data)?;
        let nt_offset = dos_header.nt_header_offset()?;
        if nt_offset >= data.len() {
            return Err(Error::InvalidNtHeaderOffset(dos_header.e_lfanew));
        }

        let nt_header = NtHeader::parse(&reader, nt_offset)?;
        let sections = SectionHeaders::read_from(
            &reader,
            nt_header.section_table_offset(),
            nt_header.number_of_sections() as usize,
        )?;

        Ok(Headers {
            dos_header,
            nt_header,
            sections,
        })
    }

    fn headers(&self) -> Result<&Headers<'a>> {
        self.headers.as_ref().map_err(|_| Error::InvalidImage)
    }

    /// Whether both the DOS and NT headers decoded.
    pub fn is_pe(&self) -> bool {
        self.headers.is_ok()
    }

    /// Why the buffer is not a PE image, if it is not.
    pub fn load_error(&self) -> Option<&Error> {
        self.headers.as_ref().err()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_mapped(&self) -> bool {
        self.layout == Layout::Mapped
    }

    /// The borrowed buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Address of the first byte of the buffer.
    pub fn base(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn image_type(&self) -> Result<ImageType> {
        Ok(self.headers()?.nt_header.kind().into())
    }

    pub fn dos_header(&self) -> Result<&DosHeader> {
        Ok(&self.headers()?.dos_header)
    }

    pub fn nt_header(&self) -> Result<&NtHeader<'a>> {
        Ok(&self.headers()?.nt_header)
    }

    pub fn sections(&self) -> Result<&SectionHeaders> {
        Ok(&self.headers()?.sections)
    }

    pub fn dos_stub(&self) -> Result<DosStub<'a>> {
        DosStub::new(self.data, &self.headers()?.dos_header)
    }

    /// Whether the directory is present (non-zero size).
    pub fn has_directory(&self, ty: DataDirectoryType) -> Result<bool> {
        self.nt_header()?.data_directories().has_directory(ty)
    }

    /// The raw `(VirtualAddress, Size)` record for a directory.
    pub fn directory_entry(&self, ty: DataDirectoryType) -> Result<DataDirectory> {
        self.nt_header()?.data_directories().get(ty)
    }

    /// Translate an RVA to a file offset; `0` when nothing backs it.
    ///
    /// `0` maps to `0` even on an invalid image.
    pub fn rva_to_offset(&self, rva: u32) -> Result<u32> {
        let offset = self.rva_to_offset64(rva as u64)?;
        Ok(u32::try_from(offset).unwrap_or(0))
    }

    /// 64-bit form of [`rva_to_offset`](Self::rva_to_offset).
    pub fn rva_to_offset64(&self, rva: u64) -> Result<u64> {
        if rva == 0 {
            return Ok(0);
        }
        Ok(self.sections()?.rva_to_offset(rva))
    }

    /// Translate a file offset to an RVA; `0` when no section maps it.
    ///
    /// `0` maps to `0` even on an invalid image.
    pub fn offset_to_rva(&self, offset: u32) -> Result<u32> {
        let rva = self.offset_to_rva64(offset as u64)?;
        Ok(u32::try_from(rva).unwrap_or(0))
    }

    /// 64-bit form of [`offset_to_rva`](Self::offset_to_rva).
    pub fn offset_to_rva64(&self, offset: u64) -> Result<u64> {
        if offset == 0 {
            return Ok(0);
        }
        Ok(self.sections()?.offset_to_rva(offset))
    }

    /// The buffer from the position an RVA refers to, through to its end.
    ///
    /// In mapped layout the RVA is the position; in file layout it goes
    /// through [`rva_to_offset`](Self::rva_to_offset), so an RVA with no file
    /// backing lands on position `0`.
    pub fn rva_to_data(&self, rva: u32) -> Result<&'a [u8]> {
        self.rva_to_data64(rva as u64)
    }

    /// 64-bit form of [`rva_to_data`](Self::rva_to_data).
    pub fn rva_to_data64(&self, rva: u64) -> Result<&'a [u8]> {
        self.headers()?;
        let position = match self.layout {
            Layout::Mapped => rva,
            Layout::File => self.rva_to_offset64(rva)?,
        };
        let position = usize::try_from(position).map_err(|_| Error::OffsetOutOfBounds {
            offset: usize::MAX,
            size: self.data.len(),
        })?;
        SliceReader::new(self.data).tail_at(position)
    }

    /// Address of the byte an RVA refers to; see [`rva_to_data`](Self::rva_to_data).
    pub fn rva_to_ptr(&self, rva: u32) -> Result<*const u8> {
        self.rva_to_data(rva).map(<[u8]>::as_ptr)
    }

    /// The NUL-terminated string at an RVA, without the terminator.
    pub fn cstr_at_rva(&self, rva: u32) -> Result<&'a [u8]> {
        let data = self.rva_to_data(rva)?;
        SliceReader::new(data)
            .cstr_at(0)
            .ok_or(Error::UnterminatedString(rva))
    }
}

impl From<&PeImage<'_>> for bool {
    fn from(image: &PeImage<'_>) -> bool {
        image.is_pe()
    }
}
