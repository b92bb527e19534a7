//! # peview
//!
//! A read-only decoder for Windows PE (Portable Executable) images.
//!
//! `peview` interprets a byte buffer it does not own as a PE image: DOS
//! header and stub, NT headers (PE32 or PE32+), data directories and the
//! section table. On top of that it translates between RVAs and file offsets
//! and resolves exported symbols the way a loader does.
//!
//! ## Features
//!
//! - **Borrowed buffers**: a [`PeImage`] borrows its bytes and never copies them.
//! - **Both layouts**: buffers read from disk ([`Layout::File`]) and modules
//!   already mapped by a loader ([`Layout::Mapped`]).
//! - **Export lookup**: binary search by exact name, or a linear scan with a
//!   caller-supplied predicate, see [`ExportReader`].
//! - **No panics on hostile input**: every header-derived count and offset is
//!   bounds-checked before use.
//!
//! ## Example
//!
//! ```no_run
//! use peview::{find_export_address, ImageType, Layout, PeImage};
//!
//! let bytes = std::fs::read("example.dll").unwrap();
//! let image = PeImage::new(&bytes, Layout::File);
//! assert!(image.is_pe());
//! println!("64-bit: {}", image.image_type()? == ImageType::Pe64);
//!
//! if let Some(addr) = find_export_address(&image, "DllMain")? {
//!     println!("DllMain at buffer offset {:#x}", addr as usize - image.base() as usize);
//! }
//! # Ok::<(), peview::Error>(())
//! ```

pub mod coff;
pub mod data_dir;
pub mod dos;
pub mod error;
pub mod export;
pub mod image;
pub mod nt;
pub mod optional;
pub mod reader;
pub mod section;

pub use coff::{CoffHeader, FileCharacteristics, MachineType};
pub use data_dir::{DataDirectory, DataDirectoryEntries, DataDirectoryType};
pub use dos::{DosHeader, DosStub};
pub use error::{Error, Result};
pub use export::{
    find_export_address, find_export_address_with, find_module_export_address,
    find_module_export_address_with, Export, ExportDirectory, ExportReader,
};
pub use image::{ImageType, Layout, PeImage};
pub use nt::{NtHeader, NtHeader32, NtHeader64, NtHeaderKind};
pub use optional::{OptionalHeader32, OptionalHeader64, OptionalHeaderFields, Subsystem};
pub use section::{SectionCharacteristics, SectionHeader, SectionHeaders};
