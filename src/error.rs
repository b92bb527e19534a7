//! Error types for PE decoding.

use thiserror::Error;

/// Result type alias for peview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding a PE image.
///
/// Negative outcomes that are part of normal operation are not errors: an
/// address with no owning section translates to `0`, a missing data directory
/// reports `false` from [`PeImage::has_directory`](crate::PeImage::has_directory),
/// and an export that is not present resolves to `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid DOS signature (expected "MZ").
    #[error("Invalid DOS signature (expected 'MZ')")]
    InvalidDosSignature,

    /// `e_lfanew` does not point inside the buffer.
    #[error("Invalid NT header offset: {0:#x}")]
    InvalidNtHeaderOffset(i32),

    /// Invalid PE signature (expected "PE\0\0").
    #[error("Invalid PE signature (expected 'PE\\0\\0')")]
    InvalidPeSignature,

    /// Optional header magic is neither PE32 nor PE32+.
    #[error("Invalid optional header magic: {0:#06x}")]
    InvalidOptionalHeaderMagic(u16),

    /// Buffer too small to contain expected data.
    #[error("Buffer too small: expected {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    /// Offset out of bounds.
    #[error("Offset {offset:#x} out of bounds (size: {size})")]
    OffsetOutOfBounds { offset: usize, size: usize },

    /// An accessor was used on a buffer that did not decode as a PE image.
    ///
    /// Check [`PeImage::is_pe`](crate::PeImage::is_pe) first, or inspect
    /// [`PeImage::load_error`](crate::PeImage::load_error) for the reason.
    #[error("Not a valid PE image")]
    InvalidImage,

    /// Data directory index beyond `NumberOfRvaAndSizes`.
    #[error("Data directory index {index} out of range (image declares {count})")]
    DirectoryIndexOutOfRange { index: usize, count: u32 },

    /// The image has no export data directory.
    #[error("Image has no export directory")]
    NotAnExportDirectory,

    /// An ordinal table entry points past the export address table.
    #[error("Export ordinal {ordinal} out of range ({count} functions)")]
    ExportOrdinalOutOfRange { ordinal: u32, count: u32 },

    /// A string starting at this RVA runs to the end of the buffer without a NUL.
    #[error("Unterminated string at RVA {0:#x}")]
    UnterminatedString(u32),
}

impl Error {
    pub(crate) fn buffer_too_small(expected: usize, actual: usize) -> Self {
        Error::BufferTooSmall { expected, actual }
    }

    /// Whether this error explains why a buffer is not a PE image, as opposed
    /// to a failure reading an already validated one.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidDosSignature
                | Error::InvalidNtHeaderOffset(_)
                | Error::InvalidPeSignature
                | Error::InvalidOptionalHeaderMagic(_)
        )
    }
}
