//! Shared error definitions for the firmware-volume pipeline.

use std::path::PathBuf;

use snafu::prelude::*;
use uefireader_core::prelude::*;

/// Error conditions for when parsing a firmware volume and extracting its
/// build description. Every variant is fatal; the only recoverable oddity (a
/// volume longer than the buffer holding it) is downgraded to a warning.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Thrown if no `_FVH` signature exists, or a header or size field
    /// describes a structure that cannot fit its container.
    #[snafu(display("Invalid UEFI volume image!"))]
    InvalidVolume,
    /// Thrown if a volume or file checksum does not match its stored value.
    #[snafu(display("Checksum verification failed at offset {offset:#X}!"))]
    ChecksumFailed { offset: usize },
    /// Thrown if a file carries a type code outside the supported set.
    #[snafu(display("Unsupported file type {value:#04X} at offset {offset:#X}!"))]
    UnsupportedFileType { value: u8, offset: usize },
    /// Thrown if a section carries a type code outside the supported set.
    #[snafu(display("Unsupported section type {value:#04X} at offset {offset:#X}!"))]
    UnsupportedSectionType { value: u8, offset: usize },
    /// Thrown if a GUID-defined section carries a compression GUID outside
    /// the known set.
    #[snafu(display("Unsupported compression GUID {guid}!"))]
    UnsupportedCompression { guid: Guid },
    /// Thrown if a compressed section payload fails to decode.
    #[snafu(display("Unable to decompress a GUID-defined section!"))]
    DecompressFailed,
    /// Thrown if a file carries more than one UI section.
    #[snafu(display("Multiple UI sections found!"))]
    MultipleUiSections,
    /// Thrown if a module artifact would overwrite an existing file.
    #[snafu(display("File conflict detected at {}!", path.display()))]
    FileConflict { path: PathBuf },
    /// Thrown on any underlying filesystem failure.
    #[snafu(display("Filesystem Error! {source}"))]
    Io { source: std::io::Error },
}
pub(crate) type Result<T> = core::result::Result<T, Error>;

// An out-of-bounds read means a header described more data than its container
// holds, which is a structural defect of the image rather than of the reader
impl From<uefireader_core::data::Error> for Error {
    #[inline]
    fn from(_: uefireader_core::data::Error) -> Self {
        Self::InvalidVolume
    }
}

impl From<std::io::Error> for Error {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

impl From<uefireader_compress::lzma::Error> for Error {
    #[inline]
    fn from(_: uefireader_compress::lzma::Error) -> Self {
        Self::DecompressFailed
    }
}

impl From<uefireader_compress::gzip::Error> for Error {
    #[inline]
    fn from(_: uefireader_compress::gzip::Error) -> Self {
        Self::DecompressFailed
    }
}
