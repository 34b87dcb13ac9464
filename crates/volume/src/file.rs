//! Parsing for the individual files chained inside a firmware volume.
//!
//! # Format
//! Every file starts with a fixed header, in little-endian format:
//!
//! | Offset | Field | Type | Notes |
//! |--------|-------|------|-------|
//! | 0x00   | File GUID       | u8\[16] | Identity of the file; a-priori lists reference files by it. |
//! | 0x10   | Header checksum | u8      | 8-bit checksum over the header with both checksum bytes cleared and the state byte excluded. |
//! | 0x11   | Body checksum   | u8      | 8-bit checksum over the body when the [`Checksum`](FileAttributes::Checksum) attribute is set, otherwise the fixed marker `0xAA` or `0x55`. |
//! | 0x12   | File type       | u8      | One of [`FileType`]; `0x00` and `0xFF` end the file chain. |
//! | 0x13   | Attributes      | u8      | See [`FileAttributes`]. |
//! | 0x14   | File size       | u24     | Total size including the header. Zero marks the start of an erased tail. |
//! | 0x17   | State           | u8      | Lifecycle bits, excluded from the header checksum. |
//! | \[0x18]| Extended size   | u64     | Only when the attribute byte is exactly `LargeFile \| Checksum` (0x41); replaces the u24 size. |
//!
//! Files are 8-byte aligned relative to the base of the volume that holds
//! them, so the walk in [`image`](crate::image) re-aligns after every file.

use bitflags::bitflags;
use num_enum::TryFromPrimitive;
use snafu::prelude::*;
use uefireader_core::{data, guid::Guid};

use crate::error::{ChecksumFailedSnafu, InvalidVolumeSnafu, Result};
use crate::section::{Section, SectionKind};

/// Size of the common file header.
pub const HEADER_SIZE: usize = 0x18;
/// Size of the header carrying a 64-bit extended length.
pub const LARGE_HEADER_SIZE: usize = 0x20;

/// On-wire file type codes handled by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum FileType {
    Raw = 0x01,
    Freeform = 0x02,
    SecurityCore = 0x03,
    DxeCore = 0x05,
    Driver = 0x07,
    Application = 0x09,
    FirmwareVolumeImage = 0x0B,
    FfsPad = 0xF0,
}

bitflags! {
    /// Attribute bits of a firmware file. Only the two bits that change how
    /// the header and body are read are given names; the rest pass through.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FileAttributes: u8 {
        const LargeFile = 0x01;
        const Checksum = 0x40;

        const _ = !0;
    }
}

impl FileAttributes {
    /// The extended-length header is only used when the attribute byte is
    /// exactly this pattern; any other combination that happens to include
    /// the checksum bit still uses the small header.
    #[inline]
    #[must_use]
    pub fn has_extended_size(&self) -> bool {
        self.bits() == (Self::LargeFile | Self::Checksum).bits()
    }
}

/// Kinds of firmware file that survive into the parsed output. Padding files,
/// the a-priori list and nested volume images are consumed during the walk
/// and never show up as records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Raw,
    Freeform,
    SecurityCore,
    DxeCore,
    Driver,
    Application,
}

impl FileKind {
    /// The `MODULE_TYPE` string written into generated module descriptions.
    #[inline]
    #[must_use]
    pub fn module_type(&self) -> &'static str {
        match self {
            Self::Application => "UEFI_APPLICATION",
            Self::Driver => "DXE_DRIVER",
            Self::SecurityCore => "SEC",
            Self::Raw => "RAW",
            Self::Freeform => "FREEFORM",
            Self::DxeCore => "DXE_CORE",
        }
    }
}

/// A parsed firmware file and its fully decoded sections.
///
/// Section lists are never empty: files of every kind except [`FileKind::Raw`]
/// carry at least one real section, and raw files synthesize a single
/// [`SectionKind::Raw`] section holding the post-header bytes.
#[derive(Debug)]
pub struct FirmwareFile {
    pub guid: Guid,
    pub kind: FileKind,
    pub sections: Vec<Section>,
}

impl FirmwareFile {
    /// Returns the UI section of this file, if any.
    ///
    /// # Errors
    /// Returns [`MultipleUiSections`](crate::error::Error::MultipleUiSections)
    /// if the file carries more than one.
    #[inline]
    pub fn ui_section(&self) -> Result<Option<&Section>> {
        let mut sections = self.sections.iter().filter(|s| s.kind() == SectionKind::Ui);
        let first = sections.next();
        ensure!(sections.next().is_none(), crate::error::MultipleUiSectionsSnafu);
        Ok(first)
    }
}

/// The decoded fixed header of a file, before type dispatch.
pub(crate) struct FileHeader {
    pub guid: Guid,
    pub file_type: u8,
    pub attributes: FileAttributes,
    pub size: usize,
    pub header_size: usize,
}

impl FileHeader {
    /// Reads a file header at the given offset.
    pub(crate) fn read(data: &[u8], offset: usize) -> Result<Self> {
        let guid = data::read_guid(data, offset)?;
        let file_type = data::read_u8(data, offset + 0x12)?;
        let attributes = FileAttributes::from_bits_retain(data::read_u8(data, offset + 0x13)?);

        let (size, header_size) = match attributes.has_extended_size() {
            true => (data::read_u64(data, offset + 0x18)? as usize, LARGE_HEADER_SIZE),
            false => (data::read_u24(data, offset + 0x14)? as usize, HEADER_SIZE),
        };
        ensure!(size == 0 || size >= header_size, InvalidVolumeSnafu);

        Ok(Self { guid, file_type, attributes, size, header_size })
    }

    /// Validates the header checksum, and the body checksum when the
    /// attributes require one.
    ///
    /// The header checksum covers `header_size - 1` bytes (the state byte
    /// does not participate) with both checksum fields cleared. Files without
    /// the checksum attribute instead carry one of the two fixed body
    /// checksum markers.
    pub(crate) fn verify_checksums(&self, data: &[u8], offset: usize) -> Result<()> {
        let mut scratch = data
            .get(offset..offset + self.header_size - 1)
            .ok_or(crate::error::Error::InvalidVolume)?
            .to_vec();
        scratch[0x10] = 0;
        scratch[0x11] = 0;

        let header_checksum = data::read_u8(data, offset + 0x10)?;
        let expected = data::checksum8(&scratch, 0, scratch.len())?;
        ensure!(header_checksum == expected, ChecksumFailedSnafu { offset });

        let body_checksum = data::read_u8(data, offset + 0x11)?;
        if self.attributes.contains(FileAttributes::Checksum) {
            let expected =
                data::checksum8(data, offset + self.header_size, self.size - self.header_size)?;
            ensure!(body_checksum == expected, ChecksumFailedSnafu { offset });
        } else {
            ensure!(matches!(body_checksum, 0xAA | 0x55), ChecksumFailedSnafu { offset });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(file_type: u8, attributes: u8, size: u32) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..16].copy_from_slice(&[0xAB; 16]);
        data[0x11] = 0xAA;
        data[0x12] = file_type;
        data[0x13] = attributes;
        data[0x14..0x17].copy_from_slice(&size.to_le_bytes()[..3]);
        let mut scratch = data[..HEADER_SIZE - 1].to_vec();
        scratch[0x10] = 0;
        scratch[0x11] = 0;
        data[0x10] = uefireader_core::data::checksum8(&scratch, 0, scratch.len()).unwrap();
        data
    }

    #[test]
    fn reads_small_form() {
        let data = header_bytes(0x07, 0x00, 0x18);
        let header = FileHeader::read(&data, 0).unwrap();
        assert_eq!(header.file_type, 0x07);
        assert_eq!(header.size, 0x18);
        assert_eq!(header.header_size, HEADER_SIZE);
        header.verify_checksums(&data, 0).unwrap();
    }

    #[test]
    fn extended_size_requires_exact_attributes() {
        let mut data = header_bytes(0x07, 0x41, 0);
        data.extend_from_slice(&0x20u64.to_le_bytes());
        let header = FileHeader::read(&data, 0).unwrap();
        assert_eq!(header.size, 0x20);
        assert_eq!(header.header_size, LARGE_HEADER_SIZE);

        // 0x43 includes the large-file bit but is not the exact pattern
        let data = header_bytes(0x07, 0x43, 0x18);
        let header = FileHeader::read(&data, 0).unwrap();
        assert_eq!(header.size, 0x18);
        assert_eq!(header.header_size, HEADER_SIZE);
    }

    #[test]
    fn rejects_bad_header_checksum() {
        let mut data = header_bytes(0x07, 0x00, 0x18);
        data[0x10] = data[0x10].wrapping_add(1);
        let header = FileHeader::read(&data, 0).unwrap();
        assert!(header.verify_checksums(&data, 0).is_err());
    }

    #[test]
    fn rejects_bad_fixed_marker() {
        let mut data = header_bytes(0x07, 0x00, 0x18);
        // The marker byte is cleared out of the header sum, so this only
        // trips the fixed-marker check
        data[0x11] = 0x12;
        let header = FileHeader::read(&data, 0).unwrap();
        assert!(header.verify_checksums(&data, 0).is_err());
    }

    #[test]
    fn validates_body_checksum_when_attributed() {
        let mut data = header_bytes(0x07, 0x40, 0x1C);
        data.extend_from_slice(b"BODY");
        let body_checksum = uefireader_core::data::checksum8(&data, HEADER_SIZE, 4).unwrap();
        data[0x11] = body_checksum;
        let header = FileHeader::read(&data, 0).unwrap();
        header.verify_checksums(&data, 0).unwrap();

        data[HEADER_SIZE] ^= 0xFF;
        assert!(header.verify_checksums(&data, 0).is_err());
    }
}
