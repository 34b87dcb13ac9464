//! Parsing for whole UEFI firmware images.
//!
//! This module is designed to support both one-shot extraction and holding a
//! parsed image in memory for inspection.
//!
//! # Format
//! An image holds one firmware volume (more can be nested inside it as
//! firmware-volume-image files). A volume announces itself with the `_FVH`
//! signature 0x28 bytes into its header, in little-endian format:
//!
//! | Offset | Field | Type | Notes |
//! |--------|-------|------|-------|
//! | 0x20 | Volume size | u32    | Total volume length in bytes, header included. |
//! | 0x28 | Signature   | u8\[4] | Always `_FVH`. |
//! | 0x30 | Header size | u16    | Length of the volume header; the file chain starts right after. |
//! | 0x32 | Checksum    | u16    | 16-bit checksum over the header with this field cleared. |
//!
//! Qualcomm images additionally carry a build tag as the ASCII literal
//! `QC_IMAGE_VERSION_STRING=<id>` somewhere in the blob, which the extractor
//! uses to segregate output by firmware build.
//!
//! # Usage
//! A [`UefiImage`] can be created through [`open`](UefiImage::open), which
//! reads a file from disk, and [`load`](UefiImage::load), which parses the
//! provided bytes. [`extract`](UefiImage::extract) then writes the rebuild
//! description to a folder.

use std::path::Path;

use hashbrown::HashSet;
use snafu::prelude::*;
use uefireader_core::{data, guid::Guid};

use crate::emitter;
use crate::error::{Error, InvalidVolumeSnafu, Result, UnsupportedFileTypeSnafu};
use crate::file::{FileHeader, FileKind, FileType, FirmwareFile};
use crate::section::{self, Section, SectionKind};

/// Unique identifier that tells us if we're reading a firmware volume.
pub const SIGNATURE: [u8; 4] = *b"_FVH";

/// Distance of the signature from the start of the volume header.
const SIGNATURE_OFFSET: usize = 0x28;

/// Well-known GUID of the freeform file whose body is the DXE a-priori load
/// list.
pub const DXE_APRIORI_GUID: Guid = Guid::from_bytes([
    0xE7, 0x0E, 0x51, 0xFC, 0xDC, 0xFF, 0xD4, 0x11, 0xBD, 0x41, 0x00, 0x80, 0xC7, 0x3C, 0x88, 0x81,
]);

/// A fully parsed firmware image, ready for extraction.
pub struct UefiImage {
    files: Vec<FirmwareFile>,
    load_priority: HashSet<Guid>,
    build_id: String,
}

impl UefiImage {
    /// Reads a firmware image from disk and parses it.
    ///
    /// # Errors
    /// Returns [`Io`](Error::Io) if the file cannot be read, otherwise as
    /// [`load`](Self::load).
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        fn inner(path: &Path) -> Result<UefiImage> {
            let data = std::fs::read(path)?;
            UefiImage::load(&data)
        }
        inner(path.as_ref())
    }

    /// Parses a firmware image already in memory. The outermost volume is
    /// located by searching the whole buffer for the `_FVH` signature; the
    /// first match wins.
    ///
    /// # Errors
    /// Returns [`InvalidVolume`](Error::InvalidVolume) if no volume header
    /// exists, or whichever structural error the decoder runs into.
    pub fn load(data: &[u8]) -> Result<Self> {
        let signature = data::find_ascii(data, &SIGNATURE).ok_or(Error::InvalidVolume)?;
        ensure!(signature >= SIGNATURE_OFFSET, InvalidVolumeSnafu);

        let mut image =
            Self { files: Vec::new(), load_priority: HashSet::new(), build_id: String::new() };
        image.files = image.parse_volume(data, signature - SIGNATURE_OFFSET)?;
        image.build_id = emitter::find_build_id(data).unwrap_or_default();

        Ok(image)
    }

    /// Writes the rebuild description for this image under `output`, or under
    /// `output/<build id>` when the image carries a Qualcomm build tag.
    ///
    /// # Errors
    /// Returns [`FileConflict`](Error::FileConflict) if a module artifact
    /// already exists, [`MultipleUiSections`](Error::MultipleUiSections) if a
    /// file breaks the single-UI invariant, or [`Io`](Error::Io) on any
    /// filesystem failure.
    #[inline]
    pub fn extract<P: AsRef<Path>>(&self, output: P) -> Result<()> {
        emitter::extract(self, output.as_ref())
    }

    /// All firmware files in the image, outermost volume first, nested
    /// volumes spliced in the order they were encountered.
    #[inline]
    #[must_use]
    pub fn files(&self) -> &[FirmwareFile] {
        &self.files
    }

    /// GUIDs listed in the DXE a-priori file. May reference files that never
    /// appear in the image.
    #[inline]
    #[must_use]
    pub fn load_priority(&self) -> &HashSet<Guid> {
        &self.load_priority
    }

    /// The Qualcomm build tag, or an empty string when the image has none.
    #[inline]
    #[must_use]
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Parses one volume whose header starts at `offset`, returning the files
    /// it holds. Nested volume images re-enter here with their own buffer.
    fn parse_volume(&mut self, data: &[u8], offset: usize) -> Result<Vec<FirmwareFile>> {
        let magic = data::read_ascii(data, offset + SIGNATURE_OFFSET, 4)
            .map_err(|_| Error::InvalidVolume)?;
        ensure!(magic.as_bytes() == SIGNATURE, InvalidVolumeSnafu);
        verify_volume_checksum(data, offset)?;

        let volume_size = data::read_u32(data, offset + 0x20)? as usize;
        let header_size = data::read_u16(data, offset + 0x30)? as usize;
        ensure!(header_size >= 0x34 && header_size <= volume_size, InvalidVolumeSnafu);

        let first_file = offset + header_size;
        let mut end = offset + volume_size;
        if end > data.len() {
            log::warn!(
                "Volume at {offset:#X} is {:#X} bytes short, parsing what is present",
                end - data.len()
            );
            end = data.len();
        }
        ensure!(first_file <= end, InvalidVolumeSnafu);

        self.parse_files(&data[first_file..end], first_file)
    }

    /// Walks the file chain of one volume. `base` is the absolute offset of
    /// `data` in the original image, which the 8-byte alignment runs against.
    fn parse_files(&mut self, data: &[u8], base: usize) -> Result<Vec<FirmwareFile>> {
        let mut files = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            // A partial header can only be leftover tail space
            if offset + crate::file::HEADER_SIZE > data.len() {
                break;
            }
            let header = FileHeader::read(data, offset)?;

            // Zero sizes, truncated files and the end-of-chain type codes all
            // mean there is nothing further to parse
            if header.size == 0 || offset + header.size > data.len() {
                break;
            }
            if matches!(header.file_type, 0x00 | 0xFF) {
                break;
            }
            header.verify_checksums(data, offset)?;

            let body = &data[offset + header.header_size..offset + header.size];
            let body_base = base + offset + header.header_size;

            match FileType::try_from(header.file_type) {
                Ok(FileType::Raw) => {
                    log::debug!("Raw file {}", header.guid);
                    files.push(FirmwareFile {
                        guid: header.guid,
                        kind: FileKind::Raw,
                        sections: vec![Section::synthetic_raw(body.to_vec())],
                    });
                }
                Ok(FileType::Freeform) => {
                    let sections = section::parse_sections(body, body_base)?;
                    if header.guid == DXE_APRIORI_GUID {
                        log::debug!("DXE a-priori list {}", header.guid);
                        self.ingest_apriori(&sections);
                    } else {
                        log::debug!("Freeform file {}", header.guid);
                        files.push(FirmwareFile {
                            guid: header.guid,
                            kind: FileKind::Freeform,
                            sections,
                        });
                    }
                }
                Ok(FileType::SecurityCore) => {
                    log::debug!("Security core {}", header.guid);
                    let sections = section::parse_sections(body, body_base)?;
                    files.push(FirmwareFile {
                        guid: header.guid,
                        kind: FileKind::SecurityCore,
                        sections,
                    });
                }
                Ok(FileType::DxeCore) => {
                    log::debug!("DXE core {}", header.guid);
                    let sections = section::parse_sections(body, body_base)?;
                    files.push(FirmwareFile {
                        guid: header.guid,
                        kind: FileKind::DxeCore,
                        sections,
                    });
                }
                Ok(FileType::Driver) => {
                    log::debug!("Driver {}", header.guid);
                    let sections = section::parse_sections(body, body_base)?;
                    files.push(FirmwareFile {
                        guid: header.guid,
                        kind: FileKind::Driver,
                        sections,
                    });
                }
                Ok(FileType::Application) => {
                    log::debug!("Application {}", header.guid);
                    let sections = section::parse_sections(body, body_base)?;
                    files.push(FirmwareFile {
                        guid: header.guid,
                        kind: FileKind::Application,
                        sections,
                    });
                }
                Ok(FileType::FirmwareVolumeImage) => {
                    log::debug!("Nested volume image {}", header.guid);
                    let sections = section::parse_sections(body, body_base)?;
                    for section in &sections {
                        if section.kind() == SectionKind::Fv {
                            files.extend(self.parse_volume(section.body(), 0)?);
                        }
                    }
                }
                Ok(FileType::FfsPad) => {
                    log::debug!("Padding file skipped");
                }
                Err(_) => {
                    return UnsupportedFileTypeSnafu {
                        value: header.file_type,
                        offset: base + offset,
                    }
                    .fail();
                }
            }

            offset = data::align(base, offset + header.size, 8);
        }

        Ok(files)
    }

    /// Records the GUIDs packed into the first raw section of the a-priori
    /// file. Anything else in the file is ignored, like the original tooling
    /// does.
    fn ingest_apriori(&mut self, sections: &[Section]) {
        let Some(first) = sections.first() else { return };
        if first.kind() != SectionKind::Raw {
            return;
        }
        for chunk in first.body().chunks_exact(16) {
            // chunks_exact always yields 16 bytes, so the conversion cannot fail
            let guid = Guid::from_bytes(chunk.try_into().unwrap());
            log::debug!("A-priori entry {guid}");
            self.load_priority.insert(guid);
        }
    }
}

/// Validates the 16-bit header checksum of the volume starting at `offset`.
fn verify_volume_checksum(data: &[u8], offset: usize) -> Result<()> {
    let header_size = data::read_u16(data, offset + 0x30)? as usize;
    let mut scratch =
        data.get(offset..offset + header_size).ok_or(Error::InvalidVolume)?.to_vec();
    ensure!(scratch.len() >= 0x34, InvalidVolumeSnafu);
    scratch[0x32] = 0;
    scratch[0x33] = 0;

    let stored = data::read_u16(data, offset + 0x32)?;
    let expected = data::checksum16(&scratch, 0, scratch.len())?;
    ensure!(stored == expected, crate::error::ChecksumFailedSnafu { offset });

    Ok(())
}
