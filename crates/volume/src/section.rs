//! Parsing for the sections stacked inside a firmware file.
//!
//! # Format
//! Every section starts with a four byte header, in little-endian format:
//!
//! | Offset | Field | Type | Notes |
//! |--------|-------|------|-------|
//! | 0x00 | Section size | u24 | Total size including the header. |
//! | 0x03 | Section type | u8  | One of [`SectionType`]; `0x00` and `0xFF` end the section chain. |
//!
//! GUID-defined sections (type 0x02) extend the header:
//!
//! | Offset | Field | Type | Notes |
//! |--------|-------|------|-------|
//! | 0x04 | Section GUID | u8\[16] | Selects the codec for the wrapped payload. |
//! | 0x14 | Data offset  | u16     | Start of the payload, relative to the section start. |
//!
//! The decompressed payload of a GUID-defined section is itself a section
//! chain and is re-parsed recursively, so compressed sub-volumes nest to any
//! depth the input encodes. Sections are 4-byte aligned relative to the base
//! of the stream that holds them.

use snafu::prelude::*;
use uefireader_core::{data, guid::Guid};
use uefireader_compress::{gzip, lzma};

use crate::error::{InvalidVolumeSnafu, Result, UnsupportedCompressionSnafu, UnsupportedSectionTypeSnafu};

/// GUID selecting LZMA decompression for a GUID-defined section.
pub const LZMA_SECTION_GUID: Guid = Guid::from_bytes([
    0x98, 0x58, 0x4E, 0xEE, 0x14, 0x39, 0x59, 0x42, 0x9D, 0x6E, 0xDC, 0x7B, 0xD7, 0x94, 0x03, 0xCF,
]);

/// Legacy GUID some build chains used for the same LZMA payloads.
pub const LZMA_LEGACY_SECTION_GUID: Guid = Guid::from_bytes([
    0xEA, 0x21, 0x99, 0xBD, 0x91, 0xED, 0x4A, 0x40, 0x8B, 0x2F, 0xB4, 0xD7, 0x24, 0x74, 0x7C, 0x8C,
]);

/// GUID selecting GZip decompression for a GUID-defined section.
pub const GZIP_SECTION_GUID: Guid = Guid::from_bytes([
    0xE9, 0x1F, 0x30, 0x1D, 0x79, 0xBE, 0x53, 0x43, 0x91, 0xC2, 0xD2, 0x3B, 0xC9, 0x59, 0xAE, 0x0C,
]);

/// On-wire section type codes handled by the reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum SectionType {
    GuidDefined = 0x02,
    Pe32 = 0x10,
    Pic = 0x11,
    Te = 0x12,
    DxeDepex = 0x13,
    Version = 0x14,
    UserInterface = 0x15,
    FirmwareVolumeImage = 0x17,
    FreeformSubtypeGuid = 0x18,
    Raw = 0x19,
    PeiDepex = 0x1B,
}

/// Kinds of section that survive into the parsed output. Version sections are
/// consumed silently, and GUID-defined wrappers dissolve into the sections of
/// their decompressed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    Pe32,
    Pic,
    Te,
    DxeDepex,
    Ui,
    Fv,
    Raw,
    PeiDepex,
}

impl SectionKind {
    /// The name written into generated module descriptions.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pe32 => "PE32",
            Self::Pic => "PIC",
            Self::Te => "TE",
            Self::DxeDepex => "DXE_DEPEX",
            Self::Ui => "UI",
            Self::Fv => "FV",
            Self::Raw => "RAW",
            Self::PeiDepex => "PEI_DEPEX",
        }
    }

    /// The file extension used when a section body is written out.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pe32 => "efi",
            Self::DxeDepex => "depex",
            Self::Pic => "pic",
            Self::Te => "te",
            Self::Ui => "ui",
            Self::Fv => "fv",
            Self::Raw => "raw",
            Self::PeiDepex => "pei_depex",
        }
    }

    /// Whether a section of this kind can carry build paths in its body.
    /// Dependency expressions, UI names and raw blobs never do.
    #[inline]
    #[must_use]
    pub fn carries_path(&self) -> bool {
        !matches!(self, Self::Ui | Self::DxeDepex | Self::Raw | Self::PeiDepex)
    }
}

/// A parsed section with its fully decompressed body.
#[derive(Debug)]
pub struct Section {
    kind: SectionKind,
    name: Option<String>,
    body: Vec<u8>,
}

impl Section {
    #[inline]
    pub(crate) fn new(kind: SectionKind, body: Vec<u8>) -> Self {
        Self { kind, name: None, body }
    }

    #[inline]
    pub(crate) fn named(kind: SectionKind, name: String, body: Vec<u8>) -> Self {
        Self { kind, name: Some(name), body }
    }

    /// Synthesizes the single raw section of a raw-kind file.
    #[inline]
    pub(crate) fn synthetic_raw(body: Vec<u8>) -> Self {
        Self::new(SectionKind::Raw, body)
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// The human-readable name, present only on UI sections.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Parses a section chain. `base` is the absolute offset of `data` in the
/// original image so alignment decisions survive slicing and decompression.
pub(crate) fn parse_sections(data: &[u8], base: usize) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let size = data::read_u24(data, offset)? as usize;
        let raw_type = data::read_u8(data, offset + 3)?;

        // End-of-list markers, also matched by erased (0xFF) or zeroed tails
        if matches!(raw_type, 0x00 | 0xFF) {
            break;
        }
        ensure!(size >= 4 && offset + size <= data.len(), InvalidVolumeSnafu);
        let body = &data[offset + 4..offset + size];

        match SectionType::try_from(raw_type) {
            Ok(SectionType::GuidDefined) => {
                sections.extend(parse_guid_defined(data, offset, size, base)?);
            }
            Ok(SectionType::Pe32) => {
                log::debug!("PE32 section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Pe32, body.to_vec()));
            }
            Ok(SectionType::Pic) => {
                log::debug!("PIC section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Pic, body.to_vec()));
            }
            Ok(SectionType::Te) => {
                log::debug!("TE section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Te, body.to_vec()));
            }
            Ok(SectionType::DxeDepex) => {
                log::debug!("DXE dependency expression ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::DxeDepex, body.to_vec()));
            }
            Ok(SectionType::Version) => {
                log::debug!("Version section skipped");
            }
            Ok(SectionType::UserInterface) => {
                let name = data::read_utf16(data, offset + 4, size - 4)?;
                let name = name.trim_end_matches(['\0', ' ']).to_string();
                log::debug!("UI section \"{name}\"");
                sections.push(Section::named(SectionKind::Ui, name, body.to_vec()));
            }
            Ok(SectionType::FirmwareVolumeImage) => {
                log::debug!("Nested firmware volume section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Fv, body.to_vec()));
            }
            Ok(SectionType::FreeformSubtypeGuid) => {
                log::debug!("Freeform subtype section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Raw, body.to_vec()));
            }
            Ok(SectionType::Raw) => {
                log::debug!("Raw section ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::Raw, body.to_vec()));
            }
            Ok(SectionType::PeiDepex) => {
                log::debug!("PEI dependency expression ({:#X} bytes)", body.len());
                sections.push(Section::new(SectionKind::PeiDepex, body.to_vec()));
            }
            Err(_) => {
                return UnsupportedSectionTypeSnafu { value: raw_type, offset: base + offset }
                    .fail();
            }
        }

        offset = data::align(base, offset + size, 4);
    }

    Ok(sections)
}

/// Decompresses a GUID-defined section and parses the sections inside it.
/// The recursion re-bases alignment on the absolute offset of the compressed
/// payload so inner streams align consistently.
fn parse_guid_defined(data: &[u8], offset: usize, size: usize, base: usize) -> Result<Vec<Section>> {
    let guid = data::read_guid(data, offset + 4)?;
    let data_offset = data::read_u16(data, offset + 0x14)? as usize;
    ensure!(data_offset >= 4 && data_offset <= size, InvalidVolumeSnafu);
    let payload = &data[offset + data_offset..offset + size];

    let decompressed = if guid == LZMA_SECTION_GUID || guid == LZMA_LEGACY_SECTION_GUID {
        log::debug!("LZMA-compressed section ({:#X} bytes packed)", payload.len());
        lzma::decompress_from(payload)?
    } else if guid == GZIP_SECTION_GUID {
        log::debug!("GZip-compressed section ({:#X} bytes packed)", payload.len());
        gzip::decompress_from(payload)?
    } else {
        return UnsupportedCompressionSnafu { guid }.fail();
    };

    parse_sections(&decompressed, base + offset + data_offset)
}
