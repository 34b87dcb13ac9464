//! Adds support for the LZMA1 payload format used by GUID-defined firmware
//! sections.
//!
//! Because the payloads are small one-shot blobs, this module is designed to
//! not have any persistence. It takes in data and returns the decompressed
//! bytes contained inside.
//!
//! # Format
//! The payload is a classic `.lzma` ("alone") stream, in little-endian format:
//!
//! | Offset | Field | Type | Notes |
//! |--------|-------|------|-------|
//! | 0x0 | Properties        | u8\[5] | `props[0]` packs the literal/position parameters (`lc = props[0] % 9`, `lp = (props[0] / 9) % 5`, `pb = props[0] / 45`); `props[1..5]` is the dictionary size. |
//! | 0x5 | Uncompressed size | u64    | Size of the decompressed data. All-ones ([`UNKNOWN_SIZE`]) means the stream runs until its end marker. |
//! | 0xD | Bitstream         | u8\[..]| The LZMA1 range-coded data. |
//!
//! A stream may emit more bytes than the header declares; the declared size
//! wins and the output is truncated to it.
//!
//! # Usage
//! * [`decompress_from`]: Provide the payload, get decompressed data back

use std::io::Cursor;

use lzma_rs::decompress::{Options, UnpackedSize};
use snafu::prelude::*;

/// Error conditions for when decoding LZMA payloads.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Thrown if the payload is too short to hold the properties header.
    #[snafu(display("Unexpected End-Of-File!"))]
    EndOfFile,
    /// Thrown if the declared uncompressed size is implausibly large for the
    /// input, which points at a corrupt header rather than real data.
    #[snafu(display("Invalid Size! Declared {declared:#X} bytes from a {input:#X} byte payload."))]
    InvalidSize { declared: u64, input: usize },
    /// Thrown if the LZMA bitstream fails to decode.
    #[snafu(display("Unable to decode the LZMA bitstream!"))]
    DecompressFailed,
}
type Result<T> = core::result::Result<T, Error>;

/// Size of the properties + uncompressed-size header preceding the bitstream.
pub const HEADER_SIZE: usize = 0xD;

/// Header value meaning the uncompressed size is unknown and the stream runs
/// until its end marker.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

/// Largest allowed expansion factor over the compressed input.
const MAX_EXPANSION: u64 = 256;

/// Decompresses an LZMA1 payload and returns the decompressed data.
///
/// # Errors
/// Returns:
/// * [`EndOfFile`](Error::EndOfFile) if the payload cannot hold the header
/// * [`InvalidSize`](Error::InvalidSize) if the declared size fails the
///   expansion guard
/// * [`DecompressFailed`](Error::DecompressFailed) if the bitstream is invalid
#[inline]
pub fn decompress_from(data: &[u8]) -> Result<Box<[u8]>> {
    ensure!(data.len() >= HEADER_SIZE, EndOfFileSnafu);

    // The size field tells us how much to expect, and lets us refuse streams
    // that claim to blow up far past anything a real volume contains
    let declared = u64::from_le_bytes(data[5..HEADER_SIZE].try_into().unwrap());
    let mut output = match declared {
        UNKNOWN_SIZE => Vec::new(),
        _ => {
            let limit = (data.len() as u64).saturating_mul(MAX_EXPANSION);
            ensure!(declared <= limit, InvalidSizeSnafu { declared, input: data.len() });
            Vec::with_capacity(declared as usize)
        }
    };

    let options = Options {
        unpacked_size: UnpackedSize::ReadFromHeader,
        memlimit: None,
        allow_incomplete: false,
    };
    lzma_rs::lzma_decompress_with_options(&mut Cursor::new(data), &mut output, &options)
        .map_err(|_| Error::DecompressFailed)?;

    // Streams with an end marker can run past the declared size
    if declared != UNKNOWN_SIZE && output.len() > declared as usize {
        output.truncate(declared as usize);
    }

    Ok(output.into_boxed_slice())
}
