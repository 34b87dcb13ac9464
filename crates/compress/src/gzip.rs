//! Adds support for the GZip payload format used by GUID-defined firmware
//! sections.
//!
//! GZip payloads are complete `.gz` streams including their own header and
//! CRC, so this module is a thin wrapper that inflates a slice in one shot.
//!
//! # Usage
//! * [`decompress_from`]: Provide the payload, get decompressed data back

use std::io::Read;

use flate2::read::GzDecoder;
use snafu::prelude::*;

/// Error conditions for when decoding GZip payloads.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Thrown if the stream is not valid GZip data.
    #[snafu(display("Unable to decode the GZip stream! {source}"))]
    DecompressFailed { source: std::io::Error },
}
type Result<T> = core::result::Result<T, Error>;

/// Decompresses a GZip payload and returns the decompressed data.
///
/// # Errors
/// Returns [`DecompressFailed`](Error::DecompressFailed) if the payload is not
/// a valid GZip stream.
#[inline]
pub fn decompress_from(data: &[u8]) -> Result<Box<[u8]>> {
    let mut output = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut output)
        .context(DecompressFailedSnafu)?;
    Ok(output.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    #[test]
    fn round_trips() {
        let input: Vec<u8> = (0..50_000u32).map(|n| (n % 239) as u8).collect();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&input).unwrap();
        let compressed = encoder.finish().unwrap();

        let output = decompress_from(&compressed).unwrap();
        assert_eq!(*output, *input);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decompress_from(b"definitely not gzip"),
            Err(Error::DecompressFailed { .. })
        ));
    }
}
