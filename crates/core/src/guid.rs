//! UEFI-style GUID handling.
//!
//! GUIDs inside a firmware volume are stored in the UEFI mixed-endian layout:
//! the first three fields (time-low, time-mid, time-hi-and-version) are
//! little-endian, the clock-sequence and node fields are big-endian. A
//! [`Guid`] keeps the raw on-disk bytes so equality and hashing work on byte
//! identity, and only the string form performs the field swizzling.

use core::fmt;
use core::str::FromStr;

use snafu::prelude::*;

/// Error conditions for when parsing a GUID from text.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Thrown if the string is not hyphenated 8-4-4-4-12 hexadecimal.
    #[snafu(display("Invalid GUID String!"))]
    InvalidGuid,
}

/// A 128-bit GUID in its raw on-disk byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    /// Wraps 16 raw bytes as read from a volume.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw on-disk bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Guid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time_low = u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        let time_mid = u16::from_le_bytes([self.0[4], self.0[5]]);
        let time_hi = u16::from_le_bytes([self.0[6], self.0[7]]);
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            time_low,
            time_mid,
            time_hi,
            self.0[8],
            self.0[9],
            self.0[10],
            self.0[11],
            self.0[12],
            self.0[13],
            self.0[14],
            self.0[15]
        )
    }
}

impl fmt::Debug for Guid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl FromStr for Guid {
    type Err = Error;

    #[inline]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = value.split('-').collect();
        ensure!(groups.len() == 5, InvalidGuidSnafu);
        ensure!(
            groups[0].len() == 8
                && groups[1].len() == 4
                && groups[2].len() == 4
                && groups[3].len() == 4
                && groups[4].len() == 12,
            InvalidGuidSnafu
        );

        let time_low = u32::from_str_radix(groups[0], 16).map_err(|_| Error::InvalidGuid)?;
        let time_mid = u16::from_str_radix(groups[1], 16).map_err(|_| Error::InvalidGuid)?;
        let time_hi = u16::from_str_radix(groups[2], 16).map_err(|_| Error::InvalidGuid)?;

        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&time_low.to_le_bytes());
        bytes[4..6].copy_from_slice(&time_mid.to_le_bytes());
        bytes[6..8].copy_from_slice(&time_hi.to_le_bytes());
        for (index, pair) in groups[3].as_bytes().chunks_exact(2).enumerate() {
            // chunks_exact yields valid UTF-8 here since the group is ASCII hex or fails below
            let text = core::str::from_utf8(pair).map_err(|_| Error::InvalidGuid)?;
            bytes[8 + index] = u8::from_str_radix(text, 16).map_err(|_| Error::InvalidGuid)?;
        }
        for (index, pair) in groups[4].as_bytes().chunks_exact(2).enumerate() {
            let text = core::str::from_utf8(pair).map_err(|_| Error::InvalidGuid)?;
            bytes[10 + index] = u8::from_str_radix(text, 16).map_err(|_| Error::InvalidGuid)?;
        }

        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn formats_mixed_endian() {
        // The well-known DXE a-priori file GUID, as laid out on disk
        let guid = Guid::from_bytes([
            0xE7, 0x0E, 0x51, 0xFC, 0xDC, 0xFF, 0xD4, 0x11, 0xBD, 0x41, 0x00, 0x80, 0xC7, 0x3C,
            0x88, 0x81,
        ]);
        assert_eq!(guid.to_string(), "FC510EE7-FFDC-11D4-BD41-0080C73C8881");
    }

    #[test]
    fn parses_case_insensitively() {
        let upper: Guid = "EE4E5898-3914-4259-9D6E-DC7BD79403CF".parse().unwrap();
        let lower: Guid = "ee4e5898-3914-4259-9d6e-dc7bd79403cf".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(
            upper.as_bytes(),
            &[0x98, 0x58, 0x4E, 0xEE, 0x14, 0x39, 0x59, 0x42, 0x9D, 0x6E, 0xDC, 0x7B, 0xD7, 0x94,
                0x03, 0xCF]
        );
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("".parse::<Guid>().is_err());
        assert!("EE4E5898-3914-4259-9D6E".parse::<Guid>().is_err());
        assert!("EE4E5898-3914-4259-9D6E-DC7BD79403".parse::<Guid>().is_err());
        assert!("GG4E5898-3914-4259-9D6E-DC7BD79403CF".parse::<Guid>().is_err());
    }

    #[test]
    fn round_trips_random_bytes() {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        for _ in 0..10000 {
            let bytes: [u8; 16] = rng.gen();
            let guid = Guid::from_bytes(bytes);
            let parsed: Guid = guid.to_string().parse().unwrap();
            assert_eq!(parsed, guid);
        }
    }
}
