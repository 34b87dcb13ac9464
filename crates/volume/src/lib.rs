//! Adds support for UEFI firmware volumes as found in Qualcomm XBL images:
//! parsing the volume/file/section container format, and re-emitting the
//! contents as an EDK-II style build description (per-module `.inf` files
//! plus the `DXE.inc`, `DXE.dsc.inc` and `APRIORI.inc` index lists).
//!
//! Parsing is strict: structural defects, checksum mismatches and unknown
//! type codes are all fatal. The one tolerated irregularity is a volume whose
//! declared size runs past the end of the input, which happens when images
//! are carved out of larger flash dumps.

pub mod error;
pub mod file;
pub mod image;
pub mod section;

mod emitter;

pub mod prelude;
