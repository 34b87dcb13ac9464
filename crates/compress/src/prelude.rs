//! Convenient re-exports of commonly used data types, designed to make crate usage painless.
//!
//! The contents of this module can be used by including the following in any module:
//! ```
//! use uefireader_compress::prelude::*;
//! ```

pub mod gzip {
    pub use crate::gzip::{decompress_from, Error};
}

pub mod lzma {
    pub use crate::lzma::{decompress_from, Error, HEADER_SIZE, UNKNOWN_SIZE};
}
