//! Convenient re-exports of commonly used data types, designed to make crate usage painless.
//!
//! For example, you can refer to [`UefiImage`] directly, but you have to use
//! [`image::DXE_APRIORI_GUID`].
//!
//! The contents of this module can be used by including the following in any module:
//! ```
//! use uefireader_volume::prelude::*;
//! ```

#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::file::{FileKind, FirmwareFile};
#[doc(inline)]
pub use crate::image::UefiImage;
#[doc(inline)]
pub use crate::section::{Section, SectionKind};

pub mod image {
    pub use crate::image::{DXE_APRIORI_GUID, SIGNATURE};
}

pub mod section {
    pub use crate::section::{
        GZIP_SECTION_GUID, LZMA_LEGACY_SECTION_GUID, LZMA_SECTION_GUID, SectionType,
    };
}

pub mod file {
    pub use crate::file::{FileAttributes, FileType};
}
