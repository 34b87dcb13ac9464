//! Convenient re-exports of commonly used data types, designed to make crate usage painless.
//!
//! For example, you can refer to [`Guid`] directly, but you have to use [`guid::Error`].
//!
//! The contents of this module can be used by including the following in any module:
//! ```
//! use uefireader_core::prelude::*;
//! ```

#[doc(inline)]
pub use crate::guid::Guid;

/// Contains [`data::Error`], which is used in Results returned by the byte readers
pub mod data {
    pub use crate::data::Error;
}

pub mod guid {
    pub use crate::guid::Error;
}

#[cfg(feature = "time")]
pub mod time {
    pub use crate::time::*;
}
