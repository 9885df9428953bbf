//! Read and write Sparse Image Format (SIF) tiled raster files without any
//! unsafe code.
//!
//! A SIF file is a tiled, multi-band raster container. Tiles whose bands
//! are each a single repeated value ("uniform") are stored compactly in a
//! per-tile header instead of a full data block, which makes large
//! constant or mostly-empty regions of an image nearly free to store.
//!
//! The entry point is [`file::SifFile`]; see the [`prelude`] for the
//! common set of names most callers need.

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused,
    trivial_casts,
    trivial_numeric_casts
)]
#![deny(unused_variables, unused_must_use, unused_mut, unreachable_code, unused_imports, clippy::redundant_clone)]

pub mod block;
pub mod defragment;
pub mod error;
pub mod file;
pub mod header;
pub mod io;
pub mod math;
pub mod metadata;
pub mod raster;
pub mod slice;
pub mod tile;
pub mod uniformity;

/// Re-exports of the names most callers need, so `use sif::prelude::*;`
/// is usually enough.
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result, UnitResult};
    pub use crate::file::SifFile;
    pub use crate::header::{FORMAT_VERSION_1, FORMAT_VERSION_2, SUPPORTED_VERSION};
    pub use crate::io::DataEndian;
    pub use crate::metadata::{AGREEMENT_KEY, PROJECTION_KEY};
}
