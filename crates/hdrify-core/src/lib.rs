//! # hdrify-core
//!
//! The shared linear-RGBA float image model, error kinds, and low-level
//! codec primitives every `hdrify` format crate builds on:
//!
//! - [`image::HdrifyImage`] — the canonical in-memory image.
//! - [`image::GainMapMetadata`], [`image::EncodingResult`] — gain-map data model.
//! - [`colorspace::LinearColorSpace`], [`colorspace::Chromaticities`] — the three
//!   supported linear working spaces.
//! - [`error::Error`] — the failure classes shared by every reader/writer.
//! - [`half::encode_half`] / [`half::decode_half`] — IEEE-754 binary16 conversion.
//! - [`bits::ByteReader`]/[`bits::ByteWriter`]/[`bits::BitReader`]/[`bits::BitWriter`] —
//!   little-endian byte streams and the Huffman bit stream.
//!
//! # Crate structure
//!
//! ```text
//! hdrify-core (this crate)
//!    ^
//!    +-- hdrify-color   (chromaticity matrices, built on hdrify-math)
//!    +-- hdrify-transfer (sRGB transfer function)
//!    +-- hdrify-exr     (EXR read/write engine)
//!    +-- hdrify-hdr     (Radiance HDR/RGBE read/write engine)
//!    +-- hdrify-gainmap (Ultra HDR gain-map encode/decode + JPEG container)
//!    +-- hdrify         (facade re-exporting the public API)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bits;
pub mod colorspace;
pub mod error;
pub mod half;
pub mod image;

pub use colorspace::{Chromaticities, LinearColorSpace};
pub use error::{Error, Result};
pub use image::{EncodingResult, GainMapMetadata, HdrifyImage, Metadata, Triplet};

/// Prelude module for convenient imports.
///
/// ```rust
/// use hdrify_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bits::{BitReader, BitWriter, ByteReader, ByteWriter};
    pub use crate::colorspace::{Chromaticities, LinearColorSpace};
    pub use crate::error::{Error, Result};
    pub use crate::half::{decode_half, encode_half};
    pub use crate::image::{EncodingResult, GainMapMetadata, HdrifyImage, Metadata, Triplet};
}
