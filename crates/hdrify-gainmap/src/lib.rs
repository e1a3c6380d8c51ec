//! # hdrify-gainmap
//!
//! Ultra HDR / Adobe Gain Map encode-decode math plus the JPEG-R container
//! assembler and extractor.
//!
//! Three layers, in dependency order:
//!
//! - [`gainmap`] — the fixed-point encode/decode math relating a linear HDR
//!   image to an 8-bit sRGB base plus a log-domain gain map (component C8).
//! - [`icc`] / [`mpf`] / [`xmp`] — the three metadata formats a JPEG-R
//!   container carries: a default sRGB ICC profile, the CIPA DC-007
//!   Multi-Picture Format index, and the `hdrgm:`/`Container:Directory` XMP
//!   blocks.
//! - [`container`] — the assembler (component C9) and extractor
//!   (component C10) tying the three metadata formats and an external JPEG
//!   codec together into a single file.
//!
//! # Example
//!
//! ```rust,no_run
//! use hdrify_core::HdrifyImage;
//! use hdrify_core::colorspace::LinearColorSpace;
//! use hdrify_gainmap::{encode_gain_map, write_jpeg_gain_map, read_jpeg_gain_map};
//! use hdrify_gainmap::gainmap::GainMapOptions;
//! use hdrify_gainmap::container::JpegGainMapWriterOptions;
//!
//! fn reinhard(rgb: [f32; 3]) -> [f32; 3] {
//!     rgb.map(|c| c / (1.0 + c))
//! }
//!
//! let image = HdrifyImage::filled(4, 4, [2.0, 1.0, 0.5, 1.0], LinearColorSpace::Rec709);
//! let encoding = encode_gain_map(&image, &reinhard, &GainMapOptions::default()).unwrap();
//! let bytes = write_jpeg_gain_map(&encoding, &JpegGainMapWriterOptions::default()).unwrap();
//! let decoded = read_jpeg_gain_map(&bytes).unwrap();
//! assert_eq!(decoded.width, 4);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod container;
pub mod gainmap;
pub mod icc;
pub mod mpf;
pub mod xmp;

pub use container::{read_jpeg_gain_map, write_jpeg_gain_map, GainMapFormat, IccOption, JpegGainMapWriterOptions};
pub use gainmap::{decode_gain_map, encode_gain_map, GainMapDecodeOptions, GainMapOptions};
