//! # hdrify
//!
//! A pure-runtime HDR image library: no file I/O, no CLI, no persisted
//! state. Every reader takes an owned byte buffer and returns an owned
//! [`HdrifyImage`]; every writer takes an [`HdrifyImage`] (or, for the
//! gain-map path, an [`EncodingResult`]) and returns an owned byte buffer.
//!
//! Three independent format engines, each its own crate and each gated by
//! a matching Cargo feature (all three enabled by default):
//!
//! - [`exr`] ([`hdrify_exr`]) — single-part scanline OpenEXR, RLE/ZIP/ZIPS/
//!   PIZ/PXR24 compression.
//! - [`hdr`] ([`hdrify_hdr`]) — Radiance HDR (RGBE), adaptive-RLE and flat
//!   scanlines.
//! - [`gainmap`] ([`hdrify_gainmap`]) — Ultra HDR / Adobe Gain Map JPEG:
//!   the encode/decode math plus the JPEG-R container assembler/extractor.
//!
//! [`hdrify_core`] supplies the shared [`HdrifyImage`]/[`LinearColorSpace`]/
//! [`Error`] types every engine reads from and writes to; it is always
//! available regardless of which format features are enabled.
//!
//! # Example
//!
//! ```rust,no_run
//! use hdrify::{read_hdr, write_exr};
//! use hdrify::exr::ExrWriterOptions;
//! use hdrify::hdr::HdrReaderOptions;
//!
//! let bytes = std::fs::read("scene.hdr").unwrap();
//! let image = read_hdr(&bytes, &HdrReaderOptions::default()).unwrap();
//! let exr_bytes = write_exr(&image, &ExrWriterOptions::default()).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub use hdrify_core::colorspace::{Chromaticities, LinearColorSpace};
pub use hdrify_core::error::{Error, Result};
pub use hdrify_core::image::{EncodingResult, GainMapMetadata, HdrifyImage, Metadata, Triplet};

#[cfg(feature = "exr")]
pub use hdrify_exr as exr;
#[cfg(feature = "exr")]
pub use hdrify_exr::{read_exr, write_exr, ExrWriterOptions};

#[cfg(feature = "hdr")]
pub use hdrify_hdr as hdr;
#[cfg(feature = "hdr")]
pub use hdrify_hdr::{read_hdr, write_hdr, write_hdr_with_options, HdrReaderOptions, HdrWriterOptions, RadianceOutput};

#[cfg(feature = "gainmap")]
pub use hdrify_gainmap as gainmap;
#[cfg(feature = "gainmap")]
pub use hdrify_gainmap::{
    encode_gain_map, read_jpeg_gain_map, write_jpeg_gain_map, GainMapDecodeOptions, GainMapFormat, GainMapOptions,
    IccOption, JpegGainMapWriterOptions,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exr_and_hdr_round_trip_through_the_facade() {
        let image = HdrifyImage::filled(3, 3, [0.4, 0.6, 0.8, 1.0], LinearColorSpace::Rec709);

        let exr_bytes = write_exr(&image, &ExrWriterOptions::default()).unwrap();
        let decoded_exr = read_exr(&exr_bytes).unwrap();
        assert_eq!(decoded_exr.width, 3);

        let hdr_bytes = write_hdr(&image).unwrap();
        let decoded_hdr = read_hdr(&hdr_bytes, &HdrReaderOptions::default()).unwrap();
        assert_eq!(decoded_hdr.width, 3);
    }

    #[test]
    fn gain_map_round_trips_through_the_facade() {
        let image = HdrifyImage::filled(4, 4, [2.0, 1.5, 1.0, 1.0], LinearColorSpace::Rec709);
        let encoding =
            encode_gain_map(&image, &|rgb: [f32; 3]| rgb.map(|c| c.clamp(0.0, 1.0)), &GainMapOptions::default())
                .unwrap();
        let bytes = write_jpeg_gain_map(&encoding, &JpegGainMapWriterOptions::default()).unwrap();
        let decoded = read_jpeg_gain_map(&bytes).unwrap();
        assert_eq!(decoded.width, 4);
        assert_eq!(decoded.height, 4);
    }
}
