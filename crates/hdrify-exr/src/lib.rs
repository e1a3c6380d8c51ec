//! # hdrify-exr
//!
//! Single-part scanline OpenEXR read/write engine.
//!
//! Three layers, in dependency order:
//!
//! - [`header`] — magic/version validation and attribute codec (component C5).
//! - [`compression`] — the five compression kernels: predictor/reorder, RLE,
//!   ZIP/ZIPS, PIZ, and PXR24 (component C6).
//! - [`scanline`] — the block engine tying the two together: offset-table
//!   construction/parsing and channel-name-to-RGBA mapping (component C7).
//!
//! # Example
//!
//! ```rust,no_run
//! use hdrify_core::HdrifyImage;
//! use hdrify_core::colorspace::LinearColorSpace;
//! use hdrify_exr::{write_exr, read_exr, ExrWriterOptions};
//! use hdrify_exr::header::Compression;
//!
//! let image = HdrifyImage::filled(4, 4, [0.2, 0.4, 0.8, 1.0], LinearColorSpace::Rec709);
//! let bytes = write_exr(&image, &ExrWriterOptions { compression: Compression::Piz }).unwrap();
//! let round_tripped = read_exr(&bytes).unwrap();
//! assert_eq!(round_tripped.width, 4);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod compression;
pub mod header;
pub mod scanline;

use hdrify_core::{Error, HdrifyImage, Result};

use header::{Box2i, Channel, Compression, ExrHeader};

/// Options accepted by [`write_exr`].
///
/// Mirrors the single knob the format specification exposes for writing:
/// the compression method. Every other header attribute (display/data
/// window, channel list, chromaticities, line order, screen window) is
/// derived from the image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExrWriterOptions {
    /// Compression method to encode every scan-line block with.
    pub compression: Compression,
}

impl Default for ExrWriterOptions {
    /// `ZIP`, a reasonable general-purpose default (16 scan lines per
    /// block, deflate) matching what most OpenEXR writers default to.
    fn default() -> Self {
        Self { compression: Compression::Zip }
    }
}

/// Reads a single-part scanline OpenEXR image from `bytes`.
///
/// # Errors
///
/// Returns [`Error::InvalidMagic`] for a bad magic number,
/// [`Error::UnsupportedVariant`] for multi-part/tiled/deep files or an
/// unsupported compression byte, [`Error::MalformedHeader`] for missing
/// required attributes, [`Error::Truncated`] for any buffer that ends
/// early, and [`Error::ChannelMismatch`] when the channel list lacks R, G,
/// or B.
pub fn read_exr(bytes: &[u8]) -> Result<HdrifyImage> {
    let (header, header_end) = header::read_header(bytes)?;
    tracing::debug!(
        width = header.data_window.width(),
        height = header.data_window.height(),
        compression = ?header.compression,
        "decoding EXR scan-line body"
    );
    scanline::read_body(&header, bytes, header_end)
}

/// Writes `image` as a single-part scanline OpenEXR file.
///
/// # Errors
///
/// Returns [`Error::ChannelMismatch`] if `image`'s color space cannot be
/// classified into any declared channel role (this should not happen for a
/// well-formed [`HdrifyImage`]).
pub fn write_exr(image: &HdrifyImage, options: &ExrWriterOptions) -> Result<Vec<u8>> {
    if image.width == 0 || image.height == 0 {
        return Err(Error::other("cannot write an EXR with a zero dimension"));
    }
    let pixel_type = options.compression.channel_pixel_type();
    let channels = vec![
        Channel { name: "A".into(), pixel_type, p_linear: false, x_sampling: 1, y_sampling: 1 },
        Channel { name: "B".into(), pixel_type, p_linear: false, x_sampling: 1, y_sampling: 1 },
        Channel { name: "G".into(), pixel_type, p_linear: false, x_sampling: 1, y_sampling: 1 },
        Channel { name: "R".into(), pixel_type, p_linear: false, x_sampling: 1, y_sampling: 1 },
    ];
    let window = Box2i {
        x_min: 0,
        y_min: 0,
        x_max: image.width as i32 - 1,
        y_max: image.height as i32 - 1,
    };
    let header = ExrHeader {
        display_window: window,
        data_window: window,
        channels,
        compression: options.compression,
        chromaticities: Some(image.color_space.chromaticities()),
        line_order: 0,
        pixel_aspect_ratio: 1.0,
        screen_window_center: (0.0, 0.0),
        screen_window_width: 1.0,
    };

    tracing::debug!(
        width = image.width,
        height = image.height,
        compression = ?options.compression,
        "encoding EXR scan-line body"
    );

    let header_bytes = header::write_header(&header);
    let body = scanline::write_body(&header, image, header_bytes.len())?;
    let mut out = header_bytes;
    out.extend(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdrify_core::colorspace::LinearColorSpace;
    use hdrify_core::HdrifyImage;

    fn checker(width: u32, height: u32) -> HdrifyImage {
        let mut img = HdrifyImage::filled(width, height, [0.0, 0.0, 0.0, 1.0], LinearColorSpace::Rec709);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 1.0 } else { 0.1 };
                img.set_pixel(x, y, [v, v * 0.5, v * 0.25, 1.0]);
            }
        }
        img
    }

    #[test]
    fn round_trips_default_options() {
        let image = checker(9, 7);
        let bytes = write_exr(&image, &ExrWriterOptions::default()).unwrap();
        let decoded = read_exr(&bytes).unwrap();
        assert_eq!(decoded.width, 9);
        assert_eq!(decoded.height, 7);
        for (a, b) in image.data.iter().zip(decoded.data.iter()) {
            assert!((a - b).abs() <= 0.01, "{a} vs {b}");
        }
    }

    #[test]
    fn round_trips_every_compression_method() {
        for compression in [
            Compression::None,
            Compression::Rle,
            Compression::Zips,
            Compression::Zip,
            Compression::Piz,
            Compression::Pxr24,
        ] {
            let image = checker(5, 11);
            let bytes = write_exr(&image, &ExrWriterOptions { compression }).unwrap();
            let decoded = read_exr(&bytes).unwrap();
            for (a, b) in image.data.iter().zip(decoded.data.iter()) {
                assert!((a - b).abs() <= 0.01, "{compression:?}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn preserves_color_space_round_trip() {
        let image = HdrifyImage::filled(3, 3, [0.5, 0.5, 0.5, 1.0], LinearColorSpace::P3);
        let bytes = write_exr(&image, &ExrWriterOptions::default()).unwrap();
        let decoded = read_exr(&bytes).unwrap();
        assert_eq!(decoded.color_space, LinearColorSpace::P3);
    }

    #[test]
    fn rejects_zero_dimension() {
        let image = HdrifyImage::filled(1, 1, [0.0, 0.0, 0.0, 1.0], LinearColorSpace::Rec709);
        let mut zeroed = image.clone();
        zeroed.width = 0;
        assert!(write_exr(&zeroed, &ExrWriterOptions::default()).is_err());
    }

    #[test]
    fn invalid_magic_is_rejected() {
        assert!(read_exr(b"not an exr").is_err());
    }
}
