//! # hdrify-hdr
//!
//! Radiance HDR (RGBE) read/write engine.
//!
//! - [`header`] — the ASCII `#?RADIANCE` header codec (component C4, header
//!   half): `FORMAT=`/`EXPOSURE=`/`GAMMA=` parsing, cumulative exposure, and
//!   the `-Y H +X W` resolution line.
//! - [`rle`] — the adaptive and legacy RGBE scanline codec (component C4,
//!   pixel half).
//!
//! This module wires the two together with RGBE<->linear-float conversion
//! and the public [`read_hdr`]/[`write_hdr`] entry points.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod header;
pub mod rle;

use hdrify_core::colorspace::LinearColorSpace;
use hdrify_core::{Error, HdrifyImage, Result};

use header::RadianceHeader;

/// Which domain [`read_hdr`] should return linear values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RadianceOutput {
    /// Values straight out of the RGBE conversion, unscaled by exposure.
    #[default]
    Raw,
    /// Divides RGB by the header's cumulative exposure, recovering absolute
    /// scene radiance (only meaningful when the file actually carries an
    /// `EXPOSURE=` attribute other than 1).
    PhysicalRadiance,
}

/// Options accepted by [`read_hdr`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrReaderOptions {
    /// When `true` (the default), the first header line must be exactly
    /// `#?RADIANCE`. Set `false` to accept any `#?PROGRAMTYPE` line.
    pub header_strict: bool,
    /// Which domain to return linear values in.
    pub output: RadianceOutput,
}

impl Default for HdrReaderOptions {
    fn default() -> Self {
        Self {
            header_strict: true,
            output: RadianceOutput::Raw,
        }
    }
}

/// Options accepted by [`write_hdr_with_options`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrWriterOptions {
    /// Use adaptive RLE when the scanline width allows it. Default `true`;
    /// RLE is smaller for all but pathologically noisy content.
    pub use_rle: bool,
}

impl Default for HdrWriterOptions {
    fn default() -> Self {
        Self { use_rle: true }
    }
}

fn rgbe_to_linear(r: u8, g: u8, b: u8, e: u8) -> [f32; 3] {
    if e == 0 {
        return [0.0, 0.0, 0.0];
    }
    let scale = 2f32.powi(e as i32 - 128) / 255.0;
    [r as f32 * scale, g as f32 * scale, b as f32 * scale]
}

/// Extracts mantissa and base-2 exponent such that `x == mantissa *
/// 2^exponent` with `mantissa` in `[0.5, 1)`, mirroring C's `frexp`.
fn frexp(x: f32) -> (f32, i32) {
    if x == 0.0 || !x.is_finite() {
        return (0.0, 0);
    }
    let bits = x.to_bits();
    let exponent_bits = ((bits >> 23) & 0xFF) as i32;
    if exponent_bits == 0 {
        // subnormal: normalize by hand.
        let normalized = x * 2f32.powi(32);
        let (m, e) = frexp(normalized);
        return (m, e - 32);
    }
    let exponent = exponent_bits - 126;
    let mantissa = x / 2f32.powi(exponent);
    (mantissa, exponent)
}

fn linear_to_rgbe(r: f32, g: f32, b: f32) -> [u8; 4] {
    let r = r.max(0.0);
    let g = g.max(0.0);
    let b = b.max(0.0);
    let max = r.max(g).max(b);
    if max < 1e-32 {
        return [0, 0, 0, 0];
    }
    let (mantissa, exponent) = frexp(max);
    let scale = mantissa * 256.0 / max;
    [
        (r * scale).clamp(0.0, 255.0) as u8,
        (g * scale).clamp(0.0, 255.0) as u8,
        (b * scale).clamp(0.0, 255.0) as u8,
        (exponent + 128) as u8,
    ]
}

/// Reads a Radiance HDR (RGBE) image from `bytes`.
///
/// # Errors
///
/// Returns [`Error::InvalidMagic`] for a missing/wrong `#?` program line,
/// [`Error::MalformedHeader`] for a missing `FORMAT=` or invalid `EXPOSURE=`,
/// [`Error::UnsupportedVariant`] for XYZE-encoded files or a non-`-Y H +X W`
/// resolution line, and [`Error::DecodeFault`]/[`Error::Truncated`] for a
/// corrupt or short pixel stream.
pub fn read_hdr(bytes: &[u8], options: &HdrReaderOptions) -> Result<HdrifyImage> {
    let (header, pixel_offset) = header::parse_header(bytes, options.header_strict)?;
    tracing::debug!(
        width = header.width,
        height = header.height,
        exposure = header.exposure,
        "decoding Radiance HDR pixel data"
    );

    let width = header.width as usize;
    let height = header.height as usize;
    let rgbe = rle::decode_pixels(&bytes[pixel_offset..], width, height)?;

    let mut data = Vec::with_capacity(width * height * 4);
    let divide_by_exposure =
        options.output == RadianceOutput::PhysicalRadiance && header.exposure != 1.0;
    for chunk in rgbe.chunks_exact(4) {
        let mut rgb = rgbe_to_linear(chunk[0], chunk[1], chunk[2], chunk[3]);
        if divide_by_exposure {
            for c in &mut rgb {
                *c /= header.exposure;
            }
        }
        data.extend_from_slice(&rgb);
        data.push(1.0);
    }

    let mut image = HdrifyImage::new(header.width, header.height, data, LinearColorSpace::Rec709)?;
    image.metadata.insert("FORMAT".to_string(), header.format.clone());
    image
        .metadata
        .insert("EXPOSURE".to_string(), header.exposure.to_string());
    if let Some(gamma) = header.gamma {
        image.metadata.insert("GAMMA".to_string(), gamma.to_string());
    }
    for (key, value) in header.metadata {
        image.metadata.entry(key).or_insert(value);
    }
    Ok(image)
}

/// Writes `image` as a Radiance HDR (RGBE) file using the default writer
/// options (adaptive RLE where eligible).
pub fn write_hdr(image: &HdrifyImage) -> Result<Vec<u8>> {
    write_hdr_with_options(image, &HdrWriterOptions::default())
}

/// Writes `image` as a Radiance HDR (RGBE) file.
///
/// # Errors
///
/// Returns an error if `image` has a zero dimension.
pub fn write_hdr_with_options(image: &HdrifyImage, options: &HdrWriterOptions) -> Result<Vec<u8>> {
    if image.width == 0 || image.height == 0 {
        return Err(Error::other("cannot write an HDR image with a zero dimension"));
    }
    let width = image.width as usize;
    let height = image.height as usize;

    let mut rgbe = Vec::with_capacity(width * height * 4);
    for pixel in image.data.chunks_exact(4) {
        rgbe.extend_from_slice(&linear_to_rgbe(pixel[0], pixel[1], pixel[2]));
    }

    let gamma: Option<f32> = image.metadata.get("GAMMA").and_then(|v| v.parse().ok());
    let exposure: f32 = image
        .metadata
        .get("EXPOSURE")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0);

    let header = RadianceHeader {
        format: "32-bit_rle_rgbe".to_string(),
        exposure,
        gamma,
        metadata: hdrify_core::image::Metadata::new(),
        width: image.width,
        height: image.height,
    };

    tracing::debug!(
        width = image.width,
        height = image.height,
        use_rle = options.use_rle,
        "encoding Radiance HDR pixel data"
    );

    let mut out = header::write_header(&header);
    if options.use_rle {
        out.extend(rle::encode_pixels(&rgbe, width, height));
    } else {
        out.extend(rgbe);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gradient_image(width: u32, height: u32) -> HdrifyImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x as f32 + 1.0) * 0.1);
                data.push((y as f32 + 1.0) * 0.2);
                data.push(1.5);
                data.push(1.0);
            }
        }
        HdrifyImage::new(width, height, data, LinearColorSpace::Rec709).unwrap()
    }

    #[test]
    fn round_trips_within_rgbe_quantization() {
        let image = gradient_image(20, 6);
        let bytes = write_hdr(&image).unwrap();
        let decoded = read_hdr(&bytes, &HdrReaderOptions::default()).unwrap();
        assert_eq!(decoded.width, 20);
        assert_eq!(decoded.height, 6);
        for (a, b) in image.data.iter().zip(decoded.data.iter()) {
            assert_relative_eq!(a, b, max_relative = 0.02);
        }
    }

    #[test]
    fn round_trips_narrow_scanlines_without_adaptive_rle() {
        let image = gradient_image(4, 3);
        let bytes = write_hdr(&image).unwrap();
        let decoded = read_hdr(&bytes, &HdrReaderOptions::default()).unwrap();
        for (a, b) in image.data.iter().zip(decoded.data.iter()) {
            assert_relative_eq!(a, b, max_relative = 0.02);
        }
    }

    #[test]
    fn physical_radiance_output_divides_by_exposure() {
        let mut image = gradient_image(10, 2);
        image.metadata.insert("EXPOSURE".to_string(), "2.0".to_string());
        let bytes = write_hdr(&image).unwrap();

        let raw = read_hdr(&bytes, &HdrReaderOptions::default()).unwrap();
        let physical = read_hdr(
            &bytes,
            &HdrReaderOptions { header_strict: true, output: RadianceOutput::PhysicalRadiance },
        )
        .unwrap();

        for (r, p) in raw.data.iter().zip(physical.data.iter()).step_by(4) {
            assert_relative_eq!(*r / 2.0, *p, max_relative = 0.05);
        }
    }

    #[test]
    fn rgbe_round_trips_within_two_percent() {
        for &(r, g, b) in &[(1.0, 0.5, 0.25), (0.001, 0.002, 0.003), (100.0, 50.0, 25.0)] {
            let rgbe = linear_to_rgbe(r, g, b);
            let decoded = rgbe_to_linear(rgbe[0], rgbe[1], rgbe[2], rgbe[3]);
            assert_relative_eq!(decoded[0], r, max_relative = 0.02);
            assert_relative_eq!(decoded[1], g, max_relative = 0.02);
            assert_relative_eq!(decoded[2], b, max_relative = 0.02);
        }
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut image = gradient_image(1, 1);
        image.width = 0;
        assert!(write_hdr(&image).is_err());
    }

    #[test]
    fn invalid_magic_is_rejected() {
        assert!(read_hdr(b"not an hdr file", &HdrReaderOptions::default()).is_err());
    }
}
