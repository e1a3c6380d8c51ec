//! The canonical in-memory image types every `hdrify` codec reads from or
//! writes to: [`HdrifyImage`] (linear float RGBA), [`GainMapMetadata`]
//! (Ultra HDR gain-map parameters), and [`EncodingResult`] (the SDR base plus
//! gain map a gain-map encoder produces).
//!
//! # Memory layout
//!
//! [`HdrifyImage::data`] stores pixels row-major, top-to-bottom, 4 values per
//! pixel (`[R G B A R G B A ...]`), length always `4 * width * height`.
//!
//! # Usage
//!
//! ```rust
//! use hdrify_core::{HdrifyImage, LinearColorSpace};
//!
//! let img = HdrifyImage::filled(4, 4, [0.5, 0.5, 0.5, 1.0], LinearColorSpace::Rec709);
//! assert_eq!(img.data.len(), 4 * 4 * 4);
//! ```

use std::collections::BTreeMap;

use crate::colorspace::LinearColorSpace;
use crate::error::{Error, Result};

/// An open key/value attribute bag carried alongside an [`HdrifyImage`]:
/// header keys such as `EXPOSURE`/`GAMMA`/`compression`/`format`, or whatever
/// else a reader chooses to surface.
///
/// Kept as a `BTreeMap` (rather than a `HashMap`) so encoders that serialize
/// metadata (XMP, EXR attribute dumps in logs) get deterministic ordering.
pub type Metadata = BTreeMap<String, String>;

/// The canonical linear-RGBA float image every reader produces and every
/// encoder consumes.
///
/// # Invariants
///
/// - `data.len() == 4 * width * height`.
/// - Every channel value is finite and non-negative ([`HdrifyImage::ensure_non_negative_finite`]).
/// - RGB values are in the linear light domain of `color_space`.
/// - Alpha is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrifyImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Linear RGBA pixel data, row-major, 4 values per pixel.
    pub data: Vec<f32>,
    /// The linear color space the RGB values are expressed in.
    pub color_space: LinearColorSpace,
    /// Open key/value metadata (header keys, `chromaticities`, etc).
    pub metadata: Metadata,
}

impl HdrifyImage {
    /// Builds an image from an existing RGBA buffer, validating the length
    /// invariant.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::other`] describing the mismatch if
    /// `data.len() != 4 * width * height`, or `width`/`height` is zero.
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<f32>,
        color_space: LinearColorSpace,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::other(format!(
                "invalid dimensions: {width}x{height} (width and height must be positive)"
            )));
        }
        let expected = 4usize * width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::other(format!(
                "pixel data length {} does not match {}x{} RGBA ({} expected)",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            color_space,
            metadata: Metadata::new(),
        })
    }

    /// Builds a `width x height` image with every pixel set to `rgba`.
    pub fn filled(width: u32, height: u32, rgba: [f32; 4], color_space: LinearColorSpace) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            color_space,
            metadata: Metadata::new(),
        }
    }

    /// Returns the `[r, g, b, a]` at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds; callers operating on untrusted
    /// coordinates should check `x < width && y < height` first.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let idx = 4 * (y as usize * self.width as usize + x as usize);
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Sets the `[r, g, b, a]` at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let idx = 4 * (y as usize * self.width as usize + x as usize);
        self.data[idx..idx + 4].copy_from_slice(&rgba);
    }

    /// Enforces the non-negative/finite pixel invariant in place.
    ///
    /// NaN and infinite values are always rejected with an
    /// [`Error::NumericDomain`]. Negative values are replaced with `0.0`
    /// when `strict` is `false`; when `strict` is `true` a negative value
    /// is also rejected as an [`Error::NumericDomain`].
    pub fn ensure_non_negative_finite(&mut self, strict: bool) -> Result<()> {
        for (i, v) in self.data.iter_mut().enumerate() {
            if !v.is_finite() {
                return Err(Error::numeric_domain(format!(
                    "channel value at buffer index {i} is {v} (non-finite values are always rejected)"
                )));
            }
            if *v < 0.0 {
                if strict {
                    return Err(Error::numeric_domain(format!(
                        "channel value at buffer index {i} is {v} (negative values are rejected in strict mode)"
                    )));
                }
                *v = 0.0;
            }
        }
        Ok(())
    }
}

/// Per-channel (R, G, B) triplet used throughout the gain-map encoder for
/// `gamma`, `offsetSdr`, `offsetHdr`, and the log2 gain-map bounds.
///
/// Callers that supply a single scalar get it broadcast to all three
/// channels via [`Triplet::scalar`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplet(pub [f32; 3]);

impl Triplet {
    /// Broadcasts a scalar to all three channels.
    pub fn scalar(v: f32) -> Self {
        Self([v, v, v])
    }

    /// `true` when R, G, and B are equal, i.e. the XMP writer may collapse
    /// this triplet to a single scalar attribute.
    pub fn is_uniform(&self) -> bool {
        self.0[0] == self.0[1] && self.0[1] == self.0[2]
    }
}

impl From<f32> for Triplet {
    fn from(v: f32) -> Self {
        Self::scalar(v)
    }
}

impl From<[f32; 3]> for Triplet {
    fn from(v: [f32; 3]) -> Self {
        Self(v)
    }
}

/// Ultra HDR / Adobe Gain Map metadata: the per-channel gain-map parameters
/// plus the scalar HDR capacity range, as carried in the secondary JPEG's
/// `hdrgm:` XMP attributes.
///
/// # Invariants
///
/// - `gain_map_max[c] > gain_map_min[c]` for every channel.
/// - `hdr_capacity_max >= hdr_capacity_min >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMapMetadata {
    /// Per-channel gamma applied to the normalized log recovery.
    pub gamma: Triplet,
    /// Per-channel SDR offset added before taking the gain ratio.
    pub offset_sdr: Triplet,
    /// Per-channel HDR offset added before taking the gain ratio.
    pub offset_hdr: Triplet,
    /// Per-channel log2 lower bound of the gain map.
    pub gain_map_min: Triplet,
    /// Per-channel log2 upper bound of the gain map.
    pub gain_map_max: Triplet,
    /// Scalar log2 lower bound of displayable HDR headroom.
    pub hdr_capacity_min: f32,
    /// Scalar log2 upper bound of displayable HDR headroom.
    pub hdr_capacity_max: f32,
}

impl Default for GainMapMetadata {
    /// The documented defaults: `gamma = (1, 1, 1)`,
    /// `offsetSdr = offsetHdr = (1/64, 1/64, 1/64)`, zero-width gain-map
    /// bounds, and zero HDR capacity (a caller computing real metadata via
    /// `encodeGainMap` always overwrites these).
    fn default() -> Self {
        Self {
            gamma: Triplet::scalar(1.0),
            offset_sdr: Triplet::scalar(1.0 / 64.0),
            offset_hdr: Triplet::scalar(1.0 / 64.0),
            gain_map_min: Triplet::scalar(0.0),
            gain_map_max: Triplet::scalar(1.0),
            hdr_capacity_min: 0.0,
            hdr_capacity_max: 1.0,
        }
    }
}

/// The output of a gain-map encode: an 8-bit sRGB base image, an 8-bit gain
/// map, and the metadata that lets a decoder reconstruct the original HDR
/// image from the two.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingResult {
    /// sRGB-encoded SDR base image, RGBA, one byte per channel.
    pub sdr: Vec<u8>,
    /// Gain-map image, RGBA, one byte per channel (same dimensions as `sdr`
    /// unless the caller encoded the gain map at a reduced resolution).
    pub gain_map: Vec<u8>,
    /// Width shared by `sdr` (and, unless downsampled, `gain_map`).
    pub width: u32,
    /// Height shared by `sdr` (and, unless downsampled, `gain_map`).
    pub height: u32,
    /// The gain-map parameters needed to decode `sdr` + `gain_map` back to HDR.
    pub metadata: GainMapMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer_length() {
        let err = HdrifyImage::new(2, 2, vec![0.0; 10], LinearColorSpace::Rec709);
        assert!(err.is_err());
    }

    #[test]
    fn new_rejects_zero_dimensions() {
        assert!(HdrifyImage::new(0, 4, vec![], LinearColorSpace::Rec709).is_err());
    }

    #[test]
    fn filled_round_trips_pixel_access() {
        let img = HdrifyImage::filled(3, 2, [0.1, 0.2, 0.3, 1.0], LinearColorSpace::P3);
        assert_eq!(img.pixel(2, 1), [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn set_pixel_mutates_only_that_pixel() {
        let mut img = HdrifyImage::filled(2, 2, [0.0, 0.0, 0.0, 1.0], LinearColorSpace::Rec709);
        img.set_pixel(1, 0, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(img.pixel(1, 0), [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(img.pixel(0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn ensure_non_negative_finite_clamps_negatives() {
        let mut img = HdrifyImage::new(1, 1, vec![-1.0, 0.5, 2.0, 1.0], LinearColorSpace::Rec709)
            .unwrap();
        img.ensure_non_negative_finite(false).unwrap();
        assert_eq!(img.data, vec![0.0, 0.5, 2.0, 1.0]);
    }

    #[test]
    fn ensure_non_negative_finite_rejects_nan() {
        let mut img =
            HdrifyImage::new(1, 1, vec![f32::NAN, 0.0, 0.0, 1.0], LinearColorSpace::Rec709)
                .unwrap();
        assert!(img.ensure_non_negative_finite(true).is_err());
    }

    #[test]
    fn ensure_non_negative_finite_strict_rejects_negatives() {
        let mut img = HdrifyImage::new(1, 1, vec![-1.0, 0.5, 2.0, 1.0], LinearColorSpace::Rec709)
            .unwrap();
        assert!(img.ensure_non_negative_finite(true).is_err());
    }

    #[test]
    fn triplet_scalar_broadcasts() {
        let t = Triplet::scalar(0.5);
        assert!(t.is_uniform());
        assert_eq!(t.0, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn gain_map_metadata_default_satisfies_invariants() {
        let m = GainMapMetadata::default();
        for c in 0..3 {
            assert!(m.gain_map_max.0[c] > m.gain_map_min.0[c]);
        }
        assert!(m.hdr_capacity_max >= m.hdr_capacity_min);
        assert!(m.hdr_capacity_min >= 0.0);
    }
}
