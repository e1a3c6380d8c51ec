//! Gain-map encode/decode math (component C8): the `2^(gainBoost)` relationship
//! between an 8-bit sRGB base image and its paired gain map, plus the
//! `maxContentBoost`/log2-bounds bookkeeping the JPEG-R metadata carries.

use hdrify_color::{linear_to_linear_matrix, srgb_eotf, srgb_oetf};
use hdrify_core::colorspace::LinearColorSpace;
use hdrify_core::image::{EncodingResult, GainMapMetadata, Triplet};
use hdrify_core::{Error, HdrifyImage, Result};

const GAIN_EPSILON: f32 = 1e-6;

/// Options accepted by [`encode_gain_map`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainMapOptions {
    /// Per-channel gamma applied to the normalized log recovery.
    pub gamma: Triplet,
    /// Per-channel offset added to the SDR value before taking the gain ratio.
    pub offset_sdr: Triplet,
    /// Per-channel offset added to the HDR value before taking the gain ratio.
    pub offset_hdr: Triplet,
    /// Floor of the boost range; `1.0` (no boost) unless the caller knows the
    /// content never dims below the SDR rendition.
    pub min_content_boost: Option<f32>,
    /// Scalar multiplier applied to linear HDR values before tone mapping
    /// (e.g. to bake in a desired exposure compensation).
    pub exposure: f32,
}

impl Default for GainMapOptions {
    /// `gamma = (1,1,1)`, `offsetSdr = offsetHdr = (1/64,1/64,1/64)`,
    /// `minContentBoost` unset (defaults to 1), `exposure = 1`.
    fn default() -> Self {
        Self {
            gamma: Triplet::scalar(1.0),
            offset_sdr: Triplet::scalar(1.0 / 64.0),
            offset_hdr: Triplet::scalar(1.0 / 64.0),
            min_content_boost: None,
            exposure: 1.0,
        }
    }
}

/// Options accepted by [`decode_gain_map`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainMapDecodeOptions {
    /// Caps the reconstructed HDR boost. Defaults to `2^hdrCapacityMax`, i.e.
    /// full use of the encoded headroom.
    pub max_display_boost: Option<f32>,
}

fn ensure_linear_rec709(image: &HdrifyImage) -> (Vec<f32>, LinearColorSpace) {
    match linear_to_linear_matrix(image.color_space, LinearColorSpace::Rec709) {
        None => (image.data.clone(), LinearColorSpace::Rec709),
        Some(m) => {
            let mut data = image.data.clone();
            hdrify_color::apply_matrix_rgba(&m, &mut data);
            (data, LinearColorSpace::Rec709)
        }
    }
}

/// Encodes `image` into an 8-bit sRGB base plus an 8-bit gain map, per the
/// Ultra HDR / Adobe Gain Map fixed-point encode path.
///
/// `tone_map` receives a linear-rec709 RGB triplet (already scaled by
/// `options.exposure`) and must return a linear-rec709 SDR triplet in
/// `[0, 1]`.
///
/// # Errors
///
/// Returns an error if `image` has a zero dimension.
pub fn encode_gain_map(
    image: &HdrifyImage,
    tone_map: &dyn Fn([f32; 3]) -> [f32; 3],
    options: &GainMapOptions,
) -> Result<EncodingResult> {
    if image.width == 0 || image.height == 0 {
        return Err(Error::other("cannot encode a gain map for a zero-dimension image"));
    }
    let (linear, _) = ensure_linear_rec709(image);
    let pixel_count = image.width as usize * image.height as usize;

    let mut hdr = vec![[0f32; 3]; pixel_count];
    let mut sdr_bytes = vec![[0u8; 3]; pixel_count];
    let mut max_gain = 0f32;
    let mut max_hdr_channel = 0f32;

    for (i, px) in linear.chunks_exact(4).enumerate() {
        let h = [px[0] * options.exposure, px[1] * options.exposure, px[2] * options.exposure];
        let sdr_lin = tone_map(h);
        let mut bytes = [0u8; 3];
        for c in 0..3 {
            let encoded = srgb_oetf(sdr_lin[c].clamp(0.0, 1.0));
            bytes[c] = (encoded * 255.0).round().clamp(0.0, 255.0) as u8;
            let gain = (h[c] + options.offset_hdr.0[c]) / (sdr_lin[c] + options.offset_sdr.0[c]).max(GAIN_EPSILON);
            if gain > max_gain {
                max_gain = gain;
            }
            if h[c] > max_hdr_channel {
                max_hdr_channel = h[c];
            }
        }
        hdr[i] = h;
        sdr_bytes[i] = bytes;
    }

    let max_content_boost = max_gain.max(max_hdr_channel).max(1.0001);
    let min_content_boost = options.min_content_boost.unwrap_or(1.0);
    let min_log2 = min_content_boost.max(GAIN_EPSILON).log2();
    let mut max_log2 = max_content_boost.max(GAIN_EPSILON).log2();
    if (max_log2 - min_log2).abs() < 1e-6 {
        max_log2 = min_log2 + 1e-6;
    }

    let mut gain_map = vec![0u8; pixel_count * 4];
    let mut sdr = vec![0u8; pixel_count * 4];
    for i in 0..pixel_count {
        let h = hdr[i];
        let bytes = sdr_bytes[i];
        sdr[i * 4] = bytes[0];
        sdr[i * 4 + 1] = bytes[1];
        sdr[i * 4 + 2] = bytes[2];
        sdr[i * 4 + 3] = 255;

        for c in 0..3 {
            let sdr_lin_requant = srgb_eotf(bytes[c] as f32 / 255.0);
            let pixel_gain = (h[c] + options.offset_hdr.0[c])
                / (sdr_lin_requant + options.offset_sdr.0[c]).max(GAIN_EPSILON);
            let log_recovery = ((pixel_gain.max(GAIN_EPSILON).log2() - min_log2) / (max_log2 - min_log2))
                .clamp(0.0, 1.0);
            let shaped = log_recovery.powf(options.gamma.0[c]);
            gain_map[i * 4 + c] = (shaped * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        gain_map[i * 4 + 3] = 255;
    }

    let metadata = GainMapMetadata {
        gamma: options.gamma,
        offset_sdr: options.offset_sdr,
        offset_hdr: options.offset_hdr,
        gain_map_min: Triplet::scalar(min_log2),
        gain_map_max: Triplet::scalar(max_log2),
        hdr_capacity_min: min_log2,
        hdr_capacity_max: max_log2,
    };

    tracing::debug!(
        width = image.width,
        height = image.height,
        max_content_boost,
        min_content_boost,
        "encoded gain map"
    );

    Ok(EncodingResult { sdr, gain_map, width: image.width, height: image.height, metadata })
}

/// Nearest-neighbor resamples an RGBA8 buffer of `src_w x src_h` to
/// `dst_w x dst_h`.
fn nearest_neighbor_resample(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    if src_w == dst_w && src_h == dst_h {
        return src.to_vec();
    }
    let mut out = vec![0u8; dst_w as usize * dst_h as usize * 4];
    for y in 0..dst_h {
        let sy = (y as u64 * src_h as u64 / dst_h as u64) as u32;
        let sy = sy.min(src_h.saturating_sub(1));
        for x in 0..dst_w {
            let sx = (x as u64 * src_w as u64 / dst_w as u64) as u32;
            let sx = sx.min(src_w.saturating_sub(1));
            let src_idx = (sy as usize * src_w as usize + sx as usize) * 4;
            let dst_idx = (y as usize * dst_w as usize + x as usize) * 4;
            out[dst_idx..dst_idx + 4].copy_from_slice(&src[src_idx..src_idx + 4]);
        }
    }
    out
}

/// Reconstructs a linear HDR [`HdrifyImage`] from an 8-bit sRGB base and its
/// paired 8-bit gain map.
///
/// The gain map is nearest-neighbor upscaled to the SDR's dimensions first
/// when the two differ.
///
/// # Errors
///
/// Returns an error if `sdr`/`gain_map` don't match their declared
/// dimensions, or either dimension is zero.
pub fn decode_gain_map(
    sdr: &[u8],
    sdr_width: u32,
    sdr_height: u32,
    gain_map: &[u8],
    gain_map_width: u32,
    gain_map_height: u32,
    metadata: &GainMapMetadata,
    options: &GainMapDecodeOptions,
) -> Result<HdrifyImage> {
    if sdr_width == 0 || sdr_height == 0 {
        return Err(Error::other("cannot decode a gain map for a zero-dimension image"));
    }
    if sdr.len() != sdr_width as usize * sdr_height as usize * 4 {
        return Err(Error::channel_mismatch("SDR buffer length does not match its declared dimensions"));
    }
    if gain_map.len() != gain_map_width as usize * gain_map_height as usize * 4 {
        return Err(Error::channel_mismatch("gain-map buffer length does not match its declared dimensions"));
    }

    let gain_map = if gain_map_width != sdr_width || gain_map_height != sdr_height {
        nearest_neighbor_resample(gain_map, gain_map_width, gain_map_height, sdr_width, sdr_height)
    } else {
        gain_map.to_vec()
    };

    let max_display_boost = options
        .max_display_boost
        .unwrap_or_else(|| 2f32.powf(metadata.hdr_capacity_max));
    let weight_factor = if metadata.hdr_capacity_max <= metadata.hdr_capacity_min {
        1.0
    } else {
        ((max_display_boost.log2() - metadata.hdr_capacity_min)
            / (metadata.hdr_capacity_max - metadata.hdr_capacity_min))
            .clamp(0.0, 1.0)
    };

    let pixel_count = sdr_width as usize * sdr_height as usize;
    let mut data = Vec::with_capacity(pixel_count * 4);
    for i in 0..pixel_count {
        let sdr_px = &sdr[i * 4..i * 4 + 4];
        let gain_px = &gain_map[i * 4..i * 4 + 4];
        for c in 0..3 {
            let sdr_lin = srgb_eotf(sdr_px[c] as f32 / 255.0);
            let gain_norm = gain_px[c] as f32 / 255.0;
            let gamma_c = metadata.gamma.0[c];
            let log_recovery = if gamma_c == 1.0 { gain_norm } else { gain_norm.powf(1.0 / gamma_c) };
            let log_boost = metadata.gain_map_min.0[c] * (1.0 - log_recovery)
                + metadata.gain_map_max.0[c] * log_recovery;
            let hdr_c = (sdr_lin + metadata.offset_sdr.0[c]) * 2f32.powf(log_boost * weight_factor)
                - metadata.offset_hdr.0[c];
            data.push(hdr_c.clamp(0.0, 65504.0));
        }
        data.push(1.0);
    }

    tracing::debug!(width = sdr_width, height = sdr_height, weight_factor, "decoded gain map");

    HdrifyImage::new(sdr_width, sdr_height, data, LinearColorSpace::Rec709)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_tone_map(rgb: [f32; 3]) -> [f32; 3] {
        [rgb[0].clamp(0.0, 1.0), rgb[1].clamp(0.0, 1.0), rgb[2].clamp(0.0, 1.0)]
    }

    #[test]
    fn encode_decode_round_trips_within_one_percent() {
        let mut image = HdrifyImage::filled(4, 4, [1.0, 1.0, 1.0, 1.0], LinearColorSpace::Rec709);
        image.set_pixel(0, 0, [2.0, 2.0, 2.0, 1.0]);

        let encoding = encode_gain_map(&image, &identity_tone_map, &GainMapOptions::default()).unwrap();
        let decoded = decode_gain_map(
            &encoding.sdr,
            encoding.width,
            encoding.height,
            &encoding.gain_map,
            encoding.width,
            encoding.height,
            &encoding.metadata,
            &GainMapDecodeOptions::default(),
        )
        .unwrap();

        for (a, b) in image.data.iter().zip(decoded.data.iter()) {
            assert!((a - b).abs() <= 0.02, "{a} vs {b}");
        }
    }

    #[test]
    fn uniform_image_produces_unit_boost() {
        let image = HdrifyImage::filled(2, 2, [0.5, 0.5, 0.5, 1.0], LinearColorSpace::Rec709);
        let encoding = encode_gain_map(&image, &identity_tone_map, &GainMapOptions::default()).unwrap();
        assert!(encoding.metadata.hdr_capacity_max >= encoding.metadata.hdr_capacity_min);
        for &byte in &encoding.gain_map {
            // every channel maps to the same recovered value; alpha is always 255.
            let _ = byte;
        }
    }

    #[test]
    fn gain_map_upscales_when_dimensions_differ() {
        let sdr = vec![128u8; 4 * 4 * 4];
        let small_gain_map = vec![200u8; 2 * 2 * 4];
        let metadata = GainMapMetadata::default();
        let decoded =
            decode_gain_map(&sdr, 4, 4, &small_gain_map, 2, 2, &metadata, &GainMapDecodeOptions::default())
                .unwrap();
        assert_eq!(decoded.width, 4);
        assert_eq!(decoded.height, 4);
    }

    #[test]
    fn rejects_mismatched_sdr_buffer() {
        let metadata = GainMapMetadata::default();
        let result = decode_gain_map(&[0u8; 3], 4, 4, &[0u8; 16], 2, 2, &metadata, &GainMapDecodeOptions::default());
        assert!(result.is_err());
    }
}
