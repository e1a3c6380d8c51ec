//! JPEG-R container assembly (component C9) and extraction (component C10):
//! the APP1/APP2 segment layout that lets a standard JPEG decoder show the
//! SDR base while a gain-map-aware viewer reconstructs the full HDR image.

use jpeg_decoder::{Decoder, PixelFormat as DecodedPixelFormat};
use jpeg_encoder::{ColorType as JpegColorType, Encoder};
use std::io::Cursor;

use hdrify_core::image::EncodingResult;
use hdrify_core::{Error, HdrifyImage, Result};

use crate::gainmap::{decode_gain_map, GainMapDecodeOptions};
use crate::icc::default_srgb_icc_profile;
use crate::mpf::{build_mpf_segment, parse_mpf_segment, MPF_SIGNATURE};
use crate::xmp::{build_gain_map_xmp, build_primary_xmp, find_gain_map_item_length, find_gain_map_metadata};

const XMP_IDENTIFIER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const ICC_IDENTIFIER: &[u8] = b"ICC_PROFILE\0";
const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP2: u8 = 0xE2;

/// Which container flavor [`write_jpeg_gain_map`] should emit. Both flavors
/// produce a file [`read_jpeg_gain_map`] round-trips; they differ in how the
/// gain-map image is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMapFormat {
    /// Google Ultra HDR layout: the gain map is indexed by an MPF `APP2`
    /// segment (§4.9).
    #[default]
    UltraHdr,
    /// Adobe Gain Map layout: no MPF segment; the gain map is located via
    /// the second-SOI fallback scan (§4.9, "adobe-gainmap" variant).
    AdobeGainmap,
}

/// How [`write_jpeg_gain_map`] should handle the ICC profile segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IccOption {
    /// Embed the bundled default sRGB profile (component C9 item 3).
    #[default]
    Default,
    /// Embed a caller-supplied profile verbatim.
    Custom(Vec<u8>),
    /// Omit the ICC `APP2` segment entirely.
    Omit,
}

/// Options accepted by [`write_jpeg_gain_map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegGainMapWriterOptions {
    /// Baseline JPEG quality (1-100) for both the primary and gain-map
    /// images.
    pub quality: u8,
    /// ICC profile handling.
    pub icc: IccOption,
    /// Optional raw EXIF TIFF payload (without the `Exif\0\0` identifier)
    /// to embed as a leading `APP1` segment.
    pub exif: Option<Vec<u8>>,
    /// Container layout to emit.
    pub format: GainMapFormat,
}

impl Default for JpegGainMapWriterOptions {
    /// Quality 90 (matching this workspace's plain JPEG writer default),
    /// the bundled default ICC profile, no EXIF, Ultra HDR / MPF layout.
    fn default() -> Self {
        Self {
            quality: 90,
            icc: IccOption::default(),
            exif: None,
            format: GainMapFormat::default(),
        }
    }
}

fn encode_baseline_rgb(rgba: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let rgb: Vec<u8> = rgba.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
    let mut buffer = Vec::new();
    let encoder = Encoder::new(&mut buffer, quality);
    encoder
        .encode(&rgb, width as u16, height as u16, JpegColorType::Rgb)
        .map_err(|e| Error::decode_fault(format!("JPEG encode failed: {e}")))?;
    Ok(buffer)
}

fn decode_baseline_to_rgba(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let mut decoder = Decoder::new(Cursor::new(bytes));
    let pixels = decoder
        .decode()
        .map_err(|e| Error::decode_fault(format!("JPEG decode failed: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| Error::decode_fault("JPEG decode produced no frame info"))?;
    let width = info.width as u32;
    let height = info.height as u32;
    let rgb = match info.pixel_format {
        DecodedPixelFormat::RGB24 => pixels,
        DecodedPixelFormat::L8 => pixels.iter().flat_map(|&g| [g, g, g]).collect(),
        other => {
            return Err(Error::channel_mismatch(format!(
                "unsupported JPEG pixel format in gain-map container: {other:?}"
            )))
        }
    };
    let rgba: Vec<u8> = rgb.chunks_exact(3).flat_map(|px| [px[0], px[1], px[2], 255]).collect();
    Ok((rgba, width, height))
}

fn write_app_segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    out.push(0xFF);
    out.push(marker);
    let length = (payload.len() + 2) as u16;
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(payload);
}

fn write_xmp_segment(out: &mut Vec<u8>, xmp_xml: &[u8]) {
    let mut payload = Vec::with_capacity(XMP_IDENTIFIER.len() + xmp_xml.len());
    payload.extend_from_slice(XMP_IDENTIFIER);
    payload.extend_from_slice(xmp_xml);
    write_app_segment(out, MARKER_APP1, &payload);
}

fn write_icc_segment(out: &mut Vec<u8>, profile: &[u8]) {
    // Single-chunk ICC embedding; profiles beyond one segment's ~64KB
    // payload limit are out of scope for this writer.
    let mut payload = Vec::with_capacity(ICC_IDENTIFIER.len() + 2 + profile.len());
    payload.extend_from_slice(ICC_IDENTIFIER);
    payload.push(1); // chunk number
    payload.push(1); // total chunks
    payload.extend_from_slice(profile);
    write_app_segment(out, MARKER_APP2, &payload);
}

fn mpf_segment_bytes(primary_size: u32, gain_map_offset: u32, gain_map_size: u32) -> Vec<u8> {
    let payload = build_mpf_segment(primary_size, gain_map_offset, gain_map_size);
    let mut out = Vec::new();
    write_app_segment(&mut out, MARKER_APP2, &payload);
    out
}

/// Assembles a JPEG-R file from a gain-map encoding.
///
/// # Errors
///
/// Returns [`Error::DecodeFault`] if the baseline JPEG encoder rejects
/// either image (e.g. zero dimensions).
pub fn write_jpeg_gain_map(encoding: &EncodingResult, options: &JpegGainMapWriterOptions) -> Result<Vec<u8>> {
    let primary_jpeg = encode_baseline_rgb(&encoding.sdr, encoding.width, encoding.height, options.quality)?;
    let gain_jpeg = encode_baseline_rgb(&encoding.gain_map, encoding.width, encoding.height, options.quality)?;
    let primary_body = &primary_jpeg[2..];
    let gain_body = &gain_jpeg[2..];

    let mut app1_primary = Vec::new();
    write_xmp_segment(&mut app1_primary, &build_primary_xmp(gain_jpeg.len())?);

    let mut leading = Vec::new();
    if let Some(exif) = &options.exif {
        let mut payload = Vec::with_capacity(EXIF_IDENTIFIER.len() + exif.len());
        payload.extend_from_slice(EXIF_IDENTIFIER);
        payload.extend_from_slice(exif);
        write_app_segment(&mut leading, MARKER_APP1, &payload);
    }
    leading.extend_from_slice(&app1_primary);

    let icc_segment = match &options.icc {
        IccOption::Omit => Vec::new(),
        IccOption::Default => {
            let mut v = Vec::new();
            write_icc_segment(&mut v, &default_srgb_icc_profile());
            v
        }
        IccOption::Custom(bytes) => {
            let mut v = Vec::new();
            write_icc_segment(&mut v, bytes);
            v
        }
    };

    let mpf_segment = match options.format {
        GainMapFormat::UltraHdr => {
            // MPF APP2 must precede the ICC APP2 (§4.9 order rule). Its own
            // wire length does not depend on the offset value it carries, so
            // a placeholder offset measures the exact gap to the secondary
            // SOI before the real segment is built.
            let placeholder = mpf_segment_bytes(primary_jpeg.len() as u32, 0, gain_jpeg.len() as u32);
            let mpf_segment_start = 2 + leading.len() + 4; // outer SOI + leading segments + (marker+length)
            let ref_point = mpf_segment_start + 6;
            let secondary_soi_pos = 2 + leading.len() + placeholder.len() + icc_segment.len() + primary_body.len();
            let gain_map_offset = (secondary_soi_pos - ref_point) as u32;
            mpf_segment_bytes(primary_jpeg.len() as u32, gain_map_offset, gain_jpeg.len() as u32)
        }
        GainMapFormat::AdobeGainmap => Vec::new(),
    };

    let mut app1_secondary = Vec::new();
    write_xmp_segment(&mut app1_secondary, &build_gain_map_xmp(&encoding.metadata)?);

    let mut out = Vec::with_capacity(
        2 + leading.len() + mpf_segment.len() + icc_segment.len() + primary_body.len()
            + 2 + app1_secondary.len() + gain_body.len(),
    );
    out.push(0xFF);
    out.push(MARKER_SOI);
    out.extend_from_slice(&leading);
    out.extend_from_slice(&mpf_segment);
    out.extend_from_slice(&icc_segment);
    out.extend_from_slice(primary_body);
    out.push(0xFF);
    out.push(MARKER_SOI);
    out.extend_from_slice(&app1_secondary);
    out.extend_from_slice(gain_body);

    tracing::debug!(
        width = encoding.width,
        height = encoding.height,
        format = ?options.format,
        bytes = out.len(),
        "assembled JPEG-R container"
    );

    Ok(out)
}

fn ensure_soi(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] == MARKER_SOI {
        bytes.to_vec()
    } else {
        let mut out = Vec::with_capacity(bytes.len() + 2);
        out.push(0xFF);
        out.push(MARKER_SOI);
        out.extend_from_slice(bytes);
        out
    }
}

/// Walks top-level JPEG segments and returns `(marker, payload)` for every
/// `APPn` segment encountered, along with the payload's absolute byte
/// offset in `bytes`. Stops at the first scan (`SOS`) or end-of-image.
fn app_segments(bytes: &[u8]) -> Vec<(u8, usize, &[u8])> {
    let mut segments = Vec::new();
    if bytes.len() < 2 || bytes[0] != 0xFF || bytes[1] != MARKER_SOI {
        return segments;
    }
    let mut pos = 2usize;
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let mut marker_pos = pos;
        while marker_pos < bytes.len() && bytes[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        if marker_pos >= bytes.len() {
            break;
        }
        let marker = bytes[marker_pos];
        pos = marker_pos + 1;
        if marker == 0xD9 || marker == 0xDA || (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            if marker == 0xDA {
                break;
            }
            continue;
        }
        if pos + 2 > bytes.len() {
            break;
        }
        let seg_len = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
        if seg_len < 2 || pos + seg_len > bytes.len() {
            break;
        }
        let payload_start = pos + 2;
        let payload = &bytes[payload_start..pos + seg_len];
        if (0xE0..=0xEF).contains(&marker) {
            segments.push((marker, payload_start, payload));
        }
        pos += seg_len;
    }
    segments
}

/// Finds the second `FF D8` occurrence, preferring one immediately
/// following an `FF D9` EOI, falling back to the first `FF D8` after byte 2.
fn second_soi_fallback(bytes: &[u8]) -> Option<usize> {
    let mut eoi_then_soi = None;
    let mut first_after_header = None;
    let mut i = 2usize;
    while i + 1 < bytes.len() {
        if bytes[i] == 0xFF && bytes[i + 1] == MARKER_EOI {
            if i + 3 < bytes.len() && bytes[i + 2] == 0xFF && bytes[i + 3] == MARKER_SOI {
                eoi_then_soi = Some(i + 2);
                break;
            }
        }
        if first_after_header.is_none() && bytes[i] == 0xFF && bytes[i + 1] == MARKER_SOI {
            first_after_header = Some(i);
        }
        i += 1;
    }
    eoi_then_soi.or(first_after_header)
}

/// Splits a JPEG-R byte buffer into `(primary_jpeg, gain_map_jpeg, used_mpf)`.
fn split_container(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>, bool)> {
    for (marker, payload_start, payload) in app_segments(bytes) {
        if marker != MARKER_APP2 || !payload.starts_with(MPF_SIGNATURE) {
            continue;
        }
        if let Some(parsed) = parse_mpf_segment(payload) {
            if parsed.entries.len() < 2 {
                continue;
            }
            let primary = &parsed.entries[0];
            let secondary = &parsed.entries[1];
            let mpf_segment_start = payload_start;
            let ref_point = mpf_segment_start + 6;
            let gain_map_abs = ref_point.checked_add(secondary.offset as usize);

            let primary_end = primary.size as usize;
            if primary_end == 0 || primary_end > bytes.len() {
                continue;
            }
            let primary_bytes = ensure_soi(&bytes[..primary_end]);

            let gain_map_start = match gain_map_abs {
                Some(start) if start < bytes.len() => start,
                _ => secondary.offset as usize, // escapes the file: treat as absolute
            };
            let gain_map_end = gain_map_start + secondary.size as usize;
            if gain_map_start >= bytes.len() || gain_map_end > bytes.len() {
                continue;
            }
            let gain_map_bytes = ensure_soi(&bytes[gain_map_start..gain_map_end]);
            return Ok((primary_bytes, gain_map_bytes, true));
        }
    }

    let second_soi = second_soi_fallback(bytes)
        .ok_or_else(|| Error::gain_map_missing("Not a valid JPEG with gain map: missing gain map image"))?;
    let primary_bytes = ensure_soi(&bytes[..second_soi]);
    let gain_map_bytes = ensure_soi(&bytes[second_soi..]);
    Ok((primary_bytes, gain_map_bytes, false))
}

/// Extracts and reconstructs a linear HDR [`HdrifyImage`] from a JPEG-R
/// container.
///
/// # Errors
///
/// Returns [`Error::GainMapMissing`] when no `hdrgm:` metadata block or
/// gain-map image can be located, and propagates [`Error::DecodeFault`] /
/// [`Error::ChannelMismatch`] from the underlying JPEG decode.
pub fn read_jpeg_gain_map(bytes: &[u8]) -> Result<HdrifyImage> {
    let metadata = find_gain_map_metadata(bytes)?;
    let (primary_bytes, gain_map_bytes, used_mpf) = split_container(bytes)?;

    if let Some(expected) = find_gain_map_item_length(bytes) {
        if expected != gain_map_bytes.len() {
            tracing::debug!(expected, actual = gain_map_bytes.len(), "gain-map Item:Length mismatch");
        }
    }

    let (sdr, sdr_w, sdr_h) = decode_baseline_to_rgba(&primary_bytes)?;
    let (gain_map, gm_w, gm_h) = decode_baseline_to_rgba(&gain_map_bytes)?;

    let mut image = decode_gain_map(
        &sdr,
        sdr_w,
        sdr_h,
        &gain_map,
        gm_w,
        gm_h,
        &metadata,
        &GainMapDecodeOptions::default(),
    )?;

    image.metadata.insert(
        "format".to_string(),
        if used_mpf { "ultrahdr".to_string() } else { "adobe-gainmap".to_string() },
    );

    tracing::debug!(width = image.width, height = image.height, used_mpf, "extracted JPEG-R container");

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdrify_core::colorspace::LinearColorSpace;
    use hdrify_core::image::Triplet;

    fn sample_encoding() -> EncodingResult {
        let width = 6;
        let height = 4;
        let count = (width * height) as usize;
        let mut sdr = vec![0u8; count * 4];
        let mut gain_map = vec![0u8; count * 4];
        for i in 0..count {
            sdr[i * 4] = 80;
            sdr[i * 4 + 1] = 120;
            sdr[i * 4 + 2] = 160;
            sdr[i * 4 + 3] = 255;
            gain_map[i * 4] = 200;
            gain_map[i * 4 + 1] = 200;
            gain_map[i * 4 + 2] = 200;
            gain_map[i * 4 + 3] = 255;
        }
        EncodingResult {
            sdr,
            gain_map,
            width,
            height,
            metadata: hdrify_core::image::GainMapMetadata {
                gamma: Triplet::scalar(1.0),
                offset_sdr: Triplet::scalar(1.0 / 64.0),
                offset_hdr: Triplet::scalar(1.0 / 64.0),
                gain_map_min: Triplet::scalar(0.0),
                gain_map_max: Triplet::scalar(2.0),
                hdr_capacity_min: 0.0,
                hdr_capacity_max: 2.0,
            },
        }
    }

    #[test]
    fn ultrahdr_round_trip_locates_gain_map_via_mpf() {
        let encoding = sample_encoding();
        let bytes = write_jpeg_gain_map(&encoding, &JpegGainMapWriterOptions::default()).unwrap();
        let decoded = read_jpeg_gain_map(&bytes).unwrap();
        assert_eq!(decoded.width, encoding.width);
        assert_eq!(decoded.height, encoding.height);
        assert_eq!(decoded.color_space, LinearColorSpace::Rec709);
        assert_eq!(decoded.metadata.get("format").map(String::as_str), Some("ultrahdr"));
    }

    #[test]
    fn mpf_image_offset_lands_on_gain_map_soi() {
        let encoding = sample_encoding();
        let bytes = write_jpeg_gain_map(&encoding, &JpegGainMapWriterOptions::default()).unwrap();
        let segments = app_segments(&bytes);
        let (_, payload_start, payload) = segments
            .iter()
            .find(|(marker, _, payload)| *marker == MARKER_APP2 && payload.starts_with(MPF_SIGNATURE))
            .copied()
            .unwrap();
        let parsed = parse_mpf_segment(payload).unwrap();
        let ref_point = payload_start + 6;
        let gain_map_soi = ref_point + parsed.entries[1].offset as usize;
        assert_eq!(bytes[gain_map_soi], 0xFF);
        assert_eq!(bytes[gain_map_soi + 1], MARKER_SOI);
    }

    #[test]
    fn adobe_gainmap_variant_round_trips_without_mpf() {
        let encoding = sample_encoding();
        let options = JpegGainMapWriterOptions { format: GainMapFormat::AdobeGainmap, ..Default::default() };
        let bytes = write_jpeg_gain_map(&encoding, &options).unwrap();
        assert!(app_segments(&bytes).iter().all(|(marker, _, payload)| {
            !(*marker == MARKER_APP2 && payload.starts_with(MPF_SIGNATURE))
        }));
        let decoded = read_jpeg_gain_map(&bytes).unwrap();
        assert_eq!(decoded.metadata.get("format").map(String::as_str), Some("adobe-gainmap"));
    }

    #[test]
    fn omitted_icc_produces_no_icc_segment() {
        let encoding = sample_encoding();
        let options = JpegGainMapWriterOptions { icc: IccOption::Omit, ..Default::default() };
        let bytes = write_jpeg_gain_map(&encoding, &options).unwrap();
        assert!(app_segments(&bytes)
            .iter()
            .all(|(marker, _, payload)| !(*marker == MARKER_APP2 && payload.starts_with(ICC_IDENTIFIER))));
    }

    #[test]
    fn missing_metadata_is_reported_as_gain_map_missing() {
        let err = read_jpeg_gain_map(b"\xFF\xD8\xFF\xD9").unwrap_err();
        assert!(matches!(err, Error::GainMapMissing(_)));
    }
}
