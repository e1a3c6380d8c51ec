//! PXR24 compression kernel: 24-bit float quantization, delta prediction,
//! byte transposition, and deflate (component C6).
//!
//! Unlike RLE/ZIP, PXR24 applies its own per-segment delta+transpose step
//! (not the shared [`super::predictor`] pipeline) before handing the whole
//! block to deflate.

use hdrify_core::{Error, Result};

use super::zip::{compress_zip_raw, decompress_zip_raw};
use crate::header::PixelType;

/// Bytes used to store one quantized sample of a given channel pixel type.
fn bytes_per_sample(pixel_type: PixelType) -> usize {
    match pixel_type {
        PixelType::Half => 2,
        PixelType::Float => 3,
        PixelType::Uint => {
            // §9 Open Question: UINT pass-through is not required by any
            // spec scenario; treat it as the 3-byte path applied to the
            // low 24 bits, matching the FLOAT path's byte count.
            3
        }
    }
}

/// Quantizes one raw little-endian sample (as stored in an f32/u32/half
/// buffer) down to its PXR24 byte-plane representation, MSB first.
fn quantize_sample(raw_le_bytes: &[u8], pixel_type: PixelType) -> Vec<u8> {
    match pixel_type {
        PixelType::Half => vec![raw_le_bytes[1], raw_le_bytes[0]],
        PixelType::Float => {
            let bits = u32::from_le_bytes(raw_le_bytes.try_into().unwrap());
            let u24 = bits >> 8;
            vec![(u24 >> 16) as u8, (u24 >> 8) as u8, u24 as u8]
        }
        PixelType::Uint => {
            let bits = u32::from_le_bytes(raw_le_bytes.try_into().unwrap());
            vec![(bits >> 16) as u8, (bits >> 8) as u8, bits as u8]
        }
    }
}

/// Reverses [`quantize_sample`]'s packing back into little-endian sample
/// bytes of the same width as the caller's output buffer.
fn dequantize_sample(msb_bytes: &[u8], pixel_type: PixelType) -> Vec<u8> {
    match pixel_type {
        PixelType::Half => vec![msb_bytes[1], msb_bytes[0]],
        PixelType::Float => {
            let u24 = ((msb_bytes[0] as u32) << 16) | ((msb_bytes[1] as u32) << 8) | msb_bytes[2] as u32;
            let bits = u24 << 8;
            bits.to_le_bytes().to_vec()
        }
        PixelType::Uint => {
            let bits = ((msb_bytes[0] as u32) << 16) | ((msb_bytes[1] as u32) << 8) | msb_bytes[2] as u32;
            bits.to_le_bytes().to_vec()
        }
    }
}

/// One channel's worth of samples for one scan line, in pixel order.
pub struct Segment<'a> {
    /// Pixel type of this channel, which fixes `bytes_per_sample`.
    pub pixel_type: PixelType,
    /// Little-endian sample bytes, `width * pixel_type.byte_size()` long.
    pub samples: &'a [u8],
}

/// Encodes a full block's worth of segments (line-major, then
/// channel-major, matching the canonical planar block layout) into a
/// deflate stream.
///
/// Each segment is delta-coded MSB-first and byte-transposed independently
/// before all segments are concatenated and compressed together.
pub fn compress_pxr24(segments: &[Segment<'_>]) -> Vec<u8> {
    let mut flat = Vec::new();
    for seg in segments {
        flat.extend(encode_segment(seg));
    }
    compress_zip_raw(&flat)
}

fn encode_segment(seg: &Segment<'_>) -> Vec<u8> {
    let sample_width = seg.pixel_type.byte_size();
    let plane_count = bytes_per_sample(seg.pixel_type);
    let sample_count = seg.samples.len() / sample_width;

    let mut planes: Vec<Vec<u8>> = vec![Vec::with_capacity(sample_count); plane_count];
    let mut prev = vec![0u8; plane_count];
    for i in 0..sample_count {
        let raw = &seg.samples[i * sample_width..(i + 1) * sample_width];
        let quantized = quantize_sample(raw, seg.pixel_type);
        for p in 0..plane_count {
            let diff = quantized[p].wrapping_sub(prev[p]);
            planes[p].push(diff);
            prev[p] = quantized[p];
        }
    }

    planes.into_iter().flatten().collect()
}

/// Decodes a PXR24 block back into its constituent segments' raw
/// little-endian sample bytes, one output buffer per input `channel_order`
/// entry.
pub fn decompress_pxr24(
    compressed: &[u8],
    channel_order: &[(PixelType, usize)],
) -> Result<Vec<Vec<u8>>> {
    let total_samples: usize = channel_order.iter().map(|(_, n)| n).sum();
    let total_bytes: usize = channel_order
        .iter()
        .map(|(pt, n)| n * bytes_per_sample(*pt))
        .sum();
    let flat = decompress_zip_raw(compressed, total_bytes)?;

    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(channel_order.len());
    for &(pixel_type, sample_count) in channel_order {
        let plane_count = bytes_per_sample(pixel_type);
        let segment_bytes = sample_count * plane_count;
        if cursor + segment_bytes > flat.len() {
            return Err(Error::truncated("PXR24 segment exceeds decompressed buffer"));
        }
        let segment = &flat[cursor..cursor + segment_bytes];
        cursor += segment_bytes;

        let mut planes = Vec::with_capacity(plane_count);
        for p in 0..plane_count {
            planes.push(&segment[p * sample_count..(p + 1) * sample_count]);
        }

        let mut prev = vec![0u8; plane_count];
        let mut raw_out = Vec::with_capacity(sample_count * pixel_type.byte_size());
        for i in 0..sample_count {
            let mut quantized = vec![0u8; plane_count];
            for p in 0..plane_count {
                let value = prev[p].wrapping_add(planes[p][i]);
                quantized[p] = value;
                prev[p] = value;
            }
            raw_out.extend(dequantize_sample(&quantized, pixel_type));
        }
        out.push(raw_out);
    }

    let _ = total_samples;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_le_samples(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn half_segment_round_trips_exactly() {
        let half_bits: [u16; 4] = [0x3C00, 0x4000, 0xBC00, 0x0000];
        let samples: Vec<u8> = half_bits.iter().flat_map(|b| b.to_le_bytes()).collect();
        let seg = Segment { pixel_type: PixelType::Half, samples: &samples };
        let compressed = compress_pxr24(&[seg]);
        let decoded = decompress_pxr24(&compressed, &[(PixelType::Half, 4)]).unwrap();
        assert_eq!(decoded[0], samples);
    }

    #[test]
    fn float_segment_quantization_loses_only_low_byte() {
        let samples = f32_le_samples(&[1.0, 2.5, -3.25, 0.0]);
        let seg = Segment { pixel_type: PixelType::Float, samples: &samples };
        let compressed = compress_pxr24(&[seg]);
        let decoded = decompress_pxr24(&compressed, &[(PixelType::Float, 4)]).unwrap();
        for i in 0..4 {
            let orig = u32::from_le_bytes(samples[i * 4..i * 4 + 4].try_into().unwrap());
            let got = u32::from_le_bytes(decoded[0][i * 4..i * 4 + 4].try_into().unwrap());
            assert_eq!(orig & 0xFFFFFF00, got & 0xFFFFFF00);
            assert_eq!(got & 0xFF, 0);
        }
    }

    #[test]
    fn multiple_segments_concatenate_and_separate_correctly() {
        let r = f32_le_samples(&[1.0, 2.0]);
        let g = f32_le_samples(&[3.0, 4.0]);
        let segs = vec![
            Segment { pixel_type: PixelType::Float, samples: &r },
            Segment { pixel_type: PixelType::Float, samples: &g },
        ];
        let compressed = compress_pxr24(&segs);
        let decoded = decompress_pxr24(
            &compressed,
            &[(PixelType::Float, 2), (PixelType::Float, 2)],
        )
        .unwrap();
        assert_eq!(decoded.len(), 2);
    }
}
