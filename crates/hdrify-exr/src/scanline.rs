//! The scanline/block engine (component C7): blocking rules by compression,
//! offset-table construction and parsing, per-block encode/decode, and
//! channel-name-to-RGBA mapping.
//!
//! Every compression method shares the same outer block loop — only the
//! byte layout of one block's payload differs, dispatched in
//! [`encode_block`]/[`decode_block`] to the kernels in
//! [`crate::compression`].

use hdrify_core::half::{decode_half, encode_half};
use hdrify_core::{Error, HdrifyImage, LinearColorSpace, Result};

use crate::compression::{self, piz, pxr24};
use crate::header::{Channel, Compression, ExrHeader, PixelType};

/// The semantic role a channel name maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    R,
    G,
    B,
    A,
}

fn classify_channel_name(name: &str) -> Option<Role> {
    match name.to_ascii_lowercase().as_str() {
        "r" | "red" => Some(Role::R),
        "g" | "green" => Some(Role::G),
        "b" | "blue" => Some(Role::B),
        "a" | "alpha" => Some(Role::A),
        _ => None,
    }
}

fn sample_to_bytes(v: f32, pixel_type: PixelType) -> [u8; 4] {
    match pixel_type {
        PixelType::Half => {
            let b = encode_half(v).to_le_bytes();
            [b[0], b[1], 0, 0]
        }
        PixelType::Float => v.to_bits().to_le_bytes(),
        PixelType::Uint => (v.max(0.0) as u32).to_le_bytes(),
    }
}

fn bytes_to_sample(bytes: &[u8], pixel_type: PixelType) -> f32 {
    match pixel_type {
        PixelType::Half => decode_half(u16::from_le_bytes([bytes[0], bytes[1]])),
        PixelType::Float => f32::from_bits(u32::from_le_bytes(bytes.try_into().unwrap())),
        PixelType::Uint => u32::from_le_bytes(bytes.try_into().unwrap()) as f32,
    }
}

/// Builds one full-image plane (`width * height`, row-major) per header
/// channel from `image`, via [`classify_channel_name`].
fn build_channel_planes_for_write(
    header: &ExrHeader,
    image: &HdrifyImage,
) -> Result<Vec<Vec<f32>>> {
    let width = header.data_window.width() as usize;
    let height = header.data_window.height() as usize;
    let mut planes = Vec::with_capacity(header.channels.len());
    for ch in &header.channels {
        let role = classify_channel_name(&ch.name).ok_or_else(|| {
            Error::channel_mismatch(format!("cannot classify channel '{}' for writing", ch.name))
        })?;
        let mut plane = Vec::with_capacity(width * height);
        for y in 0..height as u32 {
            for x in 0..width as u32 {
                let px = image.pixel(x, y);
                plane.push(match role {
                    Role::R => px[0],
                    Role::G => px[1],
                    Role::B => px[2],
                    Role::A => px[3],
                });
            }
        }
        planes.push(plane);
    }
    Ok(planes)
}

fn encode_none_block(
    header: &ExrHeader,
    planes: &[Vec<f32>],
    width: usize,
    first_y: usize,
    line_count: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    for line in 0..line_count {
        let y = first_y + line;
        for x in 0..width {
            for (ci, ch) in header.channels.iter().enumerate() {
                let bytes = sample_to_bytes(planes[ci][y * width + x], ch.pixel_type);
                out.extend_from_slice(&bytes[..ch.pixel_type.byte_size()]);
            }
        }
    }
    out
}

fn decode_none_block(
    header: &ExrHeader,
    data: &[u8],
    width: usize,
    line_count: usize,
) -> Result<Vec<Vec<f32>>> {
    let n = header.channels.len();
    let mut planes = vec![vec![0.0f32; width * line_count]; n];
    let mut cursor = 0usize;
    for line in 0..line_count {
        for x in 0..width {
            for (ci, ch) in header.channels.iter().enumerate() {
                let size = ch.pixel_type.byte_size();
                if cursor + size > data.len() {
                    return Err(Error::truncated("EXR block ended mid-scanline"));
                }
                planes[ci][line * width + x] = bytes_to_sample(&data[cursor..cursor + size], ch.pixel_type);
                cursor += size;
            }
        }
    }
    Ok(planes)
}

fn encode_planar_block(
    header: &ExrHeader,
    planes: &[Vec<f32>],
    width: usize,
    first_y: usize,
    line_count: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    for line in 0..line_count {
        let y = first_y + line;
        for (ci, ch) in header.channels.iter().enumerate() {
            for x in 0..width {
                let bytes = sample_to_bytes(planes[ci][y * width + x], ch.pixel_type);
                out.extend_from_slice(&bytes[..ch.pixel_type.byte_size()]);
            }
        }
    }
    out
}

fn decode_planar_block(
    header: &ExrHeader,
    data: &[u8],
    width: usize,
    line_count: usize,
) -> Result<Vec<Vec<f32>>> {
    let n = header.channels.len();
    let mut planes = vec![vec![0.0f32; width * line_count]; n];
    let mut cursor = 0usize;
    for line in 0..line_count {
        for (ci, ch) in header.channels.iter().enumerate() {
            let size = ch.pixel_type.byte_size();
            for x in 0..width {
                if cursor + size > data.len() {
                    return Err(Error::truncated("EXR block ended mid-channel row"));
                }
                planes[ci][line * width + x] = bytes_to_sample(&data[cursor..cursor + size], ch.pixel_type);
                cursor += size;
            }
        }
    }
    Ok(planes)
}

fn encode_pxr24_block(
    header: &ExrHeader,
    planes: &[Vec<f32>],
    width: usize,
    first_y: usize,
    line_count: usize,
) -> Vec<u8> {
    let mut buffers: Vec<Vec<u8>> = Vec::with_capacity(line_count * header.channels.len());
    let mut types: Vec<PixelType> = Vec::with_capacity(buffers.capacity());
    for line in 0..line_count {
        let y = first_y + line;
        for (ci, ch) in header.channels.iter().enumerate() {
            let mut buf = Vec::with_capacity(width * ch.pixel_type.byte_size());
            for x in 0..width {
                let bytes = sample_to_bytes(planes[ci][y * width + x], ch.pixel_type);
                buf.extend_from_slice(&bytes[..ch.pixel_type.byte_size()]);
            }
            buffers.push(buf);
            types.push(ch.pixel_type);
        }
    }
    let segments: Vec<pxr24::Segment<'_>> = buffers
        .iter()
        .zip(types.iter())
        .map(|(b, &pt)| pxr24::Segment { pixel_type: pt, samples: b })
        .collect();
    pxr24::compress_pxr24(&segments)
}

fn decode_pxr24_block(
    header: &ExrHeader,
    data: &[u8],
    width: usize,
    line_count: usize,
) -> Result<Vec<Vec<f32>>> {
    let n = header.channels.len();
    let mut channel_order: Vec<(PixelType, usize)> = Vec::with_capacity(line_count * n);
    for _ in 0..line_count {
        for ch in &header.channels {
            channel_order.push((ch.pixel_type, width));
        }
    }
    let raw = pxr24::decompress_pxr24(data, &channel_order)?;

    let mut planes = vec![vec![0.0f32; width * line_count]; n];
    let mut idx = 0usize;
    for line in 0..line_count {
        for (ci, ch) in header.channels.iter().enumerate() {
            let bytes = &raw[idx];
            idx += 1;
            let size = ch.pixel_type.byte_size();
            for x in 0..width {
                planes[ci][line * width + x] =
                    bytes_to_sample(&bytes[x * size..(x + 1) * size], ch.pixel_type);
            }
        }
    }
    Ok(planes)
}

fn encode_piz_block(
    header: &ExrHeader,
    planes: &[Vec<f32>],
    width: usize,
    first_y: usize,
    line_count: usize,
) -> Vec<u8> {
    let n = header.channels.len();
    let mut raw_channel_data: Vec<Vec<u16>> = Vec::with_capacity(n);
    for plane in planes.iter() {
        let mut v = Vec::with_capacity(width * line_count);
        for line in 0..line_count {
            let y = first_y + line;
            for x in 0..width {
                v.push(encode_half(plane[y * width + x]));
            }
        }
        raw_channel_data.push(v);
    }
    let raw_concat: Vec<u16> = raw_channel_data.iter().flatten().copied().collect();
    let (bitmap, _min, _max) = piz::build_piz_bitmap(&raw_concat);
    let (forward, _reverse, _max_value) = piz::build_piz_lut(&bitmap);

    let mut channel_index_planes: Vec<Vec<u16>> = raw_channel_data
        .iter()
        .map(|ch| ch.iter().map(|&v| forward[v as usize]).collect())
        .collect();
    for plane in channel_index_planes.iter_mut() {
        piz::haar_encode_2d(plane, width, line_count);
    }
    piz::compress_piz(&channel_index_planes, &raw_concat)
}

fn decode_piz_block(
    header: &ExrHeader,
    data: &[u8],
    width: usize,
    line_count: usize,
) -> Result<Vec<Vec<f32>>> {
    let n = header.channels.len();
    let plane_lens = vec![width * line_count; n];
    let (index_planes, reverse) = piz::decompress_piz(data, &plane_lens)?;

    let mut planes = Vec::with_capacity(n);
    for mut plane in index_planes {
        piz::haar_decode_2d(&mut plane, width, line_count);
        let mut out = Vec::with_capacity(width * line_count);
        for &idx in &plane {
            let raw = *reverse
                .get(idx as usize)
                .ok_or_else(|| Error::decode_fault("PIZ: LUT index out of range"))?;
            out.push(decode_half(raw));
        }
        planes.push(out);
    }
    Ok(planes)
}

fn encode_block(
    header: &ExrHeader,
    planes: &[Vec<f32>],
    width: usize,
    first_y: usize,
    line_count: usize,
) -> Vec<u8> {
    match header.compression {
        Compression::None => encode_none_block(header, planes, width, first_y, line_count),
        Compression::Rle | Compression::Zip | Compression::Zips => {
            let planar = encode_planar_block(header, planes, width, first_y, line_count);
            compression::compress_predictor_based(header.compression, &planar)
        }
        Compression::Piz => encode_piz_block(header, planes, width, first_y, line_count),
        Compression::Pxr24 => encode_pxr24_block(header, planes, width, first_y, line_count),
    }
}

fn decode_block(
    header: &ExrHeader,
    data: &[u8],
    width: usize,
    line_count: usize,
) -> Result<Vec<Vec<f32>>> {
    match header.compression {
        Compression::None => decode_none_block(header, data, width, line_count),
        Compression::Rle | Compression::Zip | Compression::Zips => {
            let expected: usize = header
                .channels
                .iter()
                .map(|c| c.pixel_type.byte_size())
                .sum::<usize>()
                * width
                * line_count;
            let planar = compression::decompress_predictor_based(header.compression, data, expected)?;
            decode_planar_block(header, &planar, width, line_count)
        }
        Compression::Piz => decode_piz_block(header, data, width, line_count),
        Compression::Pxr24 => decode_pxr24_block(header, data, width, line_count),
    }
}

/// Serializes the offset table and every scan-line block for `image`,
/// assuming `header_len` bytes (magic through header terminator) already
/// precede this output in the file.
pub fn write_body(header: &ExrHeader, image: &HdrifyImage, header_len: usize) -> Result<Vec<u8>> {
    let width = header.data_window.width() as usize;
    let height = header.data_window.height() as usize;
    let planes = build_channel_planes_for_write(header, image)?;

    let block_height = header.compression.block_height() as usize;
    let block_count = height.div_ceil(block_height);
    let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(block_count);

    for block_idx in 0..block_count {
        let first_y = block_idx * block_height;
        let line_count = block_height.min(height - first_y);
        let payload = encode_block(header, &planes, width, first_y, line_count);

        let mut block = Vec::with_capacity(8 + payload.len());
        let first_line_y = header.data_window.y_min + first_y as i32;
        block.extend_from_slice(&first_line_y.to_le_bytes());
        block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        block.extend_from_slice(&payload);
        blocks.push(block);
    }

    let table_bytes = block_count * 8;
    let mut out = Vec::with_capacity(table_bytes + blocks.iter().map(Vec::len).sum::<usize>());
    let mut cursor = (header_len + table_bytes) as u64;
    for block in &blocks {
        out.extend_from_slice(&cursor.to_le_bytes());
        cursor += block.len() as u64;
    }
    for block in blocks {
        out.extend_from_slice(&block);
    }
    Ok(out)
}

fn read_offsets(bytes: &[u8], start: usize, count: usize) -> Result<Vec<u64>> {
    let needed = count * 8;
    if start + needed > bytes.len() {
        return Err(Error::truncated("offset table runs past end of file"));
    }
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let pos = start + i * 8;
        offsets.push(u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap()));
    }
    Ok(offsets)
}

/// Resolves a raw offset-table entry to an in-bounds absolute byte offset,
/// applying the `u32` salvage and rejecting offsets inside the header or
/// past EOF.
fn resolve_offset(raw: u64, bytes_len: usize, header_end: usize) -> Result<usize> {
    let candidate = if raw as usize <= bytes_len {
        raw as usize
    } else if (raw >> 32) == 0 && (raw as u32 as usize) <= bytes_len {
        raw as u32 as usize
    } else {
        return Err(Error::truncated(format!(
            "block offset {raw} lies beyond end of file ({bytes_len} bytes)"
        )));
    };
    if candidate < header_end {
        return Err(Error::malformed_header(format!(
            "block offset {candidate} lies inside the header (ends at {header_end})"
        )));
    }
    Ok(candidate)
}

fn peek_first_line_y(bytes: &[u8], offset: usize) -> Option<i32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
}

/// Parses the offset table and every scan-line block following the header,
/// reassembling the image described by `header`.
pub fn read_body(header: &ExrHeader, bytes: &[u8], header_end: usize) -> Result<HdrifyImage> {
    let width = header.data_window.width() as usize;
    let height = header.data_window.height() as usize;

    let declared_block_height = header.compression.block_height() as usize;
    let declared_block_count = height.div_ceil(declared_block_height);

    let mut block_height = declared_block_height;
    let mut offsets = read_offsets(bytes, header_end, declared_block_count)?;

    if declared_block_count >= 2 && declared_block_height > 1 {
        if let (Ok(o0), Ok(o1)) = (
            resolve_offset(offsets[0], bytes.len(), header_end),
            resolve_offset(offsets[1], bytes.len(), header_end),
        ) {
            if let (Some(y0), Some(y1)) = (peek_first_line_y(bytes, o0), peek_first_line_y(bytes, o1)) {
                if y1 - y0 == 1 {
                    block_height = 1;
                    offsets = read_offsets(bytes, header_end, height)?;
                }
            }
        }
    }

    let n = header.channels.len();
    let mut channel_planes: Vec<Vec<f32>> = vec![vec![0.0f32; width * height]; n];

    let mut remaining_height = height;
    let mut local_y = 0usize;
    for &raw_offset in &offsets {
        if remaining_height == 0 {
            break;
        }
        let off = resolve_offset(raw_offset, bytes.len(), header_end)?;
        if off + 8 > bytes.len() {
            return Err(Error::truncated("block header runs past end of file"));
        }
        let first_line_y = i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let data_size = u32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap()) as usize;
        let data_start = off + 8;
        if data_size == 0 || data_start + data_size > bytes.len() {
            return Err(Error::truncated(format!(
                "block at offset {off} declares data size {data_size} beyond available bytes"
            )));
        }
        let data = &bytes[data_start..data_start + data_size];

        let expected_local_y = (first_line_y - header.data_window.y_min) as usize;
        let line_count = block_height.min(height - expected_local_y.min(height));
        let decoded = decode_block(header, data, width, line_count)?;

        for (ci, plane) in decoded.into_iter().enumerate() {
            for line in 0..line_count {
                let dst = (expected_local_y + line) * width;
                let src = line * width;
                channel_planes[ci][dst..dst + width].copy_from_slice(&plane[src..src + width]);
            }
        }
        local_y = expected_local_y + line_count;
        remaining_height = remaining_height.saturating_sub(line_count);
    }
    let _ = local_y;

    let mut role_index = [None; 4]; // R, G, B, A
    for (ci, ch) in header.channels.iter().enumerate() {
        if let Some(role) = classify_channel_name(&ch.name) {
            let slot = match role {
                Role::R => 0,
                Role::G => 1,
                Role::B => 2,
                Role::A => 3,
            };
            role_index[slot] = Some(ci);
        }
    }
    let r = role_index[0].ok_or_else(|| Error::channel_mismatch("EXR file is missing an R channel"))?;
    let g = role_index[1].ok_or_else(|| Error::channel_mismatch("EXR file is missing a G channel"))?;
    let b = role_index[2].ok_or_else(|| Error::channel_mismatch("EXR file is missing a B channel"))?;
    let a = role_index[3];

    let mut data = Vec::with_capacity(width * height * 4);
    for i in 0..width * height {
        data.push(channel_planes[r][i]);
        data.push(channel_planes[g][i]);
        data.push(channel_planes[b][i]);
        data.push(a.map_or(1.0, |ci| channel_planes[ci][i]));
    }

    let color_space = header
        .chromaticities
        .and_then(|c| c.classify())
        .unwrap_or(LinearColorSpace::default());

    let mut image = HdrifyImage::new(width as u32, height as u32, data, color_space)?;
    image.ensure_non_negative_finite(false)?;
    Ok(image)
}

/// Returns the channel list's declared pixel type for `name`, used by the
/// header builder to decide whether to request an alpha attribute.
pub fn has_channel_named(channels: &[Channel], name: &str) -> bool {
    channels.iter().any(|c| c.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Box2i;
    use hdrify_core::Chromaticities;

    fn rgba_header(width: i32, height: i32, compression: Compression) -> ExrHeader {
        let pixel_type = compression.channel_pixel_type();
        let mk = |name: &str| Channel {
            name: name.to_string(),
            pixel_type,
            p_linear: false,
            x_sampling: 1,
            y_sampling: 1,
        };
        ExrHeader {
            display_window: Box2i { x_min: 0, y_min: 0, x_max: width - 1, y_max: height - 1 },
            data_window: Box2i { x_min: 0, y_min: 0, x_max: width - 1, y_max: height - 1 },
            channels: vec![mk("A"), mk("B"), mk("G"), mk("R")],
            compression,
            chromaticities: Some(Chromaticities::REC709),
            line_order: 0,
            pixel_aspect_ratio: 1.0,
            screen_window_center: (0.0, 0.0),
            screen_window_width: 1.0,
        }
    }

    fn gradient_image(width: u32, height: u32) -> HdrifyImage {
        let mut img = HdrifyImage::filled(width, height, [0.0, 0.0, 0.0, 1.0], LinearColorSpace::Rec709);
        for y in 0..height {
            for x in 0..width {
                let r = x as f32 / width.max(1) as f32;
                let g = y as f32 / height.max(1) as f32;
                img.set_pixel(x, y, [r, g, 0.25, 1.0]);
            }
        }
        img
    }

    fn round_trip(compression: Compression, width: i32, height: i32) {
        let header = rgba_header(width, height, compression);
        let image = gradient_image(width as u32, height as u32);
        let header_len = 64usize; // arbitrary stand-in for a real header's length
        let body = write_body(&header, &image, header_len).unwrap();

        let mut file = vec![0u8; header_len];
        file.extend_from_slice(&body);

        let decoded = read_body(&header, &file, header_len).unwrap();
        assert_eq!(decoded.width, width as u32);
        assert_eq!(decoded.height, height as u32);
        for (a, b) in image.data.iter().zip(decoded.data.iter()) {
            assert!((a - b).abs() < 5e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn none_round_trips_exactly() {
        round_trip(Compression::None, 6, 5);
    }

    #[test]
    fn rle_round_trips_within_half_precision() {
        round_trip(Compression::Rle, 6, 5);
    }

    #[test]
    fn zip_round_trips_within_half_precision() {
        round_trip(Compression::Zip, 10, 20);
    }

    #[test]
    fn zips_round_trips_within_half_precision() {
        round_trip(Compression::Zips, 10, 3);
    }

    #[test]
    fn pxr24_round_trips_within_half_precision() {
        round_trip(Compression::Pxr24, 12, 18);
    }

    #[test]
    fn piz_round_trips_within_half_precision() {
        round_trip(Compression::Piz, 16, 33);
    }

    #[test]
    fn missing_r_channel_is_rejected_on_read() {
        let header = rgba_header(4, 4, Compression::None);
        let image = gradient_image(4, 4);
        let header_len = 32usize;
        let body = write_body(&header, &image, header_len).unwrap();
        let mut file = vec![0u8; header_len];
        file.extend_from_slice(&body);

        let mut header_without_r = header.clone();
        header_without_r.channels.retain(|c| c.name != "R");
        let err = read_body(&header_without_r, &file, header_len).unwrap_err();
        assert!(err.to_string().contains("R channel"));
    }
}
