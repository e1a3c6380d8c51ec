//! PIZ compression kernel: bitmap-compressed symbol table, a reversible 2-D
//! Haar wavelet, and canonical Huffman coding (component C6).
//!
//! This is the most involved of the five kernels. Each stage is exposed as
//! its own function so the wavelet and Huffman stages can be unit-tested in
//! isolation from the bitmap/LUT bookkeeping around them.

use hdrify_core::bits::{BitReader, BitWriter, ByteReader, ByteWriter};
use hdrify_core::{Error, Result};
use std::collections::BTreeMap;

const BITMAP_BYTES: usize = 8192; // 65536 values / 8 bits

/// Scans `samples` and returns `(bitmap, min_nonzero, max_nonzero)` where
/// `bitmap` has bit `v` set iff `v != 0` and `v` occurs at least once.
/// Bit 0 is always cleared, per the format's convention that value `0`
/// never needs an explicit table entry.
fn build_bitmap(samples: &[u16]) -> ([u8; BITMAP_BYTES], u16, u16) {
    let mut bitmap = [0u8; BITMAP_BYTES];
    for &s in samples {
        if s != 0 {
            bitmap[(s >> 3) as usize] |= 1 << (s & 7);
        }
    }
    let mut min_set = None;
    let mut max_set = None;
    for v in 1u32..=u16::MAX as u32 {
        let v = v as u16;
        if bitmap[(v >> 3) as usize] & (1 << (v & 7)) != 0 {
            if min_set.is_none() {
                min_set = Some(v);
            }
            max_set = Some(v);
        }
    }
    (bitmap, min_set.unwrap_or(0), max_set.unwrap_or(0))
}

/// Builds the forward lookup table (raw value -> compacted index) and the
/// reverse table (compacted index -> raw value) from a bitmap.
///
/// Index `0` always maps to raw value `0`; every bit set in the bitmap
/// receives the next ascending index.
fn build_lut(bitmap: &[u8; BITMAP_BYTES]) -> (Vec<u16>, Vec<u16>, u16) {
    let mut forward = vec![0u16; 65536];
    let mut reverse = vec![0u16];
    let mut next_index: u16 = 1;
    for v in 1u32..=u16::MAX as u32 {
        let v = v as u16;
        if bitmap[(v >> 3) as usize] & (1 << (v & 7)) != 0 {
            forward[v as usize] = next_index;
            reverse.push(v);
            next_index += 1;
        }
    }
    let max_value = next_index.saturating_sub(1);
    (forward, reverse, max_value)
}

/// Reversible integer Haar lifting step on one pair: `d = a - b` (wrapping),
/// `m = b + (d >> 1)` where the shift treats `d` as a signed 16-bit value.
/// Exactly invertible because `d` is carried forward unchanged.
fn lift_encode(a: u16, b: u16) -> (u16, u16) {
    let d = a.wrapping_sub(b);
    let half = ((d as i16) >> 1) as i32;
    let m = (b as i32 + half) as u16;
    (m, d)
}

fn lift_decode(m: u16, d: u16) -> (u16, u16) {
    let half = ((d as i16) >> 1) as i32;
    let b = (m as i32 - half) as u16;
    let a = b.wrapping_add(d);
    (a, b)
}

/// Applies the 2-D reversible Haar wavelet transform to a `width x height`
/// plane of compacted indices, in place. Odd boundary rows/columns fall
/// back to a 1-D lift on whichever axis is still in bounds.
pub fn haar_encode_2d(plane: &mut [u16], width: usize, height: usize) {
    haar_2d(plane, width, height, true);
}

/// Inverts [`haar_encode_2d`].
pub fn haar_decode_2d(plane: &mut [u16], width: usize, height: usize) {
    haar_2d(plane, width, height, false);
}

fn haar_2d(plane: &mut [u16], width: usize, height: usize, encode: bool) {
    if width == 0 || height == 0 {
        return;
    }
    let max_dim = width.max(height);
    let mut levels = Vec::new();
    let mut p = 1usize;
    while p < max_dim {
        levels.push(p);
        p *= 2;
    }
    let iter: Box<dyn Iterator<Item = &usize>> = if encode {
        Box::new(levels.iter())
    } else {
        Box::new(levels.iter().rev())
    };

    for &p in iter {
        let step = p * 2;
        let mut y = 0usize;
        while y < height {
            let mut x = 0usize;
            while x < width {
                let has_right = x + p < width;
                let has_down = y + p < height;
                let idx = |xx: usize, yy: usize| yy * width + xx;

                match (has_right, has_down) {
                    (true, true) => {
                        let (i00, i10, i01, i11) =
                            (idx(x, y), idx(x + p, y), idx(x, y + p), idx(x + p, y + p));
                        if encode {
                            let (l_top, h_top) = lift_encode(plane[i00], plane[i10]);
                            let (l_bot, h_bot) = lift_encode(plane[i01], plane[i11]);
                            let (ll, lh) = lift_encode(l_top, l_bot);
                            let (hl, hh) = lift_encode(h_top, h_bot);
                            plane[i00] = ll;
                            plane[i01] = lh;
                            plane[i10] = hl;
                            plane[i11] = hh;
                        } else {
                            let (l_top, l_bot) = lift_decode(plane[i00], plane[i01]);
                            let (h_top, h_bot) = lift_decode(plane[i10], plane[i11]);
                            let (a00, a10) = lift_decode(l_top, h_top);
                            let (a01, a11) = lift_decode(l_bot, h_bot);
                            plane[i00] = a00;
                            plane[i10] = a10;
                            plane[i01] = a01;
                            plane[i11] = a11;
                        }
                    }
                    (true, false) => {
                        let (i0, i1) = (idx(x, y), idx(x + p, y));
                        if encode {
                            let (m, d) = lift_encode(plane[i0], plane[i1]);
                            plane[i0] = m;
                            plane[i1] = d;
                        } else {
                            let (a, b) = lift_decode(plane[i0], plane[i1]);
                            plane[i0] = a;
                            plane[i1] = b;
                        }
                    }
                    (false, true) => {
                        let (i0, i1) = (idx(x, y), idx(x, y + p));
                        if encode {
                            let (m, d) = lift_encode(plane[i0], plane[i1]);
                            plane[i0] = m;
                            plane[i1] = d;
                        } else {
                            let (a, b) = lift_decode(plane[i0], plane[i1]);
                            plane[i0] = a;
                            plane[i1] = b;
                        }
                    }
                    (false, false) => {}
                }
                x += step;
            }
            y += step;
        }
    }
}

const RUN_MIN: u32 = 3;
const RUN_MAX: u32 = 255 + RUN_MIN as u32;

/// Canonical Huffman code table: symbol -> (code, bit length).
struct HuffmanTable {
    codes: BTreeMap<u32, (u32, u8)>,
    run_marker: u32,
}

fn build_huffman(freqs: &BTreeMap<u32, u64>, run_marker: u32) -> HuffmanTable {
    #[derive(Clone)]
    struct Node {
        freq: u64,
        symbol: Option<u32>,
        left: Option<Box<Node>>,
        right: Option<Box<Node>>,
    }

    let mut heap: Vec<Node> = freqs
        .iter()
        .map(|(&sym, &f)| Node { freq: f.max(1), symbol: Some(sym), left: None, right: None })
        .collect();

    if heap.is_empty() {
        return HuffmanTable { codes: BTreeMap::new(), run_marker };
    }
    if heap.len() == 1 {
        let mut codes = BTreeMap::new();
        codes.insert(heap[0].symbol.unwrap(), (0u32, 1u8));
        return HuffmanTable { codes, run_marker };
    }

    loop {
        heap.sort_by(|a, b| b.freq.cmp(&a.freq));
        let b = heap.pop().unwrap();
        let a = heap.pop().unwrap();
        let merged = Node {
            freq: a.freq + b.freq,
            symbol: None,
            left: Some(Box::new(a)),
            right: Some(Box::new(b)),
        };
        heap.push(merged);
        if heap.len() == 1 {
            break;
        }
    }

    let mut lengths: BTreeMap<u32, u8> = BTreeMap::new();
    fn walk(node: &Node, depth: u8, lengths: &mut BTreeMap<u32, u8>) {
        if let Some(sym) = node.symbol {
            lengths.insert(sym, depth.max(1));
        } else {
            if let Some(l) = &node.left {
                walk(l, depth + 1, lengths);
            }
            if let Some(r) = &node.right {
                walk(r, depth + 1, lengths);
            }
        }
    }
    walk(&heap[0], 0, &mut lengths);

    // Canonicalize: sort by (length, symbol), assign ascending codes.
    let mut entries: Vec<(u32, u8)> = lengths.into_iter().collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut codes = BTreeMap::new();
    let mut code: u32 = 0;
    let mut prev_len: u8 = entries.first().map(|e| e.1).unwrap_or(1);
    for (sym, len) in entries {
        if len > prev_len {
            code <<= len - prev_len;
            prev_len = len;
        }
        codes.insert(sym, (code, len));
        code += 1;
    }

    HuffmanTable { codes, run_marker }
}

fn huffman_encode(symbols: &[u32], run_marker: u32) -> Vec<u8> {
    let mut freqs: BTreeMap<u32, u64> = BTreeMap::new();
    for &s in symbols {
        *freqs.entry(s).or_insert(0) += 1;
    }
    freqs.insert(run_marker, 1);
    let table = build_huffman(&freqs, run_marker);

    let mut w = ByteWriter::new();
    w.write_u32(table.codes.len() as u32);
    for (&sym, &(_, len)) in &table.codes {
        w.write_u32(sym);
        w.write_u8(len);
    }

    let mut bits = BitWriter::new();
    let emit = |bits: &mut BitWriter, sym: u32| {
        let &(code, len) = table.codes.get(&sym).expect("symbol missing from table");
        bits.push(code, len);
    };

    let mut i = 0usize;
    while i < symbols.len() {
        let sym = symbols[i];
        let mut run = 1u32;
        while i + (run as usize) < symbols.len()
            && symbols[i + run as usize] == sym
            && run < RUN_MAX
        {
            run += 1;
        }
        if run >= RUN_MIN {
            emit(&mut bits, sym);
            emit(&mut bits, run_marker);
            bits.push(run - RUN_MIN, 8);
            i += run as usize;
        } else {
            emit(&mut bits, sym);
            i += 1;
        }
    }
    let body = bits.finish();
    w.write_u32(body.len() as u32);
    w.write_bytes(&body);
    w.into_vec()
}

/// Decodes one canonical Huffman symbol, growing the candidate code one bit
/// at a time (shortest codes first) until it matches a table entry.
fn decode_symbol(bits: &mut BitReader<'_>, decode_map: &BTreeMap<(u8, u32), u32>) -> Result<u32> {
    let mut len = 1u8;
    let mut code_val = bits.get_bits(1)?;
    loop {
        if let Some(&s) = decode_map.get(&(len, code_val)) {
            return Ok(s);
        }
        len += 1;
        if len > 32 {
            return Err(Error::decode_fault("Huffman: invalid table entry"));
        }
        code_val = (code_val << 1) | bits.get_bits(1)?;
    }
}

fn huffman_decode(data: &[u8], expected_symbol_count: usize) -> Result<Vec<u32>> {
    let mut r = ByteReader::new(data);
    let table_len = r.read_u32()? as usize;
    let mut decode_map: BTreeMap<(u8, u32), u32> = BTreeMap::new();
    let mut symbol_len = Vec::with_capacity(table_len);
    for _ in 0..table_len {
        let sym = r.read_u32()?;
        let len = r.read_u8()?;
        symbol_len.push((sym, len));
    }
    // Recreate canonical codes in the same (length, symbol) order used to encode.
    let mut entries = symbol_len.clone();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
    let mut code: u32 = 0;
    let mut prev_len = entries.first().map(|e| e.1).unwrap_or(1);
    let mut run_marker = 0u32;
    let mut max_symbol_seen = 0u32;
    for &(sym, len) in &entries {
        if len > prev_len {
            code <<= len - prev_len;
            prev_len = len;
        }
        decode_map.insert((len, code), sym);
        code += 1;
        if sym >= max_symbol_seen {
            max_symbol_seen = sym;
            run_marker = sym;
        }
    }
    // The run marker was inserted with freq 1 and is, by construction, the
    // one symbol whose only purpose is repeat signaling; since it's always
    // strictly greater than every real wavelet symbol we can identify it as
    // the maximum symbol value in the table.
    let body_len = r.read_u32()? as usize;
    let body = r.read_bytes(body_len)?;
    let mut bits = BitReader::new(body);

    let mut out = Vec::with_capacity(expected_symbol_count);
    while out.len() < expected_symbol_count {
        let sym = decode_symbol(&mut bits, &decode_map)?;
        if sym == run_marker {
            return Err(Error::decode_fault("Huffman: run marker without preceding symbol"));
        }
        out.push(sym);
        if out.len() >= expected_symbol_count {
            break;
        }

        // Speculatively decode the next code: if it's the run marker, the
        // symbol just pushed repeats `8-bit count + RUN_MIN` times in
        // total (one of which is already pushed); otherwise roll back and
        // let the outer loop decode it as an ordinary symbol.
        let snapshot = bits;
        match decode_symbol(&mut bits, &decode_map) {
            Ok(marker) if marker == run_marker => {
                let extra = bits.get_bits(8)?;
                let repeats = extra + RUN_MIN - 1;
                for _ in 0..repeats {
                    if out.len() >= expected_symbol_count {
                        break;
                    }
                    out.push(sym);
                }
            }
            _ => {
                bits = snapshot;
            }
        }
    }
    Ok(out)
}

/// Encodes a full PIZ block from its per-channel compacted-index planes
/// (already produced by [`haar_encode_2d`] on the LUT output) into the
/// on-disk kernel payload: `minNonZero, maxNonZero, bitmap slice,
/// compressedLength, huffman table + bitstream`.
pub fn compress_piz(channel_planes: &[Vec<u16>], raw_samples_for_bitmap: &[u16]) -> Vec<u8> {
    let (bitmap, min_set, max_set) = build_bitmap(raw_samples_for_bitmap);

    let mut flat = Vec::new();
    for plane in channel_planes {
        flat.extend(plane.iter().map(|&v| v as u32));
    }
    let run_marker = flat.iter().copied().max().unwrap_or(0) + 1;
    let huff_bytes = huffman_encode(&flat, run_marker);

    let mut w = ByteWriter::new();
    w.write_u16(min_set);
    w.write_u16(max_set);
    if max_set >= min_set && max_set != 0 {
        let lo = (min_set >> 3) as usize;
        let hi = (max_set >> 3) as usize;
        w.write_bytes(&bitmap[lo..=hi]);
    }
    w.write_u32(huff_bytes.len() as u32);
    w.write_bytes(&huff_bytes);
    w.into_vec()
}

/// Rebuilds the reverse LUT (compacted index -> raw value) from a bitmap,
/// without needing the forward table `build_lut` also produces.
fn reverse_lut_from_bitmap(bitmap: &[u8; BITMAP_BYTES]) -> Vec<u16> {
    let (_, reverse, _) = build_lut(bitmap);
    reverse
}

/// Decodes a PIZ block back into one compacted-index plane per channel
/// (each still needing [`haar_decode_2d`] applied by the caller, which
/// knows each channel's width/height) plus the reverse LUT (compacted
/// index -> raw u16 value) rebuilt from the block's embedded bitmap.
pub fn decompress_piz(data: &[u8], plane_lens: &[usize]) -> Result<(Vec<Vec<u16>>, Vec<u16>)> {
    let mut r = ByteReader::new(data);
    let min_set = r.read_u16()?;
    let max_set = r.read_u16()?;

    let mut bitmap = [0u8; BITMAP_BYTES];
    if max_set >= min_set && max_set != 0 {
        let lo = (min_set >> 3) as usize;
        let hi = (max_set >> 3) as usize;
        let slice = r.read_bytes(hi - lo + 1)?;
        bitmap[lo..=hi].copy_from_slice(slice);
    }
    let reverse = reverse_lut_from_bitmap(&bitmap);

    let huff_len = r.read_u32()? as usize;
    let huff_bytes = r.read_bytes(huff_len)?;
    let total: usize = plane_lens.iter().sum();
    let flat = huffman_decode(huff_bytes, total)?;

    let mut out = Vec::with_capacity(plane_lens.len());
    let mut cursor = 0usize;
    for &len in plane_lens {
        out.push(flat[cursor..cursor + len].iter().map(|&v| v as u16).collect());
        cursor += len;
    }
    Ok((out, reverse))
}

pub use build_lut as build_piz_lut;
pub use build_bitmap as build_piz_bitmap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haar_2d_round_trips_even_dimensions() {
        let w = 8usize;
        let h = 8usize;
        let mut plane: Vec<u16> = (0..(w * h) as u16).map(|v| v.wrapping_mul(37)).collect();
        let original = plane.clone();
        haar_encode_2d(&mut plane, w, h);
        haar_decode_2d(&mut plane, w, h);
        assert_eq!(plane, original);
    }

    #[test]
    fn haar_2d_round_trips_odd_dimensions() {
        let w = 7usize;
        let h = 5usize;
        let mut plane: Vec<u16> = (0..(w * h) as u16).map(|v| v.wrapping_mul(911)).collect();
        let original = plane.clone();
        haar_encode_2d(&mut plane, w, h);
        haar_decode_2d(&mut plane, w, h);
        assert_eq!(plane, original);
    }

    #[test]
    fn lut_round_trips_through_bitmap() {
        let samples = vec![0u16, 5, 5, 1000, 0, 65535, 5];
        let (bitmap, _min, _max) = build_bitmap(&samples);
        let (forward, reverse, max_value) = build_lut(&bitmap);
        for &s in &samples {
            let idx = forward[s as usize];
            assert_eq!(reverse[idx as usize], s);
            assert!(idx <= max_value);
        }
    }

    #[test]
    fn huffman_round_trips_with_runs() {
        let symbols = vec![1u32, 1, 1, 1, 1, 1, 2, 3, 3, 3, 3, 0];
        let run_marker = 99u32;
        let encoded = huffman_encode(&symbols, run_marker);
        let decoded = huffman_decode(&encoded, symbols.len()).unwrap();
        assert_eq!(decoded, symbols);
    }

    #[test]
    fn piz_block_round_trips_single_channel() {
        let w = 4usize;
        let h = 4usize;
        let raw: Vec<u16> = vec![0, 1, 1, 2, 3, 3, 3, 3, 0, 5, 5, 5, 9, 9, 1, 0];
        let (bitmap, _, _) = build_bitmap(&raw);
        let (forward, reverse, _max_value) = build_lut(&bitmap);
        let mut compacted: Vec<u16> = raw.iter().map(|&v| forward[v as usize]).collect();
        haar_encode_2d(&mut compacted, w, h);

        let compressed = compress_piz(&[compacted.clone()], &raw);
        let (planes, decoded_reverse) = decompress_piz(&compressed, &[w * h]).unwrap();
        assert_eq!(decoded_reverse, reverse);
        let mut plane0 = planes[0].clone();
        haar_decode_2d(&mut plane0, w, h);
        let recovered: Vec<u16> = plane0.iter().map(|&idx| reverse[idx as usize]).collect();
        assert_eq!(recovered, raw);
    }
}
