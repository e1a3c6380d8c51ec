//! Zero-run-length raw byte codec (the `RLE` and `ZIPS`-adjacent `none`
//! compressions both build on top of this; `RLE` wraps it with the shared
//! predictor/reorder pipeline).

use hdrify_core::{Error, Result};

const MIN_RUN_LENGTH: i32 = 3;
const MAX_RUN_LENGTH: i32 = 127;

/// Decompresses a raw RLE byte stream. `expected_size` bounds the output so
/// a malicious or corrupt control byte cannot allocate unbounded memory.
pub fn decompress_rle_raw(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.min(1 << 20));
    let mut i = 0usize;
    while i < compressed.len() {
        let count = compressed[i] as i8 as i32;
        i += 1;
        if count < 0 {
            let n = (-count) as usize;
            if i + n > compressed.len() {
                return Err(Error::truncated("RLE literal run exceeds input"));
            }
            out.extend_from_slice(&compressed[i..i + n]);
            i += n;
        } else {
            if i >= compressed.len() {
                return Err(Error::truncated("RLE repeat run missing value byte"));
            }
            let value = compressed[i];
            i += 1;
            let n = (count + 1) as usize;
            out.resize(out.len() + n, value);
        }
        if out.len() > expected_size {
            return Err(Error::decode_fault("RLE output exceeded expected block size"));
        }
    }
    if out.len() != expected_size {
        return Err(Error::decode_fault(format!(
            "RLE decoded {} bytes, expected {expected_size}",
            out.len()
        )));
    }
    Ok(out)
}

/// Compresses `data` with zero-run-length encoding, greedily preferring the
/// longest same-byte run at each position and falling back to literal runs
/// capped at [`MAX_RUN_LENGTH`].
pub fn compress_rle_raw(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0usize;
    while i < data.len() {
        let mut run_len = 1i32;
        while run_len < MAX_RUN_LENGTH
            && (i + run_len as usize) < data.len()
            && data[i + run_len as usize] == data[i]
        {
            run_len += 1;
        }

        if run_len >= MIN_RUN_LENGTH {
            out.push((run_len - 1) as u8);
            out.push(data[i]);
            i += run_len as usize;
        } else {
            let start = i;
            let mut lit_len = 1i32;
            i += 1;
            while i < data.len() && lit_len < MAX_RUN_LENGTH {
                let remaining_run = {
                    let mut r = 1usize;
                    while r < MIN_RUN_LENGTH as usize
                        && i + r < data.len()
                        && data[i + r] == data[i]
                    {
                        r += 1;
                    }
                    r
                };
                if remaining_run >= MIN_RUN_LENGTH as usize {
                    break;
                }
                lit_len += 1;
                i += 1;
            }
            out.push((-lit_len) as i8 as u8);
            out.extend_from_slice(&data[start..start + lit_len as usize]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_repeated_and_literal_bytes() {
        let original: Vec<u8> = (0..10).map(|_| 7u8).chain([1, 2, 3, 4]).collect();
        let compressed = compress_rle_raw(&original);
        let decompressed = decompress_rle_raw(&compressed, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn round_trips_empty_input() {
        let compressed = compress_rle_raw(&[]);
        let decompressed = decompress_rle_raw(&compressed, 0).unwrap();
        assert_eq!(decompressed, Vec::<u8>::new());
    }

    #[test]
    fn round_trips_single_byte() {
        let compressed = compress_rle_raw(&[42]);
        let decompressed = decompress_rle_raw(&compressed, 1).unwrap();
        assert_eq!(decompressed, vec![42]);
    }

    #[test]
    fn rejects_output_that_overshoots_expected_size() {
        // control byte requesting a 10-byte repeat, but only 1 expected.
        let malformed = vec![9u8, 5];
        assert!(decompress_rle_raw(&malformed, 1).is_err());
    }
}
