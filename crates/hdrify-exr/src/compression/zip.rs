//! Zlib/deflate raw byte codec shared by the `ZIP` and `ZIPS` compression
//! methods (they differ only in block height, handled by the block engine).

use hdrify_core::{Error, Result};
use miniz_oxide::deflate::compress_to_vec_zlib;
use zune_inflate::{DeflateDecoder, DeflateOptions};

/// Inflates a zlib stream, bounding the output at `expected_size`.
pub fn decompress_zip_raw(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let options = DeflateOptions::default()
        .set_limit(expected_size)
        .set_size_hint(expected_size);
    let mut decoder = DeflateDecoder::new_with_options(compressed, options);
    let out = decoder
        .decode_zlib()
        .map_err(|e| Error::decode_fault(format!("zlib inflate failed: {e}")))?;
    if out.len() != expected_size {
        return Err(Error::decode_fault(format!(
            "zlib decoded {} bytes, expected {expected_size}",
            out.len()
        )));
    }
    Ok(out)
}

/// Deflates `data` as zlib at a fixed compression level, matching the
/// reference implementation's choice of level 4 (a speed/ratio compromise,
/// not maximum compression).
pub fn compress_zip_raw(data: &[u8]) -> Vec<u8> {
    compress_to_vec_zlib(data, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_typical_data() {
        let original: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress_zip_raw(&original);
        let decompressed = decompress_zip_raw(&compressed, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn round_trips_empty_input() {
        let compressed = compress_zip_raw(&[]);
        let decompressed = decompress_zip_raw(&compressed, 0).unwrap();
        assert_eq!(decompressed, Vec::<u8>::new());
    }

    #[test]
    fn round_trips_large_uniform_buffer() {
        let original = vec![0xABu8; 1 << 16];
        let compressed = compress_zip_raw(&original);
        assert!(compressed.len() < original.len());
        let decompressed = decompress_zip_raw(&compressed, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn rejects_size_mismatch() {
        let original = vec![1u8, 2, 3, 4];
        let compressed = compress_zip_raw(&original);
        assert!(decompress_zip_raw(&compressed, 3).is_err());
    }
}
