//! Compression kernel dispatch (component C6).
//!
//! Each submodule implements one kernel's raw byte transform in isolation;
//! this module wires them to [`crate::header::Compression`] and owns the
//! predictor/reorder pipeline shared by `RLE`/`ZIP`/`ZIPS`.

pub mod piz;
pub mod predictor;
pub mod pxr24;
pub mod rle;
pub mod zip;

use hdrify_core::{Error, Result};

use crate::header::Compression;

/// Compresses one block's planar byte buffer with the predictor+reorder
/// pipeline feeding RLE or ZIP/ZIPS. Never called for `none` (raw
/// pixel-interleaved, uncompressed) or PIZ/PXR24 (their own structured
/// per-channel paths in [`scanline`](crate::scanline) call into [`piz`] /
/// [`pxr24`] directly, since both need per-channel sample metadata the flat
/// byte view here doesn't carry).
pub fn compress_predictor_based(compression: Compression, data: &[u8]) -> Vec<u8> {
    let mut predicted = predictor::reorder_write(data);
    predictor::predictor_encode(&mut predicted);
    match compression {
        Compression::Rle => rle::compress_rle_raw(&predicted),
        Compression::Zip | Compression::Zips => zip::compress_zip_raw(&predicted),
        other => unreachable!("compress_predictor_based called with {other:?}"),
    }
}

/// Inverts [`compress_predictor_based`].
pub fn decompress_predictor_based(
    compression: Compression,
    data: &[u8],
    expected_size: usize,
) -> Result<Vec<u8>> {
    let mut predicted = match compression {
        Compression::Rle => rle::decompress_rle_raw(data, expected_size)?,
        Compression::Zip | Compression::Zips => zip::decompress_zip_raw(data, expected_size)?,
        other => unreachable!("decompress_predictor_based called with {other:?}"),
    };
    predictor::predictor_decode(&mut predicted);
    Ok(predictor::reorder_read(&predicted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_round_trips_through_dispatch() {
        let original: Vec<u8> = (0..64u32).map(|i| (i % 5) as u8).collect();
        let compressed = compress_predictor_based(Compression::Rle, &original);
        let decompressed =
            decompress_predictor_based(Compression::Rle, &compressed, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn zip_round_trips_through_dispatch() {
        let original: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let compressed = compress_predictor_based(Compression::Zip, &original);
        let decompressed =
            decompress_predictor_based(Compression::Zip, &compressed, original.len()).unwrap();
        assert_eq!(decompressed, original);
    }
}
