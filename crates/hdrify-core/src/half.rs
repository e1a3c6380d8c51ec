//! IEEE-754 binary16 (half-float) ↔ 32-bit float conversion.
//!
//! OpenEXR's `HALF` channel type and the PIZ/PXR24 compression kernels all
//! operate on half-float samples. This module is the single place that
//! converts between the two representations so every other crate in the
//! workspace can stay in `f32`. The conversion itself is delegated to
//! [`half::f16`], the same crate the teacher pulls in wherever it needs
//! bit-exact binary16 handling (`vfx-core::pixel`, `vfx-exr`'s deep-sample
//! path, `vfx-io`'s KTX and deep-data codecs).
//!
//! # Example
//!
//! ```rust
//! use hdrify_core::half::{decode_half, encode_half};
//!
//! let h = encode_half(1.5);
//! assert_eq!(decode_half(h), 1.5);
//! ```

use half::f16;

/// Decodes a 16-bit IEEE-754 half-float into an `f32`.
///
/// Thin wrapper over [`f16::from_bits`]/[`f16::to_f32`], which already
/// implement the binary16 layout (1 sign bit, 5 exponent bits, 10 mantissa
/// bits) including signed zero, subnormals, infinities, and NaN.
pub fn decode_half(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Encodes an `f32` into a 16-bit IEEE-754 half-float, rounding to nearest
/// with ties-to-even.
///
/// Values outside the half range saturate to `±infinity`; NaN inputs
/// produce a half NaN. Thin wrapper over [`f16::from_f32`]/[`f16::to_bits`].
pub fn encode_half(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trips(v: f32) {
        let h = encode_half(v);
        let back = decode_half(h);
        let tol = (v.abs() * (2f32).powi(-10)).max(2f32.powi(-24));
        assert!(
            (back - v).abs() <= tol,
            "v={v} back={back} tol={tol} bits={h:#06x}"
        );
    }

    #[test]
    fn exact_small_integers_round_trip_exactly() {
        for v in [0.0f32, 1.0, -1.0, 2.0, 0.5, -0.5, 3.5, 100.0] {
            assert_eq!(decode_half(encode_half(v)), v);
        }
    }

    #[test]
    fn known_bit_patterns() {
        assert_eq!(encode_half(1.0), 0x3C00);
        assert_eq!(encode_half(-1.0), 0xBC00);
        assert_eq!(encode_half(0.0), 0x0000);
        assert_eq!(encode_half(2.0), 0x4000);
        assert_eq!(decode_half(0x3C00), 1.0);
    }

    #[test]
    fn infinities_saturate() {
        assert_eq!(encode_half(1.0e9), 0x7C00);
        assert_eq!(encode_half(-1.0e9), 0xFC00);
        assert_eq!(decode_half(0x7C00), f32::INFINITY);
        assert_eq!(decode_half(0xFC00), f32::NEG_INFINITY);
    }

    #[test]
    fn nan_round_trips_as_nan() {
        assert!(decode_half(encode_half(f32::NAN)).is_nan());
    }

    #[test]
    fn subnormals_round_trip_within_tolerance() {
        for v in [6.0e-5f32, 1.0e-5, 3.0e-6, -4.5e-5] {
            assert_round_trips(v);
        }
    }

    #[test]
    fn normalized_values_round_trip_within_spec_tolerance() {
        for i in 1..2000 {
            let v = i as f32 * 0.073;
            assert_round_trips(v);
        }
    }

    #[test]
    fn smallest_subnormal_flushes_below_threshold() {
        assert_eq!(encode_half(1.0e-20), 0x0000);
    }
}
