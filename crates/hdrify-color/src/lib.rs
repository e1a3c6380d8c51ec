//! # hdrify-color
//!
//! The color matrix module: CIE-xy chromaticities → RGB↔XYZ matrix
//! construction (Lindbloom's method), linear-to-linear conversion between
//! Rec.709, P3, and Rec.2020, and the sRGB transfer function re-exported
//! from `hdrify-transfer` so callers get the whole "color module" from one
//! crate.
//!
//! # Example
//!
//! ```rust
//! use hdrify_color::{linear_to_linear_matrix, apply_matrix_rgba};
//! use hdrify_core::LinearColorSpace;
//!
//! let m = linear_to_linear_matrix(LinearColorSpace::Rec709, LinearColorSpace::P3).unwrap();
//! let mut rgba = [1.0_f32, 1.0, 1.0, 1.0];
//! apply_matrix_rgba(&m, &mut rgba);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::sync::OnceLock;

use hdrify_core::{Chromaticities, LinearColorSpace};
use hdrify_math::{Mat3, Vec3};

pub use hdrify_transfer::{srgb_eotf, srgb_oetf};

/// Converts CIE xy chromaticity to XYZ with `Y = 1`.
fn xy_to_xyz(x: f32, y: f32) -> Vec3 {
    if y.abs() < 1e-10 {
        Vec3::ZERO
    } else {
        Vec3::new(x / y, 1.0, (1.0 - x - y) / y)
    }
}

/// Builds the RGB→XYZ matrix for a set of chromaticities, following
/// Lindbloom's method: the primaries become the matrix columns, scaled so
/// that `(1, 1, 1)` in RGB maps exactly to the white point's XYZ.
///
/// # Example
///
/// ```rust
/// use hdrify_color::chromaticities_to_rgb_xyz;
/// use hdrify_core::Chromaticities;
///
/// let m = chromaticities_to_rgb_xyz(&Chromaticities::REC709);
/// assert!((m.m[0][0] - 0.4124564).abs() < 1e-3);
/// ```
pub fn chromaticities_to_rgb_xyz(ch: &Chromaticities) -> Mat3 {
    let r_xyz = xy_to_xyz(ch.red_x, ch.red_y);
    let g_xyz = xy_to_xyz(ch.green_x, ch.green_y);
    let b_xyz = xy_to_xyz(ch.blue_x, ch.blue_y);
    let w_xyz = xy_to_xyz(ch.white_x, ch.white_y);

    let m = Mat3::from_col_vecs(r_xyz, g_xyz, b_xyz);
    let s = m.inverse().unwrap_or(Mat3::IDENTITY) * w_xyz;

    Mat3::from_col_vecs(r_xyz * s.x, g_xyz * s.y, b_xyz * s.z)
}

/// Builds the XYZ→RGB matrix for a set of chromaticities (the inverse of
/// [`chromaticities_to_rgb_xyz`]).
pub fn rgb_xyz_to_chromaticities(ch: &Chromaticities) -> Mat3 {
    chromaticities_to_rgb_xyz(ch).inverse().unwrap_or(Mat3::IDENTITY)
}

/// Generic linear-to-linear conversion matrix for arbitrary chromaticities
/// (e.g. ones parsed from an EXR header that don't match one of the three
/// named [`LinearColorSpace`] variants): `inv(rgbXyz(to)) * rgbXyz(from)`.
///
/// No chromatic adaptation is applied; all chromaticities this crate deals
/// with share the D65 white point.
pub fn generic_linear_to_linear_matrix(from: &Chromaticities, to: &Chromaticities) -> Mat3 {
    let from_to_xyz = chromaticities_to_rgb_xyz(from);
    let xyz_to_dst = chromaticities_to_rgb_xyz(to).inverse().unwrap_or(Mat3::IDENTITY);
    xyz_to_dst * from_to_xyz
}

static REC709_TO_P3: OnceLock<Mat3> = OnceLock::new();
static P3_TO_REC709: OnceLock<Mat3> = OnceLock::new();
static REC709_TO_REC2020: OnceLock<Mat3> = OnceLock::new();
static REC2020_TO_REC709: OnceLock<Mat3> = OnceLock::new();
static P3_TO_REC2020: OnceLock<Mat3> = OnceLock::new();
static REC2020_TO_P3: OnceLock<Mat3> = OnceLock::new();

/// Returns the cached linear-to-linear conversion matrix between two
/// [`LinearColorSpace`]s, computed on first use and process-wide read-only
/// after that.
///
/// Returns `None` when `from == to` — the caller should skip the matrix
/// multiply entirely rather than apply an identity.
///
/// # Example
///
/// ```rust
/// use hdrify_color::linear_to_linear_matrix;
/// use hdrify_core::LinearColorSpace;
///
/// assert!(linear_to_linear_matrix(LinearColorSpace::Rec709, LinearColorSpace::Rec709).is_none());
/// assert!(linear_to_linear_matrix(LinearColorSpace::Rec709, LinearColorSpace::P3).is_some());
/// ```
pub fn linear_to_linear_matrix(from: LinearColorSpace, to: LinearColorSpace) -> Option<Mat3> {
    use LinearColorSpace::*;
    let cell = match (from, to) {
        (Rec709, Rec709) | (P3, P3) | (Rec2020, Rec2020) => return None,
        (Rec709, P3) => &REC709_TO_P3,
        (P3, Rec709) => &P3_TO_REC709,
        (Rec709, Rec2020) => &REC709_TO_REC2020,
        (Rec2020, Rec709) => &REC2020_TO_REC709,
        (P3, Rec2020) => &P3_TO_REC2020,
        (Rec2020, P3) => &REC2020_TO_P3,
    };
    Some(*cell.get_or_init(|| {
        generic_linear_to_linear_matrix(&from.chromaticities(), &to.chromaticities())
    }))
}

/// Applies a row-major 3×3 matrix to every pixel's RGB triplet of a
/// stride-4 RGBA buffer in place; alpha passes through unchanged.
///
/// # Panics
///
/// Panics if `rgba.len()` is not a multiple of 4.
pub fn apply_matrix_rgba(m: &Mat3, rgba: &mut [f32]) {
    assert_eq!(rgba.len() % 4, 0, "RGBA buffer length must be a multiple of 4");
    for px in rgba.chunks_exact_mut(4) {
        let rgb = Vec3::new(px[0], px[1], px[2]);
        let out = *m * rgb;
        px[0] = out.x;
        px[1] = out.y;
        px[2] = out.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rec709_to_xyz_matches_known_values() {
        let m = chromaticities_to_rgb_xyz(&Chromaticities::REC709);
        assert_relative_eq!(m.m[0][0], 0.4124564, epsilon = 1e-3);
        assert_relative_eq!(m.m[1][0], 0.2126729, epsilon = 1e-3);
        assert_relative_eq!(m.m[2][2], 0.9503041, epsilon = 1e-3);
    }

    #[test]
    fn white_point_maps_to_y_one() {
        let m = chromaticities_to_rgb_xyz(&Chromaticities::P3);
        let white = m * Vec3::ONE;
        assert_relative_eq!(white.y, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn identity_space_pair_returns_none() {
        assert!(linear_to_linear_matrix(LinearColorSpace::P3, LinearColorSpace::P3).is_none());
    }

    #[test]
    fn distinct_spaces_round_trip_through_forward_and_inverse() {
        let fwd = linear_to_linear_matrix(LinearColorSpace::Rec709, LinearColorSpace::Rec2020)
            .unwrap();
        let back = linear_to_linear_matrix(LinearColorSpace::Rec2020, LinearColorSpace::Rec709)
            .unwrap();
        let white = Vec3::new(1.0, 1.0, 1.0);
        let round = back * (fwd * white);
        assert_relative_eq!(round.x, white.x, epsilon = 1e-4);
        assert_relative_eq!(round.y, white.y, epsilon = 1e-4);
        assert_relative_eq!(round.z, white.z, epsilon = 1e-4);
    }

    #[test]
    fn apply_matrix_rgba_leaves_alpha_untouched() {
        let m = linear_to_linear_matrix(LinearColorSpace::Rec709, LinearColorSpace::P3).unwrap();
        let mut rgba = [0.2_f32, 0.4, 0.6, 0.73];
        apply_matrix_rgba(&m, &mut rgba);
        assert_eq!(rgba[3], 0.73);
    }

    #[test]
    fn apply_matrix_rgba_is_identity_free_for_matching_spaces() {
        // Gamut-preserving white stays white under any of the three spaces.
        for (from, to) in [
            (LinearColorSpace::Rec709, LinearColorSpace::P3),
            (LinearColorSpace::P3, LinearColorSpace::Rec2020),
        ] {
            let m = linear_to_linear_matrix(from, to).unwrap();
            let mut rgba = [1.0_f32, 1.0, 1.0, 1.0];
            apply_matrix_rgba(&m, &mut rgba);
            assert_relative_eq!(rgba[0], 1.0, epsilon = 1e-3);
            assert_relative_eq!(rgba[1], 1.0, epsilon = 1e-3);
            assert_relative_eq!(rgba[2], 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn srgb_transfer_is_reexported() {
        assert!((srgb_oetf(srgb_eotf(0.5)) - 0.5).abs() < 1e-5);
    }
}
