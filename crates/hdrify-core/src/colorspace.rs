//! The three linear color spaces `hdrify` moves HDR pixel data between, and
//! the chromaticity primaries that define them.
//!
//! # Overview
//!
//! [`LinearColorSpace`] is the runtime tag stored on every [`crate::image::HdrifyImage`].
//! [`Chromaticities`] is the raw CIE xy primaries/white point pair read from
//! (or written to) an EXR `chromaticities` attribute; `hdrify-color` builds
//! RGB↔XYZ matrices from it.
//!
//! This crate intentionally does not encode *which* RGB↔XYZ matrix belongs to
//! each space — that is `hdrify-color`'s job, kept separate so `hdrify-core`
//! has no dependency on `hdrify-math`.

use std::fmt;

/// The linear working color space of an [`crate::image::HdrifyImage`].
///
/// All three are scene-referred (linear, not gamma-encoded) RGB spaces that
/// differ only in their chromaticity primaries and white point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearColorSpace {
    /// Rec.709 / sRGB primaries, linear light. The default when an EXR file
    /// carries no `chromaticities` attribute.
    Rec709,
    /// DCI-P3 / Display P3 primaries, linear light.
    P3,
    /// ITU-R BT.2020 (Rec.2020) primaries, linear light.
    Rec2020,
}

impl LinearColorSpace {
    /// The metadata string stored under `HdrifyImage::metadata["colorSpace"]`
    /// and used by readers/writers for round-tripping (`"linear-rec709"`,
    /// `"linear-p3"`, `"linear-rec2020"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rec709 => "linear-rec709",
            Self::P3 => "linear-p3",
            Self::Rec2020 => "linear-rec2020",
        }
    }

    /// Parses the metadata string form back into a [`LinearColorSpace`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "linear-rec709" => Some(Self::Rec709),
            "linear-p3" => Some(Self::P3),
            "linear-rec2020" => Some(Self::Rec2020),
            _ => None,
        }
    }

    /// The canonical [`Chromaticities`] for this space.
    pub fn chromaticities(&self) -> Chromaticities {
        match self {
            Self::Rec709 => Chromaticities::REC709,
            Self::P3 => Chromaticities::P3,
            Self::Rec2020 => Chromaticities::REC2020,
        }
    }
}

impl Default for LinearColorSpace {
    /// EXR files without a `chromaticities` attribute default to Rec.709,
    /// per §4.7 of the format specification.
    fn default() -> Self {
        Self::Rec709
    }
}

impl fmt::Display for LinearColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The CIE xy chromaticities of an RGB color space's three primaries and its
/// white point, as stored in an EXR `chromaticities` header attribute.
///
/// # Example
///
/// ```rust
/// use hdrify_core::Chromaticities;
///
/// let rec709 = Chromaticities::REC709;
/// assert!((rec709.red_x - 0.64).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {
    /// Red primary x.
    pub red_x: f32,
    /// Red primary y.
    pub red_y: f32,
    /// Green primary x.
    pub green_x: f32,
    /// Green primary y.
    pub green_y: f32,
    /// Blue primary x.
    pub blue_x: f32,
    /// Blue primary y.
    pub blue_y: f32,
    /// White point x.
    pub white_x: f32,
    /// White point y.
    pub white_y: f32,
}

impl Chromaticities {
    /// Rec.709 / sRGB primaries with the D65 white point.
    pub const REC709: Self = Self {
        red_x: 0.6400,
        red_y: 0.3300,
        green_x: 0.3000,
        green_y: 0.6000,
        blue_x: 0.1500,
        blue_y: 0.0600,
        white_x: 0.3127,
        white_y: 0.3290,
    };

    /// DCI-P3 primaries with the D65 white point.
    pub const P3: Self = Self {
        red_x: 0.6800,
        red_y: 0.3200,
        green_x: 0.2650,
        green_y: 0.6900,
        blue_x: 0.1500,
        blue_y: 0.0600,
        white_x: 0.3127,
        white_y: 0.3290,
    };

    /// ITU-R BT.2020 primaries with the D65 white point.
    pub const REC2020: Self = Self {
        red_x: 0.7080,
        red_y: 0.2920,
        green_x: 0.1700,
        green_y: 0.7970,
        blue_x: 0.1310,
        blue_y: 0.0460,
        white_x: 0.3127,
        white_y: 0.3290,
    };

    /// Returns the eight values in the wire order EXR stores them:
    /// `[redX, redY, greenX, greenY, blueX, blueY, whiteX, whiteY]`.
    pub fn to_array(&self) -> [f32; 8] {
        [
            self.red_x,
            self.red_y,
            self.green_x,
            self.green_y,
            self.blue_x,
            self.blue_y,
            self.white_x,
            self.white_y,
        ]
    }

    /// Builds a [`Chromaticities`] from the eight wire-order values.
    pub fn from_array(v: [f32; 8]) -> Self {
        Self {
            red_x: v[0],
            red_y: v[1],
            green_x: v[2],
            green_y: v[3],
            blue_x: v[4],
            blue_y: v[5],
            white_x: v[6],
            white_y: v[7],
        }
    }

    /// Matches one of the three [`LinearColorSpace`] variants' canonical
    /// chromaticities within a small tolerance, falling back to `None` for
    /// arbitrary primaries (a caller may still build a matrix from them via
    /// `hdrify-color`'s generic `chromaticities_to_rgb_xyz`).
    pub fn classify(&self) -> Option<LinearColorSpace> {
        const TOL: f32 = 1e-3;
        let close = |a: &Self, b: &Self| {
            (a.red_x - b.red_x).abs() < TOL
                && (a.red_y - b.red_y).abs() < TOL
                && (a.green_x - b.green_x).abs() < TOL
                && (a.green_y - b.green_y).abs() < TOL
                && (a.blue_x - b.blue_x).abs() < TOL
                && (a.blue_y - b.blue_y).abs() < TOL
                && (a.white_x - b.white_x).abs() < TOL
                && (a.white_y - b.white_y).abs() < TOL
        };
        if close(self, &Self::REC709) {
            Some(LinearColorSpace::Rec709)
        } else if close(self, &Self::P3) {
            Some(LinearColorSpace::P3)
        } else if close(self, &Self::REC2020) {
            Some(LinearColorSpace::Rec2020)
        } else {
            None
        }
    }
}

impl Default for Chromaticities {
    /// Defaults to Rec.709, matching [`LinearColorSpace::default`].
    fn default() -> Self {
        Self::REC709
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_metadata_string() {
        for cs in [
            LinearColorSpace::Rec709,
            LinearColorSpace::P3,
            LinearColorSpace::Rec2020,
        ] {
            assert_eq!(LinearColorSpace::parse(cs.as_str()), Some(cs));
        }
    }

    #[test]
    fn unknown_string_fails_to_parse() {
        assert_eq!(LinearColorSpace::parse("linear-aces"), None);
    }

    #[test]
    fn classify_recovers_named_space_from_chromaticities() {
        let ch = LinearColorSpace::Rec2020.chromaticities();
        assert_eq!(ch.classify(), Some(LinearColorSpace::Rec2020));
    }

    #[test]
    fn classify_returns_none_for_arbitrary_primaries() {
        let ch = Chromaticities {
            red_x: 0.71,
            red_y: 0.29,
            green_x: 0.20,
            green_y: 0.78,
            blue_x: 0.14,
            blue_y: 0.03,
            white_x: 0.3127,
            white_y: 0.3290,
        };
        assert_eq!(ch.classify(), None);
    }

    #[test]
    fn array_round_trip_is_exact() {
        let ch = Chromaticities::P3;
        assert_eq!(Chromaticities::from_array(ch.to_array()), ch);
    }
}
