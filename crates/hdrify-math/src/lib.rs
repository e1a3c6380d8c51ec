//! # hdrify-math
//!
//! [`Mat3`] and [`Vec3`] primitives used by `hdrify-color` to build and apply
//! RGB↔XYZ and linear-to-linear color matrices.
//!
//! # Design
//!
//! Matrices are stored **row-major** and multiply **column vectors**:
//!
//! ```text
//! result = matrix * vector
//! ```
//!
//! # Usage
//!
//! ```rust
//! use hdrify_math::{Mat3, Vec3};
//!
//! let rgb_to_xyz = Mat3::from_rows([
//!     [0.4124564, 0.3575761, 0.1804375],
//!     [0.2126729, 0.7151522, 0.0721750],
//!     [0.0193339, 0.1191920, 0.9503041],
//! ]);
//!
//! let rgb = Vec3::new(1.0, 0.5, 0.25);
//! let xyz = rgb_to_xyz * rgb;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod mat3;
mod vec3;

pub use mat3::*;
pub use vec3::*;

/// Re-export of the `glam` types `Mat3`/`Vec3` convert to and from.
pub mod glam {
    pub use ::glam::{Mat3 as GlamMat3, Vec3 as GlamVec3};
}
