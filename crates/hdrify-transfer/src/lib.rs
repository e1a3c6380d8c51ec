//! # hdrify-transfer
//!
//! The sRGB transfer function (IEC 61966-2-1), used to move between the
//! display-referred bytes stored in a gain-map SDR image / JPEG and the
//! linear light values the rest of `hdrify` works in.
//!
//! # Usage
//!
//! ```rust
//! use hdrify_transfer::srgb;
//!
//! let linear = srgb::eotf(0.5);
//! let back = srgb::oetf(linear);
//! assert!((back - 0.5).abs() < 1e-5);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod srgb;

pub use srgb::{eotf as srgb_eotf, oetf as srgb_oetf};
