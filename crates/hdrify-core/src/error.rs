//! The error kinds shared by every `hdrify-*` codec crate.
//!
//! # Overview
//!
//! [`Error`] has one variant per failure class named in the format
//! specification's error handling design (`InvalidMagic`, `UnsupportedVariant`,
//! `MalformedHeader`, `Truncated`, `ChannelMismatch`, `DecodeFault`,
//! `GainMapMissing`, `NumericDomain`), plus an `Io` bridge and an `Other`
//! catch-all. Every message is a single English sentence that names the
//! failure and, where available, the offending value or byte offset.
//!
//! # Propagation
//!
//! Every `read*`/`write*` entry point in this workspace returns
//! `Result<T, Error>` (aliased here as [`Result`]) and aborts on first error —
//! no partial image is ever returned, and a per-block decode fault is fatal to
//! the whole read.
//!
//! # Usage
//!
//! ```rust
//! use hdrify_core::{Error, Result};
//!
//! fn check_magic(bytes: &[u8]) -> Result<()> {
//!     if bytes.len() < 4 || &bytes[..4] != [0x76, 0x2F, 0x31, 0x01] {
//!         return Err(Error::invalid_magic("EXR", "incorrect magic number"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error as ThisError;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes shared by the EXR, HDR, and gain-map/JPEG codecs.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The file's magic number / leading token does not match the format.
    #[error("Invalid {format} file: {reason}")]
    InvalidMagic {
        /// Which format rejected the input (`"EXR"`, `"HDR"`, ...).
        format: &'static str,
        /// What about the magic/token was wrong.
        reason: String,
    },

    /// A recognized but unsupported variant of the format was requested.
    ///
    /// Covers multi-part/tiled/deep EXR, XYZ-encoded HDR, an unsupported
    /// resolution orientation, and EXR compression codes outside the
    /// supported set.
    #[error("{0}")]
    UnsupportedVariant(String),

    /// A required header attribute is missing, or the header is malformed.
    #[error("{0}")]
    MalformedHeader(String),

    /// The input buffer ended before a header, offset table, block, or
    /// scanline could be fully read.
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Channel layout does not match what the decoder requires.
    #[error("{0}")]
    ChannelMismatch(String),

    /// A compression kernel or entropy decoder failed internally.
    #[error("{0}")]
    DecodeFault(String),

    /// A gain-map JPEG is missing its metadata or its secondary image.
    #[error("{0}")]
    GainMapMissing(String),

    /// A pixel value was non-finite or negative where the caller required
    /// the non-negative/finite invariant.
    #[error("non-finite or negative pixel value: {0}")]
    NumericDomain(String),

    /// I/O error bridged from `std::io`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for conditions that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates an [`Error::InvalidMagic`] error.
    #[inline]
    pub fn invalid_magic(format: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidMagic {
            format,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::UnsupportedVariant`] error.
    #[inline]
    pub fn unsupported_variant(msg: impl Into<String>) -> Self {
        Self::UnsupportedVariant(msg.into())
    }

    /// Creates an [`Error::MalformedHeader`] error.
    #[inline]
    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Creates an [`Error::Truncated`] error.
    #[inline]
    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::Truncated(msg.into())
    }

    /// Creates an [`Error::ChannelMismatch`] error.
    #[inline]
    pub fn channel_mismatch(msg: impl Into<String>) -> Self {
        Self::ChannelMismatch(msg.into())
    }

    /// Creates an [`Error::DecodeFault`] error.
    #[inline]
    pub fn decode_fault(msg: impl Into<String>) -> Self {
        Self::DecodeFault(msg.into())
    }

    /// Creates an [`Error::GainMapMissing`] error.
    #[inline]
    pub fn gain_map_missing(msg: impl Into<String>) -> Self {
        Self::GainMapMissing(msg.into())
    }

    /// Creates an [`Error::NumericDomain`] error.
    #[inline]
    pub fn numeric_domain(msg: impl Into<String>) -> Self {
        Self::NumericDomain(msg.into())
    }

    /// Creates an [`Error::Other`] error.
    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns `true` for the error kinds the extractor/decoder may retry
    /// with a fallback strategy (format autodetect) before giving up.
    #[inline]
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(self, Self::GainMapMissing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_magic_names_the_format() {
        let err = Error::invalid_magic("EXR", "incorrect magic number");
        let msg = err.to_string();
        assert!(msg.contains("EXR"));
        assert!(msg.contains("incorrect magic number"));
    }

    #[test]
    fn unsupported_compression_lists_supported_set() {
        let err = Error::unsupported_variant(
            "Unsupported EXR compression: 6. This reader supports: none, RLE, ZIPS, ZIP, PIZ, PXR24",
        );
        assert!(err.to_string().contains("none, RLE, ZIPS, ZIP, PIZ, PXR24"));
    }

    #[test]
    fn io_error_bridges_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
