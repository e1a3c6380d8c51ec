//! Radiance HDR ASCII header parser/writer (component C4, header half).
//!
//! The header is line-oriented ASCII: a leading `#?PROGRAMTYPE` line, a run
//! of `KEY=VALUE` attribute lines (and blank/`#` comment lines), a blank line
//! terminator, then the resolution line. This module only ever sees `-Y H +X
//! W` (top-down, left-to-right) — every other orientation Radiance supports
//! is rejected, per §4.4 of the format note.

use hdrify_core::image::Metadata;
use hdrify_core::{Error, Result};

/// The parsed ASCII header plus the byte offset where pixel data begins.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceHeader {
    /// The `FORMAT=` value (`32-bit_rle_rgbe` expected; `32-bit_rle_xyze` is
    /// rejected outright since this engine only handles RGBE).
    pub format: String,
    /// Cumulative exposure: product of every `EXPOSURE=` value seen.
    pub exposure: f32,
    /// `GAMMA=` value, when present.
    pub gamma: Option<f32>,
    /// Every other recognized or unrecognized `KEY=VALUE` line, keyed
    /// case-preserved.
    pub metadata: Metadata,
    /// Scanline width (the `+X` value).
    pub width: u32,
    /// Scanline count (the `-Y` value).
    pub height: u32,
}

/// Splits `bytes` into `(line, offset_of_next_line)` pairs, `\n`-terminated
/// (tolerating a trailing `\r`). The final line need not be newline
/// terminated.
fn next_line(bytes: &[u8], start: usize) -> Option<(&str, usize)> {
    if start >= bytes.len() {
        return None;
    }
    let rest = &bytes[start..];
    let (line_bytes, next) = match rest.iter().position(|&b| b == b'\n') {
        Some(nl) => (&rest[..nl], start + nl + 1),
        None => (rest, bytes.len()),
    };
    let line_bytes = if line_bytes.ends_with(b"\r") {
        &line_bytes[..line_bytes.len() - 1]
    } else {
        line_bytes
    };
    Some((
        std::str::from_utf8(line_bytes).unwrap_or(""),
        next,
    ))
}

/// Parses the resolution line. Only the canonical `-Y H +X W` orientation is
/// accepted; every other axis ordering Radiance historically allows
/// (`+Y`, flipped `X`, transposed axes) is rejected.
fn parse_resolution(line: &str) -> Result<(u32, u32)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let malformed = || Error::unsupported_variant("Unsupported resolution format");
    if tokens.len() != 4 || tokens[0] != "-Y" || tokens[2] != "+X" {
        return Err(malformed());
    }
    let height: u32 = tokens[1].parse().map_err(|_| malformed())?;
    let width: u32 = tokens[3].parse().map_err(|_| malformed())?;
    if width == 0 || height == 0 {
        return Err(malformed());
    }
    Ok((width, height))
}

/// Parses the ASCII header starting at byte 0 of `bytes`.
///
/// When `header_strict` is `true` (the default) the first line must be
/// exactly `#?RADIANCE`; when `false`, any `#?PROGRAMTYPE` line is accepted.
///
/// Returns the header and the byte offset where pixel data starts.
pub fn parse_header(bytes: &[u8], header_strict: bool) -> Result<(RadianceHeader, usize)> {
    let (magic_line, mut pos) = next_line(bytes, 0)
        .ok_or_else(|| Error::invalid_magic("HDR", "empty input"))?;
    if !magic_line.starts_with("#?") {
        return Err(Error::invalid_magic("HDR", "missing #?PROGRAMTYPE line"));
    }
    if header_strict && magic_line.trim_end() != "#?RADIANCE" {
        return Err(Error::invalid_magic(
            "HDR",
            "first line must be exactly #?RADIANCE (pass headerStrict=false to relax this)",
        ));
    }

    let mut format: Option<String> = None;
    let mut exposure = 1.0f32;
    let mut gamma = None;
    let mut metadata = Metadata::new();
    let mut resolution = None;

    loop {
        let (line, next) = next_line(bytes, pos)
            .ok_or_else(|| Error::truncated("HDR header ended before the resolution line"))?;
        pos = next;

        if line.is_empty() {
            // A blank line terminates the attribute block; the very next
            // line must be the resolution line.
            let (res_line, res_next) = next_line(bytes, pos)
                .ok_or_else(|| Error::truncated("HDR header ended before the resolution line"))?;
            resolution = Some(parse_resolution(res_line)?);
            pos = res_next;
            break;
        }
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key.to_uppercase().as_str() {
            "FORMAT" => format = Some(value.to_string()),
            "EXPOSURE" => {
                let v: f32 = value
                    .parse()
                    .map_err(|_| Error::malformed_header(format!("invalid EXPOSURE value: {value}")))?;
                exposure *= v;
            }
            "GAMMA" => {
                gamma = value.parse().ok();
                metadata.insert("GAMMA".to_string(), value.to_string());
            }
            _ => {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }

    let format = format
        .ok_or_else(|| Error::malformed_header("missing required FORMAT= header line"))?;
    if format == "32-bit_rle_xyze" {
        return Err(Error::unsupported_variant(
            "XYZE-encoded Radiance files are not supported, only 32-bit_rle_rgbe",
        ));
    }
    let (width, height) = resolution.expect("set before breaking out of the loop above");

    Ok((
        RadianceHeader {
            format,
            exposure,
            gamma,
            metadata,
            width,
            height,
        },
        pos,
    ))
}

/// Serializes the ASCII header (magic line, `FORMAT=`, optional `GAMMA=`/
/// `EXPOSURE=`, blank line, resolution line).
pub fn write_header(header: &RadianceHeader) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("#?RADIANCE\n");
    out.push_str(&format!("FORMAT={}\n", header.format));
    if let Some(gamma) = header.gamma {
        out.push_str(&format!("GAMMA={gamma}\n"));
    }
    if header.exposure != 1.0 {
        out.push_str(&format!("EXPOSURE={}\n", header.exposure));
    }
    for (key, value) in &header.metadata {
        if key == "GAMMA" {
            continue; // already emitted above from the typed field
        }
        out.push_str(&format!("{key}={value}\n"));
    }
    out.push('\n');
    out.push_str(&format!("-Y {} +X {}\n", header.height, header.width));
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_header() {
        let bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 3\n";
        let (header, offset) = parse_header(bytes, true).unwrap();
        assert_eq!(header.width, 3);
        assert_eq!(header.height, 2);
        assert_eq!(header.exposure, 1.0);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn exposure_is_cumulative() {
        let bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\nEXPOSURE=2\nEXPOSURE=3\n\n-Y 1 +X 8\n";
        let (header, _) = parse_header(bytes, true).unwrap();
        assert_eq!(header.exposure, 6.0);
    }

    #[test]
    fn strict_mode_rejects_non_radiance_program_type() {
        let bytes = b"#?OTHERPROG\nFORMAT=32-bit_rle_rgbe\n\n-Y 1 +X 8\n";
        assert!(parse_header(bytes, true).is_err());
        assert!(parse_header(bytes, false).is_ok());
    }

    #[test]
    fn xyze_format_is_rejected() {
        let bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_xyze\n\n-Y 1 +X 8\n";
        assert!(parse_header(bytes, true).is_err());
    }

    #[test]
    fn wrong_resolution_orientation_is_rejected() {
        let bytes = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n+X 8 -Y 1\n";
        let err = parse_header(bytes, true).unwrap_err();
        assert!(err.to_string().contains("Unsupported resolution format"));
    }

    #[test]
    fn missing_format_is_malformed() {
        let bytes = b"#?RADIANCE\n\n-Y 1 +X 8\n";
        assert!(parse_header(bytes, true).is_err());
    }

    #[test]
    fn header_round_trips() {
        let header = RadianceHeader {
            format: "32-bit_rle_rgbe".into(),
            exposure: 1.5,
            gamma: Some(2.2),
            metadata: Metadata::new(),
            width: 10,
            height: 5,
        };
        let bytes = write_header(&header);
        let (parsed, _) = parse_header(&bytes, true).unwrap();
        assert_eq!(parsed.width, 10);
        assert_eq!(parsed.height, 5);
        assert_eq!(parsed.exposure, 1.5);
        assert_eq!(parsed.gamma, Some(2.2));
    }
}
