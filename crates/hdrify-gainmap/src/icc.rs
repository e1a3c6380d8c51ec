//! The default sRGB ICC profile embedded in a gain-map JPEG's `APP2` segment
//! when the caller does not supply one (component C9, §4.9 item 3).
//!
//! Real JPEG viewers only need a profile that round-trips through any ICC
//! parser and classifies as sRGB; they do not need the multi-kilobyte
//! parametric profile a color-managed renderer would ship. This module
//! hand-assembles the smallest legal ICC v2 monitor profile: a header, a
//! nine-entry tag table (`desc`, `cprt`, `wtpt`, `rXYZ`/`gXYZ`/`bXYZ`, and a
//! single `curv` tag shared by `rTRC`/`gTRC`/`bTRC`), and D50-adapted Rec.709
//! primaries with a single-entry gamma curve.

/// ICC XYZNumber / s15Fixed16Number encoding: 16.16 fixed point, big-endian.
fn s15_fixed16(v: f64) -> [u8; 4] {
    let fixed = (v * 65536.0).round() as i32;
    fixed.to_be_bytes()
}

fn xyz_number(x: f64, y: f64, z: f64) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0..4].copy_from_slice(&s15_fixed16(x));
    out[4..8].copy_from_slice(&s15_fixed16(y));
    out[8..12].copy_from_slice(&s15_fixed16(z));
    out
}

/// Builds the `desc` (textDescriptionType) tag body for a short ASCII name.
fn text_description(ascii: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"desc");
    bytes.extend_from_slice(&[0u8; 4]); // reserved
    let ascii_with_nul: Vec<u8> = ascii.bytes().chain(std::iter::once(0)).collect();
    bytes.extend_from_slice(&(ascii_with_nul.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&ascii_with_nul);
    bytes.extend_from_slice(&[0u8; 4]); // unicode language code
    bytes.extend_from_slice(&[0u8; 4]); // unicode description count
    bytes.extend_from_slice(&[0u8; 2]); // scriptcode code
    bytes.push(0); // macintosh description count
    bytes.extend_from_slice(&[0u8; 67]); // macintosh description (fixed-size per spec)
    bytes
}

/// Builds the `cprt` (textType) tag body.
fn text_type(ascii: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"text");
    bytes.extend_from_slice(&[0u8; 4]); // reserved
    bytes.extend(ascii.bytes());
    bytes.push(0);
    bytes
}

/// Builds the `XYZ ` type tag body for a single XYZNumber.
fn xyz_type(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"XYZ ");
    bytes.extend_from_slice(&[0u8; 4]); // reserved
    bytes.extend_from_slice(&xyz_number(x, y, z));
    bytes
}

/// Builds a `curv` tag body holding a single gamma entry (`u8Fixed8Number`).
fn curve_type_gamma(gamma: f32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"curv");
    bytes.extend_from_slice(&[0u8; 4]); // reserved
    bytes.extend_from_slice(&1u32.to_be_bytes()); // one entry: a plain gamma value
    let fixed = (gamma * 256.0).round().clamp(0.0, 65535.0) as u16;
    bytes.extend_from_slice(&fixed.to_be_bytes());
    bytes
}

fn pad_to_multiple_of_4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

/// Appends one tag-table entry (`sig | offset | size`) and its body, then
/// advances `offset` past the body.
fn append_tag_entry(
    sig: &[u8; 4],
    body: &[u8],
    tag_table: &mut Vec<u8>,
    data: &mut Vec<u8>,
    offset: &mut usize,
) {
    tag_table.extend_from_slice(sig);
    tag_table.extend_from_slice(&(*offset as u32).to_be_bytes());
    tag_table.extend_from_slice(&(body.len() as u32).to_be_bytes());
    data.extend_from_slice(body);
    *offset += body.len();
}

/// Builds the bundled default sRGB ICC profile.
///
/// Rebuilt on every call (it's small and has no meaningful setup cost);
/// callers that embed it repeatedly may want to cache the result themselves.
pub fn default_srgb_icc_profile() -> Vec<u8> {
    const HEADER_LEN: usize = 128;

    let desc = text_description("sRGB");
    let cprt = text_type("Public Domain");
    let wtpt = xyz_type(0.9642, 1.0, 0.8249); // D50 white point
    // Rec.709 primaries, Bradford-adapted D65 -> D50, the values every sRGB
    // ICC profile's rXYZ/gXYZ/bXYZ tags carry.
    let r_xyz = xyz_type(0.4360747, 0.2225045, 0.0139322);
    let g_xyz = xyz_type(0.3850649, 0.7168786, 0.0971045);
    let b_xyz = xyz_type(0.1430804, 0.0606169, 0.7141733);
    let trc = curve_type_gamma(2.2);

    let mut entries: Vec<(&[u8; 4], Vec<u8>)> = vec![
        (b"desc", desc),
        (b"cprt", cprt),
        (b"wtpt", wtpt),
        (b"rXYZ", r_xyz),
        (b"gXYZ", g_xyz),
        (b"bXYZ", b_xyz),
    ];
    for tag in &mut entries {
        pad_to_multiple_of_4(&mut tag.1);
    }
    let mut trc_padded = trc;
    pad_to_multiple_of_4(&mut trc_padded);

    // rTRC/gTRC/bTRC all reference the same curve data (a common ICC space
    // saving trick every minimal-gamma sRGB profile uses).
    let tag_count = 9usize;
    let table_len = 4 + tag_count * 12;
    let mut offset = HEADER_LEN + table_len;

    let mut tag_table = Vec::new();
    tag_table.extend_from_slice(&(tag_count as u32).to_be_bytes());

    let mut data = Vec::new();
    for (sig, body) in &entries {
        append_tag_entry(sig, body, &mut tag_table, &mut data, &mut offset);
    }
    let trc_offset = offset;
    data.extend_from_slice(&trc_padded);
    for sig in [b"rTRC", b"gTRC", b"bTRC"] {
        tag_table.extend_from_slice(sig);
        tag_table.extend_from_slice(&(trc_offset as u32).to_be_bytes());
        tag_table.extend_from_slice(&(trc_padded.len() as u32).to_be_bytes());
    }

    let total_len = HEADER_LEN + tag_table.len() + data.len();

    let mut profile = Vec::with_capacity(total_len);
    profile.extend_from_slice(&(total_len as u32).to_be_bytes()); // profile size
    profile.extend_from_slice(&[0u8; 4]); // CMM type
    profile.extend_from_slice(&0x0210_0000u32.to_be_bytes()); // version 2.1.0
    profile.extend_from_slice(b"mntr"); // device class: monitor
    profile.extend_from_slice(b"RGB "); // data color space
    profile.extend_from_slice(b"XYZ "); // PCS
    profile.extend_from_slice(&[0u8; 12]); // creation date/time
    profile.extend_from_slice(b"acsp"); // profile file signature
    profile.extend_from_slice(&[0u8; 4]); // primary platform
    profile.extend_from_slice(&[0u8; 4]); // profile flags
    profile.extend_from_slice(&[0u8; 4]); // device manufacturer
    profile.extend_from_slice(&[0u8; 4]); // device model
    profile.extend_from_slice(&[0u8; 8]); // device attributes
    profile.extend_from_slice(&0u32.to_be_bytes()); // rendering intent: perceptual
    profile.extend_from_slice(&xyz_number(0.9642, 1.0, 0.8249)); // PCS illuminant (D50)
    profile.extend_from_slice(&[0u8; 4]); // profile creator
    profile.extend_from_slice(&[0u8; 16]); // profile ID
    profile.extend_from_slice(&[0u8; 28]); // reserved
    debug_assert_eq!(profile.len(), HEADER_LEN);

    profile.extend_from_slice(&tag_table);
    profile.extend_from_slice(&data);
    debug_assert_eq!(profile.len(), total_len);
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_size_matches_buffer_length() {
        let profile = default_srgb_icc_profile();
        let declared = u32::from_be_bytes([profile[0], profile[1], profile[2], profile[3]]) as usize;
        assert_eq!(declared, profile.len());
    }

    #[test]
    fn carries_acsp_signature_and_rgb_colorspace() {
        let profile = default_srgb_icc_profile();
        assert_eq!(&profile[36..40], b"acsp");
        assert_eq!(&profile[16..20], b"RGB ");
        assert_eq!(&profile[20..24], b"XYZ ");
    }

    #[test]
    fn tag_count_is_nine() {
        let profile = default_srgb_icc_profile();
        let count = u32::from_be_bytes([profile[128], profile[129], profile[130], profile[131]]);
        assert_eq!(count, 9);
    }
}
