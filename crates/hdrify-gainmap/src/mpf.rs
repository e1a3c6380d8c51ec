//! CIPA DC-007 Multi-Picture Format (MPF) `APP2` segment assembly and
//! parsing (component C9/C10), used to index the primary and gain-map JPEGs
//! inside a JPEG-R container.
//!
//! The segment is a little-endian TIFF structure: an 8-byte TIFF header
//! (`II`, magic `42`, IFD0 offset) followed by the MP Index IFD with three
//! tags (`MPFVersion`, `NumberOfImages`, `MPEntry`), the latter holding one
//! 16-byte entry per image.

/// Marker string every MPF `APP2` segment starts with, right after the
/// 2-byte segment length.
pub const MPF_SIGNATURE: &[u8; 4] = b"MPF\0";

const TAG_VERSION: u16 = 0xB000;
const TAG_NUMBER_OF_IMAGES: u16 = 0xB001;
const TAG_MP_ENTRY: u16 = 0xB002;

/// MP Entry "individual image attribute" type field: baseline MP primary
/// image (the representative/first image).
const TYPE_BASELINE_MP_PRIMARY: u32 = 0x0003_0000;
/// MP Entry type field: an untagged (non-primary) image, e.g. the gain map.
const TYPE_UNTAGGED: u32 = 0x0000_0000;

/// One 16-byte MP Entry: `{ individual image attribute, size, data offset,
/// entry 1 dependent image, entry 2 dependent image }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpEntry {
    /// Individual image attribute (MP type flags); the first entry carries
    /// [`TYPE_BASELINE_MP_PRIMARY`], the rest [`TYPE_UNTAGGED`].
    pub attribute: u32,
    /// Size in bytes of this image's JPEG stream.
    pub size: u32,
    /// Byte offset of this image's JPEG stream, relative to the byte
    /// immediately following the MPF header's endianness marker (i.e. byte 6
    /// of the segment payload that starts with `MPF\0`). Always `0` for the
    /// primary image, which starts the file.
    pub offset: u32,
}

/// Builds the MPF `APP2` segment payload (everything after the 2-byte
/// segment length, starting with the `MPF\0` signature) for a two-image
/// (primary + gain map) JPEG-R container.
///
/// `primary_size` is the byte length of the primary JPEG (SOI..EOI, offset
/// 0 from the start of the file). `gain_map_offset` is the gain map JPEG's
/// `FF D8` byte position measured from the byte immediately after the TIFF
/// header's endianness marker (§4.9 item 2 / §6's MPF offset convention);
/// `gain_map_size` is its byte length.
pub fn build_mpf_segment(primary_size: u32, gain_map_offset: u32, gain_map_size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MPF_SIGNATURE);

    // TIFF header: little-endian, magic 42, IFD0 at offset 8.
    let tiff_start = out.len();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());

    let entries = [
        MpEntry { attribute: TYPE_BASELINE_MP_PRIMARY, size: primary_size, offset: 0 },
        MpEntry { attribute: TYPE_UNTAGGED, size: gain_map_size, offset: gain_map_offset },
    ];

    // MP Index IFD: entry count (u16) + 3 tag entries (12 bytes each) + next
    // IFD offset (u32) + MPEntry value block.
    let entry_count: u16 = 3;
    let ifd_len = 2 + entry_count as usize * 12 + 4;
    let mp_entry_block_offset = (out.len() - tiff_start) + ifd_len;

    out.extend_from_slice(&entry_count.to_le_bytes());

    write_ifd_entry(&mut out, TAG_VERSION, 7, 4, &[b'0', b'1', b'0', b'0']);
    write_ifd_entry_u32(&mut out, TAG_NUMBER_OF_IMAGES, entries.len() as u32);
    write_ifd_entry_offset(&mut out, TAG_MP_ENTRY, 7, (entries.len() * 16) as u32, mp_entry_block_offset as u32);

    out.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset: none

    for entry in &entries {
        out.extend_from_slice(&entry.attribute.to_le_bytes());
        out.extend_from_slice(&entry.size.to_le_bytes());
        out.extend_from_slice(&entry.offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // dependent image 1
        out.extend_from_slice(&0u16.to_le_bytes()); // dependent image 2
    }

    out
}

fn write_ifd_entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, inline_value: &[u8; 4]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(inline_value);
}

fn write_ifd_entry_u32(out: &mut Vec<u8>, tag: u16, value: u32) {
    write_ifd_entry(out, tag, 4, 1, &value.to_le_bytes());
}

fn write_ifd_entry_offset(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, offset: u32) {
    write_ifd_entry(out, tag, field_type, count, &offset.to_le_bytes());
}

/// A parsed MPF segment: the two (or more) [`MpEntry`] records and the byte
/// offset of the TIFF header's endianness marker within the original
/// segment buffer passed to [`parse_mpf_segment`].
#[derive(Debug, Clone)]
pub struct ParsedMpf {
    /// MP entries in declared order; entry 0 is conventionally the primary.
    pub entries: Vec<MpEntry>,
}

/// Parses an MPF `APP2` segment payload (the bytes starting with `MPF\0`).
///
/// Returns `None` rather than erroring on any structural inconsistency;
/// callers fall back to the second-SOI heuristic (§4.10) when this returns
/// `None`.
pub fn parse_mpf_segment(segment: &[u8]) -> Option<ParsedMpf> {
    if segment.len() < 4 || &segment[..4] != MPF_SIGNATURE {
        return None;
    }
    let tiff = &segment[4..];
    if tiff.len() < 8 {
        return None;
    }
    let little_endian = match &tiff[0..2] {
        b"II" => true,
        b"MM" => false,
        _ => return None,
    };
    if !little_endian {
        // Big-endian MPF is legal per CIPA DC-007 but not produced by this
        // writer; decline rather than guess.
        return None;
    }
    let ifd_offset = u32::from_le_bytes([tiff[4], tiff[5], tiff[6], tiff[7]]) as usize;
    if ifd_offset + 2 > tiff.len() {
        return None;
    }
    let entry_count = u16::from_le_bytes([tiff[ifd_offset], tiff[ifd_offset + 1]]) as usize;
    let mut mp_entry_offset = None;
    let mut mp_entry_count_bytes = 0u32;

    let mut pos = ifd_offset + 2;
    for _ in 0..entry_count {
        if pos + 12 > tiff.len() {
            return None;
        }
        let tag = u16::from_le_bytes([tiff[pos], tiff[pos + 1]]);
        let count = u32::from_le_bytes([tiff[pos + 4], tiff[pos + 5], tiff[pos + 6], tiff[pos + 7]]);
        let value = u32::from_le_bytes([tiff[pos + 8], tiff[pos + 9], tiff[pos + 10], tiff[pos + 11]]);
        if tag == TAG_MP_ENTRY {
            mp_entry_offset = Some(value as usize);
            mp_entry_count_bytes = count;
        }
        pos += 12;
    }

    let mp_entry_offset = mp_entry_offset?;
    let entry_count = (mp_entry_count_bytes / 16) as usize;
    if entry_count == 0 || mp_entry_offset + entry_count * 16 > tiff.len() {
        return None;
    }

    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let base = mp_entry_offset + i * 16;
        let attribute = u32::from_le_bytes([tiff[base], tiff[base + 1], tiff[base + 2], tiff[base + 3]]);
        let size = u32::from_le_bytes([tiff[base + 4], tiff[base + 5], tiff[base + 6], tiff[base + 7]]);
        let offset = u32::from_le_bytes([tiff[base + 8], tiff[base + 9], tiff[base + 10], tiff[base + 11]]);
        entries.push(MpEntry { attribute, size, offset });
    }

    Some(ParsedMpf { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_entry_offsets_and_sizes() {
        let segment = build_mpf_segment(890, 1234, 567);
        let parsed = parse_mpf_segment(&segment).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].offset, 0);
        assert_eq!(parsed.entries[0].size, 890);
        assert_eq!(parsed.entries[1].offset, 1234);
        assert_eq!(parsed.entries[1].size, 567);
    }

    #[test]
    fn primary_entry_is_baseline_mp_primary_type() {
        let segment = build_mpf_segment(500, 1000, 200);
        let parsed = parse_mpf_segment(&segment).unwrap();
        assert_eq!(parsed.entries[0].attribute, TYPE_BASELINE_MP_PRIMARY);
        assert_eq!(parsed.entries[1].attribute, TYPE_UNTAGGED);
    }

    #[test]
    fn rejects_missing_signature() {
        assert!(parse_mpf_segment(b"NOPE").is_none());
    }

    #[test]
    fn rejects_truncated_tiff_header() {
        let mut segment = MPF_SIGNATURE.to_vec();
        segment.extend_from_slice(b"II");
        assert!(parse_mpf_segment(&segment).is_none());
    }
}
