//! EXR header attribute parser/writer (component C5).
//!
//! Validates the magic number and version flags, walks the null-terminated
//! attribute stream, and dispatches on attribute type. Only single-part,
//! non-tiled, non-deep scanline files are accepted — see
//! [`crate::EXR_MAGIC`] and the version bit checks in [`read_header`].

use hdrify_core::bits::{ByteReader, ByteWriter};
use hdrify_core::{Chromaticities, Error, Result};

/// EXR magic number, bytes 0..3 little-endian (`20000630`).
pub const EXR_MAGIC: u32 = 20_000_630;

/// A 2D integer bounding box: `[xMin, yMin, xMax, yMax]` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Box2i {
    /// Minimum X (inclusive).
    pub x_min: i32,
    /// Minimum Y (inclusive).
    pub y_min: i32,
    /// Maximum X (inclusive).
    pub x_max: i32,
    /// Maximum Y (inclusive).
    pub y_max: i32,
}

impl Box2i {
    /// Width in pixels (`xMax - xMin + 1`).
    pub fn width(&self) -> i32 {
        self.x_max - self.x_min + 1
    }

    /// Height in pixels (`yMax - yMin + 1`).
    pub fn height(&self) -> i32 {
        self.y_max - self.y_min + 1
    }
}

/// The three pixel sample types an EXR channel may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    /// 32-bit unsigned integer samples.
    Uint,
    /// 16-bit IEEE-754 half-float samples.
    Half,
    /// 32-bit IEEE-754 float samples.
    Float,
}

impl PixelType {
    fn from_i32(v: i32) -> Result<Self> {
        match v {
            0 => Ok(Self::Uint),
            1 => Ok(Self::Half),
            2 => Ok(Self::Float),
            other => Err(Error::malformed_header(format!(
                "unknown EXR channel pixel type: {other}"
            ))),
        }
    }

    fn to_i32(self) -> i32 {
        match self {
            Self::Uint => 0,
            Self::Half => 1,
            Self::Float => 2,
        }
    }

    /// Bytes occupied by one sample of this type.
    pub fn byte_size(self) -> usize {
        match self {
            Self::Uint => 4,
            Self::Half => 2,
            Self::Float => 4,
        }
    }
}

/// One entry of an EXR `chlist` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Channel name (e.g. `"R"`, `"G"`, `"B"`, `"A"`).
    pub name: String,
    /// Sample type.
    pub pixel_type: PixelType,
    /// Whether the channel uses a perceptually linear quantization (unused
    /// by this reader beyond round-tripping the flag).
    pub p_linear: bool,
    /// Horizontal subsampling factor. Only `1` is supported.
    pub x_sampling: i32,
    /// Vertical subsampling factor. Only `1` is supported.
    pub y_sampling: i32,
}

/// The EXR compression method, as stored in the `compression` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression; pixel-interleaved samples.
    None,
    /// Zero-run-length encoding.
    Rle,
    /// Zlib/deflate, 1 scan line per block.
    Zips,
    /// Zlib/deflate, 16 scan lines per block.
    Zip,
    /// Wavelet + Huffman, 32 scan lines per block.
    Piz,
    /// 24-bit float quantization + deflate, 16 scan lines per block.
    Pxr24,
}

impl Compression {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::Rle),
            2 => Ok(Self::Zips),
            3 => Ok(Self::Zip),
            4 => Ok(Self::Piz),
            5 => Ok(Self::Pxr24),
            other => Err(Error::unsupported_variant(format!(
                "Unsupported EXR compression: {other}. This reader supports: none, RLE, ZIPS, ZIP, PIZ, PXR24"
            ))),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Rle => 1,
            Self::Zips => 2,
            Self::Zip => 3,
            Self::Piz => 4,
            Self::Pxr24 => 5,
        }
    }

    /// Scan lines per block for this compression method.
    pub fn block_height(self) -> u32 {
        match self {
            Self::None | Self::Rle | Self::Zips => 1,
            Self::Zip | Self::Pxr24 => 16,
            Self::Piz => 32,
        }
    }

    /// The channel sample type blocks of this compression store: `HALF` for
    /// every compressed mode, `FLOAT` for `none` (per §4.7's writer rule).
    pub fn channel_pixel_type(self) -> PixelType {
        match self {
            Self::None => PixelType::Float,
            _ => PixelType::Half,
        }
    }
}

/// A parsed EXR header.
#[derive(Debug, Clone, PartialEq)]
pub struct ExrHeader {
    /// The window the image is meant to be displayed at.
    pub display_window: Box2i,
    /// The window actually stored in the file.
    pub data_window: Box2i,
    /// Channel list, lexicographically sorted by name.
    pub channels: Vec<Channel>,
    /// Compression method.
    pub compression: Compression,
    /// Chromaticities, when present (absent defaults to Rec.709 at the
    /// `hdrify-exr` / `hdrify-core` boundary, not here).
    pub chromaticities: Option<Chromaticities>,
    /// Scan-line order. `0` = increasing Y (top-down), the only order this
    /// writer emits; `1` = decreasing Y is accepted on read.
    pub line_order: u8,
    /// Pixel aspect ratio.
    pub pixel_aspect_ratio: f32,
    /// Screen window center.
    pub screen_window_center: (f32, f32),
    /// Screen window width.
    pub screen_window_width: f32,
}

fn read_attr_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
}

fn parse_box2i(data: &[u8]) -> Result<Box2i> {
    if data.len() < 16 {
        return Err(Error::truncated("box2i attribute shorter than 16 bytes"));
    }
    let mut r = ByteReader::new(data);
    Ok(Box2i {
        x_min: r.read_i32()?,
        y_min: r.read_i32()?,
        x_max: r.read_i32()?,
        y_max: r.read_i32()?,
    })
}

fn parse_chlist(data: &[u8]) -> Result<Vec<Channel>> {
    let mut r = ByteReader::new(data);
    let mut channels = Vec::new();
    loop {
        let name = r.read_null_terminated()?;
        if name.is_empty() {
            break;
        }
        let pixel_type = PixelType::from_i32(r.read_i32()?)?;
        let p_linear = r.read_u8()? != 0;
        let _reserved = r.read_bytes(3)?;
        let x_sampling = r.read_i32()?;
        let y_sampling = r.read_i32()?;
        channels.push(Channel {
            name: String::from_utf8_lossy(name).to_string(),
            pixel_type,
            p_linear,
            x_sampling,
            y_sampling,
        });
    }
    channels.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(channels)
}

fn parse_chromaticities(data: &[u8]) -> Result<Chromaticities> {
    if data.len() < 32 {
        return Err(Error::truncated("chromaticities attribute shorter than 32 bytes"));
    }
    let mut r = ByteReader::new(data);
    let mut v = [0f32; 8];
    for slot in v.iter_mut() {
        *slot = r.read_f32()?;
    }
    Ok(Chromaticities::from_array(v))
}

/// Parses an EXR header starting at byte 0 of `bytes`.
///
/// Returns the header and the byte offset immediately after the header
/// terminator (where the offset table begins).
pub fn read_header(bytes: &[u8]) -> Result<(ExrHeader, usize)> {
    let mut r = ByteReader::new(bytes);
    let magic = r.read_u32().map_err(|_| {
        Error::invalid_magic("EXR", "buffer too short to contain a magic number")
    })?;
    if magic != EXR_MAGIC {
        return Err(Error::invalid_magic("EXR", "incorrect magic number"));
    }
    let version = r.read_u32().map_err(|_| {
        Error::truncated("buffer ended while reading the version field")
    })?;

    if version & 0x200 != 0 || version & 0x800 != 0 || version & 0x1000 != 0 {
        return Err(Error::unsupported_variant(
            "Multi-part, tiled, and deep data not supported",
        ));
    }
    let version_number = version & 0xFF;
    if !(1..=2).contains(&version_number) {
        return Err(Error::unsupported_variant(format!(
            "unsupported EXR version number: {version_number}"
        )));
    }

    let mut display_window = None;
    let mut data_window = None;
    let mut channels = None;
    let mut compression = Compression::None;
    let mut chromaticities = None;
    let mut line_order = 0u8;
    let mut pixel_aspect_ratio = 1.0f32;
    let mut screen_window_center = (0.0f32, 0.0f32);
    let mut screen_window_width = 1.0f32;

    loop {
        let name = r.read_null_terminated()?;
        if name.is_empty() {
            break;
        }
        let name = String::from_utf8_lossy(name).to_string();
        let type_name = read_attr_string(r.read_null_terminated()?);
        let size = r.read_u32()? as usize;
        let value = r.read_bytes(size)?;

        match type_name.as_str() {
            "box2i" => {
                let b = parse_box2i(value)?;
                match name.as_str() {
                    "displayWindow" => display_window = Some(b),
                    "dataWindow" => data_window = Some(b),
                    _ => {}
                }
            }
            "chlist" => {
                if name == "channels" {
                    channels = Some(parse_chlist(value)?);
                }
            }
            "compression" => {
                if let Some(&byte) = value.first() {
                    compression = Compression::from_u8(byte)?;
                }
            }
            "chromaticities" => {
                chromaticities = Some(parse_chromaticities(value)?);
            }
            "lineOrder" => {
                if let Some(&byte) = value.first() {
                    line_order = byte;
                }
            }
            "float" => {
                let f = f32::from_le_bytes(value.try_into().map_err(|_| {
                    Error::truncated("float attribute shorter than 4 bytes")
                })?);
                match name.as_str() {
                    "pixelAspectRatio" => pixel_aspect_ratio = f,
                    "screenWindowWidth" => screen_window_width = f,
                    _ => {}
                }
            }
            "v2f" => {
                if name == "screenWindowCenter" && value.len() >= 8 {
                    let x = f32::from_le_bytes(value[0..4].try_into().unwrap());
                    let y = f32::from_le_bytes(value[4..8].try_into().unwrap());
                    screen_window_center = (x, y);
                }
            }
            // string, int, v2i, and every other recognized-but-unused type
            // is skipped: we already consumed `size` bytes above.
            _ => {}
        }
    }

    let display_window = display_window
        .ok_or_else(|| Error::malformed_header("missing required header attributes: displayWindow"))?;
    let data_window = data_window
        .ok_or_else(|| Error::malformed_header("missing required header attributes: dataWindow"))?;
    let channels = channels
        .ok_or_else(|| Error::malformed_header("missing required header attributes: channels"))?;

    if data_window.x_min > data_window.x_max || data_window.y_min > data_window.y_max {
        return Err(Error::malformed_header(
            "dataWindow has xMin > xMax or yMin > yMax",
        ));
    }

    Ok((
        ExrHeader {
            display_window,
            data_window,
            channels,
            compression,
            chromaticities,
            line_order,
            pixel_aspect_ratio,
            screen_window_center,
            screen_window_width,
        },
        r.position(),
    ))
}

fn write_box2i(w: &mut ByteWriter, name: &str, b: Box2i) {
    w.write_null_terminated(name);
    w.write_null_terminated("box2i");
    w.write_u32(16);
    w.write_i32(b.x_min);
    w.write_i32(b.y_min);
    w.write_i32(b.x_max);
    w.write_i32(b.y_max);
}

fn write_chlist(w: &mut ByteWriter, channels: &[Channel]) {
    let mut sorted: Vec<&Channel> = channels.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut body = ByteWriter::new();
    for c in &sorted {
        body.write_null_terminated(&c.name);
        body.write_i32(c.pixel_type.to_i32());
        body.write_u8(c.p_linear as u8);
        body.write_bytes(&[0, 0, 0]);
        body.write_i32(c.x_sampling);
        body.write_i32(c.y_sampling);
    }
    body.write_u8(0); // empty name terminates the chlist

    let body = body.into_vec();
    w.write_null_terminated("channels");
    w.write_null_terminated("chlist");
    w.write_u32(body.len() as u32);
    w.write_bytes(&body);
}

fn write_chromaticities(w: &mut ByteWriter, ch: Chromaticities) {
    w.write_null_terminated("chromaticities");
    w.write_null_terminated("chromaticities");
    w.write_u32(32);
    for v in ch.to_array() {
        w.write_f32(v);
    }
}

fn write_compression(w: &mut ByteWriter, c: Compression) {
    w.write_null_terminated("compression");
    w.write_null_terminated("compression");
    w.write_u32(1);
    w.write_u8(c.to_u8());
}

fn write_line_order(w: &mut ByteWriter, v: u8) {
    w.write_null_terminated("lineOrder");
    w.write_null_terminated("lineOrder");
    w.write_u32(1);
    w.write_u8(v);
}

fn write_float_attr(w: &mut ByteWriter, name: &str, v: f32) {
    w.write_null_terminated(name);
    w.write_null_terminated("float");
    w.write_u32(4);
    w.write_f32(v);
}

fn write_v2f_attr(w: &mut ByteWriter, name: &str, v: (f32, f32)) {
    w.write_null_terminated(name);
    w.write_null_terminated("v2f");
    w.write_u32(8);
    w.write_f32(v.0);
    w.write_f32(v.1);
}

/// Serializes an EXR header, including the magic number, version, and every
/// attribute; does **not** emit the extra null the single-part spec omits
/// between the header terminator and the offset table (see §9).
pub fn write_header(header: &ExrHeader) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(EXR_MAGIC);
    w.write_u32(2); // version 2, single-part scanline: no bits set

    write_box2i(&mut w, "displayWindow", header.display_window);
    write_box2i(&mut w, "dataWindow", header.data_window);
    write_chlist(&mut w, &header.channels);
    write_compression(&mut w, header.compression);
    write_line_order(&mut w, header.line_order);
    write_float_attr(&mut w, "pixelAspectRatio", header.pixel_aspect_ratio);
    write_v2f_attr(&mut w, "screenWindowCenter", header.screen_window_center);
    write_float_attr(&mut w, "screenWindowWidth", header.screen_window_width);
    if let Some(ch) = header.chromaticities {
        write_chromaticities(&mut w, ch);
    }
    w.write_u8(0); // empty name terminates the header

    w.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ExrHeader {
        ExrHeader {
            display_window: Box2i { x_min: 0, y_min: 0, x_max: 15, y_max: 15 },
            data_window: Box2i { x_min: 0, y_min: 0, x_max: 15, y_max: 15 },
            channels: vec![
                Channel { name: "B".into(), pixel_type: PixelType::Half, p_linear: false, x_sampling: 1, y_sampling: 1 },
                Channel { name: "G".into(), pixel_type: PixelType::Half, p_linear: false, x_sampling: 1, y_sampling: 1 },
                Channel { name: "R".into(), pixel_type: PixelType::Half, p_linear: false, x_sampling: 1, y_sampling: 1 },
            ],
            compression: Compression::Zip,
            chromaticities: Some(Chromaticities::REC709),
            line_order: 0,
            pixel_aspect_ratio: 1.0,
            screen_window_center: (0.0, 0.0),
            screen_window_width: 1.0,
        }
    }

    #[test]
    fn round_trips_through_write_then_read() {
        let header = sample_header();
        let bytes = write_header(&header);
        let (parsed, offset) = read_header(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn channels_come_back_lexicographically_sorted() {
        let header = sample_header();
        let bytes = write_header(&header);
        let (parsed, _) = read_header(&bytes).unwrap();
        let names: Vec<&str> = parsed.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "G", "R"]);
    }

    #[test]
    fn invalid_magic_is_rejected() {
        let err = read_header(b"invalid exr data").unwrap_err();
        assert!(err.to_string().contains("Invalid EXR file"));
    }

    #[test]
    fn tiled_flag_is_rejected() {
        let mut bytes = write_header(&sample_header());
        bytes[4..8].copy_from_slice(&(2u32 | 0x200).to_le_bytes());
        let err = read_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("Multi-part, tiled, and deep data not supported"));
    }

    #[test]
    fn unsupported_compression_byte_lists_supported_set() {
        let mut header = sample_header();
        header.compression = Compression::Zip;
        let mut bytes = write_header(&header);
        // Patch the compression attribute's value byte (last byte written before lineOrder)
        // by re-locating it: find "compression\0compression\0" then the u32 size then the byte.
        let marker = b"compression\0compression\0";
        let pos = bytes.windows(marker.len()).position(|w| w == marker).unwrap();
        let value_pos = pos + marker.len() + 4;
        bytes[value_pos] = 6;
        let err = read_header(&bytes).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unsupported EXR compression: 6"));
        assert!(msg.contains("none, RLE, ZIPS, ZIP, PIZ, PXR24"));
    }

    #[test]
    fn missing_required_attribute_is_malformed_header() {
        let mut w = ByteWriter::new();
        w.write_u32(EXR_MAGIC);
        w.write_u32(2);
        w.write_u8(0); // empty header: no attributes at all
        let err = read_header(&w.into_vec()).unwrap_err();
        assert!(err.to_string().contains("missing required header attributes"));
    }
}
