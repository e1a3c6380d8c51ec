//! XMP metadata blocks for a JPEG-R container (component C9 write side /
//! C10 read side): the primary image's `Container:Directory` listing and
//! the secondary (gain-map) image's `hdrgm:` attributes.
//!
//! Both are written and scanned as plain `x:xmpmeta` RDF/XML, matching what
//! Adobe's Gain Map spec and Google's Ultra HDR both embed — no
//! `<?xpacket?>` wrapper, per §4.9 item 1.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use hdrify_core::image::{GainMapMetadata, Triplet};
use hdrify_core::{Error, Result};

const HDRGM_NS: &str = "http://ns.adobe.com/hdr-gain-map/1.0/";
const CONTAINER_NS: &str = "http://ns.google.com/photos/1.0/container/";
const ITEM_NS: &str = "http://ns.google.com/photos/1.0/container/item/";
const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::other(format!("XMP write error: {e}"))
}

/// Builds the primary image's `x:xmpmeta` block: a `Container:Directory`
/// listing the primary and gain-map items, per §4.9 item 1.
pub fn build_primary_xmp(gain_map_length: usize) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write_xmpmeta_open(&mut writer)?;

    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    desc.push_attribute(("xmlns:Container", CONTAINER_NS));
    desc.push_attribute(("xmlns:Item", ITEM_NS));
    desc.push_attribute(("xmlns:hdrgm", HDRGM_NS));
    desc.push_attribute(("hdrgm:Version", "1.0"));
    writer.write_event(Event::Start(desc)).map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("Container:Directory")))
        .map_err(xml_err)?;
    writer.write_event(Event::Start(BytesStart::new("rdf:Seq"))).map_err(xml_err)?;

    write_container_item(&mut writer, "Primary", "image/jpeg", None)?;
    write_container_item(&mut writer, "GainMap", "image/jpeg", Some(gain_map_length))?;

    writer.write_event(Event::End(BytesEnd::new("rdf:Seq"))).map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("Container:Directory")))
        .map_err(xml_err)?;
    writer.write_event(Event::End(BytesEnd::new("rdf:Description"))).map_err(xml_err)?;
    write_xmpmeta_close(&mut writer)?;

    Ok(writer.into_inner())
}

fn write_container_item(
    writer: &mut Writer<Vec<u8>>,
    semantic: &str,
    mime: &str,
    length: Option<usize>,
) -> Result<()> {
    writer
        .write_event(Event::Start(
            BytesStart::new("rdf:li").with_attributes([("rdf:parseType", "Resource")]),
        ))
        .map_err(xml_err)?;
    let mut item = BytesStart::new("Container:Item");
    item.push_attribute(("Item:Semantic", semantic));
    item.push_attribute(("Item:Mime", mime));
    let length_str;
    if let Some(len) = length {
        length_str = len.to_string();
        item.push_attribute(("Item:Length", length_str.as_str()));
    }
    writer.write_event(Event::Empty(item)).map_err(xml_err)?;
    writer.write_event(Event::End(BytesEnd::new("rdf:li"))).map_err(xml_err)?;
    Ok(())
}

/// Builds the gain-map (secondary) image's `x:xmpmeta` block: the `hdrgm:`
/// attributes, per §4.9 item 6. Uniform (R==G==B) triplets collapse to a
/// scalar attribute; non-uniform ones write an `rdf:Seq` child element
/// instead (§4.9, "Triplet values").
pub fn build_gain_map_xmp(metadata: &GainMapMetadata) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write_xmpmeta_open(&mut writer)?;

    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    desc.push_attribute(("xmlns:hdrgm", HDRGM_NS));
    desc.push_attribute(("hdrgm:Version", "1.0"));
    desc.push_attribute(("hdrgm:BaseRenditionIsHDR", "False"));

    let scalar_attrs = [
        ("hdrgm:GainMapMin", metadata.gain_map_min),
        ("hdrgm:GainMapMax", metadata.gain_map_max),
        ("hdrgm:Gamma", metadata.gamma),
        ("hdrgm:OffsetSDR", metadata.offset_sdr),
        ("hdrgm:OffsetHDR", metadata.offset_hdr),
    ];
    let mut seq_children: Vec<(&str, Triplet)> = Vec::new();
    let mut formatted = Vec::new();
    for (name, triplet) in scalar_attrs {
        if triplet.is_uniform() {
            formatted.push((name, format_f32(triplet.0[0])));
        } else {
            seq_children.push((name, triplet));
        }
    }
    for (name, value) in &formatted {
        desc.push_attribute((*name, value.as_str()));
    }
    let hdr_capacity_min = format_f32(metadata.hdr_capacity_min);
    let hdr_capacity_max = format_f32(metadata.hdr_capacity_max);
    desc.push_attribute(("hdrgm:HDRCapacityMin", hdr_capacity_min.as_str()));
    desc.push_attribute(("hdrgm:HDRCapacityMax", hdr_capacity_max.as_str()));

    if seq_children.is_empty() {
        writer.write_event(Event::Empty(desc)).map_err(xml_err)?;
    } else {
        writer.write_event(Event::Start(desc)).map_err(xml_err)?;
        for (name, triplet) in seq_children {
            let local = name.strip_prefix("hdrgm:").unwrap_or(name);
            let tag = format!("hdrgm:{local}");
            writer.write_event(Event::Start(BytesStart::new(&tag))).map_err(xml_err)?;
            writer.write_event(Event::Start(BytesStart::new("rdf:Seq"))).map_err(xml_err)?;
            for v in triplet.0 {
                writer.write_event(Event::Start(BytesStart::new("rdf:li"))).map_err(xml_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(&format_f32(v))))
                    .map_err(xml_err)?;
                writer.write_event(Event::End(BytesEnd::new("rdf:li"))).map_err(xml_err)?;
            }
            writer.write_event(Event::End(BytesEnd::new("rdf:Seq"))).map_err(xml_err)?;
            writer.write_event(Event::End(BytesEnd::new(&tag))).map_err(xml_err)?;
        }
        writer.write_event(Event::End(BytesEnd::new("rdf:Description"))).map_err(xml_err)?;
    }
    write_xmpmeta_close(&mut writer)?;

    Ok(writer.into_inner())
}

fn write_xmpmeta_open(writer: &mut Writer<Vec<u8>>) -> Result<()> {
    // Embedded XMP in a JPEG APP1 segment never carries the `<?xpacket?>`
    // processing instruction real standalone .xmp sidecar files use.
    let mut meta = BytesStart::new("x:xmpmeta");
    meta.push_attribute(("xmlns:x", "adobe:ns:meta/"));
    writer.write_event(Event::Start(meta)).map_err(xml_err)?;
    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(("xmlns:rdf", RDF_NS));
    writer.write_event(Event::Start(rdf)).map_err(xml_err)?;
    Ok(())
}

fn write_xmpmeta_close(writer: &mut Writer<Vec<u8>>) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new("rdf:RDF"))).map_err(xml_err)?;
    writer.write_event(Event::End(BytesEnd::new("x:xmpmeta"))).map_err(xml_err)?;
    Ok(())
}

fn format_f32(v: f32) -> String {
    let mut s = format!("{v:.6}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.push('0');
        }
    }
    s
}

/// Scans `bytes` for every `<x:xmpmeta ...>...</x:xmpmeta>` block (a JPEG
/// may carry more than one, e.g. a plain Exif/XMP block plus the gain-map
/// descriptor).
fn find_xmpmeta_blocks(bytes: &[u8]) -> Vec<&[u8]> {
    const OPEN: &[u8] = b"<x:xmpmeta";
    const CLOSE: &[u8] = b"</x:xmpmeta>";
    let mut blocks = Vec::new();
    let mut pos = 0usize;
    while let Some(start_rel) = find_subslice(&bytes[pos..], OPEN) {
        let start = pos + start_rel;
        if let Some(end_rel) = find_subslice(&bytes[start..], CLOSE) {
            let end = start + end_rel + CLOSE.len();
            blocks.push(&bytes[start..end]);
            pos = end;
        } else {
            break;
        }
    }
    blocks
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Finds the gain-map descriptor block: the first `x:xmpmeta` block that
/// carries `hdrgm:HDRCapacityMax` (§4.10), and parses its `hdrgm:`
/// attributes and child `rdf:Seq` triplets into a [`GainMapMetadata`].
///
/// # Errors
///
/// Returns [`Error::GainMapMissing`] when no block carries gain-map
/// metadata.
pub fn find_gain_map_metadata(bytes: &[u8]) -> Result<GainMapMetadata> {
    for block in find_xmpmeta_blocks(bytes) {
        if let Some(metadata) = try_parse_gain_map_xmp(block) {
            return Ok(metadata);
        }
    }
    Err(Error::gain_map_missing(
        "Not a valid JPEG with gain map: missing gain map metadata",
    ))
}

fn try_parse_gain_map_xmp(block: &[u8]) -> Option<GainMapMetadata> {
    let mut reader = Reader::from_reader(block);
    reader.config_mut().trim_text(true);

    let mut attrs: std::collections::HashMap<String, String> = std::collections::HashMap::new();
    let mut seq_target: Option<String> = None;
    let mut seq_values: Vec<f32> = Vec::new();
    let mut seq_results: std::collections::HashMap<String, Vec<f32>> = std::collections::HashMap::new();
    let mut in_li = false;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Err(_) => return None,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    if let Some(stripped) = key.strip_prefix("hdrgm:") {
                        let value = String::from_utf8_lossy(&attr.value).into_owned();
                        attrs.insert(stripped.to_string(), value);
                    }
                }
                if name.starts_with("hdrgm:") {
                    seq_target = Some(name.strip_prefix("hdrgm:").unwrap().to_string());
                    seq_values.clear();
                } else if name == "rdf:li" {
                    in_li = true;
                    text.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if in_li {
                    text.push_str(&e.decode().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "rdf:li" && in_li {
                    if let Ok(v) = text.trim().parse::<f32>() {
                        seq_values.push(v);
                    }
                    in_li = false;
                } else if let Some(target) = &seq_target {
                    if name == format!("hdrgm:{target}") {
                        if seq_values.len() == 3 {
                            seq_results.insert(target.clone(), seq_values.clone());
                        }
                        seq_target = None;
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if !attrs.contains_key("HDRCapacityMax") {
        return None;
    }

    let triplet_of = |name: &str, default: f32| -> Triplet {
        if let Some(values) = seq_results.get(name) {
            return Triplet([values[0], values[1], values[2]]);
        }
        match attrs.get(name).and_then(|v| v.parse::<f32>().ok()) {
            Some(v) => Triplet::scalar(v),
            None => Triplet::scalar(default),
        }
    };

    let gain_map_min = triplet_of("GainMapMin", 0.0);
    let gain_map_max = triplet_of("GainMapMax", 1.0);
    let gamma = triplet_of("Gamma", 1.0);
    let offset_sdr = triplet_of("OffsetSDR", 1.0 / 64.0);
    let offset_hdr = triplet_of("OffsetHDR", 1.0 / 64.0);
    let hdr_capacity_min = attrs.get("HDRCapacityMin").and_then(|v| v.parse::<f32>().ok()).unwrap_or(0.0);
    let hdr_capacity_max = attrs.get("HDRCapacityMax")?.parse::<f32>().ok()?;

    Some(GainMapMetadata {
        gamma,
        offset_sdr,
        offset_hdr,
        gain_map_min,
        gain_map_max,
        hdr_capacity_min,
        hdr_capacity_max,
    })
}

/// Reads the primary image's `Container:Directory` gain-map item length, if
/// present (used by the extractor to sanity-check the MPF-derived size).
pub fn find_gain_map_item_length(bytes: &[u8]) -> Option<usize> {
    for block in find_xmpmeta_blocks(bytes) {
        let text = String::from_utf8_lossy(block);
        if !text.contains("Item:Semantic=\"GainMap\"") {
            continue;
        }
        if let Some(idx) = text.find("Item:Length=\"") {
            let rest = &text[idx + "Item:Length=\"".len()..];
            if let Some(end) = rest.find('"') {
                if let Ok(len) = rest[..end].parse::<usize>() {
                    return Some(len);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_xmp_has_no_xpacket_wrapper() {
        let xmp = build_primary_xmp(1234).unwrap();
        let text = String::from_utf8(xmp).unwrap();
        assert!(!text.contains("xpacket"));
        assert!(text.contains("Container:Directory"));
        assert!(text.contains("1234"));
    }

    #[test]
    fn gain_map_xmp_round_trips_uniform_metadata() {
        let metadata = GainMapMetadata {
            gamma: Triplet::scalar(1.0),
            offset_sdr: Triplet::scalar(1.0 / 64.0),
            offset_hdr: Triplet::scalar(1.0 / 64.0),
            gain_map_min: Triplet::scalar(0.0),
            gain_map_max: Triplet::scalar(3.5),
            hdr_capacity_min: 0.0,
            hdr_capacity_max: 3.5,
        };
        let xmp = build_gain_map_xmp(&metadata).unwrap();
        let parsed = try_parse_gain_map_xmp(&xmp).unwrap();
        assert!((parsed.gain_map_max.0[0] - 3.5).abs() < 1e-4);
        assert!((parsed.hdr_capacity_max - 3.5).abs() < 1e-4);
    }

    #[test]
    fn gain_map_xmp_round_trips_non_uniform_metadata_as_seq() {
        let metadata = GainMapMetadata {
            gamma: Triplet([1.0, 1.2, 0.8]),
            offset_sdr: Triplet::scalar(1.0 / 64.0),
            offset_hdr: Triplet::scalar(1.0 / 64.0),
            gain_map_min: Triplet([0.0, 0.1, -0.1]),
            gain_map_max: Triplet([2.0, 2.5, 3.0]),
            hdr_capacity_min: 0.0,
            hdr_capacity_max: 3.0,
        };
        let xmp = build_gain_map_xmp(&metadata).unwrap();
        let text = String::from_utf8(xmp.clone()).unwrap();
        assert!(text.contains("rdf:Seq"));
        let parsed = try_parse_gain_map_xmp(&xmp).unwrap();
        assert!((parsed.gamma.0[1] - 1.2).abs() < 1e-4);
        assert!((parsed.gain_map_max.0[2] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn find_gain_map_metadata_errors_without_hdrgm_block() {
        let err = find_gain_map_metadata(b"no xmp here");
        assert!(err.is_err());
    }

    #[test]
    fn finds_metadata_among_unrelated_xmp_blocks() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"<x:xmpmeta><rdf:RDF><rdf:Description rdf:about=\"\" tiff:Make=\"Example\"/></rdf:RDF></x:xmpmeta>");
        bytes.extend_from_slice(&build_gain_map_xmp(&GainMapMetadata::default()).unwrap());
        let parsed = find_gain_map_metadata(&bytes).unwrap();
        assert!(parsed.hdr_capacity_max >= parsed.hdr_capacity_min);
    }
}
