// src/metadata.rs
//
// The metadata reader: fills a TagStore from an image file.
// - EXIF through kamadak-exif, keyed Exif.<Group>.<TagName>
// - IPTC-IIM from the JPEG APP13 Photoshop resource block
// - XMP simple properties from the embedded xmpmeta packet
// Nothing is ever written back.

use crate::geodesy::format_dms;
use crate::tag_store::{MAX_TAG_SIZE, TagEntry, TagStore};
use exif::{Context, In, Tag, Value};
use regex::Regex;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {}", .path.display(), .source)]
    Format {
        path: PathBuf,
        #[source]
        source: exif::Error,
    },
}

/// Read all metadata of one file.
pub fn read_metadata(path: &Path) -> Result<TagStore, MetadataError> {
    let bytes = std::fs::read(path)
        .map_err(|source| MetadataError::Io { path: path.to_path_buf(), source })?;
    parse_metadata(&bytes)
        .map_err(|source| MetadataError::Format { path: path.to_path_buf(), source })
}

/// Parse metadata from an in-memory image.
/// A container without EXIF is fine; a container the EXIF reader cannot make
/// sense of is an error unless IPTC or XMP data was found anyway.
pub fn parse_metadata(bytes: &[u8]) -> Result<TagStore, exif::Error> {
    let mut store = TagStore::new();
    let mut failure = None;

    match exif::Reader::new().read_from_container(&mut std::io::Cursor::new(bytes)) {
        Ok(exif_data) => add_exif(&mut store, &exif_data),
        Err(exif::Error::NotFound(what)) => debug!("No EXIF data in {}", what),
        Err(e) => failure = Some(e),
    }

    for (marker, segment) in jpeg_segments(bytes) {
        if marker == APP13
            && let Some(block) = iptc_block(segment)
        {
            add_iim(&mut store, block);
        }
    }

    if let Some(packet) = xmp_packet(bytes) {
        add_xmp(&mut store, &String::from_utf8_lossy(packet));
    }

    match failure {
        Some(e) if store.is_empty() => Err(e),
        _ => Ok(store),
    }
}

// =============================================================================
// EXIF
// =============================================================================

const GPS_COORD_TAGS: [Tag; 4] =
    [Tag::GPSLatitude, Tag::GPSLongitude, Tag::GPSDestLatitude, Tag::GPSDestLongitude];
const GPS_REF_TAGS: [Tag; 4] =
    [Tag::GPSLatitudeRef, Tag::GPSLongitudeRef, Tag::GPSDestLatitudeRef, Tag::GPSDestLongitudeRef];

fn add_exif(store: &mut TagStore, exif_data: &exif::Exif) {
    for field in exif_data.fields() {
        let Some(group) = exif_group(field) else {
            continue;
        };
        if field.tag == Tag::MakerNote {
            continue;
        }
        if let Value::Undefined(bytes, _) = &field.value
            && bytes.len() > MAX_TAG_SIZE
        {
            trace!("Skipping {} byte blob in {}", bytes.len(), field.tag);
            continue;
        }

        let name = match field.tag.description() {
            Some(_) => field.tag.to_string(),
            None => format!("0x{:04x}", field.tag.number()),
        };
        let key = format!("Exif.{}.{}", group, name);
        let entry = TagEntry::exif(
            raw_string(&field.value),
            human_string(field, exif_data),
            field.tag.description(),
        );
        store.insert(key, entry);
    }
}

/// Group name of a field: Image (IFD0), Photo, GPSInfo, Iop, Thumbnail (IFD1).
fn exif_group(field: &exif::Field) -> Option<&'static str> {
    if field.ifd_num == In::THUMBNAIL {
        return Some("Thumbnail");
    }
    if field.ifd_num != In::PRIMARY {
        return None;
    }
    Some(match field.tag.context() {
        Context::Tiff => "Image",
        Context::Exif => "Photo",
        Context::Gps => "GPSInfo",
        Context::Interop => "Iop",
        _ => return None,
    })
}

fn join<T: Display>(items: &[T]) -> String {
    items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

/// Raw string form: rationals as n/d, numbers and bytes space separated.
fn raw_string(value: &Value) -> String {
    match value {
        Value::Byte(v) => join(v),
        Value::Ascii(v) => v
            .iter()
            .map(|s| String::from_utf8_lossy(s).trim_end_matches('\0').to_string())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Short(v) => join(v),
        Value::Long(v) => join(v),
        Value::Rational(v) => {
            v.iter().map(|r| format!("{}/{}", r.num, r.denom)).collect::<Vec<_>>().join(" ")
        }
        Value::SByte(v) => join(v),
        Value::Undefined(v, _) => join(v),
        Value::SShort(v) => join(v),
        Value::SLong(v) => join(v),
        Value::SRational(v) => {
            v.iter().map(|r| format!("{}/{}", r.num, r.denom)).collect::<Vec<_>>().join(" ")
        }
        Value::Float(v) => join(v),
        Value::Double(v) => join(v),
        _ => String::new(),
    }
}

fn human_string(field: &exif::Field, exif_data: &exif::Exif) -> String {
    if GPS_COORD_TAGS.contains(&field.tag)
        && let Some(deg) = parse_gps_coordinate(&field.value)
    {
        return format_dms(deg);
    }
    if GPS_REF_TAGS.contains(&field.tag)
        && let Some(spelled) = spell_gps_ref(&field.value)
    {
        return spelled.to_string();
    }
    // display_value() would quote text
    if let Value::Ascii(_) = field.value {
        return raw_string(&field.value);
    }
    field.display_value().with_unit(exif_data).to_string()
}

/// Parse GPS coordinate magnitude from EXIF rational values (DMS -> Decimal).
/// Returns positive value; the sign lives in the matching Ref tag.
fn parse_gps_coordinate(value: &Value) -> Option<f64> {
    if let Value::Rational(rats) = value
        && rats.len() >= 3
    {
        if rats[0].denom == 0 || rats[1].denom == 0 || rats[2].denom == 0 {
            return None;
        }
        let degrees = rats[0].to_f64();
        let minutes = rats[1].to_f64();
        let seconds = rats[2].to_f64();
        return Some(degrees + minutes / 60.0 + seconds / 3600.0);
    }
    None
}

fn spell_gps_ref(value: &Value) -> Option<&'static str> {
    let Value::Ascii(v) = value else {
        return None;
    };
    match v.first()?.first()? {
        b'N' => Some("North"),
        b'S' => Some("South"),
        b'E' => Some("East"),
        b'W' => Some("West"),
        _ => None,
    }
}

// =============================================================================
// JPEG segments
// =============================================================================

const APP13: u8 = 0xED;
const PHOTOSHOP_SIG: &[u8] = b"Photoshop 3.0\0";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Marker segments before the image data, as (marker, payload).
fn jpeg_segments(bytes: &[u8]) -> Vec<(u8, &[u8])> {
    let mut segments = Vec::new();
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return segments;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            break;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1; // fill byte
            continue;
        }
        if marker == 0xD9 || marker == 0xDA {
            break; // EOI, SOS
        }
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += 2; // standalone markers
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 || pos + 2 + len > bytes.len() {
            break;
        }
        segments.push((marker, &bytes[pos + 4..pos + 2 + len]));
        pos += 2 + len;
    }
    segments
}

/// Find the IPTC-NAA resource (0x0404) inside a Photoshop APP13 payload.
fn iptc_block(app13: &[u8]) -> Option<&[u8]> {
    let mut data = app13.strip_prefix(PHOTOSHOP_SIG)?;
    while data.len() >= 12 && data.starts_with(b"8BIM") {
        let id = u16::from_be_bytes([data[4], data[5]]);
        // Pascal name, padded to an even length including the length byte
        let name_total = (data[6] as usize + 2) & !1;
        let size_at = 6 + name_total;
        let size_bytes: [u8; 4] = data.get(size_at..size_at + 4)?.try_into().ok()?;
        let size = u32::from_be_bytes(size_bytes) as usize;
        let start = size_at + 4;
        let end = start.checked_add(size)?;
        if end > data.len() {
            return None;
        }
        if id == IPTC_RESOURCE_ID {
            return Some(&data[start..end]);
        }
        data = data.get(end + (size & 1)..)?;
    }
    None
}

// =============================================================================
// IPTC-IIM
// =============================================================================

/// (record, dataset, name, title, repeatable)
const IPTC_DATASETS: &[(u8, u8, &str, &str, bool)] = &[
    (1, 0, "ModelVersion", "Model Version", false),
    (1, 5, "Destination", "Destination", true),
    (1, 20, "FileFormat", "File Format", false),
    (1, 22, "FileVersion", "File Version", false),
    (1, 30, "ServiceId", "Service Id", false),
    (1, 40, "EnvelopePriority", "Envelope Priority", false),
    (1, 70, "DateSent", "Date Sent", false),
    (1, 80, "TimeSent", "Time Sent", false),
    (1, 90, "CharacterSet", "Character Set", false),
    (2, 0, "RecordVersion", "Record Version", false),
    (2, 3, "ObjectType", "Object Type", false),
    (2, 4, "ObjectAttribute", "Object Attribute", true),
    (2, 5, "ObjectName", "Object Name", false),
    (2, 7, "EditStatus", "Edit Status", false),
    (2, 10, "Urgency", "Urgency", false),
    (2, 12, "Subject", "Subject", true),
    (2, 15, "Category", "Category", false),
    (2, 20, "SuppCategory", "Supplemental Category", true),
    (2, 22, "FixtureId", "Fixture Id", false),
    (2, 25, "Keywords", "Keywords", true),
    (2, 26, "LocationCode", "Location Code", true),
    (2, 27, "LocationName", "Location Name", true),
    (2, 30, "ReleaseDate", "Release Date", false),
    (2, 35, "ReleaseTime", "Release Time", false),
    (2, 37, "ExpirationDate", "Expiration Date", false),
    (2, 38, "ExpirationTime", "Expiration Time", false),
    (2, 40, "SpecialInstructions", "Special Instructions", false),
    (2, 45, "ReferenceService", "Reference Service", true),
    (2, 55, "DateCreated", "Date Created", false),
    (2, 60, "TimeCreated", "Time Created", false),
    (2, 62, "DigitizationDate", "Digitization Date", false),
    (2, 63, "DigitizationTime", "Digitization Time", false),
    (2, 65, "Program", "Program", false),
    (2, 70, "ProgramVersion", "Program Version", false),
    (2, 75, "ObjectCycle", "Object Cycle", false),
    (2, 80, "Byline", "By-line", true),
    (2, 85, "BylineTitle", "By-line Title", true),
    (2, 90, "City", "City", false),
    (2, 92, "SubLocation", "Sub-location", false),
    (2, 95, "ProvinceState", "Province/State", false),
    (2, 100, "CountryCode", "Country Code", false),
    (2, 101, "CountryName", "Country Name", false),
    (2, 103, "TransmissionReference", "Transmission Reference", false),
    (2, 105, "Headline", "Headline", false),
    (2, 110, "Credit", "Credit", false),
    (2, 115, "Source", "Source", false),
    (2, 116, "Copyright", "Copyright", false),
    (2, 118, "Contact", "Contact", true),
    (2, 120, "Caption", "Caption", false),
    (2, 122, "Writer", "Writer", true),
];

fn iptc_record_name(record: u8) -> String {
    match record {
        1 => "Envelope".to_string(),
        2 => "Application2".to_string(),
        n => format!("Record{}", n),
    }
}

fn add_iim(store: &mut TagStore, data: &[u8]) {
    let mut pos = 0;
    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            break;
        }
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let mut len = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;
        if len & 0x8000 != 0 {
            // Extended dataset: low bits give the size of the length field
            let n = len & 0x7FFF;
            if n > 4 || pos + n > data.len() {
                break;
            }
            len = data[pos..pos + n].iter().fold(0, |acc, b| (acc << 8) | *b as usize);
            pos += n;
        }
        let Some(value) = data.get(pos..pos + len) else {
            break;
        };
        pos += len;

        let known = IPTC_DATASETS.iter().find(|(r, d, ..)| *r == record && *d == dataset);
        let (name, title, repeatable) = match known {
            Some((_, _, name, title, repeatable)) => (name.to_string(), Some(*title), *repeatable),
            None => (format!("0x{:04x}", dataset), None, false),
        };
        let key = format!("Iptc.{}.{}", iptc_record_name(record), name);
        let text = if dataset == 0 && value.len() == 2 {
            u16::from_be_bytes([value[0], value[1]]).to_string()
        } else {
            String::from_utf8_lossy(value).trim_end_matches('\0').to_string()
        };

        if repeatable {
            store.push_repeated(&key, text, title);
        } else {
            store.insert(key, TagEntry::iptc(text, false, title));
        }
    }
}

// =============================================================================
// XMP
// =============================================================================

static DESC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<rdf:Description\b([^>]*)>").unwrap());
static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z][\w-]*):([A-Za-z][\w-]*)\s*=\s*"([^"]*)""#).unwrap());
static ARRAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<([A-Za-z][\w-]*):([A-Za-z][\w-]*)[^>]*>\s*<rdf:(?:Bag|Seq|Alt)[^>]*>(.*?)</rdf:(?:Bag|Seq|Alt)>",
    )
    .unwrap()
});
static LI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<rdf:li[^>]*>([^<]*)</rdf:li>").unwrap());
static LEAF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][\w-]*):([A-Za-z][\w-]*)(?:\s[^>]*)?>([^<]*)</([A-Za-z][\w-]*):([A-Za-z][\w-]*)>")
        .unwrap()
});

// Prefixes that carry RDF structure rather than properties
const XMP_STRUCTURAL: &[&str] = &["rdf", "x", "xmlns", "xml"];

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn xmp_packet(bytes: &[u8]) -> Option<&[u8]> {
    const OPEN: &[u8] = b"<x:xmpmeta";
    const CLOSE: &[u8] = b"</x:xmpmeta>";
    let start = find_bytes(bytes, OPEN)?;
    let len = find_bytes(&bytes[start..], CLOSE)?;
    Some(&bytes[start..start + len + CLOSE.len()])
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn add_xmp(store: &mut TagStore, packet: &str) {
    let mut insert = |prefix: &str, name: &str, value: String| {
        if XMP_STRUCTURAL.contains(&prefix) {
            return;
        }
        store.insert(format!("Xmp.{}.{}", prefix, name), TagEntry::xmp(value));
    };

    for desc in DESC_RE.captures_iter(packet) {
        for attr in ATTR_RE.captures_iter(&desc[1]) {
            insert(&attr[1], &attr[2], unescape_xml(&attr[3]));
        }
    }

    for array in ARRAY_RE.captures_iter(packet) {
        let items: Vec<String> =
            LI_RE.captures_iter(&array[3]).map(|li| unescape_xml(li[1].trim())).collect();
        insert(&array[1], &array[2], items.join(", "));
    }

    for leaf in LEAF_RE.captures_iter(packet) {
        if leaf[1] != leaf[4] || leaf[2] != leaf[5] {
            continue;
        }
        insert(&leaf[1], &leaf[2], unescape_xml(leaf[3].trim()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::Namespace;
    use crate::test_support::{app13_iptc, gps_fields, jpeg_with, xmp_segment};
    use exif::Field;

    #[test]
    fn test_exif_keys_and_values() {
        let make =
            Field { tag: Tag::Make, ifd_num: In::PRIMARY, value: Value::Ascii(vec![b"Acme".to_vec()]) };
        let mut fields = vec![make];
        fields.extend(gps_fields(37.273852, -107.884577));
        let bytes = jpeg_with(&fields, &[]);

        let store = parse_metadata(&bytes).unwrap();
        assert_eq!(store.human_str("Exif.Image.Make"), "Acme");
        assert_eq!(store.human_str("Exif.GPSInfo.GPSLatitudeRef"), "North");
        assert_eq!(store.human_str("Exif.GPSInfo.GPSLongitudeRef"), "West");

        let lat = store.human_str("Exif.GPSInfo.GPSLatitude");
        assert!(lat.starts_with("37deg 16' "), "{}", lat);
        assert!(store.get("Exif.GPSInfo.GPSLatitude").unwrap().raw.starts_with("37/1 16/1 "));
        assert!(store.label("Exif.Image.Make").is_some());
        assert!(store.keys(Namespace::Iptc).is_empty());
    }

    #[test]
    fn test_iptc_repeatable() {
        let iptc = app13_iptc(&[(2, 25, "beach"), (2, 25, "sunset"), (2, 5, "Holiday")]);
        let bytes = jpeg_with(&[], &[iptc]);

        let store = parse_metadata(&bytes).unwrap();
        let keywords = store.get("Iptc.Application2.Keywords").unwrap();
        assert!(keywords.repeatable);
        assert_eq!(keywords.values, ["beach", "sunset"]);
        assert_eq!(store.human_str("Iptc.Application2.ObjectName"), "Holiday");
        assert_eq!(store.label("Iptc.Application2.ObjectName"), Some("Object Name"));
        assert_eq!(store.keys(Namespace::Iptc).len(), 2);
    }

    #[test]
    fn test_xmp_properties() {
        let xmp = xmp_segment(
            r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/" xmp:Rating="5">
<dc:subject><rdf:Bag><rdf:li>beach</rdf:li><rdf:li>fish &amp; chips</rdf:li></rdf:Bag></dc:subject>
<photoshop:City>Durango</photoshop:City>
</rdf:Description></rdf:RDF></x:xmpmeta>"#,
        );
        let bytes = jpeg_with(&[], &[xmp]);

        let store = parse_metadata(&bytes).unwrap();
        assert_eq!(store.human_str("Xmp.xmp.Rating"), "5");
        assert_eq!(store.human_str("Xmp.dc.subject"), "beach, fish & chips");
        assert_eq!(store.human_str("Xmp.photoshop.City"), "Durango");
        assert!(store.get("Xmp.rdf.about").is_none());
        assert!(store.label("Xmp.photoshop.City").is_none());
    }

    #[test]
    fn test_no_metadata_is_empty_store() {
        let bytes = jpeg_with(&[], &[]);
        let store = parse_metadata(&bytes).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_not_an_image() {
        assert!(parse_metadata(b"just some text, nothing to see").is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_metadata(Path::new("/nonexistent/tagboy/file.jpg")).unwrap_err();
        assert!(matches!(err, MetadataError::Io { .. }));
    }
}
