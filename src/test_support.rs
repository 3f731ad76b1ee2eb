// src/test_support.rs
//
// Synthesized images for tests: EXIF written with kamadak-exif's writer and
// wrapped in a minimal JPEG, plus IPTC (APP13) and XMP (APP1) segments.

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use std::path::{Path, PathBuf};

pub fn tiff_bytes(fields: &[Field]) -> Vec<u8> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = std::io::Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut seg = vec![0xFF, marker];
    seg.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    seg.extend_from_slice(payload);
    seg
}

/// SOI, an EXIF APP1 segment (when there are fields), extra segments, EOI.
pub fn jpeg_with(fields: &[Field], extra_segments: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    if !fields.is_empty() {
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend(tiff_bytes(fields));
        out.extend(segment(0xE1, &payload));
    }
    for seg in extra_segments {
        out.extend_from_slice(seg);
    }
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// APP13 Photoshop segment holding IIM datasets (record, dataset, value).
pub fn app13_iptc(datasets: &[(u8, u8, &str)]) -> Vec<u8> {
    let mut iim = Vec::new();
    for (record, dataset, value) in datasets {
        iim.extend_from_slice(&[0x1C, *record, *dataset]);
        iim.extend_from_slice(&(value.len() as u16).to_be_bytes());
        iim.extend_from_slice(value.as_bytes());
    }
    let mut payload = b"Photoshop 3.0\0".to_vec();
    payload.extend_from_slice(b"8BIM");
    payload.extend_from_slice(&0x0404u16.to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&(iim.len() as u32).to_be_bytes());
    payload.extend_from_slice(&iim);
    if iim.len() % 2 == 1 {
        payload.push(0);
    }
    segment(0xED, &payload)
}

pub fn xmp_segment(packet: &str) -> Vec<u8> {
    let mut payload = b"http://ns.adobe.com/xap/1.0/\0".to_vec();
    payload.extend_from_slice(packet.as_bytes());
    segment(0xE1, &payload)
}

fn dms_rationals(deg: f64) -> Vec<Rational> {
    let abs = deg.abs();
    let d = abs.floor();
    let m_float = (abs - d) * 60.0;
    let m = m_float.floor();
    let s = (m_float - m) * 60.0;
    vec![
        Rational { num: d as u32, denom: 1 },
        Rational { num: m as u32, denom: 1 },
        Rational { num: (s * 1000.0).round() as u32, denom: 1000 },
    ]
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

pub fn gps_fields(lat: f64, lon: f64) -> Vec<Field> {
    vec![
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lat < 0.0 { "S" } else { "N" }),
        },
        Field { tag: Tag::GPSLatitude, ifd_num: In::PRIMARY, value: Value::Rational(dms_rationals(lat)) },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lon < 0.0 { "W" } else { "E" }),
        },
        Field { tag: Tag::GPSLongitude, ifd_num: In::PRIMARY, value: Value::Rational(dms_rationals(lon)) },
    ]
}

pub fn text_field(tag: Tag, text: &str) -> Field {
    Field { tag, ifd_num: In::PRIMARY, value: ascii(text) }
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
