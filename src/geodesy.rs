// src/geodesy.rs
//
// Great-circle distance and coordinate parsing for --near matching.
// Points follow the geo convention: x = longitude, y = latitude.

use geo::{Distance, HaversineMeasure, Point};
use regex::Regex;
use std::sync::LazyLock;

/// Earth radius used by the haversine formula, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// Degrees, minutes, seconds as formatted by the metadata reader, e.g. 37deg 16' 25.870"
static DMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)deg (\d+)' ([0-9.]+)\s*").unwrap());

/// Build a point from latitude and longitude in decimal degrees.
pub fn lat_lon(lat: f64, lon: f64) -> Point<f64> {
    Point::new(lon, lat)
}

/// Haversine distance between two points in kilometers.
pub fn distance_km(p1: Point<f64>, p2: Point<f64>) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_KM * 1000.0).distance(p1, p2) / 1000.0
}

/// Convert a `D deg M' S` string to decimal degrees (always positive).
pub fn parse_dms(dms: &str) -> Option<f64> {
    let caps = DMS_RE.captures(dms)?;
    let deg: f64 = caps[1].parse().ok()?;
    let min: f64 = caps[2].parse().ok()?;
    let sec: f64 = caps[3].parse().ok()?;
    Some(deg + min / 60.0 + sec / 3600.0)
}

/// Format decimal degrees (magnitude) the way `parse_dms` reads them back.
pub fn format_dms(decimal_deg: f64) -> String {
    let abs_deg = decimal_deg.abs();
    let d = abs_deg.floor();
    let m_float = (abs_deg - d) * 60.0;
    let m = m_float.floor();
    let s = (m_float - m) * 60.0;
    format!("{}deg {}' {:.3}\"", d as u32, m as u32, s)
}

/// Parse a command line position: `LAT, LON` in signed decimal degrees.
/// Outer parentheses and whitespace are ignored.
pub fn parse_lat_lon(arg: &str) -> Option<Point<f64>> {
    let s = arg.trim();
    let s = s.strip_prefix('(').unwrap_or(s);
    let s = s.strip_suffix(')').unwrap_or(s);
    let (lat, lon) = s.trim().split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(lat_lon(lat, lon))
}

/// `(lat, lon)` with six decimals, as stored in the `_near` tag.
pub fn format_point(p: Point<f64>) -> String {
    format!("({:.6}, {:.6})", p.y(), p.x())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dms() {
        let v = parse_dms("37deg 16' 25.870\"").unwrap();
        assert!((v - (37.0 + 16.0 / 60.0 + 25.870 / 3600.0)).abs() < 1e-9);

        let v = parse_dms("107deg 53' 4.477").unwrap();
        assert!((v - (107.0 + 53.0 / 60.0 + 4.477 / 3600.0)).abs() < 1e-9);

        assert!(parse_dms("37.2738").is_none());
        assert!(parse_dms("").is_none());
    }

    #[test]
    fn test_format_dms_round_trip() {
        let decimal = 37.0 + 16.0 / 60.0 + 25.870 / 3600.0;
        let s = format_dms(decimal);
        assert_eq!(s, "37deg 16' 25.870\"");
        assert!((parse_dms(&s).unwrap() - decimal).abs() < 1e-6);
    }

    #[test]
    fn test_distance() {
        let helsinki = lat_lon(60.1699, 24.9384);
        let tampere = lat_lon(61.4978, 23.7610);
        let d = distance_km(helsinki, tampere);
        assert!(d > 155.0 && d < 165.0, "Helsinki-Tampere {} km", d);

        assert_eq!(distance_km(helsinki, helsinki), 0.0);

        // Symmetric
        assert!((distance_km(tampere, helsinki) - d).abs() < 1e-9);

        // Quarter of a great circle along the equator
        let q = distance_km(lat_lon(0.0, 0.0), lat_lon(0.0, 90.0));
        assert!((q - EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_antipodal_distance_is_finite() {
        let d = distance_km(lat_lon(0.0, 0.0), lat_lon(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_parse_lat_lon() {
        let p = parse_lat_lon("(37.273852, -107.884577)").unwrap();
        assert_eq!(p.y(), 37.273852);
        assert_eq!(p.x(), -107.884577);

        let p = parse_lat_lon(" 60.1699,24.9384 ").unwrap();
        assert_eq!(p.y(), 60.1699);

        assert!(parse_lat_lon("37.27").is_none());
        assert!(parse_lat_lon("north, west").is_none());
        assert!(parse_lat_lon("91.0, 0.0").is_none());
    }

    #[test]
    fn test_format_point() {
        assert_eq!(format_point(lat_lon(37.273852, -107.884577)), "(37.273852, -107.884577)");
    }
}
