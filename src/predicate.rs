// src/predicate.rs
//
// File selection predicates, built once from the options and reused for
// every file:
//   NameFilter - file name globs
//   Grep       - (regex, tag glob) pairs over tag values
//   Select     - tag globs restricting what gets listed
//   Near       - GPS proximity to a set of centers

use crate::geodesy::{distance_km, format_point, parse_dms};
use crate::glob::NameGlob;
use crate::keymap::ResolvedKeyMap;
use crate::tag_store::{
    KEY_DISTANCE, KEY_NEAR, Namespace, TAG_GPS_LATITUDE, TAG_GPS_LATITUDE_REF, TAG_GPS_LONGITUDE,
    TAG_GPS_LONGITUDE_REF, TagSnapshot, TagStore,
};
use geo::Point;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, trace};

// ============================================================================
// Name filter
// ============================================================================

#[derive(Debug, Default)]
pub struct NameFilter {
    /// Stored lower-cased, compared against the lower-cased file name
    iname: Vec<NameGlob>,
    name: Vec<NameGlob>,
}

impl NameFilter {
    pub fn new(iname: &[String], name: &[String]) -> Result<Self, glob::PatternError> {
        Ok(Self {
            iname: iname.iter().map(|g| NameGlob::new(&g.to_lowercase())).collect::<Result<_, _>>()?,
            name: name.iter().map(|g| NameGlob::new(g)).collect::<Result<_, _>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.iname.is_empty() && self.name.is_empty()
    }

    pub fn check_match(&self, file_name: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        let lower = file_name.to_lowercase();
        self.iname.iter().any(|g| g.matches(&lower)) || self.name.iter().any(|g| g.matches(file_name))
    }
}

// ============================================================================
// Grep
// ============================================================================

#[derive(Debug)]
pub struct GrepPair {
    pub pattern: Regex,
    pub tags: NameGlob,
}

#[derive(Debug, Default)]
pub struct Grep {
    pairs: Vec<GrepPair>,
    /// Report every hit instead of stopping at the first
    pub verbose: bool,
    /// Prefix reported hits with the file path
    pub with_name: bool,
}

impl Grep {
    pub fn new(pairs: Vec<GrepPair>, verbose: bool, with_name: bool) -> Self {
        Self { pairs, verbose, with_name }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// True when every pair matches at least one tag value.
    pub fn matches(
        &self,
        path: &Path,
        store: &TagStore,
        keymap: &ResolvedKeyMap,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        let mut all_match = true;
        for pair in &self.pairs {
            let keys = pair.tags.filter(keymap.display_names());
            trace!("Matched keys for {}: {:?}", pair.tags.as_str(), keys);

            let mut matched = false;
            'keys: for display in keys {
                let Some(canonical) = keymap.resolve(display) else {
                    continue;
                };
                let repeated = store
                    .get(canonical)
                    .filter(|e| e.namespace == Namespace::Iptc && e.repeatable);
                let candidates = match repeated {
                    Some(entry) => entry.values.clone(),
                    None => vec![store.human_str(canonical)],
                };
                for value in candidates {
                    if self.sub_grep(&pair.pattern, path, display, &value, out)? {
                        matched = true;
                        if !self.verbose {
                            break 'keys;
                        }
                    }
                }
            }

            if !matched {
                all_match = false;
                if !self.verbose {
                    break;
                }
            }
        }
        Ok(all_match)
    }

    fn sub_grep(
        &self,
        pattern: &Regex,
        path: &Path,
        key: &str,
        value: &str,
        out: &mut dyn Write,
    ) -> io::Result<bool> {
        if !pattern.is_match(value) {
            return Ok(false);
        }
        if self.verbose {
            if self.with_name {
                writeln!(out, "{}: {}: {}", path.display(), key, value)?;
            } else {
                writeln!(out, "{}: {}", key, value)?;
            }
        }
        Ok(true)
    }
}

// ============================================================================
// Select
// ============================================================================

#[derive(Debug, Default)]
pub struct Select {
    globs: Vec<NameGlob>,
}

impl Select {
    pub fn new(globs: Vec<NameGlob>) -> Self {
        Self { globs }
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    /// Display names matched by any glob.
    pub fn expand(&self, keymap: &ResolvedKeyMap) -> BTreeSet<String> {
        let mut selected = BTreeSet::new();
        for glob in &self.globs {
            for name in glob.filter(keymap.display_names()) {
                selected.insert(name.to_string());
            }
        }
        trace!("Selected keys: {:?}", selected);
        selected
    }
}

// ============================================================================
// Near
// ============================================================================

#[derive(Debug, Clone)]
pub struct Near {
    centers: Vec<Point<f64>>,
    pub radius_km: f64,
}

impl Near {
    pub fn new(centers: Vec<Point<f64>>, radius_km: f64) -> Self {
        Self { centers, radius_km }
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Decimal position from the four GPS tags, None when any is missing or bad.
    pub fn position(tags: &TagSnapshot) -> Option<Point<f64>> {
        let field = |key: &str| {
            let value = tags.get(key).map(String::as_str);
            if value.is_none() {
                debug!("GetDecimalLatLon: missing {}", key);
            }
            value
        };
        let lat_str = field(TAG_GPS_LATITUDE)?;
        let lat_ref = field(TAG_GPS_LATITUDE_REF)?;
        let lon_str = field(TAG_GPS_LONGITUDE)?;
        let lon_ref = field(TAG_GPS_LONGITUDE_REF)?;
        trace!("lat: {:?}, lon: {:?}", lat_str, lon_str);

        let Some(mut lat) = parse_dms(lat_str) else {
            debug!("Error parsing {:?} as degree, minutes, seconds", lat_str);
            return None;
        };
        let Some(mut lon) = parse_dms(lon_str) else {
            debug!("Error parsing {:?} as degree, minutes, seconds", lon_str);
            return None;
        };
        if lat_ref == "South" {
            lat = -lat;
        }
        if lon_ref == "West" {
            lon = -lon;
        }
        Some(crate::geodesy::lat_lon(lat, lon))
    }

    /// Record the closest center within the radius into `_near` and
    /// `_distance`. False when there is no position or nothing is close.
    pub fn check(&self, path: &Path, tags: &mut TagSnapshot) -> bool {
        let Some(file_pos) = Self::position(tags) else {
            return false;
        };

        let mut nearest: Option<(Point<f64>, f64)> = None;
        for &center in &self.centers {
            let dist = distance_km(center, file_pos);
            if dist <= self.radius_km {
                if nearest.is_none_or(|(_, closest)| dist < closest) {
                    nearest = Some((center, dist));
                }
            } else {
                debug!(
                    "{}: {} is {:.1}km from {}",
                    path.display(),
                    format_point(file_pos),
                    dist,
                    format_point(center)
                );
            }
        }

        let Some((center, dist)) = nearest else {
            return false;
        };
        info!(
            "{}: {} is {:.1}km from {}",
            path.display(),
            format_point(file_pos),
            dist,
            format_point(center)
        );
        tags.insert(KEY_NEAR.to_string(), format_point(center));
        tags.insert(KEY_DISTANCE.to_string(), format!("{:.1}", dist));
        true
    }
}
