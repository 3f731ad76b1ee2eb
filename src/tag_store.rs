// src/tag_store.rs
//
// Per-file tag storage produced by the metadata reader.
// Three disjoint namespaces (EXIF, IPTC, XMP), each an ordered list of
// dotted canonical keys, every key holding a raw and a human-readable value.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Maximum size for binary values (skips thumbnails and maker notes)
pub const MAX_TAG_SIZE: usize = 1024;

// =============================================================================
// Reserved snapshot keys
// =============================================================================
// Metadata display names never start with '_', so these cannot collide.

pub const KEY_ARG: &str = "_arg";
pub const KEY_FILE_COUNT: &str = "_filecount";
pub const KEY_FILE_NAME: &str = "_filename";
pub const KEY_FILE_PATH: &str = "_filepath";
pub const KEY_MATCH_COUNT: &str = "_matchcount";
pub const KEY_VERSION: &str = "_version";
pub const KEY_NEAR: &str = "_near";
pub const KEY_DISTANCE: &str = "_distance";

// GPS tags read by the near predicate
pub const TAG_GPS_LATITUDE: &str = "Exif.GPSInfo.GPSLatitude";
pub const TAG_GPS_LATITUDE_REF: &str = "Exif.GPSInfo.GPSLatitudeRef";
pub const TAG_GPS_LONGITUDE: &str = "Exif.GPSInfo.GPSLongitude";
pub const TAG_GPS_LONGITUDE_REF: &str = "Exif.GPSInfo.GPSLongitudeRef";

/// Display name -> flattened string value, plus the reserved `_` keys.
pub type TagSnapshot = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Exif,
    Iptc,
    Xmp,
}

impl Namespace {
    fn index(self) -> usize {
        match self {
            Namespace::Exif => 0,
            Namespace::Iptc => 1,
            Namespace::Xmp => 2,
        }
    }
}

/// One tag value as delivered by the metadata reader.
#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub namespace: Namespace,
    /// Raw string form
    pub raw: String,
    /// Human formatted form (EXIF only)
    pub human: Option<String>,
    /// IPTC datasets that may occur more than once
    pub repeatable: bool,
    /// Every occurrence of a repeatable dataset, in file order
    pub values: Vec<String>,
    /// Localized label (EXIF) or title (IPTC)
    pub label: Option<String>,
}

impl TagEntry {
    pub fn exif(raw: impl Into<String>, human: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            namespace: Namespace::Exif,
            raw: raw.into(),
            human: Some(human.into()),
            repeatable: false,
            values: Vec::new(),
            label: label.map(str::to_string),
        }
    }

    pub fn iptc(value: impl Into<String>, repeatable: bool, label: Option<&str>) -> Self {
        let value = value.into();
        Self {
            namespace: Namespace::Iptc,
            values: if repeatable { vec![value.clone()] } else { Vec::new() },
            raw: value,
            human: None,
            repeatable,
            label: label.map(str::to_string),
        }
    }

    pub fn xmp(raw: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Xmp,
            raw: raw.into(),
            human: None,
            repeatable: false,
            values: Vec::new(),
            label: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagStore {
    keys: [Vec<String>; 3],
    entries: HashMap<String, TagEntry>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, entry: TagEntry) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.keys[entry.namespace.index()].push(key.clone());
        }
        self.entries.insert(key, entry);
    }

    /// Add one occurrence of a repeatable IPTC dataset.
    pub fn push_repeated(&mut self, key: &str, value: String, label: Option<&str>) {
        match self.entries.get_mut(key) {
            Some(entry) if entry.repeatable => {
                entry.values.push(value);
                entry.raw = entry.values.join(", ");
            }
            _ => self.insert(key, TagEntry::iptc(value, true, label)),
        }
    }

    /// Canonical keys of one namespace, in reader order
    pub fn keys(&self, ns: Namespace) -> &[String] {
        &self.keys[ns.index()]
    }

    pub fn get(&self, key: &str) -> Option<&TagEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most human readable form of a key's value.
    /// EXIF prefers the formatted value, everything else uses the raw string.
    /// A missing key yields an empty string.
    pub fn human_str(&self, key: &str) -> String {
        match self.entries.get(key) {
            Some(entry) if entry.namespace == Namespace::Exif => {
                entry.human.clone().unwrap_or_else(|| entry.raw.clone())
            }
            Some(entry) => entry.raw.clone(),
            None => {
                debug!("Error getting value for: {}", key);
                String::new()
            }
        }
    }

    /// Label for `--human` listings
    pub fn label(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.label.as_deref()).filter(|l| !l.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_namespaces() {
        let mut store = TagStore::new();
        store.insert("Exif.Image.Model", TagEntry::exif("X100", "X100", Some("Model")));
        store.insert("Xmp.dc.title", TagEntry::xmp("Sunset"));
        store.insert("Exif.Image.Make", TagEntry::exif("FUJIFILM", "FUJIFILM", None));
        store.insert("Exif.Image.Model", TagEntry::exif("X100S", "X100S", Some("Model")));

        assert_eq!(store.keys(Namespace::Exif), ["Exif.Image.Model", "Exif.Image.Make"]);
        assert_eq!(store.keys(Namespace::Xmp), ["Xmp.dc.title"]);
        assert!(store.keys(Namespace::Iptc).is_empty());
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("Exif.Image.Model").unwrap().raw, "X100S");
    }

    #[test]
    fn test_human_str() {
        let mut store = TagStore::new();
        store.insert("Exif.Photo.FNumber", TagEntry::exif("28/10", "f/2.8", Some("F number")));
        store.insert("Xmp.dc.title", TagEntry::xmp("Sunset"));

        assert_eq!(store.human_str("Exif.Photo.FNumber"), "f/2.8");
        assert_eq!(store.human_str("Xmp.dc.title"), "Sunset");
        assert_eq!(store.human_str("Exif.Photo.Missing"), "");
    }

    #[test]
    fn test_repeatable() {
        let mut store = TagStore::new();
        store.push_repeated("Iptc.Application2.Keywords", "beach".into(), Some("Keywords"));
        store.push_repeated("Iptc.Application2.Keywords", "sunset".into(), Some("Keywords"));

        let entry = store.get("Iptc.Application2.Keywords").unwrap();
        assert!(entry.repeatable);
        assert_eq!(entry.values, ["beach", "sunset"]);
        assert_eq!(store.human_str("Iptc.Application2.Keywords"), "beach, sunset");
        assert_eq!(store.keys(Namespace::Iptc).len(), 1);
        assert_eq!(store.label("Iptc.Application2.Keywords"), Some("Keywords"));
    }
}
