// src/keymap.rs
//
// Display name -> canonical key resolution.
// Every canonical key maps to itself; unless long names are forced, its last
// dotted component maps to it too. Namespaces are inserted EXIF, IPTC, XMP,
// so on a short-name clash XMP wins over IPTC, which wins over EXIF.

use crate::tag_store::{Namespace, TagSnapshot, TagStore};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedKeyMap {
    map: BTreeMap<String, String>,
}

impl ResolvedKeyMap {
    pub fn build(store: &TagStore, long_only: bool) -> Self {
        Self::from_key_lists(
            store.keys(Namespace::Exif),
            store.keys(Namespace::Iptc),
            store.keys(Namespace::Xmp),
            long_only,
        )
    }

    pub fn from_key_lists(exif: &[String], iptc: &[String], xmp: &[String], long_only: bool) -> Self {
        let mut resolved = Self::default();
        for keys in [exif, iptc, xmp] {
            resolved.insert_keys(keys, long_only);
        }
        resolved
    }

    fn insert_keys(&mut self, keys: &[String], long_only: bool) {
        for key in keys {
            self.map.insert(key.clone(), key.clone());
            if long_only {
                continue;
            }
            let short = short_name(key);
            if let Some(old) = self.map.insert(short.to_string(), key.clone())
                && old != *key
            {
                trace!("Revmap changed[{}]: {} -> {}", short, old, key);
            }
        }
    }

    /// Canonical key for a display name
    pub fn resolve(&self, display: &str) -> Option<&str> {
        self.map.get(display).map(String::as_str)
    }

    /// All display names, sorted
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Flatten the store into display name -> most human readable value.
    pub fn snapshot(&self, store: &TagStore) -> TagSnapshot {
        self.map.iter().map(|(display, key)| (display.clone(), store.human_str(key))).collect()
    }
}

/// Text after the last '.'
pub fn short_name(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag_store::TagEntry;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_and_long_names() {
        let exif = keys(&["Exif.Image.Make", "Exif.GPSInfo.GPSLatitude"]);
        let map = ResolvedKeyMap::from_key_lists(&exif, &[], &[], false);

        assert_eq!(map.len(), 4);
        assert_eq!(map.resolve("Make"), Some("Exif.Image.Make"));
        assert_eq!(map.resolve("Exif.Image.Make"), Some("Exif.Image.Make"));
        assert_eq!(map.resolve("GPSLatitude"), Some("Exif.GPSInfo.GPSLatitude"));
        assert_eq!(map.resolve("Model"), None);
    }

    #[test]
    fn test_long_only() {
        let exif = keys(&["Exif.Image.Make"]);
        let map = ResolvedKeyMap::from_key_lists(&exif, &[], &[], true);
        assert_eq!(map.len(), 1);
        assert_eq!(map.resolve("Make"), None);
    }

    #[test]
    fn test_precedence_xmp_over_iptc_over_exif() {
        let exif = keys(&["Exif.Image.Copyright", "Exif.Image.Artist"]);
        let iptc = keys(&["Iptc.Application2.Copyright", "Iptc.Application2.Keywords"]);
        let xmp = keys(&["Xmp.dc.Copyright"]);

        let map = ResolvedKeyMap::from_key_lists(&exif, &iptc, &xmp, false);
        assert_eq!(map.resolve("Copyright"), Some("Xmp.dc.Copyright"));
        assert_eq!(map.resolve("Artist"), Some("Exif.Image.Artist"));
        assert_eq!(map.resolve("Keywords"), Some("Iptc.Application2.Keywords"));

        let map = ResolvedKeyMap::from_key_lists(&exif, &iptc, &[], false);
        assert_eq!(map.resolve("Copyright"), Some("Iptc.Application2.Copyright"));

        let map = ResolvedKeyMap::from_key_lists(&exif, &[], &keys(&["Xmp.tiff.Artist"]), false);
        assert_eq!(map.resolve("Artist"), Some("Xmp.tiff.Artist"));
    }

    #[test]
    fn test_empty() {
        let map = ResolvedKeyMap::from_key_lists(&[], &[], &[], false);
        assert!(map.is_empty());
    }

    #[test]
    fn test_snapshot() {
        let mut store = TagStore::new();
        store.insert("Exif.Photo.FNumber", TagEntry::exif("28/10", "f/2.8", None));
        store.insert("Xmp.xmp.Rating", TagEntry::xmp("5"));
        let map = ResolvedKeyMap::build(&store, false);

        let snap = map.snapshot(&store);
        assert_eq!(snap.get("FNumber").map(String::as_str), Some("f/2.8"));
        assert_eq!(snap.get("Exif.Photo.FNumber").map(String::as_str), Some("f/2.8"));
        assert_eq!(snap.get("Rating").map(String::as_str), Some("5"));
        assert_eq!(snap.len(), 4);
    }
}
