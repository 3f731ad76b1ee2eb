// src/glob.rs
//
// fnmatch-style globs for file names and tag names:
//   ?  any single character
//   *  zero or more characters (dots and slashes included)
//   [] character class, [!...] negated
// No brace expansion.

use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct NameGlob {
    source: String,
    pattern: Pattern,
}

impl NameGlob {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        // The glob crate reserves `**` for recursive paths; a run of stars
        // means the same as a single one here.
        let mut collapsed = String::with_capacity(source.len());
        for c in source.chars() {
            if c == '*' && collapsed.ends_with('*') {
                continue;
            }
            collapsed.push(c);
        }
        Ok(Self { source: source.to_string(), pattern: Pattern::new(&collapsed)? })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches_with(name, MATCH_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names from `names` that match, in iteration order
    pub fn filter<'a>(&self, names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
        names.filter(|n| self.matches(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(glob: &str, name: &str) -> bool {
        NameGlob::new(glob).unwrap().matches(name)
    }

    #[test]
    fn test_wildcards() {
        assert!(m("*.jpg", "DSCF2132.jpg"));
        assert!(!m("*.jpg", "DSCN0443.JPG"));
        assert!(m("IMAG01??.jpg", "IMAG0154.jpg"));
        assert!(!m("IMAG01??.jpg", "IMAG015.jpg"));
        assert!(m("*GPS*", "Exif.GPSInfo.GPSLatitude"));
        assert!(m("*", ""));
    }

    #[test]
    fn test_double_star() {
        assert!(m("**GPS", "Exif.GPSInfo.GPS"));
        assert!(m("a**b", "a.x/y.b"));
    }

    #[test]
    fn test_classes() {
        assert!(m("IMAG0[0-1]*", "IMAG0154.jpg"));
        assert!(!m("IMAG0[!0-1]*", "IMAG0154.jpg"));
        assert!(m("IMAG0[!0-1]*", "IMAG0754.jpg"));
    }

    #[test]
    fn test_no_brace_expansion() {
        assert!(!m("*.{jpg,png}", "a.jpg"));
        assert!(m("*.{jpg,png}", "a.{jpg,png}"));
    }

    #[test]
    fn test_invalid() {
        assert!(NameGlob::new("[abc").is_err());
    }

    #[test]
    fn test_filter() {
        let g = NameGlob::new("GPS*").unwrap();
        let names = ["GPSLatitude", "Make", "GPSLongitude"];
        assert_eq!(g.filter(names.iter().copied()), ["GPSLatitude", "GPSLongitude"]);
    }
}
