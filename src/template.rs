// src/template.rs
//
// `$name` / `${name}` substitution for --echo and --exec strings.
// Names may contain letters, digits, '_' and '.', so full tag keys like
// $Exif.Image.Make work. `$$` is a literal '$'. A name with no value, and
// any '$' that does not start a placeholder, is left as written.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$(?:(\$)|([_a-z][._a-z0-9]*)|\{([_a-z][._a-z0-9]*)\})").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTemplate {
    template: String,
}

impl TagTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute placeholders from `vars`. With `max_len`, longer values are
    /// cut to that many characters followed by "...".
    pub fn render(&self, vars: &BTreeMap<String, String>, max_len: Option<usize>) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &Captures| {
                if caps.get(1).is_some() {
                    return "$".to_string();
                }
                let name = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                match vars.get(name) {
                    Some(value) => truncate(value, max_len),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Cut `value` to `max_len` characters plus "...". None or 0 means no limit.
pub fn truncate(value: &str, max_len: Option<usize>) -> String {
    match max_len {
        Some(max) if max > 0 && value.chars().count() > max => {
            let mut cut: String = value.chars().take(max).collect();
            cut.push_str("...");
            cut
        }
        _ => value.to_string(),
    }
}
