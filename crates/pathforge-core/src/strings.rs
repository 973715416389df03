//! Name conversions for generated identifiers and endpoint paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::PathNode;

/// `"publication_text_assertion"` → `"PublicationTextAssertion"`.
///
/// Word boundaries are underscores and any other non-alphabetic character, so
/// `"e21_person2x"` becomes `"E21Person2X"`.
pub fn to_classname(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_boundary = true;
    for c in text.chars() {
        if c == '_' || c == ' ' {
            at_boundary = true;
            continue;
        }
        if at_boundary {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        at_boundary = !c.is_alphabetic();
    }
    out
}

pub fn to_fieldname(text: &str) -> String {
    text.replace('/', "").replace(' ', "_")
}

pub fn split_url_path(url_path: &str) -> Vec<&str> {
    url_path.trim_start_matches('/').split('/').collect()
}

/// `"/pub/list"` → `"PubList"`.
pub fn path_to_camelcase(url_path: &str) -> String {
    split_url_path(url_path)
        .into_iter()
        .map(capitalize)
        .collect()
}

/// `"/pub/list"` → `"pub_list"`.
pub fn path_to_filename(url_path: &str) -> String {
    split_url_path(url_path).join("_")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

// ============================================================================
// Namespace prefixes
// ============================================================================

/// Namespace replacements, e.g. `crm` → `http://www.cidoc-crm.org/cidoc-crm/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefixMap(BTreeMap<String, String>);

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.0.insert(prefix.into(), namespace.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(p, ns)| (p.as_str(), ns.as_str()))
    }

    /// Compact a full IRI using the longest matching namespace.
    pub fn compact(&self, iri: &str) -> Option<String> {
        self.0
            .iter()
            .filter(|(_, ns)| !ns.is_empty() && iri.starts_with(ns.as_str()))
            .max_by_key(|(_, ns)| ns.len())
            .map(|(prefix, ns)| format!("{prefix}:{}", &iri[ns.len()..]))
    }

    /// Compact every path token below `node` in place.
    pub fn compact_tree(&self, node: &mut PathNode) {
        if self.is_empty() {
            return;
        }
        for step in node.path_array.iter_mut().flatten() {
            if let Some(short) = self.compact(&step.entity) {
                step.entity = short;
            }
        }
        if let Some(step) = node.datatype_property.as_mut() {
            if let Some(short) = self.compact(&step.entity) {
                step.entity = short;
            }
        }
        for child in node.fields.iter_mut() {
            self.compact_tree(child);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PrefixMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PrefixMap::new();
        for (prefix, namespace) in iter {
            map.insert(prefix, namespace);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classnames() {
        assert_eq!(to_classname("publication_text_assertion"), "PublicationTextAssertion");
        assert_eq!(to_classname("person"), "Person");
        assert_eq!(to_classname("e21_person2x"), "E21Person2X");
        assert_eq!(to_classname("ALL_CAPS"), "AllCaps");
    }

    #[test]
    fn url_paths() {
        assert_eq!(path_to_camelcase("/pub/list"), "PubList");
        assert_eq!(path_to_camelcase("/person"), "Person");
        assert_eq!(path_to_filename("/pub/list"), "pub_list");
        assert_eq!(to_fieldname("a b/c"), "a_bc");
    }

    #[test]
    fn prefix_compaction_prefers_longest_namespace() {
        let prefixes: PrefixMap = [
            ("r11", "https://r11.eu/ns/"),
            ("star", "https://r11.eu/ns/star/"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            prefixes.compact("https://r11.eu/ns/star/E13_Attribute_Assignment").as_deref(),
            Some("star:E13_Attribute_Assignment")
        );
        assert_eq!(
            prefixes.compact("https://r11.eu/ns/prosopography").as_deref(),
            Some("r11:prosopography")
        );
        assert_eq!(prefixes.compact("http://example.org/x"), None);
    }
}
