//! Include/exclude filter specs.
//!
//! A filter list is a set of dot-separated field paths: `["a", "b.c", "d.e", "d.f.g"]`.
//! Only the first segment of each path is interpreted at a given level:
//!
//! - leading `^` inverts the path (include filters only),
//! - trailing `!` requests distinct values,
//! - trailing `#` (checked after `!` is stripped) requests a count.
//!
//! Everything after the first `.` is handed down to the matching field as its
//! own filter list. Four whole-string wildcards are recognised: `*`, `**`, `%`
//! and `%%` (see [`Wildcard`]).

use std::collections::BTreeSet;
use std::fmt;

use crate::model::PATH_INVERSION;

pub const FILTER_PATH_SEPARATOR: char = '.';
pub const DISTINCT_MARKER: char = '!';
pub const COUNT_MARKER: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Wildcard {
    /// `*`: every field (include) / nothing (exclude).
    All,
    /// `**`: every field, recursively, following entity references.
    AllRecursive,
    /// `%`: like `*`, and stop resolving entity references below this point.
    AllUnresolved,
    /// `%%`: like `**` without resolving entity references.
    AllRecursiveUnresolved,
}

impl Wildcard {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "*" => Some(Wildcard::All),
            "**" => Some(Wildcard::AllRecursive),
            "%" => Some(Wildcard::AllUnresolved),
            "%%" => Some(Wildcard::AllRecursiveUnresolved),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Wildcard::All => "*",
            Wildcard::AllRecursive => "**",
            Wildcard::AllUnresolved => "%",
            Wildcard::AllRecursiveUnresolved => "%%",
        }
    }

    pub fn is_recursive(self) -> bool {
        matches!(self, Wildcard::AllRecursive | Wildcard::AllRecursiveUnresolved)
    }

    pub fn stops_references(self) -> bool {
        matches!(self, Wildcard::AllUnresolved | Wildcard::AllRecursiveUnresolved)
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a filter entry. Distinct/count markers are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterKey {
    pub field: String,
    pub inverted: bool,
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "{PATH_INVERSION}")?;
        }
        f.write_str(&self.field)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterEntry {
    pub distinct: bool,
    pub count: bool,
    /// One entry per filter string: the text after the first `.`, or `None`
    /// when the string ended at this segment.
    pub suffixes: Vec<Option<String>>,
}

impl FilterEntry {
    /// The nested filter list for the field this entry selects.
    pub fn nested(&self) -> Vec<String> {
        self.suffixes.iter().flatten().cloned().collect()
    }

    pub fn has_nested(&self) -> bool {
        self.suffixes.iter().any(Option::is_some)
    }

    pub fn is_leaf_request(&self) -> bool {
        self.count || self.distinct
    }
}

/// Parsed filter list for one level of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    /// Keys in order of first appearance.
    entries: Vec<(FilterKey, FilterEntry)>,
    wildcards: BTreeSet<Wildcard>,
}

impl FilterSet {
    pub fn parse<S: AsRef<str>>(filters: &[S]) -> Self {
        let mut set = FilterSet::default();
        for filter in filters {
            set.push(filter.as_ref());
        }
        set
    }

    fn push(&mut self, filter: &str) {
        if let Some(wildcard) = Wildcard::parse(filter) {
            self.wildcards.insert(wildcard);
            return;
        }

        let (segment, suffix) = match filter.split_once(FILTER_PATH_SEPARATOR) {
            Some((segment, rest)) => (segment, Some(rest.to_string())),
            None => (filter, None),
        };
        let (key, distinct, count) = parse_segment(segment);

        let index = match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                self.entries.push((key, FilterEntry::default()));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[index].1;
        entry.distinct |= distinct;
        entry.count |= count;
        entry.suffixes.push(suffix);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.wildcards.is_empty()
    }

    /// Number of distinct keys (wildcards not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has(&self, wildcard: Wildcard) -> bool {
        self.wildcards.contains(&wildcard)
    }

    pub fn wildcards(&self) -> impl Iterator<Item = Wildcard> + '_ {
        self.wildcards.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FilterKey, &FilterEntry)> {
        self.entries.iter().map(|(k, e)| (k, e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &FilterKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn get(&self, field: &str, inverted: bool) -> Option<&FilterEntry> {
        self.entries
            .iter()
            .find(|(k, _)| k.field == field && k.inverted == inverted)
            .map(|(_, e)| e)
    }

    /// Entry selecting `field`, preferring the non-inverted key when both exist.
    pub fn lookup(&self, field: &str) -> Option<(&FilterKey, &FilterEntry)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.field == field)
            .min_by_key(|(k, _)| k.inverted)
            .map(|(k, e)| (k, e))
    }

    pub fn inverted_keys(&self) -> impl Iterator<Item = &FilterKey> {
        self.keys().filter(|k| k.inverted)
    }
}

/// Split a first segment into its key and markers. Markers are stripped from
/// the end, `!` first, then `#`.
fn parse_segment(segment: &str) -> (FilterKey, bool, bool) {
    let (inverted, rest) = match segment.strip_prefix(PATH_INVERSION) {
        Some(rest) => (true, rest),
        None => (false, segment),
    };
    let (distinct, rest) = match rest.strip_suffix(DISTINCT_MARKER) {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let (count, rest) = match rest.strip_suffix(COUNT_MARKER) {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    (
        FilterKey {
            field: rest.to_string(),
            inverted,
        },
        distinct,
        count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_suffixes_under_first_segment() {
        let set = FilterSet::parse(&["a", "b.c", "d.e", "d.f.g"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("a", false).map(|e| e.suffixes.clone()), Some(vec![None]));
        assert_eq!(set.get("b", false).map(FilterEntry::nested), Some(vec!["c".to_string()]));
        assert_eq!(
            set.get("d", false).map(FilterEntry::nested),
            Some(vec!["e".to_string(), "f.g".to_string()])
        );
        assert_eq!(
            set.keys().map(|k| k.field.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "d"]
        );
    }

    #[test]
    fn inversion_merges_into_one_key() {
        let set = FilterSet::parse(&["^a.b", "^a.c"]);
        assert_eq!(set.len(), 1);
        let (key, entry) = set.lookup("a").expect("key");
        assert!(key.inverted);
        assert_eq!(entry.nested(), vec!["b".to_string(), "c".to_string()]);
        assert!(set.get("a", false).is_none());
    }

    #[test]
    fn distinct_marker() {
        let set = FilterSet::parse(&["h!.i"]);
        let entry = set.get("h", false).expect("h");
        assert!(entry.distinct);
        assert!(!entry.count);
        assert_eq!(entry.nested(), vec!["i".to_string()]);
    }

    #[test]
    fn count_is_stripped_after_distinct() {
        let set = FilterSet::parse(&["n#!"]);
        let entry = set.get("n", false).expect("n");
        assert!(entry.count && entry.distinct);

        // `!` is not trailing here, so only the count marker is stripped.
        let set = FilterSet::parse(&["n!#"]);
        let entry = set.get("n!", false).expect("n!");
        assert!(entry.count && !entry.distinct);
    }

    #[test]
    fn wildcards_are_whole_strings() {
        let set = FilterSet::parse(&["*", "%%", "a.*"]);
        assert!(set.has(Wildcard::All));
        assert!(set.has(Wildcard::AllRecursiveUnresolved));
        assert!(!set.has(Wildcard::AllRecursive));
        assert_eq!(set.get("a", false).map(FilterEntry::nested), Some(vec!["*".to_string()]));

        let set = FilterSet::parse(&["*.x"]);
        assert!(!set.has(Wildcard::All));
        assert!(set.get("*", false).is_some());
    }

    #[test]
    fn lookup_prefers_plain_key() {
        let set = FilterSet::parse(&["^a", "a.b"]);
        let (key, entry) = set.lookup("a").expect("a");
        assert!(!key.inverted);
        assert_eq!(entry.nested(), vec!["b".to_string()]);
    }
}
