//! Record filter: keep pathbuilder entries matching `element=value` clauses.
//!
//! Clauses are OR-ed: an entry is kept as soon as one clause matches the text
//! of one of its direct child elements (`id=person`, `enabled=0`).

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::pathbuilder::{PathbuilderEntry, RawElement, ROOT_ELEMENT};
use crate::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub element: String,
    pub value: String,
}

impl Clause {
    pub fn matches(&self, entry: &PathbuilderEntry) -> bool {
        entry.element_text(&self.element) == Some(self.value.as_str())
    }
}

impl FromStr for Clause {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((element, value)) if !element.is_empty() => Ok(Clause {
                element: element.to_string(),
                value: value.to_string(),
            }),
            _ => Err(IngestError::InvalidClause {
                clause: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.element, self.value)
    }
}

pub fn filter_entries<'a>(
    entries: &'a [PathbuilderEntry],
    clauses: &[Clause],
) -> Vec<&'a PathbuilderEntry> {
    let kept: Vec<&PathbuilderEntry> = entries
        .iter()
        .filter(|entry| match clauses.iter().find(|clause| clause.matches(entry)) {
            Some(clause) => {
                tracing::info!(path = %entry.id(), %clause, "including path");
                true
            }
            None => false,
        })
        .collect();
    tracing::info!(
        from = entries.len(),
        to = kept.len(),
        "filtered pathbuilder definition"
    );
    kept
}

/// Serialize entries as an indented `<pathbuilderinterface>` document.
pub fn write_pathbuilder<'a, I>(entries: I) -> Result<String>
where
    I: IntoIterator<Item = &'a PathbuilderEntry>,
{
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
    for entry in entries {
        write_element(&mut writer, &entry.element)?;
    }
    writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &RawElement) -> Result<()> {
    let name = element.name.as_str();
    if element.text.is_empty() && element.children.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(name)))?;
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clauses() {
        let clause: Clause = "enabled=0".parse().expect("clause");
        assert_eq!(clause.element, "enabled");
        assert_eq!(clause.value, "0");

        let clause: Clause = "id=a=b".parse().expect("clause");
        assert_eq!(clause.value, "a=b");

        assert!("enabled".parse::<Clause>().is_err());
        assert!("=0".parse::<Clause>().is_err());
    }
}
