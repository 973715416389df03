//! Pathbuilder reader.
//!
//! A pathbuilder export looks like:
//!
//! ```xml
//! <pathbuilderinterface>
//!   <path>
//!     <id>person_name</id>
//!     <enabled>1</enabled>
//!     <group_id>person</group_id>
//!     <fieldtype>string</fieldtype>
//!     <cardinality>1</cardinality>
//!     <path_array>
//!       <x>crm:E21_Person</x>
//!       <y>crm:P1_is_identified_by</y>
//!       <x>crm:E41_Appellation</x>
//!     </path_array>
//!     <datatype_property>crm:P190_has_symbolic_content</datatype_property>
//!     <is_group>0</is_group>
//!   </path>
//! </pathbuilderinterface>
//! ```
//!
//! Every `<path>` is kept verbatim as a [`RawElement`] next to the record
//! derived from it, so filtered subsets can be written back unchanged.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

use pathforge_core::{Diagnostic, FieldKind, PathRecord, PathStep, ValueType};

use crate::{IngestError, Result};

pub const ROOT_ELEMENT: &str = "pathbuilderinterface";
pub const PATH_ELEMENT: &str = "path";
/// `datatype_property` value meaning "no datatype property".
pub const EMPTY_DATATYPE_PROPERTY: &str = "empty";

// ============================================================================
// Raw XML
// ============================================================================

/// An XML element with its (trimmed) text and child elements. Attributes are
/// not used by pathbuilder exports and are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawElement {
    pub name: String,
    pub text: String,
    pub children: Vec<RawElement>,
}

impl RawElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&RawElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|child| child.text.as_str())
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attach(stack: &mut [RawElement], root: &mut Option<RawElement>, element: RawElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parse a whole XML document into its root element.
pub fn parse_document(xml: &str) -> Result<RawElement> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<RawElement> = Vec::new();
    let mut root: Option<RawElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(RawElement::new(element_name(&e))),
            Event::Empty(e) => attach(&mut stack, &mut root, RawElement::new(element_name(&e))),
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| IngestError::UnexpectedRoot {
        found: "nothing".to_string(),
    })
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Keep `<enabled>0</enabled>` paths.
    pub include_disabled: bool,
}

/// One `<path>`: the derived record plus the source element.
#[derive(Debug, Clone, PartialEq)]
pub struct PathbuilderEntry {
    pub record: PathRecord,
    pub element: RawElement,
}

impl PathbuilderEntry {
    pub fn from_element(element: RawElement) -> Result<Self> {
        let record = record_from_element(&element)?;
        Ok(Self { record, element })
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Text of the direct child element `name`.
    pub fn element_text(&self, name: &str) -> Option<&str> {
        self.element.child_text(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pathbuilder {
    pub entries: Vec<PathbuilderEntry>,
}

impl Pathbuilder {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathbuilderEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&PathbuilderEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn records(&self) -> Vec<PathRecord> {
        self.entries.iter().map(|entry| entry.record.clone()).collect()
    }
}

fn required_text<'a>(element: &'a RawElement, path: &str, name: &str) -> Result<&'a str> {
    element
        .child_text(name)
        .ok_or_else(|| IngestError::MissingElement {
            path: path.to_string(),
            element: name.to_string(),
        })
}

fn number(element: &RawElement, path: &str, name: &str) -> Result<Option<i64>> {
    match element.child_text(name) {
        None | Some("") => Ok(None),
        Some(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IngestError::InvalidNumber {
                path: path.to_string(),
                element: name.to_string(),
                value: text.to_string(),
            }),
    }
}

fn flag(element: &RawElement, path: &str, name: &str, default: bool) -> Result<bool> {
    Ok(number(element, path, name)?.map_or(default, |n| n != 0))
}

fn record_from_element(element: &RawElement) -> Result<PathRecord> {
    let id = required_text(element, "<unknown>", "id")?.to_string();

    let path_array = element
        .child("path_array")
        .ok_or_else(|| IngestError::MissingElement {
            path: id.clone(),
            element: "path_array".to_string(),
        })?
        .children
        .iter()
        .map(|step| PathStep::parse(&step.text))
        .collect();

    let mut record = PathRecord::new(id, path_array);
    let id = record.id.as_str();

    record.enabled = flag(element, id, "enabled", true)?;
    record.is_group = flag(element, id, "is_group", false)?;
    if let Some(cardinality) = number(element, id, "cardinality")? {
        record.cardinality = cardinality;
    }

    record.group_id = match element.child_text("group_id") {
        None | Some("") | Some("0") => None,
        Some(group_id) => Some(group_id.to_string()),
    };

    let fieldtype = element.child_text("fieldtype").unwrap_or_default();
    record.field_kind = FieldKind::from_fieldtype(fieldtype).unwrap_or_else(|| {
        tracing::warn!(path = %id, fieldtype, "unknown fieldtype, treating it as text");
        FieldKind::Value(ValueType::Text)
    });

    record.datatype_property = match element.child_text("datatype_property") {
        None | Some("") | Some(EMPTY_DATATYPE_PROPERTY) => None,
        Some(property) => Some(PathStep::parse(property)),
    };

    Ok(record)
}

// ============================================================================
// Documents
// ============================================================================

/// Read a pathbuilder XML document.
pub fn read_pathbuilder_str(xml: &str, options: &ReadOptions) -> Result<Pathbuilder> {
    let root = parse_document(xml)?;
    if root.name != ROOT_ELEMENT {
        return Err(IngestError::UnexpectedRoot { found: root.name });
    }

    let mut entries = Vec::new();
    for element in root.children {
        if element.name != PATH_ELEMENT {
            tracing::warn!(element = %element.name, "skipping unexpected element in pathbuilder");
            continue;
        }
        let entry = PathbuilderEntry::from_element(element)?;
        if !options.include_disabled && !entry.record.enabled {
            tracing::debug!(path = %entry.id(), "skipping disabled path");
            continue;
        }
        entries.push(entry);
    }

    tracing::info!(paths = entries.len(), "read pathbuilder definition");
    Ok(Pathbuilder { entries })
}

/// Extract the XML text from a JSON pathbuilder export (`{"xml": "..."}`).
pub fn xml_from_json(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    value
        .get("xml")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or(IngestError::MissingXml)
}

/// Read a pathbuilder file; `.json` files are unwrapped first.
pub fn read_pathbuilder_file(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Pathbuilder> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        tracing::info!(path = %path.display(), "extracting pathbuilder XML from JSON");
        read_pathbuilder_str(&xml_from_json(&text)?, options)
    } else {
        read_pathbuilder_str(&text, options)
    }
}

/// Consistency checks on a flat record list. Reports records grouped under
/// an id that is not part of the list.
pub fn check_records(records: &[PathRecord]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for record in records {
        let Some(group_id) = &record.group_id else {
            continue;
        };
        if !records.iter().any(|other| &other.id == group_id) {
            Diagnostic::MissingParent {
                id: record.id.clone(),
                group_id: group_id.clone(),
            }
            .emit(&mut diagnostics);
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        <pathbuilderinterface>
          <path>
            <id>person</id>
            <enabled>1</enabled>
            <group_id>0</group_id>
            <fieldtype></fieldtype>
            <cardinality>-1</cardinality>
            <path_array><x>crm:E21_Person</x></path_array>
            <datatype_property>empty</datatype_property>
            <is_group>1</is_group>
          </path>
          <path>
            <id>name</id>
            <enabled>1</enabled>
            <group_id>person</group_id>
            <fieldtype>string</fieldtype>
            <cardinality>1</cardinality>
            <path_array>
              <x>crm:E21_Person</x>
              <y>^crm:P1i_identifies</y>
              <x>crm:E41_Appellation</x>
            </path_array>
            <datatype_property>crm:P190_has_symbolic_content</datatype_property>
            <is_group>0</is_group>
            <description>Name &amp; title</description>
          </path>
        </pathbuilderinterface>
    "#;

    #[test]
    fn reads_records() {
        let pathbuilder = read_pathbuilder_str(SMALL, &ReadOptions::default()).expect("read");
        assert_eq!(pathbuilder.len(), 2);

        let person = &pathbuilder.entries[0].record;
        assert!(person.is_root());
        assert!(person.is_group);
        assert_eq!(person.field_kind, FieldKind::None);
        assert_eq!(person.datatype_property, None);

        let name = &pathbuilder.entries[1].record;
        assert_eq!(name.group_id.as_deref(), Some("person"));
        assert_eq!(name.cardinality, 1);
        assert_eq!(name.field_kind, FieldKind::Value(ValueType::Text));
        assert_eq!(name.path_array.len(), 3);
        assert!(name.path_array[1].inverted);
        assert_eq!(name.path_array[1].entity, "crm:P1i_identifies");
        assert_eq!(
            name.datatype_property,
            Some(PathStep::new("crm:P190_has_symbolic_content"))
        );
        assert_eq!(
            pathbuilder.entries[1].element_text("description"),
            Some("Name & title")
        );
    }

    #[test]
    fn missing_optional_elements_take_defaults() {
        let xml = "<pathbuilderinterface><path><id>p</id><path_array><x>E1</x></path_array></path></pathbuilderinterface>";
        let record = read_pathbuilder_str(xml, &ReadOptions::default()).expect("read").entries[0]
            .record
            .clone();
        assert!(record.enabled);
        assert!(record.is_root());
        assert_eq!(record.cardinality, -1);
        assert_eq!(record.field_kind, FieldKind::None);
    }

    #[test]
    fn rejects_documents_that_are_not_pathbuilders() {
        let err = read_pathbuilder_str("<other/>", &ReadOptions::default()).expect_err("root");
        assert!(matches!(err, IngestError::UnexpectedRoot { found } if found == "other"));

        let xml = "<pathbuilderinterface><path><id>p</id></path></pathbuilderinterface>";
        let err = read_pathbuilder_str(xml, &ReadOptions::default()).expect_err("path_array");
        assert!(
            matches!(err, IngestError::MissingElement { path, element } if path == "p" && element == "path_array")
        );

        let xml = "<pathbuilderinterface><path><id>p</id><cardinality>many</cardinality><path_array/></path></pathbuilderinterface>";
        let err = read_pathbuilder_str(xml, &ReadOptions::default()).expect_err("cardinality");
        assert!(matches!(err, IngestError::InvalidNumber { .. }));
    }

    #[test]
    fn json_wrapper() {
        let json = serde_json::json!({ "xml": SMALL }).to_string();
        assert_eq!(xml_from_json(&json).expect("xml"), SMALL);
        assert!(matches!(xml_from_json("{\"x\": 1}"), Err(IngestError::MissingXml)));
    }

    #[test]
    fn orphans_are_reported() {
        let mut records = read_pathbuilder_str(SMALL, &ReadOptions::default())
            .expect("read")
            .records();
        assert!(check_records(&records).is_empty());
        records.remove(0);
        assert_eq!(
            check_records(&records),
            vec![Diagnostic::MissingParent {
                id: "name".to_string(),
                group_id: "person".to_string(),
            }]
        );
    }
}
