//! Path records and path nodes.
//!
//! A [`PathRecord`] is one immutable entry of a pathbuilder definition. The
//! builder turns records into [`PathNode`]s, which are also the unit the
//! projection engine clones.
//!
//! Ownership is tree-shaped: every node is owned by its parent's [`Fields`],
//! roots are owned by the [`crate::PathTree`] registry. Cross-tree links
//! (entity references) are stored as root ids and looked up on demand.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::endpoint::EndpointMeta;

pub const PATH_INVERSION: char = '^';

// ============================================================================
// Path steps
// ============================================================================

/// One token of a path array: an RDF property or class, optionally traversed
/// backwards (`^` prefix in the source document).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathStep {
    pub entity: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inverted: bool,
}

impl PathStep {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            inverted: false,
        }
    }

    /// Parse a token, stripping a leading `^` into the inversion flag.
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix(PATH_INVERSION) {
            Some(rest) => Self {
                entity: rest.to_string(),
                inverted: true,
            },
            None => Self::new(token),
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "{PATH_INVERSION}")?;
        }
        f.write_str(&self.entity)
    }
}

// ============================================================================
// Field kinds
// ============================================================================

/// Value type of a leaf, as handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    DateTime,
    TextList,
    Uri,
    /// Aggregate produced by a count request (`field#`).
    Integer,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::DateTime => "datetime",
            ValueType::TextList => "list_text",
            ValueType::Uri => "uri",
            ValueType::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Value(ValueType),
    EntityReference,
    None,
}

impl FieldKind {
    /// Map a pathbuilder `fieldtype` name. Returns `None` for names we do not know.
    pub fn from_fieldtype(name: &str) -> Option<Self> {
        let kind = match name {
            "" => FieldKind::None,
            "entity_reference" => FieldKind::EntityReference,
            "string" => FieldKind::Value(ValueType::Text),
            "datetime" => FieldKind::Value(ValueType::DateTime),
            "list_string" => FieldKind::Value(ValueType::TextList),
            "uri" => FieldKind::Value(ValueType::Uri),
            _ => return None,
        };
        Some(kind)
    }

    pub fn value_type(self) -> Option<ValueType> {
        match self {
            FieldKind::Value(ty) => Some(ty),
            _ => None,
        }
    }
}

// ============================================================================
// Path records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: String,
    pub path_array: Vec<PathStep>,
    /// `1` means exactly one, anything else means many.
    pub cardinality: i64,
    pub group_id: Option<String>,
    pub field_kind: FieldKind,
    pub datatype_property: Option<PathStep>,
    pub enabled: bool,
    /// The pathbuilder marks structured entries explicitly; only those get a class name.
    #[serde(default)]
    pub is_group: bool,
}

impl PathRecord {
    pub fn new(id: impl Into<String>, path_array: Vec<PathStep>) -> Self {
        Self {
            id: id.into(),
            path_array,
            cardinality: -1,
            group_id: None,
            field_kind: FieldKind::None,
            datatype_property: None,
            enabled: true,
            is_group: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.group_id.is_none()
    }

    /// The last path token. For roots this is the RDF class the root is registered under.
    pub fn terminal_class(&self) -> Option<&str> {
        self.path_array.last().map(|step| step.entity.as_str())
    }
}

// ============================================================================
// Path nodes
// ============================================================================

/// Cross-link from a field to the root of another tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "root", rename_all = "snake_case")]
pub enum EntityReference {
    /// Not a reference, or a reference whose target class has no root.
    None,
    /// Points at the root with this id; its fields have not been substituted yet.
    Pending(String),
    /// A projection already substituted the fields of this root.
    Expanded(String),
}

impl EntityReference {
    pub fn target(&self) -> Option<&str> {
        match self {
            EntityReference::None => None,
            EntityReference::Pending(id) | EntityReference::Expanded(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub id: String,
    /// Elided (already bound) prefix entries are `None` in projected nodes.
    pub path_array: Vec<Option<PathStep>>,
    pub cardinality: i64,
    pub field_kind: FieldKind,
    /// Effective output type; `None` for structured nodes.
    pub value_type: Option<ValueType>,
    pub datatype_property: Option<PathStep>,
    pub class_name: Option<String>,
    pub fields: Fields,
    pub entity_reference: EntityReference,
    /// Ids of the fields that reference this node (only populated on roots).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binding_vars: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointMeta>,
}

impl PathNode {
    pub fn from_record(record: &PathRecord) -> Self {
        Self {
            id: record.id.clone(),
            path_array: record.path_array.iter().cloned().map(Some).collect(),
            cardinality: record.cardinality,
            field_kind: record.field_kind,
            value_type: record.field_kind.value_type(),
            datatype_property: record.datatype_property.clone(),
            class_name: record
                .is_group
                .then(|| crate::strings::to_classname(&record.id)),
            fields: Fields::default(),
            entity_reference: EntityReference::None,
            parents: Vec::new(),
            binding_vars: Vec::new(),
            binding: None,
            root: false,
            count: false,
            distinct: false,
            inverted: false,
            endpoint: None,
        }
    }

    /// Copy of every attribute except the field mapping.
    pub fn without_fields(&self) -> Self {
        Self {
            id: self.id.clone(),
            path_array: self.path_array.clone(),
            cardinality: self.cardinality,
            field_kind: self.field_kind,
            value_type: self.value_type,
            datatype_property: self.datatype_property.clone(),
            class_name: self.class_name.clone(),
            fields: Fields::default(),
            entity_reference: self.entity_reference.clone(),
            parents: self.parents.clone(),
            binding_vars: self.binding_vars.clone(),
            binding: self.binding.clone(),
            root: self.root,
            count: self.count,
            distinct: self.distinct,
            inverted: self.inverted,
            endpoint: self.endpoint.clone(),
        }
    }

    pub fn is_single(&self) -> bool {
        self.cardinality == 1
    }

    pub fn terminal_class(&self) -> Option<&str> {
        self.path_array
            .iter()
            .rev()
            .flatten()
            .next()
            .map(|step| step.entity.as_str())
    }

    /// Depth-first walk over this node and everything below it.
    pub fn walk(&self) -> impl Iterator<Item = &PathNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.fields.iter().rev());
            Some(node)
        })
    }
}

// ============================================================================
// Field mapping
// ============================================================================

/// Children of a node keyed by id, kept in declaration order.
///
/// Order is significant: it is the order of generated model attributes and
/// query clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Vec<PathNode>);

impl Fields {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PathNode> {
        self.0.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace; a replaced entry keeps its position.
    pub fn insert(&mut self, node: PathNode) {
        match self.0.iter_mut().find(|existing| existing.id == node.id) {
            Some(slot) => *slot = node,
            None => self.0.push(node),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|node| node.id.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathNode> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, PathNode> {
        self.0.iter_mut()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a PathNode;
    type IntoIter = std::slice::Iter<'a, PathNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<PathNode> for Fields {
    fn from_iter<I: IntoIterator<Item = PathNode>>(iter: I) -> Self {
        let mut fields = Fields::default();
        for node in iter {
            fields.insert(node);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_step_parses_inversion() {
        let step = PathStep::parse("^crm:P14_carried_out_by");
        assert!(step.inverted);
        assert_eq!(step.entity, "crm:P14_carried_out_by");
        assert_eq!(step.to_string(), "^crm:P14_carried_out_by");

        let plain = PathStep::parse("crm:E21_Person");
        assert!(!plain.inverted);
        assert_eq!(plain.to_string(), "crm:E21_Person");
    }

    #[test]
    fn fields_keep_declaration_order_on_replace() {
        let mut fields = Fields::default();
        for id in ["b", "a", "c"] {
            fields.insert(PathNode::from_record(&PathRecord::new(id, vec![])));
        }
        let mut replacement = PathNode::from_record(&PathRecord::new("a", vec![]));
        replacement.cardinality = 1;
        fields.insert(replacement);

        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(fields.get("a").map(|n| n.cardinality), Some(1));
    }

    #[test]
    fn class_name_only_for_groups() {
        let mut record = PathRecord::new("publication_creation", vec![PathStep::new("E65")]);
        assert_eq!(PathNode::from_record(&record).class_name, None);
        record.is_group = true;
        assert_eq!(
            PathNode::from_record(&record).class_name.as_deref(),
            Some("PublicationCreation")
        );
    }
}
