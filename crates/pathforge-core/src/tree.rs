//! Path tree builder.
//!
//! Turns a flat list of [`PathRecord`]s into a forest of [`PathNode`]s:
//!
//! - one node per (enabled) record,
//! - records without `group_id` become roots, registered under their terminal class,
//! - grouped records are attached to their parent's [`Fields`],
//! - entity references are linked to the root registered for their terminal class.
//!
//! Missing parents and unknown reference targets are soft diagnostics: the
//! tree is still built, with the affected record left detached or unresolved.

use std::collections::{BTreeMap, HashMap};

use crate::diagnostics::Diagnostic;
use crate::model::{EntityReference, FieldKind, Fields, PathNode, PathRecord};

/// The base tree: owned nodes plus lookup tables by id and by root class.
///
/// Read-only once built. Projections borrow it and never write to it, so it
/// can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct PathTree {
    /// Roots and detached records, in declaration order.
    top: Fields,
    /// id → chain of ids from a top-level node down to the node itself.
    index: HashMap<String, Vec<String>>,
    /// terminal RDF class → root id.
    root_types: BTreeMap<String, String>,
    /// Top-level entries that are not roots (missing parent, grouping cycle).
    detached: Vec<String>,
}

#[derive(Debug)]
pub struct BuiltTree {
    pub tree: PathTree,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    include_disabled: bool,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep records with `enabled = false` (used by the record filter).
    pub fn include_disabled(mut self, include: bool) -> Self {
        self.include_disabled = include;
        self
    }

    pub fn build(&self, records: &[PathRecord]) -> BuiltTree {
        let mut diagnostics = Vec::new();

        let mut order: Vec<String> = Vec::new();
        let mut nodes: HashMap<String, PathNode> = HashMap::new();
        let mut group_of: HashMap<String, String> = HashMap::new();

        for record in records
            .iter()
            .filter(|record| self.include_disabled || record.enabled)
        {
            if nodes
                .insert(record.id.clone(), PathNode::from_record(record))
                .is_some()
            {
                Diagnostic::DuplicateId {
                    id: record.id.clone(),
                }
                .emit(&mut diagnostics);
            } else {
                order.push(record.id.clone());
            }
            match &record.group_id {
                Some(group_id) => {
                    group_of.insert(record.id.clone(), group_id.clone());
                }
                None => {
                    group_of.remove(&record.id);
                }
            }
        }

        // Root types
        let mut root_types: BTreeMap<String, String> = BTreeMap::new();
        for id in order.iter().filter(|id| !group_of.contains_key(*id)) {
            let Some(class) = nodes.get(id).and_then(|n| n.terminal_class()) else {
                continue;
            };
            if let Some(dropped) = root_types.insert(class.to_string(), id.clone()) {
                Diagnostic::DuplicateRootClass {
                    class: class.to_string(),
                    kept: id.clone(),
                    dropped,
                }
                .emit(&mut diagnostics);
            }
        }

        // Parents and entity references
        let mut referrers: Vec<(String, String)> = Vec::new();
        for id in &order {
            let Some(group_id) = group_of.get(id) else {
                continue;
            };
            if !nodes.contains_key(group_id) {
                Diagnostic::MissingParent {
                    id: id.clone(),
                    group_id: group_id.clone(),
                }
                .emit(&mut diagnostics);
                // Never attached, so nothing to resolve.
                continue;
            }
            let Some(node) = nodes.get_mut(id) else {
                continue;
            };
            if node.field_kind != FieldKind::EntityReference {
                continue;
            }
            let class = node.terminal_class().unwrap_or_default().to_string();
            match root_types.get(&class) {
                Some(root_id) => {
                    tracing::debug!(node = %id, root = %root_id, "resolved entity reference");
                    node.entity_reference = EntityReference::Pending(root_id.clone());
                    referrers.push((root_id.clone(), id.clone()));
                }
                None => Diagnostic::UnresolvedReference {
                    id: id.clone(),
                    class,
                }
                .emit(&mut diagnostics),
            }
        }
        for (root_id, id) in referrers {
            if let Some(root) = nodes.get_mut(&root_id) {
                root.parents.push(id);
            }
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut top_ids: Vec<String> = Vec::new();
        let mut detached: Vec<String> = Vec::new();
        for id in &order {
            match group_of.get(id) {
                Some(group_id) if nodes.contains_key(group_id) => {
                    children.entry(group_id.clone()).or_default().push(id.clone());
                }
                Some(_) => {
                    detached.push(id.clone());
                    top_ids.push(id.clone());
                }
                None => top_ids.push(id.clone()),
            }
        }

        let mut top = Fields::default();
        let mut index = HashMap::new();
        let mut chain = Vec::new();
        for id in &top_ids {
            if let Some(node) = assemble(id, &mut nodes, &children, &mut chain, &mut index) {
                top.insert(node);
            }
        }

        // Whatever is left is grouped in a cycle.
        let unreachable: Vec<String> = order
            .iter()
            .filter(|id| nodes.contains_key(*id))
            .cloned()
            .collect();
        for id in &unreachable {
            Diagnostic::Unreachable { id: id.clone() }.emit(&mut diagnostics);
        }
        for id in unreachable {
            if let Some(node) = assemble(&id, &mut nodes, &children, &mut chain, &mut index) {
                detached.push(id);
                top.insert(node);
            }
        }

        BuiltTree {
            tree: PathTree {
                top,
                index,
                root_types,
                detached,
            },
            diagnostics,
        }
    }
}

fn assemble(
    id: &str,
    nodes: &mut HashMap<String, PathNode>,
    children: &HashMap<String, Vec<String>>,
    chain: &mut Vec<String>,
    index: &mut HashMap<String, Vec<String>>,
) -> Option<PathNode> {
    let mut node = nodes.remove(id)?;
    chain.push(id.to_string());
    index.insert(id.to_string(), chain.clone());
    for child_id in children.get(id).into_iter().flatten() {
        if let Some(child) = assemble(child_id, nodes, children, chain, index) {
            node.fields.insert(child);
        }
    }
    chain.pop();
    Some(node)
}

impl PathTree {
    /// Build from enabled records, dropping diagnostics after logging them.
    pub fn from_records(records: &[PathRecord]) -> Self {
        TreeBuilder::new().build(records).tree
    }

    pub fn node(&self, id: &str) -> Option<&PathNode> {
        let chain = self.index.get(id)?;
        let (first, rest) = chain.split_first()?;
        let mut node = self.top.get(first)?;
        for step in rest {
            node = node.fields.get(step)?;
        }
        Some(node)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn root_for_class(&self, class: &str) -> Option<&PathNode> {
        self.root_types.get(class).and_then(|id| self.node(id))
    }

    /// `(terminal class, root)` pairs, ordered by class.
    pub fn root_types(&self) -> impl Iterator<Item = (&str, &PathNode)> {
        self.root_types
            .iter()
            .filter_map(|(class, id)| Some((class.as_str(), self.node(id)?)))
    }

    /// Records without a group, in declaration order.
    pub fn roots(&self) -> impl Iterator<Item = &PathNode> {
        self.top
            .iter()
            .filter(|node| !self.detached.contains(&node.id))
    }

    /// Top-level entries whose parent is missing or that sit in a grouping cycle.
    pub fn detached(&self) -> impl Iterator<Item = &PathNode> {
        self.top
            .iter()
            .filter(|node| self.detached.contains(&node.id))
    }

    /// Every node, depth-first in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &PathNode> {
        self.top.iter().flat_map(PathNode::walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PathStep, ValueType};

    fn record(id: &str, group: Option<&str>, path: &[&str]) -> PathRecord {
        let mut r = PathRecord::new(id, path.iter().map(|s| PathStep::parse(s)).collect());
        r.group_id = group.map(str::to_string);
        r
    }

    fn people() -> Vec<PathRecord> {
        let mut person = record("person", None, &["E21_Person"]);
        person.is_group = true;
        let mut name = record("name", Some("person"), &["E21_Person", "P1", "E41"]);
        name.field_kind = FieldKind::Value(ValueType::Text);
        name.cardinality = 1;
        let mut works = record("works_for", Some("person"), &["E21_Person", "P107", "E74_Group"]);
        works.field_kind = FieldKind::EntityReference;
        let mut org = record("organization", None, &["E74_Group"]);
        org.is_group = true;
        let org_name = record("org_name", Some("organization"), &["E74_Group", "P1", "E41"]);
        vec![person, name, works, org, org_name]
    }

    #[test]
    fn builds_nested_fields_in_declaration_order() {
        let built = TreeBuilder::new().build(&people());
        assert!(built.diagnostics.is_empty(), "{:?}", built.diagnostics);

        let tree = built.tree;
        let person = tree.node("person").expect("person");
        assert_eq!(person.fields.keys().collect::<Vec<_>>(), vec!["name", "works_for"]);
        assert_eq!(tree.node("org_name").map(|n| n.id.as_str()), Some("org_name"));
        assert_eq!(tree.roots().count(), 2);
    }

    #[test]
    fn links_entity_references_and_back_references() {
        let tree = PathTree::from_records(&people());
        let works = tree.node("works_for").expect("works_for");
        assert_eq!(
            works.entity_reference,
            EntityReference::Pending("organization".to_string())
        );
        let org = tree.root_for_class("E74_Group").expect("root type");
        assert_eq!(org.id, "organization");
        assert_eq!(org.parents, vec!["works_for".to_string()]);
    }

    #[test]
    fn unknown_reference_target_degrades() {
        let mut records = people();
        records.retain(|r| r.id != "organization" && r.id != "org_name");
        let built = TreeBuilder::new().build(&records);
        assert_eq!(
            built.diagnostics,
            vec![Diagnostic::UnresolvedReference {
                id: "works_for".to_string(),
                class: "E74_Group".to_string(),
            }]
        );
        let works = built.tree.node("works_for").expect("works_for");
        assert_eq!(works.entity_reference, EntityReference::None);
    }

    #[test]
    fn orphans_stay_addressable_but_detached() {
        let mut records = people();
        records.push(record("stray", Some("nowhere"), &["E1"]));
        let built = TreeBuilder::new().build(&records);
        assert!(built.diagnostics.contains(&Diagnostic::MissingParent {
            id: "stray".to_string(),
            group_id: "nowhere".to_string(),
        }));
        assert!(built.tree.contains("stray"));
        assert_eq!(built.tree.detached().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["stray"]);
        assert!(built.tree.roots().all(|n| n.id != "stray"));
    }

    #[test]
    fn orphans_do_not_resolve_references() {
        let mut records = people();
        let mut stray = record("stray", Some("nowhere"), &["E1", "P2", "E74_Group"]);
        stray.field_kind = FieldKind::EntityReference;
        records.push(stray);

        let tree = PathTree::from_records(&records);
        let stray = tree.node("stray").expect("stray");
        assert_eq!(stray.entity_reference, EntityReference::None);
        let org = tree.root_for_class("E74_Group").expect("root type");
        assert_eq!(org.parents, vec!["works_for".to_string()]);
    }

    #[test]
    fn grouping_cycles_do_not_hang() {
        let records = vec![record("a", Some("b"), &["X"]), record("b", Some("a"), &["Y"])];
        let built = TreeBuilder::new().build(&records);
        assert!(built.tree.contains("a"));
        assert!(built.tree.contains("b"));
        assert_eq!(
            built
                .diagnostics
                .iter()
                .filter(|d| matches!(d, Diagnostic::Unreachable { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn disabled_records_are_skipped_unless_requested() {
        let mut records = people();
        records[1].enabled = false;
        let tree = TreeBuilder::new().build(&records).tree;
        assert!(!tree.contains("name"));
        let tree = TreeBuilder::new().include_disabled(true).build(&records).tree;
        assert!(tree.contains("name"));
    }

    #[test]
    fn disabled_roots_leave_no_root_type() {
        let mut records = people();
        for record in records.iter_mut().filter(|r| r.id == "organization") {
            record.enabled = false;
        }

        let built = TreeBuilder::new().build(&records);
        assert!(!built.tree.contains("organization"));
        assert!(built.tree.root_for_class("E74_Group").is_none());
        assert!(built.diagnostics.contains(&Diagnostic::UnresolvedReference {
            id: "works_for".to_string(),
            class: "E74_Group".to_string(),
        }));
        let works = built.tree.node("works_for").expect("works_for");
        assert_eq!(works.entity_reference, EntityReference::None);

        let built = TreeBuilder::new().include_disabled(true).build(&records);
        let org = built.tree.root_for_class("E74_Group").expect("root type");
        assert_eq!(org.id, "organization");
        assert_eq!(
            built.tree.node("works_for").map(|n| &n.entity_reference),
            Some(&EntityReference::Pending("organization".to_string()))
        );
    }

    #[test]
    fn tree_is_shareable_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PathTree>();
    }
}
