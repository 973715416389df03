//! Reader and record filter tests against files on disk.

use pathforge_core::{FieldKind, PathTree};
use pathforge_ingest::*;
use tempfile::tempdir;

const PATHBUILDER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pathbuilderinterface>
  <path>
    <id>publication</id>
    <weight>0</weight>
    <enabled>1</enabled>
    <group_id>0</group_id>
    <bundle>b1</bundle>
    <field>publication</field>
    <fieldtype></fieldtype>
    <displaywidget></displaywidget>
    <formatterwidget></formatterwidget>
    <cardinality>-1</cardinality>
    <field_type_informative></field_type_informative>
    <path_array>
      <x>lrmoo:F2_Expression</x>
    </path_array>
    <datatype_property>empty</datatype_property>
    <short_name>publication</short_name>
    <disamb>0</disamb>
    <description></description>
    <uuid></uuid>
    <is_group>1</is_group>
    <name>Publication</name>
  </path>
  <path>
    <id>publication_title</id>
    <enabled>1</enabled>
    <group_id>publication</group_id>
    <fieldtype>string</fieldtype>
    <cardinality>1</cardinality>
    <path_array>
      <x>lrmoo:F2_Expression</x>
      <y>crm:P102_has_title</y>
      <x>crm:E35_Title</x>
    </path_array>
    <datatype_property>crm:P190_has_symbolic_content</datatype_property>
    <is_group>0</is_group>
  </path>
  <path>
    <id>publication_draft</id>
    <enabled>0</enabled>
    <group_id>publication</group_id>
    <fieldtype>list_string</fieldtype>
    <cardinality>-1</cardinality>
    <path_array>
      <x>lrmoo:F2_Expression</x>
      <y>crm:P3_has_note</y>
    </path_array>
    <datatype_property>empty</datatype_property>
    <is_group>0</is_group>
  </path>
</pathbuilderinterface>
"#;

#[test]
fn reads_json_export_from_disk() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pathbuilder.json");
    let json = serde_json::json!({ "xml": PATHBUILDER });
    std::fs::write(&path, json.to_string()).expect("write json");

    let pathbuilder = read_pathbuilder_file(&path, &ReadOptions::default()).expect("read");
    assert_eq!(
        pathbuilder.iter().map(|e| e.id()).collect::<Vec<_>>(),
        vec!["publication", "publication_title"]
    );
}

#[test]
fn disabled_paths_are_kept_on_request() {
    let options = ReadOptions {
        include_disabled: true,
    };
    let pathbuilder = read_pathbuilder_str(PATHBUILDER, &options).expect("read");
    assert_eq!(pathbuilder.len(), 3);
    let draft = pathbuilder.get("publication_draft").expect("draft");
    assert!(!draft.record.enabled);
    assert_eq!(draft.record.field_kind.value_type().map(|t| t.as_str()), Some("list_text"));
}

#[test]
fn records_build_a_tree() {
    let pathbuilder = read_pathbuilder_str(PATHBUILDER, &ReadOptions::default()).expect("read");
    let tree = PathTree::from_records(&pathbuilder.records());
    let publication = tree.root_for_class("lrmoo:F2_Expression").expect("root type");
    assert_eq!(publication.class_name.as_deref(), Some("Publication"));
    assert_eq!(
        publication.fields.keys().collect::<Vec<_>>(),
        vec!["publication_title"]
    );
    assert_eq!(publication.field_kind, FieldKind::None);
}

#[test]
fn filter_and_write_back() {
    let options = ReadOptions {
        include_disabled: true,
    };
    let pathbuilder = read_pathbuilder_str(PATHBUILDER, &options).expect("read");
    let clauses: Vec<Clause> = ["enabled=0", "id=publication"]
        .iter()
        .map(|c| c.parse().expect("clause"))
        .collect();

    let kept = filter_entries(&pathbuilder.entries, &clauses);
    assert_eq!(
        kept.iter().map(|e| e.id()).collect::<Vec<_>>(),
        vec!["publication", "publication_draft"]
    );

    let xml = write_pathbuilder(kept.iter().copied()).expect("write");
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("filtered.xml");
    std::fs::write(&path, &xml).expect("write xml");

    let reread = read_pathbuilder_file(&path, &options).expect("reparse");
    assert_eq!(reread.len(), 2);
    for (before, after) in kept.iter().zip(reread.iter()) {
        assert_eq!(before.element, after.element);
        assert_eq!(before.record, after.record);
    }
    assert!(check_records(&reread.records()).is_empty());
}

#[test]
fn no_matching_clause_keeps_nothing() {
    let pathbuilder = read_pathbuilder_str(PATHBUILDER, &ReadOptions::default()).expect("read");
    let clauses = vec!["id=nope".parse::<Clause>().expect("clause")];
    assert!(filter_entries(&pathbuilder.entries, &clauses).is_empty());

    let xml = write_pathbuilder(std::iter::empty()).expect("write");
    assert!(read_pathbuilder_str(&xml, &ReadOptions::default())
        .expect("empty document")
        .is_empty());
}
