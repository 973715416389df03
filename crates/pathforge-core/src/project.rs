//! Tree projection (clone + prune).
//!
//! Projecting a field produces a *new* node tree containing only the fields an
//! include or exclude list selects. Every level goes through the same clone
//! step ([`Projector::create_clone`]):
//!
//! 1. copy the node without its fields,
//! 2. re-root it under the endpoint name if its parent is the synthetic top,
//! 3. substitute the fields of a referenced root (entity references),
//! 4. elide path prefixes already bound by the parent,
//! 5. allocate binding variables,
//! 6. parse and check the filter list for this level.
//!
//! The source tree is only ever borrowed. Entity-reference cycles are cut by
//! `%`/`%%` in the filters; otherwise they run into the configured depth bound
//! and fail with [`ProjectionError::UnresolvedRecursion`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::diagnostics::Diagnostic;
use crate::filter::{FilterSet, Wildcard};
use crate::model::{EntityReference, Fields, PathNode, PathStep, ValueType};
use crate::namer::BindingNamer;
use crate::tree::PathTree;

pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Largest accepted `max_depth`. Every level is a native stack frame, so
/// bounds past this overflow the thread stack before the bound is reached.
pub const MAX_DEPTH_LIMIT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Deepest level (endpoint root = 0) a projection may reach.
    pub max_depth: usize,
    pub resolve_entity_references: bool,
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(ProjectionError::InvalidConfig {
                max_depth: self.max_depth,
                limit: MAX_DEPTH_LIMIT,
            });
        }
        Ok(())
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            resolve_entity_references: true,
        }
    }
}

/// What to include of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    /// Render the field as a leaf: its values (`distinct`) or their number (`count`).
    Leaf { count: bool, distinct: bool },
    /// A filter list for the field's own children.
    Filters(Vec<String>),
}

impl Include {
    pub fn filters<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Include::Filters(filters.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error(
        "unresolved recursion at '{node}' ({trail}): depth {depth} exceeds {max_depth}; \
         add '%' or '%%' to stop following entity references"
    )]
    UnresolvedRecursion {
        node: String,
        trail: String,
        depth: usize,
        max_depth: usize,
    },
    #[error(
        "path inversion only makes sense for including fields, not for excluding them \
         (at {trail}: '^{field}')"
    )]
    InvertedExclude { field: String, trail: String },
    #[error("path '{parent}' has no field '{field}'")]
    UnknownField { parent: String, field: String },
    #[error("max depth {max_depth} is above the supported limit of {limit}")]
    InvalidConfig { max_depth: usize, limit: usize },
}

/// Result of one projection: the new tree and what happened while building it.
#[derive(Debug, Clone)]
pub struct Projection {
    pub root: PathNode,
    pub names: BindingNamer,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Per-call state
// ============================================================================

/// The parts of a parent that the clone step reads.
#[derive(Debug, Clone, Copy)]
struct ParentView<'a> {
    class_name: &'a str,
    path_array: &'a [Option<PathStep>],
    binding_vars: &'a [String],
}

impl<'a> ParentView<'a> {
    fn of(node: &'a PathNode) -> Self {
        Self {
            class_name: node.class_name.as_deref().unwrap_or(&node.id),
            path_array: &node.path_array,
            binding_vars: &node.binding_vars,
        }
    }

    /// The synthetic parent of an endpoint root: no path, no bindings.
    fn top(class_name: &'a str) -> Self {
        Self {
            class_name,
            path_array: &[],
            binding_vars: &[],
        }
    }
}

/// State threaded through one projection. Sibling subtrees share it.
#[derive(Debug, Default)]
struct Walk {
    names: BindingNamer,
    diagnostics: Vec<Diagnostic>,
    /// Field ids from the projection root down to the current node.
    trail: Vec<String>,
}

impl Walk {
    fn at(&self) -> String {
        if self.trail.is_empty() {
            "the top level".to_string()
        } else {
            self.trail.join(".")
        }
    }

    fn finish(self, root: PathNode) -> Projection {
        Projection {
            root,
            names: self.names,
            diagnostics: self.diagnostics,
        }
    }
}

struct Cloned<'a> {
    node: PathNode,
    /// Fields to filter: the node's own, or those of the root it references.
    source_fields: &'a Fields,
    filters: FilterSet,
}

// ============================================================================
// Projector
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Projector<'t> {
    tree: &'t PathTree,
    config: ProjectionConfig,
}

impl<'t> Projector<'t> {
    pub fn new(tree: &'t PathTree) -> Self {
        Self {
            tree,
            config: ProjectionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProjectionConfig) -> Result<Self, ProjectionError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn tree(&self) -> &'t PathTree {
        self.tree
    }

    /// Project `parent.fields[field_name]`, keeping only what `request` selects.
    pub fn include(
        &self,
        parent: &PathNode,
        field_name: &str,
        request: &Include,
    ) -> Result<Projection, ProjectionError> {
        let target = field_of(parent, field_name)?;
        let mut walk = Walk::default();
        let root = self.include_node(
            ParentView::of(parent),
            target,
            field_name,
            request,
            self.config.resolve_entity_references,
            0,
            &mut walk,
        )?;
        Ok(walk.finish(root))
    }

    /// Project `parent.fields[field_name]`, dropping what `filters` lists.
    pub fn exclude<S: AsRef<str>>(
        &self,
        parent: &PathNode,
        field_name: &str,
        filters: &[S],
    ) -> Result<Projection, ProjectionError> {
        let target = field_of(parent, field_name)?;
        let filters = owned(filters);
        let mut walk = Walk::default();
        let root = self.exclude_node(
            ParentView::of(parent),
            target,
            field_name,
            &filters,
            self.config.resolve_entity_references,
            0,
            &mut walk,
        )?;
        Ok(walk.finish(root))
    }

    /// Include projection of a root, re-rooted under `class_name`.
    pub fn include_endpoint<S: AsRef<str>>(
        &self,
        root: &PathNode,
        class_name: &str,
        filters: &[S],
    ) -> Result<Projection, ProjectionError> {
        let request = Include::Filters(owned(filters));
        let mut walk = Walk::default();
        let node = self.include_node(
            ParentView::top(class_name),
            root,
            class_name,
            &request,
            self.config.resolve_entity_references,
            0,
            &mut walk,
        )?;
        Ok(walk.finish(node))
    }

    /// Exclude projection of a root, re-rooted under `class_name`.
    pub fn exclude_endpoint<S: AsRef<str>>(
        &self,
        root: &PathNode,
        class_name: &str,
        filters: &[S],
    ) -> Result<Projection, ProjectionError> {
        let filters = owned(filters);
        let mut walk = Walk::default();
        let node = self.exclude_node(
            ParentView::top(class_name),
            root,
            class_name,
            &filters,
            self.config.resolve_entity_references,
            0,
            &mut walk,
        )?;
        Ok(walk.finish(node))
    }

    #[allow(clippy::too_many_arguments)]
    fn create_clone<'a>(
        &'a self,
        parent: ParentView<'_>,
        target: &'a PathNode,
        field_name: &str,
        filters: Option<&[String]>,
        resolve: bool,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<Cloned<'a>, ProjectionError> {
        if depth > self.config.max_depth {
            return Err(ProjectionError::UnresolvedRecursion {
                node: target.id.clone(),
                trail: walk.at(),
                depth,
                max_depth: self.config.max_depth,
            });
        }

        let mut node = target.without_fields();
        let mut source_fields = &target.fields;

        if parent.path_array.is_empty() {
            tracing::debug!(
                node = %target.id,
                depth,
                "root type, changing class name from {:?} to '{field_name}'",
                node.class_name
            );
            node.class_name = Some(field_name.to_string());
            node.root = true;
        }

        let mut varnames: Vec<String> = if parent.binding_vars.is_empty() {
            vec![field_name.to_string()]
        } else {
            parent.binding_vars.to_vec()
        };

        if resolve {
            if let EntityReference::Pending(root_id) = &target.entity_reference {
                match self.tree.node(root_id) {
                    Some(referenced) => {
                        tracing::debug!(node = %target.id, depth, "entity reference to '{root_id}'");
                        source_fields = &referenced.fields;
                        let referenced_class =
                            referenced.class_name.as_deref().unwrap_or(&referenced.id);
                        node.class_name = Some(format!("{}_{referenced_class}", parent.class_name));
                        node.entity_reference = EntityReference::Expanded(root_id.clone());
                    }
                    None => Diagnostic::UnresolvedReference {
                        id: target.id.clone(),
                        class: target.terminal_class().unwrap_or_default().to_string(),
                    }
                    .emit(&mut walk.diagnostics),
                }
            }
        }

        if node.path_array.len() > parent.path_array.len() {
            for (slot, parent_step) in node.path_array.iter_mut().zip(parent.path_array) {
                if parent_step.is_none() || *slot == *parent_step {
                    *slot = None;
                } else {
                    break;
                }
            }
        } else {
            // Reached through a reference hop: the hop already bound the subject.
            if let Some(last) = parent.binding_vars.last() {
                varnames = vec![last.clone()];
            }
            if let Some(first) = node.path_array.first_mut() {
                *first = None;
            }
        }

        if let Some(property) = &target.datatype_property {
            node.path_array.push(Some(property.clone()));
        }

        if !parent.binding_vars.is_empty() {
            let n = name_count(1 + node.path_array.len() / 2, varnames.len());
            let prefix = varnames.last().cloned().unwrap_or_default();
            varnames.extend(walk.names.allocate(&prefix, &target.id, n));
        }
        node.binding = varnames.last().cloned();
        node.binding_vars = varnames;
        tracing::debug!(node = %target.id, depth, path = ?node.path_array, binding_vars = ?node.binding_vars, "cloned");

        let filters = filters.map(FilterSet::parse).unwrap_or_default();
        let at = walk.at();
        for key in filters.keys() {
            if source_fields.contains(&key.field) {
                tracing::debug!(node = %target.id, depth, "found field '{key}'");
            } else {
                Diagnostic::UnknownFilterField {
                    node: target.id.clone(),
                    field: key.to_string(),
                    at: at.clone(),
                }
                .emit(&mut walk.diagnostics);
            }
        }
        for wildcard in filters.wildcards() {
            if !wildcard.is_recursive() && source_fields.is_empty() {
                Diagnostic::EmptyWildcard {
                    node: target.id.clone(),
                    wildcard: wildcard.to_string(),
                    at: at.clone(),
                }
                .emit(&mut walk.diagnostics);
            }
        }

        Ok(Cloned {
            node,
            source_fields,
            filters,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn include_node<'a>(
        &'a self,
        parent: ParentView<'_>,
        target: &'a PathNode,
        field_name: &str,
        request: &Include,
        resolve: bool,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<PathNode, ProjectionError> {
        let filter_list = match request {
            Include::Leaf { .. } => None,
            Include::Filters(list) => Some(list.as_slice()),
        };
        let Cloned {
            mut node,
            source_fields,
            filters,
        } = self.create_clone(parent, target, field_name, filter_list, resolve, depth, walk)?;
        tracing::debug!(node = %target.id, depth, "include {request:?}");

        match request {
            Include::Leaf { count, distinct } => {
                node.distinct = *distinct;
                if *count {
                    node.count = true;
                    node.cardinality = 1;
                    node.value_type = Some(ValueType::Integer);
                }
            }
            Include::Filters(_)
                if filters.has(Wildcard::AllRecursive)
                    || filters.has(Wildcard::AllRecursiveUnresolved) =>
            {
                let resolve = resolve && !filters.has(Wildcard::AllRecursiveUnresolved);
                let recursive = Include::filters([Wildcard::AllRecursive.as_str()]);
                let mut fields = Fields::default();
                let view = ParentView::of(&node);
                for child in source_fields {
                    fields.insert(self.descend_include(view, child, &recursive, resolve, depth, walk)?);
                }
                node.fields = fields;
            }
            Include::Filters(_) => {
                let every = filters.has(Wildcard::All) || filters.has(Wildcard::AllUnresolved);
                let resolve = resolve && !filters.has(Wildcard::AllUnresolved);
                let mut fields = Fields::default();
                let view = ParentView::of(&node);
                for child in source_fields {
                    let selected = filters.lookup(&child.id);
                    let request = match selected {
                        Some((_, entry)) if entry.is_leaf_request() => Include::Leaf {
                            count: entry.count,
                            distinct: entry.distinct,
                        },
                        Some((_, entry)) => Include::Filters(entry.nested()),
                        None if every => Include::Filters(Vec::new()),
                        None => continue,
                    };
                    let mut projected =
                        self.descend_include(view, child, &request, resolve, depth, walk)?;
                    projected.inverted |= selected.is_some_and(|(key, _)| key.inverted);
                    fields.insert(projected);
                }
                node.fields = fields;
            }
        }

        if node.fields.is_empty() && node.datatype_property.is_none() && node.value_type.is_none() {
            tracing::debug!(node = %target.id, depth, "class is down to 0 fields");
            node.value_type = Some(ValueType::Uri);
        } else {
            tracing::debug!(node = %target.id, depth, fields = ?node.fields.keys().collect::<Vec<_>>(), "remaining fields");
        }
        Ok(node)
    }

    fn descend_include<'a>(
        &'a self,
        parent: ParentView<'_>,
        child: &'a PathNode,
        request: &Include,
        resolve: bool,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<PathNode, ProjectionError> {
        walk.trail.push(child.id.clone());
        let result = self.include_node(parent, child, &child.id, request, resolve, depth + 1, walk);
        walk.trail.pop();
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn exclude_node<'a>(
        &'a self,
        parent: ParentView<'_>,
        target: &'a PathNode,
        field_name: &str,
        filter_list: &[String],
        resolve: bool,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<PathNode, ProjectionError> {
        let Cloned {
            mut node,
            source_fields,
            filters,
        } = self.create_clone(parent, target, field_name, Some(filter_list), resolve, depth, walk)?;
        tracing::debug!(node = %target.id, depth, "exclude {filter_list:?}");

        if let Some(key) = filters.inverted_keys().next() {
            return Err(ProjectionError::InvertedExclude {
                field: key.field.clone(),
                trail: walk.at(),
            });
        }

        if filters.has(Wildcard::All) || filters.has(Wildcard::AllRecursive) {
            node.value_type = Some(ValueType::Uri);
            return Ok(node);
        }

        let resolve = resolve
            && !(filters.has(Wildcard::AllUnresolved)
                || filters.has(Wildcard::AllRecursiveUnresolved));

        let mut fields = Fields::default();
        let view = ParentView::of(&node);
        for child in source_fields {
            let nested = match filters.get(&child.id, false) {
                Some(entry) if !entry.has_nested() => {
                    tracing::debug!(node = %target.id, depth, "excluding field '{}'", child.id);
                    continue;
                }
                Some(entry) => entry.nested(),
                None => Vec::new(),
            };
            walk.trail.push(child.id.clone());
            let projected =
                self.exclude_node(view, child, &child.id, &nested, resolve, depth + 1, walk);
            walk.trail.pop();
            fields.insert(projected?);
        }
        node.fields = fields;
        Ok(node)
    }
}

fn field_of<'a>(parent: &'a PathNode, field_name: &str) -> Result<&'a PathNode, ProjectionError> {
    parent
        .fields
        .get(field_name)
        .ok_or_else(|| ProjectionError::UnknownField {
            parent: parent.id.clone(),
            field: field_name.to_string(),
        })
}

fn owned<S: AsRef<str>>(filters: &[S]) -> Vec<String> {
    filters.iter().map(|s| s.as_ref().to_string()).collect()
}

/// How many new binding variables a node needs: one per property/class pair
/// not yet bound. A node that is behind its parent still gets a name of its own.
fn name_count(wanted: usize, bound: usize) -> usize {
    match wanted.cmp(&bound) {
        Ordering::Greater => wanted - bound,
        Ordering::Equal => 0,
        Ordering::Less => 1,
    }
}
