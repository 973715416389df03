//! Pathbuilder path trees and filter-driven tree projection.
//!
//! - [`model`]: path records, path nodes and their field mappings
//! - [`tree`]: builds the forest of path nodes from flat records
//! - [`filter`]: the include/exclude filter mini-language
//! - [`project`]: clones a subtree, keeping only the selected fields
//! - [`namer`]: binding-variable names for generated queries
//! - [`endpoint`]: endpoint spec strings and the endpoint registry
//! - [`strings`]: identifier conversions and namespace prefixes

pub mod diagnostics;
pub mod endpoint;
pub mod filter;
pub mod model;
pub mod namer;
pub mod project;
pub mod strings;
pub mod tree;

pub use diagnostics::Diagnostic;
pub use endpoint::{
    parse_endpoint_spec, Endpoint, EndpointError, EndpointKind, EndpointMeta, EndpointOptions,
    EndpointRegistry, EndpointRequest, EndpointSpec, FilterMode, DEFAULT_PAGE_SIZE,
};
pub use filter::{FilterEntry, FilterKey, FilterSet, Wildcard};
pub use model::{
    EntityReference, FieldKind, Fields, PathNode, PathRecord, PathStep, ValueType, PATH_INVERSION,
};
pub use namer::{create_names, BindingNamer};
pub use project::{
    Include, Projection, ProjectionConfig, ProjectionError, Projector, DEFAULT_MAX_DEPTH,
    MAX_DEPTH_LIMIT,
};
pub use strings::PrefixMap;
pub use tree::{BuiltTree, PathTree, TreeBuilder};
