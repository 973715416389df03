//! Endpoints: which root to project, under which URL path, with what filters.
//!
//! Endpoint spec grammar:
//!
//! ```text
//! <path_id>[/<endpoint_path>][?sort1,sort2][|filter1,filter2]
//! ```
//!
//! `person` → path id `person`, endpoint path `/person`.
//! `person/people/list?name` → path id `person`, endpoint path `/people/list`, sortable `name`.

use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, opt},
    multi::separated_list1,
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::diagnostics::Diagnostic;
use crate::model::PathNode;
use crate::namer::BindingNamer;
use crate::project::{ProjectionError, Projector};
use crate::strings::{path_to_camelcase, path_to_filename};

pub const DEFAULT_PAGE_SIZE: usize = 20;

// ============================================================================
// Endpoint spec strings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub path_id: String,
    /// Always starts with `/`.
    pub endpoint_path: String,
    pub sortable: Vec<String>,
    pub filterable: Vec<String>,
}

fn is_path_id_char(c: char) -> bool {
    !matches!(c, '/' | '?' | '|') && !c.is_whitespace()
}

fn is_endpoint_path_char(c: char) -> bool {
    !matches!(c, '?' | '|') && !c.is_whitespace()
}

fn is_field_char(c: char) -> bool {
    !matches!(c, ',' | '?' | '|' | '/') && !c.is_whitespace()
}

fn field_list(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char(','), take_while1(is_field_char))(input)
}

fn endpoint_spec(input: &str) -> IResult<&str, EndpointSpec> {
    let (input, (path_id, endpoint_path, sortable, filterable)) = tuple((
        take_while1(is_path_id_char),
        opt(preceded(char('/'), take_while1(is_endpoint_path_char))),
        opt(preceded(char('?'), field_list)),
        opt(preceded(char('|'), field_list)),
    ))(input)?;

    let owned = |fields: Option<Vec<&str>>| -> Vec<String> {
        fields
            .unwrap_or_default()
            .into_iter()
            .map(str::to_string)
            .collect()
    };

    Ok((
        input,
        EndpointSpec {
            path_id: path_id.to_string(),
            endpoint_path: format!("/{}", endpoint_path.unwrap_or(path_id)),
            sortable: owned(sortable),
            filterable: owned(filterable),
        },
    ))
}

pub fn parse_endpoint_spec(spec: &str) -> Result<EndpointSpec, EndpointError> {
    all_consuming(endpoint_spec)(spec)
        .map(|(_, parsed)| parsed)
        .map_err(|e| EndpointError::InvalidSpec {
            spec: spec.to_string(),
            message: e.to_string(),
        })
}

impl FromStr for EndpointSpec {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_endpoint_spec(s)
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_id)?;
        if self.endpoint_path != format!("/{}", self.path_id) {
            write!(f, "{}", self.endpoint_path)?;
        }
        if !self.sortable.is_empty() {
            write!(f, "?{}", self.sortable.join(","))?;
        }
        if !self.filterable.is_empty() {
            write!(f, "|{}", self.filterable.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Requests and metadata
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Paged list of all instances.
    Listing,
    /// Single instance looked up by a key field.
    Item,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Listing => write!(f, "listing"),
            EndpointKind::Item => write!(f, "item"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRequest {
    pub spec: EndpointSpec,
    pub kind: EndpointKind,
    pub mode: FilterMode,
    /// Required for [`EndpointKind::Item`].
    pub key_field: Option<String>,
    pub filters: Vec<String>,
}

impl EndpointRequest {
    pub fn listing(spec: EndpointSpec, mode: FilterMode, filters: Vec<String>) -> Self {
        Self {
            spec,
            kind: EndpointKind::Listing,
            mode,
            key_field: None,
            filters,
        }
    }

    pub fn item(
        spec: EndpointSpec,
        key_field: impl Into<String>,
        mode: FilterMode,
        filters: Vec<String>,
    ) -> Self {
        Self {
            spec,
            kind: EndpointKind::Item,
            mode,
            key_field: Some(key_field.into()),
            filters,
        }
    }
}

/// Renderer-facing metadata attached to a projected root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMeta {
    pub kind: EndpointKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    pub page_size: usize,
    #[serde(default)]
    pub sortable: Vec<String>,
    #[serde(default)]
    pub filterable: Vec<String>,
    /// Local output file name (no directory, no extension).
    pub filename: String,
    #[serde(default)]
    pub everything_optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOptions {
    pub page_size: usize,
    /// Make cardinality-1 fields optional too.
    pub everything_optional: bool,
    pub output_prefix: Option<String>,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            everything_optional: false,
            output_prefix: None,
        }
    }
}

impl EndpointOptions {
    /// `{output_prefix}_{path_to_filename(path)}`, which may include directories.
    pub fn output_stem(&self, endpoint_path: &str) -> String {
        format!(
            "{}_{}",
            self.output_prefix.as_deref().unwrap_or_default(),
            path_to_filename(endpoint_path)
        )
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint path {path} is specified more than once")]
    DuplicatePath { path: String },
    #[error("endpoint '{spec}' is an include endpoint but is missing any fields to include")]
    EmptyIncludeList { spec: String },
    #[error("endpoint '{spec}': unknown path id '{path_id}'")]
    UnknownPath { spec: String, path_id: String },
    #[error("item endpoint '{spec}' needs a key field")]
    MissingKeyField { spec: String },
    #[error("invalid endpoint spec '{spec}': {message}")]
    InvalidSpec { spec: String, message: String },
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Projected root, with [`PathNode::endpoint`] set.
    pub root: PathNode,
    pub names: BindingNamer,
    pub diagnostics: Vec<Diagnostic>,
    /// Output path without extension, see [`EndpointOptions::output_stem`].
    pub output_stem: String,
}

impl Endpoint {
    pub fn meta(&self) -> Option<&EndpointMeta> {
        self.root.endpoint.as_ref()
    }

    pub fn path(&self) -> &str {
        self.meta().map(|meta| meta.path.as_str()).unwrap_or_default()
    }
}

/// Endpoints by URL path, in registration order.
pub struct EndpointRegistry<'t> {
    projector: Projector<'t>,
    options: EndpointOptions,
    endpoints: Vec<Endpoint>,
}

impl<'t> EndpointRegistry<'t> {
    pub fn new(projector: Projector<'t>, options: EndpointOptions) -> Self {
        Self {
            projector,
            options,
            endpoints: Vec::new(),
        }
    }

    /// Project and register one endpoint. On error nothing is registered.
    pub fn register(&mut self, request: &EndpointRequest) -> Result<&Endpoint, EndpointError> {
        let spec = &request.spec;
        let path = spec.endpoint_path.as_str();
        if self.get(path).is_some() {
            return Err(EndpointError::DuplicatePath {
                path: path.to_string(),
            });
        }
        if request.mode == FilterMode::Include && request.filters.is_empty() {
            return Err(EndpointError::EmptyIncludeList {
                spec: spec.to_string(),
            });
        }
        if request.kind == EndpointKind::Item && request.key_field.is_none() {
            return Err(EndpointError::MissingKeyField {
                spec: spec.to_string(),
            });
        }
        let source = self
            .projector
            .tree()
            .node(&spec.path_id)
            .ok_or_else(|| EndpointError::UnknownPath {
                spec: spec.to_string(),
                path_id: spec.path_id.clone(),
            })?;

        let class_name = path_to_camelcase(path);
        tracing::info!(endpoint = %path, class = %class_name, mode = ?request.mode, "projecting endpoint");
        let projection = match request.mode {
            FilterMode::Include => {
                self.projector
                    .include_endpoint(source, &class_name, &request.filters)?
            }
            FilterMode::Exclude => {
                self.projector
                    .exclude_endpoint(source, &class_name, &request.filters)?
            }
        };

        let output_stem = self.options.output_stem(path);
        let filename = output_stem
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let mut root = projection.root;
        root.endpoint = Some(EndpointMeta {
            kind: request.kind,
            path: path.to_string(),
            key_field: request.key_field.clone(),
            page_size: self.options.page_size,
            sortable: spec.sortable.clone(),
            filterable: spec.filterable.clone(),
            filename,
            everything_optional: self.options.everything_optional,
        });

        self.endpoints.push(Endpoint {
            root,
            names: projection.names,
            diagnostics: projection.diagnostics,
            output_stem,
        });
        let index = self.endpoints.len() - 1;
        Ok(&self.endpoints[index])
    }

    pub fn get(&self, path: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|endpoint| endpoint.path() == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn into_endpoints(self) -> Vec<Endpoint> {
        self.endpoints
    }
}
