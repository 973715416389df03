//! Pathbuilder document ingestion.
//!
//! - [`pathbuilder`]: reads `<pathbuilderinterface>` XML (or the JSON export
//!   wrapping it) into [`PathbuilderEntry`]s and their [`PathRecord`]s
//! - [`select`]: keeps entries matching `element=value` clauses and writes
//!   them back out as pathbuilder XML
//!
//! [`PathRecord`]: pathforge_core::PathRecord

pub mod pathbuilder;
pub mod select;

pub use pathbuilder::{
    check_records, read_pathbuilder_file, read_pathbuilder_str, xml_from_json, Pathbuilder,
    PathbuilderEntry, RawElement, ReadOptions,
};
pub use select::{filter_entries, write_pathbuilder, Clause};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON pathbuilder export has no 'xml' string member")]
    MissingXml,

    #[error("path {path}: missing <{element}>")]
    MissingElement { path: String, element: String },

    #[error("path {path}: <{element}> is not a number: '{value}'")]
    InvalidNumber {
        path: String,
        element: String,
        value: String,
    },

    #[error("expected a <pathbuilderinterface> document, found <{found}>")]
    UnexpectedRoot { found: String },

    #[error("invalid filter clause '{clause}', expected element=value")]
    InvalidClause { clause: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;
