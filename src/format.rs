/*!
Format definitions and the registry that resolves them.

A [`FormatDefinition`] is the full field schema for one instrument file
format. The [`FormatRegistry`] resolves a format name to its reader kind,
storage kind, and definition through a three-tier chain: in-memory cache,
the centralized configuration store, then compiled builtin defaults.
*/
use std::io;

use thiserror::Error;

pub mod builtin;
pub mod definition;
pub mod registry;
pub mod validate;

pub use definition::{FieldUnitReport, FormatDefinition};
pub use registry::{FormatRegistry, ReaderKind, ResolvedFormat, StorageKind};
pub use validate::{
    field_summary, merge_format_definitions, validate_format_definition, FieldSummary,
    ValidationReport,
};

/// Errors raised by format resolution and persistence.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The requested format is not registered and has no builtin default
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    /// An I/O error while reading or writing a definition file
    #[error("format definition I/O error: {0}")]
    Io(#[from] io::Error),
    /// A definition file held malformed JSON
    #[error("format definition JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
