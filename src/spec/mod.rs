//! Build spec model.
//!
//! An app source directory carries an `appspec.json` manifest at its root.
//! [`loader::load`] turns it into an immutable [`BuildSpec`] or a list of
//! [`FieldError`]s; [`lint`] produces advisory warnings.

pub mod lint;
pub mod loader;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use loader::{load, LoadedSpec, SpecRequirements};

/// Manifest file name expected at the root of a source tree.
pub const MANIFEST_FILE: &str = "appspec.json";

/// Subdirectory whose contents are bundled alongside the artifact.
pub const RESOURCES_DIR: &str = "resources";

/// A single problem found while validating the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Parsed, validated manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_spec: Option<RunSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_spec: Vec<IoField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_spec: Vec<IoField>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub build_options: Map<String, Value>,
    /// Top-level fields this crate does not interpret; passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSpec {
    pub interpreter: String,
    #[serde(flatten)]
    pub entry: RunEntry,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where the entry point lives: a file in the source tree or inline code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEntry {
    File(String),
    Code(String),
}

impl RunEntry {
    /// Absolute path of a file entry point.
    pub fn file_path(&self, source_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::File(rel) => Some(source_dir.join(rel)),
            Self::Code(_) => None,
        }
    }
}

/// An input or output field declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoField {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
