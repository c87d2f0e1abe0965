use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{lint, BuildSpec, FieldError, IoField, RunEntry, RunSpec, MANIFEST_FILE};
use crate::error::{ForgeError, Result};

/// Legal identifier for input and output fields.
static FIELD_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_]*$").expect("valid field name regex"));

/// Which optional manifest fields the current build mode needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecRequirements {
    pub require_version: bool,
}

impl SpecRequirements {
    #[must_use]
    pub const fn app() -> Self {
        Self {
            require_version: true,
        }
    }

    #[must_use]
    pub const fn applet() -> Self {
        Self {
            require_version: false,
        }
    }
}

/// A validated spec plus where it came from and any lint warnings.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: BuildSpec,
    pub source_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Load and validate the manifest in `source_dir`.
///
/// All field problems are reported together in one [`ForgeError::Spec`].
pub fn load(source_dir: &Path, requirements: SpecRequirements) -> Result<LoadedSpec> {
    if !source_dir.is_dir() {
        return Err(ForgeError::spec(
            source_dir,
            "(source)",
            format!("{} is not a directory", source_dir.display()),
        ));
    }

    let manifest_path = source_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(ForgeError::spec(
            source_dir,
            "(source)",
            format!(
                "directory {} does not contain {MANIFEST_FILE}: not a valid app source directory",
                source_dir.display()
            ),
        ));
    }

    let raw = std::fs::read_to_string(&manifest_path)?;
    let manifest = parse_manifest(&manifest_path, &raw)?;
    let spec = validate(manifest, source_dir, requirements).map_err(|errors| ForgeError::Spec {
        path: manifest_path.clone(),
        errors,
    })?;
    debug!(name = %spec.name, version = ?spec.version, "loaded build spec");

    let warnings = lint::lint(&spec, source_dir);
    for warning in &warnings {
        warn!(manifest = %manifest_path.display(), "{warning}");
    }

    Ok(LoadedSpec {
        spec,
        source_dir: source_dir.to_path_buf(),
        manifest_path,
        warnings,
    })
}

/// Parse manifest text into its top-level JSON object.
pub fn parse_manifest(path: &Path, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ForgeError::spec(
            path,
            "(manifest)",
            "top level must be a JSON object",
        )),
        Err(err) => Err(ForgeError::spec(
            path,
            "(manifest)",
            format!("could not parse as JSON: {err}"),
        )),
    }
}

/// Validate a parsed manifest into a [`BuildSpec`], collecting every field error.
pub fn validate(
    mut manifest: Map<String, Value>,
    source_dir: &Path,
    requirements: SpecRequirements,
) -> std::result::Result<BuildSpec, Vec<FieldError>> {
    let mut fields = FieldCollector::default();

    let name = fields.required_string(&mut manifest, "name", "name");
    let version = if requirements.require_version {
        fields.required_string(&mut manifest, "version", "version")
    } else {
        fields.optional_string(&mut manifest, "version", "version")
    };
    let title = fields.optional_string(&mut manifest, "title", "title");
    let summary = fields.optional_string(&mut manifest, "summary", "summary");
    let description = fields.optional_string(&mut manifest, "description", "description");
    let categories = fields.string_list(&mut manifest, "categories");
    let run_spec = fields.run_spec(&mut manifest, source_dir);
    let input_spec = fields.io_fields(&mut manifest, "inputSpec");
    let output_spec = fields.io_fields(&mut manifest, "outputSpec");
    let build_options = fields
        .optional_object(&mut manifest, "buildOptions", "buildOptions")
        .unwrap_or_default();

    match name {
        Some(name) if fields.errors.is_empty() => Ok(BuildSpec {
            name,
            version,
            title,
            summary,
            description,
            categories,
            run_spec,
            input_spec,
            output_spec,
            build_options,
            extra: manifest,
        }),
        _ => Err(fields.errors),
    }
}

#[derive(Default)]
struct FieldCollector {
    errors: Vec<FieldError>,
}

impl FieldCollector {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn required_string(&mut self, map: &mut Map<String, Value>, key: &str, label: &str) -> Option<String> {
        match map.remove(key) {
            None | Some(Value::Null) => {
                self.push(label, "is required");
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.push(label, "must not be empty");
                None
            }
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                self.push(label, "must be a string");
                None
            }
        }
    }

    fn optional_string(&mut self, map: &mut Map<String, Value>, key: &str, label: &str) -> Option<String> {
        match map.remove(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                self.push(label, "must be a string");
                None
            }
        }
    }

    fn optional_object(
        &mut self,
        map: &mut Map<String, Value>,
        key: &str,
        label: &str,
    ) -> Option<Map<String, Value>> {
        match map.remove(key) {
            None | Some(Value::Null) => None,
            Some(Value::Object(obj)) => Some(obj),
            Some(_) => {
                self.push(label, "must be an object");
                None
            }
        }
    }

    fn string_list(&mut self, map: &mut Map<String, Value>, key: &str) -> Vec<String> {
        match map.remove(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s),
                        _ => self.push(&format!("{key}[{i}]"), "must be a string"),
                    }
                }
                out
            }
            Some(_) => {
                self.push(key, "must be an array of strings");
                Vec::new()
            }
        }
    }

    /// `runSpec` is optional; when present it must name an interpreter and
    /// exactly one entry point.
    fn run_spec(&mut self, map: &mut Map<String, Value>, source_dir: &Path) -> Option<RunSpec> {
        let mut run = match map.remove("runSpec") {
            None | Some(Value::Null) => return None,
            Some(Value::Object(obj)) => obj,
            Some(_) => {
                self.push("runSpec", "must be an object");
                return None;
            }
        };

        let interpreter = self.required_string(&mut run, "interpreter", "runSpec.interpreter");
        let file = self.optional_string(&mut run, "file", "runSpec.file");
        let code = self.optional_string(&mut run, "code", "runSpec.code");

        let entry = match (file, code) {
            (Some(_), Some(_)) => {
                self.push("runSpec", "must specify only one of \"file\" or \"code\"");
                None
            }
            (None, None) => {
                self.push("runSpec", "must specify one of \"file\" or \"code\"");
                None
            }
            (Some(file), None) => {
                if source_dir.join(&file).is_file() {
                    Some(RunEntry::File(file))
                } else {
                    self.push(
                        "runSpec.file",
                        format!("entry point {file} does not exist in the source directory"),
                    );
                    None
                }
            }
            (None, Some(code)) => Some(RunEntry::Code(code)),
        };

        Some(RunSpec {
            interpreter: interpreter?,
            entry: entry?,
            extra: run,
        })
    }

    fn io_fields(&mut self, map: &mut Map<String, Value>, key: &str) -> Vec<IoField> {
        let items = match map.remove(key) {
            None | Some(Value::Null) => return Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(key, "must be an array");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let label = format!("{key}[{i}]");
            let Value::Object(mut obj) = item else {
                self.push(&label, "must be an object");
                continue;
            };
            let Some(name) = self.required_string(&mut obj, "name", &format!("{label}.name")) else {
                continue;
            };
            if !FIELD_NAME_REGEX.is_match(&name) {
                self.push(
                    &format!("{label}.name"),
                    format!("illegal name \"{name}\" (must match ^[a-zA-Z_][0-9a-zA-Z_]*$)"),
                );
                continue;
            }
            out.push(IoField { name, extra: obj });
        }
        out
    }
}
