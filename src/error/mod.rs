//! Error handling for appforge.
//!
//! This module provides:
//! - [`ForgeError`]: The main error enum for all build operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestions and context

mod codes;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::platform::{ApiError, ApiErrorKind};
use crate::spec::FieldError;

pub use codes::ErrorCode;

/// Exit status for anticipated build failures (bad manifest, syntax, versions).
pub const EXIT_ANTICIPATED: u8 = 3;
/// Exit status for invalid option combinations.
pub const EXIT_USAGE: u8 = 2;

/// Main error type for appforge operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing required config: {0}")]
    MissingConfig(String),

    #[error("{0}")]
    Usage(String),

    #[error("{}", spec_message(.path, .errors))]
    Spec {
        path: PathBuf,
        errors: Vec<FieldError>,
    },

    #[error("{0}")]
    SyntaxCheck(String),

    #[error("Local build failed: {0}")]
    LocalBuild(String),

    #[error("Could not create any of the requested versions of {name}: {}", .candidates.join(", "))]
    VersionConflict {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Could not determine whether {name}/{version} exists: {source}")]
    RegistryLookupAmbiguous {
        name: String,
        version: String,
        #[source]
        source: ApiError,
    },

    #[error("Failed to {stage}: {source}")]
    Publish {
        stage: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("Invalid destination: {0}")]
    Destination(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Builder job {job_id} {state}: {reason}")]
    RemoteJobFailure {
        job_id: String,
        state: String,
        reason: String,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Failed to destroy temporary project {project}: {source}")]
    WorkspaceCleanup {
        project: String,
        #[source]
        source: ApiError,
    },

    #[error("Archive error: {0}")]
    Archive(String),
}

fn spec_message(path: &std::path::Path, errors: &[FieldError]) -> String {
    match errors {
        [] => format!("Invalid build spec {}", path.display()),
        [only] => format!("Invalid build spec {}: {only}", path.display()),
        many => {
            let joined = many
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            format!("Invalid build spec {} ({} problems): {joined}", path.display(), many.len())
        }
    }
}

impl ForgeError {
    /// Build a single-field spec error.
    pub fn spec(path: impl Into<PathBuf>, field: &str, message: impl Into<String>) -> Self {
        Self::Spec {
            path: path.into(),
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Get the error code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::IoError,
            Self::Git(_) => ErrorCode::GitError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::MissingConfig(_) => ErrorCode::ConfigMissingRequired,
            Self::Usage(_) => ErrorCode::UsageInvalid,
            Self::Spec { errors, .. } => {
                if errors.iter().any(|e| e.field == "(manifest)") {
                    ErrorCode::SpecParseError
                } else if errors.iter().any(|e| e.field == "(source)") {
                    ErrorCode::SpecNotFound
                } else {
                    ErrorCode::SpecInvalid
                }
            }
            Self::SyntaxCheck(_) => ErrorCode::SyntaxError,
            Self::LocalBuild(_) => ErrorCode::LocalBuildFailed,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::RegistryLookupAmbiguous { .. } => ErrorCode::RegistryLookupFailed,
            Self::Publish { .. } => ErrorCode::PublishFailed,
            Self::Destination(_) => ErrorCode::DestinationInvalid,
            Self::Api(err) => match err.kind {
                ApiErrorKind::Unreachable | ApiErrorKind::Transport => {
                    ErrorCode::NetworkUnreachable
                }
                ApiErrorKind::InvalidAuthentication => ErrorCode::NetworkAuthFailed,
                ApiErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
                _ => ErrorCode::PlatformError,
            },
            Self::RemoteJobFailure { .. } => ErrorCode::RemoteJobFailed,
            Self::Cancelled(_) => ErrorCode::Cancelled,
            Self::WorkspaceCleanup { .. } => ErrorCode::WorkspaceCleanupFailed,
            Self::Archive(_) => ErrorCode::ArchiveFailed,
        }
    }

    /// Whether this is an expected failure a user can fix from the message alone.
    #[must_use]
    pub const fn is_anticipated(&self) -> bool {
        matches!(
            self,
            Self::Spec { .. }
                | Self::SyntaxCheck(_)
                | Self::LocalBuild(_)
                | Self::VersionConflict { .. }
                | Self::Destination(_)
                | Self::Config(_)
                | Self::MissingConfig(_)
        )
    }

    /// Process exit status for this error.
    #[must_use]
    pub const fn exit_status(&self) -> u8 {
        if matches!(self, Self::Usage(_)) {
            EXIT_USAGE
        } else if self.is_anticipated() {
            EXIT_ANTICIPATED
        } else {
            1
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::Spec { path, errors } => Some(serde_json::json!({
                "manifest": path.display().to_string(),
                "errors": errors,
            })),
            Self::VersionConflict { name, candidates } => {
                Some(serde_json::json!({ "name": name, "candidates": candidates }))
            }
            Self::RegistryLookupAmbiguous { name, version, source } => Some(serde_json::json!({
                "name": name,
                "version": version,
                "api_error": source.kind,
            })),
            Self::Publish { stage, source } => {
                Some(serde_json::json!({ "stage": stage, "api_error": source.kind }))
            }
            Self::RemoteJobFailure { job_id, state, .. } => {
                Some(serde_json::json!({ "job_id": job_id, "state": state }))
            }
            Self::WorkspaceCleanup { project, .. } => Some(serde_json::json!({ "project": project })),
            Self::MissingConfig(key) => Some(serde_json::json!({ "config_key": key })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_forge_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "VERSION_CONFLICT")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 201)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "spec", "version", "network")
    pub category: String,
}

impl StructuredError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a `ForgeError`.
    #[must_use]
    pub fn from_forge_error(err: &ForgeError) -> Self {
        let mut structured = Self::new(err.code(), err.to_string());
        structured.context = err.context();
        structured
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&ForgeError> for StructuredError {
    fn from(err: &ForgeError) -> Self {
        Self::from_forge_error(err)
    }
}

/// Result type alias using `ForgeError`.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ForgeError::Config("bad".into()).code(),
            ErrorCode::ConfigInvalid
        );
        assert_eq!(
            ForgeError::VersionConflict {
                name: "x".into(),
                candidates: vec!["1.0.0".into()],
            }
            .code(),
            ErrorCode::VersionConflict
        );
        assert_eq!(
            ForgeError::Api(ApiError::new(ApiErrorKind::Transport, "refused")).code(),
            ErrorCode::NetworkUnreachable
        );
    }

    #[test]
    fn test_spec_error_code_depends_on_field() {
        let parse = ForgeError::spec("/src/appspec.json", "(manifest)", "expected value");
        assert_eq!(parse.code(), ErrorCode::SpecParseError);

        let missing = ForgeError::spec("/src", "(source)", "not a directory");
        assert_eq!(missing.code(), ErrorCode::SpecNotFound);

        let field = ForgeError::spec("/src/appspec.json", "version", "required");
        assert_eq!(field.code(), ErrorCode::SpecInvalid);
    }

    #[test]
    fn test_exit_status_classes() {
        assert_eq!(ForgeError::Usage("nope".into()).exit_status(), EXIT_USAGE);
        assert_eq!(
            ForgeError::SyntaxCheck("bad".into()).exit_status(),
            EXIT_ANTICIPATED
        );
        assert_eq!(
            ForgeError::VersionConflict {
                name: "x".into(),
                candidates: vec![],
            }
            .exit_status(),
            EXIT_ANTICIPATED
        );
        assert_eq!(
            ForgeError::RemoteJobFailure {
                job_id: "job-1".into(),
                state: "failed".into(),
                reason: "AppError".into(),
            }
            .exit_status(),
            1
        );
    }

    #[test]
    fn test_spec_message_lists_every_problem() {
        let err = ForgeError::Spec {
            path: PathBuf::from("/src/appspec.json"),
            errors: vec![
                FieldError::new("name", "is required"),
                FieldError::new("runSpec.interpreter", "is required"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("2 problems"));
        assert!(message.contains("name: is required"));
        assert!(message.contains("runSpec.interpreter: is required"));
    }

    #[test]
    fn test_version_conflict_context() {
        let err = ForgeError::VersionConflict {
            name: "tool".into(),
            candidates: vec!["1.0.0".into(), "1.0.0+git.abc1234".into()],
        };
        let ctx = err.context().unwrap();
        assert_eq!(ctx["name"], "tool");
        assert_eq!(ctx["candidates"][1], "1.0.0+git.abc1234");
    }

    #[test]
    fn test_structured_error_serialization() {
        let err = StructuredError::new(ErrorCode::VersionConflict, "taken");
        let json = serde_json::to_string(&err).unwrap();

        assert!(json.contains("VERSION_CONFLICT"));
        assert!(json.contains("\"numeric_code\":201"));
        assert!(json.contains("\"recoverable\":true"));
        assert!(json.contains("\"category\":\"version\""));
    }

    #[test]
    fn test_structured_error_display() {
        let err = StructuredError::new(ErrorCode::SpecNotFound, "no appspec.json");
        let display = format!("{err}");
        assert!(display.contains("E101"));
        assert!(display.contains("appspec.json"));
    }

    #[test]
    fn test_to_structured_carries_context() {
        let err = ForgeError::RemoteJobFailure {
            job_id: "job-42".into(),
            state: "failed".into(),
            reason: "exit 1".into(),
        };
        let structured = err.to_structured();
        assert_eq!(structured.code, ErrorCode::RemoteJobFailed);
        assert_eq!(structured.context.unwrap()["job_id"], "job-42");
    }
}
