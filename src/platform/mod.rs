//! Remote platform seam.
//!
//! Everything the build pipeline asks of the platform (projects, file
//! uploads, applets, apps, jobs) goes through the [`Platform`] trait.
//! [`client::ApiClient`] implements it over HTTP; tests use the in-memory
//! `test_utils::mock_platform::MockPlatform`.

pub mod client;
pub mod destination;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::{ApiClient, RetryConfig};
pub use destination::{parse_destination, Destination};

/// Classification of a platform error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorKind {
    ResourceNotFound,
    ResourceExists,
    InvalidState,
    InvalidInput,
    InvalidAuthentication,
    PermissionDenied,
    RateLimited,
    Server,
    /// The connection was never established, so the server saw nothing.
    Unreachable,
    Transport,
    Other,
}

impl ApiErrorKind {
    /// Map the `error.type` string of a platform response.
    #[must_use]
    pub fn from_type(name: &str) -> Self {
        match name {
            "ResourceNotFound" => Self::ResourceNotFound,
            "ResourceExists" | "AlreadyExists" => Self::ResourceExists,
            "InvalidState" => Self::InvalidState,
            "InvalidInput" | "InvalidType" => Self::InvalidInput,
            "InvalidAuthentication" => Self::InvalidAuthentication,
            "PermissionDenied" => Self::PermissionDenied,
            "RateLimitConditional" => Self::RateLimited,
            "InternalError" | "ServiceUnavailable" => Self::Server,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ResourceNotFound, message)
    }

    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::ResourceNotFound
    }

    /// Another writer got there first (version taken or already published).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.kind, ApiErrorKind::ResourceExists | ApiErrorKind::InvalidState)
    }

    /// Worth retrying the same request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::Unreachable
                | ApiErrorKind::Transport
                | ApiErrorKind::Server
                | ApiErrorKind::RateLimited
        )
    }

    /// The request was refused before the server acted on it.
    #[must_use]
    pub fn is_unprocessed(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Unreachable | ApiErrorKind::RateLimited)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} (HTTP {status}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Registry view of one app version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescription {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Publication timestamp; absent while the version is still mutable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<i64>,
}

impl AppDescription {
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.published.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Runnable,
    Running,
    Waiting,
    Done,
    Failed,
    Terminating,
    Terminated,
}

impl JobState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Terminated)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Runnable => "runnable",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    pub id: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// A local file to store as a closed remote file object.
#[derive(Debug, Clone, Copy)]
pub struct FileUpload<'a> {
    pub path: &'a Path,
    pub project: &'a str,
    pub folder: &'a str,
    pub name: &'a str,
    pub media_type: &'a str,
}

/// Launch request for an app run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub app: String,
    pub name: String,
    pub project: String,
    pub folder: Option<String>,
    pub input: Value,
}

/// Operations the build pipeline needs from the remote platform.
pub trait Platform {
    fn create_project(&self, name: &str) -> ApiResult<String>;

    fn destroy_project(&self, project: &str, terminate_jobs: bool) -> ApiResult<()>;

    fn remove_objects(&self, project: &str, ids: &[String]) -> ApiResult<()>;

    /// Upload a file and wait until it is closed; returns the file id.
    fn upload_file(&self, upload: &FileUpload<'_>) -> ApiResult<String>;

    fn create_applet(&self, spec: &Value) -> ApiResult<String>;

    /// Ids of applets named `name` directly inside `folder`.
    fn find_applets(&self, project: &str, folder: &str, name: &str) -> ApiResult<Vec<String>>;

    fn describe_app_version(&self, name: &str, version: &str) -> ApiResult<AppDescription>;

    fn describe_app(&self, app_id: &str) -> ApiResult<AppDescription>;

    fn create_app(&self, spec: &Value) -> ApiResult<String>;

    fn update_app(&self, app_id: &str, spec: &Value) -> ApiResult<()>;

    fn publish_app(&self, app_id: &str, make_default: bool) -> ApiResult<()>;

    /// Start a job; returns the job id.
    fn run_app(&self, request: &RunRequest) -> ApiResult<String>;

    fn describe_job(&self, job_id: &str) -> ApiResult<JobDescription>;

    /// Log lines of a job starting at line `offset`.
    fn job_log(&self, job_id: &str, offset: usize) -> ApiResult<Vec<String>>;

    fn terminate_job(&self, job_id: &str) -> ApiResult<()>;

    /// Ids of jobs in `project` that have not reached a terminal state.
    fn find_active_jobs(&self, project: &str) -> ApiResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_types_map_to_kinds() {
        assert_eq!(ApiErrorKind::from_type("ResourceNotFound"), ApiErrorKind::ResourceNotFound);
        assert_eq!(ApiErrorKind::from_type("InvalidState"), ApiErrorKind::InvalidState);
        assert_eq!(ApiErrorKind::from_type("PermissionDenied"), ApiErrorKind::PermissionDenied);
        assert_eq!(ApiErrorKind::from_type("SomethingNew"), ApiErrorKind::Other);
    }

    #[test]
    fn conflict_and_transient_classes() {
        assert!(ApiError::new(ApiErrorKind::InvalidState, "published").is_conflict());
        assert!(ApiError::new(ApiErrorKind::ResourceExists, "taken").is_conflict());
        assert!(!ApiError::not_found("gone").is_conflict());
        assert!(ApiError::new(ApiErrorKind::Server, "503").is_transient());
        assert!(!ApiError::new(ApiErrorKind::InvalidInput, "bad").is_transient());
        assert!(ApiError::new(ApiErrorKind::Unreachable, "refused").is_unprocessed());
        assert!(!ApiError::new(ApiErrorKind::Server, "503").is_unprocessed());
        assert!(!ApiError::new(ApiErrorKind::Transport, "reset").is_unprocessed());
    }

    #[test]
    fn display_includes_status() {
        let err = ApiError::new(ApiErrorKind::Server, "unavailable").with_status(503);
        assert_eq!(err.to_string(), "Server (HTTP 503): unavailable");
    }

    #[test]
    fn job_state_terminality() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Terminating.is_terminal());
    }

    #[test]
    fn app_description_published_flag() {
        let desc: AppDescription = serde_json::from_str(
            r#"{"id":"app-1","name":"tool","version":"1.0.0","published":1700000000}"#,
        )
        .unwrap();
        assert!(desc.is_published());

        let draft: AppDescription =
            serde_json::from_str(r#"{"id":"app-2","name":"tool","version":"1.0.1"}"#).unwrap();
        assert!(!draft.is_published());
    }
}
