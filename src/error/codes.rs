//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Build spec errors
//! - 2xx: Version errors
//! - 3xx: Config and usage errors
//! - 5xx: Network and platform errors
//! - 6xx: Local storage errors
//! - 7xx: Build pipeline errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for JSON output.
///
/// Each variant maps to a numeric code (e.g., `SpecNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Build spec errors (1xx)
    // ========================================
    /// E101: Source directory or manifest missing
    SpecNotFound,
    /// E102: Manifest fields failed validation
    SpecInvalid,
    /// E103: Manifest is not valid JSON
    SpecParseError,

    // ========================================
    // Version errors (2xx)
    // ========================================
    /// E201: Every version candidate was rejected
    VersionConflict,
    /// E202: Registry could not say whether a version exists
    RegistryLookupFailed,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,
    /// E304: Required config value is missing
    ConfigMissingRequired,
    /// E305: Command-line options conflict
    UsageInvalid,
    /// E306: Destination could not be resolved
    DestinationInvalid,

    // ========================================
    // Network errors (5xx)
    // ========================================
    /// E501: Cannot reach the platform
    NetworkUnreachable,
    /// E503: Authentication with the platform failed
    NetworkAuthFailed,
    /// E504: Platform rejected the request
    PlatformError,
    /// E505: Caller lacks permission for the request
    PermissionDenied,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Local file operation failed
    IoError,
    /// E602: Serialization/deserialization failed
    SerializationError,
    /// E603: Source archive could not be produced
    ArchiveFailed,
    /// E604: Git metadata could not be read
    GitError,

    // ========================================
    // Build errors (7xx)
    // ========================================
    /// E701: configure/make step failed
    LocalBuildFailed,
    /// E702: Artifact or app creation failed
    PublishFailed,
    /// E703: Remote builder job failed
    RemoteJobFailed,
    /// E704: Temporary workspace could not be destroyed
    WorkspaceCleanupFailed,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Entry point failed the interpreter syntax check
    SyntaxError,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E901: Unexpected internal error
    InternalError,
    /// E902: Operation was cancelled
    Cancelled,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `SpecNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::SpecNotFound => 101,
            Self::SpecInvalid => 102,
            Self::SpecParseError => 103,

            Self::VersionConflict => 201,
            Self::RegistryLookupFailed => 202,

            Self::ConfigInvalid => 302,
            Self::ConfigMissingRequired => 304,
            Self::UsageInvalid => 305,
            Self::DestinationInvalid => 306,

            Self::NetworkUnreachable => 501,
            Self::NetworkAuthFailed => 503,
            Self::PlatformError => 504,
            Self::PermissionDenied => 505,

            Self::IoError => 601,
            Self::SerializationError => 602,
            Self::ArchiveFailed => 603,
            Self::GitError => 604,

            Self::LocalBuildFailed => 701,
            Self::PublishFailed => 702,
            Self::RemoteJobFailed => 703,
            Self::WorkspaceCleanupFailed => 704,

            Self::SyntaxError => 801,

            Self::InternalError => 901,
            Self::Cancelled => 902,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::SpecNotFound => "Run from an app source directory containing appspec.json, or pass the directory as an argument",
            Self::SpecInvalid => "Fix the listed fields in appspec.json and rerun the build",
            Self::SpecParseError => "appspec.json must be a single JSON object. Check for trailing commas or unquoted keys",

            Self::VersionConflict => "Bump \"version\" in appspec.json, pass --version-override, or drop --no-version-autonumbering",
            Self::RegistryLookupFailed => "The registry could not be queried. Check connectivity and permissions, then retry",

            Self::ConfigInvalid => "Check TOML syntax in the config file and the APPFORGE_* environment variables",
            Self::ConfigMissingRequired => "Set the value in the config file or via the matching APPFORGE_* environment variable",
            Self::UsageInvalid => "Run `appforge build --help` to see which options can be combined",
            Self::DestinationInvalid => "Use the form [PROJECT:][/[FOLDER/][NAME]] for --destination",

            Self::NetworkUnreachable => "Check your network connection and the configured api_url",
            Self::NetworkAuthFailed => "Verify the token in APPFORGE_TOKEN or the [platform] config section",
            Self::PlatformError => "The platform rejected the request. Inspect the message for details",
            Self::PermissionDenied => "Ask for CONTRIBUTE access to the destination project, or choose another destination",

            Self::IoError => "File operation failed. Check the path exists and permissions are correct",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::ArchiveFailed => "Check that every file in the source tree is readable",
            Self::GitError => "Check the repository state with `git status`",

            Self::LocalBuildFailed => "Fix the build errors printed above, or pass --no-build-step to skip the build",
            Self::PublishFailed => "Check the artifact spec with --dry-run and retry",
            Self::RemoteJobFailed => "Inspect the builder job log for details",
            Self::WorkspaceCleanupFailed => "Remove the leftover temporary project manually",

            Self::SyntaxError => "Fix the syntax errors printed above, or rerun with --no-check-syntax to proceed anyway",

            Self::InternalError => "An unexpected error occurred. Please report this issue with full error output",
            Self::Cancelled => "The operation was interrupted. Rerun the build when ready",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::SerializationError | Self::InternalError | Self::WorkspaceCleanupFailed
        )
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "spec",
            2 => "version",
            3 => "config",
            5 => "network",
            6 => "storage",
            7 => "build",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::SpecNotFound,
            Self::SpecInvalid,
            Self::SpecParseError,
            Self::VersionConflict,
            Self::RegistryLookupFailed,
            Self::ConfigInvalid,
            Self::ConfigMissingRequired,
            Self::UsageInvalid,
            Self::DestinationInvalid,
            Self::NetworkUnreachable,
            Self::NetworkAuthFailed,
            Self::PlatformError,
            Self::PermissionDenied,
            Self::IoError,
            Self::SerializationError,
            Self::ArchiveFailed,
            Self::GitError,
            Self::LocalBuildFailed,
            Self::PublishFailed,
            Self::RemoteJobFailed,
            Self::WorkspaceCleanupFailed,
            Self::SyntaxError,
            Self::InternalError,
            Self::Cancelled,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::SpecNotFound.numeric(), 101);
        assert_eq!(ErrorCode::VersionConflict.numeric(), 201);
        assert_eq!(ErrorCode::ConfigInvalid.numeric(), 302);
        assert_eq!(ErrorCode::NetworkUnreachable.numeric(), 501);
        assert_eq!(ErrorCode::LocalBuildFailed.numeric(), 701);
        assert_eq!(ErrorCode::SyntaxError.numeric(), 801);
        assert_eq!(ErrorCode::InternalError.numeric(), 901);
    }

    #[test]
    fn test_error_code_string() {
        assert_eq!(ErrorCode::SpecNotFound.code_string(), "E101");
        assert_eq!(ErrorCode::RemoteJobFailed.code_string(), "E703");
    }

    #[test]
    fn test_all_codes_have_suggestions() {
        for code in ErrorCode::all() {
            assert!(
                !code.suggestion().is_empty(),
                "ErrorCode::{code:?} has empty suggestion"
            );
        }
    }

    #[test]
    fn test_all_codes_have_categories() {
        for code in ErrorCode::all() {
            assert_ne!(code.category(), "unknown", "ErrorCode::{code:?} has no category");
        }
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::VersionConflict).unwrap();
        assert_eq!(json, "\"VERSION_CONFLICT\"");

        let deserialized: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, ErrorCode::VersionConflict);
    }

    #[test]
    fn test_recoverable_categorization() {
        assert!(ErrorCode::SpecInvalid.is_recoverable());
        assert!(ErrorCode::VersionConflict.is_recoverable());
        assert!(!ErrorCode::InternalError.is_recoverable());
        assert!(!ErrorCode::WorkspaceCleanupFailed.is_recoverable());
    }

    #[test]
    fn test_no_duplicate_numeric_codes() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            assert!(seen.insert(code.numeric()), "Duplicate numeric code: {}", code.numeric());
        }
    }
}
