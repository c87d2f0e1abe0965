use serde::Serialize;

use crate::error::{ForgeError, Result};
use crate::platform::Destination;
use crate::spec::SpecRequirements;

/// What kind of object the build produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// A versioned, publishable app wrapping a freshly built applet
    #[default]
    App,
    /// A standalone applet in a project
    Applet,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Applet => "applet",
        }
    }
}

/// Per-invocation build configuration. Built once, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOptions {
    pub mode: Mode,
    pub destination: Option<Destination>,
    pub publish: bool,
    pub remote: bool,
    pub overwrite: bool,
    pub version_override: Option<String>,
    pub bill_to: Option<String>,
    pub version_autonumbering: bool,
    pub try_update: bool,
    pub parallel_build: bool,
    pub check_syntax: bool,
    pub dry_run: bool,
    pub use_temp_project: bool,
    pub build_step: bool,
    pub upload_step: bool,
    pub json: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            mode: Mode::App,
            destination: None,
            publish: false,
            remote: false,
            overwrite: false,
            version_override: None,
            bill_to: None,
            version_autonumbering: true,
            try_update: true,
            parallel_build: true,
            check_syntax: true,
            dry_run: false,
            use_temp_project: true,
            build_step: true,
            upload_step: true,
            json: false,
        }
    }
}

impl BuildOptions {
    #[must_use]
    pub fn app() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn applet() -> Self {
        Self {
            mode: Mode::Applet,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn spec_requirements(&self) -> SpecRequirements {
        match self.mode {
            Mode::App => SpecRequirements::app(),
            Mode::Applet => SpecRequirements::applet(),
        }
    }

    /// Reject option combinations that cannot be honored.
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::App && self.destination.is_some() {
            return Err(ForgeError::Usage(
                "--destination cannot be used when creating an app (only an applet)".to_string(),
            ));
        }

        if self.remote {
            let conflicts = [
                (self.dry_run, "--dry-run"),
                (self.overwrite, "--overwrite"),
                (!self.build_step, "--no-build-step"),
                (!self.upload_step, "--no-upload-step"),
                (self.json, "--json"),
                (!self.use_temp_project, "--no-temp-build-project"),
            ];
            if let Some((_, flag)) = conflicts.iter().find(|(set, _)| *set) {
                return Err(ForgeError::Usage(format!(
                    "{flag} cannot be combined with --remote"
                )));
            }
        }

        Ok(())
    }
}
